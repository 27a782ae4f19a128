//! # A wheat crop through one growing season
//!
//! Four organs (leaf, stem, root, grain) share dry matter and nitrogen every day
//! for 160 days. Demand and supply follow a simple phenology clock:
//!
//! ```text
//! day   0 ─────── 60 ─────────── 110 ──────────── 160
//!        vegetative │  stem elongation │  grain fill
//! ```
//!
//! During grain fill the leaf and stem stop growing and start retranslocating
//! what they built; the grain, first in the priority order, takes it.
//!
//! Run with: `cargo run --example season`
//!
//! Set `ROWS=1` to also print every table row of the final week, and
//! `RUST_LOG=organ_arbitrator=debug` to watch each step.

use tracing_subscriber::EnvFilter;

use organ_arbitrator::report::{ReportRow, ReportWriter, Value};
use organ_arbitrator::{
    AllocationPool, Arbitrator, ArbitratorConfig, Biomass, BoxedOrgan, DemandPool, Organ,
    OrganId, Resource, SimpleOrgan, StepReport, SupplyPool,
};

const LEAF: OrganId = OrganId(1);
const STEM: OrganId = OrganId(2);
const ROOT: OrganId = OrganId(3);
const GRAIN: OrganId = OrganId(4);

const SEASON_DAYS: u32 = 160;

// ── Phenology ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
enum Stage {
    Vegetative,
    Elongation,
    GrainFill,
}

fn stage(day: u32) -> Stage {
    match day {
        0..=59 => Stage::Vegetative,
        60..=109 => Stage::Elongation,
        _ => Stage::GrainFill,
    }
}

/// Demand and supply for one organ on one day.
struct Daily {
    dm_demand: DemandPool,
    dm_supply: SupplyPool,
    n_demand: DemandPool,
    n_supply: SupplyPool,
}

fn zero() -> Daily {
    Daily {
        dm_demand: DemandPool::zeroed(),
        dm_supply: SupplyPool::zeroed(),
        n_demand: DemandPool::zeroed(),
        n_supply: SupplyPool::zeroed(),
    }
}

fn leaf_day(day: u32, live: &Biomass) -> Daily {
    // Canopy photosynthesis rises to a plateau and fades through grain fill.
    let light = match stage(day) {
        Stage::Vegetative => 2.0 + 0.2 * day as f64,
        Stage::Elongation => 14.0,
        Stage::GrainFill => (14.0 - 0.2 * (day - 110) as f64).max(2.0),
    };
    match stage(day) {
        Stage::GrainFill => Daily {
            dm_supply: SupplyPool {
                fixation: light,
                retranslocation: 0.02 * live.storage_wt,
                ..SupplyPool::zeroed()
            },
            n_supply: SupplyPool {
                retranslocation: 0.03 * live.n(),
                ..SupplyPool::zeroed()
            },
            ..zero()
        },
        _ => Daily {
            dm_demand: DemandPool::new(0.4 * light, 0.1 * light, 0.1 * light),
            dm_supply: SupplyPool {
                fixation: light,
                ..SupplyPool::zeroed()
            },
            n_demand: DemandPool::new(0.012 * light, 0.002 * light, 0.004 * light),
            ..zero()
        },
    }
}

fn stem_day(day: u32, live: &Biomass) -> Daily {
    match stage(day) {
        Stage::Vegetative => Daily {
            dm_demand: DemandPool::new(1.0, 0.5, 0.0),
            n_demand: DemandPool::new(0.006, 0.002, 0.0),
            ..zero()
        },
        Stage::Elongation => Daily {
            dm_demand: DemandPool::new(5.0, 3.0, 0.0),
            n_demand: DemandPool::new(0.025, 0.01, 0.0),
            ..zero()
        },
        Stage::GrainFill => Daily {
            dm_supply: SupplyPool {
                retranslocation: 0.04 * live.storage_wt,
                ..SupplyPool::zeroed()
            },
            n_supply: SupplyPool {
                retranslocation: 0.04 * live.storage_n,
                ..SupplyPool::zeroed()
            },
            ..zero()
        },
    }
}

fn root_day(day: u32, _live: &Biomass) -> Daily {
    let growth = if stage(day) == Stage::GrainFill { 0.2 } else { 1.5 };
    Daily {
        dm_demand: DemandPool::new(growth, 0.0, 0.0),
        n_demand: DemandPool::new(0.01 * growth, 0.0, 0.0),
        n_supply: SupplyPool {
            uptake: if stage(day) == Stage::GrainFill { 0.05 } else { 0.2 },
            ..SupplyPool::zeroed()
        },
        ..zero()
    }
}

fn grain_day(day: u32, _live: &Biomass) -> Daily {
    match stage(day) {
        Stage::GrainFill => Daily {
            dm_demand: DemandPool::new(12.0, 0.0, 0.0),
            n_demand: DemandPool::new(0.25, 0.0, 0.0),
            ..zero()
        },
        _ => zero(),
    }
}

// ── A phenology-driven organ ─────────────────────────────────────────────────

/// Refreshes a [`SimpleOrgan`]'s pools from its daily profile before each step.
struct Phased {
    inner: SimpleOrgan,
    day: u32,
    profile: fn(u32, &Biomass) -> Daily,
}

impl Phased {
    fn new(inner: SimpleOrgan, profile: fn(u32, &Biomass) -> Daily) -> Self {
        Self { inner, day: 0, profile }
    }
}

impl Organ for Phased {
    fn id(&self) -> OrganId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn demand_for(&mut self, resource: Resource) -> organ_arbitrator::Result<DemandPool> {
        if resource == Resource::DryMatter {
            let today = (self.profile)(self.day, &self.inner.total_biomass());
            self.inner.set_demand(Resource::DryMatter, today.dm_demand);
            self.inner.set_supply(Resource::DryMatter, today.dm_supply);
            self.inner.set_demand(Resource::Nitrogen, today.n_demand);
            self.inner.set_supply(Resource::Nitrogen, today.n_supply);
        }
        self.inner.demand_for(resource)
    }

    fn supply_for(&mut self, resource: Resource) -> organ_arbitrator::Result<SupplyPool> {
        self.inner.supply_for(resource)
    }

    fn accept_potential_allocation(&mut self, resource: Resource, allocation: AllocationPool) {
        self.inner.accept_potential_allocation(resource, allocation)
    }

    fn accept_final_allocation(&mut self, resource: Resource, allocation: AllocationPool) {
        self.inner.accept_final_allocation(resource, allocation);
        if resource == Resource::Nitrogen {
            self.day += 1;
        }
    }

    fn min_nitrogen_concentration(&self) -> f64 {
        self.inner.min_nitrogen_concentration()
    }

    fn nitrogen_fixation_cost(&self) -> f64 {
        self.inner.nitrogen_fixation_cost()
    }

    fn total_biomass(&self) -> Biomass {
        self.inner.total_biomass()
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Prints rows as tab-separated lines.
struct Stdout;

impl ReportWriter for Stdout {
    fn write_row(&mut self, simulation: &str, row: &ReportRow) {
        let cells: Vec<String> = row
            .values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => i.to_string(),
                Value::Real(x) => format!("{x:.4}"),
                Value::Text(s) => s.clone(),
            })
            .collect();
        println!("  {simulation}\t{}\t{}", row.table, cells.join("\t"));
    }
}

fn weekly(day: u32, report: &StepReport, arb: &Arbitrator) {
    let wt = |id| arb.organ(id).map_or(0.0, |o| o.total_biomass().wt());
    println!(
        "  day {:>3} {:<10} | leaf {:>7.1} stem {:>7.1} root {:>6.1} grain {:>7.1} g/m² | DM in {:>5.2} N in {:.3}",
        day + 1,
        format!("{:?}", stage(day)),
        wt(LEAF),
        wt(STEM),
        wt(ROOT),
        wt(GRAIN),
        report.received(Resource::DryMatter),
        report.received(Resource::Nitrogen),
    );
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<(), organ_arbitrator::ArbitrationError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    println!("Wheat season: {SEASON_DAYS} days, grain first in priority\n");

    let organs: Vec<BoxedOrgan> = vec![
        Box::new(Phased::new(
            SimpleOrgan::new(LEAF, "leaf").with_min_n_conc(0.015),
            leaf_day,
        )),
        Box::new(Phased::new(
            SimpleOrgan::new(STEM, "stem").with_min_n_conc(0.004),
            stem_day,
        )),
        Box::new(Phased::new(
            SimpleOrgan::new(ROOT, "root").with_min_n_conc(0.005),
            root_day,
        )),
        Box::new(Phased::new(
            SimpleOrgan::new(GRAIN, "grain").with_min_n_conc(0.018),
            grain_day,
        )),
    ];
    let config = ArbitratorConfig::with_priority(vec![GRAIN, LEAF, STEM, ROOT]);
    let mut arb = Arbitrator::new(config, organs)?;

    let print_rows = std::env::var_os("ROWS").is_some();
    let mut writer = Stdout;

    for day in 0..SEASON_DAYS {
        let report = arb.step()?;
        if day % 7 == 6 || day + 1 == SEASON_DAYS {
            weekly(day, &report, &arb);
        }
        if print_rows && day + 7 >= SEASON_DAYS {
            report.write_to("wheat", &mut writer);
        }
    }

    let grain = arb.organ(GRAIN).map(|o| o.total_biomass()).unwrap_or_default();
    println!(
        "\nHarvest: {:.1} g/m² grain at {:.2} % N",
        grain.wt(),
        100.0 * grain.n_conc()
    );
    Ok(())
}
