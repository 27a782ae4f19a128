//! Integration tests for the per-step arbitration protocol.
//!
//! Run with: `cargo test`
//!
//! Organs are [`SimpleOrgan`]s unless a test needs to misbehave on purpose.

use std::sync::{Arc, Mutex};

use organ_arbitrator::{
    AllocationCategory, AllocationPool, AllocationStrategy, ArbitrationError, ArbitrationPhase,
    Arbitrator, ArbitratorConfig, Biomass, BoxedOrgan, CategoryStrategies, DemandPool, Organ,
    OrganId, Resource, SimpleOrgan, StepReport, SupplyCategory, SupplyPool,
};

// ─── helpers ─────────────────────────────────────────────────────────────────

const LEAF: OrganId = OrganId(1);
const STEM: OrganId = OrganId(2);
const ROOT: OrganId = OrganId(3);
const GRAIN: OrganId = OrganId(4);

fn dm_supply(fixation: f64, retranslocation: f64) -> SupplyPool {
    SupplyPool {
        fixation,
        retranslocation,
        ..SupplyPool::zeroed()
    }
}

fn wheat() -> Vec<SimpleOrgan> {
    vec![
        SimpleOrgan::new(LEAF, "leaf")
            .with_demand(Resource::DryMatter, DemandPool::new(4.0, 1.0, 1.0))
            .with_supply(Resource::DryMatter, dm_supply(14.0, 0.0))
            .with_demand(Resource::Nitrogen, DemandPool::new(0.12, 0.02, 0.04))
            .with_supply(
                Resource::Nitrogen,
                SupplyPool {
                    reallocation: 0.03,
                    retranslocation: 0.05,
                    ..SupplyPool::zeroed()
                },
            )
            .with_min_n_conc(0.01)
            .with_biomass(Biomass {
                structural_wt: 30.0,
                ..Biomass::zeroed()
            }),
        SimpleOrgan::new(STEM, "stem")
            .with_demand(Resource::DryMatter, DemandPool::new(3.0, 4.0, 0.0))
            .with_supply(Resource::DryMatter, dm_supply(0.0, 1.5))
            .with_demand(Resource::Nitrogen, DemandPool::new(0.03, 0.04, 0.0))
            .with_supply(
                Resource::Nitrogen,
                SupplyPool {
                    retranslocation: 0.04,
                    ..SupplyPool::zeroed()
                },
            )
            .with_min_n_conc(0.004)
            .with_biomass(Biomass {
                structural_wt: 50.0,
                storage_wt: 10.0,
                ..Biomass::zeroed()
            }),
        SimpleOrgan::new(ROOT, "root")
            .with_demand(Resource::DryMatter, DemandPool::new(2.0, 0.0, 0.0))
            .with_demand(Resource::Nitrogen, DemandPool::new(0.02, 0.0, 0.0))
            .with_supply(
                Resource::Nitrogen,
                SupplyPool {
                    uptake: 0.15,
                    ..SupplyPool::zeroed()
                },
            )
            .with_min_n_conc(0.005)
            .with_biomass(Biomass {
                structural_wt: 20.0,
                ..Biomass::zeroed()
            }),
        SimpleOrgan::new(GRAIN, "grain")
            .with_demand(Resource::DryMatter, DemandPool::new(6.0, 0.0, 0.0))
            .with_demand(Resource::Nitrogen, DemandPool::new(0.15, 0.0, 0.0))
            .with_min_n_conc(0.015),
    ]
}

fn boxed(organs: Vec<SimpleOrgan>) -> Vec<BoxedOrgan> {
    organs.into_iter().map(|o| Box::new(o) as BoxedOrgan).collect()
}

fn reproductive_first() -> Vec<OrganId> {
    vec![GRAIN, LEAF, STEM, ROOT]
}

fn arbitrator(config: ArbitratorConfig) -> Arbitrator {
    Arbitrator::new(config, boxed(wheat())).expect("valid plant")
}

/// Assert the capping and balance laws on a finished step.
fn assert_conserved(report: &StepReport) {
    for resource in Resource::ALL {
        let totals = report.totals.resource(resource);
        let drawn: f64 = [
            AllocationCategory::Reallocation,
            AllocationCategory::Uptake,
            AllocationCategory::Fixation,
            AllocationCategory::Retranslocation,
        ]
        .iter()
        .map(|c| report.category_total(resource, *c))
        .sum();
        let received = report.received(resource);
        assert!(
            (drawn - received).abs() < 1e-9,
            "{resource}: drawn {drawn} != received {received}"
        );
        for category in SupplyCategory::ALL {
            let used = report.category_total(resource, category.allocation_category());
            assert!(
                used <= totals.supply.get(category) + 1e-9,
                "{resource} {category}: used {used} > offered {}",
                totals.supply.get(category)
            );
        }
        for organ in &report.allocations {
            let pool = organ.resource(resource);
            for category in AllocationCategory::ALL {
                assert!(pool.get(category) >= 0.0, "{} {category} negative", organ.name);
            }
        }
    }
    let dm_fixed = report.category_total(Resource::DryMatter, AllocationCategory::Fixation);
    assert!(dm_fixed + report.respired <= report.totals.dry_matter.supply.fixation + 1e-9);
}

// ─── protocol ────────────────────────────────────────────────────────────────

#[test]
fn test_step_returns_to_idle_and_counts() {
    let mut arb = arbitrator(ArbitratorConfig::with_priority(reproductive_first()));
    assert_eq!(arb.phase(), ArbitrationPhase::Idle);
    arb.step().unwrap();
    arb.step().unwrap();
    assert_eq!(arb.phase(), ArbitrationPhase::Idle);
    assert_eq!(arb.steps(), 2);
}

#[test]
fn test_allocations_are_conserved() {
    let mut arb = arbitrator(ArbitratorConfig::with_priority(reproductive_first()));
    let report = arb.step().unwrap();
    assert_conserved(&report);
}

#[test]
fn test_priority_order_feeds_grain_first() {
    let mut arb = arbitrator(ArbitratorConfig::with_priority(reproductive_first()));
    let report = arb.step().unwrap();
    let grain = report.allocation(GRAIN).unwrap();
    let root = report.allocation(ROOT).unwrap();

    // Grain sits first in the order and gets its full dry matter request.
    assert!((grain.dry_matter.structural - 6.0).abs() < 1e-9);
    // Root sits last; 14 fixed + 1.5 retranslocated cannot cover 21 of demand.
    assert!(root.dry_matter.structural < 2.0);
}

#[test]
fn test_organs_accept_what_the_report_says() {
    let organs = wheat();
    let mut arb = Arbitrator::new(
        ArbitratorConfig::with_priority(reproductive_first()),
        boxed(organs),
    )
    .unwrap();
    let report = arb.step().unwrap();

    let grain = arb.organ(GRAIN).unwrap();
    let alloc = report.allocation(GRAIN).unwrap();
    // Grain started empty, so its stock is exactly this step's award.
    assert!((grain.total_biomass().wt() - alloc.dry_matter.received()).abs() < 1e-12);
    assert!((grain.total_biomass().n() - alloc.nitrogen.received()).abs() < 1e-12);
}

#[test]
fn test_nitrogen_retranslocation_is_donor_limited() {
    let mut arb = arbitrator(ArbitratorConfig::with_priority(reproductive_first()));
    let report = arb.step().unwrap();
    let n = &report.totals.nitrogen;
    let moved = report.category_total(Resource::Nitrogen, AllocationCategory::Retranslocation);

    let after_other_sources = n.supply.reallocation + n.supply.uptake + n.supply.fixation;
    let deficit = (n.demand.total() - after_other_sources).max(0.0);
    assert!(moved <= n.supply.retranslocation + 1e-12);
    assert!((moved - deficit.min(n.supply.retranslocation)).abs() < 1e-9);
}

/// What an organ was handed, in call order.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Handed {
    Potential(Resource, AllocationPool),
    /// Final pool, plus the potential pool the organ still held when it arrived.
    Final(Resource, AllocationPool, AllocationPool),
}

/// Records every allocation pushed to the wrapped organ.
struct Recorder {
    inner: SimpleOrgan,
    log: Arc<Mutex<Vec<Handed>>>,
}

impl Organ for Recorder {
    fn id(&self) -> OrganId {
        self.inner.id()
    }
    fn demand_for(&mut self, r: Resource) -> organ_arbitrator::Result<DemandPool> {
        self.inner.demand_for(r)
    }
    fn supply_for(&mut self, r: Resource) -> organ_arbitrator::Result<SupplyPool> {
        self.inner.supply_for(r)
    }
    fn accept_potential_allocation(&mut self, r: Resource, a: AllocationPool) {
        self.inner.accept_potential_allocation(r, a);
        self.log.lock().unwrap().push(Handed::Potential(r, a));
    }
    fn accept_final_allocation(&mut self, r: Resource, a: AllocationPool) {
        let held = self.inner.potential(r);
        self.inner.accept_final_allocation(r, a);
        self.log.lock().unwrap().push(Handed::Final(r, a, held));
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

#[test]
fn test_potential_growth_respects_nitrogen_cap() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let grain = Recorder {
        inner: SimpleOrgan::new(GRAIN, "grain")
            .with_demand(Resource::DryMatter, DemandPool::new(10.0, 0.0, 0.0))
            .with_demand(Resource::Nitrogen, DemandPool::new(0.2, 0.0, 0.0))
            .with_min_n_conc(0.02),
        log: Arc::clone(&log),
    };
    let leaf = SimpleOrgan::new(LEAF, "leaf")
        .with_demand(Resource::DryMatter, DemandPool::new(0.0, 5.0, 0.0))
        .with_supply(Resource::DryMatter, dm_supply(12.0, 0.0))
        .with_supply(
            Resource::Nitrogen,
            SupplyPool {
                retranslocation: 0.1,
                ..SupplyPool::zeroed()
            },
        );
    let organs: Vec<BoxedOrgan> = vec![Box::new(grain), Box::new(leaf)];
    let mut arb =
        Arbitrator::new(ArbitratorConfig::with_priority(vec![GRAIN, LEAF]), organs).unwrap();
    let report = arb.step().unwrap();

    let handed = log.lock().unwrap().clone();
    assert_eq!(handed.len(), 4);
    // Both advisory pools arrive before either final pool.
    assert!(matches!(handed[0], Handed::Potential(Resource::DryMatter, _)));
    assert!(matches!(handed[1], Handed::Potential(Resource::Nitrogen, _)));
    assert!(matches!(handed[2], Handed::Final(Resource::DryMatter, _, _)));
    assert!(matches!(handed[3], Handed::Final(Resource::Nitrogen, _, _)));

    // 0.1 g N at 2 % supports 5 g of new tissue, in the advisory pass too.
    let Handed::Potential(_, potential_dm) = handed[0] else {
        unreachable!()
    };
    let Handed::Potential(_, potential_n) = handed[1] else {
        unreachable!()
    };
    assert!((potential_n.received() - 0.1).abs() < 1e-9);
    assert!(potential_dm.structural <= 5.0 + 1e-9);
    assert!((potential_dm.structural - 5.0).abs() < 1e-9);

    let Handed::Final(_, final_dm, held) = handed[2] else {
        unreachable!()
    };
    assert_eq!(held, potential_dm);
    assert!((final_dm.structural - 5.0).abs() < 1e-9);
    assert_eq!(report.allocation(GRAIN).unwrap().dry_matter, final_dm);
}

// ─── failures ────────────────────────────────────────────────────────────────

#[test]
fn test_uninitialised_organ_aborts_step() {
    let mut organs = boxed(wheat());
    organs.push(Box::new(SimpleOrgan::uninitialised(OrganId(9), "pod")));
    let mut order = reproductive_first();
    order.push(OrganId(9));
    let mut arb = Arbitrator::new(ArbitratorConfig::with_priority(order), organs).unwrap();

    let err = arb.step().unwrap_err();
    assert_eq!(err, ArbitrationError::OrganUninitialized(OrganId(9)));
    assert_eq!(arb.phase(), ArbitrationPhase::Idle);
    assert_eq!(arb.steps(), 1);
    // Nobody grew.
    assert_eq!(arb.organ(GRAIN).unwrap().total_biomass(), Biomass::zeroed());
}

/// A stem whose retranslocation report turns to NaN on its second step.
struct Flaky {
    inner: SimpleOrgan,
    dm_queries: u32,
}

impl Organ for Flaky {
    fn id(&self) -> OrganId {
        self.inner.id()
    }
    fn demand_for(&mut self, r: Resource) -> organ_arbitrator::Result<DemandPool> {
        self.inner.demand_for(r)
    }
    fn supply_for(&mut self, r: Resource) -> organ_arbitrator::Result<SupplyPool> {
        let mut supply = self.inner.supply_for(r)?;
        if r == Resource::DryMatter {
            self.dm_queries += 1;
            if self.dm_queries == 2 {
                supply.retranslocation = f64::NAN;
            }
        }
        Ok(supply)
    }
    fn accept_potential_allocation(&mut self, r: Resource, a: AllocationPool) {
        self.inner.accept_potential_allocation(r, a)
    }
    fn accept_final_allocation(&mut self, r: Resource, a: AllocationPool) {
        self.inner.accept_final_allocation(r, a)
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

#[test]
fn test_invalid_supply_leaves_previous_allocation() {
    let mut organs = wheat();
    let stem = organs.remove(1);
    let mut organs = boxed(organs);
    organs.push(Box::new(Flaky {
        inner: stem,
        dm_queries: 0,
    }));
    let mut arb = Arbitrator::new(
        ArbitratorConfig::with_priority(reproductive_first()),
        organs,
    )
    .unwrap();

    arb.step().unwrap();
    let before: Vec<Biomass> = arb.organs().map(|o| o.total_biomass()).collect();

    let err = arb.step().unwrap_err();
    assert!(matches!(
        err,
        ArbitrationError::InvalidPoolValue {
            organ: STEM,
            resource: Resource::DryMatter,
            field: "supply.retranslocation",
            ..
        }
    ));
    let after: Vec<Biomass> = arb.organs().map(|o| o.total_biomass()).collect();
    assert_eq!(before, after);

    // The fault was transient; the next step succeeds again.
    arb.step().unwrap();
    assert_eq!(arb.steps(), 3);
}

/// An organ whose identity changes after it has been collected, as if it were
/// swapped out mid-step.
struct Shapeshifter {
    inner: SimpleOrgan,
    collected: bool,
}

impl Organ for Shapeshifter {
    fn id(&self) -> OrganId {
        if self.collected {
            OrganId(99)
        } else {
            self.inner.id()
        }
    }
    fn demand_for(&mut self, r: Resource) -> organ_arbitrator::Result<DemandPool> {
        self.inner.demand_for(r)
    }
    fn supply_for(&mut self, r: Resource) -> organ_arbitrator::Result<SupplyPool> {
        let supply = self.inner.supply_for(r)?;
        if r == Resource::Nitrogen {
            self.collected = true;
        }
        Ok(supply)
    }
    fn accept_potential_allocation(&mut self, r: Resource, a: AllocationPool) {
        self.inner.accept_potential_allocation(r, a)
    }
    fn accept_final_allocation(&mut self, r: Resource, a: AllocationPool) {
        self.inner.accept_final_allocation(r, a)
    }
    fn min_nitrogen_concentration(&self) -> f64 {
        0.0
    }
    fn nitrogen_fixation_cost(&self) -> f64 {
        0.0
    }
    fn total_biomass(&self) -> Biomass {
        self.inner.total_biomass()
    }
}

#[test]
fn test_organ_swapped_mid_step_is_unknown() {
    let mut organs = boxed(wheat());
    organs.push(Box::new(Shapeshifter {
        inner: SimpleOrgan::new(OrganId(5), "tiller")
            .with_demand(Resource::DryMatter, DemandPool::new(1.0, 0.0, 0.0)),
        collected: false,
    }));
    let mut order = reproductive_first();
    order.push(OrganId(5));
    let mut arb = Arbitrator::new(ArbitratorConfig::with_priority(order), organs).unwrap();

    assert_eq!(arb.step().unwrap_err(), ArbitrationError::UnknownOrgan(OrganId(99)));
    assert_eq!(arb.organ(GRAIN).unwrap().total_biomass(), Biomass::zeroed());
}

// ─── determinism ─────────────────────────────────────────────────────────────

#[test]
fn test_registration_order_does_not_matter() {
    let config = ArbitratorConfig {
        priority_order: reproductive_first(),
        dry_matter: CategoryStrategies::uniform(AllocationStrategy::Proportional),
        nitrogen: CategoryStrategies::uniform(AllocationStrategy::Proportional),
        ..ArbitratorConfig::default()
    };
    let mut forward = Arbitrator::new(config.clone(), boxed(wheat())).unwrap();
    let mut reversed_organs = wheat();
    reversed_organs.reverse();
    let mut backward = Arbitrator::new(config, boxed(reversed_organs)).unwrap();

    for _ in 0..5 {
        assert_eq!(forward.step().unwrap(), backward.step().unwrap());
    }
}

#[test]
fn test_repeat_runs_are_bit_identical() {
    let run = || {
        let mut arb = arbitrator(ArbitratorConfig::with_priority(reproductive_first()));
        (0..10).map(|_| arb.step().unwrap()).collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

// ─── long runs ───────────────────────────────────────────────────────────────

/// A leaf whose photosynthesis follows the day of year.
struct SeasonalLeaf {
    inner: SimpleOrgan,
    day: u32,
}

impl Organ for SeasonalLeaf {
    fn id(&self) -> OrganId {
        self.inner.id()
    }
    fn name(&self) -> &str {
        self.inner.name()
    }
    fn demand_for(&mut self, r: Resource) -> organ_arbitrator::Result<DemandPool> {
        self.inner.demand_for(r)
    }
    fn supply_for(&mut self, r: Resource) -> organ_arbitrator::Result<SupplyPool> {
        let mut supply = self.inner.supply_for(r)?;
        if r == Resource::DryMatter {
            supply.fixation = 20.0 * (self.day % 365) as f64 / 365.0;
        }
        Ok(supply)
    }
    fn accept_potential_allocation(&mut self, r: Resource, a: AllocationPool) {
        self.inner.accept_potential_allocation(r, a)
    }
    fn accept_final_allocation(&mut self, r: Resource, a: AllocationPool) {
        self.inner.accept_final_allocation(r, a);
        if r == Resource::Nitrogen {
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

#[test]
fn test_two_seasons_stay_conserved() {
    for strategy in [
        AllocationStrategy::PriorityOrdered,
        AllocationStrategy::Proportional,
        AllocationStrategy::SizeWeighted,
    ] {
        let config = ArbitratorConfig {
            priority_order: reproductive_first(),
            dry_matter: CategoryStrategies::uniform(strategy),
            nitrogen: CategoryStrategies::uniform(strategy),
            ..ArbitratorConfig::default()
        };
        let mut organs = wheat();
        let leaf = organs.remove(0);
        let mut organs = boxed(organs);
        organs.push(Box::new(SeasonalLeaf { inner: leaf, day: 0 }));
        let mut arb = Arbitrator::new(config, organs).unwrap();

        for _ in 0..730 {
            let report = arb.step().unwrap();
            assert_conserved(&report);
        }
        assert_eq!(arb.steps(), 730);
    }
}

#[test]
fn test_independent_plants_on_threads() {
    let plants: Vec<Arbitrator> = (0..4)
        .map(|_| arbitrator(ArbitratorConfig::with_priority(reproductive_first())))
        .collect();

    let reports: Vec<StepReport> = std::thread::scope(|scope| {
        let handles: Vec<_> = plants
            .into_iter()
            .map(|mut arb| scope.spawn(move || arb.step().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for r in &reports[1..] {
        assert_eq!(r, &reports[0]);
    }
}
