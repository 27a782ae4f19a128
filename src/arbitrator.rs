//! The per-step arbitration engine.
//!
//! # Step protocol
//!
//! ```text
//! Idle → CollectingDemand → CollectingSupply → ComputingPotential
//!      → DistributingPotential → ComputingFinal → DistributingFinal → Idle
//! ```
//!
//! Each resource is shared category by category in the fixed precedence
//! reallocation → uptake → fixation → retranslocation. Within a category the
//! growth tier (structural + metabolic) is served before storage, and the amount
//! consumed is drawn from donor organs in proportion to what they offered.
//!
//! Nitrogen couples back into dry matter twice:
//!
//! - fixing nitrogen costs dry matter (`respired`), paid out of the plant's dry
//!   matter fixation supply, which caps how much nitrogen can be fixed;
//! - an organ cannot build more structural + metabolic tissue than its awarded
//!   nitrogen supports at its minimum nitrogen concentration.
//!
//! Every allocation is computed and verified before the first
//! [`Organ::accept_final_allocation`] call, so a failed step leaves organs with
//! the allocation they last accepted.

use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, trace, warn};

use crate::error::{ArbitrationError, Result};
use crate::organ::{Organ, OrganId, OrganSnapshot};
use crate::pool::{AllocationCategory, AllocationPool, DemandPool, Resource, SupplyCategory};
use crate::report::{OrganAllocation, StepReport};
use crate::strategy::{self, AllocationStrategy, Awards, CategoryStrategies, Request};
use crate::totals::PlantTotals;

/// An organ owned by the arbitrator.
pub type BoxedOrgan = Box<dyn Organ + Send>;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Construction-time configuration for one plant's arbitrator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArbitratorConfig {
    /// Declared organ order. Must name every registered organ exactly once.
    ///
    /// Priority cascades serve organs in this order; residual correction lands
    /// on the last organ in it.
    pub priority_order: Vec<OrganId>,
    /// Strategy per supply category for dry matter.
    pub dry_matter: CategoryStrategies,
    /// Strategy per supply category for nitrogen.
    pub nitrogen: CategoryStrategies,
    /// Multiplier on each organ's nitrogen fixation cost (g DM per g N).
    pub fixation_cost_scale: f64,
    /// Relative tolerance for conservation checks.
    pub tolerance: f64,
}

impl ArbitratorConfig {
    /// Default strategies with the given organ order.
    pub fn with_priority(priority_order: Vec<OrganId>) -> Self {
        Self {
            priority_order,
            ..Self::default()
        }
    }

    /// Strategies for one resource.
    pub fn strategies(&self, resource: Resource) -> &CategoryStrategies {
        match resource {
            Resource::DryMatter => &self.dry_matter,
            Resource::Nitrogen => &self.nitrogen,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.fixation_cost_scale.is_finite() && self.fixation_cost_scale >= 0.0) {
            return Err(ArbitrationError::InvalidConfig(
                "fixation_cost_scale must be finite and non-negative",
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(ArbitrationError::InvalidConfig("tolerance must lie in (0, 1)"));
        }
        Ok(())
    }
}

impl Default for ArbitratorConfig {
    /// Priority order for every dry matter category and for nitrogen
    /// reallocation, uptake and fixation; nitrogen retranslocation is shared
    /// proportionally to deficit.
    fn default() -> Self {
        Self {
            priority_order: Vec::new(),
            dry_matter: CategoryStrategies::uniform(AllocationStrategy::PriorityOrdered),
            nitrogen: CategoryStrategies {
                retranslocation: AllocationStrategy::Proportional,
                ..CategoryStrategies::uniform(AllocationStrategy::PriorityOrdered)
            },
            fixation_cost_scale: 1.0,
            tolerance: 1e-9,
        }
    }
}

// ─── Phase ──────────────────────────────────────────────────────────────────

/// Where the engine is within a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArbitrationPhase {
    /// Between steps.
    Idle,
    /// Querying organ demand.
    CollectingDemand,
    /// Querying organ supply.
    CollectingSupply,
    /// Computing advisory allocations.
    ComputingPotential,
    /// Handing advisory allocations to organs.
    DistributingPotential,
    /// Computing authoritative allocations.
    ComputingFinal,
    /// Handing authoritative allocations to organs.
    DistributingFinal,
}

// ─── Arbitrator ─────────────────────────────────────────────────────────────

/// Owns one plant's organs and arbitrates their dry matter and nitrogen.
pub struct Arbitrator {
    /// Organs, stored in declared priority order.
    organs: Vec<BoxedOrgan>,
    config: ArbitratorConfig,
    phase: ArbitrationPhase,
    steps: u64,
}

/// Both resources' allocations for every organ, in declared order.
struct Allocations {
    dry_matter: Vec<AllocationPool>,
    nitrogen: Vec<AllocationPool>,
}

impl Arbitrator {
    /// Build an arbitrator for `organs`.
    ///
    /// Fails if two organs share an identity, if the priority order does not
    /// name each organ exactly once, or if a configuration scalar is out of range.
    pub fn new(config: ArbitratorConfig, organs: Vec<BoxedOrgan>) -> Result<Self> {
        config.validate()?;

        let mut by_id: HashMap<OrganId, BoxedOrgan> = HashMap::with_capacity(organs.len());
        for organ in organs {
            let id = organ.id();
            if by_id.insert(id, organ).is_some() {
                return Err(ArbitrationError::DuplicateOrgan(id));
            }
        }

        let mut seen = HashSet::with_capacity(config.priority_order.len());
        let mut ordered = Vec::with_capacity(by_id.len());
        for id in &config.priority_order {
            if !seen.insert(*id) {
                return Err(ArbitrationError::DuplicateOrgan(*id));
            }
            let organ = by_id
                .remove(id)
                .ok_or(ArbitrationError::MissingPriority(*id))?;
            ordered.push(organ);
        }
        if let Some(id) = by_id.keys().min() {
            return Err(ArbitrationError::MissingPriority(*id));
        }

        Ok(Self {
            organs: ordered,
            config,
            phase: ArbitrationPhase::Idle,
            steps: 0,
        })
    }

    /// Current protocol phase. Always [`ArbitrationPhase::Idle`] between steps.
    pub fn phase(&self) -> ArbitrationPhase {
        self.phase
    }

    /// Number of steps attempted so far, including failed ones.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The configuration this arbitrator was built with.
    pub fn config(&self) -> &ArbitratorConfig {
        &self.config
    }

    /// Organs in declared priority order.
    pub fn organs(&self) -> impl Iterator<Item = &(dyn Organ + Send)> + '_ {
        self.organs.iter().map(|o| o.as_ref())
    }

    /// Look up an organ by identity.
    pub fn organ(&self, id: OrganId) -> Option<&(dyn Organ + Send)> {
        self.organs().find(|o| o.id() == id)
    }

    /// Run one arbitration step.
    ///
    /// On error no organ has received a final allocation this step.
    pub fn step(&mut self) -> Result<StepReport> {
        self.steps += 1;
        let step = self.steps;
        debug!(step, organs = self.organs.len(), "arbitration step started");

        let result = self.run(step);
        let failed_in = self.phase;
        self.phase = ArbitrationPhase::Idle;

        match &result {
            Ok(report) => debug!(
                step,
                dm_received = report.received(Resource::DryMatter),
                n_received = report.received(Resource::Nitrogen),
                respired = report.respired,
                "arbitration step finished"
            ),
            Err(e) => warn!(step, phase = ?failed_in, error = %e, "arbitration step aborted"),
        }
        result
    }

    fn run(&mut self, step: u64) -> Result<StepReport> {
        self.phase = ArbitrationPhase::CollectingDemand;
        let mut snapshots = Vec::with_capacity(self.organs.len());
        for organ in self.organs.iter_mut() {
            snapshots.push(OrganSnapshot::collect_demand(organ.as_mut())?);
        }

        self.phase = ArbitrationPhase::CollectingSupply;
        for (organ, snap) in self.organs.iter_mut().zip(snapshots.iter_mut()) {
            snap.collect_supply(organ.as_mut())?;
        }
        let totals = PlantTotals::from_snapshots(&snapshots);
        debug!(
            step,
            dm_demand = totals.dry_matter.demand.total(),
            dm_supply = totals.dry_matter.supply.total(),
            n_demand = totals.nitrogen.demand.total(),
            n_supply = totals.nitrogen.supply.total(),
            "plant totals collected"
        );

        self.phase = ArbitrationPhase::ComputingPotential;
        let potential = self.compute_potential(&snapshots, &totals)?;

        self.phase = ArbitrationPhase::DistributingPotential;
        self.push(&snapshots, &potential, |organ, resource, allocation| {
            organ.accept_potential_allocation(resource, allocation)
        })?;

        self.phase = ArbitrationPhase::ComputingFinal;
        let fin = self.compute_final(&snapshots, &totals, &potential)?;

        self.phase = ArbitrationPhase::DistributingFinal;
        self.push(&snapshots, &fin, |organ, resource, allocation| {
            organ.accept_final_allocation(resource, allocation)
        })?;

        let allocations = self
            .organs
            .iter()
            .zip(fin.dry_matter.iter().zip(fin.nitrogen.iter()))
            .map(|(organ, (dm, n))| OrganAllocation {
                organ: organ.id(),
                name: organ.name().to_string(),
                dry_matter: *dm,
                nitrogen: *n,
            })
            .collect();

        Ok(StepReport {
            step,
            totals,
            respired: fin.dry_matter.iter().map(|a| a.respired).sum(),
            allocations,
        })
    }

    /// Hand every organ its pair of allocations, looked up by identity.
    ///
    /// All lookups succeed before the first organ is called.
    fn push(
        &mut self,
        snapshots: &[OrganSnapshot],
        allocations: &Allocations,
        accept: fn(&mut (dyn Organ + Send), Resource, AllocationPool),
    ) -> Result<()> {
        let index: HashMap<OrganId, usize> =
            snapshots.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let mut pending = Vec::with_capacity(self.organs.len());
        for organ in &self.organs {
            let id = organ.id();
            let i = *index.get(&id).ok_or(ArbitrationError::UnknownOrgan(id))?;
            let dm = allocations.dry_matter[i];
            let n = allocations.nitrogen[i];
            dm.validate(id, Resource::DryMatter)?;
            n.validate(id, Resource::Nitrogen)?;
            pending.push((dm, n));
        }
        for (organ, (dm, n)) in self.organs.iter_mut().zip(pending) {
            accept(organ.as_mut(), Resource::DryMatter, dm);
            accept(organ.as_mut(), Resource::Nitrogen, n);
        }
        Ok(())
    }

    /// Nitrogen first, with fixation limited by the dry matter it would cost;
    /// then dry matter, with growth demand capped by the nitrogen each organ
    /// was awarded.
    fn compute_potential(
        &self,
        snapshots: &[OrganSnapshot],
        totals: &PlantTotals,
    ) -> Result<Allocations> {
        let n_demand: Vec<DemandPool> = snapshots.iter().map(|s| s.nitrogen.demand).collect();
        let fixable = self.fixable_nitrogen(snapshots, totals);
        let nitrogen = self.share(
            Resource::Nitrogen,
            snapshots,
            totals,
            &n_demand,
            &[(SupplyCategory::Fixation, fixable)],
        )?;

        let capped = capped_demands(snapshots, &nitrogen);
        for (s, c) in snapshots.iter().zip(capped.iter()) {
            if c.growth() < s.dry_matter.demand.growth() {
                trace!(
                    organ = %s.id,
                    demand = s.dry_matter.demand.growth(),
                    limit = c.growth(),
                    "growth limited by nitrogen"
                );
            }
        }
        let dry_matter = self.share(Resource::DryMatter, snapshots, totals, &capped, &[])?;

        Ok(Allocations {
            dry_matter,
            nitrogen,
        })
    }

    /// Nitrogen is final once potential; dry matter is re-shared over the same
    /// nitrogen-capped demand with fixation supply reduced by respiration.
    fn compute_final(
        &self,
        snapshots: &[OrganSnapshot],
        totals: &PlantTotals,
        potential: &Allocations,
    ) -> Result<Allocations> {
        let nitrogen = potential.nitrogen.clone();

        let respired: Vec<f64> = snapshots
            .iter()
            .zip(nitrogen.iter())
            .map(|(s, n)| n.fixation * s.n_fixation_cost * self.config.fixation_cost_scale)
            .collect();
        let respired_total: f64 = respired.iter().sum();
        let dm_fixation = totals.dry_matter.supply.fixation;
        if respired_total > dm_fixation + strategy::slack(dm_fixation, self.config.tolerance) {
            return Err(ArbitrationError::ConservationViolation {
                resource: Resource::DryMatter,
                category: AllocationCategory::Respired,
                awarded: respired_total,
                available: dm_fixation,
            });
        }

        let capped = capped_demands(snapshots, &nitrogen);
        let mut dry_matter = self.share(
            Resource::DryMatter,
            snapshots,
            totals,
            &capped,
            &[(SupplyCategory::Fixation, (dm_fixation - respired_total).max(0.0))],
        )?;
        for (alloc, r) in dry_matter.iter_mut().zip(respired) {
            alloc.respired = r;
        }

        Ok(Allocations {
            dry_matter,
            nitrogen,
        })
    }

    /// Upper bound on nitrogen fixation so that its dry matter cost never
    /// exceeds the plant's dry matter fixation supply.
    ///
    /// Fixation is drawn from donors in proportion to their offer, so the cost
    /// per unit fixed is the offer-weighted mean cost.
    fn fixable_nitrogen(&self, snapshots: &[OrganSnapshot], totals: &PlantTotals) -> f64 {
        let offered = totals.nitrogen.supply.fixation;
        if offered <= 0.0 {
            return 0.0;
        }
        let weighted_cost: f64 = snapshots
            .iter()
            .map(|s| s.nitrogen.supply.fixation * s.n_fixation_cost)
            .sum::<f64>()
            * self.config.fixation_cost_scale;
        let unit_cost = weighted_cost / offered;
        if unit_cost <= 0.0 {
            return offered;
        }
        offered.min(totals.dry_matter.supply.fixation / unit_cost)
    }

    /// Share one resource across all supply categories.
    ///
    /// `limits` caps the available amount of specific categories below what
    /// organs offered.
    fn share(
        &self,
        resource: Resource,
        snapshots: &[OrganSnapshot],
        totals: &PlantTotals,
        demands: &[DemandPool],
        limits: &[(SupplyCategory, f64)],
    ) -> Result<Vec<AllocationPool>> {
        let strategies = self.config.strategies(resource);
        let tolerance = self.config.tolerance;
        let mut allocations = alloc::vec![AllocationPool::zeroed(); snapshots.len()];
        let mut remaining: Vec<DemandPool> = demands.to_vec();

        for category in SupplyCategory::ALL {
            let offered = totals.resource(resource).supply.get(category);
            let mut available = limits
                .iter()
                .find(|(c, _)| *c == category)
                .map_or(offered, |(_, limit)| offered.min(*limit));
            if resource == Resource::Nitrogen && category == SupplyCategory::Retranslocation {
                // Donor-limited: never move more than the deficit still open.
                let deficit: f64 = remaining.iter().map(DemandPool::total).sum();
                available = available.min(deficit);
            }
            if available <= 0.0 {
                continue;
            }

            let tier = Tier {
                resource,
                strategy: strategies.for_category(category),
                tolerance,
            };
            let used = tier.serve(available, snapshots, &mut remaining, &mut allocations)?;
            draw(
                resource,
                category,
                used,
                snapshots,
                &mut allocations,
                tolerance,
            )?;
            trace!(
                resource = resource.name(),
                category = category.allocation_category().name(),
                offered,
                available,
                used,
                "category shared"
            );
        }
        Ok(allocations)
    }
}

impl core::fmt::Debug for Arbitrator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arbitrator")
            .field("organs", &self.organs.len())
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("steps", &self.steps)
            .finish()
    }
}

/// Dry matter demand of every organ, capped by its awarded nitrogen.
fn capped_demands(snapshots: &[OrganSnapshot], nitrogen: &[AllocationPool]) -> Vec<DemandPool> {
    snapshots
        .iter()
        .zip(nitrogen.iter())
        .map(|(s, n)| nitrogen_limited_demand(s, n))
        .collect()
}

/// Growth demand scaled down to what the organ's awarded nitrogen supports.
///
/// Storage demand is left alone.
fn nitrogen_limited_demand(snap: &OrganSnapshot, nitrogen: &AllocationPool) -> DemandPool {
    let demand = snap.dry_matter.demand;
    let growth = demand.growth();
    if snap.min_n_conc <= 0.0 || growth <= 0.0 {
        return demand;
    }
    let supported = nitrogen.received() / snap.min_n_conc;
    if supported >= growth {
        return demand;
    }
    let ratio = supported / growth;
    DemandPool {
        structural: demand.structural * ratio,
        storage: demand.storage,
        metabolic: demand.metabolic * ratio,
    }
}

// ─── Receiver tiers ─────────────────────────────────────────────────────────

/// Which receiver demand a tier serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Receivers {
    /// Structural + metabolic.
    Growth,
    Storage,
}

impl Receivers {
    /// Allocation field named in errors raised while serving this tier.
    fn label(self) -> AllocationCategory {
        match self {
            Receivers::Growth => AllocationCategory::Structural,
            Receivers::Storage => AllocationCategory::Storage,
        }
    }
}

/// One strategy run per receiver tier for a single supply category.
struct Tier {
    resource: Resource,
    strategy: AllocationStrategy,
    tolerance: f64,
}

impl Tier {
    fn check(
        &self,
        receivers: Receivers,
        available: f64,
        requests: &[Request],
        awards: &Awards,
    ) -> Result<()> {
        strategy::verify(
            self.resource,
            receivers.label(),
            available,
            requests,
            awards,
            self.tolerance,
        )
    }

    /// Serve growth, then storage, from `available`. Returns the amount used.
    fn serve(
        &self,
        available: f64,
        snapshots: &[OrganSnapshot],
        remaining: &mut [DemandPool],
        allocations: &mut [AllocationPool],
    ) -> Result<f64> {
        let growth: Vec<Request> = snapshots
            .iter()
            .zip(remaining.iter())
            .map(|(s, d)| Request::new(s.id, d.growth()).with_weight(s.biomass_wt))
            .collect();
        let awards = self.strategy.distribute(available, &growth);
        self.check(Receivers::Growth, available, &growth, &awards)?;
        let growth_used = awards.total();
        for ((award, d), alloc) in awards
            .iter()
            .map(|(_, a)| a)
            .zip(remaining.iter_mut())
            .zip(allocations.iter_mut())
        {
            let (structural, metabolic) = split_growth(award, d);
            alloc.structural += structural;
            alloc.metabolic += metabolic;
            d.structural = (d.structural - structural).max(0.0);
            d.metabolic = (d.metabolic - metabolic).max(0.0);
        }

        let left = (available - growth_used).max(0.0);
        if left <= 0.0 {
            return Ok(growth_used);
        }
        let storage: Vec<Request> = snapshots
            .iter()
            .zip(remaining.iter())
            .map(|(s, d)| Request::new(s.id, d.storage).with_weight(s.biomass_wt))
            .collect();
        let awards = self.strategy.distribute(left, &storage);
        self.check(Receivers::Storage, left, &storage, &awards)?;
        for ((award, d), alloc) in awards
            .iter()
            .map(|(_, a)| a)
            .zip(remaining.iter_mut())
            .zip(allocations.iter_mut())
        {
            alloc.storage += award;
            d.storage = (d.storage - award).max(0.0);
        }
        Ok(growth_used + awards.total())
    }
}

/// Split a growth award between structural and metabolic demand in proportion
/// to what each still needs.
fn split_growth(award: f64, remaining: &DemandPool) -> (f64, f64) {
    let growth = remaining.growth();
    if award <= 0.0 || growth <= 0.0 {
        return (0.0, 0.0);
    }
    if award >= growth {
        return (remaining.structural, remaining.metabolic);
    }
    let structural = award * remaining.structural / growth;
    (structural, (award - structural).max(0.0))
}

/// Take `used` out of the donors of `category`, in proportion to their offer.
fn draw(
    resource: Resource,
    category: SupplyCategory,
    used: f64,
    snapshots: &[OrganSnapshot],
    allocations: &mut [AllocationPool],
    tolerance: f64,
) -> Result<()> {
    let offers: Vec<Request> = snapshots
        .iter()
        .map(|s| Request::new(s.id, s.resource(resource).supply.get(category)))
        .collect();
    let drawn = AllocationStrategy::Proportional.distribute(used, &offers);
    let label = category.allocation_category();
    strategy::verify(resource, label, used, &offers, &drawn, tolerance)?;
    for ((_, amount), alloc) in drawn.iter().zip(allocations.iter_mut()) {
        *alloc.get_mut(label) += amount;
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────
