//! The organ capability boundary.
//!
//! The arbitrator never looks inside an organ. Anything that can report demand
//! and supply for both resources, and accept the awards handed back, takes part
//! in arbitration by implementing [`Organ`].
//!
//! # Implementing an organ
//!
//! ```rust,ignore
//! use organ_arbitrator::organ::{Organ, OrganId};
//! use organ_arbitrator::pool::{AllocationPool, Biomass, DemandPool, Resource, SupplyPool};
//!
//! struct Grain { id: OrganId, live: Biomass, demand: DemandPool }
//!
//! impl Organ for Grain {
//!     fn id(&self) -> OrganId { self.id }
//!     fn demand_for(&mut self, r: Resource) -> organ_arbitrator::Result<DemandPool> {
//!         Ok(match r { Resource::DryMatter => self.demand, Resource::Nitrogen => DemandPool::zeroed() })
//!     }
//!     // ...
//! }
//! ```

use core::fmt;

use crate::error::Result;
use crate::pool::{check, AllocationPool, Biomass, DemandPool, Resource, SupplyPool};

/// Stable identity of an organ within one plant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrganId(pub u32);

impl fmt::Display for OrganId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Capability every arbitrated organ exposes.
///
/// Per step the arbitrator calls, for each resource: [`Organ::demand_for`] and
/// [`Organ::supply_for`] once, then [`Organ::accept_potential_allocation`] once,
/// then [`Organ::accept_final_allocation`] once. Zero demand and zero supply are
/// ordinary values, not errors.
pub trait Organ {
    /// Identity used for snapshots, priority order and reports.
    fn id(&self) -> OrganId;

    /// Human-readable organ name for reports. Empty by default, in which case
    /// reports fall back to the numeric identity.
    fn name(&self) -> &str {
        ""
    }

    /// Demand for `resource` this step.
    ///
    /// Fails only when the organ is not initialised
    /// ([`crate::ArbitrationError::OrganUninitialized`]).
    fn demand_for(&mut self, resource: Resource) -> Result<DemandPool>;

    /// Supply offered for `resource` this step. Same failure contract as
    /// [`Organ::demand_for`].
    fn supply_for(&mut self, resource: Resource) -> Result<SupplyPool>;

    /// Advisory allocation, delivered before the final pass.
    ///
    /// Must be idempotent: receiving the same pool twice leaves the organ in the
    /// same state as receiving it once.
    fn accept_potential_allocation(&mut self, resource: Resource, allocation: AllocationPool);

    /// Authoritative allocation. The organ applies it to its own stocks.
    fn accept_final_allocation(&mut self, resource: Resource, allocation: AllocationPool);

    /// Minimum nitrogen concentration of new growth (g N / g DM).
    fn min_nitrogen_concentration(&self) -> f64;

    /// Dry matter spent per unit of nitrogen fixed (g DM / g N).
    fn nitrogen_fixation_cost(&self) -> f64;

    /// Current standing biomass.
    fn total_biomass(&self) -> Biomass;
}

/// Demand and supply of one organ for one resource.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceSnapshot {
    /// Reported demand.
    pub demand: DemandPool,
    /// Reported supply.
    pub supply: SupplyPool,
}

/// Everything read from one organ during collection. Never persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrganSnapshot {
    /// Organ identity.
    pub id: OrganId,
    /// Dry matter demand and supply.
    pub dry_matter: ResourceSnapshot,
    /// Nitrogen demand and supply.
    pub nitrogen: ResourceSnapshot,
    /// Minimum nitrogen concentration of new growth.
    pub min_n_conc: f64,
    /// Dry matter cost per unit nitrogen fixed, before configuration scaling.
    pub n_fixation_cost: f64,
    /// Standing dry weight, used by size-weighted strategies.
    pub biomass_wt: f64,
}

impl OrganSnapshot {
    /// Query an organ's demand for both resources and its scalar attributes,
    /// validating every value it reports.
    pub fn collect_demand(organ: &mut dyn Organ) -> Result<Self> {
        let id = organ.id();
        let mut snap = Self {
            id,
            dry_matter: ResourceSnapshot::default(),
            nitrogen: ResourceSnapshot::default(),
            min_n_conc: organ.min_nitrogen_concentration(),
            n_fixation_cost: organ.nitrogen_fixation_cost(),
            biomass_wt: organ.total_biomass().wt(),
        };
        check(id, Resource::Nitrogen, "min_n_conc", snap.min_n_conc)?;
        check(id, Resource::Nitrogen, "n_fixation_cost", snap.n_fixation_cost)?;
        check(id, Resource::DryMatter, "biomass_wt", snap.biomass_wt)?;
        for resource in Resource::ALL {
            let demand = organ.demand_for(resource)?;
            demand.validate(id, resource)?;
            snap.resource_mut(resource).demand = demand;
        }
        Ok(snap)
    }

    /// Query the same organ's supply for both resources.
    pub fn collect_supply(&mut self, organ: &mut dyn Organ) -> Result<()> {
        for resource in Resource::ALL {
            let supply = organ.supply_for(resource)?;
            supply.validate(self.id, resource)?;
            self.resource_mut(resource).supply = supply;
        }
        Ok(())
    }

    /// Demand and supply for one resource.
    pub fn resource(&self, resource: Resource) -> &ResourceSnapshot {
        match resource {
            Resource::DryMatter => &self.dry_matter,
            Resource::Nitrogen => &self.nitrogen,
        }
    }

    fn resource_mut(&mut self, resource: Resource) -> &mut ResourceSnapshot {
        match resource {
            Resource::DryMatter => &mut self.dry_matter,
            Resource::Nitrogen => &mut self.nitrogen,
        }
    }
}
