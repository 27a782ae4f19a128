//! Reference organ with fixed, caller-set demand and supply.
//!
//! [`SimpleOrgan`] has no physiology of its own: the host sets its demand and
//! supply pools (for instance from a phenology table) before each step, and the
//! organ applies whatever the arbitrator awards to its biomass. It is the organ
//! used throughout this crate's tests and the `season` demo, and shows what a
//! production [`Organ`] implementation has to do.
//!
//! # Stock accounting
//!
//! On a final allocation, for each resource:
//!
//! - structural, storage and metabolic awards are added to the matching pool;
//! - retranslocation and reallocation are removed from storage first, then
//!   metabolic, then structural, never below zero;
//! - uptake, fixation and respiration do not change the organ's own stock.

use alloc::string::String;

use crate::error::{ArbitrationError, Result};
use crate::organ::{Organ, OrganId};
use crate::pool::{AllocationPool, Biomass, DemandPool, Resource, SupplyPool};

/// A plant organ whose demand and supply are set by the caller.
#[derive(Clone, Debug)]
pub struct SimpleOrgan {
    id: OrganId,
    name: String,
    initialised: bool,
    demand: [DemandPool; 2],
    supply: [SupplyPool; 2],
    potential: [AllocationPool; 2],
    allocated: [AllocationPool; 2],
    live: Biomass,
    min_n_conc: f64,
    n_fixation_cost: f64,
}

fn slot(resource: Resource) -> usize {
    match resource {
        Resource::DryMatter => 0,
        Resource::Nitrogen => 1,
    }
}

impl SimpleOrgan {
    /// An initialised organ with zero demand, supply and biomass.
    pub fn new(id: OrganId, name: &str) -> Self {
        Self {
            id,
            name: String::from(name),
            initialised: true,
            demand: [DemandPool::zeroed(); 2],
            supply: [SupplyPool::zeroed(); 2],
            potential: [AllocationPool::zeroed(); 2],
            allocated: [AllocationPool::zeroed(); 2],
            live: Biomass::zeroed(),
            min_n_conc: 0.0,
            n_fixation_cost: 0.0,
        }
    }

    /// An organ that fails every query until [`SimpleOrgan::initialise`] is called.
    pub fn uninitialised(id: OrganId, name: &str) -> Self {
        Self {
            initialised: false,
            ..Self::new(id, name)
        }
    }

    /// Mark the organ ready for arbitration.
    pub fn initialise(&mut self) {
        self.initialised = true;
    }

    /// Builder: set demand for one resource.
    pub fn with_demand(mut self, resource: Resource, demand: DemandPool) -> Self {
        self.set_demand(resource, demand);
        self
    }

    /// Builder: set supply for one resource.
    pub fn with_supply(mut self, resource: Resource, supply: SupplyPool) -> Self {
        self.set_supply(resource, supply);
        self
    }

    /// Builder: set the minimum nitrogen concentration of new growth.
    pub fn with_min_n_conc(mut self, min_n_conc: f64) -> Self {
        self.min_n_conc = min_n_conc;
        self
    }

    /// Builder: set the dry matter cost per unit nitrogen fixed.
    pub fn with_fixation_cost(mut self, cost: f64) -> Self {
        self.n_fixation_cost = cost;
        self
    }

    /// Builder: set the starting biomass.
    pub fn with_biomass(mut self, live: Biomass) -> Self {
        self.live = live;
        self
    }

    /// Replace the demand reported from the next step on.
    pub fn set_demand(&mut self, resource: Resource, demand: DemandPool) {
        self.demand[slot(resource)] = demand;
    }

    /// Replace the supply reported from the next step on.
    pub fn set_supply(&mut self, resource: Resource, supply: SupplyPool) {
        self.supply[slot(resource)] = supply;
    }

    /// Last advisory allocation received.
    pub fn potential(&self, resource: Resource) -> AllocationPool {
        self.potential[slot(resource)]
    }

    /// Last final allocation applied.
    pub fn allocated(&self, resource: Resource) -> AllocationPool {
        self.allocated[slot(resource)]
    }

    fn ready(&self) -> Result<()> {
        if self.initialised {
            Ok(())
        } else {
            Err(ArbitrationError::OrganUninitialized(self.id))
        }
    }
}

/// Remove `amount` from storage, then metabolic, then structural.
fn withdraw(storage: &mut f64, metabolic: &mut f64, structural: &mut f64, amount: f64) {
    let mut left = amount;
    for pool in [storage, metabolic, structural] {
        let take = left.min(*pool);
        *pool -= take;
        left -= take;
        if left <= 0.0 {
            break;
        }
    }
}

impl Organ for SimpleOrgan {
    fn id(&self) -> OrganId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn demand_for(&mut self, resource: Resource) -> Result<DemandPool> {
        self.ready()?;
        Ok(self.demand[slot(resource)])
    }

    fn supply_for(&mut self, resource: Resource) -> Result<SupplyPool> {
        self.ready()?;
        Ok(self.supply[slot(resource)])
    }

    fn accept_potential_allocation(&mut self, resource: Resource, allocation: AllocationPool) {
        self.potential[slot(resource)] = allocation;
    }

    fn accept_final_allocation(&mut self, resource: Resource, allocation: AllocationPool) {
        self.allocated[slot(resource)] = allocation;
        let out = allocation.retranslocation + allocation.reallocation;
        let live = &mut self.live;
        match resource {
            Resource::DryMatter => {
                live.structural_wt += allocation.structural;
                live.storage_wt += allocation.storage;
                live.metabolic_wt += allocation.metabolic;
                withdraw(
                    &mut live.storage_wt,
                    &mut live.metabolic_wt,
                    &mut live.structural_wt,
                    out,
                );
            }
            Resource::Nitrogen => {
                live.structural_n += allocation.structural;
                live.storage_n += allocation.storage;
                live.metabolic_n += allocation.metabolic;
                withdraw(
                    &mut live.storage_n,
                    &mut live.metabolic_n,
                    &mut live.structural_n,
                    out,
                );
            }
        }
    }

    fn min_nitrogen_concentration(&self) -> f64 {
        self.min_n_conc
    }

    fn nitrogen_fixation_cost(&self) -> f64 {
        self.n_fixation_cost
    }

    fn total_biomass(&self) -> Biomass {
        self.live
    }
}
