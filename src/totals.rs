//! Plant-level sums of organ demand and supply.
//!
//! Rebuilt from the step's snapshots every time; never updated incrementally.

use crate::organ::OrganSnapshot;
use crate::pool::{DemandPool, Resource, SupplyPool};

/// Summed demand and supply for one resource.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceTotals {
    /// Sum of every organ's demand pool.
    pub demand: DemandPool,
    /// Sum of every organ's supply pool.
    pub supply: SupplyPool,
}

impl ResourceTotals {
    fn add(&mut self, demand: &DemandPool, supply: &SupplyPool) {
        self.demand.structural += demand.structural;
        self.demand.storage += demand.storage;
        self.demand.metabolic += demand.metabolic;
        self.supply.fixation += supply.fixation;
        self.supply.reallocation += supply.reallocation;
        self.supply.uptake += supply.uptake;
        self.supply.retranslocation += supply.retranslocation;
    }
}

/// Plant totals for both resources.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlantTotals {
    /// Dry matter totals.
    pub dry_matter: ResourceTotals,
    /// Nitrogen totals.
    pub nitrogen: ResourceTotals,
}

impl PlantTotals {
    /// Sum snapshots in the order given.
    pub fn from_snapshots<'a, I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = &'a OrganSnapshot>,
    {
        let mut totals = Self::default();
        for snap in snapshots {
            for resource in Resource::ALL {
                let r = snap.resource(resource);
                totals.resource_mut(resource).add(&r.demand, &r.supply);
            }
        }
        totals
    }

    /// Totals for one resource.
    pub fn resource(&self, resource: Resource) -> &ResourceTotals {
        match resource {
            Resource::DryMatter => &self.dry_matter,
            Resource::Nitrogen => &self.nitrogen,
        }
    }

    fn resource_mut(&mut self, resource: Resource) -> &mut ResourceTotals {
        match resource {
            Resource::DryMatter => &mut self.dry_matter,
            Resource::Nitrogen => &mut self.nitrogen,
        }
    }
}
