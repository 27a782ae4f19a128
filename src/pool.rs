//! Resource pools exchanged between organs and the arbitrator.
//!
//! Three plain value records carry one resource for one phase of a step:
//!
//! - [`DemandPool`]: what an organ asks for (structural, storage, metabolic).
//! - [`SupplyPool`]: what an organ can contribute (fixation, reallocation, uptake,
//!   retranslocation).
//! - [`AllocationPool`]: what the arbitrator awards, across all eight categories.
//!
//! All three are `Copy`. The arbitrator hands organs a fresh copy of every
//! allocation so the potential and final passes never alias each other.
//!
//! # Invariants
//!
//! - Every field is finite and ≥ 0; `validate` rejects anything else with
//!   [`ArbitrationError::InvalidPoolValue`].
//! - `zeroed()` and `clear()` produce the same all-zero record.

use core::fmt;

use crate::error::{ArbitrationError, Result};
use crate::organ::OrganId;

// ─── Resource & categories ──────────────────────────────────────────────────

/// The two plant-wide resources under arbitration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Resource {
    /// Dry matter (carbon), g/m².
    DryMatter,
    /// Nitrogen, g/m².
    Nitrogen,
}

impl Resource {
    /// Both resources, in the order they are arbitrated.
    pub const ALL: [Resource; 2] = [Resource::DryMatter, Resource::Nitrogen];

    /// Short lower-case name used in logs and report tables.
    pub fn name(self) -> &'static str {
        match self {
            Resource::DryMatter => "dry_matter",
            Resource::Nitrogen => "nitrogen",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supply categories, in the precedence they are drawn on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SupplyCategory {
    /// Resource released by senescing tissue.
    Reallocation,
    /// Resource taken up from the soil.
    Uptake,
    /// De novo acquisition (photosynthesis for dry matter, symbiosis for nitrogen).
    Fixation,
    /// Resource moved out of live storage in a donor organ.
    Retranslocation,
}

impl SupplyCategory {
    /// All supply categories in distribution precedence.
    pub const ALL: [SupplyCategory; 4] = [
        SupplyCategory::Reallocation,
        SupplyCategory::Uptake,
        SupplyCategory::Fixation,
        SupplyCategory::Retranslocation,
    ];

    /// The allocation field that records how much a donor gave from this category.
    pub fn allocation_category(self) -> AllocationCategory {
        match self {
            SupplyCategory::Reallocation => AllocationCategory::Reallocation,
            SupplyCategory::Uptake => AllocationCategory::Uptake,
            SupplyCategory::Fixation => AllocationCategory::Fixation,
            SupplyCategory::Retranslocation => AllocationCategory::Retranslocation,
        }
    }
}

impl fmt::Display for SupplyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.allocation_category().fmt(f)
    }
}

/// The eight fields of an [`AllocationPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AllocationCategory {
    /// Awarded to structural growth.
    Structural,
    /// Awarded to reserves.
    Storage,
    /// Awarded to metabolic (active) tissue.
    Metabolic,
    /// Drawn from the organ by retranslocation.
    Retranslocation,
    /// Drawn from the organ's senescing tissue.
    Reallocation,
    /// Dry matter lost paying for nitrogen fixation.
    Respired,
    /// Taken up through the organ.
    Uptake,
    /// Fixed by the organ.
    Fixation,
}

impl AllocationCategory {
    /// All categories in [`AllocationPool`] field order.
    pub const ALL: [AllocationCategory; 8] = [
        AllocationCategory::Structural,
        AllocationCategory::Storage,
        AllocationCategory::Metabolic,
        AllocationCategory::Retranslocation,
        AllocationCategory::Reallocation,
        AllocationCategory::Respired,
        AllocationCategory::Uptake,
        AllocationCategory::Fixation,
    ];

    /// Field name, as used in errors and report columns.
    pub fn name(self) -> &'static str {
        match self {
            AllocationCategory::Structural => "structural",
            AllocationCategory::Storage => "storage",
            AllocationCategory::Metabolic => "metabolic",
            AllocationCategory::Retranslocation => "retranslocation",
            AllocationCategory::Reallocation => "reallocation",
            AllocationCategory::Respired => "respired",
            AllocationCategory::Uptake => "uptake",
            AllocationCategory::Fixation => "fixation",
        }
    }
}

impl fmt::Display for AllocationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn check(
    organ: OrganId,
    resource: Resource,
    field: &'static str,
    value: f64,
) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ArbitrationError::InvalidPoolValue {
            organ,
            resource,
            field,
            value,
        })
    }
}

// ─── DemandPool ─────────────────────────────────────────────────────────────

/// An organ's request for one resource.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DemandPool {
    /// Demand for structural tissue.
    pub structural: f64,
    /// Demand for reserves.
    pub storage: f64,
    /// Demand for metabolic tissue.
    pub metabolic: f64,
}

impl DemandPool {
    /// All-zero demand.
    pub const fn zeroed() -> Self {
        Self {
            structural: 0.0,
            storage: 0.0,
            metabolic: 0.0,
        }
    }

    /// Construct from the three demand components.
    pub const fn new(structural: f64, storage: f64, metabolic: f64) -> Self {
        Self {
            structural,
            storage,
            metabolic,
        }
    }

    /// Reset every field to zero.
    pub fn clear(&mut self) {
        *self = Self::zeroed();
    }

    /// Structural plus metabolic demand: the part that builds new tissue.
    pub fn growth(&self) -> f64 {
        self.structural + self.metabolic
    }

    /// Sum of all three components.
    pub fn total(&self) -> f64 {
        self.structural + self.storage + self.metabolic
    }

    /// Reject negative or non-finite components.
    pub fn validate(&self, organ: OrganId, resource: Resource) -> Result<()> {
        check(organ, resource, "demand.structural", self.structural)?;
        check(organ, resource, "demand.storage", self.storage)?;
        check(organ, resource, "demand.metabolic", self.metabolic)
    }
}

// ─── SupplyPool ─────────────────────────────────────────────────────────────

/// An organ's contribution offer for one resource.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SupplyPool {
    /// Fixation supply.
    pub fixation: f64,
    /// Reallocation supply.
    pub reallocation: f64,
    /// Uptake supply.
    pub uptake: f64,
    /// Retranslocation supply.
    pub retranslocation: f64,
}

impl SupplyPool {
    /// All-zero supply.
    pub const fn zeroed() -> Self {
        Self {
            fixation: 0.0,
            reallocation: 0.0,
            uptake: 0.0,
            retranslocation: 0.0,
        }
    }

    /// Reset every field to zero.
    pub fn clear(&mut self) {
        *self = Self::zeroed();
    }

    /// Amount offered in one category.
    pub fn get(&self, category: SupplyCategory) -> f64 {
        match category {
            SupplyCategory::Reallocation => self.reallocation,
            SupplyCategory::Uptake => self.uptake,
            SupplyCategory::Fixation => self.fixation,
            SupplyCategory::Retranslocation => self.retranslocation,
        }
    }

    /// Mutable access to one category.
    pub fn get_mut(&mut self, category: SupplyCategory) -> &mut f64 {
        match category {
            SupplyCategory::Reallocation => &mut self.reallocation,
            SupplyCategory::Uptake => &mut self.uptake,
            SupplyCategory::Fixation => &mut self.fixation,
            SupplyCategory::Retranslocation => &mut self.retranslocation,
        }
    }

    /// Sum over all categories.
    pub fn total(&self) -> f64 {
        self.fixation + self.reallocation + self.uptake + self.retranslocation
    }

    /// Reject negative or non-finite components.
    pub fn validate(&self, organ: OrganId, resource: Resource) -> Result<()> {
        check(organ, resource, "supply.fixation", self.fixation)?;
        check(organ, resource, "supply.reallocation", self.reallocation)?;
        check(organ, resource, "supply.uptake", self.uptake)?;
        check(organ, resource, "supply.retranslocation", self.retranslocation)
    }
}

// ─── AllocationPool ─────────────────────────────────────────────────────────

/// The award one organ receives for one resource.
///
/// `structural`, `storage` and `metabolic` are received by the organ.
/// `retranslocation`, `reallocation`, `uptake` and `fixation` record how much was
/// drawn through the organ's own supply. `respired` is dry matter burnt paying
/// for the nitrogen the organ fixed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocationPool {
    /// Structural award.
    pub structural: f64,
    /// Storage award.
    pub storage: f64,
    /// Metabolic award.
    pub metabolic: f64,
    /// Retranslocated out of this organ.
    pub retranslocation: f64,
    /// Reallocated out of this organ.
    pub reallocation: f64,
    /// Respired to pay for fixation.
    pub respired: f64,
    /// Taken up through this organ.
    pub uptake: f64,
    /// Fixed by this organ.
    pub fixation: f64,
}

impl AllocationPool {
    /// All-zero allocation.
    pub const fn zeroed() -> Self {
        Self {
            structural: 0.0,
            storage: 0.0,
            metabolic: 0.0,
            retranslocation: 0.0,
            reallocation: 0.0,
            respired: 0.0,
            uptake: 0.0,
            fixation: 0.0,
        }
    }

    /// Reset every field to zero.
    pub fn clear(&mut self) {
        *self = Self::zeroed();
    }

    /// Value of one field.
    pub fn get(&self, category: AllocationCategory) -> f64 {
        match category {
            AllocationCategory::Structural => self.structural,
            AllocationCategory::Storage => self.storage,
            AllocationCategory::Metabolic => self.metabolic,
            AllocationCategory::Retranslocation => self.retranslocation,
            AllocationCategory::Reallocation => self.reallocation,
            AllocationCategory::Respired => self.respired,
            AllocationCategory::Uptake => self.uptake,
            AllocationCategory::Fixation => self.fixation,
        }
    }

    /// Mutable access to one field.
    pub fn get_mut(&mut self, category: AllocationCategory) -> &mut f64 {
        match category {
            AllocationCategory::Structural => &mut self.structural,
            AllocationCategory::Storage => &mut self.storage,
            AllocationCategory::Metabolic => &mut self.metabolic,
            AllocationCategory::Retranslocation => &mut self.retranslocation,
            AllocationCategory::Reallocation => &mut self.reallocation,
            AllocationCategory::Respired => &mut self.respired,
            AllocationCategory::Uptake => &mut self.uptake,
            AllocationCategory::Fixation => &mut self.fixation,
        }
    }

    /// Structural + storage + metabolic: what the organ actually gains.
    pub fn received(&self) -> f64 {
        self.structural + self.storage + self.metabolic
    }

    /// Sum of all eight fields.
    pub fn total(&self) -> f64 {
        AllocationCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }

    /// Reject negative or non-finite fields.
    pub fn validate(&self, organ: OrganId, resource: Resource) -> Result<()> {
        for category in AllocationCategory::ALL {
            check(organ, resource, category.name(), self.get(category))?;
        }
        Ok(())
    }
}

// ─── Biomass ────────────────────────────────────────────────────────────────

/// Standing biomass of an organ: dry weight and nitrogen by pool.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Biomass {
    /// Structural dry weight.
    pub structural_wt: f64,
    /// Storage dry weight.
    pub storage_wt: f64,
    /// Metabolic dry weight.
    pub metabolic_wt: f64,
    /// Structural nitrogen.
    pub structural_n: f64,
    /// Storage nitrogen.
    pub storage_n: f64,
    /// Metabolic nitrogen.
    pub metabolic_n: f64,
}

impl Biomass {
    /// Empty biomass.
    pub const fn zeroed() -> Self {
        Self {
            structural_wt: 0.0,
            storage_wt: 0.0,
            metabolic_wt: 0.0,
            structural_n: 0.0,
            storage_n: 0.0,
            metabolic_n: 0.0,
        }
    }

    /// Total dry weight.
    pub fn wt(&self) -> f64 {
        self.structural_wt + self.storage_wt + self.metabolic_wt
    }

    /// Total nitrogen.
    pub fn n(&self) -> f64 {
        self.structural_n + self.storage_n + self.metabolic_n
    }

    /// Nitrogen concentration (g N / g DM); zero for an empty organ.
    pub fn n_conc(&self) -> f64 {
        let wt = self.wt();
        if wt > 0.0 {
            self.n() / wt
        } else {
            0.0
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
