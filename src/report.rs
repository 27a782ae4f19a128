//! Step reports and tabular rows for a storage collaborator.
//!
//! The arbitrator returns a [`StepReport`] from every successful step. Whoever
//! records simulation output turns it into [`ReportRow`]s and forwards them to
//! an implementation of [`ReportWriter`]. The arbitrator itself never writes.
//!
//! # Tables
//!
//! | Table | One row per | Columns |
//! |-------|-------------|---------|
//! | [`ALLOCATION_TABLE`] | organ × resource | step, organ, resource, the eight allocation fields |
//! | [`TOTALS_TABLE`] | resource | step, resource, demand and supply fields |

use alloc::string::String;
use alloc::vec::Vec;

use crate::organ::OrganId;
use crate::pool::{AllocationCategory, AllocationPool, Resource};
use crate::totals::PlantTotals;

/// Table name for per-organ allocation rows.
pub const ALLOCATION_TABLE: &str = "OrganAllocation";

/// Table name for plant total rows.
pub const TOTALS_TABLE: &str = "PlantTotals";

/// Unit of every mass column.
pub const MASS_UNIT: &str = "g/m^2";

/// Final allocations of one organ.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrganAllocation {
    /// Organ identity.
    pub organ: OrganId,
    /// Organ name, possibly empty.
    pub name: String,
    /// Final dry matter allocation.
    pub dry_matter: AllocationPool,
    /// Final nitrogen allocation.
    pub nitrogen: AllocationPool,
}

impl OrganAllocation {
    /// Allocation for one resource.
    pub fn resource(&self, resource: Resource) -> &AllocationPool {
        match resource {
            Resource::DryMatter => &self.dry_matter,
            Resource::Nitrogen => &self.nitrogen,
        }
    }

    fn label(&self) -> String {
        if self.name.is_empty() {
            alloc::format!("{}", self.organ)
        } else {
            self.name.clone()
        }
    }
}

/// Outcome of one successful arbitration step.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepReport {
    /// 1-based step number.
    pub step: u64,
    /// Plant totals collected at the start of the step.
    pub totals: PlantTotals,
    /// Dry matter respired paying for nitrogen fixation.
    pub respired: f64,
    /// Final allocations, in declared priority order.
    pub allocations: Vec<OrganAllocation>,
}

impl StepReport {
    /// Allocations of one organ.
    pub fn allocation(&self, organ: OrganId) -> Option<&OrganAllocation> {
        self.allocations.iter().find(|a| a.organ == organ)
    }

    /// Structural + storage + metabolic summed over organs for one resource.
    pub fn received(&self, resource: Resource) -> f64 {
        self.allocations
            .iter()
            .map(|a| a.resource(resource).received())
            .sum()
    }

    /// Sum of one allocation field over organs.
    pub fn category_total(&self, resource: Resource, category: AllocationCategory) -> f64 {
        self.allocations
            .iter()
            .map(|a| a.resource(resource).get(category))
            .sum()
    }

    /// Flatten the report into table rows: allocation rows first, in declared
    /// organ order, then one totals row per resource.
    pub fn rows(&self) -> Vec<ReportRow> {
        let mut rows = Vec::with_capacity(self.allocations.len() * 2 + 2);

        let mut columns: Vec<String> = ["Step", "Organ", "Resource"]
            .iter()
            .map(|c| String::from(*c))
            .collect();
        columns.extend(AllocationCategory::ALL.iter().map(|c| String::from(c.name())));
        let mut units: Vec<String> = ["", "", ""].iter().map(|u| String::from(*u)).collect();
        units.extend(AllocationCategory::ALL.iter().map(|_| String::from(MASS_UNIT)));

        for organ in &self.allocations {
            for resource in Resource::ALL {
                let pool = organ.resource(resource);
                let mut values = alloc::vec![
                    Value::Integer(self.step),
                    Value::Text(organ.label()),
                    Value::Text(String::from(resource.name())),
                ];
                values.extend(AllocationCategory::ALL.iter().map(|c| Value::Real(pool.get(*c))));
                rows.push(ReportRow {
                    table: ALLOCATION_TABLE,
                    columns: columns.clone(),
                    units: units.clone(),
                    values,
                });
            }
        }

        let totals_columns: Vec<String> = [
            "Step",
            "Resource",
            "demand.structural",
            "demand.storage",
            "demand.metabolic",
            "supply.fixation",
            "supply.reallocation",
            "supply.uptake",
            "supply.retranslocation",
        ]
        .iter()
        .map(|c| String::from(*c))
        .collect();
        let mut totals_units: Vec<String> = ["", ""].iter().map(|u| String::from(*u)).collect();
        totals_units.extend((0..7).map(|_| String::from(MASS_UNIT)));

        for resource in Resource::ALL {
            let t = self.totals.resource(resource);
            rows.push(ReportRow {
                table: TOTALS_TABLE,
                columns: totals_columns.clone(),
                units: totals_units.clone(),
                values: alloc::vec![
                    Value::Integer(self.step),
                    Value::Text(String::from(resource.name())),
                    Value::Real(t.demand.structural),
                    Value::Real(t.demand.storage),
                    Value::Real(t.demand.metabolic),
                    Value::Real(t.supply.fixation),
                    Value::Real(t.supply.reallocation),
                    Value::Real(t.supply.uptake),
                    Value::Real(t.supply.retranslocation),
                ],
            });
        }
        rows
    }

    /// Forward every row to `writer` under `simulation`.
    pub fn write_to<W: ReportWriter + ?Sized>(&self, simulation: &str, writer: &mut W) {
        for row in self.rows() {
            writer.write_row(simulation, &row);
        }
    }
}

/// A single cell value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// Whole number (step counters).
    Integer(u64),
    /// Mass or concentration.
    Real(f64),
    /// Names.
    Text(String),
}

/// One row destined for a named table.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReportRow {
    /// Target table.
    pub table: &'static str,
    /// Column names.
    pub columns: Vec<String>,
    /// Column units, parallel to `columns`.
    pub units: Vec<String>,
    /// Cell values, parallel to `columns`.
    pub values: Vec<Value>,
}

/// Sink for report rows, implemented by a storage collaborator.
pub trait ReportWriter {
    /// Record one row for `simulation`.
    fn write_row(&mut self, simulation: &str, row: &ReportRow);
}
