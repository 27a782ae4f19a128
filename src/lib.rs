//! # organ-arbitrator
//!
//! Plant organ arbitration: once per simulation step, share the plant's dry
//! matter and nitrogen between competing organs.
//!
//! ---
//!
//! Each organ reports what it wants (demand: structural, storage, metabolic) and
//! what it can give (supply: fixation, reallocation, uptake, retranslocation) for
//! both resources. The [`Arbitrator`] reduces those vectors to plant totals,
//! shares every supply category between the organs that still need it, and hands
//! each organ an eight-field allocation back.
//!
//! Nothing allocated exceeds what exists or what was asked for, and the outcome
//! depends only on the organs' reports and the declared organ order.
//!
//! ## The step
//!
//! ```text
//! organs ──demand/supply──▶ OrganSnapshot ──▶ PlantTotals
//!                                                  │
//!                        AllocationStrategy ◀──────┤ per (resource, category)
//!                                                  ▼
//! organs ◀──potential──── Arbitrator ────final──▶ organs ──▶ StepReport
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`pool`] | [`DemandPool`], [`SupplyPool`], [`AllocationPool`], [`Biomass`] | Value records for one resource in one phase |
//! | [`organ`] | [`Organ`], [`OrganId`], [`OrganSnapshot`] | The capability every organ implements |
//! | [`strategy`] | [`AllocationStrategy`], [`CategoryStrategies`] | Priority, proportional and size-weighted sharing, plus law checks |
//! | [`totals`] | [`PlantTotals`] | Plant-level sums rebuilt every step |
//! | [`arbitrator`] | [`Arbitrator`], [`ArbitratorConfig`], [`ArbitrationPhase`] | The per-step state machine |
//! | [`report`] | [`StepReport`], [`ReportRow`], [`ReportWriter`] | Step outcome and rows for a storage collaborator |
//! | [`simple`] | [`SimpleOrgan`] | Reference organ with caller-set demand and supply |
//!
//! ## Quick start
//!
//! ```rust
//! use organ_arbitrator::{Arbitrator, ArbitratorConfig, BoxedOrgan, DemandPool, OrganId,
//!     Resource, SimpleOrgan, SupplyPool};
//!
//! let leaf = SimpleOrgan::new(OrganId(1), "leaf")
//!     .with_supply(Resource::DryMatter, SupplyPool { fixation: 10.0, ..SupplyPool::zeroed() })
//!     .with_demand(Resource::DryMatter, DemandPool::new(7.0, 0.0, 0.0));
//! let grain = SimpleOrgan::new(OrganId(2), "grain")
//!     .with_demand(Resource::DryMatter, DemandPool::new(8.0, 0.0, 0.0));
//!
//! let organs: Vec<BoxedOrgan> = vec![Box::new(leaf), Box::new(grain)];
//! let config = ArbitratorConfig::with_priority(vec![OrganId(2), OrganId(1)]);
//! let mut arbitrator = Arbitrator::new(config, organs).unwrap();
//!
//! let report = arbitrator.step().unwrap();
//! assert_eq!(report.allocation(OrganId(2)).unwrap().dry_matter.structural, 8.0);
//! assert_eq!(report.allocation(OrganId(1)).unwrap().dry_matter.structural, 2.0);
//! ```
//!
//! ## `no_std`
//!
//! The crate is `#![no_std]` and needs only `alloc`. Enable `std` to switch the
//! `std` features of `thiserror` and `tracing` on, and `serde` to derive
//! serialisation for pools, configuration and reports.
//!
//! ## Logging
//!
//! Steps emit `tracing` events (`debug` per step, `trace` per category, `warn`
//! on abort). The crate never installs a subscriber.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod arbitrator;
pub mod error;
pub mod organ;
pub mod pool;
pub mod report;
pub mod simple;
pub mod strategy;
pub mod totals;

pub use arbitrator::{ArbitrationPhase, Arbitrator, ArbitratorConfig, BoxedOrgan};
pub use error::{ArbitrationError, Result};
pub use organ::{Organ, OrganId, OrganSnapshot};
pub use pool::{
    AllocationCategory, AllocationPool, Biomass, DemandPool, Resource, SupplyCategory, SupplyPool,
};
pub use report::{ReportRow, ReportWriter, StepReport};
pub use simple::SimpleOrgan;
pub use strategy::{AllocationStrategy, CategoryStrategies};
pub use totals::PlantTotals;
