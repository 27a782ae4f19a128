//! Error taxonomy for a single arbitration step.
//!
//! Every variant is fatal for the step that raised it. Nothing is retried or
//! clamped internally; the caller decides what to do with the simulation run.

use thiserror::Error;

use crate::organ::OrganId;
use crate::pool::{AllocationCategory, Resource};

/// Errors raised while building an [`crate::arbitrator::Arbitrator`] or running a step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArbitrationError {
    /// A demand, supply or allocation field was negative, NaN or infinite.
    #[error("invalid {resource} value for organ {organ}: {field} = {value}")]
    InvalidPoolValue {
        /// Organ that reported the value.
        organ: OrganId,
        /// Resource the pool belongs to.
        resource: Resource,
        /// Name of the offending pool field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Awards for one category sum to more than was available, or fall short of
    /// it while requests exceed it.
    #[error("{resource} {category}: awarded {awarded} does not balance available {available}")]
    ConservationViolation {
        /// Resource being distributed.
        resource: Resource,
        /// Category being distributed.
        category: AllocationCategory,
        /// Sum of awards.
        awarded: f64,
        /// Plant-level available amount.
        available: f64,
    },

    /// A single organ was awarded more than it asked for, or a negative amount.
    #[error("{resource} {category}: organ {organ} awarded {awarded} but requested {requested}")]
    AwardExceedsRequest {
        /// Organ receiving the award.
        organ: OrganId,
        /// Resource being distributed.
        resource: Resource,
        /// Category being distributed.
        category: AllocationCategory,
        /// Amount awarded.
        awarded: f64,
        /// Amount requested.
        requested: f64,
    },

    /// An award referenced an organ absent from the current collection snapshot.
    #[error("award references unknown organ {0}")]
    UnknownOrgan(OrganId),

    /// An organ was queried before its physiological state was initialised.
    #[error("organ {0} is not initialised")]
    OrganUninitialized(OrganId),

    /// Two registered organs share an identity, or the priority order names
    /// one organ twice.
    #[error("organ {0} appears twice")]
    DuplicateOrgan(OrganId),

    /// A registered organ is missing from the declared priority order,
    /// or the order names an organ that was never registered.
    #[error("priority order does not match registered organs at {0}")]
    MissingPriority(OrganId),

    /// A configuration scalar is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, ArbitrationError>;
