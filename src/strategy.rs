//! Allocation strategies: how a scarce amount is shared between requests.
//!
//! Every strategy satisfies the same laws for available amount `A` and
//! requests `d_i`:
//!
//! ```text
//! 0 ≤ a_i ≤ d_i
//! Σ a_i ≤ A
//! Σ d_i ≥ A  ⇒  Σ a_i = A        (full use under scarcity)
//! Σ d_i ≤ A  ⇒  a_i = d_i        (no scarcity)
//! A = 0      ⇒  a_i = 0          (no division by zero)
//! ```
//!
//! [`verify`] checks those laws on any result and is run on every distribution
//! the arbitrator performs.
//!
//! | Strategy | Order-dependent | Rule |
//! |----------|-----------------|------|
//! | [`AllocationStrategy::PriorityOrdered`] | yes | `a_i = min(d_i, remaining)`, cascading |
//! | [`AllocationStrategy::Proportional`] | no | `a_i = d_i × min(1, A / Σd)` |
//! | [`AllocationStrategy::SizeWeighted`] | no | share by standing biomass, capped, excess re-shared |

use alloc::vec::Vec;

use crate::error::{ArbitrationError, Result};
use crate::organ::OrganId;
use crate::pool::{AllocationCategory, Resource};

// ─── Request / Awards ───────────────────────────────────────────────────────

/// One organ's request in a single distribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Request {
    /// Requesting organ.
    pub organ: OrganId,
    /// Amount requested, ≥ 0.
    pub amount: f64,
    /// Size weight for [`AllocationStrategy::SizeWeighted`]; ignored otherwise.
    pub weight: f64,
}

impl Request {
    /// Request with zero size weight.
    pub fn new(organ: OrganId, amount: f64) -> Self {
        Self {
            organ,
            amount,
            weight: 0.0,
        }
    }

    /// Attach a size weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Result of a distribution: one award per request, in request order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Awards {
    entries: Vec<(OrganId, f64)>,
}

impl Awards {
    /// Award for `organ`, or `None` if it made no request.
    pub fn get(&self, organ: OrganId) -> Option<f64> {
        self.entries
            .iter()
            .find(|(id, _)| *id == organ)
            .map(|(_, a)| *a)
    }

    /// Iterate `(organ, award)` in request order.
    pub fn iter(&self) -> impl Iterator<Item = (OrganId, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Sum of all awards.
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, a)| a).sum()
    }

    /// Number of awards.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when there are no awards.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn from_parts(requests: &[Request], amounts: Vec<f64>) -> Self {
        Self {
            entries: requests.iter().map(|r| r.organ).zip(amounts).collect(),
        }
    }
}

impl FromIterator<(OrganId, f64)> for Awards {
    fn from_iter<I: IntoIterator<Item = (OrganId, f64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ─── AllocationStrategy ─────────────────────────────────────────────────────

/// Policy deciding how much of a scarce amount each request receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AllocationStrategy {
    /// Requests are served fully in declared order until the amount runs out.
    PriorityOrdered,
    /// Every request is scaled by the same scarcity ratio.
    #[default]
    Proportional,
    /// Shares follow standing biomass, capped at each request.
    SizeWeighted,
}

impl AllocationStrategy {
    /// Share `available` between `requests`.
    ///
    /// `requests` must be in declared priority order; the priority cascade and
    /// residual correction both depend on it.
    pub fn distribute(self, available: f64, requests: &[Request]) -> Awards {
        let requested: f64 = requests.iter().map(|r| r.amount).sum();
        if requested <= available {
            return Awards::from_parts(requests, requests.iter().map(|r| r.amount).collect());
        }
        if available <= 0.0 {
            return Awards::from_parts(requests, requests.iter().map(|_| 0.0).collect());
        }
        let amounts = match self {
            AllocationStrategy::PriorityOrdered => priority(available, requests),
            AllocationStrategy::Proportional => proportional(available, requested, requests),
            AllocationStrategy::SizeWeighted => size_weighted(available, requests),
        };
        Awards::from_parts(requests, amounts)
    }
}

fn priority(available: f64, requests: &[Request]) -> Vec<f64> {
    let mut remaining = available;
    requests
        .iter()
        .map(|r| {
            let a = r.amount.min(remaining);
            remaining -= a;
            a
        })
        .collect()
}

fn proportional(available: f64, requested: f64, requests: &[Request]) -> Vec<f64> {
    let ratio = available / requested;
    let mut amounts: Vec<f64> = requests.iter().map(|r| r.amount * ratio).collect();
    settle_residual(available, requests, &mut amounts);
    amounts
}

/// Water-filling by weight: each pass shares what is left among unsatisfied
/// requests by weight; any request whose share would exceed its need is filled
/// and dropped from the next pass.
fn size_weighted(available: f64, requests: &[Request]) -> Vec<f64> {
    let mut amounts = alloc::vec![0.0; requests.len()];
    let mut open: Vec<bool> = requests.iter().map(|r| r.amount > 0.0).collect();
    let mut remaining = available;

    while remaining > 0.0 && open.iter().any(|o| *o) {
        let weight_of = |i: usize| -> f64 {
            if requests[i].weight > 0.0 && requests[i].weight.is_finite() {
                requests[i].weight
            } else {
                0.0
            }
        };
        let mut weights: Vec<f64> = (0..requests.len())
            .map(|i| if open[i] { weight_of(i) } else { 0.0 })
            .collect();
        let mut total_weight: f64 = weights.iter().sum();
        if total_weight <= 0.0 {
            // No size information left: fall back to need.
            for (i, w) in weights.iter_mut().enumerate() {
                *w = if open[i] { requests[i].amount - amounts[i] } else { 0.0 };
            }
            total_weight = weights.iter().sum();
        }

        let mut saturated = false;
        for i in 0..requests.len() {
            if !open[i] {
                continue;
            }
            let need = requests[i].amount - amounts[i];
            if remaining * weights[i] / total_weight >= need {
                amounts[i] = requests[i].amount;
                open[i] = false;
                saturated = true;
            }
        }

        if saturated {
            let given: f64 = amounts.iter().sum();
            remaining = (available - given).max(0.0);
            continue;
        }

        for i in 0..requests.len() {
            if open[i] {
                amounts[i] += remaining * weights[i] / total_weight;
            }
        }
        break;
    }

    settle_residual(available, requests, &mut amounts);
    amounts
}

/// Push floating-point residual onto the last request in declared order that
/// can absorb it, so the awards sum to `available` exactly.
fn settle_residual(available: f64, requests: &[Request], amounts: &mut [f64]) {
    if amounts.iter().sum::<f64>() == available {
        return;
    }
    if let Some(last) = (0..requests.len()).rev().find(|&i| requests[i].amount > 0.0) {
        let others: f64 = amounts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != last)
            .map(|(_, a)| a)
            .sum();
        amounts[last] = (available - others).clamp(0.0, requests[last].amount);
    }
}

// ─── CategoryStrategies ─────────────────────────────────────────────────────

/// Strategy per supply category for one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoryStrategies {
    /// Used to share reallocated supply.
    pub reallocation: AllocationStrategy,
    /// Used to share uptake supply.
    pub uptake: AllocationStrategy,
    /// Used to share fixation supply.
    pub fixation: AllocationStrategy,
    /// Used to share retranslocated supply.
    pub retranslocation: AllocationStrategy,
}

impl CategoryStrategies {
    /// Same strategy for every category.
    pub const fn uniform(strategy: AllocationStrategy) -> Self {
        Self {
            reallocation: strategy,
            uptake: strategy,
            fixation: strategy,
            retranslocation: strategy,
        }
    }

    /// Strategy for one supply category.
    pub fn for_category(&self, category: crate::pool::SupplyCategory) -> AllocationStrategy {
        use crate::pool::SupplyCategory::*;
        match category {
            Reallocation => self.reallocation,
            Uptake => self.uptake,
            Fixation => self.fixation,
            Retranslocation => self.retranslocation,
        }
    }
}

impl Default for CategoryStrategies {
    fn default() -> Self {
        Self::uniform(AllocationStrategy::PriorityOrdered)
    }
}

// ─── verify ─────────────────────────────────────────────────────────────────

/// Absolute slack for a comparison at magnitude `scale`.
pub(crate) fn slack(scale: f64, tolerance: f64) -> f64 {
    tolerance * scale.max(1.0)
}

/// Check one distribution against the capping and conservation laws.
///
/// `resource` and `category` only label the error.
pub fn verify(
    resource: Resource,
    category: AllocationCategory,
    available: f64,
    requests: &[Request],
    awards: &Awards,
    tolerance: f64,
) -> Result<()> {
    let mut requested = 0.0;
    for (organ, awarded) in awards.iter() {
        let request = requests
            .iter()
            .find(|r| r.organ == organ)
            .ok_or(ArbitrationError::UnknownOrgan(organ))?;
        let limit = request.amount + slack(request.amount, tolerance);
        if !awarded.is_finite() || awarded < 0.0 || awarded > limit {
            return Err(ArbitrationError::AwardExceedsRequest {
                organ,
                resource,
                category,
                awarded,
                requested: request.amount,
            });
        }
        requested += request.amount;
    }

    let awarded = awards.total();
    let eps = slack(available, tolerance);
    let over = awarded > available + eps;
    let under = requested >= available && awarded < available - eps;
    if over || under {
        return Err(ArbitrationError::ConservationViolation {
            resource,
            category,
            awarded,
            available,
        });
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────
