//! Ranking of candidate rules.
//!
//! When several rules pass every predicate for one request, the most
//! specific one wins. Ordering, highest first:
//!
//! 1. rules gated with `at` over ungated rules
//! 2. more declared query + payload matchers
//! 3. more declared header matchers
//! 4. the most recently inserted rule

use super::types::ResponseRule;

/// Sort key for a candidate. Field order is the ranking order, so the derived
/// `Ord` is the ranking itself and the greatest key wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    gated: bool,
    params: usize,
    headers: usize,
    /// Store insertion order; unaffected by wall-clock adjustments
    sequence: u64,
}

impl Specificity {
    pub fn of(rule: &ResponseRule, sequence: u64) -> Self {
        Self {
            gated: rule.at.is_some(),
            params: rule.param_count(),
            headers: rule.header_count(),
            sequence,
        }
    }
}

/// Pick the best candidate, or `None` when there are none.
pub fn select_best<T>(candidates: impl IntoIterator<Item = (Specificity, T)>) -> Option<T> {
    candidates
        .into_iter()
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, candidate)| candidate)
}
