//! RuleStore - the in-memory rule collection and the matching engine.
//!
//! All operations take one exclusive lock over the whole store. Matching
//! mutates call counters, so "filter, increment, rank, select" must run as a
//! single step per request or `at`-gated rules become nondeterministic.

use super::predicates::{self, MatchInput};
use super::ranker::{select_best, Specificity};
use super::types::{RequestDescriptor, ResponseRule, RouteMatching, RuleSnapshot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

/// A rule plus the bookkeeping owned by the store.
#[derive(Debug)]
struct StoredRule {
    id: u64,
    rule: ResponseRule,
    num_calls: u64,
    inserted_at: DateTime<Utc>,
}

impl StoredRule {
    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            id: self.id,
            rule: self.rule.clone(),
            num_calls: self.num_calls,
            timestamp: self.inserted_at,
        }
    }

    /// Counts an attempt against this rule. Runs once per match call for
    /// every rule whose route and verb accept the request.
    fn record_call(&mut self) -> u64 {
        self.num_calls += 1;
        self.num_calls
    }
}

#[derive(Debug, Default)]
struct StoreState {
    rules: Vec<StoredRule>,
    next_id: u64,
}

/// Process-wide rule registry
#[derive(Debug, Default)]
pub struct RuleStore {
    state: Mutex<StoreState>,
    route_matching: RouteMatching,
}

impl RuleStore {
    /// Create an empty store with substring route matching
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route_matching(route_matching: RouteMatching) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            route_matching,
        }
    }

    /// Register a rule. Overlapping rules are allowed; ranking resolves them.
    pub fn add(&self, rule: ResponseRule) {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        info!(
            rule_id = id,
            route = rule.route.as_str(),
            verb = ?rule.verb,
            at = ?rule.at,
            "Registered response rule"
        );
        state.rules.push(StoredRule {
            id,
            rule,
            num_calls: 0,
            inserted_at: Utc::now(),
        });
    }

    /// All rules in insertion order
    pub fn get_all(&self) -> Vec<RuleSnapshot> {
        let state = self.state.lock();
        state.rules.iter().map(StoredRule::snapshot).collect()
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.state.lock().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every rule
    pub fn flush(&self) {
        let mut state = self.state.lock();
        let removed = state.rules.len();
        state.rules.clear();
        info!(removed, "Flushed rule store");
    }

    /// Find the best rule for a request. Updates call counters as a side effect.
    pub fn find_match(&self, request: &RequestDescriptor) -> Option<RuleSnapshot> {
        let mut state = self.state.lock();
        let index = self.select(&mut state.rules, request)?;
        Some(state.rules[index].snapshot())
    }

    /// Delete the rule `find_match` would select for this request.
    /// Returns whether a rule was removed.
    pub fn remove(&self, request: &RequestDescriptor) -> bool {
        let mut state = self.state.lock();
        match self.select(&mut state.rules, request) {
            Some(index) => {
                let removed = state.rules.remove(index);
                info!(
                    rule_id = removed.id,
                    route = removed.rule.route.as_str(),
                    "Removed response rule"
                );
                true
            }
            None => false,
        }
    }

    /// Evaluate every rule against the request and return the index of the winner.
    fn select(&self, rules: &mut [StoredRule], request: &RequestDescriptor) -> Option<usize> {
        let input = MatchInput::new(request);

        let candidates = rules.iter_mut().enumerate().filter_map(|(index, stored)| {
            if !predicates::route_matches(&stored.rule, input.path, self.route_matching)
                || !predicates::verb_matches(&stored.rule, input.method)
            {
                return None;
            }

            let num_calls = stored.record_call();
            let rule = &stored.rule;
            let accepted = predicates::query_matches(rule, &input.query)
                && predicates::payload_matches(rule, input.body)
                && predicates::headers_match(rule, &input.headers)
                && predicates::call_count_matches(rule, num_calls);

            accepted.then(|| (Specificity::of(rule, stored.id), index))
        });

        // Collect first so every route match is counted before ranking
        let candidates: Vec<_> = candidates.collect();
        let selected = select_best(candidates);

        debug!(
            path = input.path,
            method = ?input.method,
            selected = ?selected.map(|i| rules[i].id),
            "Matched request against rule store"
        );
        selected
    }
}
