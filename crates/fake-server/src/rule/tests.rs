//! Tests for the rule store.
//!
//! Covers store lifecycle (add / flush / remove), call-count gating,
//! ranking among overlapping rules and multi-criteria matching.

use super::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn rule(route: &str, code: u16) -> ResponseRuleBuilder {
    ResponseRuleBuilder::new(route).send_response_code(Some(json!(code)))
}

fn get(path: &str) -> RequestDescriptor {
    RequestDescriptor::from_uri(path).with_method("GET")
}

fn code_of(store: &RuleStore, request: &RequestDescriptor) -> Option<u16> {
    store.find_match(request).map(|s| s.rule.response_code)
}

#[test]
fn test_add_and_get_all() {
    let store = RuleStore::new();
    assert!(store.get_all().is_empty());

    store.add(rule("/first", 200).build().unwrap());
    store.add(rule("/second", 201).build().unwrap());

    let all = store.get_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].rule.route.as_str(), "/first");
    assert_eq!(all[1].rule.route.as_str(), "/second");
    assert!(all.iter().all(|s| s.num_calls == 0));
    assert!(all[0].id < all[1].id);
}

#[test]
fn test_flush_empties_store() {
    let store = RuleStore::new();
    store.add(rule("/a", 200).build().unwrap());
    store.add(rule("/b", 200).build().unwrap());

    store.flush();
    assert!(store.get_all().is_empty());
    assert!(code_of(&store, &get("/a")).is_none());
}

#[test]
fn test_match_route_and_count() {
    let store = RuleStore::new();
    store.add(
        rule("/i/don/t/want/this", 403)
            .send_response_body(Some(json!("§xxx")))
            .build()
            .unwrap(),
    );
    store.add(
        rule("/x", 200)
            .send_response_body(Some(json!("OK")))
            .build()
            .unwrap(),
    );

    let matched = store.find_match(&get("/x")).unwrap();
    assert_eq!(matched.rule.response_code, 200);
    assert_eq!(matched.rule.response_body, Some(ResponseBody::Text("OK".into())));
    assert_eq!(matched.num_calls, 1);

    // The unrelated rule's route never matched, so its counter is untouched
    assert_eq!(store.get_all()[0].num_calls, 0);
}

#[test]
fn test_match_by_regex_route() {
    let store = RuleStore::new();
    store.add(rule("/foo.*", 200).build().unwrap());
    store.add(rule("/i/don/t/want/this", 403).build().unwrap());

    assert_eq!(code_of(&store, &get("/foo/bar")), Some(200));
    assert_eq!(code_of(&store, &get("/nothing")), None);
}

#[test]
fn test_anchored_route_matching() {
    let store = RuleStore::with_route_matching(RouteMatching::Anchored);
    store.add(rule("/foo", 200).build().unwrap());

    assert_eq!(code_of(&store, &get("/foo")), Some(200));
    assert_eq!(code_of(&store, &get("/foo/bar")), None);
    assert_eq!(code_of(&store, &get("/api/foo")), None);
}

#[test]
fn test_extended_mode_route_with_comment() {
    let store = RuleStore::new();
    store.add(rule("(?x) /users/[0-9]+  # numeric id", 200).build().unwrap());
    assert_eq!(code_of(&store, &get("/users/42")), Some(200));
    assert_eq!(code_of(&store, &get("/users/abc")), None);

    let anchored = RuleStore::with_route_matching(RouteMatching::Anchored);
    anchored.add(rule("(?x) /users/[0-9]+  # numeric id", 200).build().unwrap());
    assert_eq!(code_of(&anchored, &get("/users/42")), Some(200));
    assert_eq!(code_of(&anchored, &get("/users/42/posts")), None);
}

#[test]
fn test_unmatched_route_has_no_side_effect() {
    let store = RuleStore::new();
    store.add(rule("/x", 200).build().unwrap());
    assert!(store.find_match(&get("/y")).is_none());
    assert_eq!(store.get_all()[0].num_calls, 0);
}

#[test]
fn test_at_gated_sequence() {
    let store = RuleStore::new();
    store.add(rule("/i/don/t/want/this", 403).build().unwrap());
    store.add(rule("/match/me", 200).build().unwrap());
    store.add(
        rule("/match/me", 204)
            .respond_at_call(Some(json!(2)))
            .build()
            .unwrap(),
    );

    assert_eq!(code_of(&store, &get("/match/me")), Some(200));
    assert_eq!(code_of(&store, &get("/match/me")), Some(204));
    assert_eq!(code_of(&store, &get("/match/me")), Some(200));

    // Each rule keeps its own counter
    let counters: Vec<u64> = store.get_all().iter().map(|s| s.num_calls).collect();
    assert_eq!(counters, vec![0, 3, 3]);
}

#[test]
fn test_at_gated_alone_returns_none_off_turn() {
    let store = RuleStore::new();
    store.add(rule("/x", 403).respond_at_call(Some(json!(2))).build().unwrap());

    assert_eq!(code_of(&store, &get("/x")), None);
    assert_eq!(code_of(&store, &get("/x")), Some(403));
    assert_eq!(code_of(&store, &get("/x")), None);
}

#[test]
fn test_counter_increments_even_when_other_predicates_fail() {
    let store = RuleStore::new();
    store.add(
        rule("/p", 200)
            .with_payload(Some(json!({"id": 1})))
            .respond_at_call(Some(json!(2)))
            .build()
            .unwrap(),
    );

    let wrong = get("/p").with_body(json!({"id": 2}));
    let right = get("/p").with_body(json!({"id": 1}));

    assert!(store.find_match(&wrong).is_none());
    // Second attempt overall: the gate is open and the payload matches
    assert_eq!(code_of(&store, &right), Some(200));
    assert_eq!(store.get_all()[0].num_calls, 2);
}

#[test]
fn test_verb_mismatch_does_not_count() {
    let store = RuleStore::new();
    store.add(rule("/v", 200).with_verb(Some("POST".into())).build().unwrap());

    assert!(store.find_match(&get("/v")).is_none());
    assert_eq!(store.get_all()[0].num_calls, 0);

    let post = RequestDescriptor::new("/v").with_method("POST");
    assert_eq!(code_of(&store, &post), Some(200));
}

#[test]
fn test_last_registered_wins() {
    let store = RuleStore::new();
    store.add(rule("/same", 200).build().unwrap());
    store.add(rule("/same", 500).build().unwrap());

    assert_eq!(code_of(&store, &get("/same")), Some(500));
    // Idempotent for ungated rules
    assert_eq!(code_of(&store, &get("/same")), Some(500));
}

#[test]
fn test_more_specific_rule_wins() {
    let store = RuleStore::new();
    store.add(
        rule("/search", 201)
            .with_query_params(Some(json!({"q": ".+"})))
            .build()
            .unwrap(),
    );
    store.add(rule("/search", 200).build().unwrap());

    assert_eq!(code_of(&store, &get("/search?q=rust")), Some(201));
    assert_eq!(code_of(&store, &get("/search")), Some(200));
}

#[test]
fn test_headers_rank_below_params() {
    let store = RuleStore::new();
    store.add(
        rule("/r", 202)
            .with_required_headers(Some(json!({"X-A": ".*", "X-B": ".*"})))
            .build()
            .unwrap(),
    );
    store.add(
        rule("/r", 201)
            .with_query_params(Some(json!({"a": "1"})))
            .build()
            .unwrap(),
    );

    let request = get("/r?a=1").with_header("X-A", "x").with_header("X-B", "y");
    assert_eq!(code_of(&store, &request), Some(201));
}

#[test]
fn test_payload_scenario() {
    let store = RuleStore::new();
    store.add(rule("/p", 200).with_payload(Some(json!({"id": 1}))).build().unwrap());

    assert!(store.find_match(&get("/p").with_body(json!({"id": 2}))).is_none());
    assert_eq!(code_of(&store, &get("/p").with_body(json!({"id": 1}))), Some(200));
    assert!(store.find_match(&get("/p")).is_none());
}

#[test]
fn test_nested_payload_and_regex_query() {
    let store = RuleStore::new();
    store.add(
        rule("/orders", 200)
            .with_query_params(Some(json!({"page": "[0-9]+"})))
            .with_payload(Some(json!({"order.items[0].sku": "^SKU-"})))
            .build()
            .unwrap(),
    );

    let body = json!({"order": {"items": [{"sku": "SKU-1"}]}});
    assert_eq!(
        code_of(&store, &get("/orders?page=42").with_body(body.clone())),
        Some(200)
    );
    assert!(store
        .find_match(&get("/orders?page=abc").with_body(body))
        .is_none());
}

#[test]
fn test_remove_deletes_best_match() {
    let store = RuleStore::new();
    store.add(rule("/x", 200).build().unwrap());
    store.add(rule("/x", 500).build().unwrap());

    assert!(store.remove(&RequestDescriptor::new("/x")));
    let remaining = store.get_all();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].rule.response_code, 200);

    // Next best now answers
    assert_eq!(code_of(&store, &get("/x")), Some(200));

    assert!(store.remove(&RequestDescriptor::new("/x")));
    assert!(!store.remove(&RequestDescriptor::new("/x")));
    assert!(store.get_all().is_empty());
}

#[test]
fn test_remove_with_criteria() {
    let store = RuleStore::new();
    store.add(rule("/u", 200).build().unwrap());
    store.add(
        rule("/u", 403)
            .with_required_headers(Some(json!({"Authorization": "^Bearer"})))
            .build()
            .unwrap(),
    );

    // Without the header only the plain rule is a candidate
    assert!(store.remove(&RequestDescriptor::from_uri("/u")));
    let remaining = store.get_all();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].rule.response_code, 403);

    let with_header = RequestDescriptor::new("/u").with_header("authorization", "Bearer t");
    assert!(store.remove(&with_header));
    assert!(store.is_empty());
}

#[test]
fn test_remove_ignores_verb_when_not_given() {
    let store = RuleStore::new();
    store.add(rule("/v", 200).with_verb(Some("PUT".into())).build().unwrap());

    assert!(!store.remove(&RequestDescriptor::new("/v").with_method("GET")));
    assert!(store.remove(&RequestDescriptor::new("/v")));
}

#[test]
fn test_concurrent_matches_hit_gate_once() {
    let store = Arc::new(RuleStore::new());
    store.add(rule("/race", 200).build().unwrap());
    store.add(rule("/race", 409).respond_at_call(Some(json!(25))).build().unwrap());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || code_of(&store, &get("/race")))
        })
        .collect();

    let codes: Vec<Option<u16>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(codes.iter().filter(|c| **c == Some(409)).count(), 1);
    assert_eq!(codes.iter().filter(|c| **c == Some(200)).count(), 49);
}

proptest! {
    #[test]
    fn prop_gated_rule_answers_only_its_call(at in 1u64..20, calls in 1usize..30) {
        let store = RuleStore::new();
        store.add(rule("/k", 200).build().unwrap());
        store.add(rule("/k", 299).respond_at_call(Some(json!(at))).build().unwrap());

        for call in 1..=calls as u64 {
            let expected = if call == at { 299 } else { 200 };
            prop_assert_eq!(code_of(&store, &get("/k")), Some(expected));
        }
    }

    #[test]
    fn prop_digit_pattern(value in "[a-z0-9]{1,8}") {
        let matcher = MatchValue::from_value(json!("^[0-9]+$"));
        let expected = value.chars().all(|c| c.is_ascii_digit());
        prop_assert_eq!(matcher.matches(Some(&json!(value))), expected);
    }
}
