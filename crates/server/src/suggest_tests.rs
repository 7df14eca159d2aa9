// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    equal      = { "abc", "abc", 0 },
    insert     = { "abc", "abxc", 1 },
    delete     = { "abc", "ab", 1 },
    substitute = { "abc", "abd", 1 },
    empty      = { "", "abc", 3 },
    disjoint   = { "xyz", "abc", 3 },
)]
fn distances(a: &str, b: &str, expected: usize) {
    assert_eq!(edit_distance(a, b), expected);
    assert_eq!(edit_distance(b, a), expected);
}

#[test]
fn near_miss_is_suggested() {
    let known = vec![
        "T-local-0abc1234".to_string(),
        "T-cloud-0zzz9999".to_string(),
    ];
    let similar = find_similar("T-local-0abc1235", &known);
    assert_eq!(similar, vec!["T-local-0abc1234".to_string()]);
}

#[test]
fn prefix_match_qualifies() {
    let known = vec!["T-local-0abc1234".to_string()];
    let similar = find_similar("T-local-0abc", &known);
    assert_eq!(similar.len(), 1);
}

#[test]
fn unrelated_ids_are_not_suggested() {
    let known = vec!["T-cloud-0zzz9999".to_string()];
    assert!(find_similar("staging", &known).is_empty());
}

#[test]
fn suggestions_cap_at_three() {
    let known: Vec<String> = (0..6).map(|n| format!("T-local-0abc000{n}")).collect();
    assert_eq!(find_similar("T-local-0abc0009", &known).len(), 3);
}

#[yare::parameterized(
    none = { &[], "" },
    one  = { &["a".to_string()], " (did you mean a?)" },
)]
fn formatting(similar: &[String], expected: &str) {
    assert_eq!(format_suggestion(similar), expected);
}

#[test]
fn formatting_many() {
    let similar = vec!["a".to_string(), "b".to_string()];
    assert_eq!(
        format_suggestion(&similar),
        " (did you mean one of: a, b?)"
    );
}
