// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! "Did you mean?" suggestions for unknown task and environment ids.

/// Levenshtein edit distance between two strings.
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in dp[0].iter_mut().enumerate() {
        *cell = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[a.len()][b.len()]
}

/// Closest known ids to a miss, nearest first. Prefix matches always
/// qualify; otherwise the edit-distance budget scales with input length.
pub(crate) fn find_similar(input: &str, candidates: &[String]) -> Vec<String> {
    let threshold = (input.len() / 4).max(2);
    let mut matches: Vec<(usize, String)> = candidates
        .iter()
        .filter(|c| c.as_str() != input)
        .filter_map(|c| {
            let dist = edit_distance(input, c);
            if dist <= threshold || c.starts_with(input) || input.starts_with(c.as_str()) {
                Some((dist, c.clone()))
            } else {
                None
            }
        })
        .collect();
    matches.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.cmp(b)));
    matches.into_iter().map(|(_, id)| id).take(3).collect()
}

/// Format a hint for appending to a not-found message. Empty when there
/// is nothing close.
pub(crate) fn format_suggestion(similar: &[String]) -> String {
    match similar {
        [] => String::new(),
        [only] => format!(" (did you mean {only}?)"),
        many => format!(" (did you mean one of: {}?)", many.join(", ")),
    }
}

#[cfg(test)]
#[path = "suggest_tests.rs"]
mod tests;
