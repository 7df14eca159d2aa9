// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

/// Default concurrency ceiling when `CODEX_MAX_CONCURRENCY` is unset.
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Global ceiling on simultaneously working tasks.
///
/// `CODEX_MAX_CONCURRENCY` must be an integer >= 1; anything else falls
/// back to the default.
pub fn max_concurrency() -> usize {
    std::env::var("CODEX_MAX_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(DEFAULT_MAX_CONCURRENCY)
}

/// Agent executable. `CODEX_BIN` overrides the default `codex` (used by
/// tests to substitute a stub).
pub fn agent_program() -> String {
    std::env::var("CODEX_BIN").unwrap_or_else(|_| "codex".to_string())
}
