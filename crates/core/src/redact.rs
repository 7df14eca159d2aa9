// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret redaction for every string crossing the trust boundary.
//!
//! Applied unconditionally to stdout, stderr, serialized events, and error
//! messages before they leave the service. The pattern table is ordered:
//! multi-line and provider-specific shapes run before the generic
//! assignment patterns so the most precise match wins.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Replacement marker for every match.
pub const REDACTED: &str = "[REDACTED]";

/// A named secret shape. The name keys the per-pattern unit tests.
pub struct SecretPattern {
    pub name: &'static str,
    pub regex: Regex,
}

// Pattern literals are exercised by the per-pattern tests; a bad literal
// fails the suite before it can ship.
#[allow(clippy::unwrap_used)]
fn compile(name: &'static str, pattern: &str) -> SecretPattern {
    SecretPattern {
        name,
        regex: Regex::new(pattern).unwrap(),
    }
}

/// Ordered secret pattern table.
pub fn patterns() -> &'static [SecretPattern] {
    static PATTERNS: LazyLock<Vec<SecretPattern>> = LazyLock::new(|| {
        let table = [
            (
                "private-key-block",
                r"(?s)-----BEGIN [A-Z0-9 ]*PRIVATE KEY-----.*?-----END [A-Z0-9 ]*PRIVATE KEY-----"
            ),
            (
                "jwt",
                r"\beyJ[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}"
            ),
            ("anthropic-key", r"\bsk-ant-[A-Za-z0-9_-]{16,}"),
            ("openai-key", r"\bsk-[A-Za-z0-9_-]{20,}"),
            ("github-fine-grained-pat", r"\bgithub_pat_[A-Za-z0-9_]{20,}"),
            ("github-token", r"\bgh[pousr]_[A-Za-z0-9]{36,}"),
            ("gitlab-token", r"\bglpat-[A-Za-z0-9_-]{20,}"),
            ("aws-access-key-id", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b"),
            (
                "aws-secret-assignment",
                r"(?i)\baws_secret_access_key\b\s*[=:]\s*[A-Za-z0-9/+=]{30,}"
            ),
            ("google-api-key", r"\bAIza[0-9A-Za-z_-]{35}"),
            ("slack-token", r"\bxox[baprs]-[A-Za-z0-9-]{10,}"),
            ("stripe-key", r"\b[sr]k_(?:live|test)_[A-Za-z0-9]{16,}"),
            ("npm-token", r"\bnpm_[A-Za-z0-9]{36}"),
            (
                "sendgrid-key",
                r"\bSG\.[A-Za-z0-9_-]{16,}\.[A-Za-z0-9_-]{16,}"
            ),
            ("bearer-header", r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]{16,}=*"),
            (
                "password-assignment",
                r#"(?i)\b(?:password|passwd|pwd)\b\s*[=:]\s*[^\s"']{6,}"#
            ),
            (
                "secret-assignment",
                r#"(?i)\b(?:api[_-]?key|apikey|secret|auth[_-]?token|access[_-]?token|client[_-]?secret)\b\s*[=:]\s*["']?[A-Za-z0-9_./+-]{16,}["']?"#
            ),
            (
                "url-credentials",
                r"\b[a-zA-Z][a-zA-Z0-9+.-]*://[^/\s:@]+:[^@\s]+@"
            ),
        ];
        table
            .into_iter()
            .map(|(name, pattern)| compile(name, pattern))
            .collect()
    });
    &PATTERNS
}

/// Replace every secret-shaped substring with [`REDACTED`].
///
/// Returns the input unchanged (borrowed) when nothing matches, which is
/// the overwhelmingly common case on event streams.
pub fn redact(input: &str) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(input);
    for pattern in patterns() {
        if pattern.regex.is_match(&out) {
            out = Cow::Owned(pattern.regex.replace_all(&out, REDACTED).into_owned());
        }
    }
    out
}

/// Redact every string leaf of a JSON value in place.
pub fn redact_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if let Cow::Owned(clean) = redact(s) {
                *s = clean;
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                redact_value(item);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                redact_value(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
