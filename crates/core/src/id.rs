// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions

use crate::clock::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for truncating identifiers to a short prefix.
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`,
/// `From<&str>`, `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>`
/// implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Generates unique task id suffixes.
///
/// Suffixes must sort lexicographically in creation order within a single
/// process, so status listings come back newest-first without a secondary
/// sort key.
pub trait IdGen: Clone + Send + Sync {
    fn next(&self) -> String;
}

/// Width of the hex timestamp prefix. Eleven hex digits hold epoch
/// milliseconds beyond year 10000, keeping every suffix the same width so
/// lexicographic order equals numeric order.
const STAMP_HEX_WIDTH: usize = 11;

/// Number of random tail characters appended to the stamp.
const RANDOM_TAIL_LEN: usize = 4;

const TAIL_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Production generator: zero-padded hex millisecond stamp plus a short
/// random tail. A monotonic guard bumps the stamp when the clock reads the
/// same or an earlier millisecond, so two ids created back-to-back still
/// sort in creation order.
#[derive(Clone)]
pub struct TaskIdGen<C: Clock> {
    clock: C,
    last_stamp: Arc<AtomicU64>,
}

impl<C: Clock> TaskIdGen<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last_stamp: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_stamp(&self) -> u64 {
        let now = self.clock.epoch_ms();
        // fetch_update yields the previous value; recompute the stored one.
        match self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(if now > last { now } else { last + 1 })
            }) {
            Ok(previous) if now > previous => now,
            Ok(previous) => previous + 1,
            Err(_) => now,
        }
    }
}

impl<C: Clock> IdGen for TaskIdGen<C> {
    fn next(&self) -> String {
        use rand::Rng;
        let stamp = self.next_stamp();
        let mut rng = rand::rng();
        let tail: String = (0..RANDOM_TAIL_LEN)
            .map(|_| TAIL_ALPHABET[rng.random_range(0..TAIL_ALPHABET.len())] as char)
            .collect();
        format!("{stamp:0width$x}{tail}", width = STAMP_HEX_WIDTH)
    }
}

/// Sequential ID generator for testing
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

#[cfg(any(test, feature = "test-support"))]
impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("id")
    }
}

#[cfg(any(test, feature = "test-support"))]
impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}{:08}", self.prefix, n)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
