// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only loader for the user's cloud environments file.
//!
//! The file is user-maintained JSON mapping environment ids to repository
//! targets; this service never writes it. Field names stay camelCase on
//! disk for compatibility with the tooling that produces the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One configured cloud environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(rename = "repoUrl")]
    pub repo_url: String,
    pub stack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Error)]
pub enum EnvironmentsError {
    /// The well-known file does not exist (`config-missing` to callers).
    #[error("environments file not found at {0}")]
    Missing(PathBuf),

    #[error("environments file unreadable at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("environments file invalid at {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Load the environments table, keyed by environment id.
pub fn load(path: &Path) -> Result<BTreeMap<String, Environment>, EnvironmentsError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EnvironmentsError::Missing(path.to_path_buf()))
        }
        Err(e) => {
            return Err(EnvironmentsError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| EnvironmentsError::Invalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
#[path = "environments_tests.rs"]
mod tests;
