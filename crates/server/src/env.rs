// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the server crate.

use std::path::PathBuf;

/// Resolve the config home: `CDX_CONFIG_DIR` > platform config dir + `cdx`.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("CDX_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|base| base.join("cdx"))
}

/// The registry table lives at `<config_home>/tasks.json`.
pub fn tasks_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("tasks.json"))
}

/// The read-only environments file at `<config_home>/environments.json`.
pub fn environments_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("environments.json"))
}
