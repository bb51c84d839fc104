// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! PoP inventory loading.
//!
//! The inventory is a JSON (or YAML, chosen by file extension) array of edge
//! locations. Raw entries may lack a subnet or a short code when a location
//! has not been mapped yet; those are skipped with a warning so a partially
//! curated inventory never blocks a pass.
//!
//! ```json
//! [
//!   {"id": "nrt57", "location": "Tokyo", "country": "Japan", "subnet": "1.66.0.0/24", "code": "NRT57", "neighbors": ["NRT20"]}
//! ]
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::dns_errors::InventoryError;

/// A point-of-presence ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pop {
    pub id: String,
    pub location: String,
    pub country: String,
    /// Lower-cased short code used in published hostnames
    pub code: String,
    /// Client subnet (CIDR) steered to this PoP
    pub subnet: String,
    /// Lower-cased codes accepted as valid serving locations
    pub neighbors: BTreeSet<String>,
}

impl Pop {
    /// Convenience constructor without neighbors or descriptive fields.
    #[must_use]
    pub fn new(code: &str, subnet: &str) -> Self {
        Self {
            id: code.to_lowercase(),
            location: String::new(),
            country: String::new(),
            code: code.to_lowercase(),
            subnet: subnet.to_string(),
            neighbors: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_neighbors<I, S>(mut self, neighbors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.neighbors = neighbors
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();
        self
    }
}

/// Inventory entry as stored on disk.
#[derive(Debug, Clone, Deserialize)]
struct RawPop {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    subnet: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    neighbors: Option<Vec<String>>,
}

/// Supplies the PoP list at the start of every pass.
#[async_trait]
pub trait PopSource: Send + Sync {
    /// Load the current inventory.
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be read or parsed.
    async fn load(&self) -> Result<Vec<Pop>, InventoryError>;
}

/// Inventory re-read from a file on every pass.
#[derive(Debug, Clone)]
pub struct FilePopSource {
    path: PathBuf,
}

impl FilePopSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PopSource for FilePopSource {
    async fn load(&self) -> Result<Vec<Pop>, InventoryError> {
        load_pops(&self.path).await
    }
}

/// A fixed, already filtered inventory.
#[async_trait]
impl PopSource for Vec<Pop> {
    async fn load(&self) -> Result<Vec<Pop>, InventoryError> {
        Ok(self.clone())
    }
}

/// Load and filter the PoP inventory from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn load_pops(path: &Path) -> Result<Vec<Pop>, InventoryError> {
    let path_display = path.display().to_string();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InventoryError::Read {
            path: path_display.clone(),
            source,
        })?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let pops = if is_yaml {
        parse_yaml(&contents)
    } else {
        parse_json(&contents)
    }
    .map_err(|reason| InventoryError::Parse {
        path: path_display.clone(),
        reason,
    })?;

    debug!(path = %path_display, pops = pops.len(), "Loaded PoP inventory");
    Ok(pops)
}

/// Parse a JSON inventory document.
///
/// # Errors
///
/// Returns the parser message if the document is not a valid inventory.
pub fn parse_json(contents: &str) -> Result<Vec<Pop>, String> {
    let raw: Vec<RawPop> = serde_json::from_str(contents).map_err(|e| e.to_string())?;
    Ok(filter_pops(raw))
}

/// Parse a YAML inventory document.
///
/// # Errors
///
/// Returns the parser message if the document is not a valid inventory.
pub fn parse_yaml(contents: &str) -> Result<Vec<Pop>, String> {
    let raw: Vec<RawPop> = serde_yaml::from_str(contents).map_err(|e| e.to_string())?;
    Ok(filter_pops(raw))
}

fn filter_pops(raw: Vec<RawPop>) -> Vec<Pop> {
    let mut pops: Vec<Pop> = raw
        .into_iter()
        .filter_map(|entry| {
            let label = entry.name.clone().unwrap_or_else(|| entry.id.clone());
            match (entry.subnet, entry.code) {
                (Some(subnet), Some(code)) => Some(Pop {
                    id: entry.id,
                    location: entry.location,
                    country: entry.country,
                    code: code.to_lowercase(),
                    subnet,
                    neighbors: entry
                        .neighbors
                        .unwrap_or_default()
                        .iter()
                        .map(|n| n.to_lowercase())
                        .collect(),
                }),
                (None, None) => {
                    debug!(pop = %label, "Skipping unmapped PoP");
                    None
                }
                _ => {
                    warn!(pop = %label, "PoP has only subnet or code, skipping");
                    None
                }
            }
        })
        .collect();

    pops.sort_by(|a, b| a.id.cmp(&b.id));
    pops
}

/// Select the domains handled by one shard.
///
/// Domain `i` belongs to shard `i % shard_count`. Without sharding every
/// domain is returned.
#[must_use]
pub fn shard_domains(domains: &[String], shard: Option<(usize, usize)>) -> Vec<String> {
    match shard {
        Some((index, count)) if count > 0 => domains
            .iter()
            .enumerate()
            .filter(|(i, _)| i % count == index)
            .map(|(_, d)| d.clone())
            .collect(),
        _ => domains.to_vec(),
    }
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod inventory_tests;
