//! Fleet manifests seeded into the store at start-up.

use std::path::Path;

use anyhow::{Context, Result};
use fleet_model::{Fleet, FleetSpec, ObjectMeta};
use serde::Deserialize;

use crate::store::{ClusterStore, StoreError};

/// One entry of a manifest file.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub name: String,

    #[serde(default)]
    pub namespace: Option<String>,

    pub spec: FleetSpec,
}

impl ManifestEntry {
    pub fn into_fleet(self, default_namespace: &str) -> Fleet {
        let namespace = self
            .namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| default_namespace.to_string());
        Fleet::new(ObjectMeta::new(self.name, namespace), self.spec)
    }
}

/// Parses a JSON array of manifest entries.
pub fn parse(json: &str, default_namespace: &str) -> Result<Vec<Fleet>> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(json).context("invalid fleet manifest")?;
    Ok(entries
        .into_iter()
        .map(|entry| entry.into_fleet(default_namespace))
        .collect())
}

/// Reads and parses the manifest at `path`.
pub fn load(path: &Path, default_namespace: &str) -> Result<Vec<Fleet>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    parse(&json, default_namespace)
}

/// Creates every fleet that is not stored yet. Returns how many were created.
pub async fn seed(store: &dyn ClusterStore, fleets: Vec<Fleet>) -> Result<usize> {
    let mut created = 0;
    for fleet in fleets {
        match store.create(fleet.into()).await {
            Ok(_) => created += 1,
            Err(StoreError::AlreadyExists(_)) => {}
            Err(err) => return Err(err).context("failed to seed fleet"),
        }
    }
    Ok(created)
}
