//! Reproducibility tracking: seed management, environment snapshots and
//! parameter fingerprints.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Component that draws the training sample.
pub const SAMPLING: &str = "sampling";
/// Component that initialises and trains the model.
pub const MODEL: &str = "model";

/// Snapshot of the run environment for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub crate_version: String,
    pub system_info: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    /// Hash of environment variables that influence a run.
    pub env_vars_hash: String,
}

impl EnvironmentSnapshot {
    pub fn capture() -> Self {
        Self {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            system_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            platform: std::env::consts::OS.to_string(),
            timestamp: Utc::now(),
            env_vars_hash: Self::compute_env_vars_hash(),
        }
    }

    /// Compute a SHA-256 hash over relevant environment variables.
    fn compute_env_vars_hash() -> String {
        let mut hasher = Sha256::new();
        for var in &["ULMFIT_MODEL__ARCH", "ULMFIT_MODEL__ENCODER", "RUST_LOG"] {
            let value = std::env::var(var).unwrap_or_default();
            hasher.update(var.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// SHA-256 over the canonical JSON form of a parameter dictionary.
///
/// `serde_json` keeps object keys sorted, so equal dictionaries always hash
/// to the same value regardless of the order they were written in.
pub fn fingerprint(params: &serde_json::Value) -> String {
    let canonical = params.to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Hands out deterministic per-component seeds and RNGs for one run.
///
/// The sampling component receives the global seed unchanged so data
/// providers key their samples directly on the run seed; every other
/// component gets a seed derived from the global seed and its name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedManager {
    pub global_seed: u64,
    pub component_seeds: BTreeMap<String, u64>,
}

impl SeedManager {
    pub fn new(global_seed: u64) -> Self {
        Self {
            global_seed,
            component_seeds: BTreeMap::new(),
        }
    }

    pub fn get_seed(&mut self, component: &str) -> u64 {
        let global_seed = self.global_seed;
        *self
            .component_seeds
            .entry(component.to_string())
            .or_insert_with(|| derive_seed(global_seed, component))
    }

    /// Fresh RNG for `component`; calling twice yields identical streams.
    pub fn rng(&mut self, component: &str) -> StdRng {
        StdRng::seed_from_u64(self.get_seed(component))
    }
}

fn derive_seed(global_seed: u64, component: &str) -> u64 {
    if component == SAMPLING {
        return global_seed;
    }
    let mut hasher = Sha256::new();
    hasher.update(global_seed.to_le_bytes());
    hasher.update(component.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
