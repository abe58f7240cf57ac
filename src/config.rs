//! Simulation configuration.
//!
//! `Config` is a plain value handed to the core at startup. The core never
//! reads the environment or any file; `from_env` exists for the binaries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::conduit::Backend;
use crate::error::ConfigurationError;
use crate::service::ServiceKind;
use crate::topology::LayoutKind;

/// Largest window any duct class may retain.
pub const MAX_WINDOW: usize = 1 << 20;

/// Window size `W` per duct class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Windows {
    pub resource: usize,
    pub state: usize,
    pub spawn: usize,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            resource: 8,
            state: 2,
            spawn: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // === Topology ===
    pub layout: LayoutKind,
    pub width: usize,
    pub height: usize,

    // === Conduits ===
    pub backend: Backend,
    pub windows: Windows,
    /// Drop fully consumed messages at every epoch boundary.
    pub compact_buffers: bool,

    // === Scheduling ===
    pub seed: u64,
    pub workers: usize,
    /// Declared service order; also acts as the enable list.
    pub services: Vec<String>,
    /// Consecutive failures of one service before the cell is eligible for death.
    pub max_consecutive_failures: u32,

    // === Resources ===
    pub initial_stock: f64,
    pub decay_rate: f64,
    pub harvest_amount: f64,
    pub send_threshold: f64,
    pub send_fraction: f64,

    // === Reproduction / lineage ===
    pub spawn_cost: f64,
    pub mutation_rate: f64,
    pub initial_genome_len: usize,
    pub max_genome_len: usize,

    // === Death ===
    pub quorum_cap: u32,
    pub fault_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: LayoutKind::Torus,
            width: 8,
            height: 8,

            backend: Backend::Proc,
            windows: Windows::default(),
            compact_buffers: true,

            seed: 1,
            workers: num_cpus::get().max(1),
            services: ServiceKind::default_order()
                .iter()
                .map(|k| k.name().to_string())
                .collect(),
            max_consecutive_failures: 3,

            initial_stock: 1.0,
            decay_rate: 0.05,
            harvest_amount: 0.1,
            send_threshold: 2.0,
            send_fraction: 0.25,

            spawn_cost: 1.5,
            mutation_rate: 0.02,
            initial_genome_len: 16,
            max_genome_len: 64,

            quorum_cap: 5,
            fault_rate: 0.0,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Overlay environment variables on the defaults.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let d = Self::default();
        let layout = match std::env::var("LAYOUT") {
            Ok(name) => LayoutKind::from_name(&name)?,
            Err(_) => d.layout,
        };
        let backend = match std::env::var("BACKEND") {
            Ok(name) => Backend::from_name(&name)?,
            Err(_) => d.backend,
        };
        let services = match std::env::var("SERVICES") {
            Ok(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => d.services.clone(),
        };

        let cfg = Self {
            layout,
            width: env_parse("WIDTH").unwrap_or(d.width),
            height: env_parse("HEIGHT").unwrap_or(d.height),
            backend,
            windows: Windows {
                resource: env_parse("WINDOW_RESOURCE").unwrap_or(d.windows.resource),
                state: env_parse("WINDOW_STATE").unwrap_or(d.windows.state),
                spawn: env_parse("WINDOW_SPAWN").unwrap_or(d.windows.spawn),
            },
            compact_buffers: env_parse("COMPACT_BUFFERS").unwrap_or(d.compact_buffers),
            seed: env_parse("SEED").unwrap_or(d.seed),
            workers: env_parse("WORKERS").unwrap_or(d.workers),
            services,
            max_consecutive_failures: env_parse("MAX_FAILURES").unwrap_or(d.max_consecutive_failures),
            initial_stock: env_parse("INITIAL_STOCK").unwrap_or(d.initial_stock),
            decay_rate: env_parse("DECAY_RATE").unwrap_or(d.decay_rate),
            harvest_amount: env_parse("HARVEST").unwrap_or(d.harvest_amount),
            send_threshold: env_parse("SEND_THRESHOLD").unwrap_or(d.send_threshold),
            send_fraction: env_parse("SEND_FRACTION").unwrap_or(d.send_fraction),
            spawn_cost: env_parse("SPAWN_COST").unwrap_or(d.spawn_cost),
            mutation_rate: env_parse("MUTATION_RATE").unwrap_or(d.mutation_rate),
            initial_genome_len: env_parse("GENOME_LEN").unwrap_or(d.initial_genome_len),
            max_genome_len: env_parse("MAX_GENOME_LEN").unwrap_or(d.max_genome_len),
            quorum_cap: env_parse("QUORUM_CAP").unwrap_or(d.quorum_cap),
            fault_rate: env_parse("FAULT_RATE").unwrap_or(d.fault_rate),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.width == 0 {
            return Err(ConfigurationError::InvalidDimension { name: "width", value: self.width });
        }
        if self.height == 0 {
            return Err(ConfigurationError::InvalidDimension { name: "height", value: self.height });
        }
        for (class, value) in [
            ("resource", self.windows.resource),
            ("state", self.windows.state),
            ("spawn", self.windows.spawn),
        ] {
            if value > MAX_WINDOW {
                return Err(ConfigurationError::InvalidWindow { class, value });
            }
        }
        if self.workers == 0 {
            return Err(ConfigurationError::NoWorkers);
        }
        if self.services.is_empty() {
            return Err(ConfigurationError::EmptyRegistry);
        }
        for name in &self.services {
            ServiceKind::from_name(name)?;
        }
        for (name, value) in [
            ("decay_rate", self.decay_rate),
            ("send_fraction", self.send_fraction),
            ("mutation_rate", self.mutation_rate),
            ("fault_rate", self.fault_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::OutOfUnitRange { name, value });
            }
        }
        for (name, value) in [
            ("initial_stock", self.initial_stock),
            ("harvest_amount", self.harvest_amount),
            ("send_threshold", self.send_threshold),
            ("spawn_cost", self.spawn_cost),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidQuantity { name, value });
            }
        }
        Ok(())
    }

    /// Number of cells implied by layout and dimensions.
    pub fn cell_count(&self) -> usize {
        match self.layout {
            LayoutKind::Torus => self.width * self.height,
            LayoutKind::Ring | LayoutKind::DirectedRing => self.width,
        }
    }

    /// SHA-256 over the canonical JSON form, stamped into checkpoints.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}
