//! Service battery.
//!
//! A service is a named unit of per-cell behavior. The registry fixes the
//! order services run in; the scheduler runs that order for every cell, every
//! tick. Built-ins are tagged [`ServiceKind`] variants; anything else can be
//! pushed as a boxed [`Service`].

pub mod genome;
pub mod lifecycle;
pub mod resource;
pub mod signal;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cell::Cell;
use crate::config::Config;
use crate::error::{ConfigurationError, ServiceFailure};

/// Everything a service may touch while it runs for one cell.
pub struct CellContext<'a> {
    pub cell: &'a mut Cell,
    pub tick: u64,
    pub config: &'a Config,
    pub rng: StdRng,
}

impl<'a> CellContext<'a> {
    /// The rng depends only on (seed, tick, cell, service position), never on
    /// worker assignment.
    pub fn new(cell: &'a mut Cell, tick: u64, config: &'a Config, slot: usize) -> Self {
        let rng = StdRng::seed_from_u64(mix_seed(config.seed, tick, cell.id.0 as u64, slot as u64));
        Self { cell, tick, config, rng }
    }
}

fn mix_seed(seed: u64, tick: u64, cell: u64, slot: u64) -> u64 {
    // splitmix64 finalizer over a simple combination
    let mut z = seed
        ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ cell.wrapping_mul(0xBF58_476D_1CE4_E5B9)
        ^ slot.wrapping_mul(0x94D0_49BB_1331_11EB);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Dead cells are skipped unless this returns true.
    fn runs_on_dead(&self) -> bool {
        false
    }

    fn run(&self, cx: &mut CellContext<'_>) -> Result<(), ServiceFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    CellAge,
    ResourceDecay,
    ResourceHarvesting,
    ResourceReceiving,
    CpuExecution,
    Mutation,
    ResourceSending,
    StateOutputPut,
    StateInputJump,
    Quorum,
    SpawnSending,
    BirthSetup,
    Apoptosis,
    CellDeath,
    FaultInjection,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 15] = [
        ServiceKind::CellAge,
        ServiceKind::ResourceDecay,
        ServiceKind::ResourceHarvesting,
        ServiceKind::ResourceReceiving,
        ServiceKind::CpuExecution,
        ServiceKind::Mutation,
        ServiceKind::ResourceSending,
        ServiceKind::StateOutputPut,
        ServiceKind::StateInputJump,
        ServiceKind::Quorum,
        ServiceKind::SpawnSending,
        ServiceKind::BirthSetup,
        ServiceKind::Apoptosis,
        ServiceKind::CellDeath,
        ServiceKind::FaultInjection,
    ];

    /// The battery in its standard order.
    pub fn default_order() -> &'static [ServiceKind] {
        &Self::ALL
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::CellAge => "CellAge",
            ServiceKind::ResourceDecay => "ResourceDecay",
            ServiceKind::ResourceHarvesting => "ResourceHarvesting",
            ServiceKind::ResourceReceiving => "ResourceReceiving",
            ServiceKind::CpuExecution => "CpuExecution",
            ServiceKind::Mutation => "Mutation",
            ServiceKind::ResourceSending => "ResourceSending",
            ServiceKind::StateOutputPut => "StateOutputPut",
            ServiceKind::StateInputJump => "StateInputJump",
            ServiceKind::Quorum => "Quorum",
            ServiceKind::SpawnSending => "SpawnSending",
            ServiceKind::BirthSetup => "BirthSetup",
            ServiceKind::Apoptosis => "Apoptosis",
            ServiceKind::CellDeath => "CellDeath",
            ServiceKind::FaultInjection => "FaultInjection",
        }
    }

    /// Accepts the bare name or the `...Service` spelling.
    pub fn from_name(name: &str) -> Result<Self, ConfigurationError> {
        let trimmed = name.trim();
        let bare = trimmed.strip_suffix("Service").unwrap_or(trimmed);
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(bare))
            .ok_or_else(|| ConfigurationError::UnknownService(trimmed.to_string()))
    }
}

impl Service for ServiceKind {
    fn name(&self) -> &str {
        ServiceKind::name(self)
    }

    fn runs_on_dead(&self) -> bool {
        matches!(self, ServiceKind::StateOutputPut | ServiceKind::BirthSetup)
    }

    fn run(&self, cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
        match self {
            ServiceKind::CellAge => lifecycle::age(cx),
            ServiceKind::ResourceDecay => resource::decay(cx),
            ServiceKind::ResourceHarvesting => resource::harvest(cx),
            ServiceKind::ResourceReceiving => resource::receive(cx),
            ServiceKind::CpuExecution => genome::execute(cx),
            ServiceKind::Mutation => genome::mutate(cx),
            ServiceKind::ResourceSending => resource::send(cx),
            ServiceKind::StateOutputPut => signal::put_state(cx),
            ServiceKind::StateInputJump => signal::jump_state(cx),
            ServiceKind::Quorum => signal::quorum(cx),
            ServiceKind::SpawnSending => lifecycle::send_spawn(cx),
            ServiceKind::BirthSetup => lifecycle::birth(cx),
            ServiceKind::Apoptosis => lifecycle::apoptosis(cx),
            ServiceKind::CellDeath => lifecycle::death(cx),
            ServiceKind::FaultInjection => lifecycle::inject_fault(cx),
        }
    }
}

/// Ordered service list. Order of insertion is order of execution.
#[derive(Default)]
pub struct Registry {
    services: Vec<Box<dyn Service>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_kinds(kinds: &[ServiceKind]) -> Self {
        let mut registry = Self::new();
        for kind in kinds {
            registry.push(Box::new(*kind));
        }
        registry
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigurationError> {
        if names.is_empty() {
            return Err(ConfigurationError::EmptyRegistry);
        }
        let kinds = names
            .iter()
            .map(|n| ServiceKind::from_name(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_kinds(&kinds))
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ConfigurationError> {
        Self::from_names(cfg.services.as_slice())
    }

    pub fn push(&mut self, service: Box<dyn Service>) {
        self.services.push(service);
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Service> {
        self.services.iter().map(|s| s.as_ref())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
