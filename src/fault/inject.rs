use crate::config::Config;

/// Rates at which deliberate failures are raised inside the service battery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultProfile {
    pub service_fault_rate: f64,
}

impl FaultProfile {
    pub fn disabled() -> Self {
        Self { service_fault_rate: 0.0 }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self { service_fault_rate: cfg.fault_rate }
    }

    pub fn is_enabled(&self) -> bool {
        self.service_fault_rate > 0.0
    }
}

/// Deterministic coin flip: the same seed always gives the same answer.
pub fn should_fault(seed: u64, rate: f64) -> bool {
    let v = (seed % 10_000) as f64 / 10_000.0;
    v < rate
}
