//! Bus condition simulation for testing

use rand::Rng;
use std::time::Duration;

/// Bus condition simulator
#[derive(Clone, Debug)]
pub struct BusConditions {
    /// Probability that an exchange fails (0.0 to 1.0)
    pub fault_rate: f64,
    /// Base latency added to every exchange
    pub latency_us: u32,
    /// Jitter range (max extra latency)
    pub jitter_us: u32,
}

impl BusConditions {
    /// Ideal bus (no faults, no latency)
    #[must_use]
    pub fn perfect() -> Self {
        Self {
            fault_rate: 0.0,
            latency_us: 0,
            jitter_us: 0,
        }
    }

    /// Short, clean board-level bus
    #[must_use]
    pub fn short_trace() -> Self {
        Self {
            fault_rate: 0.0,
            latency_us: 70,
            jitter_us: 10,
        }
    }

    /// Long cable with occasional corruption
    #[must_use]
    pub fn long_cable() -> Self {
        Self {
            fault_rate: 0.01,
            latency_us: 200,
            jitter_us: 150,
        }
    }

    /// Noisy environment (stress test)
    #[must_use]
    pub fn noisy() -> Self {
        Self {
            fault_rate: 0.10,
            latency_us: 500,
            jitter_us: 1_000,
        }
    }

    /// Should this exchange fail?
    #[must_use]
    pub fn should_fault(&self) -> bool {
        if self.fault_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.fault_rate.min(1.0))
    }

    /// Get latency for this exchange
    #[must_use]
    pub fn get_delay(&self) -> Duration {
        let jitter: u32 = if self.jitter_us > 0 {
            rand::thread_rng().gen_range(0..self.jitter_us)
        } else {
            0
        };

        Duration::from_micros(u64::from(self.latency_us + jitter))
    }
}

impl Default for BusConditions {
    fn default() -> Self {
        Self::perfect()
    }
}
