//! Admission strategy trait and construction from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::bucket::Meter;
use crate::config::{AdmissionConfig, AdmissionMode};
use crate::error::{GateError, Result};

/// Outcome of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed
    Admitted,
    /// The request is dropped
    Rejected,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Trait for admission strategies.
///
/// This trait lets the HTTP layer gate requests without knowing which
/// algorithm makes the decision. The meter is the only implementation today;
/// a queue-based strategy would plug in here.
#[async_trait]
pub trait AdmissionStrategy: Send + Sync {
    /// Decide whether one incoming request is admitted.
    async fn admit(&self) -> Admission;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Build the admission strategy selected by `config`.
///
/// Must be called from within a tokio runtime, since the meter spawns its
/// leak task on construction.
pub fn build_strategy(config: &AdmissionConfig) -> Result<Arc<dyn AdmissionStrategy>> {
    match config.mode {
        AdmissionMode::Meter => {
            let capacity = config.capacity()?;
            let leak_rate = config.leak_rate()?;
            info!(
                capacity = capacity.get(),
                leak_rate_ms = leak_rate.as_millis() as u64,
                "Starting leaky bucket meter"
            );
            let meter: Arc<dyn AdmissionStrategy> = Meter::start(capacity, leak_rate);
            Ok(meter)
        }
        AdmissionMode::Queue => Err(GateError::UnsupportedMode(config.mode.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_meter_strategy() {
        let config = AdmissionConfig {
            mode: AdmissionMode::Meter,
            capacity: 2,
            leak_rate_ms: 60_000,
        };

        let strategy = build_strategy(&config).unwrap();
        assert_eq!(strategy.name(), "meter");

        assert_eq!(strategy.admit().await, Admission::Admitted);
        assert_eq!(strategy.admit().await, Admission::Admitted);
        assert_eq!(strategy.admit().await, Admission::Rejected);
    }

    #[tokio::test]
    async fn test_queue_mode_unsupported() {
        let config = AdmissionConfig {
            mode: AdmissionMode::Queue,
            ..AdmissionConfig::default()
        };

        let result = build_strategy(&config);
        assert!(matches!(result, Err(GateError::UnsupportedMode(ref m)) if m == "queue"));
    }

    #[tokio::test]
    async fn test_invalid_meter_config_rejected() {
        let config = AdmissionConfig {
            capacity: 0,
            ..AdmissionConfig::default()
        };

        assert!(matches!(build_strategy(&config), Err(GateError::Config(_))));
    }

    #[test]
    fn test_admission_is_admitted() {
        assert!(Admission::Admitted.is_admitted());
        assert!(!Admission::Rejected.is_admitted());
    }
}
