//! Fault rules for the simulated backend.
//!
//! `TigerStyle`: Every fault is named, filtered to the steps it targets and
//! optionally capped, so a scenario states exactly what goes wrong.

use std::sync::Mutex;

use super::rng::DeterministicRng;
use crate::constants::{DST_FAULT_PROBABILITY_MAX, DST_FAULT_PROBABILITY_MIN};

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    // =========================================================================
    // Transport Faults (transient, retried by the connection layer)
    // =========================================================================
    /// Round-trip exceeded its timeout
    NetworkTimeout,
    /// Backend refused the connection
    NetworkConnectionRefused,

    // =========================================================================
    // Store Faults
    // =========================================================================
    /// Read / search request rejected
    StoreReadFail,
    /// Delete request rejected
    StoreDeleteFail,
    /// A single item of a bulk write rejected
    BulkItemReject,

    // =========================================================================
    // Provisioning Faults
    // =========================================================================
    /// Lifecycle policy could not be written
    PolicyWriteFail,
    /// Index template could not be written
    TemplateWriteFail,
    /// Head segment could not be created
    SegmentCreateFail,
}

impl FaultType {
    /// Get the fault type name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network_timeout",
            Self::NetworkConnectionRefused => "network_connection_refused",
            Self::StoreReadFail => "store_read_fail",
            Self::StoreDeleteFail => "store_delete_fail",
            Self::BulkItemReject => "bulk_item_reject",
            Self::PolicyWriteFail => "policy_write_fail",
            Self::TemplateWriteFail => "template_write_fail",
            Self::SegmentCreateFail => "segment_create_fail",
        }
    }

    /// Whether the connection layer should retry this fault.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkTimeout | Self::NetworkConnectionRefused)
    }
}

/// Configuration for a specific fault.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// The type of fault
    pub fault_type: FaultType,
    /// Probability of injection (0.0 to 1.0)
    pub probability: f64,
    /// Optional operation filter (substring match)
    pub operation_filter: Option<String>,
    /// Maximum number of injections (None = unlimited)
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a new fault configuration.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        // Precondition
        assert!(
            (DST_FAULT_PROBABILITY_MIN..=DST_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            max_injections: None,
        }
    }

    /// Restrict the fault to operations whose name contains `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    /// Set maximum number of injections.
    ///
    /// # Panics
    /// Panics if `max` is zero.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        // Precondition
        assert!(max > 0, "max_injections must be positive");
        self.max_injections = Some(max);
        self
    }
}

/// Registered rule plus its live state.
#[derive(Debug)]
struct FaultRule {
    config: FaultConfig,
    rng: DeterministicRng,
    injected: u64,
}

impl FaultRule {
    fn applies_to(&self, operation: &str) -> bool {
        let filtered_in = self
            .config
            .operation_filter
            .as_deref()
            .map_or(true, |filter| operation.contains(filter));
        let budget_left = self
            .config
            .max_injections
            .map_or(true, |max| self.injected < max);
        filtered_in && budget_left
    }
}

/// Decides, per simulated step, whether a registered fault fires.
///
/// Each rule rolls on its own stream derived from the injector's seed and
/// the rule's position, so one rule's rolls never depend on another's.
/// The first rule that applies and rolls true wins.
#[derive(Debug)]
pub struct FaultInjector {
    root: DeterministicRng,
    rules: Mutex<Vec<FaultRule>>,
}

impl FaultInjector {
    /// Injector with no rules, seeded from `rng`.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            root: rng,
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Add a rule. Rules are consulted in registration order.
    ///
    /// # Panics
    /// Panics if an internal lock is poisoned.
    pub fn register(&mut self, config: FaultConfig) {
        let rules = self.rules.get_mut().unwrap();
        let label = format!("rule-{}-{}", rules.len(), config.fault_type.as_str());
        rules.push(FaultRule {
            rng: self.root.stream(&label),
            config,
            injected: 0,
        });
    }

    /// Fault to inject into `operation`, if any.
    ///
    /// # Panics
    /// Panics if an internal lock is poisoned.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        let mut rules = self.rules.lock().unwrap();
        rules
            .iter_mut()
            .filter(|rule| rule.applies_to(operation))
            .find_map(|rule| {
                let probability = rule.config.probability;
                rule.rng.chance(probability).then(|| {
                    rule.injected += 1;
                    rule.config.fault_type
                })
            })
    }

    /// Injections of `fault_type` so far, across every rule that carries it.
    ///
    /// # Panics
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn injections(&self, fault_type: FaultType) -> u64 {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .filter(|rule| rule.config.fault_type == fault_type)
            .map(|rule| rule.injected)
            .sum()
    }

    /// Injections so far across all rules.
    ///
    /// # Panics
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn total_injections(&self) -> u64 {
        self.rules.lock().unwrap().iter().map(|rule| rule.injected).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injector_with(config: FaultConfig) -> FaultInjector {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(config);
        injector
    }

    #[test]
    fn test_empty_injector_never_fires() {
        let injector = FaultInjector::new(DeterministicRng::new(42));
        assert!((0..100).all(|_| injector.should_inject("bulk_item").is_none()));
        assert_eq!(injector.total_injections(), 0);
    }

    #[test]
    fn test_always_inject() {
        let injector = injector_with(FaultConfig::new(FaultType::StoreReadFail, 1.0));

        for _ in 0..10 {
            assert_eq!(
                injector.should_inject("read"),
                Some(FaultType::StoreReadFail)
            );
        }
        assert_eq!(injector.injections(FaultType::StoreReadFail), 10);
    }

    #[test]
    fn test_operation_filter() {
        let injector = injector_with(
            FaultConfig::new(FaultType::PolicyWriteFail, 1.0).with_filter("provision_policy"),
        );

        assert_eq!(
            injector.should_inject("provision_policy"),
            Some(FaultType::PolicyWriteFail)
        );
        assert!(injector.should_inject("provision_template").is_none());
    }

    #[test]
    fn test_max_injections() {
        let injector = injector_with(
            FaultConfig::new(FaultType::NetworkTimeout, 1.0).with_max_injections(2),
        );

        assert!(injector.should_inject("op").is_some());
        assert!(injector.should_inject("op").is_some());
        assert!(injector.should_inject("op").is_none());
        assert_eq!(injector.total_injections(), 2);
    }

    #[test]
    fn test_capped_rule_falls_through_to_next() {
        let mut injector = FaultInjector::new(DeterministicRng::new(7));
        injector.register(FaultConfig::new(FaultType::NetworkTimeout, 1.0).with_max_injections(1));
        injector.register(FaultConfig::new(FaultType::StoreReadFail, 1.0));

        assert_eq!(injector.should_inject("read"), Some(FaultType::NetworkTimeout));
        assert_eq!(injector.should_inject("read"), Some(FaultType::StoreReadFail));
        assert_eq!(injector.injections(FaultType::NetworkTimeout), 1);
        assert_eq!(injector.injections(FaultType::StoreReadFail), 1);
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let schedule = |seed: u64| {
            let mut injector = FaultInjector::new(DeterministicRng::new(seed));
            injector.register(FaultConfig::new(FaultType::BulkItemReject, 0.5));
            (0..64)
                .map(|_| injector.should_inject("bulk_item").is_some())
                .collect::<Vec<_>>()
        };
        assert_eq!(schedule(9), schedule(9));
    }

    #[test]
    fn test_transient_classification() {
        assert!(FaultType::NetworkTimeout.is_transient());
        assert!(FaultType::NetworkConnectionRefused.is_transient());
        assert!(!FaultType::PolicyWriteFail.is_transient());
        assert!(!FaultType::BulkItemReject.is_transient());
    }

    #[test]
    #[should_panic(expected = "probability must be in")]
    fn test_invalid_probability() {
        let _ = FaultConfig::new(FaultType::StoreReadFail, 1.5);
    }

    #[test]
    #[should_panic(expected = "max_injections must be positive")]
    fn test_invalid_max_injections() {
        let _ = FaultConfig::new(FaultType::StoreReadFail, 0.5).with_max_injections(0);
    }
}
