//! Workload balancer configuration: defaults, goal sets and their invariants.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tributary_core::spec::ConfigValue;
use tributary_core::{Error, Result};

use crate::resolver::{ConfigurationPolicy, ResolvedConfiguration};

pub const DEFAULT_GOALS_KEY: &str = "default.goals";
pub const GOALS_KEY: &str = "goals";
pub const HARD_GOALS_KEY: &str = "hard.goals";
pub const ANOMALY_DETECTION_GOALS_KEY: &str = "anomaly.detection.goals";
pub const SELF_HEALING_GOALS_KEY: &str = "self.healing.goals";
pub const API_SSL_ENABLED_KEY: &str = "webserver.ssl.enable";
pub const API_AUTH_ENABLED_KEY: &str = "webserver.security.enable";

const GOAL_PACKAGE: &str = "com.linkedin.kafka.cruisecontrol.analyzer.goals";

const DEFAULT_GOALS: &[&str] = &[
    "RackAwareGoal",
    "MinTopicLeadersPerBrokerGoal",
    "ReplicaCapacityGoal",
    "DiskCapacityGoal",
    "NetworkInboundCapacityGoal",
    "NetworkOutboundCapacityGoal",
    "CpuCapacityGoal",
    "ReplicaDistributionGoal",
    "PotentialNwOutGoal",
    "DiskUsageDistributionGoal",
    "NetworkInboundUsageDistributionGoal",
    "NetworkOutboundUsageDistributionGoal",
    "CpuUsageDistributionGoal",
    "TopicReplicaDistributionGoal",
    "LeaderReplicaDistributionGoal",
    "LeaderBytesInDistributionGoal",
    "PreferredLeaderElectionGoal",
];

const HARD_GOALS: &[&str] = &[
    "RackAwareGoal",
    "MinTopicLeadersPerBrokerGoal",
    "ReplicaCapacityGoal",
    "DiskCapacityGoal",
    "NetworkInboundCapacityGoal",
    "NetworkOutboundCapacityGoal",
    "CpuCapacityGoal",
];

const DEFAULT_ANOMALY_DETECTION_GOALS: &[&str] = &[
    "RackAwareGoal",
    "MinTopicLeadersPerBrokerGoal",
    "ReplicaCapacityGoal",
    "DiskCapacityGoal",
];

static GOAL_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*,\s*").unwrap());

fn qualified(goals: &[&str]) -> String {
    goals
        .iter()
        .map(|g| format!("{}.{}", GOAL_PACKAGE, g))
        .collect::<Vec<_>>()
        .join(",")
}

/// Split a goal list on commas, ignoring surrounding whitespace and empty tokens.
pub fn split_goals(goals: &str) -> Vec<&str> {
    GOAL_SEPARATOR
        .split(goals.trim())
        .filter(|g| !g.is_empty())
        .collect()
}

/// System defaults of the balancer's own configuration.
pub fn default_properties() -> BTreeMap<String, ConfigValue> {
    let mut defaults = BTreeMap::new();
    let mut put = |k: &str, v: String| {
        defaults.insert(k.to_string(), ConfigValue::String(v));
    };

    put("partition.metrics.window.ms", "300000".into());
    put("num.partition.metrics.windows", "1".into());
    put("broker.metrics.window.ms", "300000".into());
    put("num.broker.metrics.windows", "20".into());
    put("completed.user.task.retention.time.ms", "86400000".into());
    put("webserver.http.cors.enabled", "false".into());
    put(API_SSL_ENABLED_KEY, "true".into());
    put(API_AUTH_ENABLED_KEY, "true".into());
    put(DEFAULT_GOALS_KEY, qualified(DEFAULT_GOALS));
    put(GOALS_KEY, qualified(DEFAULT_GOALS));
    put(HARD_GOALS_KEY, qualified(HARD_GOALS));
    put(
        ANOMALY_DETECTION_GOALS_KEY,
        qualified(DEFAULT_ANOMALY_DETECTION_GOALS),
    );

    defaults
}

/// Resolution policy for the balancer's configuration.
pub fn policy() -> ConfigurationPolicy {
    ConfigurationPolicy {
        field_prefix: "spec.config".to_string(),
        defaults: default_properties(),
        forbidden_prefixes: vec![
            "bootstrap.servers",
            "client.id",
            "zookeeper.",
            "network.",
            "security.",
            "failed.brokers.zk.path",
            "webserver.http.",
            "webserver.api.urlprefix",
            "webserver.session.path",
            "webserver.accesslog.",
            "two.step.",
            "request.reason.required",
            "metric.reporter.sampler.bootstrap.servers",
            "capacity.config.file",
            "skip.sample.store.topic.rack.awareness.check",
            "cruise.control.metrics.topic",
            "sasl.",
            "ssl.",
            "kafka.broker.failure.detection.enable",
            "topic.config.provider.class",
        ],
        forbidden_exceptions: vec![
            "ssl.cipher.suites",
            "ssl.protocol",
            "ssl.enabled.protocols",
            "webserver.http.cors.enabled",
            "webserver.http.cors.origin",
            "webserver.http.cors.exposeheaders",
        ],
        checks: vec![check_self_healing, check_anomaly_goals],
    }
}

/// Self-healing is unsupported: any non-empty goal list is rejected.
pub fn check_self_healing(config: &mut ResolvedConfiguration) -> Result<()> {
    if let Some(value) = config.rendered(SELF_HEALING_GOALS_KEY) {
        if !split_goals(&value).is_empty() {
            return Err(Error::validation(
                config.field(SELF_HEALING_GOALS_KEY),
                "self-healing is not supported, remove this option",
            ));
        }
    }
    Ok(())
}

/// Anomaly detection goals must be a subset of the default goals. If they are
/// not, they are replaced by the default goals verbatim.
pub fn check_anomaly_goals(config: &mut ResolvedConfiguration) -> Result<()> {
    let default_goals = config
        .get(DEFAULT_GOALS_KEY)
        .cloned()
        .unwrap_or_else(|| ConfigValue::String(qualified(DEFAULT_GOALS)));
    let anomaly_goals = config
        .rendered(ANOMALY_DETECTION_GOALS_KEY)
        .unwrap_or_else(|| qualified(DEFAULT_ANOMALY_DETECTION_GOALS));

    let rendered_defaults = default_goals.render();
    let allowed: BTreeSet<&str> = split_goals(&rendered_defaults).into_iter().collect();
    let outside: Vec<&str> = split_goals(&anomaly_goals)
        .into_iter()
        .filter(|g| !allowed.contains(g))
        .collect();

    if !outside.is_empty() {
        let message = format!(
            "anomaly detection goals {:?} are not in the default goals, using the default goals instead",
            outside
        );
        config.correct(ANOMALY_DETECTION_GOALS_KEY, default_goals, message);
    }
    Ok(())
}

/// Whether the balancer's REST API is served over TLS.
pub fn api_ssl_enabled(config: &ResolvedConfiguration) -> bool {
    flag(config, API_SSL_ENABLED_KEY)
}

/// Whether the balancer's REST API requires authentication.
pub fn api_auth_enabled(config: &ResolvedConfiguration) -> bool {
    flag(config, API_AUTH_ENABLED_KEY)
}

fn flag(config: &ResolvedConfiguration, key: &str) -> bool {
    match config.get(key) {
        Some(ConfigValue::Bool(b)) => *b,
        Some(other) => !other.render().eq_ignore_ascii_case("false"),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{resolve, ConfigSource};

    fn config(pairs: &[(&str, &str)]) -> BTreeMap<String, ConfigValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ConfigValue::from(*v)))
            .collect()
    }

    fn goal_policy(default_goals: &str) -> ConfigurationPolicy {
        let mut policy = ConfigurationPolicy::new("spec.config");
        policy
            .defaults
            .insert(DEFAULT_GOALS_KEY.into(), default_goals.into());
        policy.checks = vec![check_self_healing, check_anomaly_goals];
        policy
    }

    #[test]
    fn test_anomaly_goals_outside_defaults_are_replaced() {
        let policy = goal_policy("G1,G2,G3");
        let resolved = resolve(
            &config(&[(ANOMALY_DETECTION_GOALS_KEY, "G1,G2,G9")]),
            &policy,
        )
        .unwrap();

        assert_eq!(
            resolved.rendered(ANOMALY_DETECTION_GOALS_KEY).as_deref(),
            Some("G1,G2,G3")
        );
        assert_eq!(
            resolved.source(ANOMALY_DETECTION_GOALS_KEY),
            Some(ConfigSource::Correction)
        );
        assert_eq!(resolved.warnings().len(), 1);
        assert_eq!(
            resolved.warnings()[0].field,
            "spec.config.anomaly.detection.goals"
        );
    }

    #[test]
    fn test_anomaly_goals_subset_is_kept() {
        let policy = goal_policy("G1, G2 ,G3");
        let resolved =
            resolve(&config(&[(ANOMALY_DETECTION_GOALS_KEY, "G3,G1")]), &policy).unwrap();

        assert_eq!(
            resolved.rendered(ANOMALY_DETECTION_GOALS_KEY).as_deref(),
            Some("G3,G1")
        );
        assert!(resolved.warnings().is_empty());
    }

    #[test]
    fn test_replacement_uses_user_default_goals() {
        let policy = goal_policy("G1,G2,G3");
        let resolved = resolve(
            &config(&[
                (DEFAULT_GOALS_KEY, "G1,G4"),
                (ANOMALY_DETECTION_GOALS_KEY, "G2"),
            ]),
            &policy,
        )
        .unwrap();

        assert_eq!(
            resolved.rendered(ANOMALY_DETECTION_GOALS_KEY).as_deref(),
            Some("G1,G4")
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let policy = policy();
        let user = config(&[
            (ANOMALY_DETECTION_GOALS_KEY, "G1,G2,G9"),
            ("num.broker.metrics.windows", "10"),
        ]);

        let first = resolve(&user, &policy).unwrap();
        let second = resolve(&first.values(), &policy).unwrap();

        assert_eq!(first.values(), second.values());
        assert!(second.warnings().is_empty());
    }

    #[test]
    fn test_self_healing_goals_rejected() {
        let err = resolve(
            &config(&[(SELF_HEALING_GOALS_KEY, "RackAwareGoal")]),
            &policy(),
        )
        .unwrap_err();

        match err {
            Error::Validation { field, message } => {
                assert_eq!(field, "spec.config.self.healing.goals");
                assert!(message.contains("self-healing"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_self_healing_rejected_even_with_valid_anomaly_goals() {
        let result = resolve(
            &config(&[
                (SELF_HEALING_GOALS_KEY, "G1"),
                (ANOMALY_DETECTION_GOALS_KEY, "G1"),
            ]),
            &goal_policy("G1"),
        );
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_blank_self_healing_goals_accepted() {
        assert!(resolve(&config(&[(SELF_HEALING_GOALS_KEY, " ")]), &policy()).is_ok());
    }

    #[test]
    fn test_default_anomaly_goals_are_subset_of_default_goals() {
        let resolved = resolve(&BTreeMap::new(), &policy()).unwrap();
        assert!(resolved.warnings().is_empty());
        assert!(api_ssl_enabled(&resolved));
        assert!(api_auth_enabled(&resolved));
    }

    #[test]
    fn test_api_flags_follow_config() {
        let resolved = resolve(&config(&[(API_AUTH_ENABLED_KEY, "false")]), &policy()).unwrap();
        assert!(!api_auth_enabled(&resolved));
        assert!(api_ssl_enabled(&resolved));
    }
}
