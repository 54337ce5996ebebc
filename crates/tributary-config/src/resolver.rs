//! Layered configuration resolution.
//!
//! A resolved configuration is built in three layers: system defaults, then
//! user supplied keys, then corrections made by invariant checks. Every key
//! remembers which layer won. Corrections and dropped keys are recorded as
//! warnings and logged.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;
use tributary_core::Result;
use tributary_core::spec::ConfigValue;

/// Which layer supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfigSource {
    Default,
    User,
    /// Rewritten by an invariant check or forced by the system.
    Correction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntry {
    pub value: ConfigValue,
    pub source: ConfigSource,
}

/// A non-fatal correction applied during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationWarning {
    pub field: String,
    pub message: String,
}

/// Result of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedConfiguration {
    field_prefix: String,
    entries: BTreeMap<String, ResolvedEntry>,
    warnings: Vec<ConfigurationWarning>,
}

impl ResolvedConfiguration {
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Value rendered as a properties string.
    pub fn rendered(&self, key: &str) -> Option<String> {
        self.get(key).map(ConfigValue::render)
    }

    pub fn source(&self, key: &str) -> Option<ConfigSource> {
        self.entries.get(key).map(|e| e.source)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn warnings(&self) -> &[ConfigurationWarning] {
        &self.warnings
    }

    /// Plain key/value view, without provenance.
    pub fn values(&self) -> BTreeMap<String, ConfigValue> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Full field path of `key`, used in messages.
    pub fn field(&self, key: &str) -> String {
        if self.field_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.field_prefix, key)
        }
    }

    /// Rewrite `key` to satisfy an invariant. Records a warning.
    pub fn correct(&mut self, key: &str, value: ConfigValue, message: impl Into<String>) {
        let warning = ConfigurationWarning {
            field: self.field(key),
            message: message.into(),
        };
        warn!(field = %warning.field, "{}", warning.message);
        self.warnings.push(warning);
        self.entries.insert(
            key.to_string(),
            ResolvedEntry {
                value,
                source: ConfigSource::Correction,
            },
        );
    }

    /// Force `key` to a system-owned value. Not a user-visible correction.
    pub fn force(&mut self, key: &str, value: ConfigValue) {
        self.entries.insert(
            key.to_string(),
            ResolvedEntry {
                value,
                source: ConfigSource::Correction,
            },
        );
    }

    /// `key=value` lines in key order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, entry) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(&entry.value.render());
            out.push('\n');
        }
        out
    }

    fn insert(&mut self, key: &str, value: &ConfigValue, source: ConfigSource) {
        self.entries.insert(
            key.to_string(),
            ResolvedEntry {
                value: value.clone(),
                source,
            },
        );
    }

    fn drop_key(&mut self, key: &str) {
        let warning = ConfigurationWarning {
            field: self.field(key),
            message: "option is forbidden and has been ignored".to_string(),
        };
        warn!(field = %warning.field, "configuration option is forbidden, ignoring it");
        self.warnings.push(warning);
    }
}

/// An invariant check run after layering. May rewrite keys or reject the
/// configuration outright.
pub type InvariantCheck = fn(&mut ResolvedConfiguration) -> Result<()>;

/// Defaults and rules for one configuration section.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationPolicy {
    /// Field path of the section, e.g. `spec.config`.
    pub field_prefix: String,
    pub defaults: BTreeMap<String, ConfigValue>,
    /// Keys starting with one of these are owned by the system.
    pub forbidden_prefixes: Vec<&'static str>,
    /// Exact keys allowed despite a forbidden prefix.
    pub forbidden_exceptions: Vec<&'static str>,
    pub checks: Vec<InvariantCheck>,
}

impl ConfigurationPolicy {
    pub fn new(field_prefix: impl Into<String>) -> Self {
        Self {
            field_prefix: field_prefix.into(),
            ..Default::default()
        }
    }

    /// Matching ignores case on both sides.
    pub fn is_forbidden(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.forbidden_prefixes
            .iter()
            .any(|prefix| lower.starts_with(&prefix.to_lowercase()))
            && !self
                .forbidden_exceptions
                .iter()
                .any(|exception| exception.to_lowercase() == lower)
    }
}

/// Layer `user` over the policy's defaults and run its invariant checks.
///
/// Missing keys never fail; they keep their default. Only an invariant check
/// can fail resolution. Running `resolve` on its own output yields the same
/// values and no further corrections.
pub fn resolve(
    user: &BTreeMap<String, ConfigValue>,
    policy: &ConfigurationPolicy,
) -> Result<ResolvedConfiguration> {
    let mut resolved = ResolvedConfiguration {
        field_prefix: policy.field_prefix.clone(),
        ..Default::default()
    };

    for (key, value) in &policy.defaults {
        resolved.insert(key, value, ConfigSource::Default);
    }

    for (key, value) in user {
        if policy.is_forbidden(key) {
            resolved.drop_key(key);
            continue;
        }
        resolved.insert(key, value, ConfigSource::User);
    }

    for check in &policy.checks {
        check(&mut resolved)?;
    }

    Ok(resolved)
}
