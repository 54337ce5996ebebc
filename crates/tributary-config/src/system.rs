//! Operator-wide configuration.
//!
//! Loaded once at process start, either from the environment or from a KDL
//! file, and then passed by reference into every synthesis call.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tributary_core::spec::ComponentKind;
use tributary_core::{Error, Result};

pub const DEFAULT_PLATFORM_VERSION: &str = "3.9.0";
pub const DEFAULT_INIT_IMAGE: &str = "quay.io/tributary/operator:latest";
pub const DEFAULT_BUILDER_IMAGE: &str = "gcr.io/kaniko-project/executor:latest";
pub const DEFAULT_BRIDGE_IMAGE: &str = "quay.io/tributary/bridge:latest";

/// Operator-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Namespace the operator runs in. Used to admit it through network policies.
    pub namespace: Option<String>,
    pub namespace_labels: BTreeMap<String, String>,
    /// Extra pod labels per component.
    pub pod_labels: BTreeMap<ComponentKind, BTreeMap<String, String>>,
    pub bridge_service_labels: BTreeMap<String, String>,
    pub bridge_service_annotations: BTreeMap<String, String>,
    pub images: ImageDefaults,
    pub versions: VersionTable,
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDefaults {
    pub balancer: Option<String>,
    pub bridge: String,
    pub init: String,
    pub builder: String,
}

/// Platform version to image mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionTable {
    pub default_version: String,
    pub images: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        let mut images = BTreeMap::new();
        for version in ["3.8.0", DEFAULT_PLATFORM_VERSION] {
            images.insert(
                version.to_string(),
                format!("quay.io/tributary/kafka:latest-kafka-{}", version),
            );
        }

        Self {
            namespace: None,
            namespace_labels: BTreeMap::new(),
            pod_labels: BTreeMap::new(),
            bridge_service_labels: BTreeMap::new(),
            bridge_service_annotations: BTreeMap::new(),
            images: ImageDefaults {
                balancer: None,
                bridge: DEFAULT_BRIDGE_IMAGE.to_string(),
                init: DEFAULT_INIT_IMAGE.to_string(),
                builder: DEFAULT_BUILDER_IMAGE.to_string(),
            },
            versions: VersionTable {
                default_version: DEFAULT_PLATFORM_VERSION.to_string(),
                images,
            },
            proxy: ProxySettings::default(),
        }
    }
}

impl OperatorConfig {
    /// Build from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = Self::default();

        for (kind, var) in [
            (ComponentKind::Balancer, "TRIBUTARY_CUSTOM_BALANCER_LABELS"),
            (ComponentKind::Bridge, "TRIBUTARY_CUSTOM_BRIDGE_LABELS"),
            (ComponentKind::Mirror, "TRIBUTARY_CUSTOM_MIRROR_LABELS"),
            (ComponentKind::Build, "TRIBUTARY_CUSTOM_BUILD_LABELS"),
        ] {
            if let Some(value) = lookup(var) {
                config.pod_labels.insert(kind, parse_map(&value));
            }
        }

        if let Some(value) = lookup("TRIBUTARY_CUSTOM_BRIDGE_SERVICE_LABELS") {
            config.bridge_service_labels = parse_map(&value);
        }
        if let Some(value) = lookup("TRIBUTARY_CUSTOM_BRIDGE_SERVICE_ANNOTATIONS") {
            config.bridge_service_annotations = parse_map(&value);
        }

        config.namespace = lookup("TRIBUTARY_OPERATOR_NAMESPACE");
        if let Some(value) = lookup("TRIBUTARY_OPERATOR_NAMESPACE_LABELS") {
            config.namespace_labels = parse_map(&value);
        }

        config.images.balancer = lookup("TRIBUTARY_DEFAULT_BALANCER_IMAGE");
        if let Some(image) = lookup("TRIBUTARY_DEFAULT_BRIDGE_IMAGE") {
            config.images.bridge = image;
        }
        if let Some(image) = lookup("TRIBUTARY_DEFAULT_INIT_IMAGE") {
            config.images.init = image;
        }
        if let Some(image) = lookup("TRIBUTARY_DEFAULT_BUILDER_IMAGE") {
            config.images.builder = image;
        }

        if let Some(value) = lookup("TRIBUTARY_PLATFORM_IMAGES") {
            let images = parse_map(&value);
            if images.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "TRIBUTARY_PLATFORM_IMAGES".to_string(),
                    message: "no version=image pairs found".to_string(),
                });
            }
            config.versions.images = images;
        }
        if let Some(version) = lookup("TRIBUTARY_DEFAULT_VERSION") {
            config.versions.default_version = version;
        }

        config.proxy = ProxySettings {
            http_proxy: lookup("HTTP_PROXY"),
            https_proxy: lookup("HTTPS_PROXY"),
            no_proxy: lookup("NO_PROXY"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if !self
            .versions
            .images
            .contains_key(&self.versions.default_version)
        {
            return Err(ConfigError::InvalidValue {
                field: "default version".to_string(),
                message: format!(
                    "no image is known for default version {}",
                    self.versions.default_version
                ),
            });
        }
        Ok(())
    }

    /// Extra pod labels for `kind`.
    pub fn pod_labels_for(&self, kind: ComponentKind) -> BTreeMap<String, String> {
        self.pod_labels.get(&kind).cloned().unwrap_or_default()
    }

    /// Environment variables every generated container must carry.
    pub fn required_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        for (name, value) in [
            ("HTTP_PROXY", &self.proxy.http_proxy),
            ("HTTPS_PROXY", &self.proxy.https_proxy),
            ("NO_PROXY", &self.proxy.no_proxy),
        ] {
            if let Some(value) = value {
                env.push((name.to_string(), value.clone()));
            }
        }
        env
    }

    /// Platform image for an explicit image or a version.
    pub fn platform_image(&self, image: Option<&str>, version: Option<&str>) -> Result<String> {
        if let Some(image) = image {
            return Ok(image.to_string());
        }
        let version = version.unwrap_or(&self.versions.default_version);
        self.versions.images.get(version).cloned().ok_or_else(|| {
            Error::validation(
                "spec.version",
                format!("unsupported version {}", version),
            )
        })
    }
}

/// Parse `k1=v1,k2=v2` (or newline separated) into a map. Malformed pairs are skipped.
pub fn parse_map(value: &str) -> BTreeMap<String, String> {
    value
        .split([',', '\n'])
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = k.trim();
            if k.is_empty() {
                None
            } else {
                Some((k.to_string(), v.trim().to_string()))
            }
        })
        .collect()
}

/// Parse operator configuration from KDL text.
pub fn parse_operator_config(kdl: &str) -> ConfigResult<OperatorConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = OperatorConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "operator" => {
                config.namespace = get_string_prop(node, "namespace");
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        if child.name().value() == "namespace-labels" {
                            config.namespace_labels = parse_string_children(child);
                        }
                    }
                }
            }
            "labels" => {
                let component = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("labels component".to_string()))?;
                let kind = parse_component_kind(&component)?;
                if config.pod_labels.contains_key(&kind) {
                    return Err(ConfigError::Duplicate(format!("labels \"{}\"", component)));
                }
                config.pod_labels.insert(kind, parse_string_children(node));
            }
            "bridge-service" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "labels" => config.bridge_service_labels = parse_string_children(child),
                            "annotations" => {
                                config.bridge_service_annotations = parse_string_children(child)
                            }
                            _ => {}
                        }
                    }
                }
            }
            "images" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        let image = get_first_string_arg(child);
                        match (child.name().value(), image) {
                            ("balancer", image) => config.images.balancer = image,
                            ("bridge", Some(image)) => config.images.bridge = image,
                            ("init", Some(image)) => config.images.init = image,
                            ("builder", Some(image)) => config.images.builder = image,
                            _ => {}
                        }
                    }
                }
            }
            "versions" => {
                let mut images = BTreeMap::new();
                if let Some(children) = node.children() {
                    for child in children.nodes().iter().filter(|c| c.name().value() == "version") {
                        let version = get_first_string_arg(child)
                            .ok_or_else(|| ConfigError::MissingField("version".to_string()))?;
                        let image = get_string_prop(child, "image").ok_or_else(|| {
                            ConfigError::MissingField(format!("image for version {}", version))
                        })?;
                        if images.insert(version.clone(), image).is_some() {
                            return Err(ConfigError::Duplicate(format!("version {}", version)));
                        }
                    }
                }
                if !images.is_empty() {
                    config.versions.images = images;
                }
                if let Some(default) = get_string_prop(node, "default") {
                    config.versions.default_version = default;
                }
            }
            "proxy" => {
                config.proxy = ProxySettings {
                    http_proxy: get_string_prop(node, "http"),
                    https_proxy: get_string_prop(node, "https"),
                    no_proxy: get_string_prop(node, "no-proxy"),
                };
            }
            _ => {} // Ignore unknown nodes
        }
    }

    config.validate()?;
    Ok(config)
}

fn parse_component_kind(value: &str) -> ConfigResult<ComponentKind> {
    match value {
        "balancer" => Ok(ComponentKind::Balancer),
        "bridge" => Ok(ComponentKind::Bridge),
        "mirror" => Ok(ComponentKind::Mirror),
        "build" => Ok(ComponentKind::Build),
        _ => Err(ConfigError::InvalidValue {
            field: "labels component".to_string(),
            message: format!("unknown component: {}", value),
        }),
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// `name { key "value" }` children as a map.
fn parse_string_children(node: &KdlNode) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if let Some(value) = get_first_string_arg(child) {
                map.insert(child.name().value().to_string(), value);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_map() {
        let map = parse_map("a=1, b = 2\nc=3,broken");
        assert_eq!(map.len(), 3);
        assert_eq!(map["b"], "2");
    }

    #[test]
    fn test_from_lookup() {
        let vars: BTreeMap<&str, &str> = [
            ("TRIBUTARY_CUSTOM_BRIDGE_LABELS", "team=streaming"),
            ("HTTP_PROXY", "http://proxy:3128"),
            ("TRIBUTARY_DEFAULT_INIT_IMAGE", "registry/init:1"),
        ]
        .into_iter()
        .collect();

        let config =
            OperatorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(
            config.pod_labels_for(ComponentKind::Bridge)["team"],
            "streaming"
        );
        assert!(config.pod_labels_for(ComponentKind::Mirror).is_empty());
        assert_eq!(config.images.init, "registry/init:1");
        assert_eq!(
            config.required_env(),
            vec![("HTTP_PROXY".to_string(), "http://proxy:3128".to_string())]
        );
    }

    #[test]
    fn test_unknown_default_version_rejected() {
        let result = OperatorConfig::from_lookup(|k| {
            (k == "TRIBUTARY_DEFAULT_VERSION").then(|| "0.1.0".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_operator_config() {
        let kdl = r#"
            operator namespace="tributary-system" {
                namespace-labels {
                    team "platform"
                }
            }

            labels "balancer" {
                tier "control"
            }

            images {
                builder "registry/kaniko:1.0"
            }

            versions default="3.9.0" {
                version "3.9.0" image="registry/kafka:3.9.0"
            }

            proxy http="http://proxy:3128" no-proxy="localhost"
        "#;

        let config = parse_operator_config(kdl).unwrap();
        assert_eq!(config.namespace.as_deref(), Some("tributary-system"));
        assert_eq!(config.namespace_labels["team"], "platform");
        assert_eq!(
            config.pod_labels_for(ComponentKind::Balancer)["tier"],
            "control"
        );
        assert_eq!(config.images.builder, "registry/kaniko:1.0");
        assert_eq!(
            config.platform_image(None, None).unwrap(),
            "registry/kafka:3.9.0"
        );
        assert_eq!(config.required_env().len(), 2);
    }

    #[test]
    fn test_duplicate_labels_block_rejected() {
        let kdl = r#"
            labels "bridge" { a "1" }
            labels "bridge" { b "2" }
        "#;
        assert!(matches!(
            parse_operator_config(kdl),
            Err(ConfigError::Duplicate(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let config = OperatorConfig::default();
        assert!(config.platform_image(Some("custom:1"), Some("0.1")).is_ok());
        assert!(matches!(
            config.platform_image(None, Some("0.1")),
            Err(Error::Validation { .. })
        ));
    }
}
