//! Component specifications.
//!
//! A [`ComponentSpec`] is built once per reconciliation pass from the user's
//! custom resource and is never mutated afterwards. Everything downstream
//! borrows it.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::template::TemplateOverlay;

/// The managed auxiliary components.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    #[display("balancer")]
    Balancer,
    #[display("bridge")]
    Bridge,
    #[display("mirror")]
    Mirror,
    #[display("build")]
    Build,
}

impl ComponentKind {
    /// Value of the `tributary.io/component-type` label.
    pub fn component_type(&self) -> &'static str {
        match self {
            ComponentKind::Balancer => "workload-balancer",
            ComponentKind::Bridge => "protocol-bridge",
            ComponentKind::Mirror => "replication-agent",
            ComponentKind::Build => "plugin-build",
        }
    }
}

/// A user-supplied configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    /// Render as a properties-file value. Lists are comma joined.
    pub fn render(&self) -> String {
        match self {
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Int(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::String(s) => s.clone(),
            ConfigValue::List(items) => items
                .iter()
                .map(ConfigValue::render)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

/// Declarative specification of one managed component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Name of the owning cluster. Every generated resource name derives from it.
    pub cluster: String,
    pub replicas: Option<i32>,
    pub image: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
    pub resources: Option<ResourceRequirements>,
    pub logging: Option<Logging>,
    pub jvm_options: Option<JvmOptions>,
    #[serde(default)]
    pub metrics_enabled: bool,
    pub liveness_probe: Option<ProbeOptions>,
    pub readiness_probe: Option<ProbeOptions>,
    pub rack: Option<Rack>,
    pub tracing: Option<Tracing>,
    #[serde(default)]
    pub template: TemplateOverlay,
    pub component: ComponentDetails,
}

impl ComponentSpec {
    pub fn kind(&self) -> ComponentKind {
        match self.component {
            ComponentDetails::Balancer(_) => ComponentKind::Balancer,
            ComponentDetails::Bridge(_) => ComponentKind::Bridge,
            ComponentDetails::Mirror(_) => ComponentKind::Mirror,
            ComponentDetails::Build(_) => ComponentKind::Build,
        }
    }

    pub fn gc_logging_enabled(&self) -> bool {
        self.jvm_options
            .as_ref()
            .map(|j| j.gc_logging_enabled)
            .unwrap_or(false)
    }
}

/// Per-component sub-specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ComponentDetails {
    Balancer(BalancerSpec),
    Bridge(BridgeSpec),
    Mirror(MirrorSpec),
    Build(BuildSpec),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancerSpec {
    /// Configuration of the brokers being balanced (read for `min.insync.replicas`).
    #[serde(default)]
    pub broker_config: BTreeMap<String, ConfigValue>,
    pub capacity: Option<BrokerCapacity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerCapacity {
    pub cpu: Option<String>,
    pub inbound_network: Option<String>,
    pub outbound_network: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSpec {
    pub bootstrap_servers: String,
    pub http: Option<BridgeHttp>,
    pub admin_client: Option<ClientSection>,
    pub consumer: Option<ClientSection>,
    pub producer: Option<ClientSection>,
    pub tls: Option<ClientTls>,
    pub authentication: Option<ClientAuthentication>,
    pub client_rack_init_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeHttp {
    #[serde(default = "default_bridge_port")]
    pub port: i32,
    pub cors: Option<Cors>,
}

fn default_bridge_port() -> i32 {
    8080
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cors {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
}

/// Configuration block for one client (admin, consumer or producer).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTls {
    #[serde(default)]
    pub trusted_certificates: Vec<CertSecretSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertSecretSource {
    pub secret_name: String,
    pub certificate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertAndKeySecretSource {
    pub secret_name: String,
    pub certificate: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSecretSource {
    pub secret_name: String,
    pub password: String,
}

/// Client authentication against the streaming platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientAuthentication {
    #[serde(rename = "tls")]
    Tls {
        certificate_and_key: CertAndKeySecretSource,
    },
    #[serde(rename = "scram-sha-512")]
    ScramSha512 {
        username: String,
        password_secret: PasswordSecretSource,
    },
    #[serde(rename = "plain")]
    Plain {
        username: String,
        password_secret: PasswordSecretSource,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSpec {
    pub include: Option<String>,
    /// Deprecated alias of `include`.
    pub whitelist: Option<String>,
    pub consumer: MirrorConsumer,
    pub producer: MirrorProducer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConsumer {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub num_streams: Option<i32>,
    pub offset_commit_interval: Option<i32>,
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
    pub tls: Option<ClientTls>,
    pub authentication: Option<ClientAuthentication>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorProducer {
    pub bootstrap_servers: String,
    pub abort_on_send_failure: Option<bool>,
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
    pub tls: Option<ClientTls>,
    pub authentication: Option<ClientAuthentication>,
}

/// Plugin image build request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    pub plugins: Option<Vec<Plugin>>,
    pub output: BuildOutputSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    pub artifacts: Option<Vec<Artifact>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub url: String,
    pub sha512sum: Option<String>,
    /// Only honoured for [`ArtifactKind::Other`].
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Jar,
    Tgz,
    Zip,
    Other,
}

/// Where the built image goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum BuildOutputSpec {
    RegistryPush {
        image: String,
        push_secret: Option<String>,
        #[serde(default)]
        additional_options: Vec<String>,
    },
    ImageStream {
        image: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Logging {
    Inline {
        #[serde(default)]
        loggers: BTreeMap<String, String>,
    },
    External {
        properties: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JvmOptions {
    #[serde(rename = "-Xms")]
    pub xms: Option<String>,
    #[serde(rename = "-Xmx")]
    pub xmx: Option<String>,
    #[serde(default, rename = "-XX")]
    pub xx: BTreeMap<String, String>,
    #[serde(default)]
    pub java_system_properties: Vec<SystemProperty>,
    #[serde(default)]
    pub gc_logging_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemProperty {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOptions {
    pub initial_delay_seconds: Option<i32>,
    pub timeout_seconds: Option<i32>,
    pub period_seconds: Option<i32>,
}

/// Rack awareness: the node label used as topology key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rack {
    pub topology_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracing {
    #[serde(rename = "type")]
    pub kind: TracingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum TracingKind {
    #[display("jaeger")]
    Jaeger,
    #[display("opentelemetry")]
    Opentelemetry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_value_render() {
        assert_eq!(ConfigValue::from("a").render(), "a");
        assert_eq!(ConfigValue::Int(3).render(), "3");
        assert_eq!(ConfigValue::Bool(false).render(), "false");
        let list = ConfigValue::List(vec!["G1".into(), "G2".into()]);
        assert_eq!(list.render(), "G1,G2");
    }

    #[test]
    fn test_parse_bridge_spec() {
        let json = r#"{
            "cluster": "my-bridge",
            "config": {},
            "component": {
                "kind": "bridge",
                "bootstrapServers": "my-cluster-kafka-bootstrap:9092",
                "http": { "port": 8081 },
                "authentication": {
                    "type": "scram-sha-512",
                    "username": "bridge",
                    "passwordSecret": { "secretName": "bridge-user", "password": "password" }
                }
            }
        }"#;

        let spec: ComponentSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.kind(), ComponentKind::Bridge);
        let ComponentDetails::Bridge(bridge) = &spec.component else {
            panic!("expected bridge");
        };
        assert_eq!(bridge.http.as_ref().unwrap().port, 8081);
        assert!(matches!(
            bridge.authentication,
            Some(ClientAuthentication::ScramSha512 { .. })
        ));
    }

    #[test]
    fn test_parse_build_output() {
        let json = r#"{
            "plugins": [{ "name": "p1", "artifacts": [{ "type": "jar", "url": "https://x/p1.jar" }] }],
            "output": { "type": "registry-push", "image": "registry/img:latest", "additionalOptions": ["--reproducible"] }
        }"#;

        let build: BuildSpec = serde_json::from_str(json).unwrap();
        match build.output {
            BuildOutputSpec::RegistryPush {
                image,
                additional_options,
                ..
            } => {
                assert_eq!(image, "registry/img:latest");
                assert_eq!(additional_options, vec!["--reproducible"]);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }
}
