//! Resolution of every configuration section a component carries.

use serde::Serialize;
use std::collections::BTreeMap;
use tributary_core::spec::{
    ComponentDetails, ComponentSpec, ConfigValue, MirrorSpec, Tracing, TracingKind,
};
use tributary_core::{Error, Result};

use crate::balancer;
use crate::resolver::{resolve, ConfigurationPolicy, ConfigurationWarning, ResolvedConfiguration};

const CLIENT_FORBIDDEN_PREFIXES: &[&str] = &["ssl.", "bootstrap.servers", "sasl.", "security."];
const CLIENT_FORBIDDEN_EXCEPTIONS: &[&str] = &[
    "ssl.endpoint.identification.algorithm",
    "ssl.secure.random.implementation",
    "ssl.cipher.suites",
    "ssl.protocol",
    "ssl.enabled.protocols",
];

const INTERCEPTOR_CLASSES_KEY: &str = "interceptor.classes";

/// A configuration section of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ConfigSection {
    Main,
    AdminClient,
    Consumer,
    Producer,
}

/// Resolved configuration of all sections of one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentConfiguration {
    sections: BTreeMap<ConfigSection, ResolvedConfiguration>,
    /// Corrections made to the spec outside any configuration section.
    warnings: Vec<ConfigurationWarning>,
}

impl ComponentConfiguration {
    pub fn get(&self, section: ConfigSection) -> Option<&ResolvedConfiguration> {
        self.sections.get(&section)
    }

    pub fn insert(&mut self, section: ConfigSection, config: ResolvedConfiguration) {
        self.sections.insert(section, config);
    }

    pub fn push_warning(&mut self, warning: ConfigurationWarning) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigurationWarning> {
        self.sections
            .values()
            .flat_map(|c| c.warnings())
            .chain(&self.warnings)
    }
}

/// Topic pattern of a replication agent. `include` wins over the deprecated
/// `whitelist`; falling back to or ignoring `whitelist` is reported.
pub fn topic_pattern(mirror: &MirrorSpec) -> Result<(&str, Option<ConfigurationWarning>)> {
    let warning = |message: &str| ConfigurationWarning {
        field: "spec.whitelist".to_string(),
        message: message.to_string(),
    };
    match (&mirror.include, &mirror.whitelist) {
        (Some(include), Some(_)) => Ok((
            include,
            Some(warning("both include and whitelist are set, whitelist is ignored")),
        )),
        (Some(include), None) => Ok((include, None)),
        (None, Some(whitelist)) => Ok((
            whitelist,
            Some(warning("whitelist is deprecated, use include instead")),
        )),
        (None, None) => Err(Error::validation(
            "spec.include",
            "one of include or whitelist is required",
        )),
    }
}

fn client_policy(field_prefix: &str, extra_forbidden: &[&'static str]) -> ConfigurationPolicy {
    let mut forbidden_prefixes = CLIENT_FORBIDDEN_PREFIXES.to_vec();
    forbidden_prefixes.extend_from_slice(extra_forbidden);
    ConfigurationPolicy {
        field_prefix: field_prefix.to_string(),
        forbidden_prefixes,
        forbidden_exceptions: CLIENT_FORBIDDEN_EXCEPTIONS.to_vec(),
        ..Default::default()
    }
}

/// Policy for a bridge client section.
pub fn bridge_client_policy(section: &str) -> ConfigurationPolicy {
    client_policy(&format!("spec.{}.config", section), &[])
}

/// Policy for the replication agent's consumer.
pub fn mirror_consumer_policy() -> ConfigurationPolicy {
    client_policy("spec.consumer.config", &["group.id", "interceptor.classes"])
}

/// Policy for the replication agent's producer.
pub fn mirror_producer_policy() -> ConfigurationPolicy {
    client_policy("spec.producer.config", &["interceptor.classes"])
}

fn consumer_interceptor(tracing: &Tracing) -> &'static str {
    match tracing.kind {
        TracingKind::Jaeger => "io.opentracing.contrib.kafka.TracingConsumerInterceptor",
        TracingKind::Opentelemetry => {
            "io.opentelemetry.instrumentation.kafkaclients.TracingConsumerInterceptor"
        }
    }
}

fn producer_interceptor(tracing: &Tracing) -> &'static str {
    match tracing.kind {
        TracingKind::Jaeger => "io.opentracing.contrib.kafka.TracingProducerInterceptor",
        TracingKind::Opentelemetry => {
            "io.opentelemetry.instrumentation.kafkaclients.TracingProducerInterceptor"
        }
    }
}

/// Resolve all configuration sections of `spec`.
pub fn resolve_component(spec: &ComponentSpec) -> Result<ComponentConfiguration> {
    let mut resolved = ComponentConfiguration::default();

    match &spec.component {
        ComponentDetails::Balancer(_) => {
            resolved.insert(ConfigSection::Main, resolve(&spec.config, &balancer::policy())?);
        }
        ComponentDetails::Bridge(bridge) => {
            let sections = [
                (ConfigSection::AdminClient, "adminClient", &bridge.admin_client),
                (ConfigSection::Consumer, "consumer", &bridge.consumer),
                (ConfigSection::Producer, "producer", &bridge.producer),
            ];
            for (section, name, client) in sections {
                if let Some(client) = client {
                    resolved.insert(section, resolve(&client.config, &bridge_client_policy(name))?);
                }
            }
        }
        ComponentDetails::Mirror(mirror) => {
            if let (_, Some(warning)) = topic_pattern(mirror)? {
                resolved.push_warning(warning);
            }
            let mut consumer = resolve(&mirror.consumer.config, &mirror_consumer_policy())?;
            let mut producer = resolve(&mirror.producer.config, &mirror_producer_policy())?;
            if let Some(tracing) = &spec.tracing {
                consumer.force(
                    INTERCEPTOR_CLASSES_KEY,
                    ConfigValue::from(consumer_interceptor(tracing)),
                );
                producer.force(
                    INTERCEPTOR_CLASSES_KEY,
                    ConfigValue::from(producer_interceptor(tracing)),
                );
            }
            resolved.insert(ConfigSection::Consumer, consumer);
            resolved.insert(ConfigSection::Producer, producer);
        }
        ComponentDetails::Build(_) => {}
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_core::spec::{
        ClientSection, MirrorConsumer, MirrorProducer, MirrorSpec, BridgeSpec,
    };

    fn mirror_spec(tracing: Option<Tracing>) -> ComponentSpec {
        let mut consumer_config = BTreeMap::new();
        consumer_config.insert("group.id".to_string(), ConfigValue::from("evil"));
        consumer_config.insert("auto.offset.reset".to_string(), ConfigValue::from("earliest"));

        ComponentSpec {
            cluster: "mm".into(),
            replicas: None,
            image: None,
            version: None,
            config: BTreeMap::new(),
            resources: None,
            logging: None,
            jvm_options: None,
            metrics_enabled: false,
            liveness_probe: None,
            readiness_probe: None,
            rack: None,
            tracing,
            template: Default::default(),
            component: ComponentDetails::Mirror(MirrorSpec {
                include: Some(".*".into()),
                whitelist: None,
                consumer: MirrorConsumer {
                    bootstrap_servers: "source:9092".into(),
                    group_id: "mm-group".into(),
                    num_streams: None,
                    offset_commit_interval: None,
                    config: consumer_config,
                    tls: None,
                    authentication: None,
                },
                producer: MirrorProducer {
                    bootstrap_servers: "target:9092".into(),
                    abort_on_send_failure: None,
                    config: BTreeMap::new(),
                    tls: None,
                    authentication: None,
                },
            }),
        }
    }

    #[test]
    fn test_mirror_consumer_drops_group_id() {
        let resolved = resolve_component(&mirror_spec(None)).unwrap();
        let consumer = resolved.get(ConfigSection::Consumer).unwrap();

        assert!(!consumer.contains_key("group.id"));
        assert!(consumer.contains_key("auto.offset.reset"));
        assert_eq!(resolved.warnings().count(), 1);
    }

    #[test]
    fn test_tracing_sets_interceptors() {
        let resolved = resolve_component(&mirror_spec(Some(Tracing {
            kind: TracingKind::Opentelemetry,
        })))
        .unwrap();

        let producer = resolved.get(ConfigSection::Producer).unwrap();
        assert_eq!(
            producer.rendered(INTERCEPTOR_CLASSES_KEY).as_deref(),
            Some("io.opentelemetry.instrumentation.kafkaclients.TracingProducerInterceptor")
        );
    }

    #[test]
    fn test_bridge_resolves_only_present_sections() {
        let mut spec = mirror_spec(None);
        let mut producer = ClientSection::default();
        producer
            .config
            .insert("sasl.mechanism".into(), ConfigValue::from("PLAIN"));
        producer.config.insert("acks".into(), ConfigValue::from("all"));
        spec.component = ComponentDetails::Bridge(BridgeSpec {
            bootstrap_servers: "c:9092".into(),
            http: None,
            admin_client: None,
            consumer: None,
            producer: Some(producer),
            tls: None,
            authentication: None,
            client_rack_init_image: None,
        });

        let resolved = resolve_component(&spec).unwrap();
        assert!(resolved.get(ConfigSection::AdminClient).is_none());
        let producer = resolved.get(ConfigSection::Producer).unwrap();
        assert_eq!(producer.render(), "acks=all\n");
        assert_eq!(
            resolved.warnings().next().unwrap().field,
            "spec.producer.config.sasl.mechanism"
        );
    }

    fn set_topics(spec: &mut ComponentSpec, include: Option<&str>, whitelist: Option<&str>) {
        if let ComponentDetails::Mirror(mirror) = &mut spec.component {
            mirror.include = include.map(String::from);
            mirror.whitelist = whitelist.map(String::from);
        }
    }

    #[test]
    fn test_whitelist_corrections_are_warnings() {
        let mut spec = mirror_spec(None);
        spec.component = match spec.component {
            ComponentDetails::Mirror(mut mirror) => {
                mirror.consumer.config.clear();
                ComponentDetails::Mirror(mirror)
            }
            other => other,
        };

        let resolved = resolve_component(&spec).unwrap();
        assert_eq!(resolved.warnings().count(), 0);

        set_topics(&mut spec, Some("a.*"), Some("b.*"));
        let resolved = resolve_component(&spec).unwrap();
        let warnings: Vec<_> = resolved.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "spec.whitelist");

        set_topics(&mut spec, None, Some("b.*"));
        let resolved = resolve_component(&spec).unwrap();
        assert!(resolved
            .warnings()
            .any(|w| w.field == "spec.whitelist" && w.message.contains("deprecated")));

        set_topics(&mut spec, None, None);
        assert!(matches!(
            resolve_component(&spec),
            Err(Error::Validation { field, .. }) if field == "spec.include"
        ));
    }
}
