//! Replication agent resources.

use k8s_openapi::api::core::v1::{Affinity, EnvVar};
use std::collections::BTreeMap;
use tributary_config::logging::{logging_config, logging_config_key};
use tributary_config::component::topic_pattern;
use tributary_config::ConfigSection;
use tributary_core::resource::{Resource, ResourceSet};
use tributary_core::spec::{MirrorSpec, ProbeOptions};
use tributary_core::Result;

use crate::auth::{ClientSecurity, EnvNaming, MountLayout};
use crate::jvm::{jvm_env, DEFAULT_DYNAMIC_HEAP_PERCENTAGE};
use crate::model::{
    config_map_volume, exec_probe, memory_volume, ComponentModel, ContainerSpec, ProbeDefaults,
    VolumeSpec, Workload,
};
use crate::overlay::env;
use crate::synthesizer::SynthesisInput;

const LIVENESS_SCRIPT: &str = "/opt/kafka/kafka_mirror_maker_liveness.sh";
const READY_FILE: &str = "/tmp/mirror-maker-ready";

const PROBE_DEFAULTS: ProbeDefaults = ProbeDefaults {
    initial_delay_seconds: 60,
    timeout_seconds: 5,
    period_seconds: Some(10),
};

const CONSUMER: EnvNaming<'static> = EnvNaming {
    prefix: "KAFKA_MIRRORMAKER_",
    suffix: "_CONSUMER",
};

const PRODUCER: EnvNaming<'static> = EnvNaming {
    prefix: "KAFKA_MIRRORMAKER_",
    suffix: "_PRODUCER",
};

const CONSUMER_LAYOUT: MountLayout<'static> = MountLayout {
    volume_prefix: "consumer",
    certs_path: "/opt/kafka/consumer-certs",
    passwords_path: "/opt/kafka/consumer-password",
};

const PRODUCER_LAYOUT: MountLayout<'static> = MountLayout {
    volume_prefix: "producer",
    certs_path: "/opt/kafka/producer-certs",
    passwords_path: "/opt/kafka/producer-password",
};

fn config_map_name(cluster: &str) -> String {
    format!("{}-mirror-config", cluster)
}

struct Mirror<'a> {
    model: ComponentModel<'a>,
    mirror: &'a MirrorSpec,
    include: &'a str,
    consumer_config: String,
    producer_config: String,
}

impl Mirror<'_> {
    fn consumer(&self) -> ClientSecurity<'_> {
        ClientSecurity {
            tls: self.mirror.consumer.tls.as_ref(),
            authentication: self.mirror.consumer.authentication.as_ref(),
        }
    }

    fn producer(&self) -> ClientSecurity<'_> {
        ClientSecurity {
            tls: self.mirror.producer.tls.as_ref(),
            authentication: self.mirror.producer.authentication.as_ref(),
        }
    }

    fn period(options: Option<&ProbeOptions>) -> i32 {
        options
            .and_then(|o| o.period_seconds)
            .or(PROBE_DEFAULTS.period_seconds)
            .unwrap_or_default()
    }
}

impl Workload for Mirror<'_> {
    fn container_spec(&self) -> ContainerSpec {
        let spec = self.model.spec;
        ContainerSpec {
            command: None,
            args: None,
            ports: Vec::new(),
            liveness_probe: Some(exec_probe(
                &[LIVENESS_SCRIPT],
                spec.liveness_probe.as_ref(),
                PROBE_DEFAULTS,
            )),
            readiness_probe: Some(exec_probe(
                &["test", "-f", READY_FILE],
                spec.readiness_probe.as_ref(),
                PROBE_DEFAULTS,
            )),
        }
    }

    fn volume_spec(&self) -> VolumeSpec {
        let mut volumes = VolumeSpec::default();
        volumes.add(memory_volume("tmp", "5Mi"), "/tmp");
        volumes.add(
            config_map_volume("mirror-logging", &config_map_name(self.model.cluster())),
            "/opt/kafka/custom-config/",
        );
        volumes.extend(self.consumer().volumes(CONSUMER_LAYOUT));
        volumes.extend(self.producer().volumes(PRODUCER_LAYOUT));
        volumes
    }

    fn env_vars(&self) -> Vec<EnvVar> {
        let spec = self.model.spec;
        let consumer = &self.mirror.consumer;
        let producer = &self.mirror.producer;

        let mut vars = vec![
            env(
                "KAFKA_MIRRORMAKER_METRICS_ENABLED",
                spec.metrics_enabled.to_string(),
            ),
            env(
                "TRIBUTARY_KAFKA_GC_LOG_ENABLED",
                spec.gc_logging_enabled().to_string(),
            ),
            env(
                "KAFKA_MIRRORMAKER_BOOTSTRAP_SERVERS_CONSUMER",
                consumer.bootstrap_servers.clone(),
            ),
            env("KAFKA_MIRRORMAKER_GROUPID_CONSUMER", consumer.group_id.clone()),
            env(
                "KAFKA_MIRRORMAKER_CONFIGURATION_CONSUMER",
                self.consumer_config.clone(),
            ),
            env(
                "KAFKA_MIRRORMAKER_BOOTSTRAP_SERVERS_PRODUCER",
                producer.bootstrap_servers.clone(),
            ),
            env(
                "KAFKA_MIRRORMAKER_CONFIGURATION_PRODUCER",
                self.producer_config.clone(),
            ),
            env("KAFKA_MIRRORMAKER_INCLUDE", self.include),
        ];

        if let Some(streams) = consumer.num_streams {
            vars.push(env("KAFKA_MIRRORMAKER_NUMSTREAMS", streams.to_string()));
        }
        if let Some(interval) = consumer.offset_commit_interval {
            vars.push(env(
                "KAFKA_MIRRORMAKER_OFFSET_COMMIT_INTERVAL",
                interval.to_string(),
            ));
        }
        if let Some(abort) = producer.abort_on_send_failure {
            vars.push(env(
                "KAFKA_MIRRORMAKER_ABORT_ON_SEND_FAILURE",
                abort.to_string(),
            ));
        }

        vars.extend(self.consumer().env(CONSUMER));
        vars.extend(self.producer().env(PRODUCER));

        vars.push(env(
            "TRIBUTARY_LIVENESS_PERIOD",
            Self::period(spec.liveness_probe.as_ref()).to_string(),
        ));
        vars.push(env(
            "TRIBUTARY_READINESS_PERIOD",
            Self::period(spec.readiness_probe.as_ref()).to_string(),
        ));

        if let Some(tracing) = &spec.tracing {
            vars.push(env("TRIBUTARY_TRACING", tracing.kind.to_string()));
        }

        vars.extend(jvm_env(
            spec.jvm_options.as_ref(),
            spec.resources.as_ref(),
            DEFAULT_DYNAMIC_HEAP_PERCENTAGE,
        ));
        vars
    }

    fn affinity(&self) -> Option<Affinity> {
        self.model.spec.template.pod_settings.affinity.clone()
    }
}

pub(crate) fn synthesize(input: &SynthesisInput<'_>, mirror: &MirrorSpec) -> Result<ResourceSet> {
    let spec = input.spec;
    let cluster = spec.cluster.as_str();

    let (include, _) = topic_pattern(mirror)?;
    let rendered = |section| {
        input
            .configuration
            .get(section)
            .map(|c| c.render())
            .unwrap_or_default()
    };
    let image = input
        .operator
        .platform_image(spec.image.as_deref(), input.version())?;

    let workload = Mirror {
        model: ComponentModel::new(spec, input.context, input.operator, "mirror", image),
        mirror,
        include,
        consumer_config: rendered(ConfigSection::Consumer),
        producer_config: rendered(ConfigSection::Producer),
    };
    let model = &workload.model;

    let mut logging = BTreeMap::new();
    logging.insert(
        logging_config_key(spec.kind()).to_string(),
        logging_config(spec.kind(), spec.logging.as_ref()),
    );

    let mut resources = ResourceSet::new(spec.kind(), cluster);
    resources.push(Resource::ServiceAccount(model.service_account()));
    resources.push(Resource::ConfigMap(
        model.config_map(&config_map_name(cluster), logging),
    ));
    resources.push(Resource::NetworkPolicy(model.network_policy(Vec::new())));
    resources.push(Resource::PodDisruptionBudget(model.pod_disruption_budget()));
    resources.push(Resource::Deployment(
        model.deployment(&workload, spec.replicas.unwrap_or(1)),
    ));
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use tributary_config::{resolve_component, OperatorConfig};
    use tributary_core::Error;
    use tributary_core::spec::{
        ClientAuthentication, ComponentDetails, ComponentSpec, PasswordSecretSource, Tracing,
        TracingKind,
    };

    fn render(spec: &ComponentSpec) -> Result<ResourceSet> {
        let context = fixtures::context();
        let operator = OperatorConfig::default();
        let configuration = resolve_component(spec)?;
        crate::synthesize(&SynthesisInput {
            spec,
            context: &context,
            operator: &operator,
            configuration: &configuration,
            credentials: &[],
            build: None,
        })
    }

    fn mirror_mut(spec: &mut ComponentSpec) -> &mut MirrorSpec {
        match &mut spec.component {
            ComponentDetails::Mirror(mirror) => mirror,
            _ => unreachable!(),
        }
    }

    fn main_env(resources: &ResourceSet) -> Vec<EnvVar> {
        resources.deployment().unwrap().spec.as_ref().unwrap()
            .template.spec.as_ref().unwrap().containers[0]
            .env
            .clone()
            .unwrap()
    }

    fn value<'a>(vars: &'a [EnvVar], name: &str) -> Option<&'a str> {
        vars.iter()
            .find(|v| v.name == name)
            .and_then(|v| v.value.as_deref())
    }

    #[test]
    fn test_include_wins_over_whitelist() {
        let mut spec = fixtures::mirror();
        mirror_mut(&mut spec).whitelist = Some("legacy.*".into());
        let include = |spec: &ComponentSpec| {
            let vars = main_env(&render(spec).unwrap());
            value(&vars, "KAFKA_MIRRORMAKER_INCLUDE").map(String::from)
        };
        assert_eq!(include(&spec).as_deref(), Some("orders.*"));

        mirror_mut(&mut spec).include = None;
        assert_eq!(include(&spec).as_deref(), Some("legacy.*"));

        mirror_mut(&mut spec).whitelist = None;
        assert!(matches!(
            render(&spec),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_per_side_env() {
        let mut spec = fixtures::mirror();
        let mirror = mirror_mut(&mut spec);
        mirror.consumer.num_streams = Some(2);
        mirror.producer.abort_on_send_failure = Some(false);
        mirror.producer.authentication = Some(ClientAuthentication::ScramSha512 {
            username: "mm".into(),
            password_secret: PasswordSecretSource {
                secret_name: "mm-user".into(),
                password: "password".into(),
            },
        });

        let resources = render(&spec).unwrap();
        let vars = main_env(&resources);
        assert_eq!(value(&vars, "KAFKA_MIRRORMAKER_INCLUDE"), Some("orders.*"));
        assert_eq!(
            value(&vars, "KAFKA_MIRRORMAKER_BOOTSTRAP_SERVERS_CONSUMER"),
            Some("source:9092")
        );
        assert_eq!(value(&vars, "KAFKA_MIRRORMAKER_NUMSTREAMS"), Some("2"));
        assert_eq!(
            value(&vars, "KAFKA_MIRRORMAKER_ABORT_ON_SEND_FAILURE"),
            Some("false")
        );
        assert_eq!(
            value(&vars, "KAFKA_MIRRORMAKER_SASL_USERNAME_PRODUCER"),
            Some("mm")
        );
        assert!(value(&vars, "KAFKA_MIRRORMAKER_SASL_USERNAME_CONSUMER").is_none());

        let pod = resources.deployment().unwrap().spec.as_ref().unwrap()
            .template.spec.clone().unwrap();
        assert!(pod
            .volumes
            .unwrap()
            .iter()
            .any(|v| v.name == "producer-mm-user"));
    }

    #[test]
    fn test_tracing_forces_interceptors() {
        let mut spec = fixtures::mirror();
        spec.tracing = Some(Tracing {
            kind: TracingKind::Opentelemetry,
        });
        let vars = main_env(&render(&spec).unwrap());
        assert_eq!(value(&vars, "TRIBUTARY_TRACING"), Some("opentelemetry"));
        assert!(value(&vars, "KAFKA_MIRRORMAKER_CONFIGURATION_PRODUCER")
            .unwrap()
            .contains("interceptor.classes=io.opentelemetry"));
    }

    #[test]
    fn test_probe_periods() {
        let mut spec = fixtures::mirror();
        spec.liveness_probe = Some(ProbeOptions {
            period_seconds: Some(30),
            ..Default::default()
        });
        let resources = render(&spec).unwrap();
        let vars = main_env(&resources);
        assert_eq!(value(&vars, "TRIBUTARY_LIVENESS_PERIOD"), Some("30"));
        assert_eq!(value(&vars, "TRIBUTARY_READINESS_PERIOD"), Some("10"));

        let container = &resources.deployment().unwrap().spec.as_ref().unwrap()
            .template.spec.as_ref().unwrap().containers[0];
        let readiness = container.readiness_probe.as_ref().unwrap();
        assert_eq!(readiness.initial_delay_seconds, Some(60));
    }

    #[test]
    fn test_network_policy_denies_all_without_metrics() {
        let resources = render(&fixtures::mirror()).unwrap();
        let policy = resources.network_policy().unwrap();
        assert!(policy.spec.as_ref().unwrap().ingress.as_ref().unwrap().is_empty());
        assert!(resources.service().is_none());
    }
}
