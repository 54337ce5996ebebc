//! Protocol bridge resources.

use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, EnvVarSource, ObjectFieldSelector, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use serde_json::json;
use std::collections::BTreeMap;
use tributary_config::logging::{logging_config, logging_config_key};
use tributary_config::ConfigSection;
use tributary_core::resource::{Resource, ResourceSet};
use tributary_core::spec::{BridgeHttp, BridgeSpec};
use tributary_core::template::OverlayTarget;
use tributary_core::{Error, Result};

use crate::auth::{ClientSecurity, EnvNaming, MountLayout};
use crate::jvm::{jvm_env, DEFAULT_DYNAMIC_HEAP_PERCENTAGE};
use crate::model::{
    config_map_volume, container_port, http_probe, ingress_rule, memory_volume, service_port,
    ComponentModel, ContainerSpec, ProbeDefaults, VolumeSpec, Workload,
};
use crate::overlay::{env, merge_env, merge_rack_affinity};
use crate::synthesizer::SynthesisInput;

pub const HTTP_PORT_NAME: &str = "rest-api";
pub const DISCOVERY_LABEL: &str = "tributary.io/discovery";
pub const DISCOVERY_ANNOTATION: &str = "tributary.io/discovery";

/// Cluster role granting read access to node topology labels.
pub const CLIENT_CLUSTER_ROLE: &str = "tributary-kafka-client";

const RACK_VOLUME: &str = "rack-volume";
const INIT_FOLDER: &str = "/opt/tributary/init";
const INIT_SCRIPT: &str = "/opt/tributary/bin/kafka_init_run.sh";

const PROBE_DEFAULTS: ProbeDefaults = ProbeDefaults {
    initial_delay_seconds: 15,
    timeout_seconds: 5,
    period_seconds: None,
};

const NAMING: EnvNaming<'static> = EnvNaming {
    prefix: "KAFKA_BRIDGE_",
    suffix: "",
};

const LAYOUT: MountLayout<'static> = MountLayout {
    volume_prefix: "bridge",
    certs_path: "/opt/tributary/bridge-certs",
    passwords_path: "/opt/tributary/bridge-password",
};

fn config_map_name(cluster: &str) -> String {
    format!("{}-bridge-config", cluster)
}

fn service_name(cluster: &str) -> String {
    format!("{}-bridge-service", cluster)
}

fn init_binding_name(namespace: &str, cluster: &str) -> String {
    format!("tributary-{}-{}-bridge-init", namespace, cluster)
}

struct Bridge<'a> {
    model: ComponentModel<'a>,
    bridge: &'a BridgeSpec,
    http: &'a BridgeHttp,
    client_configs: [String; 3],
}

impl Bridge<'_> {
    fn security(&self) -> ClientSecurity<'_> {
        ClientSecurity {
            tls: self.bridge.tls.as_ref(),
            authentication: self.bridge.authentication.as_ref(),
        }
    }

    fn init_container(&self, topology_key: &str) -> Container {
        let overlay = self.model.spec.template.for_target(OverlayTarget::InitContainer);
        let computed = vec![
            EnvVar {
                name: "NODE_NAME".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "spec.nodeName".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            env("RACK_TOPOLOGY_KEY", topology_key),
            env("INIT_FOLDER", INIT_FOLDER),
        ];

        Container {
            name: "bridge-init".to_string(),
            image: Some(
                self.bridge
                    .client_rack_init_image
                    .clone()
                    .unwrap_or_else(|| self.model.operator.images.init.clone()),
            ),
            args: Some(vec![INIT_SCRIPT.to_string()]),
            env: Some(merge_env(
                computed,
                overlay,
                &self.model.operator.required_env(),
            )),
            volume_mounts: Some(vec![VolumeMount {
                name: RACK_VOLUME.to_string(),
                mount_path: INIT_FOLDER.to_string(),
                ..Default::default()
            }]),
            security_context: overlay.and_then(|o| o.security_context.clone()),
            ..Default::default()
        }
    }

    fn init_binding(&self) -> ClusterRoleBinding {
        let model = &self.model;
        ClusterRoleBinding {
            metadata: model.cluster_metadata(
                &init_binding_name(model.namespace(), model.cluster()),
                Some(OverlayTarget::ClusterRoleBinding),
            ),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: CLIENT_CLUSTER_ROLE.to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: model.name.to_string(),
                namespace: Some(model.namespace().to_string()),
                ..Default::default()
            }]),
        }
    }
}

impl Workload for Bridge<'_> {
    fn container_spec(&self) -> ContainerSpec {
        let spec = self.model.spec;
        ContainerSpec {
            command: None,
            args: None,
            ports: vec![container_port(HTTP_PORT_NAME, self.http.port)],
            liveness_probe: Some(http_probe(
                "/healthy",
                HTTP_PORT_NAME,
                spec.liveness_probe.as_ref(),
                PROBE_DEFAULTS,
            )),
            readiness_probe: Some(http_probe(
                "/ready",
                HTTP_PORT_NAME,
                spec.readiness_probe.as_ref(),
                PROBE_DEFAULTS,
            )),
        }
    }

    fn volume_spec(&self) -> VolumeSpec {
        let cluster = self.model.cluster();
        let mut volumes = VolumeSpec::default();
        volumes.add(memory_volume("tmp", "5Mi"), "/tmp");
        volumes.add(
            config_map_volume("bridge-logging", &config_map_name(cluster)),
            "/opt/tributary/custom-config/",
        );
        volumes.extend(self.security().volumes(LAYOUT));
        if self.model.spec.rack.is_some() {
            volumes.add(memory_volume(RACK_VOLUME, "1Mi"), INIT_FOLDER);
        }
        volumes
    }

    fn env_vars(&self) -> Vec<EnvVar> {
        let spec = self.model.spec;
        let [admin_client, consumer, producer] = &self.client_configs;
        let mut vars = vec![
            env(
                "KAFKA_BRIDGE_METRICS_ENABLED",
                spec.metrics_enabled.to_string(),
            ),
            env(
                "TRIBUTARY_KAFKA_GC_LOG_ENABLED",
                spec.gc_logging_enabled().to_string(),
            ),
            env(
                "KAFKA_BRIDGE_BOOTSTRAP_SERVERS",
                self.bridge.bootstrap_servers.clone(),
            ),
            env("KAFKA_BRIDGE_ADMIN_CLIENT_CONFIG", admin_client.clone()),
            env("KAFKA_BRIDGE_CONSUMER_CONFIG", consumer.clone()),
            env("KAFKA_BRIDGE_PRODUCER_CONFIG", producer.clone()),
            env("KAFKA_BRIDGE_ID", spec.cluster.clone()),
            env("KAFKA_BRIDGE_HTTP_HOST", "0.0.0.0"),
            env("KAFKA_BRIDGE_HTTP_PORT", self.http.port.to_string()),
        ];

        if let Some(cors) = &self.http.cors {
            vars.push(env("KAFKA_BRIDGE_CORS_ENABLED", "true"));
            vars.push(env(
                "KAFKA_BRIDGE_CORS_ALLOWED_ORIGINS",
                cors.allowed_origins.join(","),
            ));
            if !cors.allowed_methods.is_empty() {
                vars.push(env(
                    "KAFKA_BRIDGE_CORS_ALLOWED_METHODS",
                    cors.allowed_methods.join(","),
                ));
            }
        } else {
            vars.push(env("KAFKA_BRIDGE_CORS_ENABLED", "false"));
        }

        vars.extend(self.security().env(NAMING));

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

    fn init_containers(&self) -> Vec<Container> {
        self.model
            .spec
            .rack
            .as_ref()
            .map(|rack| vec![self.init_container(&rack.topology_key)])
            .unwrap_or_default()
    }

    fn affinity(&self) -> Option<Affinity> {
        merge_rack_affinity(
            self.model.spec.rack.as_ref().map(|r| r.topology_key.as_str()),
            self.model.spec.template.pod_settings.affinity.as_ref(),
        )
    }
}

pub(crate) fn synthesize(input: &SynthesisInput<'_>, bridge: &BridgeSpec) -> Result<ResourceSet> {
    let spec = input.spec;
    let cluster = spec.cluster.as_str();

    let http = bridge
        .http
        .as_ref()
        .ok_or_else(|| Error::validation("spec.http", "the bridge requires an HTTP section"))?;

    let rendered = |section| {
        input
            .configuration
            .get(section)
            .map(|c| c.render())
            .unwrap_or_default()
    };
    let client_configs = [
        rendered(ConfigSection::AdminClient),
        rendered(ConfigSection::Consumer),
        rendered(ConfigSection::Producer),
    ];

    let image = spec
        .image
        .clone()
        .unwrap_or_else(|| input.operator.images.bridge.clone());

    let workload = Bridge {
        model: ComponentModel::new(spec, input.context, input.operator, "bridge", image),
        bridge,
        http,
        client_configs,
    };
    let model = &workload.model;

    let mut logging = BTreeMap::new();
    logging.insert(
        logging_config_key(spec.kind()).to_string(),
        logging_config(spec.kind(), spec.logging.as_ref()),
    );

    let mut service_labels = input.operator.bridge_service_labels.clone();
    service_labels.insert(DISCOVERY_LABEL.to_string(), "true".to_string());
    let mut service_annotations = input.operator.bridge_service_annotations.clone();
    service_annotations.insert(
        DISCOVERY_ANNOTATION.to_string(),
        json!([{
            "port": http.port,
            "tls": false,
            "auth": "none",
            "protocol": "http",
        }])
        .to_string(),
    );

    let mut resources = ResourceSet::new(spec.kind(), cluster);
    resources.push(Resource::ServiceAccount(model.service_account()));
    resources.push(Resource::ConfigMap(
        model.config_map(&config_map_name(cluster), logging),
    ));
    resources.push(Resource::Service(model.service(
        &service_name(cluster),
        vec![service_port(HTTP_PORT_NAME, http.port)],
        service_labels,
        service_annotations,
    )));
    resources.push(Resource::NetworkPolicy(
        model.network_policy(vec![ingress_rule(http.port, Vec::new())]),
    ));
    resources.push(Resource::PodDisruptionBudget(model.pod_disruption_budget()));
    if spec.rack.is_some() {
        resources.push(Resource::ClusterRoleBinding(workload.init_binding()));
    }
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
    use tributary_core::spec::{ClientSection, ComponentDetails, ComponentSpec, Cors, Rack};
    use k8s_openapi::api::core::v1::Volume;
    use tributary_core::template::{EnvOverlay, ResourceOverlay};

    fn rack_volumes(volumes: &[Volume]) -> usize {
        volumes.iter().filter(|v| v.name == RACK_VOLUME).count()
    }

    fn render_with(spec: &ComponentSpec, operator: &OperatorConfig) -> Result<ResourceSet> {
        let context = fixtures::context();
        let configuration = resolve_component(spec)?;
        crate::synthesize(&SynthesisInput {
            spec,
            context: &context,
            operator,
            configuration: &configuration,
            credentials: &[],
            build: None,
        })
    }

    fn render(spec: &ComponentSpec) -> Result<ResourceSet> {
        render_with(spec, &OperatorConfig::default())
    }

    fn bridge_mut(spec: &mut ComponentSpec) -> &mut BridgeSpec {
        match &mut spec.component {
            ComponentDetails::Bridge(bridge) => bridge,
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
    fn test_missing_http_is_a_validation_error() {
        let mut spec = fixtures::bridge();
        bridge_mut(&mut spec).http = None;

        match render(&spec) {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "spec.http"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_client_config_and_cors_env() {
        let mut spec = fixtures::bridge();
        let bridge = bridge_mut(&mut spec);
        let mut config = BTreeMap::new();
        config.insert("acks".to_string(), "all".into());
        bridge.producer = Some(ClientSection { config });
        bridge.http = Some(BridgeHttp {
            port: 8081,
            cors: Some(Cors {
                allowed_origins: vec!["https://a".into(), "https://b".into()],
                allowed_methods: vec!["GET".into()],
            }),
        });

        let vars = main_env(&render(&spec).unwrap());
        assert_eq!(value(&vars, "KAFKA_BRIDGE_PRODUCER_CONFIG"), Some("acks=all\n"));
        assert_eq!(value(&vars, "KAFKA_BRIDGE_CONSUMER_CONFIG"), Some(""));
        assert_eq!(value(&vars, "KAFKA_BRIDGE_HTTP_PORT"), Some("8081"));
        assert_eq!(
            value(&vars, "KAFKA_BRIDGE_CORS_ALLOWED_ORIGINS"),
            Some("https://a,https://b")
        );
    }

    #[test]
    fn test_service_discovery_annotation() {
        let resources = render(&fixtures::bridge()).unwrap();
        let service = resources.service().unwrap();
        assert_eq!(
            service.metadata.name.as_deref(),
            Some("my-cluster-bridge-service")
        );
        let annotation = &service.metadata.annotations.as_ref().unwrap()[DISCOVERY_ANNOTATION];
        let parsed: serde_json::Value = serde_json::from_str(annotation).unwrap();
        assert_eq!(parsed[0]["port"], 8080);
        assert_eq!(parsed[0]["protocol"], "http");
    }

    #[test]
    fn test_rack_synthesizes_init_volume_and_binding_together() {
        let resources = render(&fixtures::bridge()).unwrap();
        let pod = resources.deployment().unwrap().spec.as_ref().unwrap()
            .template.spec.clone().unwrap();
        assert!(pod.init_containers.is_none());
        assert_eq!(rack_volumes(pod.volumes.as_deref().unwrap()), 0);
        assert!(resources.cluster_role_binding().is_none());

        let mut spec = fixtures::bridge();
        spec.rack = Some(Rack {
            topology_key: "topology.kubernetes.io/zone".into(),
        });
        let resources = render(&spec).unwrap();
        let pod = resources.deployment().unwrap().spec.as_ref().unwrap()
            .template.spec.clone().unwrap();
        assert_eq!(pod.init_containers.as_ref().unwrap().len(), 1);
        assert_eq!(rack_volumes(pod.volumes.as_deref().unwrap()), 1);
        assert!(pod.affinity.is_some());

        let binding = resources.cluster_role_binding().unwrap();
        assert_eq!(
            binding.metadata.name.as_deref(),
            Some("tributary-kafka-my-cluster-bridge-init")
        );
        assert!(binding.metadata.namespace.is_none());
        assert_eq!(binding.role_ref.name, CLIENT_CLUSTER_ROLE);
    }

    #[test]
    fn test_overlay_env_cannot_remove_required_env() {
        let mut spec = fixtures::bridge();
        spec.template.container = Some(ResourceOverlay {
            env: vec![
                EnvOverlay {
                    name: "EXTRA".into(),
                    value: "1".into(),
                },
                EnvOverlay {
                    name: "HTTPS_PROXY".into(),
                    value: "user".into(),
                },
            ],
            ..Default::default()
        });
        let mut operator = OperatorConfig::default();
        operator.proxy.https_proxy = Some("http://proxy:3128".into());

        let vars = main_env(&render_with(&spec, &operator).unwrap());
        assert_eq!(value(&vars, "EXTRA"), Some("1"));
        assert_eq!(value(&vars, "HTTPS_PROXY"), Some("http://proxy:3128"));
        assert!(value(&vars, "KAFKA_BRIDGE_BOOTSTRAP_SERVERS").is_some());
    }

    #[test]
    fn test_overlay_env_cannot_change_computed_env() {
        let mut spec = fixtures::bridge();
        spec.template.container = Some(ResourceOverlay {
            env: vec![EnvOverlay {
                name: "KAFKA_BRIDGE_BOOTSTRAP_SERVERS".into(),
                value: "elsewhere:9092".into(),
            }],
            ..Default::default()
        });

        let vars = main_env(&render(&spec).unwrap());
        assert_eq!(
            value(&vars, "KAFKA_BRIDGE_BOOTSTRAP_SERVERS"),
            Some("my-cluster-kafka-bootstrap:9092")
        );
        assert_eq!(
            vars.iter()
                .filter(|v| v.name == "KAFKA_BRIDGE_BOOTSTRAP_SERVERS")
                .count(),
            1
        );
    }
}
