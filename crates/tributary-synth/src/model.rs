//! The shared component model.
//!
//! [`ComponentModel`] holds what every component has in common (naming,
//! labels, overlays, operator settings) and knows how to build the generic
//! resources. Component specific behaviour comes in through [`Workload`].

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource,
    EnvVar, ExecAction, HTTPGetAction, LocalObjectReference, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, SecretVolumeSource, Service, ServiceAccount, ServicePort, ServiceSpec,
    Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use tributary_config::OperatorConfig;
use tributary_core::context::ClusterContext;
use tributary_core::spec::{ComponentKind, ComponentSpec, ProbeOptions};
use tributary_core::template::{DeploymentStrategyKind, OverlayTarget};
use tributary_core::ResourceName;

use crate::labels::{Labels, KIND_LABEL, OPERATOR_KIND};
use crate::overlay::{apply_metadata, merge_env, with_extra_labels};

pub const METRICS_PORT: i32 = 9404;
pub const METRICS_PORT_NAME: &str = "tcp-prometheus";
pub const DEFAULT_PDB_MAX_UNAVAILABLE: i32 = 1;

/// Default probe timings of a component.
#[derive(Debug, Clone, Copy)]
pub struct ProbeDefaults {
    pub initial_delay_seconds: i32,
    pub timeout_seconds: i32,
    pub period_seconds: Option<i32>,
}

fn probe_timings(probe: &mut Probe, options: Option<&ProbeOptions>, defaults: ProbeDefaults) {
    let options = options.copied().unwrap_or_default();
    probe.initial_delay_seconds =
        Some(options.initial_delay_seconds.unwrap_or(defaults.initial_delay_seconds));
    probe.timeout_seconds = Some(options.timeout_seconds.unwrap_or(defaults.timeout_seconds));
    probe.period_seconds = options.period_seconds.or(defaults.period_seconds);
}

/// Probe running a command in the container.
pub fn exec_probe(command: &[&str], options: Option<&ProbeOptions>, defaults: ProbeDefaults) -> Probe {
    let mut probe = Probe {
        exec: Some(ExecAction {
            command: Some(command.iter().map(|c| c.to_string()).collect()),
        }),
        ..Default::default()
    };
    probe_timings(&mut probe, options, defaults);
    probe
}

/// HTTP GET probe against a named port.
pub fn http_probe(
    path: &str,
    port_name: &str,
    options: Option<&ProbeOptions>,
    defaults: ProbeDefaults,
) -> Probe {
    let mut probe = Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String(port_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    probe_timings(&mut probe, options, defaults);
    probe
}

pub fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::Int(port)),
        ..Default::default()
    }
}

/// Ingress rule admitting `peers` (everyone when empty) to `port`.
pub fn ingress_rule(port: i32, peers: Vec<NetworkPolicyPeer>) -> NetworkPolicyIngressRule {
    NetworkPolicyIngressRule {
        from: if peers.is_empty() { None } else { Some(peers) },
        ports: Some(vec![NetworkPolicyPort {
            port: Some(IntOrString::Int(port)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
    }
}

pub fn secret_volume(name: &str, secret: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            default_mode: Some(0o444),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn config_map_volume(name: &str, config_map: &str) -> Volume {
    Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// In-memory scratch volume.
pub fn memory_volume(name: &str, size: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_string()),
            size_limit: Some(Quantity(size.to_string())),
        }),
        ..Default::default()
    }
}

/// Main container shape of a workload.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub ports: Vec<ContainerPort>,
    pub liveness_probe: Option<Probe>,
    pub readiness_probe: Option<Probe>,
}

/// Volumes of a pod together with the main container's mounts.
#[derive(Debug, Clone, Default)]
pub struct VolumeSpec {
    pub volumes: Vec<Volume>,
    pub mounts: Vec<VolumeMount>,
}

impl VolumeSpec {
    pub fn add(&mut self, volume: Volume, mount_path: &str) {
        self.mounts.push(VolumeMount {
            name: volume.name.clone(),
            mount_path: mount_path.to_string(),
            ..Default::default()
        });
        self.volumes.push(volume);
    }

    pub fn extend(&mut self, (volumes, mounts): (Vec<Volume>, Vec<VolumeMount>)) {
        self.volumes.extend(volumes);
        self.mounts.extend(mounts);
    }
}

/// Component specific capabilities plugged into [`ComponentModel::deployment`].
pub trait Workload {
    fn container_spec(&self) -> ContainerSpec;

    fn volume_spec(&self) -> VolumeSpec;

    /// Computed environment of the main container, before overlays.
    fn env_vars(&self) -> Vec<EnvVar>;

    fn init_containers(&self) -> Vec<Container> {
        Vec::new()
    }

    /// Pod affinity. Defaults to the user's.
    fn affinity(&self) -> Option<Affinity>;
}

/// State shared by every component model.
#[derive(Debug, Clone)]
pub struct ComponentModel<'a> {
    pub spec: &'a ComponentSpec,
    pub context: &'a ClusterContext,
    pub operator: &'a OperatorConfig,
    pub name: ResourceName,
    pub labels: Labels,
    pub image: String,
}

impl<'a> ComponentModel<'a> {
    pub fn new(
        spec: &'a ComponentSpec,
        context: &'a ClusterContext,
        operator: &'a OperatorConfig,
        suffix: &str,
        image: String,
    ) -> Self {
        let name = ResourceName::new(&spec.cluster, suffix);
        let labels = Labels::new(spec.kind(), &spec.cluster, name.as_str());
        Self {
            spec,
            context,
            operator,
            name,
            labels,
            image,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.spec.kind()
    }

    pub fn cluster(&self) -> &str {
        &self.spec.cluster
    }

    pub fn namespace(&self) -> &str {
        &self.context.namespace
    }

    /// `<cluster>-<suffix>`
    pub fn resource_name(&self, suffix: &str) -> String {
        ResourceName::new(&self.spec.cluster, suffix).into()
    }

    /// Namespaced metadata with the common labels and the overlay for `target`.
    pub fn metadata(&self, name: &str, target: Option<OverlayTarget>) -> ObjectMeta {
        self.metadata_with(name, target, BTreeMap::new(), BTreeMap::new())
    }

    /// Like [`Self::metadata`], with extra labels and annotations below the overlay.
    pub fn metadata_with(
        &self,
        name: &str,
        target: Option<OverlayTarget>,
        extra_labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> ObjectMeta {
        let labels = with_extra_labels(self.labels.to_map(), &extra_labels);
        let overlay = target.and_then(|t| self.spec.template.for_target(t));
        let merged = apply_metadata(labels, annotations, overlay);
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace().to_string()),
            labels: Some(merged.labels),
            annotations: if merged.annotations.is_empty() {
                None
            } else {
                Some(merged.annotations)
            },
            ..Default::default()
        }
    }

    /// Metadata of a cluster scoped resource.
    pub fn cluster_metadata(&self, name: &str, target: Option<OverlayTarget>) -> ObjectMeta {
        ObjectMeta {
            namespace: None,
            ..self.metadata(name, target)
        }
    }

    /// Pod template metadata: common labels, operator pod labels, pod overlay.
    pub fn pod_metadata(&self, annotations: BTreeMap<String, String>) -> ObjectMeta {
        let labels = with_extra_labels(
            self.labels.to_map(),
            &self.operator.pod_labels_for(self.kind()),
        );
        let merged = apply_metadata(
            labels,
            annotations,
            self.spec.template.for_target(OverlayTarget::Pod),
        );
        ObjectMeta {
            labels: Some(merged.labels),
            annotations: if merged.annotations.is_empty() {
                None
            } else {
                Some(merged.annotations)
            },
            ..Default::default()
        }
    }

    pub fn selector(&self) -> LabelSelector {
        LabelSelector {
            match_labels: Some(self.labels.selector()),
            ..Default::default()
        }
    }

    pub fn service_account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: self.metadata(self.name.as_str(), Some(OverlayTarget::ServiceAccount)),
            ..Default::default()
        }
    }

    pub fn config_map(&self, name: &str, data: BTreeMap<String, String>) -> ConfigMap {
        ConfigMap {
            metadata: self.metadata(name, None),
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn service(
        &self,
        name: &str,
        ports: Vec<ServicePort>,
        extra_labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Service {
        Service {
            metadata: self.metadata_with(
                name,
                Some(OverlayTarget::ApiService),
                extra_labels,
                annotations,
            ),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                ports: Some(ports),
                selector: Some(self.labels.selector()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Peers matching the operator's pods.
    pub fn operator_peers(&self) -> Vec<NetworkPolicyPeer> {
        let mut pod_labels = BTreeMap::new();
        pod_labels.insert(KIND_LABEL.to_string(), OPERATOR_KIND.to_string());
        let pod_selector = Some(LabelSelector {
            match_labels: Some(pod_labels),
            ..Default::default()
        });

        let namespace_selector = match self.operator.namespace.as_deref() {
            Some(ns) if ns == self.namespace() => None,
            Some(_) if !self.operator.namespace_labels.is_empty() => Some(LabelSelector {
                match_labels: Some(self.operator.namespace_labels.clone()),
                ..Default::default()
            }),
            Some(ns) => {
                let mut labels = BTreeMap::new();
                labels.insert("kubernetes.io/metadata.name".to_string(), ns.to_string());
                Some(LabelSelector {
                    match_labels: Some(labels),
                    ..Default::default()
                })
            }
            None => Some(LabelSelector::default()),
        };

        vec![NetworkPolicyPeer {
            pod_selector,
            namespace_selector,
            ..Default::default()
        }]
    }

    /// Network policy with `rules`, plus the metrics rule when metrics are enabled.
    pub fn network_policy(&self, mut rules: Vec<NetworkPolicyIngressRule>) -> NetworkPolicy {
        if self.spec.metrics_enabled {
            rules.push(ingress_rule(METRICS_PORT, Vec::new()));
        }
        NetworkPolicy {
            metadata: self.metadata(self.name.as_str(), None),
            spec: Some(NetworkPolicySpec {
                pod_selector: self.selector(),
                ingress: Some(rules),
                policy_types: Some(vec!["Ingress".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn pod_disruption_budget(&self) -> PodDisruptionBudget {
        let max_unavailable = self
            .spec
            .template
            .pdb_max_unavailable
            .unwrap_or(DEFAULT_PDB_MAX_UNAVAILABLE);
        PodDisruptionBudget {
            metadata: self.metadata(
                self.name.as_str(),
                Some(OverlayTarget::PodDisruptionBudget),
            ),
            spec: Some(PodDisruptionBudgetSpec {
                max_unavailable: Some(IntOrString::Int(max_unavailable)),
                selector: Some(self.selector()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn resources(&self) -> Option<ResourceRequirements> {
        self.spec.resources.as_ref().map(|r| {
            let quantities = |m: &BTreeMap<String, String>| -> Option<BTreeMap<String, Quantity>> {
                if m.is_empty() {
                    None
                } else {
                    Some(
                        m.iter()
                            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                            .collect(),
                    )
                }
            };
            ResourceRequirements {
                limits: quantities(&r.limits),
                requests: quantities(&r.requests),
                ..Default::default()
            }
        })
    }

    fn strategy(&self) -> DeploymentStrategy {
        match self.spec.template.deployment_strategy {
            Some(DeploymentStrategyKind::Recreate) => DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                rolling_update: None,
            },
            _ => DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::Int(1)),
                    max_unavailable: Some(IntOrString::Int(0)),
                }),
            },
        }
    }

    /// Pod spec around `containers`, with the pod settings of the overlay.
    pub fn pod_spec(
        &self,
        containers: Vec<Container>,
        init_containers: Vec<Container>,
        volumes: Vec<Volume>,
        affinity: Option<Affinity>,
    ) -> PodSpec {
        let settings = &self.spec.template.pod_settings;
        PodSpec {
            service_account_name: Some(self.name.to_string()),
            containers,
            init_containers: if init_containers.is_empty() {
                None
            } else {
                Some(init_containers)
            },
            volumes: Some(volumes),
            affinity,
            tolerations: if settings.tolerations.is_empty() {
                None
            } else {
                Some(settings.tolerations.clone())
            },
            image_pull_secrets: if settings.image_pull_secrets.is_empty() {
                None
            } else {
                Some(
                    settings
                        .image_pull_secrets
                        .iter()
                        .map(|name| LocalObjectReference { name: name.clone() })
                        .collect(),
                )
            },
            security_context: settings.security_context.clone(),
            priority_class_name: settings.priority_class_name.clone(),
            termination_grace_period_seconds: settings.termination_grace_period_seconds,
            ..Default::default()
        }
    }

    /// The component's Deployment.
    pub fn deployment(&self, workload: &dyn Workload, replicas: i32) -> Deployment {
        let spec = workload.container_spec();
        let volumes = workload.volume_spec();
        let container_overlay = self.spec.template.for_target(OverlayTarget::Container);

        let mut ports = spec.ports;
        if self.spec.metrics_enabled {
            ports.push(container_port(METRICS_PORT_NAME, METRICS_PORT));
        }

        let container = Container {
            name: self.name.to_string(),
            image: Some(self.image.clone()),
            command: spec.command,
            args: spec.args,
            ports: Some(ports),
            env: Some(merge_env(
                workload.env_vars(),
                container_overlay,
                &self.operator.required_env(),
            )),
            liveness_probe: spec.liveness_probe,
            readiness_probe: spec.readiness_probe,
            resources: self.resources(),
            volume_mounts: Some(volumes.mounts),
            security_context: container_overlay.and_then(|o| o.security_context.clone()),
            ..Default::default()
        };

        Deployment {
            metadata: self.metadata(self.name.as_str(), Some(OverlayTarget::Deployment)),
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: self.selector(),
                strategy: Some(self.strategy()),
                template: PodTemplateSpec {
                    metadata: Some(self.pod_metadata(BTreeMap::new())),
                    spec: Some(self.pod_spec(
                        vec![container],
                        workload.init_containers(),
                        volumes.volumes,
                        workload.affinity(),
                    )),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
