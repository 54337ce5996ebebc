//! Workload balancer resources.

use k8s_openapi::api::core::v1::{Affinity, EnvVar};
use serde_json::json;
use std::collections::BTreeMap;
use tributary_config::balancer::{api_auth_enabled, api_ssl_enabled};
use tributary_config::logging::{logging_config, logging_config_key};
use tributary_config::{ConfigSection, ResolvedConfiguration};
use tributary_core::context::StorageTopology;
use tributary_core::resource::{Resource, ResourceSet};
use tributary_core::spec::{BalancerSpec, BrokerCapacity};
use tributary_core::{Error, Result};
use tributary_credentials::secret::{
    api_secret, certificate_secret, API_ADMIN_NAME, API_ADMIN_PASSWORD_KEY, API_USER_PASSWORD_KEY,
};

use crate::jvm::{jvm_env, DEFAULT_DYNAMIC_HEAP_PERCENTAGE};
use crate::model::{
    config_map_volume, container_port, exec_probe, ingress_rule, memory_volume, secret_volume,
    service_port, ComponentModel, ContainerSpec, ProbeDefaults, VolumeSpec, Workload,
};
use crate::overlay::env;
use crate::synthesizer::SynthesisInput;

pub const API_PORT: i32 = 9090;
pub const API_PORT_NAME: &str = "rest-api";
pub const API_HEALTHCHECK_PATH: &str = "/kafkacruisecontrol/state";

const BROKER_BOOTSTRAP_PORT: u16 = 9091;
const DEFAULT_MIN_INSYNC_REPLICAS: &str = "1";
const MIN_INSYNC_REPLICAS_KEY: &str = "min.insync.replicas";

/// MiB assumed for brokers on ephemeral storage without a size limit.
const DEFAULT_DISK_MIB: u64 = 100_000;
const DEFAULT_CPU_CORES: &str = "1";
const DEFAULT_NETWORK_KIB_PER_SECOND: u64 = 10_000;

const PROBE_DEFAULTS: ProbeDefaults = ProbeDefaults {
    initial_delay_seconds: 15,
    timeout_seconds: 5,
    period_seconds: None,
};

const HEALTHCHECK: &str = "/opt/cruise-control/cruise_control_healthcheck.sh";
const RUN_SCRIPT: &str = "/opt/cruise-control/cruise_control_run.sh";

/// Name of the balancer's own certificate.
pub fn certificate_name(cluster: &str) -> String {
    format!("{}-balancer", cluster)
}

pub fn certificate_secret_name(cluster: &str) -> String {
    format!("{}-balancer-certs", cluster)
}

pub fn api_secret_name(cluster: &str) -> String {
    format!("{}-balancer-api", cluster)
}

fn cluster_ca_secret_name(cluster: &str) -> String {
    format!("{}-cluster-ca-cert", cluster)
}

fn config_map_name(cluster: &str) -> String {
    format!("{}-balancer-config", cluster)
}

/// Parse a storage quantity (`100Gi`, `1.5Gi`, `500M`, `1e3`, plain bytes)
/// into whole bytes.
fn quantity_bytes(quantity: &str) -> Option<u64> {
    let quantity = quantity.trim();
    let mantissa_end = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(quantity.len());
    let (mantissa, rest) = quantity.split_at(mantissa_end);
    let mantissa: f64 = mantissa.parse().ok()?;

    // `1e3` is an exponent, `1E` alone is the exa suffix.
    let (exponent, unit) = match rest.strip_prefix(['e', 'E']) {
        Some(digits)
            if digits
                .trim_start_matches(['+', '-'])
                .starts_with(|c: char| c.is_ascii_digit()) =>
        {
            (digits.parse::<i32>().ok()?, "")
        }
        _ => (0, rest),
    };

    let multiplier: f64 = match unit {
        "" => 1.0,
        "m" => 1e-3,
        "k" | "K" => 1e3,
        "Ki" => 1024.0,
        "M" => 1e6,
        "Mi" => 1024f64.powi(2),
        "G" => 1e9,
        "Gi" => 1024f64.powi(3),
        "T" => 1e12,
        "Ti" => 1024f64.powi(4),
        "P" => 1e15,
        "Pi" => 1024f64.powi(5),
        "E" => 1e18,
        "Ei" => 1024f64.powi(6),
        _ => return None,
    };

    let bytes = mantissa * 10f64.powi(exponent) * multiplier;
    if bytes.is_finite() && bytes >= 0.0 && bytes < u64::MAX as f64 {
        Some(bytes as u64)
    } else {
        None
    }
}

fn size_mib(field: &str, size: &str) -> Result<u64> {
    quantity_bytes(size)
        .map(|b| b / (1 << 20))
        .ok_or_else(|| Error::validation(field, format!("invalid size {}", size)))
}

/// Disk capacity of one broker in MiB.
fn disk_capacity(storage: &StorageTopology) -> Result<u64> {
    match storage {
        StorageTopology::Ephemeral { size_limit: None } => Ok(DEFAULT_DISK_MIB),
        StorageTopology::Ephemeral {
            size_limit: Some(size),
        } => size_mib("storage.sizeLimit", size),
        StorageTopology::PersistentClaim { size } => size_mib("storage.size", size),
        StorageTopology::Jbod { volumes } => {
            volumes
                .iter()
                .try_fold(0, |total: u64, volume| -> Result<u64> {
                    let field = format!("storage.volumes[{}].size", volume.id);
                    total
                        .checked_add(size_mib(&field, &volume.size)?)
                        .ok_or_else(|| Error::validation(field, "total storage size overflows"))
                })
        }
    }
}

/// Network rate (`10000KiB/s`, `125MB/s`) in KiB per second.
fn network_capacity(field: &str, rate: Option<&str>) -> Result<u64> {
    match rate {
        None => Ok(DEFAULT_NETWORK_KIB_PER_SECOND),
        Some(rate) => {
            let quantity = rate.trim_end_matches("/s").trim_end_matches('B');
            quantity_bytes(quantity)
                .map(|b| b / (1 << 10))
                .ok_or_else(|| Error::validation(field, format!("invalid network rate {}", rate)))
        }
    }
}

/// Broker capacity document read by the balancer.
pub fn capacity_configuration(
    storage: &StorageTopology,
    capacity: Option<&BrokerCapacity>,
) -> Result<String> {
    let cpu = capacity
        .and_then(|c| c.cpu.as_deref())
        .unwrap_or(DEFAULT_CPU_CORES);
    let inbound = network_capacity(
        "spec.capacity.inboundNetwork",
        capacity.and_then(|c| c.inbound_network.as_deref()),
    )?;
    let outbound = network_capacity(
        "spec.capacity.outboundNetwork",
        capacity.and_then(|c| c.outbound_network.as_deref()),
    )?;

    let document = json!({
        "brokerCapacities": [{
            "brokerId": "-1",
            "capacity": {
                "DISK": disk_capacity(storage)?.to_string(),
                "CPU": { "num.cores": cpu },
                "NW_IN": inbound.to_string(),
                "NW_OUT": outbound.to_string(),
            },
            "doc": "Capacity applied to every broker",
        }]
    });
    Ok(document.to_string())
}

struct Balancer<'a> {
    model: ComponentModel<'a>,
    config: &'a ResolvedConfiguration,
    capacity: String,
    min_insync_replicas: String,
}

impl Workload for Balancer<'_> {
    fn container_spec(&self) -> ContainerSpec {
        let spec = self.model.spec;
        ContainerSpec {
            command: Some(vec![RUN_SCRIPT.to_string()]),
            args: None,
            ports: vec![container_port(API_PORT_NAME, API_PORT)],
            liveness_probe: Some(exec_probe(
                &[HEALTHCHECK],
                spec.liveness_probe.as_ref(),
                PROBE_DEFAULTS,
            )),
            readiness_probe: Some(exec_probe(
                &[HEALTHCHECK],
                spec.readiness_probe.as_ref(),
                PROBE_DEFAULTS,
            )),
        }
    }

    fn volume_spec(&self) -> VolumeSpec {
        let cluster = self.model.cluster();
        let mut volumes = VolumeSpec::default();
        volumes.add(memory_volume("tmp", "100Mi"), "/tmp");
        volumes.add(
            secret_volume("cc-certs", &certificate_secret_name(cluster)),
            "/etc/cruise-control/cc-certs/",
        );
        volumes.add(
            secret_volume("cluster-ca-certs", &cluster_ca_secret_name(cluster)),
            "/etc/cruise-control/cluster-ca-certs/",
        );
        volumes.add(
            secret_volume("api-auth-config", &api_secret_name(cluster)),
            "/opt/cruise-control/api-auth-config/",
        );
        volumes.add(
            config_map_volume("balancer-logging", &config_map_name(cluster)),
            "/opt/cruise-control/custom-config/",
        );
        volumes
    }

    fn env_vars(&self) -> Vec<EnvVar> {
        let spec = self.model.spec;
        let mut vars = vec![
            env(
                "CRUISE_CONTROL_METRICS_ENABLED",
                spec.metrics_enabled.to_string(),
            ),
            env(
                "TRIBUTARY_KAFKA_BOOTSTRAP_SERVERS",
                format!("{}-kafka-bootstrap:{}", spec.cluster, BROKER_BOOTSTRAP_PORT),
            ),
            env(
                "TRIBUTARY_KAFKA_GC_LOG_ENABLED",
                spec.gc_logging_enabled().to_string(),
            ),
            env("MIN_INSYNC_REPLICAS", self.min_insync_replicas.clone()),
            env("CRUISE_CONTROL_CAPACITY_CONFIGURATION", self.capacity.clone()),
            env(
                "TRIBUTARY_CC_API_SSL_ENABLED",
                api_ssl_enabled(self.config).to_string(),
            ),
            env(
                "TRIBUTARY_CC_API_AUTH_ENABLED",
                api_auth_enabled(self.config).to_string(),
            ),
            env("API_USER", API_ADMIN_NAME),
            env("API_PORT", API_PORT.to_string()),
            env("API_HEALTHCHECK_PATH", API_HEALTHCHECK_PATH),
            env("CRUISE_CONTROL_CONFIGURATION", self.config.render()),
        ];
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

pub(crate) fn synthesize(input: &SynthesisInput<'_>, balancer: &BalancerSpec) -> Result<ResourceSet> {
    let spec = input.spec;
    let cluster = spec.cluster.as_str();

    let config = input
        .configuration
        .get(ConfigSection::Main)
        .ok_or_else(|| Error::Internal("balancer configuration was not resolved".into()))?;

    let image = match (&spec.image, &input.operator.images.balancer) {
        (Some(image), _) | (None, Some(image)) => image.clone(),
        (None, None) => input.operator.platform_image(None, input.version())?,
    };

    let admin = input.password(API_ADMIN_PASSWORD_KEY)?;
    let user = input.password(API_USER_PASSWORD_KEY)?;
    let certificate = input.certificate(&certificate_name(cluster))?;

    let min_insync_replicas = balancer
        .broker_config
        .get(MIN_INSYNC_REPLICAS_KEY)
        .map(|v| v.render())
        .unwrap_or_else(|| DEFAULT_MIN_INSYNC_REPLICAS.to_string());

    let workload = Balancer {
        model: ComponentModel::new(spec, input.context, input.operator, "balancer", image),
        config,
        capacity: capacity_configuration(&input.context.storage, balancer.capacity.as_ref())?,
        min_insync_replicas,
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
    resources.push(Resource::Secret(api_secret(
        model.metadata(&api_secret_name(cluster), None),
        admin,
        user,
    )));
    resources.push(Resource::Secret(certificate_secret(
        model.metadata(&certificate_secret_name(cluster), None),
        certificate,
    )));
    resources.push(Resource::Service(model.service(
        model.name.as_str(),
        vec![service_port(API_PORT_NAME, API_PORT)],
        BTreeMap::new(),
        BTreeMap::new(),
    )));
    resources.push(Resource::NetworkPolicy(model.network_policy(vec![
        ingress_rule(API_PORT, model.operator_peers()),
    ])));
    resources.push(Resource::Deployment(model.deployment(&workload, 1)));
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::model::METRICS_PORT;
    use tributary_config::{resolve_component, OperatorConfig};
    use tributary_core::context::StorageVolume;

    fn render(spec: &tributary_core::spec::ComponentSpec) -> Result<ResourceSet> {
        let context = fixtures::context();
        let operator = OperatorConfig::default();
        let configuration = resolve_component(spec)?;
        let credentials = fixtures::balancer_credentials();
        crate::synthesize(&SynthesisInput {
            spec,
            context: &context,
            operator: &operator,
            configuration: &configuration,
            credentials: &credentials,
            build: None,
        })
    }

    fn env_value(resources: &ResourceSet, name: &str) -> Option<String> {
        let deployment = resources.deployment()?;
        let pod = deployment.spec.as_ref()?.template.spec.as_ref()?;
        pod.containers[0]
            .env
            .as_ref()?
            .iter()
            .find(|v| v.name == name)
            .and_then(|v| v.value.clone())
    }

    #[test]
    fn test_resources_in_order() {
        let resources = render(&fixtures::balancer()).unwrap();
        let kinds: Vec<&str> = resources.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "ServiceAccount",
                "ConfigMap",
                "Secret",
                "Secret",
                "Service",
                "NetworkPolicy",
                "Deployment"
            ]
        );
        assert!(resources.secret("my-cluster-balancer-api").is_some());
        assert!(resources.secret("my-cluster-balancer-certs").is_some());
    }

    #[test]
    fn test_config_and_capacity_env() {
        let resources = render(&fixtures::balancer()).unwrap();
        let config = env_value(&resources, "CRUISE_CONTROL_CONFIGURATION").unwrap();
        assert!(config.contains("webserver.security.enable=true"));
        assert_eq!(
            env_value(&resources, "MIN_INSYNC_REPLICAS").as_deref(),
            Some("1")
        );
        let capacity = env_value(&resources, "CRUISE_CONTROL_CAPACITY_CONFIGURATION").unwrap();
        assert!(capacity.contains("\"DISK\":\"100000\""));
    }

    #[test]
    fn test_metrics_port_and_rule_follow_flag() {
        let resources = render(&fixtures::balancer()).unwrap();
        let rules = resources
            .network_policy()
            .and_then(|p| p.spec.as_ref())
            .and_then(|s| s.ingress.clone())
            .unwrap();
        assert_eq!(rules.len(), 1);

        let mut spec = fixtures::balancer();
        spec.metrics_enabled = true;
        let resources = render(&spec).unwrap();
        let rules = resources
            .network_policy()
            .and_then(|p| p.spec.as_ref())
            .and_then(|s| s.ingress.clone())
            .unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[1].from.is_none());

        let ports = resources.deployment().unwrap().spec.as_ref().unwrap()
            .template.spec.as_ref().unwrap().containers[0]
            .ports
            .clone()
            .unwrap();
        assert!(ports.iter().any(|p| p.container_port == METRICS_PORT));
    }

    #[test]
    fn test_missing_certificate_fails() {
        let spec = fixtures::balancer();
        let context = fixtures::context();
        let operator = OperatorConfig::default();
        let configuration = resolve_component(&spec).unwrap();
        let result = crate::synthesize(&SynthesisInput {
            spec: &spec,
            context: &context,
            operator: &operator,
            configuration: &configuration,
            credentials: &[],
            build: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_disk_capacity_from_storage() {
        let claim = StorageTopology::PersistentClaim {
            size: "100Gi".into(),
        };
        assert_eq!(disk_capacity(&claim).unwrap(), 102_400);

        let jbod = StorageTopology::Jbod {
            volumes: vec![
                StorageVolume {
                    id: 0,
                    size: "1Gi".into(),
                },
                StorageVolume {
                    id: 1,
                    size: "2Gi".into(),
                },
            ],
        };
        assert_eq!(disk_capacity(&jbod).unwrap(), 3_072);

        let bad = StorageTopology::PersistentClaim {
            size: "lots".into(),
        };
        assert!(matches!(
            disk_capacity(&bad),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_decimal_and_exponent_quantities() {
        assert_eq!(quantity_bytes("1.5Gi"), Some(1_610_612_736));
        assert_eq!(quantity_bytes("0.5Ti"), Some(549_755_813_888));
        assert_eq!(quantity_bytes("1e3"), Some(1_000));
        assert_eq!(quantity_bytes("2E"), Some(2_000_000_000_000_000_000));
        assert_eq!(quantity_bytes("1.5.0Gi"), None);
        assert_eq!(quantity_bytes("Gi"), None);

        let claim = StorageTopology::PersistentClaim {
            size: "1.5Gi".into(),
        };
        assert_eq!(disk_capacity(&claim).unwrap(), 1_536);
    }

    #[test]
    fn test_network_capacity() {
        assert_eq!(network_capacity("f", None).unwrap(), 10_000);
        assert_eq!(network_capacity("f", Some("20000KiB/s")).unwrap(), 20_000);
    }
}
