//! JVM tuning environment variables.

use k8s_openapi::api::core::v1::EnvVar;
use tributary_core::spec::{JvmOptions, ResourceRequirements};

use crate::overlay::env;

pub const HEAP_OPTS: &str = "KAFKA_HEAP_OPTS";
pub const PERFORMANCE_OPTS: &str = "KAFKA_JVM_PERFORMANCE_OPTS";
pub const SYSTEM_PROPERTIES: &str = "TRIBUTARY_JAVA_SYSTEM_PROPERTIES";
pub const DYNAMIC_HEAP_PERCENTAGE: &str = "TRIBUTARY_DYNAMIC_HEAP_PERCENTAGE";
pub const DYNAMIC_HEAP_MAX: &str = "TRIBUTARY_DYNAMIC_HEAP_MAX";

/// Heap share used when only container memory is known.
pub const DEFAULT_DYNAMIC_HEAP_PERCENTAGE: u32 = 75;

/// Heap options: explicit `-Xms`/`-Xmx`, or a dynamic percentage of the
/// container memory when that is set instead.
pub fn heap_env(
    jvm: Option<&JvmOptions>,
    resources: Option<&ResourceRequirements>,
    dynamic_percentage: u32,
) -> Vec<EnvVar> {
    let xms = jvm.and_then(|j| j.xms.as_deref());
    let xmx = jvm.and_then(|j| j.xmx.as_deref());

    if xms.is_some() || xmx.is_some() {
        let mut opts = Vec::new();
        if let Some(xms) = xms {
            opts.push(format!("-Xms{}", xms));
        }
        if let Some(xmx) = xmx {
            opts.push(format!("-Xmx{}", xmx));
        }
        return vec![env(HEAP_OPTS, opts.join(" "))];
    }

    let limit = resources.and_then(|r| r.limits.get("memory"));
    let request = resources.and_then(|r| r.requests.get("memory"));
    let mut vars = Vec::new();
    if limit.is_some() || request.is_some() {
        vars.push(env(DYNAMIC_HEAP_PERCENTAGE, dynamic_percentage.to_string()));
        if let Some(limit) = limit {
            vars.push(env(DYNAMIC_HEAP_MAX, limit.clone()));
        }
    }
    vars
}

/// `-XX` flags and system properties.
pub fn performance_env(jvm: Option<&JvmOptions>) -> Vec<EnvVar> {
    let Some(jvm) = jvm else {
        return Vec::new();
    };

    let mut vars = Vec::new();
    if !jvm.xx.is_empty() {
        let flags: Vec<String> = jvm
            .xx
            .iter()
            .map(|(key, value)| match value.as_str() {
                "true" => format!("-XX:+{}", key),
                "false" => format!("-XX:-{}", key),
                other => format!("-XX:{}={}", key, other),
            })
            .collect();
        vars.push(env(PERFORMANCE_OPTS, flags.join(" ")));
    }

    if !jvm.java_system_properties.is_empty() {
        let props: Vec<String> = jvm
            .java_system_properties
            .iter()
            .map(|p| format!("-D{}={}", p.name, p.value))
            .collect();
        vars.push(env(SYSTEM_PROPERTIES, props.join(" ")));
    }
    vars
}

/// All JVM variables of a component.
pub fn jvm_env(
    jvm: Option<&JvmOptions>,
    resources: Option<&ResourceRequirements>,
    dynamic_percentage: u32,
) -> Vec<EnvVar> {
    let mut vars = heap_env(jvm, resources, dynamic_percentage);
    vars.extend(performance_env(jvm));
    vars
}
