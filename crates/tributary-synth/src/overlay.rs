//! Template overlay resolution.
//!
//! Overlays can add to and override metadata, but the operator's own labels
//! and every computed or required environment variable always survive.

use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
};
use std::collections::BTreeMap;
use tracing::warn;
use tributary_core::template::{EnvOverlay, ResourceOverlay};

use crate::labels::RESERVED_DOMAIN;

/// Labels and annotations after overlaying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// Merge overlay labels and annotations onto the base ones. The overlay wins
/// on collisions, except for labels in the reserved domain, which are ignored.
pub fn apply_metadata(
    base_labels: BTreeMap<String, String>,
    base_annotations: BTreeMap<String, String>,
    overlay: Option<&ResourceOverlay>,
) -> Metadata {
    let mut metadata = Metadata {
        labels: base_labels,
        annotations: base_annotations,
    };
    let Some(overlay) = overlay else {
        return metadata;
    };

    for (key, value) in &overlay.labels {
        if key.starts_with(RESERVED_DOMAIN) {
            warn!(label = %key, "overlay label uses the reserved {} domain, ignoring it", RESERVED_DOMAIN);
            continue;
        }
        metadata.labels.insert(key.clone(), value.clone());
    }
    for (key, value) in &overlay.annotations {
        metadata.annotations.insert(key.clone(), value.clone());
    }
    metadata
}

/// Merge extra labels (not from an overlay) under the base ones. The base wins.
pub fn with_extra_labels(
    mut base: BTreeMap<String, String>,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    for (key, value) in extra {
        base.entry(key.clone()).or_insert_with(|| value.clone());
    }
    base
}

/// A plain `name=value` environment variable.
pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn upsert(vars: &mut Vec<EnvVar>, var: EnvVar) {
    match vars.iter_mut().find(|v| v.name == var.name) {
        Some(existing) => *existing = var,
        None => vars.push(var),
    }
}

/// Resolve a container's environment.
///
/// Computed variables come first, with the required ones replacing by name or
/// appending. Overlay variables are appended only under names not already
/// present.
pub fn merge_env(
    computed: Vec<EnvVar>,
    overlay: Option<&ResourceOverlay>,
    required: &[(String, String)],
) -> Vec<EnvVar> {
    let mut vars = computed;
    for (name, value) in required {
        upsert(&mut vars, env(name, value.clone()));
    }
    let user: &[EnvOverlay] = overlay.map(|o| o.env.as_slice()).unwrap_or_default();
    for var in user {
        if vars.iter().any(|v| v.name == var.name) {
            warn!(env = %var.name, "overlay env var collides with a computed one, ignoring it");
            continue;
        }
        vars.push(env(&var.name, var.value.clone()));
    }
    vars
}

/// Merge the rack constraint with the user's affinity.
///
/// With a topology key, every required node selector term of the user's
/// affinity gets an `Exists` requirement on that key; if the user has none,
/// a term with only that requirement is created. Everything else the user
/// set is kept.
pub fn merge_rack_affinity(topology_key: Option<&str>, user: Option<&Affinity>) -> Option<Affinity> {
    let Some(key) = topology_key else {
        return user.cloned();
    };

    let requirement = NodeSelectorRequirement {
        key: key.to_string(),
        operator: "Exists".to_string(),
        values: None,
    };

    let mut affinity = user.cloned().unwrap_or_default();
    let node_affinity = affinity.node_affinity.get_or_insert_with(NodeAffinity::default);
    let selector = node_affinity
        .required_during_scheduling_ignored_during_execution
        .get_or_insert_with(NodeSelector::default);

    if selector.node_selector_terms.is_empty() {
        selector.node_selector_terms.push(NodeSelectorTerm {
            match_expressions: Some(vec![requirement]),
            ..Default::default()
        });
    } else {
        for term in &mut selector.node_selector_terms {
            term.match_expressions
                .get_or_insert_with(Vec::new)
                .push(requirement.clone());
        }
    }

    Some(affinity)
}
