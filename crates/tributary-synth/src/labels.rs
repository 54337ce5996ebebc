//! Labels shared by every generated resource.

use std::collections::BTreeMap;
use tributary_core::spec::ComponentKind;

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

pub const CLUSTER_LABEL: &str = "tributary.io/cluster";
pub const KIND_LABEL: &str = "tributary.io/kind";
pub const RESOURCE_NAME_LABEL: &str = "tributary.io/name";
pub const COMPONENT_TYPE_LABEL: &str = "tributary.io/component-type";

/// Label and annotation keys under this domain belong to the operator.
pub const RESERVED_DOMAIN: &str = "tributary.io/";

pub const MANAGED_BY: &str = "tributary-operator";

/// Kind label value of the operator's own pods.
pub const OPERATOR_KIND: &str = "cluster-operator";

/// Labels carried by every resource of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    kind: ComponentKind,
    cluster: String,
    name: String,
}

impl Labels {
    pub fn new(kind: ComponentKind, cluster: &str, name: &str) -> Self {
        Self {
            kind,
            cluster: cluster.to_string(),
            name: name.to_string(),
        }
    }

    /// Full label set for resource metadata.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector();
        labels.insert(NAME_LABEL.to_string(), self.kind.to_string());
        labels.insert(INSTANCE_LABEL.to_string(), self.cluster.clone());
        labels.insert(
            PART_OF_LABEL.to_string(),
            format!("tributary-{}", self.cluster),
        );
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
        labels.insert(
            COMPONENT_TYPE_LABEL.to_string(),
            self.kind.component_type().to_string(),
        );
        labels
    }

    /// Minimal set used to select the component's pods.
    pub fn selector(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(CLUSTER_LABEL.to_string(), self.cluster.clone());
        labels.insert(KIND_LABEL.to_string(), self.kind.to_string());
        labels.insert(RESOURCE_NAME_LABEL.to_string(), self.name.clone());
        labels
    }
}
