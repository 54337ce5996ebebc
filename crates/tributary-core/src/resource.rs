//! Synthesized resource descriptors.

use k8s_openapi::Resource as ApiResource;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::spec::ComponentKind;
use crate::Result;

/// A platform object that has no typed representation here, such as a
/// native build pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: serde_json::Value,
}

/// One resource descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Deployment(Deployment),
    Service(Service),
    ServiceAccount(ServiceAccount),
    Secret(Secret),
    ConfigMap(ConfigMap),
    NetworkPolicy(NetworkPolicy),
    PodDisruptionBudget(PodDisruptionBudget),
    ClusterRoleBinding(ClusterRoleBinding),
    Pod(Pod),
    Native(NativeObject),
}

impl Resource {
    pub fn kind(&self) -> &str {
        match self {
            Resource::Deployment(_) => Deployment::KIND,
            Resource::Service(_) => Service::KIND,
            Resource::ServiceAccount(_) => ServiceAccount::KIND,
            Resource::Secret(_) => Secret::KIND,
            Resource::ConfigMap(_) => ConfigMap::KIND,
            Resource::NetworkPolicy(_) => NetworkPolicy::KIND,
            Resource::PodDisruptionBudget(_) => PodDisruptionBudget::KIND,
            Resource::ClusterRoleBinding(_) => ClusterRoleBinding::KIND,
            Resource::Pod(_) => Pod::KIND,
            Resource::Native(o) => &o.kind,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Deployment(r) => &r.metadata,
            Resource::Service(r) => &r.metadata,
            Resource::ServiceAccount(r) => &r.metadata,
            Resource::Secret(r) => &r.metadata,
            Resource::ConfigMap(r) => &r.metadata,
            Resource::NetworkPolicy(r) => &r.metadata,
            Resource::PodDisruptionBudget(r) => &r.metadata,
            Resource::ClusterRoleBinding(r) => &r.metadata,
            Resource::Pod(r) => &r.metadata,
            Resource::Native(r) => &r.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

/// The complete, ordered collection of resources produced for one component.
///
/// Order is fixed by the synthesizer so that serializing the same set twice
/// gives identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSet {
    component: ComponentKind,
    cluster: String,
    resources: Vec<Resource>,
}

impl ResourceSet {
    pub fn new(component: ComponentKind, cluster: impl Into<String>) -> Self {
        Self {
            component,
            cluster: cluster.into(),
            resources: Vec::new(),
        }
    }

    pub fn push(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn component(&self) -> ComponentKind {
        self.component
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.kind() == kind && r.name() == name)
    }

    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources.iter().filter(move |r| r.kind() == kind)
    }

    pub fn deployment(&self) -> Option<&Deployment> {
        self.resources.iter().find_map(|r| match r {
            Resource::Deployment(d) => Some(d),
            _ => None,
        })
    }

    pub fn service(&self) -> Option<&Service> {
        self.resources.iter().find_map(|r| match r {
            Resource::Service(s) => Some(s),
            _ => None,
        })
    }

    pub fn network_policy(&self) -> Option<&NetworkPolicy> {
        self.resources.iter().find_map(|r| match r {
            Resource::NetworkPolicy(n) => Some(n),
            _ => None,
        })
    }

    pub fn cluster_role_binding(&self) -> Option<&ClusterRoleBinding> {
        self.resources.iter().find_map(|r| match r {
            Resource::ClusterRoleBinding(c) => Some(c),
            _ => None,
        })
    }

    pub fn pod(&self) -> Option<&Pod> {
        self.resources.iter().find_map(|r| match r {
            Resource::Pod(p) => Some(p),
            _ => None,
        })
    }

    pub fn secret(&self, name: &str) -> Option<&Secret> {
        self.resources.iter().find_map(|r| match r {
            Resource::Secret(s) if s.metadata.name.as_deref() == Some(name) => Some(s),
            _ => None,
        })
    }

    pub fn config_map(&self, name: &str) -> Option<&ConfigMap> {
        self.resources.iter().find_map(|r| match r {
            Resource::ConfigMap(c) if c.metadata.name.as_deref() == Some(name) => Some(c),
            _ => None,
        })
    }

    pub fn native(&self, kind: &str) -> Option<&NativeObject> {
        self.resources.iter().find_map(|r| match r {
            Resource::Native(o) if o.kind == kind => Some(o),
            _ => None,
        })
    }

    /// Pretty JSON array of all resources, in order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.resources)?)
    }
}

impl<'a> IntoIterator for &'a ResourceSet {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}
