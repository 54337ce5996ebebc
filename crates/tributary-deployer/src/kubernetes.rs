//! Kubernetes applier implementation.

use async_trait::async_trait;
use chrono::Utc;
use kube::Client;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use tracing::{debug, info};
use tributary_core::Result;
use tributary_core::applier::{AppliedResource, ApplyReport, ResourceApplier};
use tributary_core::resource::{Resource, ResourceSet};

/// Field manager recorded on every applied object.
pub const FIELD_MANAGER: &str = "tributary";

/// Applies resource sets with server-side apply.
pub struct KubernetesApplier {
    client: Client,
    field_manager: String,
}

impl KubernetesApplier {
    pub async fn new() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| tributary_core::Error::Internal(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn api_for(&self, resource: &Resource, object: &DynamicObject) -> Result<Api<DynamicObject>> {
        let types = object.types.as_ref().ok_or_else(|| {
            tributary_core::Error::Internal(format!(
                "{} {} has no type information",
                resource.kind(),
                resource.name()
            ))
        })?;
        let (group, version) = group_version(&types.api_version);
        let api_resource =
            ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &types.kind));

        Ok(match resource.metadata().namespace.as_deref() {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &api_resource),
            None => Api::all_with(self.client.clone(), &api_resource),
        })
    }

    async fn apply_one(&self, resource: &Resource) -> Result<()> {
        let object: DynamicObject = serde_json::from_value(serde_json::to_value(resource)?)?;
        let api = self.api_for(resource, &object)?;
        let params = PatchParams::apply(&self.field_manager).force();

        api.patch(resource.name(), &params, &Patch::Apply(&object))
            .await
            .map_err(|e| {
                tributary_core::Error::ApplyFailed(format!(
                    "{} {}: {}",
                    resource.kind(),
                    resource.name(),
                    e
                ))
            })?;
        Ok(())
    }
}

/// Splits an `apiVersion` into group and version. The core group is empty.
fn group_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

#[async_trait]
impl ResourceApplier for KubernetesApplier {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn apply(&self, resources: &ResourceSet) -> Result<ApplyReport> {
        let mut applied = Vec::with_capacity(resources.len());
        for resource in resources {
            debug!(kind = %resource.kind(), name = %resource.name(), "applying resource");
            self.apply_one(resource).await?;
            applied.push(AppliedResource {
                kind: resource.kind().to_string(),
                name: resource.name().to_string(),
            });
        }

        info!(
            cluster = %resources.cluster(),
            component = %resources.component(),
            count = applied.len(),
            "resource set applied"
        );
        Ok(ApplyReport {
            applied,
            finished_at: Utc::now(),
        })
    }
}
