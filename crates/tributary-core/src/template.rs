//! Operator-supplied template overlays.
//!
//! Overlays customise generated resources: extra labels and annotations,
//! extra container environment variables, security contexts and pod
//! scheduling. They can add to what the synthesizer produces but never take
//! anything away from it.

use k8s_openapi::api::core::v1::{Affinity, PodSecurityContext, SecurityContext, Toleration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource kinds an overlay can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverlayTarget {
    Deployment,
    Pod,
    ApiService,
    ServiceAccount,
    PodDisruptionBudget,
    ClusterRoleBinding,
    Container,
    InitContainer,
    BuildConfig,
    BuildContainer,
    BuildPod,
}

/// Customisation for one resource kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverlay {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Container targets only.
    #[serde(default)]
    pub env: Vec<EnvOverlay>,
    /// Container targets only.
    pub security_context: Option<SecurityContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOverlay {
    pub name: String,
    pub value: String,
}

/// Pod level scheduling and security settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSettings {
    pub affinity: Option<Affinity>,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
    pub security_context: Option<PodSecurityContext>,
    pub priority_class_name: Option<String>,
    pub termination_grace_period_seconds: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStrategyKind {
    RollingUpdate,
    Recreate,
}

/// All overlays supplied for one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOverlay {
    pub deployment: Option<ResourceOverlay>,
    pub pod: Option<ResourceOverlay>,
    pub api_service: Option<ResourceOverlay>,
    pub service_account: Option<ResourceOverlay>,
    pub pod_disruption_budget: Option<ResourceOverlay>,
    pub cluster_role_binding: Option<ResourceOverlay>,
    pub container: Option<ResourceOverlay>,
    pub init_container: Option<ResourceOverlay>,
    pub build_config: Option<ResourceOverlay>,
    pub build_container: Option<ResourceOverlay>,
    pub build_pod: Option<ResourceOverlay>,
    #[serde(default)]
    pub pod_settings: PodSettings,
    pub deployment_strategy: Option<DeploymentStrategyKind>,
    pub pdb_max_unavailable: Option<i32>,
    /// Pull secret for the native build pipeline's base image.
    pub build_pull_secret: Option<String>,
}

impl TemplateOverlay {
    pub fn for_target(&self, target: OverlayTarget) -> Option<&ResourceOverlay> {
        match target {
            OverlayTarget::Deployment => self.deployment.as_ref(),
            OverlayTarget::Pod => self.pod.as_ref(),
            OverlayTarget::ApiService => self.api_service.as_ref(),
            OverlayTarget::ServiceAccount => self.service_account.as_ref(),
            OverlayTarget::PodDisruptionBudget => self.pod_disruption_budget.as_ref(),
            OverlayTarget::ClusterRoleBinding => self.cluster_role_binding.as_ref(),
            OverlayTarget::Container => self.container.as_ref(),
            OverlayTarget::InitContainer => self.init_container.as_ref(),
            OverlayTarget::BuildConfig => self.build_config.as_ref(),
            OverlayTarget::BuildContainer => self.build_container.as_ref(),
            OverlayTarget::BuildPod => self.build_pod.as_ref(),
        }
    }
}
