//! The resource synthesizer.

use tracing::{debug, info};
use tributary_build::BuildDescriptor;
use tributary_config::{ComponentConfiguration, OperatorConfig};
use tributary_core::context::ClusterContext;
use tributary_core::credential::{CertificateMaterial, CredentialMaterial, PasswordMaterial};
use tributary_core::spec::{ComponentDetails, ComponentSpec};
use tributary_core::resource::ResourceSet;
use tributary_core::{Error, Result};

use crate::{balancer, bridge, build, mirror};

/// Everything one synthesis call reads. Nothing here is mutated.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub spec: &'a ComponentSpec,
    pub context: &'a ClusterContext,
    pub operator: &'a OperatorConfig,
    pub configuration: &'a ComponentConfiguration,
    pub credentials: &'a [CredentialMaterial],
    /// Set for the build component only.
    pub build: Option<&'a BuildDescriptor>,
}

impl<'a> SynthesisInput<'a> {
    pub fn password(&self, name: &str) -> Result<&'a PasswordMaterial> {
        self.credentials
            .iter()
            .filter_map(CredentialMaterial::as_password)
            .find(|p| p.name == name)
            .ok_or_else(|| Error::Internal(format!("password {} was not provided", name)))
    }

    pub fn certificate(&self, name: &str) -> Result<&'a CertificateMaterial> {
        self.credentials
            .iter()
            .filter_map(CredentialMaterial::as_certificate)
            .find(|c| c.name == name)
            .ok_or_else(|| Error::Internal(format!("certificate {} was not provided", name)))
    }

    /// Selected platform version, falling back to the cluster's.
    pub fn version(&self) -> Option<&'a str> {
        self.spec
            .version
            .as_deref()
            .or(self.context.platform_version.as_deref())
    }
}

/// Assemble the complete resource set of one component.
///
/// Pure and deterministic: identical inputs give byte-identical output. On
/// error no resources are returned.
pub fn synthesize(input: &SynthesisInput<'_>) -> Result<ResourceSet> {
    let spec = input.spec;
    debug!(cluster = %spec.cluster, component = %spec.kind(), "synthesizing resources");

    let resources = match &spec.component {
        ComponentDetails::Balancer(balancer) => balancer::synthesize(input, balancer)?,
        ComponentDetails::Bridge(bridge) => bridge::synthesize(input, bridge)?,
        ComponentDetails::Mirror(mirror) => mirror::synthesize(input, mirror)?,
        ComponentDetails::Build(_) => {
            let descriptor = input.build.ok_or_else(|| {
                Error::Internal("build component requires a compiled build descriptor".into())
            })?;
            build::synthesize(input, descriptor)?
        }
    };

    info!(
        cluster = %spec.cluster,
        component = %spec.kind(),
        resources = resources.len(),
        "resources synthesized"
    );
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use tributary_config::resolve_component;

    #[test]
    fn test_synthesis_is_deterministic() {
        let mut spec = fixtures::mirror();
        spec.metrics_enabled = true;
        spec.config.insert("a".into(), "1".into());
        let context = fixtures::context();
        let operator = OperatorConfig::default();
        let configuration = resolve_component(&spec).unwrap();
        let input = SynthesisInput {
            spec: &spec,
            context: &context,
            operator: &operator,
            configuration: &configuration,
            credentials: &[],
            build: None,
        };

        let first = synthesize(&input).unwrap().to_json().unwrap();
        let second = synthesize(&input).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_namespaced_resource_gets_the_namespace() {
        let spec = fixtures::balancer();
        let context = fixtures::context();
        let operator = OperatorConfig::default();
        let configuration = resolve_component(&spec).unwrap();
        let credentials = fixtures::balancer_credentials();
        let input = SynthesisInput {
            spec: &spec,
            context: &context,
            operator: &operator,
            configuration: &configuration,
            credentials: &credentials,
            build: None,
        };

        let resources = synthesize(&input).unwrap();
        for resource in &resources {
            assert_eq!(resource.metadata().namespace.as_deref(), Some("kafka"));
        }
    }

    #[test]
    fn test_build_without_descriptor_fails() {
        let spec = fixtures::build();
        let context = fixtures::context();
        let operator = OperatorConfig::default();
        let configuration = ComponentConfiguration::default();
        let input = SynthesisInput {
            spec: &spec,
            context: &context,
            operator: &operator,
            configuration: &configuration,
            credentials: &[],
            build: None,
        };

        assert!(matches!(synthesize(&input), Err(Error::Internal(_))));
    }
}
