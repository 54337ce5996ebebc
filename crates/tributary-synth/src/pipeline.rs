//! End-to-end rendering of one component: configuration, credentials, build
//! compilation and synthesis.

use tracing::{info, warn};
use tributary_build::{BuildCompiler, BuildDescriptor, BuildEnvironment};
use tributary_config::{resolve_component, ConfigurationWarning, OperatorConfig};
use tributary_core::context::ClusterContext;
use tributary_core::credential::{CredentialMaterial, SigningAuthority};
use tributary_core::resource::ResourceSet;
use tributary_core::spec::{BuildSpec, ComponentDetails, ComponentSpec};
use tributary_core::Result;
use tributary_credentials::secret::{API_ADMIN_PASSWORD_KEY, API_USER_PASSWORD_KEY};
use tributary_credentials::{service_subject, CertificateState, CredentialManager, PriorCredentials};

use crate::balancer::{api_secret_name, certificate_name};
use crate::synthesizer::{synthesize, SynthesisInput};

/// One render request.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub spec: &'a ComponentSpec,
    pub context: &'a ClusterContext,
    /// Material recovered from the previously applied secrets.
    pub prior: &'a PriorCredentials,
    pub maintenance_window_open: bool,
}

/// Result of a successful render.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub resources: ResourceSet,
    pub warnings: Vec<ConfigurationWarning>,
    /// State of the component's certificate, for components that have one.
    pub certificate: Option<CertificateState>,
}

/// Renders components against one operator configuration and signing authority.
pub struct Pipeline<'a> {
    operator: &'a OperatorConfig,
    authority: &'a dyn SigningAuthority,
    compiler: BuildCompiler,
}

impl<'a> Pipeline<'a> {
    pub fn new(operator: &'a OperatorConfig, authority: &'a dyn SigningAuthority) -> Self {
        Self {
            operator,
            authority,
            compiler: BuildCompiler::default(),
        }
    }

    pub fn with_compiler(mut self, compiler: BuildCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered> {
        let spec = request.spec;
        let configuration = resolve_component(spec)?;
        let warnings: Vec<ConfigurationWarning> = configuration.warnings().cloned().collect();
        for warning in &warnings {
            warn!(
                cluster = %spec.cluster,
                field = %warning.field,
                "{}", warning.message
            );
        }

        let (credentials, certificate) = self.credentials(request)?;

        let build = match &spec.component {
            ComponentDetails::Build(build) => Some(self.compile(request, build)?),
            _ => None,
        };

        let resources = synthesize(&SynthesisInput {
            spec,
            context: request.context,
            operator: self.operator,
            configuration: &configuration,
            credentials: &credentials,
            build: build.as_ref(),
        })?;

        info!(
            cluster = %spec.cluster,
            component = %spec.kind(),
            warnings = warnings.len(),
            "component rendered"
        );
        Ok(Rendered {
            resources,
            warnings,
            certificate,
        })
    }

    fn credentials(
        &self,
        request: &RenderRequest<'_>,
    ) -> Result<(Vec<CredentialMaterial>, Option<CertificateState>)> {
        let spec = request.spec;
        if !matches!(spec.component, ComponentDetails::Balancer(_)) {
            return Ok((Vec::new(), None));
        }

        let manager = CredentialManager::new(request.prior.clone());
        let mut credentials: Vec<CredentialMaterial> = manager
            .ensure_passwords(
                &api_secret_name(&spec.cluster),
                &[API_ADMIN_PASSWORD_KEY, API_USER_PASSWORD_KEY],
            )
            .into_values()
            .map(CredentialMaterial::Password)
            .collect();

        let subject = service_subject(
            &certificate_name(&spec.cluster),
            &request.context.namespace,
        );
        let outcome = manager.ensure_certificate(
            &subject,
            self.authority,
            request.maintenance_window_open,
        )?;
        credentials.push(CredentialMaterial::Certificate(outcome.material));
        Ok((credentials, Some(outcome.state)))
    }

    fn compile(&self, request: &RenderRequest<'_>, build: &BuildSpec) -> Result<BuildDescriptor> {
        let spec = request.spec;
        let version = spec
            .version
            .as_deref()
            .or(request.context.platform_version.as_deref());
        let environment = BuildEnvironment {
            base_image: self.operator.platform_image(spec.image.as_deref(), version)?,
            builder_image: self.operator.images.builder.clone(),
            native_supported: request.context.native_build_supported,
            pull_secret: spec.template.build_pull_secret.clone(),
        };
        self.compiler.compile(build, &environment)
    }
}
