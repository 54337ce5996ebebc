//! Build descriptor compilation: validation and backend dispatch.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use tributary_core::spec::{BuildOutputSpec, BuildSpec, Plugin};
use tributary_core::{Error, Result};

use crate::descriptor::{
    BuildBackend, BuildDescriptor, BuildOutput, BuilderStep, NativeOutputKind, NativePipeline,
    DOCKERFILE_MOUNT_PATH, NATIVE_HISTORY_LIMIT, NATIVE_RUN_POLICY,
};
use crate::dockerfile::Dockerfile;

/// Options the generic builder accepts from users.
pub const DEFAULT_ALLOWED_OPTIONS: &[&str] = &[
    "--customPlatform",
    "--custom-platform",
    "--insecure",
    "--insecure-pull",
    "--insecure-registry",
    "--log-format",
    "--log-timestamp",
    "--registry-mirror",
    "--reproducible",
    "--single-snapshot",
    "--skip-tls-verify",
    "--skip-tls-verify-pull",
    "--skip-tls-verify-registry",
    "--verbosity",
    "--snapshotMode",
    "--use-new-run",
    "--registry-certificate",
    "--registry-client-cert",
];

/// Facts about where the build runs, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    /// Image the plugins are layered on.
    pub base_image: String,
    /// Image of the generic builder.
    pub builder_image: String,
    pub native_supported: bool,
    pub pull_secret: Option<String>,
}

/// Compiles build specifications against an option allow-list.
#[derive(Debug, Clone)]
pub struct BuildCompiler {
    allowed_options: BTreeSet<String>,
}

impl Default for BuildCompiler {
    fn default() -> Self {
        Self::with_allowed_options(DEFAULT_ALLOWED_OPTIONS.iter().copied())
    }
}

impl BuildCompiler {
    pub fn with_allowed_options<'a>(options: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            allowed_options: options.into_iter().map(String::from).collect(),
        }
    }

    /// Validate `spec` without dispatching.
    ///
    /// Checks run in order and the first failing rule is reported. Disallowed
    /// options are all collected before failing.
    pub fn validate<'s>(&self, spec: &'s BuildSpec) -> Result<&'s [Plugin]> {
        let plugins = match spec.plugins.as_deref() {
            Some(plugins) if !plugins.is_empty() => plugins,
            _ => {
                return Err(Error::validation(
                    "spec.build.plugins",
                    "a non-empty list of plugins is required",
                ));
            }
        };

        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for plugin in plugins {
            *seen.entry(plugin.name.as_str()).or_default() += 1;
        }
        let duplicates: Vec<&str> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name)
            .collect();
        if !duplicates.is_empty() {
            return Err(Error::validation(
                "spec.build.plugins",
                format!(
                    "plugin names have to be unique, duplicated names: {}",
                    duplicates.join(", ")
                ),
            ));
        }

        for (index, plugin) in plugins.iter().enumerate() {
            if plugin.artifacts.as_ref().is_none_or(|a| a.is_empty()) {
                return Err(Error::validation(
                    format!("spec.build.plugins[{}].artifacts", index),
                    format!("plugin {} needs a non-empty list of artifacts", plugin.name),
                ));
            }
        }

        if let BuildOutputSpec::RegistryPush {
            additional_options, ..
        } = &spec.output
        {
            self.validate_options(additional_options)?;
        }

        Ok(plugins)
    }

    fn validate_options(&self, options: &[String]) -> Result<()> {
        let forbidden: Vec<&str> = options
            .iter()
            .map(|option| option.split_once('=').map_or(option.as_str(), |(key, _)| key))
            .filter(|key| !self.allowed_options.contains(*key))
            .collect();

        if forbidden.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(
                "spec.build.output.additionalOptions",
                format!("contains forbidden options: [{}]", forbidden.join(", ")),
            ))
        }
    }

    /// Validate `spec` and compile it into a descriptor for one backend.
    pub fn compile(&self, spec: &BuildSpec, env: &BuildEnvironment) -> Result<BuildDescriptor> {
        let plugins = self.validate(spec)?.to_vec();

        let (output, options) = match &spec.output {
            BuildOutputSpec::RegistryPush {
                image,
                push_secret,
                additional_options,
            } => (
                BuildOutput::RegistryPush {
                    image: image.clone(),
                    push_secret: push_secret.clone(),
                },
                additional_options.clone(),
            ),
            BuildOutputSpec::ImageStream { image } => (
                BuildOutput::ImageStream {
                    image: image.clone(),
                },
                Vec::new(),
            ),
        };

        let dockerfile = Dockerfile::render(&env.base_image, &plugins);
        let revision = dockerfile.revision();

        let backend = if env.native_supported {
            let (output_kind, push_secret) = match &output {
                BuildOutput::RegistryPush { push_secret, .. } => {
                    (NativeOutputKind::DockerImage, push_secret.clone())
                }
                BuildOutput::ImageStream { .. } => (NativeOutputKind::ImageStreamTag, None),
            };
            if !options.is_empty() {
                debug!("additional builder options are not used by native build pipelines");
            }
            BuildBackend::Native(NativePipeline {
                output_kind,
                output_name: output.image().to_string(),
                push_secret,
                pull_secret: env.pull_secret.clone(),
                run_policy: NATIVE_RUN_POLICY,
                successful_builds_history_limit: NATIVE_HISTORY_LIMIT,
                failed_builds_history_limit: NATIVE_HISTORY_LIMIT,
            })
        } else {
            match &output {
                BuildOutput::RegistryPush { image, push_secret } => {
                    let mut args = vec![
                        format!("--dockerfile={}/Dockerfile", DOCKERFILE_MOUNT_PATH),
                        "--image-name-with-digest-file=/dev/termination-log".to_string(),
                        format!("--destination={}", image),
                    ];
                    args.extend(options.iter().cloned());
                    BuildBackend::Generic(BuilderStep {
                        image: env.builder_image.clone(),
                        args,
                        push_secret: push_secret.clone(),
                    })
                }
                BuildOutput::ImageStream { .. } => {
                    return Err(Error::UnsupportedOutput(
                        "image-stream output requires native build pipelines, which the target platform does not offer"
                            .to_string(),
                    ));
                }
            }
        };

        info!(
            revision = %revision,
            plugins = plugins.len(),
            native = env.native_supported,
            "compiled build descriptor"
        );

        Ok(BuildDescriptor {
            plugins,
            output,
            options,
            dockerfile,
            revision,
            backend,
        })
    }
}

/// Compile `spec` with the default option allow-list.
pub fn compile(spec: &BuildSpec, env: &BuildEnvironment) -> Result<BuildDescriptor> {
    BuildCompiler::default().compile(spec, env)
}
