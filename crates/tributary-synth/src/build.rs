//! Plugin build resources.
//!
//! The generic backend runs one builder pod that reads the Dockerfile from a
//! config map and pushes the result. The native backend hands the Dockerfile
//! to the platform's own build pipeline.

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, KeyToPath, Pod, SecretVolumeSource, Volume, VolumeMount,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tributary_build::descriptor::{DOCKERFILE_MOUNT_PATH, PUSH_SECRET_MOUNT_PATH};
use tributary_build::{BuildBackend, BuildDescriptor, BuilderStep, NativePipeline};
use tributary_core::resource::{NativeObject, Resource, ResourceSet};
use tributary_core::template::OverlayTarget;
use tributary_core::Result;

use crate::model::ComponentModel;
use crate::overlay::merge_env;
use crate::synthesizer::SynthesisInput;

pub const REVISION_ANNOTATION: &str = "tributary.io/build-revision";
pub const DOCKERFILE_KEY: &str = "Dockerfile";

const NATIVE_API_VERSION: &str = "build.openshift.io/v1";
const NATIVE_KIND: &str = "BuildConfig";

fn dockerfile_config_map_name(cluster: &str) -> String {
    format!("{}-dockerfile", cluster)
}

fn revision_annotations(descriptor: &BuildDescriptor) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(
        REVISION_ANNOTATION.to_string(),
        descriptor.revision.clone(),
    );
    annotations
}

fn builder_volumes(model: &ComponentModel<'_>, step: &BuilderStep) -> (Vec<Volume>, Vec<VolumeMount>) {
    let mut volumes = vec![Volume {
        name: "dockerfile".to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: dockerfile_config_map_name(model.cluster()),
            items: Some(vec![KeyToPath {
                key: DOCKERFILE_KEY.to_string(),
                path: DOCKERFILE_KEY.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }];
    let mut mounts = vec![VolumeMount {
        name: "dockerfile".to_string(),
        mount_path: DOCKERFILE_MOUNT_PATH.to_string(),
        ..Default::default()
    }];

    if let Some(secret) = &step.push_secret {
        volumes.push(Volume {
            name: "docker-credentials".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.clone()),
                items: Some(vec![KeyToPath {
                    key: ".dockerconfigjson".to_string(),
                    path: "config.json".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: "docker-credentials".to_string(),
            mount_path: PUSH_SECRET_MOUNT_PATH.to_string(),
            ..Default::default()
        });
    }

    (volumes, mounts)
}

/// The one-shot builder pod of the generic backend.
fn builder_pod(model: &ComponentModel<'_>, descriptor: &BuildDescriptor, step: &BuilderStep) -> Pod {
    let overlay = model.spec.template.for_target(OverlayTarget::BuildContainer);
    let (volumes, mounts) = builder_volumes(model, step);

    let container = Container {
        name: model.name.to_string(),
        image: Some(step.image.clone()),
        args: Some(step.args.clone()),
        env: Some(merge_env(
            Vec::new(),
            overlay,
            &model.operator.required_env(),
        )),
        resources: model.resources(),
        volume_mounts: Some(mounts),
        security_context: overlay.and_then(|o| o.security_context.clone()),
        ..Default::default()
    };

    let mut spec = model.pod_spec(
        vec![container],
        Vec::new(),
        volumes,
        model.spec.template.pod_settings.affinity.clone(),
    );
    spec.restart_policy = Some("Never".to_string());

    Pod {
        metadata: model.metadata_with(
            model.name.as_str(),
            Some(OverlayTarget::BuildPod),
            model.operator.pod_labels_for(model.kind()),
            revision_annotations(descriptor),
        ),
        spec: Some(spec),
        ..Default::default()
    }
}

/// The platform-native build pipeline descriptor.
fn native_pipeline(
    model: &ComponentModel<'_>,
    descriptor: &BuildDescriptor,
    pipeline: &NativePipeline,
) -> NativeObject {
    let mut output = Map::new();
    output.insert(
        "to".to_string(),
        json!({
            "kind": pipeline.output_kind.as_str(),
            "name": pipeline.output_name,
        }),
    );
    if let Some(secret) = &pipeline.push_secret {
        output.insert("pushSecret".to_string(), json!({ "name": secret }));
    }

    let mut docker_strategy = Map::new();
    if let Some(secret) = &pipeline.pull_secret {
        docker_strategy.insert("pullSecret".to_string(), json!({ "name": secret }));
    }

    let mut spec = json!({
        "output": Value::Object(output),
        "source": {
            "type": "Dockerfile",
            "dockerfile": descriptor.dockerfile.as_str(),
        },
        "strategy": {
            "type": "Docker",
            "dockerStrategy": Value::Object(docker_strategy),
        },
        "runPolicy": pipeline.run_policy,
        "successfulBuildsHistoryLimit": pipeline.successful_builds_history_limit,
        "failedBuildsHistoryLimit": pipeline.failed_builds_history_limit,
    });
    if let Some(resources) = model.resources() {
        spec["resources"] = json!(resources);
    }

    NativeObject {
        api_version: NATIVE_API_VERSION.to_string(),
        kind: NATIVE_KIND.to_string(),
        metadata: model.metadata_with(
            model.name.as_str(),
            Some(OverlayTarget::BuildConfig),
            BTreeMap::new(),
            revision_annotations(descriptor),
        ),
        spec,
    }
}

pub(crate) fn synthesize(
    input: &SynthesisInput<'_>,
    descriptor: &BuildDescriptor,
) -> Result<ResourceSet> {
    let spec = input.spec;
    let cluster = spec.cluster.as_str();
    let model = ComponentModel::new(
        spec,
        input.context,
        input.operator,
        "build",
        descriptor.output.image().to_string(),
    );

    let mut resources = ResourceSet::new(spec.kind(), cluster);
    resources.push(Resource::ServiceAccount(model.service_account()));

    match &descriptor.backend {
        BuildBackend::Generic(step) => {
            let mut data = BTreeMap::new();
            data.insert(
                DOCKERFILE_KEY.to_string(),
                descriptor.dockerfile.as_str().to_string(),
            );
            resources.push(Resource::ConfigMap(
                model.config_map(&dockerfile_config_map_name(cluster), data),
            ));
            resources.push(Resource::Pod(builder_pod(&model, descriptor, step)));
        }
        BuildBackend::Native(pipeline) => {
            resources.push(Resource::Native(native_pipeline(
                &model, descriptor, pipeline,
            )));
        }
    }

    Ok(resources)
}
