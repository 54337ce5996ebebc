//! Dockerfile derivation for plugin images.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tributary_core::spec::{Artifact, ArtifactKind, Plugin};

pub const PLUGINS_DIR: &str = "/opt/kafka/plugins";

const HEADER: &str = "\
##############################
##############################
# This file is generated by the Tributary operator.
# Any manual changes will be overwritten.
##############################
##############################
";

/// First 8 hex characters of the SHA-256 of `input`.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// A rendered Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dockerfile {
    text: String,
}

impl Dockerfile {
    /// Render the Dockerfile adding `plugins` on top of `base_image`.
    pub fn render(base_image: &str, plugins: &[Plugin]) -> Self {
        let mut text = String::from(HEADER);
        text.push('\n');
        text.push_str(&format!("FROM {}\n\n", base_image));
        text.push_str("USER root:root\n\n");

        for plugin in plugins {
            text.push_str("##########\n");
            text.push_str(&format!("# Plugin {}\n", plugin.name));
            text.push_str("##########\n");
            for artifact in plugin.artifacts.iter().flatten() {
                text.push_str(&artifact_step(&plugin.name, artifact));
                text.push('\n');
            }
        }

        text.push_str("USER 1001\n");
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Revision of this Dockerfile. Changes whenever its content changes.
    pub fn revision(&self) -> String {
        short_hash(&self.text)
    }
}

fn artifact_step(plugin: &str, artifact: &Artifact) -> String {
    let dir = format!("{}/{}/{}", PLUGINS_DIR, plugin, short_hash(&artifact.url));

    let mut commands = vec![format!("mkdir -p {}", dir)];
    match artifact.kind {
        ArtifactKind::Jar => {
            let file = format!("{}/{}.jar", dir, short_hash(&artifact.url));
            commands.push(download(&artifact.url, &file));
            commands.extend(verify(&file, artifact.sha512sum.as_deref()));
        }
        ArtifactKind::Tgz => {
            let archive = format!("{}.tgz", dir);
            commands.push(download(&artifact.url, &archive));
            commands.extend(verify(&archive, artifact.sha512sum.as_deref()));
            commands.push(format!("tar xvfz {} -C {}", archive, dir));
            commands.push(format!("rm -vf {}", archive));
        }
        ArtifactKind::Zip => {
            let archive = format!("{}.zip", dir);
            commands.push(download(&artifact.url, &archive));
            commands.extend(verify(&archive, artifact.sha512sum.as_deref()));
            commands.push(format!("unzip {} -d {}", archive, dir));
            commands.push(format!("find {} -type l | xargs rm -f", dir));
            commands.push(format!("rm -vf {}", archive));
        }
        ArtifactKind::Other => {
            let name = artifact
                .file_name
                .clone()
                .unwrap_or_else(|| short_hash(&artifact.url));
            let file = format!("{}/{}", dir, name);
            commands.push(download(&artifact.url, &file));
            commands.extend(verify(&file, artifact.sha512sum.as_deref()));
        }
    }

    format!("RUN {}\n", commands.join(" \\\n      && "))
}

fn download(url: &str, target: &str) -> String {
    format!("curl -f -L --create-dirs --output {} {}", target, url)
}

fn verify(file: &str, sha512sum: Option<&str>) -> Vec<String> {
    match sha512sum {
        Some(sum) => vec![
            format!("echo \"{} {}\" > {}.sha512", sum, file, file),
            format!("sha512sum --check {}.sha512", file),
            format!("rm -f {}.sha512", file),
        ],
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar(url: &str, sha: Option<&str>) -> Artifact {
        Artifact {
            kind: ArtifactKind::Jar,
            url: url.into(),
            sha512sum: sha.map(String::from),
            file_name: None,
        }
    }

    #[test]
    fn test_short_hash() {
        let hash = short_hash("https://example.com/a.jar");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, short_hash("https://example.com/a.jar"));
    }

    #[test]
    fn test_render_places_artifacts_per_plugin() {
        let url = "https://example.com/a.jar";
        let plugins = vec![Plugin {
            name: "p1".into(),
            artifacts: Some(vec![jar(url, Some("abc123"))]),
        }];
        let dockerfile = Dockerfile::render("registry/kafka:3.9.0", &plugins);
        let text = dockerfile.as_str();

        assert!(text.contains("FROM registry/kafka:3.9.0\n"));
        assert!(text.contains(&format!("/opt/kafka/plugins/p1/{}", short_hash(url))));
        assert!(text.contains("sha512sum --check"));
        assert!(text.trim_end().ends_with("USER 1001"));
    }

    #[test]
    fn test_other_artifact_uses_file_name() {
        let plugins = vec![Plugin {
            name: "p1".into(),
            artifacts: Some(vec![Artifact {
                kind: ArtifactKind::Other,
                url: "https://example.com/lib.so".into(),
                sha512sum: None,
                file_name: Some("lib.so".into()),
            }]),
        }];
        let text = Dockerfile::render("base", &plugins).as_str().to_string();
        assert!(text.contains("/lib.so https://example.com/lib.so"));
        assert!(!text.contains("sha512sum"));
    }

    #[test]
    fn test_revision_tracks_content() {
        let a = Dockerfile::render("base:1", &[]);
        let b = Dockerfile::render("base:2", &[]);
        assert_eq!(a.revision(), Dockerfile::render("base:1", &[]).revision());
        assert_ne!(a.revision(), b.revision());
    }
}
