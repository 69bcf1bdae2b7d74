use std::collections::HashMap;
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::error::CniError;
use crate::types::{NetworkAnnotation, ANNOTATION_KEY};

/// Annotation store collaborator: pod metadata keyed by namespace and name.
/// `Ok(None)` means the pod is not visible yet or carries no annotations.
pub trait AnnotationStore {
    fn pod_annotations(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<HashMap<String, String>>>;
}

/// Polling bounds for the annotation wait.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_millis(100),
        }
    }
}

/// Poll the store until the pod's network annotation is present, then
/// decode it. Transient store errors and a still-missing annotation are
/// retried; a malformed annotation propagates immediately as a
/// `Validation` error. Exhausting the polling bound yields `Timeout`.
pub async fn wait_for_annotation(
    store: &dyn AnnotationStore,
    namespace: &str,
    pod: &str,
    policy: PollPolicy,
) -> Result<NetworkAnnotation, CniError> {
    for attempt in 1..=policy.attempts {
        match store.pod_annotations(namespace, pod) {
            Ok(Some(annotations)) => {
                if let Some(raw) = annotations.get(ANNOTATION_KEY) {
                    debug!(%namespace, %pod, attempt, "network annotation present");
                    return NetworkAnnotation::parse(raw);
                }
                debug!(%namespace, %pod, attempt, "annotation key not published yet");
            }
            Ok(None) => {
                debug!(%namespace, %pod, attempt, "pod has no annotations yet");
            }
            Err(err) => {
                warn!(%namespace, %pod, attempt, %err, "annotation query failed, retrying");
            }
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(CniError::Timeout {
        namespace: namespace.to_string(),
        pod: pod.to_string(),
    })
}

/// Store backed by the Kubernetes API server, queried over HTTP through a
/// short-lived curl child so the plugin carries no long-lived client state.
pub struct KubeApiStore {
    api_server: String,
}

impl KubeApiStore {
    pub fn new(api_server: String) -> Self {
        Self { api_server }
    }
}

impl AnnotationStore for KubeApiStore {
    fn pod_annotations(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<HashMap<String, String>>> {
        let url = format!(
            "{}/api/v1/namespaces/{namespace}/pods/{pod}",
            self.api_server
        );
        let output = Command::new("curl")
            .args(["--silent", "--fail", "--max-time", "2", &url])
            .output()
            .context("failed to execute curl")?;

        if !output.status.success() {
            bail!(
                "GET {url} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let body: serde_json::Value =
            serde_json::from_slice(&output.stdout).context("pod object is not valid JSON")?;
        let Some(annotations) = body.pointer("/metadata/annotations") else {
            return Ok(None);
        };

        let map = annotations
            .as_object()
            .context("pod annotations are not an object")?
            .iter()
            .filter_map(|(key, value)| {
                value.as_str().map(|v| (key.clone(), v.to_string()))
            })
            .collect();
        Ok(Some(map))
    }
}
