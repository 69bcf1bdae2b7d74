use serde::Serialize;

/// CNI version reported in error replies.
pub const CNI_VERSION: &str = "0.1.0";

/// Errors surfaced by the plugin, one variant per externally visible
/// failure kind. Each maps to a fixed numeric code in the error reply.
#[derive(Debug, thiserror::Error)]
pub enum CniError {
    /// Required invocation input missing or malformed.
    #[error("invalid invocation: {0}")]
    Configuration(String),

    /// Failed to prepare the shared namespace-handle directory.
    #[error("failed to prepare netns directory: {0}")]
    Directory(String),

    /// The pod annotation never became available within the polling bound.
    #[error("timed out waiting for network annotation on pod {namespace}/{pod}")]
    Timeout { namespace: String, pod: String },

    /// Annotation present but missing or carrying invalid subfields.
    #[error("malformed network annotation: {0}")]
    Validation(String),

    /// A veth/namespace/address/route configuration step failed. The
    /// outside veth end has already been deleted when this surfaces.
    #[error("failed to configure container interface: {0}")]
    Provisioning(String),

    /// Switch port registration failed after successful provisioning.
    #[error("failed to bind port to switch: {0}")]
    Binding(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CniError {
    /// Numeric code carried in the JSON error reply.
    pub fn code(&self) -> u32 {
        match self {
            CniError::Configuration(_) => 100,
            CniError::Directory(_) => 101,
            CniError::Timeout { .. } => 102,
            CniError::Validation(_) => 103,
            CniError::Provisioning(_) => 104,
            CniError::Binding(_) => 105,
            CniError::Other(_) => 199,
        }
    }

    /// Normalize into the single structured reply written to stdout.
    pub fn reply(&self) -> ErrorReply {
        let details = match self {
            CniError::Other(err) => err.source().map(|cause| format!("{cause}")),
            _ => None,
        };
        ErrorReply {
            cni_version: CNI_VERSION.to_string(),
            code: self.code(),
            message: self.to_string(),
            details,
        }
    }
}

/// Error reply format required by the CNI caller.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReply {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
