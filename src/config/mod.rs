use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default location of the plugin configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cni/net.d/ovn-cni.conf";

/// Plugin configuration. Every field has a default so a missing or partial
/// config file still yields a usable setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Kubernetes API server endpoint queried for pod annotations
    #[serde(default = "default_api_server")]
    pub api_server: String,
    /// Integration bridge the host-side veth ends attach to
    #[serde(default = "default_bridge")]
    pub bridge: String,
    /// Directory holding namespace handles
    #[serde(default = "default_netns_dir")]
    pub netns_dir: PathBuf,
}

fn default_api_server() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_bridge() -> String {
    "br-int".to_string()
}

fn default_netns_dir() -> PathBuf {
    PathBuf::from("/var/run/netns")
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            api_server: default_api_server(),
            bridge: default_bridge(),
            netns_dir: default_netns_dir(),
        }
    }
}

impl PluginConfig {
    /// Load the configuration from the default path.
    pub fn load() -> Self {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load the configuration from `path`, falling back to defaults when
    /// the file is absent or unreadable. A file that exists but does not
    /// parse is reported, then ignored; a broken config must not take the
    /// node's pod networking down with it.
    pub fn load_from(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), %err, "ignoring unparseable config file");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}
