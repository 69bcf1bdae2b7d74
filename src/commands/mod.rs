use std::collections::HashMap;
use std::env;

use anyhow::Context;
use tokio::runtime::Runtime;
use tracing::info;

use crate::annotation::{wait_for_annotation, KubeApiStore, PollPolicy};
use crate::config::PluginConfig;
use crate::error::CniError;
use crate::net::IpCommand;
use crate::plugin::OvnPlugin;
use crate::switch::OvsVsctl;
use crate::types::{parse_cni_args, CmdArgs};

/// Raw invocation context as handed to the plugin by the runtime.
#[derive(Debug, Clone)]
pub struct CniEnv {
    pub command: String,
    pub ifname: String,
    pub netns: String,
    pub args: HashMap<String, String>,
}

impl CniEnv {
    /// Read the invocation context from process environment variables.
    pub fn from_env() -> Result<Self, CniError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the invocation context from a variable lookup. Tests use this
    /// to avoid mutating process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CniError> {
        let require = |key: &str| {
            lookup(key).ok_or_else(|| CniError::Configuration(format!("{key} not set")))
        };
        Ok(Self {
            command: require("CNI_COMMAND")?,
            ifname: require("CNI_IFNAME")?,
            netns: require("CNI_NETNS")?,
            args: parse_cni_args(&lookup("CNI_ARGS").unwrap_or_default()),
        })
    }

    /// Validate the context into a full attachment request. Everything is
    /// checked here, before any state is touched.
    pub fn attachment_request(&self) -> Result<CmdArgs, CniError> {
        let require = |key: &str| {
            self.args
                .get(key)
                .cloned()
                .ok_or_else(|| CniError::Configuration(format!("{key} missing from CNI_ARGS")))
        };
        Ok(CmdArgs {
            container_id: require("K8S_POD_INFRA_CONTAINER_ID")?,
            pid: netns_pid(&self.netns)?,
            netns: self.netns.clone(),
            ifname: self.ifname.clone(),
            pod_namespace: require("K8S_POD_NAMESPACE")?,
            pod_name: require("K8S_POD_NAME")?,
        })
    }
}

/// Extract the container PID from a `/proc/<pid>/ns/net` namespace path.
pub fn netns_pid(netns: &str) -> Result<u32, CniError> {
    netns
        .strip_prefix("/proc/")
        .and_then(|rest| rest.strip_suffix("/ns/net"))
        .and_then(|pid| pid.parse::<u32>().ok())
        .ok_or_else(|| {
            CniError::Configuration(format!(
                "netns path {netns:?} does not match /proc/<pid>/ns/net"
            ))
        })
}

/// Execute the add command, returning the success payload for stdout.
pub fn cmd_add(env: &CniEnv, config: &PluginConfig) -> Result<String, CniError> {
    let args = env.attachment_request()?;
    info!(
        pod = %format!("{}/{}", args.pod_namespace, args.pod_name),
        container = %args.container_id,
        "adding pod network"
    );

    let store = KubeApiStore::new(config.api_server.clone());
    let runtime = Runtime::new()
        .context("failed to create tokio runtime")
        .map_err(CniError::Other)?;
    let annotation = runtime.block_on(wait_for_annotation(
        &store,
        &args.pod_namespace,
        &args.pod_name,
        PollPolicy::default(),
    ))?;

    let net = IpCommand::new(config.netns_dir.clone());
    let plugin = OvnPlugin::new(config, &args, &net, &OvsVsctl);
    let result = plugin.add_network(&annotation)?;
    result.to_json().map_err(CniError::Other)
}

/// Execute the delete command. No payload on success, and teardown never
/// fails once the request itself validates.
pub fn cmd_del(env: &CniEnv, config: &PluginConfig) -> Result<(), CniError> {
    let args = env.attachment_request()?;
    info!(
        pod = %format!("{}/{}", args.pod_namespace, args.pod_name),
        container = %args.container_id,
        "deleting pod network"
    );

    let net = IpCommand::new(config.netns_dir.clone());
    let plugin = OvnPlugin::new(config, &args, &net, &OvsVsctl);
    plugin.del_network();
    Ok(())
}

/// Main entry point for the CNI plugin: dispatch on CNI_COMMAND and return
/// the payload to print, if any.
pub fn run_cni() -> Result<Option<String>, CniError> {
    let env = CniEnv::from_env()?;
    let config = PluginConfig::load();

    match env.command.as_str() {
        "ADD" => cmd_add(&env, &config).map(Some),
        "DEL" => cmd_del(&env, &config).map(|_| None),
        other => Err(CniError::Configuration(format!(
            "unsupported CNI command: {other}"
        ))),
    }
}
