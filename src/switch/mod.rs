use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::error::CniError;
use crate::types::SwitchPortBinding;

/// Switch control backend: the port-level operations the plugin needs from
/// the virtual switch. Swappable with an in-memory fake in tests.
pub trait SwitchControl {
    /// Register `port` on `bridge`, tagging its interface record with the
    /// given external ids.
    fn add_port(&self, bridge: &str, port: &str, external_ids: &[(String, String)])
        -> Result<()>;
    fn del_port(&self, port: &str) -> Result<()>;
    /// Read an attribute from the interface record backing `port`.
    fn get_attribute(&self, port: &str, attribute: &str) -> Result<String>;
}

/// Backend that drives Open vSwitch through `ovs-vsctl`.
pub struct OvsVsctl;

fn ovs_vsctl(args: &[String]) -> Result<String> {
    debug!(?args, "running ovs-vsctl");
    let output = Command::new("ovs-vsctl")
        .args(args)
        .output()
        .with_context(|| format!("failed to execute ovs-vsctl {}", args.join(" ")))?;

    if !output.status.success() {
        bail!(
            "ovs-vsctl {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl SwitchControl for OvsVsctl {
    fn add_port(
        &self,
        bridge: &str,
        port: &str,
        external_ids: &[(String, String)],
    ) -> Result<()> {
        let mut args = vec![
            "add-port".to_string(),
            bridge.to_string(),
            port.to_string(),
            "--".to_string(),
            "set".to_string(),
            "interface".to_string(),
            port.to_string(),
        ];
        for (key, value) in external_ids {
            args.push(format!("external_ids:{key}={value}"));
        }
        ovs_vsctl(&args).map(|_| ())
    }

    fn del_port(&self, port: &str) -> Result<()> {
        ovs_vsctl(&["del-port".to_string(), port.to_string()]).map(|_| ())
    }

    fn get_attribute(&self, port: &str, attribute: &str) -> Result<String> {
        ovs_vsctl(&[
            "get".to_string(),
            "interface".to_string(),
            port.to_string(),
            attribute.to_string(),
        ])
    }
}

/// Register the host-side veth end as a switch port carrying the pod
/// correlation metadata. A single registration call, no retry; failure
/// means the interface is plumbed but not attached to the fabric.
pub fn bind_port(
    switch: &dyn SwitchControl,
    bridge: &str,
    binding: &SwitchPortBinding,
) -> Result<(), CniError> {
    switch
        .add_port(bridge, &binding.port_name, &binding.external_ids())
        .map_err(|err| CniError::Binding(format!("{err:#}")))?;
    info!(
        port = %binding.port_name,
        iface_id = %binding.iface_id,
        "bound port to switch"
    );
    Ok(())
}
