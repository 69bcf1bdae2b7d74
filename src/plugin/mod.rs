use tracing::{info, warn};

use crate::config::PluginConfig;
use crate::error::CniError;
use crate::net::NetConfig;
use crate::switch::{self, SwitchControl};
use crate::types::{AddResult, CmdArgs, NetworkAnnotation, SwitchPortBinding, VethPair};

/// MTU for the container-side interface, leaving headroom for overlay
/// encapsulation.
pub const OVERLAY_MTU: u32 = 1400;

/// OVN overlay plugin implementation.
pub struct OvnPlugin<'a> {
    config: &'a PluginConfig,
    args: &'a CmdArgs,
    net: &'a dyn NetConfig,
    switch: &'a dyn SwitchControl,
}

/// Deletes the outside veth end on drop unless disarmed, so every failure
/// path out of provisioning cleans up the pair. Deletion is best-effort.
struct VethGuard<'a> {
    net: &'a dyn NetConfig,
    name: &'a str,
    armed: bool,
}

impl<'a> VethGuard<'a> {
    fn new(net: &'a dyn NetConfig, name: &'a str) -> Self {
        Self {
            net,
            name,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for VethGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.net.delete_link(self.name) {
                warn!(veth = %self.name, %err, "failed to delete veth during rollback");
            }
        }
    }
}

impl<'a> OvnPlugin<'a> {
    pub fn new(
        config: &'a PluginConfig,
        args: &'a CmdArgs,
        net: &'a dyn NetConfig,
        switch: &'a dyn SwitchControl,
    ) -> Self {
        Self {
            config,
            args,
            net,
            switch,
        }
    }

    /// Wire the container into the overlay: provision the veth pair, then
    /// register the host-side end with the switch.
    pub fn add_network(&self, annotation: &NetworkAnnotation) -> Result<AddResult, CniError> {
        let veth = VethPair::for_container(&self.args.container_id);
        let outside = self.provision(&veth, annotation)?;

        let binding = SwitchPortBinding::new(
            &outside,
            &self.args.pod_namespace,
            &self.args.pod_name,
            &annotation.mac_address,
            &annotation.ip_address,
        );
        switch::bind_port(self.switch, &self.config.bridge, &binding)?;

        info!(
            container = %self.args.container_id,
            ifname = %self.args.ifname,
            ip = %annotation.ip_address,
            "container attached to overlay"
        );
        Ok(AddResult::from_annotation(annotation))
    }

    /// Build and configure the veth pair, returning the host-side name.
    /// Any failure after veth creation deletes the outside end before the
    /// error surfaces.
    fn provision(
        &self,
        veth: &VethPair,
        annotation: &NetworkAnnotation,
    ) -> Result<String, CniError> {
        let pid = self.args.pid;
        let ifname = &self.args.ifname;

        self.net
            .ensure_netns_dir()
            .map_err(|err| CniError::Directory(format!("{err:#}")))?;

        self.net
            .create_veth(&veth.outside, &veth.inside)
            .map_err(provisioning)?;
        let guard = VethGuard::new(self.net, &veth.outside);

        self.net.link_up(&veth.outside).map_err(provisioning)?;
        self.net.link_netns_handle(pid).map_err(provisioning)?;
        self.net
            .move_link_to_netns(&veth.inside, pid)
            .map_err(provisioning)?;
        self.net
            .rename_link_in_netns(pid, &veth.inside, ifname)
            .map_err(provisioning)?;
        self.net
            .link_up_in_netns(pid, ifname)
            .map_err(provisioning)?;
        self.net
            .set_mtu_in_netns(pid, ifname, OVERLAY_MTU)
            .map_err(provisioning)?;
        self.net
            .add_address_in_netns(pid, ifname, &annotation.ip_address)
            .map_err(provisioning)?;
        self.net
            .set_mac_in_netns(pid, ifname, &annotation.mac_address)
            .map_err(provisioning)?;
        self.net
            .add_default_route_in_netns(pid, &annotation.gateway_ip)
            .map_err(provisioning)?;

        guard.disarm();
        Ok(veth.outside.clone())
    }

    /// Best-effort teardown: drop the switch port and the namespace
    /// handle. The container may already be gone, so each sub-step's
    /// failure is logged and swallowed; DEL never fails.
    pub fn del_network(&self) {
        let veth = VethPair::for_container(&self.args.container_id);

        if let Err(err) = self.switch.del_port(&veth.outside) {
            warn!(port = %veth.outside, %err, "failed to delete switch port");
        }
        if let Err(err) = self.net.remove_netns_handle(self.args.pid) {
            warn!(pid = self.args.pid, %err, "failed to remove netns handle");
        }

        info!(container = %self.args.container_id, "container detached from overlay");
    }
}

fn provisioning(err: anyhow::Error) -> CniError {
    CniError::Provisioning(format!("{err:#}"))
}
