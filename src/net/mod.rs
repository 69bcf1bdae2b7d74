use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use nix::fcntl::{open, OFlag};
use nix::sched::{setns, CloneFlags};
use nix::sys::stat::Mode;
use nix::unistd::close;
use tracing::debug;

/// Network configuration backend: the link, namespace, address and route
/// operations provisioning is built from. Kept narrow so tests can swap in
/// an in-memory fake without kernel access.
pub trait NetConfig {
    /// Create the namespace-handle directory if absent. Idempotent.
    fn ensure_netns_dir(&self) -> Result<()>;
    fn create_veth(&self, outside: &str, inside: &str) -> Result<()>;
    fn link_up(&self, name: &str) -> Result<()>;
    /// Link the container's namespace id to a discoverable handle,
    /// skipped if one is already present. Idempotent.
    fn link_netns_handle(&self, pid: u32) -> Result<()>;
    fn move_link_to_netns(&self, name: &str, pid: u32) -> Result<()>;
    fn rename_link_in_netns(&self, pid: u32, from: &str, to: &str) -> Result<()>;
    fn link_up_in_netns(&self, pid: u32, name: &str) -> Result<()>;
    fn set_mtu_in_netns(&self, pid: u32, name: &str, mtu: u32) -> Result<()>;
    fn add_address_in_netns(&self, pid: u32, name: &str, cidr: &str) -> Result<()>;
    fn set_mac_in_netns(&self, pid: u32, name: &str, mac: &str) -> Result<()>;
    fn add_default_route_in_netns(&self, pid: u32, gateway: &str) -> Result<()>;
    fn delete_link(&self, name: &str) -> Result<()>;
    fn remove_netns_handle(&self, pid: u32) -> Result<()>;
}

/// Backend that drives the kernel through `ip(8)`, entering the container
/// namespace with setns for the container-side steps.
pub struct IpCommand {
    netns_dir: PathBuf,
}

impl IpCommand {
    pub fn new(netns_dir: PathBuf) -> Self {
        Self { netns_dir }
    }

    fn handle_path(&self, pid: u32) -> PathBuf {
        self.netns_dir.join(pid.to_string())
    }

    /// Execute a function inside the network namespace of `pid`, restoring
    /// the host namespace before returning.
    fn in_netns<T>(&self, pid: u32, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let host_ns = open(Path::new("/proc/self/ns/net"), OFlag::O_RDONLY, Mode::empty())
            .context("failed to open host network namespace")?;

        let target_path = format!("/proc/{pid}/ns/net");
        let target_ns = match open(Path::new(&target_path), OFlag::O_RDONLY, Mode::empty()) {
            Ok(fd) => fd,
            Err(err) => {
                let _ = close(host_ns);
                return Err(err).with_context(|| format!("failed to open {target_path}"));
            }
        };

        let result = setns(target_ns, CloneFlags::CLONE_NEWNET)
            .context("failed to enter container network namespace")
            .and_then(|_| {
                let inner = f();
                setns(host_ns, CloneFlags::CLONE_NEWNET)
                    .context("failed to restore host network namespace")?;
                inner
            });

        let _ = close(target_ns);
        let _ = close(host_ns);
        result
    }
}

/// Run `ip` with the given arguments, failing with captured stderr on a
/// non-zero exit.
fn ip(args: &[&str]) -> Result<()> {
    debug!(?args, "running ip");
    let output = Command::new("ip")
        .args(args)
        .output()
        .with_context(|| format!("failed to execute ip {}", args.join(" ")))?;

    if !output.status.success() {
        bail!(
            "ip {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

impl NetConfig for IpCommand {
    fn ensure_netns_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.netns_dir)
            .with_context(|| format!("failed to create {}", self.netns_dir.display()))
    }

    fn create_veth(&self, outside: &str, inside: &str) -> Result<()> {
        ip(&["link", "add", outside, "type", "veth", "peer", "name", inside])
    }

    fn link_up(&self, name: &str) -> Result<()> {
        ip(&["link", "set", "dev", name, "up"])
    }

    fn link_netns_handle(&self, pid: u32) -> Result<()> {
        let handle = self.handle_path(pid);
        if handle.symlink_metadata().is_ok() {
            debug!(handle = %handle.display(), "netns handle already present");
            return Ok(());
        }
        symlink(format!("/proc/{pid}/ns/net"), &handle)
            .with_context(|| format!("failed to link {}", handle.display()))
    }

    fn move_link_to_netns(&self, name: &str, pid: u32) -> Result<()> {
        ip(&["link", "set", "dev", name, "netns", &pid.to_string()])
    }

    fn rename_link_in_netns(&self, pid: u32, from: &str, to: &str) -> Result<()> {
        self.in_netns(pid, || ip(&["link", "set", "dev", from, "name", to]))
    }

    fn link_up_in_netns(&self, pid: u32, name: &str) -> Result<()> {
        self.in_netns(pid, || ip(&["link", "set", "dev", name, "up"]))
    }

    fn set_mtu_in_netns(&self, pid: u32, name: &str, mtu: u32) -> Result<()> {
        self.in_netns(pid, || {
            ip(&["link", "set", "dev", name, "mtu", &mtu.to_string()])
        })
    }

    fn add_address_in_netns(&self, pid: u32, name: &str, cidr: &str) -> Result<()> {
        self.in_netns(pid, || ip(&["addr", "add", cidr, "dev", name]))
    }

    fn set_mac_in_netns(&self, pid: u32, name: &str, mac: &str) -> Result<()> {
        self.in_netns(pid, || ip(&["link", "set", "dev", name, "address", mac]))
    }

    fn add_default_route_in_netns(&self, pid: u32, gateway: &str) -> Result<()> {
        self.in_netns(pid, || ip(&["route", "add", "default", "via", gateway]))
    }

    fn delete_link(&self, name: &str) -> Result<()> {
        ip(&["link", "delete", name])
    }

    fn remove_netns_handle(&self, pid: u32) -> Result<()> {
        let handle = self.handle_path(pid);
        fs::remove_file(&handle)
            .with_context(|| format!("failed to remove {}", handle.display()))
    }
}
