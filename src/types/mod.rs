use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::CniError;

/// Kernel limit on interface name length.
pub const IFNAME_MAX: usize = 15;

/// Suffix marking the container-side end of a veth pair.
const INSIDE_SUFFIX: &str = "_c";

/// Pod annotation key carrying the network metadata.
pub const ANNOTATION_KEY: &str = "ovn";

/// CNI command arguments, validated once per invocation.
#[derive(Debug, Clone)]
pub struct CmdArgs {
    /// Infra container ID, source of the deterministic veth names
    pub container_id: String,
    /// Network namespace path (`/proc/<pid>/ns/net`)
    pub netns: String,
    /// PID extracted from the namespace path
    pub pid: u32,
    /// Container-side interface name requested by the caller
    pub ifname: String,
    /// Pod namespace
    pub pod_namespace: String,
    /// Pod name
    pub pod_name: String,
}

/// Network metadata published by the control plane on the pod object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAnnotation {
    /// Assigned address with prefix length
    pub ip_address: String,
    /// Assigned MAC address
    pub mac_address: String,
    /// Default gateway
    pub gateway_ip: String,
}

impl NetworkAnnotation {
    /// Decode and validate the raw annotation value. Anything missing or
    /// unparseable is a `Validation` error; it must propagate rather than
    /// let empty addressing reach provisioning.
    pub fn parse(raw: &str) -> Result<Self, CniError> {
        let annotation: NetworkAnnotation = serde_json::from_str(raw)
            .map_err(|err| CniError::Validation(format!("{err}")))?;
        IpNetwork::from_str(&annotation.ip_address).map_err(|err| {
            CniError::Validation(format!("bad ip_address {:?}: {err}", annotation.ip_address))
        })?;
        annotation.gateway_ip.parse::<IpAddr>().map_err(|err| {
            CniError::Validation(format!("bad gateway_ip {:?}: {err}", annotation.gateway_ip))
        })?;
        if !valid_mac(&annotation.mac_address) {
            return Err(CniError::Validation(format!(
                "bad mac_address {:?}",
                annotation.mac_address
            )));
        }
        Ok(annotation)
    }
}

fn valid_mac(mac: &str) -> bool {
    let groups: Vec<&str> = mac.split(':').collect();
    groups.len() == 6
        && groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// The two ends of a container's veth pair. Both names derive from the
/// container ID so DEL can find them again without any stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// Host-side end, later bound to the switch
    pub outside: String,
    /// Container-side end, renamed once moved into the namespace
    pub inside: String,
}

impl VethPair {
    pub fn for_container(container_id: &str) -> Self {
        let outside: String = container_id.chars().take(IFNAME_MAX).collect();
        let inside: String = container_id
            .chars()
            .take(IFNAME_MAX - INSIDE_SUFFIX.len())
            .chain(INSIDE_SUFFIX.chars())
            .collect();
        Self { outside, inside }
    }
}

/// Metadata attached to the switch port so the control plane can correlate
/// the port with the pod it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchPortBinding {
    pub port_name: String,
    pub iface_id: String,
    pub attached_mac: String,
    pub attached_ip: String,
}

impl SwitchPortBinding {
    pub fn new(
        port_name: &str,
        pod_namespace: &str,
        pod_name: &str,
        mac: &str,
        ip: &str,
    ) -> Self {
        Self {
            port_name: port_name.to_string(),
            iface_id: format!("{pod_namespace}_{pod_name}"),
            attached_mac: mac.to_string(),
            attached_ip: ip.to_string(),
        }
    }

    /// external_ids written on the switch interface record.
    pub fn external_ids(&self) -> Vec<(String, String)> {
        vec![
            ("attached_mac".to_string(), self.attached_mac.clone()),
            ("iface-id".to_string(), self.iface_id.clone()),
            ("ip_address".to_string(), self.attached_ip.clone()),
        ]
    }
}

/// Success reply for ADD. Field order matters: it is the order the
/// orchestrator-facing contract prints them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResult {
    pub ip_address: String,
    pub gateway_ip: String,
    pub mac_address: String,
}

impl AddResult {
    pub fn from_annotation(annotation: &NetworkAnnotation) -> Self {
        Self {
            ip_address: annotation.ip_address.clone(),
            gateway_ip: annotation.gateway_ip.clone(),
            mac_address: annotation.mac_address.clone(),
        }
    }

    /// Render the reply as the single JSON object written to stdout.
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Split a `;`-delimited CNI_ARGS string into key-value pairs.
pub fn parse_cni_args(args_str: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();

    if !args_str.is_empty() {
        for pair in args_str.split(';') {
            if let Some(idx) = pair.find('=') {
                let key = pair[..idx].to_string();
                let value = pair[idx + 1..].to_string();
                args.insert(key, value);
            }
        }
    }

    args
}
