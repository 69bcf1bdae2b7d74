//! In-memory fake backends for deterministic tests without kernel, switch
//! or API server access.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{bail, Result};

use ovn_cni::annotation::AnnotationStore;
use ovn_cni::net::NetConfig;
use ovn_cni::switch::SwitchControl;

/// Fake network backend tracking which links and handles exist, recording
/// every operation in order, and optionally failing a single named op.
#[derive(Default)]
pub struct FakeNet {
    pub ops: RefCell<Vec<String>>,
    pub links: RefCell<HashSet<String>>,
    pub handles: RefCell<HashSet<u32>>,
    pub dir_creations: Cell<u32>,
    pub fail_on: Option<&'static str>,
}

impl FakeNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(op: &'static str) -> Self {
        Self {
            fail_on: Some(op),
            ..Self::default()
        }
    }

    fn record(&self, op: &str, detail: String) -> Result<()> {
        self.ops.borrow_mut().push(format!("{op} {detail}"));
        if self.fail_on == Some(op) {
            bail!("injected fault at {op}");
        }
        Ok(())
    }

    pub fn op_names(&self) -> Vec<String> {
        self.ops
            .borrow()
            .iter()
            .map(|op| op.split(' ').next().unwrap().to_string())
            .collect()
    }

    pub fn has_link(&self, name: &str) -> bool {
        self.links.borrow().contains(name)
    }
}

impl NetConfig for FakeNet {
    fn ensure_netns_dir(&self) -> Result<()> {
        self.record("ensure_netns_dir", String::new())?;
        self.dir_creations.set(self.dir_creations.get() + 1);
        Ok(())
    }

    fn create_veth(&self, outside: &str, inside: &str) -> Result<()> {
        self.record("create_veth", format!("{outside} {inside}"))?;
        self.links.borrow_mut().insert(outside.to_string());
        self.links.borrow_mut().insert(inside.to_string());
        Ok(())
    }

    fn link_up(&self, name: &str) -> Result<()> {
        self.record("link_up", name.to_string())
    }

    fn link_netns_handle(&self, pid: u32) -> Result<()> {
        self.record("link_netns_handle", pid.to_string())?;
        // create-if-absent: a second call is not an error
        self.handles.borrow_mut().insert(pid);
        Ok(())
    }

    fn move_link_to_netns(&self, name: &str, pid: u32) -> Result<()> {
        self.record("move_link_to_netns", format!("{name} {pid}"))
    }

    fn rename_link_in_netns(&self, pid: u32, from: &str, to: &str) -> Result<()> {
        self.record("rename_link_in_netns", format!("{pid} {from} {to}"))?;
        let mut links = self.links.borrow_mut();
        links.remove(from);
        links.insert(to.to_string());
        Ok(())
    }

    fn link_up_in_netns(&self, pid: u32, name: &str) -> Result<()> {
        self.record("link_up_in_netns", format!("{pid} {name}"))
    }

    fn set_mtu_in_netns(&self, pid: u32, name: &str, mtu: u32) -> Result<()> {
        self.record("set_mtu_in_netns", format!("{pid} {name} {mtu}"))
    }

    fn add_address_in_netns(&self, pid: u32, name: &str, cidr: &str) -> Result<()> {
        self.record("add_address_in_netns", format!("{pid} {name} {cidr}"))
    }

    fn set_mac_in_netns(&self, pid: u32, name: &str, mac: &str) -> Result<()> {
        self.record("set_mac_in_netns", format!("{pid} {name} {mac}"))
    }

    fn add_default_route_in_netns(&self, pid: u32, gateway: &str) -> Result<()> {
        self.record("add_default_route_in_netns", format!("{pid} {gateway}"))
    }

    fn delete_link(&self, name: &str) -> Result<()> {
        self.record("delete_link", name.to_string())?;
        self.links.borrow_mut().remove(name);
        Ok(())
    }

    fn remove_netns_handle(&self, pid: u32) -> Result<()> {
        self.record("remove_netns_handle", pid.to_string())?;
        if !self.handles.borrow_mut().remove(&pid) {
            bail!("no netns handle for pid {pid}");
        }
        Ok(())
    }
}

/// Fake switch tracking registered ports and their external ids.
#[derive(Default)]
pub struct FakeSwitch {
    pub ports: RefCell<HashMap<String, Vec<(String, String)>>>,
    pub deleted: RefCell<Vec<String>>,
    pub fail_add: bool,
}

impl FakeSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            fail_add: true,
            ..Self::default()
        }
    }
}

impl SwitchControl for FakeSwitch {
    fn add_port(
        &self,
        _bridge: &str,
        port: &str,
        external_ids: &[(String, String)],
    ) -> Result<()> {
        if self.fail_add {
            bail!("injected add-port fault");
        }
        self.ports
            .borrow_mut()
            .insert(port.to_string(), external_ids.to_vec());
        Ok(())
    }

    fn del_port(&self, port: &str) -> Result<()> {
        self.deleted.borrow_mut().push(port.to_string());
        if self.ports.borrow_mut().remove(port).is_none() {
            bail!("no port named {port}");
        }
        Ok(())
    }

    fn get_attribute(&self, port: &str, attribute: &str) -> Result<String> {
        let key = attribute
            .strip_prefix("external_ids:")
            .unwrap_or(attribute);
        let ports = self.ports.borrow();
        let Some(ids) = ports.get(port) else {
            bail!("no port named {port}");
        };
        ids.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| anyhow::anyhow!("no attribute {attribute} on {port}"))
    }
}

/// One scripted reply from the fake annotation store.
pub enum StoreReply {
    /// Pod not visible or carries no annotations
    Missing,
    /// Annotations present but without the network key
    NoKey,
    /// Transient query failure
    Error,
    /// The raw annotation value under the network key
    Annotation(String),
}

/// Fake annotation store replaying a scripted sequence of replies; once
/// the script runs out every further poll sees `Missing`.
#[derive(Default)]
pub struct FakeStore {
    pub script: RefCell<VecDeque<StoreReply>>,
    pub polls: Cell<u32>,
}

impl FakeStore {
    pub fn scripted(replies: impl IntoIterator<Item = StoreReply>) -> Self {
        Self {
            script: RefCell::new(replies.into_iter().collect()),
            polls: Cell::new(0),
        }
    }

    pub fn always_missing() -> Self {
        Self::default()
    }
}

impl AnnotationStore for FakeStore {
    fn pod_annotations(
        &self,
        _namespace: &str,
        _pod: &str,
    ) -> Result<Option<HashMap<String, String>>> {
        self.polls.set(self.polls.get() + 1);
        match self.script.borrow_mut().pop_front() {
            None | Some(StoreReply::Missing) => Ok(None),
            Some(StoreReply::NoKey) => Ok(Some(HashMap::from([(
                "unrelated".to_string(),
                "value".to_string(),
            )]))),
            Some(StoreReply::Error) => bail!("injected store fault"),
            Some(StoreReply::Annotation(raw)) => {
                Ok(Some(HashMap::from([("ovn".to_string(), raw)])))
            }
        }
    }
}
