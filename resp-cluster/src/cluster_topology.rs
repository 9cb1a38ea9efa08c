//! This module parses `CLUSTER SLOTS` replies and keeps the slot to node
//! mapping of a cluster.

use std::collections::BTreeMap;
use std::fmt;

use arcstr::ArcStr;

use crate::cluster_routing::SLOT_SIZE;
use crate::cmd::{cmd, Cmd};
use crate::errors::RedisResult;
use crate::types::Value;

/// A cluster node, identified by its `host:port`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClusterNode {
    host: String,
    port: u16,
    id: ArcStr,
}

impl ClusterNode {
    /// Creates a node from its host and port.
    pub fn new(host: impl Into<String>, port: u16) -> ClusterNode {
        let host = host.into();
        let id = arcstr::format!("{host}:{port}");
        ClusterNode { host, port, id }
    }

    /// Parses a `host:port` address as found in `MOVED` and `ASK` replies.
    /// IPv6 hosts may be wrapped in brackets.
    pub fn from_addr(addr: &str) -> Option<ClusterNode> {
        let (host, port) = split_node_address(addr)?;
        Some(ClusterNode::new(host, port))
    }

    /// The host name or IP address of the node.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port of the node.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `host:port` identifier of the node.
    pub fn id(&self) -> &ArcStr {
        &self.id
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.id)
    }
}

fn split_node_address(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

/// A contiguous range of slots served by one primary.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotRange {
    pub(crate) start: u16,
    pub(crate) end: u16,
    pub(crate) primary: ClusterNode,
    pub(crate) replicas: Vec<ClusterNode>,
}

impl SlotRange {
    /// First slot of the range.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// Last slot of the range, inclusive.
    pub fn end(&self) -> u16 {
        self.end
    }

    /// The node that owns the range.
    pub fn primary(&self) -> &ClusterNode {
        &self.primary
    }

    /// Replicas listed for the range.  They are never routed to.
    pub fn replicas(&self) -> &[ClusterNode] {
        &self.replicas
    }
}

pub(crate) fn slot_cmd() -> Cmd {
    let mut cmd = cmd("CLUSTER");
    cmd.arg("SLOTS");
    cmd
}

fn parse_node(value: &Value, answering: &ClusterNode) -> Option<ClusterNode> {
    let Value::Array(node) = value else {
        return None;
    };
    if node.len() < 2 {
        return None;
    }
    let port = match node[1] {
        Value::Int(port) => u16::try_from(port).ok()?,
        _ => return None,
    };
    let host = match &node[0] {
        Value::BulkString(host) => String::from_utf8_lossy(host).into_owned(),
        Value::SimpleString(host) => host.clone(),
        Value::Nil => String::new(),
        _ => return None,
    };
    match host.as_str() {
        // an empty host names the node that answered the query
        "" => Some(ClusterNode::new(answering.host(), port)),
        "?" => None,
        _ => Some(ClusterNode::new(host, port)),
    }
}

fn parse_slot_bound(value: &Value) -> Option<u16> {
    match *value {
        Value::Int(slot) => u16::try_from(slot).ok().filter(|slot| *slot < SLOT_SIZE),
        _ => None,
    }
}

/// Parses a `CLUSTER SLOTS` reply.  `answering` is the node the query was
/// sent to.  Entries that cannot be used are skipped.
pub(crate) fn parse_slots(
    raw_slot_resp: &Value,
    answering: &ClusterNode,
) -> RedisResult<Vec<SlotRange>> {
    let Value::Array(items) = raw_slot_resp else {
        invalid_type_error!(raw_slot_resp, "CLUSTER SLOTS reply is not an array");
    };

    let mut result = Vec::with_capacity(items.len());
    for item in items {
        let Value::Array(item) = item else {
            continue;
        };
        if item.len() < 3 {
            continue;
        }
        let (Some(start), Some(end)) = (parse_slot_bound(&item[0]), parse_slot_bound(&item[1]))
        else {
            continue;
        };
        if start > end {
            continue;
        }

        let mut nodes = item[2..].iter().filter_map(|node| parse_node(node, answering));
        let Some(primary) = nodes.next() else {
            continue;
        };
        result.push(SlotRange {
            start,
            end,
            primary,
            replicas: nodes.collect(),
        });
    }

    Ok(result)
}

/// Maps each of the 16384 slots to the node that serves it.
#[derive(Clone)]
pub struct SlotMap {
    slots: Vec<Option<ArcStr>>,
    nodes: BTreeMap<ArcStr, ClusterNode>,
}

impl Default for SlotMap {
    fn default() -> Self {
        SlotMap {
            slots: vec![None; SLOT_SIZE as usize],
            nodes: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for SlotMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SlotMap")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("covered_slots", &self.covered_slots())
            .finish()
    }
}

impl SlotMap {
    /// Builds a map from parsed ranges.  Later ranges win where ranges
    /// overlap.
    pub fn from_ranges(ranges: Vec<SlotRange>) -> SlotMap {
        let mut map = SlotMap::default();
        for range in ranges {
            let id = range.primary.id().clone();
            for slot in &mut map.slots[range.start as usize..=range.end as usize] {
                *slot = Some(id.clone());
            }
            map.nodes.insert(id, range.primary);
        }
        map
    }

    /// The node serving `slot`, if the slot is mapped.
    pub fn node_for_slot(&self, slot: u16) -> Option<&ClusterNode> {
        let id = self.slots.get(slot as usize)?.as_ref()?;
        self.nodes.get(id)
    }

    /// Points a single slot at `node`.  The previous owner is dropped from
    /// the map once it owns no slot.
    pub fn set_slot(&mut self, slot: u16, node: ClusterNode) {
        let Some(entry) = self.slots.get_mut(slot as usize) else {
            return;
        };
        let id = node.id().clone();
        let previous = entry.replace(id.clone());
        self.nodes.entry(id).or_insert(node);

        if let Some(previous) = previous {
            if !self.slots.iter().flatten().any(|owner| *owner == previous) {
                self.nodes.remove(&previous);
            }
        }
    }

    /// Returns `true` if no slot is mapped.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes that own a slot in this map.
    pub fn nodes(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.values()
    }

    pub(crate) fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of slots that have a node.
    pub fn covered_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
