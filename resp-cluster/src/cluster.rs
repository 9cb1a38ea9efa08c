//! Redis cluster support.
//!
//! This module extends the library to be able to use cluster.
//! [`ClusterConnection`] routes every call to the node that owns the slot of
//! its key and follows `MOVED` and `ASK` redirects.  It implements
//! [`ConnectionLike`], so commands and pipelines run against it the same way
//! they run against a single node.
//!
//! # Example
//! ```rust,no_run
//! use resp_cluster::{cmd, ClusterClient};
//!
//! let nodes = vec!["redis://127.0.0.1:6379/", "redis://127.0.0.1:6378/", "redis://127.0.0.1:6377/"];
//! let client = ClusterClient::new(nodes).unwrap();
//! let mut connection = client.get_connection().unwrap();
//!
//! cmd("SET").arg("test").arg("test_data").exec(&mut connection).unwrap();
//! let rv: String = cmd("GET").arg("test").query(&mut connection).unwrap();
//!
//! assert_eq!(rv, "test_data");
//! ```
//!
//! # Pipelining
//! ```rust,no_run
//! use resp_cluster::{pipe, ClusterClient};
//!
//! let nodes = vec!["redis://127.0.0.1:6379/", "redis://127.0.0.1:6378/", "redis://127.0.0.1:6377/"];
//! let client = ClusterClient::new(nodes).unwrap();
//! let mut connection = client.get_connection().unwrap();
//!
//! let key = "test";
//!
//! let results = pipe()
//!     .cmd("RPUSH").arg(key).arg("123")
//!     .cmd("LTRIM").arg(key).arg(-10).arg(-1)
//!     .cmd("EXPIRE").arg(key).arg(60)
//!     .execute(&mut connection);
//! assert!(results.iter().all(|r| r.is_ok()));
//! ```
use std::collections::hash_map::{Entry, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use arcstr::ArcStr;
use log::{debug, info, trace, warn};

use crate::cluster_client::ClusterParams;
use crate::cluster_routing::{get_slot, group_by_slot, Redirect, Routable, SLOT_SIZE};
use crate::cluster_topology::{parse_slots, slot_cmd, ClusterNode, SlotMap};
use crate::cmd::{cmd, Cmd};
use crate::connection::{
    connect_with_timeouts, Connection, ConnectionLike, IntoConnectionInfo, SocketTimeouts,
};
use crate::errors::{ErrorKind, RedisError, RedisResult};
use crate::parser::parse_redis_value;
use crate::types::{from_owned_redis_value, FromRedisValue, ToRedisArgs, Value};

pub use crate::cluster_client::{ClusterClient, ClusterClientBuilder};

const ASKING: &[u8] = b"*1\r\n$6\r\nASKING\r\n";

/// Implements the process of connecting to a cluster node.
pub trait Connect: Sized {
    /// Connect to a node, returning handle for command execution.
    ///
    /// The read and write timeouts must already apply to the login
    /// handshake.
    fn connect<T>(info: T, timeouts: SocketTimeouts) -> RedisResult<Self>
    where
        T: IntoConnectionInfo;
}

impl Connect for Connection {
    fn connect<T>(info: T, timeouts: SocketTimeouts) -> RedisResult<Self>
    where
        T: IntoConnectionInfo,
    {
        connect_with_timeouts(&info.into_connection_info()?, timeouts)
    }
}

fn connect_node<C: Connect>(params: &ClusterParams, node: &ClusterNode) -> RedisResult<C> {
    let info = params.connection_info(node);
    let conn = C::connect(info, params.socket_timeouts())?;
    debug!("connected to cluster node {node}");
    Ok(conn)
}

struct ClusterState<C> {
    // the initial node that answered; unmapped slots and keyless calls go here
    seed: ClusterNode,
    connections: HashMap<ArcStr, C>,
    slots: SlotMap,
    last_refresh: Instant,
    closed: bool,
}

impl<C> ClusterState<C>
where
    C: ConnectionLike + Connect,
{
    fn node_for_slot(&self, slot: u16) -> ClusterNode {
        self.slots
            .node_for_slot(slot)
            .cloned()
            .unwrap_or_else(|| self.seed.clone())
    }

    fn get_or_connect(
        &mut self,
        node: &ClusterNode,
        params: &ClusterParams,
    ) -> RedisResult<&mut C> {
        if let Some(conn) = self.connections.get(node.id()) {
            if !conn.is_open() {
                debug!("replacing closed connection to {node}");
                self.connections.remove(node.id());
            }
        }
        let conn = match self.connections.entry(node.id().clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(connect_node(params, node)?),
        };
        Ok(conn)
    }

    /// Sends one packed command to `node` and reads its reply.  A connection
    /// that failed at the transport or protocol level is dropped from the
    /// registry so the next call reconnects.
    fn send(
        &mut self,
        node: &ClusterNode,
        packed: &[u8],
        params: &ClusterParams,
    ) -> RedisResult<Value> {
        let conn = self.get_or_connect(node, params)?;
        trace!("sending {} bytes to {node}", packed.len());
        match conn.req_packed_command(packed) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_unrecoverable_error() {
                    debug!("dropping connection to {node}: {err}");
                    self.connections.remove(node.id());
                }
                Err(err)
            }
        }
    }

    fn load_topology(&mut self, params: &ClusterParams) -> RedisResult<()> {
        let seed = self.seed.clone();
        let reply = self
            .send(&seed, &slot_cmd().get_packed_command(), params)?
            .extract_error()?;
        let ranges = parse_slots(&reply, &seed)?;
        if ranges.is_empty() {
            return Err(RedisError::from((
                ErrorKind::ClientError,
                "Slot refresh error.",
                format!("{seed} returned no usable slot ranges"),
            )));
        }

        let slots = SlotMap::from_ranges(ranges);
        let covered = slots.covered_slots();
        if covered < SLOT_SIZE as usize {
            warn!("cluster topology from {seed} covers only {covered} of {SLOT_SIZE} slots");
        }
        self.connections
            .retain(|id, _| id == seed.id() || slots.contains_node(id));
        info!(
            "loaded cluster topology from {seed}: {} nodes, {covered} slots",
            slots.nodes().count()
        );
        self.slots = slots;
        self.last_refresh = Instant::now();
        Ok(())
    }

    fn refresh_if_due(&mut self, params: &ClusterParams) {
        let Some(interval) = params.topology_refresh_interval else {
            return;
        };
        if self.last_refresh.elapsed() < interval {
            return;
        }
        if let Err(err) = self.load_topology(params) {
            warn!("periodic topology refresh failed, keeping the current slot map: {err}");
            // wait a full interval before the next attempt
            self.last_refresh = Instant::now();
        }
    }

    /// Connects to the target of a `MOVED` and points the slot at it.  A
    /// failed connect leaves the slot map untouched.
    fn apply_moved(
        &mut self,
        slot: u16,
        node: ClusterNode,
        params: &ClusterParams,
    ) -> RedisResult<ClusterNode> {
        self.get_or_connect(&node, params)?;
        self.slots.set_slot(slot, node.clone());
        Ok(node)
    }

    fn ask(
        &mut self,
        node: &ClusterNode,
        packed: &[u8],
        params: &ClusterParams,
    ) -> RedisResult<Value> {
        let asking = self.send(node, ASKING, params)?;
        if let Value::ServerError(_) = asking {
            return Ok(asking);
        }
        self.send(node, packed, params)
    }
}

/// This is a connection of Redis cluster.
///
/// The slot map and the node connections live behind one mutex, so a
/// `ClusterConnection` can be shared between threads through an `Arc`.
/// Calls are serialized.
pub struct ClusterConnection<C = Connection> {
    state: Mutex<ClusterState<C>>,
    params: ClusterParams,
}

impl<C> ClusterConnection<C>
where
    C: ConnectionLike + Connect,
{
    pub(crate) fn new(
        params: ClusterParams,
        initial_nodes: Vec<ClusterNode>,
    ) -> RedisResult<ClusterConnection<C>> {
        let mut connections = HashMap::with_capacity(1);
        let mut seed = None;
        let mut last_err = None;

        for node in initial_nodes {
            match connect_node::<C>(&params, &node) {
                Ok(mut conn) => {
                    if conn.check_connection() {
                        connections.insert(node.id().clone(), conn);
                        seed = Some(node);
                        break;
                    }
                    debug!("startup node {node} did not answer PING");
                }
                Err(err) => {
                    debug!("failed to connect to startup node {node}: {err}");
                    last_err = Some(err);
                }
            }
        }

        let Some(seed) = seed else {
            return Err(last_err.unwrap_or_else(|| {
                RedisError::from((ErrorKind::IoError, "It failed to check startup nodes."))
            }));
        };

        let mut state = ClusterState {
            seed,
            connections,
            slots: SlotMap::default(),
            last_refresh: Instant::now(),
            closed: false,
        };
        if let Err(err) = state.load_topology(&params) {
            warn!(
                "could not load the cluster topology from {}, routing every call to it: {err}",
                state.seed
            );
        }

        Ok(ClusterConnection {
            state: Mutex::new(state),
            params,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_open(&self) -> RedisResult<MutexGuard<'_, ClusterState<C>>> {
        let state = self.lock();
        if state.closed {
            return Err(RedisError::from((
                ErrorKind::ClientError,
                "Cluster connection is closed.",
            )));
        }
        Ok(state)
    }

    /// Runs a packed command on the node that owns `routing_key`, following
    /// redirects.  The reply is returned as is, error replies included.
    fn request(&self, packed: &[u8], routing_key: Option<&[u8]>) -> RedisResult<Value> {
        let mut state = self.lock_open()?;
        state.refresh_if_due(&self.params);

        let max_redirects = self.params.max_redirects;
        let mut node = match routing_key {
            Some(key) => state.node_for_slot(get_slot(key)),
            None => state.seed.clone(),
        };

        for attempt in 1..=max_redirects {
            let reply = state.send(&node, packed, &self.params)?;
            let Some(redirect) = Redirect::from_reply(&reply) else {
                return Ok(reply);
            };
            match redirect {
                Redirect::Moved { slot, addr } => {
                    let Some(target) = ClusterNode::from_addr(&addr) else {
                        return Ok(reply);
                    };
                    debug!("MOVED slot {slot} from {node} to {target} (attempt {attempt})");
                    if attempt == max_redirects {
                        break;
                    }
                    node = state.apply_moved(slot, target, &self.params)?;
                }
                Redirect::Ask { slot, addr } => {
                    let Some(target) = ClusterNode::from_addr(&addr) else {
                        return Ok(reply);
                    };
                    debug!("ASK slot {slot} from {node} to {target}");
                    return state.ask(&target, packed, &self.params);
                }
            }
        }

        Err(RedisError::from((
            ErrorKind::ClusterRedirectExhausted,
            "Too many redirects",
            format!("gave up after {max_redirects} attempts"),
        )))
    }

    /// Runs `cmd` on the node that owns `routing_key`, or the second
    /// argument of `cmd` if no key is given.  Keyless commands go to the
    /// seed node.
    ///
    /// `MOVED` replies update the slot map and resend the command, up to the
    /// configured redirect limit.  `ASK` replies send `ASKING` and then the
    /// command once to the named node without updating the map.  An error
    /// reply is returned as `Err`; errors inside an array reply stay
    /// elements of the array.
    pub fn execute(&self, cmd: &Cmd, routing_key: Option<&[u8]>) -> RedisResult<Value> {
        let routing_key = routing_key.or_else(|| cmd.routing_key());
        self.request(&cmd.get_packed_command(), routing_key)?
            .extract_top_level_error()
    }

    /// Reloads the slot map with `CLUSTER SLOTS`.  On failure the previous
    /// map is kept.
    pub fn refresh_slots(&self) -> RedisResult<()> {
        let mut state = self.lock_open()?;
        state.load_topology(&self.params)
    }

    /// The node a call for `slot` would be sent to first.
    pub fn node_for_slot(&self, slot: u16) -> ClusterNode {
        self.lock().node_for_slot(slot)
    }

    /// The nodes calls can be routed to: every node of the slot map, plus
    /// the seed node while it still serves unmapped slots.
    pub fn nodes(&self) -> Vec<ClusterNode> {
        let state = self.lock();
        let mut nodes: Vec<ClusterNode> = state.slots.nodes().cloned().collect();
        if state.slots.covered_slots() < SLOT_SIZE as usize
            && !state.slots.contains_node(state.seed.id())
        {
            nodes.push(state.seed.clone());
            nodes.sort_by(|a, b| a.id().cmp(b.id()));
        }
        nodes
    }

    /// Closes every node connection.  Later calls fail.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            debug!(
                "closing cluster connection ({} node connections)",
                state.connections.len()
            );
        }
        state.closed = true;
        state.connections.clear();
    }

    /// Fetches `keys` with one `MGET` per slot and returns the values in the
    /// order of `keys`.
    pub fn mget<K, T>(&self, keys: &[K]) -> RedisResult<T>
    where
        K: AsRef<[u8]>,
        T: FromRedisValue,
    {
        let mut values = vec![Value::Nil; keys.len()];
        for (_, positions) in group_by_slot(keys) {
            let mut mget = cmd("MGET");
            for &idx in &positions {
                mget.arg(keys[idx].as_ref());
            }
            let items = match self.execute(&mget, Some(keys[positions[0]].as_ref()))? {
                Value::Array(items) => items,
                reply => invalid_type_error!(reply, "MGET did not reply with an array"),
            };
            if items.len() != positions.len() {
                invalid_type_error!(items, "MGET replied with the wrong number of values");
            }
            for (idx, item) in positions.into_iter().zip(items) {
                values[idx] = item;
            }
        }
        from_owned_redis_value(Value::Array(values))
    }

    /// Sets every pair with one `MSET` per slot.  The groups are not applied
    /// atomically.
    pub fn mset<K, V>(&self, items: &[(K, V)]) -> RedisResult<()>
    where
        K: AsRef<[u8]>,
        V: ToRedisArgs,
    {
        let keys: Vec<&[u8]> = items.iter().map(|(key, _)| key.as_ref()).collect();
        for (_, positions) in group_by_slot(&keys) {
            let mut mset = cmd("MSET");
            for &idx in &positions {
                mset.arg(keys[idx]).arg(&items[idx].1);
            }
            self.execute(&mset, Some(keys[positions[0]]))?;
        }
        Ok(())
    }

    /// Deletes `keys` with one `DEL` per slot and returns the number of
    /// keys removed.
    pub fn del<K: AsRef<[u8]>>(&self, keys: &[K]) -> RedisResult<i64> {
        let mut removed = 0;
        for (_, positions) in group_by_slot(keys) {
            let mut del = cmd("DEL");
            for &idx in &positions {
                del.arg(keys[idx].as_ref());
            }
            let reply = self.execute(&del, Some(keys[positions[0]].as_ref()))?;
            removed += from_owned_redis_value::<i64>(reply)?;
        }
        Ok(removed)
    }
}

impl<C> ConnectionLike for ClusterConnection<C>
where
    C: ConnectionLike + Connect,
{
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value> {
        let value = parse_redis_value(cmd)?;
        self.request(cmd, value.routing_key())
    }

    fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        self.request(&cmd.get_packed_command(), cmd.routing_key())
    }

    fn req_command_with_key(&mut self, cmd: &Cmd, key: Option<&[u8]>) -> RedisResult<Value> {
        self.request(&cmd.get_packed_command(), key.or_else(|| cmd.routing_key()))
    }

    fn get_db(&self) -> i64 {
        0
    }

    fn check_connection(&mut self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state
            .connections
            .values_mut()
            .all(|conn| conn.check_connection())
    }

    fn is_open(&self) -> bool {
        let state = self.lock();
        !state.closed && state.connections.values().all(|conn| conn.is_open())
    }
}
