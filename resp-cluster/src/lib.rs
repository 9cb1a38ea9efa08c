//! resp-cluster is a synchronous client for servers that speak RESP2, the
//! Redis serialization protocol, with transparent support for Redis Cluster.
//!
//! # Basic Operation
//!
//! Commands are built with [`cmd`] and sent over anything implementing
//! [`ConnectionLike`]: a single node [`Connection`] or a
//! [`ClusterConnection`].
//!
//! ## Connection Handling
//!
//! For connecting to a single server you can use a client object which then
//! can produce actual connections:
//!
//! ```rust,no_run
//! fn do_something() -> resp_cluster::RedisResult<()> {
//!     let client = resp_cluster::Client::open("redis://127.0.0.1/")?;
//!     let mut con = client.get_connection()?;
//!
//!     /* do something here */
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Connection Parameters
//!
//! The client accepts URLs of the form
//!
//! ```plain
//! redis://[<username>][:<password>@]<hostname>[:port][/<db>]
//! ```
//!
//! `rediss://` selects TLS, which needs the `tls-native-tls` feature.  A
//! `#insecure` fragment disables certificate and hostname verification.
//!
//! ## Executing Low-Level Commands
//!
//! ```rust,no_run
//! fn do_something(con: &mut resp_cluster::Connection) -> resp_cluster::RedisResult<()> {
//!     resp_cluster::cmd("SET").arg("my_key").arg(42).exec(con)?;
//!     let value: i64 = resp_cluster::cmd("GET").arg("my_key").query(con)?;
//!     assert_eq!(value, 42);
//!     Ok(())
//! }
//! ```
//!
//! Error replies of the server are returned as `Err` with an
//! [`ErrorKind::ServerError`] or [`ErrorKind::ExtensionError`] kind.
//! [`ConnectionLike::req_command`] hands back the raw [`Value`] instead,
//! error replies included.
//!
//! # Cluster
//!
//! [`ClusterClient`] connects to the first reachable initial node, loads the
//! slot map with `CLUSTER SLOTS` and routes every command by the hash slot
//! of its key.  `MOVED` and `ASK` redirects are followed, up to a
//! configurable limit.
//!
//! ```rust,no_run
//! use resp_cluster::{cmd, ClusterClient};
//!
//! let client = ClusterClient::builder(vec!["redis://127.0.0.1:7000/"])
//!     .max_redirects(5)
//!     .build()
//!     .unwrap();
//! let con = client.get_connection().unwrap();
//! con.execute(cmd("SET").arg("{user1000}.following").arg(1), None).unwrap();
//! ```
//!
//! # Pipelining
//!
//! A [`Pipeline`] records commands and runs them in order, one at a time,
//! returning one result per command.  A failing command does not abort the
//! rest.
//!
//! ## Optional Features
//!
//! * `tls-native-tls`: enables TLS connections through `native-tls`
//! * `keep-alive`: enables TCP keepalive on sockets through `socket2`
//! * `tcp_nodelay`: sets `TCP_NODELAY` on sockets

#![deny(non_camel_case_types)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, warn(rustdoc::broken_intra_doc_links))]
#![cfg_attr(docsrs, feature(doc_cfg))]

// public api
pub use crate::client::Client;
pub use crate::cluster::{ClusterClient, ClusterClientBuilder, ClusterConnection, Connect};
pub use crate::cluster_client::DEFAULT_MAX_REDIRECTS;
pub use crate::cluster_routing::{get_slot, Routable, SLOT_SIZE};
pub use crate::cluster_topology::{ClusterNode, SlotMap, SlotRange};
pub use crate::cmd::{cmd, pack_command, pipe, Cmd};
pub use crate::connection::{
    connect, connect_with_timeouts, parse_redis_url, Connection, ConnectionAddr, ConnectionInfo,
    ConnectionLike, IntoConnectionInfo, RedisConnectionInfo, SocketTimeouts, TlsMode,
};
pub use crate::parser::{parse_redis_value, Parser};
pub use crate::pipeline::Pipeline;

// preserve grouping and order
#[rustfmt::skip]
pub use crate::errors::{
    // error kinds
    ErrorClass,
    ErrorKind,
    ServerErrorKind,

    // error and result types
    RedisError,
    RedisResult,
    ServerError,
};

// preserve grouping and order
#[rustfmt::skip]
pub use crate::types::{
    // utility functions
    from_redis_value,
    from_owned_redis_value,

    // conversion traits
    FromRedisValue,
    RedisWrite,
    ToRedisArgs,

    // low level values
    Value,
};

#[macro_use]
mod macros;

mod client;
pub mod cluster;
mod cluster_client;
mod cluster_routing;
mod cluster_topology;
mod cmd;
mod connection;
mod errors;
mod parser;
mod pipeline;
mod types;
