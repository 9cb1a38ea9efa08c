use std::time::Duration;

use crate::cluster::{ClusterConnection, Connect};
use crate::cluster_topology::ClusterNode;
use crate::connection::{
    ConnectionAddr, ConnectionInfo, ConnectionLike, IntoConnectionInfo, RedisConnectionInfo,
    SocketTimeouts, TlsMode,
};
use crate::errors::{ErrorKind, RedisError, RedisResult};

/// Number of times a single call may be sent before it fails with
/// [`ErrorKind::ClusterRedirectExhausted`].
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Redis cluster specific parameters.
#[derive(Clone, Debug)]
pub(crate) struct ClusterParams {
    pub(crate) password: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) tls: Option<TlsMode>,
    pub(crate) connection_timeout: Option<Duration>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
    pub(crate) max_redirects: u32,
    pub(crate) topology_refresh_interval: Option<Duration>,
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams {
            password: None,
            username: None,
            tls: None,
            connection_timeout: None,
            read_timeout: None,
            write_timeout: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            topology_refresh_interval: None,
        }
    }
}

impl ClusterParams {
    pub(crate) fn validate_duration(dur: &Option<Duration>) -> RedisResult<()> {
        if dur.map_or(false, |d| d.is_zero()) {
            return Err(RedisError::from((
                ErrorKind::InvalidClientConfig,
                "Duration should be None or non-zero.",
            )));
        }
        Ok(())
    }

    pub(crate) fn socket_timeouts(&self) -> SocketTimeouts {
        SocketTimeouts {
            connect: self.connection_timeout,
            read: self.read_timeout,
            write: self.write_timeout,
        }
    }

    /// Connection parameters for a node of the cluster.  Cluster nodes only
    /// serve database 0.
    pub(crate) fn connection_info(&self, node: &ClusterNode) -> ConnectionInfo {
        let host = node.host().to_string();
        let port = node.port();
        ConnectionInfo {
            addr: match self.tls {
                Some(mode) => ConnectionAddr::TcpTls {
                    host,
                    port,
                    insecure: mode == TlsMode::Insecure,
                },
                None => ConnectionAddr::Tcp(host, port),
            },
            redis: RedisConnectionInfo {
                db: 0,
                username: self.username.clone(),
                password: self.password.clone(),
            },
        }
    }
}

/// Used to configure and build a [`ClusterClient`].
pub struct ClusterClientBuilder {
    initial_nodes: RedisResult<Vec<ConnectionInfo>>,
    cluster_params: ClusterParams,
}

impl ClusterClientBuilder {
    /// Creates a new `ClusterClientBuilder` with the the provided initial_nodes.
    ///
    /// This is the same as `ClusterClient::builder(initial_nodes)`.
    pub fn new<T: IntoConnectionInfo>(initial_nodes: Vec<T>) -> ClusterClientBuilder {
        ClusterClientBuilder {
            initial_nodes: initial_nodes
                .into_iter()
                .map(|x| x.into_connection_info())
                .collect(),
            cluster_params: ClusterParams::default(),
        }
    }

    /// Creates a new [`ClusterClient`] with the parameters.
    ///
    /// This does not create connections to the Redis Cluster, but only performs some basic checks
    /// on the initial nodes' URLs and passwords/usernames.
    ///
    /// # Errors
    ///
    /// Upon failure to parse initial nodes, if the initial nodes have different passwords or
    /// usernames, or if an option is out of range, an error is returned.
    pub fn build(self) -> RedisResult<ClusterClient> {
        let initial_nodes = self.initial_nodes?;

        let first_node = match initial_nodes.first() {
            Some(node) => node,
            None => {
                return Err(RedisError::from((
                    ErrorKind::InvalidClientConfig,
                    "Initial nodes can't be empty.",
                )))
            }
        };

        let mut cluster_params = self.cluster_params;
        ClusterParams::validate_duration(&cluster_params.connection_timeout)?;
        ClusterParams::validate_duration(&cluster_params.read_timeout)?;
        ClusterParams::validate_duration(&cluster_params.write_timeout)?;
        ClusterParams::validate_duration(&cluster_params.topology_refresh_interval)?;
        if cluster_params.max_redirects == 0 {
            return Err(RedisError::from((
                ErrorKind::InvalidClientConfig,
                "max_redirects must be at least 1.",
            )));
        }

        let password = if cluster_params.password.is_none() {
            cluster_params.password = first_node.redis.password.clone();
            &cluster_params.password
        } else {
            &None
        };
        let username = if cluster_params.username.is_none() {
            cluster_params.username = first_node.redis.username.clone();
            &cluster_params.username
        } else {
            &None
        };
        if cluster_params.tls.is_none() {
            if let ConnectionAddr::TcpTls { insecure, .. } = first_node.addr {
                cluster_params.tls = Some(if insecure {
                    TlsMode::Insecure
                } else {
                    TlsMode::Secure
                });
            }
        }

        let mut nodes = Vec::with_capacity(initial_nodes.len());
        for node in &initial_nodes {
            if password.is_some() && node.redis.password != *password {
                return Err(RedisError::from((
                    ErrorKind::InvalidClientConfig,
                    "Cannot use different password among initial nodes.",
                )));
            }

            if username.is_some() && node.redis.username != *username {
                return Err(RedisError::from((
                    ErrorKind::InvalidClientConfig,
                    "Cannot use different username among initial nodes.",
                )));
            }

            nodes.push(match &node.addr {
                ConnectionAddr::Tcp(host, port) => ClusterNode::new(host.as_str(), *port),
                ConnectionAddr::TcpTls { host, port, .. } => {
                    ClusterNode::new(host.as_str(), *port)
                }
            });
        }

        Ok(ClusterClient {
            initial_nodes: nodes,
            cluster_params,
        })
    }

    /// Sets password for new ClusterClient.
    pub fn password(mut self, password: String) -> ClusterClientBuilder {
        self.cluster_params.password = Some(password);
        self
    }

    /// Sets username for new ClusterClient.
    pub fn username(mut self, username: String) -> ClusterClientBuilder {
        self.cluster_params.username = Some(username);
        self
    }

    /// Sets TLS mode for the connections to every node.
    ///
    /// Defaults to the mode of the first initial node (`rediss://` URLs
    /// enable it).
    pub fn tls(mut self, tls: TlsMode) -> ClusterClientBuilder {
        self.cluster_params.tls = Some(tls);
        self
    }

    /// Bounds every TCP connect attempt to a node.
    pub fn connection_timeout(mut self, connection_timeout: Duration) -> ClusterClientBuilder {
        self.cluster_params.connection_timeout = Some(connection_timeout);
        self
    }

    /// Sets the read timeout of every node connection.
    pub fn read_timeout(mut self, read_timeout: Duration) -> ClusterClientBuilder {
        self.cluster_params.read_timeout = Some(read_timeout);
        self
    }

    /// Sets the write timeout of every node connection.
    pub fn write_timeout(mut self, write_timeout: Duration) -> ClusterClientBuilder {
        self.cluster_params.write_timeout = Some(write_timeout);
        self
    }

    /// Sets how many times a single call may be sent while following
    /// `MOVED` redirects (default 5).
    pub fn max_redirects(mut self, max_redirects: u32) -> ClusterClientBuilder {
        self.cluster_params.max_redirects = max_redirects;
        self
    }

    /// Reloads the slot map before a call once `interval` has passed since
    /// the last successful load.
    pub fn topology_refresh_interval(mut self, interval: Duration) -> ClusterClientBuilder {
        self.cluster_params.topology_refresh_interval = Some(interval);
        self
    }
}

/// This is a Redis cluster client.
#[derive(Clone)]
pub struct ClusterClient {
    initial_nodes: Vec<ClusterNode>,
    cluster_params: ClusterParams,
}

impl ClusterClient {
    /// Creates a `ClusterClient` with the default parameters.
    ///
    /// This does not create connections to the Redis Cluster, but only performs some basic checks
    /// on the initial nodes' URLs and passwords/usernames.
    ///
    /// # Errors
    ///
    /// Upon failure to parse initial nodes or if the initial nodes have different passwords or
    /// usernames, an error is returned.
    pub fn new<T: IntoConnectionInfo>(initial_nodes: Vec<T>) -> RedisResult<ClusterClient> {
        ClusterClientBuilder::new(initial_nodes).build()
    }

    /// Creates a [`ClusterClientBuilder`] with the the provided initial_nodes.
    pub fn builder<T: IntoConnectionInfo>(initial_nodes: Vec<T>) -> ClusterClientBuilder {
        ClusterClientBuilder::new(initial_nodes)
    }

    /// Connects to the first reachable initial node and loads the cluster
    /// topology from it, returning a [`ClusterConnection`].
    ///
    /// # Errors
    ///
    /// An error is returned if no initial node can be reached.  A failed
    /// topology load is not an error: every call then goes to the node that
    /// was reached.
    pub fn get_connection(&self) -> RedisResult<ClusterConnection> {
        self.get_generic_connection()
    }

    /// Like [`ClusterClient::get_connection`], with node connections of
    /// type `C`.
    #[doc(hidden)]
    pub fn get_generic_connection<C>(&self) -> RedisResult<ClusterConnection<C>>
    where
        C: ConnectionLike + Connect,
    {
        ClusterConnection::new(self.cluster_params.clone(), self.initial_nodes.clone())
    }
}
