use std::time::Duration;

use crate::connection::{
    connect, connect_with_timeouts, Connection, ConnectionInfo, IntoConnectionInfo, SocketTimeouts,
};
use crate::errors::RedisResult;

/// The client type.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) connection_info: ConnectionInfo,
}

/// The client acts as connector to a single server.  By itself it does not
/// do much other than providing a convenient way to fetch a connection from
/// it.
///
/// When opening a client a URL in the following format should be used:
///
/// ```plain
/// redis://host:port/db
/// ```
///
/// Example usage::
///
/// ```rust,no_run
/// let client = resp_cluster::Client::open("redis://127.0.0.1/").unwrap();
/// let con = client.get_connection().unwrap();
/// ```
impl Client {
    /// Creates a client from connection parameters.  This does not
    /// actually open a connection yet but it does perform some basic
    /// checks on the URL that might make the operation fail.
    pub fn open<T: IntoConnectionInfo>(params: T) -> RedisResult<Client> {
        Ok(Client {
            connection_info: params.into_connection_info()?,
        })
    }

    /// Instructs the client to actually connect and returns a connection
    /// that already went through `AUTH` and `SELECT`.  This can fail with
    /// a variety of errors (like unreachable host) so it's important that
    /// you handle those errors.
    pub fn get_connection(&self) -> RedisResult<Connection> {
        connect(&self.connection_info, None)
    }

    /// Like `get_connection`, but each TCP connect attempt is bounded by
    /// `timeout`.
    pub fn get_connection_with_timeout(&self, timeout: Duration) -> RedisResult<Connection> {
        connect(&self.connection_info, Some(timeout))
    }

    /// Like `get_connection`, with socket timeouts that are in force from
    /// the first handshake command on.
    pub fn get_connection_with_timeouts(
        &self,
        timeouts: SocketTimeouts,
    ) -> RedisResult<Connection> {
        connect_with_timeouts(&self.connection_info, timeouts)
    }

    /// Returns a reference of client connection info object.
    pub fn get_connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }
}
