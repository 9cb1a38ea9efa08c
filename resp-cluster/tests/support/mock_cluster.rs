use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, RwLock},
};

use once_cell::sync::Lazy;
use resp_cluster::{
    parse_redis_value, ClusterClient, ClusterClientBuilder, ClusterConnection, Connect,
    ConnectionAddr, ConnectionLike, IntoConnectionInfo, RedisResult, SocketTimeouts, Value,
};

/// Answers a packed command sent to `port`.  `Err(reply)` answers, `Ok(())`
/// lets the next responder in a `?` chain try.
pub type Handler = Arc<dyn Fn(&[u8], u16) -> Result<(), RedisResult<Value>> + Send + Sync>;

static HANDLERS: Lazy<RwLock<HashMap<String, Handler>>> = Lazy::new(Default::default);

#[derive(Clone)]
pub struct MockConnection {
    pub handler: Handler,
    pub port: u16,
}

impl Connect for MockConnection {
    fn connect<T>(info: T, _timeouts: SocketTimeouts) -> RedisResult<Self>
    where
        T: IntoConnectionInfo,
    {
        let info = info.into_connection_info().unwrap();

        let (name, port) = match &info.addr {
            ConnectionAddr::Tcp(addr, port) => (addr, *port),
            _ => unreachable!(),
        };
        // hosts without a handler behave like a node that is down
        let handler = HANDLERS.read().unwrap().get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, "mock node is down")
        })?;
        Ok(MockConnection { handler, port })
    }
}

impl ConnectionLike for MockConnection {
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value> {
        (self.handler)(cmd, self.port).expect_err("Handler did not specify a response")
    }

    fn get_db(&self) -> i64 {
        0
    }

    fn check_connection(&mut self) -> bool {
        true
    }

    fn is_open(&self) -> bool {
        true
    }
}

pub fn contains_slice(xs: &[u8], ys: &[u8]) -> bool {
    for i in 0..xs.len() {
        if xs[i..].starts_with(ys) {
            return true;
        }
    }
    false
}

/// The arguments of a packed command, decoded as UTF-8.
pub fn command_args(cmd: &[u8]) -> Vec<String> {
    match parse_redis_value(cmd).unwrap() {
        Value::Array(args) => args
            .into_iter()
            .map(|arg| match arg {
                Value::BulkString(data) => String::from_utf8(data).unwrap(),
                other => panic!("unexpected argument {other:?}"),
            })
            .collect(),
        other => panic!("not a command: {other:?}"),
    }
}

#[derive(Clone)]
pub struct MockSlotRange {
    pub primary_port: u16,
    pub replica_ports: Vec<u16>,
    pub slot_range: std::ops::RangeInclusive<u16>,
}

pub fn slots_reply(name: &str, slots_config: Vec<MockSlotRange>) -> Value {
    let node = |port: u16| {
        Value::Array(vec![
            Value::BulkString(name.as_bytes().to_vec()),
            Value::Int(port as i64),
            Value::BulkString(format!("node-{port}").into_bytes()),
        ])
    };
    Value::Array(
        slots_config
            .into_iter()
            .map(|slot_config| {
                let mut item = vec![
                    Value::Int(*slot_config.slot_range.start() as i64),
                    Value::Int(*slot_config.slot_range.end() as i64),
                    node(slot_config.primary_port),
                ];
                item.extend(slot_config.replica_ports.into_iter().map(&node));
                Value::Array(item)
            })
            .collect(),
    )
}

pub fn respond_startup_using_config(
    name: &str,
    cmd: &[u8],
    slots_config: Vec<MockSlotRange>,
) -> Result<(), RedisResult<Value>> {
    if contains_slice(cmd, b"PING") {
        Err(Ok(Value::SimpleString("PONG".into())))
    } else if contains_slice(cmd, b"CLUSTER") && contains_slice(cmd, b"SLOTS") {
        Err(Ok(slots_reply(name, slots_config)))
    } else {
        Ok(())
    }
}

/// One node on port 6379 owning every slot.
pub fn respond_startup(name: &str, cmd: &[u8]) -> Result<(), RedisResult<Value>> {
    respond_startup_using_config(
        name,
        cmd,
        vec![MockSlotRange {
            primary_port: 6379,
            replica_ports: vec![],
            slot_range: 0..=16383,
        }],
    )
}

/// Port 6379 owns slots 0-8191, port 6380 owns 8192-16383.
pub fn respond_startup_two_nodes(name: &str, cmd: &[u8]) -> Result<(), RedisResult<Value>> {
    respond_startup_using_config(
        name,
        cmd,
        vec![
            MockSlotRange {
                primary_port: 6379,
                replica_ports: vec![6381],
                slot_range: 0..=8191,
            },
            MockSlotRange {
                primary_port: 6380,
                replica_ports: vec![6382],
                slot_range: 8192..=16383,
            },
        ],
    )
}

/// Records `(port, args)` of every command a handler sees.
#[derive(Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<(u16, Vec<String>)>>>);

impl CommandLog {
    pub fn record(&self, cmd: &[u8], port: u16) {
        self.0.lock().unwrap().push((port, command_args(cmd)));
    }

    pub fn entries(&self) -> Vec<(u16, Vec<String>)> {
        self.0.lock().unwrap().clone()
    }

    /// Entries whose command name is `name`.
    pub fn commands(&self, name: &str) -> Vec<(u16, Vec<String>)> {
        self.entries()
            .into_iter()
            .filter(|(_, args)| args[0].eq_ignore_ascii_case(name))
            .collect()
    }
}

pub struct MockEnv {
    pub client: ClusterClient,
    pub connection: ClusterConnection<MockConnection>,
    #[allow(unused)]
    pub handler: RemoveHandler,
}

pub struct RemoveHandler(Vec<String>);

impl Drop for RemoveHandler {
    fn drop(&mut self) {
        for id in &self.0 {
            HANDLERS.write().unwrap().remove(id);
        }
    }
}

impl MockEnv {
    pub fn new(
        id: &str,
        handler: impl Fn(&[u8], u16) -> Result<(), RedisResult<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self::with_client_builder(
            ClusterClient::builder(vec![&*format!("redis://{id}")]),
            id,
            handler,
        )
    }

    pub fn with_client_builder(
        client_builder: ClusterClientBuilder,
        id: &str,
        handler: impl Fn(&[u8], u16) -> Result<(), RedisResult<Value>> + Send + Sync + 'static,
    ) -> Self {
        super::init_logger();

        let id = id.to_string();
        HANDLERS
            .write()
            .unwrap()
            .insert(id.clone(), Arc::new(move |cmd, port| handler(cmd, port)));

        let client = client_builder.build().unwrap();
        let connection = client.get_generic_connection().unwrap();
        MockEnv {
            client,
            connection,
            handler: RemoveHandler(vec![id]),
        }
    }
}
