use crate::cmd::{cmd, Cmd};
use crate::connection::ConnectionLike;
use crate::errors::RedisResult;
use crate::types::{ToRedisArgs, Value};

#[derive(Clone, Debug)]
struct PipelineCommand {
    cmd: Cmd,
    routing_key: Option<Vec<u8>>,
}

/// Represents a redis command pipeline.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    commands: Vec<PipelineCommand>,
}

/// A pipeline records several commands and runs them one after the other.
/// Every command goes through the full routing and redirect handling of the
/// connection it runs on, and gets its own result.
///
/// Basic example:
///
/// ```rust,no_run
/// # let client = resp_cluster::Client::open("redis://127.0.0.1/").unwrap();
/// # let mut con = client.get_connection().unwrap();
/// let results = resp_cluster::pipe()
///     .cmd("SET").arg("key_1").arg(42)
///     .cmd("INCR").arg("not_a_number")
///     .cmd("GET").arg("key_1")
///     .execute(&mut con);
/// assert!(results[0].is_ok());
/// ```
///
/// A failing command does not stop the ones recorded after it.
impl Pipeline {
    /// Creates an empty pipeline.  For consistency with the `cmd`
    /// api a `pipe` function is provided as alias.
    pub fn new() -> Pipeline {
        Self::with_capacity(0)
    }

    /// Creates an empty pipeline with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Pipeline {
        Pipeline {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Starts a new command.  Functions such as `arg` then become
    /// available to add more arguments to that command.
    #[inline]
    pub fn cmd(&mut self, name: &str) -> &mut Pipeline {
        self.add_command(cmd(name))
    }

    /// Adds a command to the pipeline.
    #[inline]
    pub fn add_command(&mut self, cmd: Cmd) -> &mut Pipeline {
        self.commands.push(PipelineCommand {
            cmd,
            routing_key: None,
        });
        self
    }

    /// Adds an argument to the last started command.  This works similar
    /// to the `arg` method of the `Cmd` object.
    ///
    /// Note that this function fails the task if executed on an empty pipeline.
    #[inline]
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Pipeline {
        self.get_last_command().cmd.arg(arg);
        self
    }

    /// Routes the last started command by `key` instead of its second
    /// argument.
    ///
    /// Note that this function fails the task if executed on an empty pipeline.
    #[inline]
    pub fn with_key<K: AsRef<[u8]>>(&mut self, key: K) -> &mut Pipeline {
        self.get_last_command().routing_key = Some(key.as_ref().to_vec());
        self
    }

    /// Returns the number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no command was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drops all recorded commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Returns the recorded commands.
    pub fn cmd_iter(&self) -> impl Iterator<Item = &Cmd> {
        self.commands.iter().map(|c| &c.cmd)
    }

    #[inline]
    fn get_last_command(&mut self) -> &mut PipelineCommand {
        let idx = match self.commands.len() {
            0 => panic!("No command on stack"),
            x => x - 1,
        };
        &mut self.commands[idx]
    }

    /// Runs the recorded commands in order, one at a time, and returns one
    /// result per command.  Error replies become `Err` in their own slot;
    /// the remaining commands still run.
    ///
    /// The pipeline is empty afterwards and can be reused.
    pub fn execute(&mut self, con: &mut dyn ConnectionLike) -> Vec<RedisResult<Value>> {
        self.commands
            .drain(..)
            .map(|PipelineCommand { cmd, routing_key }| {
                con.req_command_with_key(&cmd, routing_key.as_deref())
                    .and_then(Value::extract_top_level_error)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Pipeline;
    use crate::cmd::{cmd, Cmd};
    use crate::connection::ConnectionLike;
    use crate::errors::{ErrorKind, RedisResult, ServerError, ServerErrorKind};
    use crate::types::Value;

    /// Answers every command from a script and records what it was sent.
    #[derive(Default)]
    struct Recorder {
        sent: Vec<(Vec<u8>, Option<Vec<u8>>)>,
        replies: Vec<RedisResult<Value>>,
    }

    impl ConnectionLike for Recorder {
        fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value> {
            self.sent.push((cmd.to_vec(), None));
            self.replies.remove(0)
        }

        fn req_command_with_key(&mut self, cmd: &Cmd, key: Option<&[u8]>) -> RedisResult<Value> {
            self.sent
                .push((cmd.get_packed_command(), key.map(|k| k.to_vec())));
            self.replies.remove(0)
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

    #[test]
    fn commands_run_in_order_with_their_own_results() {
        let mut con = Recorder {
            replies: vec![
                Ok(Value::Okay),
                Ok(Value::ServerError(ServerError::from_line(
                    "ERR value is not an integer or out of range",
                ))),
                Ok(Value::BulkString(b"42".to_vec())),
            ],
            ..Default::default()
        };

        let mut pipe = Pipeline::new();
        pipe.cmd("SET")
            .arg("a")
            .arg(42)
            .cmd("INCR")
            .arg("b")
            .cmd("GET")
            .arg("a");
        assert_eq!(pipe.len(), 3);

        let results = pipe.execute(&mut con);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &Value::Okay);
        assert_eq!(
            results[1].as_ref().unwrap_err().kind(),
            ErrorKind::ServerError(ServerErrorKind::ResponseError)
        );
        assert_eq!(
            results[2].as_ref().unwrap(),
            &Value::BulkString(b"42".to_vec())
        );

        let sent: Vec<&[u8]> = con.sent.iter().map(|(c, _)| &c[..]).collect();
        assert_eq!(
            sent,
            vec![
                &b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$2\r\n42\r\n"[..],
                b"*2\r\n$4\r\nINCR\r\n$1\r\nb\r\n",
                b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n",
            ]
        );
        assert!(pipe.is_empty());
    }

    #[test]
    fn error_elements_of_an_array_reply_are_kept() {
        let reply = Value::Array(vec![
            Value::Int(1),
            Value::ServerError(ServerError::from_line("ERR x")),
        ]);
        let mut con = Recorder {
            replies: vec![Ok(reply.clone())],
            ..Default::default()
        };
        let results = crate::pipe().cmd("EXEC").execute(&mut con);
        assert_eq!(results[0].as_ref().unwrap(), &reply);
    }

    #[test]
    fn connection_errors_stay_in_their_slot() {
        let mut con = Recorder {
            replies: vec![
                Err((ErrorKind::IoError, "connection lost").into()),
                Ok(Value::Int(1)),
            ],
            ..Default::default()
        };
        let results = crate::pipe()
            .cmd("PING")
            .cmd("INCR")
            .arg("x")
            .execute(&mut con);
        assert_eq!(results[0].as_ref().unwrap_err().kind(), ErrorKind::IoError);
        assert_eq!(results[1].as_ref().unwrap(), &Value::Int(1));
    }

    #[test]
    fn explicit_keys_are_passed_on() {
        let mut con = Recorder {
            replies: vec![Ok(Value::Int(1)), Ok(Value::Int(2))],
            ..Default::default()
        };
        let mut pipe = Pipeline::with_capacity(2);
        pipe.add_command(cmd("INCR").arg("{user}:a").clone())
            .with_key("{user}")
            .cmd("INCR")
            .arg("b");
        pipe.execute(&mut con);
        assert_eq!(con.sent[0].1.as_deref(), Some(&b"{user}"[..]));
        assert_eq!(con.sent[1].1, None);
    }

    #[test]
    fn clear_and_reuse() {
        let mut pipe = Pipeline::new();
        pipe.cmd("PING");
        pipe.clear();
        assert!(pipe.is_empty());

        let mut con = Recorder::default();
        assert!(pipe.execute(&mut con).is_empty());
        assert!(con.sent.is_empty());

        con.replies.push(Ok(Value::SimpleString("PONG".into())));
        pipe.cmd("PING");
        assert_eq!(pipe.cmd_iter().count(), 1);
        let results = pipe.execute(&mut con);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &Value::SimpleString("PONG".into())
        );
    }

    #[test]
    #[should_panic(expected = "No command on stack")]
    fn arg_needs_a_command() {
        Pipeline::new().arg("x");
    }
}
