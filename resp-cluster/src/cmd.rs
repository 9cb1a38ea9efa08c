use std::fmt;

use crate::connection::ConnectionLike;
use crate::errors::RedisResult;
use crate::pipeline::Pipeline;
use crate::types::{from_owned_redis_value, FromRedisValue, RedisWrite, ToRedisArgs};

/// Represents redis commands.
#[derive(Clone, PartialEq)]
pub struct Cmd {
    data: Vec<u8>,
    // offsets that mark the end of every argument inside `data`
    args: Vec<usize>,
}

fn countdigits(mut v: usize) -> usize {
    let mut result = 1;
    loop {
        if v < 10 {
            return result;
        }
        if v < 100 {
            return result + 1;
        }
        if v < 1000 {
            return result + 2;
        }
        if v < 10000 {
            return result + 3;
        }

        v /= 10000;
        result += 4;
    }
}

#[inline]
fn bulklen(len: usize) -> usize {
    1 + countdigits(len) + 2 + len + 2
}

fn args_len<'a, I>(args: I) -> usize
where
    I: IntoIterator<Item = &'a [u8]> + ExactSizeIterator,
{
    let mut totlen = 1 + countdigits(args.len()) + 2;
    for item in args {
        totlen += bulklen(item.len());
    }
    totlen
}

fn encode_command<'a, I>(args: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]> + Clone + ExactSizeIterator,
{
    let mut cmd = Vec::new();
    write_command_to_vec(&mut cmd, args);
    cmd
}

fn write_command_to_vec<'a, I>(cmd: &mut Vec<u8>, args: I)
where
    I: IntoIterator<Item = &'a [u8]> + Clone + ExactSizeIterator,
{
    cmd.reserve(args_len(args.clone()));

    let mut buf = ::itoa::Buffer::new();

    cmd.push(b'*');
    cmd.extend_from_slice(buf.format(args.len()).as_bytes());
    cmd.extend_from_slice(b"\r\n");

    for bytes in args {
        cmd.push(b'$');
        cmd.extend_from_slice(buf.format(bytes.len()).as_bytes());
        cmd.extend_from_slice(b"\r\n");

        cmd.extend_from_slice(bytes);
        cmd.extend_from_slice(b"\r\n");
    }
}

impl RedisWrite for Cmd {
    fn write_arg(&mut self, arg: &[u8]) {
        self.data.extend_from_slice(arg);
        self.args.push(self.data.len());
    }

    fn write_arg_fmt(&mut self, arg: impl fmt::Display) {
        self.data.extend_from_slice(arg.to_string().as_bytes());
        self.args.push(self.data.len());
    }
}

impl Default for Cmd {
    fn default() -> Cmd {
        Cmd::new()
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.args_iter().map(String::from_utf8_lossy))
            .finish()
    }
}

/// A command acts as a builder interface to creating encoded redis
/// requests.  This allows you to easiy assemble a packed command
/// by chaining arguments together.
///
/// Basic example:
///
/// ```rust
/// resp_cluster::Cmd::new().arg("SET").arg("my_key").arg(42);
/// ```
///
/// There is also a helper function called `cmd` which makes it a
/// tiny bit shorter:
///
/// ```rust
/// resp_cluster::cmd("SET").arg("my_key").arg(42);
/// ```
impl Cmd {
    /// Creates a new empty command.
    pub fn new() -> Cmd {
        Cmd {
            data: vec![],
            args: vec![],
        }
    }

    /// Creates a new empty command, with at least the requested capcity.
    pub fn with_capacity(arg_count: usize, size_of_data: usize) -> Cmd {
        Cmd {
            data: Vec::with_capacity(size_of_data),
            args: Vec::with_capacity(arg_count),
        }
    }

    /// Appends an argument to the command.  The argument passed must
    /// be a type that implements `ToRedisArgs`.  Most primitive types as
    /// well as vectors of primitive types implement it.
    ///
    /// For instance all of the following are valid:
    ///
    /// ```rust
    /// resp_cluster::cmd("SET").arg(&["my_key", "my_value"]);
    /// resp_cluster::cmd("SET").arg("my_key").arg(42);
    /// resp_cluster::cmd("SET").arg("my_key").arg(b"my_value");
    /// ```
    #[inline]
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Cmd {
        arg.write_redis_args(self);
        self
    }

    /// Returns the packed command as a byte vector.
    #[inline]
    pub fn get_packed_command(&self) -> Vec<u8> {
        let mut cmd = Vec::new();
        self.write_packed_command(&mut cmd);
        cmd
    }

    pub(crate) fn write_packed_command(&self, cmd: &mut Vec<u8>) {
        write_command_to_vec(cmd, self.args_iter())
    }

    /// Sends the command as query to the connection and converts the
    /// result to the target redis value.  This is the general way how
    /// you can retrieve data.
    ///
    /// Error replies from the server, including ones nested in arrays,
    /// are returned as `Err`.
    #[inline]
    pub fn query<T: FromRedisValue>(&self, con: &mut dyn ConnectionLike) -> RedisResult<T> {
        let val = con.req_command(self)?.extract_error()?;
        from_owned_redis_value(val)
    }

    /// This is a shortcut to `query()` that does not return a value.
    /// Mainly useful for simple commands like setting keys.
    ///
    /// This is equivalent to a call of query like this:
    ///
    /// ```rust,no_run
    /// # let client = resp_cluster::Client::open("redis://127.0.0.1/").unwrap();
    /// # let mut con = client.get_connection().unwrap();
    /// let _ : () = resp_cluster::cmd("PING").query(&mut con).unwrap();
    /// ```
    #[inline]
    pub fn exec(&self, con: &mut dyn ConnectionLike) -> RedisResult<()> {
        self.query::<()>(con)
    }

    /// Returns an iterator over the arguments in this command (including the command name itself)
    pub fn args_iter(&self) -> impl Clone + ExactSizeIterator<Item = &[u8]> {
        let mut prev = 0;
        self.args.iter().map(move |&end| {
            let arg = &self.data[prev..end];
            prev = end;
            arg
        })
    }

    /// Returns the argument at `idx`, where index 0 is the command name.
    pub fn arg_idx(&self, idx: usize) -> Option<&[u8]> {
        let end = *self.args.get(idx)?;
        let start = match idx {
            0 => 0,
            _ => self.args[idx - 1],
        };
        Some(&self.data[start..end])
    }

    /// Returns the number of arguments, including the command name.
    pub fn args_len(&self) -> usize {
        self.args.len()
    }
}

/// Shortcut function to creating a command with a single argument.
///
/// The first argument of a redis command is always the name of the command
/// which needs to be a string.  This is the recommended way to start a
/// command pipe.
///
/// ```rust
/// resp_cluster::cmd("PING");
/// ```
pub fn cmd(name: &str) -> Cmd {
    let mut rv = Cmd::new();
    rv.arg(name);
    rv
}

/// Packs a bunch of commands into a request.  This is generally a quite
/// useless function as this functionality is nicely wrapped through the
/// `Cmd` object, but in some cases it can be useful.  The return value
/// of this can then be send to the low level `ConnectionLike` methods.
///
/// Example:
///
/// ```rust
/// # use resp_cluster::ToRedisArgs;
/// let mut args = vec![];
/// args.extend("SET".to_redis_args());
/// args.extend("my_key".to_redis_args());
/// args.extend(42.to_redis_args());
/// let cmd = resp_cluster::pack_command(&args);
/// assert_eq!(cmd, b"*3\r\n$3\r\nSET\r\n$6\r\nmy_key\r\n$2\r\n42\r\n".to_vec());
/// ```
pub fn pack_command(args: &[Vec<u8>]) -> Vec<u8> {
    encode_command(args.iter().map(|x| &x[..]))
}

/// Shortcut for creating a new pipeline.
pub fn pipe() -> Pipeline {
    Pipeline::new()
}
