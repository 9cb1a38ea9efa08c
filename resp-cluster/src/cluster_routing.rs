use std::collections::BTreeMap;

use arcstr::ArcStr;

use crate::cmd::Cmd;
use crate::errors::ServerErrorKind;
use crate::types::Value;

/// Number of hash slots a cluster keyspace is split into.
pub const SLOT_SIZE: u16 = 16384;

fn slot(key: &[u8]) -> u16 {
    crc16::State::<crc16::XMODEM>::calculate(key) % SLOT_SIZE
}

/// A redirect signalled by a node, parsed from `-MOVED <slot> <addr>` or
/// `-ASK <slot> <addr>`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Redirect {
    Moved { slot: u16, addr: ArcStr },
    Ask { slot: u16, addr: ArcStr },
}

impl Redirect {
    /// Returns the redirect carried by `value`, if it is a well formed one.
    pub(crate) fn from_reply(value: &Value) -> Option<Redirect> {
        let Value::ServerError(err) = value else {
            return None;
        };
        let kind = err.kind()?;
        if !matches!(kind, ServerErrorKind::Moved | ServerErrorKind::Ask) {
            return None;
        }
        let mut iter = err.details()?.split_ascii_whitespace();
        let slot: u16 = iter.next()?.parse().ok()?;
        let addr = ArcStr::from(iter.next()?);
        if slot >= SLOT_SIZE {
            return None;
        }
        Some(match kind {
            ServerErrorKind::Moved => Redirect::Moved { slot, addr },
            _ => Redirect::Ask { slot, addr },
        })
    }
}

/// Returns the slot that matches `key`.
///
/// If the key contains a non-empty `{...}` section, only the content of the
/// first such section is hashed, which lets related keys share a slot.
pub fn get_slot(key: &[u8]) -> u16 {
    let key = match get_hashtag(key) {
        Some(tag) => tag,
        None => key,
    };

    slot(key)
}

fn get_hashtag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|v| *v == b'{')?;
    let close = key[open..].iter().position(|v| *v == b'}')?;

    let rv = &key[open + 1..open + close];
    if rv.is_empty() {
        None
    } else {
        Some(rv)
    }
}

/// Something that exposes positional command arguments, either a command
/// being built or a packed command that was parsed back into a value.
pub trait Routable {
    /// Returns a reference to the data for the argument at `idx`.
    fn arg_idx(&self, idx: usize) -> Option<&[u8]>;

    /// The routing key: the first argument after the command name.
    fn routing_key(&self) -> Option<&[u8]> {
        self.arg_idx(1)
    }

    /// The slot of the routing key, if there is one.
    fn slot(&self) -> Option<u16> {
        self.routing_key().map(get_slot)
    }
}

impl Routable for Cmd {
    fn arg_idx(&self, idx: usize) -> Option<&[u8]> {
        Cmd::arg_idx(self, idx)
    }
}

impl Routable for Value {
    fn arg_idx(&self, idx: usize) -> Option<&[u8]> {
        match self {
            Value::Array(args) => match args.get(idx) {
                Some(Value::BulkString(ref data)) => Some(&data[..]),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Groups key positions by slot.  Positions keep their relative order inside
/// every group, and groups are ordered by slot.
pub(crate) fn group_by_slot<K: AsRef<[u8]>>(keys: &[K]) -> BTreeMap<u16, Vec<usize>> {
    let mut groups: BTreeMap<u16, Vec<usize>> = BTreeMap::new();
    for (idx, key) in keys.iter().enumerate() {
        groups.entry(get_slot(key.as_ref())).or_default().push(idx);
    }
    groups
}
