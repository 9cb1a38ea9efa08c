#![allow(dead_code)]

use std::io::{BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use resp_cluster::Cmd;

pub mod mock_cluster;

pub use mock_cluster::*;

/// What a scripted server does after reading one expected command.
pub enum Reply {
    /// Writes the bytes.
    Bytes(&'static [u8]),
    /// Writes the bytes, waits, then writes the rest.
    Split(&'static [u8], Duration, &'static [u8]),
    /// Writes nothing and holds the socket open for the duration.
    Stall(Duration),
}

/// A single connection server on a free local port that expects the
/// given commands in order and answers each of them.  The socket is closed
/// once the script is done.
pub fn fake_server(script: Vec<(Cmd, Reply)>) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        for (expected, reply) in script {
            let expected = expected.get_packed_command();
            let mut buf = vec![0; expected.len()];
            reader.read_exact(&mut buf).unwrap();
            assert_eq!(
                String::from_utf8_lossy(&buf),
                String::from_utf8_lossy(&expected)
            );
            match reply {
                Reply::Bytes(bytes) => stream.write_all(bytes).unwrap(),
                Reply::Split(head, pause, tail) => {
                    stream.write_all(head).unwrap();
                    thread::sleep(pause);
                    // the client may already have hung up
                    let _ = stream.write_all(tail);
                }
                Reply::Stall(pause) => thread::sleep(pause),
            }
        }
    });
    (port, handle)
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
