use std::{
    io::{self, Read},
    str,
};

use crate::errors::{ErrorKind, RedisError, RedisResult, ServerError};
use crate::types::Value;

use combine::{
    any,
    error::StreamError,
    opaque,
    parser::{
        byte::{crlf, take_until_bytes},
        combinator::{any_send_sync_partial_state, AnySendSyncPartialState},
        range::{recognize, take},
    },
    stream::{PointerOffset, RangeStream, StreamErrorFor},
    ParseError, Parser as _,
};

const MAX_RECURSE_DEPTH: usize = 100;

fn value<'a, I>(
    count: Option<usize>,
) -> impl combine::Parser<I, Output = Value, PartialState = AnySendSyncPartialState>
where
    I: RangeStream<Token = u8, Range = &'a [u8]>,
    I::Error: combine::ParseError<u8, &'a [u8], I::Position>,
{
    let count = count.unwrap_or(1);

    opaque!(any_send_sync_partial_state(
        any()
            .then_partial(move |&mut b| {
                if b == b'*' && count > MAX_RECURSE_DEPTH {
                    combine::unexpected_any("Maximum recursion depth exceeded").left()
                } else {
                    combine::value(b).right()
                }
            })
            .then_partial(move |&mut b| {
                let line = || {
                    recognize(take_until_bytes(&b"\r\n"[..]).with(take(2).map(|_| ()))).and_then(
                        |line: &[u8]| {
                            str::from_utf8(&line[..line.len() - 2])
                                .map_err(StreamErrorFor::<I>::other)
                        },
                    )
                };

                let simple_string = || {
                    line().map(|line| {
                        if line == "OK" {
                            Value::Okay
                        } else {
                            Value::SimpleString(line.into())
                        }
                    })
                };

                let int = || {
                    line().and_then(|line| {
                        line.trim().parse::<i64>().map_err(|_| {
                            StreamErrorFor::<I>::message_static_message(
                                "Expected integer, got garbage",
                            )
                        })
                    })
                };

                // -1 is the only null length
                let length = || {
                    int().and_then(|length| {
                        if length < -1 {
                            Err(StreamErrorFor::<I>::message_static_message(
                                "Negative length other than -1",
                            ))
                        } else {
                            Ok(length)
                        }
                    })
                };

                let bulk_string = || {
                    length().then_partial(move |size| {
                        if *size < 0 {
                            combine::produce(|| Value::Nil).left()
                        } else {
                            take(*size as usize)
                                .map(|bs: &[u8]| Value::BulkString(bs.to_vec()))
                                .skip(crlf())
                                .right()
                        }
                    })
                };

                let array = || {
                    length().then_partial(move |&mut length| {
                        if length < 0 {
                            combine::produce(|| Value::NilArray).left()
                        } else {
                            let length = length as usize;
                            combine::count_min_max(length, length, value(Some(count + 1)))
                                .map(Value::Array)
                                .right()
                        }
                    })
                };

                let error = || line().map(ServerError::from_line);

                combine::dispatch!(b;
                    b'+' => simple_string(),
                    b':' => int().map(Value::Int),
                    b'$' => bulk_string(),
                    b'*' => array(),
                    b'-' => error().map(Value::ServerError),
                    b => combine::unexpected_any(combine::error::Token(b))
                )
            })
    ))
}

/// The internal redis response parser.
pub struct Parser {
    decoder: combine::stream::decoder::Decoder<AnySendSyncPartialState, PointerOffset<[u8]>>,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

/// The parser can be used to parse redis responses into values.  Generally
/// you normally do not use this directly as it's already done for you by
/// the client but in some more complex situations it might be useful to be
/// able to parse the redis responses.
impl Parser {
    /// Creates a new parser that parses the data behind the reader.  More
    /// than one value can be behind the reader in which case the parser can
    /// be invoked multiple times.  In other words: the stream does not have
    /// to be terminated.
    pub fn new() -> Parser {
        Parser {
            decoder: combine::stream::decoder::Decoder::new(),
        }
    }

    /// Parses synchronously into a single value from the reader.
    ///
    /// Error replies come back as `Ok(Value::ServerError(..))`.  A reader that
    /// ends before a full value was read yields an `UnexpectedEof` I/O error,
    /// malformed framing yields `ErrorKind::ParseError`.
    pub fn parse_value<T: Read>(&mut self, mut reader: T) -> RedisResult<Value> {
        let mut decoder = &mut self.decoder;
        let result = combine::decode!(decoder, reader, value(None), |input, _| {
            combine::stream::easy::Stream::from(input)
        });
        match result {
            Err(err) => Err(match err {
                combine::stream::decoder::Error::Io { error, .. } => error.into(),
                combine::stream::decoder::Error::Parse(err) => {
                    if err.is_unexpected_end_of_input() {
                        RedisError::from(io::Error::from(io::ErrorKind::UnexpectedEof))
                    } else {
                        let err = err
                            .map_range(|range| format!("{range:?}"))
                            .map_position(|pos| pos.translate_position(decoder.buffer()))
                            .to_string();
                        RedisError::from((ErrorKind::ParseError, "parse error", err))
                    }
                }
            }),
            Ok(result) => Ok(result),
        }
    }
}

/// Parses bytes into a redis value.
///
/// This is the most straightforward way to parse something into a low
/// level redis value instead of having to use a whole parser.
pub fn parse_redis_value(bytes: &[u8]) -> RedisResult<Value> {
    let mut parser = Parser::new();
    parser.parse_value(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServerErrorKind;

    #[test]
    fn parse_nested_error_and_handle_more_inputs() {
        let bytes = b"*3\r\n+OK\r\n-LOADING server is loading\r\n+OK\r\n";
        let result = parse_redis_value(bytes).unwrap();

        assert_eq!(
            result,
            Value::Array(vec![
                Value::Okay,
                Value::ServerError(ServerError::from_line("LOADING server is loading")),
                Value::Okay,
            ])
        );
        let err = result.extract_error().unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::ServerError(ServerErrorKind::BusyLoading)
        );

        let result = parse_redis_value(b"+OK\r\n").unwrap();
        assert_eq!(result, Value::Okay);
    }

    #[test]
    fn decode_scalars() {
        assert_eq!(
            parse_redis_value(b"+PONG\r\n").unwrap(),
            Value::SimpleString("PONG".into())
        );
        assert_eq!(parse_redis_value(b":-42\r\n").unwrap(), Value::Int(-42));
        assert_eq!(
            parse_redis_value(b"$5\r\nhello\r\n").unwrap(),
            Value::BulkString(b"hello".to_vec())
        );
        assert_eq!(
            parse_redis_value(b"$0\r\n\r\n").unwrap(),
            Value::BulkString(vec![])
        );
    }

    #[test]
    fn bulk_strings_are_binary_safe() {
        assert_eq!(
            parse_redis_value(b"$4\r\na\r\nb\r\n").unwrap(),
            Value::BulkString(b"a\r\nb".to_vec())
        );
    }

    #[test]
    fn decode_nulls() {
        assert_eq!(parse_redis_value(b"$-1\r\n").unwrap(), Value::Nil);
        assert_eq!(parse_redis_value(b"*-1\r\n").unwrap(), Value::NilArray);
        assert_eq!(parse_redis_value(b"*0\r\n").unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn negative_lengths_other_than_null_are_parse_errors() {
        for bytes in [&b"$-2\r\n"[..], &b"*-7\r\n"[..], &b"*1\r\n$-5\r\n"[..]] {
            let err = parse_redis_value(bytes).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ParseError, "{bytes:?}");
        }
    }

    #[test]
    fn decode_nested_arrays() {
        let val = parse_redis_value(b"*2\r\n*2\r\n:1\r\n$1\r\na\r\n*-1\r\n").unwrap();
        assert_eq!(
            val,
            Value::Array(vec![
                Value::Array(vec![Value::Int(1), Value::BulkString(b"a".to_vec())]),
                Value::NilArray,
            ])
        );
    }

    #[test]
    fn error_replies_are_values() {
        let val = parse_redis_value(b"-MOVED 3999 127.0.0.1:6381\r\n").unwrap();
        let Value::ServerError(err) = val else {
            panic!("expected a server error, got {val:?}");
        };
        assert_eq!(err.kind(), Some(ServerErrorKind::Moved));
        assert_eq!(err.details(), Some("3999 127.0.0.1:6381"));
    }

    #[test]
    fn unknown_type_byte_is_a_parse_error() {
        let err = parse_redis_value(b"?what\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn garbage_integer_is_a_parse_error() {
        let err = parse_redis_value(b":abc\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn truncated_input_is_an_io_error() {
        for bytes in [
            &b"$10\r\nhello"[..],
            &b"*3\r\n:1\r\n:2\r\n"[..],
            &b"+OK"[..],
            &b""[..],
        ] {
            let err = parse_redis_value(bytes).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::IoError, "{bytes:?}");
            assert_eq!(
                err.as_io_error().map(|e| e.kind()),
                Some(io::ErrorKind::UnexpectedEof)
            );
        }
    }

    #[test]
    fn parser_reads_consecutive_values() {
        let mut parser = Parser::new();
        let mut bytes = &b"+OK\r\n:1\r\n$-1\r\n"[..];
        assert_eq!(parser.parse_value(&mut bytes).unwrap(), Value::Okay);
        assert_eq!(parser.parse_value(&mut bytes).unwrap(), Value::Int(1));
        assert_eq!(parser.parse_value(&mut bytes).unwrap(), Value::Nil);
    }

    #[test]
    fn test_max_recursion_depth() {
        let mut bytes = b"*1\r\n".repeat(MAX_RECURSE_DEPTH + 5);
        bytes.extend_from_slice(b":1\r\n");
        match parse_redis_value(&bytes) {
            Ok(_) => panic!("Expected Err"),
            Err(e) => assert!(matches!(e.kind(), ErrorKind::ParseError)),
        }

        let mut bytes = b"*1\r\n".repeat(MAX_RECURSE_DEPTH / 2);
        bytes.extend_from_slice(b":1\r\n");
        assert!(parse_redis_value(&bytes).is_ok());
    }
}
