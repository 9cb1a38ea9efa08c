use std::{error, fmt, io, str::Utf8Error, string::FromUtf8Error};

use arcstr::ArcStr;

use crate::errors::server_error::{ServerError, ServerErrorKind};

/// An enum of all error kinds.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The parser failed to parse the server response.
    ParseError,
    /// The authentication with the server failed.
    AuthenticationFailed,
    /// Operation failed because of a type mismatch.
    UnexpectedReturnType,
    /// An error that was caused because the parameter to the
    /// client were wrong.
    InvalidClientConfig,
    /// This kind is returned if the redis error is one that is
    /// not native to the system.  This is usually the case if
    /// the cause is another error.
    IoError,
    /// An error raised that was identified on the client before execution.
    ClientError,
    /// An extension error.  This is an error created by the server
    /// that is not directly understood by the library.
    ExtensionError,
    /// An error returned from the server
    ServerError(ServerErrorKind),
    /// A single call was redirected more often than the configured bound allows.
    ClusterRedirectExhausted,
}

/// The coarse class an error belongs to.
///
/// Every failure of the library falls into exactly one class, which tells the
/// caller what state the involved connection is in and whether anything can be
/// gained from trying again.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ErrorClass {
    /// Transport or handshake failure. The connection is gone and must be
    /// re-established by the caller.
    Connection,
    /// The byte stream did not follow RESP framing. The connection was closed.
    Protocol,
    /// A well formed error reply from the server, passed through verbatim.
    Server,
    /// More redirects happened for one call than the configured bound.
    ClusterRedirectExhausted,
    /// Raised by the client itself, either before a request was sent (bad
    /// configuration) or while converting a reply into a Rust type.
    Client,
}

/// Represents a redis error.
///
/// For the most part you should be using the Error trait to interact with this
/// rather than the actual struct.
pub struct RedisError {
    repr: ErrorRepr,
}

#[derive(Debug)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, ArcStr),
    IoError(io::Error),
    ServerError(ServerError),
}

impl PartialEq for RedisError {
    fn eq(&self, other: &RedisError) -> bool {
        match (&self.repr, &other.repr) {
            (&ErrorRepr::WithDescription(kind_a, _), &ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                &ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                &ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::ServerError(a), ErrorRepr::ServerError(b)) => *a == *b,
            _ => false,
        }
    }
}

impl From<io::Error> for RedisError {
    fn from(err: io::Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::IoError(err),
        }
    }
}

impl From<Utf8Error> for RedisError {
    fn from(_: Utf8Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(ErrorKind::UnexpectedReturnType, "Invalid UTF-8"),
        }
    }
}

impl From<FromUtf8Error> for RedisError {
    fn from(_: FromUtf8Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(ErrorKind::UnexpectedReturnType, "Cannot convert from UTF-8"),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RedisError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for RedisError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail.into()),
        }
    }
}

impl From<ServerError> for RedisError {
    fn from(err: ServerError) -> Self {
        Self {
            repr: ErrorRepr::ServerError(err),
        }
    }
}

impl From<ServerErrorKind> for ErrorKind {
    fn from(kind: ServerErrorKind) -> Self {
        ErrorKind::ServerError(kind)
    }
}

#[cfg(feature = "tls-native-tls")]
impl From<native_tls::Error> for RedisError {
    fn from(err: native_tls::Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "TLS error",
                err.to_string().into(),
            ),
        }
    }
}

impl error::Error for RedisError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::IoError(err) => Some(err),
            ErrorRepr::ServerError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Debug for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, detail) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::IoError(err) => err.fmt(f),
            ErrorRepr::ServerError(err) => err.fmt(f),
        }
    }
}

/// Indicates a general failure in the library.
impl RedisError {
    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => *kind,
            ErrorRepr::IoError(_) => ErrorKind::IoError,
            ErrorRepr::ServerError(err) => match err.kind() {
                Some(kind) => ErrorKind::ServerError(kind),
                None => ErrorKind::ExtensionError,
            },
        }
    }

    /// Returns the coarse class of the error.
    pub fn class(&self) -> ErrorClass {
        match self.kind() {
            ErrorKind::IoError | ErrorKind::AuthenticationFailed => ErrorClass::Connection,
            ErrorKind::ParseError => ErrorClass::Protocol,
            ErrorKind::ServerError(_) | ErrorKind::ExtensionError => ErrorClass::Server,
            ErrorKind::ClusterRedirectExhausted => ErrorClass::ClusterRedirectExhausted,
            ErrorKind::InvalidClientConfig
            | ErrorKind::UnexpectedReturnType
            | ErrorKind::ClientError => ErrorClass::Client,
        }
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, detail) => Some(detail.as_str()),
            ErrorRepr::ServerError(err) => err.details(),
            _ => None,
        }
    }

    /// Returns the raw error code if available.
    pub fn code(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::ServerError(err) => Some(err.code()),
            _ => None,
        }
    }

    /// Returns the name of the error category for display purposes.
    pub fn category(&self) -> &str {
        match self.kind() {
            ErrorKind::ServerError(ServerErrorKind::ResponseError) => "response error",
            ErrorKind::ServerError(ServerErrorKind::ExecAbort) => "script execution aborted",
            ErrorKind::ServerError(ServerErrorKind::BusyLoading) => "busy loading",
            ErrorKind::ServerError(ServerErrorKind::NoScript) => "no script",
            ErrorKind::ServerError(ServerErrorKind::Moved) => "key moved",
            ErrorKind::ServerError(ServerErrorKind::Ask) => "key moved (ask)",
            ErrorKind::ServerError(ServerErrorKind::TryAgain) => "try again",
            ErrorKind::ServerError(ServerErrorKind::ClusterDown) => "cluster down",
            ErrorKind::ServerError(ServerErrorKind::CrossSlot) => "cross-slot",
            ErrorKind::ServerError(ServerErrorKind::MasterDown) => "master down",
            ErrorKind::ServerError(ServerErrorKind::ReadOnly) => "read-only",
            ErrorKind::ServerError(ServerErrorKind::NoPerm) => "no permission",
            ErrorKind::ServerError(ServerErrorKind::WrongPass) => "wrong password",
            ErrorKind::ServerError(ServerErrorKind::NoAuth) => "authentication required",
            ErrorKind::AuthenticationFailed => "authentication failed",
            ErrorKind::UnexpectedReturnType => "type error",
            ErrorKind::InvalidClientConfig => "invalid client config",
            ErrorKind::IoError => "I/O error",
            ErrorKind::ExtensionError => "extension error",
            ErrorKind::ClientError => "client error",
            ErrorKind::ParseError => "parse error",
            ErrorKind::ClusterRedirectExhausted => "too many redirects",
        }
    }

    /// Indicates that this failure is an IO failure.
    pub fn is_io_error(&self) -> bool {
        self.kind() == ErrorKind::IoError
    }

    pub(crate) fn as_io_error(&self) -> Option<&io::Error> {
        match &self.repr {
            ErrorRepr::IoError(e) => Some(e),
            _ => None,
        }
    }

    /// Indicates that this is a cluster error.
    pub fn is_cluster_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ServerError(ServerErrorKind::Moved)
                | ErrorKind::ServerError(ServerErrorKind::Ask)
                | ErrorKind::ServerError(ServerErrorKind::TryAgain)
                | ErrorKind::ServerError(ServerErrorKind::ClusterDown)
                | ErrorKind::ClusterRedirectExhausted
        )
    }

    /// Returns true if this error indicates that the connection was
    /// refused.  You should generally not rely much on this function
    /// unless you are writing unit tests that want to detect if a
    /// local server is available.
    pub fn is_connection_refusal(&self) -> bool {
        match self.repr {
            ErrorRepr::IoError(ref err) => err.kind() == io::ErrorKind::ConnectionRefused,
            _ => false,
        }
    }

    /// Returns true if error was caused by I/O time out.
    /// Note that this may not be accurate depending on platform.
    pub fn is_timeout(&self) -> bool {
        match self.repr {
            ErrorRepr::IoError(ref err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Returns true if error was caused by a dropped connection.
    pub fn is_connection_dropped(&self) -> bool {
        match self.repr {
            ErrorRepr::IoError(ref err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Returns true if the connection that produced this error can no longer be used.
    pub fn is_unrecoverable_error(&self) -> bool {
        matches!(self.class(), ErrorClass::Connection | ErrorClass::Protocol)
    }

    /// Returns the node the error refers to.
    ///
    /// This returns `(addr, slot_id)`.
    pub fn redirect_node(&self) -> Option<(&str, u16)> {
        match self.kind() {
            ErrorKind::ServerError(ServerErrorKind::Ask)
            | ErrorKind::ServerError(ServerErrorKind::Moved) => (),
            _ => return None,
        }
        let mut iter = self.detail()?.split_ascii_whitespace();
        let slot_id: u16 = iter.next()?.parse().ok()?;
        let addr = iter.next()?;
        Some((addr, slot_id))
    }
}

/// Library generic result type.
pub type RedisResult<T> = Result<T, RedisError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_redis_value;

    #[test]
    fn test_redirect_node() {
        let err = parse_redis_value(b"-ASK 123 foobar:6380\r\n")
            .unwrap()
            .extract_error()
            .unwrap_err();
        let node = err.redirect_node();

        assert_eq!(node, Some(("foobar:6380", 123)));
    }

    #[test]
    fn redirect_node_ignores_other_errors() {
        let err = parse_redis_value(b"-ERR 123 foobar:6380\r\n")
            .unwrap()
            .extract_error()
            .unwrap_err();
        assert_eq!(err.redirect_node(), None);
    }

    #[test]
    fn classes_follow_kinds() {
        let io = RedisError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(io.class(), ErrorClass::Connection);
        assert!(io.is_connection_dropped());

        let parse = RedisError::from((ErrorKind::ParseError, "parse error"));
        assert_eq!(parse.class(), ErrorClass::Protocol);
        assert!(parse.is_unrecoverable_error());

        let server = RedisError::from(ServerError::from_line("ERR unknown command"));
        assert_eq!(server.class(), ErrorClass::Server);
        assert_eq!(server.code(), Some("ERR"));
        assert_eq!(server.detail(), Some("unknown command"));
        assert!(!server.is_unrecoverable_error());

        let exhausted = RedisError::from((
            ErrorKind::ClusterRedirectExhausted,
            "Too many redirects",
        ));
        assert_eq!(exhausted.class(), ErrorClass::ClusterRedirectExhausted);
        assert!(exhausted.is_cluster_error());

        let config = RedisError::from((ErrorKind::InvalidClientConfig, "bad"));
        assert_eq!(config.class(), ErrorClass::Client);
    }

    #[test]
    fn extension_errors_keep_their_code() {
        let err = RedisError::from(ServerError::from_line("BUSYGROUP group exists"));
        assert_eq!(err.kind(), ErrorKind::ExtensionError);
        assert_eq!(err.code(), Some("BUSYGROUP"));
        assert_eq!(err.to_string(), "BUSYGROUP group exists");
    }
}
