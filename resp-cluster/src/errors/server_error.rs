use arcstr::ArcStr;
use std::fmt;

/// Kinds of errors returned from the server
#[derive(PartialEq, Debug, Clone, Copy, Eq)]
#[non_exhaustive]
pub enum ServerErrorKind {
    /// The server generated an invalid response, or returned a general error.
    ResponseError,
    /// A script execution was aborted.
    ExecAbort,
    /// The server cannot response because it's loading a dump.
    BusyLoading,
    /// A script that was requested does not actually exist.
    NoScript,
    /// Raised if a key moved to a different node.
    Moved,
    /// Raised if a key moved to a different node but we need to ask.
    Ask,
    /// Raised if a request needs to be retried.
    TryAgain,
    /// Raised if the cluster is down.
    ClusterDown,
    /// A request spans multiple slots
    CrossSlot,
    /// A cluster master is unavailable.
    MasterDown,
    /// Attempt to write to a read-only server
    ReadOnly,
    /// Attempted to use a command without ACL permission.
    NoPerm,
    /// The supplied credentials were rejected.
    WrongPass,
    /// The command requires authentication first.
    NoAuth,
}

impl ServerErrorKind {
    pub(crate) fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "ERR" => Self::ResponseError,
            "EXECABORT" => Self::ExecAbort,
            "LOADING" => Self::BusyLoading,
            "NOSCRIPT" => Self::NoScript,
            "MOVED" => Self::Moved,
            "ASK" => Self::Ask,
            "TRYAGAIN" => Self::TryAgain,
            "CLUSTERDOWN" => Self::ClusterDown,
            "CROSSSLOT" => Self::CrossSlot,
            "MASTERDOWN" => Self::MasterDown,
            "READONLY" => Self::ReadOnly,
            "NOPERM" => Self::NoPerm,
            "WRONGPASS" => Self::WrongPass,
            "NOAUTH" => Self::NoAuth,
            _ => return None,
        })
    }

    pub(crate) fn code(&self) -> &'static str {
        match self {
            Self::ResponseError => "ERR",
            Self::ExecAbort => "EXECABORT",
            Self::BusyLoading => "LOADING",
            Self::NoScript => "NOSCRIPT",
            Self::Moved => "MOVED",
            Self::Ask => "ASK",
            Self::TryAgain => "TRYAGAIN",
            Self::ClusterDown => "CLUSTERDOWN",
            Self::CrossSlot => "CROSSSLOT",
            Self::MasterDown => "MASTERDOWN",
            Self::ReadOnly => "READONLY",
            Self::NoPerm => "NOPERM",
            Self::WrongPass => "WRONGPASS",
            Self::NoAuth => "NOAUTH",
        }
    }
}

/// An error that was returned from the server
#[derive(PartialEq, Debug, Clone)]
pub struct ServerError(pub(crate) Repr);

#[derive(PartialEq, Debug, Clone)]
pub(crate) enum Repr {
    Extension {
        code: ArcStr,
        detail: Option<ArcStr>,
    },
    Known {
        kind: ServerErrorKind,
        detail: Option<ArcStr>,
    },
}

impl ServerError {
    /// Builds a server error from the text of a `-` reply line, e.g. `MOVED 3999 127.0.0.1:6381`.
    pub fn from_line(line: &str) -> ServerError {
        let mut pieces = line.splitn(2, ' ');
        let code = pieces.next().unwrap_or_default();
        let detail = pieces.next().map(ArcStr::from);
        match ServerErrorKind::from_code(code) {
            Some(kind) => ServerError(Repr::Known { kind, detail }),
            None => ServerError(Repr::Extension {
                code: code.into(),
                detail,
            }),
        }
    }

    /// Returns the kind of error. If `None`, try `ServerError::code` to get the error code.
    pub fn kind(&self) -> Option<ServerErrorKind> {
        match &self.0 {
            Repr::Extension { .. } => None,
            Repr::Known { kind, .. } => Some(*kind),
        }
    }

    /// The error code returned from the server
    pub fn code(&self) -> &str {
        match &self.0 {
            Repr::Extension { code, .. } => code,
            Repr::Known { kind, .. } => kind.code(),
        }
    }

    /// Additional details about the error, if exist
    pub fn details(&self) -> Option<&str> {
        match &self.0 {
            Repr::Extension { detail, .. } => detail.as_ref().map(|str| str.as_str()),
            Repr::Known { detail, .. } => detail.as_ref().map(|str| str.as_str()),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())?;
        if let Some(detail) = self.details() {
            f.write_str(" ")?;
            f.write_str(detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}
