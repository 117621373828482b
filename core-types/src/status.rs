use std::fmt;

/// Engine error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusType {
    Ok,
    UnknownError,
    PreconditionError,
    Aborted,
    InvalidArgument,
    /// Operation accepted but not finished; never a terminal status.
    InProgress,
}

/// Status value returned by every engine entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    kind:   StatusType,
    reason: String,
}

impl Status {
    pub fn ok() -> Self {
        Self { kind: StatusType::Ok, reason: String::new() }
    }

    pub fn unknown_error(reason: impl Into<String>) -> Self {
        Self { kind: StatusType::UnknownError, reason: reason.into() }
    }

    pub fn precondition_error(reason: impl Into<String>) -> Self {
        Self { kind: StatusType::PreconditionError, reason: reason.into() }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self { kind: StatusType::Aborted, reason: reason.into() }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self { kind: StatusType::InvalidArgument, reason: reason.into() }
    }

    pub fn in_progress() -> Self {
        Self { kind: StatusType::InProgress, reason: String::new() }
    }

    pub fn is_ok(&self) -> bool {
        self.kind == StatusType::Ok
    }

    pub fn kind(&self) -> StatusType {
        self.kind
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            write!(f, "{:?}: {}", self.kind, self.reason)
        }
    }
}
