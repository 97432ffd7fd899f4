///
/// Driver Handles
///
/// Handles are plain ids handed out by the driver. They are `Copy` so the
/// engine can keep a second reference to an executing statement for
/// cancellation without touching the statement itself.
///

use std::fmt;

/// An open driver session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnHandle(pub u64);

/// A driver statement, allocated on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtHandle(pub u64);

/// The handle diagnostics are requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagHandle {
    Env,
    Conn(ConnHandle),
    Stmt(StmtHandle),
}

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl fmt::Display for StmtHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt#{}", self.0)
    }
}

impl From<ConnHandle> for DiagHandle {
    fn from(h: ConnHandle) -> Self {
        DiagHandle::Conn(h)
    }
}

impl From<StmtHandle> for DiagHandle {
    fn from(h: StmtHandle) -> Self {
        DiagHandle::Stmt(h)
    }
}
