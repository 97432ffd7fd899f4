///
/// Open driver sessions.
///
/// A `Connection` is shared (`Arc`) between the connection registry and
/// every statement created on it. The settings a statement inherits are
/// copied when the statement is created; `set_connection` changes only
/// affect statements created afterwards.
///

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use odbx_driver::{ConnHandle, Driver, InfoType, InfoValue, SqlResult};
use tracing::{debug, warn};

use crate::error::OdbxError;
use crate::null::NullPolicy;
use crate::registry::lock;
use crate::report::driver_error;
use crate::types::Encoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}

/// A connection named by id or by alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRef {
    Id(ConnectionId),
    Alias(String),
}

impl From<ConnectionId> for ConnectionRef {
    fn from(id: ConnectionId) -> Self {
        ConnectionRef::Id(id)
    }
}

impl From<&str> for ConnectionRef {
    fn from(alias: &str) -> Self {
        ConnectionRef::Alias(alias.to_string())
    }
}

impl From<String> for ConnectionRef {
    fn from(alias: String) -> Self {
        ConnectionRef::Alias(alias)
    }
}

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRef::Id(id) => write!(f, "{id}"),
            ConnectionRef::Alias(alias) => f.write_str(alias),
        }
    }
}

/// What statements inherit from their connection.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub encoding: Encoding,
    pub null: Arc<NullPolicy>,
    pub silent: bool,
    pub wide_column_threshold: usize,
}

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    handle: ConnHandle,
    dsn: String,
    alias: Mutex<Option<String>>,
    settings: Mutex<Settings>,
    /// `SQL_MAX_QUALIFIER_NAME_LEN`; `None` if the driver could not tell.
    max_identifier_len: OnceLock<Option<usize>>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        handle: ConnHandle,
        dsn: &str,
        alias: Option<String>,
        settings: Settings,
    ) -> Self {
        Self {
            id,
            handle,
            dsn: dsn.to_string(),
            alias: Mutex::new(alias),
            settings: Mutex::new(settings),
            max_identifier_len: OnceLock::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn handle(&self) -> ConnHandle {
        self.handle
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn alias(&self) -> Option<String> {
        lock(&self.alias).clone()
    }

    /// The alias if there is one, the id otherwise.
    pub fn label(&self) -> String {
        self.alias().unwrap_or_else(|| self.id.to_string())
    }

    pub fn encoding(&self) -> Encoding {
        lock(&self.settings).encoding
    }

    pub(crate) fn set_alias(&self, alias: &str) {
        *lock(&self.alias) = Some(alias.to_string());
    }

    pub(crate) fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut Settings)) {
        f(&mut lock(&self.settings));
    }

    /// Fetched from the driver on first use and cached, failures included.
    pub(crate) fn max_identifier_len(&self, driver: &dyn Driver) -> Option<usize> {
        *self.max_identifier_len.get_or_init(|| {
            match driver.get_info(self.handle, InfoType::MaxQualifierNameLen) {
                SqlResult::Success(InfoValue::Small(len)) | SqlResult::SuccessWithInfo(InfoValue::Small(len)) => {
                    debug!(connection = %self.id, len, "max qualifier name length");
                    Some(usize::from(len))
                }
                SqlResult::Error { function } => {
                    let err = driver_error(driver, self.handle.into(), function);
                    warn!(connection = %self.id, error = %err, "max qualifier name length unavailable");
                    None
                }
                other => {
                    let err = OdbxError::context("get_info", format!("unexpected answer {other:?}"));
                    warn!(connection = %self.id, error = %err, "max qualifier name length unavailable");
                    None
                }
            }
        })
    }
}
