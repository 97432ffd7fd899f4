///
/// Connection and statement options.
///
/// `ConnectOptions` collects what `Engine::connect` accepts, `StatementOptions`
/// what `prepare` and `query` accept. Option names that arrive as text (CLI,
/// configuration) are parsed with the functions at the bottom of this
/// module; an unknown name is a domain error naming the option kind.
///

use std::str::FromStr;

use odbx_driver::{AccessMode, CursorType, FetchOrientation, OdbcVersion, PoolMode};

use crate::error::{OdbxError, Result};
use crate::null::NullPolicy;
use crate::types::{Encoding, HostType};
use crate::value::Value;

/// What `connect` does when a connection to the same DSN already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reuse the existing connection.
    Once,
    /// Always open a new one.
    Multiple,
}

impl FromStr for OpenMode {
    type Err = OdbxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "once" => Ok(OpenMode::Once),
            "multiple" => Ok(OpenMode::Multiple),
            other => Err(OdbxError::domain("open_mode", other)),
        }
    }
}

/// Whether rows are pulled by the cursor (`Auto`) or with explicit
/// `Engine::fetch` calls (`Fetch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    #[default]
    Auto,
    Fetch,
}

impl FromStr for FetchMode {
    type Err = OdbxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(FetchMode::Auto),
            "fetch" => Ok(FetchMode::Fetch),
            other => Err(OdbxError::domain("fetch", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    pub alias: Option<String>,
    /// Full driver connection string; excludes `user` and `password`.
    pub driver_string: Option<String>,
    pub encoding: Option<Encoding>,
    pub open: Option<OpenMode>,
    pub silent: Option<bool>,
    pub null: Option<NullPolicy>,
    pub auto_commit: Option<bool>,
    pub access_mode: Option<AccessMode>,
    pub cursor_type: Option<CursorType>,
    pub wide_column_threshold: Option<usize>,
    pub mars: bool,
    pub connection_pool_mode: Option<PoolMode>,
    pub odbc_version: Option<OdbcVersion>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn driver_string(mut self, driver_string: impl Into<String>) -> Self {
        self.driver_string = Some(driver_string.into());
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn open(mut self, open: OpenMode) -> Self {
        self.open = Some(open);
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = Some(silent);
        self
    }

    pub fn null(mut self, null: NullPolicy) -> Self {
        self.null = Some(null);
        self
    }

    pub fn auto_commit(mut self, on: bool) -> Self {
        self.auto_commit = Some(on);
        self
    }

    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = Some(mode);
        self
    }

    pub fn cursor_type(mut self, cursor: CursorType) -> Self {
        self.cursor_type = Some(cursor);
        self
    }

    pub fn wide_column_threshold(mut self, threshold: usize) -> Self {
        self.wide_column_threshold = Some(threshold);
        self
    }

    pub fn mars(mut self, on: bool) -> Self {
        self.mars = on;
        self
    }

    pub fn connection_pool_mode(mut self, mode: PoolMode) -> Self {
        self.connection_pool_mode = Some(mode);
        self
    }

    pub fn odbc_version(mut self, version: OdbcVersion) -> Self {
        self.odbc_version = Some(version);
        self
    }

    /// The options applied once the connection is open, in the order
    /// `set_connection` applies them.
    pub(crate) fn after_open(&self) -> Vec<ConnectionOption> {
        let mut after = Vec::new();
        if let Some(on) = self.auto_commit {
            after.push(ConnectionOption::AutoCommit(on));
        }
        if let Some(mode) = self.access_mode {
            after.push(ConnectionOption::AccessMode(mode));
        }
        if let Some(cursor) = self.cursor_type {
            after.push(ConnectionOption::CursorType(cursor));
        }
        after
    }
}

/// A setting changed on an open connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionOption {
    AutoCommit(bool),
    AccessMode(AccessMode),
    CursorType(CursorType),
    Silent(bool),
    Encoding(Encoding),
    Null(NullPolicy),
    WideColumnThreshold(usize),
}

/// Connection properties for `Engine::connection_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionInfo {
    DatabaseName,
    DbmsName,
    DbmsVersion,
    DriverName,
    DriverOdbcVersion,
    DriverVersion,
    ActiveStatements,
    Encoding,
}

impl ConnectionInfo {
    pub const ALL: [ConnectionInfo; 8] = [
        ConnectionInfo::DatabaseName,
        ConnectionInfo::DbmsName,
        ConnectionInfo::DbmsVersion,
        ConnectionInfo::DriverName,
        ConnectionInfo::DriverOdbcVersion,
        ConnectionInfo::DriverVersion,
        ConnectionInfo::ActiveStatements,
        ConnectionInfo::Encoding,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConnectionInfo::DatabaseName => "database_name",
            ConnectionInfo::DbmsName => "dbms_name",
            ConnectionInfo::DbmsVersion => "dbms_version",
            ConnectionInfo::DriverName => "driver_name",
            ConnectionInfo::DriverOdbcVersion => "driver_odbc_version",
            ConnectionInfo::DriverVersion => "driver_version",
            ConnectionInfo::ActiveStatements => "active_statements",
            ConnectionInfo::Encoding => "encoding",
        }
    }
}

impl FromStr for ConnectionInfo {
    type Err = OdbxError;

    fn from_str(s: &str) -> Result<Self> {
        ConnectionInfo::ALL
            .into_iter()
            .find(|info| info.name() == s)
            .ok_or_else(|| OdbxError::domain("odbc_option", s))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatementOptions {
    /// Host types of the result columns, fixing their number up front.
    pub types: Option<Vec<HostType>>,
    /// NULL representation owned by the statement.
    pub null: Option<NullPolicy>,
    /// Wrap every cell as `column(Table, Column, Value)`.
    pub source: bool,
    /// `(Template, row(V1, ..., Vn))`: collect all rows as instances of
    /// the template.
    pub findall: Option<(Value, Value)>,
    pub fetch: FetchMode,
    pub wide_column_threshold: Option<usize>,
}

impl StatementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(mut self, types: Vec<HostType>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn null(mut self, null: NullPolicy) -> Self {
        self.null = Some(null);
        self
    }

    pub fn source(mut self, on: bool) -> Self {
        self.source = on;
        self
    }

    pub fn findall(mut self, template: Value, row: Value) -> Self {
        self.findall = Some((template, row));
        self
    }

    pub fn fetch(mut self, mode: FetchMode) -> Self {
        self.fetch = mode;
        self
    }

    pub fn wide_column_threshold(mut self, threshold: usize) -> Self {
        self.wide_column_threshold = Some(threshold);
        self
    }
}

pub fn access_mode(name: &str) -> Result<AccessMode> {
    match name {
        "read" => Ok(AccessMode::ReadOnly),
        "update" => Ok(AccessMode::ReadWrite),
        other => Err(OdbxError::domain("access_mode", other)),
    }
}

pub fn cursor_type(name: &str) -> Result<CursorType> {
    match name {
        "dynamic" => Ok(CursorType::Dynamic),
        "forwards_only" => Ok(CursorType::ForwardOnly),
        "keyset_driven" => Ok(CursorType::KeysetDriven),
        "static" => Ok(CursorType::Static),
        other => Err(OdbxError::domain("cursor_type", other)),
    }
}

pub fn pool_mode(name: &str) -> Result<PoolMode> {
    match name {
        "strict" => Ok(PoolMode::Strict),
        "relaxed" => Ok(PoolMode::Relaxed),
        other => Err(OdbxError::domain("pool_mode", other)),
    }
}

pub fn odbc_version(name: &str) -> Result<OdbcVersion> {
    match name {
        "2.0" => Ok(OdbcVersion::V2),
        "3.0" => Ok(OdbcVersion::V3),
        "3.8" => Ok(OdbcVersion::V3_80),
        other => Err(OdbxError::domain("odbc_version", other)),
    }
}

/// `next`, `prior`, `first`, `last`, `absolute(N)`, `relative(N)` or
/// `bookmark(N)`.
pub fn fetch_orientation(spec: &str) -> Result<FetchOrientation> {
    let spec = spec.trim();
    let bad = || OdbxError::domain("fetch_option", spec);
    let (name, offset) = match spec.split_once('(') {
        Some((name, rest)) => {
            let arg = rest.strip_suffix(')').ok_or_else(bad)?;
            (name.trim(), Some(arg.trim().parse::<i64>().map_err(|_| bad())?))
        }
        None => (spec, None),
    };
    Ok(match (name, offset) {
        ("next", None) => FetchOrientation::Next,
        ("prior", None) => FetchOrientation::Prior,
        ("first", None) => FetchOrientation::First,
        ("last", None) => FetchOrientation::Last,
        ("absolute", Some(n)) => FetchOrientation::Absolute(n),
        ("relative", Some(n)) => FetchOrientation::Relative(n),
        ("bookmark", Some(n)) => FetchOrientation::Bookmark(n),
        _ => return Err(bad()),
    })
}
