///
/// The engine.
///
/// `Engine` is the entry point applications use. It owns the driver, the
/// configuration, both process-wide registries and the table of prepared
/// statements, and is meant to be shared between worker threads
/// (`Arc<Engine>` or a scoped borrow).
///
/// Connections are named by `ConnectionRef` (id or alias), prepared
/// statements by `StatementId`. Ad-hoc queries and catalog listings are
/// not registered: their statement lives exactly as long as the returned
/// `Cursor` keeps it open.
///

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use odbx_driver::{
    Completion, ConnectAttr, ConnectRequest, DiagHandle, Driver, FetchOrientation, InfoType, InfoValue, OdbcVersion,
    SqlResult,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::connection::{Connection, ConnectionId, ConnectionRef, Settings};
use crate::cursor::Cursor;
use crate::error::{OdbxError, Result};
use crate::options::{ConnectOptions, ConnectionInfo, ConnectionOption, OpenMode, StatementOptions};
use crate::registry::{ConnectionRegistry, ExecutingRegistry, lock};
use crate::report::{self, driver_error};
use crate::statement::{Counters, Flags, StatementContext, StatementId, Statistics};
use crate::types::ParamSpec;
use crate::value::{Row, Value};

type SharedContext = Arc<Mutex<StatementContext>>;

/// Result of an explicit `fetch`.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Row(Row),
    Affected(i64),
    EndOfFile,
}

/// An entry of `current_connections`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub alias: Option<String>,
    pub dsn: String,
}

impl ConnectionEntry {
    pub fn label(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.id.to_string())
    }
}

pub struct Engine {
    driver: Arc<dyn Driver>,
    config: EngineConfig,
    connections: ConnectionRegistry,
    executing: ExecutingRegistry,
    statements: Mutex<HashMap<StatementId, SharedContext>>,
    freed: Mutex<HashSet<StatementId>>,
    counters: Arc<Counters>,
    next_connection: AtomicU64,
    next_statement: AtomicU64,
}

impl Engine {
    pub fn new(driver: Arc<dyn Driver>, config: EngineConfig) -> Self {
        Self {
            driver,
            config,
            connections: ConnectionRegistry::new(),
            executing: ExecutingRegistry::new(),
            statements: Mutex::new(HashMap::new()),
            freed: Mutex::new(HashSet::new()),
            counters: Arc::new(Counters::default()),
            next_connection: AtomicU64::new(1),
            next_statement: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn next_statement_id(&self) -> StatementId {
        StatementId(self.next_statement.fetch_add(1, Ordering::Relaxed))
    }

    fn context(&self, conn: Arc<Connection>) -> Result<StatementContext> {
        StatementContext::new(
            self.next_statement_id(),
            conn,
            Arc::clone(&self.driver),
            Arc::clone(&self.counters),
        )
    }

    // Connections

    pub fn connect(&self, dsn: &str, options: ConnectOptions) -> Result<ConnectionId> {
        if options.driver_string.is_some() {
            for (name, given) in [("user", options.user.is_some()), ("password", options.password.is_some())] {
                if given {
                    return Err(OdbxError::context(
                        "driver_string",
                        format!("option {name} cannot be combined with driver_string"),
                    ));
                }
            }
        }
        let open = options
            .open
            .unwrap_or(if options.alias.is_some() { OpenMode::Once } else { OpenMode::Multiple });
        if open == OpenMode::Once {
            if let Some(existing) = self.connections.find_dsn(dsn) {
                if let Some(alias) = &options.alias {
                    self.connections.assign_alias(&existing, alias)?;
                }
                debug!(connection = %existing.id(), dsn, "reusing open connection");
                return Ok(existing.id());
            }
        }
        if let Some(alias) = &options.alias {
            if self.connections.get(&ConnectionRef::from(alias.as_str())).is_ok() {
                return Err(OdbxError::Permission {
                    action: "reuse",
                    kind: "connection_alias",
                    name: alias.clone(),
                });
            }
        }

        let request = ConnectRequest {
            dsn: dsn.to_string(),
            user: options.user.clone(),
            password: options.password.clone(),
            driver_string: options.driver_string.clone(),
            odbc_version: options.odbc_version.unwrap_or(OdbcVersion::V3),
            mars: options.mars,
            pool_mode: options.connection_pool_mode,
        };
        let silent = options.silent.unwrap_or(self.config.silent);
        let handle = match self.driver.connect(&request) {
            SqlResult::Success(handle) => handle,
            SqlResult::SuccessWithInfo(handle) => {
                if !silent {
                    report::log_notices(&*self.driver, DiagHandle::Conn(handle));
                }
                handle
            }
            SqlResult::Error { function } => return Err(driver_error(&*self.driver, DiagHandle::Env, function)),
            other => return Err(OdbxError::context("connect", format!("unexpected answer {other:?}"))),
        };

        let settings = Settings {
            encoding: options.encoding.unwrap_or(self.config.encoding),
            null: Arc::new(options.null.clone().unwrap_or_else(|| self.config.null_policy())),
            silent,
            wide_column_threshold: options
                .wide_column_threshold
                .unwrap_or(self.config.wide_column_threshold),
        };
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let conn = Arc::new(Connection::new(id, handle, dsn, options.alias.clone(), settings));
        if let Err(err) = self.connections.insert(Arc::clone(&conn)) {
            self.drop_connection(&conn);
            return Err(err);
        }
        for option in options.after_open() {
            if let Err(err) = self.apply(&conn, option) {
                self.connections.remove(id);
                self.drop_connection(&conn);
                return Err(err);
            }
        }
        info!(connection = %id, dsn, alias = conn.alias().as_deref(), "connected");
        Ok(id)
    }

    fn drop_connection(&self, conn: &Connection) {
        if let SqlResult::Error { function } = self.driver.disconnect(conn.handle()) {
            let err = driver_error(&*self.driver, conn.handle().into(), function);
            warn!(connection = %conn.id(), error = %err, "disconnect failed");
        }
    }

    pub fn disconnect(&self, conn: impl Into<ConnectionRef>) -> Result<()> {
        let conn = self.connections.get(&conn.into())?;
        let silent = conn.settings().silent;
        report::require(&*self.driver, conn.handle().into(), silent, self.driver.disconnect(conn.handle()))?;
        self.connections.remove(conn.id());
        info!(connection = %conn.id(), "disconnected");
        Ok(())
    }

    pub fn set_connection(&self, conn: impl Into<ConnectionRef>, option: ConnectionOption) -> Result<()> {
        let conn = self.connections.get(&conn.into())?;
        self.apply(&conn, option)
    }

    fn apply(&self, conn: &Connection, option: ConnectionOption) -> Result<()> {
        let attr = match option {
            ConnectionOption::AutoCommit(on) => ConnectAttr::AutoCommit(on),
            ConnectionOption::AccessMode(mode) => ConnectAttr::AccessMode(mode),
            ConnectionOption::CursorType(cursor) => ConnectAttr::CursorType(cursor),
            ConnectionOption::Silent(on) => {
                conn.update(|s| s.silent = on);
                return Ok(());
            }
            ConnectionOption::Encoding(encoding) => {
                conn.update(|s| s.encoding = encoding);
                return Ok(());
            }
            ConnectionOption::Null(policy) => {
                conn.update(|s| s.null = Arc::new(policy));
                return Ok(());
            }
            ConnectionOption::WideColumnThreshold(threshold) => {
                if threshold == 0 {
                    return Err(OdbxError::domain("wide_column_threshold", threshold));
                }
                conn.update(|s| s.wide_column_threshold = threshold);
                return Ok(());
            }
        };
        debug!(connection = %conn.id(), ?attr, "set connect attribute");
        let silent = conn.settings().silent;
        report::require(
            &*self.driver,
            conn.handle().into(),
            silent,
            self.driver.set_connect_attr(conn.handle(), attr),
        )
    }

    pub fn connection_info(&self, conn: impl Into<ConnectionRef>, info: ConnectionInfo) -> Result<Value> {
        let conn = self.connections.get(&conn.into())?;
        self.info(&conn, info)
    }

    /// Every property the driver can tell; failing ones are left out.
    pub fn connection_infos(&self, conn: impl Into<ConnectionRef>) -> Result<Vec<(ConnectionInfo, Value)>> {
        let conn = self.connections.get(&conn.into())?;
        let mut infos = Vec::new();
        for info in ConnectionInfo::ALL {
            match self.info(&conn, info) {
                Ok(value) => infos.push((info, value)),
                Err(err) => debug!(connection = %conn.id(), info = info.name(), error = %err, "skipped"),
            }
        }
        Ok(infos)
    }

    fn info(&self, conn: &Connection, info: ConnectionInfo) -> Result<Value> {
        let info_type = match info {
            ConnectionInfo::DatabaseName => InfoType::DatabaseName,
            ConnectionInfo::DbmsName => InfoType::DbmsName,
            ConnectionInfo::DbmsVersion => InfoType::DbmsVersion,
            ConnectionInfo::DriverName => InfoType::DriverName,
            ConnectionInfo::DriverOdbcVersion => InfoType::DriverOdbcVersion,
            ConnectionInfo::DriverVersion => InfoType::DriverVersion,
            ConnectionInfo::ActiveStatements => InfoType::ActiveStatements,
            ConnectionInfo::Encoding => return Ok(Value::atom(conn.encoding().name())),
        };
        let silent = conn.settings().silent;
        let value = report::require(
            &*self.driver,
            conn.handle().into(),
            silent,
            self.driver.get_info(conn.handle(), info_type),
        )?;
        Ok(match value {
            InfoValue::Text(text) => Value::atom(&text),
            InfoValue::Small(n) => Value::Int(i64::from(n)),
        })
    }

    pub fn end_transaction(&self, conn: impl Into<ConnectionRef>, completion: Completion) -> Result<()> {
        let conn = self.connections.get(&conn.into())?;
        let silent = conn.settings().silent;
        report::require(
            &*self.driver,
            conn.handle().into(),
            silent,
            self.driver.end_transaction(conn.handle(), completion),
        )?;
        debug!(connection = %conn.id(), ?completion, "transaction ended");
        Ok(())
    }

    /// Open connections in creation order.
    pub fn current_connections(&self) -> Vec<ConnectionEntry> {
        self.connections
            .list()
            .iter()
            .map(|conn| ConnectionEntry {
                id: conn.id(),
                alias: conn.alias(),
                dsn: conn.dsn().to_string(),
            })
            .collect()
    }

    // Statements

    fn statement(&self, id: StatementId) -> Result<SharedContext> {
        if lock(&self.freed).contains(&id) {
            return Err(OdbxError::AlreadyFreed(id));
        }
        let shared = lock(&self.statements).get(&id).cloned().ok_or_else(|| OdbxError::Existence {
            kind: "statement",
            name: id.to_string(),
        })?;
        if lock(&shared).is_freed() {
            self.retire(id);
            return Err(OdbxError::AlreadyFreed(id));
        }
        Ok(shared)
    }

    fn register(&self, ctx: StatementContext) -> StatementId {
        let id = ctx.id();
        lock(&self.statements).insert(id, Arc::new(Mutex::new(ctx)));
        id
    }

    fn retire(&self, id: StatementId) {
        lock(&self.statements).remove(&id);
        lock(&self.freed).insert(id);
    }

    /// Prepare `sql` with one spec per parameter marker.
    pub fn prepare(
        &self,
        conn: impl Into<ConnectionRef>,
        sql: &str,
        params: &[ParamSpec],
        options: StatementOptions,
    ) -> Result<StatementId> {
        let conn = self.connections.get(&conn.into())?;
        let mut ctx = self.context(conn)?;
        ctx.set_flag(Flags::PERSISTENT);
        ctx.set_text(sql)?;
        ctx.apply_options(&options)?;
        ctx.prepare(params)?;
        Ok(self.register(ctx))
    }

    pub fn parameters(&self, id: StatementId) -> Result<Vec<ParamSpec>> {
        let shared = self.statement(id)?;
        Ok(lock(&shared).parameters())
    }

    /// Run a prepared statement. A statement whose previous result is
    /// still open runs on a fresh clone instead.
    pub fn execute(&self, id: StatementId, values: &[Value]) -> Result<Cursor> {
        let shared = self.statement(id)?;
        let mut ctx = lock(&shared);
        if ctx.flags().contains(Flags::INUSE) {
            if ctx.flags().contains(Flags::NOAUTO) {
                return Err(OdbxError::context("in_use", format!("{id} has an open result")));
            }
            let mut clone = ctx.clone_context(self.next_statement_id())?;
            drop(ctx);
            debug!(statement = %id, clone = %clone.id(), "statement in use, running a clone");
            clone.bind_values(values)?;
            clone.execute(&self.executing)?;
            return Ok(Cursor::new(Arc::new(Mutex::new(clone))));
        }
        ctx.bind_values(values)?;
        ctx.execute(&self.executing)?;
        drop(ctx);
        Ok(Cursor::new(shared))
    }

    /// Run `sql` once on a statement of its own.
    pub fn query(&self, conn: impl Into<ConnectionRef>, sql: &str, options: StatementOptions) -> Result<Cursor> {
        let conn = self.connections.get(&conn.into())?;
        let mut ctx = self.context(conn)?;
        ctx.set_text(sql)?;
        ctx.apply_options(&options)?;
        ctx.clear_flag(Flags::NOAUTO);
        ctx.execute(&self.executing)?;
        Ok(Cursor::new(Arc::new(Mutex::new(ctx))))
    }

    /// Pull one row from a statement in explicit fetch mode.
    pub fn fetch(&self, id: StatementId, orientation: FetchOrientation) -> Result<Fetched> {
        let shared = self.statement(id)?;
        let mut ctx = lock(&shared);
        if !ctx.flags().contains(Flags::NOAUTO | Flags::INUSE) {
            return Err(OdbxError::Permission {
                action: "fetch",
                kind: "statement",
                name: id.to_string(),
            });
        }
        if !ctx.flags().contains(Flags::BOUND) {
            ctx.describe()?;
        }
        if !ctx.has_result() {
            return Ok(Fetched::Affected(ctx.affected()?));
        }
        let fetched = match ctx.fetch(orientation) {
            Ok(true) => ctx.row().map(Fetched::Row),
            Ok(false) => Ok(Fetched::EndOfFile),
            Err(err) => Err(err),
        };
        if fetched.is_err() {
            ctx.close();
        }
        fetched
    }

    /// Close the open result of `id`. Prepared statements stay reusable.
    pub fn close_statement(&self, id: StatementId) -> Result<()> {
        let shared = self.statement(id)?;
        let freed = {
            let mut ctx = lock(&shared);
            ctx.close();
            ctx.is_freed()
        };
        if freed {
            self.retire(id);
        }
        Ok(())
    }

    /// Destroy a prepared statement. While a result is open the statement
    /// only loses its persistence and goes away when the result is closed.
    pub fn free_statement(&self, id: StatementId) -> Result<()> {
        let shared = self.statement(id)?;
        {
            let mut ctx = lock(&shared);
            if ctx.flags().contains(Flags::INUSE) {
                ctx.clear_flag(Flags::PERSISTENT);
                debug!(statement = %id, "in use, free deferred");
                return Ok(());
            }
            ctx.free();
        }
        self.retire(id);
        Ok(())
    }

    /// A new prepared statement running the same SQL with the same
    /// declarations as `id`.
    pub fn clone_statement(&self, id: StatementId) -> Result<StatementId> {
        let shared = self.statement(id)?;
        let mut clone = lock(&shared).clone_context(self.next_statement_id())?;
        clone.set_flag(Flags::PERSISTENT);
        Ok(self.register(clone))
    }

    /// Move a statement in explicit fetch mode to its next result set.
    pub fn next_result_set(&self, id: StatementId) -> Result<bool> {
        let shared = self.statement(id)?;
        let mut ctx = lock(&shared);
        if !ctx.flags().contains(Flags::NOAUTO | Flags::INUSE | Flags::BOUND) {
            return Err(OdbxError::Permission {
                action: "next_result_set",
                kind: "statement",
                name: id.to_string(),
            });
        }
        ctx.next_result_set()
    }

    pub fn columns_of(&self, id: StatementId) -> Result<Vec<String>> {
        let shared = self.statement(id)?;
        let ctx = lock(&shared);
        Ok(ctx.columns().iter().map(|c| c.name().to_string()).collect())
    }

    // Catalog

    pub fn tables(&self, conn: impl Into<ConnectionRef>) -> Result<Cursor> {
        let conn = self.connections.get(&conn.into())?;
        let mut ctx = self.context(conn)?;
        ctx.for_tables(self.config.catalog_identifier_width, self.config.null_policy());
        ctx.execute(&self.executing)?;
        Ok(Cursor::new(Arc::new(Mutex::new(ctx))))
    }

    pub fn columns(&self, conn: impl Into<ConnectionRef>, table: &str) -> Result<Cursor> {
        let conn = self.connections.get(&conn.into())?;
        let mut ctx = self.context(conn)?;
        ctx.for_columns(table, self.config.columns_threshold, self.config.null_policy());
        ctx.execute(&self.executing)?;
        Ok(Cursor::new(Arc::new(Mutex::new(ctx))))
    }

    // Cancellation and statistics

    /// Abort what `thread` is executing. `false` if it is not inside the
    /// driver.
    pub fn cancel(&self, thread: ThreadId) -> Result<bool> {
        self.executing.cancel(&*self.driver, thread)
    }

    pub fn executing(&self, thread: ThreadId) -> bool {
        self.executing.executing(thread).is_some()
    }

    pub fn statistics(&self) -> Statistics {
        self.counters.snapshot()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("connections", &self.connections.len())
            .field("statistics", &self.statistics())
            .finish_non_exhaustive()
    }
}
