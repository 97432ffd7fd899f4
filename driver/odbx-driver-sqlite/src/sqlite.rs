///
/// SQLite implementation of the odbx driver interface.
///
/// Two handle registries:
/// - conns: connection handle -> rusqlite::Connection plus its settings
/// - stmts: statement handle -> prepared text, bindings and result set
///
/// A statement keeps its connection alive through an `Arc`. The
/// connection itself sits behind a mutex, so statements of the same
/// connection execute one at a time; `cancel` only touches the interrupt
/// handle and never waits for that mutex.
///
/// Queries are materialized on execute. Fetching, scrolling and
/// `get_data` then work on the stored rows without going back to SQLite.
///

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use odbx_driver::{
    AccessMode, BoundColumn, CType, ColAttribute, ColumnDescription, Completion, ConnHandle,
    ConnectAttr, ConnectRequest, CursorType, DiagHandle, DiagRecord, Driver, FetchOrientation,
    FreeStmt, InfoType, InfoValue, Len, NO_TOTAL, NULL_DATA, Nullability, ParamBinding, ParamData,
    ParamDescription, SqlResult, SqlText, SqlType, StmtHandle, is_data_at_exec,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, InterruptHandle};
use tracing::{debug, trace};

use crate::catalog;
use crate::convert;
use crate::cursor::{ColumnMeta, GetDataState, ResultSet};
use crate::describe::{self, DEFAULT_TEXT_WIDTH};
use crate::registry::Registry;

#[derive(Debug, Clone)]
pub struct SqliteDriverOptions {
    /// Report `NO_TOTAL` instead of the remaining length while a value is
    /// read with `get_data` in several pieces.
    pub no_total: bool,
    /// Answer to `InfoType::MaxQualifierNameLen`; `None` makes the call fail.
    pub max_qualifier_name_len: Option<u16>,
}

impl Default for SqliteDriverOptions {
    fn default() -> Self {
        Self {
            no_total: false,
            max_qualifier_name_len: Some(128),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnSettings {
    auto_commit: bool,
    cursor: CursorType,
}

struct ConnEntry {
    db: Mutex<Connection>,
    interrupt: InterruptHandle,
    path: String,
    settings: Mutex<ConnSettings>,
}

struct PendingExec {
    values: Vec<Value>,
    waiting: VecDeque<u16>,
    /// Parameter being supplied by `put_data`; `None` data means NULL.
    current: Option<(u16, Option<Vec<u8>>)>,
}

#[derive(Default)]
struct StmtState {
    sql: Option<String>,
    param_count: u16,
    prepared_columns: Vec<ColumnMeta>,
    params: BTreeMap<u16, ParamBinding>,
    bound: BTreeMap<u16, (CType, usize)>,
    pending: Option<PendingExec>,
    result: Option<ResultSet>,
    row_count: i64,
}

impl StmtState {
    fn columns(&self) -> &[ColumnMeta] {
        match &self.result {
            Some(rs) => &rs.columns,
            None => &self.prepared_columns,
        }
    }
}

struct StmtEntry {
    conn: Arc<ConnEntry>,
    state: Mutex<StmtState>,
}

type Outcome<T> = Result<SqlResult<T>, DiagRecord>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sql_state(err: &rusqlite::ffi::Error, message: &str) -> &'static str {
    match err.code {
        ErrorCode::OperationInterrupted => "HY008",
        ErrorCode::ConstraintViolation => "23000",
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => "HYT00",
        _ if message.contains("syntax error") => "42000",
        _ if message.contains("no such table") => "42S02",
        _ if message.contains("no such column") => "42S22",
        _ => "HY000",
    }
}

fn sqlite_record(e: &rusqlite::Error) -> DiagRecord {
    match e {
        rusqlite::Error::SqliteFailure(err, msg) => {
            let message = msg.clone().unwrap_or_else(|| err.to_string());
            DiagRecord::new(sql_state(err, &message), err.extended_code, message)
        }
        // prepare-time errors of the bundled library carry the offending SQL
        rusqlite::Error::SqlInputError { error, msg, .. } => {
            DiagRecord::new(sql_state(error, msg), error.extended_code, msg.clone())
        }
        other => DiagRecord::new("HY000", -1, other.to_string()),
    }
}

fn sequence_error() -> DiagRecord {
    DiagRecord::new("HY010", 0, "Function sequence error")
}

fn cursor_state_error() -> DiagRecord {
    DiagRecord::new("24000", 0, "Invalid cursor state")
}

fn index_error(index: u16) -> DiagRecord {
    DiagRecord::new("07009", 0, format!("Invalid descriptor index {index}"))
}

fn truncated() -> DiagRecord {
    DiagRecord::new("01004", 0, "String data, right truncated")
}

fn buffer_length_error() -> DiagRecord {
    DiagRecord::new("HY090", 0, "Invalid string or buffer length")
}

/// `DATABASE=<path>` from a `key=value;...` connection string.
fn database_from_driver_string(driver_string: &str) -> Option<String> {
    driver_string.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("database")
            .then(|| value.trim().to_string())
    })
}

/// Table named after the first FROM of a query, if it is a plain name.
fn source_table(sql: &str) -> Option<String> {
    let mut words = sql.split_whitespace();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("from") {
            let name = words.next()?;
            let name = name.trim_end_matches([',', ';', ')']).trim_matches(['"', '`', '[', ']']);
            if name.is_empty() || name.starts_with('(') {
                return None;
            }
            return Some(name.to_string());
        }
    }
    None
}

/// Write one column value into a bound buffer. Returns true when the value
/// was truncated.
fn write_column(value: &Value, c_type: CType, data: &mut [u8], indicator: &mut Len) -> Result<bool, DiagRecord> {
    if matches!(value, Value::Null) {
        *indicator = NULL_DATA;
        return Ok(false);
    }
    let bytes = convert::column_bytes(value, c_type)?;
    if let Some(size) = c_type.fixed_size() {
        let slot = data.get_mut(..size).ok_or_else(buffer_length_error)?;
        slot.copy_from_slice(&bytes[..size]);
        *indicator = size as Len;
        return Ok(false);
    }
    let pad = c_type.terminator_width();
    let room = data.len().checked_sub(pad).ok_or_else(buffer_length_error)?;
    let room = if c_type == CType::WCHAR { room & !1 } else { room };
    let n = bytes.len().min(room);
    data[..n].copy_from_slice(&bytes[..n]);
    data[n..n + pad].fill(0);
    *indicator = bytes.len() as Len;
    Ok(n < bytes.len())
}

pub struct SqliteDriver {
    options: SqliteDriverOptions,
    conns: Mutex<Registry<ConnEntry>>,
    stmts: Mutex<Registry<StmtEntry>>,
    diags: Mutex<HashMap<DiagHandle, Vec<DiagRecord>>>,
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new(SqliteDriverOptions::default())
    }
}

impl SqliteDriver {
    pub fn new(options: SqliteDriverOptions) -> Self {
        Self {
            options,
            conns: Mutex::new(Registry::new()),
            stmts: Mutex::new(Registry::new()),
            diags: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live statement handles.
    pub fn open_statements(&self) -> usize {
        lock(&self.stmts).len()
    }

    fn reset(&self, handle: DiagHandle) {
        lock(&self.diags).remove(&handle);
    }

    fn post(&self, handle: DiagHandle, records: Vec<DiagRecord>) {
        if !records.is_empty() {
            lock(&self.diags).insert(handle, records);
        }
    }

    fn fail<T>(&self, handle: DiagHandle, function: &'static str, record: DiagRecord) -> SqlResult<T> {
        self.post(handle, vec![record]);
        SqlResult::Error { function }
    }

    fn with_conn<T>(
        &self,
        conn: ConnHandle,
        function: &'static str,
        f: impl FnOnce(&Arc<ConnEntry>, &mut Vec<DiagRecord>) -> Outcome<T>,
    ) -> SqlResult<T> {
        let handle = DiagHandle::Conn(conn);
        self.reset(handle);
        let Some(entry) = lock(&self.conns).get(conn.0) else {
            return self.fail(handle, function, DiagRecord::new("08003", 0, "Connection not open"));
        };
        let mut notes = Vec::new();
        let rc = f(&entry, &mut notes).unwrap_or_else(|record| {
            notes.push(record);
            SqlResult::Error { function }
        });
        self.post(handle, notes);
        rc
    }

    fn with_stmt<T>(
        &self,
        stmt: StmtHandle,
        function: &'static str,
        f: impl FnOnce(&StmtEntry, &mut StmtState, &mut Vec<DiagRecord>) -> Outcome<T>,
    ) -> SqlResult<T> {
        let handle = DiagHandle::Stmt(stmt);
        self.reset(handle);
        let Some(entry) = lock(&self.stmts).get(stmt.0) else {
            let record = DiagRecord::new("HY000", 0, format!("Invalid statement handle {stmt}"));
            return self.fail(handle, function, record);
        };
        let mut notes = Vec::new();
        let rc = {
            let mut state = lock(&entry.state);
            f(&entry, &mut state, &mut notes).unwrap_or_else(|record| {
                notes.push(record);
                SqlResult::Error { function }
            })
        };
        self.post(handle, notes);
        rc
    }

    fn prepare_text(entry: &StmtEntry, state: &mut StmtState, sql: String) -> Result<(), DiagRecord> {
        let db = lock(&entry.conn.db);
        let st = db.prepare_cached(&sql).map_err(|e| sqlite_record(&e))?;
        let table = source_table(&sql).unwrap_or_default();
        state.param_count = st.parameter_count() as u16;
        state.prepared_columns = st
            .columns()
            .iter()
            .map(|col| {
                let decl = col.decl_type();
                ColumnMeta {
                    name: col.name().to_string(),
                    info: match decl {
                        Some(decl) => describe::from_decl_type(decl),
                        None => describe::infer(std::iter::empty()),
                    },
                    nullable: Nullability::Unknown,
                    table: if decl.is_some() { table.clone() } else { String::new() },
                    declared: decl.is_some(),
                }
            })
            .collect();
        debug!(params = state.param_count, columns = state.prepared_columns.len(), "prepared");
        state.sql = Some(sql);
        state.params.clear();
        state.bound.clear();
        state.result = None;
        state.pending = None;
        Ok(())
    }

    fn start_execute(entry: &StmtEntry, state: &mut StmtState, params: &[ParamData<'_>]) -> Outcome<()> {
        let sql = state.sql.clone().ok_or_else(sequence_error)?;
        let mut values = Vec::with_capacity(state.param_count as usize);
        let mut waiting = VecDeque::new();
        for index in 1..=state.param_count {
            let count_error = || DiagRecord::new("07002", 0, "COUNT field incorrect");
            let binding = state.params.get(&index).ok_or_else(count_error)?;
            let data = params.get(index as usize - 1).ok_or_else(count_error)?;
            if data.indicator == NULL_DATA {
                values.push(Value::Null);
            } else if is_data_at_exec(data.indicator) {
                values.push(Value::Null);
                waiting.push_back(index);
            } else {
                values.push(convert::param_value(binding.c_type, data.value, data.indicator)?);
            }
        }
        state.result = None;
        if !waiting.is_empty() {
            state.pending = Some(PendingExec {
                values,
                waiting,
                current: None,
            });
            return Ok(SqlResult::NeedData);
        }
        Self::run(entry, state, &sql, values)?;
        Ok(SqlResult::Success(()))
    }

    fn run(entry: &StmtEntry, state: &mut StmtState, sql: &str, values: Vec<Value>) -> Result<(), DiagRecord> {
        let settings = *lock(&entry.conn.settings);
        let db = lock(&entry.conn.db);
        let rec = |e: rusqlite::Error| sqlite_record(&e);
        if !settings.auto_commit && db.is_autocommit() {
            db.execute_batch("BEGIN").map_err(rec)?;
        }
        let mut st = db.prepare_cached(sql).map_err(rec)?;
        let ncols = st.column_count();
        if ncols == 0 {
            let changed = st.execute(params_from_iter(values.iter())).map_err(rec)?;
            state.row_count = changed as i64;
            state.result = None;
            trace!(changed, "executed");
            return Ok(());
        }
        let mut collected = Vec::new();
        {
            let mut rows = st.query(params_from_iter(values.iter())).map_err(rec)?;
            while let Some(row) = rows.next().map_err(rec)? {
                let mut cells = Vec::with_capacity(ncols);
                for i in 0..ncols {
                    cells.push(row.get::<_, Value>(i).map_err(rec)?);
                }
                collected.push(cells);
            }
        }
        let mut columns = state.prepared_columns.clone();
        for (i, col) in columns.iter_mut().enumerate() {
            col.info = if col.declared {
                describe::widen(col.info, collected.iter().map(|r| &r[i]))
            } else {
                describe::infer(collected.iter().map(|r| &r[i]))
            };
        }
        trace!(rows = collected.len(), "materialized");
        state.row_count = -1;
        state.result = Some(ResultSet::new(columns, collected));
        Ok(())
    }

    fn load_catalog(
        entry: &StmtEntry,
        state: &mut StmtState,
        build: impl FnOnce(&Connection) -> rusqlite::Result<ResultSet>,
    ) -> Outcome<()> {
        let rs = {
            let db = lock(&entry.conn.db);
            build(&db).map_err(|e| sqlite_record(&e))?
        };
        state.sql = None;
        state.param_count = 0;
        state.prepared_columns = rs.columns.clone();
        state.bound.clear();
        state.pending = None;
        state.row_count = -1;
        state.result = Some(rs);
        Ok(SqlResult::Success(()))
    }
}

impl Driver for SqliteDriver {
    fn connect(&self, request: &ConnectRequest) -> SqlResult<ConnHandle> {
        self.reset(DiagHandle::Env);
        let path = request
            .driver_string
            .as_deref()
            .and_then(database_from_driver_string)
            .unwrap_or_else(|| request.dsn.clone());
        let db = match Connection::open(&path) {
            Ok(db) => db,
            Err(e) => return self.fail(DiagHandle::Env, "SQLDriverConnect", sqlite_record(&e)),
        };
        let entry = ConnEntry {
            interrupt: db.get_interrupt_handle(),
            db: Mutex::new(db),
            path,
            settings: Mutex::new(ConnSettings {
                auto_commit: true,
                cursor: CursorType::ForwardOnly,
            }),
        };
        let handle = ConnHandle(lock(&self.conns).insert(entry));
        debug!(%handle, "connected");
        if request.pool_mode.is_some() {
            let note = DiagRecord::new("01S02", 0, "Option value changed: connection pooling is not supported");
            self.post(DiagHandle::Conn(handle), vec![note]);
            return SqlResult::SuccessWithInfo(handle);
        }
        SqlResult::Success(handle)
    }

    fn disconnect(&self, conn: ConnHandle) -> SqlResult<()> {
        let rc = self.with_conn(conn, "SQLDisconnect", |entry, _| {
            let db = lock(&entry.db);
            if !db.is_autocommit() {
                db.execute_batch("ROLLBACK").map_err(|e| sqlite_record(&e))?;
            }
            debug!(path = %entry.path, "disconnected");
            Ok(SqlResult::Success(()))
        });
        if rc.is_success() {
            lock(&self.conns).remove(conn.0);
        }
        rc
    }

    fn set_connect_attr(&self, conn: ConnHandle, attr: ConnectAttr) -> SqlResult<()> {
        self.with_conn(conn, "SQLSetConnectAttr", |entry, _| {
            let rec = |e: rusqlite::Error| sqlite_record(&e);
            match attr {
                ConnectAttr::AutoCommit(on) => {
                    let db = lock(&entry.db);
                    if on && !db.is_autocommit() {
                        db.execute_batch("COMMIT").map_err(rec)?;
                    }
                    lock(&entry.settings).auto_commit = on;
                }
                ConnectAttr::AccessMode(mode) => {
                    let pragma = match mode {
                        AccessMode::ReadOnly => "PRAGMA query_only = ON",
                        AccessMode::ReadWrite => "PRAGMA query_only = OFF",
                    };
                    lock(&entry.db).execute_batch(pragma).map_err(rec)?;
                }
                ConnectAttr::CursorType(cursor) => lock(&entry.settings).cursor = cursor,
            }
            Ok(SqlResult::Success(()))
        })
    }

    fn get_info(&self, conn: ConnHandle, info: InfoType) -> SqlResult<InfoValue> {
        self.with_conn(conn, "SQLGetInfo", |_, _| {
            let value = match info {
                InfoType::DatabaseName => InfoValue::Text("main".to_string()),
                InfoType::DbmsName => InfoValue::Text("SQLite".to_string()),
                InfoType::DbmsVersion => InfoValue::Text(rusqlite::version().to_string()),
                InfoType::DriverName => InfoValue::Text(env!("CARGO_PKG_NAME").to_string()),
                InfoType::DriverOdbcVersion => InfoValue::Text("03.80".to_string()),
                InfoType::DriverVersion => InfoValue::Text(env!("CARGO_PKG_VERSION").to_string()),
                InfoType::ActiveStatements => InfoValue::Small(0),
                InfoType::MaxQualifierNameLen => match self.options.max_qualifier_name_len {
                    Some(len) => InfoValue::Small(len),
                    None => return Err(DiagRecord::new("HYC00", 0, "Optional feature not implemented")),
                },
            };
            Ok(SqlResult::Success(value))
        })
    }

    fn end_transaction(&self, conn: ConnHandle, completion: Completion) -> SqlResult<()> {
        self.with_conn(conn, "SQLEndTran", |entry, _| {
            let db = lock(&entry.db);
            if !db.is_autocommit() {
                let sql = match completion {
                    Completion::Commit => "COMMIT",
                    Completion::Rollback => "ROLLBACK",
                };
                db.execute_batch(sql).map_err(|e| sqlite_record(&e))?;
            }
            Ok(SqlResult::Success(()))
        })
    }

    fn alloc_statement(&self, conn: ConnHandle) -> SqlResult<StmtHandle> {
        self.with_conn(conn, "SQLAllocHandle", |conn, _| {
            let entry = StmtEntry {
                conn: Arc::clone(conn),
                state: Mutex::new(StmtState::default()),
            };
            Ok(SqlResult::Success(StmtHandle(lock(&self.stmts).insert(entry))))
        })
    }

    fn free_statement(&self, stmt: StmtHandle, option: FreeStmt) -> SqlResult<()> {
        let rc = self.with_stmt(stmt, "SQLFreeStmt", |_, state, _| {
            match option {
                FreeStmt::Close | FreeStmt::Drop => {
                    state.result = None;
                    state.pending = None;
                }
                FreeStmt::Unbind => state.bound.clear(),
                FreeStmt::ResetParams => state.params.clear(),
            }
            Ok(SqlResult::Success(()))
        });
        if option == FreeStmt::Drop && rc.is_success() {
            lock(&self.stmts).remove(stmt.0);
            self.reset(DiagHandle::Stmt(stmt));
        }
        rc
    }

    fn prepare(&self, stmt: StmtHandle, text: &SqlText) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLPrepare", |entry, state, _| {
            Self::prepare_text(entry, state, text.to_string_lossy())?;
            Ok(SqlResult::Success(()))
        })
    }

    fn exec_direct(&self, stmt: StmtHandle, text: &SqlText, params: &[ParamData<'_>]) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLExecDirect", |entry, state, _| {
            let bindings = std::mem::take(&mut state.params);
            Self::prepare_text(entry, state, text.to_string_lossy())?;
            state.params = bindings;
            Self::start_execute(entry, state, params)
        })
    }

    fn num_params(&self, stmt: StmtHandle) -> SqlResult<u16> {
        self.with_stmt(stmt, "SQLNumParams", |_, state, _| {
            state.sql.as_ref().ok_or_else(sequence_error)?;
            Ok(SqlResult::Success(state.param_count))
        })
    }

    fn describe_param(&self, stmt: StmtHandle, param: u16) -> SqlResult<ParamDescription> {
        self.with_stmt(stmt, "SQLDescribeParam", |_, state, _| {
            if param == 0 || param > state.param_count {
                return Err(index_error(param));
            }
            Ok(SqlResult::Success(ParamDescription {
                sql_type: SqlType::VARCHAR,
                column_size: DEFAULT_TEXT_WIDTH,
                decimal_digits: 0,
                nullable: Nullability::Unknown,
            }))
        })
    }

    fn bind_parameter(&self, stmt: StmtHandle, param: u16, binding: ParamBinding) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLBindParameter", |_, state, _| {
            if param == 0 || param > state.param_count {
                return Err(index_error(param));
            }
            state.params.insert(param, binding);
            Ok(SqlResult::Success(()))
        })
    }

    fn execute(&self, stmt: StmtHandle, params: &[ParamData<'_>]) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLExecute", |entry, state, _| {
            Self::start_execute(entry, state, params)
        })
    }

    fn param_data(&self, stmt: StmtHandle) -> SqlResult<Option<u16>> {
        self.with_stmt(stmt, "SQLParamData", |entry, state, _| {
            let mut pending = state.pending.take().ok_or_else(sequence_error)?;
            if let Some((index, data)) = pending.current.take() {
                let c_type = state
                    .params
                    .get(&index)
                    .map(|b| b.c_type)
                    .ok_or_else(|| index_error(index))?;
                pending.values[index as usize - 1] = match data {
                    Some(bytes) => convert::deferred_value(c_type, &bytes),
                    None => Value::Null,
                };
            }
            if let Some(next) = pending.waiting.pop_front() {
                pending.current = Some((next, Some(Vec::new())));
                state.pending = Some(pending);
                return Ok(SqlResult::Success(Some(next)));
            }
            let sql = state.sql.clone().ok_or_else(sequence_error)?;
            Self::run(entry, state, &sql, pending.values)?;
            Ok(SqlResult::Success(None))
        })
    }

    fn put_data(&self, stmt: StmtHandle, data: Option<&[u8]>) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLPutData", |_, state, _| {
            let (_, slot) = state
                .pending
                .as_mut()
                .and_then(|p| p.current.as_mut())
                .ok_or_else(sequence_error)?;
            match (data, slot.as_mut()) {
                (Some(bytes), Some(buf)) => buf.extend_from_slice(bytes),
                (Some(bytes), None) => *slot = Some(bytes.to_vec()),
                (None, _) => *slot = None,
            }
            Ok(SqlResult::Success(()))
        })
    }

    fn num_result_cols(&self, stmt: StmtHandle) -> SqlResult<u16> {
        self.with_stmt(stmt, "SQLNumResultCols", |_, state, _| {
            Ok(SqlResult::Success(state.columns().len() as u16))
        })
    }

    fn describe_col(&self, stmt: StmtHandle, column: u16) -> SqlResult<ColumnDescription> {
        self.with_stmt(stmt, "SQLDescribeCol", |_, state, _| {
            let meta = column
                .checked_sub(1)
                .and_then(|i| state.columns().get(i as usize))
                .ok_or_else(|| index_error(column))?;
            Ok(SqlResult::Success(ColumnDescription {
                name: meta.name.clone(),
                sql_type: meta.info.sql_type,
                column_size: meta.info.column_size,
                decimal_digits: meta.info.decimal_digits,
                nullable: meta.nullable,
            }))
        })
    }

    fn col_attribute(&self, stmt: StmtHandle, column: u16, attr: ColAttribute) -> SqlResult<String> {
        self.with_stmt(stmt, "SQLColAttribute", |_, state, _| {
            let meta = column
                .checked_sub(1)
                .and_then(|i| state.columns().get(i as usize))
                .ok_or_else(|| index_error(column))?;
            let value = match attr {
                ColAttribute::TableName => meta.table.clone(),
                ColAttribute::BaseColumnName => meta.name.clone(),
            };
            Ok(SqlResult::Success(value))
        })
    }

    fn bind_col(&self, stmt: StmtHandle, column: u16, c_type: CType, capacity: usize) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLBindCol", |_, state, _| {
            if column == 0 || column as usize > state.columns().len() {
                return Err(index_error(column));
            }
            state.bound.insert(column, (c_type, capacity));
            Ok(SqlResult::Success(()))
        })
    }

    fn fetch_scroll(
        &self,
        stmt: StmtHandle,
        orientation: FetchOrientation,
        bound: &mut [BoundColumn<'_>],
    ) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLFetchScroll", |entry, state, notes| {
            let cursor = lock(&entry.conn.settings).cursor;
            if cursor == CursorType::ForwardOnly && orientation != FetchOrientation::Next {
                return Err(DiagRecord::new("HY106", 0, "Fetch type out of range"));
            }
            let StmtState { result, bound: declared, .. } = state;
            let result = result.as_mut().ok_or_else(cursor_state_error)?;
            let Some(row) = result.move_to(orientation) else {
                return Ok(SqlResult::NoData);
            };
            let mut cut = false;
            for col in bound.iter_mut() {
                let (c_type, _) = *declared.get(&col.column).ok_or_else(|| index_error(col.column))?;
                let value = result.rows[row]
                    .get(col.column as usize - 1)
                    .ok_or_else(|| index_error(col.column))?;
                cut |= write_column(value, c_type, col.data, col.indicator)?;
            }
            if cut {
                notes.push(truncated());
                return Ok(SqlResult::SuccessWithInfo(()));
            }
            Ok(SqlResult::Success(()))
        })
    }

    fn get_data(&self, stmt: StmtHandle, column: u16, c_type: CType, buf: &mut [u8]) -> SqlResult<Len> {
        self.with_stmt(stmt, "SQLGetData", |_, state, notes| {
            let result = state.result.as_mut().ok_or_else(cursor_state_error)?;
            let row = result.current_row().ok_or_else(cursor_state_error)?;
            let ResultSet { rows, get_data, .. } = result;
            let value = column
                .checked_sub(1)
                .and_then(|i| rows[row].get(i as usize))
                .ok_or_else(|| index_error(column))?;
            if !matches!(get_data, Some(p) if p.column == column) {
                *get_data = Some(GetDataState {
                    column,
                    offset: 0,
                    done: false,
                });
            }
            let progress = get_data.as_mut().ok_or_else(cursor_state_error)?;
            if progress.done {
                return Ok(SqlResult::NoData);
            }
            if matches!(value, Value::Null) {
                progress.done = true;
                return Ok(SqlResult::Success(NULL_DATA));
            }
            let bytes = convert::column_bytes(value, c_type)?;
            if let Some(size) = c_type.fixed_size() {
                let slot = buf.get_mut(..size).ok_or_else(buffer_length_error)?;
                slot.copy_from_slice(&bytes[..size]);
                progress.done = true;
                return Ok(SqlResult::Success(size as Len));
            }
            let pad = c_type.terminator_width();
            let room = buf.len().checked_sub(pad).ok_or_else(buffer_length_error)?;
            let room = if c_type == CType::WCHAR { room & !1 } else { room };
            let remaining = bytes.len() - progress.offset;
            let n = remaining.min(room);
            buf[..n].copy_from_slice(&bytes[progress.offset..progress.offset + n]);
            buf[n..n + pad].fill(0);
            progress.offset += n;
            trace!(column, piece = n, remaining, "get_data");
            if n < remaining {
                notes.push(truncated());
                let indicator = if self.options.no_total { NO_TOTAL } else { remaining as Len };
                return Ok(SqlResult::SuccessWithInfo(indicator));
            }
            progress.done = true;
            Ok(SqlResult::Success(remaining as Len))
        })
    }

    fn row_count(&self, stmt: StmtHandle) -> SqlResult<i64> {
        self.with_stmt(stmt, "SQLRowCount", |_, state, _| Ok(SqlResult::Success(state.row_count)))
    }

    fn more_results(&self, stmt: StmtHandle) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLMoreResults", |_, state, _| {
            state.result = None;
            Ok(SqlResult::NoData)
        })
    }

    fn cancel(&self, stmt: StmtHandle) -> SqlResult<()> {
        let handle = DiagHandle::Stmt(stmt);
        let Some(entry) = lock(&self.stmts).get(stmt.0) else {
            let record = DiagRecord::new("HY000", 0, format!("Invalid statement handle {stmt}"));
            return self.fail(handle, "SQLCancel", record);
        };
        entry.conn.interrupt.interrupt();
        debug!(%stmt, "interrupt requested");
        SqlResult::Success(())
    }

    fn tables(&self, stmt: StmtHandle) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLTables", |entry, state, _| {
            Self::load_catalog(entry, state, catalog::tables)
        })
    }

    fn columns(&self, stmt: StmtHandle, table: &str) -> SqlResult<()> {
        self.with_stmt(stmt, "SQLColumns", |entry, state, _| {
            Self::load_catalog(entry, state, |db| catalog::columns(db, table))
        })
    }

    fn diagnostics(&self, handle: DiagHandle) -> Vec<DiagRecord> {
        lock(&self.diags).get(&handle).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(driver: &SqliteDriver) -> (ConnHandle, StmtHandle) {
        let conn = driver.connect(&ConnectRequest::new(":memory:")).value().unwrap();
        let stmt = driver.alloc_statement(conn).value().unwrap();
        (conn, stmt)
    }

    fn run(driver: &SqliteDriver, stmt: StmtHandle, sql: &str) {
        let rc = driver.exec_direct(stmt, &SqlText::Narrow(sql.as_bytes().to_vec()), &[]);
        assert!(rc.is_success(), "{sql}: {:?}", driver.diagnostics(stmt.into()));
    }

    #[test]
    fn test_driver_string_and_source_table() {
        assert_eq!(
            database_from_driver_string("Driver=x; Database = /tmp/a.db ;"),
            Some("/tmp/a.db".to_string())
        );
        assert_eq!(source_table("select a from \"t\" where a > 1"), Some("t".to_string()));
        assert_eq!(source_table("select 1"), None);
    }

    #[test]
    fn test_bound_fetch_and_truncation() {
        let driver = SqliteDriver::default();
        let (_, stmt) = setup(&driver);
        run(&driver, stmt, "CREATE TABLE t (id INTEGER, name VARCHAR(10))");
        run(&driver, stmt, "INSERT INTO t VALUES (7, 'abcdef')");
        run(&driver, stmt, "SELECT id, name FROM t");

        assert!(driver.bind_col(stmt, 1, CType::SLONG, 4).is_success());
        assert!(driver.bind_col(stmt, 2, CType::CHAR, 4).is_success());
        let mut id = [0u8; 4];
        let mut name = [0u8; 4];
        let (mut id_ind, mut name_ind) = (0, 0);
        let rc = {
            let mut bound = [
                BoundColumn { column: 1, data: &mut id, indicator: &mut id_ind },
                BoundColumn { column: 2, data: &mut name, indicator: &mut name_ind },
            ];
            driver.fetch_scroll(stmt, FetchOrientation::Next, &mut bound)
        };
        assert_eq!(rc, SqlResult::SuccessWithInfo(()));
        assert_eq!(i32::from_ne_bytes(id), 7);
        assert_eq!(&name, b"abc\0");
        assert_eq!(name_ind, 6);
        assert_eq!(driver.diagnostics(stmt.into())[0].state, "01004");
        assert_eq!(driver.fetch_scroll(stmt, FetchOrientation::Next, &mut []), SqlResult::NoData);
    }

    #[test]
    fn test_get_data_in_pieces() {
        let driver = SqliteDriver::new(SqliteDriverOptions {
            no_total: true,
            ..Default::default()
        });
        let (_, stmt) = setup(&driver);
        run(&driver, stmt, "SELECT 'abcdefghij'");
        assert!(driver.fetch_scroll(stmt, FetchOrientation::Next, &mut []).is_success());

        let mut buf = [0u8; 5];
        let mut out = Vec::new();
        loop {
            match driver.get_data(stmt, 1, CType::CHAR, &mut buf) {
                SqlResult::SuccessWithInfo(ind) => {
                    assert_eq!(ind, NO_TOTAL);
                    out.extend_from_slice(&buf[..4]);
                }
                SqlResult::Success(len) => {
                    out.extend_from_slice(&buf[..len as usize]);
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(out, b"abcdefghij");
        assert_eq!(driver.get_data(stmt, 1, CType::CHAR, &mut buf), SqlResult::NoData);
    }

    #[test]
    fn test_deferred_parameter() {
        let driver = SqliteDriver::default();
        let (_, stmt) = setup(&driver);
        run(&driver, stmt, "CREATE TABLE d (body TEXT)");
        let sql = SqlText::Narrow(b"INSERT INTO d VALUES (?)".to_vec());
        assert!(driver.prepare(stmt, &sql).is_success());
        let binding = ParamBinding {
            c_type: CType::CHAR,
            sql_type: SqlType::LONGVARCHAR,
            column_size: 0,
            scale: 0,
        };
        assert!(driver.bind_parameter(stmt, 1, binding).is_success());
        let params = [ParamData {
            value: &[],
            indicator: odbx_driver::len_data_at_exec(0),
        }];
        assert_eq!(driver.execute(stmt, &params), SqlResult::NeedData);
        assert_eq!(driver.param_data(stmt), SqlResult::Success(Some(1)));
        assert!(driver.put_data(stmt, Some(b"hello ")).is_success());
        assert!(driver.put_data(stmt, Some(b"world")).is_success());
        assert_eq!(driver.param_data(stmt), SqlResult::Success(None));
        assert_eq!(driver.row_count(stmt), SqlResult::Success(1));

        run(&driver, stmt, "SELECT body FROM d");
        assert!(driver.fetch_scroll(stmt, FetchOrientation::Next, &mut []).is_success());
        let mut buf = [0u8; 64];
        assert_eq!(driver.get_data(stmt, 1, CType::CHAR, &mut buf), SqlResult::Success(11));
        assert_eq!(&buf[..11], b"hello world");
    }

    #[test]
    fn test_forward_only_rejects_scrolling() {
        let driver = SqliteDriver::default();
        let (conn, stmt) = setup(&driver);
        run(&driver, stmt, "SELECT 1 UNION ALL SELECT 2");
        let rc = driver.fetch_scroll(stmt, FetchOrientation::Last, &mut []);
        assert!(rc.is_error());
        assert_eq!(driver.diagnostics(stmt.into())[0].state, "HY106");

        assert!(driver.set_connect_attr(conn, ConnectAttr::CursorType(CursorType::Static)).is_success());
        assert!(driver.fetch_scroll(stmt, FetchOrientation::Last, &mut []).is_success());
    }

    #[test]
    fn test_syntax_error_diagnostics() {
        let driver = SqliteDriver::default();
        let (_, stmt) = setup(&driver);
        let rc = driver.prepare(stmt, &SqlText::Narrow(b"SELEC 1".to_vec()));
        assert!(rc.is_error());
        let diags = driver.diagnostics(stmt.into());
        assert_eq!(diags[0].state, "42000");
        assert_eq!(diags[0].native, 1);
        assert!(diags[0].message.contains("syntax error"));
        assert!(driver.free_statement(stmt, FreeStmt::Drop).is_success());
        assert!(driver.free_statement(stmt, FreeStmt::Drop).is_error());
    }
}
