///
/// Statement contexts.
///
/// A `StatementContext` owns one driver statement handle together with
/// everything needed to run it again: the SQL text, the declared
/// parameters and, once a result has been described, the result columns
/// and their buffers.
///
/// Lifecycle:
///
/// ```text
/// Created -> TextBound -> Prepared -> ParamsBound -> Executing
///         -> Described -> Bound -> Fetching <-> MoreRows -> Eof -> Closed
/// ```
///
/// Closing a persistent (prepared) context returns the handle to the driver
/// with `FreeStmt::Close` so it can be executed again; closing any other
/// context frees it.
///

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use odbx_driver::{
    BoundColumn, ColAttribute, DiagHandle, Driver, FetchOrientation, FreeStmt, ParamData, SqlResult, SqlText,
    StmtHandle,
};
use tracing::{debug, trace, warn};

use crate::buffer::ValueBuffer;
use crate::column::{ColumnSource, ResultColumn};
use crate::config::CatalogWidth;
use crate::connection::Connection;
use crate::error::{OdbxError, Result};
use crate::null::NullPolicy;
use crate::options::{FetchMode, StatementOptions};
use crate::param::{Parameter, latin1};
use crate::projection::FindallProgram;
use crate::registry::ExecutingRegistry;
use crate::report::{self, Reported, driver_error};
use crate::types::{BindDecision, ColumnPlan, Encoding, HostType, ParamSpec, SqlDecl, plan_column, resolve_c_type};
use crate::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub u64);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "statement#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u16);

impl Flags {
    /// Prepared by the user; survives close.
    pub const PERSISTENT: Flags = Flags(0x0001);
    /// Result columns described and bound.
    pub const BOUND: Flags = Flags(0x0002);
    /// A result set is open.
    pub const INUSE: Flags = Flags(0x0004);
    pub const OWNNULL: Flags = Flags(0x0008);
    pub const SOURCE: Flags = Flags(0x0010);
    pub const SILENT: Flags = Flags(0x0020);
    /// The next row has already been fetched.
    pub const PREFETCHED: Flags = Flags(0x0040);
    pub const COLUMNS: Flags = Flags(0x0080);
    pub const TABLES: Flags = Flags(0x0100);
    /// Rows are pulled with explicit fetches.
    pub const NOAUTO: Flags = Flags(0x0200);
    pub const EXECUTING: Flags = Flags(0x0400);
    pub const FREED: Flags = Flags(0x0800);

    const NAMES: [(Flags, &'static str); 12] = [
        (Flags::PERSISTENT, "persistent"),
        (Flags::BOUND, "bound"),
        (Flags::INUSE, "inuse"),
        (Flags::OWNNULL, "ownnull"),
        (Flags::SOURCE, "source"),
        (Flags::SILENT, "silent"),
        (Flags::PREFETCHED, "prefetched"),
        (Flags::COLUMNS, "columns"),
        (Flags::TABLES, "tables"),
        (Flags::NOAUTO, "noauto"),
        (Flags::EXECUTING, "executing"),
        (Flags::FREED, "freed"),
    ];

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Flags::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("Flags(empty)")
        } else {
            write!(f, "Flags({})", names.join("|"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Created,
    TextBound,
    Prepared,
    ParamsBound,
    Executing,
    Described,
    Bound,
    Fetching,
    MoreRows,
    Eof,
    Closed,
}

/// How a context produces its result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Execution {
    Direct,
    Prepared,
    Tables,
    Columns(String),
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    created: AtomicU64,
    freed: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> Statistics {
        Statistics {
            created: self.created.load(Ordering::Relaxed),
            freed: self.freed.load(Ordering::Relaxed),
        }
    }
}

/// Statement contexts created and freed since the engine started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub created: u64,
    pub freed: u64,
}

impl Statistics {
    pub fn live(&self) -> u64 {
        self.created.saturating_sub(self.freed)
    }
}

pub struct StatementContext {
    id: StatementId,
    conn: Arc<Connection>,
    driver: Arc<dyn Driver>,
    handle: StmtHandle,
    counters: Arc<Counters>,
    execution: Execution,
    text: Option<SqlText>,
    params: Vec<Parameter>,
    /// `Some(vec![])` once described as a statement without a result set.
    columns: Option<Vec<ResultColumn>>,
    types: Option<Vec<HostType>>,
    findall: Option<Arc<FindallProgram>>,
    null: Arc<NullPolicy>,
    encoding: Encoding,
    threshold: usize,
    catalog: CatalogWidth,
    flags: Flags,
    state: CursorState,
    /// The execution itself answered `NoData`.
    no_data: bool,
    /// Values of the current row, decoded on first access.
    cells: Vec<Option<Value>>,
    /// Number of executions started; identifies the open result.
    generation: u64,
}

impl fmt::Debug for StatementContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementContext")
            .field("id", &self.id)
            .field("connection", &self.conn.id())
            .field("handle", &self.handle)
            .field("flags", &self.flags)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StatementContext {
    pub(crate) fn new(
        id: StatementId,
        conn: Arc<Connection>,
        driver: Arc<dyn Driver>,
        counters: Arc<Counters>,
    ) -> Result<Self> {
        let settings = conn.settings();
        let handle = report::require(
            &*driver,
            conn.handle().into(),
            settings.silent,
            driver.alloc_statement(conn.handle()),
        )?;
        counters.created.fetch_add(1, Ordering::Relaxed);
        let mut flags = Flags::default();
        if settings.silent {
            flags.insert(Flags::SILENT);
        }
        trace!(statement = %id, %handle, connection = %conn.id(), "allocated");
        Ok(Self {
            id,
            conn,
            driver,
            handle,
            counters,
            execution: Execution::Direct,
            text: None,
            params: Vec::new(),
            columns: None,
            types: None,
            findall: None,
            null: settings.null,
            encoding: settings.encoding,
            threshold: settings.wide_column_threshold,
            catalog: CatalogWidth::Off,
            flags,
            state: CursorState::Created,
            no_data: false,
            cells: Vec::new(),
            generation: 0,
        })
    }

    pub fn id(&self) -> StatementId {
        self.id
    }

    pub fn handle(&self) -> StmtHandle {
        self.handle
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Changes with every execution.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_freed(&self) -> bool {
        self.flags.contains(Flags::FREED)
    }

    pub fn text(&self) -> Option<String> {
        self.text.as_ref().map(SqlText::to_string_lossy)
    }

    pub fn parameters(&self) -> Vec<ParamSpec> {
        self.params.iter().map(Parameter::spec).collect()
    }

    /// Result columns; empty until described.
    pub fn columns(&self) -> &[ResultColumn] {
        self.columns.as_deref().unwrap_or_default()
    }

    pub fn program(&self) -> Option<&FindallProgram> {
        self.findall.as_deref()
    }

    pub fn null_policy(&self) -> &NullPolicy {
        &self.null
    }

    pub(crate) fn set_flag(&mut self, flag: Flags) {
        self.flags.insert(flag);
    }

    pub(crate) fn clear_flag(&mut self, flag: Flags) {
        self.flags.remove(flag);
    }

    /// Clears `PREFETCHED`, returning whether it was set.
    pub(crate) fn take_prefetched(&mut self) -> bool {
        let was = self.flags.contains(Flags::PREFETCHED);
        self.flags.remove(Flags::PREFETCHED);
        was
    }

    pub(crate) fn is_no_data(&self) -> bool {
        self.no_data
    }

    /// Described, and the result has columns.
    pub(crate) fn has_result(&self) -> bool {
        self.columns.as_ref().is_some_and(|c| !c.is_empty())
    }

    fn silent(&self) -> bool {
        self.flags.contains(Flags::SILENT)
    }

    fn diag(&self) -> DiagHandle {
        self.handle.into()
    }

    fn report<T>(&self, rc: SqlResult<T>) -> Result<Reported<T>> {
        report::report(&*self.driver, self.diag(), self.silent(), rc)
    }

    fn require<T>(&self, rc: SqlResult<T>) -> Result<T> {
        report::require(&*self.driver, self.diag(), self.silent(), rc)
    }

    fn warn_on_error(&self, rc: SqlResult<()>, what: &'static str) {
        if let SqlResult::Error { function } = rc {
            let err = driver_error(&*self.driver, self.diag(), function);
            warn!(statement = %self.id, error = %err, "{what} failed");
        }
    }

    pub(crate) fn set_text(&mut self, sql: &str) -> Result<()> {
        let text = match self.encoding {
            Encoding::Wide => SqlText::Wide(sql.encode_utf16().collect()),
            Encoding::IsoLatin1 => SqlText::Narrow(latin1(sql)?),
            Encoding::Utf8 => SqlText::Narrow(sql.as_bytes().to_vec()),
        };
        self.text = Some(text);
        self.state = CursorState::TextBound;
        Ok(())
    }

    pub(crate) fn apply_options(&mut self, options: &StatementOptions) -> Result<()> {
        if let Some(types) = &options.types {
            self.types = Some(types.clone());
        }
        if let Some(null) = &options.null {
            self.null = Arc::new(null.clone());
            self.flags.insert(Flags::OWNNULL);
        }
        if options.source {
            self.flags.insert(Flags::SOURCE);
        }
        if let Some((template, row)) = &options.findall {
            let program = FindallProgram::compile(template, row, self.flags.contains(Flags::PERSISTENT))?;
            trace!(statement = %self.id, %program, "findall program");
            self.findall = Some(Arc::new(program));
        }
        match options.fetch {
            FetchMode::Auto => self.flags.remove(Flags::NOAUTO),
            FetchMode::Fetch => self.flags.insert(Flags::NOAUTO),
        }
        if let Some(threshold) = options.wide_column_threshold {
            self.threshold = threshold;
        }
        Ok(())
    }

    /// A catalog listing of tables, character columns bound at `width`.
    pub(crate) fn for_tables(&mut self, width: CatalogWidth, null: NullPolicy) {
        self.execution = Execution::Tables;
        self.catalog = width;
        self.null = Arc::new(null);
        self.flags.insert(Flags::TABLES | Flags::OWNNULL);
    }

    /// A catalog listing of the columns of `table`.
    pub(crate) fn for_columns(&mut self, table: &str, threshold: usize, null: NullPolicy) {
        self.execution = Execution::Columns(table.to_string());
        self.threshold = threshold;
        self.null = Arc::new(null);
        self.flags.insert(Flags::COLUMNS | Flags::OWNNULL);
    }

    /// Prepare the text and declare one parameter per spec. Specs without
    /// a SQL type are described by the driver.
    pub(crate) fn prepare(&mut self, specs: &[ParamSpec]) -> Result<()> {
        let text = self
            .text
            .as_ref()
            .ok_or_else(|| OdbxError::context("no_text", format!("{} has no SQL text", self.id)))?;
        self.require(self.driver.prepare(self.handle, text))?;
        self.execution = Execution::Prepared;
        self.state = CursorState::Prepared;

        let count = self.require(self.driver.num_params(self.handle))?;
        if usize::from(count) != specs.len() {
            return Err(OdbxError::domain(
                "length",
                format!("{} parameter types for {count} parameters", specs.len()),
            ));
        }
        let mut params = Vec::with_capacity(specs.len());
        for (index, spec) in (1..=count).zip(specs) {
            let decl = match spec.sql {
                Some(decl) => decl,
                None => {
                    let desc = self.require(self.driver.describe_param(self.handle, index))?;
                    SqlDecl {
                        sql_type: desc.sql_type,
                        length: (desc.column_size > 0).then_some(desc.column_size),
                        scale: (desc.decimal_digits != 0).then_some(desc.decimal_digits),
                    }
                }
            };
            let param = Parameter::declare(index, spec.host, decl, self.encoding)?;
            self.require(self.driver.bind_parameter(self.handle, index, param.binding()))?;
            params.push(param);
        }
        self.params = params;
        debug!(statement = %self.id, params = self.params.len(), "prepared");
        Ok(())
    }

    pub(crate) fn bind_values(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.params.len() {
            return Err(OdbxError::domain(
                "length",
                format!("{} values for {} parameters", values.len(), self.params.len()),
            ));
        }
        let null = Arc::clone(&self.null);
        for (param, value) in self.params.iter_mut().zip(values) {
            param.encode(value, &null, self.encoding)?;
        }
        self.state = CursorState::ParamsBound;
        Ok(())
    }

    /// Run the statement. On failure the context is closed.
    pub(crate) fn execute(&mut self, executing: &ExecutingRegistry) -> Result<()> {
        self.generation += 1;
        self.flags.insert(Flags::INUSE);
        self.flags.remove(Flags::PREFETCHED);
        self.no_data = false;
        let status = {
            let _executing = executing.enter(self.handle);
            self.flags.insert(Flags::EXECUTING);
            self.state = CursorState::Executing;
            let status = self.run();
            self.flags.remove(Flags::EXECUTING);
            status
        };
        match status {
            Ok(()) => {
                trace!(statement = %self.id, no_data = self.no_data, "executed");
                Ok(())
            }
            Err(err) => {
                debug!(statement = %self.id, error = %err, "execution failed");
                self.close();
                Err(err)
            }
        }
    }

    fn run(&mut self) -> Result<()> {
        let data: Vec<ParamData<'_>> = self.params.iter().map(Parameter::data).collect();
        let rc = match &self.execution {
            Execution::Prepared => self.driver.execute(self.handle, &data),
            Execution::Direct => {
                let text = self
                    .text
                    .as_ref()
                    .ok_or_else(|| OdbxError::context("no_text", format!("{} has no SQL text", self.id)))?;
                self.driver.exec_direct(self.handle, text, &data)
            }
            Execution::Tables => self.driver.tables(self.handle),
            Execution::Columns(table) => self.driver.columns(self.handle, table),
        };
        let mut status = self.report(rc)?;
        while status == Reported::NeedData {
            status = match self.report(self.driver.param_data(self.handle))? {
                Reported::Done(Some(index)) => {
                    self.put_deferred(index)?;
                    Reported::NeedData
                }
                Reported::Done(None) => Reported::Done(()),
                Reported::NoData => Reported::NoData,
                Reported::NeedData => {
                    return Err(OdbxError::context("need_data", "driver did not name a parameter"));
                }
            };
        }
        self.no_data = status == Reported::NoData;
        Ok(())
    }

    fn put_deferred(&self, index: u16) -> Result<()> {
        let param = index
            .checked_sub(1)
            .and_then(|i| self.params.get(usize::from(i)))
            .ok_or_else(|| OdbxError::context("need_data", format!("driver asked for parameter {index}")))?;
        let bytes = match param.deferred_bytes(&self.null, self.encoding) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.warn_on_error(self.driver.cancel(self.handle), "cancel");
                return Err(err);
            }
        };
        trace!(statement = %self.id, param = index, len = bytes.as_ref().map_or(0, Vec::len), "put_data");
        self.require(self.driver.put_data(self.handle, bytes.as_deref()))
    }

    /// Describe the result set and bind its columns.
    pub(crate) fn describe(&mut self) -> Result<()> {
        let ncol = self.require(self.driver.num_result_cols(self.handle))?;
        self.state = CursorState::Described;
        if ncol == 0 {
            self.columns = Some(Vec::new());
            self.cells.clear();
            self.flags.insert(Flags::BOUND);
            self.state = CursorState::Bound;
            return Ok(());
        }
        if let Some(types) = &self.types {
            if types.len() != usize::from(ncol) {
                return Err(OdbxError::ColumnCountMismatch {
                    declared: types.len(),
                    actual: usize::from(ncol),
                });
            }
        }
        let catalog_width = if self.flags.contains(Flags::TABLES) {
            match self.catalog {
                CatalogWidth::Off => None,
                CatalogWidth::FromDriver => self.conn.max_identifier_len(&*self.driver),
                CatalogWidth::Fixed(width) => Some(width),
            }
        } else {
            None
        };

        let mut columns = Vec::with_capacity(usize::from(ncol));
        for index in 1..=ncol {
            let desc = self.require(self.driver.describe_col(self.handle, index))?;
            let host = self
                .types
                .as_ref()
                .and_then(|types| types.get(usize::from(index - 1)).copied())
                .unwrap_or(HostType::Default);
            let source = if self.flags.contains(Flags::SOURCE) {
                let rc = self.driver.col_attribute(self.handle, index, ColAttribute::TableName);
                let table = match self.report(rc)? {
                    Reported::Done(table) => table,
                    Reported::NoData | Reported::NeedData => String::new(),
                };
                Some(ColumnSource {
                    table: Arc::from(table),
                    column: Arc::from(desc.name.as_str()),
                })
            } else {
                None
            };
            if !desc.sql_type.is_known() {
                warn!(statement = %self.id, column = index, sql_type = desc.sql_type.0, "unknown SQL type, reading as text");
            }
            let c_type = resolve_c_type(desc.sql_type, host, self.encoding)
                .ok_or_else(|| OdbxError::domain("column_type", format!("{host}>{}", desc.sql_type)))?;
            let decision = plan_column(&ColumnPlan {
                sql_type: desc.sql_type,
                c_type,
                column_size: desc.column_size,
                threshold: self.threshold,
                encoding: self.encoding,
                catalog_width,
            });
            let buffer = match decision {
                BindDecision::BindInline(capacity) | BindDecision::UseCatalogWidthOverride(capacity) => {
                    let buffer = ValueBuffer::with_capacity(capacity)?;
                    self.require(self.driver.bind_col(self.handle, index, c_type, capacity))?;
                    Some(buffer)
                }
                BindDecision::UseChunkedReader => None,
            };
            debug!(
                statement = %self.id,
                column = index,
                name = %desc.name,
                sql_type = %desc.sql_type,
                %c_type,
                size = desc.column_size,
                ?decision,
                "column"
            );
            columns.push(ResultColumn {
                index,
                name: desc.name,
                sql_type: desc.sql_type,
                c_type,
                host,
                buffer,
                source,
            });
        }
        self.cells = vec![None; columns.len()];
        self.columns = Some(columns);
        self.flags.insert(Flags::BOUND);
        self.state = CursorState::Bound;
        Ok(())
    }

    /// Move the cursor. `false` at the end of the result set.
    pub(crate) fn fetch(&mut self, orientation: FetchOrientation) -> Result<bool> {
        let Some(columns) = self.columns.as_mut() else {
            return Err(OdbxError::context("not_described", format!("{} has no result columns", self.id)));
        };
        self.state = CursorState::Fetching;
        let mut bound: Vec<BoundColumn<'_>> = columns
            .iter_mut()
            .filter_map(|column| {
                let index = column.index;
                column.buffer.as_mut().map(|buffer| buffer.bind(index))
            })
            .collect();
        let rc = self.driver.fetch_scroll(self.handle, orientation, &mut bound);
        drop(bound);
        match self.report(rc)? {
            Reported::Done(()) => {
                let n = self.columns().len();
                self.cells.clear();
                self.cells.resize(n, None);
                self.state = CursorState::MoreRows;
                Ok(true)
            }
            Reported::NoData => {
                self.state = CursorState::Eof;
                Ok(false)
            }
            Reported::NeedData => Err(OdbxError::context("need_data", "unexpected request for data")),
        }
    }

    /// Value of 1-based `column` in the current row.
    pub(crate) fn cell(&mut self, column: u16) -> Result<Value> {
        let slot = usize::from(column)
            .checked_sub(1)
            .filter(|slot| *slot < self.cells.len())
            .ok_or_else(|| OdbxError::domain("column", column))?;
        if let Some(value) = &self.cells[slot] {
            return Ok(value.clone());
        }
        let value = self.columns()[slot].decode(&*self.driver, self.handle, &self.null, self.encoding)?;
        self.cells[slot] = Some(value.clone());
        Ok(value)
    }

    pub(crate) fn row(&mut self) -> Result<Row> {
        let n = self.cells.len();
        let mut values = Vec::with_capacity(n);
        for column in 1..=n {
            // the column count came from a u16
            values.push(self.cell(column as u16)?);
        }
        Ok(Row::new(values))
    }

    /// The findall template instantiated for the current row.
    pub(crate) fn project(&mut self) -> Result<Value> {
        let Some(program) = self.findall.clone() else {
            return Err(OdbxError::context("no_findall", format!("{} has no findall template", self.id)));
        };
        program.run(&mut |column| self.cell(column))
    }

    /// Rows affected by a statement without a result set.
    pub(crate) fn affected(&self) -> Result<i64> {
        if self.no_data {
            return Ok(0);
        }
        self.require(self.driver.row_count(self.handle))
    }

    /// Advance to the next result set. Column bindings are dropped either
    /// way; `false` when there is none.
    pub(crate) fn next_result_set(&mut self) -> Result<bool> {
        let rc = self.driver.more_results(self.handle);
        self.warn_on_error(self.driver.free_statement(self.handle, FreeStmt::Unbind), "unbind");
        self.columns = None;
        self.cells.clear();
        self.flags.remove(Flags::BOUND | Flags::PREFETCHED);
        match self.report(rc) {
            Ok(Reported::Done(())) => {
                self.state = CursorState::Executing;
                Ok(true)
            }
            Ok(Reported::NoData) => Ok(false),
            Ok(Reported::NeedData) => Err(OdbxError::context("need_data", "unexpected request for data")),
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    /// End the current result set.
    pub(crate) fn close(&mut self) {
        self.flags.remove(Flags::INUSE | Flags::PREFETCHED);
        if self.is_freed() {
            return;
        }
        if self.flags.contains(Flags::PERSISTENT) {
            self.warn_on_error(self.driver.free_statement(self.handle, FreeStmt::Close), "close");
            self.state = CursorState::Closed;
            trace!(statement = %self.id, "closed");
        } else {
            self.free();
        }
    }

    /// Release the driver handle and all buffers. Idempotent.
    pub(crate) fn free(&mut self) {
        if self.is_freed() {
            return;
        }
        self.warn_on_error(self.driver.free_statement(self.handle, FreeStmt::Drop), "free");
        self.params.clear();
        self.columns = None;
        self.cells.clear();
        self.findall = None;
        self.flags = Flags::FREED;
        self.state = CursorState::Closed;
        self.counters.freed.fetch_add(1, Ordering::Relaxed);
        debug!(statement = %self.id, "freed");
    }

    /// A new context on the same connection running the same statement
    /// with the same parameter declarations, result columns, NULL policy
    /// and findall program.
    pub(crate) fn clone_context(&self, id: StatementId) -> Result<StatementContext> {
        let text = self
            .text
            .clone()
            .ok_or_else(|| OdbxError::context("clone", format!("{} has no SQL text", self.id)))?;
        let mut clone = StatementContext::new(
            id,
            Arc::clone(&self.conn),
            Arc::clone(&self.driver),
            Arc::clone(&self.counters),
        )?;
        clone.encoding = self.encoding;
        clone.threshold = self.threshold;
        clone.catalog = self.catalog;
        for flag in [Flags::OWNNULL, Flags::SOURCE, Flags::SILENT, Flags::NOAUTO] {
            if self.flags.contains(flag) {
                clone.flags.insert(flag);
            }
        }

        if self.execution == Execution::Prepared {
            clone.require(clone.driver.prepare(clone.handle, &text))?;
            for (index, param) in (1..).zip(&self.params) {
                clone.require(clone.driver.bind_parameter(clone.handle, index, param.binding()))?;
            }
            clone.params = self.params.clone();
            clone.state = CursorState::Prepared;
        } else {
            clone.state = CursorState::TextBound;
        }
        clone.execution = self.execution.clone();
        clone.text = Some(text);

        if self.flags.contains(Flags::BOUND) {
            if let Some(columns) = &self.columns {
                for column in columns {
                    if let Some(buffer) = &column.buffer {
                        clone.require(clone.driver.bind_col(clone.handle, column.index, column.c_type, buffer.capacity()))?;
                    }
                }
                clone.cells = vec![None; columns.len()];
                clone.columns = Some(columns.clone());
                clone.flags.insert(Flags::BOUND);
            }
        }
        clone.types = self.types.clone();
        clone.null = Arc::clone(&self.null);
        clone.findall = self.findall.clone();
        debug!(statement = %self.id, clone = %id, "cloned");
        Ok(clone)
    }
}

impl Drop for StatementContext {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionId, Settings};
    use crate::types::DEFAULT_WIDE_COLUMN_THRESHOLD;
    use odbx_driver::ConnectRequest;
    use odbx_driver_sqlite::SqliteDriver;

    struct Fixture {
        driver: Arc<SqliteDriver>,
        conn: Arc<Connection>,
        counters: Arc<Counters>,
        executing: ExecutingRegistry,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let dsn = dir.path().join("test.db").to_string_lossy().into_owned();
            let driver = Arc::new(SqliteDriver::default());
            let handle = driver.connect(&ConnectRequest::new(dsn.as_str())).value().unwrap();
            let settings = Settings {
                encoding: Encoding::Utf8,
                null: Arc::new(NullPolicy::default()),
                silent: false,
                wide_column_threshold: DEFAULT_WIDE_COLUMN_THRESHOLD,
            };
            let conn = Arc::new(Connection::new(ConnectionId(1), handle, &dsn, None, settings));
            Self {
                driver,
                conn,
                counters: Arc::new(Counters::default()),
                executing: ExecutingRegistry::new(),
                _dir: dir,
            }
        }

        fn context(&self, id: u64) -> StatementContext {
            let driver: Arc<dyn Driver> = self.driver.clone();
            StatementContext::new(StatementId(id), Arc::clone(&self.conn), driver, Arc::clone(&self.counters)).unwrap()
        }

        fn run(&self, sql: &str) {
            let mut ctx = self.context(0);
            ctx.set_text(sql).unwrap();
            ctx.execute(&self.executing).unwrap();
            ctx.close();
        }
    }

    #[test]
    fn test_flags() {
        let mut flags = Flags::default();
        flags.insert(Flags::PERSISTENT | Flags::INUSE);
        assert!(flags.contains(Flags::INUSE));
        flags.remove(Flags::INUSE);
        assert!(!flags.contains(Flags::INUSE));
        assert!(flags.contains(Flags::PERSISTENT));
        assert_eq!(format!("{flags:?}"), "Flags(persistent)");
        assert_eq!(format!("{:?}", Flags::default()), "Flags(empty)");
    }

    #[test]
    fn test_direct_query_rows_then_end() {
        let fx = Fixture::new();
        let mut ctx = fx.context(1);
        ctx.set_text("SELECT 1, 'one' UNION ALL SELECT 2, 'two'").unwrap();
        ctx.execute(&fx.executing).unwrap();
        assert!(ctx.flags().contains(Flags::INUSE));
        ctx.describe().unwrap();
        assert_eq!(ctx.state(), CursorState::Bound);
        assert_eq!(ctx.columns().len(), 2);

        assert!(ctx.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(ctx.row().unwrap().to_string(), "row(1, one)");
        assert!(ctx.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(ctx.cell(1).unwrap(), Value::Int(2));
        assert!(!ctx.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(ctx.state(), CursorState::Eof);

        ctx.close();
        assert!(ctx.is_freed());
        assert_eq!(fx.counters.snapshot(), Statistics { created: 1, freed: 1 });
        assert_eq!(fx.driver.open_statements(), 0);
    }

    #[test]
    fn test_prepared_statement_survives_close() {
        let fx = Fixture::new();
        fx.run("CREATE TABLE t (id INTEGER, name VARCHAR(20))");
        let mut ctx = fx.context(1);
        ctx.set_flag(Flags::PERSISTENT);
        ctx.set_text("INSERT INTO t VALUES (?, ?)").unwrap();
        ctx.prepare(&["integer".parse().unwrap(), ParamSpec::default_spec()]).unwrap();
        assert_eq!(ctx.parameters().len(), 2);

        for (id, name) in [(1, "a"), (2, "b")] {
            ctx.bind_values(&[Value::Int(id), Value::atom(name)]).unwrap();
            ctx.execute(&fx.executing).unwrap();
            ctx.describe().unwrap();
            assert!(!ctx.has_result());
            assert_eq!(ctx.affected().unwrap(), 1);
            ctx.close();
            assert!(!ctx.is_freed());
        }
        assert!(matches!(
            ctx.bind_values(&[Value::Int(3)]),
            Err(OdbxError::Domain { domain: "length", .. })
        ));
    }

    #[test]
    fn test_parameter_count_must_match() {
        let fx = Fixture::new();
        let mut ctx = fx.context(1);
        ctx.set_text("SELECT ?").unwrap();
        assert!(matches!(
            ctx.prepare(&[]),
            Err(OdbxError::Domain { domain: "length", .. })
        ));
    }

    #[test]
    fn test_declared_types_must_match_columns() {
        let fx = Fixture::new();
        let mut ctx = fx.context(1);
        ctx.set_text("SELECT 1, 2").unwrap();
        ctx.apply_options(&StatementOptions::new().types(vec![HostType::Integer])).unwrap();
        ctx.execute(&fx.executing).unwrap();
        assert!(matches!(
            ctx.describe(),
            Err(OdbxError::ColumnCountMismatch { declared: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_cells_are_decoded_once_per_row() {
        let fx = Fixture::new();
        let mut ctx = fx.context(1);
        ctx.set_text("SELECT NULL").unwrap();
        ctx.apply_options(&StatementOptions::new().null(NullPolicy::Var)).unwrap();
        ctx.execute(&fx.executing).unwrap();
        ctx.describe().unwrap();
        assert!(ctx.fetch(FetchOrientation::Next).unwrap());
        let first = ctx.cell(1).unwrap();
        assert!(first.is_var());
        assert_eq!(ctx.cell(1).unwrap(), first);
        assert!(matches!(ctx.cell(2), Err(OdbxError::Domain { domain: "column", .. })));
    }

    #[test]
    fn test_source_wraps_cells() {
        let fx = Fixture::new();
        fx.run("CREATE TABLE people (name TEXT)");
        fx.run("INSERT INTO people VALUES ('ann')");
        let mut ctx = fx.context(1);
        ctx.set_text("SELECT name FROM people").unwrap();
        ctx.apply_options(&StatementOptions::new().source(true)).unwrap();
        ctx.execute(&fx.executing).unwrap();
        ctx.describe().unwrap();
        assert!(ctx.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(ctx.cell(1).unwrap().to_string(), "column(people, name, ann)");
    }

    #[test]
    fn test_clone_runs_independently() {
        let fx = Fixture::new();
        let mut ctx = fx.context(1);
        ctx.set_flag(Flags::PERSISTENT);
        ctx.set_text("SELECT ? + 1").unwrap();
        ctx.prepare(&["integer".parse().unwrap()]).unwrap();
        ctx.bind_values(&[Value::Int(1)]).unwrap();
        ctx.execute(&fx.executing).unwrap();
        ctx.describe().unwrap();

        let mut clone = ctx.clone_context(StatementId(2)).unwrap();
        assert!(clone.flags().contains(Flags::BOUND));
        assert!(!clone.flags().contains(Flags::PERSISTENT));
        clone.bind_values(&[Value::Int(41)]).unwrap();
        clone.execute(&fx.executing).unwrap();
        assert!(clone.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(clone.cell(1).unwrap(), Value::Int(42));

        assert!(ctx.fetch(FetchOrientation::Next).unwrap());
        assert_eq!(ctx.cell(1).unwrap(), Value::Int(2));

        clone.close();
        assert!(clone.is_freed());
        ctx.free();
        assert_eq!(fx.counters.snapshot(), Statistics { created: 2, freed: 2 });
    }

    #[test]
    fn test_drop_frees_handle() {
        let fx = Fixture::new();
        {
            let mut ctx = fx.context(1);
            ctx.set_text("SELECT 1").unwrap();
            ctx.execute(&fx.executing).unwrap();
            assert_eq!(fx.driver.open_statements(), 1);
        }
        assert_eq!(fx.driver.open_statements(), 0);
        assert_eq!(fx.counters.snapshot().live(), 0);
    }
}
