///
/// The Driver Trait
///
/// The call-level interface the engine drives. One method per driver entry
/// point; outputs come back inside `SqlResult`, failure details through
/// `diagnostics()`.
///
/// Binding follows the deferred-buffer model of the interface it mirrors:
/// `bind_parameter` and `bind_col` only declare types and capacities. The
/// engine hands the actual buffers over when the driver reads or writes
/// them (`execute` for parameters, `fetch_scroll` for columns), so no raw
/// pointers cross the boundary.
///
/// A driver must be `Send + Sync`: `cancel` is called from another thread
/// while a different thread is blocked inside `execute` on the same
/// statement.
///

use crate::{ConnHandle, CType, DiagHandle, DiagRecord, Len, SqlResult, SqlType, StmtHandle};

/// Statement text, narrow or wide depending on the connection encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlText {
    Narrow(Vec<u8>),
    Wide(Vec<u16>),
}

impl SqlText {
    /// Length in characters (code units for wide text).
    pub fn len(&self) -> usize {
        match self {
            SqlText::Narrow(b) => b.len(),
            SqlText::Wide(w) => w.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn char_width(&self) -> usize {
        match self {
            SqlText::Narrow(_) => 1,
            SqlText::Wide(_) => 2,
        }
    }

    pub fn to_string_lossy(&self) -> String {
        match self {
            SqlText::Narrow(b) => String::from_utf8_lossy(b).into_owned(),
            SqlText::Wide(w) => String::from_utf16_lossy(w),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdbcVersion {
    V2,
    V3,
    V3_80,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Strict,
    Relaxed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub dsn: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub driver_string: Option<String>,
    pub odbc_version: OdbcVersion,
    pub mars: bool,
    pub pool_mode: Option<PoolMode>,
}

impl ConnectRequest {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            user: None,
            password: None,
            driver_string: None,
            odbc_version: OdbcVersion::V3,
            mars: false,
            pool_mode: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorType {
    ForwardOnly,
    Static,
    KeysetDriven,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttr {
    AutoCommit(bool),
    AccessMode(AccessMode),
    CursorType(CursorType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoType {
    DatabaseName,
    DbmsName,
    DbmsVersion,
    DriverName,
    DriverOdbcVersion,
    DriverVersion,
    ActiveStatements,
    MaxQualifierNameLen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    Text(String),
    Small(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Commit,
    Rollback,
}

/// `SQLFreeStmt` options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeStmt {
    Close,
    Drop,
    Unbind,
    ResetParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrientation {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
    Bookmark(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescription {
    pub sql_type: SqlType,
    /// Column size in characters, 0 if unknown.
    pub column_size: usize,
    pub decimal_digits: i16,
    pub nullable: Nullability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub sql_type: SqlType,
    /// Maximum size in characters, 0 if unknown.
    pub column_size: usize,
    pub decimal_digits: i16,
    pub nullable: Nullability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColAttribute {
    TableName,
    BaseColumnName,
}

/// Input parameter declaration for `bind_parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamBinding {
    pub c_type: CType,
    pub sql_type: SqlType,
    pub column_size: usize,
    pub scale: i16,
}

/// The bytes of one input parameter at execute time.
#[derive(Debug, Clone, Copy)]
pub struct ParamData<'a> {
    pub value: &'a [u8],
    pub indicator: Len,
}

/// A buffer the driver writes one column of the current row into.
#[derive(Debug)]
pub struct BoundColumn<'a> {
    pub column: u16,
    pub data: &'a mut [u8],
    pub indicator: &'a mut Len,
}

pub trait Driver: Send + Sync {
    fn connect(&self, request: &ConnectRequest) -> SqlResult<ConnHandle>;

    fn disconnect(&self, conn: ConnHandle) -> SqlResult<()>;

    fn set_connect_attr(&self, conn: ConnHandle, attr: ConnectAttr) -> SqlResult<()>;

    fn get_info(&self, conn: ConnHandle, info: InfoType) -> SqlResult<InfoValue>;

    fn end_transaction(&self, conn: ConnHandle, completion: Completion) -> SqlResult<()>;

    fn alloc_statement(&self, conn: ConnHandle) -> SqlResult<StmtHandle>;

    /// `FreeStmt::Drop` releases the handle; the others keep it valid.
    fn free_statement(&self, stmt: StmtHandle, option: FreeStmt) -> SqlResult<()>;

    fn prepare(&self, stmt: StmtHandle, text: &SqlText) -> SqlResult<()>;

    /// Execute without a separate prepare. `params` covers any bound
    /// parameters, like `execute`.
    fn exec_direct(&self, stmt: StmtHandle, text: &SqlText, params: &[ParamData<'_>]) -> SqlResult<()>;

    fn num_params(&self, stmt: StmtHandle) -> SqlResult<u16>;

    /// `param` is 1-based.
    fn describe_param(&self, stmt: StmtHandle, param: u16) -> SqlResult<ParamDescription>;

    fn bind_parameter(&self, stmt: StmtHandle, param: u16, binding: ParamBinding) -> SqlResult<()>;

    /// Runs a prepared statement. Returns `NeedData` when a parameter's
    /// indicator announces deferred input; the caller then loops over
    /// `param_data` / `put_data`.
    fn execute(&self, stmt: StmtHandle, params: &[ParamData<'_>]) -> SqlResult<()>;

    /// `Some(n)` asks for the data of 1-based parameter `n` (the
    /// `SQL_NEED_DATA` answer). `None` means all deferred input arrived and
    /// the statement ran; the status is that of the execution.
    fn param_data(&self, stmt: StmtHandle) -> SqlResult<Option<u16>>;

    /// Supply (part of) the value requested by `param_data`; `None` is NULL.
    fn put_data(&self, stmt: StmtHandle, data: Option<&[u8]>) -> SqlResult<()>;

    fn num_result_cols(&self, stmt: StmtHandle) -> SqlResult<u16>;

    /// `column` is 1-based.
    fn describe_col(&self, stmt: StmtHandle, column: u16) -> SqlResult<ColumnDescription>;

    fn col_attribute(&self, stmt: StmtHandle, column: u16, attr: ColAttribute) -> SqlResult<String>;

    /// Declare that `column` is delivered into a `capacity`-byte buffer of
    /// `c_type` on every fetch.
    fn bind_col(&self, stmt: StmtHandle, column: u16, c_type: CType, capacity: usize) -> SqlResult<()>;

    /// Move the cursor and fill the buffers of all bound columns.
    fn fetch_scroll(
        &self,
        stmt: StmtHandle,
        orientation: FetchOrientation,
        bound: &mut [BoundColumn<'_>],
    ) -> SqlResult<()>;

    /// Copy (the next part of) the value of an unbound column of the current
    /// row into `buf`, converted to `c_type`. Returns the length/indicator:
    /// `NULL_DATA`, the number of bytes remaining before this call, or
    /// `NO_TOTAL`. A value that does not fit yields `SuccessWithInfo`; a
    /// call after the last part yields `NoData`.
    fn get_data(&self, stmt: StmtHandle, column: u16, c_type: CType, buf: &mut [u8]) -> SqlResult<Len>;

    fn row_count(&self, stmt: StmtHandle) -> SqlResult<i64>;

    fn more_results(&self, stmt: StmtHandle) -> SqlResult<()>;

    /// Best-effort abort of a call in progress on `stmt`.
    fn cancel(&self, stmt: StmtHandle) -> SqlResult<()>;

    /// Catalog listing of tables, as a result set on `stmt`.
    fn tables(&self, stmt: StmtHandle) -> SqlResult<()>;

    /// Catalog listing of the columns of `table`, as a result set on `stmt`.
    fn columns(&self, stmt: StmtHandle, table: &str) -> SqlResult<()>;

    /// Diagnostic records left by the most recent call on `handle`.
    fn diagnostics(&self, handle: DiagHandle) -> Vec<DiagRecord>;
}
