///
/// Type Descriptor Resolver
///
/// Pure functions deciding how a value crosses the driver boundary:
///
/// - `resolve_c_type` maps a SQL type and the requested host
///   representation to the C buffer type to bind
/// - `param_size` sizes the buffer of an input parameter
/// - `plan_column` decides per result column between an inline buffer and
///   the chunked reader
///
/// None of these touch the driver or log; callers report what they decide.
///

use std::fmt;
use std::str::FromStr;

use odbx_driver::{CType, SqlType};
use serde::{Deserialize, Serialize};

use crate::error::{OdbxError, Result};

/// Size of the inline part of a value buffer (`sizeof(double)`).
pub const INLINE_BUFFER_SIZE: usize = 8;

/// Default width above which columns bypass inline binding.
pub const DEFAULT_WIDE_COLUMN_THRESHOLD: usize = 1024;

/// Wide-column threshold used by column catalog listings.
pub const COLUMNS_THRESHOLD: usize = 8192;

/// The host representation a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostType {
    #[default]
    Default,
    Atom,
    String,
    Codes,
    Integer,
    Float,
    Time,
    Date,
    Timestamp,
}

impl HostType {
    pub fn name(self) -> &'static str {
        match self {
            HostType::Default => "default",
            HostType::Atom => "atom",
            HostType::String => "string",
            HostType::Codes => "codes",
            HostType::Integer => "integer",
            HostType::Float => "float",
            HostType::Time => "time",
            HostType::Date => "date",
            HostType::Timestamp => "timestamp",
        }
    }

    pub fn is_textual(self) -> bool {
        matches!(self, HostType::Atom | HostType::String | HostType::Codes)
    }
}

impl FromStr for HostType {
    type Err = OdbxError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "default" => HostType::Default,
            "atom" => HostType::Atom,
            "string" => HostType::String,
            "codes" => HostType::Codes,
            "integer" => HostType::Integer,
            "float" => HostType::Float,
            "time" => HostType::Time,
            "date" => HostType::Date,
            "timestamp" => HostType::Timestamp,
            other => return Err(OdbxError::domain("column_type", other)),
        })
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Character set of narrow text, or wide (UTF-16) text throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Utf8,
    #[serde(rename = "iso_latin_1")]
    IsoLatin1,
    Wide,
}

impl Encoding {
    pub fn is_wide(self) -> bool {
        self == Encoding::Wide
    }

    /// Bytes reserved per character in narrow character buffers.
    pub fn narrow_char_size(self) -> usize {
        match self {
            Encoding::Utf8 => 4,
            _ => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::IsoLatin1 => "iso_latin_1",
            Encoding::Wide => "wide",
        }
    }
}

impl FromStr for Encoding {
    type Err = OdbxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "utf8" => Ok(Encoding::Utf8),
            "iso_latin_1" => Ok(Encoding::IsoLatin1),
            "wide" | "unicode" => Ok(Encoding::Wide),
            other => Err(OdbxError::domain("encoding", other)),
        }
    }
}

/// The C buffer type for `sql_type` under `host`, or `None` when the
/// combination has no conversion.
pub fn resolve_c_type(sql_type: SqlType, host: HostType, encoding: Encoding) -> Option<CType> {
    let wide_or_char = |t: SqlType| {
        if t.is_wide_character() && encoding.is_wide() {
            CType::WCHAR
        } else {
            CType::CHAR
        }
    };
    let temporal = matches!(
        sql_type,
        SqlType::DATE
            | SqlType::TIME
            | SqlType::TIMESTAMP
            | SqlType::TYPE_DATE
            | SqlType::TYPE_TIME
            | SqlType::TYPE_TIMESTAMP
    );
    let timestamp = sql_type == SqlType::TIMESTAMP || sql_type == SqlType::TYPE_TIMESTAMP;
    match host {
        HostType::Default => Some(match sql_type {
            t if t.is_binary() => CType::BINARY,
            t if t.is_character() => wide_or_char(t),
            SqlType::DECIMAL | SqlType::NUMERIC => CType::CHAR,
            SqlType::REAL | SqlType::FLOAT | SqlType::DOUBLE => CType::DOUBLE,
            SqlType::BIT | SqlType::TINYINT | SqlType::SMALLINT | SqlType::INTEGER => CType::SLONG,
            SqlType::BIGINT => CType::SBIGINT,
            SqlType::DATE | SqlType::TYPE_DATE => CType::TYPE_DATE,
            SqlType::TIME | SqlType::TYPE_TIME => CType::TYPE_TIME,
            SqlType::TIMESTAMP | SqlType::TYPE_TIMESTAMP => CType::TYPE_TIMESTAMP,
            _ => CType::CHAR,
        }),
        HostType::Atom | HostType::String | HostType::Codes => Some(match sql_type {
            t if t.is_binary() => CType::BINARY,
            t => wide_or_char(t),
        }),
        HostType::Integer if sql_type.is_binary() => None,
        HostType::Integer if timestamp => Some(CType::TYPE_TIMESTAMP),
        HostType::Integer if temporal => None,
        HostType::Integer if sql_type == SqlType::BIGINT => Some(CType::SBIGINT),
        HostType::Integer => Some(CType::SLONG),
        HostType::Float if sql_type.is_binary() => None,
        HostType::Float if timestamp => Some(CType::TYPE_TIMESTAMP),
        HostType::Float if temporal => None,
        HostType::Float => Some(CType::DOUBLE),
        HostType::Date | HostType::Time | HostType::Timestamp
            if sql_type.is_binary() || !(temporal || sql_type.is_character()) =>
        {
            None
        }
        HostType::Date => Some(CType::TYPE_DATE),
        HostType::Time => Some(CType::TYPE_TIME),
        HostType::Timestamp => Some(CType::TYPE_TIMESTAMP),
    }
}

/// A SQL type as written in a parameter declaration: `varchar(20)`,
/// `decimal(10,2)`, `integer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDecl {
    pub sql_type: SqlType,
    pub length: Option<usize>,
    pub scale: Option<i16>,
}

impl SqlDecl {
    pub fn new(sql_type: SqlType) -> Self {
        Self {
            sql_type,
            length: None,
            scale: None,
        }
    }
}

impl FromStr for SqlDecl {
    type Err = OdbxError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, args) = match s.split_once('(') {
            Some((name, rest)) => {
                let args = rest
                    .strip_suffix(')')
                    .ok_or_else(|| OdbxError::domain("sql_type", s))?;
                (name.trim(), Some(args))
            }
            None => (s, None),
        };
        let sql_type = SqlType::from_name(name).ok_or_else(|| OdbxError::domain("sql_type", s))?;
        let mut decl = SqlDecl::new(sql_type);
        if let Some(args) = args {
            let mut parts = args.split(',').map(str::trim);
            let length = parts.next().and_then(|p| p.parse::<usize>().ok());
            decl.length = Some(length.ok_or_else(|| OdbxError::domain("sql_type", s))?);
            if let Some(scale) = parts.next() {
                let scale = scale.parse::<i16>().map_err(|_| OdbxError::domain("sql_type", s))?;
                decl.scale = Some(scale);
            }
            if parts.next().is_some() {
                return Err(OdbxError::domain("sql_type", s));
            }
        }
        Ok(decl)
    }
}

impl fmt::Display for SqlDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type.name())?;
        match (self.length, self.scale) {
            (Some(n), Some(s)) => write!(f, "({n},{s})"),
            (Some(n), None) => write!(f, "({n})"),
            _ => Ok(()),
        }
    }
}

/// Declaration of one statement parameter: `integer`, `atom > varchar(20)`
/// or `default` (ask the driver).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub host: HostType,
    /// `None` until described by the driver.
    pub sql: Option<SqlDecl>,
}

impl ParamSpec {
    pub fn default_spec() -> Self {
        Self {
            host: HostType::Default,
            sql: None,
        }
    }

    pub fn sql(decl: SqlDecl) -> Self {
        Self {
            host: HostType::Default,
            sql: Some(decl),
        }
    }
}

impl FromStr for ParamSpec {
    type Err = OdbxError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "default" {
            return Ok(ParamSpec::default_spec());
        }
        match s.split_once('>') {
            Some((host, sql)) => {
                let host = host.parse::<HostType>()?;
                let sql = match sql.trim() {
                    "default" => None,
                    other => Some(other.parse::<SqlDecl>()?),
                };
                Ok(ParamSpec { host, sql })
            }
            None => Ok(ParamSpec::sql(s.parse()?)),
        }
    }
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.host, &self.sql) {
            (HostType::Default, Some(sql)) => write!(f, "{sql}"),
            (HostType::Default, None) => f.write_str("default"),
            (host, Some(sql)) => write!(f, "{host}>{sql}"),
            (host, None) => write!(f, "{host}>default"),
        }
    }
}

/// Buffer requirements of an input parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSize {
    /// A fixed-layout value of this many bytes.
    Fixed(usize),
    /// Character or binary data of at most `max_len` bytes, in a buffer of
    /// `capacity` bytes (terminator included).
    Variable { max_len: usize, capacity: usize },
    /// Size unknown: the value is supplied with `put_data` at execute time.
    Deferred,
}

impl ParamSize {
    pub fn capacity(self) -> usize {
        match self {
            ParamSize::Fixed(n) => n,
            ParamSize::Variable { capacity, .. } => capacity,
            ParamSize::Deferred => 0,
        }
    }
}

pub fn param_size(c_type: CType, sql_type: SqlType, column_size: usize, encoding: Encoding) -> ParamSize {
    if let Some(n) = c_type.fixed_size() {
        return ParamSize::Fixed(n);
    }
    let char_size = match c_type {
        CType::WCHAR => 2,
        CType::CHAR => encoding.narrow_char_size(),
        _ => 1,
    };
    let mut n = column_size;
    if n == 0 {
        return ParamSize::Deferred;
    }
    if sql_type == SqlType::DECIMAL || sql_type == SqlType::NUMERIC {
        n += 2 * char_size;
    }
    ParamSize::Variable {
        max_len: n * char_size,
        capacity: (n + 1) * char_size,
    }
}

/// How one result column is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDecision {
    /// Bind a buffer of this many bytes.
    BindInline(usize),
    /// Leave unbound; read with the chunked reader.
    UseChunkedReader,
    /// Catalog identifier column: bind at the identifier width instead.
    UseCatalogWidthOverride(usize),
}

/// Inputs for the per-column decision.
#[derive(Debug, Clone, Copy)]
pub struct ColumnPlan {
    pub sql_type: SqlType,
    pub c_type: CType,
    pub column_size: usize,
    pub threshold: usize,
    pub encoding: Encoding,
    /// Identifier width to force on character columns of a table listing.
    pub catalog_width: Option<usize>,
}

pub fn plan_column(plan: &ColumnPlan) -> BindDecision {
    let size = plan.column_size;
    if let Some(width) = plan.catalog_width.filter(|w| *w > 0) {
        if plan.sql_type == SqlType::VARCHAR || plan.sql_type == SqlType::LONGVARCHAR {
            return BindDecision::UseCatalogWidthOverride(width + 1);
        }
    }
    if plan.sql_type == SqlType::LONGVARCHAR || plan.sql_type == SqlType::LONGVARBINARY {
        if size == 0 || size > plan.threshold {
            return BindDecision::UseChunkedReader;
        }
        return BindDecision::BindInline(size + 1);
    }
    match plan.c_type {
        CType::CHAR => {
            if size == 0 {
                return BindDecision::UseChunkedReader;
            }
            // sign and decimal point
            let size = size + 2;
            if size > plan.threshold {
                return BindDecision::UseChunkedReader;
            }
            BindDecision::BindInline((size + 1) * plan.encoding.narrow_char_size())
        }
        CType::WCHAR => {
            if size == 0 || size > plan.threshold {
                return BindDecision::UseChunkedReader;
            }
            BindDecision::BindInline((size + 1) * 2)
        }
        CType::BINARY => {
            if size == 0 || size > plan.threshold {
                return BindDecision::UseChunkedReader;
            }
            BindDecision::BindInline((size + 1) * plan.encoding.narrow_char_size())
        }
        other => match other.fixed_size() {
            Some(n) => BindDecision::BindInline(n),
            None => BindDecision::UseChunkedReader,
        },
    }
}
