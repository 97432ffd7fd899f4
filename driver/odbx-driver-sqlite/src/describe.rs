///
/// Declared-type to SQL type mapping.
///
/// SQLite keeps the declared type of a table column as free text. We map
/// the common spellings onto SQL type ids, and fall back to SQLite's
/// affinity rules for everything else. Expression columns carry no
/// declared type at all; their description is inferred from the data once
/// the result set is materialized.
///

use odbx_driver::SqlType;
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub sql_type: SqlType,
    pub column_size: usize,
    pub decimal_digits: i16,
}

impl TypeInfo {
    const fn new(sql_type: SqlType, column_size: usize, decimal_digits: i16) -> Self {
        Self {
            sql_type,
            column_size,
            decimal_digits,
        }
    }
}

/// Column size reported for text whose width is not declared.
pub const DEFAULT_TEXT_WIDTH: usize = 255;

/// Split `VARCHAR(20)` / `decimal(10, 2)` into an upper-cased base name and
/// its numeric arguments.
fn split_decl(decl: &str) -> (String, Vec<usize>) {
    let (base, args) = match decl.find('(') {
        Some(open) => {
            let close = decl[open..].find(')').map(|c| open + c).unwrap_or(decl.len());
            (&decl[..open], &decl[open + 1..close])
        }
        None => (decl, ""),
    };
    let base = base.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
    let args = args
        .split(',')
        .filter_map(|a| a.trim().parse::<usize>().ok())
        .collect();
    (base, args)
}

pub fn from_decl_type(decl: &str) -> TypeInfo {
    let (base, args) = split_decl(decl);
    let width = args.first().copied();
    match base.as_str() {
        "INT" | "INTEGER" | "MEDIUMINT" => TypeInfo::new(SqlType::INTEGER, 10, 0),
        "BIGINT" | "INT8" | "UNSIGNED BIG INT" => TypeInfo::new(SqlType::BIGINT, 19, 0),
        "SMALLINT" | "INT2" => TypeInfo::new(SqlType::SMALLINT, 5, 0),
        "TINYINT" => TypeInfo::new(SqlType::TINYINT, 3, 0),
        "BIT" | "BOOL" | "BOOLEAN" => TypeInfo::new(SqlType::BIT, 1, 0),
        "CHAR" | "CHARACTER" => TypeInfo::new(SqlType::CHAR, width.unwrap_or(1), 0),
        "VARCHAR" | "VARYING CHARACTER" => {
            TypeInfo::new(SqlType::VARCHAR, width.unwrap_or(DEFAULT_TEXT_WIDTH), 0)
        }
        "TEXT" | "CLOB" | "LONGVARCHAR" => TypeInfo::new(SqlType::LONGVARCHAR, width.unwrap_or(0), 0),
        "NCHAR" | "NATIVE CHARACTER" => TypeInfo::new(SqlType::WCHAR, width.unwrap_or(1), 0),
        "NVARCHAR" | "NVARCHAR2" => {
            TypeInfo::new(SqlType::WVARCHAR, width.unwrap_or(DEFAULT_TEXT_WIDTH), 0)
        }
        "NTEXT" | "NCLOB" => TypeInfo::new(SqlType::WLONGVARCHAR, 0, 0),
        "BINARY" => TypeInfo::new(SqlType::BINARY, width.unwrap_or(1), 0),
        "VARBINARY" => TypeInfo::new(SqlType::VARBINARY, width.unwrap_or(DEFAULT_TEXT_WIDTH), 0),
        "BLOB" | "LONGVARBINARY" => TypeInfo::new(SqlType::LONGVARBINARY, 0, 0),
        "REAL" => TypeInfo::new(SqlType::REAL, 7, 0),
        "FLOAT" => TypeInfo::new(SqlType::FLOAT, 15, 0),
        "DOUBLE" | "DOUBLE PRECISION" => TypeInfo::new(SqlType::DOUBLE, 15, 0),
        "DECIMAL" | "NUMERIC" => {
            let ty = if base == "DECIMAL" { SqlType::DECIMAL } else { SqlType::NUMERIC };
            let scale = args.get(1).copied().unwrap_or(0) as i16;
            TypeInfo::new(ty, width.unwrap_or(15), scale)
        }
        "DATE" => TypeInfo::new(SqlType::TYPE_DATE, 10, 0),
        "TIME" => TypeInfo::new(SqlType::TYPE_TIME, 8, 0),
        "TIMESTAMP" | "DATETIME" => TypeInfo::new(SqlType::TYPE_TIMESTAMP, 29, 9),
        _ => by_affinity(&base),
    }
}

/// SQLite's own column affinity rules (section 3.1 of the datatype docs).
fn by_affinity(base: &str) -> TypeInfo {
    if base.contains("INT") {
        TypeInfo::new(SqlType::BIGINT, 19, 0)
    } else if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") {
        TypeInfo::new(SqlType::LONGVARCHAR, 0, 0)
    } else if base.contains("BLOB") || base.is_empty() {
        TypeInfo::new(SqlType::LONGVARBINARY, 0, 0)
    } else if base.contains("REAL") || base.contains("FLOA") || base.contains("DOUB") {
        TypeInfo::new(SqlType::DOUBLE, 15, 0)
    } else {
        TypeInfo::new(SqlType::NUMERIC, 15, 0)
    }
}

/// Widen a declared character or binary size to the widest stored value.
/// SQLite does not enforce declared widths.
pub fn widen<'a>(info: TypeInfo, values: impl Iterator<Item = &'a Value>) -> TypeInfo {
    if info.column_size == 0 {
        return info;
    }
    let wide = info.sql_type.is_wide_character();
    if !info.sql_type.is_character() && !info.sql_type.is_binary() {
        return info;
    }
    let widest = values
        .map(|value| match value {
            Value::Text(s) if wide => s.encode_utf16().count(),
            Value::Text(s) if info.sql_type.is_binary() => s.len(),
            Value::Text(s) => s.chars().count(),
            Value::Blob(b) => b.len(),
            Value::Integer(i) => i.to_string().len(),
            Value::Real(f) => f.to_string().len(),
            Value::Null => 0,
        })
        .max()
        .unwrap_or(0);
    TypeInfo {
        column_size: info.column_size.max(widest),
        ..info
    }
}

/// Describe an expression column from the values it produced.
pub fn infer<'a>(values: impl Iterator<Item = &'a Value>) -> TypeInfo {
    let mut seen: Option<TypeInfo> = None;
    let mut widest = 0usize;
    for value in values {
        let info = match value {
            Value::Null => continue,
            Value::Integer(_) => TypeInfo::new(SqlType::BIGINT, 19, 0),
            Value::Real(_) => TypeInfo::new(SqlType::DOUBLE, 15, 0),
            Value::Text(s) => {
                widest = widest.max(s.chars().count());
                TypeInfo::new(SqlType::VARCHAR, 0, 0)
            }
            Value::Blob(b) => {
                widest = widest.max(b.len());
                TypeInfo::new(SqlType::VARBINARY, 0, 0)
            }
        };
        if seen.is_none() {
            seen = Some(info);
        }
    }
    match seen {
        Some(info) if info.sql_type == SqlType::VARCHAR || info.sql_type == SqlType::VARBINARY => {
            TypeInfo::new(info.sql_type, widest.max(1), 0)
        }
        Some(info) => info,
        None => TypeInfo::new(SqlType::VARCHAR, DEFAULT_TEXT_WIDTH, 0),
    }
}
