///
/// SQL Type Ids and C Buffer Type Ids
///
/// Both are open newtypes over `i16` so a driver can report a type the
/// engine has never heard of; the engine decides what to do with it.
///

use std::fmt;

/// SQL data type as reported by `describe_col` / `describe_param`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlType(pub i16);

impl SqlType {
    pub const UNKNOWN: SqlType = SqlType(0);
    pub const CHAR: SqlType = SqlType(1);
    pub const NUMERIC: SqlType = SqlType(2);
    pub const DECIMAL: SqlType = SqlType(3);
    pub const INTEGER: SqlType = SqlType(4);
    pub const SMALLINT: SqlType = SqlType(5);
    pub const FLOAT: SqlType = SqlType(6);
    pub const REAL: SqlType = SqlType(7);
    pub const DOUBLE: SqlType = SqlType(8);
    pub const DATE: SqlType = SqlType(9);
    pub const TIME: SqlType = SqlType(10);
    pub const TIMESTAMP: SqlType = SqlType(11);
    pub const VARCHAR: SqlType = SqlType(12);
    pub const TYPE_DATE: SqlType = SqlType(91);
    pub const TYPE_TIME: SqlType = SqlType(92);
    pub const TYPE_TIMESTAMP: SqlType = SqlType(93);
    pub const LONGVARCHAR: SqlType = SqlType(-1);
    pub const BINARY: SqlType = SqlType(-2);
    pub const VARBINARY: SqlType = SqlType(-3);
    pub const LONGVARBINARY: SqlType = SqlType(-4);
    pub const BIGINT: SqlType = SqlType(-5);
    pub const TINYINT: SqlType = SqlType(-6);
    pub const BIT: SqlType = SqlType(-7);
    pub const WCHAR: SqlType = SqlType(-8);
    pub const WVARCHAR: SqlType = SqlType(-9);
    pub const WLONGVARCHAR: SqlType = SqlType(-10);

    const NAMES: &'static [(SqlType, &'static str)] = &[
        (SqlType::BIGINT, "bigint"),
        (SqlType::BINARY, "binary"),
        (SqlType::BIT, "bit"),
        (SqlType::CHAR, "char"),
        (SqlType::DATE, "date"),
        (SqlType::DECIMAL, "decimal"),
        (SqlType::DOUBLE, "double"),
        (SqlType::FLOAT, "float"),
        (SqlType::INTEGER, "integer"),
        (SqlType::LONGVARBINARY, "longvarbinary"),
        (SqlType::LONGVARCHAR, "longvarchar"),
        (SqlType::NUMERIC, "numeric"),
        (SqlType::REAL, "real"),
        (SqlType::SMALLINT, "smallint"),
        (SqlType::TIME, "time"),
        (SqlType::TIMESTAMP, "timestamp"),
        (SqlType::TINYINT, "tinyint"),
        (SqlType::VARBINARY, "varbinary"),
        (SqlType::VARCHAR, "varchar"),
        (SqlType::WCHAR, "nchar"),
        (SqlType::WLONGVARCHAR, "longnvarchar"),
        (SqlType::WVARCHAR, "nvarchar"),
    ];

    /// Look up a type by its declaration name (`"varchar"`, `"nchar"`, ...).
    pub fn from_name(name: &str) -> Option<SqlType> {
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(t, _)| *t)
    }

    pub fn name(self) -> &'static str {
        match self {
            SqlType::TYPE_DATE => "date",
            SqlType::TYPE_TIME => "time",
            SqlType::TYPE_TIMESTAMP => "timestamp",
            other => Self::NAMES
                .iter()
                .find(|(t, _)| *t == other)
                .map(|(_, n)| *n)
                .unwrap_or("?"),
        }
    }

    pub fn is_known(self) -> bool {
        self.name() != "?"
    }

    pub fn is_character(self) -> bool {
        matches!(
            self,
            SqlType::CHAR
                | SqlType::VARCHAR
                | SqlType::LONGVARCHAR
                | SqlType::WCHAR
                | SqlType::WVARCHAR
                | SqlType::WLONGVARCHAR
        )
    }

    pub fn is_wide_character(self) -> bool {
        matches!(
            self,
            SqlType::WCHAR | SqlType::WVARCHAR | SqlType::WLONGVARCHAR
        )
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            SqlType::BINARY | SqlType::VARBINARY | SqlType::LONGVARBINARY
        )
    }

    pub fn is_long(self) -> bool {
        matches!(
            self,
            SqlType::LONGVARCHAR | SqlType::LONGVARBINARY | SqlType::WLONGVARCHAR
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            "?" => write!(f, "sql_type({})", self.0),
            name => f.write_str(name),
        }
    }
}

/// C buffer type a value is converted to (results) or from (parameters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CType(pub i16);

impl CType {
    pub const CHAR: CType = CType(1);
    pub const WCHAR: CType = CType(-8);
    pub const BINARY: CType = CType(-2);
    pub const SLONG: CType = CType(-16);
    pub const SBIGINT: CType = CType(-25);
    pub const DOUBLE: CType = CType(8);
    pub const TYPE_DATE: CType = CType(91);
    pub const TYPE_TIME: CType = CType(92);
    pub const TYPE_TIMESTAMP: CType = CType(93);

    pub fn name(self) -> &'static str {
        match self {
            CType::CHAR => "char",
            CType::WCHAR => "wchar",
            CType::BINARY => "binary",
            CType::SLONG => "slong",
            CType::SBIGINT => "sbigint",
            CType::DOUBLE => "double",
            CType::TYPE_DATE => "type_date",
            CType::TYPE_TIME => "type_time",
            CType::TYPE_TIMESTAMP => "timestamp",
            _ => "?",
        }
    }

    /// Bytes the driver reserves after the payload of each chunk.
    pub fn terminator_width(self) -> usize {
        match self {
            CType::CHAR => 1,
            CType::WCHAR => 2,
            _ => 0,
        }
    }

    /// Variable-length types are character and binary buffers.
    pub fn is_variable(self) -> bool {
        matches!(self, CType::CHAR | CType::WCHAR | CType::BINARY)
    }

    /// Size of a fixed-width buffer; `None` for variable-length types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            CType::SLONG => Some(4),
            CType::SBIGINT => Some(8),
            CType::DOUBLE => Some(8),
            CType::TYPE_DATE => Some(crate::DateStruct::SIZE),
            CType::TYPE_TIME => Some(crate::TimeStruct::SIZE),
            CType::TYPE_TIMESTAMP => Some(crate::TimestampStruct::SIZE),
            _ => None,
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_names_round_trip() {
        for name in ["bigint", "varchar", "nchar", "longnvarchar", "decimal", "timestamp"] {
            let ty = SqlType::from_name(name).expect("known type");
            assert_eq!(ty.name(), name);
        }
        assert_eq!(SqlType::from_name("blob"), None);
        assert_eq!(SqlType::TYPE_TIMESTAMP.name(), "timestamp");
        assert_eq!(SqlType(77).to_string(), "sql_type(77)");
    }

    #[test]
    fn test_sql_type_classes() {
        assert!(SqlType::WVARCHAR.is_character());
        assert!(SqlType::WVARCHAR.is_wide_character());
        assert!(!SqlType::VARCHAR.is_wide_character());
        assert!(SqlType::VARBINARY.is_binary());
        assert!(SqlType::LONGVARBINARY.is_long());
        assert!(!SqlType::INTEGER.is_character());
    }

    #[test]
    fn test_c_type_sizes() {
        assert_eq!(CType::SLONG.fixed_size(), Some(4));
        assert_eq!(CType::TYPE_TIMESTAMP.fixed_size(), Some(16));
        assert_eq!(CType::TYPE_DATE.fixed_size(), Some(6));
        assert_eq!(CType::CHAR.fixed_size(), None);
        assert_eq!(CType::CHAR.terminator_width(), 1);
        assert_eq!(CType::WCHAR.terminator_width(), 2);
        assert_eq!(CType::BINARY.terminator_width(), 0);
    }
}
