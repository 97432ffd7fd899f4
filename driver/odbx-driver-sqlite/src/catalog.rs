///
/// Catalog listings.
///
/// `SQLTables` and `SQLColumns` shaped result sets built from
/// `sqlite_master` and `pragma_table_info`. Identifier columns are
/// reported as VARCHAR(128).
///

use odbx_driver::{Nullability, SqlType};
use rusqlite::types::Value;
use rusqlite::Connection;

use crate::cursor::{ColumnMeta, ResultSet};
use crate::describe::{self, TypeInfo};

const IDENTIFIER_WIDTH: usize = 128;

fn column(name: &str, sql_type: SqlType, size: usize) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        info: TypeInfo {
            sql_type,
            column_size: size,
            decimal_digits: 0,
        },
        nullable: Nullability::Nullable,
        table: String::new(),
        declared: true,
    }
}

fn identifier(name: &str) -> ColumnMeta {
    column(name, SqlType::VARCHAR, IDENTIFIER_WIDTH)
}

pub fn tables(db: &Connection) -> rusqlite::Result<ResultSet> {
    let columns = vec![
        identifier("TABLE_CAT"),
        identifier("TABLE_SCHEM"),
        identifier("TABLE_NAME"),
        identifier("TABLE_TYPE"),
        column("REMARKS", SqlType::VARCHAR, 254),
    ];
    let mut st = db.prepare(
        "SELECT name, upper(type) FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let rows = st
        .query_map([], |row| {
            Ok(vec![
                Value::Null,
                Value::Null,
                row.get::<_, Value>(0)?,
                row.get::<_, Value>(1)?,
                Value::Null,
            ])
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ResultSet::new(columns, rows))
}

pub fn columns(db: &Connection, table: &str) -> rusqlite::Result<ResultSet> {
    let columns = vec![
        identifier("TABLE_CAT"),
        identifier("TABLE_SCHEM"),
        identifier("TABLE_NAME"),
        identifier("COLUMN_NAME"),
        column("DATA_TYPE", SqlType::SMALLINT, 5),
        identifier("TYPE_NAME"),
        column("COLUMN_SIZE", SqlType::INTEGER, 10),
        column("BUFFER_LENGTH", SqlType::INTEGER, 10),
        column("DECIMAL_DIGITS", SqlType::SMALLINT, 5),
        column("NUM_PREC_RADIX", SqlType::SMALLINT, 5),
        column("NULLABLE", SqlType::SMALLINT, 5),
        column("REMARKS", SqlType::VARCHAR, 254),
    ];
    let mut st = db.prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = st
        .query_map([table], |row| {
            let name: String = row.get(0)?;
            let decl: String = row.get(1)?;
            let not_null: i64 = row.get(2)?;
            let info = describe::from_decl_type(&decl);
            let numeric = !info.sql_type.is_character() && !info.sql_type.is_binary();
            Ok(vec![
                Value::Null,
                Value::Null,
                Value::Text(table.to_string()),
                Value::Text(name),
                Value::Integer(info.sql_type.0 as i64),
                Value::Text(decl),
                Value::Integer(info.column_size as i64),
                Value::Integer(info.column_size as i64),
                Value::Integer(info.decimal_digits as i64),
                if numeric { Value::Integer(10) } else { Value::Null },
                Value::Integer(if not_null != 0 { 0 } else { 1 }),
                Value::Null,
            ])
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ResultSet::new(columns, rows))
}
