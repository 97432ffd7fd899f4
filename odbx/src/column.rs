///
/// Result columns.
///
/// One `ResultColumn` per column of the current result set, created when
/// the result is described. A column either owns a bound buffer the driver
/// fills on every fetch, or has none and is read with the chunked reader
/// (`stream::read_value`) when its value is needed.
///

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use odbx_driver::{CType, DateStruct, Driver, SqlType, StmtHandle, TimeStruct, TimestampStruct};

use crate::buffer::ValueBuffer;
use crate::error::{OdbxError, Result};
use crate::null::NullPolicy;
use crate::stream::{GetDataSource, read_value};
use crate::types::{Encoding, HostType};
use crate::value::{Atom, Value};

/// Origin of a column, for `source(true)` statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSource {
    pub table: Atom,
    pub column: Atom,
}

#[derive(Debug, Clone)]
pub struct ResultColumn {
    pub(crate) index: u16,
    pub(crate) name: String,
    pub(crate) sql_type: SqlType,
    pub(crate) c_type: CType,
    pub(crate) host: HostType,
    /// `None`: not bound, read in chunks.
    pub(crate) buffer: Option<ValueBuffer>,
    pub(crate) source: Option<ColumnSource>,
}

impl ResultColumn {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn c_type(&self) -> CType {
        self.c_type
    }

    pub fn host(&self) -> HostType {
        self.host
    }

    pub fn is_chunked(&self) -> bool {
        self.buffer.is_none()
    }

    pub fn source(&self) -> Option<&ColumnSource> {
        self.source.as_ref()
    }

    /// Decode the value of the current row.
    pub(crate) fn decode(
        &self,
        driver: &dyn Driver,
        stmt: StmtHandle,
        null: &NullPolicy,
        encoding: Encoding,
    ) -> Result<Value> {
        let value = match &self.buffer {
            Some(buf) if buf.is_null() => null.value(),
            Some(buf) if self.c_type.is_variable() => {
                decode_bytes(self.c_type, self.host, buf.bytes(self.c_type.terminator_width()), encoding)
            }
            Some(buf) => decode_fixed(self.c_type, self.host, buf)?,
            None => {
                let mut source = GetDataSource {
                    driver,
                    stmt,
                    column: self.index,
                    c_type: self.c_type,
                };
                match read_value(&mut source, self.c_type.terminator_width())? {
                    None => null.value(),
                    Some(bytes) if self.c_type.is_variable() => {
                        decode_bytes(self.c_type, self.host, &bytes, encoding)
                    }
                    Some(bytes) => {
                        let mut buf = ValueBuffer::with_capacity(bytes.len())?;
                        buf.put_bytes(&bytes, 0)?;
                        decode_fixed(self.c_type, self.host, &buf)?
                    }
                }
            }
        };
        Ok(match &self.source {
            Some(src) => Value::Compound(
                Arc::from("column"),
                vec![Value::Atom(src.table.clone()), Value::Atom(src.column.clone()), value],
            ),
            None => value,
        })
    }
}

fn text_value(host: HostType, text: String) -> Value {
    match host {
        HostType::String => Value::Str(Arc::from(text)),
        HostType::Codes => Value::Codes(text.chars().collect()),
        _ => Value::Atom(Arc::from(text)),
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

/// Decode character or binary data.
pub(crate) fn decode_bytes(c_type: CType, host: HostType, bytes: &[u8], encoding: Encoding) -> Value {
    match c_type {
        CType::BINARY if !host.is_textual() => Value::Blob(Arc::from(bytes)),
        CType::BINARY => text_value(host, latin1(bytes)),
        CType::WCHAR => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .collect();
            text_value(host, String::from_utf16_lossy(&units))
        }
        _ if encoding == Encoding::IsoLatin1 => text_value(host, latin1(bytes)),
        _ => text_value(host, String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn date_value(d: &DateStruct) -> Value {
    match NaiveDate::from_ymd_opt(d.year.into(), d.month.into(), d.day.into()) {
        Some(date) => Value::Date(date),
        None => Value::compound(
            "date",
            vec![Value::Int(d.year.into()), Value::Int(d.month.into()), Value::Int(d.day.into())],
        ),
    }
}

fn time_value(t: &TimeStruct) -> Value {
    match NaiveTime::from_hms_opt(t.hour.into(), t.minute.into(), t.second.into()) {
        Some(time) => Value::Time(time),
        None => Value::compound(
            "time",
            vec![Value::Int(t.hour.into()), Value::Int(t.minute.into()), Value::Int(t.second.into())],
        ),
    }
}

fn naive(ts: &TimestampStruct) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(ts.year.into(), ts.month.into(), ts.day.into())?.and_hms_nano_opt(
        ts.hour.into(),
        ts.minute.into(),
        ts.second.into(),
        ts.fraction,
    )
}

fn timestamp_value(ts: &TimestampStruct, host: HostType) -> Result<Value> {
    let stamp = naive(ts);
    Ok(match (host, stamp) {
        (HostType::Integer, Some(stamp)) => Value::Int(stamp.and_utc().timestamp()),
        (HostType::Float, Some(stamp)) => {
            let utc = stamp.and_utc();
            Value::Float(utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) / 1e9)
        }
        (HostType::Integer | HostType::Float, None) => return Err(OdbxError::Representation("timestamp")),
        (_, Some(stamp)) => Value::Timestamp(stamp),
        (_, None) => Value::compound(
            "timestamp",
            vec![
                Value::Int(ts.year.into()),
                Value::Int(ts.month.into()),
                Value::Int(ts.day.into()),
                Value::Int(ts.hour.into()),
                Value::Int(ts.minute.into()),
                Value::Int(ts.second.into()),
                Value::Int(ts.fraction.into()),
            ],
        ),
    })
}

/// Decode a fixed-layout value.
pub(crate) fn decode_fixed(c_type: CType, host: HostType, buf: &ValueBuffer) -> Result<Value> {
    let short = || OdbxError::Representation("column_width");
    Ok(match c_type {
        CType::SLONG => Value::Int(buf.i32().ok_or_else(short)?.into()),
        CType::SBIGINT => Value::Int(buf.i64().ok_or_else(short)?),
        CType::DOUBLE => Value::Float(buf.f64().ok_or_else(short)?),
        CType::TYPE_DATE => date_value(&buf.date().ok_or_else(short)?),
        CType::TYPE_TIME => time_value(&buf.time().ok_or_else(short)?),
        CType::TYPE_TIMESTAMP => timestamp_value(&buf.timestamp().ok_or_else(short)?, host)?,
        other => return Err(OdbxError::domain("c_type", other.0)),
    })
}
