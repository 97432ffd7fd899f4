///
/// Conversions between C buffer images and SQLite values.
///
/// Parameters arrive as byte images of the bound C type and become
/// `rusqlite` values; column values go the other way when a row is
/// written into bound buffers or pulled with `get_data`. Narrow character
/// data is UTF-8, wide character data is native-endian UTF-16. Dates and
/// times are stored as ISO-8601 text, as SQLite's date functions expect.
///

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use odbx_driver::{CType, DateStruct, DiagRecord, Len, TimeStruct, TimestampStruct};
use rusqlite::types::Value;

fn cast_error(what: &str) -> DiagRecord {
    DiagRecord::new(
        "22018",
        0,
        format!("Invalid character value for cast specification: {what}"),
    )
}

fn range_error() -> DiagRecord {
    DiagRecord::new("22003", 0, "Numeric value out of range")
}

fn datetime_error(text: &str) -> DiagRecord {
    DiagRecord::new("22007", 0, format!("Invalid datetime format: {text}"))
}

fn program_type_error(c_type: CType) -> DiagRecord {
    DiagRecord::new("HY003", 0, format!("Program type out of range: {}", c_type.0))
}

/// Decode the C image of a bound input parameter.
///
/// `indicator` is the byte length of variable-length data; a negative
/// value means the buffer is NUL-terminated.
pub fn param_value(c_type: CType, bytes: &[u8], indicator: Len) -> Result<Value, DiagRecord> {
    let variable = |bytes: &[u8]| -> Vec<u8> {
        let len = if indicator >= 0 {
            (indicator as usize).min(bytes.len())
        } else {
            bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len())
        };
        bytes[..len].to_vec()
    };
    match c_type {
        CType::CHAR | CType::WCHAR | CType::BINARY => Ok(deferred_value(c_type, &variable(bytes))),
        CType::SLONG => {
            let raw: [u8; 4] = bytes.get(..4).and_then(|b| b.try_into().ok()).ok_or_else(range_error)?;
            Ok(Value::Integer(i32::from_ne_bytes(raw) as i64))
        }
        CType::SBIGINT => {
            let raw: [u8; 8] = bytes.get(..8).and_then(|b| b.try_into().ok()).ok_or_else(range_error)?;
            Ok(Value::Integer(i64::from_ne_bytes(raw)))
        }
        CType::DOUBLE => {
            let raw: [u8; 8] = bytes.get(..8).and_then(|b| b.try_into().ok()).ok_or_else(range_error)?;
            Ok(Value::Real(f64::from_ne_bytes(raw)))
        }
        CType::TYPE_DATE => {
            let d = DateStruct::from_bytes(bytes).ok_or_else(|| datetime_error("date struct"))?;
            Ok(Value::Text(format!("{:04}-{:02}-{:02}", d.year, d.month, d.day)))
        }
        CType::TYPE_TIME => {
            let t = TimeStruct::from_bytes(bytes).ok_or_else(|| datetime_error("time struct"))?;
            Ok(Value::Text(format!("{:02}:{:02}:{:02}", t.hour, t.minute, t.second)))
        }
        CType::TYPE_TIMESTAMP => {
            let ts = TimestampStruct::from_bytes(bytes)
                .ok_or_else(|| datetime_error("timestamp struct"))?;
            Ok(Value::Text(timestamp_text(&ts)))
        }
        other => Err(program_type_error(other)),
    }
}

/// Decode the concatenated `put_data` pieces of a deferred parameter.
pub fn deferred_value(c_type: CType, bytes: &[u8]) -> Value {
    match c_type {
        CType::BINARY => Value::Blob(bytes.to_vec()),
        CType::WCHAR => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .collect();
            Value::Text(String::from_utf16_lossy(&units))
        }
        _ => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn timestamp_text(ts: &TimestampStruct) -> String {
    let mut text = format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        ts.year, ts.month, ts.day, ts.hour, ts.minute, ts.second
    );
    if ts.fraction > 0 {
        let frac = format!("{:09}", ts.fraction);
        text.push('.');
        text.push_str(frac.trim_end_matches('0'));
    }
    text
}

fn real_text(f: f64) -> String {
    format!("{f}")
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => real_text(*f),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => b.iter().map(|byte| format!("{byte:02X}")).collect(),
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let trimmed = text.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
        .or_else(|| parse_timestamp(trimmed).map(|ts| ts.time()))
}

fn epoch(seconds: f64) -> Option<NaiveDateTime> {
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos).map(|t| t.naive_utc())
}

fn as_timestamp(value: &Value) -> Result<NaiveDateTime, DiagRecord> {
    match value {
        Value::Text(s) => parse_timestamp(s).ok_or_else(|| datetime_error(s)),
        Value::Integer(i) => epoch(*i as f64).ok_or_else(range_error),
        Value::Real(f) => epoch(*f).ok_or_else(range_error),
        other => Err(cast_error(&text_of(other))),
    }
}

fn year16(year: i32) -> Result<i16, DiagRecord> {
    i16::try_from(year).map_err(|_| range_error())
}

fn as_i64(value: &Value) -> Result<i64, DiagRecord> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Real(f) if f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 => {
            Ok(f.trunc() as i64)
        }
        Value::Real(_) => Err(range_error()),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f.trunc() as i64))
                .map_err(|_| cast_error(s))
        }
        other => Err(cast_error(&text_of(other))),
    }
}

/// The complete C image of a (non-NULL) column value, without terminator.
pub fn column_bytes(value: &Value, c_type: CType) -> Result<Vec<u8>, DiagRecord> {
    match c_type {
        CType::CHAR => Ok(text_of(value).into_bytes()),
        CType::WCHAR => Ok(text_of(value)
            .encode_utf16()
            .flat_map(|u| u.to_ne_bytes())
            .collect()),
        CType::BINARY => Ok(match value {
            Value::Blob(b) => b.clone(),
            Value::Integer(i) => i.to_ne_bytes().to_vec(),
            Value::Real(f) => f.to_ne_bytes().to_vec(),
            other => text_of(other).into_bytes(),
        }),
        CType::SLONG => {
            let v = as_i64(value)?;
            let v = i32::try_from(v).map_err(|_| range_error())?;
            Ok(v.to_ne_bytes().to_vec())
        }
        CType::SBIGINT => Ok(as_i64(value)?.to_ne_bytes().to_vec()),
        CType::DOUBLE => {
            let v = match value {
                Value::Integer(i) => *i as f64,
                Value::Real(f) => *f,
                Value::Text(s) => s.trim().parse::<f64>().map_err(|_| cast_error(s))?,
                other => return Err(cast_error(&text_of(other))),
            };
            Ok(v.to_ne_bytes().to_vec())
        }
        CType::TYPE_DATE => {
            let date = match value {
                Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
                    .ok_or_else(|| datetime_error(s))?,
                other => as_timestamp(other)?.date(),
            };
            let ds = DateStruct {
                year: year16(date.year())?,
                month: date.month() as u16,
                day: date.day() as u16,
            };
            Ok(ds.to_bytes().to_vec())
        }
        CType::TYPE_TIME => {
            let time = match value {
                Value::Text(s) => parse_time(s).ok_or_else(|| datetime_error(s))?,
                other => as_timestamp(other)?.time(),
            };
            let ts = TimeStruct {
                hour: time.hour() as u16,
                minute: time.minute() as u16,
                second: time.second() as u16,
            };
            Ok(ts.to_bytes().to_vec())
        }
        CType::TYPE_TIMESTAMP => {
            let t = as_timestamp(value)?;
            let ts = TimestampStruct {
                year: year16(t.year())?,
                month: t.month() as u16,
                day: t.day() as u16,
                hour: t.hour() as u16,
                minute: t.minute() as u16,
                second: t.second() as u16,
                fraction: t.nanosecond().min(999_999_999),
            };
            Ok(ts.to_bytes().to_vec())
        }
        other => Err(program_type_error(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_param_text_trims_fraction() {
        let ts = TimestampStruct {
            year: 2024,
            month: 2,
            day: 29,
            hour: 8,
            minute: 5,
            second: 1,
            fraction: 250_000_000,
        };
        let v = param_value(CType::TYPE_TIMESTAMP, &ts.to_bytes(), 16).unwrap();
        assert_eq!(v, Value::Text("2024-02-29 08:05:01.25".into()));
    }

    #[test]
    fn test_text_column_to_timestamp_struct() {
        let bytes = column_bytes(&Value::Text("2024-02-29 08:05:01.25".into()), CType::TYPE_TIMESTAMP)
            .unwrap();
        let ts = TimestampStruct::from_bytes(&bytes).unwrap();
        assert_eq!((ts.year, ts.month, ts.day), (2024, 2, 29));
        assert_eq!(ts.fraction, 250_000_000);

        let bytes = column_bytes(&Value::Text("2024-02-29".into()), CType::TYPE_DATE).unwrap();
        assert_eq!(DateStruct::from_bytes(&bytes).unwrap().day, 29);
    }

    #[test]
    fn test_integer_range_is_checked() {
        let big = Value::Integer(i64::from(i32::MAX) + 1);
        assert_eq!(column_bytes(&big, CType::SLONG).unwrap_err().state, "22003");
        assert_eq!(column_bytes(&big, CType::SBIGINT).unwrap().len(), 8);
        let err = column_bytes(&Value::Text("abc".into()), CType::SLONG).unwrap_err();
        assert_eq!(err.state, "22018");
    }

    #[test]
    fn test_wide_text_round_trip() {
        let bytes = column_bytes(&Value::Text("Zoë".into()), CType::WCHAR).unwrap();
        assert_eq!(bytes.len(), 6);
        assert_eq!(deferred_value(CType::WCHAR, &bytes), Value::Text("Zoë".into()));
    }

    #[test]
    fn test_char_param_respects_indicator() {
        let v = param_value(CType::CHAR, b"abcdef\0\0", 3).unwrap();
        assert_eq!(v, Value::Text("abc".into()));
        let v = param_value(CType::CHAR, b"abc\0zz", -3).unwrap();
        assert_eq!(v, Value::Text("abc".into()));
    }
}
