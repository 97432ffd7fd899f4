///
/// Statement parameters.
///
/// A `Parameter` is declared once when a statement is prepared (SQL type,
/// C type, buffer) and filled on every execution from a host value. The
/// indicator of a deferred parameter stays `len_data_at_exec(0)` at all
/// times: its value is kept as given and only converted when the driver
/// asks for it during execute.
///

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use odbx_driver::{
    CType, DateStruct, Len, ParamBinding, ParamData, SqlType, TimeStruct, TimestampStruct,
    len_data_at_exec,
};
use tracing::debug;

use crate::buffer::ValueBuffer;
use crate::error::{OdbxError, Result};
use crate::null::NullPolicy;
use crate::types::{Encoding, HostType, ParamSize, ParamSpec, SqlDecl, param_size, resolve_c_type};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Parameter {
    spec: ParamSpec,
    decl: SqlDecl,
    c_type: CType,
    size: ParamSize,
    buffer: ValueBuffer,
    put_data: Option<Value>,
}

impl Parameter {
    /// Declare parameter `index` (1-based) with a resolved SQL type.
    pub(crate) fn declare(index: u16, host: HostType, decl: SqlDecl, encoding: Encoding) -> Result<Self> {
        let c_type = resolve_c_type(decl.sql_type, host, encoding)
            .ok_or_else(|| OdbxError::domain("parameter_type", format!("{host}>{decl}")))?;
        let size = param_size(c_type, decl.sql_type, decl.length.unwrap_or(0), encoding);
        let mut buffer = ValueBuffer::with_capacity(size.capacity())?;
        if size == ParamSize::Deferred {
            buffer.set_indicator(len_data_at_exec(0));
        }
        debug!(
            param = index,
            sql_type = %decl.sql_type,
            host = %host,
            c_type = %c_type,
            size = size.capacity(),
            "declared parameter"
        );
        Ok(Self {
            spec: ParamSpec { host, sql: Some(decl) },
            decl,
            c_type,
            size,
            buffer,
            put_data: None,
        })
    }

    /// The declaration, as resolved (driver-described types filled in).
    pub fn spec(&self) -> ParamSpec {
        self.spec
    }

    pub fn c_type(&self) -> CType {
        self.c_type
    }

    pub fn sql_type(&self) -> SqlType {
        self.decl.sql_type
    }

    pub fn is_deferred(&self) -> bool {
        self.size == ParamSize::Deferred
    }

    pub fn indicator(&self) -> Len {
        self.buffer.indicator()
    }

    pub(crate) fn binding(&self) -> ParamBinding {
        ParamBinding {
            c_type: self.c_type,
            sql_type: self.decl.sql_type,
            column_size: match self.size {
                ParamSize::Variable { max_len, .. } => max_len,
                _ => 0,
            },
            scale: self.decl.scale.unwrap_or(0),
        }
    }

    pub(crate) fn data(&self) -> ParamData<'_> {
        ParamData {
            value: self.buffer.as_slice(),
            indicator: self.buffer.indicator(),
        }
    }

    /// Load `value` for the next execution.
    pub(crate) fn encode(&mut self, value: &Value, null: &NullPolicy, encoding: Encoding) -> Result<()> {
        if self.is_deferred() {
            self.put_data = Some(value.clone());
            return Ok(());
        }
        let c_type = self.c_type;
        let buffer = &mut self.buffer;
        let fixed = match c_type {
            CType::SLONG => match value {
                Value::Int(i) => i32::try_from(*i).ok().map(|v| buffer.put_i32(v)),
                _ => None,
            }
            .ok_or("32 bit integer"),
            CType::SBIGINT => match value {
                Value::Int(i) => Some(buffer.put_i64(*i)),
                _ => None,
            }
            .ok_or("64 bit integer"),
            CType::DOUBLE => match value {
                Value::Float(f) => Some(buffer.put_f64(*f)),
                Value::Int(i) => Some(buffer.put_f64(*i as f64)),
                _ => None,
            }
            .ok_or("float"),
            CType::TYPE_DATE => date_struct(value).map(|d| buffer.put_date(&d)).ok_or("date"),
            CType::TYPE_TIME => time_struct(value).map(|t| buffer.put_time(&t)).ok_or("time"),
            CType::TYPE_TIMESTAMP => timestamp_struct(value)
                .map(|ts| buffer.put_timestamp(&ts))
                .ok_or("timestamp"),
            _ => {
                if null.is_null(value) {
                    self.buffer.set_null();
                    return Ok(());
                }
                let bytes = self.text_bytes(value, encoding)?;
                let max_len = match self.size {
                    ParamSize::Variable { max_len, .. } => max_len,
                    _ => 0,
                };
                if bytes.len() > max_len {
                    debug!(c_type = %c_type, max_len, len = bytes.len(), "parameter exceeds column width");
                    return Err(OdbxError::Representation("column_width"));
                }
                return self.buffer.put_bytes(&bytes, c_type.terminator_width());
            }
        };
        match fixed {
            Ok(stored) => stored,
            Err(_) if null.is_null(value) => {
                self.buffer.set_null();
                Ok(())
            }
            Err(expected) => Err(OdbxError::type_error(expected, value)),
        }
    }

    /// The bytes to send with `put_data` for a deferred parameter; `None`
    /// for NULL.
    pub(crate) fn deferred_bytes(&self, null: &NullPolicy, encoding: Encoding) -> Result<Option<Vec<u8>>> {
        let value = self
            .put_data
            .as_ref()
            .ok_or_else(|| OdbxError::context("need_data", "no value for deferred parameter"))?;
        if null.is_null(value) {
            return Ok(None);
        }
        self.text_bytes(value, encoding).map(Some)
    }

    fn text_bytes(&self, value: &Value, encoding: Encoding) -> Result<Vec<u8>> {
        if self.c_type == CType::BINARY {
            if let Value::Blob(bytes) = value {
                return Ok(bytes.to_vec());
            }
        }
        let (text, expected) = match self.spec.host {
            HostType::Atom => (value.as_atom().map(str::to_string), "atom"),
            HostType::String => (
                match value {
                    Value::Str(s) => Some(s.to_string()),
                    _ => None,
                },
                "string",
            ),
            HostType::Codes => (
                match value {
                    Value::Codes(_) => value.text(),
                    _ => None,
                },
                "code_list",
            ),
            _ => (default_text(value), "text"),
        };
        let text = text.ok_or_else(|| OdbxError::type_error(expected, value))?;
        match self.c_type {
            CType::WCHAR => Ok(text.encode_utf16().flat_map(u16::to_ne_bytes).collect()),
            CType::BINARY => latin1(&text),
            _ if encoding == Encoding::IsoLatin1 => latin1(&text),
            _ => Ok(text.into_bytes()),
        }
    }
}

pub(crate) fn latin1(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| OdbxError::Representation("encoding")))
        .collect()
}

/// Text accepted where no particular representation was asked for.
fn default_text(value: &Value) -> Option<String> {
    match value {
        Value::Atom(s) | Value::Str(s) => Some(s.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => Some(t.format("%H:%M:%S").to_string()),
        _ => timestamp_struct(value).map(|ts| timestamp_text(&ts)),
    }
}

/// `YYYY-MM-DD HH:MM:SS[.fraction]` without trailing zeros.
pub(crate) fn timestamp_text(ts: &TimestampStruct) -> String {
    let mut text = format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        ts.year, ts.month, ts.day, ts.hour, ts.minute, ts.second
    );
    if ts.fraction > 0 {
        let fraction = format!("{:09}", ts.fraction);
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }
    text
}

fn int_args<const N: usize>(value: &Value, name: &str) -> Option<[i64; N]> {
    match value {
        Value::Compound(functor, args) if &**functor == name && args.len() == N => {
            let mut out = [0i64; N];
            for (slot, arg) in out.iter_mut().zip(args) {
                match arg {
                    Value::Int(i) => *slot = *i,
                    _ => return None,
                }
            }
            Some(out)
        }
        _ => None,
    }
}

fn date_struct(value: &Value) -> Option<DateStruct> {
    if let Value::Date(d) = value {
        return Some(DateStruct {
            year: i16::try_from(d.year()).ok()?,
            month: d.month() as u16,
            day: d.day() as u16,
        });
    }
    let [year, month, day] = int_args::<3>(value, "date")?;
    Some(DateStruct {
        year: i16::try_from(year).ok()?,
        month: u16::try_from(month).ok()?,
        day: u16::try_from(day).ok()?,
    })
}

fn time_struct(value: &Value) -> Option<TimeStruct> {
    if let Value::Time(t) = value {
        return Some(TimeStruct {
            hour: t.hour() as u16,
            minute: t.minute() as u16,
            second: t.second() as u16,
        });
    }
    let [hour, minute, second] = int_args::<3>(value, "time")?;
    Some(TimeStruct {
        hour: u16::try_from(hour).ok()?,
        minute: u16::try_from(minute).ok()?,
        second: u16::try_from(second).ok()?,
    })
}

fn from_naive(ts: &NaiveDateTime) -> Option<TimestampStruct> {
    Some(TimestampStruct {
        year: i16::try_from(ts.year()).ok()?,
        month: ts.month() as u16,
        day: ts.day() as u16,
        hour: ts.hour() as u16,
        minute: ts.minute() as u16,
        second: ts.second() as u16,
        fraction: ts.nanosecond(),
    })
}

/// Seconds since the epoch, UTC.
fn from_epoch(seconds: f64) -> Option<TimestampStruct> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    let ts = DateTime::from_timestamp(whole as i64, nanos)?;
    from_naive(&ts.naive_utc())
}

fn timestamp_struct(value: &Value) -> Option<TimestampStruct> {
    match value {
        Value::Timestamp(ts) => from_naive(ts),
        Value::Int(i) => from_epoch(*i as f64),
        Value::Float(f) => from_epoch(*f),
        _ => {
            let [year, month, day, hour, minute, second, fraction] = int_args::<7>(value, "timestamp")?;
            Some(TimestampStruct {
                year: i16::try_from(year).ok()?,
                month: u16::try_from(month).ok()?,
                day: u16::try_from(day).ok()?,
                hour: u16::try_from(hour).ok()?,
                minute: u16::try_from(minute).ok()?,
                second: u16::try_from(second).ok()?,
                fraction: u32::try_from(fraction).ok()?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odbx_driver::NULL_DATA;

    fn param(spec: &str, encoding: Encoding) -> Parameter {
        let spec: ParamSpec = spec.parse().unwrap();
        Parameter::declare(1, spec.host, spec.sql.unwrap(), encoding).unwrap()
    }

    #[test]
    fn test_integer_range_is_checked() {
        let null = NullPolicy::default();
        let mut p = param("integer", Encoding::Utf8);
        p.encode(&Value::Int(3), &null, Encoding::Utf8).unwrap();
        assert_eq!(p.data().value, 3i32.to_ne_bytes());
        assert_eq!(p.indicator(), 4);

        let err = p.encode(&Value::Int(1 << 40), &null, Encoding::Utf8).unwrap_err();
        assert!(matches!(err, OdbxError::Type { expected: "32 bit integer", .. }));

        p.encode(&NullPolicy::default().value(), &null, Encoding::Utf8).unwrap();
        assert_eq!(p.indicator(), NULL_DATA);

        let mut big = param("bigint", Encoding::Utf8);
        big.encode(&Value::Int(1 << 40), &null, Encoding::Utf8).unwrap();
        assert_eq!(big.data().value, (1i64 << 40).to_ne_bytes());
    }

    #[test]
    fn test_text_width_and_host_types() {
        let null = NullPolicy::Var;
        let mut p = param("varchar(3)", Encoding::IsoLatin1);
        p.encode(&Value::atom("abc"), &null, Encoding::IsoLatin1).unwrap();
        assert_eq!(&p.data().value[..4], b"abc\0");
        assert_eq!(p.indicator(), 3);
        assert!(matches!(
            p.encode(&Value::atom("abcd"), &null, Encoding::IsoLatin1),
            Err(OdbxError::Representation("column_width"))
        ));
        assert!(matches!(
            p.encode(&Value::atom("€"), &null, Encoding::IsoLatin1),
            Err(OdbxError::Representation("encoding"))
        ));
        p.encode(&Value::var(), &null, Encoding::IsoLatin1).unwrap();
        assert_eq!(p.indicator(), NULL_DATA);

        let mut atoms = param("atom > varchar(10)", Encoding::Utf8);
        let err = atoms.encode(&Value::string("x"), &null, Encoding::Utf8).unwrap_err();
        assert!(matches!(err, OdbxError::Type { expected: "atom", .. }));

        let mut codes = param("codes > varchar(10)", Encoding::Utf8);
        codes.encode(&Value::codes("hé"), &null, Encoding::Utf8).unwrap();
        assert_eq!(codes.indicator(), 3);
    }

    #[test]
    fn test_wide_text_is_utf16() {
        let null = NullPolicy::default();
        let mut p = param("nvarchar(4)", Encoding::Wide);
        assert_eq!(p.c_type(), CType::WCHAR);
        p.encode(&Value::string("hé"), &null, Encoding::Wide).unwrap();
        assert_eq!(p.indicator(), 4);
        let units: Vec<u16> = p.data().value[..4]
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).unwrap(), "hé");
    }

    #[test]
    fn test_deferred_parameter_keeps_indicator() {
        let null = NullPolicy::default();
        let mut p = param("longvarchar", Encoding::Utf8);
        assert!(p.is_deferred());
        assert_eq!(p.indicator(), len_data_at_exec(0));
        p.encode(&Value::atom("body"), &null, Encoding::Utf8).unwrap();
        assert_eq!(p.indicator(), len_data_at_exec(0));
        assert_eq!(p.deferred_bytes(&null, Encoding::Utf8).unwrap(), Some(b"body".to_vec()));
        p.encode(&null.value(), &null, Encoding::Utf8).unwrap();
        assert_eq!(p.deferred_bytes(&null, Encoding::Utf8).unwrap(), None);

        p.encode(&Value::compound("f", vec![]), &null, Encoding::Utf8).unwrap();
        assert!(p.deferred_bytes(&null, Encoding::Utf8).is_err());
    }

    #[test]
    fn test_temporal_parameters() {
        let null = NullPolicy::default();
        let mut d = param("date", Encoding::Utf8);
        let date = Value::compound("date", vec![Value::Int(2024), Value::Int(2), Value::Int(29)]);
        d.encode(&date, &null, Encoding::Utf8).unwrap();
        assert_eq!(DateStruct::from_bytes(d.data().value).unwrap().day, 29);
        assert!(matches!(
            d.encode(&Value::atom("2024-02-29"), &null, Encoding::Utf8),
            Err(OdbxError::Type { expected: "date", .. })
        ));

        let mut ts = param("timestamp", Encoding::Utf8);
        ts.encode(&Value::Float(86_400.5), &null, Encoding::Utf8).unwrap();
        let image = TimestampStruct::from_bytes(ts.data().value).unwrap();
        assert_eq!((image.year, image.month, image.day), (1970, 1, 2));
        assert_eq!(image.fraction, 500_000_000);
        assert_eq!(timestamp_text(&image), "1970-01-02 00:00:00.5");
    }
}
