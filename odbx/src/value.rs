///
/// Host values.
///
/// The structured values rows decode into and parameters encode from:
/// atoms, numbers, strings, code lists, blobs, temporal values and
/// compound terms. Text payloads are reference-counted, so cloning a value
/// shares its storage; `deep_copy` is the way to get storage of its own.
///
/// Variables are placeholders with identity. Unification binds them in a
/// `Bindings` table with a trail, so a failed match can be undone back to
/// a mark without touching earlier bindings.
///

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub type Atom = Arc<str>;

/// An unbound placeholder, unique per `Var::fresh()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u64);

impl Var {
    pub fn fresh() -> Var {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Var(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Var(Var),
    Atom(Atom),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Codes(Arc<[char]>),
    Blob(Arc<[u8]>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Compound(Atom, Vec<Value>),
}

impl Value {
    pub fn var() -> Value {
        Value::Var(Var::fresh())
    }

    pub fn atom(name: &str) -> Value {
        Value::Atom(Arc::from(name))
    }

    pub fn string(text: &str) -> Value {
        Value::Str(Arc::from(text))
    }

    pub fn codes(text: &str) -> Value {
        Value::Codes(text.chars().collect())
    }

    pub fn blob(bytes: &[u8]) -> Value {
        Value::Blob(Arc::from(bytes))
    }

    pub fn compound(name: &str, args: Vec<Value>) -> Value {
        Value::Compound(Arc::from(name), args)
    }

    /// Name used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Var(_) => "var",
            Value::Atom(_) => "atom",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Codes(_) => "code_list",
            Value::Blob(_) => "blob",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::Compound(..) => "compound",
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Value::Var(_))
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Value::Var(_) => false,
            Value::Compound(_, args) => args.iter().all(Value::is_ground),
            _ => true,
        }
    }

    /// Copy with freshly allocated text and blob payloads.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Atom(a) => Value::Atom(Arc::from(&**a)),
            Value::Str(s) => Value::Str(Arc::from(&**s)),
            Value::Codes(c) => Value::Codes(Arc::from(&**c)),
            Value::Blob(b) => Value::Blob(Arc::from(&**b)),
            Value::Compound(name, args) => {
                Value::Compound(Arc::from(&**name), args.iter().map(Value::deep_copy).collect())
            }
            other => other.clone(),
        }
    }

    /// Text of an atom, string or code list.
    pub fn text(&self) -> Option<String> {
        match self {
            Value::Atom(s) | Value::Str(s) => Some(s.to_string()),
            Value::Codes(c) => Some(c.iter().collect()),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Value::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn unify_with(&self, other: &Value, bindings: &mut Bindings) -> bool {
        let a = bindings.walk(self).clone();
        let b = bindings.walk(other).clone();
        match (&a, &b) {
            (Value::Var(x), Value::Var(y)) if x == y => true,
            (Value::Var(x), _) => {
                bindings.bind(*x, b);
                true
            }
            (_, Value::Var(y)) => {
                bindings.bind(*y, a);
                true
            }
            (Value::Compound(n1, a1), Value::Compound(n2, a2)) => {
                n1 == n2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2.iter()).all(|(x, y)| x.unify_with(y, bindings))
            }
            _ => a == b,
        }
    }
}

/// Variable bindings made by unification.
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    map: HashMap<Var, Value>,
    trail: Vec<Var>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(&mut self, var: Var, value: Value) {
        self.map.insert(var, value);
        self.trail.push(var);
    }

    fn walk<'a>(&'a self, mut value: &'a Value) -> &'a Value {
        while let Value::Var(v) = value {
            match self.map.get(v) {
                Some(next) => value = next,
                None => break,
            }
        }
        value
    }

    /// Current trail position, for `undo_to`.
    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    /// Drop every binding made after `mark`.
    pub fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some(var) = self.trail.pop() {
                self.map.remove(&var);
            }
        }
    }

    pub fn get(&self, var: Var) -> Option<Value> {
        self.map.get(&var).map(|v| self.resolve(v))
    }

    /// `value` with every bound variable replaced, recursively.
    pub fn resolve(&self, value: &Value) -> Value {
        match self.walk(value) {
            Value::Compound(name, args) => {
                Value::Compound(name.clone(), args.iter().map(|a| self.resolve(a)).collect())
            }
            other => other.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// One result row, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// The row as the compound `row(V1, ..., Vn)`.
    pub fn to_value(&self) -> Value {
        Value::compound("row", self.values.clone())
    }
}

fn fmt_args(f: &mut fmt::Formatter<'_>, name: &str, args: &[Value]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Var(v) => write!(f, "_G{}", v.0),
            Value::Atom(a) => f.write_str(a),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{:?}", &**s),
            Value::Codes(c) => {
                let codes: Vec<String> = c.iter().map(|ch| (*ch as u32).to_string()).collect();
                write!(f, "[{}]", codes.join(","))
            }
            Value::Blob(b) => {
                f.write_str("0x")?;
                b.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
            Value::Date(d) => write!(f, "date({}, {}, {})", d.year(), d.month(), d.day()),
            Value::Time(t) => write!(f, "time({}, {}, {})", t.hour(), t.minute(), t.second()),
            Value::Timestamp(ts) => write!(
                f,
                "timestamp({}, {}, {}, {}, {}, {}, {})",
                ts.year(),
                ts.month(),
                ts.day(),
                ts.hour(),
                ts.minute(),
                ts.second(),
                ts.nanosecond()
            ),
            Value::Compound(name, args) => fmt_args(f, name, args),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_args(f, "row", &self.values)
    }
}
