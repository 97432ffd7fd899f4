///
/// Compiled result projections.
///
/// `findall(Template, row(V1, ..., Vn))` collects every row of a result as
/// an instance of `Template`, where `Vi` stands for column `i`. Instead of
/// decoding a row and then copying it into the template, the template is
/// compiled once into a flat instruction list and the list is run once per
/// row, decoding columns as their instructions are reached.
///
/// Literal payloads of a persistent statement's program are copied at
/// compile time, so the program owns them for as long as any clone of the
/// statement holds it. A one-shot program shares the caller's payloads.
///

use std::collections::HashMap;
use std::fmt;

use crate::error::{OdbxError, Result};
use crate::value::{Atom, Value, Var};

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// A template variable that is not a column: a fresh variable per row,
    /// shared by all occurrences of the same slot.
    Unbound(usize),
    /// 1-based column of the current row.
    Column(u16),
    Atom(Atom),
    Int(i64),
    Float(f64),
    /// String, code list, blob or temporal literal.
    Text(Value),
    /// Ground compound literal.
    Term(Value),
    /// A compound whose `arity` arguments follow.
    Functor { name: Atom, arity: usize },
}

#[derive(Debug, Clone)]
pub struct FindallProgram {
    code: Vec<Instr>,
    unbound: usize,
    pinned: usize,
}

struct Compiler {
    columns: HashMap<Var, u16>,
    slots: HashMap<Var, usize>,
    persistent: bool,
    code: Vec<Instr>,
    pinned: usize,
}

impl Compiler {
    fn literal(&mut self, value: &Value) -> Value {
        if self.persistent {
            self.pinned += 1;
            value.deep_copy()
        } else {
            value.clone()
        }
    }

    fn compile(&mut self, term: &Value) {
        let instr = match term {
            Value::Var(v) => match self.columns.get(v) {
                Some(column) => Instr::Column(*column),
                None => {
                    let next = self.slots.len();
                    Instr::Unbound(*self.slots.entry(*v).or_insert(next))
                }
            },
            Value::Atom(a) if self.persistent => Instr::Atom(Atom::from(&**a)),
            Value::Atom(a) => Instr::Atom(a.clone()),
            Value::Int(i) => Instr::Int(*i),
            Value::Float(f) => Instr::Float(*f),
            Value::Compound(_, _) if term.is_ground() => Instr::Term(self.literal(term)),
            Value::Compound(name, args) => {
                self.code.push(Instr::Functor {
                    name: name.clone(),
                    arity: args.len(),
                });
                for arg in args {
                    self.compile(arg);
                }
                return;
            }
            other => Instr::Text(self.literal(other)),
        };
        self.code.push(instr);
    }
}

impl FindallProgram {
    /// Compile `template` against the row spec `row(V1, ..., Vn)`.
    pub fn compile(template: &Value, row: &Value, persistent: bool) -> Result<Self> {
        let Value::Compound(_, args) = row else {
            return Err(OdbxError::type_error("unbound", row));
        };
        let mut columns = HashMap::new();
        for (i, arg) in args.iter().enumerate() {
            let Value::Var(v) = arg else {
                return Err(OdbxError::type_error("unbound", arg));
            };
            columns.entry(*v).or_insert(i as u16 + 1);
        }
        let mut compiler = Compiler {
            columns,
            slots: HashMap::new(),
            persistent,
            code: Vec::new(),
            pinned: 0,
        };
        compiler.compile(template);
        Ok(Self {
            code: compiler.code,
            unbound: compiler.slots.len(),
            pinned: compiler.pinned,
        })
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.code
    }

    /// Number of literal payloads owned by the program.
    pub fn pinned(&self) -> usize {
        self.pinned
    }

    /// Highest column the program reads.
    pub fn max_column(&self) -> u16 {
        self.code
            .iter()
            .filter_map(|i| match i {
                Instr::Column(c) => Some(*c),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Build one output value; `column` decodes a column of the current row.
    pub fn run(&self, column: &mut dyn FnMut(u16) -> Result<Value>) -> Result<Value> {
        let fresh: Vec<Value> = (0..self.unbound).map(|_| Value::var()).collect();
        let mut pc = 0;
        let value = self.eval(&mut pc, &fresh, column)?;
        debug_assert_eq!(pc, self.code.len());
        Ok(value)
    }

    fn eval(&self, pc: &mut usize, fresh: &[Value], column: &mut dyn FnMut(u16) -> Result<Value>) -> Result<Value> {
        let instr = self
            .code
            .get(*pc)
            .ok_or_else(|| OdbxError::context("findall", "truncated program"))?;
        *pc += 1;
        Ok(match instr {
            Instr::Unbound(slot) => fresh[*slot].clone(),
            Instr::Column(c) => column(*c)?,
            Instr::Atom(a) => Value::Atom(a.clone()),
            Instr::Int(i) => Value::Int(*i),
            Instr::Float(f) => Value::Float(*f),
            Instr::Text(v) | Instr::Term(v) => v.clone(),
            Instr::Functor { name, arity } => {
                let mut args = Vec::with_capacity(*arity);
                for _ in 0..*arity {
                    args.push(self.eval(pc, fresh, column)?);
                }
                Value::Compound(name.clone(), args)
            }
        })
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Unbound(slot) => write!(f, "unbound {slot}"),
            Instr::Column(c) => write!(f, "column {c}"),
            Instr::Atom(a) => write!(f, "atom {a}"),
            Instr::Int(i) => write!(f, "int {i}"),
            Instr::Float(x) => write!(f, "float {x:?}"),
            Instr::Text(v) => write!(f, "text {v}"),
            Instr::Term(v) => write!(f, "term {v}"),
            Instr::Functor { name, arity } => write!(f, "functor {name}/{arity}"),
        }
    }
}

impl fmt::Display for FindallProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.code.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{instr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn row_spec(n: usize) -> (Vec<Value>, Value) {
        let vars: Vec<Value> = (0..n).map(|_| Value::var()).collect();
        let row = Value::compound("row", vars.clone());
        (vars, row)
    }

    #[test]
    fn test_row_spec_must_be_variables() {
        let template = Value::atom("x");
        let bad = Value::compound("row", vec![Value::Int(1)]);
        assert!(matches!(
            FindallProgram::compile(&template, &bad, false),
            Err(OdbxError::Type { expected: "unbound", .. })
        ));
        assert!(FindallProgram::compile(&template, &Value::atom("row"), false).is_err());
    }

    #[test]
    fn test_run_builds_template() {
        let (v, row) = row_spec(2);
        let other = Value::var();
        let template = Value::compound(
            "pair",
            vec![
                v[1].clone(),
                Value::compound("f", vec![v[0].clone(), other.clone(), other]),
                Value::string("lit"),
            ],
        );
        let program = FindallProgram::compile(&template, &row, false).unwrap();
        assert_eq!(program.max_column(), 2);

        let mut decode = |c: u16| -> Result<Value> { Ok(Value::Int(c as i64 * 10)) };
        let out = program.run(&mut decode).unwrap();
        let Value::Compound(name, args) = &out else {
            panic!("not a compound: {out}");
        };
        assert_eq!(&**name, "pair");
        assert_eq!(args[0], Value::Int(20));
        let Value::Compound(_, inner) = &args[1] else {
            panic!("not a compound");
        };
        assert_eq!(inner[0], Value::Int(10));
        assert!(inner[1].is_var());
        assert_eq!(inner[1], inner[2]);
        assert_eq!(args[2], Value::string("lit"));
    }

    #[test]
    fn test_persistent_literals_are_owned() {
        let (v, row) = row_spec(1);
        let lit = Value::string("payload");
        let ground = Value::compound("meta", vec![Value::Int(1)]);
        let template = Value::compound("t", vec![v[0].clone(), lit.clone(), ground]);

        let pinned = FindallProgram::compile(&template, &row, true).unwrap();
        assert_eq!(pinned.pinned(), 2);
        let shared = FindallProgram::compile(&template, &row, false).unwrap();
        assert_eq!(shared.pinned(), 0);

        let payload = |p: &FindallProgram| match &p.instructions()[2] {
            Instr::Text(Value::Str(s)) => s.clone(),
            other => panic!("unexpected {other:?}"),
        };
        let Value::Str(original) = &lit else { unreachable!() };
        assert!(!Arc::ptr_eq(&payload(&pinned), original));
        assert!(Arc::ptr_eq(&payload(&shared), original));
    }

    #[test]
    fn test_column_errors_propagate() {
        let (v, row) = row_spec(1);
        let program = FindallProgram::compile(&v[0], &row, false).unwrap();
        let mut failing = |_: u16| -> Result<Value> { Err(OdbxError::Resource("memory")) };
        assert!(matches!(program.run(&mut failing), Err(OdbxError::Resource("memory"))));
    }
}
