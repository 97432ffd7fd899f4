///
/// NULL representation.
///
/// How SQL NULL appears in host values: as a fresh unbound variable, as a
/// distinguished atom, as a one-argument wrapper such as `null(_)`, or as
/// an arbitrary value recognised by unification. A connection holds one
/// policy behind an `Arc`; statements share it unless they bring their own.
///

use std::sync::Arc;

use crate::value::{Atom, Bindings, Value};

/// The atom used when nothing else is configured.
pub const DEFAULT_NULL: &str = "$null$";

#[derive(Debug, Clone, PartialEq)]
pub enum NullPolicy {
    Var,
    Atom(Atom),
    /// `name(_)`: a compound of arity one wrapping a fresh variable.
    Functor(Atom),
    Term(Value),
}

impl Default for NullPolicy {
    fn default() -> Self {
        NullPolicy::Atom(Arc::from(DEFAULT_NULL))
    }
}

impl NullPolicy {
    /// Classify a NULL template the way it is given by the caller.
    pub fn from_value(template: &Value) -> NullPolicy {
        match template {
            Value::Var(_) => NullPolicy::Var,
            Value::Atom(a) => NullPolicy::Atom(a.clone()),
            Value::Compound(name, args) if args.len() == 1 && args[0].is_var() => {
                NullPolicy::Functor(name.clone())
            }
            other => NullPolicy::Term(other.deep_copy()),
        }
    }

    /// The host value to put for a NULL column.
    pub fn value(&self) -> Value {
        match self {
            NullPolicy::Var => Value::var(),
            NullPolicy::Atom(a) => Value::Atom(a.clone()),
            NullPolicy::Functor(name) => Value::Compound(name.clone(), vec![Value::var()]),
            NullPolicy::Term(t) => t.clone(),
        }
    }

    /// True if a parameter value stands for NULL.
    pub fn is_null(&self, value: &Value) -> bool {
        match (self, value) {
            (NullPolicy::Var, Value::Var(_)) => true,
            (NullPolicy::Atom(a), Value::Atom(b)) => a == b,
            (NullPolicy::Functor(name), Value::Compound(n, args)) => n == name && args.len() == 1,
            (NullPolicy::Term(t), v) => v.unify_with(t, &mut Bindings::new()),
            _ => false,
        }
    }
}
