use std::fmt::{self, Write as _};

use super::arrayprint::py_float;
use super::ndarray::{DType, NdArray};

// ---------------------------------------------------------------------------
// Value – a decoded Python object
// ---------------------------------------------------------------------------

/// A decoded Python object graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Set(Vec<Value>),
    FrozenSet(Vec<Value>),
    /// Insertion-ordered key/value pairs.
    Dict(Vec<(Value, Value)>),
    /// A module attribute reference (`module.name`) that was never called.
    Global { module: String, name: String },
    /// Instance of a class the decoder has no special handling for.
    Object(Box<Object>),
    DType(DType),
    NdArray(NdArray),
}

/// A reduced instance of an unknown class: `module.name(*args)` plus the
/// state passed to BUILD.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub module: String,
    pub name: String,
    pub args: Vec<Value>,
    pub state: Option<Value>,
}

impl Value {
    /// Python type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Dict(_) => "dict",
            Value::Global { .. } => "type",
            Value::Object(_) => "object",
            Value::DType(_) => "numpy.dtype",
            Value::NdArray(_) => "numpy.ndarray",
        }
    }

    /// Elements of a tuple or list.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Value::NdArray(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Whether in-place opcodes (APPEND, SETITEM, BUILD, ...) may target the
    /// value after it has been memoized.
    pub(crate) fn is_mutable(&self) -> bool {
        matches!(
            self,
            Value::List(_)
                | Value::Dict(_)
                | Value::Set(_)
                | Value::Object(_)
                | Value::DType(_)
                | Value::NdArray(_)
        )
    }
}

// ---------------------------------------------------------------------------
// repr-style rendering
// ---------------------------------------------------------------------------

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => f.write_str(&py_float(*v)),
            Value::Bytes(b) => write_bytes_repr(f, b),
            Value::String(s) => write_str_repr(f, s),
            Value::List(items) => {
                f.write_char('[')?;
                write_joined(f, items)?;
                f.write_char(']')
            }
            Value::Tuple(items) => {
                f.write_char('(')?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Value::Set(items) if items.is_empty() => f.write_str("set()"),
            Value::Set(items) => {
                f.write_char('{')?;
                write_joined(f, items)?;
                f.write_char('}')
            }
            Value::FrozenSet(items) if items.is_empty() => f.write_str("frozenset()"),
            Value::FrozenSet(items) => {
                f.write_str("frozenset({")?;
                write_joined(f, items)?;
                f.write_str("})")
            }
            Value::Dict(pairs) => {
                f.write_char('{')?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_char('}')
            }
            Value::Global { module, name } => write!(f, "<class '{module}.{name}'>"),
            Value::Object(obj) => {
                write!(f, "{}.{}(", obj.module, obj.name)?;
                write_joined(f, &obj.args)?;
                f.write_char(')')?;
                if let Some(state) = &obj.state {
                    write!(f, " {state}")?;
                }
                Ok(())
            }
            Value::DType(dtype) => write!(f, "dtype('{}')", dtype.name()),
            Value::NdArray(arr) => write!(f, "{arr}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_str_repr(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    f.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == quote => write!(f, "\\{c}")?,
            c if (c as u32) < 0x20 || (0x7f..0xa0).contains(&(c as u32)) => {
                write!(f, "\\x{:02x}", c as u32)?
            }
            c => f.write_char(c)?,
        }
    }
    f.write_char(quote)
}

fn write_bytes_repr(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    f.write_char('b')?;
    f.write_char(quote as char)?;
    for &b in bytes {
        match b {
            b'\\' => f.write_str("\\\\")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            b if b == quote => write!(f, "\\{}", b as char)?,
            0x20..=0x7e => f.write_char(b as char)?,
            b => write!(f, "\\x{b:02x}")?,
        }
    }
    f.write_char(quote as char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_like_python_repr() {
        let v = Value::Tuple(vec![
            Value::None,
            Value::Bool(true),
            Value::Int(-3),
            Value::Float(1.0),
            Value::String("it's".into()),
            Value::Bytes(vec![0, b'a', 0xff]),
        ]);
        assert_eq!(v.to_string(), r#"(None, True, -3, 1.0, "it's", b'\x00a\xff')"#);
    }

    #[test]
    fn single_element_tuple_has_trailing_comma() {
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).to_string(), "(1,)");
        assert_eq!(Value::Tuple(vec![]).to_string(), "()");
    }

    #[test]
    fn renders_containers() {
        let d = Value::Dict(vec![(Value::String("k".into()), Value::List(vec![]))]);
        assert_eq!(d.to_string(), "{'k': []}");
        assert_eq!(Value::Set(vec![]).to_string(), "set()");
        assert_eq!(
            Value::FrozenSet(vec![Value::Int(1)]).to_string(),
            "frozenset({1})"
        );
    }

    #[test]
    fn special_floats() {
        assert_eq!(py_float(f64::NAN), "nan");
        assert_eq!(py_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(py_float(0.5), "0.5");
        assert_eq!(Value::Float(1e16).to_string(), "1e+16");
        assert_eq!(Value::Float(2.5e-5).to_string(), "2.5e-05");
    }
}
