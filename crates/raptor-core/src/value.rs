//! Dynamically typed attribute values.
//!
//! Attributes travel from a parent render into a child component as
//! [`Value`]s. Equality follows strict identity: scalars and strings compare
//! by value, while reference-backed values (children, lists, objects) are
//! only equal to themselves.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::VNode;

/// Child references handed to a component through its `children` attribute.
#[derive(Clone)]
pub struct Children(Rc<[VNode]>);

impl Children {
    pub fn new(nodes: Vec<VNode>) -> Self {
        Self(nodes.into())
    }

    pub fn nodes(&self) -> &[VNode] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the child nodes out so they can be placed in a render tree.
    pub fn to_vec(&self) -> Vec<VNode> {
        self.0.to_vec()
    }
}

impl Default for Children {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PartialEq for Children {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Children").field(&self.0.len()).finish()
    }
}

impl From<Vec<VNode>> for Children {
    fn from(nodes: Vec<VNode>) -> Self {
        Self::new(nodes)
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Children(Children),
    List(Rc<[Value]>),
    Object(Rc<dyn Any>),
}

impl Value {
    pub fn object<T: Any>(value: T) -> Self {
        Value::Object(Rc::new(value))
    }

    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::List(values.into_iter().collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Float(value) => exact_i64(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_children(&self) -> Option<&Children> {
        match self {
            Value::Children(children) => Some(children),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(object) => object.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Name of the variant, used in type mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Children(_) => "children",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    /// Text form used when a value is written into a DOM attribute.
    pub fn to_attribute_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Str(value) => value.to_string(),
            Value::Children(children) => format!("[{} children]", children.len()),
            Value::List(values) => values
                .iter()
                .map(Value::to_attribute_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object]".to_string(),
        }
    }
}

/// `value` as an integer when it is integral and inside the `i64` range.
/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn exact_i64(value: f64) -> Option<i64> {
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    (value.fract() == 0.0 && (-BOUND..BOUND).contains(&value)).then_some(value as i64)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                exact_i64(*b) == Some(*a)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Children(a), Value::Children(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(value) => write!(f, "Bool({value})"),
            Value::Int(value) => write!(f, "Int({value})"),
            Value::Float(value) => write!(f, "Float({value})"),
            Value::Str(value) => write!(f, "Str({value:?})"),
            Value::Children(children) => fmt::Debug::fmt(children, f),
            Value::List(values) => f.debug_list().entries(values.iter()).finish(),
            Value::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_attribute_string())
    }
}

/// Error produced when a [`Value`] cannot be converted into a field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTypeError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl fmt::Display for ValueTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ValueTypeError {}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident as $expected:literal, $extract:expr;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value.into())
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = ValueTypeError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    let found = value.kind();
                    let extract: fn(Value) -> Option<$ty> = $extract;
                    extract(value).ok_or(ValueTypeError {
                        expected: $expected,
                        found,
                    })
                }
            }
        )*
    };
}

value_conversions! {
    bool => Bool as "bool", |value| value.as_bool();
    i64 => Int as "int", |value| value.as_i64();
    f64 => Float as "float", |value| value.as_f64();
    Rc<str> => Str as "string", |value| match value {
        Value::Str(text) => Some(text),
        _ => None,
    };
    String => Str as "string", |value| value.as_str().map(str::to_owned);
    Children => Children as "children", |value| match value {
        Value::Children(children) => Some(children),
        _ => None,
    };
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl TryFrom<Value> for i32 {
    type Error = ValueTypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let found = value.kind();
        value
            .as_i64()
            .and_then(|value| i32::try_from(value).ok())
            .ok_or(ValueTypeError {
                expected: "int",
                found,
            })
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<Vec<VNode>> for Value {
    fn from(nodes: Vec<VNode>) -> Self {
        Value::Children(Children::new(nodes))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
#[path = "tests/value_tests.rs"]
mod tests;
