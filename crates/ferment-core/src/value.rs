//! Dynamic field values and their typed counterparts.
//!
//! [`Value`] mirrors [`FieldKind`](crate::schema::FieldKind) one-to-one and is
//! what the encode/decode engine works with. [`FieldValue`] maps plain Rust
//! types onto it so typed [`Field`](crate::Field) handles can hand out `i32`,
//! `String`, `Vec<Message>` and so on.

use crate::message::Message;
use bytes::Bytes;

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 32-bit integer
    Int32(i32),
    /// 64-bit integer
    Int64(i64),
    /// Boolean
    Bool(bool),
    /// Raw bytes
    Bytes(Bytes),
    /// UTF-8 text
    String(String),
    /// Nested message
    Message(Message),
    /// Elements of a repeated field, in order
    List(Vec<Value>),
    /// Optional field; `None` means absent
    Optional(Option<Box<Value>>),
}

impl Value {
    /// Short name of the variant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
            Value::Message(_) => "message",
            Value::List(_) => "list",
            Value::Optional(_) => "optional",
        }
    }

    /// The varint payload of an integer or boolean value
    pub fn as_varint(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Returns the string if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes if this is a bytes value
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the message if this is a message value
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the elements if this is a list value
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

/// A Rust type that a typed field can read and write.
///
/// `from_value` is only ever handed values produced by the kind paired with
/// the type in the [`pb`](crate::pb) constructors; any other variant maps to
/// the type's empty value.
pub trait FieldValue: Sized {
    /// Converts into the dynamic representation
    fn into_value(self) -> Value;

    /// Converts from the dynamic representation
    fn from_value(value: Value) -> Self;
}

macro_rules! impl_field_value {
    ($type:ty, $variant:ident) => {
        impl FieldValue for $type {
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Self {
                match value {
                    Value::$variant(v) => v,
                    _ => Self::default(),
                }
            }
        }
    };
}

impl_field_value!(i32, Int32);
impl_field_value!(i64, Int64);
impl_field_value!(bool, Bool);
impl_field_value!(Bytes, Bytes);
impl_field_value!(String, String);

impl FieldValue for Message {
    fn into_value(self) -> Value {
        Value::Message(self)
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Message(m) => m,
            _ => Message::placeholder(),
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(FieldValue::into_value).collect())
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            _ => Vec::new(),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn into_value(self) -> Value {
        Value::Optional(self.map(|v| Box::new(v.into_value())))
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Optional(v) => v.map(|v| T::from_value(*v)),
            _ => None,
        }
    }
}
