//! Typed field handles and the `pb` declaration DSL.
//!
//! A [`Field<T>`] pairs a field number with a [`FieldKind`] whose values
//! read back as `T`. The only way to obtain one is through the [`pb`]
//! constructors, which keeps `T` and the kind in agreement.

use crate::message::Message;
use crate::schema::{FieldKind, MessageType, SchemaRef};
use crate::value::FieldValue;
use bytes::Bytes;
use std::fmt;
use std::marker::PhantomData;

/// A field number and kind, typed by the Rust value it reads and writes
pub struct Field<T> {
    number: u32,
    kind: FieldKind,
    _value: PhantomData<fn() -> T>,
}

impl<T> Field<T> {
    fn new(number: u32, kind: FieldKind) -> Self {
        Self {
            number,
            kind,
            _value: PhantomData,
        }
    }

    /// Field number on the wire
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Logical type
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self::new(self.number, self.kind.clone())
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("number", &self.number)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Field constructors, one per logical type.
///
/// ```
/// use ferment_core::{pb, Schema};
///
/// let child = Schema::builder("Child").build()?;
/// let mut builder = Schema::builder("Parent");
/// let id = builder.add("id", pb::int64(1));
/// let tags = builder.add("tags", pb::repeated::int32(2));
/// let nickname = builder.add("nickname", pb::optional(pb::string(3)));
/// let children = builder.add("children", pb::repeated::message(&child, 4));
/// let parent = builder.build()?;
/// # let _ = (id, tags, nickname, children, parent);
/// # Ok::<(), ferment_core::Error>(())
/// ```
pub mod pb {
    use super::*;

    /// `int32` field
    pub fn int32(number: u32) -> Field<i32> {
        Field::new(number, FieldKind::Int32)
    }

    /// `int64` field
    pub fn int64(number: u32) -> Field<i64> {
        Field::new(number, FieldKind::Int64)
    }

    /// `bool` field
    pub fn bool(number: u32) -> Field<bool> {
        Field::new(number, FieldKind::Bool)
    }

    /// `bytes` field
    pub fn bytes(number: u32) -> Field<Bytes> {
        Field::new(number, FieldKind::Bytes)
    }

    /// `string` field
    pub fn string(number: u32) -> Field<String> {
        Field::new(number, FieldKind::String)
    }

    /// Nested message field of the given schema
    pub fn message(schema: &SchemaRef, number: u32) -> Field<Message> {
        Field::new(number, FieldKind::Message(MessageType::Schema(schema.clone())))
    }

    /// Nested message field of the schema that declares it
    pub fn message_self(number: u32) -> Field<Message> {
        Field::new(number, FieldKind::Message(MessageType::Recursive))
    }

    /// Wraps any field so absence reads as `None`
    pub fn optional<T: FieldValue>(field: Field<T>) -> Field<Option<T>> {
        Field::new(field.number, FieldKind::optional(field.kind))
    }

    /// Repeated fields. Integer and boolean lists are packed unless the
    /// `_unpacked` variant is used; both shapes are accepted when reading.
    pub mod repeated {
        use super::*;

        /// Packed `repeated int32`
        pub fn int32(number: u32) -> Field<Vec<i32>> {
            Field::new(number, FieldKind::repeated(FieldKind::Int32, true))
        }

        /// Unpacked `repeated int32`
        pub fn int32_unpacked(number: u32) -> Field<Vec<i32>> {
            Field::new(number, FieldKind::repeated(FieldKind::Int32, false))
        }

        /// Packed `repeated int64`
        pub fn int64(number: u32) -> Field<Vec<i64>> {
            Field::new(number, FieldKind::repeated(FieldKind::Int64, true))
        }

        /// Unpacked `repeated int64`
        pub fn int64_unpacked(number: u32) -> Field<Vec<i64>> {
            Field::new(number, FieldKind::repeated(FieldKind::Int64, false))
        }

        /// Packed `repeated bool`
        pub fn bool(number: u32) -> Field<Vec<bool>> {
            Field::new(number, FieldKind::repeated(FieldKind::Bool, true))
        }

        /// `repeated string`
        pub fn string(number: u32) -> Field<Vec<String>> {
            Field::new(number, FieldKind::repeated(FieldKind::String, false))
        }

        /// `repeated bytes`
        pub fn bytes(number: u32) -> Field<Vec<Bytes>> {
            Field::new(number, FieldKind::repeated(FieldKind::Bytes, false))
        }

        /// Repeated nested message of the given schema
        pub fn message(schema: &SchemaRef, number: u32) -> Field<Vec<Message>> {
            let element = FieldKind::Message(MessageType::Schema(schema.clone()));
            Field::new(number, FieldKind::repeated(element, false))
        }

        /// Repeated nested message of the schema that declares it
        pub fn message_self(number: u32) -> Field<Vec<Message>> {
            let element = FieldKind::Message(MessageType::Recursive);
            Field::new(number, FieldKind::repeated(element, false))
        }
    }
}
