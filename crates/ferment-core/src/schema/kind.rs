//! Field kinds and the per-kind encode/decode rules.
//!
//! | Kind | Wire shape | Absent value |
//! |---|---|---|
//! | `Int32` / `Int64` | varint | `0` |
//! | `Bool` | varint (0/1) | `false` |
//! | `Bytes` | length-delimited | empty |
//! | `String` | length-delimited UTF-8 | empty |
//! | `Message` | length-delimited child message | empty child |
//! | `Repeated` | packed block or one token per element | empty list |
//! | `Optional` | whatever the wrapped kind uses | `None` |
//!
//! Reads never fail. Singular scalars take the last occurrence with a
//! matching wire shape, singular messages merge every occurrence, and tokens
//! of any other shape are ignored. Invalid UTF-8 in a string is replaced
//! with U+FFFD unless strict decoding rejected it up front.

use crate::error::{Error, Result};
use crate::message::{DecodeConfig, Message};
use crate::schema::SchemaRef;
use crate::value::Value;
use crate::wire::{decode_packed_varints, encode_packed_varints, Token, WireType};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{trace, warn};

/// The schema a message-typed field points at
#[derive(Debug, Clone)]
pub enum MessageType {
    /// A separately built schema
    Schema(SchemaRef),
    /// The schema that declares the field
    Recursive,
}

impl MessageType {
    /// Returns the concrete schema, given the schema declaring the field
    pub fn resolve<'a>(&'a self, enclosing: &'a SchemaRef) -> &'a SchemaRef {
        match self {
            MessageType::Schema(schema) => schema,
            MessageType::Recursive => enclosing,
        }
    }
}

/// Logical type of a field
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Signed 32-bit integer, sign-extended on the wire
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// Boolean
    Bool,
    /// Raw bytes
    Bytes,
    /// UTF-8 text
    String,
    /// Nested message
    Message(MessageType),
    /// Repeated field
    Repeated {
        /// Kind of each element
        element: Box<FieldKind>,
        /// Write varint elements as a single packed block
        packed: bool,
    },
    /// Field that may be absent
    Optional(Box<FieldKind>),
}

impl FieldKind {
    /// Creates a repeated kind
    pub fn repeated(element: FieldKind, packed: bool) -> Self {
        FieldKind::Repeated {
            element: Box::new(element),
            packed,
        }
    }

    /// Creates an optional kind
    pub fn optional(inner: FieldKind) -> Self {
        FieldKind::Optional(Box::new(inner))
    }

    /// Returns true for kinds carried as a single varint
    pub fn is_varint_scalar(&self) -> bool {
        match self {
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::Bool => true,
            FieldKind::Bytes
            | FieldKind::String
            | FieldKind::Message(_)
            | FieldKind::Repeated { .. }
            | FieldKind::Optional(_) => false,
        }
    }

    /// Wire type of the tokens this kind writes
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::Bool => WireType::Varint,
            FieldKind::Bytes | FieldKind::String | FieldKind::Message(_) => WireType::Len,
            FieldKind::Repeated { element, packed } => {
                if *packed && element.is_varint_scalar() {
                    WireType::Len
                } else {
                    element.wire_type()
                }
            }
            FieldKind::Optional(inner) => inner.wire_type(),
        }
    }

    /// `.proto`-style type name; `enclosing` names recursive references
    pub fn type_name(&self, enclosing: &str) -> String {
        match self {
            FieldKind::Int32 => "int32".to_string(),
            FieldKind::Int64 => "int64".to_string(),
            FieldKind::Bool => "bool".to_string(),
            FieldKind::Bytes => "bytes".to_string(),
            FieldKind::String => "string".to_string(),
            FieldKind::Message(MessageType::Schema(schema)) => schema.name().to_string(),
            FieldKind::Message(MessageType::Recursive) => enclosing.to_string(),
            FieldKind::Repeated { element, .. } => {
                format!("repeated {}", element.type_name(enclosing))
            }
            FieldKind::Optional(inner) => format!("optional {}", inner.type_name(enclosing)),
        }
    }

    /// Rejects nestings the wire format cannot represent
    pub(crate) fn check(&self, number: u32) -> Result<()> {
        match self {
            FieldKind::Repeated { element, packed } => match element.as_ref() {
                FieldKind::Repeated { .. } | FieldKind::Optional(_) => Err(
                    Error::invalid_field_kind(number, "repeated elements cannot be repeated or optional"),
                ),
                element if *packed && !element.is_varint_scalar() => Err(
                    Error::invalid_field_kind(number, "only varint elements can be packed"),
                ),
                element => element.check(number),
            },
            FieldKind::Optional(inner) => match inner.as_ref() {
                // Zero tokens already mean absent, so an empty list or an
                // inner `None` would read back as the outer `None`.
                FieldKind::Repeated { .. } | FieldKind::Optional(_) => Err(
                    Error::invalid_field_kind(number, "optional cannot wrap repeated or optional"),
                ),
                inner => inner.check(number),
            },
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Bool
            | FieldKind::Bytes
            | FieldKind::String
            | FieldKind::Message(_) => Ok(()),
        }
    }

    /// Value read when the field has no tokens
    pub fn default_value(&self, enclosing: &SchemaRef) -> Value {
        self.decode(&[], enclosing)
    }

    /// Interprets the tokens stored under one field number
    pub fn decode(&self, tokens: &[Token], enclosing: &SchemaRef) -> Value {
        match self {
            FieldKind::Int32 => Value::Int32(last_varint(tokens).map_or(0, |v| v as i32)),
            FieldKind::Int64 => Value::Int64(last_varint(tokens).unwrap_or(0)),
            FieldKind::Bool => Value::Bool(last_varint(tokens).is_some_and(|v| v != 0)),
            FieldKind::Bytes => Value::Bytes(last_payload(tokens).cloned().unwrap_or_default()),
            FieldKind::String => Value::String(
                last_payload(tokens)
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default(),
            ),
            FieldKind::Message(message_type) => Value::Message(Message::from_payloads(
                message_type.resolve(enclosing),
                tokens,
            )),
            FieldKind::Repeated { element, .. } => {
                let mut items = Vec::new();
                for token in tokens {
                    match token {
                        Token::Varint(v) if element.is_varint_scalar() => {
                            items.extend(element.scalar_from_varint(*v));
                        }
                        Token::LengthDelimited(block) if element.is_varint_scalar() => {
                            match decode_packed_varints(block) {
                                Ok(values) => items.extend(
                                    values.into_iter().filter_map(|v| element.scalar_from_varint(v)),
                                ),
                                Err(e) => warn!("skipping malformed packed block: {}", e),
                            }
                        }
                        Token::LengthDelimited(_) => {
                            items.push(element.decode(std::slice::from_ref(token), enclosing));
                        }
                        Token::Varint(_) | Token::Fixed32(_) | Token::Fixed64(_) => {}
                    }
                }
                Value::List(items)
            }
            FieldKind::Optional(inner) => {
                if tokens.is_empty() {
                    Value::Optional(None)
                } else {
                    Value::Optional(Some(Box::new(inner.decode(tokens, enclosing))))
                }
            }
        }
    }

    /// Appends the tokens representing `value`.
    ///
    /// A value whose variant does not match the kind writes nothing; callers
    /// going through [`FieldKind::accepts`] or typed fields never hit that.
    pub fn encode(&self, value: &Value, out: &mut Vec<Token>) {
        match self {
            FieldKind::Int32 => {
                let Value::Int32(v) = value else {
                    return self.mismatch(value);
                };
                out.push(Token::Varint(i64::from(*v)));
            }
            FieldKind::Int64 => {
                let Value::Int64(v) = value else {
                    return self.mismatch(value);
                };
                out.push(Token::Varint(*v));
            }
            FieldKind::Bool => {
                let Value::Bool(v) = value else {
                    return self.mismatch(value);
                };
                out.push(Token::Varint(i64::from(*v)));
            }
            FieldKind::Bytes => {
                let Value::Bytes(v) = value else {
                    return self.mismatch(value);
                };
                out.push(Token::LengthDelimited(v.clone()));
            }
            FieldKind::String => {
                let Value::String(v) = value else {
                    return self.mismatch(value);
                };
                out.push(Token::LengthDelimited(Bytes::copy_from_slice(v.as_bytes())));
            }
            FieldKind::Message(_) => {
                let Value::Message(m) = value else {
                    return self.mismatch(value);
                };
                out.push(Token::LengthDelimited(m.to_bytes()));
            }
            FieldKind::Repeated { element, packed } => {
                let Value::List(items) = value else {
                    return self.mismatch(value);
                };
                if *packed && element.is_varint_scalar() {
                    if !items.is_empty() {
                        let block = encode_packed_varints(items.iter().filter_map(Value::as_varint));
                        out.push(Token::LengthDelimited(block));
                    }
                } else {
                    for item in items {
                        element.encode(item, out);
                    }
                }
            }
            FieldKind::Optional(inner) => {
                let Value::Optional(v) = value else {
                    return self.mismatch(value);
                };
                if let Some(v) = v {
                    inner.encode(v, out);
                }
            }
        }
    }

    /// Returns true if `value` has the shape this kind writes
    pub fn accepts(&self, value: &Value, enclosing: &SchemaRef) -> bool {
        match (self, value) {
            (FieldKind::Int32, Value::Int32(_))
            | (FieldKind::Int64, Value::Int64(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::Bytes, Value::Bytes(_))
            | (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Message(message_type), Value::Message(m)) => {
                Arc::ptr_eq(message_type.resolve(enclosing), m.schema())
            }
            (FieldKind::Repeated { element, .. }, Value::List(items)) => {
                items.iter().all(|item| element.accepts(item, enclosing))
            }
            (FieldKind::Optional(inner), Value::Optional(v)) => v
                .as_deref()
                .map_or(true, |v| inner.accepts(v, enclosing)),
            _ => false,
        }
    }

    /// Structural check run while decoding: nested payloads must decode and
    /// packed blocks must be well-formed varint runs.
    pub(crate) fn validate(
        &self,
        number: u32,
        tokens: &[Token],
        enclosing: &SchemaRef,
        config: &DecodeConfig,
        depth: u32,
    ) -> Result<()> {
        match self {
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::Bool | FieldKind::Bytes => Ok(()),
            FieldKind::String => {
                if config.strict_utf8 {
                    for payload in payloads(tokens) {
                        std::str::from_utf8(payload)
                            .map_err(|e| Error::invalid_utf8(number, e))?;
                    }
                }
                Ok(())
            }
            FieldKind::Message(message_type) => {
                let schema = message_type.resolve(enclosing);
                for payload in payloads(tokens) {
                    Message::decode_nested(schema, payload, config, depth + 1)?;
                }
                Ok(())
            }
            FieldKind::Repeated { element, .. } => {
                if element.is_varint_scalar() {
                    for block in payloads(tokens) {
                        decode_packed_varints(block)?;
                    }
                    return Ok(());
                }
                for token in tokens {
                    element.validate(number, std::slice::from_ref(token), enclosing, config, depth)?;
                }
                Ok(())
            }
            FieldKind::Optional(inner) => inner.validate(number, tokens, enclosing, config, depth),
        }
    }

    fn scalar_from_varint(&self, v: i64) -> Option<Value> {
        match self {
            FieldKind::Int32 => Some(Value::Int32(v as i32)),
            FieldKind::Int64 => Some(Value::Int64(v)),
            FieldKind::Bool => Some(Value::Bool(v != 0)),
            _ => None,
        }
    }

    fn mismatch(&self, value: &Value) {
        trace!(
            kind = %self.type_name("Self"),
            value = value.kind_name(),
            "value does not match field kind; nothing encoded"
        );
    }
}

fn last_varint(tokens: &[Token]) -> Option<i64> {
    tokens.iter().rev().find_map(|token| match token {
        Token::Varint(v) => Some(*v),
        _ => None,
    })
}

fn last_payload(tokens: &[Token]) -> Option<&Bytes> {
    payloads(tokens).last()
}

fn payloads(tokens: &[Token]) -> impl DoubleEndedIterator<Item = &Bytes> {
    tokens.iter().filter_map(|token| match token {
        Token::LengthDelimited(data) => Some(data),
        _ => None,
    })
}
