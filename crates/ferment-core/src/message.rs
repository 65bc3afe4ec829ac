//! The schema-bound message object.
//!
//! A [`Message`] stores every field occurrence as raw [`Token`]s keyed by
//! field number and interprets them on demand through the field's kind.
//!
//! ## Decoding
//!
//! [`Message::decode`] tokenizes the buffer, then walks the schema: every
//! message-typed payload is decoded recursively and every packed block is
//! checked, so one malformed byte anywhere in the tree fails the whole call.
//! After a successful decode, [`Message::get`] cannot fail.
//!
//! ## Reads and writes
//!
//! - `get` decodes fresh on every call; nested messages are rebuilt from
//!   their stored payload each time and nothing is cached.
//! - `set` replaces all occurrences of the field.
//! - Field numbers the schema does not declare are kept as tokens and
//!   written back out by `encode`; see [`Message::clear_unknown_fields`].
//!
//! A message is a plain value. It is `Send + Sync`, with the usual rule that
//! mutation needs exclusive access.

use crate::error::{Error, Result};
use crate::field::Field;
use crate::schema::{FieldDescriptor, Schema, SchemaRef};
use crate::value::{FieldValue, Value};
use crate::wire::{Token, TokenMap};
use bytes::{BufMut, Bytes};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum nesting depth accepted by [`Message::decode`]
pub const DEFAULT_RECURSION_LIMIT: u32 = 100;

/// Configuration for decoding
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// Maximum depth of nested messages
    pub recursion_limit: u32,
    /// Reject string fields holding invalid UTF-8 instead of replacing it
    pub strict_utf8: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            strict_utf8: false,
        }
    }
}

impl DecodeConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Sets whether invalid UTF-8 in string fields is an error
    pub fn strict_utf8(mut self, strict: bool) -> Self {
        self.strict_utf8 = strict;
        self
    }
}

/// A message bound to a schema
#[derive(Clone)]
pub struct Message {
    schema: SchemaRef,
    fields: TokenMap,
}

impl Message {
    /// Creates a message with no fields set
    pub fn new(schema: &SchemaRef) -> Self {
        Self {
            schema: schema.clone(),
            fields: TokenMap::new(),
        }
    }

    /// Creates a message and populates it in one pass
    ///
    /// ```
    /// use ferment_core::{pb, Message, Schema};
    ///
    /// let mut builder = Schema::builder("Greeting");
    /// let text = builder.add("text", pb::string(1));
    /// let schema = builder.build()?;
    ///
    /// let greeting = Message::build(&schema, |m| m.set(&text, "hello".to_string()));
    /// assert_eq!(greeting.get(&text), "hello");
    /// # Ok::<(), ferment_core::Error>(())
    /// ```
    pub fn build(schema: &SchemaRef, init: impl FnOnce(&mut Message)) -> Self {
        let mut message = Self::new(schema);
        init(&mut message);
        message
    }

    /// Decodes a message with the default [`DecodeConfig`]
    pub fn decode(schema: &SchemaRef, data: &[u8]) -> Result<Self> {
        Self::decode_with(schema, data, &DecodeConfig::default())
    }

    /// Decodes a message.
    ///
    /// Fails on any structural error in the buffer or in a nested message
    /// payload; a partially decoded message is never returned.
    pub fn decode_with(schema: &SchemaRef, data: &[u8], config: &DecodeConfig) -> Result<Self> {
        let message = Self::decode_nested(schema, data, config, 0)?;
        debug!(
            schema = schema.name(),
            bytes = data.len(),
            fields = message.fields.len(),
            "decoded message"
        );
        Ok(message)
    }

    pub(crate) fn decode_nested(
        schema: &SchemaRef,
        data: &[u8],
        config: &DecodeConfig,
        depth: u32,
    ) -> Result<Self> {
        if depth > config.recursion_limit {
            return Err(Error::RecursionLimitExceeded {
                limit: config.recursion_limit,
            });
        }

        let fields = TokenMap::decode(data)?;
        for descriptor in schema.fields() {
            let tokens = fields.get(descriptor.number());
            if !tokens.is_empty() {
                descriptor
                    .kind()
                    .validate(descriptor.number(), tokens, schema, config, depth)?;
            }
        }

        Ok(Self {
            schema: schema.clone(),
            fields,
        })
    }

    /// Rebuilds a child message from the payloads stored for a field.
    ///
    /// Multiple occurrences merge. Payloads were validated when the parent
    /// was decoded; if one still fails to tokenize the child reads as empty.
    pub(crate) fn from_payloads(schema: &SchemaRef, tokens: &[Token]) -> Self {
        let mut message = Self::new(schema);
        for token in tokens {
            let Token::LengthDelimited(payload) = token else {
                continue;
            };
            match TokenMap::decode(payload) {
                Ok(fields) => message.fields.merge(fields),
                Err(e) => {
                    warn!(schema = schema.name(), "unreadable nested payload: {}", e);
                    return Self::new(schema);
                }
            }
        }
        message
    }

    /// Stand-in for a message value that was never produced
    pub(crate) fn placeholder() -> Self {
        Self::new(&Schema::empty(""))
    }

    /// The schema this message is bound to
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Reads a field, returning its default when absent
    pub fn get<T: FieldValue>(&self, field: &Field<T>) -> T {
        let tokens = self.fields.get(field.number());
        T::from_value(field.kind().decode(tokens, &self.schema))
    }

    /// Replaces every occurrence of a field with `value`
    pub fn set<T: FieldValue>(&mut self, field: &Field<T>, value: T) {
        let mut tokens = Vec::new();
        field.kind().encode(&value.into_value(), &mut tokens);
        self.fields.replace(field.number(), tokens);
    }

    /// Removes a field
    pub fn clear<T>(&mut self, field: &Field<T>) {
        self.fields.remove(field.number());
    }

    /// Returns true if the field has at least one occurrence
    pub fn has<T>(&self, field: &Field<T>) -> bool {
        self.fields.contains(field.number())
    }

    /// Reads a declared field by number
    pub fn get_value(&self, number: u32) -> Result<Value> {
        let descriptor = self
            .schema
            .field(number)
            .ok_or_else(|| Error::unknown_field(self.schema.name(), number))?;
        Ok(self.read(descriptor))
    }

    /// Replaces a declared field by number, checking the value's shape
    pub fn set_value(&mut self, number: u32, value: Value) -> Result<()> {
        let descriptor = self
            .schema
            .field(number)
            .ok_or_else(|| Error::unknown_field(self.schema.name(), number))?;

        if !descriptor.kind().accepts(&value, &self.schema) {
            return Err(Error::TypeMismatch {
                number,
                expected: descriptor.kind().type_name(self.schema.name()),
                found: value.kind_name(),
            });
        }

        let mut tokens = Vec::new();
        descriptor.kind().encode(&value, &mut tokens);
        self.fields.replace(number, tokens);
        Ok(())
    }

    /// Raw tokens stored for a field number
    pub fn tokens(&self, number: u32) -> &[Token] {
        self.fields.get(number)
    }

    /// All stored tokens
    pub fn token_map(&self) -> &TokenMap {
        &self.fields
    }

    /// Field numbers present that the schema does not declare
    pub fn unknown_fields(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields
            .numbers()
            .filter(|&number| self.schema.field(number).is_none())
    }

    /// Drops every field the schema does not declare
    pub fn clear_unknown_fields(&mut self) {
        let schema = &self.schema;
        self.fields.retain(|number| schema.field(number).is_some());
    }

    /// Writes the message in ascending field number order
    pub fn encode(&self, buf: &mut impl BufMut) {
        self.fields.encode(buf);
    }

    /// Length of the encoded message
    pub fn encoded_len(&self) -> usize {
        self.fields.encoded_len()
    }

    /// Encodes into a new vector
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    /// Encodes into a new [`Bytes`]
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    fn read(&self, descriptor: &FieldDescriptor) -> Value {
        descriptor
            .kind()
            .decode(self.fields.get(descriptor.number()), &self.schema)
    }
}

/// Messages are equal when they are bound to the same schema instance and
/// every declared field reads the same. Schemas are compared by identity, not
/// by name. Unknown fields and wire layout are not compared.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
            && self
                .schema
                .fields()
                .iter()
                .all(|descriptor| self.read(descriptor) == other.read(descriptor))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.schema.name());
        for descriptor in self.schema.fields() {
            if self.fields.contains(descriptor.number()) {
                out.field(descriptor.name(), &self.read(descriptor));
            }
        }
        let unknown: Vec<u32> = self.unknown_fields().collect();
        if !unknown.is_empty() {
            out.field("unknown_fields", &unknown);
        }
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb;
    use crate::wire::encode_packed_varints;

    struct Fixture {
        schema: SchemaRef,
        id: Field<i64>,
        name: Field<String>,
        flags: Field<Vec<i32>>,
    }

    fn fixture() -> Fixture {
        let mut builder = Schema::builder("Fixture");
        let id = builder.add("id", pb::int64(1));
        let name = builder.add("name", pb::string(2));
        let flags = builder.add("flags", pb::repeated::int32(3));
        Fixture {
            schema: builder.build().unwrap(),
            id,
            name,
            flags,
        }
    }

    #[test]
    fn test_set_replaces_not_appends() {
        let f = fixture();
        let mut message = Message::new(&f.schema);
        message.set(&f.flags, vec![1, 2]);
        message.set(&f.flags, vec![3]);
        assert_eq!(message.get(&f.flags), vec![3]);
        assert_eq!(message.tokens(3).len(), 1);
    }

    #[test]
    fn test_clear_and_has() {
        let f = fixture();
        let mut message = Message::build(&f.schema, |m| m.set(&f.id, 9));
        assert!(message.has(&f.id));
        message.clear(&f.id);
        assert!(!message.has(&f.id));
        assert_eq!(message.get(&f.id), 0);
    }

    #[test]
    fn test_dynamic_access() {
        let f = fixture();
        let mut message = Message::new(&f.schema);
        message.set_value(2, Value::String("dyn".into())).unwrap();
        assert_eq!(message.get(&f.name), "dyn");
        assert_eq!(message.get_value(2).unwrap(), Value::String("dyn".into()));

        assert!(matches!(
            message.set_value(2, Value::Int32(1)),
            Err(Error::TypeMismatch { number: 2, .. })
        ));
        assert!(matches!(
            message.get_value(7),
            Err(Error::UnknownField { number: 7, .. })
        ));
    }

    #[test]
    fn test_unknown_fields_survive_reencode() {
        let f = fixture();
        let data = [0x08, 0x05, 0x78, 0x2A]; // id = 5, field 15 = 42
        let message = Message::decode(&f.schema, &data).unwrap();
        assert_eq!(message.unknown_fields().collect::<Vec<_>>(), vec![15]);
        assert_eq!(message.encode_to_vec(), data);

        let mut trimmed = message.clone();
        trimmed.clear_unknown_fields();
        assert_eq!(trimmed.encode_to_vec(), vec![0x08, 0x05]);
        assert_eq!(trimmed, message);
    }

    #[test]
    fn test_malformed_packed_block_fails_decode() {
        let f = fixture();
        let mut data = vec![0x1A, 0x02];
        data.extend_from_slice(&[0x01, 0x80]);
        assert!(Message::decode(&f.schema, &data).is_err());

        let mut ok = vec![0x1A, 0x02];
        ok.extend_from_slice(&encode_packed_varints([1, 2]));
        assert_eq!(Message::decode(&f.schema, &ok).unwrap().get(&f.flags), vec![1, 2]);
    }

    #[test]
    fn test_strict_utf8() {
        let f = fixture();
        let data = [0x12, 0x01, 0xFF];

        let lenient = Message::decode(&f.schema, &data).unwrap();
        assert_eq!(lenient.get(&f.name), "\u{FFFD}");

        let strict = DecodeConfig::new().strict_utf8(true);
        assert!(matches!(
            Message::decode_with(&f.schema, &data, &strict),
            Err(Error::InvalidUtf8 { field: 2, .. })
        ));
    }

    #[test]
    fn test_encoded_len_matches() {
        let f = fixture();
        let message = Message::build(&f.schema, |m| {
            m.set(&f.id, -1);
            m.set(&f.name, "n".to_string());
            m.set(&f.flags, vec![1, 1000]);
        });
        assert_eq!(message.encoded_len(), message.encode_to_vec().len());
    }

    #[test]
    fn test_debug_lists_present_fields() {
        let f = fixture();
        let message = Message::build(&f.schema, |m| m.set(&f.id, 3));
        let rendered = format!("{:?}", message);
        assert!(rendered.starts_with("Fixture"));
        assert!(rendered.contains("id: Int64(3)"));
        assert!(!rendered.contains("name"));
    }

    #[test]
    fn test_schema_identity_is_not_by_name() {
        let f = fixture();
        let lookalike = fixture();
        assert_ne!(Message::new(&f.schema), Message::new(&lookalike.schema));

        let mut builder = Schema::builder("Holder");
        let inner = builder.add("inner", pb::message(&f.schema, 1));
        let holder = builder.build().unwrap();

        let mut message = Message::new(&holder);
        let foreign = Message::build(&lookalike.schema, |m| m.set(&lookalike.id, 1));
        assert!(matches!(
            message.set_value(1, Value::Message(foreign)),
            Err(Error::TypeMismatch { number: 1, .. })
        ));

        let native = Message::build(&f.schema, |m| m.set(&f.id, 1));
        message.set_value(1, Value::Message(native.clone())).unwrap();
        assert_eq!(message.get(&inner), native);
    }
}
