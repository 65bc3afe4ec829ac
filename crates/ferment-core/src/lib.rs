//! # ferment-core
//!
//! A schema-driven codec for the Protocol Buffers wire format.
//!
//! This crate provides:
//! - A varint engine and the four protobuf wire shapes as [`Token`]s
//! - Schemas built at runtime from numbered, typed fields
//! - A [`Message`] object with typed `get`/`set` over those schemas
//! - Schema-less inspection of captured bytes
//!
//! Output is bit-compatible with the core protobuf encoding: varints, tag
//! multiplexing, fixed32/fixed64, length-delimited payloads and packed
//! repeated scalars. Zigzag integers, groups and `.proto` parsing are not
//! supported.
//!
//! ## Architecture
//!
//! - [`wire`]: varints, tags, tokens and the token reader
//! - [`schema`]: field kinds, descriptors and schemas
//! - [`pb`]: constructors for typed [`Field`] handles
//! - [`message`]: the object model
//! - [`inspect`]: raw dumps for reverse engineering
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```
//! use ferment_core::{pb, Message, Schema};
//!
//! let mut builder = Schema::builder("Contact");
//! let uin = builder.add("uin", pb::int64(1));
//! let nickname = builder.add("nickname", pb::string(2));
//! let groups = builder.add("groups", pb::repeated::int32(3));
//! let contact = builder.build()?;
//!
//! let message = Message::build(&contact, |m| {
//!     m.set(&uin, 10001);
//!     m.set(&nickname, "acid".to_string());
//!     m.set(&groups, vec![1, 2, 3]);
//! });
//!
//! let bytes = message.encode_to_vec();
//! let decoded = Message::decode(&contact, &bytes)?;
//! assert_eq!(decoded.get(&nickname), "acid");
//! assert_eq!(decoded, message);
//! # Ok::<(), ferment_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod error;
mod field;
pub mod inspect;
pub mod message;
pub mod schema;
pub mod value;
pub mod wire;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use field::{pb, Field};
pub use inspect::{Inspector, InspectorConfig, StatsVisitor, TokenVisitor};
pub use message::{DecodeConfig, Message};
pub use schema::{FieldDescriptor, FieldKind, MessageType, Schema, SchemaBuilder, SchemaRef};
pub use value::{FieldValue, Value};
pub use wire::{Token, TokenMap, WireType};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;
