//! Message schemas.
//!
//! A [`Schema`] is an ordered set of [`FieldDescriptor`]s, unique by field
//! number. Schemas are ordinary values: build one with [`SchemaBuilder`],
//! share it as a [`SchemaRef`], and reference it from message-typed fields of
//! other schemas. A field can point back at its own schema through
//! [`MessageType::Recursive`].
//!
//! ```
//! use ferment_core::{pb, Message, Schema};
//!
//! let mut builder = Schema::builder("Point");
//! let x = builder.add("x", pb::int32(1));
//! let y = builder.add("y", pb::int32(2));
//! let schema = builder.build()?;
//!
//! let point = Message::build(&schema, |p| {
//!     p.set(&x, 3);
//!     p.set(&y, -4);
//! });
//! let decoded = Message::decode(&schema, &point.encode_to_vec())?;
//! assert_eq!(decoded.get(&y), -4);
//! # Ok::<(), ferment_core::Error>(())
//! ```

mod kind;

use crate::error::{Error, Result};
use crate::field::Field;
use crate::MAX_FIELD_NUMBER;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use kind::{FieldKind, MessageType};

/// Shared handle to a built schema
pub type SchemaRef = Arc<Schema>;

/// One numbered, named, typed field of a schema
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    number: u32,
    kind: FieldKind,
}

impl FieldDescriptor {
    /// Creates a new descriptor
    pub fn new(name: impl Into<String>, number: u32, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            number,
            kind,
        }
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
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

/// An ordered set of field descriptors describing one message shape
#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDescriptor>,
    by_number: HashMap<u32, usize>,
}

impl Schema {
    /// Starts building a schema
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// A schema without fields
    pub fn empty(name: impl Into<String>) -> SchemaRef {
        Arc::new(Self {
            name: name.into(),
            fields: Vec::new(),
            by_number: HashMap::new(),
        })
    }

    /// Schema name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by number
    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    /// Looks up a field by name
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Renders a `.proto`-style message block, for logs and debugging
impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "message {} {{", self.name)?;
        for field in &self.fields {
            write!(
                f,
                "  {} {} = {}",
                field.kind.type_name(&self.name),
                field.name,
                field.number
            )?;
            if let FieldKind::Repeated {
                element,
                packed: false,
            } = &field.kind
            {
                if element.is_varint_scalar() {
                    write!(f, " [packed = false]")?;
                }
            }
            writeln!(f, ";")?;
        }
        write!(f, "}}")
    }
}

/// Collects descriptors and validates them into a [`Schema`]
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl SchemaBuilder {
    /// Creates an empty builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declares a typed field and hands the handle back for later get/set
    pub fn add<T>(&mut self, name: impl Into<String>, field: Field<T>) -> Field<T> {
        self.push(FieldDescriptor::new(name, field.number(), field.kind().clone()));
        field
    }

    /// Declares a typed field, chaining
    pub fn field<T>(mut self, name: impl Into<String>, field: &Field<T>) -> Self {
        self.push(FieldDescriptor::new(name, field.number(), field.kind().clone()));
        self
    }

    /// Declares an untyped field
    pub fn push(&mut self, descriptor: FieldDescriptor) -> &mut Self {
        self.fields.push(descriptor);
        self
    }

    /// Validates field numbers, uniqueness and kind nesting
    pub fn build(self) -> Result<SchemaRef> {
        let mut by_number = HashMap::with_capacity(self.fields.len());

        for (index, field) in self.fields.iter().enumerate() {
            if field.number == 0 || field.number > MAX_FIELD_NUMBER {
                return Err(Error::InvalidFieldNumber {
                    number: u64::from(field.number),
                    max: MAX_FIELD_NUMBER,
                });
            }
            if by_number.insert(field.number, index).is_some() {
                return Err(Error::DuplicateField {
                    schema: self.name,
                    number: field.number,
                });
            }
            field.kind.check(field.number)?;
        }

        debug!(schema = %self.name, fields = self.fields.len(), "built schema");

        Ok(Arc::new(Schema {
            name: self.name,
            fields: self.fields,
            by_number,
        }))
    }
}
