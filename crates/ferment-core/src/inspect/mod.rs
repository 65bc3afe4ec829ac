//! Schema-less inspection of wire bytes.
//!
//! When a packet's schema is not known yet, the bytes can still be split
//! into tags and tokens. [`Inspector`] does that and guesses what each
//! length-delimited payload holds, trying in order:
//!
//! 1. printable UTF-8 text (if enabled),
//! 2. a nested message that tokenizes completely,
//! 3. raw binary, rendered as hex.
//!
//! The guess is a heuristic: a short binary blob can happen to parse as a
//! message. Rendering goes through the [`TokenVisitor`] trait; the built-in
//! tree renderer produces output in the spirit of `protoc --decode_raw`.

mod visitor;

use crate::error::Result;
use crate::wire::{Token, TokenReader};
use std::fmt::Write as FmtWrite;

pub use visitor::{NullVisitor, StatsVisitor, TokenVisitor};

/// Configuration for inspection
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// Deepest level at which payloads are tried as nested messages
    pub max_depth: usize,
    /// Render printable payloads as quoted text
    pub render_text: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            max_depth: 16,
            render_text: true,
        }
    }
}

impl InspectorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets the deepest level tried as a nested message
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets whether printable payloads render as text
    pub fn render_text(mut self, render: bool) -> Self {
        self.render_text = render;
        self
    }
}

/// What a length-delimited payload appears to contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    /// A nested message, fields in wire order
    Message(Vec<(u32, Token)>),
    /// Printable text
    Text(&'a str),
    /// Anything else
    Binary(&'a [u8]),
}

/// Classifies a length-delimited payload found at `depth`
pub fn classify<'a>(data: &'a [u8], depth: usize, config: &InspectorConfig) -> Payload<'a> {
    if config.render_text {
        if let Ok(text) = std::str::from_utf8(data) {
            if !text.is_empty() && text.chars().all(is_printable) {
                return Payload::Text(text);
            }
        }
    }

    if depth < config.max_depth && !data.is_empty() {
        if let Ok(fields) = read_fields(data) {
            return Payload::Message(fields);
        }
    }

    Payload::Binary(data)
}

/// Walks and renders the fields of one buffer
#[derive(Debug, Clone)]
pub struct Inspector {
    fields: Vec<(u32, Token)>,
    config: InspectorConfig,
}

impl Inspector {
    /// Tokenizes the top level of a buffer
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self {
            fields: read_fields(data)?,
            config: InspectorConfig::default(),
        })
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: InspectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Top-level fields in wire order
    pub fn fields(&self) -> &[(u32, Token)] {
        &self.fields
    }

    /// Feeds every occurrence, nested ones included, to the visitor
    pub fn walk<V: TokenVisitor + ?Sized>(&self, visitor: &mut V) -> std::fmt::Result {
        walk_fields(&self.fields, 0, &self.config, visitor)
    }

    /// Renders the indented tree as a string
    pub fn render(&self) -> String {
        let mut output = String::new();
        self.write_to(&mut output).expect("String write cannot fail");
        output
    }

    /// Writes the indented tree
    pub fn write_to(&self, w: &mut impl FmtWrite) -> std::fmt::Result {
        let mut writer = TreeWriter::new(w, &self.config);
        self.walk(&mut writer)
    }
}

fn read_fields(data: &[u8]) -> Result<Vec<(u32, Token)>> {
    let mut fields = Vec::new();
    let mut reader = TokenReader::new(data);
    while let Some(field) = reader.next_field()? {
        fields.push(field);
    }
    Ok(fields)
}

fn walk_fields<V: TokenVisitor + ?Sized>(
    fields: &[(u32, Token)],
    depth: usize,
    config: &InspectorConfig,
    visitor: &mut V,
) -> std::fmt::Result {
    for (number, token) in fields {
        let number = *number;
        match token {
            Token::Varint(value) => visitor.visit_varint(number, *value, depth)?,
            Token::Fixed32(value) => visitor.visit_fixed32(number, *value, depth)?,
            Token::Fixed64(value) => visitor.visit_fixed64(number, *value, depth)?,
            Token::LengthDelimited(data) => match classify(data, depth, config) {
                Payload::Message(children) => {
                    visitor.enter_message(number, depth)?;
                    walk_fields(&children, depth + 1, config, visitor)?;
                    visitor.exit_message(number, depth)?;
                }
                Payload::Text(text) => visitor.visit_text(number, text, depth)?,
                Payload::Binary(data) => visitor.visit_binary(number, data, depth)?,
            },
        }
    }
    Ok(())
}

/// Default renderer: one line per occurrence, nested messages in braces
struct TreeWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a InspectorConfig,
}

impl<'a, W: FmtWrite> TreeWriter<'a, W> {
    fn new(writer: &'a mut W, config: &'a InspectorConfig) -> Self {
        Self { writer, config }
    }

    fn write_indent(&mut self, depth: usize) -> std::fmt::Result {
        for _ in 0..depth {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }
}

impl<W: FmtWrite> TokenVisitor for TreeWriter<'_, W> {
    fn enter_message(&mut self, number: u32, depth: usize) -> std::fmt::Result {
        self.write_indent(depth)?;
        writeln!(self.writer, "{} {{", number)
    }

    fn exit_message(&mut self, _number: u32, depth: usize) -> std::fmt::Result {
        self.write_indent(depth)?;
        writeln!(self.writer, "}}")
    }

    fn visit_varint(&mut self, number: u32, value: i64, depth: usize) -> std::fmt::Result {
        self.write_indent(depth)?;
        writeln!(self.writer, "{}: {}", number, value)
    }

    fn visit_fixed32(&mut self, number: u32, value: i32, depth: usize) -> std::fmt::Result {
        self.write_indent(depth)?;
        writeln!(self.writer, "{}: 0x{:08x}", number, value)
    }

    fn visit_fixed64(&mut self, number: u32, value: i64, depth: usize) -> std::fmt::Result {
        self.write_indent(depth)?;
        writeln!(self.writer, "{}: 0x{:016x}", number, value)
    }

    fn visit_text(&mut self, number: u32, text: &str, depth: usize) -> std::fmt::Result {
        self.write_indent(depth)?;
        writeln!(self.writer, "{}: \"{}\"", number, escape_string(text))
    }

    fn visit_binary(&mut self, number: u32, data: &[u8], depth: usize) -> std::fmt::Result {
        self.write_indent(depth)?;
        writeln!(self.writer, "{}: 0x{}", number, hex(data))
    }
}

fn is_printable(c: char) -> bool {
    !c.is_control() || matches!(c, '\n' | '\r' | '\t')
}

/// Lowercase hex without separators
pub fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Escape a string for display between double quotes
fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => result.push(c),
        }
    }
    result
}
