//! Extensible token visiting.
//!
//! This module provides the [`TokenVisitor`] trait for customizing what
//! happens to each field occurrence found by an
//! [`Inspector`](super::Inspector).

use std::fmt::Result;

/// Callbacks for each field occurrence in a schema-less walk.
///
/// Every method has a no-op default, so implementors only override what they
/// need. `depth` is 0 for top-level fields.
///
/// # Example
///
/// ```
/// use ferment_core::inspect::{Inspector, TokenVisitor};
///
/// #[derive(Default)]
/// struct NumberCollector(Vec<u32>);
///
/// impl TokenVisitor for NumberCollector {
///     fn visit_varint(&mut self, number: u32, _value: i64, _depth: usize) -> std::fmt::Result {
///         self.0.push(number);
///         Ok(())
///     }
/// }
///
/// let inspector = Inspector::from_bytes(&[0x08, 0x01, 0x10, 0x02])?;
/// let mut collector = NumberCollector::default();
/// inspector.walk(&mut collector).unwrap();
/// assert_eq!(collector.0, vec![1, 2]);
/// # Ok::<(), ferment_core::Error>(())
/// ```
pub trait TokenVisitor {
    /// A length-delimited payload that parsed as a nested message begins
    fn enter_message(&mut self, number: u32, depth: usize) -> Result {
        let _ = (number, depth);
        Ok(())
    }

    /// The nested message opened by the matching `enter_message` ends
    fn exit_message(&mut self, number: u32, depth: usize) -> Result {
        let _ = (number, depth);
        Ok(())
    }

    /// A varint occurrence
    fn visit_varint(&mut self, number: u32, value: i64, depth: usize) -> Result {
        let _ = (number, value, depth);
        Ok(())
    }

    /// A fixed32 occurrence
    fn visit_fixed32(&mut self, number: u32, value: i32, depth: usize) -> Result {
        let _ = (number, value, depth);
        Ok(())
    }

    /// A fixed64 occurrence
    fn visit_fixed64(&mut self, number: u32, value: i64, depth: usize) -> Result {
        let _ = (number, value, depth);
        Ok(())
    }

    /// A length-delimited payload that looks like printable text
    fn visit_text(&mut self, number: u32, text: &str, depth: usize) -> Result {
        let _ = (number, text, depth);
        Ok(())
    }

    /// Any other length-delimited payload
    fn visit_binary(&mut self, number: u32, data: &[u8], depth: usize) -> Result {
        let _ = (number, data, depth);
        Ok(())
    }
}

/// A no-op visitor
pub struct NullVisitor;

impl TokenVisitor for NullVisitor {}

/// A visitor that counts what it sees
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsVisitor {
    /// Varint occurrences
    pub varints: usize,
    /// Fixed32 occurrences
    pub fixed32s: usize,
    /// Fixed64 occurrences
    pub fixed64s: usize,
    /// Payloads rendered as text
    pub texts: usize,
    /// Payloads rendered as binary
    pub binaries: usize,
    /// Payloads parsed as nested messages
    pub messages: usize,
    /// Deepest nesting level reached
    pub max_depth: usize,
}

impl StatsVisitor {
    /// Total number of field occurrences, nested ones included
    pub fn total(&self) -> usize {
        self.varints + self.fixed32s + self.fixed64s + self.texts + self.binaries + self.messages
    }

    fn reach(&mut self, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
    }
}

impl TokenVisitor for StatsVisitor {
    fn enter_message(&mut self, _number: u32, depth: usize) -> Result {
        self.messages += 1;
        self.reach(depth);
        Ok(())
    }

    fn visit_varint(&mut self, _number: u32, _value: i64, depth: usize) -> Result {
        self.varints += 1;
        self.reach(depth);
        Ok(())
    }

    fn visit_fixed32(&mut self, _number: u32, _value: i32, depth: usize) -> Result {
        self.fixed32s += 1;
        self.reach(depth);
        Ok(())
    }

    fn visit_fixed64(&mut self, _number: u32, _value: i64, depth: usize) -> Result {
        self.fixed64s += 1;
        self.reach(depth);
        Ok(())
    }

    fn visit_text(&mut self, _number: u32, _text: &str, depth: usize) -> Result {
        self.texts += 1;
        self.reach(depth);
        Ok(())
    }

    fn visit_binary(&mut self, _number: u32, _data: &[u8], depth: usize) -> Result {
        self.binaries += 1;
        self.reach(depth);
        Ok(())
    }
}
