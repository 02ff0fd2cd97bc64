//! The decoded message tree: a tagged variant with per-primitive views
//! and a uniform path lookup.

use std::fmt;

/// A node of a decoded message: either a primitive leaf or a container
/// that owns its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    UInt { raw: Vec<u8> },
    Char { raw: Vec<u8> },
    Struct {
        type_name: String,
        children: Vec<(String, Value)>,
    },
    List { items: Vec<Value> },
}

impl Value {
    pub fn int(&self) -> Option<u64> {
        match self {
            Value::UInt { raw } => {
                let mut buf = [0u8; 8];
                buf[8 - raw.len()..].copy_from_slice(raw);
                Some(u64::from_be_bytes(buf))
            }
            _ => None,
        }
    }

    pub fn hex(&self) -> Option<String> {
        match self {
            Value::UInt { raw } | Value::Char { raw } => Some(format!("0x{}", hex_lower(raw))),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Value::UInt { raw } | Value::Char { raw } => Some(raw),
            _ => None,
        }
    }

    pub fn ascii(&self) -> Option<String> {
        match self {
            Value::Char { raw } => Some(String::from_utf8_lossy(raw).trim_end_matches('\0').to_string()),
            _ => None,
        }
    }

    /// Encoded byte footprint of this node.
    pub fn len(&self) -> usize {
        match self {
            Value::UInt { raw } | Value::Char { raw } => raw.len(),
            Value::Struct { children, .. } => children.iter().map(|(_, v)| v.len()).sum(),
            Value::List { items } => items.iter().map(Value::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Access a named child of a `Struct` node.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct { children, .. } => children.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Access an indexed child of a `List` node.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Value::List { items } => items.get(index),
            _ => None,
        }
    }

    /// Resolve a dotted/bracketed parameter path against this node,
    /// e.g. `"pair.first"` or `"liststruct[1].first"`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut node = self;
        let mut rest = path;
        while !rest.is_empty() {
            if let Some(stripped) = rest.strip_prefix('[') {
                let close = stripped.find(']')?;
                let index: usize = stripped[..close].parse().ok()?;
                node = node.at(index)?;
                rest = &stripped[close + 1..];
                rest = rest.strip_prefix('.').unwrap_or(rest);
            } else {
                let end = rest.find(['.', '[']).unwrap_or(rest.len());
                let (name, remainder) = rest.split_at(end);
                node = node.field(name)?;
                rest = remainder.strip_prefix('.').unwrap_or(remainder);
            }
        }
        Some(node)
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn element_kind_label(items: &[Value]) -> String {
    match items.first() {
        Some(Value::UInt { .. }) => "uint".to_string(),
        Some(Value::Char { .. }) => "ascii".to_string(),
        Some(Value::Struct { type_name, .. }) => type_name.clone(),
        Some(Value::List { .. }) => "List".to_string(),
        None => "empty".to_string(),
    }
}

fn fmt_named(f: &mut fmt::Formatter<'_>, name: &str, value: &Value, indent: usize) -> fmt::Result {
    let pad = "  ".repeat(indent);
    match value {
        Value::UInt { .. } => writeln!(f, "{pad}{name} = {}", value.hex().unwrap()),
        Value::Char { raw } => writeln!(f, "{pad}{name} = \"{}\"", String::from_utf8_lossy(raw).trim_end_matches('\0')),
        Value::Struct { type_name, children } => {
            writeln!(f, "{pad}{name} {type_name}")?;
            for (child_name, child_value) in children {
                fmt_named(f, child_name, child_value, indent + 1)?;
            }
            Ok(())
        }
        Value::List { items } => {
            writeln!(f, "{pad}{name} {}", element_kind_label(items))?;
            for (index, item) in items.iter().enumerate() {
                fmt_named(f, &index.to_string(), item, indent + 1)?;
            }
            Ok(())
        }
    }
}

/// `repr`-style pretty-printer for a standalone field value (as opposed
/// to a full [`crate::message::Message`], which additionally prefixes
/// the message name and header block).
pub struct Pretty<'a> {
    pub name: &'a str,
    pub value: &'a Value,
}

impl fmt::Display for Pretty<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_named(f, self.name, self.value, 0)
    }
}

pub(crate) fn write_named(f: &mut fmt::Formatter<'_>, name: &str, value: &Value, indent: usize) -> fmt::Result {
    fmt_named(f, name, value, indent)
}
