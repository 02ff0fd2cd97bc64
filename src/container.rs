//! Recursive container fields: `Struct` and `List`.

use snafu::{ensure, ResultExt, Snafu};

use crate::field::{CharField, FieldError, UIntField};
use crate::length::{LengthError, Siblings, Size};
use crate::path::{element_params_by_index, list_sub_tree, struct_sub_tree, ParamMap, ParamValue};
use crate::value::{write_named, Value};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ContainerError {
    #[snafu(display("failed to encode field `{}`", name))]
    EncodeField { name: String, source: FieldError },

    #[snafu(display("failed to decode field `{}`", name))]
    DecodeField { name: String, source: FieldError },

    #[snafu(display("failed to resolve list size"))]
    ListSize { source: LengthError },

    #[snafu(display("not enough data to decode list element {}", index))]
    ListUnderflow { index: usize },

    #[snafu(display("unknown parameters: {}", keys.join(", ")))]
    UnknownParameters { keys: Vec<String> },
}

pub type Result<T, E = ContainerError> = std::result::Result<T, E>;

/// Any node a `Struct` or `List` may hold as a child: a primitive, or
/// another container.
#[derive(Debug, Clone)]
pub enum Field {
    UInt(UIntField),
    Char(CharField),
    Struct(Struct),
    List(List),
}

impl Field {
    pub fn name(&self) -> Option<&str> {
        match self {
            Field::UInt(f) => f.name.as_deref(),
            Field::Char(f) => f.name.as_deref(),
            Field::Struct(s) => Some(&s.name),
            Field::List(l) => l.name.as_deref(),
        }
    }

    pub fn effective_name(&self) -> &str {
        self.name().unwrap_or("")
    }

    pub fn encode(&self, params: &ParamMap, siblings: &mut Siblings) -> Result<Vec<u8>> {
        match self {
            Field::UInt(f) => f.encode(params, siblings).context(EncodeFieldSnafu {
                name: f.effective_name().to_string(),
            }),
            Field::Char(f) => f.encode(params, siblings).context(EncodeFieldSnafu {
                name: f.effective_name().to_string(),
            }),
            Field::Struct(s) => s.encode(params, siblings),
            Field::List(l) => l.encode(params, siblings),
        }
    }

    pub fn decode(&self, bytes: &[u8], siblings: &mut Siblings) -> Result<(Value, usize)> {
        match self {
            Field::UInt(f) => f.decode(bytes, siblings).context(DecodeFieldSnafu {
                name: f.effective_name().to_string(),
            }),
            Field::Char(f) => f.decode(bytes, siblings).context(DecodeFieldSnafu {
                name: f.effective_name().to_string(),
            }),
            Field::Struct(s) => s.decode(bytes, siblings),
            Field::List(l) => l.decode(bytes, siblings),
        }
    }

    /// Compare a decoded value node against an effective parameter map
    /// scoped to this field; see [`crate::message::MessageTemplate::validate`].
    pub fn validate(&self, value: &Value, params: &ParamMap) -> Vec<String> {
        match self {
            Field::UInt(f) => validate_primitive(f.effective_name(), value, params),
            Field::Char(f) => validate_primitive(f.effective_name(), value, params),
            Field::Struct(s) => s.validate(value, params),
            Field::List(l) => l.validate(value, params),
        }
    }

    /// Collect this field's declared default (and those of its
    /// descendants) as dotted/bracketed path -> literal string entries.
    pub fn collect_defaults(&self, prefix: &str, out: &mut ParamMap) {
        match self {
            Field::UInt(f) => {
                if let Some(default) = &f.default {
                    out.insert(join(prefix, f.effective_name()), default.clone());
                }
            }
            Field::Char(f) => {
                if let Some(default) = &f.default {
                    out.insert(join(prefix, f.effective_name()), default.clone());
                }
            }
            Field::Struct(s) => {
                let sub_prefix = join(prefix, &s.name);
                for child in &s.children {
                    child.collect_defaults(&sub_prefix, out);
                }
            }
            Field::List(_) => {
                // list element defaults are validated per-index on demand;
                // there is no single dotted path to anchor them at.
            }
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Matching rule shared by every primitive: the expected value is an
/// integer (decimal or `0x` hex) compared by value, or else a regular
/// expression matched (anchored at start) against the field's hex text.
pub fn matches_expected(actual: &Value, expected: &ParamValue) -> bool {
    let expected_str = expected.as_str();
    if let Some(expected_int) = crate::field::parse_uint_literal(&expected_str) {
        return actual.int() == Some(expected_int);
    }
    // Not an integer literal: match as a pattern against the field's
    // own text representation. UInt fields compare against unpadded
    // hex digits (no leading zeros, no `0x`); Char fields compare
    // against their decoded ASCII text directly.
    let text = match actual {
        Value::Char { .. } => actual.ascii().unwrap_or_default(),
        _ => actual.int().map(|v| format!("{v:x}")).unwrap_or_default(),
    };
    regex::Regex::new(&format!("^(?:{expected_str})$"))
        .map(|re| re.is_match(&text))
        .unwrap_or(false)
}

fn validate_primitive(name: &str, value: &Value, params: &ParamMap) -> Vec<String> {
    let Some(expected) = params.get(name) else {
        return Vec::new();
    };
    if matches_expected(value, expected) {
        Vec::new()
    } else {
        let actual = value.hex().unwrap_or_default();
        vec![format!("Value of field {name} does not match {actual}!={expected}")]
    }
}

/// A named, ordered sequence of child fields.
#[derive(Debug, Clone)]
pub struct Struct {
    pub type_name: String,
    pub name: String,
    pub children: Vec<Field>,
}

impl Struct {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Struct {
            type_name: type_name.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn add(&mut self, field: Field) -> &mut Self {
        self.children.push(field);
        self
    }

    pub fn encode(&self, params: &ParamMap, _siblings: &mut Siblings) -> Result<Vec<u8>> {
        let local = struct_sub_tree(params, &self.name);
        let mut out = Vec::new();
        let mut local_siblings = Siblings::new();
        for child in &self.children {
            out.extend(child.encode(&local, &mut local_siblings)?);
        }
        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8], _siblings: &mut Siblings) -> Result<(Value, usize)> {
        let mut offset = 0;
        let mut local_siblings = Siblings::new();
        let mut children = Vec::with_capacity(self.children.len());
        for child in &self.children {
            let (value, consumed) = child.decode(&bytes[offset..], &mut local_siblings)?;
            offset += consumed;
            children.push((child.effective_name().to_string(), value));
        }
        Ok((
            Value::Struct {
                type_name: self.type_name.clone(),
                children,
            },
            offset,
        ))
    }

    pub fn validate(&self, value: &Value, params: &ParamMap) -> Vec<String> {
        let local_params = struct_sub_tree(params, &self.name);
        let mut effective = ParamMap::new();
        for child in &self.children {
            child.collect_defaults("", &mut effective);
        }
        effective.extend(local_params);
        let mut errors = Vec::new();
        for child in &self.children {
            let Some(child_value) = value.field(child.effective_name()) else {
                continue;
            };
            errors.extend(child.validate(child_value, &effective));
        }
        errors
    }
}

/// A size (literal or length reference) and a single shared element
/// template.
#[derive(Debug, Clone)]
pub struct List {
    pub name: Option<String>,
    pub size: Size,
    pub element: Box<Field>,
}

impl List {
    pub fn new(size: usize, name: impl Into<Option<String>>, element: Field) -> Self {
        List {
            name: name.into(),
            size: Size::literal(size),
            element: Box::new(element),
        }
    }

    pub fn sized_by(size_ref: impl Into<String>, name: impl Into<Option<String>>, element: Field) -> Self {
        List {
            name: name.into(),
            size: Size::reference(size_ref),
            element: Box::new(element),
        }
    }

    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn encode(&self, params: &ParamMap, siblings: &mut Siblings) -> Result<Vec<u8>> {
        let size = self.size.resolve(siblings).context(ListSizeSnafu)?;
        let local = list_sub_tree(params, self.effective_name());
        let per_index = element_params_by_index(&local, self.element.effective_name(), size);
        let mut out = Vec::new();
        for index_params in per_index {
            out.extend(self.element.encode(&index_params, siblings)?);
        }
        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8], siblings: &mut Siblings) -> Result<(Value, usize)> {
        let size = self.size.resolve(siblings).context(ListSizeSnafu)?;
        let mut offset = 0;
        let mut items = Vec::with_capacity(size);
        for index in 0..size {
            ensure!(offset <= bytes.len(), ListUnderflowSnafu { index });
            let (value, consumed) = self.element.decode(&bytes[offset..], siblings)?;
            offset += consumed;
            items.push(value);
        }
        Ok((Value::List { items }, offset))
    }

    pub fn validate(&self, value: &Value, params: &ParamMap) -> Vec<String> {
        let local = list_sub_tree(params, self.effective_name());
        let size = match value {
            Value::List { items } => items.len(),
            _ => return Vec::new(),
        };
        let per_index = element_params_by_index(&local, self.element.effective_name(), size);
        let mut errors = Vec::new();
        for (index, index_params) in per_index.into_iter().enumerate() {
            if let Some(item) = value.at(index) {
                errors.extend(self.element.validate(item, &index_params));
            }
        }
        errors
    }
}

/// Pretty-print a standalone field value, as `repr()` would for a
/// top-level `Struct`/`List` in the original implementation.
pub fn pretty(name: &str, value: &Value) -> String {
    struct Writer<'a>(&'a str, &'a Value);
    impl std::fmt::Display for Writer<'_> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write_named(f, self.0, self.1, 0)
        }
    }
    format!("{}", Writer(name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::UIntField;

    fn pair_struct() -> Struct {
        let mut s = Struct::new("Pair", "pair");
        s.add(Field::UInt(UIntField::new(2, "first".to_string(), ParamValue::Int(1))));
        s.add(Field::UInt(UIntField::new(2, "second".to_string(), ParamValue::Int(2))));
        s
    }

    #[test]
    fn struct_encode_default() {
        let s = pair_struct();
        let mut siblings = Siblings::new();
        let bytes = s.encode(&ParamMap::new(), &mut siblings).unwrap();
        assert_eq!(bytes, vec![0, 1, 0, 2]);
    }

    #[test]
    fn struct_encode_override() {
        let s = pair_struct();
        let mut params = ParamMap::new();
        params.insert("pair.first".to_string(), ParamValue::Int(42));
        let mut siblings = Siblings::new();
        let bytes = s.encode(&params, &mut siblings).unwrap();
        assert_eq!(bytes, vec![0, 42, 0, 2]);
    }

    #[test]
    fn nested_struct_override() {
        let mut outer = Struct::new("StructStruct", "str_str");
        outer.add(Field::Struct(pair_struct()));
        let mut params = ParamMap::new();
        params.insert("str_str.pair.first".to_string(), ParamValue::Int(42));
        let mut siblings = Siblings::new();
        let bytes = outer.encode(&params, &mut siblings).unwrap();
        assert_eq!(bytes, vec![0, 42, 0, 2]);
    }

    #[test]
    fn list_of_three_default_and_override() {
        let list = List::new(3, "topthree".to_string(), Field::UInt(UIntField::new(2, None, ParamValue::Int(1))));
        let mut siblings = Siblings::new();
        let mut params = ParamMap::new();
        params.insert("topthree[0]".to_string(), ParamValue::Int(42));
        let bytes = list.encode(&params, &mut siblings).unwrap();
        assert_eq!(bytes, vec![0, 42, 0, 1, 0, 1]);
    }

    #[test]
    fn list_of_structs_override_by_index() {
        let list = List::new(2, "liststruct".to_string(), Field::Struct(pair_struct()));
        let mut params = ParamMap::new();
        params.insert("liststruct[1].first".to_string(), ParamValue::Int(24));
        let mut siblings = Siblings::new();
        let bytes = list.encode(&params, &mut siblings).unwrap();
        assert_eq!(bytes, vec![0, 1, 0, 2, 0, 24, 0, 2]);
    }

    #[test]
    fn nested_list_of_lists() {
        let inner = List::new(2, None, Field::UInt(UIntField::new(2, None, ParamValue::Int(7))));
        let outer = List::new(2, "listlist".to_string(), Field::List(inner));
        let mut params = ParamMap::new();
        params.insert("listlist[0][1]".to_string(), ParamValue::Int(10));
        params.insert("listlist[1][0]".to_string(), ParamValue::Int(55));
        let mut siblings = Siblings::new();
        let bytes = outer.encode(&params, &mut siblings).unwrap();
        // index0: [7,10], index1: [55,7]
        assert_eq!(bytes, vec![0, 7, 0, 10, 0, 55, 0, 7]);
    }

    #[test]
    fn decode_list_of_structs() {
        let list = List::new(2, "liststruct".to_string(), Field::Struct(pair_struct()));
        let mut siblings = Siblings::new();
        let (value, consumed) = list.decode(&[0xca, 0xfe, 0xba, 0xbe, 0xd0, 0x0d, 0xf0, 0x0d], &mut siblings).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(value.at(0).unwrap().field("first").unwrap().hex().unwrap(), "0xcafe");
        assert_eq!(value.at(1).unwrap().field("second").unwrap().hex().unwrap(), "0xf00d");
    }
}
