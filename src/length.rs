//! Field sizes and the PDU length expression.

use snafu::{OptionExt, Snafu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum LengthError {
    #[snafu(display("length reference `{}` was not resolved at this point", name))]
    UnresolvedReference { name: String },

    #[snafu(display("invalid length expression `{}`", expr))]
    InvalidExpression { expr: String },
}

pub type Result<T, E = LengthError> = std::result::Result<T, E>;

/// The declared size of a primitive or list field: a literal byte/element
/// count, or the name of an earlier sibling field whose decoded integer
/// value supplies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Size {
    Literal(usize),
    Ref(String),
}

impl Size {
    pub fn literal(n: usize) -> Self {
        Size::Literal(n)
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Size::Ref(name.into())
    }

    /// Resolve the size against the sibling values decoded/encoded so
    /// far in the enclosing container.
    pub fn resolve(&self, siblings: &Siblings) -> Result<usize> {
        match self {
            Size::Literal(n) => Ok(*n),
            Size::Ref(name) => siblings
                .get(name)
                .map(|v| v as usize)
                .context(UnresolvedReferenceSnafu { name: name.clone() }),
        }
    }
}

/// Running table of named sibling values already encoded/decoded within
/// the current container, threaded through so later fields can resolve
/// length references to earlier ones.
#[derive(Debug, Default, Clone)]
pub struct Siblings(std::collections::HashMap<String, u64>);

impl Siblings {
    pub fn new() -> Self {
        Siblings(std::collections::HashMap::new())
    }

    pub fn set(&mut self, name: &str, value: u64) {
        if !name.is_empty() {
            self.0.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
}

/// The arithmetic expression relating a PDU placeholder to the header
/// field that carries the wire length, e.g. `length-4` or `length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthExpr {
    pub reference: String,
    pub op: Op,
    pub offset: u32,
}

impl LengthExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        for (op, ch) in [(Op::Sub, '-'), (Op::Add, '+')] {
            if let Some(idx) = expr.rfind(ch) {
                if idx > 0 {
                    let (reference, offset) = expr.split_at(idx);
                    let offset: u32 = offset[1..]
                        .trim()
                        .parse()
                        .ok()
                        .context(InvalidExpressionSnafu { expr: expr.to_string() })?;
                    return Ok(LengthExpr {
                        reference: reference.trim().to_string(),
                        op,
                        offset,
                    });
                }
            }
        }
        if expr.is_empty() {
            return InvalidExpressionSnafu { expr: expr.to_string() }.fail();
        }
        Ok(LengthExpr {
            reference: expr.to_string(),
            op: Op::Add,
            offset: 0,
        })
    }

    /// The value to write into the referenced header field, given the
    /// actual encoded body length.
    pub fn field_value_from_body_len(&self, body_len: u64) -> u64 {
        match self.op {
            Op::Add => body_len.saturating_sub(self.offset as u64),
            Op::Sub => body_len + self.offset as u64,
        }
    }

    /// The body length implied by the decoded value of the referenced
    /// header field.
    pub fn body_len_from_field_value(&self, field_value: u64) -> u64 {
        match self.op {
            Op::Add => field_value + self.offset as u64,
            Op::Sub => field_value.saturating_sub(self.offset as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_reference() {
        let e = LengthExpr::parse("length").unwrap();
        assert_eq!(e.reference, "length");
        assert_eq!(e.offset, 0);
        assert_eq!(e.op, Op::Add);
    }

    #[test]
    fn parses_subtraction() {
        let e = LengthExpr::parse("length-4").unwrap();
        assert_eq!(e.reference, "length");
        assert_eq!(e.op, Op::Sub);
        assert_eq!(e.offset, 4);
        assert_eq!(e.field_value_from_body_len(8), 12);
        assert_eq!(e.body_len_from_field_value(12), 8);
    }

    #[test]
    fn resolves_size_from_sibling() {
        let mut siblings = Siblings::new();
        siblings.set("len", 4);
        assert_eq!(Size::reference("len").resolve(&siblings).unwrap(), 4);
        assert!(Size::reference("missing").resolve(&siblings).is_err());
    }
}
