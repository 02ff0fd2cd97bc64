//! Primitive field kinds: `UInt`, `Char`, and the `Pdu` placeholder.

use snafu::{ensure, Backtrace, OptionExt, Snafu};

use crate::length::{Siblings, Size};
use crate::path::{ParamMap, ParamValue};
use crate::value::Value;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum FieldError {
    #[snafu(display("no value for field `{}`", name))]
    MissingValue { name: String, backtrace: Backtrace },

    #[snafu(display("value does not fit in field `{}` (size {})", name, size))]
    ValueOverflow {
        name: String,
        size: usize,
        backtrace: Backtrace,
    },

    #[snafu(display("field `{}` contains non-ASCII byte(s)", name))]
    NotAscii { name: String },

    #[snafu(display("not enough data to decode field `{}`: need {}, have {}", name, needed, available))]
    LengthUnderflow {
        name: String,
        needed: usize,
        available: usize,
        backtrace: Backtrace,
    },

    #[snafu(display("could not resolve size of field `{}`", name))]
    UnresolvedSize {
        name: String,
        source: crate::length::LengthError,
    },

    #[snafu(display("invalid hex literal `{}`", literal))]
    InvalidHex { literal: String },
}

pub type Result<T, E = FieldError> = std::result::Result<T, E>;

/// Parse a decimal or `0x`-prefixed (whitespace-tolerant) hex literal.
pub fn parse_uint_literal(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let cleaned: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
        u64::from_str_radix(&cleaned, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn resolve_uint(value: &ParamValue) -> Result<u64> {
    match value {
        ParamValue::Int(v) => Ok(*v),
        ParamValue::Str(s) => parse_uint_literal(s).context(InvalidHexSnafu { literal: s.clone() }),
    }
}

/// A big-endian unsigned integer field, `size` bytes wide.
#[derive(Debug, Clone)]
pub struct UIntField {
    pub name: Option<String>,
    pub size: Size,
    pub default: Option<ParamValue>,
}

impl UIntField {
    pub fn new(size: usize, name: impl Into<Option<String>>, default: impl Into<Option<ParamValue>>) -> Self {
        UIntField {
            name: name.into(),
            size: Size::literal(size),
            default: default.into(),
        }
    }

    pub fn sized_by(size_ref: impl Into<String>, name: impl Into<Option<String>>, default: impl Into<Option<ParamValue>>) -> Self {
        UIntField {
            name: name.into(),
            size: Size::reference(size_ref),
            default: default.into(),
        }
    }

    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn encode(&self, params: &ParamMap, siblings: &mut Siblings) -> Result<Vec<u8>> {
        let size = self.size.resolve(siblings).context(UnresolvedSizeSnafu {
            name: self.effective_name().to_string(),
        })?;
        let value = match params.get(self.effective_name()).or(self.default.as_ref()) {
            Some(v) => resolve_uint(v)?,
            None => {
                return MissingValueSnafu {
                    name: self.effective_name().to_string(),
                }
                .fail()
            }
        };
        ensure!(
            size >= 8 || value < (1u64 << (size * 8)),
            ValueOverflowSnafu {
                name: self.effective_name().to_string(),
                size,
            }
        );
        siblings.set(self.effective_name(), value);
        let bytes = value.to_be_bytes();
        Ok(bytes[8 - size..].to_vec())
    }

    pub fn decode(&self, bytes: &[u8], siblings: &mut Siblings) -> Result<(Value, usize)> {
        let size = self.size.resolve(siblings).context(UnresolvedSizeSnafu {
            name: self.effective_name().to_string(),
        })?;
        ensure!(
            bytes.len() >= size,
            LengthUnderflowSnafu {
                name: self.effective_name().to_string(),
                needed: size,
                available: bytes.len(),
            }
        );
        let raw = bytes[..size].to_vec();
        let mut buf = [0u8; 8];
        buf[8 - size..].copy_from_slice(&raw);
        let value = u64::from_be_bytes(buf);
        siblings.set(self.effective_name(), value);
        Ok((Value::UInt { raw }, size))
    }
}

/// A fixed-width ASCII byte string, zero-padded on the right.
#[derive(Debug, Clone)]
pub struct CharField {
    pub name: Option<String>,
    pub size: Size,
    pub default: Option<ParamValue>,
}

impl CharField {
    pub fn new(size: impl Into<SizeSpec>, name: impl Into<Option<String>>, default: impl Into<Option<ParamValue>>) -> Self {
        CharField {
            name: name.into(),
            size: size.into().0,
            default: default.into(),
        }
    }

    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn encode(&self, params: &ParamMap, siblings: &mut Siblings) -> Result<Vec<u8>> {
        let size = self.size.resolve(siblings).context(UnresolvedSizeSnafu {
            name: self.effective_name().to_string(),
        })?;
        let text = match params.get(self.effective_name()).or(self.default.as_ref()) {
            Some(v) => v.as_str().into_owned(),
            None => {
                return MissingValueSnafu {
                    name: self.effective_name().to_string(),
                }
                .fail()
            }
        };
        ensure!(
            text.is_ascii(),
            NotAsciiSnafu {
                name: self.effective_name().to_string(),
            }
        );
        ensure!(
            text.len() <= size,
            ValueOverflowSnafu {
                name: self.effective_name().to_string(),
                size,
            }
        );
        let mut bytes = text.into_bytes();
        bytes.resize(size, 0);
        Ok(bytes)
    }

    pub fn decode(&self, bytes: &[u8], siblings: &mut Siblings) -> Result<(Value, usize)> {
        let size = self.size.resolve(siblings).context(UnresolvedSizeSnafu {
            name: self.effective_name().to_string(),
        })?;
        ensure!(
            bytes.len() >= size,
            LengthUnderflowSnafu {
                name: self.effective_name().to_string(),
                needed: size,
                available: bytes.len(),
            }
        );
        let raw = bytes[..size].to_vec();
        Ok((Value::Char { raw }, size))
    }
}

/// Helper so callers can write `CharField::new(4, ...)` or
/// `CharField::new("len", ...)` without an intermediate `Size` import.
pub struct SizeSpec(pub Size);

impl From<usize> for SizeSpec {
    fn from(n: usize) -> Self {
        SizeSpec(Size::literal(n))
    }
}

impl From<&str> for SizeSpec {
    fn from(s: &str) -> Self {
        SizeSpec(Size::reference(s))
    }
}

impl From<String> for SizeSpec {
    fn from(s: String) -> Self {
        SizeSpec(Size::reference(s))
    }
}
