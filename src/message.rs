//! Message templates: a header [`crate::protocol::Protocol`] paired with
//! a body of recursive [`crate::container::Field`]s, and the decoded
//! [`Message`] they produce.

use std::fmt;
use std::ops::Index;

use snafu::{ensure, ResultExt, Snafu};

use crate::container::{ContainerError, Field};
use crate::length::Siblings;
use crate::path::ParamMap;
use crate::protocol::{Protocol, ProtocolError};
use crate::value::{write_named, Value};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum MessageError {
    #[snafu(display("unknown top-level parameter(s): {}", keys.join(", ")))]
    UnknownParameter { keys: Vec<String> },

    #[snafu(display("failed to encode header"))]
    EncodeHeader { source: ProtocolError },

    #[snafu(display("failed to decode header"))]
    DecodeHeader { source: ProtocolError },

    #[snafu(display("failed to encode body field `{}`", name))]
    EncodeBody { name: String, source: ContainerError },

    #[snafu(display("failed to decode body field `{}`", name))]
    DecodeBody { name: String, source: ContainerError },

    #[snafu(display("message body is shorter than its declared length"))]
    BodyUnderflow,

    #[snafu(display("message body is longer than its declared length ({} unread byte(s))", remaining))]
    BodyOverflow { remaining: usize },
}

pub type Result<T, E = MessageError> = std::result::Result<T, E>;

/// A named header+body layout that can encode parameter overlays into
/// bytes, decode bytes into a [`Message`], and validate a decoded
/// message against an expected parameter overlay.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    pub name: String,
    pub protocol: Protocol,
    pub body: Vec<Field>,
}

impl MessageTemplate {
    pub fn new(name: impl Into<String>, protocol: Protocol) -> Self {
        MessageTemplate {
            name: name.into(),
            protocol,
            body: Vec::new(),
        }
    }

    pub fn add(&mut self, field: Field) -> &mut Self {
        self.body.push(field);
        self
    }

    /// All top-level dotted/bracketed paths this template recognizes,
    /// used to reject unknown keys in `params` before encoding anything.
    fn known_top_level_names(&self) -> Vec<String> {
        self.body.iter().map(|f| f.effective_name().to_string()).collect()
    }

    fn reject_unknown(&self, params: &ParamMap) -> Result<()> {
        let known = self.known_top_level_names();
        let unknown: Vec<String> = params
            .keys()
            .filter(|k| {
                let head = k.split(['.', '[']).next().unwrap_or(k);
                !known.iter().any(|n| n == head)
            })
            .cloned()
            .collect();
        ensure!(unknown.is_empty(), UnknownParameterSnafu { keys: unknown });
        Ok(())
    }

    /// Encode the body first (so its encoded length is known), then the
    /// header, which derives its deferred length field from that body
    /// length. The wire image is `header_prefix ++ body ++ header_suffix`.
    pub fn encode(&self, params: &ParamMap) -> Result<Message> {
        self.reject_unknown(params)?;

        let mut body_siblings = Siblings::new();
        let mut body_bytes = Vec::new();
        for field in &self.body {
            let bytes = field.encode(params, &mut body_siblings).context(EncodeBodySnafu {
                name: field.effective_name().to_string(),
            })?;
            body_bytes.extend(&bytes);
        }

        let mut header_siblings = Siblings::new();
        let (prefix, suffix) = self
            .protocol
            .encode(params, &mut header_siblings, body_bytes.len() as u64)
            .context(EncodeHeaderSnafu)?;

        let mut decode_siblings = Siblings::new();
        let (mut header_children, _, _) = self.protocol.decode_prefix(&prefix, &mut decode_siblings).context(DecodeHeaderSnafu)?;
        let (suffix_children, _) = self.protocol.decode_suffix(&suffix, &mut decode_siblings).context(DecodeHeaderSnafu)?;
        header_children.extend(suffix_children);

        let body_value = self.decode_body_from_bytes(&body_bytes)?.0;

        let mut raw = prefix;
        raw.extend(&body_bytes);
        raw.extend(&suffix);

        Ok(Message {
            name: self.name.clone(),
            header: Value::Struct {
                type_name: self.protocol.name.clone(),
                children: header_children,
            },
            body: body_value,
            raw,
        })
    }

    fn decode_body_from_bytes(&self, bytes: &[u8]) -> Result<(Value, usize)> {
        let mut offset = 0;
        let mut siblings = Siblings::new();
        let mut children = Vec::with_capacity(self.body.len());
        for field in &self.body {
            let (value, consumed) = field.decode(&bytes[offset..], &mut siblings).context(DecodeBodySnafu {
                name: field.effective_name().to_string(),
            })?;
            offset += consumed;
            children.push((field.effective_name().to_string(), value));
        }
        Ok((
            Value::Struct {
                type_name: self.name.clone(),
                children,
            },
            offset,
        ))
    }

    /// Decode a complete message: header prefix first, then a body of
    /// exactly the length the PDU's reference field implies (or the
    /// rest of `bytes`, when the protocol declares no PDU), then the
    /// header suffix (footer).
    pub fn decode(&self, bytes: &[u8]) -> Result<Message> {
        let mut siblings = Siblings::new();
        let (mut header_children, prefix_len, body_len) =
            self.protocol.decode_prefix(bytes, &mut siblings).context(DecodeHeaderSnafu)?;

        let after_prefix = &bytes[prefix_len..];
        let (body_bytes, after_body_offset) = match body_len {
            Some(len) => {
                let len = len as usize;
                ensure!(after_prefix.len() >= len, BodyUnderflowSnafu);
                (&after_prefix[..len], len)
            }
            None => (after_prefix, after_prefix.len()),
        };

        let (body_value, consumed) = self.decode_body_from_bytes(body_bytes)?;
        ensure!(consumed <= body_bytes.len(), BodyUnderflowSnafu);
        if body_len.is_none() {
            let remaining = body_bytes.len() - consumed;
            ensure!(remaining == 0, BodyOverflowSnafu { remaining });
        }

        let footer_bytes = &after_prefix[after_body_offset..];
        let (suffix_children, suffix_len) = self.protocol.decode_suffix(footer_bytes, &mut siblings).context(DecodeHeaderSnafu)?;
        header_children.extend(suffix_children);

        let total = prefix_len + after_body_offset + suffix_len;
        let raw = bytes[..total].to_vec();

        Ok(Message {
            name: self.name.clone(),
            header: Value::Struct {
                type_name: self.protocol.name.clone(),
                children: header_children,
            },
            body: body_value,
            raw,
        })
    }

    /// Compare a decoded message against an expected parameter overlay,
    /// returning one description per mismatching field. The effective
    /// expectation for each field is the template's own declared
    /// default, overridden by any entry in `params`.
    pub fn validate(&self, message: &Message, params: &ParamMap) -> Vec<String> {
        let mut effective = ParamMap::new();
        for field in &self.body {
            field.collect_defaults("", &mut effective);
        }
        effective.extend(params.clone());

        let mut errors = Vec::new();
        for field in &self.body {
            let Some(value) = message.body.field(field.effective_name()) else {
                continue;
            };
            errors.extend(field.validate(value, &effective));
        }
        errors
    }
}

/// A decoded (or freshly encoded) message: its header and body value
/// trees, and the exact bytes that produced or resulted from them.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub name: String,
    pub header: Value,
    pub body: Value,
    pub raw: Vec<u8>,
}

impl Message {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.field(name)
    }

    pub fn header_field(&self, name: &str) -> Option<&Value> {
        self.header.field(name)
    }
}

impl Index<&str> for Message {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        self.body.field(name).expect("unknown body field")
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message {}", self.name)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Message {}", self.name)?;
        if let Value::Struct { type_name, children } = &self.header {
            writeln!(f, "  {type_name} header")?;
            for (child_name, child_value) in children {
                write_named(f, child_name, child_value, 2)?;
            }
        }
        if let Value::Struct { children, .. } = &self.body {
            for (child_name, child_value) in children {
                write_named(f, child_name, child_value, 1)?;
            }
        }
        Ok(())
    }
}
