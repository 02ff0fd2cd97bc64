//! This crate contains the types and methods needed to template,
//! encode, decode and validate binary protocol messages exchanged with
//! black-box network services under test.
//!
//! - The [`field`] module provides the primitive field kinds (`UInt`,
//!   `Char`) that every message is ultimately built from.
//! - The [`container`] module provides the recursive `Struct` and
//!   `List` containers that compose primitives into richer shapes.
//! - The [`protocol`] module describes a message family's fixed header
//!   layout, including the single PDU length placeholder a header may
//!   carry.
//! - The [`message`] module ties a [`protocol::Protocol`] and a body of
//!   fields into a [`message::MessageTemplate`], which can encode a
//!   parameter overlay into bytes, decode bytes into a
//!   [`message::Message`], and validate a decoded message against an
//!   expected overlay.
//! - The [`value`] module is the decoded message tree (`Value`) that
//!   `encode`/`decode` produce and consume.
//! - The [`path`] module implements the projection rules used to scope
//!   a flat parameter overlay down through nested containers.
//! - The [`length`] module resolves field and list sizes, including the
//!   arithmetic relating a PDU field to the body's encoded length.
//! - The [`stream`] module buffers reads from a [`net::Transport`] so
//!   callers can request an exact byte count.
//! - The [`net`] module provides the UDP and TCP transports this crate
//!   treats as external collaborators.

pub mod container;
pub mod field;
pub mod length;
pub mod message;
pub mod net;
pub mod path;
pub mod protocol;
pub mod stream;
pub mod value;

pub use container::{ContainerError, Field, List, Struct};
pub use field::{CharField, FieldError, UIntField};
pub use length::{LengthError, LengthExpr, Op, Size};
pub use message::{Message, MessageError, MessageTemplate};
pub use net::{NetError, Transport};
pub use path::{ParamMap, ParamValue, PathError};
pub use protocol::{HeaderField, PduField, Protocol, ProtocolError};
pub use stream::{BufferedStream, StreamError, Timeout};
pub use value::Value;
