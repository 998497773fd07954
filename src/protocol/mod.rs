//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (V1 - Framed JSON)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │       JSON Payload          │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: CREATE - Payload: nested {db: {collection: {key: doc}}} shape
//! - 0x02: READ   - Payload: resource path, optionally down to one document
//! - 0x03: UPDATE - Payload: rename markers and/or document merges
//! - 0x04: DELETE - Payload: resource path, name filters, or predicates
//! - 0x05: SEARCH - Payload: predicate shape, optionally paginated
//! - 0x06: LIST   - Payload: resource path to enumerate
//! - 0x07: PING   - Payload: empty
//! - 0x08: EXPORT - Payload: resource path to dump as one nested object
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │       JSON Body             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: ERROR

mod codec;
mod command;
mod response;

pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command, read_response,
    write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{Command, CommandType};
pub use response::{OpCounts, Response, Status};
