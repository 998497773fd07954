//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │       JSON Payload          │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! PING carries an empty payload; every other command carries the JSON
//! payload the engine interprets.
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │       JSON Body             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```

use std::io::{Read, Write};

use serde_json::Value;

use super::{Command, CommandType, Response};
use crate::error::{DbError, Result};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + JSON payload
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    let payload = match command.command_type {
        CommandType::Ping => Vec::new(),
        _ => serde_json::to_vec(&command.payload)?,
    };

    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.push(command.command_type as u8);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(&payload);

    Ok(message)
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    if bytes.len() < HEADER_SIZE {
        return Err(DbError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let cmd_byte = bytes[0];
    let payload_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(DbError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(DbError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    let command_type = CommandType::from_byte(cmd_byte).ok_or_else(|| {
        DbError::Protocol(format!("Unknown command type: 0x{:02x}", cmd_byte))
    })?;

    let body = &bytes[HEADER_SIZE..total_len];
    let payload = decode_payload(command_type, body)?;

    Ok(Command::new(command_type, payload))
}

fn decode_payload(command_type: CommandType, body: &[u8]) -> Result<Value> {
    match command_type {
        CommandType::Ping => {
            if !body.is_empty() {
                return Err(DbError::Protocol(format!(
                    "PING command: unexpected payload of {} bytes",
                    body.len()
                )));
            }
            Ok(Value::Null)
        }
        _ => {
            if body.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_slice(body).map_err(|e| {
                DbError::Protocol(format!(
                    "{} command: invalid JSON payload: {}",
                    command_type.name(),
                    e
                ))
            })
        }
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + body_len (4) + JSON body
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(response)?;

    let mut message = Vec::with_capacity(HEADER_SIZE + body.len());
    message.push(response.status() as u8);
    message.extend_from_slice(&(body.len() as u32).to_be_bytes());
    message.extend_from_slice(&body);

    Ok(message)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    if bytes.len() < HEADER_SIZE {
        return Err(DbError::Protocol(format!(
            "Incomplete response header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let status_byte = bytes[0];
    let body_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

    if body_len > MAX_PAYLOAD_SIZE as usize {
        return Err(DbError::Protocol(format!(
            "Response body too large: {} bytes (max {})",
            body_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + body_len;
    if bytes.len() < total_len {
        return Err(DbError::Protocol(format!(
            "Incomplete response body: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    if status_byte > 0x01 {
        return Err(DbError::Protocol(format!(
            "Unknown response status: 0x{:02x}",
            status_byte
        )));
    }

    let response: Response = serde_json::from_slice(&bytes[HEADER_SIZE..total_len])
        .map_err(|e| DbError::Protocol(format!("Invalid response body: {}", e)))?;

    Ok(response)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(DbError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }

    let mut full_message = Vec::with_capacity(HEADER_SIZE + payload_len);
    full_message.extend_from_slice(&header);
    full_message.extend_from_slice(&payload);

    decode_command(&full_message)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let body_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if body_len > MAX_PAYLOAD_SIZE as usize {
        return Err(DbError::Protocol(format!(
            "Response body too large: {} bytes (max {})",
            body_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut body = vec![0u8; body_len];
    if body_len > 0 {
        reader.read_exact(&mut body)?;
    }

    let mut full_message = Vec::with_capacity(HEADER_SIZE + body_len);
    full_message.extend_from_slice(&header);
    full_message.extend_from_slice(&body);

    decode_response(&full_message)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
