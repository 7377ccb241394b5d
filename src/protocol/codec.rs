//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Payload by Command Type
//! - FETCH:  ns_len (4) + namespace + id_len (4) + id
//! - PUT:    ns_len (4) + namespace + id_len (4) + id + body
//! - DELETE: ns_len (4) + namespace
//! - PING:   empty

use std::io::{Read, Write};

use crate::error::{Result, StoreError};
use super::{Command, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Vec<u8> {
    let cmd_type = command.command_type() as u8;

    let payload = match command {
        Command::Fetch { namespace, id } => {
            let mut payload = Vec::with_capacity(8 + namespace.len() + id.len());
            put_str(&mut payload, namespace);
            put_str(&mut payload, id);
            payload
        }
        Command::Put {
            namespace,
            id,
            body,
        } => {
            let mut payload = Vec::with_capacity(8 + namespace.len() + id.len() + body.len());
            put_str(&mut payload, namespace);
            put_str(&mut payload, id);
            payload.extend_from_slice(body);
            payload
        }
        Command::Delete { namespace } => {
            let mut payload = Vec::with_capacity(4 + namespace.len());
            put_str(&mut payload, namespace);
            payload
        }
        Command::Ping => Vec::new(),
    };

    frame(cmd_type, &payload)
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, payload) = split_frame(bytes, "command")?;

    match cmd_type {
        0x01 => {
            let mut cursor = payload;
            let namespace = take_str(&mut cursor, "FETCH", "namespace")?;
            let id = take_str(&mut cursor, "FETCH", "id")?;
            expect_end(cursor, "FETCH")?;
            Ok(Command::Fetch { namespace, id })
        }
        0x02 => {
            let mut cursor = payload;
            let namespace = take_str(&mut cursor, "PUT", "namespace")?;
            let id = take_str(&mut cursor, "PUT", "id")?;
            Ok(Command::Put {
                namespace,
                id,
                body: cursor.to_vec(),
            })
        }
        0x03 => {
            let mut cursor = payload;
            let namespace = take_str(&mut cursor, "DELETE", "namespace")?;
            expect_end(cursor, "DELETE")?;
            Ok(Command::Delete { namespace })
        }
        0x04 => {
            expect_end(payload, "PING")?;
            Ok(Command::Ping)
        }
        _ => Err(StoreError::Protocol(format!(
            "Unknown command type: 0x{:02x}",
            cmd_type
        ))),
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame(response.status as u8, payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, "response")?;

    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::NotFound,
        0x02 => Status::Error,
        _ => {
            return Err(StoreError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let message = read_frame(reader, "command")?;
    decode_command(&message)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let message = read_frame(reader, "response")?;
    decode_response(&message)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Build header + payload
fn frame(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.push(kind);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(payload);
    message
}

/// Validate a header and return (kind byte, payload slice)
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let payload_len = payload_len(&bytes[..HEADER_SIZE], what)?;
    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(StoreError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..total_len]))
}

/// Parse and bound the payload length from a header
fn payload_len(header: &[u8], what: &str) -> Result<usize> {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(StoreError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

/// Read header, then exactly the announced payload
fn read_frame<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let len = payload_len(&header, what)?;

    let mut message = vec![0u8; HEADER_SIZE + len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    if len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }
    Ok(message)
}

/// Append a length-prefixed string
fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Consume a length-prefixed string from the front of `cursor`
fn take_str(cursor: &mut &[u8], cmd: &str, field: &str) -> Result<String> {
    if cursor.len() < 4 {
        return Err(StoreError::Protocol(format!(
            "{} command: missing {} length",
            cmd, field
        )));
    }

    let len = u32::from_be_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]) as usize;
    if cursor.len() < 4 + len {
        return Err(StoreError::Protocol(format!(
            "{} command: incomplete {} (expected {}, got {})",
            cmd,
            field,
            len,
            cursor.len() - 4
        )));
    }

    let value = std::str::from_utf8(&cursor[4..4 + len])
        .map_err(|e| StoreError::Protocol(format!("{} command: {} is not UTF-8: {}", cmd, field, e)))?
        .to_string();
    *cursor = &cursor[4 + len..];
    Ok(value)
}

fn expect_end(rest: &[u8], cmd: &str) -> Result<()> {
    if !rest.is_empty() {
        return Err(StoreError::Protocol(format!(
            "{} command: unexpected trailing {} bytes",
            cmd,
            rest.len()
        )));
    }
    Ok(())
}
