//! Wire format: length-prefixed frames.
//!
//! ```text
//! +----------------+-------------+------------------------------+
//! | length: u32 BE | tag: u16 BE | bincode(envelope)            |
//! +----------------+-------------+------------------------------+
//! ```
//!
//! `length` covers the tag and the body. The tag is resolved through the
//! [`MessageTable`]; the envelope carries sender, destination, NCCC,
//! timestamp and payload.

use std::io::{ErrorKind, Read, Write};

use dcopforge_config::MessageTable;
use dcopforge_core::{AgentId, DcopError, Result};
use serde::{Deserialize, Serialize};

use crate::message::{Message, Payload};

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const LEN_BYTES: usize = 4;
const TAG_BYTES: usize = 2;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    sender: &'a AgentId,
    dest: &'a AgentId,
    nccc: u64,
    timestamp: Option<u64>,
    payload: &'a Payload,
}

impl<'a> From<&'a Message> for EnvelopeRef<'a> {
    fn from(msg: &'a Message) -> Self {
        EnvelopeRef {
            sender: &msg.sender,
            dest: &msg.dest,
            nccc: msg.nccc,
            timestamp: msg.timestamp,
            payload: &msg.payload,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    sender: AgentId,
    dest: AgentId,
    nccc: u64,
    timestamp: Option<u64>,
    payload: Payload,
}

/// Encodes a complete frame, length prefix included.
pub fn encode(msg: &Message, table: &MessageTable) -> Result<Vec<u8>> {
    let tag = table.tag(msg.kind).ok_or_else(|| {
        DcopError::Configuration(format!("no wire tag for message kind {}", msg.kind))
    })?;
    let body = bincode::serialize(&EnvelopeRef::from(msg))
        .map_err(|e| DcopError::ProtocolViolation(format!("cannot encode {}: {e}", msg.kind)))?;
    let len = TAG_BYTES + body.len();
    if len > MAX_FRAME_LEN {
        return Err(DcopError::ProtocolViolation(format!(
            "{} frame of {len} bytes exceeds the limit",
            msg.kind
        )));
    }
    let mut frame = Vec::with_capacity(LEN_BYTES + len);
    frame.extend_from_slice(&(len as u32).to_be_bytes());
    frame.extend_from_slice(&tag.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a frame body (tag and envelope, without the length prefix).
pub fn decode(frame: &[u8], table: &MessageTable) -> Result<Message> {
    if frame.len() < TAG_BYTES {
        return Err(DcopError::ProtocolViolation("truncated frame".to_string()));
    }
    let tag = u16::from_be_bytes([frame[0], frame[1]]);
    let kind = table
        .kind(tag)
        .ok_or_else(|| DcopError::ProtocolViolation(format!("unknown wire tag {tag}")))?;
    let envelope: Envelope = bincode::deserialize(&frame[TAG_BYTES..])
        .map_err(|e| DcopError::ProtocolViolation(format!("cannot decode {kind}: {e}")))?;
    if envelope.payload.kind() != kind {
        return Err(DcopError::ProtocolViolation(format!(
            "tag {tag} announces {kind} but carries {}",
            envelope.payload.kind()
        )));
    }
    Ok(Message {
        kind,
        sender: envelope.sender,
        dest: envelope.dest,
        nccc: envelope.nccc,
        timestamp: envelope.timestamp,
        payload: envelope.payload,
    })
}

pub fn write_frame<W: Write>(writer: &mut W, msg: &Message, table: &MessageTable) -> Result<()> {
    let frame = encode(msg, table)?;
    writer.write_all(&frame)?;
    Ok(())
}

/// Reads one frame. Returns `None` on a clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R, table: &MessageTable) -> Result<Option<Message>> {
    let mut len = [0u8; LEN_BYTES];
    match reader.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len) as usize;
    if !(TAG_BYTES..=MAX_FRAME_LEN).contains(&len) {
        return Err(DcopError::ProtocolViolation(format!("invalid frame length {len}")));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    decode(&body, table).map(Some)
}

/// Size of `msg` on the wire, used for message statistics.
pub fn encoded_len(msg: &Message) -> u64 {
    let body = bincode::serialized_size(&EnvelopeRef::from(msg)).unwrap_or(0);
    (LEN_BYTES + TAG_BYTES) as u64 + body
}
