/*!
 * Registry Wire Protocol
 *
 * Length-prefixed bincode frames over a byte stream. Every request is
 * answered with exactly one response, in order; `SetMessageWait` is
 * acknowledged too so the stream never desynchronizes.
 */

use crate::core::errors::SyncError;
use crate::core::types::{RawHandle, SlotIndex};
use crate::object::ObjectKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Upper bound on a frame payload. Requests carry at most an object name.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Requests the engine sends to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    CreateObject {
        kind: ObjectKind,
        access: u32,
        name: Option<String>,
        init_a: i32,
        init_b: i32,
    },
    OpenObject {
        kind: ObjectKind,
        access: u32,
        name: String,
    },
    ResolveHandle {
        handle: RawHandle,
    },
    SetMessageWait {
        in_wait: bool,
    },
}

/// Responses from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Object {
        handle: RawHandle,
        slot: SlotIndex,
        kind: ObjectKind,
        already_existed: bool,
    },
    Resolved {
        slot: SlotIndex,
        kind: ObjectKind,
    },
    Ack,
    Error(Status),
}

/// Status codes the registry may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    InvalidHandle,
    NotFound,
    NotImplemented,
    InvalidParameter,
}

impl From<Status> for SyncError {
    fn from(status: Status) -> Self {
        match status {
            Status::InvalidHandle | Status::NotFound => SyncError::InvalidHandle,
            Status::NotImplemented => SyncError::NotImplemented,
            Status::InvalidParameter => {
                SyncError::InvalidParameter("rejected by registry".into())
            }
        }
    }
}

/// Serialize one message with its length prefix.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let payload =
        bincode::serialize(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()
}

/// Read and deserialize one length-prefixed message.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    bincode::deserialize(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
