//! Binary control protocol carried over the data channel.
//!
//! Every message is a one-byte tag followed by fixed-width big-endian fields:
//!
//! | tag    | variant                | body                        | total |
//! |--------|------------------------|-----------------------------|-------|
//! | `0x00` | `Connected`            | -                           | 1     |
//! | `0x01` | `Hangup`               | `call_id: u64`              | 9     |
//! | `0x02` | `VideoStreamingStatus` | `call_id: u64`, `enabled: u8` | 10  |
//! | `0x03` | `Busy`                 | `call_id: u64`              | 9     |
//!
//! The `enabled` flag must be `0` or `1`. Payloads shorter or longer than the
//! variant's shape are rejected.

use crate::error::DecodeError;
use crate::peer::types::CallId;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const TAG_CONNECTED: u8 = 0x00;
pub const TAG_HANGUP: u8 = 0x01;
pub const TAG_VIDEO_STREAMING_STATUS: u8 = 0x02;
pub const TAG_BUSY: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Connected,
    Hangup { call_id: CallId },
    VideoStreamingStatus { call_id: CallId, enabled: bool },
    Busy { call_id: CallId },
}

impl ControlMessage {
    pub fn tag(&self) -> u8 {
        match self {
            ControlMessage::Connected => TAG_CONNECTED,
            ControlMessage::Hangup { .. } => TAG_HANGUP,
            ControlMessage::VideoStreamingStatus { .. } => TAG_VIDEO_STREAMING_STATUS,
            ControlMessage::Busy { .. } => TAG_BUSY,
        }
    }

    /// Call id carried by the message; `Connected` has none.
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            ControlMessage::Connected => None,
            ControlMessage::Hangup { call_id }
            | ControlMessage::VideoStreamingStatus { call_id, .. }
            | ControlMessage::Busy { call_id } => Some(*call_id),
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            ControlMessage::Connected => 1,
            ControlMessage::Hangup { .. } | ControlMessage::Busy { .. } => 9,
            ControlMessage::VideoStreamingStatus { .. } => 10,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.tag());
        match self {
            ControlMessage::Connected => {}
            ControlMessage::Hangup { call_id } | ControlMessage::Busy { call_id } => {
                buf.put_u64(call_id.value());
            }
            ControlMessage::VideoStreamingStatus { call_id, enabled } => {
                buf.put_u64(call_id.value());
                buf.put_u8(u8::from(*enabled));
            }
        }
        buf.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (&tag, mut body) = bytes.split_first().ok_or(DecodeError::Malformed {
            reason: "empty payload",
        })?;

        let message = match tag {
            TAG_CONNECTED => ControlMessage::Connected,
            TAG_HANGUP => ControlMessage::Hangup {
                call_id: read_call_id(&mut body)?,
            },
            TAG_VIDEO_STREAMING_STATUS => {
                let call_id = read_call_id(&mut body)?;
                let enabled = read_flag(&mut body)?;
                ControlMessage::VideoStreamingStatus { call_id, enabled }
            }
            TAG_BUSY => ControlMessage::Busy {
                call_id: read_call_id(&mut body)?,
            },
            other => return Err(DecodeError::UnknownVariant(other)),
        };

        if body.has_remaining() {
            return Err(DecodeError::Malformed {
                reason: "trailing bytes",
            });
        }
        Ok(message)
    }
}

pub fn encode(message: &ControlMessage) -> Bytes {
    message.encode()
}

pub fn decode(bytes: &[u8]) -> Result<ControlMessage, DecodeError> {
    ControlMessage::decode(bytes)
}

fn read_call_id(body: &mut &[u8]) -> Result<CallId, DecodeError> {
    if body.remaining() < 8 {
        return Err(DecodeError::Malformed {
            reason: "truncated call id",
        });
    }
    Ok(CallId(body.get_u64()))
}

fn read_flag(body: &mut &[u8]) -> Result<bool, DecodeError> {
    if !body.has_remaining() {
        return Err(DecodeError::Malformed {
            reason: "truncated flag",
        });
    }
    match body.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(DecodeError::Malformed {
            reason: "flag out of range",
        }),
    }
}
