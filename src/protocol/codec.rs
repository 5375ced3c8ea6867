//! Codec Module
//!
//! Encoding and strict decoding of wire commands.
//!
//! | Command | Bytes |
//! |---|---|
//! | Set | `[0][key len u8][key][value len u32][value][ttl ms u32]` |
//! | Get | `[1][key len u8][key]` |
//! | Has | `[2][key len u8][key]` |
//! | Delete | `[3][key len u8][key]` |
//! | Show | `[4]` |

use crate::error::ProtocolError;
use crate::protocol::{Command, TAG_DELETE, TAG_GET, TAG_HAS, TAG_SET, TAG_SHOW};

const KEY_HEADER: usize = 2;
const U32_LEN: usize = 4;

impl Command {
    // == Encode ==
    /// Serializes the command into its wire form.
    ///
    /// Fails when the key is empty or longer than 255 bytes, or the value
    /// does not fit a u32 length.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Command::Set { key, value, ttl_ms } => {
                let value_len = u32::try_from(value.len())
                    .map_err(|_| ProtocolError::ValueTooLong(value.len()))?;
                let mut buf = encode_key(TAG_SET, key, ProtocolError::InvalidSet)?;
                buf.reserve(U32_LEN * 2 + value.len());
                buf.extend_from_slice(&value_len.to_le_bytes());
                buf.extend_from_slice(value);
                buf.extend_from_slice(&ttl_ms.to_le_bytes());
                Ok(buf)
            }
            Command::Get { key } => encode_key(TAG_GET, key, ProtocolError::InvalidGet),
            Command::Has { key } => encode_key(TAG_HAS, key, ProtocolError::InvalidHas),
            Command::Delete { key } => encode_key(TAG_DELETE, key, ProtocolError::InvalidDelete),
            Command::Show => Ok(vec![TAG_SHOW]),
        }
    }

    // == Decode ==
    /// Parses exactly one command from `buf`.
    ///
    /// Lengths are checked strictly: missing or trailing bytes are an error,
    /// never truncated or padded.
    pub fn decode(buf: &[u8]) -> Result<Command, ProtocolError> {
        let Some(&tag) = buf.first() else {
            return Err(ProtocolError::InvalidCommand);
        };

        match tag {
            TAG_SET => decode_set(buf),
            TAG_GET => decode_key(buf, ProtocolError::InvalidGet).map(|key| Command::Get { key }),
            TAG_HAS => decode_key(buf, ProtocolError::InvalidHas).map(|key| Command::Has { key }),
            TAG_DELETE => {
                decode_key(buf, ProtocolError::InvalidDelete).map(|key| Command::Delete { key })
            }
            TAG_SHOW if buf.len() == 1 => Ok(Command::Show),
            TAG_SHOW => Err(ProtocolError::InvalidShow),
            _ => Err(ProtocolError::InvalidCommand),
        }
    }
}

fn encode_key(tag: u8, key: &[u8], invalid: ProtocolError) -> Result<Vec<u8>, ProtocolError> {
    if key.is_empty() {
        return Err(invalid);
    }
    let key_len = u8::try_from(key.len()).map_err(|_| ProtocolError::KeyTooLong(key.len()))?;

    let mut buf = Vec::with_capacity(KEY_HEADER + key.len());
    buf.push(tag);
    buf.push(key_len);
    buf.extend_from_slice(key);
    Ok(buf)
}

fn decode_key(buf: &[u8], invalid: ProtocolError) -> Result<Vec<u8>, ProtocolError> {
    // Tag, length and at least one key byte
    if buf.len() <= KEY_HEADER {
        return Err(invalid);
    }
    let key_len = buf[1] as usize;
    if buf.len() != KEY_HEADER + key_len {
        return Err(invalid);
    }
    Ok(buf[KEY_HEADER..].to_vec())
}

fn decode_set(buf: &[u8]) -> Result<Command, ProtocolError> {
    let invalid = ProtocolError::InvalidSet;

    if buf.len() <= KEY_HEADER {
        return Err(invalid);
    }
    let key_len = buf[1] as usize;
    if key_len == 0 {
        return Err(invalid);
    }
    let key_end = KEY_HEADER + key_len;

    let value_len = read_u32(buf, key_end).ok_or(invalid)? as usize;
    let value_start = key_end + U32_LEN;
    let value_end = value_start.checked_add(value_len).ok_or(invalid)?;

    let ttl_ms = read_u32(buf, value_end).ok_or(invalid)?;
    if buf.len() != value_end + U32_LEN {
        return Err(invalid);
    }

    Ok(Command::Set {
        key: buf[KEY_HEADER..key_end].to_vec(),
        value: buf[value_start..value_end].to_vec(),
        ttl_ms,
    })
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at.checked_add(U32_LEN)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

// == Frame Length ==
/// Length of the first complete frame at the head of `buf`.
///
/// Returns `Ok(None)` while more bytes are needed, and an error when the
/// head of the buffer cannot start any valid command. Used on the follower
/// link, where pushes from the leader may coalesce or split across reads.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let Some(&tag) = buf.first() else {
        return Ok(None);
    };

    let invalid = match tag {
        TAG_SHOW => return Ok(Some(1)),
        TAG_SET => ProtocolError::InvalidSet,
        TAG_GET => ProtocolError::InvalidGet,
        TAG_HAS => ProtocolError::InvalidHas,
        TAG_DELETE => ProtocolError::InvalidDelete,
        _ => return Err(ProtocolError::InvalidCommand),
    };

    let Some(&key_len) = buf.get(1) else {
        return Ok(None);
    };
    if key_len == 0 {
        return Err(invalid);
    }
    let key_end = KEY_HEADER + key_len as usize;
    if tag != TAG_SET {
        return Ok(Some(key_end));
    }

    let Some(value_len) = read_u32(buf, key_end) else {
        return Ok(None);
    };
    Ok(Some(key_end + U32_LEN + value_len as usize + U32_LEN))
}
