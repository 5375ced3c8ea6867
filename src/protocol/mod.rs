//! Protocol Module
//!
//! Binary wire format shared by clients, servers and the follower link.
//!
//! Every multi-byte integer is little-endian. A connection opens with a
//! single role byte, then carries one encoded command per write. Responses
//! are raw bytes with no framing of their own.

mod codec;
mod command;


pub use codec::frame_len;
pub use command::Command;

// == Command Tags ==
pub const TAG_SET: u8 = 0;
pub const TAG_GET: u8 = 1;
pub const TAG_HAS: u8 = 2;
pub const TAG_DELETE: u8 = 3;
pub const TAG_SHOW: u8 = 4;

// == Role Handshake ==
/// Sent first by a routing client.
pub const ROLE_CLIENT: u8 = b'C';
/// Sent first by a follower dialing its leader.
pub const ROLE_FOLLOWER: u8 = b'F';

// == Responses ==
pub const RESPONSE_OK: &[u8] = b"OK";
pub const RESPONSE_DELETED: &[u8] = b"DELETED";
pub const RESPONSE_TRUE: &[u8] = b"true";
pub const RESPONSE_FALSE: &[u8] = b"false";
