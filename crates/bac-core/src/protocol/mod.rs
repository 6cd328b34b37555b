//! Protocol module containing message types, the JSON codec, and the framer.

pub mod codec;
pub mod framing;
pub mod messages;

pub use codec::{
    decode_announcement, decode_command, decode_reply, encode_announcement, encode_command,
    encode_reply, ProtocolError,
};
pub use framing::{FrameError, JsonFramer};
pub use messages::*;
