//! Wire Protocol
//!
//! RESP frame types and the streaming codec.

mod codec;
mod frame;

pub use codec::{RespCodec, RespError};
pub use frame::{Frame, WRONGTYPE};
