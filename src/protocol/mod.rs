//! Wire protocol shared by the tick stream and the order relay
//!
//! Both streams are UTF-8 text frames terminated by `*`. [`FrameCodec`]
//! handles the byte-level framing; [`WireMessage`] turns a single frame
//! payload into a typed record and back.

pub mod frame;
pub mod messages;

pub use frame::{FrameCodec, DEFAULT_MAX_FRAME_LENGTH, FRAME_DELIMITER};
pub use messages::{WireMessage, PRICE_DECIMALS};
