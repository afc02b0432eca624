//! Wire framing for the TradingView socket protocol.
//!
//! Every message on the socket is wrapped as `~m~{N}~m~{payload}` where `N`
//! is the decimal byte length of the payload. Several frames may arrive in a
//! single transport message, and a frame may be split across messages.
//!
//! - [`FrameCodec`] — pure encode/decode of one frame
//! - [`FrameBuffer`] — streaming accumulator used by the receive loop

pub mod buffer;
pub mod frame;

pub use buffer::FrameBuffer;
pub use frame::{Decoded, Frame, FrameCodec, FrameError, DEFAULT_MAX_FRAME_LEN, FRAME_MARKER};
