//! Frame encoding and decoding.

use std::fmt;

/// Marker surrounding the length prefix.
pub const FRAME_MARKER: &str = "~m~";

/// Default upper bound for a single payload (4 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// More digits than this cannot be a sane length.
const MAX_LENGTH_DIGITS: usize = 10;

/// Framing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Buffer does not start with the frame marker.
    #[error("missing frame marker")]
    MissingMarker,

    /// Length prefix contains something other than decimal digits.
    #[error("non-numeric length prefix")]
    NonNumericLength,

    /// Length prefix has too many digits.
    #[error("length prefix overflow")]
    LengthOverflow,

    /// Declared length exceeds the configured maximum.
    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge {
        /// Declared length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Payload is not valid UTF-8.
    #[error("payload is not valid utf-8")]
    InvalidUtf8,
}

/// A single decoded wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload (JSON object or heartbeat).
    pub payload: String,
}

impl Frame {
    /// Creates a frame around a payload.
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Returns the declared length of this frame on the wire.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", FrameCodec::encode(&self.payload))
    }
}

/// Result of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// One complete frame and the bytes that follow it.
    Frame {
        /// Decoded frame.
        frame: Frame,
        /// Unconsumed bytes.
        remainder: &'a [u8],
    },

    /// The buffer holds an incomplete frame; retry once more bytes arrive.
    NeedMore,
}

/// Frame encoder/decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameCodec {
    /// Creates a codec that rejects payloads longer than `max_frame_len`.
    #[must_use]
    pub const fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    /// Returns the configured maximum payload length.
    #[must_use]
    pub const fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Wraps a payload in a frame.
    #[must_use]
    pub fn encode(payload: &str) -> String {
        format!(
            "{marker}{len}{marker}{payload}",
            marker = FRAME_MARKER,
            len = payload.len()
        )
    }

    /// Wraps several payloads into back-to-back frames.
    #[must_use]
    pub fn encode_batch<I, S>(payloads: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        payloads
            .into_iter()
            .map(|payload| Self::encode(payload.as_ref()))
            .collect()
    }

    /// Attempts to extract one frame from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the bytes cannot be the start of a valid
    /// frame. An incomplete but so-far valid frame is `Decoded::NeedMore`.
    pub fn decode<'a>(&self, buf: &'a [u8]) -> Result<Decoded<'a>, FrameError> {
        let marker = FRAME_MARKER.as_bytes();

        let Some(rest) = buf.strip_prefix(marker) else {
            return if buf.len() < marker.len() && marker.starts_with(buf) {
                Ok(Decoded::NeedMore)
            } else {
                Err(FrameError::MissingMarker)
            };
        };

        let digits_end = match rest.iter().position(|b| !b.is_ascii_digit()) {
            Some(position) => position,
            None if rest.len() > MAX_LENGTH_DIGITS => return Err(FrameError::LengthOverflow),
            None => return Ok(Decoded::NeedMore),
        };

        if digits_end == 0 {
            return Err(FrameError::NonNumericLength);
        }
        if digits_end > MAX_LENGTH_DIGITS {
            return Err(FrameError::LengthOverflow);
        }

        let (digits, after_digits) = rest.split_at(digits_end);
        let Some(body) = after_digits.strip_prefix(marker) else {
            return if after_digits.len() < marker.len() && marker.starts_with(after_digits) {
                Ok(Decoded::NeedMore)
            } else {
                Err(FrameError::NonNumericLength)
            };
        };

        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or(FrameError::LengthOverflow)?;

        if len > self.max_frame_len {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        if body.len() < len {
            return Ok(Decoded::NeedMore);
        }

        let (payload, remainder) = body.split_at(len);
        let payload = std::str::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)?;

        Ok(Decoded::Frame {
            frame: Frame::new(payload),
            remainder,
        })
    }
}
