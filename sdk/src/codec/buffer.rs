//! Streaming frame accumulator.

use super::frame::{Decoded, Frame, FrameCodec, FrameError, FRAME_MARKER};

/// Accumulates transport chunks and yields complete frames.
///
/// After a `FrameError` the buffer drops bytes up to the next frame marker so
/// decoding can resume on the following frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    codec: FrameCodec,
    buf: Vec<u8>,
    discarded: u64,
}

impl FrameBuffer {
    /// Creates an empty buffer using the given codec.
    #[must_use]
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            buf: Vec::new(),
            discarded: 0,
        }
    }

    /// Appends a transport chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total bytes thrown away while resynchronizing.
    #[must_use]
    pub const fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Returns the next complete frame, or None if more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns the `FrameError` for a corrupt frame. The corrupt bytes have
    /// already been skipped when this returns, so the caller can keep calling.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let decoded = self
            .codec
            .decode(&self.buf)
            .map(|decoded| match decoded {
                Decoded::Frame { frame, remainder } => Some((frame, remainder.len())),
                Decoded::NeedMore => None,
            });

        match decoded {
            Ok(Some((frame, remaining))) => {
                let consumed = self.buf.len() - remaining;
                self.buf.drain(..consumed);
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                self.resync();
                Err(err)
            }
        }
    }

    /// Skips to the next marker after the current position.
    fn resync(&mut self) {
        let marker = FRAME_MARKER.as_bytes();
        let next = self
            .buf
            .windows(marker.len())
            .skip(1)
            .position(|window| window == marker)
            .map(|position| position + 1);

        let cut = match next {
            Some(position) => position,
            None => {
                // keep a trailing partial marker, it may complete with the next chunk
                let keep = (1..marker.len())
                    .rev()
                    .find(|&n| n <= self.buf.len() && self.buf.ends_with(&marker[..n]))
                    .unwrap_or(0);
                self.buf.len() - keep
            }
        };

        self.discarded += cut as u64;
        self.buf.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_yields_frames_in_order() {
        let mut buffer = FrameBuffer::default();
        buffer.extend(FrameCodec::encode_batch(["one", "two", "three"]).as_bytes());

        assert_eq!(buffer.next_frame().expect("frame"), Some(Frame::new("one")));
        assert_eq!(buffer.next_frame().expect("frame"), Some(Frame::new("two")));
        assert_eq!(buffer.next_frame().expect("frame"), Some(Frame::new("three")));
        assert_eq!(buffer.next_frame().expect("frame"), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_split_at_every_boundary() {
        let encoded = FrameCodec::encode(r#"{"m":"du","p":["cs_x",{}]}"#);
        let bytes = encoded.as_bytes();

        for split in 0..=bytes.len() {
            let mut buffer = FrameBuffer::default();
            let (head, tail) = bytes.split_at(split);

            buffer.extend(head);
            let first = buffer.next_frame().expect("no error");
            if split < bytes.len() {
                assert!(first.is_none(), "split {split} produced a frame early");
                buffer.extend(tail);
                let second = buffer.next_frame().expect("no error");
                assert_eq!(second.map(|f| f.payload), Some(r#"{"m":"du","p":["cs_x",{}]}"#.to_string()));
            } else {
                assert!(first.is_some());
            }
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn test_buffer_complete_frame_followed_by_partial() {
        let mut buffer = FrameBuffer::default();
        let second = FrameCodec::encode("second");
        let (head, tail) = second.split_at(5);

        buffer.extend(FrameCodec::encode("first").as_bytes());
        buffer.extend(head.as_bytes());
        assert_eq!(buffer.next_frame().expect("frame"), Some(Frame::new("first")));
        assert_eq!(buffer.next_frame().expect("frame"), None);

        buffer.extend(tail.as_bytes());
        assert_eq!(buffer.next_frame().expect("frame"), Some(Frame::new("second")));
    }

    #[test]
    fn test_buffer_resyncs_after_garbage() {
        let mut buffer = FrameBuffer::default();
        buffer.extend(b"garbage");
        buffer.extend(FrameCodec::encode("ok").as_bytes());

        assert_eq!(buffer.next_frame(), Err(FrameError::MissingMarker));
        assert_eq!(buffer.discarded(), 7);
        assert_eq!(buffer.next_frame().expect("frame"), Some(Frame::new("ok")));
    }

    #[test]
    fn test_buffer_resyncs_after_bad_length() {
        let mut buffer = FrameBuffer::default();
        buffer.extend(b"~m~x1~m~a");
        buffer.extend(FrameCodec::encode("next").as_bytes());

        assert_eq!(buffer.next_frame(), Err(FrameError::NonNumericLength));
        // the marker after the bad length prefix is not a frame start either
        assert!(buffer.next_frame().is_err());
        assert_eq!(buffer.next_frame().expect("frame"), Some(Frame::new("next")));
    }

    #[test]
    fn test_buffer_keeps_partial_marker_on_resync() {
        let mut buffer = FrameBuffer::default();
        buffer.extend(b"junk~m");

        assert!(buffer.next_frame().is_err());
        assert_eq!(buffer.len(), 2);

        buffer.extend(b"~1~m~z");
        assert_eq!(buffer.next_frame().expect("frame"), Some(Frame::new("z")));
    }

    #[test]
    fn test_buffer_rejects_oversized_frame() {
        let mut buffer = FrameBuffer::new(FrameCodec::new(4));
        buffer.extend(b"~m~100~m~");
        assert!(matches!(
            buffer.next_frame(),
            Err(FrameError::TooLarge { len: 100, max: 4 })
        ));
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
