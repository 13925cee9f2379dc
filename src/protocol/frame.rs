use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

/// Reserved byte terminating every frame on the wire
pub const FRAME_DELIMITER: u8 = b'*';

/// Default upper bound for a single frame (delimiter excluded)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Delimiter-terminated frame codec
///
/// Each frame is the run of bytes between two delimiters. The decoder keeps
/// a partial trailing frame in the buffer until its delimiter arrives and
/// remembers how far it has already scanned, so a frame split across many
/// reads is only searched once.
///
/// Empty frames (`**`) are skipped. Bytes left over when the stream ends
/// without a final delimiter are dropped: a frame is only complete once its
/// delimiter has been seen.
///
/// # Example
/// ```ignore
/// let stream = TcpStream::connect(addr).await?;
/// let mut frames = FramedRead::new(stream, FrameCodec::new());
/// while let Some(frame) = frames.next().await {
///     let tick = Tick::from_payload(&frame?)?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    delimiter: u8,
    max_frame_length: usize,
    /// Offset into the read buffer already searched for a delimiter
    next_index: usize,
}

impl FrameCodec {
    /// Create a codec using the `*` delimiter and the default frame limit
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Create a codec with a custom frame length limit
    pub fn with_max_length(max_frame_length: usize) -> Self {
        Self {
            delimiter: FRAME_DELIMITER,
            max_frame_length,
            next_index: 0,
        }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        loop {
            let found = buf[self.next_index..]
                .iter()
                .position(|b| *b == self.delimiter);

            match found {
                Some(offset) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;

                    let mut frame = buf.split_to(end + 1);
                    frame.truncate(end);

                    if frame.is_empty() {
                        continue;
                    }
                    if frame.len() > self.max_frame_length {
                        return Err(FrameError::FrameTooLong {
                            limit: self.max_frame_length,
                        });
                    }
                    return Ok(Some(frame.freeze()));
                }
                None => {
                    if buf.len() > self.max_frame_length {
                        return Err(FrameError::FrameTooLong {
                            limit: self.max_frame_length,
                        });
                    }
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    tracing::debug!(
                        "Discarding {} bytes of incomplete frame at end of stream",
                        buf.len()
                    );
                    buf.clear();
                }
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        <Self as Encoder<&[u8]>>::encode(self, payload.as_ref(), dst)
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        if payload.contains(&self.delimiter) {
            return Err(FrameError::DelimiterInPayload {
                delimiter: self.delimiter as char,
            });
        }
        if payload.len() > self.max_frame_length {
            return Err(FrameError::FrameTooLong {
                limit: self.max_frame_length,
            });
        }

        dst.reserve(payload.len() + 1);
        dst.put_slice(payload);
        dst.put_u8(self.delimiter);
        Ok(())
    }
}
