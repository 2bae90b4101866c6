//! Reliable-stream framing codec.
//!
//! Datagrams need no framing (one message per datagram), but the reliable
//! stream is a plain byte pipe, so each message is wrapped as
//! `[u16 length, little-endian][payload]`. The decoder tolerates arbitrary
//! fragmentation and coalescing by the underlying stream, down to one byte
//! per chunk, by retaining undecoded leftovers across reads.

use crate::core::{FRAME_PREFIX_SIZE, FrameError, MAX_RELIABLE_PAYLOAD};

/// Encode one framed message into a fresh vector.
///
/// Payloads larger than [`MAX_RELIABLE_PAYLOAD`] are rejected rather than
/// silently truncating the length field.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_RELIABLE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
        });
    }

    let mut frame = Vec::with_capacity(FRAME_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encode one framed message into `dst`, returning the framed length.
///
/// Used on the hot path to frame directly into a pooled buffer.
pub fn encode_frame_into(payload: &[u8], dst: &mut [u8]) -> Result<usize, FrameError> {
    if payload.len() > MAX_RELIABLE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
        });
    }
    let framed = FRAME_PREFIX_SIZE + payload.len();
    if framed > dst.len() {
        return Err(FrameError::BufferTooSmall { size: framed });
    }

    dst[..FRAME_PREFIX_SIZE].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    dst[FRAME_PREFIX_SIZE..framed].copy_from_slice(payload);
    Ok(framed)
}

/// Incremental decoder for the framed reliable stream.
///
/// Bytes accumulate in a reassembly buffer; [`StreamDecoder::next_message`]
/// pops complete messages in order. Leftover bytes (an incomplete prefix or
/// payload) survive verbatim until the next chunk arrives; they are only
/// discarded when the owning connection tears down and drops the decoder.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    cursor: usize,
}

impl StreamDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete message, if one is fully buffered.
    pub fn next_message(&mut self) -> Option<Vec<u8>> {
        let available = self.buf.len() - self.cursor;
        if available < FRAME_PREFIX_SIZE {
            self.compact();
            return None;
        }

        let prefix = [self.buf[self.cursor], self.buf[self.cursor + 1]];
        let length = u16::from_le_bytes(prefix) as usize;
        if available < FRAME_PREFIX_SIZE + length {
            self.compact();
            return None;
        }

        let start = self.cursor + FRAME_PREFIX_SIZE;
        let message = self.buf[start..start + length].to_vec();
        self.cursor = start + length;
        if self.cursor == self.buf.len() {
            self.buf.clear();
            self.cursor = 0;
        }
        Some(message)
    }

    /// Number of undecoded bytes currently buffered.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Drop already-consumed bytes so the buffer does not grow without bound.
    fn compact(&mut self) {
        if self.cursor > 0 {
            self.buf.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut StreamDecoder) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(msg) = decoder.next_message() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn frame_layout() {
        let frame = encode_frame(b"abc").unwrap();
        assert_eq!(frame, vec![3, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn empty_payload_frames() {
        let frame = encode_frame(b"").unwrap();
        assert_eq!(frame, vec![0, 0]);

        let mut decoder = StreamDecoder::new();
        decoder.push(&frame);
        assert_eq!(decoder.next_message().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_oversized_payload() {
        let payload = vec![0u8; MAX_RELIABLE_PAYLOAD + 1];
        assert_eq!(
            encode_frame(&payload),
            Err(FrameError::PayloadTooLarge {
                size: MAX_RELIABLE_PAYLOAD + 1
            })
        );
    }

    #[test]
    fn max_payload_roundtrips() {
        let payload = vec![0xab; MAX_RELIABLE_PAYLOAD];
        let frame = encode_frame(&payload).unwrap();

        let mut decoder = StreamDecoder::new();
        decoder.push(&frame);
        assert_eq!(decoder.next_message().unwrap(), payload);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn encode_into_pooled_slice() {
        let mut dst = [0u8; 16];
        let n = encode_frame_into(b"hi", &mut dst).unwrap();
        assert_eq!(&dst[..n], &[2, 0, b'h', b'i']);

        let mut tiny = [0u8; 3];
        assert_eq!(
            encode_frame_into(b"hi", &mut tiny),
            Err(FrameError::BufferTooSmall { size: 4 })
        );
    }

    #[test]
    fn coalesced_chunk_yields_all_messages() {
        let mut stream = Vec::new();
        for msg in [b"A".as_slice(), b"BB", b"CCC"] {
            stream.extend_from_slice(&encode_frame(msg).unwrap());
        }

        let mut decoder = StreamDecoder::new();
        decoder.push(&stream);
        assert_eq!(
            decode_all(&mut decoder),
            vec![b"A".to_vec(), b"BB".to_vec(), b"CCC".to_vec()]
        );
    }

    #[test]
    fn one_byte_at_a_time_delivery() {
        let mut stream = Vec::new();
        for msg in [b"A".as_slice(), b"BB", b"CCC"] {
            stream.extend_from_slice(&encode_frame(msg).unwrap());
        }

        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        for byte in stream {
            decoder.push(&[byte]);
            out.extend(decode_all(&mut decoder));
        }
        assert_eq!(out, vec![b"A".to_vec(), b"BB".to_vec(), b"CCC".to_vec()]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn arbitrary_split_points() {
        let payloads: Vec<Vec<u8>> = (0..7u8).map(|i| vec![i; i as usize * 37]).collect();
        let mut stream = Vec::new();
        for p in &payloads {
            stream.extend_from_slice(&encode_frame(p).unwrap());
        }

        // Split the byte stream at every possible single point.
        for split in 0..=stream.len() {
            let mut decoder = StreamDecoder::new();
            decoder.push(&stream[..split]);
            let mut out = decode_all(&mut decoder);
            decoder.push(&stream[split..]);
            out.extend(decode_all(&mut decoder));
            assert_eq!(out, payloads, "split at {split}");
        }
    }

    #[test]
    fn incomplete_prefix_is_retained() {
        let mut decoder = StreamDecoder::new();
        decoder.push(&[5]);
        assert!(decoder.next_message().is_none());
        assert_eq!(decoder.pending(), 1);

        decoder.push(&[0]);
        assert!(decoder.next_message().is_none());
        assert_eq!(decoder.pending(), 2);

        decoder.push(b"hello");
        assert_eq!(decoder.next_message().unwrap(), b"hello".to_vec());
        assert_eq!(decoder.pending(), 0);
    }
}
