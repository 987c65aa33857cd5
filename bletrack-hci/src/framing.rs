use tracing::trace;

use crate::decoder::LE_META_EVENT;

/// HCI packet indicator for events.
pub const HCI_EVENT_PKT: u8 = 0x04;

/// indicator · event code · parameter length
const HEADER_LEN: usize = 3;

/// Length-delimited framing over the raw HCI byte stream.
///
/// An event arrives as the packet indicator, the event code, a one-byte
/// parameter length, then that many body bytes. The socket hands us
/// arbitrary chunks, so nothing decodes until a whole frame is in; a
/// partial header or partial body just waits for the next read.
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> FrameBuffer {
        FrameBuffer::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the body of the next complete LE Meta event, or `None` until
    /// more bytes arrive. Complete frames that are not LE Meta events are
    /// skipped whole.
    pub fn next_event(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            let indicator = self.buf[0];
            let code = self.buf[1];
            let param_len = usize::from(self.buf[2]);
            if self.buf.len() < HEADER_LEN + param_len {
                return None;
            }
            let body: Vec<u8> = self
                .buf
                .drain(..HEADER_LEN + param_len)
                .skip(HEADER_LEN)
                .collect();
            if indicator == HCI_EVENT_PKT && code == LE_META_EVENT {
                return Some(body);
            }
            trace!(indicator, code, "skipped non-meta frame");
        }
    }
}

#[cfg(test)]
mod test {
    use super::{FrameBuffer, HCI_EVENT_PKT};
    use crate::decoder::LE_META_EVENT;

    fn meta_frame(body: &[u8]) -> Vec<u8> {
        let mut frame = vec![HCI_EVENT_PKT, LE_META_EVENT, body.len() as u8];
        frame.extend_from_slice(body);
        frame
    }

    #[test]
    fn whole_frame_pops_at_once() {
        let mut frames = FrameBuffer::new();
        frames.extend(&meta_frame(&[0x02, 0x00]));
        assert_eq!(frames.next_event(), Some(vec![0x02, 0x00]));
        assert_eq!(frames.next_event(), None);
    }

    #[test]
    fn partial_header_defers() {
        let mut frames = FrameBuffer::new();
        frames.extend(&[HCI_EVENT_PKT, LE_META_EVENT]);
        assert_eq!(frames.next_event(), None);
        frames.extend(&[2, 0x02, 0x00]);
        assert_eq!(frames.next_event(), Some(vec![0x02, 0x00]));
    }

    #[test]
    fn partial_body_defers() {
        let frame = meta_frame(&[0x02, 0x01, 0xAA, 0xBB]);
        let mut frames = FrameBuffer::new();
        frames.extend(&frame[..5]);
        assert_eq!(frames.next_event(), None);
        frames.extend(&frame[5..]);
        assert_eq!(frames.next_event(), Some(vec![0x02, 0x01, 0xAA, 0xBB]));
    }

    #[test]
    fn frames_split_anywhere_still_reassemble() {
        let mut stream = Vec::new();
        stream.extend(meta_frame(&[0x02, 0x01, 0x11]));
        stream.extend(meta_frame(&[0x02, 0x02, 0x22, 0x33]));
        // Feed one byte at a time.
        let mut frames = FrameBuffer::new();
        let mut bodies = Vec::new();
        for byte in stream {
            frames.extend(&[byte]);
            while let Some(body) = frames.next_event() {
                bodies.push(body);
            }
        }
        assert_eq!(
            bodies,
            vec![vec![0x02, 0x01, 0x11], vec![0x02, 0x02, 0x22, 0x33]]
        );
    }

    #[test]
    fn non_meta_frames_are_skipped() {
        let mut frames = FrameBuffer::new();
        // Command-complete event, then a meta event.
        frames.extend(&[HCI_EVENT_PKT, 0x0E, 3, 0x01, 0x02, 0x03]);
        frames.extend(&meta_frame(&[0x02, 0x00]));
        assert_eq!(frames.next_event(), Some(vec![0x02, 0x00]));
        assert_eq!(frames.next_event(), None);
    }
}
