use crate::msgs::base::Payload;
use crate::msgs::message::PlainMessage;
use std::collections::VecDeque;

/// TLS record plaintext is limited to 2^14 bytes (RFC 8446 section 5.1).
pub const MAX_FRAGMENT_LEN: usize = 16384;

/// Breaks down plaintext messages into a sequence of fragments
/// no larger than the record-layer maximum.
pub struct MessageFragmenter;

impl MessageFragmenter {
    pub fn new() -> Self {
        Self
    }

    /// Take the Message `msg` and re-fragment it into new
    /// messages whose fragment is no more than MAX_FRAGMENT_LEN.
    /// The new messages are appended to the `out` deque.
    /// Payloads are copied.
    pub fn fragment(&self, msg: PlainMessage, out: &mut VecDeque<PlainMessage>) {
        // Non-fragment path
        if msg.payload.0.len() <= MAX_FRAGMENT_LEN {
            out.push_back(msg);
            return;
        }

        for chunk in msg.payload.0.chunks(MAX_FRAGMENT_LEN) {
            out.push_back(PlainMessage {
                typ: msg.typ,
                version: msg.version,
                payload: Payload(chunk.to_vec()),
            });
        }
    }
}

impl Default for MessageFragmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::enums::{ContentType, ProtocolVersion};

    fn appdata(len: usize) -> PlainMessage {
        PlainMessage {
            typ: ContentType::ApplicationData,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload(vec![0x61; len]),
        }
    }

    #[test]
    fn exact_boundary_is_one_fragment() {
        let mut out = VecDeque::new();
        MessageFragmenter::new().fragment(appdata(MAX_FRAGMENT_LEN), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload.0.len(), MAX_FRAGMENT_LEN);
    }

    #[test]
    fn one_over_boundary_is_two_fragments() {
        let mut out = VecDeque::new();
        MessageFragmenter::new().fragment(appdata(MAX_FRAGMENT_LEN + 1), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload.0.len(), MAX_FRAGMENT_LEN);
        assert_eq!(out[1].payload.0.len(), 1);
    }

    #[test]
    fn fragments_preserve_content() {
        let mut msg = appdata(MAX_FRAGMENT_LEN * 2 + 10);
        for (i, b) in msg.payload.0.iter_mut().enumerate() {
            *b = i as u8;
        }
        let original = msg.payload.0.clone();

        let mut out = VecDeque::new();
        MessageFragmenter::new().fragment(msg, &mut out);
        assert_eq!(out.len(), 3);

        let mut joined = Vec::new();
        for frag in out {
            joined.extend_from_slice(&frag.payload.0);
        }
        assert_eq!(joined, original);
    }
}
