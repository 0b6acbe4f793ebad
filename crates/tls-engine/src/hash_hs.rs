use crate::backend::{CryptoBackend, HashContext};
use tls_core::msgs::codec::Codec;
use tls_core::msgs::message::{Message, MessagePayload};
use tls_core::suites::HashAlgorithm;

/// Early stage buffering of handshake payloads.
///
/// Before the cipher suite is negotiated we cannot start the transcript
/// hash, so the raw wire bytes of each handshake message are buffered.
/// For a client this is where the serialized ClientHello waits until
/// ServerHello fixes the hash algorithm.
pub(crate) struct HandshakeHashBuffer {
    buffer: Vec<u8>,
}

impl HandshakeHashBuffer {
    pub(crate) fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Hash/buffer a handshake message.
    pub(crate) fn add_message(&mut self, m: &Message) {
        if let MessagePayload::Handshake(hs) = &m.payload {
            self.buffer.extend_from_slice(&hs.get_encoding());
        }
    }

    /// We now know what hash function the transcript will use.
    pub(crate) fn start_hash(
        self,
        backend: &dyn CryptoBackend,
        alg: HashAlgorithm,
    ) -> HandshakeHash {
        let mut ctx = backend.hash(alg);
        ctx.update(&self.buffer);
        HandshakeHash { ctx }
    }

    #[cfg(test)]
    fn update_raw(&mut self, buf: &[u8]) {
        self.buffer.extend_from_slice(buf);
    }
}

/// This deals with keeping a running hash of the handshake payloads.
/// This is computed by buffering initially.  Once we know what hash
/// function we need to use we switch to incremental hashing.
pub(crate) struct HandshakeHash {
    ctx: Box<dyn HashContext>,
}

impl HandshakeHash {
    /// Hash/buffer a handshake message.
    pub(crate) fn add_message(&mut self, m: &Message) -> &mut Self {
        if let MessagePayload::Handshake(hs) = &m.payload {
            let buf = hs.get_encoding();
            self.update_raw(&buf);
        }
        self
    }

    /// Hash or buffer a byte slice.
    fn update_raw(&mut self, buf: &[u8]) -> &mut Self {
        self.ctx.update(buf);
        self
    }

    /// Get the current hash value, leaving the running state intact.
    pub(crate) fn get_current_hash(&self) -> Vec<u8> {
        self.ctx.fork().finish()
    }

    /// The digest algorithm.
    pub(crate) fn algorithm(&self) -> HashAlgorithm {
        self.ctx.algorithm()
    }
}
