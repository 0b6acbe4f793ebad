use crate::cipher::{MessageDecrypter, MessageEncrypter};
use log::trace;
use tls_core::msgs::message::{OpaqueMessage, PlainMessage};
use tls_core::Error;

/// Record layer that tracks decryption and encryption keys.
///
/// Each direction carries its own 64-bit sequence number; installing a
/// new epoch's key resets the corresponding sequence to zero.  The
/// sequence space must never wrap: transforms at the limit fail and the
/// session has to be torn down.
pub(crate) struct RecordLayer {
    message_encrypter: Option<MessageEncrypter>,
    message_decrypter: Option<MessageDecrypter>,
    write_seq: u64,
    read_seq: u64,
}

impl RecordLayer {
    pub(crate) fn new() -> Self {
        Self {
            message_encrypter: None,
            message_decrypter: None,
            write_seq: 0,
            read_seq: 0,
        }
    }

    pub(crate) fn is_encrypting(&self) -> bool {
        self.message_encrypter.is_some()
    }

    pub(crate) fn is_decrypting(&self) -> bool {
        self.message_decrypter.is_some()
    }

    /// Prepare to handle traffic protected with the new write key.  The
    /// previous epoch's context is dropped, wiping its key material.
    pub(crate) fn set_message_encrypter(&mut self, cipher: MessageEncrypter) {
        trace!("installing new write key, sequence reset");
        self.message_encrypter = Some(cipher);
        self.write_seq = 0;
    }

    /// Prepare to handle traffic protected with the new read key.
    pub(crate) fn set_message_decrypter(&mut self, cipher: MessageDecrypter) {
        trace!("installing new read key, sequence reset");
        self.message_decrypter = Some(cipher);
        self.read_seq = 0;
    }

    /// Return true if the write sequence space is exhausted.  The next
    /// encryption must be refused rather than reusing a nonce.
    pub(crate) fn encrypt_exhausted(&self) -> bool {
        self.write_seq == u64::MAX
    }

    /// Decrypt a TLS message.
    ///
    /// `encr` is a decoded message allegedly received from the peer.
    /// If it can be decrypted, its decryption is returned.  Otherwise,
    /// an error is returned.
    pub(crate) fn decrypt_incoming(&mut self, encr: OpaqueMessage) -> Result<PlainMessage, Error> {
        let decrypter = self
            .message_decrypter
            .as_ref()
            .ok_or(Error::DecryptError)?;

        if self.read_seq == u64::MAX {
            return Err(Error::DecryptError);
        }

        let plain = decrypter.decrypt(encr, self.read_seq)?;
        self.read_seq += 1;
        Ok(plain)
    }

    /// Encrypt a TLS message.
    ///
    /// `plain` is a TLS message we'd like to send.  This function
    /// panics if the requisite keying material hasn't been established
    /// yet.
    pub(crate) fn encrypt_outgoing(&mut self, plain: PlainMessage) -> Result<OpaqueMessage, Error> {
        debug_assert!(self.is_encrypting());

        if self.encrypt_exhausted() {
            return Err(Error::EncryptError);
        }

        let encrypter = self
            .message_encrypter
            .as_ref()
            .ok_or(Error::EncryptError)?;

        let seq = self.write_seq;
        let encr = encrypter.encrypt(plain, seq)?;
        self.write_seq += 1;
        Ok(encr)
    }

    #[cfg(test)]
    pub(crate) fn set_write_seq(&mut self, seq: u64) {
        self.write_seq = seq;
    }

    #[cfg(test)]
    pub(crate) fn write_seq(&self) -> u64 {
        self.write_seq
    }
}
