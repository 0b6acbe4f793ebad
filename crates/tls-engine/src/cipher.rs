use crate::backend::{AeadCipher, CryptoBackend};
use crate::key_schedule::hkdf_expand_label;
use tls_core::msgs::base::Payload;
use tls_core::msgs::codec::put_u64;
use tls_core::msgs::enums::{ContentType, ProtocolVersion};
use tls_core::msgs::fragmenter::MAX_FRAGMENT_LEN;
use tls_core::msgs::message::{OpaqueMessage, PlainMessage};
use tls_core::suites::Tls13CipherSuite;
use tls_core::Error;
use zeroize::Zeroize;

/// A write or read IV.
pub(crate) struct Iv(pub(crate) [u8; 12]);

impl Drop for Iv {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Per-record nonce: the static IV XORed with the big-endian sequence
/// number, right-aligned.
pub(crate) fn make_nonce(iv: &Iv, seq: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    put_u64(seq, &mut nonce[4..]);

    nonce.iter_mut().zip(iv.0.iter()).for_each(|(nonce, iv)| {
        *nonce ^= *iv;
    });

    nonce
}

/// The write half of an epoch's record protection.
pub struct MessageEncrypter {
    cipher: Box<dyn AeadCipher>,
    iv: Iv,
}

/// The read half of an epoch's record protection.
pub struct MessageDecrypter {
    cipher: Box<dyn AeadCipher>,
    iv: Iv,
}

/// The AAD is the TLSCiphertext record header (RFC 8446 section 5.2).
fn make_tls13_aad(len: usize) -> [u8; 5] {
    [
        ContentType::ApplicationData.get_u8(),
        0x3,
        0x3,
        (len >> 8) as u8,
        len as u8,
    ]
}

impl MessageEncrypter {
    /// Protect one record.  The inner content type is appended to the
    /// plaintext before sealing; the outer type is always
    /// `application_data`.
    pub fn encrypt(&self, msg: PlainMessage, seq: u64) -> Result<OpaqueMessage, Error> {
        let total_len = msg.payload.0.len() + 1 + self.cipher_overhead();
        let nonce = make_nonce(&self.iv, seq);
        let aad = make_tls13_aad(total_len);

        let mut inner = Vec::with_capacity(msg.payload.0.len() + 1);
        inner.extend_from_slice(&msg.payload.0);
        inner.push(msg.typ.get_u8());

        let ciphertext = self.cipher.seal(&nonce, &aad, &inner)?;
        inner.zeroize();

        Ok(OpaqueMessage {
            typ: ContentType::ApplicationData,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload::new(ciphertext),
        })
    }

    fn cipher_overhead(&self) -> usize {
        // Every supported AEAD appends a 16-byte tag.
        16
    }
}

impl MessageDecrypter {
    /// Unprotect one record, recovering the inner content type from
    /// behind any zero padding.
    pub fn decrypt(&self, msg: OpaqueMessage, seq: u64) -> Result<PlainMessage, Error> {
        let nonce = make_nonce(&self.iv, seq);
        let aad = make_tls13_aad(msg.payload.0.len());

        let mut plaintext = self.cipher.open(&nonce, &aad, &msg.payload.0)?;

        if plaintext.len() > MAX_FRAGMENT_LEN + 1 {
            return Err(Error::PeerSentOversizedRecord);
        }

        let typ = loop {
            match plaintext.pop() {
                Some(0) => {}
                Some(byte) => break ContentType::from(byte),
                // A record consisting only of padding is forbidden.
                None => return Err(Error::PeerSentBadInnerPlaintext),
            }
        };

        Ok(PlainMessage {
            typ,
            version: msg.version,
            payload: Payload::new(plaintext),
        })
    }
}

/// Derive the `key` and `iv` for one direction of an epoch from its
/// traffic secret, and construct the corresponding AEAD halves.
fn derive_key_iv(
    backend: &dyn CryptoBackend,
    suite: &'static Tls13CipherSuite,
    secret: &[u8],
) -> Result<(Box<dyn AeadCipher>, Iv), Error> {
    let hash = suite.hash_algorithm;
    let aead = suite.common.aead_algorithm;

    let mut key = zeroize::Zeroizing::new(vec![0u8; aead.key_len()]);
    hkdf_expand_label(backend, hash, secret, b"key", &[], &mut key)?;

    let mut iv = Iv([0u8; 12]);
    hkdf_expand_label(backend, hash, secret, b"iv", &[], &mut iv.0)?;

    let cipher = backend.aead(aead, &key)?;
    Ok((cipher, iv))
}

/// Build the write half of an epoch from its traffic secret.
pub fn new_message_encrypter(
    backend: &dyn CryptoBackend,
    suite: &'static Tls13CipherSuite,
    secret: &[u8],
) -> Result<MessageEncrypter, Error> {
    let (cipher, iv) = derive_key_iv(backend, suite, secret)?;
    Ok(MessageEncrypter { cipher, iv })
}

/// Build the read half of an epoch from its traffic secret.
pub fn new_message_decrypter(
    backend: &dyn CryptoBackend,
    suite: &'static Tls13CipherSuite,
    secret: &[u8],
) -> Result<MessageDecrypter, Error> {
    let (cipher, iv) = derive_key_iv(backend, suite, secret)?;
    Ok(MessageDecrypter { cipher, iv })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RustCryptoBackend;
    use tls_core::msgs::enums::AlertDescription;
    use tls_core::suites::TLS13_AES_128_GCM_SHA256;

    fn pair() -> (MessageEncrypter, MessageDecrypter) {
        let secret = [0x42u8; 32];
        let enc =
            new_message_encrypter(&RustCryptoBackend, &TLS13_AES_128_GCM_SHA256, &secret).unwrap();
        let dec =
            new_message_decrypter(&RustCryptoBackend, &TLS13_AES_128_GCM_SHA256, &secret).unwrap();
        (enc, dec)
    }

    fn appdata(body: &[u8]) -> PlainMessage {
        PlainMessage {
            typ: ContentType::ApplicationData,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload::new(body.to_vec()),
        }
    }

    #[test]
    fn nonce_is_iv_xor_sequence() {
        let iv = Iv([0x55; 12]);
        assert_eq!(make_nonce(&iv, 0), [0x55; 12]);

        let n1 = make_nonce(&iv, 1);
        assert_eq!(&n1[..11], &[0x55; 11]);
        assert_eq!(n1[11], 0x54);

        let big = make_nonce(&iv, 0x0102_0304_0506_0708);
        assert_eq!(&big[..4], &[0x55; 4]);
        assert_eq!(
            &big[4..],
            &[0x54, 0x57, 0x56, 0x51, 0x50, 0x53, 0x52, 0x5d]
        );
    }

    #[test]
    fn round_trip_with_matching_sequence() {
        let (enc, dec) = pair();
        let sealed = enc.encrypt(appdata(b"ping"), 7).unwrap();
        assert_eq!(sealed.typ, ContentType::ApplicationData);
        assert_eq!(sealed.version, ProtocolVersion::TLSv1_2);
        // body + inner type + tag
        assert_eq!(sealed.payload.0.len(), 4 + 1 + 16);

        let opened = dec.decrypt(sealed, 7).unwrap();
        assert_eq!(opened.typ, ContentType::ApplicationData);
        assert_eq!(opened.payload.0, b"ping");
    }

    #[test]
    fn wrong_sequence_fails() {
        let (enc, dec) = pair();
        let sealed = enc.encrypt(appdata(b"ping"), 7).unwrap();
        assert_eq!(dec.decrypt(sealed, 8).unwrap_err(), Error::DecryptError);
    }

    #[test]
    fn inner_type_recovered_through_padding() {
        let (enc, dec) = pair();
        // Handshake message inside the protected record.
        let msg = PlainMessage {
            typ: ContentType::Handshake,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload::new(vec![1, 2, 3]),
        };
        let sealed = enc.encrypt(msg, 0).unwrap();
        let opened = dec.decrypt(sealed, 0).unwrap();
        assert_eq!(opened.typ, ContentType::Handshake);
        assert_eq!(opened.payload.0, vec![1, 2, 3]);
    }

    #[test]
    fn all_padding_record_rejected() {
        let (_, dec) = pair();

        // Build a record whose inner plaintext is all zero padding by
        // sealing it directly with the raw cipher halves.
        let backend = RustCryptoBackend;
        let mut key = vec![0u8; 16];
        hkdf_expand_label(
            &backend,
            tls_core::suites::HashAlgorithm::SHA256,
            &[0x42u8; 32],
            b"key",
            &[],
            &mut key,
        )
        .unwrap();
        let mut iv = [0u8; 12];
        hkdf_expand_label(
            &backend,
            tls_core::suites::HashAlgorithm::SHA256,
            &[0x42u8; 32],
            b"iv",
            &[],
            &mut iv,
        )
        .unwrap();
        let cipher = backend
            .aead(tls_core::suites::AeadAlgorithm::Aes128Gcm, &key)
            .unwrap();

        let inner = [0u8; 4];
        let nonce = make_nonce(&Iv(iv), 0);
        let aad = make_tls13_aad(inner.len() + 16);
        let ct = cipher.seal(&nonce, &aad, &inner).unwrap();

        let msg = OpaqueMessage {
            typ: ContentType::ApplicationData,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload::new(ct),
        };
        let err = dec.decrypt(msg, 0).unwrap_err();
        assert_eq!(err, Error::PeerSentBadInnerPlaintext);
        // This case alerts unexpected_message, not illegal_parameter.
        assert_eq!(
            err.alert_description(),
            Some(AlertDescription::UnexpectedMessage)
        );
    }
}
