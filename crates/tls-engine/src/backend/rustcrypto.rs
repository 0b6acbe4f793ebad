use super::{
    ActiveKeyExchange, AeadCipher, CryptoBackend, HashContext, MacContext, SharedSecret,
};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Aes256Gcm, Nonce,
};
use chacha20poly1305::ChaCha20Poly1305;
use hmac::{Hmac, Mac};
use p256::EncodedPoint;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256, Sha384};
use tls_core::msgs::enums::NamedGroup;
use tls_core::suites::{AeadAlgorithm, HashAlgorithm};
use tls_core::Error;

/// Implementation of the crypto capability table using RustCrypto
/// primitives.
pub struct RustCryptoBackend;

static KX_GROUPS: [NamedGroup; 2] = [NamedGroup::X25519, NamedGroup::secp256r1];

impl CryptoBackend for RustCryptoBackend {
    fn fill_random(&self, buf: &mut [u8]) -> Result<(), Error> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|_| Error::FailedToGetRandomBytes)
    }

    fn hash(&self, alg: HashAlgorithm) -> Box<dyn HashContext> {
        match alg {
            HashAlgorithm::SHA256 => Box::new(Hasher::Sha256(Sha256::default())),
            HashAlgorithm::SHA384 => Box::new(Hasher::Sha384(Sha384::default())),
        }
    }

    fn hmac(&self, alg: HashAlgorithm, key: &[u8]) -> Box<dyn MacContext> {
        match alg {
            HashAlgorithm::SHA256 => Box::new(HmacCtx::Sha256(
                <Hmac<Sha256> as Mac>::new_from_slice(key)
                    .expect("hmac accepts any key length"),
            )),
            HashAlgorithm::SHA384 => Box::new(HmacCtx::Sha384(
                <Hmac<Sha384> as Mac>::new_from_slice(key)
                    .expect("hmac accepts any key length"),
            )),
        }
    }

    fn hkdf_extract(&self, alg: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
        match alg {
            HashAlgorithm::SHA256 => {
                let (prk, _) = hkdf::Hkdf::<Sha256>::extract(Some(salt), ikm);
                prk.to_vec()
            }
            HashAlgorithm::SHA384 => {
                let (prk, _) = hkdf::Hkdf::<Sha384>::extract(Some(salt), ikm);
                prk.to_vec()
            }
        }
    }

    fn hkdf_expand(
        &self,
        alg: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        out: &mut [u8],
    ) -> Result<(), Error> {
        let res = match alg {
            HashAlgorithm::SHA256 => hkdf::Hkdf::<Sha256>::from_prk(prk)
                .map_err(drop)
                .and_then(|hk| hk.expand(info, out).map_err(drop)),
            HashAlgorithm::SHA384 => hkdf::Hkdf::<Sha384>::from_prk(prk)
                .map_err(drop)
                .and_then(|hk| hk.expand(info, out).map_err(drop)),
        };
        res.map_err(|_| Error::General("hkdf expand failed".to_string()))
    }

    fn aead(&self, alg: AeadAlgorithm, key: &[u8]) -> Result<Box<dyn AeadCipher>, Error> {
        if key.len() != alg.key_len() {
            return Err(Error::General("bad AEAD key length".to_string()));
        }

        let cipher: Box<dyn AeadCipher> = match alg {
            AeadAlgorithm::Aes128Gcm => Box::new(Aes128GcmCipher(
                Aes128Gcm::new_from_slice(key)
                    .map_err(|_| Error::General("bad AEAD key length".to_string()))?,
            )),
            AeadAlgorithm::Aes256Gcm => Box::new(Aes256GcmCipher(
                Aes256Gcm::new_from_slice(key)
                    .map_err(|_| Error::General("bad AEAD key length".to_string()))?,
            )),
            AeadAlgorithm::ChaCha20Poly1305 => Box::new(ChaCha20Poly1305Cipher(
                ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| Error::General("bad AEAD key length".to_string()))?,
            )),
        };
        Ok(cipher)
    }

    fn supported_kx_groups(&self) -> &[NamedGroup] {
        &KX_GROUPS
    }

    fn start_kx(&self, group: NamedGroup) -> Result<Box<dyn ActiveKeyExchange>, Error> {
        let (pub_key, secret) = match group {
            NamedGroup::X25519 => {
                let sk = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
                let pk = x25519_dalek::PublicKey::from(&sk);
                (pk.as_bytes().to_vec(), KxSecret::X25519(sk))
            }
            NamedGroup::secp256r1 => {
                let sk = p256::ecdh::EphemeralSecret::random(&mut OsRng);
                let pk = EncodedPoint::from(sk.public_key());
                (pk.as_bytes().to_vec(), KxSecret::Secp256r1(sk))
            }
            group => {
                return Err(Error::General(format!(
                    "unsupported key exchange group {:?}",
                    group
                )))
            }
        };

        Ok(Box::new(KeyExchange {
            group,
            pub_key,
            secret,
        }))
    }
}

#[derive(Clone)]
enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
}

impl HashContext for Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
        }
    }

    fn fork(&self) -> Box<dyn HashContext> {
        Box::new(self.clone())
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        match *self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
        }
    }

    fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha256(_) => HashAlgorithm::SHA256,
            Self::Sha384(_) => HashAlgorithm::SHA384,
        }
    }
}

enum HmacCtx {
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
}

impl MacContext for HmacCtx {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(m) => m.update(data),
            Self::Sha384(m) => m.update(data),
        }
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        match *self {
            Self::Sha256(m) => m.finalize().into_bytes().to_vec(),
            Self::Sha384(m) => m.finalize().into_bytes().to_vec(),
        }
    }
}

struct Aes128GcmCipher(Aes128Gcm);
struct Aes256GcmCipher(Aes256Gcm);
struct ChaCha20Poly1305Cipher(ChaCha20Poly1305);

macro_rules! impl_aead_cipher {
    ($name:ident) => {
        impl AeadCipher for $name {
            fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
                self.0
                    .encrypt(
                        Nonce::from_slice(nonce),
                        Payload {
                            msg: plaintext,
                            aad,
                        },
                    )
                    .map_err(|_| Error::EncryptError)
            }

            fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
                self.0
                    .decrypt(
                        Nonce::from_slice(nonce),
                        Payload {
                            msg: ciphertext,
                            aad,
                        },
                    )
                    .map_err(|_| Error::DecryptError)
            }
        }
    };
}

impl_aead_cipher!(Aes128GcmCipher);
impl_aead_cipher!(Aes256GcmCipher);
impl_aead_cipher!(ChaCha20Poly1305Cipher);

/// An in-progress ephemeral key exchange.  The private key lives here
/// and nowhere else; completing the exchange consumes it.
struct KeyExchange {
    group: NamedGroup,
    pub_key: Vec<u8>,
    secret: KxSecret,
}

enum KxSecret {
    X25519(x25519_dalek::EphemeralSecret),
    Secp256r1(p256::ecdh::EphemeralSecret),
}

impl ActiveKeyExchange for KeyExchange {
    fn group(&self) -> NamedGroup {
        self.group
    }

    fn pub_key(&self) -> &[u8] {
        &self.pub_key
    }

    fn complete(self: Box<Self>, peer_pub_key: &[u8]) -> Result<SharedSecret, Error> {
        match self.secret {
            KxSecret::X25519(sk) => {
                let peer: [u8; 32] = peer_pub_key.try_into().map_err(|_| {
                    Error::PeerMisbehavedError("bad x25519 peer public key".to_string())
                })?;
                let shared = sk.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
                if !shared.was_contributory() {
                    return Err(Error::PeerMisbehavedError(
                        "x25519 peer public key is low order".to_string(),
                    ));
                }
                Ok(SharedSecret::new(shared.as_bytes().to_vec()))
            }
            KxSecret::Secp256r1(sk) => {
                let peer = p256::PublicKey::from_sec1_bytes(peer_pub_key).map_err(|_| {
                    Error::PeerMisbehavedError("bad secp256r1 peer public key".to_string())
                })?;
                let shared = sk.diffie_hellman(&peer);
                Ok(SharedSecret::new(shared.raw_secret_bytes().to_vec()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn fill_random_varies() {
        let backend = RustCryptoBackend;
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        backend.fill_random(&mut a).unwrap();
        backend.fill_random(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_fork_leaves_state_undisturbed() {
        let backend = RustCryptoBackend;
        let mut h = backend.hash(HashAlgorithm::SHA256);
        h.update(b"hello");
        let snapshot = h.fork().finish();
        h.update(b"world");
        let full = h.finish();

        assert_eq!(snapshot, Sha256::digest(b"hello").to_vec());
        assert_eq!(full, Sha256::digest(b"helloworld").to_vec());
    }

    #[test]
    fn hkdf_extract_length_is_digest_size() {
        let backend = RustCryptoBackend;
        for (alg, len) in [(HashAlgorithm::SHA256, 32), (HashAlgorithm::SHA384, 48)] {
            let prk = backend.hkdf_extract(alg, b"salt", b"ikm");
            assert_eq!(prk.len(), len);
        }
    }

    // RFC 5869 appendix A, case 1.
    #[test]
    fn hkdf_rfc5869_sha256_basic() {
        let backend = RustCryptoBackend;
        let ikm = [0x0b; 22];
        let salt = hex!("000102030405060708090a0b0c");
        let info = hex!("f0f1f2f3f4f5f6f7f8f9");

        let prk = backend.hkdf_extract(HashAlgorithm::SHA256, &salt, &ikm);
        assert_eq!(
            prk,
            hex!("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5")
        );

        let mut okm = [0u8; 42];
        backend
            .hkdf_expand(HashAlgorithm::SHA256, &prk, &info, &mut okm)
            .unwrap();
        assert_eq!(
            okm,
            hex!("3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865")
        );
    }

    // RFC 5869 appendix A, case 2 (longer inputs).
    #[test]
    fn hkdf_rfc5869_sha256_long() {
        let backend = RustCryptoBackend;
        let ikm: Vec<u8> = (0x00u8..=0x4f).collect();
        let salt: Vec<u8> = (0x60u8..=0xaf).collect();
        let info: Vec<u8> = (0xb0u8..=0xff).collect();

        let prk = backend.hkdf_extract(HashAlgorithm::SHA256, &salt, &ikm);
        assert_eq!(
            prk,
            hex!("06a6b88c5853361a06104c9ceb35b45cef760014904671014a193f40c15fc244")
        );

        let mut okm = [0u8; 82];
        backend
            .hkdf_expand(HashAlgorithm::SHA256, &prk, &info, &mut okm)
            .unwrap();
        assert_eq!(
            okm.to_vec(),
            hex!(
                "b11e398dc80327a1c8e7f78c596a49344f012eda2d4efad8a050cc4c19afa97c"
                "59045a99cac7827271cb41c65e590e09da3275600c2f09b8367793a9aca3db71"
                "cc30c58179ec3e87c14c01d5c1f3434f1d87"
            )
            .to_vec()
        );
    }

    // RFC 5869 appendix A, case 3 (zero-length salt and info).
    #[test]
    fn hkdf_rfc5869_sha256_no_salt() {
        let backend = RustCryptoBackend;
        let ikm = [0x0b; 22];

        let prk = backend.hkdf_extract(HashAlgorithm::SHA256, &[0u8; 32], &ikm);
        assert_eq!(
            prk,
            hex!("19ef24a32c717b167f33a91d6f648bdf96596776afdb6377ac434c1c293ccb04")
        );

        let mut okm = [0u8; 42];
        backend
            .hkdf_expand(HashAlgorithm::SHA256, &prk, &[], &mut okm)
            .unwrap();
        assert_eq!(
            okm,
            hex!("8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8")
        );
    }

    // The RFC 5869 case-1 inputs run through HMAC-SHA-384.
    #[test]
    fn hkdf_sha384_basic() {
        let backend = RustCryptoBackend;
        let ikm = [0x0b; 22];
        let salt = hex!("000102030405060708090a0b0c");
        let info = hex!("f0f1f2f3f4f5f6f7f8f9");

        let prk = backend.hkdf_extract(HashAlgorithm::SHA384, &salt, &ikm);
        assert_eq!(
            prk.to_vec(),
            hex!(
                "704b39990779ce1dc548052c7dc39f303570dd13fb39f7acc564680bef80e8de"
                "c70ee9a7e1f3e293ef68eceb072a5ade"
            )
            .to_vec()
        );

        let mut okm = [0u8; 48];
        backend
            .hkdf_expand(HashAlgorithm::SHA384, &prk, &info, &mut okm)
            .unwrap();
        assert_eq!(
            okm.to_vec(),
            hex!(
                "9b5097a86038b805309076a44b3a9f38063e25b516dcbf369f394cfab43685f7"
                "48b6457763e4f0204fc5d95d1da3e625"
            )
            .to_vec()
        );
    }

    #[test]
    fn aead_round_trip_all_algorithms() {
        let backend = RustCryptoBackend;
        for alg in [
            AeadAlgorithm::Aes128Gcm,
            AeadAlgorithm::Aes256Gcm,
            AeadAlgorithm::ChaCha20Poly1305,
        ] {
            let key = vec![0x42; alg.key_len()];
            let cipher = backend.aead(alg, &key).unwrap();
            let nonce = [7u8; 12];

            let ct = cipher.seal(&nonce, b"aad", b"hello record").unwrap();
            assert_eq!(ct.len(), 12 + alg.tag_len());

            let pt = cipher.open(&nonce, b"aad", &ct).unwrap();
            assert_eq!(pt, b"hello record");

            // A different nonce must not verify.
            let other = [8u8; 12];
            assert_eq!(cipher.open(&other, b"aad", &ct), Err(Error::DecryptError));
        }
    }

    #[test]
    fn aead_tamper_detected() {
        let backend = RustCryptoBackend;
        let cipher = backend
            .aead(AeadAlgorithm::Aes128Gcm, &[0x42; 16])
            .unwrap();
        let nonce = [0u8; 12];
        let mut ct = cipher.seal(&nonce, b"", b"secret").unwrap();
        ct[0] ^= 0x01;
        assert_eq!(cipher.open(&nonce, b"", &ct), Err(Error::DecryptError));
    }

    #[test]
    fn kx_x25519_agrees() {
        let backend = RustCryptoBackend;
        let a = backend.start_kx(NamedGroup::X25519).unwrap();
        let b = backend.start_kx(NamedGroup::X25519).unwrap();
        let a_pub = a.pub_key().to_vec();
        let b_pub = b.pub_key().to_vec();

        let ab = a.complete(&b_pub).unwrap();
        let ba = b.complete(&a_pub).unwrap();
        assert_eq!(ab.as_ref(), ba.as_ref());
        assert_eq!(ab.as_ref().len(), 32);
    }

    #[test]
    fn kx_secp256r1_agrees() {
        let backend = RustCryptoBackend;
        let a = backend.start_kx(NamedGroup::secp256r1).unwrap();
        let b = backend.start_kx(NamedGroup::secp256r1).unwrap();
        // Uncompressed SEC1 point
        assert_eq!(a.pub_key().len(), 65);
        assert_eq!(a.pub_key()[0], 0x04);

        let b_pub = b.pub_key().to_vec();
        let a_pub = a.pub_key().to_vec();
        let ab = a.complete(&b_pub).unwrap();
        let ba = b.complete(&a_pub).unwrap();
        assert_eq!(ab.as_ref(), ba.as_ref());
    }

    #[test]
    fn kx_rejects_garbage_peer_key() {
        let backend = RustCryptoBackend;
        let a = backend.start_kx(NamedGroup::X25519).unwrap();
        assert!(a.complete(&[1, 2, 3]).is_err());

        let b = backend.start_kx(NamedGroup::secp256r1).unwrap();
        assert!(b.complete(&[0xff; 65]).is_err());
    }
}
