//! The crypto capability interface.
//!
//! A [`CryptoBackend`] supplies every primitive the engine needs: random
//! bytes, streaming hashes with snapshots, HMAC, HKDF, AEAD ciphers and
//! ephemeral key exchange.  The backend is shared read-only between
//! sessions (`Arc`) and must be reentrant; it outlives every session it
//! backs.
//!
//! The shipped implementation is [`RustCryptoBackend`].

mod rustcrypto;

pub use rustcrypto::RustCryptoBackend;

use tls_core::msgs::enums::NamedGroup;
use tls_core::suites::{AeadAlgorithm, HashAlgorithm};
use tls_core::Error;
use zeroize::Zeroize;

/// A streaming hash in progress.
pub trait HashContext: Send + Sync {
    /// Feed `data` into the hash.
    fn update(&mut self, data: &[u8]);

    /// Clone the running state, so an interim digest can be taken
    /// without disturbing it.
    fn fork(&self) -> Box<dyn HashContext>;

    /// Consume the context and produce the digest.
    fn finish(self: Box<Self>) -> Vec<u8>;

    /// Which algorithm this context runs.
    fn algorithm(&self) -> HashAlgorithm;
}

/// A streaming MAC in progress, as constructed by [`CryptoBackend::hmac`].
pub trait MacContext: Send + Sync {
    fn update(&mut self, data: &[u8]);
    fn finish(self: Box<Self>) -> Vec<u8>;
}

/// A keyed AEAD.  Nonce construction and sequence bookkeeping live in
/// the record layer; this only seals and opens.
pub trait AeadCipher: Send + Sync {
    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Decrypt `ciphertext` (tag included), returning the plaintext.
    fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;
}

/// An in-progress ephemeral key exchange.
///
/// The public value is available from creation; the shared secret is
/// computed by `complete`, which consumes the context and thereby
/// releases the private key.
pub trait ActiveKeyExchange: Send + Sync {
    /// The group this exchange runs in.
    fn group(&self) -> NamedGroup;

    /// Our public value, in the group's wire encoding.
    fn pub_key(&self) -> &[u8];

    /// Complete the exchange with the peer's public value.
    fn complete(self: Box<Self>, peer_pub_key: &[u8]) -> Result<SharedSecret, Error>;
}

/// The result of a completed key exchange.  Zeroed on drop.
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for SharedSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// The capability table handed to every session.
pub trait CryptoBackend: Send + Sync {
    /// Fill the whole slice with random material.
    fn fill_random(&self, buf: &mut [u8]) -> Result<(), Error>;

    /// Start a streaming hash.
    fn hash(&self, alg: HashAlgorithm) -> Box<dyn HashContext>;

    /// Start a streaming HMAC keyed with `key`.
    fn hmac(&self, alg: HashAlgorithm, key: &[u8]) -> Box<dyn MacContext>;

    /// HKDF-Extract per RFC 5869.  The output length equals the
    /// digest size of `alg`.
    fn hkdf_extract(&self, alg: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> Vec<u8>;

    /// HKDF-Expand per RFC 5869, filling all of `out`.
    fn hkdf_expand(
        &self,
        alg: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        out: &mut [u8],
    ) -> Result<(), Error>;

    /// Build an AEAD keyed with `key`.
    fn aead(&self, alg: AeadAlgorithm, key: &[u8]) -> Result<Box<dyn AeadCipher>, Error>;

    /// The key exchange groups this backend can run, in preference order.
    fn supported_kx_groups(&self) -> &[NamedGroup];

    /// Begin an ephemeral key exchange in `group`.
    fn start_kx(&self, group: NamedGroup) -> Result<Box<dyn ActiveKeyExchange>, Error>;
}

/// One-shot HMAC convenience over [`CryptoBackend::hmac`].
pub fn hmac_one_shot(
    backend: &dyn CryptoBackend,
    alg: HashAlgorithm,
    key: &[u8],
    data: &[u8],
) -> Vec<u8> {
    let mut mac = backend.hmac(alg, key);
    mac.update(data);
    mac.finish()
}
