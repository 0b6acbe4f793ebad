//! Deferred certificate operations.
//!
//! The certificate callbacks hand the engine a continuation: a signing
//! or verification operation that will run later in the handshake, once
//! the transcript has reached the right point.  Each continuation is an
//! owned handle whose `run` and `cancel` operations both consume it.
//! If the handshake dies in between, dropping the handle releases
//! whatever the callback captured, so host resources cannot leak.

use tls_core::msgs::enums::SignatureScheme;
use tls_core::Error;

/// A pending CertificateVerify signing operation, produced by the
/// server's certificate resolver.
pub struct DeferredSigner {
    scheme: SignatureScheme,
    op: Option<Box<dyn FnOnce(&[u8]) -> Result<Vec<u8>, Error> + Send>>,
}

impl std::fmt::Debug for DeferredSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredSigner")
            .field("scheme", &self.scheme)
            .field("op", &self.op.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl DeferredSigner {
    pub fn new(
        scheme: SignatureScheme,
        op: impl FnOnce(&[u8]) -> Result<Vec<u8>, Error> + Send + 'static,
    ) -> Self {
        Self {
            scheme,
            op: Some(Box::new(op)),
        }
    }

    /// The signature scheme `run` will produce.
    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Sign `message`, consuming the handle.
    pub fn run(mut self, message: &[u8]) -> Result<Vec<u8>, Error> {
        let op = self.op.take().expect("signer already consumed");
        op(message)
    }

    /// Release the handle without signing.
    pub fn cancel(mut self) {
        self.op.take();
    }
}

/// A pending signature verification, produced by the client's
/// certificate verifier after it has seen the chain.
pub struct DeferredVerification {
    op: Option<Box<dyn FnOnce(&[u8], &[u8]) -> Result<(), Error> + Send>>,
}

impl DeferredVerification {
    pub fn new(op: impl FnOnce(&[u8], &[u8]) -> Result<(), Error> + Send + 'static) -> Self {
        Self {
            op: Some(Box::new(op)),
        }
    }

    /// Verify `signature` over `message`, consuming the handle.
    pub fn run(mut self, message: &[u8], signature: &[u8]) -> Result<(), Error> {
        let op = self.op.take().expect("verifier already consumed");
        op(message, signature)
    }

    /// Release the handle without verifying.
    pub fn cancel(mut self) {
        self.op.take();
    }
}
