use crate::deferred::DeferredVerification;
use tls_core::key::Certificate;
use tls_core::msgs::enums::SignatureScheme;
use tls_core::Error;

/// How the client judges the server's certificate chain.
///
/// The engine decodes the Certificate message and hands the chain over;
/// policy (path building, name checks, revocation) is entirely the
/// host's.  On success the verifier returns a [`DeferredVerification`]
/// continuation, which the engine later runs with the CertificateVerify
/// signing payload and the peer's signature.  If the handshake fails in
/// between, the continuation is dropped, releasing its context.
pub trait ServerCertVerifier: Send + Sync {
    /// Judge `end_entity` (and its `intermediates`) as a certificate
    /// for `server_name`.
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: Option<&str>,
    ) -> Result<DeferredVerification, Error>;

    /// Which signature schemes this verifier can check.  Offered in the
    /// ClientHello `signature_algorithms` extension.
    fn supported_verify_schemes(&self) -> Vec<SignatureScheme>;
}

/// The signing payload for a TLS 1.3 CertificateVerify: 64 spaces, a
/// context string, a NUL, then the transcript hash (RFC 8446 section
/// 4.4.3).
fn construct_tls13_verify_message(context_string: &[u8], handshake_hash: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(64 + context_string.len() + 1 + handshake_hash.len());
    msg.resize(64, 0x20);
    msg.extend_from_slice(context_string);
    msg.push(0x00);
    msg.extend_from_slice(handshake_hash);
    msg
}

pub(crate) fn construct_tls13_server_verify_message(handshake_hash: &[u8]) -> Vec<u8> {
    construct_tls13_verify_message(b"TLS 1.3, server CertificateVerify", handshake_hash)
}
