//! Helpers shared by the API tests: a self-contained server identity,
//! a signature-checking certificate verifier, and a byte-level loopback
//! pump between a client and a server session.

use p256::ecdsa::signature::Verifier as _;
use rand::rngs::OsRng;
use std::sync::Arc;
use tls_core::key::{Certificate, PrivateKey};
use tls_core::msgs::enums::SignatureScheme;
use tls_core::Error;
use tls_engine::deferred::DeferredVerification;
use tls_engine::sign::{
    any_ecdsa_type, CertifiedKey, ResolvedCert, ResolvesServerCert, SingleCertResolver,
};
use tls_engine::verify::ServerCertVerifier;
use tls_engine::{
    Buffer, ClientConnection, ConnectionCommon, HandshakeOutcome, RustCryptoBackend,
    ServerConnection,
};

pub struct TestIdentity {
    pub certified_key: CertifiedKey,
    pub verifying_key: p256::ecdsa::VerifyingKey,
}

/// A fresh P-256 identity.  The "chain" is opaque test bytes: chain
/// policy belongs to the verifier callback, and ours checks the
/// signature against the known public key instead.
pub fn test_identity() -> TestIdentity {
    use p256::pkcs8::EncodePrivateKey;

    let secret = p256::SecretKey::random(&mut OsRng);
    let verifying_key =
        p256::ecdsa::VerifyingKey::from(&p256::ecdsa::SigningKey::from(&secret));
    let der = PrivateKey(secret.to_pkcs8_der().unwrap().as_bytes().to_vec());
    let key = any_ecdsa_type(&der).unwrap();

    let certified_key = CertifiedKey::new(
        vec![
            Certificate(b"test end-entity".to_vec()),
            Certificate(b"test intermediate".to_vec()),
        ],
        key,
    );

    TestIdentity {
        certified_key,
        verifying_key,
    }
}

/// Accepts any chain, but insists the CertificateVerify signature
/// checks out against the expected key.
pub struct TestVerifier {
    pub key: p256::ecdsa::VerifyingKey,
    pub schemes: Vec<SignatureScheme>,
}

impl TestVerifier {
    pub fn new(key: p256::ecdsa::VerifyingKey) -> Self {
        Self {
            key,
            schemes: vec![SignatureScheme::ECDSA_NISTP256_SHA256],
        }
    }
}

impl ServerCertVerifier for TestVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: Option<&str>,
    ) -> Result<DeferredVerification, Error> {
        if end_entity.0.is_empty() {
            return Err(Error::InvalidCertificateEncoding);
        }

        let key = self.key.clone();
        Ok(DeferredVerification::new(move |message, sig| {
            let sig = p256::ecdsa::Signature::from_der(sig)
                .map_err(|_| Error::InvalidCertificateEncoding)?;
            key.verify(message, &sig)
                .map_err(|_| Error::InvalidCertificateSignature)
        }))
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

/// Serves one name only; anything else is an unrecognized name.
pub struct VirtualHostResolver {
    pub name: String,
    pub inner: SingleCertResolver,
}

impl ResolvesServerCert for VirtualHostResolver {
    fn resolve(
        &self,
        server_name: Option<&str>,
        offered_schemes: &[SignatureScheme],
    ) -> Result<ResolvedCert, Error> {
        if server_name != Some(self.name.as_str()) {
            return Err(Error::UnrecognizedServerName);
        }
        self.inner.resolve(server_name, offered_schemes)
    }
}

pub fn make_pair() -> (ClientConnection, ServerConnection) {
    make_pair_with_name(None)
}

pub fn make_pair_with_name(server_name: Option<&str>) -> (ClientConnection, ServerConnection) {
    let _ = env_logger::builder().is_test(true).try_init();

    let identity = test_identity();
    let backend = Arc::new(RustCryptoBackend);

    let client = ClientConnection::new(
        backend.clone(),
        Arc::new(TestVerifier::new(identity.verifying_key)),
        server_name,
    )
    .unwrap();
    let server = ServerConnection::new(
        backend,
        Arc::new(SingleCertResolver(identity.certified_key)),
    )
    .unwrap();

    (client, server)
}

/// The two in-memory byte streams between client and server.
pub struct Pipe {
    pub c2s: Vec<u8>,
    pub s2c: Vec<u8>,
}

impl Pipe {
    pub fn new() -> Self {
        Self {
            c2s: Vec::new(),
            s2c: Vec::new(),
        }
    }
}

pub fn step_client(
    client: &mut ClientConnection,
    pipe: &mut Pipe,
) -> Result<HandshakeOutcome, Error> {
    let mut out = Buffer::new(&mut []);
    let res = client.handshake(&mut out, &pipe.s2c);
    // The out buffer can carry an alert even when the call failed.
    pipe.c2s.extend_from_slice(out.as_ref());
    let outcome = res?;
    pipe.s2c.drain(..outcome.consumed);
    Ok(outcome)
}

pub fn step_server(
    server: &mut ServerConnection,
    pipe: &mut Pipe,
) -> Result<HandshakeOutcome, Error> {
    let mut out = Buffer::new(&mut []);
    let res = server.handshake(&mut out, &pipe.c2s);
    pipe.s2c.extend_from_slice(out.as_ref());
    let outcome = res?;
    pipe.c2s.drain(..outcome.consumed);
    Ok(outcome)
}

/// Drive both sides to completion over a lossless loopback.
pub fn do_handshake(client: &mut ClientConnection, server: &mut ServerConnection) -> Pipe {
    let mut pipe = Pipe::new();
    for _ in 0..10 {
        let c = step_client(client, &mut pipe).unwrap();
        let s = step_server(server, &mut pipe).unwrap();

        if c.is_complete() && s.is_complete() && pipe.c2s.is_empty() && pipe.s2c.is_empty() {
            return pipe;
        }
    }
    panic!("handshake did not converge");
}

/// Encrypt `data` on `conn`, returning the produced records.
pub fn send_all(conn: &mut ConnectionCommon, data: &[u8]) -> Vec<u8> {
    let mut out = Buffer::new(&mut []);
    conn.send(&mut out, data).unwrap();
    out.as_ref().to_vec()
}

/// Decrypt every complete record in `input`, draining what was
/// consumed.
pub fn recv_all(conn: &mut ConnectionCommon, input: &mut Vec<u8>) -> Result<Vec<u8>, Error> {
    let mut collected = Vec::new();
    loop {
        let mut out = Buffer::new(&mut []);
        let consumed = conn.receive(&mut out, input)?;
        if consumed == 0 {
            break;
        }
        input.drain(..consumed);
        collected.extend_from_slice(out.as_ref());
    }
    Ok(collected)
}

/// How many TLS records `bytes` contains.
pub fn count_records(mut bytes: &[u8]) -> usize {
    let mut count = 0;
    while bytes.len() >= 5 {
        let len = usize::from(u16::from_be_bytes([bytes[3], bytes[4]]));
        assert!(bytes.len() >= 5 + len, "truncated record");
        bytes = &bytes[5 + len..];
        count += 1;
    }
    assert!(bytes.is_empty(), "trailing garbage after records");
    count
}
