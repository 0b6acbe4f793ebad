//! Assorted public API tests: full loopback handshakes, the
//! negotiation failure modes, and the record-layer boundary cases.

use std::sync::Arc;
use tls_core::codes;
use tls_core::msgs::enums::{AlertDescription, SignatureScheme};
use tls_core::suites::{
    TLS13_AES_128_GCM_SHA256, TLS13_AES_256_GCM_SHA384, TLS13_CHACHA20_POLY1305_SHA256,
};
use tls_core::Error;
use tls_engine::sign::SingleCertResolver;
use tls_engine::{Buffer, ClientConnection, RustCryptoBackend, ServerConnection};

mod common;
use crate::common::*;

#[test]
fn handshake_completes_and_data_round_trips() {
    let (mut client, mut server) = make_pair_with_name(Some("example.com"));
    do_handshake(&mut client, &mut server);

    assert!(!client.is_handshaking());
    assert!(!server.is_handshaking());
    assert_eq!(
        client.negotiated_cipher_suite().unwrap().suite(),
        TLS13_AES_128_GCM_SHA256.suite()
    );
    assert_eq!(
        server.negotiated_cipher_suite().unwrap().suite(),
        TLS13_AES_128_GCM_SHA256.suite()
    );

    // A short request fits a single record: header, body, inner type,
    // tag.
    let request = b"GET /\r\n\r\n";
    let mut wire = send_all(&mut client, request);
    assert_eq!(count_records(&wire), 1);
    assert_eq!(wire.len(), 5 + request.len() + 1 + 16);

    let plain = recv_all(&mut server, &mut wire).unwrap();
    assert_eq!(plain, request);

    // And the other direction.
    let mut wire = send_all(&mut server, b"200 OK");
    let plain = recv_all(&mut client, &mut wire).unwrap();
    assert_eq!(plain, b"200 OK");
}

#[test]
fn exporter_and_resumption_secrets_agree() {
    let (mut client, mut server) = make_pair();
    do_handshake(&mut client, &mut server);

    let mut client_export = [0u8; 32];
    let mut server_export = [0u8; 32];
    client
        .export_keying_material(&mut client_export, b"EXPORTER-test", Some(b"ctx"))
        .unwrap();
    server
        .export_keying_material(&mut server_export, b"EXPORTER-test", Some(b"ctx"))
        .unwrap();
    assert_eq!(client_export, server_export);

    let c_res = client.resumption_secret().unwrap().to_vec();
    let s_res = server.resumption_secret().unwrap().to_vec();
    assert_eq!(c_res, s_res);
    assert_eq!(c_res.len(), 32);
}

#[test]
fn server_selects_sha384_suite_when_only_one_offered() {
    let identity = test_identity();
    let backend = Arc::new(RustCryptoBackend);
    let mut client = ClientConnection::new_with_suites(
        backend.clone(),
        Arc::new(TestVerifier::new(identity.verifying_key)),
        None,
        vec![&TLS13_AES_256_GCM_SHA384],
    )
    .unwrap();
    let mut server = ServerConnection::new(
        backend,
        Arc::new(SingleCertResolver(identity.certified_key)),
    )
    .unwrap();

    do_handshake(&mut client, &mut server);

    let suite = client.negotiated_cipher_suite().unwrap();
    assert_eq!(suite.suite(), TLS13_AES_256_GCM_SHA384.suite());
    // SHA-384 transcript: the Finished MAC and every derived secret is
    // 48 bytes.
    assert_eq!(suite.hash_algorithm.digest_size(), 48);
    assert_eq!(client.resumption_secret().unwrap().len(), 48);

    let mut wire = send_all(&mut client, b"big hash");
    assert_eq!(recv_all(&mut server, &mut wire).unwrap(), b"big hash");
}

#[test]
fn chacha20_suite_works() {
    let identity = test_identity();
    let backend = Arc::new(RustCryptoBackend);
    let mut client = ClientConnection::new_with_suites(
        backend.clone(),
        Arc::new(TestVerifier::new(identity.verifying_key)),
        None,
        vec![&TLS13_CHACHA20_POLY1305_SHA256],
    )
    .unwrap();
    let mut server = ServerConnection::new(
        backend,
        Arc::new(SingleCertResolver(identity.certified_key)),
    )
    .unwrap();

    do_handshake(&mut client, &mut server);
    assert_eq!(
        server.negotiated_cipher_suite().unwrap().suite(),
        TLS13_CHACHA20_POLY1305_SHA256.suite()
    );

    let mut wire = send_all(&mut client, b"poly1305");
    assert_eq!(recv_all(&mut server, &mut wire).unwrap(), b"poly1305");
}

#[test]
fn tampered_record_is_a_bad_record_mac() {
    let (mut client, mut server) = make_pair();
    do_handshake(&mut client, &mut server);

    let mut wire = send_all(&mut client, b"sensitive");
    // Flip one bit inside the ciphertext, past the record header.
    wire[7] ^= 0x01;

    let mut out = Buffer::new(&mut []);
    let err = server.receive(&mut out, &wire).unwrap_err();
    assert_eq!(err, Error::DecryptError);
    assert_eq!(err.code(), 20);
    assert_eq!(codes::class_of(err.code()), codes::CLASS_SELF_ALERT);

    // The failure is terminal: the session keeps returning it.
    let err = server.receive(&mut out, &wire).unwrap_err();
    assert_eq!(err, Error::DecryptError);
}

#[test]
fn unknown_sni_is_unrecognized_name() {
    let identity = test_identity();
    let backend = Arc::new(RustCryptoBackend);
    let mut client = ClientConnection::new(
        backend.clone(),
        Arc::new(TestVerifier::new(identity.verifying_key)),
        Some("wrong.example"),
    )
    .unwrap();
    let mut server = ServerConnection::new(
        backend,
        Arc::new(VirtualHostResolver {
            name: "right.example".to_string(),
            inner: SingleCertResolver(identity.certified_key),
        }),
    )
    .unwrap();

    let mut pipe = Pipe::new();
    step_client(&mut client, &mut pipe).unwrap();

    let err = step_server(&mut server, &mut pipe).unwrap_err();
    assert_eq!(err, Error::UnrecognizedServerName);
    assert_eq!(err.code(), 112);

    // The server said so on the wire too.
    let err = step_client(&mut client, &mut pipe).unwrap_err();
    assert_eq!(
        err,
        Error::AlertReceived(AlertDescription::UnrecognisedName)
    );
    assert_eq!(codes::class_of(err.code()), codes::CLASS_PEER_ALERT);
}

#[test]
fn signature_scheme_mismatch_is_handshake_failure() {
    let identity = test_identity();
    let backend = Arc::new(RustCryptoBackend);

    // A client that can only verify RSA-PSS offers only that; the
    // server's sole key is ECDSA.
    let mut verifier = TestVerifier::new(identity.verifying_key);
    verifier.schemes = vec![SignatureScheme::RSA_PSS_SHA256];

    let mut client =
        ClientConnection::new(backend.clone(), Arc::new(verifier), None).unwrap();
    let mut server = ServerConnection::new(
        backend,
        Arc::new(SingleCertResolver(identity.certified_key)),
    )
    .unwrap();

    let mut pipe = Pipe::new();
    step_client(&mut client, &mut pipe).unwrap();

    let err = step_server(&mut server, &mut pipe).unwrap_err();
    assert!(matches!(err, Error::PeerIncompatibleError(_)));
    assert_eq!(err.code(), u32::from(AlertDescription::HandshakeFailure.get_u8()));

    let err = step_client(&mut client, &mut pipe).unwrap_err();
    assert_eq!(
        err,
        Error::AlertReceived(AlertDescription::HandshakeFailure)
    );
}

#[test]
fn partial_server_hello_consumes_nothing() {
    let (mut client, mut server) = make_pair();
    let mut pipe = Pipe::new();

    step_client(&mut client, &mut pipe).unwrap();
    step_server(&mut server, &mut pipe).unwrap();
    assert!(!pipe.s2c.is_empty());

    // Hand over a truncated flight: nothing is consumed.
    let mut out = Buffer::new(&mut []);
    let outcome = client.handshake(&mut out, &pipe.s2c[..3]).unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.consumed, 0);
    assert!(out.is_empty());

    // The same bytes again, whole, make progress.
    let mut out = Buffer::new(&mut []);
    let outcome = client.handshake(&mut out, &pipe.s2c).unwrap();
    assert_eq!(outcome.consumed, pipe.s2c.len());
    pipe.s2c.clear();
    pipe.c2s.extend_from_slice(out.as_ref());

    step_server(&mut server, &mut pipe).unwrap();
    assert!(!client.is_handshaking());
    assert!(!server.is_handshaking());
}

#[test]
fn change_cipher_spec_swallowed_after_handshake() {
    let (mut client, mut server) = make_pair();
    do_handshake(&mut client, &mut server);

    let mut wire = vec![0x14, 0x03, 0x03, 0x00, 0x01, 0x01];
    wire.extend(send_all(&mut client, b"after ccs"));

    let mut out = Buffer::new(&mut []);
    // First record is the CCS: silently consumed, no plaintext.
    let consumed = server.receive(&mut out, &wire).unwrap();
    assert_eq!(consumed, 6);
    assert!(out.is_empty());

    let mut rest = wire.split_off(consumed);
    let plain = recv_all(&mut server, &mut rest).unwrap();
    assert_eq!(plain, b"after ccs");
}

#[test]
fn maximum_fragment_boundaries() {
    let (mut client, mut server) = make_pair();
    do_handshake(&mut client, &mut server);

    // Exactly 2^14 plaintext bytes: one record.
    let body = vec![0x61u8; 16384];
    let mut wire = send_all(&mut client, &body);
    assert_eq!(count_records(&wire), 1);
    assert_eq!(recv_all(&mut server, &mut wire).unwrap(), body);

    // One byte more fragments into two records.
    let body = vec![0x62u8; 16385];
    let mut wire = send_all(&mut client, &body);
    assert_eq!(count_records(&wire), 2);
    assert_eq!(recv_all(&mut server, &mut wire).unwrap(), body);
}

#[test]
fn empty_send_produces_no_records() {
    let (mut client, mut server) = make_pair();
    do_handshake(&mut client, &mut server);

    let wire = send_all(&mut client, b"");
    assert!(wire.is_empty());
}

#[test]
fn close_notify_is_seen_by_the_peer() {
    let (mut client, mut server) = make_pair();
    do_handshake(&mut client, &mut server);

    let mut out = Buffer::new(&mut []);
    client.send_close_notify(&mut out).unwrap();
    let wire = out.as_ref().to_vec();
    assert_eq!(count_records(&wire), 1);

    let mut plain = Buffer::new(&mut []);
    let consumed = server.receive(&mut plain, &wire).unwrap();
    assert_eq!(consumed, wire.len());
    assert!(plain.is_empty());
    assert!(server.peer_has_closed());
}

#[test]
fn handshake_after_completion_is_a_no_op() {
    let (mut client, mut server) = make_pair();
    do_handshake(&mut client, &mut server);

    let mut out = Buffer::new(&mut []);
    let outcome = client.handshake(&mut out, &[]).unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.consumed, 0);
    assert!(out.is_empty());
}

#[test]
fn traffic_before_completion_is_refused() {
    let (mut client, _server) = make_pair();

    let mut out = Buffer::new(&mut []);
    assert_eq!(
        client.send(&mut out, b"too early").unwrap_err(),
        Error::HandshakeNotComplete
    );
    assert_eq!(
        client.receive(&mut out, &[]).unwrap_err(),
        Error::HandshakeNotComplete
    );
}

/// A backend that only runs P-256, exercising the non-default group
/// path through the capability seam.
struct Secp256r1OnlyBackend(RustCryptoBackend);

impl tls_engine::CryptoBackend for Secp256r1OnlyBackend {
    fn fill_random(&self, buf: &mut [u8]) -> Result<(), Error> {
        self.0.fill_random(buf)
    }

    fn hash(
        &self,
        alg: tls_core::suites::HashAlgorithm,
    ) -> Box<dyn tls_engine::backend::HashContext> {
        self.0.hash(alg)
    }

    fn hmac(
        &self,
        alg: tls_core::suites::HashAlgorithm,
        key: &[u8],
    ) -> Box<dyn tls_engine::backend::MacContext> {
        self.0.hmac(alg, key)
    }

    fn hkdf_extract(
        &self,
        alg: tls_core::suites::HashAlgorithm,
        salt: &[u8],
        ikm: &[u8],
    ) -> Vec<u8> {
        self.0.hkdf_extract(alg, salt, ikm)
    }

    fn hkdf_expand(
        &self,
        alg: tls_core::suites::HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        out: &mut [u8],
    ) -> Result<(), Error> {
        self.0.hkdf_expand(alg, prk, info, out)
    }

    fn aead(
        &self,
        alg: tls_core::suites::AeadAlgorithm,
        key: &[u8],
    ) -> Result<Box<dyn tls_engine::backend::AeadCipher>, Error> {
        self.0.aead(alg, key)
    }

    fn supported_kx_groups(&self) -> &[tls_core::msgs::enums::NamedGroup] {
        &[tls_core::msgs::enums::NamedGroup::secp256r1]
    }

    fn start_kx(
        &self,
        group: tls_core::msgs::enums::NamedGroup,
    ) -> Result<Box<dyn tls_engine::backend::ActiveKeyExchange>, Error> {
        self.0.start_kx(group)
    }
}

#[test]
fn secp256r1_only_client_completes() {
    let identity = test_identity();
    let mut client = ClientConnection::new(
        Arc::new(Secp256r1OnlyBackend(RustCryptoBackend)),
        Arc::new(TestVerifier::new(identity.verifying_key)),
        None,
    )
    .unwrap();
    // The server still supports both groups and follows the client's
    // only share.
    let mut server = ServerConnection::new(
        Arc::new(RustCryptoBackend),
        Arc::new(SingleCertResolver(identity.certified_key)),
    )
    .unwrap();

    do_handshake(&mut client, &mut server);

    let mut wire = send_all(&mut server, b"ok");
    assert_eq!(recv_all(&mut client, &mut wire).unwrap(), b"ok");
}
