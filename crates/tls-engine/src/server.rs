use crate::cipher::{new_message_decrypter, new_message_encrypter};
use crate::client::{emit_fake_ccs, emit_finished_tls13, ExpectTraffic};
use crate::conn::{CommonState, ConnectionCommon, Context, Side, State};
use crate::hash_hs::{HandshakeHash, HandshakeHashBuffer};
use crate::key_schedule::{KeySchedule, SecretKind};
use crate::sign::ResolvesServerCert;
use crate::verify::construct_tls13_server_verify_message;
use log::{debug, trace};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tls_core::msgs::enums::{
    AlertDescription, Compression, HandshakeType, ProtocolVersion,
};
use tls_core::msgs::handshake::{
    CertificatePayloadTLS13, DigitallySignedStruct, HandshakeMessagePayload, HandshakePayload,
    KeyShareEntry, Random, ServerExtension, ServerHelloPayload,
};
use tls_core::msgs::message::{Message, MessagePayload};
use tls_core::suites::{Tls13CipherSuite, ALL_CIPHER_SUITES};
use tls_core::Error;
use zeroize::Zeroizing;

/// A server-side TLS 1.3 session.
pub struct ServerConnection {
    inner: ConnectionCommon,
}

impl ServerConnection {
    /// Make a new session, serving certificates from `cert_resolver`.
    pub fn new(
        backend: Arc<dyn crate::backend::CryptoBackend>,
        cert_resolver: Arc<dyn ResolvesServerCert>,
    ) -> Result<Self, Error> {
        let common = CommonState::new(Side::Server, backend);
        let state = Box::new(ExpectClientHello { cert_resolver });
        Ok(Self {
            inner: ConnectionCommon::new(state, common),
        })
    }
}

impl Deref for ServerConnection {
    type Target = ConnectionCommon;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ServerConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

struct ExpectClientHello {
    cert_resolver: Arc<dyn ResolvesServerCert>,
}

impl State for ExpectClientHello {
    fn handle(
        self: Box<Self>,
        cx: &mut Context<'_>,
        m: Message,
    ) -> Result<Box<dyn State>, Error> {
        let client_hello =
            require_handshake_msg!(m, HandshakeType::ClientHello, HandshakePayload::ClientHello)?;
        trace!("We got ClientHello {:?}", client_hello);

        if client_hello.has_duplicate_extension() {
            cx.common.send_fatal_alert(AlertDescription::DecodeError);
            return Err(Error::PeerMisbehavedError(
                "client sent duplicate extensions".to_string(),
            ));
        }

        if !client_hello
            .compression_methods
            .contains(&Compression::Null)
        {
            return Err(cx.common.illegal_param("client did not offer Null compression"));
        }

        match client_hello.get_versions_extension() {
            Some(versions) if versions.contains(&ProtocolVersion::TLSv1_3) => {}
            _ => {
                cx.common
                    .send_fatal_alert(AlertDescription::ProtocolVersion);
                return Err(Error::PeerIncompatibleError(
                    "client does not support TLS v1.3".to_string(),
                ));
            }
        }

        // Pick the first of our suites the client offers.
        let suite = ALL_CIPHER_SUITES
            .iter()
            .find(|scs| client_hello.cipher_suites.contains(&scs.suite()))
            .copied()
            .ok_or_else(|| {
                cx.common
                    .send_fatal_alert(AlertDescription::HandshakeFailure);
                Error::PeerIncompatibleError("no ciphersuite in common".to_string())
            })?;
        debug!("Using ciphersuite {:?}", suite);

        let sigschemes = client_hello.get_sigalgs_extension().ok_or_else(|| {
            cx.common
                .send_fatal_alert(AlertDescription::MissingExtension);
            Error::PeerMisbehavedError("client offered no signature schemes".to_string())
        })?;

        let shares = client_hello.get_keyshare_extension().ok_or_else(|| {
            cx.common
                .send_fatal_alert(AlertDescription::MissingExtension);
            Error::PeerMisbehavedError("client offered no key shares".to_string())
        })?;

        // Without HelloRetryRequest in this subset, a usable share must
        // be present up front.
        let their_share = shares
            .iter()
            .find(|share| {
                cx.common
                    .backend
                    .supported_kx_groups()
                    .contains(&share.group)
            })
            .ok_or_else(|| {
                cx.common
                    .send_fatal_alert(AlertDescription::HandshakeFailure);
                Error::PeerIncompatibleError("no usable key share".to_string())
            })?;

        let server_name = client_hello
            .get_sni_extension()
            .and_then(|names| {
                use tls_core::msgs::handshake::ConvertServerNameList;
                names.get_single_hostname()
            })
            .map(str::to_string);
        debug!("SNI {:?}", server_name);

        // The certificate callback picks the chain and hands back the
        // deferred signing operation.
        let resolved = self
            .cert_resolver
            .resolve(server_name.as_deref(), sigschemes)?;

        // One-shot key exchange: create, exchange, release.
        let kx = cx.common.backend.start_kx(their_share.group)?;
        let our_share = KeyShareEntry::new(their_share.group, kx.pub_key());
        let shared = kx.complete(&their_share.payload.0)?;

        cx.common.check_aligned_handshake()?;

        let mut random = [0u8; 32];
        cx.common.backend.fill_random(&mut random)?;

        let sh = Message {
            version: ProtocolVersion::TLSv1_2,
            payload: MessagePayload::Handshake(HandshakeMessagePayload {
                typ: HandshakeType::ServerHello,
                payload: HandshakePayload::ServerHello(ServerHelloPayload {
                    legacy_version: ProtocolVersion::TLSv1_2,
                    random: Random(random),
                    session_id: client_hello.session_id,
                    cipher_suite: suite.suite(),
                    compression_method: Compression::Null,
                    extensions: vec![
                        ServerExtension::SupportedVersions(ProtocolVersion::TLSv1_3),
                        ServerExtension::KeyShare(our_share),
                    ],
                }),
            }),
        };
        trace!("Sending ServerHello {:?}", sh);

        let mut transcript_buffer = HandshakeHashBuffer::new();
        transcript_buffer.add_message(&m);
        let mut transcript =
            transcript_buffer.start_hash(cx.common.backend.as_ref(), suite.hash_algorithm);
        transcript.add_message(&sh);

        cx.common.suite = Some(suite);
        cx.common.send_msg(sh, false)?;
        emit_fake_ccs(cx.common)?;

        let mut key_schedule =
            KeySchedule::new(cx.common.backend.clone(), suite.hash_algorithm);
        key_schedule.input_secret(shared.as_ref());

        let hs_hash = transcript.get_current_hash();
        let client_hs_secret =
            key_schedule.derive_secret(SecretKind::ClientHandshakeTrafficSecret, &hs_hash);
        let server_hs_secret =
            key_schedule.derive_secret(SecretKind::ServerHandshakeTrafficSecret, &hs_hash);

        let backend = cx.common.backend.clone();
        cx.common.record_layer.set_message_encrypter(
            new_message_encrypter(backend.as_ref(), suite, &server_hs_secret)?,
        );
        cx.common.record_layer.set_message_decrypter(
            new_message_decrypter(backend.as_ref(), suite, &client_hs_secret)?,
        );

        // The rest of our flight travels under the handshake keys.
        emit_encrypted_extensions(&mut transcript, cx.common)?;
        emit_certificate_tls13(&mut transcript, &resolved.chain, cx.common)?;
        emit_certverify_tls13(&mut transcript, resolved.signer, cx.common)?;

        let verify_data =
            key_schedule.finished_verify_data(&server_hs_secret, &transcript.get_current_hash());
        emit_finished_tls13(&verify_data, &mut transcript, cx.common)?;

        // Application secrets bind the transcript through our
        // Finished.
        key_schedule.input_empty();
        let sf_hash = transcript.get_current_hash();
        let client_app_secret =
            key_schedule.derive_secret(SecretKind::ClientApplicationTrafficSecret, &sf_hash);
        let server_app_secret =
            key_schedule.derive_secret(SecretKind::ServerApplicationTrafficSecret, &sf_hash);
        let exporter_secret =
            key_schedule.derive_secret(SecretKind::ExporterMasterSecret, &sf_hash);

        // We may send under the application key straight away; the
        // read side stays on the handshake key until the client's
        // Finished arrives.
        cx.common.record_layer.set_message_encrypter(
            new_message_encrypter(backend.as_ref(), suite, &server_app_secret)?,
        );
        cx.common.start_outgoing_traffic();

        Ok(Box::new(ExpectFinished {
            suite,
            key_schedule,
            transcript,
            client_hs_secret,
            client_app_secret,
            exporter_secret,
        }))
    }
}

fn emit_encrypted_extensions(
    transcript: &mut HandshakeHash,
    common: &mut CommonState,
) -> Result<(), Error> {
    let m = Message {
        version: ProtocolVersion::TLSv1_3,
        payload: MessagePayload::Handshake(HandshakeMessagePayload {
            typ: HandshakeType::EncryptedExtensions,
            payload: HandshakePayload::EncryptedExtensions(Vec::new()),
        }),
    };
    transcript.add_message(&m);
    common.send_msg(m, true)
}

fn emit_certificate_tls13(
    transcript: &mut HandshakeHash,
    chain: &[tls_core::key::Certificate],
    common: &mut CommonState,
) -> Result<(), Error> {
    let m = Message {
        version: ProtocolVersion::TLSv1_3,
        payload: MessagePayload::Handshake(HandshakeMessagePayload {
            typ: HandshakeType::Certificate,
            payload: HandshakePayload::CertificateTLS13(CertificatePayloadTLS13::new(chain)),
        }),
    };
    transcript.add_message(&m);
    common.send_msg(m, true)
}

fn emit_certverify_tls13(
    transcript: &mut HandshakeHash,
    signer: crate::deferred::DeferredSigner,
    common: &mut CommonState,
) -> Result<(), Error> {
    let message = construct_tls13_server_verify_message(&transcript.get_current_hash());

    let scheme = signer.scheme();
    let sig = match signer.run(&message) {
        Ok(sig) => sig,
        Err(e) => {
            common.send_fatal_alert(AlertDescription::InternalError);
            return Err(e);
        }
    };
    let dss = DigitallySignedStruct::new(scheme, sig);

    let m = Message {
        version: ProtocolVersion::TLSv1_3,
        payload: MessagePayload::Handshake(HandshakeMessagePayload {
            typ: HandshakeType::CertificateVerify,
            payload: HandshakePayload::CertificateVerify(dss),
        }),
    };

    transcript.add_message(&m);
    common.send_msg(m, true)
}

struct ExpectFinished {
    suite: &'static Tls13CipherSuite,
    key_schedule: KeySchedule,
    transcript: HandshakeHash,
    client_hs_secret: Zeroizing<Vec<u8>>,
    client_app_secret: Zeroizing<Vec<u8>>,
    exporter_secret: Zeroizing<Vec<u8>>,
}

impl State for ExpectFinished {
    fn handle(
        mut self: Box<Self>,
        cx: &mut Context<'_>,
        m: Message,
    ) -> Result<Box<dyn State>, Error> {
        let finished =
            require_handshake_msg!(m, HandshakeType::Finished, HandshakePayload::Finished)?;

        let handshake_hash = self.transcript.get_current_hash();
        let expect_verify_data = self
            .key_schedule
            .finished_verify_data(&self.client_hs_secret, &handshake_hash);

        if expect_verify_data.ct_eq(&finished.0).unwrap_u8() != 1 {
            cx.common.send_fatal_alert(AlertDescription::DecryptError);
            return Err(Error::DecryptError);
        }

        self.transcript.add_message(&m);
        cx.common.check_aligned_handshake()?;

        // The client is bound; move the read side to the application
        // key.
        let backend = cx.common.backend.clone();
        cx.common.record_layer.set_message_decrypter(
            new_message_decrypter(backend.as_ref(), self.suite, &self.client_app_secret)?,
        );

        let resumption_secret = self.key_schedule.derive_secret(
            SecretKind::ResumptionMasterSecret,
            &self.transcript.get_current_hash(),
        );

        cx.common.start_traffic();

        Ok(Box::new(ExpectTraffic {
            backend,
            hash: self.key_schedule.algorithm(),
            exporter_secret: self.exporter_secret,
            resumption_secret,
        }))
    }
}
