use crate::backend::{ActiveKeyExchange, CryptoBackend};
use crate::check::inappropriate_handshake_message;
use crate::cipher::{new_message_decrypter, new_message_encrypter};
use crate::conn::{CommonState, ConnectionCommon, Context, Side, State};
use crate::deferred::DeferredVerification;
use crate::hash_hs::{HandshakeHash, HandshakeHashBuffer};
use crate::key_schedule::{self, KeySchedule, SecretKind};
use crate::verify::{construct_tls13_server_verify_message, ServerCertVerifier};
use log::{debug, trace, warn};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tls_core::msgs::base::Payload;
use tls_core::msgs::ccs::ChangeCipherSpecPayload;
use tls_core::msgs::enums::{
    AlertDescription, Compression, ContentType, ExtensionType, HandshakeType, ProtocolVersion,
};
use tls_core::msgs::handshake::{
    ClientExtension, ClientHelloPayload, HandshakeMessagePayload, HandshakePayload, KeyShareEntry,
    Random, ServerExtension, SessionID,
};
use tls_core::msgs::message::{Message, MessagePayload};
use tls_core::suites::{HashAlgorithm, Tls13CipherSuite, ALL_CIPHER_SUITES};
use tls_core::Error;
use zeroize::Zeroizing;

/// A client-side TLS 1.3 session.
///
/// Creating the connection builds and queues the ClientHello; the first
/// [`ConnectionCommon::handshake`] call hands it to the caller.
pub struct ClientConnection {
    inner: ConnectionCommon,
}

impl ClientConnection {
    /// Make a new session, offering `server_name` via SNI when given.
    ///
    /// The backend and verifier are shared, long-lived collaborators;
    /// the session only borrows capability from them.
    pub fn new(
        backend: Arc<dyn CryptoBackend>,
        verifier: Arc<dyn ServerCertVerifier>,
        server_name: Option<&str>,
    ) -> Result<Self, Error> {
        Self::new_with_suites(backend, verifier, server_name, ALL_CIPHER_SUITES.to_vec())
    }

    /// Like [`ClientConnection::new`], but offering only `cipher_suites`.
    pub fn new_with_suites(
        backend: Arc<dyn CryptoBackend>,
        verifier: Arc<dyn ServerCertVerifier>,
        server_name: Option<&str>,
        cipher_suites: Vec<&'static Tls13CipherSuite>,
    ) -> Result<Self, Error> {
        if cipher_suites.is_empty() {
            return Err(Error::General("no cipher suites offered".to_string()));
        }

        let mut common = CommonState::new(Side::Client, backend.clone());
        let state = start_handshake(
            &mut common,
            verifier,
            server_name.map(str::to_string),
            cipher_suites,
        )?;
        Ok(Self {
            inner: ConnectionCommon::new(state, common),
        })
    }
}

impl Deref for ClientConnection {
    type Target = ConnectionCommon;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ClientConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

fn start_handshake(
    common: &mut CommonState,
    verifier: Arc<dyn ServerCertVerifier>,
    server_name: Option<String>,
    cipher_suites: Vec<&'static Tls13CipherSuite>,
) -> Result<Box<dyn State>, Error> {
    let backend = common.backend.clone();

    let mut random = [0u8; 32];
    backend.fill_random(&mut random)?;

    // One pending key exchange per offered group; the winner is
    // completed when ServerHello picks its group, the rest are dropped.
    let mut offered_key_shares = Vec::new();
    for group in backend.supported_kx_groups() {
        offered_key_shares.push(backend.start_kx(*group)?);
    }

    let mut exts = vec![
        ClientExtension::SupportedVersions(vec![ProtocolVersion::TLSv1_3]),
        ClientExtension::NamedGroups(backend.supported_kx_groups().to_vec()),
        ClientExtension::SignatureAlgorithms(verifier.supported_verify_schemes()),
        ClientExtension::KeyShare(
            offered_key_shares
                .iter()
                .map(|kx| KeyShareEntry::new(kx.group(), kx.pub_key()))
                .collect(),
        ),
    ];

    if let Some(name) = &server_name {
        exts.push(ClientExtension::make_sni(name));
    }

    let chp = HandshakeMessagePayload {
        typ: HandshakeType::ClientHello,
        payload: HandshakePayload::ClientHello(ClientHelloPayload {
            client_version: ProtocolVersion::TLSv1_2,
            random: Random(random),
            session_id: SessionID::empty(),
            cipher_suites: cipher_suites.iter().map(|scs| scs.suite()).collect(),
            compression_methods: vec![Compression::Null],
            extensions: exts,
        }),
    };

    let ch = Message {
        // "This value MUST be set to 0x0303 for all records generated
        //  by a TLS 1.3 implementation other than an initial ClientHello"
        version: ProtocolVersion::TLSv1_0,
        payload: MessagePayload::Handshake(chp),
    };

    trace!("Sending ClientHello {:?}", ch);

    // The transcript cannot start until ServerHello fixes the hash, so
    // the serialized hello waits in the buffer.
    let mut transcript_buffer = HandshakeHashBuffer::new();
    transcript_buffer.add_message(&ch);
    common.send_msg(ch, false)?;

    Ok(Box::new(ExpectServerHello {
        verifier,
        server_name,
        transcript_buffer,
        offered_key_shares,
        offered_suites: cipher_suites,
    }))
}

struct ExpectServerHello {
    verifier: Arc<dyn ServerCertVerifier>,
    server_name: Option<String>,
    transcript_buffer: HandshakeHashBuffer,
    offered_key_shares: Vec<Box<dyn ActiveKeyExchange>>,
    offered_suites: Vec<&'static Tls13CipherSuite>,
}

impl State for ExpectServerHello {
    fn handle(
        mut self: Box<Self>,
        cx: &mut Context<'_>,
        m: Message,
    ) -> Result<Box<dyn State>, Error> {
        let server_hello =
            require_handshake_msg!(m, HandshakeType::ServerHello, HandshakePayload::ServerHello)?;
        trace!("We got ServerHello {:?}", server_hello);

        if server_hello.is_hello_retry_request() {
            // This subset never retries: every group we can run was
            // already offered with a key share.
            cx.common
                .send_fatal_alert(AlertDescription::HandshakeFailure);
            return Err(Error::PeerIncompatibleError(
                "server sent HelloRetryRequest".to_string(),
            ));
        }

        if server_hello.get_supported_versions() != Some(ProtocolVersion::TLSv1_3) {
            cx.common
                .send_fatal_alert(AlertDescription::ProtocolVersion);
            return Err(Error::PeerIncompatibleError(
                "server does not support TLS v1.3".to_string(),
            ));
        }

        if server_hello.compression_method != Compression::Null {
            return Err(cx.common.illegal_param("server chose non-Null compression"));
        }

        if server_hello.has_duplicate_extension() {
            cx.common.send_fatal_alert(AlertDescription::DecodeError);
            return Err(Error::PeerMisbehavedError(
                "server sent duplicate extensions".to_string(),
            ));
        }

        let suite = self
            .offered_suites
            .iter()
            .find(|scs| scs.suite() == server_hello.cipher_suite)
            .copied()
            .ok_or_else(|| {
                cx.common
                    .send_fatal_alert(AlertDescription::HandshakeFailure);
                Error::PeerMisbehavedError("server chose non-offered ciphersuite".to_string())
            })?;
        debug!("Using ciphersuite {:?}", suite);
        cx.common.suite = Some(suite);

        let their_key_share = server_hello.get_key_share().ok_or_else(|| {
            cx.common
                .send_fatal_alert(AlertDescription::MissingExtension);
            Error::PeerMisbehavedError("missing key share".to_string())
        })?;

        let our_share_pos = self
            .offered_key_shares
            .iter()
            .position(|kx| kx.group() == their_key_share.group)
            .ok_or_else(|| cx.common.illegal_param("wrong group for key share"))?;
        let our_key_share = self.offered_key_shares.swap_remove(our_share_pos);
        let shared = our_key_share.complete(&their_key_share.payload.0)?;

        // If we change keying when a subsequent handshake message is
        // being joined, the two halves will have different record layer
        // protections.  Disallow this.
        cx.common.check_aligned_handshake()?;

        // Start our handshake hash, and input the client and server
        // hellos.
        let mut transcript = self
            .transcript_buffer
            .start_hash(cx.common.backend.as_ref(), suite.hash_algorithm);
        transcript.add_message(&m);

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
            new_message_encrypter(backend.as_ref(), suite, &client_hs_secret)?,
        );
        cx.common.record_layer.set_message_decrypter(
            new_message_decrypter(backend.as_ref(), suite, &server_hs_secret)?,
        );

        emit_fake_ccs(cx.common)?;

        Ok(Box::new(ExpectEncryptedExtensions {
            verifier: self.verifier,
            server_name: self.server_name,
            suite,
            key_schedule,
            transcript,
            client_hs_secret,
            server_hs_secret,
        }))
    }
}

/// A dummy change_cipher_spec record, for middlebox compatibility
/// (RFC 8446 appendix D.4).
pub(crate) fn emit_fake_ccs(common: &mut CommonState) -> Result<(), Error> {
    let m = Message {
        version: ProtocolVersion::TLSv1_2,
        payload: MessagePayload::ChangeCipherSpec(ChangeCipherSpecPayload),
    };
    common.send_msg(m, false)
}

struct ExpectEncryptedExtensions {
    verifier: Arc<dyn ServerCertVerifier>,
    server_name: Option<String>,
    suite: &'static Tls13CipherSuite,
    key_schedule: KeySchedule,
    transcript: HandshakeHash,
    client_hs_secret: Zeroizing<Vec<u8>>,
    server_hs_secret: Zeroizing<Vec<u8>>,
}

impl State for ExpectEncryptedExtensions {
    fn handle(
        mut self: Box<Self>,
        cx: &mut Context<'_>,
        m: Message,
    ) -> Result<Box<dyn State>, Error> {
        let exts = require_handshake_msg!(
            m,
            HandshakeType::EncryptedExtensions,
            HandshakePayload::EncryptedExtensions
        )?;
        debug!("TLS1.3 encrypted extensions: {:?}", exts);

        validate_encrypted_extensions(cx.common, exts)?;
        self.transcript.add_message(&m);

        Ok(Box::new(ExpectCertificate {
            verifier: self.verifier,
            server_name: self.server_name,
            suite: self.suite,
            key_schedule: self.key_schedule,
            transcript: self.transcript,
            client_hs_secret: self.client_hs_secret,
            server_hs_secret: self.server_hs_secret,
        }))
    }
}

// Extensions a server may only place in ServerHello, never in
// EncryptedExtensions.
static DISALLOWED_ENCRYPTED_EXTS: &[ExtensionType] =
    &[ExtensionType::KeyShare, ExtensionType::SupportedVersions];

fn validate_encrypted_extensions(
    common: &mut CommonState,
    exts: &[ServerExtension],
) -> Result<(), Error> {
    for ext in exts {
        if DISALLOWED_ENCRYPTED_EXTS.contains(&ext.get_type()) {
            common.send_fatal_alert(AlertDescription::UnsupportedExtension);
            return Err(Error::PeerMisbehavedError(
                "server sent inappropriate encrypted extension".to_string(),
            ));
        }
    }

    Ok(())
}

struct ExpectCertificate {
    verifier: Arc<dyn ServerCertVerifier>,
    server_name: Option<String>,
    suite: &'static Tls13CipherSuite,
    key_schedule: KeySchedule,
    transcript: HandshakeHash,
    client_hs_secret: Zeroizing<Vec<u8>>,
    server_hs_secret: Zeroizing<Vec<u8>>,
}

impl State for ExpectCertificate {
    fn handle(
        mut self: Box<Self>,
        cx: &mut Context<'_>,
        m: Message,
    ) -> Result<Box<dyn State>, Error> {
        let cert_chain = require_handshake_msg!(
            m,
            HandshakeType::Certificate,
            HandshakePayload::CertificateTLS13
        )?;

        // This is only non-empty for client auth.
        if !cert_chain.context.0.is_empty() {
            warn!("certificate with non-empty context during handshake");
            cx.common.send_fatal_alert(AlertDescription::DecodeError);
            return Err(Error::CorruptMessagePayload(ContentType::Handshake));
        }

        if cert_chain.any_entry_has_extension() {
            warn!("certificate chain contains unsolicited extension");
            cx.common
                .send_fatal_alert(AlertDescription::UnsupportedExtension);
            return Err(Error::PeerMisbehavedError(
                "bad cert chain extensions".to_string(),
            ));
        }

        let chain = cert_chain.convert();
        let (end_entity, intermediates) =
            chain.split_first().ok_or(Error::NoCertificatesPresented)?;

        trace!("Server cert is {:?}", chain);

        // Judge the chain now; its signature over the transcript is
        // checked when CertificateVerify arrives.
        let verify = match self.verifier.verify_server_cert(
            end_entity,
            intermediates,
            self.server_name.as_deref(),
        ) {
            Ok(verify) => verify,
            Err(e) => return Err(send_cert_error_alert(cx.common, e)),
        };

        self.transcript.add_message(&m);

        Ok(Box::new(ExpectCertificateVerify {
            verifier: self.verifier,
            suite: self.suite,
            key_schedule: self.key_schedule,
            transcript: self.transcript,
            client_hs_secret: self.client_hs_secret,
            server_hs_secret: self.server_hs_secret,
            verify,
        }))
    }
}

fn send_cert_error_alert(common: &mut CommonState, err: Error) -> Error {
    match err {
        Error::InvalidCertificateEncoding => {
            common.send_fatal_alert(AlertDescription::DecodeError);
        }
        Error::PeerMisbehavedError(_) => {
            common.send_fatal_alert(AlertDescription::IllegalParameter);
        }
        _ => {
            common.send_fatal_alert(AlertDescription::BadCertificate);
        }
    }

    err
}

struct ExpectCertificateVerify {
    verifier: Arc<dyn ServerCertVerifier>,
    suite: &'static Tls13CipherSuite,
    key_schedule: KeySchedule,
    transcript: HandshakeHash,
    client_hs_secret: Zeroizing<Vec<u8>>,
    server_hs_secret: Zeroizing<Vec<u8>>,
    verify: DeferredVerification,
}

impl State for ExpectCertificateVerify {
    fn handle(
        mut self: Box<Self>,
        cx: &mut Context<'_>,
        m: Message,
    ) -> Result<Box<dyn State>, Error> {
        let cert_verify = require_handshake_msg!(
            m,
            HandshakeType::CertificateVerify,
            HandshakePayload::CertificateVerify
        )?;

        trace!("Received CertificateVerify {:?}", cert_verify);

        if !self
            .verifier
            .supported_verify_schemes()
            .contains(&cert_verify.scheme)
        {
            return Err(cx.common.illegal_param("server signed with unoffered scheme"));
        }

        // The signature covers the transcript up to and excluding this
        // message.
        let handshake_hash = self.transcript.get_current_hash();
        let message = construct_tls13_server_verify_message(&handshake_hash);
        if let Err(e) = self.verify.run(&message, &cert_verify.sig.0) {
            return Err(send_cert_error_alert(cx.common, e));
        }

        self.transcript.add_message(&m);

        Ok(Box::new(ExpectFinished {
            suite: self.suite,
            key_schedule: self.key_schedule,
            transcript: self.transcript,
            client_hs_secret: self.client_hs_secret,
            server_hs_secret: self.server_hs_secret,
        }))
    }
}

struct ExpectFinished {
    suite: &'static Tls13CipherSuite,
    key_schedule: KeySchedule,
    transcript: HandshakeHash,
    client_hs_secret: Zeroizing<Vec<u8>>,
    server_hs_secret: Zeroizing<Vec<u8>>,
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
            .finished_verify_data(&self.server_hs_secret, &handshake_hash);

        if expect_verify_data.ct_eq(&finished.0).unwrap_u8() != 1 {
            cx.common.send_fatal_alert(AlertDescription::DecryptError);
            return Err(Error::DecryptError);
        }

        self.transcript.add_message(&m);
        cx.common.check_aligned_handshake()?;

        // The server flight is bound; move the schedule to the master
        // secret and take the application-epoch secrets at this
        // transcript point.
        self.key_schedule.input_empty();
        let sf_hash = self.transcript.get_current_hash();
        let client_app_secret = self
            .key_schedule
            .derive_secret(SecretKind::ClientApplicationTrafficSecret, &sf_hash);
        let server_app_secret = self
            .key_schedule
            .derive_secret(SecretKind::ServerApplicationTrafficSecret, &sf_hash);
        let exporter_secret = self
            .key_schedule
            .derive_secret(SecretKind::ExporterMasterSecret, &sf_hash);

        // Our Finished still travels under the handshake keys.
        let verify_data = self
            .key_schedule
            .finished_verify_data(&self.client_hs_secret, &sf_hash);
        emit_finished_tls13(&verify_data, &mut self.transcript, cx.common)?;

        // Now move to our application traffic keys.
        let backend = cx.common.backend.clone();
        cx.common.record_layer.set_message_encrypter(
            new_message_encrypter(backend.as_ref(), self.suite, &client_app_secret)?,
        );
        cx.common.record_layer.set_message_decrypter(
            new_message_decrypter(backend.as_ref(), self.suite, &server_app_secret)?,
        );

        let resumption_secret = self.key_schedule.derive_secret(
            SecretKind::ResumptionMasterSecret,
            &self.transcript.get_current_hash(),
        );

        cx.common.start_traffic();

        // Handshake secrets die here; the drops wipe them.
        Ok(Box::new(ExpectTraffic {
            backend,
            hash: self.key_schedule.algorithm(),
            exporter_secret,
            resumption_secret,
        }))
    }
}

pub(crate) fn emit_finished_tls13(
    verify_data: &[u8],
    transcript: &mut HandshakeHash,
    common: &mut CommonState,
) -> Result<(), Error> {
    let m = Message {
        version: ProtocolVersion::TLSv1_3,
        payload: MessagePayload::Handshake(HandshakeMessagePayload {
            typ: HandshakeType::Finished,
            payload: HandshakePayload::Finished(Payload::new(verify_data.to_vec())),
        }),
    };

    transcript.add_message(&m);
    common.send_msg(m, true)
}

// -- Traffic transit state --
// In this state we can be sent tickets, key updates, and application
// data.
pub(crate) struct ExpectTraffic {
    pub(crate) backend: Arc<dyn CryptoBackend>,
    pub(crate) hash: HashAlgorithm,
    pub(crate) exporter_secret: Zeroizing<Vec<u8>>,
    pub(crate) resumption_secret: Zeroizing<Vec<u8>>,
}

impl State for ExpectTraffic {
    fn handle(
        self: Box<Self>,
        cx: &mut Context<'_>,
        m: Message,
    ) -> Result<Box<dyn State>, Error> {
        match m.payload {
            MessagePayload::ApplicationData(payload) => cx.common.take_received_plaintext(payload),
            MessagePayload::Handshake(HandshakeMessagePayload {
                payload: HandshakePayload::NewSessionTicket(_),
                ..
            }) => {
                // There is no session store; tickets are consumed and
                // forgotten.
                debug!("Ignoring NewSessionTicket");
            }
            MessagePayload::Handshake(HandshakeMessagePayload {
                payload: HandshakePayload::KeyUpdate(_),
                ..
            }) => {
                // Rekeying is outside this subset: refuse rather than
                // silently continue under an unexpected key.
                cx.common.check_aligned_handshake()?;
                cx.common.send_fatal_alert(AlertDescription::InternalError);
                return Err(Error::General(
                    "received unsupported key update request from peer".to_string(),
                ));
            }
            payload => {
                return Err(inappropriate_handshake_message(
                    &payload,
                    &[ContentType::ApplicationData, ContentType::Handshake],
                    &[HandshakeType::NewSessionTicket, HandshakeType::KeyUpdate],
                ));
            }
        }

        Ok(self)
    }

    fn export_keying_material(
        &self,
        output: &mut [u8],
        label: &[u8],
        context: Option<&[u8]>,
    ) -> Result<(), Error> {
        key_schedule::export_keying_material(
            self.backend.as_ref(),
            self.hash,
            &self.exporter_secret,
            output,
            label,
            context,
        )
    }

    fn resumption_secret(&self) -> Option<&[u8]> {
        Some(&self.resumption_secret)
    }
}
