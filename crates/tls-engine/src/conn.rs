use crate::backend::CryptoBackend;
use crate::buffer::Buffer;
use crate::record_layer::RecordLayer;
use log::{debug, error, trace, warn};
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use tls_core::msgs::alert::AlertMessagePayload;
use tls_core::msgs::base::Payload;
use tls_core::msgs::codec::Reader;
use tls_core::msgs::enums::{AlertDescription, AlertLevel, ContentType, ProtocolVersion};
use tls_core::msgs::fragmenter::MessageFragmenter;
use tls_core::msgs::hsjoiner::HandshakeJoiner;
use tls_core::msgs::message::{Message, MessageError, MessagePayload, OpaqueMessage, PlainMessage};
use tls_core::suites::Tls13CipherSuite;
use tls_core::Error;

/// How many ChangeCipherSpec messages we accept and drop in TLS1.3
/// handshakes.  RFC 8446 says 1, but implementations (namely the
/// boringssl test suite) get this wrong.  BoringSSL itself accepts up
/// to 32.
static TLS13_MAX_DROPPED_CCS: u8 = 2u8;

/// Whether the handshake needs more driving.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandshakeStatus {
    /// Both directions may carry application data.
    Complete,
    /// More input and/or output exchange is required.
    InProgress,
}

/// What one `handshake` call achieved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandshakeOutcome {
    pub status: HandshakeStatus,
    /// How many input bytes were consumed.  Only whole records are
    /// ever consumed; the caller keeps the rest for the next call.
    pub consumed: usize,
}

impl HandshakeOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == HandshakeStatus::Complete
    }
}

/// One state of the handshake state machine.  Handling a message
/// consumes the current state and yields the next one; per-phase data
/// travels inside the state values themselves.
pub(crate) trait State: Send {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, message: Message)
        -> Result<Box<dyn State>, Error>;

    fn export_keying_material(
        &self,
        _output: &mut [u8],
        _label: &[u8],
        _context: Option<&[u8]>,
    ) -> Result<(), Error> {
        Err(Error::HandshakeNotComplete)
    }

    fn resumption_secret(&self) -> Option<&[u8]> {
        None
    }
}

pub(crate) struct Context<'a> {
    pub(crate) common: &'a mut CommonState,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Side {
    Client,
    Server,
}

/// Connection state common to both client and server sessions.
pub(crate) struct CommonState {
    pub(crate) side: Side,
    pub(crate) backend: Arc<dyn CryptoBackend>,
    pub(crate) record_layer: RecordLayer,
    pub(crate) suite: Option<&'static Tls13CipherSuite>,
    pub(crate) aligned_handshake: bool,
    pub(crate) may_send_application_data: bool,
    pub(crate) may_receive_application_data: bool,
    pub(crate) sent_fatal_alert: bool,
    has_received_close_notify: bool,
    received_middlebox_ccs: u8,
    message_fragmenter: MessageFragmenter,
    received_plaintext: Vec<u8>,
    sendable_tls: Vec<u8>,
}

impl CommonState {
    pub(crate) fn new(side: Side, backend: Arc<dyn CryptoBackend>) -> Self {
        Self {
            side,
            backend,
            record_layer: RecordLayer::new(),
            suite: None,
            aligned_handshake: true,
            may_send_application_data: false,
            may_receive_application_data: false,
            sent_fatal_alert: false,
            has_received_close_notify: false,
            received_middlebox_ccs: 0,
            message_fragmenter: MessageFragmenter::new(),
            received_plaintext: Vec::new(),
            sendable_tls: Vec::new(),
        }
    }

    /// Returns true if the connection is currently performing the TLS
    /// handshake.
    pub(crate) fn is_handshaking(&self) -> bool {
        !(self.may_send_application_data && self.may_receive_application_data)
    }

    // Changing the keys must not span any fragmented handshake
    // messages.  Otherwise the defragmented messages will have
    // been protected with two different record layer protections,
    // which is illegal.  Not mentioned in RFC.
    pub(crate) fn check_aligned_handshake(&mut self) -> Result<(), Error> {
        if !self.aligned_handshake {
            Err(Error::PeerMisbehavedError(
                "key epoch or handshake flight with pending fragment".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub(crate) fn illegal_param(&mut self, why: &str) -> Error {
        Error::PeerMisbehavedError(why.to_string())
    }

    /// Send a raw TLS message, fragmenting it if needed.
    pub(crate) fn send_msg(&mut self, m: Message, must_encrypt: bool) -> Result<(), Error> {
        let mut to_send = VecDeque::new();
        self.message_fragmenter.fragment(m.into(), &mut to_send);
        for mm in to_send {
            if must_encrypt {
                self.send_single_fragment(mm)?;
            } else {
                self.queue_tls_message(mm.into_unencrypted_opaque());
            }
        }
        Ok(())
    }

    /// Encrypt and queue application data, fragmenting as needed.
    pub(crate) fn send_appdata_encrypt(&mut self, payload: &[u8]) -> Result<(), Error> {
        debug_assert!(self.record_layer.is_encrypting());

        let mut plain_messages = VecDeque::new();
        self.message_fragmenter.fragment(
            PlainMessage {
                typ: ContentType::ApplicationData,
                version: ProtocolVersion::TLSv1_2,
                payload: Payload::new(payload.to_vec()),
            },
            &mut plain_messages,
        );

        for m in plain_messages {
            self.send_single_fragment(m)?;
        }

        Ok(())
    }

    fn send_single_fragment(&mut self, m: PlainMessage) -> Result<(), Error> {
        // Refuse to wrap the counter at all costs.
        if self.record_layer.encrypt_exhausted() {
            return Err(Error::EncryptError);
        }

        let em = self.record_layer.encrypt_outgoing(m)?;
        self.queue_tls_message(em);
        Ok(())
    }

    // Put m into sendable_tls for writing.
    fn queue_tls_message(&mut self, m: OpaqueMessage) {
        self.sendable_tls.extend(m.encode());
    }

    /// Move the queued outgoing bytes into the caller's buffer.
    fn flush_output(&mut self, out: &mut Buffer<'_>) -> Result<(), Error> {
        if self.sendable_tls.is_empty() {
            return Ok(());
        }
        out.extend_from_slice(&self.sendable_tls)?;
        self.sendable_tls.clear();
        Ok(())
    }

    pub(crate) fn start_traffic(&mut self) {
        self.may_send_application_data = true;
        self.may_receive_application_data = true;
    }

    pub(crate) fn start_outgoing_traffic(&mut self) {
        self.may_send_application_data = true;
    }

    pub(crate) fn take_received_plaintext(&mut self, bytes: Payload) {
        self.received_plaintext.extend(bytes.0);
    }

    fn process_alert(&mut self, alert: &AlertMessagePayload) -> Result<(), Error> {
        // Reject unknown AlertLevels.
        if let AlertLevel::Unknown(_) = alert.level {
            self.send_fatal_alert(AlertDescription::IllegalParameter);
            return Err(Error::PeerMisbehavedError(
                "unknown alert level".to_string(),
            ));
        }

        // If we get a CloseNotify, make a note to declare EOF to our
        // caller.
        if alert.description == AlertDescription::CloseNotify {
            self.has_received_close_notify = true;
            return Ok(());
        }

        // Warnings are outlawed in TLS1.3 (except, for no good reason,
        // user_cancelled).
        if alert.level == AlertLevel::Warning {
            if alert.description == AlertDescription::UserCanceled {
                warn!("TLS alert warning received: {:?}", alert);
                return Ok(());
            }
            self.send_fatal_alert(AlertDescription::DecodeError);
            return Err(Error::PeerMisbehavedError(
                "unauthorized warning alert".to_string(),
            ));
        }

        error!("TLS alert received: {:?}", alert);
        Err(Error::AlertReceived(alert.description))
    }

    /// Queue a fatal alert describing an error of ours.  Emitting is a
    /// one-shot: once a fatal alert has gone out the session is dead
    /// and nothing further is said.
    pub(crate) fn send_fatal_alert(&mut self, desc: AlertDescription) {
        if self.sent_fatal_alert {
            return;
        }
        warn!("{:?}: sending fatal alert {:?}", self.side, desc);
        let m = Message::build_alert(AlertLevel::Fatal, desc);
        let must_encrypt = self.record_layer.is_encrypting();
        // An encryption failure here cannot be reported any better than
        // by the error already in flight.
        let _ = self.send_msg(m, must_encrypt);
        self.sent_fatal_alert = true;
    }

    fn send_warning_alert_no_log(&mut self, desc: AlertDescription) -> Result<(), Error> {
        let m = Message::build_alert(AlertLevel::Warning, desc);
        let must_encrypt = self.record_layer.is_encrypting();
        self.send_msg(m, must_encrypt)
    }
}

/// Shared driver for client and server sessions.
///
/// The caller supplies bytes received from the peer and drains bytes to
/// transmit; no I/O happens here.  Only whole records are consumed, so
/// a caller can hand over a partial record and retry once more bytes
/// arrive.
pub struct ConnectionCommon {
    state: Result<Box<dyn State>, Error>,
    pub(crate) common: CommonState,
    joiner: HandshakeJoiner,
}

enum ProcessLimit {
    /// Process records until the handshake is complete.
    Handshake,
    /// Process at most one record.
    OneRecord,
}

impl ConnectionCommon {
    pub(crate) fn new(state: Box<dyn State>, common: CommonState) -> Self {
        Self {
            state: Ok(state),
            common,
            joiner: HandshakeJoiner::new(),
        }
    }

    /// Returns true if the connection is currently performing the TLS
    /// handshake.
    pub fn is_handshaking(&self) -> bool {
        self.common.is_handshaking()
    }

    /// Returns true if the peer has sent close_notify.
    pub fn peer_has_closed(&self) -> bool {
        self.common.has_received_close_notify
    }

    /// The cipher suite agreed with the peer, once known.
    pub fn negotiated_cipher_suite(&self) -> Option<&'static Tls13CipherSuite> {
        self.common.suite
    }

    /// Drive the handshake.
    ///
    /// Consumes as many complete handshake records as `input` provides,
    /// appends any records to transmit to `out`, and reports whether
    /// the handshake still needs driving.  Fatal errors park the
    /// session: every later call returns the same error.
    pub fn handshake(
        &mut self,
        out: &mut Buffer<'_>,
        input: &[u8],
    ) -> Result<HandshakeOutcome, Error> {
        if let Err(err) = &self.state {
            let err = err.clone();
            // A queued alert still deserves delivery.
            self.common.flush_output(out)?;
            return Err(err);
        }

        let processed = self.process_new_packets(input, ProcessLimit::Handshake);
        self.common.flush_output(out)?;
        let consumed = processed?;

        let status = if self.is_handshaking() {
            HandshakeStatus::InProgress
        } else {
            HandshakeStatus::Complete
        };
        Ok(HandshakeOutcome { status, consumed })
    }

    /// Decrypt at most one record of application traffic into
    /// `plaintext`, returning the number of input bytes consumed.
    ///
    /// Records that carry no application data (post-handshake
    /// messages, change_cipher_spec compatibility records) are
    /// consumed silently.
    pub fn receive(&mut self, plaintext: &mut Buffer<'_>, input: &[u8]) -> Result<usize, Error> {
        if let Err(err) = &self.state {
            return Err(err.clone());
        }
        if !self.common.may_receive_application_data {
            return Err(Error::HandshakeNotComplete);
        }

        let consumed = self.process_new_packets(input, ProcessLimit::OneRecord)?;
        let drained = mem::take(&mut self.common.received_plaintext);
        plaintext.extend_from_slice(&drained)?;
        Ok(consumed)
    }

    /// Encrypt `data` into `out`, fragmenting into as many records as
    /// needed.  Empty input produces no records.
    pub fn send(&mut self, out: &mut Buffer<'_>, data: &[u8]) -> Result<(), Error> {
        if let Err(err) = &self.state {
            return Err(err.clone());
        }
        if !self.common.may_send_application_data {
            return Err(Error::HandshakeNotComplete);
        }

        if !data.is_empty() {
            self.common.send_appdata_encrypt(data)?;
        }
        self.common.flush_output(out)
    }

    /// Queue a close_notify warning alert.  This informs the peer that
    /// the connection is being closed.
    pub fn send_close_notify(&mut self, out: &mut Buffer<'_>) -> Result<(), Error> {
        debug!("Sending warning alert {:?}", AlertDescription::CloseNotify);
        self.common
            .send_warning_alert_no_log(AlertDescription::CloseNotify)?;
        self.common.flush_output(out)
    }

    /// Derives key material from the agreed connection secrets.
    ///
    /// This function fills in `output` with `output.len()` bytes of key
    /// material derived from the exporter master secret using `label`
    /// and `context` for diversification, per RFC 5705 / RFC 8446
    /// section 7.5.
    ///
    /// This function fails if called prior to the handshake completing;
    /// check with [`ConnectionCommon::is_handshaking`] first.
    pub fn export_keying_material(
        &self,
        output: &mut [u8],
        label: &[u8],
        context: Option<&[u8]>,
    ) -> Result<(), Error> {
        match self.state.as_ref() {
            Ok(st) => st.export_keying_material(output, label, context),
            Err(e) => Err(e.clone()),
        }
    }

    /// The resumption master secret, once the handshake has fully
    /// completed.  There is no ticket machinery here; the secret is
    /// surfaced for hosts that layer their own.
    pub fn resumption_secret(&self) -> Option<&[u8]> {
        match self.state.as_ref() {
            Ok(st) => st.resumption_secret(),
            Err(_) => None,
        }
    }

    /// Read records out of `input`, processing each in turn.  Returns
    /// the number of bytes consumed; only whole, processed records
    /// count.
    fn process_new_packets(
        &mut self,
        input: &[u8],
        limit: ProcessLimit,
    ) -> Result<usize, Error> {
        let mut rd = Reader::init(input);
        let mut consumed = 0;

        loop {
            if let ProcessLimit::Handshake = limit {
                if !self.is_handshaking() {
                    break;
                }
            }

            if !rd.any_left() {
                break;
            }

            let msg = match OpaqueMessage::read(&mut rd) {
                Ok(msg) => msg,
                Err(MessageError::TooShortForHeader) | Err(MessageError::TooShortForLength) => {
                    // An incomplete record: leave it with the caller.
                    break;
                }
                Err(_) => {
                    return Err(self.fatal(Error::CorruptMessage));
                }
            };

            let state = match mem::replace(&mut self.state, Err(Error::HandshakeNotComplete)) {
                Ok(state) => state,
                Err(e) => return Err(e),
            };

            match self.process_msg(msg, state) {
                Ok(new) => self.state = Ok(new),
                Err(e) => {
                    return Err(self.fatal(e));
                }
            }

            consumed = rd.used();

            if let ProcessLimit::OneRecord = limit {
                break;
            }
        }

        Ok(consumed)
    }

    /// Park the session in `err`, queueing the matching fatal alert if
    /// the error is one we alert on.
    fn fatal(&mut self, err: Error) -> Error {
        if let Some(desc) = err.alert_description() {
            self.common.send_fatal_alert(desc);
        }
        self.state = Err(err.clone());
        err
    }

    fn process_msg(
        &mut self,
        msg: OpaqueMessage,
        state: Box<dyn State>,
    ) -> Result<Box<dyn State>, Error> {
        // Unencrypted change_cipher_spec records are middlebox
        // compatibility chaff: swallow them silently wherever they
        // appear, within reason.
        if msg.typ == ContentType::ChangeCipherSpec {
            if !is_valid_ccs(&msg) || self.common.received_middlebox_ccs > TLS13_MAX_DROPPED_CCS {
                return Err(Error::PeerMisbehavedError(
                    "illegal middlebox CCS received".to_string(),
                ));
            }
            self.common.received_middlebox_ccs += 1;
            trace!("Dropping CCS");
            return Ok(state);
        }

        // Decrypt if demanded by current state.
        let msg = if self.common.record_layer.is_decrypting() {
            match self.common.record_layer.decrypt_incoming(msg) {
                Ok(plain) => plain,
                Err(err) => {
                    if let Error::DecryptError = err {
                        self.common.send_fatal_alert(AlertDescription::BadRecordMac);
                    }
                    return Err(err);
                }
            }
        } else {
            msg.into_plain_message()
        };

        // For handshake messages, we need to join them before parsing
        // and processing.
        if self.joiner.want_message(&msg) {
            if self.joiner.take_message(msg).is_none() {
                self.common.send_fatal_alert(AlertDescription::DecodeError);
                return Err(Error::CorruptMessagePayload(ContentType::Handshake));
            }
            return self.process_new_handshake_messages(state);
        }

        // Now we can fully parse the message payload.
        let msg = Message::try_from(msg)?;

        // For alerts, we have separate logic.
        if let MessagePayload::Alert(alert) = &msg.payload {
            self.common.process_alert(alert)?;
            return Ok(state);
        }

        self.process_main_protocol(msg, state)
    }

    fn process_new_handshake_messages(
        &mut self,
        mut state: Box<dyn State>,
    ) -> Result<Box<dyn State>, Error> {
        self.common.aligned_handshake = self.joiner.is_empty();
        while let Some(msg) = self.joiner.frames.pop_front() {
            state = self.process_main_protocol(msg, state)?;
        }

        Ok(state)
    }

    fn process_main_protocol(
        &mut self,
        msg: Message,
        state: Box<dyn State>,
    ) -> Result<Box<dyn State>, Error> {
        let mut cx = Context {
            common: &mut self.common,
        };
        state.handle(&mut cx, msg)
    }
}

fn is_valid_ccs(msg: &OpaqueMessage) -> bool {
    // nb. this is prior to the record layer, so is unencrypted. see
    // third paragraph of section 5 in RFC8446.
    msg.payload.0 == [0x01]
}
