use crate::msgs::enums::{AlertDescription, ContentType, HandshakeType};
use std::{error::Error as StdError, fmt};

/// The engine reports protocol errors using this type.
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// We received a TLS message that isn't valid right now.
    /// `expect_types` lists the message types we can expect right now.
    /// `got_type` is the type we found.  This error is typically
    /// caused by a buggy TLS stack (the peer or this one), a broken
    /// network, or an attack.
    InappropriateMessage {
        /// Which types we expected
        expect_types: Vec<ContentType>,
        /// What type we received
        got_type: ContentType,
    },

    /// We received a TLS handshake message that isn't valid right now.
    /// `expect_types` lists the handshake message types we can expect
    /// right now.  `got_type` is the type we found.
    InappropriateHandshakeMessage {
        /// Which handshake type we expected
        expect_types: Vec<HandshakeType>,
        /// What handshake type we received
        got_type: HandshakeType,
    },

    /// We couldn't decrypt a message.  This is invariably fatal.
    DecryptError,

    /// We couldn't encrypt a message.  This covers the case where the
    /// sequence space of the current key is exhausted: the record layer
    /// refuses to wrap the counter.
    EncryptError,

    /// The peer sent us a syntactically incorrect TLS message.
    CorruptMessage,

    /// The peer sent us a TLS message with invalid contents.
    CorruptMessagePayload(ContentType),

    /// The peer didn't give us any certificates.
    NoCertificatesPresented,

    /// The peer doesn't support a protocol version/feature we require.
    /// The parameter gives a hint as to what version/feature it is.
    PeerIncompatibleError(String),

    /// The peer deviated from the standard TLS protocol.
    /// The parameter gives a hint where.
    PeerMisbehavedError(String),

    /// We received a fatal alert.  This means the peer is unhappy.
    AlertReceived(AlertDescription),

    /// We received an invalidly encoded certificate from the peer.
    InvalidCertificateEncoding,

    /// We received a certificate with an invalid signature.
    InvalidCertificateSignature,

    /// The host has no certificate usable for the name the client asked for.
    UnrecognizedServerName,

    /// The configured private key cannot be used with the configured
    /// certificate or any offered signature scheme.
    IncompatibleKey,

    /// A buffer could not be grown.
    OutOfMemory,

    /// A catch-all error for unlikely errors.
    General(String),

    /// We failed to acquire random bytes from the system.
    FailedToGetRandomBytes,

    /// This function doesn't work until the TLS handshake
    /// is complete.
    HandshakeNotComplete,

    /// The peer sent an oversized record/fragment.
    PeerSentOversizedRecord,

    /// The peer sent a protected record whose inner plaintext was
    /// empty or all padding, leaving no content type to recover.
    PeerSentBadInnerPlaintext,
}

/// Numeric encodings for [`Error::code`].
///
/// The error space is a single 32-bit integer: the upper bits select a
/// class, and for the alert classes the low byte is the TLS alert code.
pub mod codes {
    /// An alert generated by this side.
    pub const CLASS_SELF_ALERT: u32 = 0x0000;
    /// An alert received from the peer.
    pub const CLASS_PEER_ALERT: u32 = 0x0100;
    /// An error internal to the library or host.
    pub const CLASS_INTERNAL: u32 = 0x0200;

    pub const NO_MEMORY: u32 = CLASS_INTERNAL + 1;
    /// Not an error: the handshake needs more I/O.  Surfaced in the API
    /// as `HandshakeStatus::InProgress`, never as an `Error`.
    pub const HANDSHAKE_IN_PROGRESS: u32 = CLASS_INTERNAL + 2;
    pub const LIBRARY: u32 = CLASS_INTERNAL + 3;
    pub const INCOMPATIBLE_KEY: u32 = CLASS_INTERNAL + 4;

    /// Extract the class bits of an error code.
    pub fn class_of(code: u32) -> u32 {
        code & !0xff
    }
}

impl Error {
    /// The fatal alert this error is reported to the peer as, when it is
    /// one we generate.  `None` for peer alerts and internal errors.
    pub fn alert_description(&self) -> Option<AlertDescription> {
        use AlertDescription::*;
        let desc = match self {
            Self::InappropriateMessage { .. }
            | Self::InappropriateHandshakeMessage { .. }
            | Self::PeerSentBadInnerPlaintext => UnexpectedMessage,
            Self::CorruptMessage | Self::CorruptMessagePayload(_) => DecodeError,
            Self::DecryptError => BadRecordMac,
            Self::PeerSentOversizedRecord => RecordOverflow,
            Self::PeerIncompatibleError(_) => HandshakeFailure,
            Self::PeerMisbehavedError(_) => IllegalParameter,
            Self::NoCertificatesPresented => CertificateRequired,
            Self::InvalidCertificateEncoding => DecodeError,
            Self::InvalidCertificateSignature => BadCertificate,
            Self::UnrecognizedServerName => UnrecognisedName,
            _ => return None,
        };
        Some(desc)
    }

    /// The single-integer encoding of this error.
    pub fn code(&self) -> u32 {
        if let Self::AlertReceived(desc) = self {
            return codes::CLASS_PEER_ALERT + u32::from(desc.get_u8());
        }

        if let Some(desc) = self.alert_description() {
            return codes::CLASS_SELF_ALERT + u32::from(desc.get_u8());
        }

        match self {
            Self::OutOfMemory => codes::NO_MEMORY,
            Self::IncompatibleKey => codes::INCOMPATIBLE_KEY,
            _ => codes::LIBRARY,
        }
    }
}

fn join<T: fmt::Debug>(items: &[T]) -> String {
    items
        .iter()
        .map(|x| format!("{:?}", x))
        .collect::<Vec<String>>()
        .join(" or ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InappropriateMessage {
                ref expect_types,
                ref got_type,
            } => write!(
                f,
                "received unexpected message: got {:?} when expecting {}",
                got_type,
                join::<ContentType>(expect_types)
            ),
            Error::InappropriateHandshakeMessage {
                ref expect_types,
                ref got_type,
            } => write!(
                f,
                "received unexpected handshake message: got {:?} when expecting {}",
                got_type,
                join::<HandshakeType>(expect_types)
            ),
            Error::CorruptMessagePayload(ref typ) => {
                write!(f, "received corrupt message of type {:?}", typ)
            }
            Error::PeerIncompatibleError(ref why) => write!(f, "peer is incompatible: {}", why),
            Error::PeerMisbehavedError(ref why) => write!(f, "peer misbehaved: {}", why),
            Error::AlertReceived(ref alert) => write!(f, "received fatal alert: {:?}", alert),
            Error::CorruptMessage => write!(f, "received corrupt message"),
            Error::NoCertificatesPresented => write!(f, "peer sent no certificates"),
            Error::DecryptError => write!(f, "cannot decrypt peer's message"),
            Error::EncryptError => write!(f, "cannot encrypt message"),
            Error::InvalidCertificateEncoding => write!(f, "invalid peer certificate encoding"),
            Error::InvalidCertificateSignature => write!(f, "invalid peer certificate signature"),
            Error::UnrecognizedServerName => write!(f, "no certificate for the requested name"),
            Error::IncompatibleKey => write!(f, "private key unusable here"),
            Error::OutOfMemory => write!(f, "buffer allocation failed"),
            Error::PeerSentOversizedRecord => write!(f, "peer sent excess record size"),
            Error::PeerSentBadInnerPlaintext => {
                write!(f, "peer sent a record with empty inner plaintext")
            }
            Error::HandshakeNotComplete => write!(f, "handshake not complete"),
            Error::FailedToGetRandomBytes => write!(f, "failed to get random bytes"),
            Error::General(ref err) => write!(f, "unexpected error: {}", err),
        }
    }
}

impl StdError for Error {}
