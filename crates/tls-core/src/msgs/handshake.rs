use crate::key::Certificate;
use crate::msgs::base::{Payload, PayloadU16, PayloadU8};
use crate::msgs::codec::{self, Codec, Reader};
use crate::msgs::enums::{
    CipherSuite, Compression, ExtensionType, HandshakeType, NamedGroup, ProtocolVersion,
    ServerNameType, SignatureScheme,
};
use std::collections::HashSet;
use std::fmt;

/// The 32-byte nonce carried in ClientHello and ServerHello.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Random(pub [u8; 32]);

/// The ServerHello.random value a server uses to signal a
/// HelloRetryRequest (RFC 8446 section 4.1.3).
pub static HELLO_RETRY_REQUEST_RANDOM: Random = Random([
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8,
    0x91, 0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8,
    0x33, 0x9c,
]);

impl Codec for Random {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let bytes = r.take(32)?;
        let mut opaque = [0; 32];
        opaque.clone_from_slice(bytes);
        Some(Self(opaque))
    }
}

impl From<[u8; 32]> for Random {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// The legacy session id.  TLS 1.3 gives it no meaning; we only ever
/// send it empty or echo the client's value.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct SessionID {
    len: usize,
    data: [u8; 32],
}

impl SessionID {
    pub fn empty() -> Self {
        Self {
            len: 0,
            data: [0; 32],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Codec for SessionID {
    fn encode(&self, bytes: &mut Vec<u8>) {
        debug_assert!(self.len <= 32);
        bytes.push(self.len as u8);
        bytes.extend_from_slice(&self.data[..self.len]);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let len = usize::from(u8::read(r)?);
        if len > 32 {
            return None;
        }

        let bytes = r.take(len)?;
        let mut out = [0u8; 32];
        out[..len].clone_from_slice(&bytes[..len]);

        Some(Self { data: out, len })
    }
}

impl fmt::Debug for SessionID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.data[..self.len] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnknownExtension {
    pub typ: ExtensionType,
    pub payload: Payload,
}

impl UnknownExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.payload.encode(bytes);
    }

    fn read(typ: ExtensionType, r: &mut Reader) -> Self {
        let payload = Payload::read_raw(r);
        Self { typ, payload }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub payload: PayloadU16,
}

impl KeyShareEntry {
    pub fn new(group: NamedGroup, payload: &[u8]) -> Self {
        Self {
            group,
            payload: PayloadU16::new(payload.to_vec()),
        }
    }
}

impl Codec for KeyShareEntry {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.group.encode(bytes);
        self.payload.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let group = NamedGroup::read(r)?;
        let payload = PayloadU16::read(r)?;
        Some(Self { group, payload })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServerNamePayload {
    HostName(String),
    Unknown(Payload),
}

impl ServerNamePayload {
    fn read_hostname(r: &mut Reader) -> Option<Self> {
        let raw = PayloadU16::read(r)?;
        let name = String::from_utf8(raw.0).ok()?;
        if name.is_empty() || name.contains('\0') {
            return None;
        }
        Some(Self::HostName(name))
    }

    fn encode(&self, bytes: &mut Vec<u8>) {
        match *self {
            Self::HostName(ref name) => {
                PayloadU16::encode_slice(name.as_bytes(), bytes);
            }
            Self::Unknown(ref r) => r.encode(bytes),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerName {
    pub typ: ServerNameType,
    pub payload: ServerNamePayload,
}

impl Codec for ServerName {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        self.payload.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = ServerNameType::read(r)?;

        let payload = match typ {
            ServerNameType::HostName => ServerNamePayload::read_hostname(r)?,
            _ => ServerNamePayload::Unknown(Payload::read_raw(r)),
        };

        Some(Self { typ, payload })
    }
}

pub trait ConvertServerNameList {
    fn get_single_hostname(&self) -> Option<&str>;
}

impl ConvertServerNameList for [ServerName] {
    /// RFC 6066: "The ServerNameList MUST NOT contain more than
    /// one name of the same name_type."
    fn get_single_hostname(&self) -> Option<&str> {
        self.iter().find_map(|name| {
            if let ServerNamePayload::HostName(ref host) = name.payload {
                Some(host.as_str())
            } else {
                None
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientExtension {
    SupportedVersions(Vec<ProtocolVersion>),
    NamedGroups(Vec<NamedGroup>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    KeyShare(Vec<KeyShareEntry>),
    ServerName(Vec<ServerName>),
    Unknown(UnknownExtension),
}

impl ClientExtension {
    pub fn get_type(&self) -> ExtensionType {
        match *self {
            Self::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Self::NamedGroups(_) => ExtensionType::SupportedGroups,
            Self::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Self::KeyShare(_) => ExtensionType::KeyShare,
            Self::ServerName(_) => ExtensionType::ServerName,
            Self::Unknown(ref r) => r.typ,
        }
    }

    /// Make a basic SNI extension quoting `hostname`.
    pub fn make_sni(hostname: &str) -> Self {
        let name = ServerName {
            typ: ServerNameType::HostName,
            payload: ServerNamePayload::HostName(hostname.to_string()),
        };

        Self::ServerName(vec![name])
    }
}

impl Codec for ClientExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.get_type().encode(bytes);

        let mut sub: Vec<u8> = Vec::new();
        match *self {
            Self::SupportedVersions(ref r) => codec::encode_vec_u8(&mut sub, r),
            Self::NamedGroups(ref r) => codec::encode_vec_u16(&mut sub, r),
            Self::SignatureAlgorithms(ref r) => codec::encode_vec_u16(&mut sub, r),
            Self::KeyShare(ref r) => codec::encode_vec_u16(&mut sub, r),
            Self::ServerName(ref r) => codec::encode_vec_u16(&mut sub, r),
            Self::Unknown(ref r) => r.encode(&mut sub),
        }

        (sub.len() as u16).encode(bytes);
        bytes.append(&mut sub);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = ExtensionType::read(r)?;
        let len = usize::from(u16::read(r)?);
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::SupportedVersions => {
                Self::SupportedVersions(codec::read_vec_u8(&mut sub)?)
            }
            ExtensionType::SupportedGroups => Self::NamedGroups(codec::read_vec_u16(&mut sub)?),
            ExtensionType::SignatureAlgorithms => {
                Self::SignatureAlgorithms(codec::read_vec_u16(&mut sub)?)
            }
            ExtensionType::KeyShare => Self::KeyShare(codec::read_vec_u16(&mut sub)?),
            ExtensionType::ServerName => Self::ServerName(codec::read_vec_u16(&mut sub)?),
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        if sub.any_left() {
            None
        } else {
            Some(ext)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServerExtension {
    KeyShare(KeyShareEntry),
    SupportedVersions(ProtocolVersion),
    ServerNameAck,
    Unknown(UnknownExtension),
}

impl ServerExtension {
    pub fn get_type(&self) -> ExtensionType {
        match *self {
            Self::KeyShare(_) => ExtensionType::KeyShare,
            Self::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Self::ServerNameAck => ExtensionType::ServerName,
            Self::Unknown(ref r) => r.typ,
        }
    }
}

impl Codec for ServerExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.get_type().encode(bytes);

        let mut sub: Vec<u8> = Vec::new();
        match *self {
            Self::KeyShare(ref r) => r.encode(&mut sub),
            Self::SupportedVersions(ref r) => r.encode(&mut sub),
            Self::ServerNameAck => {}
            Self::Unknown(ref r) => r.encode(&mut sub),
        }

        (sub.len() as u16).encode(bytes);
        bytes.append(&mut sub);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = ExtensionType::read(r)?;
        let len = usize::from(u16::read(r)?);
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::KeyShare => Self::KeyShare(KeyShareEntry::read(&mut sub)?),
            ExtensionType::SupportedVersions => {
                Self::SupportedVersions(ProtocolVersion::read(&mut sub)?)
            }
            ExtensionType::ServerName => Self::ServerNameAck,
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        if sub.any_left() {
            None
        } else {
            Some(ext)
        }
    }
}

fn has_duplicates<I: IntoIterator<Item = ExtensionType>>(iter: I) -> bool {
    let mut seen = HashSet::new();
    for typ in iter {
        if !seen.insert(typ.get_u16()) {
            return true;
        }
    }
    false
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientHelloPayload {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionID,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<Compression>,
    pub extensions: Vec<ClientExtension>,
}

impl Codec for ClientHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.client_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        codec::encode_vec_u16(bytes, &self.cipher_suites);
        codec::encode_vec_u8(bytes, &self.compression_methods);

        if !self.extensions.is_empty() {
            codec::encode_vec_u16(bytes, &self.extensions);
        }
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let mut ret = Self {
            client_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionID::read(r)?,
            cipher_suites: codec::read_vec_u16(r)?,
            compression_methods: codec::read_vec_u8(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = codec::read_vec_u16(r)?;
        }

        if r.any_left() || ret.extensions.is_empty() {
            None
        } else {
            Some(ret)
        }
    }
}

impl ClientHelloPayload {
    pub fn has_duplicate_extension(&self) -> bool {
        has_duplicates(self.extensions.iter().map(|ext| ext.get_type()))
    }

    pub fn find_extension(&self, ext: ExtensionType) -> Option<&ClientExtension> {
        self.extensions.iter().find(|x| x.get_type() == ext)
    }

    pub fn get_sni_extension(&self) -> Option<&[ServerName]> {
        let ext = self.find_extension(ExtensionType::ServerName)?;
        match *ext {
            ClientExtension::ServerName(ref req) => Some(req),
            _ => None,
        }
    }

    pub fn get_sigalgs_extension(&self) -> Option<&[SignatureScheme]> {
        let ext = self.find_extension(ExtensionType::SignatureAlgorithms)?;
        match *ext {
            ClientExtension::SignatureAlgorithms(ref req) => Some(req),
            _ => None,
        }
    }

    pub fn get_namedgroups_extension(&self) -> Option<&[NamedGroup]> {
        let ext = self.find_extension(ExtensionType::SupportedGroups)?;
        match *ext {
            ClientExtension::NamedGroups(ref req) => Some(req),
            _ => None,
        }
    }

    pub fn get_keyshare_extension(&self) -> Option<&[KeyShareEntry]> {
        let ext = self.find_extension(ExtensionType::KeyShare)?;
        match *ext {
            ClientExtension::KeyShare(ref shares) => Some(shares),
            _ => None,
        }
    }

    pub fn get_versions_extension(&self) -> Option<&[ProtocolVersion]> {
        let ext = self.find_extension(ExtensionType::SupportedVersions)?;
        match *ext {
            ClientExtension::SupportedVersions(ref vers) => Some(vers),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerHelloPayload {
    pub legacy_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionID,
    pub cipher_suite: CipherSuite,
    pub compression_method: Compression,
    pub extensions: Vec<ServerExtension>,
}

impl Codec for ServerHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.legacy_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        self.compression_method.encode(bytes);

        if !self.extensions.is_empty() {
            codec::encode_vec_u16(bytes, &self.extensions);
        }
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let mut ret = Self {
            legacy_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionID::read(r)?,
            cipher_suite: CipherSuite::read(r)?,
            compression_method: Compression::read(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = codec::read_vec_u16(r)?;
        }

        if r.any_left() {
            None
        } else {
            Some(ret)
        }
    }
}

impl ServerHelloPayload {
    pub fn has_duplicate_extension(&self) -> bool {
        has_duplicates(self.extensions.iter().map(|ext| ext.get_type()))
    }

    pub fn find_extension(&self, ext: ExtensionType) -> Option<&ServerExtension> {
        self.extensions.iter().find(|x| x.get_type() == ext)
    }

    pub fn get_key_share(&self) -> Option<&KeyShareEntry> {
        let ext = self.find_extension(ExtensionType::KeyShare)?;
        match *ext {
            ServerExtension::KeyShare(ref share) => Some(share),
            _ => None,
        }
    }

    pub fn get_supported_versions(&self) -> Option<ProtocolVersion> {
        let ext = self.find_extension(ExtensionType::SupportedVersions)?;
        match *ext {
            ServerExtension::SupportedVersions(vers) => Some(vers),
            _ => None,
        }
    }

    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CertificateEntry {
    pub cert: Certificate,
    pub exts: Vec<UnknownCertExtension>,
}

impl CertificateEntry {
    pub fn new(cert: Certificate) -> Self {
        Self {
            cert,
            exts: Vec::new(),
        }
    }
}

impl Codec for CertificateEntry {
    fn encode(&self, bytes: &mut Vec<u8>) {
        debug_assert!(self.cert.0.len() <= 0xff_ffff);
        codec::u24(self.cert.0.len() as u32).encode(bytes);
        bytes.extend_from_slice(&self.cert.0);
        codec::encode_vec_u16(bytes, &self.exts);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let len = usize::from(codec::u24::read(r)?);
        let cert = Certificate(r.take(len)?.to_vec());
        let exts = codec::read_vec_u16(r)?;
        Some(Self { cert, exts })
    }
}

/// Certificate entry extensions are never produced by this
/// implementation; received ones are retained opaquely so the
/// handshake layer can reject unsolicited ones.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownCertExtension {
    pub typ: ExtensionType,
    pub payload: PayloadU16,
}

impl Codec for UnknownCertExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        self.payload.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = ExtensionType::read(r)?;
        let payload = PayloadU16::read(r)?;
        Some(Self { typ, payload })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CertificatePayloadTLS13 {
    pub context: PayloadU8,
    pub entries: Vec<CertificateEntry>,
}

impl CertificatePayloadTLS13 {
    pub fn new(chain: &[Certificate]) -> Self {
        Self {
            context: PayloadU8::empty(),
            entries: chain.iter().cloned().map(CertificateEntry::new).collect(),
        }
    }

    pub fn any_entry_has_extension(&self) -> bool {
        self.entries.iter().any(|ent| !ent.exts.is_empty())
    }

    pub fn convert(&self) -> Vec<Certificate> {
        self.entries.iter().map(|ent| ent.cert.clone()).collect()
    }
}

impl Codec for CertificatePayloadTLS13 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.context.encode(bytes);
        codec::encode_vec_u24(bytes, &self.entries);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let context = PayloadU8::read(r)?;
        let entries = codec::read_vec_u24(r)?;
        Some(Self { context, entries })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DigitallySignedStruct {
    pub scheme: SignatureScheme,
    pub sig: PayloadU16,
}

impl DigitallySignedStruct {
    pub fn new(scheme: SignatureScheme, sig: Vec<u8>) -> Self {
        Self {
            scheme,
            sig: PayloadU16::new(sig),
        }
    }
}

impl Codec for DigitallySignedStruct {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.scheme.encode(bytes);
        self.sig.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let scheme = SignatureScheme::read(r)?;
        let sig = PayloadU16::read(r)?;
        Some(Self { scheme, sig })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HandshakePayload {
    ClientHello(ClientHelloPayload),
    ServerHello(ServerHelloPayload),
    EncryptedExtensions(Vec<ServerExtension>),
    CertificateTLS13(CertificatePayloadTLS13),
    CertificateVerify(DigitallySignedStruct),
    Finished(Payload),
    NewSessionTicket(Payload),
    KeyUpdate(crate::msgs::enums::KeyUpdateRequest),
    Unknown(Payload),
}

impl HandshakePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        use self::HandshakePayload::*;
        match *self {
            ClientHello(ref x) => x.encode(bytes),
            ServerHello(ref x) => x.encode(bytes),
            EncryptedExtensions(ref x) => codec::encode_vec_u16(bytes, x),
            CertificateTLS13(ref x) => x.encode(bytes),
            CertificateVerify(ref x) => x.encode(bytes),
            Finished(ref x) => x.encode(bytes),
            NewSessionTicket(ref x) => x.encode(bytes),
            KeyUpdate(ref x) => x.encode(bytes),
            Unknown(ref x) => x.encode(bytes),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandshakeMessagePayload {
    pub typ: HandshakeType,
    pub payload: HandshakePayload,
}

impl Codec for HandshakeMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);

        let mut sub: Vec<u8> = Vec::new();
        self.payload.encode(&mut sub);
        codec::u24(sub.len() as u32).encode(bytes);
        bytes.append(&mut sub);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = HandshakeType::read(r)?;
        let len = usize::from(codec::u24::read(r)?);
        let mut sub = r.sub(len)?;

        let payload = match typ {
            HandshakeType::ClientHello => {
                HandshakePayload::ClientHello(ClientHelloPayload::read(&mut sub)?)
            }
            HandshakeType::ServerHello => {
                HandshakePayload::ServerHello(ServerHelloPayload::read(&mut sub)?)
            }
            HandshakeType::EncryptedExtensions => {
                HandshakePayload::EncryptedExtensions(codec::read_vec_u16(&mut sub)?)
            }
            HandshakeType::Certificate => {
                HandshakePayload::CertificateTLS13(CertificatePayloadTLS13::read(&mut sub)?)
            }
            HandshakeType::CertificateVerify => {
                HandshakePayload::CertificateVerify(DigitallySignedStruct::read(&mut sub)?)
            }
            HandshakeType::Finished => HandshakePayload::Finished(Payload::read_raw(&mut sub)),
            HandshakeType::NewSessionTicket => {
                HandshakePayload::NewSessionTicket(Payload::read_raw(&mut sub))
            }
            HandshakeType::KeyUpdate => {
                HandshakePayload::KeyUpdate(crate::msgs::enums::KeyUpdateRequest::read(&mut sub)?)
            }
            _ => HandshakePayload::Unknown(Payload::read_raw(&mut sub)),
        };

        if sub.any_left() {
            None
        } else {
            Some(Self { typ, payload })
        }
    }
}
