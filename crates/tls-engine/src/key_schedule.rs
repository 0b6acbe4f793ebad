//! The TLS 1.3 key schedule (RFC 8446 section 7.1).
//!
//! ```text
//!             0
//!             |
//!             v
//!   PSK ->  HKDF-Extract = Early Secret
//!             |
//!             +-> Derive-Secret(., "derived", "")
//!             v
//!   ECDHE -> HKDF-Extract = Handshake Secret
//!             |
//!             +-> Derive-Secret(., "c hs traffic", CH..SH)
//!             +-> Derive-Secret(., "s hs traffic", CH..SH)
//!             +-> Derive-Secret(., "derived", "")
//!             v
//!     0  ->  HKDF-Extract = Master Secret
//!             |
//!             +-> Derive-Secret(., "c ap traffic", CH..SF)
//!             +-> Derive-Secret(., "s ap traffic", CH..SF)
//!             +-> Derive-Secret(., "exp master",   CH..SF)
//!             +-> Derive-Secret(., "res master",   CH..CF)
//! ```

use crate::backend::CryptoBackend;
use std::sync::Arc;
use tls_core::suites::HashAlgorithm;
use tls_core::Error;
use zeroize::Zeroizing;

/// The kinds of secret we can extract from the current stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SecretKind {
    ClientHandshakeTrafficSecret,
    ServerHandshakeTrafficSecret,
    ClientApplicationTrafficSecret,
    ServerApplicationTrafficSecret,
    ExporterMasterSecret,
    ResumptionMasterSecret,
}

impl SecretKind {
    fn to_bytes(self) -> &'static [u8] {
        use self::SecretKind::*;
        match self {
            ClientHandshakeTrafficSecret => b"c hs traffic",
            ServerHandshakeTrafficSecret => b"s hs traffic",
            ClientApplicationTrafficSecret => b"c ap traffic",
            ServerApplicationTrafficSecret => b"s ap traffic",
            ExporterMasterSecret => b"exp master",
            ResumptionMasterSecret => b"res master",
        }
    }
}

/// The underlying key schedule state machine.  `current` walks through
/// early secret, handshake secret and master secret as key material is
/// fed in; traffic secrets are spun off it at the snapshot points.
pub(crate) struct KeySchedule {
    backend: Arc<dyn CryptoBackend>,
    hash: HashAlgorithm,
    current: Zeroizing<Vec<u8>>,
}

impl KeySchedule {
    /// Begin the schedule at the early secret, with no PSK.
    pub(crate) fn new(backend: Arc<dyn CryptoBackend>, hash: HashAlgorithm) -> Self {
        let zeroes = vec![0u8; hash.digest_size()];
        let current = Zeroizing::new(backend.hkdf_extract(hash, &zeroes, &zeroes));
        Self {
            backend,
            hash,
            current,
        }
    }

    pub(crate) fn algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    /// Advance to the next stage by extracting `secret` over the
    /// "derived" salt of the current one.
    pub(crate) fn input_secret(&mut self, secret: &[u8]) {
        let salt = self.derived_salt();
        self.current = Zeroizing::new(self.backend.hkdf_extract(self.hash, &salt, secret));
    }

    /// Advance to the next stage with an all-zeroes input.
    pub(crate) fn input_empty(&mut self) {
        let zeroes = vec![0u8; self.hash.digest_size()];
        self.input_secret(&zeroes);
    }

    fn derived_salt(&self) -> Zeroizing<Vec<u8>> {
        let empty_hash = self.backend.hash(self.hash).finish();
        let mut salt = Zeroizing::new(vec![0u8; self.hash.digest_size()]);
        hkdf_expand_label(
            self.backend.as_ref(),
            self.hash,
            &self.current,
            b"derived",
            &empty_hash,
            &mut salt,
        )
        .expect("derived salt fits the digest size");
        salt
    }

    /// Derive a traffic-class secret out of the current stage, binding
    /// in the transcript hash `hs_hash`.
    pub(crate) fn derive_secret(&self, kind: SecretKind, hs_hash: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(vec![0u8; self.hash.digest_size()]);
        hkdf_expand_label(
            self.backend.as_ref(),
            self.hash,
            &self.current,
            kind.to_bytes(),
            hs_hash,
            &mut out,
        )
        .expect("traffic secret fits the digest size");
        out
    }

    /// The Finished verify_data for the side owning `traffic_secret`,
    /// over the transcript `hs_hash` (RFC 8446 section 4.4.4).
    pub(crate) fn finished_verify_data(&self, traffic_secret: &[u8], hs_hash: &[u8]) -> Vec<u8> {
        let mut finished_key = Zeroizing::new(vec![0u8; self.hash.digest_size()]);
        hkdf_expand_label(
            self.backend.as_ref(),
            self.hash,
            traffic_secret,
            b"finished",
            &[],
            &mut finished_key,
        )
        .expect("finished key fits the digest size");

        let mut mac = self.backend.hmac(self.hash, &finished_key);
        mac.update(hs_hash);
        mac.finish()
    }
}

/// `HKDF-Expand-Label` (RFC 8446 section 7.1): HKDF-Expand with the
/// `HkdfLabel` info structure, "tls13 "-prefixed.
pub fn hkdf_expand_label(
    backend: &dyn CryptoBackend,
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    const LABEL_PREFIX: &[u8] = b"tls13 ";
    debug_assert!(LABEL_PREFIX.len() + label.len() <= 0xff);
    debug_assert!(context.len() <= 0xff);

    let mut info = Vec::with_capacity(2 + 1 + LABEL_PREFIX.len() + label.len() + 1 + context.len());
    info.extend_from_slice(&(out.len() as u16).to_be_bytes());
    info.push((LABEL_PREFIX.len() + label.len()) as u8);
    info.extend_from_slice(LABEL_PREFIX);
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);

    backend.hkdf_expand(hash, secret, &info, out)
}

/// RFC 8446 section 7.5 exporter, over the exporter master secret.
pub(crate) fn export_keying_material(
    backend: &dyn CryptoBackend,
    hash: HashAlgorithm,
    exporter_secret: &[u8],
    out: &mut [u8],
    label: &[u8],
    context: Option<&[u8]>,
) -> Result<(), Error> {
    if out.len() > 0xffff {
        return Err(Error::General("exporter output too long".to_string()));
    }

    let empty_hash = backend.hash(hash).finish();
    let mut secret = Zeroizing::new(vec![0u8; hash.digest_size()]);
    hkdf_expand_label(backend, hash, exporter_secret, label, &empty_hash, &mut secret)?;

    let mut h = backend.hash(hash);
    h.update(context.unwrap_or(&[]));
    let context_hash = h.finish();

    hkdf_expand_label(backend, hash, &secret, b"exporter", &context_hash, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RustCryptoBackend;
    use hex_literal::hex;

    fn schedule(hash: HashAlgorithm) -> KeySchedule {
        KeySchedule::new(Arc::new(RustCryptoBackend), hash)
    }

    // RFC 8448 section 3, "Simple 1-RTT Handshake".
    const SHARED_SECRET: [u8; 32] =
        hex!("8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d");
    const TRANSCRIPT_CH_SH: [u8; 32] =
        hex!("860c06edc07858ee8e78f0e7428c58edd6b43f2ca3e6e95f02ed063cf0e1cad8");
    const TRANSCRIPT_CH_SF: [u8; 32] =
        hex!("9608102a0f1ccc6db6250b7b7e417b1a000eaada3daae4777a7686c9ff83df13");

    #[test]
    fn rfc8448_early_secret() {
        let ks = schedule(HashAlgorithm::SHA256);
        assert_eq!(
            ks.current.as_slice(),
            hex!("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );
    }

    #[test]
    fn rfc8448_derived_salt() {
        let ks = schedule(HashAlgorithm::SHA256);
        assert_eq!(
            ks.derived_salt().as_slice(),
            hex!("6f2615a108c702c5678f54fc9dbab69716c076189c48250cebeac3576c3611ba")
        );
    }

    #[test]
    fn rfc8448_handshake_and_traffic_secrets() {
        let mut ks = schedule(HashAlgorithm::SHA256);
        ks.input_secret(&SHARED_SECRET);
        assert_eq!(
            ks.current.as_slice(),
            hex!("1dc826e93606aa6fdc0aadc12f741b01046aa6b99f691ed221a9f0ca043fbeac")
        );

        let client = ks.derive_secret(
            SecretKind::ClientHandshakeTrafficSecret,
            &TRANSCRIPT_CH_SH,
        );
        let server = ks.derive_secret(
            SecretKind::ServerHandshakeTrafficSecret,
            &TRANSCRIPT_CH_SH,
        );
        assert_eq!(
            client.as_slice(),
            hex!("b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21")
        );
        assert_eq!(
            server.as_slice(),
            hex!("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38")
        );
    }

    #[test]
    fn rfc8448_master_and_application_secrets() {
        let mut ks = schedule(HashAlgorithm::SHA256);
        ks.input_secret(&SHARED_SECRET);
        ks.input_empty();
        assert_eq!(
            ks.current.as_slice(),
            hex!("18df06843d13a08bf2a449844c5f8a478001bc4d4c627984d5a41da8d0402919")
        );

        let client = ks.derive_secret(
            SecretKind::ClientApplicationTrafficSecret,
            &TRANSCRIPT_CH_SF,
        );
        let server = ks.derive_secret(
            SecretKind::ServerApplicationTrafficSecret,
            &TRANSCRIPT_CH_SF,
        );
        assert_eq!(
            client.as_slice(),
            hex!("9e40646ce79a7f9dc05af8889bce6552875afa0b06df0087f792ebb7c17504a5")
        );
        assert_eq!(
            server.as_slice(),
            hex!("a11af9f05531f856ad47116b45a950328204b4f44bfb6b3a4b4f1f3fcb631643")
        );
    }

    #[test]
    fn rfc8448_client_finished() {
        let mut ks = schedule(HashAlgorithm::SHA256);
        ks.input_secret(&SHARED_SECRET);

        let client_hs = hex!("b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21");
        let verify_data = ks.finished_verify_data(&client_hs, &TRANSCRIPT_CH_SF);
        assert_eq!(
            verify_data,
            hex!("a8ec436d677634ae525ac1fcebe11a039ec17694fac6e98527b642f2edd5ce61")
        );
    }

    #[test]
    fn sha384_lengths() {
        let mut ks = schedule(HashAlgorithm::SHA384);
        assert_eq!(
            ks.current.as_slice(),
            hex!(
                "7ee8206f5570023e6dc7519eb1073bc4e791ad37b5c382aa10ba18e2357e7169"
                "71f9362f2c2fe2a76bfd78dfec4ea9b5"
            )
        );
        assert_eq!(
            ks.derived_salt().as_slice(),
            hex!(
                "1591dac5cbbf0330a4a84de9c753330e92d01f0a88214b4464972fd668049e93"
                "e52f2b16fad922fdc0584478428f282b"
            )
        );

        ks.input_secret(&[0xab; 48]);
        let secret = ks.derive_secret(SecretKind::ServerHandshakeTrafficSecret, &[0xcd; 48]);
        assert_eq!(secret.len(), 48);

        let vd = ks.finished_verify_data(&secret, &[0xef; 48]);
        assert_eq!(vd.len(), 48);
    }

    #[test]
    fn exporter_is_deterministic_and_context_sensitive() {
        let backend = RustCryptoBackend;
        let exporter_secret = [0x42u8; 32];

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        let mut c = [0u8; 32];
        export_keying_material(
            &backend,
            HashAlgorithm::SHA256,
            &exporter_secret,
            &mut a,
            b"EXPORTER-test",
            None,
        )
        .unwrap();
        export_keying_material(
            &backend,
            HashAlgorithm::SHA256,
            &exporter_secret,
            &mut b,
            b"EXPORTER-test",
            Some(&[]),
        )
        .unwrap();
        export_keying_material(
            &backend,
            HashAlgorithm::SHA256,
            &exporter_secret,
            &mut c,
            b"EXPORTER-test",
            Some(b"ctx"),
        )
        .unwrap();

        // RFC 8446: no context and empty context agree.
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
