use crate::deferred::DeferredSigner;
use p256::{
    ecdsa::{signature::Signer as _, SigningKey as EcdsaKey},
    pkcs8::DecodePrivateKey,
};
use std::sync::Arc;
use tls_core::key::{Certificate, PrivateKey};
use tls_core::msgs::enums::SignatureScheme;
use tls_core::Error;

/// An abstract signing key.
pub trait SigningKey: Send + Sync {
    /// Choose a `SignatureScheme` from those offered.
    ///
    /// Expresses the choice by returning something that implements `Signer`,
    /// using the chosen scheme.
    fn choose_scheme(&self, offered: &[SignatureScheme]) -> Option<Box<dyn Signer>>;
}

/// A thing that can sign a message.
pub trait Signer: Send + Sync {
    /// Signs `message` using the selected scheme.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Error>;

    /// Reveals which scheme will be used when you call `sign()`.
    fn scheme(&self) -> SignatureScheme;
}

/// A packaged-together certificate chain and matching `SigningKey`.
#[derive(Clone)]
pub struct CertifiedKey {
    /// The certificate chain.
    pub cert: Vec<Certificate>,

    /// The certified key.
    pub key: Arc<dyn SigningKey>,
}

impl CertifiedKey {
    /// Make a new CertifiedKey, with the given chain and key.
    ///
    /// The cert chain must not be empty. The first certificate in the chain
    /// must be the end-entity certificate.
    pub fn new(cert: Vec<Certificate>, key: Arc<dyn SigningKey>) -> Self {
        Self { cert, key }
    }
}

/// What the server's certificate callback hands back: the chain to
/// present and the pending CertificateVerify signing operation.
pub struct ResolvedCert {
    pub chain: Vec<Certificate>,
    pub signer: DeferredSigner,
}

impl std::fmt::Debug for ResolvedCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCert")
            .field("chain", &self.chain)
            .field("signer", &self.signer)
            .finish()
    }
}

/// How the server obtains its certificate chain and signer.
///
/// `server_name` is the SNI value from the ClientHello, when present;
/// `offered_schemes` is the client's signature_algorithms extension.
/// Implementations report an unknown name as
/// [`Error::UnrecognizedServerName`] and a scheme mismatch as
/// [`Error::PeerIncompatibleError`]; the handshake turns those into the
/// `unrecognized_name` and `handshake_failure` alerts.
pub trait ResolvesServerCert: Send + Sync {
    fn resolve(
        &self,
        server_name: Option<&str>,
        offered_schemes: &[SignatureScheme],
    ) -> Result<ResolvedCert, Error>;
}

/// Serves a single certificate chain for every requested name.
pub struct SingleCertResolver(pub CertifiedKey);

impl ResolvesServerCert for SingleCertResolver {
    fn resolve(
        &self,
        _server_name: Option<&str>,
        offered_schemes: &[SignatureScheme],
    ) -> Result<ResolvedCert, Error> {
        let signer = self
            .0
            .key
            .choose_scheme(offered_schemes)
            .ok_or_else(|| {
                Error::PeerIncompatibleError("no overlapping signature scheme".to_string())
            })?;

        let scheme = signer.scheme();
        Ok(ResolvedCert {
            chain: self.0.cert.clone(),
            signer: DeferredSigner::new(scheme, move |message| signer.sign(message)),
        })
    }
}

/// Parse `der` as any supported key encoding/type, returning
/// the first which works.
pub fn any_supported_type(der: &PrivateKey) -> Result<Arc<dyn SigningKey>, Error> {
    any_ecdsa_type(der)
}

/// Parse `der` as any ECDSA key type, returning the first which works.
///
/// Both SEC1 (PEM section starting with 'BEGIN EC PRIVATE KEY') and PKCS8
/// (PEM section starting with 'BEGIN PRIVATE KEY') encodings are supported.
pub fn any_ecdsa_type(der: &PrivateKey) -> Result<Arc<dyn SigningKey>, Error> {
    if let Ok(ecdsa_p256) = EcdsaSigningKey::new(der, SignatureScheme::ECDSA_NISTP256_SHA256) {
        return Ok(Arc::new(ecdsa_p256));
    }

    Err(Error::IncompatibleKey)
}

/// A SigningKey that uses exactly one TLS-level SignatureScheme.
///
/// Currently this is only implemented for ECDSA P-256 keys.
struct EcdsaSigningKey {
    key: Arc<EcdsaKey>,
    scheme: SignatureScheme,
}

impl EcdsaSigningKey {
    /// Make a new `EcdsaSigningKey` from a DER encoding in PKCS#8 or SEC1
    /// format, expecting a key usable with precisely the given signature
    /// scheme.
    fn new(der: &PrivateKey, scheme: SignatureScheme) -> Result<Self, ()> {
        // We only support ECDSA_NISTP256_SHA256
        match scheme {
            SignatureScheme::ECDSA_NISTP256_SHA256 => {}
            _ => return Err(()), // all callers are in this file
        }

        p256::SecretKey::from_pkcs8_der(&der.0)
            .or_else(|_| p256::SecretKey::from_sec1_der(&der.0))
            .map_err(|_| ())
            .map(|kp| Self {
                key: Arc::new(kp.into()),
                scheme,
            })
    }
}

impl SigningKey for EcdsaSigningKey {
    fn choose_scheme(&self, offered: &[SignatureScheme]) -> Option<Box<dyn Signer>> {
        if offered.contains(&self.scheme) {
            Some(Box::new(EcdsaSigner {
                key: Arc::clone(&self.key),
                scheme: self.scheme,
            }))
        } else {
            None
        }
    }
}

struct EcdsaSigner {
    key: Arc<EcdsaKey>,
    scheme: SignatureScheme,
}

impl Signer for EcdsaSigner {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        // TLS carries ECDSA signatures in DER form.
        let sig: p256::ecdsa::Signature = self.key.sign(message);
        Ok(sig.to_der().as_bytes().to_vec())
    }

    fn scheme(&self) -> SignatureScheme {
        self.scheme
    }
}

/// The set of schemes we support for signatures and
/// that are allowed for TLS1.3.
pub fn supported_sign_tls13() -> &'static [SignatureScheme] {
    &[SignatureScheme::ECDSA_NISTP256_SHA256]
}
