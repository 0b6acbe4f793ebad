use crate::msgs::enums::CipherSuite;
use std::fmt;

/// A hash algorithm usable as a TLS 1.3 transcript and HKDF hash.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HashAlgorithm {
    SHA256,
    SHA384,
}

impl HashAlgorithm {
    /// Length of the digest in bytes.
    pub fn digest_size(&self) -> usize {
        match self {
            Self::SHA256 => 32,
            Self::SHA384 => 48,
        }
    }

    /// Internal block size, as used by the HMAC construction.
    pub fn block_size(&self) -> usize {
        match self {
            Self::SHA256 => 64,
            Self::SHA384 => 128,
        }
    }
}

/// An AEAD algorithm usable for TLS 1.3 record protection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AeadAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    pub fn key_len(&self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    /// The static IV length.  All supported algorithms take the
    /// 12-byte nonce of RFC 5116.
    pub fn iv_len(&self) -> usize {
        12
    }

    pub fn tag_len(&self) -> usize {
        16
    }
}

/// Common state for cipher suites.
pub struct CipherSuiteCommon {
    /// The TLS enumeration naming this cipher suite.
    pub suite: CipherSuite,
    /// Which AEAD algorithm is used for record protection.
    pub aead_algorithm: AeadAlgorithm,
}

/// A TLS 1.3 cipher suite supported by this library.
pub struct Tls13CipherSuite {
    /// Common cipher suite fields.
    pub common: CipherSuiteCommon,
    /// The hash used by the transcript and the key schedule.
    pub hash_algorithm: HashAlgorithm,
}

impl Tls13CipherSuite {
    /// The TLS id of this suite.
    pub fn suite(&self) -> CipherSuite {
        self.common.suite
    }
}

impl PartialEq for Tls13CipherSuite {
    fn eq(&self, other: &Self) -> bool {
        self.common.suite == other.common.suite
    }
}

impl fmt::Debug for Tls13CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls13CipherSuite")
            .field("suite", &self.common.suite)
            .field("algorithm", &self.common.aead_algorithm)
            .finish()
    }
}

/// The TLS1.3 ciphersuite TLS_AES_128_GCM_SHA256.
pub static TLS13_AES_128_GCM_SHA256: Tls13CipherSuite = Tls13CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
        aead_algorithm: AeadAlgorithm::Aes128Gcm,
    },
    hash_algorithm: HashAlgorithm::SHA256,
};

/// The TLS1.3 ciphersuite TLS_AES_256_GCM_SHA384.
pub static TLS13_AES_256_GCM_SHA384: Tls13CipherSuite = Tls13CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS13_AES_256_GCM_SHA384,
        aead_algorithm: AeadAlgorithm::Aes256Gcm,
    },
    hash_algorithm: HashAlgorithm::SHA384,
};

/// The TLS1.3 ciphersuite TLS_CHACHA20_POLY1305_SHA256.
pub static TLS13_CHACHA20_POLY1305_SHA256: Tls13CipherSuite = Tls13CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
        aead_algorithm: AeadAlgorithm::ChaCha20Poly1305,
    },
    hash_algorithm: HashAlgorithm::SHA256,
};

/// A list of all the cipher suites supported by this library, in
/// preference order.
pub static ALL_CIPHER_SUITES: [&Tls13CipherSuite; 3] = [
    &TLS13_AES_128_GCM_SHA256,
    &TLS13_AES_256_GCM_SHA384,
    &TLS13_CHACHA20_POLY1305_SHA256,
];

/// Look up a supported cipher suite by its TLS id.
pub fn lookup_suite(suite: CipherSuite) -> Option<&'static Tls13CipherSuite> {
    ALL_CIPHER_SUITES
        .iter()
        .find(|scs| scs.suite() == suite)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        assert_eq!(
            lookup_suite(CipherSuite::TLS13_AES_256_GCM_SHA384),
            Some(&TLS13_AES_256_GCM_SHA384)
        );
        assert!(lookup_suite(CipherSuite::Unknown(0x1304)).is_none());
    }

    #[test]
    fn suite_parameters() {
        assert_eq!(TLS13_AES_128_GCM_SHA256.common.aead_algorithm.key_len(), 16);
        assert_eq!(TLS13_AES_256_GCM_SHA384.common.aead_algorithm.key_len(), 32);
        assert_eq!(TLS13_AES_256_GCM_SHA384.hash_algorithm.digest_size(), 48);
        assert_eq!(TLS13_CHACHA20_POLY1305_SHA256.common.aead_algorithm.iv_len(), 12);
        assert_eq!(HashAlgorithm::SHA384.block_size(), 128);
    }
}
