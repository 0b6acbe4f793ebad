#![allow(clippy::upper_case_acronyms)]

use crate::msgs::codec::{Codec, Reader};

enum_builder! {
    /// The `ProtocolVersion` TLS protocol enum.  Values in this enum are taken
    /// from the various RFCs covering TLS, and are listed by IANA.
    /// The `Unknown` item is used when processing unrecognised ordinals.
    @U16
    EnumName: ProtocolVersion;
    EnumVal {
        TLSv1_0 => 0x0301,
        TLSv1_1 => 0x0302,
        TLSv1_2 => 0x0303,
        TLSv1_3 => 0x0304
    }
}

enum_builder! {
    /// The `ContentType` TLS protocol enum.
    @U8
    EnumName: ContentType;
    EnumVal {
        ChangeCipherSpec => 0x14,
        Alert => 0x15,
        Handshake => 0x16,
        ApplicationData => 0x17
    }
}

enum_builder! {
    /// The `HandshakeType` TLS protocol enum.
    @U8
    EnumName: HandshakeType;
    EnumVal {
        ClientHello => 0x01,
        ServerHello => 0x02,
        NewSessionTicket => 0x04,
        EndOfEarlyData => 0x05,
        EncryptedExtensions => 0x08,
        Certificate => 0x0b,
        CertificateRequest => 0x0d,
        CertificateVerify => 0x0f,
        Finished => 0x14,
        KeyUpdate => 0x18,
        MessageHash => 0xfe
    }
}

enum_builder! {
    /// The `AlertLevel` TLS protocol enum.
    @U8
    EnumName: AlertLevel;
    EnumVal {
        Warning => 0x01,
        Fatal => 0x02
    }
}

enum_builder! {
    /// The `AlertDescription` TLS protocol enum.
    @U8
    EnumName: AlertDescription;
    EnumVal {
        CloseNotify => 0x00,
        UnexpectedMessage => 0x0a,
        BadRecordMac => 0x14,
        RecordOverflow => 0x16,
        HandshakeFailure => 0x28,
        BadCertificate => 0x2a,
        UnsupportedCertificate => 0x2b,
        CertificateRevoked => 0x2c,
        CertificateExpired => 0x2d,
        CertificateUnknown => 0x2e,
        IllegalParameter => 0x2f,
        UnknownCA => 0x30,
        AccessDenied => 0x31,
        DecodeError => 0x32,
        DecryptError => 0x33,
        ProtocolVersion => 0x46,
        InsufficientSecurity => 0x47,
        InternalError => 0x50,
        InappropriateFallback => 0x56,
        UserCanceled => 0x5a,
        MissingExtension => 0x6d,
        UnsupportedExtension => 0x6e,
        UnrecognisedName => 0x70,
        BadCertificateStatusResponse => 0x71,
        UnknownPSKIdentity => 0x73,
        CertificateRequired => 0x74,
        NoApplicationProtocol => 0x78
    }
}

enum_builder! {
    /// The `CipherSuite` TLS protocol enum.
    @U16
    EnumName: CipherSuite;
    EnumVal {
        TLS13_AES_128_GCM_SHA256 => 0x1301,
        TLS13_AES_256_GCM_SHA384 => 0x1302,
        TLS13_CHACHA20_POLY1305_SHA256 => 0x1303,
        TLS_EMPTY_RENEGOTIATION_INFO_SCSV => 0x00ff
    }
}

enum_builder! {
    /// The `NamedGroup` TLS protocol enum.
    @U16
    EnumName: NamedGroup;
    EnumVal {
        secp256r1 => 0x0017,
        secp384r1 => 0x0018,
        X25519 => 0x001d
    }
}

enum_builder! {
    /// The `SignatureScheme` TLS protocol enum.
    @U16
    EnumName: SignatureScheme;
    EnumVal {
        RSA_PKCS1_SHA256 => 0x0401,
        RSA_PKCS1_SHA384 => 0x0501,
        RSA_PKCS1_SHA512 => 0x0601,
        ECDSA_NISTP256_SHA256 => 0x0403,
        ECDSA_NISTP384_SHA384 => 0x0503,
        ECDSA_NISTP521_SHA512 => 0x0603,
        RSA_PSS_SHA256 => 0x0804,
        RSA_PSS_SHA384 => 0x0805,
        RSA_PSS_SHA512 => 0x0806,
        ED25519 => 0x0807
    }
}

enum_builder! {
    /// The `ExtensionType` TLS protocol enum.
    @U16
    EnumName: ExtensionType;
    EnumVal {
        ServerName => 0x0000,
        SupportedGroups => 0x000a,
        SignatureAlgorithms => 0x000d,
        PreSharedKey => 0x0029,
        EarlyData => 0x002a,
        SupportedVersions => 0x002b,
        Cookie => 0x002c,
        PSKKeyExchangeModes => 0x002d,
        KeyShare => 0x0033
    }
}

enum_builder! {
    /// The `Compression` TLS protocol enum.
    @U8
    EnumName: Compression;
    EnumVal {
        Null => 0x00
    }
}

enum_builder! {
    /// The `ServerNameType` TLS protocol enum.
    @U8
    EnumName: ServerNameType;
    EnumVal {
        HostName => 0x00
    }
}

enum_builder! {
    /// The `KeyUpdateRequest` TLS protocol enum.
    @U8
    EnumName: KeyUpdateRequest;
    EnumVal {
        UpdateNotRequested => 0x00,
        UpdateRequested => 0x01
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_ordinals_survive_round_trips() {
        let ct = ContentType::read_bytes(&[0x63]).unwrap();
        assert_eq!(ct, ContentType::Unknown(0x63));
        assert_eq!(ct.get_encoding(), vec![0x63]);

        let suite = CipherSuite::read_bytes(&[0xc0, 0x2f]).unwrap();
        assert_eq!(suite, CipherSuite::Unknown(0xc02f));
        assert_eq!(suite.get_encoding(), vec![0xc0, 0x2f]);
    }

    #[test]
    fn known_ordinals() {
        assert_eq!(CipherSuite::TLS13_AES_128_GCM_SHA256.get_u16(), 0x1301);
        assert_eq!(NamedGroup::X25519.get_u16(), 0x001d);
        assert_eq!(AlertDescription::BadRecordMac.get_u8(), 20);
        assert_eq!(AlertDescription::UnrecognisedName.get_u8(), 112);
        assert_eq!(HandshakeType::Finished.get_u8(), 20);
    }
}
