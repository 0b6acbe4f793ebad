use tls_core::msgs::enums::{ContentType, HandshakeType};
use tls_core::msgs::message::MessagePayload;
use tls_core::Error;

/// For a Message $m, and a HandshakePayload enum member $payload_type,
/// return Ok(payload) if $m is both a handshake message and one that
/// is of the given $payload_type.
macro_rules! require_handshake_msg(
    ( $m:expr, $handshake_type:path, $payload_type:path ) => (
        match $m.payload {
            tls_core::msgs::message::MessagePayload::Handshake(
                tls_core::msgs::handshake::HandshakeMessagePayload {
                    payload: $payload_type(ref hsp),
                    ..
                }) => Ok(hsp),
            _ => Err($crate::check::inappropriate_handshake_message(
                &$m.payload,
                &[tls_core::msgs::enums::ContentType::Handshake],
                &[$handshake_type]))
        }
    )
);

/// A model of the error reported when a message of unexpected
/// content type arrives.
pub(crate) fn inappropriate_message(
    payload: &MessagePayload,
    content_types: &[ContentType],
) -> Error {
    Error::InappropriateMessage {
        expect_types: content_types.to_vec(),
        got_type: payload.content_type(),
    }
}

/// A model of the error reported when a handshake message of
/// unexpected type arrives.
pub(crate) fn inappropriate_handshake_message(
    payload: &MessagePayload,
    content_types: &[ContentType],
    handshake_types: &[HandshakeType],
) -> Error {
    match payload {
        MessagePayload::Handshake(hsp) => Error::InappropriateHandshakeMessage {
            expect_types: handshake_types.to_vec(),
            got_type: hsp.typ,
        },
        payload => inappropriate_message(payload, content_types),
    }
}
