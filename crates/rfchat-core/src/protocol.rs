//! Wire protocol constants and the line codec

use uuid::Uuid;

use crate::errors::SessionError;

// ----------------------------------------------------------------------------
// Service Identifier
// ----------------------------------------------------------------------------

/// Service identifier both roles rendezvous on
///
/// Server listeners and client connects must use this value bit-for-bit,
/// otherwise unmodified peers will refuse the connection.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x8ce255c0_200a_11e0_ac64_0800200c9a66);

/// Service record name advertised alongside [`SERVICE_UUID`]
pub const DEFAULT_SERVICE_NAME: &str = "BluetoothChat";

// ----------------------------------------------------------------------------
// Line Framing
// ----------------------------------------------------------------------------

/// Terminator appended to every outgoing message
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default upper bound for one encoded message, terminator excluded
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4096;

/// Encode one message as a wire line
///
/// Embedded newlines cannot be represented on the wire and are rejected
/// instead of being split into several messages.
pub fn encode_line(text: &str, max_len: usize) -> Result<Vec<u8>, SessionError> {
    if text.as_bytes().contains(&LINE_TERMINATOR) {
        return Err(SessionError::EmbeddedNewline);
    }
    if text.len() > max_len {
        return Err(SessionError::MessageTooLarge {
            size: text.len(),
            max_size: max_len,
        });
    }

    let mut line = Vec::with_capacity(text.len() + 1);
    line.extend_from_slice(text.as_bytes());
    line.push(LINE_TERMINATOR);
    Ok(line)
}

/// Decode one wire line, stripping a single trailing terminator
///
/// Malformed UTF-8 is replaced rather than rejected so a noisy peer cannot
/// stall the receive loop.
pub fn decode_line(line: &[u8]) -> String {
    let body = line.strip_suffix(&[LINE_TERMINATOR]).unwrap_or(line);
    String::from_utf8_lossy(body).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_service_uuid_matches_wire_value() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "8ce255c0-200a-11e0-ac64-0800200c9a66"
        );
    }

    #[test]
    fn test_encode_appends_single_terminator() {
        assert_eq!(encode_line("hello", 64).unwrap(), b"hello\n".to_vec());
        assert_eq!(encode_line("", 64).unwrap(), b"\n".to_vec());
    }

    #[test]
    fn test_encode_rejects_embedded_newline() {
        assert_eq!(
            encode_line("two\nlines", 64),
            Err(SessionError::EmbeddedNewline)
        );
    }

    #[test]
    fn test_encode_rejects_oversize() {
        assert_eq!(
            encode_line("abcdef", 4),
            Err(SessionError::MessageTooLarge {
                size: 6,
                max_size: 4
            })
        );
    }

    #[test]
    fn test_decode_strips_only_one_terminator() {
        assert_eq!(decode_line(b"salut\n"), "salut");
        assert_eq!(decode_line(b"no terminator"), "no terminator");
        assert_eq!(decode_line(b"carriage\r\n"), "carriage\r");
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        assert_eq!(decode_line(&[0x61, 0xff, b'\n']), "a\u{fffd}");
    }

    proptest! {
        #[test]
        fn prop_line_survives_framing(text in "[^\n]{0,256}") {
            let encoded = encode_line(&text, 4096).unwrap();
            prop_assert_eq!(encoded.iter().filter(|b| **b == LINE_TERMINATOR).count(), 1);
            prop_assert_eq!(decode_line(&encoded), text);
        }
    }
}
