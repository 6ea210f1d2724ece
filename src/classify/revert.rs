//! Decoding of ABI-encoded revert payloads
//!
//! Only the standard `Error(string)` encoding is turned into text. Custom
//! errors, `Panic(uint256)` and anything malformed come back as the raw hex,
//! to be treated as opaque diagnostic text by the caller.

/// Selector of `Error(string)`: keccak256("Error(string)")[..4]
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const WORD: usize = 32;
const SELECTOR_LEN: usize = 4;
/// selector + offset word + length word
const HEADER_LEN: usize = SELECTOR_LEN + 2 * WORD;

pub struct RevertDecoder;

impl RevertDecoder {
    /// Decode a revert payload for display.
    ///
    /// Returns `None` only for an empty payload. A recognized `Error(string)`
    /// yields its message; anything else yields `0x`-prefixed hex of `raw`.
    pub fn decode(raw: &[u8]) -> Option<String> {
        if raw.is_empty() {
            return None;
        }

        Some(Self::decode_error_string(raw).unwrap_or_else(|| format!("0x{}", hex::encode(raw))))
    }

    /// Strict decoding: `Some` only for a well-formed `Error(string)` payload
    pub fn decode_error_string(raw: &[u8]) -> Option<String> {
        if raw.len() < HEADER_LEN || raw[..SELECTOR_LEN] != ERROR_STRING_SELECTOR {
            return None;
        }

        // Length word sits at offset 32 past the selector
        let length_word = &raw[SELECTOR_LEN + WORD..HEADER_LEN];
        let len = word_to_usize(length_word)?;

        let end = HEADER_LEN.checked_add(len)?;
        let message = raw.get(HEADER_LEN..end)?;

        String::from_utf8(message.to_vec()).ok()
    }

    /// Decode hex text (with or without `0x`). Returns the input unchanged
    /// when it is not a decodable `Error(string)` payload.
    pub fn decode_hex(raw: &str) -> String {
        let digits = raw.strip_prefix("0x").unwrap_or(raw);

        hex::decode(digits)
            .ok()
            .and_then(|bytes| Self::decode_error_string(&bytes))
            .unwrap_or_else(|| raw.to_string())
    }
}

/// Big-endian 32-byte word to usize; `None` if it does not fit
fn word_to_usize(word: &[u8]) -> Option<usize> {
    let size = std::mem::size_of::<usize>();
    let (high, low) = word.split_at(word.len().checked_sub(size)?);
    if high.iter().any(|b| *b != 0) {
        return None;
    }

    let mut buf = [0u8; std::mem::size_of::<usize>()];
    buf.copy_from_slice(low);
    Some(usize::from_be_bytes(buf))
}
