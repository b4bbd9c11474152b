//! Secret key codec: detection, decoding, and re-encoding of 64-byte
//! secrets across the four textual formats users paste in.
//!
//! Detection is first-match-wins in a fixed order (Base58, Base64, Hex,
//! decimal array). Each attempt is independent and non-panicking; a shape
//! match alone is never enough: every decode path re-verifies the 64-byte
//! output, since e.g. a Base58 string of length 87–88 may decode to a
//! different byte count.

use base64::Engine;
use zeroize::Zeroize;

use crate::core::domain::SecretKeyMaterial;
use crate::core::errors::WalletError;

/// The textual encodings a pasted secret key can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    Base58,
    Base64,
    Hex,
    DecimalArray,
}

impl KeyEncoding {
    /// Stable lowercase tag used in diagnostics and user messaging.
    pub fn tag(&self) -> &'static str {
        match self {
            KeyEncoding::Base58 => "base58",
            KeyEncoding::Base64 => "base64",
            KeyEncoding::Hex => "hex",
            KeyEncoding::DecimalArray => "array",
        }
    }
}

impl std::fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Detect the encoding of `text` and decode it to 64 bytes.
///
/// # Errors
/// `WalletError::InvalidKeyFormat` when no detector accepts the input,
/// carrying one rejection note per format (tags and lengths only; the
/// input itself is never included or logged).
pub fn detect_and_decode(text: &str) -> Result<(SecretKeyMaterial, KeyEncoding), WalletError> {
    let trimmed = text.trim();
    let mut notes = Vec::with_capacity(4);

    for encoding in [
        KeyEncoding::Base58,
        KeyEncoding::Base64,
        KeyEncoding::Hex,
        KeyEncoding::DecimalArray,
    ] {
        let attempt = match encoding {
            KeyEncoding::Base58 => try_base58(trimmed),
            KeyEncoding::Base64 => try_base64(trimmed),
            KeyEncoding::Hex => try_hex(trimmed),
            KeyEncoding::DecimalArray => try_decimal_array(trimmed),
        };
        match attempt {
            Ok(mut bytes) => {
                let material = SecretKeyMaterial::try_from_slice(&bytes);
                bytes.zeroize();
                // Detectors only hand back 64-byte buffers, so this cannot
                // fail, but the length contract is enforced in one place.
                return material.map(|m| (m, encoding));
            }
            Err(note) => notes.push(format!("{}: {}", encoding.tag(), note)),
        }
    }

    Err(WalletError::InvalidKeyFormat { notes })
}

/// Re-encode 64-byte material in the requested format.
pub fn encode(material: &SecretKeyMaterial, encoding: KeyEncoding) -> String {
    material.with_secret(|bytes| match encoding {
        KeyEncoding::Base58 => bs58::encode(bytes).into_string(),
        KeyEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
        KeyEncoding::Hex => hex::encode(bytes),
        KeyEncoding::DecimalArray => {
            let nums: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
            format!("[{}]", nums.join(","))
        }
    })
}

/// Export representations of a secret: Base58 for humans, a JSON array of
/// 64 integers for programmatic consumers. Both decode back to the
/// identical bytes.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub base58: String,
    pub json_array: String,
}

pub fn export_bundle(material: &SecretKeyMaterial) -> ExportBundle {
    ExportBundle {
        base58: encode(material, KeyEncoding::Base58),
        json_array: encode(material, KeyEncoding::DecimalArray),
    }
}

fn try_base58(text: &str) -> Result<Vec<u8>, String> {
    if !(87..=88).contains(&text.len()) {
        return Err(format!("length {} not in 87..=88", text.len()));
    }
    let bytes = bs58::decode(text)
        .into_vec()
        .map_err(|_| "invalid base58 alphabet".to_string())?;
    expect_64(bytes)
}

fn try_base64(text: &str) -> Result<Vec<u8>, String> {
    if text.len() != 88 {
        return Err(format!("length {} != 88", text.len()));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|_| "invalid base64".to_string())?;
    expect_64(bytes)
}

fn try_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.len() != 128 {
        return Err(format!("length {} != 128 hex chars", digits.len()));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("non-hex characters".to_string());
    }
    // 128 hex chars decode to 64 bytes by construction.
    hex::decode(digits).map_err(|_| "invalid hex".to_string())
}

fn try_decimal_array(text: &str) -> Result<Vec<u8>, String> {
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| "not bracket-delimited".to_string())?;

    let mut bytes = Vec::with_capacity(64);
    for part in inner.split(',') {
        let byte: u8 = part
            .trim()
            .parse()
            .map_err(|_| "entries must be integers in 0..=255".to_string())?;
        bytes.push(byte);
    }
    if bytes.len() != 64 {
        let n = bytes.len();
        bytes.zeroize();
        return Err(format!("{} entries, expected 64", n));
    }
    Ok(bytes)
}

fn expect_64(mut bytes: Vec<u8>) -> Result<Vec<u8>, String> {
    if bytes.len() != 64 {
        let n = bytes.len();
        bytes.zeroize();
        return Err(format!("decoded to {} bytes, expected 64", n));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_material() -> SecretKeyMaterial {
        let mut bytes = [0u8; 64];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        SecretKeyMaterial::new(bytes)
    }

    #[test]
    fn test_roundtrip_all_encodings() {
        let material = sample_material();
        for encoding in [
            KeyEncoding::Base58,
            KeyEncoding::Base64,
            KeyEncoding::Hex,
            KeyEncoding::DecimalArray,
        ] {
            let text = encode(&material, encoding);
            let (decoded, detected) = detect_and_decode(&text).unwrap();
            assert_eq!(detected, encoding, "detected wrong encoding for {}", encoding);
            assert_eq!(decoded.as_bytes(), material.as_bytes());
        }
    }

    #[test]
    fn test_detects_decimal_array_with_spaces() {
        let material = sample_material();
        let spaced = material.with_secret(|bytes| {
            let nums: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
            format!("[ {} ]", nums.join(", "))
        });
        let (decoded, encoding) = detect_and_decode(&spaced).unwrap();
        assert_eq!(encoding, KeyEncoding::DecimalArray);
        assert_eq!(decoded.as_bytes(), material.as_bytes());
    }

    #[test]
    fn test_hex_with_0x_prefix() {
        let material = sample_material();
        let text = format!("0x{}", encode(&material, KeyEncoding::Hex));
        let (decoded, encoding) = detect_and_decode(&text).unwrap();
        assert_eq!(encoding, KeyEncoding::Hex);
        assert_eq!(decoded.as_bytes(), material.as_bytes());
    }

    #[test]
    fn test_input_is_trimmed() {
        let material = sample_material();
        let text = format!("  {}\n", encode(&material, KeyEncoding::Base58));
        assert!(detect_and_decode(&text).is_ok());
    }

    #[test]
    fn test_base58_precedence_at_length_88() {
        // A Base64 encoding of 64 bytes is 88 chars; when it contains
        // characters outside the Base58 alphabet ('+', '/', '=', '0', ...)
        // the Base58 detector rejects it and detection falls through.
        let bytes = [0xFBu8; 64];
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        assert_eq!(b64.len(), 88);
        let (decoded, encoding) = detect_and_decode(&b64).unwrap();
        assert_eq!(encoding, KeyEncoding::Base64);
        assert_eq!(&decoded.as_bytes()[..], &bytes[..]);
    }

    #[test]
    fn test_base58_wins_when_both_shapes_valid() {
        // Base58 output of a 64-byte buffer sits in 87..=88 chars and is
        // attempted first; if its decode yields 64 bytes it wins even when
        // the string is also alphabet-valid Base64.
        let material = sample_material();
        let b58 = encode(&material, KeyEncoding::Base58);
        let (_, encoding) = detect_and_decode(&b58).unwrap();
        assert_eq!(encoding, KeyEncoding::Base58);
    }

    #[test]
    fn test_unrecognized_input_reports_all_formats() {
        // 90 chars, not valid in any detector.
        let junk = "!".repeat(90);
        let err = detect_and_decode(&junk).unwrap_err();
        match err {
            WalletError::InvalidKeyFormat { notes } => {
                assert_eq!(notes.len(), 4);
                assert!(notes.iter().any(|n| n.starts_with("base58:")));
                assert!(notes.iter().any(|n| n.starts_with("base64:")));
                assert!(notes.iter().any(|n| n.starts_with("hex:")));
                assert!(notes.iter().any(|n| n.starts_with("array:")));
                // Diagnostics never echo the input.
                assert!(notes.iter().all(|n| !n.contains('!')));
            }
            other => panic!("expected InvalidKeyFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_array_wrong_count_rejected() {
        let short = format!(
            "[{}]",
            (0..63).map(|i| i.to_string()).collect::<Vec<_>>().join(",")
        );
        assert!(detect_and_decode(&short).is_err());

        let long = format!(
            "[{}]",
            (0..65).map(|i| (i % 256).to_string()).collect::<Vec<_>>().join(",")
        );
        assert!(detect_and_decode(&long).is_err());
    }

    #[test]
    fn test_array_out_of_range_entry_rejected() {
        let mut nums: Vec<String> = (0..64).map(|i| i.to_string()).collect();
        nums[10] = "256".to_string();
        let text = format!("[{}]", nums.join(","));
        assert!(detect_and_decode(&text).is_err());

        nums[10] = "-1".to_string();
        let text = format!("[{}]", nums.join(","));
        assert!(detect_and_decode(&text).is_err());
    }

    #[test]
    fn test_hex_wrong_length_rejected() {
        let text = "ab".repeat(63); // 126 chars
        assert!(detect_and_decode(&text).is_err());
    }

    #[test]
    fn test_export_bundle_both_decode_to_same_bytes() {
        let material = sample_material();
        let bundle = export_bundle(&material);

        let from_b58 = bs58::decode(&bundle.base58).into_vec().unwrap();
        let from_json: Vec<u8> = serde_json::from_str(&bundle.json_array).unwrap();
        assert_eq!(from_b58, from_json);
        assert_eq!(&from_b58[..], &material.as_bytes()[..]);
    }
}
