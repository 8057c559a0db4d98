use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Text form of raw signature bytes inside a parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureEncoding {
    UpperHex,
    LowerHex,
    Base64,
}

impl SignatureEncoding {
    pub fn encode(&self, signature: &[u8]) -> String {
        match self {
            SignatureEncoding::UpperHex => hex::encode_upper(signature),
            SignatureEncoding::LowerHex => hex::encode(signature),
            SignatureEncoding::Base64 => STANDARD.encode(signature),
        }
    }

    /// Raw bytes of an encoded signature, or `None` if the text is not in
    /// this encoding. Hex is accepted in either case.
    pub fn decode(&self, text: &str) -> Option<Vec<u8>> {
        let text = text.trim();
        match self {
            SignatureEncoding::UpperHex | SignatureEncoding::LowerHex => hex::decode(text).ok(),
            SignatureEncoding::Base64 => {
                let compact: String = text.split_whitespace().collect();
                STANDARD.decode(compact).ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_case() {
        assert_eq!(SignatureEncoding::UpperHex.encode(&[0xab, 0x01]), "AB01");
        assert_eq!(SignatureEncoding::LowerHex.encode(&[0xab, 0x01]), "ab01");
        assert_eq!(SignatureEncoding::UpperHex.decode("ab01"), Some(vec![0xab, 0x01]));
    }

    #[test]
    fn base64_tolerates_line_breaks() {
        assert_eq!(
            SignatureEncoding::Base64.decode("aGVs\nbG8="),
            Some(b"hello".to_vec())
        );
    }

    #[test]
    fn malformed_text_decodes_to_none() {
        assert_eq!(SignatureEncoding::LowerHex.decode("xyz"), None);
        assert_eq!(SignatureEncoding::Base64.decode("!!!"), None);
    }
}
