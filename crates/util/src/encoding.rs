//! Legacy double-byte text encoding used by provider consoles.
//!
//! Commands are written in GBK; responses are decoded trying GBK, then
//! GB18030, then UTF-8 with replacement characters.

use std::fmt;

use dubbo_invoke_types::InvokeError;
use encoding_rs::{CoderResult, Decoder, GB18030, GBK};
use tracing::warn;

/// Encoding that produced a [`DecodedText`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Gbk,
    Gb18030,
    /// UTF-8 with invalid sequences replaced.
    Utf8Lossy,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gbk => "gbk",
            Self::Gb18030 => "gb18030",
            Self::Utf8Lossy => "utf-8",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: TextEncoding,
}

/// Strict GBK encoding. Characters with no GBK mapping fail the whole string.
pub fn encode_gbk(text: &str) -> Result<Vec<u8>, InvokeError> {
    let (bytes, _, had_unmappable) = GBK.encode(text);
    if had_unmappable {
        let offending = text.chars().find(|ch| {
            let mut buffer = [0u8; 4];
            GBK.encode(ch.encode_utf8(&mut buffer)).2
        });
        return Err(InvokeError::transcoding(match offending {
            Some(ch) => format!("character {ch:?} (U+{:04X}) has no GBK mapping", u32::from(ch)),
            None => "text has no GBK mapping".to_string(),
        }));
    }
    Ok(bytes.into_owned())
}

/// Bytes to write to a provider. Falls back to the UTF-8 bytes when the text
/// cannot be represented in GBK; the failure is logged, never returned.
pub fn encode_for_provider(text: &str) -> Vec<u8> {
    match encode_gbk(text) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(error = %error, "Sending command as UTF-8");
            text.as_bytes().to_vec()
        }
    }
}

/// Decodes response bytes. Never fails.
pub fn decode_response_bytes(bytes: &[u8]) -> DecodedText {
    if let Some(text) = GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        return DecodedText {
            text: text.into_owned(),
            encoding: TextEncoding::Gbk,
        };
    }
    if let Some(text) = GB18030.decode_without_bom_handling_and_without_replacement(bytes) {
        return DecodedText {
            text: text.into_owned(),
            encoding: TextEncoding::Gb18030,
        };
    }
    DecodedText {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: TextEncoding::Utf8Lossy,
    }
}

/// GBK decoder fed one chunk at a time. Multi-byte sequences split across
/// chunks are carried over; undecodable bytes become replacement characters.
pub struct StreamingDecoder {
    decoder: Decoder,
}

impl StreamingDecoder {
    pub fn gbk() -> Self {
        Self {
            decoder: GBK.new_decoder_without_bom_handling(),
        }
    }

    /// Appends the text decoded from `bytes` to `out`.
    pub fn push(&mut self, bytes: &[u8], out: &mut String) {
        let mut remaining = bytes;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(remaining.len())
                .unwrap_or(remaining.len().saturating_mul(3).saturating_add(8));
            out.reserve(needed);
            let (result, read, _) = self.decoder.decode_to_string(remaining, out, false);
            remaining = &remaining[read..];
            if matches!(result, CoderResult::InputEmpty) {
                return;
            }
        }
    }
}

impl fmt::Debug for StreamingDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingDecoder").field("encoding", &self.decoder.encoding().name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_text_round_trips_through_gbk() {
        let command = r#"invoke com.acme.UserService.find("张三")"#;
        let bytes = encode_gbk(command).expect("gbk encodable");
        assert_ne!(bytes, command.as_bytes());
        let decoded = decode_response_bytes(&bytes);
        assert_eq!(decoded.encoding, TextEncoding::Gbk);
        assert_eq!(decoded.text, command);
    }

    #[test]
    fn unmappable_text_falls_back_to_utf8() {
        let command = "invoke a.B.c(\"\u{1F600}\")";
        let error = encode_gbk(command).unwrap_err();
        assert!(matches!(error, InvokeError::TranscodingFailure { .. }));
        assert_eq!(encode_for_provider(command), command.as_bytes());
    }

    #[test]
    fn ascii_decodes_as_gbk() {
        let decoded = decode_response_bytes(b"{\"id\":1}\r\ndubbo>");
        assert_eq!(decoded.text, "{\"id\":1}\r\ndubbo>");
    }

    #[test]
    fn undecodable_bytes_use_lossy_utf8() {
        let decoded = decode_response_bytes(&[0x81, 0x30, 0xFF]);
        assert_eq!(decoded.encoding, TextEncoding::Utf8Lossy);
        assert!(decoded.text.contains('\u{FFFD}'));
    }

    #[test]
    fn streaming_decoder_joins_split_sequences() {
        let (bytes, _, _) = GBK.encode("名字: 张三");
        let mut decoder = StreamingDecoder::gbk();
        let mut text = String::new();
        for chunk in bytes.chunks(3) {
            decoder.push(chunk, &mut text);
        }
        assert_eq!(text, "名字: 张三");
    }
}
