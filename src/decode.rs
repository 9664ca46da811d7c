//! Decoding of raw child-process output lines.
//!
//! Child processes write in whatever encoding they please; a single stream can mix
//! UTF-8 tool output with legacy-codepage messages from the shell. Lines are decoded
//! against a fixed ordered list of encodings and the first clean decode wins, with
//! ISO-8859-1 as the terminal step. ISO-8859-1 maps every byte, so decoding is total
//! and a malformed line can never take down an output pump.

use encoding_rs::{Encoding, GBK, WINDOWS_1252};

/// Fallible encodings probed in order before the ISO-8859-1 fallback.
const ENCODINGS: [&Encoding; 2] = [GBK, WINDOWS_1252];

/// Decodes one raw output line into displayable text.
///
/// Trailing `\n` / `\r\n` is stripped; line termination belongs to the log writer.
pub fn decode_line(raw: &[u8]) -> String {
    let raw = trim_newline(raw);
    if let Ok(text) = std::str::from_utf8(raw) {
        return text.to_string();
    }
    for encoding in ENCODINGS {
        let (text, _, had_errors) = encoding.decode(raw);
        if !had_errors {
            return text.into_owned();
        }
    }
    encoding_rs::mem::decode_latin1(raw).into_owned()
}

fn trim_newline(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(decode_line("hello world\n".as_bytes()), "hello world");
        assert_eq!(decode_line("状态正常\r\n".as_bytes()), "状态正常");
    }

    #[test]
    fn gbk_is_recovered() {
        // "你好" in GBK.
        let raw = [0xc4, 0xe3, 0xba, 0xc3, b'\n'];
        assert_eq!(decode_line(&raw), "你好");
    }

    #[test]
    fn windows_1252_is_recovered() {
        // 0x80 is the euro sign in windows-1252 and an invalid GBK lead byte.
        let raw = [b'p', b'r', b'i', b'c', b'e', b' ', 0x80, b'\n'];
        assert_eq!(decode_line(&raw), "price €");
    }

    #[test]
    fn arbitrary_bytes_never_fail() {
        let raw: Vec<u8> = (0u8..=255).rev().collect();
        let text = decode_line(&raw);
        assert_eq!(text.chars().count(), 256);
    }

    #[test]
    fn empty_line_decodes_to_empty() {
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b""), "");
    }
}
