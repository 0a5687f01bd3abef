//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Mailmend.
//
// Mailmend is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published  by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mailmend is distributed  in the hope that it will  be useful, but WITHOUT
// ANY WARRANTY; without even the  implied warranty of MERCHANTABILITY or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public License
// for more details.
//
// You should have received a copy of the GNU General Public License along
// with Mailmend. If not, see <http://www.gnu.org/licenses/>.

//! The character-set collaborator used by the parsing engine.
//!
//! Everything `encoding_rs` knows about is delegated to it. Two codecs are
//! implemented by hand: US-ASCII, because `encoding_rs` follows the WHATWG
//! convention of aliasing it to windows-1252 and the engine needs a strict
//! ASCII decode to drive its charset-fallback ladder, and `unknown-8bit`,
//! which preserves round-trip fidelity for text nothing else can decode by
//! mapping high bytes into a private-use range.

use std::borrow::Cow;

/// Outcome of a decode operation.
///
/// `BadlyFormed` input violated the rules of the character set but could
/// still be decoded; `Invalid` input could not be fully decoded and the
/// result contains replacement characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecState {
    Valid,
    BadlyFormed,
    Invalid,
}

/// The result of converting bytes to unicode.
#[derive(Clone, Debug)]
pub struct Decoded {
    pub text: String,
    pub state: CodecState,
    pub error: Option<String>,
}

impl Decoded {
    /// True if the input was perfectly well-formed.
    pub fn wellformed(&self) -> bool {
        CodecState::Valid == self.state
    }

    /// True if the input could at least be decoded, possibly with
    /// complaints.
    pub fn valid(&self) -> bool {
        CodecState::Invalid != self.state
    }
}

/// High bytes decoded by the `unknown-8bit` codec land at this offset, in
/// the BMP private use area, so 0x80..=0xFF maps to U+ED80..=U+EDFF.
pub const UNKNOWN_8BIT_BASE: u32 = 0xED00;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CodecKind {
    Ascii,
    Unknown8Bit,
    Rs(&'static encoding_rs::Encoding),
}

/// A named character codec: `bytes -> unicode` and `unicode -> bytes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Codec {
    kind: CodecKind,
}

impl Codec {
    pub fn ascii() -> Self {
        Codec {
            kind: CodecKind::Ascii,
        }
    }

    pub fn utf8() -> Self {
        Codec {
            kind: CodecKind::Rs(encoding_rs::UTF_8),
        }
    }

    pub fn unknown_8bit() -> Self {
        Codec {
            kind: CodecKind::Unknown8Bit,
        }
    }

    pub fn windows_1252() -> Self {
        Codec {
            kind: CodecKind::Rs(encoding_rs::WINDOWS_1252),
        }
    }

    /// Looks up a codec by its MIME charset label, case-insensitively.
    pub fn by_name(label: &str) -> Option<Codec> {
        let l = label.trim().to_ascii_lowercase();
        if l.is_empty() {
            return None;
        }

        match &*l {
            "us-ascii" | "ascii" | "usascii" | "ansi_x3.4-1968" | "iso646-us"
            | "us" | "646" => Some(Codec::ascii()),
            "unknown-8bit" | "x-unknown" | "unknown" => {
                Some(Codec::unknown_8bit())
            },
            _ => encoding_rs::Encoding::for_label(l.as_bytes())
                .map(|e| Codec { kind: CodecKind::Rs(e) }),
        }
    }

    /// Guesses a codec by statistical inspection of `bytes`.
    ///
    /// ISO-2022-JP goes first because its escape-sequence signature is so
    /// restrictive, and because 2022 strings also pass the ASCII test.
    pub fn by_content(bytes: &[u8]) -> Option<Codec> {
        if bytes.len() >= 3
            && 0x1B == bytes[0]
            && (b'(' == bytes[1] || b'$' == bytes[1])
            && (b'B' == bytes[2] || b'J' == bytes[2] || b'@' == bytes[2])
        {
            let c = Codec {
                kind: CodecKind::Rs(encoding_rs::ISO_2022_JP),
            };
            if c.to_unicode(bytes).wellformed() {
                return Some(c);
            }
        }

        if bytes.iter().all(|&b| b < 0x80) {
            return Some(Codec::ascii());
        }

        if std::str::from_utf8(bytes).is_ok() {
            return Some(Codec::utf8());
        }

        // Every remaining byte sequence decodes under windows-1252, which
        // is also what most mislabelled "latin1" mail actually is.
        Some(Codec::windows_1252())
    }

    /// The canonical name of this codec, suitable for a charset parameter.
    pub fn name(&self) -> &'static str {
        match self.kind {
            CodecKind::Ascii => "US-ASCII",
            CodecKind::Unknown8Bit => "unknown-8bit",
            CodecKind::Rs(e) => e.name(),
        }
    }

    /// Converts `bytes` to unicode, recording how well that went.
    pub fn to_unicode(&self, bytes: &[u8]) -> Decoded {
        match self.kind {
            CodecKind::Ascii => {
                let mut text = String::with_capacity(bytes.len());
                let mut state = CodecState::Valid;
                let mut error = None;
                for (i, &b) in bytes.iter().enumerate() {
                    if b >= 0x80 {
                        text.push('\u{FFFD}');
                        state = CodecState::Invalid;
                        if error.is_none() {
                            error = Some(format!(
                                "Non-ASCII byte 0x{:02X} at offset {}",
                                b, i
                            ));
                        }
                    } else {
                        if b < 0x20
                            && b != b'\t'
                            && b != b'\r'
                            && b != b'\n'
                            && CodecState::Valid == state
                        {
                            state = CodecState::BadlyFormed;
                            error = Some(format!(
                                "Control character 0x{:02X} at offset {}",
                                b, i
                            ));
                        }
                        text.push(b as char);
                    }
                }
                Decoded { text, state, error }
            },

            CodecKind::Unknown8Bit => {
                let text = bytes
                    .iter()
                    .map(|&b| {
                        if b < 0x80 {
                            b as char
                        } else {
                            // Infallible: ED80..EDFF is not a surrogate
                            std::char::from_u32(UNKNOWN_8BIT_BASE + b as u32)
                                .unwrap()
                        }
                    })
                    .collect();
                Decoded {
                    text,
                    state: CodecState::Valid,
                    error: None,
                }
            },

            CodecKind::Rs(e) => {
                let (cow, had_errors) = e.decode_without_bom_handling(bytes);
                let state = if had_errors {
                    CodecState::Invalid
                } else {
                    CodecState::Valid
                };
                Decoded {
                    text: cow.into_owned(),
                    state,
                    error: if had_errors {
                        Some(format!("Input was not valid {}", e.name()))
                    } else {
                        None
                    },
                }
            },
        }
    }

    /// Converts unicode back to bytes. Characters the codec cannot express
    /// degrade rather than fail; this direction is only used to restore
    /// round-trip content, never to validate.
    pub fn from_unicode(&self, text: &str) -> Vec<u8> {
        match self.kind {
            CodecKind::Ascii => text
                .chars()
                .map(|c| if (c as u32) < 0x80 { c as u8 } else { b'?' })
                .collect(),

            CodecKind::Unknown8Bit => {
                let mut out = Vec::with_capacity(text.len());
                for c in text.chars() {
                    let n = c as u32;
                    if n >= UNKNOWN_8BIT_BASE + 0x80
                        && n <= UNKNOWN_8BIT_BASE + 0xFF
                    {
                        out.push((n - UNKNOWN_8BIT_BASE) as u8);
                    } else if n < 0x80 {
                        out.push(n as u8);
                    } else {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(
                            c.encode_utf8(&mut buf).as_bytes(),
                        );
                    }
                }
                out
            },

            CodecKind::Rs(e) => match e.encode(text).0 {
                Cow::Borrowed(b) => b.to_vec(),
                Cow::Owned(v) => v,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ascii_decode_states() {
        let d = Codec::ascii().to_unicode(b"hello");
        assert_eq!("hello", d.text);
        assert_matches!(CodecState::Valid, d.state);

        let d = Codec::ascii().to_unicode(b"hel\x01lo");
        assert_matches!(CodecState::BadlyFormed, d.state);
        assert!(d.valid());

        let d = Codec::ascii().to_unicode(b"hell\xF8");
        assert_matches!(CodecState::Invalid, d.state);
        assert!(!d.valid());
    }

    #[test]
    fn name_lookup() {
        assert_eq!("US-ASCII", Codec::by_name("US-ASCII").unwrap().name());
        assert_eq!("US-ASCII", Codec::by_name("ansi_x3.4-1968").unwrap().name());
        assert_eq!("UTF-8", Codec::by_name("utf-8").unwrap().name());
        assert_eq!(
            "windows-1252",
            Codec::by_name("iso-8859-1").unwrap().name()
        );
        assert!(Codec::by_name("no-such-charset").is_none());
        assert!(Codec::by_name("").is_none());
    }

    #[test]
    fn content_guessing() {
        assert_eq!("US-ASCII", Codec::by_content(b"plain text").unwrap().name());
        assert_eq!(
            "UTF-8",
            Codec::by_content("blåbærsyltetøy".as_bytes()).unwrap().name()
        );
        assert_eq!(
            "windows-1252",
            Codec::by_content(b"bl\xE5b\xE6r").unwrap().name()
        );
    }

    #[test]
    fn unknown_8bit_round_trip() {
        let input: Vec<u8> = (0u8..=255).collect();
        let c = Codec::unknown_8bit();
        let d = c.to_unicode(&input);
        assert!(d.wellformed());
        assert_eq!(input, c.from_unicode(&d.text));
    }

    proptest! {
        #[test]
        fn unknown_8bit_always_round_trips(
            bytes in prop::collection::vec(prop::num::u8::ANY, 0..64)
        ) {
            let c = Codec::unknown_8bit();
            let d = c.to_unicode(&bytes);
            prop_assert_eq!(bytes, c.from_unicode(&d.text));
        }
    }
}
