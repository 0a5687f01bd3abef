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

//! Content-Transfer-Encoding decoding.
//!
//! All decoders are tolerant of garbage: stray bytes outside the encoding
//! alphabet are skipped, truncated trailing groups are dropped, and nothing
//! here ever fails. A message whose transfer encoding is damaged still
//! yields its decodable prefix.

use super::quoted_printable::qp_decode;

/// The transfer encodings the engine distinguishes.
///
/// 7bit, 8bit and binary are all identity encodings and are not told apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferEncoding {
    Binary,
    QuotedPrintable,
    Base64,
    Uuencode,
}

impl Default for TransferEncoding {
    fn default() -> Self {
        TransferEncoding::Binary
    }
}

/// Decodes `body` according to `encoding`.
pub fn decode(encoding: TransferEncoding, body: &[u8]) -> Vec<u8> {
    match encoding {
        TransferEncoding::Binary => body.to_vec(),
        TransferEncoding::QuotedPrintable => qp_decode(body),
        TransferEncoding::Base64 => base64_decode(body),
        TransferEncoding::Uuencode => uu_decode(body),
    }
}

/// Base64-decodes `body`, skipping anything outside the base64 alphabet and
/// dropping an incomplete trailing quantum.
pub fn base64_decode(body: &[u8]) -> Vec<u8> {
    let filtered: Vec<u8> = body
        .iter()
        .copied()
        .filter(|&b| {
            b.is_ascii_alphanumeric() || b'+' == b || b'/' == b || b'=' == b
        })
        .collect();

    let usable_length = filtered.len() / 4 * 4;
    let mut out = Vec::with_capacity(usable_length / 4 * 3);
    let _ = base64::decode_config_buf(
        &filtered[..usable_length],
        base64::STANDARD,
        &mut out,
    );
    out
}

/// Decodes the historical uuencode format.
///
/// `begin`/`end` framing lines are optional and skipped when present.
/// The backquote counts as an encoded zero, per common practice.
pub fn uu_decode(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();

    for line in body.split(|&b| b'\n' == b) {
        let line = match line.last() {
            Some(&b'\r') => &line[..line.len() - 1],
            _ => line,
        };
        if line.is_empty()
            || line.starts_with(b"begin ")
            || line.starts_with(b"begin\t")
            || b"end" == line
        {
            continue;
        }

        let want = uu_6bit(line[0]) as usize;
        if 0 == want {
            continue;
        }

        let mut acc: u32 = 0;
        let mut nbits = 0;
        let mut produced = 0;
        for &c in &line[1..] {
            if c < b' ' || c > b'`' {
                continue;
            }
            acc = (acc << 6) | uu_6bit(c) as u32;
            nbits += 6;
            if nbits >= 8 {
                nbits -= 8;
                if produced < want {
                    out.push((acc >> nbits) as u8);
                    produced += 1;
                }
            }
        }
    }

    out
}

fn uu_6bit(c: u8) -> u8 {
    if b'`' == c {
        0
    } else {
        c.wrapping_sub(b' ') & 0x3F
    }
}

/// Canonicalizes line endings: every bare CR or bare LF becomes CRLF.
pub fn crlf(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        match s[i] {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                i += 1;
                if i < s.len() && b'\n' == s[i] {
                    i += 1;
                }
            },
            b'\n' => {
                out.extend_from_slice(b"\r\n");
                i += 1;
            },
            b => {
                out.push(b);
                i += 1;
            },
        }
    }
    out
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn base64_tolerates_wrapping_and_garbage() {
        assert_eq!(
            b"hello world".to_vec(),
            base64_decode(b"aGVsbG8g\r\nd29y\n bGQ=\r\n")
        );
        assert_eq!(b"hello".to_vec(), base64_decode(b"aGV sbG8="));
        // incomplete trailing quantum is dropped
        assert_eq!(b"hel".to_vec(), base64_decode(b"aGVsbG"));
    }

    #[test]
    fn uu_round_trip_known_vector() {
        let encoded = b"begin 644 cat.txt\n#0V%T\n`\nend\n";
        assert_eq!(b"Cat".to_vec(), uu_decode(encoded));

        let encoded = b"/5&AE('%U:6-K(&)R;W=N\n";
        assert_eq!(b"The quick brown".to_vec(), uu_decode(encoded));
    }

    #[test]
    fn crlf_canonicalization() {
        assert_eq!(b"a\r\nb\r\n".to_vec(), crlf(b"a\nb\n"));
        assert_eq!(b"a\r\nb\r\n".to_vec(), crlf(b"a\rb\r"));
        assert_eq!(b"a\r\nb\r\n".to_vec(), crlf(b"a\r\nb\r\n"));
        assert_eq!(b"a\r\n\r\nb".to_vec(), crlf(b"a\n\rb"));
    }

    proptest! {
        #[test]
        fn decoders_never_panic(
            s in prop::collection::vec(prop::num::u8::ANY, 0..64)
        ) {
            base64_decode(&s);
            uu_decode(&s);
            crlf(&s);
        }
    }
}
