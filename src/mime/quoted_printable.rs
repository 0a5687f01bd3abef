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

/// Decodes quoted-printable encoding, as described by RFC 2045.
///
/// Encoded bytes and soft line endings are both handled, the latter by
/// discarding. UNIX line endings are accepted as well as DOS line endings.
///
/// This never fails. Invalid sequences are passed through untransformed,
/// and a dangling `=` at end of input is dropped (it is the first half of a
/// soft break that never finished). 8-bit bytes pass through unchanged,
/// including invalid UTF-8.
pub fn qp_decode(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;

    while i < s.len() {
        let b = s[i];
        if b'=' != b {
            out.push(b);
            i += 1;
            continue;
        }

        let rest = &s[i + 1..];
        if rest.is_empty() || b"\r" == rest {
            // dangling soft break
            break;
        } else if rest.starts_with(b"\r\n") {
            i += 3;
        } else if rest.starts_with(b"\n") {
            i += 2;
        } else if rest.len() >= 2 {
            match hex_nibble(rest[0])
                .and_then(|hi| hex_nibble(rest[1]).map(|lo| (hi << 4) | lo))
            {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                },
                None => {
                    out.push(b'=');
                    i += 1;
                },
            }
        } else {
            out.push(b'=');
            i += 1;
        }
    }

    out
}

/// Like `qp_decode`, but additionally treats `_` as a space, per the
/// RFC 2047 "Q" encoding used inside encoded-words.
pub fn q2047_decode(s: &[u8]) -> Vec<u8> {
    let mut out = qp_decode(s);
    for b in &mut out {
        if b'_' == *b {
            *b = b' ';
        }
    }
    out
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn assert_qp(expected: &[u8], input: &[u8]) {
        assert_eq!(expected, &qp_decode(input)[..]);
    }

    #[test]
    fn test_qp_decode() {
        assert_qp(b"hello world", b"hello world");
        assert_qp(b"\xabfoo", b"=ABfoo");
        assert_qp(b"fo\xabo", b"fo=ABo");
        assert_qp(b"foo\xab", b"foo=AB");
        assert_qp(b"foo\xab\xcd", b"foo=AB=CD");

        assert_qp(b"foo", b"foo=\n");
        assert_qp(b"foobar", b"foo=\nbar");
        assert_qp(b"foo", b"foo=\r\n");
        assert_qp(b"foobar", b"foo=\r\nbar");

        assert_qp(b"foo=()bar", b"foo=()bar");
        assert_qp(b"foo=\xabbar", b"foo==ABbar");
        assert_qp(b"foo=A\xabbar", b"foo=A=ABbar");
        assert_qp(b"foo=\x80\x80bar", b"foo=\x80\x80bar");

        assert_qp(b"foo", b"foo=");
        assert_qp(b"foo", b"foo=\r");
    }

    #[test]
    fn test_q2047_underscore() {
        assert_eq!(b"Keith Moore".to_vec(), q2047_decode(b"Keith_Moore"));
        assert_eq!(b"a b\xE6".to_vec(), q2047_decode(b"a_b=E6"));
    }

    proptest! {
        #[test]
        fn qp_decode_never_panics(
            s in prop::collection::vec(prop::num::u8::ANY, 0..40)
        ) {
            qp_decode(&s);
        }
    }
}
