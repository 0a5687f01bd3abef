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

use lazy_static::lazy_static;
use regex::Regex;

use super::quoted_printable::q2047_decode;
use crate::support::codec::Codec;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"^=\?([!->@-~]*)\?([!->@-~]*)\?([!->@-~]*)\?=$").unwrap();
    static ref ENCODED_WORD_AT: Regex =
        Regex::new(r"^=\?([^?\s]*)\?([^?\s]*)\?([^?\s]*?)\?=").unwrap();
}

/// Test if `word` (in its entirety) is an RFC 2047 "encoded word".
///
/// If it is, decode it and return its decoded value.
///
/// Returns `None` if it is not an encoded word or if it could not be
/// decoded.
///
/// This returns an `Option` instead of returning the input unchanged in
/// cases where it is not an encoded word because the distinction is
/// significant: whitespace is supposed to be deleted between adjacent
/// encoded words, but must be left alone in all other cases.
///
/// RFC 2047 specifies a maximum length of 75 characters for an encoded
/// word, but real agents produce longer ones and real readers interpret
/// them, so no length limit is enforced here.
pub fn ew_decode(word: &str) -> Option<String> {
    let captures = ENCODED_WORD.captures(word)?;
    decode_parts(
        captures.get(1).unwrap().as_str(),
        captures.get(2).unwrap().as_str(),
        captures.get(3).unwrap().as_str(),
    )
}

/// Decode the encoded word at the very start of `s`, if there is one.
///
/// Returns the decoded text and the number of input bytes consumed.
pub fn ew_decode_prefix(s: &str) -> Option<(String, usize)> {
    let captures = ENCODED_WORD_AT.captures(s)?;
    let whole = captures.get(0).unwrap();
    decode_parts(
        captures.get(1).unwrap().as_str(),
        captures.get(2).unwrap().as_str(),
        captures.get(3).unwrap().as_str(),
    )
    .map(|text| (text, whole.end()))
}

fn decode_parts(
    charset: &str,
    transfer_encoding: &str,
    content: &str,
) -> Option<String> {
    // An RFC 2231 language suffix ("utf-8*en") is allowed but unused here
    let charset = charset.split('*').next().unwrap_or(charset);

    let raw = match transfer_encoding {
        "q" | "Q" => q2047_decode(content.as_bytes()),
        "b" | "B" => {
            let filtered: Vec<u8> = content
                .bytes()
                .filter(|b| !b" \t".contains(b))
                .collect();
            base64::decode(&filtered).ok()?
        },
        _ => return None,
    };

    let codec = Codec::by_name(charset)?;
    let decoded = codec.to_unicode(&raw);
    if decoded.valid() {
        Some(decoded.text)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_ew_decode() {
        assert_eq!(None, ew_decode("hello world"));
        assert_eq!(None, ew_decode("=?garbage?="));

        // Examples from RFC 2047
        assert_eq!(
            "Keith Moore",
            ew_decode("=?US-ASCII?Q?Keith_Moore?=").unwrap()
        );
        assert_eq!(
            "Keld Jørn Simonsen",
            ew_decode("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?=").unwrap()
        );
        assert_eq!("André", ew_decode("=?ISO-8859-1?Q?Andr=E9?=").unwrap());
        assert_eq!(
            "If you can read this yo",
            ew_decode("=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=")
                .unwrap()
        );
        assert_eq!(
            "u understand the example.",
            ew_decode("=?ISO-8859-2?B?dSB1bmRlcnN0YW5kIHRoZSBleGFtcGxlLg==?=")
                .unwrap()
        );
    }

    #[test]
    fn test_ew_decode_prefix() {
        let (text, len) =
            ew_decode_prefix("=?US-ASCII?Q?Keith_Moore?= <moore@cs.utk.edu>")
                .unwrap();
        assert_eq!("Keith Moore", text);
        assert_eq!("=?US-ASCII?Q?Keith_Moore?=".len(), len);

        assert_eq!(None, ew_decode_prefix("Keith Moore"));
    }

    proptest! {
        #[test]
        fn ew_decode_never_panics(s in r"=\?.*\?.*\?.*\?=") {
            ew_decode(&s);
        }
    }
}
