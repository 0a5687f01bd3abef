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

//! A mark/restore-capable byte cursor with primitive token reads for
//! RFC 2822-like grammars.
//!
//! The cursor tracks the first error it encounters; once an error is
//! recorded, `ok()` is false and further reads keep returning degenerate
//! values, so a parse function can run to completion and check once at the
//! end. Token readers map raw bytes 0x80..=0xFF to the corresponding
//! U+0080..=U+00FF code points, which preserves them losslessly for later
//! re-decoding by the 8-bit header salvage pass.

use super::encoded_word::ew_decode;
use crate::support::error::ParseError;

pub struct Cursor<'a> {
    s: &'a [u8],
    at: usize,
    err: Option<ParseError>,
}

impl<'a> Cursor<'a> {
    pub fn new(s: &'a [u8]) -> Self {
        Cursor {
            s,
            at: 0,
            err: None,
        }
    }

    /// The whole input.
    pub fn input(&self) -> &'a [u8] {
        self.s
    }

    /// Current (0-indexed) cursor position.
    pub fn pos(&self) -> usize {
        self.at
    }

    pub fn at_end(&self) -> bool {
        self.at >= self.s.len()
    }

    /// False once a parse error has been recorded.
    pub fn ok(&self) -> bool {
        self.err.is_none()
    }

    pub fn error(&self) -> Option<&ParseError> {
        self.err.as_ref()
    }

    /// Records the first parse error. Later errors are discarded.
    pub fn set_error(&mut self, what: &str) {
        if self.err.is_none() {
            self.err = Some(ParseError::Expected {
                what: what.to_owned(),
                at: self.at,
                near: self.following(),
            });
        }
    }

    /// Up to 15 bytes of unparsed input, whitespace-collapsed, for error
    /// messages.
    pub fn following(&self) -> String {
        let end = (self.at + 15).min(self.s.len());
        let mut out = String::new();
        let mut sp = false;
        for &b in &self.s[self.at..end] {
            if b.is_ascii_whitespace() {
                sp = !out.is_empty();
            } else {
                if sp {
                    out.push(' ');
                    sp = false;
                }
                out.push(byte_char(b));
            }
        }
        out
    }

    /// The byte at the cursor, or 0 past the end.
    pub fn next_char(&self) -> u8 {
        self.s.get(self.at).copied().unwrap_or(0)
    }

    /// The byte `n` past the cursor, or 0 past the end.
    pub fn peek(&self, n: usize) -> u8 {
        self.s.get(self.at + n).copied().unwrap_or(0)
    }

    pub fn step(&mut self) {
        self.at += 1;
    }

    pub fn step_n(&mut self, n: usize) {
        self.at += n;
    }

    /// Returns the byte at the cursor and steps past it.
    pub fn character(&mut self) -> u8 {
        let c = self.next_char();
        self.at += 1;
        c
    }

    pub fn mark(&self) -> usize {
        self.at
    }

    pub fn restore(&mut self, m: usize) {
        self.at = m;
    }

    /// If the input at the cursor matches `s` case-insensitively, steps
    /// past it and returns true.
    pub fn present(&mut self, s: &str) -> bool {
        let bytes = s.as_bytes();
        if self.at + bytes.len() > self.s.len() {
            return false;
        }
        if !self.s[self.at..self.at + bytes.len()].eq_ignore_ascii_case(bytes)
        {
            return false;
        }
        self.at += bytes.len();
        true
    }

    /// Like `present`, but records an error if the text is absent.
    pub fn require(&mut self, s: &str) {
        if !self.present(s) {
            self.set_error(&format!("'{}'", s));
        }
    }

    /// Between `min` and `max` ASCII digits at the cursor.
    pub fn digits(&mut self, min: usize, max: usize) -> String {
        let mut r = String::new();
        while r.len() < max && self.next_char().is_ascii_digit() {
            r.push(self.character() as char);
        }
        if r.len() < min {
            self.set_error(&format!("at least {} digits", min));
        }
        r
    }

    /// Between `min` and `max` ASCII letters at the cursor.
    pub fn letters(&mut self, min: usize, max: usize) -> String {
        let mut r = String::new();
        while r.len() < max && self.next_char().is_ascii_alphabetic() {
            r.push(self.character() as char);
        }
        if r.len() < min {
            self.set_error(&format!("at least {} letters", min));
        }
        r
    }

    /// An unsigned integer at the cursor.
    pub fn number(&mut self) -> u32 {
        let digits = self.digits(1, 10);
        match digits.parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                self.set_error("a number");
                0
            },
        }
    }

    /// Asserts that the input has been completely parsed.
    pub fn end(&mut self) {
        if self.at < self.s.len() {
            self.set_error("end of input");
        }
    }

    /// Steps past spaces, tabs and line breaks.
    pub fn whitespace(&mut self) {
        while matches!(self.next_char(), b' ' | b'\t' | b'\r' | b'\n') {
            self.at += 1;
        }
    }

    /// Steps past all comments and surrounding white space, returning the
    /// content of the last comment seen (or an empty string).
    pub fn comment(&mut self) -> String {
        let mut r = String::new();
        self.whitespace();
        while b'(' == self.next_char() {
            r.clear();
            let mut level = 0u32;
            loop {
                match self.next_char() {
                    b'(' => {
                        if level > 0 {
                            r.push('(');
                        }
                        level += 1;
                    },
                    b')' => {
                        level -= 1;
                        if level > 0 {
                            r.push(')');
                        }
                    },
                    b'\\' => {
                        self.at += 1;
                        r.push(byte_char(self.next_char()));
                    },
                    b => r.push(byte_char(b)),
                }
                self.at += 1;
                if 0 == level || self.at_end() {
                    break;
                }
            }
            self.whitespace();
        }
        r
    }

    /// An atom or a quoted string at the cursor.
    pub fn string(&mut self) -> String {
        self.comment();

        if b'"' != self.next_char() {
            return self.atom();
        }

        let mut out = String::new();
        self.at += 1;
        loop {
            match self.next_char() {
                b'"' => {
                    self.at += 1;
                    break;
                },
                b'\\' => {
                    self.at += 1;
                    out.push(byte_char(self.next_char()));
                    self.at += 1;
                },
                b' ' | b'\t' | b'\r' | b'\n' => {
                    // Folding whitespace collapses to a single space
                    out.push(' ');
                    self.whitespace();
                },
                _ if self.at_end() => break,
                b => {
                    out.push(byte_char(b));
                    self.at += 1;
                },
            }
        }
        out
    }

    /// A run of strings, with separating spaces.
    pub fn phrase(&mut self) -> String {
        let mut r = self.string();
        if r.is_empty() {
            return r;
        }

        loop {
            let w = self.string();
            if w.is_empty() {
                break;
            }
            r.push(' ');
            r.push_str(&w);
        }
        r
    }

    /// A single atom, stepping past white space and comments before it.
    pub fn atom(&mut self) -> String {
        self.comment();
        let mut out = String::new();
        while is_atext(self.next_char()) && !self.at_end() {
            out.push(byte_char(self.character()));
        }
        out
    }

    /// A dot-atom, stepping past all relevant whitespace and comments.
    pub fn dot_atom(&mut self) -> String {
        let mut r = self.atom();
        if r.is_empty() {
            return r;
        }

        self.comment();
        while b'.' == self.next_char() {
            let m = self.mark();
            self.at += 1;
            let a = self.atom();
            if a.is_empty() {
                // backtrack to the dot
                self.restore(m);
                break;
            }
            r.push('.');
            r.push_str(&a);
            self.comment();
        }
        r
    }

    /// A single MIME token (RFC 2045 §5): an atom minus `/?=` plus `.`.
    pub fn mime_token(&mut self) -> String {
        let mut out = String::new();
        loop {
            let c = self.next_char();
            if self.at_end()
                || c <= 32
                || c >= 128
                || b"()<>@,;:[]?=\\\"/".contains(&c)
            {
                break;
            }
            out.push(c as char);
            self.at += 1;
        }
        out
    }

    /// A MIME value: a token or a quoted string.
    pub fn mime_value(&mut self) -> String {
        if b'"' == self.next_char() {
            self.string()
        } else {
            self.mime_token()
        }
    }

    /// The longest `*text` (a series of text and encoded-words) at the
    /// cursor, decoded. Whitespace between adjacent encoded-words is
    /// elided, per RFC 2047.
    pub fn text(&mut self) -> String {
        let mut out = String::new();
        let mut pending_ws = String::new();
        let mut prev_encoded = false;

        loop {
            match self.next_char() {
                0 if self.at_end() => break,
                b'\r' | b'\n' => break,
                c @ b' ' | c @ b'\t' => {
                    pending_ws.push(c as char);
                    self.at += 1;
                    continue;
                },
                _ => (),
            }

            let start = self.at;
            while !self.at_end()
                && !matches!(self.next_char(), b' ' | b'\t' | b'\r' | b'\n')
            {
                self.at += 1;
            }
            let word = &self.s[start..self.at];

            let decoded = std::str::from_utf8(word).ok().and_then(ew_decode);
            match decoded {
                Some(d) => {
                    if !prev_encoded && !out.is_empty() {
                        out.push_str(&pending_ws);
                    }
                    out.push_str(&d);
                    prev_encoded = true;
                },
                None => {
                    out.push_str(&pending_ws);
                    for &b in word {
                        out.push(byte_char(b));
                    }
                    prev_encoded = false;
                },
            }
            pending_ws.clear();
        }
        out
    }
}

/// RFC 2822 'atext', extended with 8-bit bytes the way obsolete mail
/// actually uses them.
pub fn is_atext(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || c >= 128
        || matches!(
            c,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'/'
                | b'='
                | b'?'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'|'
                | b'}'
                | b'~'
        )
}

fn byte_char(b: u8) -> char {
    // Raw 8-bit bytes map to U+0080..U+00FF so nothing is lost
    b as char
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn primitives() {
        let mut p = Cursor::new(b"13 Dec 2003");
        assert_eq!("13", p.digits(1, 2));
        p.whitespace();
        assert_eq!("Dec", p.letters(3, 3));
        p.whitespace();
        assert_eq!(2003, p.number());
        p.end();
        assert!(p.ok());
    }

    #[test]
    fn present_and_require() {
        let mut p = Cursor::new(b"BOUNDARY=x");
        assert!(p.present("boundary"));
        p.require("=");
        assert!(p.ok());
        p.require(";");
        assert!(!p.ok());
        assert_matches!(
            Some(&ParseError::Expected { .. }),
            p.error()
        );
    }

    #[test]
    fn comments_nest() {
        let mut p = Cursor::new(b"(a (b) c) (last \\) one) x");
        assert_eq!("last ) one", p.comment());
        assert_eq!(b'x', p.next_char());
    }

    #[test]
    fn quoted_strings_fold() {
        let mut p = Cursor::new(b"\"a  b \\\" c\"");
        assert_eq!("a b \" c", p.string());
        assert!(p.at_end());
    }

    #[test]
    fn dot_atom_backtracks() {
        let mut p = Cursor::new(b"a.b.c.");
        assert_eq!("a.b.c", p.dot_atom());
        assert_eq!(b'.', p.next_char());
    }

    #[test]
    fn text_decodes_encoded_words() {
        let mut p = Cursor::new(b"hello =?US-ASCII?Q?world?=");
        assert_eq!("hello world", p.text());

        // whitespace between adjacent encoded words is elided
        let mut p = Cursor::new(
            b"=?us-ascii?q?a?= =?us-ascii?q?b?= c",
        );
        assert_eq!("ab c", p.text());
    }
}
