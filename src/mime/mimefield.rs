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

//! The complex MIME header fields: Content-Type and friends, plus the
//! parameter list machinery they share.

use std::collections::BTreeMap;
use std::fmt;

use super::cursor::Cursor;
use super::field;
use super::transfer::TransferEncoding;
use crate::support::codec::Codec;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Parameter {
    name: String,
    value: String,
    parts: BTreeMap<u32, String>,
}

/// An ordered `name=value` parameter list with case-folded, unique names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters {
    list: Vec<Parameter>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.list.iter().map(|p| p.name.as_str())
    }

    /// The value of the parameter named `n`, ignoring the case of the
    /// name.
    pub fn get(&self, n: &str) -> Option<&str> {
        let n = n.to_ascii_lowercase();
        self.list
            .iter()
            .find(|p| p.name == n)
            .map(|p| p.value.as_str())
    }

    /// Adds a parameter named `n` with value `v`, replacing any previous
    /// setting.
    pub fn add(&mut self, n: &str, v: &str) {
        let e = self.entry(n);
        e.value = v.to_owned();
    }

    /// Removes the parameter named `n`, if present.
    pub fn remove(&mut self, n: &str) {
        let n = n.to_ascii_lowercase();
        self.list.retain(|p| p.name != n);
    }

    fn entry(&mut self, n: &str) -> &mut Parameter {
        let n = n.to_ascii_lowercase();
        if let Some(pos) = self.list.iter().position(|p| p.name == n) {
            return &mut self.list[pos];
        }
        self.list.push(Parameter {
            name: n,
            ..Parameter::default()
        });
        self.list.last_mut().unwrap()
    }

    /// Parses the RFC 2045 `*(";" parameter)` production at `p`,
    /// reassembling RFC 2231 continuation parts (`name*0`, `name*1`, ...)
    /// in numeric order.
    ///
    /// With `is_content_type`, a bare charset token with no `charset=`
    /// prefix is accepted (a common producer bug).
    pub(crate) fn parse(&mut self, p: &mut Cursor<'_>, is_content_type: bool) {
        let mut done = false;
        let mut first = true;
        while !done {
            done = true;
            let i = p.pos();
            while !p.at_end()
                && matches!(
                    p.next_char(),
                    b';' | b' ' | b'\t' | b'\r' | b'\n' | b'"'
                )
            {
                p.step();
            }
            if i < p.pos() {
                done = false;
            }
            if first {
                done = false;
            }
            if p.at_end() {
                done = true;
            }
            first = false;

            if !done {
                let mut n = p.mime_token().to_ascii_lowercase();
                p.comment();
                let mut have_part = false;
                let mut part_number = 0;

                if n.is_empty() {
                    break;
                }

                if let Some(star) = n.find('*') {
                    if let Ok(num) = n[star + 1..].parse::<u32>() {
                        have_part = true;
                        part_number = num;
                        n.truncate(star);
                    }
                }

                if is_content_type
                    && p.at_end()
                    && Codec::by_name(&n).is_some()
                    && self.get("charset").is_none()
                {
                    // sometimes we see just iso-8859-1 instead of
                    // charset=iso-8859-1
                    self.add("charset", &n);
                    break;
                }

                if b':' == p.next_char() && field::is_known_field_name(&n) {
                    // some spammers send e.g. 'c-t: stuff subject: stuff'.
                    // we ignore the second field entirely.
                    n.clear();
                    p.step_n(p.input().len());
                } else if b'=' != p.next_char() {
                    break;
                }

                p.step();
                p.whitespace();
                let v;
                if b'"' == p.next_char() {
                    v = p.mime_value();
                } else {
                    let start = p.pos();
                    let simple = p.mime_value();
                    let mut ok = true;
                    while ok
                        && !p.at_end()
                        && b';' != p.next_char()
                        && b'"' != p.next_char()
                    {
                        if p.dot_atom().is_empty() && p.mime_value().is_empty()
                        {
                            ok = false;
                        }
                    }
                    if ok && p.pos() > start {
                        v = latin1(&p.input()[start..p.pos().min(p.input().len())]);
                    } else {
                        v = simple;
                    }
                }
                p.comment();

                if !n.is_empty() {
                    let e = self.entry(&n);
                    if have_part {
                        e.parts.insert(part_number, v);
                    } else {
                        e.value = v;
                    }
                }
            }
        }

        for param in &mut self.list {
            if param.value.is_empty() && param.parts.contains_key(&0) {
                let mut k = 0;
                while let Some(v) = param.parts.get(&k) {
                    param.value.push_str(v);
                    k += 1;
                }
            }
        }
    }
}

impl fmt::Display for Parameters {
    /// The canonical `; name=value` suffix form, or nothing if there are
    /// no parameters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.list {
            if boring(&p.value) {
                write!(f, "; {}={}", p.name, p.value)?;
            } else {
                write!(
                    f,
                    "; {}=\"{}\"",
                    p.name,
                    p.value.replace('\\', "\\\\").replace('"', "\\\"")
                )?;
            }
        }
        Ok(())
    }
}

fn boring(v: &str) -> bool {
    !v.is_empty()
        && v.bytes().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b'.')
        })
}

fn latin1(s: &[u8]) -> String {
    s.iter().map(|&b| b as char).collect()
}

fn lower_lossy(s: &[u8]) -> String {
    latin1(s).to_ascii_lowercase()
}

// case-insensitive word-boundary search, returning a byte offset
fn contains_word(h: &[u8], word: &str) -> Option<usize> {
    let w = word.as_bytes();
    if h.len() < w.len() {
        return None;
    }
    for at in 0..=h.len() - w.len() {
        if !h[at..at + w.len()].eq_ignore_ascii_case(w) {
            continue;
        }
        let before_ok = 0 == at || !h[at - 1].is_ascii_alphanumeric();
        let after = at + w.len();
        let after_ok = after >= h.len() || !h[after].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return Some(at);
        }
    }
    None
}

/// The Content-Type field (RFC 2045 §5): a media type and subtype plus
/// auxiliary parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    pub params: Parameters,
}

impl ContentType {
    pub fn is_type(&self, t: &str) -> bool {
        self.typ == t
    }

    pub fn is(&self, t: &str, st: &str) -> bool {
        self.typ == t && self.subtype == st
    }

    pub fn parameter(&self, n: &str) -> Option<&str> {
        self.params.get(n)
    }

    pub fn base_value(&self) -> String {
        format!("{}/{}", self.typ, self.subtype)
    }

    /// Parses a Content-Type field body, leniently. Returns the parsed
    /// field and the first error found, if any.
    pub fn parse(s: &[u8]) -> (ContentType, Option<String>) {
        let mut ct = ContentType::default();
        let mut error = None;
        let mut p = Cursor::new(s);
        p.whitespace();
        while p.present(":") {
            p.whitespace();
        }

        let mut must_guess = false;
        let whole = lower_lossy(s);
        let trimmed = whole.trim();

        if p.at_end() {
            ct.typ = "text".to_owned();
            ct.subtype = "plain".to_owned();
        } else {
            let x = p.mark();
            if b'/' == p.next_char() {
                must_guess = true;
            } else {
                ct.typ = p.mime_token().to_ascii_lowercase();
            }
            if p.at_end() {
                match trimmed {
                    // elm? mailtool? someone does this, anyway
                    "text" => {
                        ct.typ = "text".to_owned();
                        ct.subtype = "plain".to_owned();
                    },
                    // the remainder is from RFC 1049
                    "postscript" => {
                        ct.typ = "application".to_owned();
                        ct.subtype = "postscript".to_owned();
                    },
                    "sgml" => {
                        ct.typ = "text".to_owned();
                        ct.subtype = "sgml".to_owned();
                    },
                    "tex" => {
                        ct.typ = "application".to_owned();
                        ct.subtype = "x-tex".to_owned();
                    },
                    "troff" => {
                        ct.typ = "application".to_owned();
                        ct.subtype = "x-troff".to_owned();
                    },
                    "dvi" => {
                        ct.typ = "application".to_owned();
                        ct.subtype = "x-dvi".to_owned();
                    },
                    t if t.starts_with("x-") => {
                        ct.subtype = format!("x-rfc1049-{}", t);
                        ct.typ = "application".to_owned();
                    },
                    // scribe and undefined types
                    t => {
                        error = Some(format!("Invalid Content-Type: '{}'", t));
                    },
                }
            } else {
                if b'/' == p.next_char() {
                    p.step();
                    if !p.at_end() || b';' != p.next_char() {
                        ct.subtype = p.mime_token().to_ascii_lowercase();
                    }
                    if ct.subtype.is_empty() {
                        must_guess = true;
                    }
                } else if b'=' == p.next_char() {
                    // someone skipped the content-type and supplied only
                    // parameters. assume text/plain and parse them.
                    ct.typ = "text".to_owned();
                    ct.subtype = "plain".to_owned();
                    p.restore(x);
                    must_guess = true;
                } else {
                    ct.params
                        .add("original-type", &ct.base_value());
                    ct.typ = "application".to_owned();
                    ct.subtype = "octet-stream".to_owned();
                    must_guess = true;
                }
                ct.params.parse(&mut p, true);
            }
        }

        if must_guess {
            let mut fname = ct
                .parameter("name")
                .or_else(|| ct.parameter("filename"))
                .unwrap_or("")
                .to_owned();
            while fname.ends_with('.') {
                fname.pop();
            }
            let fname = fname.to_ascii_lowercase();
            if fname.ends_with("jpg") || fname.ends_with("jpeg") {
                ct.typ = "image".to_owned();
                ct.subtype = "jpeg".to_owned();
            } else if fname.ends_with("htm") || fname.ends_with("html") {
                ct.typ = "text".to_owned();
                ct.subtype = "html".to_owned();
            } else if fname.is_empty()
                && ct.subtype.is_empty()
                && "text" == ct.typ
            {
                ct.subtype = "plain".to_owned();
            } else if "text" == ct.typ {
                ct.params.add("original-type", &ct.base_value());
                ct.subtype = "plain".to_owned();
            } else {
                ct.params.add("original-type", &ct.base_value());
                ct.typ = "application".to_owned();
                ct.subtype = "octet-stream".to_owned();
            }
        }

        if ct.typ.is_empty() || ct.subtype.is_empty() {
            error = error.or_else(|| {
                Some(format!(
                    "Both type and subtype must be nonempty: '{}'",
                    trimmed
                ))
            });
        }

        if error.is_none()
            && ct.is("multipart", "appledouble")
            && ct.parameter("boundary").is_none()
        {
            // appledouble without a boundary. whoever wants to decode
            // can try, or reply.
            ct.typ = "application".to_owned();
            ct.subtype = "octet-stream".to_owned();
        }

        if error.is_none()
            && !p.at_end()
            && "multipart" == ct.typ
            && ct.parameter("boundary").is_none()
        {
            // maybe the boundary parameter was mangled beyond the normal
            // parser's tolerance; look for the word and take what follows
            if let Some(at) = contains_word(s, "boundary") {
                let mut csp = Cursor::new(&s[at..]);
                csp.require("boundary");
                csp.whitespace();
                if csp.present("=") {
                    csp.whitespace();
                }
                let m = csp.mark();
                let mut b = csp.string();
                if b.is_empty() || !csp.ok() {
                    csp.restore(m);
                    let rest = latin1(&csp.input()[csp.pos()..]);
                    let mut cand = rest
                        .split(';')
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_owned();
                    if !(cand.starts_with('"') && cand.ends_with('"')) {
                        cand = cand.replace('\\', "");
                    }
                    b = trim_matching(&cand, '"')
                        .or_else(|| trim_matching(&cand, '\''))
                        .unwrap_or(cand);
                }
                if !b.is_empty() {
                    ct.params.add("boundary", &b);
                }
            }
        }

        if error.is_none()
            && "multipart" == ct.typ
            && ct.parameter("boundary").is_none()
        {
            error = Some(
                "Multipart entities must have a boundary parameter"
                    .to_owned(),
            );
        }

        if let Some(charset) = ct.parameter("charset").map(str::to_owned) {
            if let Some(c) = Codec::by_name(&charset) {
                let cs = c.name().to_ascii_lowercase();
                if "text" == ct.typ && "us-ascii" == cs {
                    ct.params.remove("charset");
                } else if cs != charset.to_ascii_lowercase() {
                    ct.params.add("charset", &cs);
                }
            }
        }

        if error.is_none()
            && !p.at_end()
            && "text" == ct.typ
            && ct.parameter("charset").is_none()
        {
            // a charset parameter the parser missed?
            if let Some(at) = contains_word(s, "charset") {
                let mut csp = Cursor::new(&s[at..]);
                csp.require("charset");
                csp.whitespace();
                if csp.present("=") {
                    csp.whitespace();
                }
                if let Some(c) = Codec::by_name(&csp.dot_atom()) {
                    ct.params
                        .add("charset", &c.name().to_ascii_lowercase());
                }
            }
        }

        (ct, error)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.typ, self.subtype, self.params)
    }
}

fn trim_matching(s: &str, q: char) -> Option<String> {
    let mut cs = s.chars();
    if s.len() >= 2 && Some(q) == cs.next() && s.ends_with(q) {
        Some(s[1..s.len() - 1].to_owned())
    } else {
        None
    }
}

/// Parses a Content-Transfer-Encoding field body.
pub fn parse_cte(s: &[u8]) -> (TransferEncoding, Option<String>) {
    let mut p = Cursor::new(s);
    p.whitespace();
    let t = p.mime_value().to_ascii_lowercase();
    p.comment();

    match &*t {
        "7bit" | "8bit" | "8bits" | "binary" | "unknown" => {
            (TransferEncoding::Binary, None)
        },
        "quoted-printable" => (TransferEncoding::QuotedPrintable, None),
        "base64" => (TransferEncoding::Base64, None),
        "x-uuencode" | "uuencode" | "x-uue" => {
            (TransferEncoding::Uuencode, None)
        },
        t if t.contains("bit")
            && t.as_bytes().first().map_or(false, u8::is_ascii_digit) =>
        {
            (TransferEncoding::Binary, None)
        },
        t => (
            TransferEncoding::Binary,
            Some(format!("Invalid c-t-e value: '{}'", t)),
        ),
    }
}

/// The canonical field body for a transfer encoding.
pub fn cte_name(e: TransferEncoding) -> &'static str {
    match e {
        TransferEncoding::Binary => "7bit",
        TransferEncoding::QuotedPrintable => "quoted-printable",
        TransferEncoding::Base64 => "base64",
        TransferEncoding::Uuencode => "x-uuencode",
    }
}

/// The two presentations RFC 2183 defines. Unknown or syntactically
/// damaged dispositions are treated as attachments, as required.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

/// The Content-Disposition field (RFC 2183).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentDisposition {
    pub value: String,
    pub params: Parameters,
}

impl ContentDisposition {
    pub fn disposition(&self) -> Disposition {
        if "inline" == self.value {
            Disposition::Inline
        } else {
            Disposition::Attachment
        }
    }

    pub fn parameter(&self, n: &str) -> Option<&str> {
        self.params.get(n)
    }

    pub fn parse(s: &[u8]) -> (ContentDisposition, Option<String>) {
        let mut cd = ContentDisposition::default();
        let mut p = Cursor::new(s);
        p.whitespace();

        let m = p.mark();
        let t = p.mime_token().to_ascii_lowercase();
        p.whitespace();
        if b'=' == p.next_char() && "inline" != t && "attachment" != t {
            // handle c-d: filename=foo
            p.restore(m);
        }

        if t.is_empty() {
            return (cd, Some("Invalid disposition".to_owned()));
        }
        cd.params.parse(&mut p, false);
        cd.value = t;

        (cd, None)
    }
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.params)
    }
}

/// The Content-Language field (RFC 3282): a list of RFC 3066 tags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentLanguage {
    pub tags: Vec<String>,
}

impl ContentLanguage {
    pub fn parse(s: &[u8]) -> (ContentLanguage, Option<String>) {
        let mut cl = ContentLanguage::default();
        let mut p = Cursor::new(s);

        loop {
            // we're not going to bother validating language tags
            p.comment();
            let t = p.mime_token();
            if !t.is_empty() {
                cl.tags.push(t);
            }
            p.comment();
            if !p.present(",") {
                break;
            }
        }

        let error = if !p.at_end() || cl.tags.is_empty() {
            Some(format!(
                "Cannot parse value: '{}'",
                lower_lossy(s).trim()
            ))
        } else {
            None
        };
        (cl, error)
    }
}

impl fmt::Display for ContentLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tags.join(", "))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ct(s: &str) -> (ContentType, Option<String>) {
        ContentType::parse(s.as_bytes())
    }

    #[test]
    fn simple_content_type() {
        let (c, e) = ct("text/plain");
        assert!(e.is_none());
        assert!(c.is("text", "plain"));
        assert!(c.params.is_empty());
    }

    #[test]
    fn parameters_quoted_and_bare() {
        let (c, e) = ct("multipart/mixed; boundary=\"cut here\"");
        assert!(e.is_none());
        assert_eq!(Some("cut here"), c.parameter("boundary"));

        let (c, e) = ct("multipart/mixed;boundary=simple");
        assert!(e.is_none());
        assert_eq!(Some("simple"), c.parameter("boundary"));
    }

    #[test]
    fn parameter_names_fold_case() {
        let (c, _) = ct("text/plain; CHARSET=UTF-8");
        assert_eq!(Some("utf-8"), c.parameter("charset"));
        assert_eq!(Some("utf-8"), c.parameter("Charset"));
    }

    #[test]
    fn rfc2231_continuations() {
        let (c, e) = ct(
            "application/x-stuff; name*0=one; name*1=two; name*2=three",
        );
        assert!(e.is_none());
        assert_eq!(Some("onetwothree"), c.parameter("name"));
    }

    #[test]
    fn bare_charset_token() {
        let (c, e) = ct("text/plain; iso-8859-1");
        assert!(e.is_none());
        assert_eq!(Some("windows-1252"), c.parameter("charset"));
    }

    #[test]
    fn us_ascii_charset_is_dropped() {
        let (c, _) = ct("text/plain; charset=us-ascii");
        assert_eq!(None, c.parameter("charset"));
    }

    #[test]
    fn charset_is_canonicalized() {
        let (c, _) = ct("text/plain; charset=UTF8");
        assert_eq!(Some("utf-8"), c.parameter("charset"));
    }

    #[test]
    fn rfc1049_compatibility() {
        let (c, e) = ct("postscript");
        assert!(e.is_none());
        assert!(c.is("application", "postscript"));

        let (c, e) = ct("text");
        assert!(e.is_none());
        assert!(c.is("text", "plain"));
    }

    #[test]
    fn parameters_only_value() {
        let (c, e) = ct("charset=iso-8859-1");
        assert!(e.is_none(), "error: {:?}", e);
        assert!(c.is("text", "plain"));
        assert_eq!(Some("windows-1252"), c.parameter("charset"));
    }

    #[test]
    fn missing_boundary_is_an_error() {
        let (c, e) = ct("multipart/mixed");
        assert!(c.is("multipart", "mixed"));
        assert!(e.is_some());
    }

    #[test]
    fn mangled_boundary_is_recovered() {
        let (c, e) = ct("multipart/mixed; boundary = =_NextPart_000_0012");
        assert!(e.is_none(), "error: {:?}", e);
        assert_eq!(Some("=_NextPart_000_0012"), c.parameter("boundary"));
    }

    #[test]
    fn embedded_spam_field_is_ignored() {
        let (c, e) =
            ct("text/html; charset=utf-8 subject: buy things now");
        assert!(e.is_none(), "error: {:?}", e);
        assert!(c.is("text", "html"));
        assert_eq!(Some("utf-8"), c.parameter("charset"));
    }

    #[test]
    fn cte_values() {
        assert_matches!(
            (TransferEncoding::Binary, None),
            parse_cte(b"7bit")
        );
        assert_matches!(
            (TransferEncoding::Binary, None),
            parse_cte(b"8BIT")
        );
        assert_matches!(
            (TransferEncoding::QuotedPrintable, None),
            parse_cte(b"Quoted-Printable")
        );
        assert_matches!(
            (TransferEncoding::Base64, None),
            parse_cte(b"base64 (as usual)")
        );
        assert_matches!(
            (TransferEncoding::Uuencode, None),
            parse_cte(b"x-uuencode")
        );
        let (e, err) = parse_cte(b"7bite?");
        assert_eq!(TransferEncoding::Binary, e);
        assert!(err.is_some());
    }

    #[test]
    fn dispositions() {
        let (d, e) = ContentDisposition::parse(b"inline");
        assert!(e.is_none());
        assert_matches!(Disposition::Inline, d.disposition());

        let (d, e) =
            ContentDisposition::parse(b"attachment; filename=cat.jpg");
        assert!(e.is_none());
        assert_matches!(Disposition::Attachment, d.disposition());
        assert_eq!(Some("cat.jpg"), d.parameter("filename"));

        // a missing disposition token is still an attachment
        let (d, e) = ContentDisposition::parse(b"filename=cat.jpg");
        assert!(e.is_none());
        assert_matches!(Disposition::Attachment, d.disposition());
        assert_eq!(Some("cat.jpg"), d.parameter("filename"));
    }

    #[test]
    fn content_language() {
        let (l, e) = ContentLanguage::parse(b"en, de (deutsch)");
        assert!(e.is_none());
        assert_eq!(vec!["en".to_owned(), "de".to_owned()], l.tags);

        let (_, e) = ContentLanguage::parse(b"");
        assert!(e.is_some());
    }

    #[test]
    fn display_round_trip() {
        let (c, _) = ct("multipart/mixed; boundary=\"cut here\"");
        assert_eq!(
            "multipart/mixed; boundary=\"cut here\"",
            c.to_string()
        );
    }
}
