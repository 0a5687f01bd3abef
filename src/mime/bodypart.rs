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

//! MIME body parts and the multipart decomposer.
//!
//! A `Bodypart` holds decoded text, raw binary data, or a nested message,
//! decided by the entity's Content-Type. The decomposer is designed to be
//! robust moreso than strictly correct: it accepts wildly malformed input
//! and does its best to carry on, within hard recursion and part-count
//! ceilings so adversarial input gets a parse error instead of a stack.

use super::field::FieldType;
use super::header::{DefaultType, Header, Mode};
use super::message::Message;
use super::transfer::{self, TransferEncoding};
use crate::support::codec::{Codec, CodecState};
use crate::support::error::ParseError;

pub(crate) const MAX_DEPTH: u32 = 20;
pub(crate) const MAX_PARTS: u32 = 1000;

/// One MIME body part: a MIME-mode header plus text, data or a nested
/// message, with byte and line accounting for the on-wire form.
#[derive(Clone, Debug)]
pub struct Bodypart {
    number: u32,
    header: Header,
    data: Vec<u8>,
    text: String,
    has_text: bool,
    message: Option<Box<Message>>,
    children: Vec<Bodypart>,
    num_bytes: u32,
    num_encoded_bytes: u32,
    num_encoded_lines: u32,
    error: Option<String>,
}

impl Bodypart {
    fn new(header: Header) -> Self {
        Bodypart {
            number: 0,
            header,
            data: Vec::new(),
            text: String::new(),
            has_text: false,
            message: None,
            children: Vec::new(),
            num_bytes: 0,
            num_encoded_bytes: 0,
            num_encoded_lines: 0,
            error: None,
        }
    }

    /// This part's 1-based position within its containing multipart.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The raw decoded bytes, for parts with an 8-bit type. Empty for
    /// text parts.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True if this part carries decoded unicode text.
    pub fn is_text(&self) -> bool {
        self.has_text
    }

    /// The decoded text of a text part.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The nested message, for message/rfc822 parts.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_deref()
    }

    pub fn children(&self) -> &[Bodypart] {
        &self.children
    }

    /// Decoded size in bytes.
    pub fn num_bytes(&self) -> u32 {
        self.num_bytes
    }

    /// On-wire (transfer-encoded) size in bytes.
    pub fn num_encoded_bytes(&self) -> u32 {
        self.num_encoded_bytes
    }

    /// On-wire line count; only meaningful for text and message parts.
    pub fn num_encoded_lines(&self) -> u32 {
        self.num_encoded_lines
    }

    /// Why this bodypart is bad, or `None` if nothing seems the matter.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Splits `rfc2822[i..end]` into body parts wherever the boundary
    /// `divider` (without its leading hyphens) occurs, parsing each part
    /// recursively. `digest` selects the message/rfc822 default type of
    /// multipart/digest.
    pub fn parse_multipart(
        rfc2822: &[u8],
        i: usize,
        end: usize,
        divider: &[u8],
        digest: bool,
        ancestors: &[&Header],
    ) -> Vec<Bodypart> {
        let mut parts = 0;
        Bodypart::parse_multipart_limited(
            rfc2822, i, end, divider, digest, ancestors, 0, &mut parts,
        )
    }

    pub(crate) fn parse_multipart_limited(
        rfc2822: &[u8],
        i: usize,
        end: usize,
        divider: &[u8],
        digest: bool,
        ancestors: &[&Header],
        depth: u32,
        parts: &mut u32,
    ) -> Vec<Bodypart> {
        let mut children = Vec::new();
        if divider.is_empty() {
            return children;
        }
        let at = |p: usize| -> u8 {
            rfc2822.get(p).copied().unwrap_or(0)
        };

        let mut start = 0usize;
        let mut last = false;
        let mut pn = 1;
        let mut i = i;
        while !last && i <= end {
            let at_boundary = i >= end
                || (b'-' == at(i)
                    && b'-' == at(i + 1)
                    && (0 == i || 13 == at(i - 1) || 10 == at(i - 1))
                    && rfc2822.len() > i + 2
                    && rfc2822[i + 2..].starts_with(divider));
            if at_boundary {
                let mut j = i;
                let mut l = false;
                if i >= end {
                    l = true;
                } else {
                    j = i + 2 + divider.len();
                    if b'-' == at(j) && b'-' == at(j + 1) {
                        j += 2;
                        l = true;
                    }
                }
                while b' ' == at(j) || b'\t' == at(j) {
                    j += 1;
                }
                if 13 == at(j) || 10 == at(j) || j >= rfc2822.len() {
                    // finally. we accept that as a boundary line.
                    if 13 == at(j) {
                        j += 1;
                    }
                    if 10 == at(j) {
                        j += 1;
                    }
                    if start > 0 {
                        let mut hi = start;
                        let mut h = Message::parse_header_region(
                            &mut hi,
                            j,
                            rfc2822,
                            Mode::Mime,
                        );
                        if digest {
                            h.set_default_type(DefaultType::MessageRfc822);
                        }
                        h.repair();

                        // strip the [CR]LF that belongs to the boundary
                        let mut part_end = i;
                        if part_end > 0 && 10 == at(part_end - 1) {
                            part_end -= 1;
                            if part_end > 0 && 13 == at(part_end - 1) {
                                part_end -= 1;
                            }
                        }
                        let body_start = hi.min(part_end);
                        h.repair_with(
                            ancestors,
                            &rfc2822[body_start..part_end],
                        );

                        let mut bp = Bodypart::parse_bodypart_limited(
                            rfc2822,
                            body_start,
                            part_end,
                            h,
                            ancestors,
                            depth + 1,
                            parts,
                        );
                        bp.number = pn;
                        pn += 1;
                        children.push(bp);
                    }
                    last = l;
                    start = j;
                    i = j;
                }
            }
            while i < end && 13 != at(i) && 10 != at(i) {
                i += 1;
            }
            while i < end && (13 == at(i) || 10 == at(i)) {
                i += 1;
            }
        }

        children
    }

    /// Parses `rfc2822[start..end]` as a single body part governed by the
    /// MIME header `h`. `ancestors` lists the headers of the enclosing
    /// entities, nearest first, for use by nested repair.
    pub fn parse_bodypart(
        rfc2822: &[u8],
        start: usize,
        end: usize,
        h: Header,
        ancestors: &[&Header],
    ) -> Bodypart {
        let mut parts = 0;
        Bodypart::parse_bodypart_limited(
            rfc2822, start, end, h, ancestors, 0, &mut parts,
        )
    }

    pub(crate) fn parse_bodypart_limited(
        rfc2822: &[u8],
        start: usize,
        end: usize,
        mut h: Header,
        ancestors: &[&Header],
        depth: u32,
        parts: &mut u32,
    ) -> Bodypart {
        let at = |p: usize| -> u8 {
            rfc2822.get(p).copied().unwrap_or(0)
        };
        let mut start = start;
        if 13 == at(start) {
            start += 1;
        }
        if 10 == at(start) {
            start += 1;
        }
        let end = end.min(rfc2822.len()).max(start);
        let raw_body = &rfc2822[start..end];

        *parts += 1;

        // sometimes people send c-t-e: q-p _and_ c-t-e: 7bit or 8bit.
        // if they are equivalent we can accept it.
        if !raw_body.contains(&b'=') {
            let cte_fields = h
                .fields()
                .iter()
                .filter(|f| {
                    FieldType::ContentTransferEncoding == f.field_type()
                })
                .count();
            let any_qp = h.fields().iter().any(|f| {
                Some(TransferEncoding::QuotedPrintable) == f.encoding()
            });
            if any_qp && cte_fields > 1 {
                h.remove_field(FieldType::ContentTransferEncoding);
            }
        }

        let e = h
            .content_transfer_encoding()
            .unwrap_or(TransferEncoding::Binary);
        let mut body: Vec<u8> = if raw_body.is_empty() {
            Vec::new()
        } else {
            match e {
                TransferEncoding::Base64 | TransferEncoding::Uuencode => {
                    transfer::decode(e, raw_body)
                },
                _ => transfer::decode(e, &transfer::crlf(raw_body)),
            }
        };

        if h.content_type().is_none() {
            match h.default_type() {
                DefaultType::TextPlain => {
                    h.add_pair("Content-Type", "text/plain")
                },
                DefaultType::MessageRfc822 => {
                    h.add_pair("Content-Type", "message/rfc822")
                },
            }
        }
        // infallible: just added above if absent
        let ct = h.content_type().unwrap().clone();

        let mut bp = Bodypart::new(Header::new(Mode::Mime));
        let mut text = String::new();
        let mut has_text = false;

        if "text" == ct.typ {
            let mut specified = false;
            let mut unknown = false;

            let mut csn =
                ct.parameter("charset").unwrap_or("").to_owned();
            if csn.eq_ignore_ascii_case("default") {
                csn.clear();
            }
            if !csn.is_empty() {
                specified = true;
            }
            let c = Codec::by_name(&csn);
            if c.is_none() {
                unknown = true;
            }
            if let Some(codec) = c {
                if "US-ASCII" == codec.name() {
                    // Some MTAs say us-ascii without checking whether the
                    // body actually is ASCII. If it isn't, we'd better
                    // call our charset guesser.
                    if !codec.to_unicode(&body).valid() {
                        specified = false;
                    }
                }
            }
            let mut c = c.unwrap_or_else(Codec::ascii);

            has_text = true;
            let mut decoded = c.to_unicode(&body);

            if (!specified
                && (!decoded.wellformed() || "html" == ct.subtype))
                || (specified && !decoded.valid())
            {
                let g = if "html" == ct.subtype {
                    guess_html_codec(&body)
                } else {
                    guess_text_codec(&body)
                };
                match g {
                    None => {
                        // nothing guessable. keep what we had if it's
                        // valid or explicitly specified, else use
                        // unknown-8bit.
                        if !specified && !decoded.valid() {
                            c = Codec::unknown_8bit();
                            decoded = c.to_unicode(&body);
                        }
                    },
                    Some(g) => {
                        let gd = g.to_unicode(&body);
                        if gd.wellformed() && !decoded.wellformed() {
                            log::debug!(
                                "charset guesser chose {} over {}",
                                g.name(),
                                c.name()
                            );
                            c = g;
                            decoded = gd;
                        }
                    },
                }
            }

            if specified && CodecState::Invalid == decoded.state {
                // the specified codec produced errors but did not abort
                // conversion. forget the error, keep the conversion
                // result (probably including U+FFFD) and label the text
                // as UTF-8.
                c = Codec::utf8();
                decoded.state = CodecState::Valid;
            } else if !specified && CodecState::Invalid == decoded.state {
                c = Codec::unknown_8bit();
                decoded = c.to_unicode(&body);
            }

            if !decoded.valid() {
                let mut msg =
                    "Could not convert body to Unicode".to_owned();
                if specified {
                    let cs = if csn.is_empty() {
                        c.name().to_owned()
                    } else {
                        csn.clone()
                    };
                    msg.push_str(&format!(" from {}", cs));
                }
                if specified && unknown {
                    msg.push_str(": Character set not implemented");
                } else if let Some(ref e) = decoded.error {
                    msg.push_str(&format!(": {}", e));
                }
                bp.error = Some(msg);
            }

            // correct the charset parameter to what was actually used
            if let Some(ctf) = h
                .field_mut(FieldType::ContentType, 0)
                .and_then(super::field::HeaderField::content_type_mut)
            {
                if "us-ascii" != c.name().to_ascii_lowercase() {
                    ctf.params
                        .add("charset", &c.name().to_ascii_lowercase());
                } else {
                    ctf.params.remove("charset");
                }
            }

            text = decoded.text;
        } else {
            bp.data = body;
            body = Vec::new();
        }

        let mut children = Vec::new();
        let mut message = None;

        if "multipart" == ct.typ {
            if depth >= MAX_DEPTH {
                bp.error = Some(ParseError::RecursionLimitExceeded.to_string());
            } else if *parts >= MAX_PARTS {
                bp.error = Some(ParseError::TooManyParts.to_string());
            } else {
                let mut anc: Vec<&Header> =
                    Vec::with_capacity(ancestors.len() + 1);
                anc.push(&h);
                anc.extend_from_slice(ancestors);
                children = Bodypart::parse_multipart_limited(
                    rfc2822,
                    start,
                    end,
                    ct.parameter("boundary").unwrap_or("").as_bytes(),
                    "digest" == ct.subtype,
                    &anc,
                    depth + 1,
                    parts,
                );
            }
        } else if "message" == ct.typ
            && ("rfc822" == ct.subtype || "global" == ct.subtype)
        {
            if depth >= MAX_DEPTH {
                bp.error = Some(ParseError::RecursionLimitExceeded.to_string());
            } else if *parts >= MAX_PARTS {
                bp.error = Some(ParseError::TooManyParts.to_string());
            } else {
                // there are sometimes blank lines before the message
                let mut mstart = start;
                while 13 == at(mstart) || 10 == at(mstart) {
                    mstart += 1;
                }
                let mut anc: Vec<&Header> =
                    Vec::with_capacity(ancestors.len() + 1);
                anc.push(&h);
                anc.extend_from_slice(ancestors);
                let m = Message::parse_nested(
                    &rfc2822[mstart.min(end)..end],
                    &anc,
                    depth + 1,
                    parts,
                );
                message = Some(Box::new(m));
            }
        }

        let is_message_part = message.is_some();
        bp.header = h;
        bp.children = children;
        bp.message = message;
        bp.text = text;
        bp.has_text = has_text;

        if bp.has_text {
            bp.num_bytes = body.len() as u32;
        } else if is_message_part {
            bp.num_bytes = raw_body.len() as u32;
        } else {
            bp.num_bytes = bp.data.len() as u32;
        }
        bp.num_encoded_bytes = raw_body.len() as u32;
        if bp.has_text || is_message_part {
            let mut n =
                raw_body.iter().filter(|&&b| b'\n' == b).count() as u32;
            if !raw_body.is_empty() && b'\n' != raw_body[raw_body.len() - 1]
            {
                n += 1;
            }
            bp.num_encoded_lines = n;
        }

        bp
    }
}

/// Guesses a codec for undeclared or misdeclared text.
fn guess_text_codec(body: &[u8]) -> Option<Codec> {
    // iso-2022-jp goes first because it's so restrictive, and because
    // 2022 strings also match the ascii and utf-8 tests
    if body.len() >= 3
        && 0x1B == body[0]
        && (b'(' == body[1] || b'$' == body[1])
        && (b'B' == body[2] || b'J' == body[2] || b'@' == body[2])
    {
        if let Some(c) = Codec::by_name("iso-2022-jp") {
            if c.to_unicode(body).wellformed() {
                return Some(c);
            }
        }
    }

    // could it be pure ascii?
    let a = Codec::ascii();
    let ad = a.to_unicode(body);
    if ad.wellformed() {
        return Some(a);
    }

    // does it look good as utf-8?
    let u = Codec::utf8();
    let ud = u.to_unicode(body);
    if ud.wellformed() {
        // if it's actually ascii, return that
        if ad.valid() {
            return Some(a);
        }
        return Some(u);
    }

    // guess a codec based on the content
    if let Some(g) = Codec::by_content(body) {
        if g.to_unicode(body).wellformed() {
            return Some(g);
        }
    }

    // is utf-8 at all plausible?
    if ud.valid() {
        return Some(u);
    }

    None
}

/// Like `guess_text_codec`, adjusted for the realities of HTML: 8859-1
/// is the traditional default (which in mail reality means
/// windows-1252), and some agents declare their charset only in a
/// `<meta http-equiv>` tag.
fn guess_html_codec(body: &[u8]) -> Option<Codec> {
    let mut guess = guess_text_codec(body)
        .or_else(|| Some(Codec::windows_1252()));

    // maybe a <meta http-equiv="content-type"> exists, and if so, is it
    // more likely to be correct than our guess?
    let lowered: Vec<u8> = body.iter().map(u8::to_ascii_lowercase).collect();
    let tag: &[u8] = b"<meta http-equiv=\"content-type\" content=\"";
    if let Some(p) = find_subsequence(&lowered, tag) {
        let vstart = p + tag.len();
        let vend = lowered[vstart..]
            .iter()
            .position(|&b| b'"' == b)
            .map(|q| vstart + q)
            .unwrap_or(lowered.len());
        let hf = super::field::HeaderField::create(
            "Content-Type",
            &lowered[vstart..vend],
        );
        let meta = hf
            .content_type()
            .and_then(|ct| ct.parameter("charset"))
            .and_then(Codec::by_name);

        if let Some(meta) = meta {
            let md = meta.to_unicode(body);
            let use_meta = match guess {
                None => md.valid(),
                Some(g) => {
                    let gd = g.to_unicode(body);
                    (md.valid() && !gd.text.is_empty()
                        && md.text == gd.text)
                        || (md.wellformed() && !gd.wellformed())
                        || (md.valid() && "windows-1252" == g.name())
                        || (md.valid() && !gd.valid())
                },
            };
            if use_meta {
                guess = Some(meta);
            }
        }
    }

    guess
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let first = needle[0];
    let mut at = 0;
    while let Some(p) = memchr::memchr(first, &haystack[at..]) {
        let p = at + p;
        if haystack[p..].starts_with(needle) {
            return Some(p);
        }
        at = p + 1;
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn mime_header(pairs: &[(&str, &str)]) -> Header {
        let mut h = Header::new(Mode::Mime);
        for (n, v) in pairs {
            h.add(super::super::field::HeaderField::create(
                n,
                v.as_bytes(),
            ));
        }
        h
    }

    #[test]
    fn plain_text_part() {
        let raw = b"hello world\r\n";
        let h = mime_header(&[("Content-Type", "text/plain")]);
        let bp = Bodypart::parse_bodypart(raw, 0, raw.len(), h, &[]);
        assert!(bp.is_text());
        assert_eq!("hello world\r\n", bp.text());
        assert_eq!(13, bp.num_bytes());
        assert_eq!(13, bp.num_encoded_bytes());
        assert_eq!(1, bp.num_encoded_lines());
        assert!(bp.error().is_none());
    }

    #[test]
    fn base64_binary_part() {
        let raw = b"aGVsbG8gd29ybGQ=\r\n";
        let h = mime_header(&[
            ("Content-Type", "application/octet-stream"),
            ("Content-Transfer-Encoding", "base64"),
        ]);
        let bp = Bodypart::parse_bodypart(raw, 0, raw.len(), h, &[]);
        assert!(!bp.is_text());
        assert_eq!(b"hello world", bp.data());
        assert_eq!(11, bp.num_bytes());
        assert_eq!(raw.len() as u32, bp.num_encoded_bytes());
    }

    #[test]
    fn quoted_printable_text() {
        let raw = b"That is not dead =\r\nwhich can eternal lie.\r\n";
        let h = mime_header(&[
            ("Content-Type", "text/plain"),
            ("Content-Transfer-Encoding", "quoted-printable"),
        ]);
        let bp = Bodypart::parse_bodypart(raw, 0, raw.len(), h, &[]);
        assert_eq!(
            "That is not dead which can eternal lie.\r\n",
            bp.text()
        );
    }

    #[test]
    fn declared_charset_is_used() {
        let raw = b"bl\xE5b\xE6rsyltet\xF8y\r\n";
        let h = mime_header(&[(
            "Content-Type",
            "text/plain; charset=iso-8859-1",
        )]);
        let bp = Bodypart::parse_bodypart(raw, 0, raw.len(), h, &[]);
        assert_eq!("blåbærsyltetøy\r\n", bp.text());
        assert!(bp.error().is_none());
    }

    #[test]
    fn false_us_ascii_claim_falls_back() {
        // declared us-ascii but contains utf-8; decode must not be
        // silently truncated
        let raw = "blåbær\r\n".as_bytes();
        let h = mime_header(&[(
            "Content-Type",
            "text/plain; charset=us-ascii",
        )]);
        let bp = Bodypart::parse_bodypart(raw, 0, raw.len(), h, &[]);
        assert_eq!("blåbær\r\n", bp.text());
        assert!(bp.error().is_none());
        // and the charset parameter now tells the truth
        assert_eq!(
            Some("utf-8"),
            bp.header().content_type().unwrap().parameter("charset")
        );
    }

    #[test]
    fn undecodable_text_keeps_round_trip_fidelity() {
        // neither ascii, utf-8 nor anything guessable cleanly: the
        // unknown-8bit codec preserves the bytes
        let raw = b"ok \xFF\xFE bytes";
        let h = mime_header(&[("Content-Type", "text/plain")]);
        let bp = Bodypart::parse_bodypart(raw, 0, raw.len(), h, &[]);
        assert!(bp.is_text());
        // windows-1252 decodes everything, so the guesser wins here;
        // what matters is that no byte was dropped
        assert_eq!(raw.len(), bp.text().chars().count());
        assert!(bp.text().starts_with("ok "));
    }

    #[test]
    fn html_meta_charset_sniff() {
        let raw = b"<html><meta http-equiv=\"content-type\" \
            content=\"text/html; charset=iso-8859-15\">\
            <body>\xA4</body></html>\r\n";
        let h = mime_header(&[("Content-Type", "text/html")]);
        let bp = Bodypart::parse_bodypart(raw, 0, raw.len(), h, &[]);
        // 0xA4 is the euro sign in 8859-15
        assert!(bp.text().contains('\u{20AC}'), "text: {:?}", bp.text());
    }

    #[test]
    fn two_part_multipart() {
        let raw: &[u8] = b"--cut\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            first part\r\n\
            --cut\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            second part\r\n\
            --cut--\r\n";
        let kids =
            Bodypart::parse_multipart(raw, 0, raw.len(), b"cut", false, &[]);
        assert_eq!(2, kids.len());
        assert_eq!(1, kids[0].number());
        assert_eq!(2, kids[1].number());
        // the CRLF before each boundary belongs to the boundary
        assert_eq!("first part", kids[0].text());
        assert_eq!("second part", kids[1].text());
        // on-wire accounting matches the input slices
        assert_eq!(
            b"first part".len() as u32,
            kids[0].num_encoded_bytes()
        );
        assert_eq!(
            b"second part".len() as u32,
            kids[1].num_encoded_bytes()
        );
    }

    #[test]
    fn multipart_boundary_whitespace_tolerated() {
        let raw: &[u8] = b"--cut  \t\r\n\
            \r\n\
            body\r\n\
            --cut--\r\n";
        let kids =
            Bodypart::parse_multipart(raw, 0, raw.len(), b"cut", false, &[]);
        assert_eq!(1, kids.len());
        assert_eq!("body", kids[0].text());
    }

    #[test]
    fn digest_defaults_to_message() {
        let raw: &[u8] = b"--cut\r\n\
            \r\n\
            From: a@b.com\r\n\
            Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
            \r\n\
            inner body\r\n\
            --cut--\r\n";
        let kids =
            Bodypart::parse_multipart(raw, 0, raw.len(), b"cut", true, &[]);
        assert_eq!(1, kids.len());
        let m = kids[0].message().expect("nested message");
        assert_eq!(
            "a",
            m.header()
                .addresses(FieldType::From)
                .unwrap()[0]
                .localpart()
        );
    }

    #[test]
    fn nested_message_rfc822() {
        let raw: &[u8] = b"\r\n\
            From: inner@example.com\r\n\
            Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
            Subject: inner\r\n\
            \r\n\
            inner text\r\n";
        let h = mime_header(&[("Content-Type", "message/rfc822")]);
        let bp = Bodypart::parse_bodypart(raw, 0, raw.len(), h, &[]);
        let m = bp.message().expect("nested message");
        assert_eq!(Some("inner"), m.header().subject());
        assert!(!bp.is_text());
    }

    #[test]
    fn recursion_is_bounded() {
        // a message/rfc822 matryoshka deeper than the ceiling
        let mut raw = Vec::new();
        for _ in 0..30 {
            raw.extend_from_slice(
                b"Content-Type: message/rfc822\r\n\r\n",
            );
        }
        raw.extend_from_slice(b"Date: x\r\n\r\nbody\r\n");
        let h = mime_header(&[("Content-Type", "message/rfc822")]);
        let mut parts = 0;
        let bp = Bodypart::parse_bodypart_limited(
            &raw,
            0,
            raw.len(),
            h,
            &[],
            0,
            &mut parts,
        );
        // walk down: some descendant must carry the recursion error
        let mut cur = &bp;
        let mut found = false;
        loop {
            if cur.error().map_or(false, |e| e.contains("recursion")) {
                found = true;
                break;
            }
            match cur.message().and_then(|m| m.children().first()) {
                Some(next) => cur = next,
                None => break,
            }
        }
        assert!(found, "no recursion error found");
    }
}
