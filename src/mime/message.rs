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

//! The top-level message parser: splits the header block field by field,
//! runs the repair passes, decomposes the body into a part tree, and
//! aggregates the first error for the caller to act on.

use super::bodypart::Bodypart;
use super::field::FieldType;
use super::header::{Header, Mode};
use crate::support::codec::Codec;

/// One parsed RFC 2822 message: a header and a tree of body parts.
///
/// The caller owns the result; nothing here refers back to the input
/// buffer, so one thread per message needs no locks.
#[derive(Clone, Debug)]
pub struct Message {
    header: Header,
    children: Vec<Bodypart>,
    error: Option<String>,
}

impl Message {
    /// Parses one message from `raw`: a header block, a blank line, and
    /// a body. Framing is the caller's responsibility.
    pub fn parse(raw: &[u8]) -> Message {
        let mut parts = 0;
        Message::parse_inner(raw, &[], 0, &mut parts)
    }

    pub(crate) fn parse_nested(
        raw: &[u8],
        ancestors: &[&Header],
        depth: u32,
        parts: &mut u32,
    ) -> Message {
        Message::parse_inner(raw, ancestors, depth, parts)
    }

    fn parse_inner(
        raw: &[u8],
        ancestors: &[&Header],
        depth: u32,
        parts: &mut u32,
    ) -> Message {
        let mut i = 0usize;
        let mut header = Message::parse_header_region(
            &mut i,
            raw.len(),
            raw,
            Mode::Rfc2822,
        );
        header.repair();
        header.repair_with(ancestors, &raw[i.min(raw.len())..]);

        let ct = header.content_type().cloned();
        let children = match ct {
            Some(ref ct) if "multipart" == ct.typ => {
                let mut anc: Vec<&Header> =
                    Vec::with_capacity(ancestors.len() + 1);
                anc.push(&header);
                anc.extend_from_slice(ancestors);
                Bodypart::parse_multipart_limited(
                    raw,
                    i,
                    raw.len(),
                    ct.parameter("boundary").unwrap_or("").as_bytes(),
                    "digest" == ct.subtype,
                    &anc,
                    depth + 1,
                    parts,
                )
            },
            _ => {
                let bp = Bodypart::parse_bodypart_limited(
                    raw,
                    i,
                    raw.len(),
                    header.clone(),
                    ancestors,
                    depth + 1,
                    parts,
                );
                // the body parse may have corrected the charset
                // parameter; the message header reflects that
                header = bp.header().clone();
                vec![bp]
            },
        };

        let mut m = Message {
            header,
            children,
            error: None,
        };
        m.fix_8bit_header_fields();
        m.recompute_error();
        m
    }

    /// Creates a header in mode `mode` by parsing `rfc2822[*i..end]`
    /// field by field; `*i` is left at the first unparsed byte.
    ///
    /// A leading UTF-8 BOM and an mbox `From `-space line are skipped.
    /// Fields with empty values are dropped unless their name starts
    /// with `x-`.
    pub(crate) fn parse_header_region(
        i: &mut usize,
        end: usize,
        rfc2822: &[u8],
        mode: Mode,
    ) -> Header {
        let at =
            |p: usize| -> u8 { rfc2822.get(p).copied().unwrap_or(0) };
        let mut h = Header::new(mode);

        loop {
            if *i >= end {
                break;
            }
            if 0xEF == at(*i) && 0xBB == at(*i + 1) && 0xBF == at(*i + 2)
            {
                *i += 3;
            }
            let mut j = *i;
            while at(j) >= 33 && at(j) <= 127 && b':' != at(j) {
                j += 1;
            }
            if j == *i + 4
                && Mode::Rfc2822 == mode
                && j < rfc2822.len()
                && rfc2822[*i..=j].eq_ignore_ascii_case(b"from ")
            {
                // an mbox From-space line; skip and discard
                while *i < end && b'\r' != at(*i) && b'\n' != at(*i) {
                    *i += 1;
                }
                while b'\r' == at(*i) {
                    *i += 1;
                }
                if b'\n' == at(*i) {
                    *i += 1;
                }
            } else if j > *i && b':' == at(j) {
                let name_end = j;
                let name = &rfc2822[*i..name_end];
                *i = j + 1;
                while b' ' == at(*i) || b'\t' == at(*i) {
                    *i += 1;
                }
                j = *i;
                // a LF followed by SP or TAB continues the value
                while j < end
                    && (b'\n' != at(j)
                        || b' ' == at(j + 1)
                        || b'\t' == at(j + 1))
                {
                    j += 1;
                }
                let mut value_end = j;
                if value_end > 0 && b'\r' == at(value_end - 1) {
                    value_end -= 1;
                }
                let value = &rfc2822[*i..value_end];
                let name = String::from_utf8_lossy(name).into_owned();
                if value.iter().any(|b| !b.is_ascii_whitespace())
                    || name.to_ascii_lowercase().starts_with("x-")
                {
                    h.add(super::field::HeaderField::create(
                        &name, value,
                    ));
                }
                *i = j;
                if b'\r' == at(*i) && b'\n' == at(*i + 1) {
                    *i += 1;
                }
                *i += 1;
            } else {
                break;
            }
        }
        h
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The top-level body parts. A non-multipart message has exactly one
    /// child holding the whole body.
    pub fn children(&self) -> &[Bodypart] {
        &self.children
    }

    /// Every body part in the tree, preorder.
    pub fn all_bodyparts(&self) -> Vec<&Bodypart> {
        fn walk<'a>(list: &mut Vec<&'a Bodypart>, b: &'a Bodypart) {
            list.push(b);
            for c in b.children() {
                walk(list, c);
            }
            if let Some(m) = b.message() {
                for c in m.children() {
                    walk(list, c);
                }
            }
        }
        let mut out = Vec::new();
        for c in &self.children {
            walk(&mut out, c);
        }
        out
    }

    /// True if this is a valid RFC 2822 message with no known or
    /// detected errors.
    pub fn valid(&self) -> bool {
        self.error.is_none()
    }

    /// A message describing the first detected syntax error, or `None`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    // Some messages contain unlabelled 8-bit header content. Guess a
    // codec from all of it at once and re-decode what we can.
    fn fix_8bit_header_fields(&mut self) {
        let mut sample = Vec::new();
        for f in self.header.fields() {
            if f.raw().iter().any(|&b| b >= 128) {
                sample.extend_from_slice(f.raw());
                sample.push(b'\n');
            }
        }
        if sample.is_empty() {
            return;
        }
        let codec =
            Codec::by_content(&sample).unwrap_or_else(Codec::ascii);
        log::debug!(
            "re-decoding 8-bit header fields as {}",
            codec.name()
        );
        self.header.fix_8bit_fields(&codec);
    }

    /// Asks the header and every bodypart for error information and
    /// keeps the first, naming the offending part.
    fn recompute_error(&mut self) {
        self.error = None;

        if let Some(e) = self.header.error() {
            self.error = Some(e);
            return;
        }

        fn walk(
            children: &[Bodypart],
            prefix: &str,
            error: &mut Option<String>,
        ) {
            for b in children {
                if error.is_some() {
                    return;
                }
                let pn = if prefix.is_empty() {
                    b.number().max(1).to_string()
                } else {
                    format!("{}.{}", prefix, b.number().max(1))
                };
                if let Some(e) = b.header().error() {
                    *error = Some(format!(
                        "In header of bodypart {}: {}",
                        pn, e
                    ));
                    return;
                }
                if let Some(m) = b.message() {
                    if let Some(e) = m.header().error() {
                        *error = Some(format!(
                            "In header of bodypart {}.1: {}",
                            pn, e
                        ));
                        return;
                    }
                    walk(m.children(), &pn, error);
                }
                if error.is_none() {
                    if let Some(e) = b.error() {
                        *error =
                            Some(format!("In bodypart {}: {}", pn, e));
                        return;
                    }
                }
                walk(b.children(), &pn, error);
            }
        }
        walk(&self.children, "", &mut self.error);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn simple_message() {
        let m = Message::parse(
            b"From: Arnt Gulbrandsen <arnt@oryx.com>\r\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
              Subject: hello\r\n\
              \r\n\
              body text\r\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(Some("hello"), m.header().subject());
        assert_eq!(1, m.children().len());
        assert_eq!("body text\r\n", m.children()[0].text());
    }

    #[test]
    fn unix_line_endings_accepted() {
        let m = Message::parse(
            b"From: a@b.com\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\n\
              Subject: hi\n\
              \n\
              body\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(Some("hi"), m.header().subject());
        assert_eq!("body\r\n", m.children()[0].text());
    }

    #[test]
    fn bom_and_mbox_from_line_skipped() {
        let m = Message::parse(
            b"\xEF\xBB\xBFFrom arnt@oryx.com Fri Dec 13 13:05:00 2003\r\n\
              From: a@b.com\r\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
              \r\n\
              x\r\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(
            "a",
            m.header().addresses(FieldType::From).unwrap()[0].localpart()
        );
    }

    #[test]
    fn folded_fields() {
        let m = Message::parse(
            b"From: a@b.com\r\n\
              Date: Fri, 13 Dec 2003\r\n\
               13:05:00 +0100\r\n\
              Subject: one\r\n\
               two\r\n\
              \r\n\
              x\r\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(Some("one two"), m.header().subject());
        assert_eq!("2003-12-13", m.header().date().unwrap().iso_date());
    }

    #[test]
    fn empty_values_dropped_except_x() {
        let m = Message::parse(
            b"From: a@b.com\r\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
              Comments:\r\n\
              X-Empty:\r\n\
              \r\n\
              x\r\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(0, m.header().occurrences(FieldType::Comments));
        assert!(m.header().named_field("X-Empty", 0).is_some());
    }

    #[test]
    fn duplicate_date_repaired() {
        let m = Message::parse(
            b"From: a@b.com\r\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
              \r\n\
              x\r\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(1, m.header().occurrences(FieldType::Date));
    }

    #[test]
    fn legacy_garbage_recipient_accepted() {
        let m = Message::parse(
            b"From: a@b.com\r\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
              To: @plouf\r\n\
              \r\n\
              x\r\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert!(m.header().addresses(FieldType::To).is_none());
    }

    #[test]
    fn multipart_round_trip() {
        let raw: &[u8] = b"From: a@b.com\r\n\
            Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
            Content-Type: multipart/mixed; boundary=X\r\n\
            \r\n\
            preamble, to be ignored\r\n\
            --X\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            part one\r\n\
            --X\r\n\
            Content-Type: application/octet-stream\r\n\
            Content-Transfer-Encoding: base64\r\n\
            \r\n\
            aGVsbG8=\r\n\
            --X--\r\n\
            epilogue\r\n";
        let m = Message::parse(raw);
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(2, m.children().len());
        assert_eq!(1, m.children()[0].number());
        assert_eq!(2, m.children()[1].number());
        assert_eq!("part one", m.children()[0].text());
        assert_eq!(b"hello", m.children()[1].data());
        assert_eq!(
            b"part one".len() as u32,
            m.children()[0].num_encoded_bytes()
        );
        assert_eq!(
            b"aGVsbG8=".len() as u32,
            m.children()[1].num_encoded_bytes()
        );
    }

    #[test]
    fn nested_message_parses_recursively() {
        let raw: &[u8] = b"From: outer@example.com\r\n\
            Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
            Content-Type: message/rfc822\r\n\
            \r\n\
            From: inner@example.com\r\n\
            Date: Fri, 13 Dec 2003 14:00:00 +0100\r\n\
            Subject: the inner one\r\n\
            \r\n\
            inner body\r\n";
        let m = Message::parse(raw);
        assert!(m.valid(), "error: {:?}", m.error());
        let inner = m.children()[0].message().expect("nested message");
        assert_eq!(Some("the inner one"), inner.header().subject());
        assert_eq!(
            "inner",
            inner
                .header()
                .addresses(FieldType::From)
                .unwrap()[0]
                .localpart()
        );
    }

    #[test]
    fn missing_date_synthesized() {
        let m = Message::parse(b"From: a@b.com\r\n\r\nx\r\n");
        assert!(m.valid(), "error: {:?}", m.error());
        assert!(m.header().date().unwrap().valid());
    }

    #[test]
    fn charset_correction_visible_on_header() {
        let m = Message::parse(
            b"From: a@b.com\r\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
              Content-Type: text/plain; charset=us-ascii\r\n\
              \r\n\
              bl\xC3\xA5b\xC3\xA6r\r\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(
            Some("utf-8"),
            m.header().content_type().unwrap().parameter("charset")
        );
        assert_eq!("blåbær\r\n", m.children()[0].text());
    }

    #[test]
    fn aggregate_error_names_the_part() {
        let raw: &[u8] = b"From: a@b.com\r\n\
            Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
            Content-Type: multipart/mixed; boundary=X\r\n\
            \r\n\
            --X\r\n\
            Content-Type: text/plain\r\n\
            Content-Language: ???\r\n\
            Content-Language: !!!\r\n\
            Content-Language: ...\r\n\
            \r\n\
            hi\r\n\
            --X--\r\n";
        let m = Message::parse(raw);
        // three unparsable Content-Language fields cannot all be
        // repaired away silently... but the repair pass does drop
        // invalid Content-Language, so this one actually heals
        assert!(m.valid(), "error: {:?}", m.error());

        // an unhealable case: two different valid Subjects in a MIME
        // part are not on the repair menu, but subject duplication is
        // RFC 2822 mode only, so use duplicated Content-Disposition
        // values that disagree
        let raw: &[u8] = b"From: a@b.com\r\n\
            Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
            Content-Type: multipart/mixed; boundary=X\r\n\
            \r\n\
            --X\r\n\
            Content-Type: text/plain\r\n\
            Content-Type: text/html\r\n\
            \r\n\
            hi\r\n\
            --X--\r\n";
        let m = Message::parse(raw);
        assert!(!m.valid());
        assert!(
            m.error().unwrap().contains("bodypart 1"),
            "error: {:?}",
            m.error()
        );
    }

    #[test]
    fn eight_bit_subject_salvaged() {
        let m = Message::parse(
            b"From: a@b.com\r\n\
              Date: Fri, 13 Dec 2003 13:05:00 +0100\r\n\
              Subject: bl\xE5b\xE6r\r\n\
              \r\n\
              x\r\n",
        );
        assert!(m.valid(), "error: {:?}", m.error());
        assert_eq!(Some("blåbær"), m.header().subject());
    }
}
