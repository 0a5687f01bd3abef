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

//! A single header field: name resolution, per-type parsing and
//! validation, and the allow-list of legacy client garbage that gets
//! silently neutralized instead of rejected.

use super::address::{Address, AddressParser, AddressType};
use super::cursor::Cursor;
use super::date::Date;
use super::mimefield::{
    parse_cte, ContentDisposition, ContentLanguage, ContentType,
};
use super::transfer::TransferEncoding;

/// The header field kinds this engine knows by name. Everything else is
/// `Other` and is stored verbatim, never rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    From,
    ResentFrom,
    Sender,
    ResentSender,
    ReturnPath,
    ReplyTo,
    To,
    Cc,
    Bcc,
    ResentTo,
    ResentCc,
    ResentBcc,
    MessageId,
    ResentMessageId,
    InReplyTo,
    References,
    Date,
    OrigDate,
    ResentDate,
    Subject,
    Comments,
    Keywords,
    ContentType,
    ContentTransferEncoding,
    ContentDisposition,
    ContentDescription,
    ContentLanguage,
    ContentLocation,
    ContentMd5,
    ContentId,
    MimeVersion,
    Received,
    Other,
}

static FIELD_NAMES: &[(&str, FieldType)] = &[
    ("From", FieldType::From),
    ("Resent-From", FieldType::ResentFrom),
    ("Sender", FieldType::Sender),
    ("Resent-Sender", FieldType::ResentSender),
    ("Return-Path", FieldType::ReturnPath),
    ("Reply-To", FieldType::ReplyTo),
    ("To", FieldType::To),
    ("Cc", FieldType::Cc),
    ("Bcc", FieldType::Bcc),
    ("Resent-To", FieldType::ResentTo),
    ("Resent-Cc", FieldType::ResentCc),
    ("Resent-Bcc", FieldType::ResentBcc),
    ("Message-Id", FieldType::MessageId),
    ("Resent-Message-Id", FieldType::ResentMessageId),
    ("In-Reply-To", FieldType::InReplyTo),
    ("References", FieldType::References),
    ("Date", FieldType::Date),
    ("Orig-Date", FieldType::OrigDate),
    ("Resent-Date", FieldType::ResentDate),
    ("Subject", FieldType::Subject),
    ("Comments", FieldType::Comments),
    ("Keywords", FieldType::Keywords),
    ("Content-Type", FieldType::ContentType),
    ("Content-Transfer-Encoding", FieldType::ContentTransferEncoding),
    ("Content-Disposition", FieldType::ContentDisposition),
    ("Content-Description", FieldType::ContentDescription),
    ("Content-Language", FieldType::ContentLanguage),
    ("Content-Location", FieldType::ContentLocation),
    ("Content-Md5", FieldType::ContentMd5),
    ("Content-Id", FieldType::ContentId),
    ("Mime-Version", FieldType::MimeVersion),
    ("Received", FieldType::Received),
];

/// Resolves a field name, case-insensitively, to its type.
pub fn field_type_named(name: &str) -> Option<FieldType> {
    FIELD_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, t)| t)
}

pub fn is_known_field_name(name: &str) -> bool {
    field_type_named(name).is_some()
}

/// The canonical spelling of a known field name.
pub fn canonical_name(t: FieldType) -> Option<&'static str> {
    FIELD_NAMES.iter().find(|&&(_, ft)| ft == t).map(|&(n, _)| n)
}

// "x-from-line" -> "X-From-Line"
fn header_cased(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = '-' == c;
    }
    out
}

/// The parsed, typed value a field carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Addresses(Vec<Address>),
    Date(Date),
    ContentType(ContentType),
    Encoding(TransferEncoding),
    Disposition(ContentDisposition),
    Languages(ContentLanguage),
    Text(String),
}

/// One RFC 822 header field: a canonical name, the raw on-wire value,
/// the typed parse result, and the first error hit while parsing.
#[derive(Clone, Debug)]
pub struct HeaderField {
    typ: FieldType,
    name: String,
    raw: Vec<u8>,
    value: FieldValue,
    error: Option<String>,
    position: Option<u32>,
}

impl HeaderField {
    /// Creates a field named `name` by parsing `raw` appropriately for
    /// the name.
    pub fn create(name: &str, raw: &[u8]) -> HeaderField {
        let typ = field_type_named(name).unwrap_or(FieldType::Other);
        let name = canonical_name(typ)
            .map(str::to_owned)
            .unwrap_or_else(|| header_cased(name));
        let mut f = HeaderField {
            typ,
            name,
            raw: unfold(raw),
            value: FieldValue::Text(String::new()),
            error: None,
            position: None,
        };
        f.parse();
        f
    }

    /// Builds a field directly from a typed value, for use by the repair
    /// pass when it reconstructs a field from material it found
    /// elsewhere.
    pub fn assemble(typ: FieldType, value: FieldValue) -> HeaderField {
        let name = canonical_name(typ)
            .map(str::to_owned)
            .unwrap_or_default();
        let mut f = HeaderField {
            typ,
            name,
            raw: Vec::new(),
            value,
            error: None,
            position: None,
        };
        f.raw = f.value_string().into_bytes();
        f
    }

    pub fn field_type(&self) -> FieldType {
        self.typ
    }

    /// The canonical name of this field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unfolded on-wire value.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn set_value(&mut self, v: FieldValue) {
        self.value = v;
    }

    /// True unless an error was detected during parsing. Unknown fields
    /// are always valid.
    pub fn valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, e: impl Into<String>) {
        self.error = Some(e.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// The field's ordinal within its header, for stable
    /// re-serialization.
    pub fn position(&self) -> Option<u32> {
        self.position
    }

    pub fn set_position(&mut self, p: u32) {
        self.position = Some(p);
    }

    pub fn addresses(&self) -> Option<&[Address]> {
        match self.value {
            FieldValue::Addresses(ref a) => Some(a),
            _ => None,
        }
    }

    pub fn addresses_mut(&mut self) -> Option<&mut Vec<Address>> {
        match self.value {
            FieldValue::Addresses(ref mut a) => Some(a),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<&Date> {
        match self.value {
            FieldValue::Date(ref d) => Some(d),
            _ => None,
        }
    }

    pub fn content_type(&self) -> Option<&ContentType> {
        match self.value {
            FieldValue::ContentType(ref ct) => Some(ct),
            _ => None,
        }
    }

    pub fn content_type_mut(&mut self) -> Option<&mut ContentType> {
        match self.value {
            FieldValue::ContentType(ref mut ct) => Some(ct),
            _ => None,
        }
    }

    pub fn encoding(&self) -> Option<TransferEncoding> {
        match self.value {
            FieldValue::Encoding(e) => Some(e),
            _ => None,
        }
    }

    pub fn disposition(&self) -> Option<&ContentDisposition> {
        match self.value {
            FieldValue::Disposition(ref d) => Some(d),
            _ => None,
        }
    }

    /// The parameter list of a Content-Type or Content-Disposition
    /// value, for in-place correction by the repair passes.
    pub fn value_mut_params(
        &mut self,
    ) -> Option<&mut super::mimefield::Parameters> {
        match self.value {
            FieldValue::ContentType(ref mut ct) => Some(&mut ct.params),
            FieldValue::Disposition(ref mut cd) => Some(&mut cd.params),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self.value {
            FieldValue::Text(ref t) => Some(t),
            _ => None,
        }
    }

    /// The canonical string form of the parsed value, for
    /// re-serialization. Fields that failed to parse render their raw
    /// value unchanged.
    pub fn value_string(&self) -> String {
        if !self.valid() {
            return latin1(&self.raw);
        }
        match self.value {
            FieldValue::Addresses(ref a) => match self.typ {
                FieldType::MessageId
                | FieldType::ContentId
                | FieldType::ResentMessageId
                | FieldType::References => a
                    .iter()
                    .map(|x| format!("<{}@{}>", x.localpart(), x.domain()))
                    .collect::<Vec<_>>()
                    .join(" "),
                FieldType::ReturnPath => match a.first() {
                    Some(x) if AddressType::Bounce == x.address_type() => {
                        "<>".to_owned()
                    },
                    Some(x) => {
                        format!("<{}@{}>", x.localpart(), x.domain())
                    },
                    None => String::new(),
                },
                _ => a
                    .iter()
                    .map(Address::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            FieldValue::Date(ref d) => d.rfc822(),
            FieldValue::ContentType(ref ct) => ct.to_string(),
            FieldValue::Encoding(e) => {
                super::mimefield::cte_name(e).to_owned()
            },
            FieldValue::Disposition(ref d) => d.to_string(),
            FieldValue::Languages(ref l) => l.to_string(),
            FieldValue::Text(ref t) => t.clone(),
        }
    }

    fn parse(&mut self) {
        let raw = std::mem::take(&mut self.raw);
        match self.typ {
            FieldType::From | FieldType::ResentFrom => {
                self.parse_mailbox_list(&raw)
            },
            FieldType::Sender => {
                self.parse_mailbox(&raw);
                if !self.valid()
                    && self.addresses().map_or(true, |a| a.is_empty())
                {
                    // sender is quite often wrong in otherwise perfectly
                    // legible messages; the owning header will drop the
                    // empty field
                    self.clear_error();
                }
            },
            FieldType::ResentSender => self.parse_mailbox(&raw),
            FieldType::ReturnPath => self.parse_return_path(&raw),
            FieldType::To
            | FieldType::Cc
            | FieldType::Bcc
            | FieldType::ReplyTo
            | FieldType::ResentTo
            | FieldType::ResentCc
            | FieldType::ResentBcc => self.parse_address_list(&raw),
            FieldType::MessageId
            | FieldType::ContentId
            | FieldType::ResentMessageId => self.parse_message_id(&raw),
            FieldType::References => self.parse_references(&raw),
            FieldType::Date | FieldType::OrigDate | FieldType::ResentDate => {
                self.parse_date(&raw)
            },
            FieldType::ContentType => {
                let (ct, e) = ContentType::parse(&raw);
                self.value = FieldValue::ContentType(ct);
                self.error = e;
            },
            FieldType::ContentTransferEncoding => {
                let (cte, e) = parse_cte(&raw);
                self.value = FieldValue::Encoding(cte);
                self.error = e;
            },
            FieldType::ContentDisposition => {
                let (cd, e) = ContentDisposition::parse(&raw);
                self.value = FieldValue::Disposition(cd);
                self.error = e;
            },
            FieldType::ContentLanguage => {
                let (cl, e) = ContentLanguage::parse(&raw);
                self.value = FieldValue::Languages(cl);
                self.error = e;
            },
            FieldType::MimeVersion => self.parse_mime_version(&raw),
            FieldType::ContentLocation => self.parse_content_location(&raw),
            FieldType::Subject | FieldType::Comments => {
                let mut p = Cursor::new(&raw);
                self.value = FieldValue::Text(p.text());
            },
            FieldType::InReplyTo
            | FieldType::Keywords
            | FieldType::Received
            | FieldType::ContentMd5
            | FieldType::ContentDescription
            | FieldType::Other => {
                self.value = FieldValue::Text(latin1(&raw));
            },
        }
        self.raw = raw;
    }

    fn parse_address_list(&mut self, raw: &[u8]) {
        let ap = AddressParser::parse(raw);
        self.error = ap.error().map(str::to_owned);
        let mut addresses = ap.into_addresses();

        // '<>' mixed with otherwise-valid recipients is recognized
        // legacy garbage; drop the bounces and keep the rest
        if matches!(
            self.typ,
            FieldType::To | FieldType::Cc | FieldType::Bcc
        ) && addresses
            .iter()
            .any(|a| AddressType::Bounce != a.address_type())
        {
            addresses
                .retain(|a| AddressType::Bounce != a.address_type());
        }

        self.value = FieldValue::Addresses(addresses);
        self.outlaw_bounce();

        if !self.valid()
            && matches!(
                self.typ,
                FieldType::To | FieldType::Cc | FieldType::Bcc
            )
            && is_legacy_garbage(raw)
        {
            log::debug!(
                "{}: neutralizing recognized legacy garbage",
                self.name
            );
            self.value = FieldValue::Addresses(Vec::new());
            self.clear_error();
        }
    }

    fn parse_mailbox_list(&mut self, raw: &[u8]) {
        let ap = AddressParser::parse(raw);
        self.error = ap.error().map(str::to_owned);
        self.value = FieldValue::Addresses(ap.into_addresses());

        // a mailbox-list is an address-list where groups aren't allowed
        if self.valid() {
            let bad = self.addresses().and_then(|a| {
                a.iter()
                    .find(|x| AddressType::EmptyGroup == x.address_type())
                    .map(|x| x.to_string())
            });
            if let Some(bad) = bad {
                self.set_error(format!("Invalid mailbox: '{}'", bad));
            }
        }
        self.outlaw_bounce();
    }

    fn parse_mailbox(&mut self, raw: &[u8]) {
        let mut ap = AddressParser::parse(raw);
        if ap.error().is_none() {
            ap.assert_single_address();
        }
        self.error = ap.error().map(str::to_owned);
        self.value = FieldValue::Addresses(ap.into_addresses());
        self.outlaw_bounce();
    }

    fn parse_return_path(&mut self, raw: &[u8]) {
        let ap = AddressParser::parse(raw);
        self.error = ap.error().map(str::to_owned);
        // Return-Path must be a single bounce or ordinary address.
        // Anything else is quietly discarded; an empty Return-Path is
        // not an error anywhere.
        let keep: Vec<Address> = ap
            .into_addresses()
            .into_iter()
            .filter(|a| {
                matches!(
                    a.address_type(),
                    AddressType::Bounce | AddressType::Normal
                )
            })
            .take(1)
            .collect();
        if !keep.is_empty() {
            self.clear_error();
        }
        self.value = FieldValue::Addresses(keep);
    }

    fn parse_message_id(&mut self, raw: &[u8]) {
        let ap = AddressParser::references(raw);
        if 1 == ap.addresses().len() {
            self.value = FieldValue::Addresses(ap.into_addresses());
        } else {
            self.value = FieldValue::Addresses(Vec::new());
            self.set_error(format!(
                "Need exactly one message-id, got {}",
                ap.addresses().len()
            ));
        }
    }

    fn parse_references(&mut self, raw: &[u8]) {
        // a single corrupt message-id must never poison the list, so
        // the reference parser silently skips what it cannot read
        let ap = AddressParser::references(raw);
        self.value = FieldValue::Addresses(ap.into_addresses());
    }

    fn parse_date(&mut self, raw: &[u8]) {
        let mut d = Date::new();
        d.set_rfc822(raw);
        if !d.valid() {
            self.set_error(format!(
                "Could not parse '{}'",
                simplified_latin1(raw)
            ));
        }
        self.value = FieldValue::Date(d);
    }

    /// Only version 1.0 is accepted. Since some message generators
    /// incorrectly send comments, this parser accepts them.
    fn parse_mime_version(&mut self, raw: &[u8]) {
        let mut p = Cursor::new(raw);
        p.comment();
        let v = p.dot_atom();
        p.comment();
        if "1.0" != v || !p.at_end() {
            self.set_error(format!(
                "Could not parse '{}'",
                simplified_latin1(raw)
            ));
        }
        self.value = FieldValue::Text(v);
    }

    fn parse_content_location(&mut self, raw: &[u8]) {
        let mut p = Cursor::new(raw);
        let mut t = String::new();

        // we pretend a URI is just something without spaces in it
        p.comment();
        loop {
            let c = p.next_char();
            if p.at_end() || b' ' == c || b'\t' == c {
                break;
            }
            t.push(p.character() as char);
        }
        p.comment();

        if !p.at_end() {
            self.set_error(format!(
                "Junk at end of '{}'",
                simplified_latin1(raw)
            ));
        }
        self.value = FieldValue::Text(t);
    }

    /// '<>' is legal in Return-Path but, as of long ago, nowhere else.
    fn outlaw_bounce(&mut self) {
        if FieldType::ReturnPath == self.typ || !self.valid() {
            return;
        }
        let has_bounce = self
            .addresses()
            .map_or(false, |a| {
                a.iter()
                    .any(|x| AddressType::Bounce == x.address_type())
            });
        if has_bounce {
            self.set_error("No-bounce address not allowed in this field");
        }
    }
}

/// Replaces every `[CR]LF SP/TAB` fold with a single space.
fn unfold(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        let b = s[i];
        if b'\r' == b && s.get(i + 1) == Some(&b'\n') {
            i += 2;
            if matches!(s.get(i), Some(&b' ') | Some(&b'\t')) {
                i += 1;
            }
            out.push(b' ');
        } else if b'\n' == b {
            i += 1;
            if matches!(s.get(i), Some(&b' ') | Some(&b'\t')) {
                i += 1;
            }
            out.push(b' ');
        } else {
            out.push(b);
            i += 1;
        }
    }
    out
}

fn latin1(s: &[u8]) -> String {
    s.iter().map(|&b| b as char).collect()
}

fn simplified_latin1(s: &[u8]) -> String {
    super::address::simplified(&latin1(s))
}

/// The explicit allow-list of garbage that legacy clients put in
/// recipient fields, recognized and neutralized rather than rejected.
///
/// Each rule is a named predicate so the boundary conditions stay
/// independently testable; they are empirically tuned, not derived from
/// any RFC.
pub fn is_legacy_garbage(raw: &[u8]) -> bool {
    let trimmed = trim_ascii(raw);
    let stripped: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|&b| !b.is_ascii_whitespace())
        .collect();

    garbage_only_control_bytes(&stripped)
        || garbage_single_punctuation(trimmed)
        || garbage_no_at_sign(trimmed)
        || garbage_at_host(trimmed)
}

fn trim_ascii(mut s: &[u8]) -> &[u8] {
    while let Some((&b, rest)) = s.split_first() {
        if b.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    while let Some((&b, rest)) = s.split_last() {
        if b.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    s
}

// e.g. Cc: ^A  (a lone control character)
fn garbage_only_control_bytes(t: &[u8]) -> bool {
    !t.is_empty() && t.iter().all(|&b| b < 32 || 127 == b)
}

// e.g. To: .  (a single stray punctuation character)
fn garbage_single_punctuation(t: &[u8]) -> bool {
    1 == t.len() && t[0].is_ascii_punctuation()
}

// e.g. To: recipient list suppressed  (no address at all)
fn garbage_no_at_sign(t: &[u8]) -> bool {
    !t.contains(&b'@')
}

// e.g. To: @host  (a domain with no localpart)
fn garbage_at_host(t: &[u8]) -> bool {
    t.len() > 1
        && b'@' == t[0]
        && t[1..]
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b'.' == b || b'-' == b)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn name_resolution() {
        assert_eq!(Some(FieldType::From), field_type_named("FROM"));
        assert_eq!(Some(FieldType::MimeVersion), field_type_named("mime-version"));
        assert_eq!(None, field_type_named("X-Spam-Score"));
        assert_eq!("X-Spam-Score", header_cased("x-sPAM-score"));
    }

    #[test]
    fn simple_from() {
        let f = HeaderField::create("from", b"Arnt Gulbrandsen <arnt@oryx.com>");
        assert!(f.valid());
        assert_eq!("From", f.name());
        let a = f.addresses().unwrap();
        assert_eq!(1, a.len());
        assert_eq!("Arnt Gulbrandsen", a[0].name());
    }

    #[test]
    fn from_rejects_groups() {
        let f = HeaderField::create("From", b"undisclosed-recipients:;");
        assert!(!f.valid());
    }

    #[test]
    fn sender_wants_one_address() {
        let f = HeaderField::create("Sender", b"a@b.com");
        assert!(f.valid());

        let f = HeaderField::create("Sender", b"a@b.com, c@d.com");
        assert!(!f.valid());

        // an unparsable sender becomes an empty, valid field; the
        // header drops it later
        let f = HeaderField::create("Sender", b"]]]");
        assert!(f.valid());
        assert!(f.addresses().unwrap().is_empty());
    }

    #[test]
    fn return_path_accepts_bounce() {
        let f = HeaderField::create("Return-Path", b"<>");
        assert!(f.valid());
        assert_eq!(
            AddressType::Bounce,
            f.addresses().unwrap()[0].address_type()
        );
        assert_eq!("<>", f.value_string());

        // non-bounce, non-normal content is quietly discarded
        let f = HeaderField::create("Return-Path", b"whatever:;");
        assert!(f.valid());
        assert!(f.addresses().unwrap().is_empty());
    }

    #[test]
    fn bounce_outlawed_elsewhere() {
        let f = HeaderField::create("Reply-To", b"<>");
        assert!(!f.valid());
    }

    #[test]
    fn bounce_mixed_with_recipients_is_neutralized() {
        let f = HeaderField::create("To", b"a@b.com, <>");
        assert!(f.valid());
        let a = f.addresses().unwrap();
        assert_eq!(1, a.len());
        assert_eq!("a", a[0].localpart());
    }

    #[test]
    fn to_at_host_is_recognized_garbage() {
        let f = HeaderField::create("To", b"@host");
        assert!(f.valid());
        assert!(f.addresses().unwrap().is_empty());
    }

    #[test]
    fn garbage_rule_table() {
        assert!(garbage_only_control_bytes(b"\x01"));
        assert!(!garbage_only_control_bytes(b""));
        assert!(!garbage_only_control_bytes(b"a\x01"));

        assert!(garbage_single_punctuation(b">"));
        assert!(garbage_single_punctuation(b"."));
        assert!(!garbage_single_punctuation(b"a"));
        assert!(!garbage_single_punctuation(b".."));

        assert!(garbage_no_at_sign(b"all of the recipients"));
        assert!(!garbage_no_at_sign(b"a@b"));

        assert!(garbage_at_host(b"@host.example"));
        assert!(!garbage_at_host(b"@host extra"));
        assert!(!garbage_at_host(b"@"));
        assert!(!garbage_at_host(b"@ho st"));
        assert!(is_legacy_garbage(b" @host "));
        assert!(!is_legacy_garbage(b"@host extra"));
    }

    #[test]
    fn message_id_wants_exactly_one() {
        let f = HeaderField::create("Message-Id", b"<a@b.c>");
        assert!(f.valid());
        assert_eq!("<a@b.c>", f.value_string());

        let f = HeaderField::create("Message-Id", b"<a@b.c> <d@e.f>");
        assert!(!f.valid());

        let f = HeaderField::create("Message-Id", b"utterly broken");
        assert!(!f.valid());
    }

    #[test]
    fn references_never_fail() {
        let f = HeaderField::create(
            "References",
            b"<a@b.c> garbage <d@e.f>",
        );
        assert!(f.valid());
        assert_eq!(2, f.addresses().unwrap().len());
        assert_eq!("<a@b.c> <d@e.f>", f.value_string());
    }

    #[test]
    fn date_field() {
        let f =
            HeaderField::create("Date", b"Fri, 13 Dec 2003 13:05:00 +0100");
        assert!(f.valid());
        assert_eq!("2003-12-13", f.date().unwrap().iso_date());

        let f = HeaderField::create("Date", b"yesterday-ish");
        assert!(!f.valid());
    }

    #[test]
    fn mime_version() {
        assert!(HeaderField::create("Mime-Version", b"1.0").valid());
        assert!(
            HeaderField::create("MIME-Version", b"1.0 (Produced by X)")
                .valid()
        );
        assert!(!HeaderField::create("Mime-Version", b"2.0").valid());
        assert!(!HeaderField::create("Mime-Version", b"1.0 beta").valid());
    }

    #[test]
    fn content_location() {
        let f = HeaderField::create(
            "Content-Location",
            b"http://example.com/x",
        );
        assert!(f.valid());
        assert_eq!(Some("http://example.com/x"), f.text());

        let f =
            HeaderField::create("Content-Location", b"one two");
        assert!(!f.valid());
    }

    #[test]
    fn subject_decodes_encoded_words() {
        let f = HeaderField::create(
            "Subject",
            b"=?ISO-8859-1?Q?Andr=E9?= was here",
        );
        assert!(f.valid());
        assert_eq!(Some("Andr\u{e9} was here"), f.text());
    }

    #[test]
    fn folded_values_unfold() {
        let f = HeaderField::create("Subject", b"one\r\n two\r\n three");
        assert_eq!(Some("one two three"), f.text());
    }

    #[test]
    fn unknown_fields_never_rejected() {
        let f = HeaderField::create("X-Mailer", b"Whatever 1.0 \xFF\xFE");
        assert!(f.valid());
        assert_eq!("X-Mailer", f.name());
    }
}
