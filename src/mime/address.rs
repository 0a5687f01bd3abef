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

//! E-mail addresses and the address-list parser.
//!
//! The parser reads *backward* from the end of the input, because trailing
//! context (`>`, `;`, a closing group, the `?=` end of an encoded word)
//! disambiguates a production far more reliably than its start does.
//! Parsing never aborts early: it records the first error, recovers, and
//! keeps going, so one bad address does not discard the rest of a message.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::cursor::{is_atext, Cursor};
use super::encoded_word::ew_decode;

const MAX_LOCALPART: usize = 128;

// Parenthesis-comment and group nesting both recurse; adversarial input
// must hit an error, not the end of the stack.
const MAX_NESTING: u32 = 64;

/// What kind of thing an [`Address`] is.
///
/// `Normal` has a localpart and a domain; `Local` has only a localpart
/// (so much legacy software generated those, and some still does);
/// `EmptyGroup` is a memberless RFC 2822 group, which has only a name;
/// `Bounce` is the `<>` un-address used in Return-Path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    Normal,
    Local,
    EmptyGroup,
    Bounce,
    Invalid,
}

impl Default for AddressType {
    fn default() -> Self {
        AddressType::Invalid
    }
}

/// One e-mail address, immutable once returned by the parser.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    name: String,
    localpart: String,
    domain: String,
    typ: AddressType,
    error: Option<String>,
    /// Persistence handle for the storage layer; never set by the parser.
    id: Option<u64>,
}

impl Address {
    /// Constructs an address with display-name `name`, localpart
    /// `localpart` and domain `domain`. The domain is lower-cased; the
    /// type is inferred from which parts are non-empty.
    pub fn new(name: &str, localpart: &str, domain: &str) -> Self {
        let domain = domain.to_ascii_lowercase();
        let typ = if !domain.is_empty() {
            AddressType::Normal
        } else if !localpart.is_empty() {
            AddressType::Local
        } else if !name.is_empty() {
            AddressType::EmptyGroup
        } else {
            AddressType::Bounce
        };
        Address {
            name: name.to_owned(),
            localpart: localpart.to_owned(),
            domain,
            typ,
            error: None,
            id: None,
        }
    }

    /// The RFC 2822 display-part, or for memberless groups the name of
    /// the group.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn localpart(&self) -> &str {
        &self.localpart
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn address_type(&self) -> AddressType {
        self.typ
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, e: impl Into<String>) {
        self.error = Some(e.into());
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    /// The localpart and domain as one string, or the full display form
    /// for types that have neither.
    pub fn lp_domain(&self) -> String {
        match self.typ {
            AddressType::Normal => {
                format!("{}@{}", self.quoted_localpart(), self.domain)
            },
            AddressType::Local => self.quoted_localpart(),
            _ => self.to_string(),
        }
    }

    fn quoted_localpart(&self) -> String {
        if self.localpart_is_sensible() {
            self.localpart.clone()
        } else {
            let escaped = self
                .localpart
                .replace('\\', "\\\\")
                .replace('"', "\\\"");
            format!("\"{}\"", escaped)
        }
    }

    fn quoted_name(&self) -> String {
        let atomish = self
            .name
            .chars()
            .all(|c| c == ' ' || c as u32 >= 128 || is_atext(c as u8));
        if atomish || self.name.is_empty() {
            self.name.clone()
        } else {
            let escaped =
                self.name.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{}\"", escaped)
        }
    }

    /// True if the localpart needs no quoting. Foreign addresses that do
    /// need quoting must still be permitted.
    pub fn localpart_is_sensible(&self) -> bool {
        if self.localpart.is_empty() {
            return false;
        }
        let b = self.localpart.as_bytes();
        for (i, &c) in b.iter().enumerate() {
            if b'.' == c {
                if Some(&b'.') == b.get(i + 1) {
                    return false;
                }
            } else if !is_atext(c) {
                return false;
            }
        }
        true
    }

    /// True if transmitting this address requires unicode capability.
    pub fn needs_unicode(&self) -> bool {
        !self.localpart.is_ascii() || !self.domain.is_ascii()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            AddressType::Invalid => Ok(()),
            AddressType::Bounce => write!(f, "<>"),
            AddressType::EmptyGroup => write!(f, "{}:;", self.quoted_name()),
            AddressType::Local => write!(f, "{}", self.quoted_localpart()),
            AddressType::Normal => {
                if self.name.is_empty() {
                    write!(f, "{}@{}", self.quoted_localpart(), self.domain)
                } else {
                    write!(
                        f,
                        "{} <{}@{}>",
                        self.quoted_name(),
                        self.quoted_localpart(),
                        self.domain
                    )
                }
            },
        }
    }
}

fn dedup_key(a: &Address) -> String {
    format!("{} {}@{}", a.name(), a.localpart(), a.domain())
}

/// Removes any addresses that exist twice in the list, keeping first
/// occurrences. An unnamed duplicate of a named address is also removed.
pub fn uniquify(l: &mut Vec<Address>) {
    let mut unique: HashMap<String, usize> = HashMap::new();
    for (idx, a) in l.iter().enumerate() {
        unique.entry(dedup_key(a)).or_insert(idx);
        if !a.name().is_empty() {
            unique
                .entry(format!(" {}@{}", a.localpart(), a.domain()))
                .or_insert(idx);
        }
    }

    let mut idx = 0;
    l.retain(|a| {
        let keep = Some(&idx) == unique.get(&dedup_key(a));
        idx += 1;
        keep
    });
}

// Enough of the TLD registry to find the border between two addresses
// that have been run together with no separator at all.
static TLDS: &[&str] = &[
    "com", "net", "org", "edu", "gov", "mil", "int", "info", "biz", "name",
    "aero", "coop", "museum", "at", "au", "be", "br", "ca", "ch", "cz",
    "de", "dk", "es", "fi", "fr", "gr", "hu", "ie", "il", "it", "jp", "kr",
    "mx", "nl", "no", "nz", "pl", "pt", "ru", "se", "sg", "tw", "uk", "us",
    "za",
];

/// Parses a comma/semicolon-separated address list into a deduplicated
/// sequence of [`Address`] values, with a single first-error message.
///
/// Everything is parsed as if it were an address-list; callers with more
/// specific requirements (mailbox-list, single mailbox) must check the
/// result themselves.
pub struct AddressParser {
    s: Vec<u8>,
    addresses: Vec<Address>,
    first_error: Option<String>,
    recent_error: Option<String>,
    last_comment: String,
    nesting: u32,
}

impl AddressParser {
    fn new(s: &[u8]) -> Self {
        AddressParser {
            s: s.to_vec(),
            addresses: Vec::new(),
            first_error: None,
            recent_error: None,
            last_comment: String::new(),
            nesting: 0,
        }
    }

    /// Parses `s` as an address list. The result can be inspected
    /// immediately with `addresses()` and `error()`.
    pub fn parse(s: &[u8]) -> AddressParser {
        let mut ap = AddressParser::new(s);
        ap.run();
        ap
    }

    fn run(&mut self) {
        let s = self.s.clone();

        let mut i = s.len() as isize - 1;
        let mut j = i + 1;
        let colon = s.contains(&b':');
        while i >= 0 && i < j {
            j = i;
            self.address(&mut i);
            while i < j
                && i >= 0
                && (b',' == self.ch(i) || (!colon && b';' == self.ch(i)))
            {
                i -= 1;
                self.space(&mut i);
            }
        }
        uniquify(&mut self.addresses);
        if i < 0 && self.first_error.is_none() {
            return;
        }

        // Plan B: look for '@' signs and scan for addresses around them.
        // Use what's there.
        self.addresses.clear();
        let mut left_border: isize = 0;
        let mut atsign = find_byte(&s, b'@', 0);
        while let Some(at) = atsign {
            let at = at as isize;
            let next_atsign = find_byte(&s, b'@', at as usize + 1);
            let right_border = match next_atsign {
                None => s.len() as isize,
                Some(n) => self.find_border(at + 1, n as isize - 1),
            };
            if left_border > 0
                && (b'.' == self.ch(left_border) || b'>' == self.ch(left_border))
            {
                left_border += 1;
            }
            let mut end = at + 1;
            while end <= right_border && b' ' == self.ch(end) {
                end += 1;
            }
            while end <= right_border && is_plain_addr_char(self.ch(end)) {
                end += 1;
            }
            let mut start = at;
            while start > left_border && b' ' == self.ch(start - 1) {
                start -= 1;
            }
            while start > left_border && is_plain_addr_char(self.ch(start - 1))
            {
                start -= 1;
            }
            let lp = simplified(&lossy(&s[start as usize..at as usize]));
            let dom =
                simplified(&lossy(&s[(at + 1) as usize..end as usize]));
            if !lp.is_empty() && !dom.is_empty() && lp.len() <= MAX_LOCALPART
            {
                self.addresses.push(Address::new("", &lp, &dom));
            }
            atsign = next_atsign;
            left_border = right_border;
        }
        if !self.addresses.is_empty() {
            log::debug!(
                "recovered {} address(es) by @-sign scan",
                self.addresses.len()
            );
            self.first_error = None;
            self.recent_error = None;
            uniquify(&mut self.addresses);
            return;
        }

        // Plan C: is it an attempt at group syntax by someone who would
        // be better employed elsewhere?
        if contains_seq(&s, b":;") && !s.contains(&b'@') {
            let colon_at = find_seq(&s, b":;").unwrap_or(0);
            let n = simplified(&lossy(&s[..colon_at]));
            let mut name = String::new();
            let mut bad = false;
            for c in n.chars() {
                if c.is_ascii_alphanumeric() {
                    name.push(c);
                } else if ' ' == c || '_' == c || '-' == c {
                    name.push('-');
                } else {
                    bad = true;
                }
            }
            if !bad {
                self.first_error = None;
                self.recent_error = None;
                self.addresses.clear();
                self.addresses.push(Address::new(&name, "", ""));
            }
        }
    }

    /// Parses a References/Message-Id style list of `<addr-spec>` units.
    ///
    /// Message-ids use the address productions of RFC 822/1034, and it is
    /// so common to have one bad message-id in an otherwise impeccable
    /// message that this does its best to skip ahead to the next unit on
    /// any syntax error, silently.
    pub fn references(r: &[u8]) -> AddressParser {
        let mut ap = AddressParser::new(r);
        let mut i = r.len() as isize - 1;
        ap.comment(&mut i);
        while i > 0 {
            let l = i;
            let mut ok = true;
            let mut dom = String::new();
            let mut lp = String::new();
            if b'>' != ap.ch(i) {
                ok = false;
            } else {
                i -= 1;
                dom = ap.domain(&mut i);
                if b'@' == ap.ch(i) {
                    i -= 1;
                } else {
                    ok = false;
                }
                lp = ap.localpart(&mut i);
                if b'<' == ap.ch(i) {
                    i -= 1;
                } else {
                    ok = false;
                }
                ap.comment(&mut i);
                if b',' == ap.ch(i) {
                    i -= 1;
                    ap.comment(&mut i);
                }
            }
            if ok && !dom.is_empty() && !lp.is_empty() {
                ap.add("", &lp, &dom);
            } else {
                i = l - 1;
                while i >= 0 && b' ' != ap.ch(i) {
                    i -= 1;
                }
                ap.comment(&mut i);
            }
        }
        ap.first_error = None;
        ap
    }

    /// The addresses parsed, in their on-wire order.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn into_addresses(self) -> Vec<Address> {
        self.addresses
    }

    /// The first error detected (and not compensated) by this parser.
    pub fn error(&self) -> Option<&str> {
        self.first_error.as_deref()
    }

    /// Asserts that the parse produced a single regular fully-qualified
    /// address; records an error if not.
    pub fn assert_single_address(&mut self) {
        let mut normal = 0;
        for a in &mut self.addresses {
            if AddressType::Normal == a.address_type() {
                normal += 1;
                if normal > 1 {
                    a.set_error(format!(
                        "This is address no. {} of 1 allowed",
                        normal
                    ));
                }
            } else {
                a.set_error(format!(
                    "Expected normal email address \
                     (whatever@example.com), got {}",
                    a
                ));
            }
        }

        let errors: Vec<String> = self
            .addresses
            .iter()
            .filter_map(|a| a.error().map(str::to_owned))
            .collect();
        for e in errors {
            self.error_at(&e, 0);
        }

        if self.addresses.is_empty() {
            self.error_at("No address supplied", 0);
        }
    }

    // The byte at position i, or 0 outside the input. Degenerate reads
    // keep the backward scan simple, exactly like a nul-padded string.
    fn ch(&self, i: isize) -> u8 {
        if i < 0 {
            0
        } else {
            self.s.get(i as usize).copied().unwrap_or(0)
        }
    }

    fn slice(&self, from: isize, to: isize) -> &[u8] {
        if from < 0 || to < from {
            return &[];
        }
        let to = ((to + 1) as usize).min(self.s.len());
        &self.s[from as usize..to]
    }

    fn prefix_contains(&self, upto: isize, needle: &[u8]) -> bool {
        contains_seq(self.slice(0, upto - 1), needle)
    }

    fn error_at(&mut self, msg: &str, i: isize) {
        let i = i.max(0) as usize;
        let from = i.saturating_sub(8);
        let near =
            simplified(&lossy(&self.s[from.min(self.s.len())..self.s.len().min(from + 20)]));
        let e = format!("{} at position {} (nearby text: '{}')", msg, i, near);
        if self.first_error.is_none() {
            self.first_error = Some(e.clone());
        }
        self.recent_error = Some(e);
    }

    /// Adds the address to the list unless it's there already. The name
    /// is adjusted heuristically.
    fn add(&mut self, name: &str, localpart: &str, domain: &str) {
        // if the localpart is too long, reject the add
        if localpart.len() > MAX_LOCALPART {
            self.error_at(
                &format!(
                    "Localpart too long ({} characters): {}@{}",
                    localpart.len(),
                    localpart,
                    domain
                ),
                0,
            );
            return;
        }

        let mut name = name.to_owned();

        // anti-outlook hackery, step 1: remove extra surrounding quotes
        let nb: Vec<char> = name.chars().collect();
        if nb.len() > 1 {
            let mut k = 0;
            while k < nb.len() - 1 - k
                && nb[k] == nb[nb.len() - 1 - k]
                && ('\'' == nb[k] || '"' == nb[k])
            {
                k += 1;
            }
            if k > 0 {
                name = nb[k..nb.len() - k].iter().collect();
            }
        }

        // for names, all whitespace is equal. "a b" == " a   b "
        name = simplified(&name);

        // sometimes a@b (c) is munged as (c) <a@b>; unmunge that
        if name.len() > 1 && name.starts_with('(') && name.ends_with(')') {
            name = simplified(&name[1..name.len() - 1]);
        }

        // anti-outlook, step 2: if the name is the same as the address,
        // just kill it
        let an = name.to_lowercase();
        if an == localpart.to_lowercase()
            || an
                == format!("{}@{}", localpart, domain).to_lowercase()
        {
            name.clear();
        }

        let mut a = Address::new(&name, localpart, domain);
        if let Some(ref e) = self.recent_error {
            a.set_error(e.clone());
        }
        self.addresses.insert(0, a);
    }

    /// Skips past whitespace at position `i`, or past nothing.
    fn space(&self, i: &mut isize) {
        while *i >= 0 && matches!(self.ch(*i), 32 | 9 | 13 | 10) {
            *i -= 1;
        }
    }

    /// Skips past a sequence of spaces and comments at `i`, remembering
    /// the content of the last comment as a fallback display name.
    fn comment(&mut self, i: &mut isize) {
        self.space(i);
        while *i > 0 && b')' == self.ch(*i) {
            let j = *i;
            *i -= 1;
            self.ccontent(i);
            if b'(' != self.ch(*i) {
                self.error_at("Unbalanced comment", *i);
            } else {
                let mut p = Cursor::new(self.slice(*i, j));
                self.last_comment = p.comment();
            }
            if *i > 0 {
                *i -= 1;
                self.space(i);
            } else {
                *i -= 1;
            }
        }
    }

    /// Helps comment() handle nesting: advances `i` to the start of a
    /// comment (where it points to '(').
    fn ccontent(&mut self, i: &mut isize) {
        if self.nesting >= MAX_NESTING {
            self.error_at("Comment nesting too deep", *i);
            *i = 0;
            return;
        }
        self.nesting += 1;
        loop {
            if *i > 0 && b'\\' == self.ch(*i - 1) {
                *i -= 1;
            } else if b')' == self.ch(*i) {
                self.comment(i);
            } else if b'(' == self.ch(*i) {
                break;
            }

            if *i <= 0 {
                break;
            }
            *i -= 1;
        }
        self.nesting -= 1;
    }

    /// Picks up a domain ending at `i`. Only syntactic validity matters;
    /// the domain may come from a very old message.
    fn domain(&mut self, i: &mut isize) -> String {
        self.comment(i);

        if *i < 0 {
            return String::new();
        }

        if self.ch(*i).is_ascii_digit() {
            // scan for an unquoted IPv4 address and turn it into an
            // address literal if found
            let j = *i;
            while self.ch(*i).is_ascii_digit() || b'.' == self.ch(*i) {
                *i -= 1;
            }
            let cand = lossy(self.slice(*i + 1, j));
            if let Ok(ip) = cand.parse::<std::net::Ipv4Addr>() {
                return format!("[{}]", ip);
            }
            *i = j;
        }

        if b']' == self.ch(*i) {
            *i -= 1;
            let j = *i;
            while *i >= 0 && b'[' != self.ch(*i) {
                *i -= 1;
            }
            if *i > 0 {
                *i -= 1;
                // take the literal, turn FWS into single spaces and
                // unquote quoted-pairs; this scans forward because of
                // the quoted-pairs
                unqp(self.slice(*i + 1, j + 1))
            } else {
                self.error_at("Literal domain missing '['", *i);
                String::new()
            }
        } else {
            // atoms, separated by '.' and (obsoletely) spaces; the
            // spaces are stripped
            let mut atoms = vec![self.atom(i)];
            self.comment(i);
            while *i >= 0 && b'.' == self.ch(*i) {
                *i -= 1;
                let a = self.atom(i);
                if !a.is_empty() {
                    atoms.insert(0, a);
                }
            }
            let dom = atoms.join(".");
            if dom.is_empty() {
                self.error_at("Zero-length domain", *i);
            }
            dom
        }
    }

    /// Parses and returns the atom ending at `i`.
    fn atom(&mut self, i: &mut isize) -> String {
        self.comment(i);
        let j = *i;
        while *i >= 0 && is_atext(self.ch(*i)) {
            *i -= 1;
        }
        let r = lossy(self.slice(*i + 1, j));
        self.comment(i);
        r
    }

    /// Parses an RFC 2822 phrase (a sequence of words, more or less)
    /// ending at `i`.
    fn phrase(&mut self, i: &mut isize) -> String {
        let mut r = String::new();
        self.comment(i);
        let mut done = false;
        let mut drop_name = false;
        let mut enc = false;
        while !done && *i >= 0 {
            let mut word = String::new();
            let mut encw = false;
            if *i > 0 && b'"' == self.ch(*i) {
                // quoted phrase
                let j = *i;
                *i -= 1;
                let mut progressing = true;
                while progressing {
                    if *i > 0 && b'\\' == self.ch(*i - 1) {
                        *i -= 2;
                    } else if *i >= 0 && b'"' != self.ch(*i) {
                        *i -= 1;
                    } else {
                        progressing = false;
                    }
                }
                if *i < 0 || b'"' != self.ch(*i) {
                    self.error_at("Quoted phrase must begin with '\"'", *i);
                }
                let w = unquoted(self.slice(*i, j));
                // pick apart embedded encoded-words
                let mut l = 0usize;
                while l <= w.len() && !drop_name {
                    match w[l..].find("=?") {
                        Some(rel) => {
                            let b = l + rel;
                            let e = w[b + 2..]
                                .find('?')
                                .and_then(|q1| {
                                    w[b + 2 + q1 + 1..]
                                        .find('?')
                                        .map(|q2| b + 2 + q1 + 1 + q2)
                                })
                                .and_then(|after| {
                                    w[after + 1..]
                                        .find("?=")
                                        .map(|q3| after + 1 + q3)
                                });
                            match e {
                                Some(e) => {
                                    let tmp = ew_decode(&w[b..e + 2])
                                        .unwrap_or_default();
                                    word.push_str(&w[l..b]);
                                    if tmp.is_empty() {
                                        drop_name = true;
                                    }
                                    word.push_str(&tmp);
                                    l = e + 2;
                                },
                                None => drop_name = true,
                            }
                        },
                        None => {
                            word.push_str(&w[l..]);
                            break;
                        },
                    }
                }
                *i -= 1;
            } else if b'.' == self.ch(*i) {
                // obs-phrase allows a single dot as alternative to word;
                // atom "." is allowed too, to handle initials
                *i -= 1;
                word = self.atom(i);
                word.push('.');
            } else {
                // single word
                let raw_start = *i;
                let mut a = self.atom(i);
                if !utf8_clean(self.slice(*i + 1, raw_start)) {
                    drop_name = true;
                }
                // some agents occasionally put backslashes into
                // otherwise unquoted names; work around that
                let mut l = a.len();
                while l > 0 && *i >= 0 && b'\\' == self.ch(*i) {
                    *i -= 1;
                    let w = self.atom(i);
                    l = w.len();
                    a = format!("{}{}", w, a);
                }
                if a.is_empty() {
                    done = true;
                }
                if a.starts_with("=?") {
                    match ew_decode(&a) {
                        Some(tmp) => {
                            let tmp = simplified(&tmp);
                            if tmp.starts_with("=?") || tmp.contains(" =?")
                            {
                                drop_name = true;
                            }
                            word = tmp;
                            encw = true;
                        },
                        None => word = a,
                    }
                } else {
                    word = a;
                }
            }

            if r.is_empty() {
                r = word;
            } else if word.ends_with(' ') {
                word.push_str(&r);
                r = word;
            } else if !word.is_empty() {
                if !enc
                    || !encw
                    || (word.len() + r.len() < 50
                        && r.as_bytes().first().map_or(false, |&c| c <= b'Z'))
                {
                    word.push(' ');
                }
                word.push_str(&r);
                r = word;
            }
            self.comment(i);
            enc = encw;
        }
        if drop_name {
            r.clear();
        }
        simplified(&r)
    }

    /// Parses the localpart ending at `i`.
    fn localpart(&mut self, i: &mut isize) -> String {
        let mut r = String::new();
        let mut sep = String::new();
        let mut more = *i >= 0;
        let mut atom_only = true;
        while more {
            let w = if b'"' == self.ch(*i) {
                atom_only = false;
                self.phrase(i)
            } else {
                self.atom(i)
            };
            let mut t = w.clone();
            t.push_str(&sep);
            t.push_str(&r);
            r = t;
            if *i >= 0 && b'.' == self.ch(*i) {
                sep = ".".to_owned();
                *i -= 1;
            } else if w.starts_with('%') {
                sep.clear();
            } else {
                more = false;
            }
        }
        if atom_only && r.is_empty() {
            self.error_at("Empty localpart", *i);
        }
        r
    }

    /// If `i` points to an obs-route, silently skips the route.
    fn route(&mut self, i: &mut isize) {
        if *i < 0 || b':' != self.ch(*i) || self.first_error.is_some() {
            return;
        }

        *i -= 1;
        let mut rdom = self.domain(i);
        if "mailto" == rdom {
            return;
        }
        while *i >= 0
            && !rdom.is_empty()
            && (b',' == self.ch(*i) || b'@' == self.ch(*i))
        {
            if b'@' == self.ch(*i) {
                *i -= 1;
            }
            while *i >= 0 && b',' == self.ch(*i) {
                *i -= 1;
            }
            rdom = self.domain(i);
        }
        self.first_error = None;
        self.recent_error = None;
    }

    // Salvages a display name from a comment that stood in for a
    // localpart, e.g. "(Recipient list suppressed)@localhost".
    fn name_from_comment(&mut self, i: isize) -> String {
        let n = simplified(&self.last_comment.clone());
        let mut name = String::new();
        for c in n.chars() {
            if c.is_ascii_alphanumeric() {
                name.push(c);
            } else if ' ' == c || '_' == c || '-' == c {
                name.push('-');
            } else {
                self.error_at("Localpart contains parentheses", i);
            }
        }
        name
    }

    /// Parses one address ending at position `i` and adds it to the
    /// list. The priority order of the productions tried is determined
    /// by the trailing characters.
    fn address(&mut self, i: &mut isize) {
        if self.nesting >= MAX_NESTING {
            self.error_at("Group nesting too deep", *i);
            *i = -1;
            return;
        }
        self.nesting += 1;
        self.address_inner(i);
        self.nesting -= 1;
    }

    fn address_inner(&mut self, i: &mut isize) {
        // we're presumably looking at an address
        self.last_comment.clear();
        self.recent_error = None;
        self.comment(i);
        while *i > 0 && b',' == self.ch(*i) {
            *i -= 1;
            self.comment(i);
        }
        while *i >= 0 && b'>' == self.ch(*i) && b'>' == self.ch(*i - 1) {
            *i -= 1;
        }

        if *i < 0 {
            // nothing there. error of some sort.
        } else if *i > 0 && b'<' == self.ch(*i - 1) && b'>' == self.ch(*i) {
            // the address is <>. whether that's legal is another matter.
            self.add("", "", "");
            *i -= 2;
            if *i >= 0 && b'<' == self.ch(*i) {
                *i -= 1;
            }
            let _ = self.phrase(i);
        } else if *i > 2
            && b'>' == self.ch(*i)
            && b';' == self.ch(*i - 1)
            && b':' == self.ch(*i - 2)
        {
            // a microsoft-broken '<Unknown-Recipient:;>'
            *i -= 3;
            let name = self.phrase(i);
            self.add(&name, "", "");
            if b'<' == self.ch(*i) {
                *i -= 1;
            }
        } else if *i > 2
            && b'>' == self.ch(*i)
            && b';' == self.ch(*i - 1)
            && self.prefix_contains(*i, b":@")
        {
            // maybe a sendmail-broken '<Unknown-Recipient:@x.y;>'
            let x = *i;
            *i -= 2;
            let _ = self.domain(i);
            if *i > 1 && b'@' == self.ch(*i) && b':' == self.ch(*i - 1) {
                *i -= 2;
                let name = self.phrase(i);
                self.add(&name, "", "");
                if *i >= 0 && b'<' == self.ch(*i) {
                    *i -= 1;
                }
            } else {
                *i = x;
            }
        } else if b'>' == self.ch(*i) {
            self.name_addr(i);
        } else if *i > 1
            && b'=' == self.ch(*i)
            && b'?' == self.ch(*i - 1)
            && b'>' == self.ch(*i - 2)
        {
            // we're looking at "=?charset?q?name<a@b>?=". how ugly.
            *i -= 3;
            let dom = self.domain(i);
            if b'@' == self.ch(*i) {
                *i -= 1;
                while *i > 0 && b'@' == self.ch(*i) {
                    *i -= 1;
                }
                let lp = self.localpart(i);
                if b'<' == self.ch(*i) {
                    *i -= 1;
                    // discard the "supplied" display-name
                    let _ = self.atom(i);
                    self.add("", &lp, &dom);
                } else {
                    self.error_at(
                        "Expected '<' while in =?...?...<localpart@domain>?=",
                        *i,
                    );
                }
            } else {
                self.error_at(
                    "Expected '@' while in =?...?...<localpart@domain>?=",
                    *i,
                );
            }
        } else if b';' == self.ch(*i) && self.prefix_contains(*i, b":") {
            // group
            let mut empty = true;
            *i -= 1;
            self.comment(i);
            while *i > 0 && b':' != self.ch(*i) {
                let j = *i;
                self.address(i);
                empty = false;
                if *i == j {
                    self.error_at("Parsing stopped while in group parser", *i);
                    return;
                }
                if b',' == self.ch(*i) {
                    *i -= 1;
                } else if b':' != self.ch(*i) {
                    self.error_at("Expected ':' or ',' while parsing group", *i);
                    return;
                }
            }
            if b':' == self.ch(*i) {
                *i -= 1;
                let name = self.phrase(i);
                if empty {
                    self.add(&name, "", "");
                }
            }
        } else if b'"' == self.ch(*i) && self.prefix_contains(*i, b"%\"") {
            // quite likely we're looking at x%"y@z", as once used on VMS
            let mut x = *i;
            x -= 1;
            let dom = self.domain(&mut x);
            if x > 0 && b'@' == self.ch(x) {
                x -= 1;
                let lp = self.localpart(&mut x);
                if x > 2 && b'"' == self.ch(x) && b'%' == self.ch(x - 1) {
                    x -= 2;
                    let _ = self.domain(&mut x);
                    self.add("", &lp, &dom);
                    *i = x;
                }
            }
        } else if b'"' == self.ch(*i) && self.prefix_contains(*i, b"::") {
            // we may be looking at VMS A::B "display-name"
            let mut b = *i - 1;
            while b > 0 && b'"' != self.ch(b) {
                b -= 1;
            }
            if b'"' == self.ch(b) {
                // we don't want name <localpart>, so the quoted part is
                // discarded no matter how well-formed it is
                *i = b - 1;
            }
            let lp = self.atom(i);
            if *i > 2 && b':' == self.ch(*i) && b':' == self.ch(*i - 1) {
                *i -= 2;
                let node = self.atom(i);
                self.add("", &format!("{}::{}", node, lp), "");
            } else {
                self.error_at("Expected NODE::USER while parsing VMS address", *i);
            }
        } else if *i > 10
            && self.ch(*i).is_ascii_digit()
            && b'.' == self.ch(*i - 2)
            && self.s.contains(&b'"')
            && contains_seq(&self.s, b"-19")
        {
            // we may be looking at A::B "display-name" date
            let mut x = *i;
            while x > 0 && b'"' != self.ch(x) {
                x -= 1;
            }
            let date = simplified(&lossy(self.slice(x + 1, *i - 1)))
                .to_ascii_lowercase();
            let plausible = date.bytes().all(|c| {
                c.is_ascii_lowercase()
                    || c.is_ascii_digit()
                    || b" -:.".contains(&c)
            });
            if plausible && date.contains("-19") {
                // at least it resembles the kind of date field we skip
                *i = x;
            }
        } else if is_quoted(&self.s) && self.s.contains(&b'@') {
            // the whole value is one quoted string around addresses
            let inner = unquoted_bytes(&self.s);
            let mut wrapped = AddressParser::new(&inner);
            wrapped.nesting = self.nesting + 1;
            wrapped.run();
            if wrapped.error().is_none() {
                // changes the address order...
                self.addresses.extend(wrapped.into_addresses());
                *i = -1;
            } else {
                self.error_at("Unexpected quote character", *i);
            }
        } else {
            // addr-spec
            let mut name =
                if ascii_printable(&self.last_comment)
                    && !self.last_comment.contains("=?")
                {
                    self.last_comment.clone()
                } else {
                    String::new()
                };
            let mut dom = self.domain(i);
            let mut lp = String::new();
            if b'@' == self.ch(*i) {
                *i -= 1;
                while *i > 0 && b'@' == self.ch(*i) {
                    *i -= 1;
                }
                let aftercomment = *i;
                self.comment(i);
                if *i >= 1 && b';' == self.ch(*i) {
                    let mut j = *i - 1;
                    while j > 0 && b' ' == self.ch(j) {
                        j -= 1;
                    }
                    if b':' == self.ch(j) {
                        // unlisted-recipients:; (no To-header)@do.ma.in
                        j -= 1;
                        let n = self.phrase(&mut j);
                        if !n.is_empty() {
                            lp.clear();
                            dom.clear();
                            name = n;
                            *i = j;
                        }
                    }
                } else if aftercomment > *i && *i < 0 {
                    // To: (Recipient list suppressed)@localhost
                    lp.clear();
                    dom.clear();
                    name = self.name_from_comment(*i);
                } else {
                    lp = self.localpart(i);
                }
            } else {
                lp = dom;
                dom = String::new();
            }
            self.route(i);
            self.comment(i);
            if !lp.is_empty() || !dom.is_empty() || !name.is_empty() {
                self.add(&name, &lp, &dom);
            }
        }
        self.comment(i);
    }

    // The name-addr production, plus every observed way of getting it
    // wrong.
    fn name_addr(&mut self, i: &mut isize) {
        *i -= 1;
        let mut dom = self.domain(i);
        let mut lp = String::new();
        let mut name = String::new();
        if b'<' == self.ch(*i) {
            lp = dom;
            dom = String::new();
        } else {
            if b'@' == self.ch(*i) {
                *i -= 1;
                while *i > 0 && b'@' == self.ch(*i) {
                    *i -= 1;
                }
                let aftercomment = *i;
                self.comment(i);
                if *i >= 1 && b';' == self.ch(*i) {
                    let mut j = *i - 1;
                    while j > 0 && b' ' == self.ch(j) {
                        j -= 1;
                    }
                    if b':' == self.ch(j) {
                        // <unlisted-recipients:; (no To-header)@do.ma.in>
                        j -= 1;
                        let n = self.phrase(&mut j);
                        if !n.is_empty() {
                            lp.clear();
                            dom.clear();
                            name = n;
                            *i = j;
                        }
                    }
                } else if aftercomment > *i && *i < 0 {
                    // To: <(Recipient list suppressed)@localhost>
                    lp.clear();
                    dom.clear();
                    name = self.name_from_comment(*i);
                } else {
                    lp = self.localpart(i);
                    if b'<' != self.ch(*i) {
                        // maybe "<john smith js@example.com>": letters
                        // and spaces between '<' and the localpart are
                        // really part of a display name glued onto it
                        let mut j = *i;
                        while j >= 0
                            && (self.ch(j).is_ascii_alphabetic()
                                || b' ' == self.ch(j))
                        {
                            j -= 1;
                        }
                        if j >= 0 && b'<' == self.ch(j) {
                            let mut tmp = lossy(self.slice(j + 1, *i));
                            if b' ' == self.ch(*i + 1) {
                                tmp.push(' ');
                            }
                            tmp.push_str(&lp);
                            lp = tmp;
                            *i = j;
                        }
                    }
                }
            }
            self.route(i);
        }
        if *i >= 0 && b'<' == self.ch(*i) {
            *i -= 1;
            while *i >= 0 && b'<' == self.ch(*i) {
                *i -= 1;
            }
            let mut n = self.phrase(i);
            while *i >= 0 && (b'@' == self.ch(*i) || b'<' == self.ch(*i)) {
                // we're looking at an unencoded 8-bit name, or at
                // 'lp@domain<lp@domain>', or at 'x<y<z@domain>'. we react
                // by ignoring the display-name.
                *i -= 1;
                let _ = self.phrase(i);
                n.clear();
            }
            if !n.is_empty() {
                name = n;
            }
        }
        // if the display-name contains unknown-8bit or undisplayable
        // marker code points, drop it
        if name.chars().any(|c| {
            let n = c as u32;
            (0xED80..=0xEDFF).contains(&n) || n < 0x20 || '\u{FFFD}' == c
        }) {
            name.clear();
        }
        self.add(&name, &lp, &dom);
    }

    /// Finds the point between `left` and `right` most likely to be the
    /// border between two addresses. Mucho heuristics. Never used for
    /// correct addresses, only when we're grasping at straws.
    fn find_border(&self, left: isize, right: isize) -> isize {
        // if there's only one chance, that _is_ the border
        if right <= left {
            return left;
        }

        for sep in &[b',', b';', b'<', b'>'] {
            if let Some(b) = find_byte(&self.s, *sep, left.max(0) as usize) {
                let b = b as isize;
                if b >= left && b <= right {
                    return b;
                }
            }
        }

        // whitespace?
        let mut b = left;
        while b <= right
            && !matches!(self.ch(b), b' ' | b'\t' | b'\r' | b'\n')
        {
            b += 1;
        }
        if b >= left && b <= right {
            return b;
        }

        // try to scan for the end of the presumed right-hand-side domain
        let mut b = left;
        let mut dot = b;
        while b <= right {
            let mut any = false;
            while b <= right
                && (self.ch(b).is_ascii_alphanumeric() || b'-' == self.ch(b))
            {
                any = true;
                b += 1;
            }
            // did we see a domain component at all?
            if !any {
                if b > left && b'.' == self.ch(b - 1) {
                    return b - 1;
                }
                return b;
            }
            if b <= right {
                if b'.' != self.ch(b) {
                    return b;
                }
                dot = b;
                b += 1;
                // is the next domain component a top-level domain?
                for tld in TLDS {
                    let tl = tld.len() as isize;
                    if b + tl <= right {
                        let after = self.ch(b + tl);
                        if !after.is_ascii_alphanumeric()
                            && lossy(self.slice(b, b + tl - 1))
                                .eq_ignore_ascii_case(tld)
                        {
                            return b + tl;
                        }
                    }
                }
            }
        }
        // the entire area is legal in a domain; if we've seen a dot in
        // the middle, use the rightmost one
        if dot > left && dot < right {
            return dot;
        }

        if right + 1 >= self.s.len() as isize {
            return right;
        }
        left
    }
}

/// Removes quoted-pairs and turns all whitespace runs into single spaces.
fn unqp(s: &[u8]) -> String {
    let mut sp = false;
    let mut r = String::new();
    let mut j = 0;
    while j < s.len() {
        if matches!(s[j], b' ' | 9 | 10 | 13) {
            sp = true;
            while j < s.len() && matches!(s[j], b' ' | 9 | 10 | 13) {
                j += 1;
            }
        } else {
            if sp && !r.is_empty() {
                r.push(' ');
            }
            sp = false;
            if b'\\' == s[j] {
                j += 1;
            }
            if j < s.len() {
                r.push(s[j] as char);
                j += 1;
            }
        }
    }
    r
}

// "xyz" including the quotes -> xyz with quoted-pairs resolved
fn unquoted(s: &[u8]) -> String {
    let inner = if s.len() >= 2 && b'"' == s[0] && b'"' == s[s.len() - 1] {
        &s[1..s.len() - 1]
    } else {
        s
    };
    let mut r = String::new();
    let mut j = 0;
    while j < inner.len() {
        if b'\\' == inner[j] && j + 1 < inner.len() {
            j += 1;
        }
        r.push(inner[j] as char);
        j += 1;
    }
    r
}

fn unquoted_bytes(s: &[u8]) -> Vec<u8> {
    let inner = if is_quoted(s) {
        &s[1..s.len() - 1]
    } else {
        s
    };
    let mut r = Vec::new();
    let mut j = 0;
    while j < inner.len() {
        if b'\\' == inner[j] && j + 1 < inner.len() {
            j += 1;
        }
        r.push(inner[j]);
        j += 1;
    }
    r
}

fn is_quoted(s: &[u8]) -> bool {
    s.len() >= 2 && b'"' == s[0] && b'"' == s[s.len() - 1]
}

fn lossy(s: &[u8]) -> String {
    String::from_utf8_lossy(s).into_owned()
}

fn utf8_clean(s: &[u8]) -> bool {
    std::str::from_utf8(s).is_ok()
}

fn ascii_printable(s: &str) -> bool {
    s.bytes().all(|b| (b' '..=b'~').contains(&b))
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn simplified(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut sp = false;
    for c in s.chars() {
        if c.is_whitespace() {
            sp = !out.is_empty();
        } else {
            if sp {
                out.push(' ');
            }
            sp = false;
            out.push(c);
        }
    }
    out
}

fn is_plain_addr_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b'.' == c || b'-' == c
}

fn find_byte(s: &[u8], b: u8, from: usize) -> Option<usize> {
    if from >= s.len() {
        return None;
    }
    memchr::memchr(b, &s[from..]).map(|p| p + from)
}

fn contains_seq(s: &[u8], needle: &[u8]) -> bool {
    find_seq(s, needle).is_some()
}

fn find_seq(s: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || s.len() < needle.len() {
        return None;
    }
    (0..=s.len() - needle.len()).find(|&k| &s[k..k + needle.len()] == needle)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn parse(s: &str) -> AddressParser {
        AddressParser::parse(s.as_bytes())
    }

    fn single(s: &str) -> Address {
        let ap = parse(s);
        assert!(
            ap.error().is_none(),
            "unexpected error for {:?}: {:?}",
            s,
            ap.error()
        );
        assert_eq!(1, ap.addresses().len(), "wrong count for {:?}", s);
        ap.addresses()[0].clone()
    }

    #[test]
    fn bare_addr_spec() {
        let a = single("ams@oryx.com");
        assert_eq!(AddressType::Normal, a.address_type());
        assert_eq!("", a.name());
        assert_eq!("ams", a.localpart());
        assert_eq!("oryx.com", a.domain());
        assert_eq!("ams@oryx.com", a.to_string());
    }

    #[test]
    fn name_addr_forms_are_equivalent() {
        for s in &[
            "ams@oryx.com (Abhijit Menon-Sen)",
            "Abhijit Menon-Sen <ams@oryx.com>",
            "\"Abhijit Menon-Sen\" <ams@oryx.com>",
            "\"'Abhijit Menon-Sen'\" <ams@oryx.com>",
            "Abhijit Menon-Sen <ams@Oryx.COM>",
            "Abhijit Menon-Sen <ams@oryx.com> (stuff)",
        ] {
            let a = single(s);
            assert_eq!("Abhijit Menon-Sen", a.name(), "for input {:?}", s);
            assert_eq!("ams", a.localpart());
            assert_eq!("oryx.com", a.domain());
        }
    }

    #[test]
    fn helpful_client_name_suppression() {
        for s in &[
            "<ams@oryx.com>",
            "\"ams@oryx.com\" <ams@oryx.com>",
            "\"'ams@oryx.com'\" <ams@oryx.com>",
            "ams <ams@oryx.com>",
        ] {
            let a = single(s);
            assert_eq!("", a.name(), "for input {:?}", s);
            assert_eq!("ams@oryx.com", a.to_string());
        }
    }

    #[test]
    fn encoded_word_display_names() {
        let a = single("=?us-ascii?q?Abhijit?= <ams@oryx.com>");
        assert_eq!("Abhijit", a.name());

        let a = single("=?ISO-8859-1?Q?Keld_J=F8rn?= <keld@dkuug.dk>");
        assert_eq!("Keld Jørn", a.name());
    }

    #[test]
    fn address_list_and_group() {
        let ap = parse("ams@oryx.com, arnt@gulbrandsen.priv.no");
        assert!(ap.error().is_none());
        assert_eq!(2, ap.addresses().len());
        assert_eq!("ams", ap.addresses()[0].localpart());
        assert_eq!("arnt", ap.addresses()[1].localpart());

        let ap = parse("friends: ams@oryx.com, arnt@gulbrandsen.priv.no;");
        assert!(ap.error().is_none(), "error: {:?}", ap.error());
        assert_eq!(2, ap.addresses().len());
    }

    #[test]
    fn empty_group() {
        let a = single("undisclosed-recipients:;");
        assert_eq!(AddressType::EmptyGroup, a.address_type());
        assert_eq!("undisclosed-recipients", a.name());
        assert_eq!("undisclosed-recipients:;", a.to_string());
    }

    #[test]
    fn bounce() {
        let a = single("<>");
        assert_eq!(AddressType::Bounce, a.address_type());
        assert_eq!("<>", a.to_string());
    }

    #[test]
    fn local_address() {
        let a = single("root");
        assert_eq!(AddressType::Local, a.address_type());
        assert_eq!("root", a.localpart());
    }

    #[test]
    fn domain_dedup_is_case_insensitive() {
        let ap = parse("a@b.com, a@b.COM");
        assert_eq!(1, ap.addresses().len());
    }

    #[test]
    fn named_and_unnamed_dedup() {
        let ap = parse("A B <x@y.com>, x@y.com");
        assert_eq!(1, ap.addresses().len());
        assert_eq!("A B", ap.addresses()[0].name());
    }

    #[test]
    fn localpart_case_is_preserved() {
        let ap = parse("AMS@oryx.com, ams@oryx.com");
        assert_eq!(2, ap.addresses().len());
    }

    #[test]
    fn domain_literals() {
        let a = single("x@[127.0.0.1]");
        assert_eq!("[127.0.0.1]", a.domain());

        // bare dotted-decimal domains become literals
        let a = single("x@127.0.0.1");
        assert_eq!("[127.0.0.1]", a.domain());
    }

    #[test]
    fn source_routes_are_skipped() {
        let a = single("<@relay1.example,@relay2.example:ams@oryx.com>");
        assert_eq!("ams", a.localpart());
        assert_eq!("oryx.com", a.domain());
    }

    #[test]
    fn microsoft_empty_group() {
        let a = single("<Unknown-Recipient:;>");
        assert_eq!(AddressType::EmptyGroup, a.address_type());
        assert_eq!("Unknown-Recipient", a.name());
    }

    #[test]
    fn comment_becomes_display_name() {
        let a = single("ams@oryx.com (Abhijit Menon-Sen)");
        assert_eq!("Abhijit Menon-Sen", a.name());

        // encoded words in comments are not trusted as display names
        let a = single("ams@oryx.com (=?utf-8?q?x?=)");
        assert_eq!("", a.name());
    }

    #[test]
    fn oversized_localpart_is_an_error() {
        let lp = "x".repeat(200);
        let ap = parse(&format!("{}@example.com", lp));
        assert!(ap.error().is_some());
    }

    #[test]
    fn double_angle_addresses() {
        let a = single("Name <<ams@oryx.com>>");
        assert_eq!("ams", a.localpart());
        assert_eq!("oryx.com", a.domain());
    }

    #[test]
    fn vms_node_user() {
        let a = single("NODE::USER \"Some User\"");
        assert_eq!(AddressType::Local, a.address_type());
        assert_eq!("NODE::USER", a.localpart());
        // the quoted part is deliberately not used as a display name
        assert_eq!("", a.name());
    }

    #[test]
    fn plan_b_salvage() {
        // the trailing unbalanced comment makes the real parse fail;
        // the @-sign scan still finds the address
        let ap = parse("ams@oryx.com ))");
        assert!(ap.error().is_none());
        assert_eq!(1, ap.addresses().len());
        assert_eq!("ams", ap.addresses()[0].localpart());
        assert_eq!("oryx.com", ap.addresses()[0].domain());
    }

    #[test]
    fn plan_c_salvage() {
        let ap = parse("Undisclosed recipients:;");
        assert!(ap.error().is_none());
        assert_eq!(1, ap.addresses().len());
        assert_eq!(
            AddressType::EmptyGroup,
            ap.addresses()[0].address_type()
        );
    }

    #[test]
    fn references_list() {
        let ap = AddressParser::references(
            b"<one@example.com> <two@example.org>",
        );
        assert!(ap.error().is_none());
        assert_eq!(2, ap.addresses().len());
        assert_eq!("one", ap.addresses()[0].localpart());
        assert_eq!("two", ap.addresses()[1].localpart());
    }

    #[test]
    fn references_skips_corrupt_ids() {
        let ap = AddressParser::references(
            b"<one@example.com> <corrupt@@@> <two@example.org>",
        );
        assert!(ap.error().is_none());
        assert_eq!(2, ap.addresses().len());
    }

    #[test]
    fn assert_single() {
        let mut ap = parse("a@b.com, c@d.com");
        ap.assert_single_address();
        assert!(ap.error().is_some());

        let mut ap = parse("a@b.com");
        ap.assert_single_address();
        assert!(ap.error().is_none());
    }

    #[test]
    fn deep_nesting_errors_out_instead_of_crashing() {
        let many = "(".repeat(5000) + &")".repeat(5000);
        let _ = parse(&many);
        let groups = "g:".repeat(2000) + "a@b.c" + &";".repeat(2000);
        let _ = parse(&groups);
    }

    #[test]
    fn quoted_whole_value() {
        let ap = parse("\"ams@oryx.com\"");
        assert!(ap.error().is_none(), "error: {:?}", ap.error());
        assert_eq!(1, ap.addresses().len());
        assert_eq!("ams", ap.addresses()[0].localpart());
    }

    proptest! {
        #[test]
        fn addr_spec_round_trips(
            lp in "[a-z][a-z0-9]{0,6}(\\.[a-z0-9]{1,4})?",
            dom in "[a-z][a-z0-9-]{0,8}\\.[a-z]{2,4}",
        ) {
            let s = format!("{}@{}", lp, dom);
            let ap = AddressParser::parse(s.as_bytes());
            prop_assert!(ap.error().is_none());
            prop_assert_eq!(1, ap.addresses().len());
            prop_assert_eq!(&s, &ap.addresses()[0].to_string());
        }

        #[test]
        fn parser_never_panics(
            s in prop::collection::vec(prop::num::u8::ANY, 0..64)
        ) {
            let _ = AddressParser::parse(&s);
            let _ = AddressParser::references(&s);
        }
    }
}
