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

//! Mailmend turns arbitrary, frequently non-conformant e-mail octet streams
//! into a validated, structured representation: addresses, typed header
//! fields, dates, and a MIME body tree.
//!
//! It is designed to be robust moreso than strictly correct. Decades of
//! buggy mail software produce input that violates every relevant RFC; the
//! goal here is maximum charitable recovery, not strict validation. Where a
//! message cannot be parsed as-is, a repair pass recovers a usable result
//! from whatever material is actually present, and never invents content it
//! cannot justify.
//!
//! The top-level entry point is [`mime::message::Message::parse`]. Framing
//! (one message per buffer) is the caller's responsibility.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod mime;
pub mod support;

pub use crate::mime::address::{Address, AddressParser, AddressType};
pub use crate::mime::bodypart::Bodypart;
pub use crate::mime::date::Date;
pub use crate::mime::field::{FieldType, FieldValue, HeaderField};
pub use crate::mime::header::{Header, Mode};
pub use crate::mime::message::Message;
pub use crate::support::codec::{Codec, CodecState};
pub use crate::support::error::ParseError;
