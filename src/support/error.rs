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

use thiserror::Error;

/// Structural parse errors.
///
/// Most syntax problems are deliberately *not* errors of this type: the
/// parsers record a first-error string (with a byte offset and context
/// snippet) on the affected field or header and keep going, so that one bad
/// token does not discard an entire message. `ParseError` is reserved for
/// conditions under which parsing cannot meaningfully continue at all, such
/// as adversarial input that would otherwise exhaust the stack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected {what} at position {at} (nearby text: '{near}')")]
    Expected {
        what: String,
        at: usize,
        near: String,
    },
    #[error("Parser made no progress at position {at}")]
    NoProgress { at: usize },
    #[error("Message structure exceeds the recursion limit")]
    RecursionLimitExceeded,
    #[error("Message contains more parts than the implementation supports")]
    TooManyParts,
}
