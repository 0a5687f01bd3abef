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

pub mod address;
pub mod bodypart;
pub mod cursor;
pub mod date;
pub mod encoded_word;
pub mod field;
pub mod header;
pub mod message;
pub mod mimefield;
pub mod quoted_printable;
pub mod transfer;
