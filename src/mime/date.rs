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

//! The `Date` value object and the lenient RFC 822 date parser.
//!
//! `set_rfc822` understands the canonical `[Wkd,] Day Mon Year HH:MM[:SS]
//! zone` grammar plus the dialects observed in decades of real mail:
//! missing weekday or comma, `Day-Mon-Year`, swapped day and month,
//! two-digit years, the year trailing the time, numeric months, a dot
//! after the month name, `.` as time separator, bare zone names, and the
//! `GMT+HH:MM` form some webmail invented. On any unrecoverable token the
//! whole date is invalid; no partial date is ever returned as if complete.

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use super::cursor::Cursor;

/// A parse-and-store calendar value with attendant time and timezone.
///
/// When `valid()` is false, all formatting functions return an empty
/// string. `minus0` records that the real UTC offset is unknown (the
/// RFC 822 `-0000` convention).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Date {
    day: u32,
    month: u32,
    year: i32,
    hour: u32,
    minute: u32,
    second: u32,
    /// Minutes east of UTC.
    tz: i32,
    tzn: String,
    valid: bool,
    minus0: bool,
}

// Time zone names with only one definition, or at least one
// overwhelmingly common one.
static ZONES: &[(&str, i32)] = &[
    ("gmt", 0),
    ("ut", 0),
    ("utc", 0),
    ("cut", 0),
    ("z", 0),
    ("wet", 0),
    ("bst", 60),
    ("nst", -210),
    ("ndt", -150),
    ("ast", -240),
    ("adt", -180),
    ("est", -300),
    ("edt", -240),
    ("cst", -360),
    ("cdt", -300),
    ("mst", -420),
    ("mdt", -360),
    ("pst", -480),
    ("pdt", -420),
    ("yst", -540),
    ("ydt", -480),
    ("akst", -540),
    ("akdt", -480),
    ("hst", -600),
    ("hast", -600),
    ("hadt", -540),
    ("ces", 120),
    ("cest", 120),
    ("mez", 60),
    ("mezt", 120),
    ("cet", 60),
    ("met", 60),
    ("eet", 120),
    ("msk", 180),
    ("msd", 240),
    ("wast", 480),
    ("wadt", 540),
    ("hkt", 480),
    ("cct", 480),
    ("jst", 480),
    ("kst", 540),
    ("kdt", 540),
    ("cast", 570),
    ("cadt", 630),
    ("east", 600),
    ("eadt", 660),
    ("nzst", 720),
    ("nzdt", 780),
    ("brt", -180),
    ("grnlnddt", -120),
    ("grnlndst", -180),
    ("mest", 120),
    ("mesz", 120),
    ("metdst", 120),
    ("sast", 120),
    ("sat", 120),
];

static MONTHS: &[&str] = &[
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct",
    "Nov", "Dec",
];

fn zone_offset(name: &str) -> Option<i32> {
    ZONES.iter().find(|z| z.0 == name).map(|z| z.1)
}

// 1-12 for january-december, or 0 for error
fn month_number(name: &str) -> u32 {
    let b = name.as_bytes();
    let lc = |i: usize| b.get(i).map(|c| c | 0x20).unwrap_or(0);
    match lc(0) {
        b'j' => {
            // "jan" "jun" "jul"
            if b'a' == lc(1) {
                1
            } else if b'n' == lc(2) {
                6
            } else if b'l' == lc(2) {
                7
            } else {
                0
            }
        },
        b'f' => {
            if b'e' == lc(1) {
                2
            } else {
                0
            }
        },
        b'm' => {
            // "mar" "may"
            if b'r' == lc(2) {
                3
            } else if b'y' == lc(2) {
                5
            } else {
                0
            }
        },
        b'a' => {
            // "apr" "aug"
            if b'p' == lc(1) {
                4
            } else if b'u' == lc(1) {
                8
            } else {
                0
            }
        },
        b's' => {
            if b'e' == lc(1) {
                9
            } else {
                0
            }
        },
        b'o' => {
            if b'c' == lc(1) {
                10
            } else {
                0
            }
        },
        b'n' => {
            if b'o' == lc(1) {
                11
            } else {
                0
            }
        },
        b'd' => {
            if b'e' == lc(1) {
                12
            } else {
                0
            }
        },
        _ => 0,
    }
}

// true if this may possibly be a weekday name
fn is_weekday(name: &str) -> bool {
    if name.is_empty() || month_number(name) != 0 {
        return false;
    }
    name.bytes().all(|c| c.is_ascii_alphabetic() || c >= 128)
}

fn parse_num(s: &str) -> Option<u32> {
    if s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}

impl Date {
    /// Constructs an empty, invalid Date.
    pub fn new() -> Self {
        Date::default()
    }

    fn reset(&mut self) {
        *self = Date::default();
    }

    /// True if the object is a legal date; false if the date is
    /// meaningless, unparsable or uninitialized.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The timezone offset in minutes, or 0 if the date is invalid. Note
    /// that +0000 and -0000 are indistinguishable here.
    pub fn offset(&self) -> i32 {
        if self.valid {
            self.tz
        } else {
            0
        }
    }

    /// Sets this date to the current date, time and local timezone.
    pub fn set_current_time(&mut self) {
        let now = Local::now();
        self.reset();
        self.day = now.day();
        self.month = now.month();
        self.year = now.year();
        self.hour = now.hour();
        self.minute = now.minute();
        self.second = now.second();
        self.tz = now.offset().local_minus_utc() / 60;
        self.valid = true;
    }

    /// Sets this date to `t` seconds after the start of 1970, give or take
    /// a few leap seconds. `t` is taken to be UTC.
    pub fn set_unix_time(&mut self, t: i64) {
        self.reset();
        let dt = match Utc.timestamp_opt(t, 0).single() {
            Some(dt) => dt,
            None => return,
        };
        self.day = dt.day();
        self.month = dt.month();
        self.year = dt.year();
        self.hour = dt.hour();
        self.minute = dt.minute();
        self.second = dt.second();
        self.valid = true;
    }

    /// The unix time corresponding to this date, or 0 if the date is
    /// invalid.
    pub fn unix_time(&self) -> i64 {
        if !self.valid {
            return 0;
        }
        let naive = match NaiveDate::from_ymd_opt(
            self.year,
            self.month,
            self.day,
        )
        .and_then(|d| d.and_hms_opt(self.hour, self.minute, self.second.min(59)))
        {
            Some(n) => n,
            None => return 0,
        };
        Utc.from_utc_datetime(&naive).timestamp() - i64::from(self.tz) * 60
    }

    /// Sets the date from the given components, which are presumed to be
    /// sensible. If they aren't, the object becomes invalid.
    pub fn set_date(
        &mut self,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        zone: i32,
    ) {
        self.reset();
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self.tz = zone;

        if month > 0
            && month <= 12
            && year > 0
            && second <= 60
            && minute <= 59
            && hour <= 23
            && day <= 31
        {
            self.valid = true;
        }
        self.check_harder();
    }

    /// Sets this date object to reflect the RFC 2822-format date in `s`.
    /// If there are any syntax errors, the date is set to be invalid.
    ///
    /// A number of common syntax errors are accepted.
    pub fn set_rfc822(&mut self, s: &[u8]) {
        let mut p = Cursor::new(s);
        self.reset();

        // skip over the introductory day of week
        let mut a = p.string();
        p.comment();
        if b'.' == p.next_char() {
            // sometimes people add an incorrect dot
            p.character();
        }

        if b',' == p.next_char() {
            p.character();
            a = p.string();
        } else if is_weekday(&a) {
            // sometimes there's no comma
            a = p.string();
        }

        // next comes the date. it _should_ be 13 dec 2003, but we also
        // accept 13 dec 03, dec 13 03 and dec 13 2003.

        let mut s1 = a;
        p.comment(); // and we accept "13, dec 2003"
        if b',' == p.next_char() {
            p.character();
        }
        let mut year_at_end = false;

        if s1.len() > 3 && b'-' == s1.as_bytes()[2] {
            // the whole block is for Date: 13-Dec-2003
            self.day = match s1.get(0..2).and_then(parse_num) {
                Some(n) => n,
                None => return,
            };
            self.month = s1
                .get(3..s1.len().min(6))
                .map_or(0, month_number);
            if 0 == self.month {
                return;
            }
            a = s1.get(7..).unwrap_or("").to_owned();
        } else {
            // and this bit for the legal way
            let mut s2 = p.string();
            if s1.as_bytes().first().map_or(false, |&c| c > b'9') {
                std::mem::swap(&mut s1, &mut s2);
            }
            self.day = match parse_num(&s1) {
                Some(n) => n,
                None => return,
            };

            self.month = month_number(&s2);
            if 0 == self.month {
                // also accept numerical months
                self.month = parse_num(&s2).unwrap_or(0);
                if self.month > 12 {
                    self.month = 0;
                }
            } else {
                // Some programs put a dot after the month's name.
                if b'.' == p.next_char() {
                    p.step();
                }
            }

            a = p.string();
            if a.len() < 3 && b':' == p.next_char() {
                year_at_end = true;
            }
        }

        if self.month < 1 || self.month > 12 {
            return;
        }

        if !year_at_end {
            // we process the year where it should be
            self.year = match parse_num(&a) {
                Some(n) => n as i32,
                None => return,
            };
            if self.year < 60 {
                self.year += 2000;
            } else if self.year < 100 {
                self.year += 1900;
            }

            // time is next. conveniently ':' ends an atom.
            a = p.string();
        }

        self.hour = match parse_num(&a) {
            Some(n) if n <= 23 => n,
            _ => return,
        };

        p.comment();
        let c = p.next_char();
        if b':' != c && b'.' != c {
            // one is legal, the other not
            return;
        }
        p.character();

        a = p.string();
        self.minute = match parse_num(&a) {
            Some(n) if n <= 59 => n,
            _ => return,
        };

        p.comment();
        let c = p.next_char();
        if b':' == c || b'.' == c {
            p.character();
            a = p.string();
            self.second = match parse_num(&a) {
                Some(n) if n <= 60 => n,
                _ => return,
            };
        }

        // timezone: +0530. we're stricter than the RFC: the minute part
        // must be 0 <= x <= 59 and the hour 0 <= x <= 29.

        let mut tzn = p.comment();
        self.tz = 0;
        let mut tzok = false;
        a = p.string();
        if a.to_ascii_lowercase().starts_with("gmt+")
            && b':' == p.next_char()
        {
            // one webmail provider has its own ideas about date fields,
            // apparently based on an RFC written at the University of Mars
            p.character();
            a = format!("{}{}", &a[3..], p.string());
        }
        let ab = a.as_bytes();
        if 5 == ab.len()
            && (b'+' == ab[0] || b'-' == ab[0])
            && (b'0'..=b'2').contains(&ab[1])
            && ab[2].is_ascii_digit()
            && (b'0'..=b'5').contains(&ab[3])
            && ab[4].is_ascii_digit()
        {
            let hours = parse_num(&a[1..3]).unwrap_or(0) as i32;
            let minutes = parse_num(&a[3..5]).unwrap_or(0) as i32;
            self.tz = minutes + 60 * hours;
            if b'-' == ab[0] {
                self.tz = -self.tz;
                if 0 == self.tz {
                    self.minus0 = true;
                }
            }
            tzok = true;
        } else if ab.first().map_or(false, u8::is_ascii_digit) && year_at_end
        {
            // having the year at the end doesn't necessarily mean at the
            // very end...
            if let Some(y) = parse_num(&a) {
                year_at_end = false;
                self.year = y as i32;
                if self.year < 60 {
                    self.year += 2000;
                } else if self.year < 100 {
                    self.year += 1900;
                }
            }
        } else {
            // could it be the time zone NAME, not in a comment?
            let l = a.to_ascii_lowercase();
            if zone_offset(&l).is_some() {
                tzn = l;
            }
        }

        let c = p.comment();
        if !c.is_empty() {
            tzn = c;
        }
        tzn = tzn.to_ascii_lowercase();

        if self.minus0 {
            // in this case we really don't want to hand out a zone
        } else if tzok && !tzn.is_empty() {
            if Some(self.tz) == zone_offset(&tzn) {
                self.tzn = tzn;
            }
        } else if !tzn.is_empty() {
            if let Some(off) = zone_offset(&tzn) {
                self.tzn = tzn;
                self.tz = off;
                tzok = true;
            }
        } else if !tzok {
            // no time zone supplied, also no comment name. we fall back
            // to -0000. hardly ideal.
            self.minus0 = true;
        }

        if year_at_end {
            a = p.string();
            self.year = match parse_num(&a) {
                Some(n) => n as i32,
                None => return,
            };
            if self.year < 60 {
                self.year += 2000;
            } else if self.year < 100 {
                self.year += 1900;
            }
        }

        self.valid = true;
        self.check_harder();
        if !self.valid {
            return;
        }

        if self.tz < 14 * 60 && self.tz > -14 * 60 {
            return; // fine
        }

        // some spammers use time zones like +1900, and a few thousand
        // people in the eastern part of Kiribati use +1400. neither can
        // be stored sensibly, so convert the date to -0000.
        log::debug!(
            "canonicalizing date with out-of-range zone {:+05} to UTC",
            self.tz / 60 * 100 + self.tz % 60
        );
        self.set_unix_time(self.unix_time());
        self.minus0 = true;
    }

    /// Checks that a presumably valid date really is. Flags November 31
    /// as invalid, all dates before 1600 ditto, etc.
    fn check_harder(&mut self) {
        if !self.valid {
            return;
        }

        if self.year < 1600 {
            self.valid = false;
        } else if self.day > 30
            && matches!(self.month, 4 | 6 | 9 | 11)
        {
            self.valid = false;
        } else if 2 == self.month && self.day > 29 {
            self.valid = false;
        } else if 0 == self.day || self.day > 31 {
            self.valid = false;
        }

        if 2 != self.month || self.day < 29 || !self.valid {
            return;
        }

        // leap years
        if 0 == self.year % 400 {
            // is a leap year
        } else if 0 == self.year % 100 {
            self.valid = false;
        } else if 0 == self.year % 4 {
            // is a leap year
        } else {
            self.valid = false;
        }
    }

    /// The date in RFC 822 format, or an empty string if invalid. If the
    /// year is too far in the past or future, the weekday is omitted (as
    /// is legal).
    pub fn rfc822(&self) -> String {
        if !self.valid {
            return String::new();
        }

        let mut r = String::new();
        if self.year > 1925 && self.year < 2100 {
            if let Some(d) =
                NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            {
                let wd = match d.weekday() {
                    Weekday::Mon => "Mon",
                    Weekday::Tue => "Tue",
                    Weekday::Wed => "Wed",
                    Weekday::Thu => "Thu",
                    Weekday::Fri => "Fri",
                    Weekday::Sat => "Sat",
                    Weekday::Sun => "Sun",
                };
                r.push_str(wd);
                r.push_str(", ");
            }
        }

        r.push_str(&format!(
            "{} {} {} {:02}:{:02}:{:02} ",
            self.day,
            MONTHS[self.month as usize - 1],
            self.year,
            self.hour,
            self.minute,
            self.second
        ));

        r.push(if self.minus0 || self.tz < 0 { '-' } else { '+' });
        r.push_str(&format!(
            "{:02}{:02}",
            self.tz.abs() / 60,
            self.tz.abs() % 60
        ));

        if !self.minus0 && !self.tzn.is_empty() {
            r.push_str(" (");
            r.push_str(&self.tzn.to_ascii_uppercase());
            r.push(')');
        }

        r
    }

    /// An IMAP-format date-time, or an empty string if invalid.
    pub fn imap(&self) -> String {
        if !self.valid {
            return String::new();
        }
        format!(
            "{:02}-{}-{:04} {:02}:{:02}:{:02} {}{:02}{:02}",
            self.day,
            MONTHS[self.month as usize - 1],
            self.year,
            self.hour,
            self.minute,
            self.second,
            if self.minus0 || self.tz < 0 { '-' } else { '+' },
            self.tz.abs() / 60,
            self.tz.abs() % 60
        )
    }

    /// The date part as a ten-character ISO 8601 date, e.g. "2004-02-29".
    pub fn iso_date(&self) -> String {
        if !self.valid {
            return String::new();
        }
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// The time part as an eight-character ISO 8601 string.
    pub fn iso_time(&self) -> String {
        if !self.valid {
            return String::new();
        }
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }

    /// Date, time and offset mangled together, ISO style.
    pub fn iso_date_time(&self) -> String {
        if !self.valid {
            return String::new();
        }
        format!(
            "{} {} {}{}:{:02}",
            self.iso_date(),
            self.iso_time(),
            if self.tz < 0 { "-" } else { "+" },
            self.tz.abs() / 60,
            self.tz.abs() % 60
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parsed(s: &str) -> Date {
        let mut d = Date::new();
        d.set_rfc822(s.as_bytes());
        d
    }

    #[test]
    fn canonical_form() {
        let d = parsed("Fri, 13 Dec 2003 13:05:00 +0100");
        assert!(d.valid());
        assert_eq!("2003-12-13", d.iso_date());
        assert_eq!("13:05:00", d.iso_time());
        assert_eq!(60, d.offset());
        assert_eq!("Sat, 13 Dec 2003 13:05:00 +0100", d.rfc822());
    }

    #[test]
    fn weekday_really_is_friday() {
        // 12 Dec 2003 was a Friday
        let d = parsed("Fri, 12 Dec 2003 13:05:00 +0100");
        assert_eq!("Fri, 12 Dec 2003 13:05:00 +0100", d.rfc822());
    }

    #[test]
    fn missing_weekday_and_comma() {
        assert!(parsed("13 Dec 2003 13:05:00 +0100").valid());
        assert!(parsed("Fri 13 Dec 2003 13:05:00 +0100").valid());
    }

    #[test]
    fn hyphenated_date() {
        let d = parsed("13-Dec-2003 13:05:00 +0100");
        assert!(d.valid());
        assert_eq!("2003-12-13", d.iso_date());
    }

    #[test]
    fn swapped_month_and_day() {
        let d = parsed("Dec 13 2003 13:05:00 +0100");
        assert!(d.valid());
        assert_eq!("2003-12-13", d.iso_date());
    }

    #[test]
    fn numeric_month() {
        let d = parsed("13 12 2003 13:05:00 +0100");
        assert!(d.valid());
        assert_eq!("2003-12-13", d.iso_date());
    }

    #[test]
    fn two_digit_years() {
        assert_eq!("2003-12-13", parsed("13 Dec 03 13:05 +0000").iso_date());
        assert_eq!("1974-12-13", parsed("13 Dec 74 13:05 +0000").iso_date());
    }

    #[test]
    fn year_at_end() {
        let d = parsed("Fri Dec 13 13:05:00 2003");
        assert!(d.valid());
        assert_eq!("2003-12-13", d.iso_date());
        assert_eq!("13:05:00", d.iso_time());
    }

    #[test]
    fn named_zones() {
        let d = parsed("13 Dec 2003 13:05:00 EST");
        assert!(d.valid());
        assert_eq!(-300, d.offset());

        let d = parsed("13 Dec 2003 13:05:00 +0100 (CET)");
        assert!(d.valid());
        assert_eq!(60, d.offset());
        assert!(d.rfc822().contains("(CET)"));
    }

    #[test]
    fn martian_gmt_form() {
        let d = parsed("13 Dec 2003 13:05:00 GMT+01:00");
        assert!(d.valid());
        assert_eq!(60, d.offset());
    }

    #[test]
    fn dot_as_time_separator() {
        let d = parsed("13 Dec 2003 13.05.00 +0000");
        assert!(d.valid());
        assert_eq!("13:05:00", d.iso_time());
    }

    #[test]
    fn day_of_month_bounds() {
        assert!(!parsed("32 Dec 2003 00:00:00 +0000").valid());
        assert!(!parsed("31 Nov 2003 00:00:00 +0000").valid());
        assert!(parsed("31 Dec 2003 00:00:00 +0000").valid());
        assert!(!parsed("0 Dec 2003 00:00:00 +0000").valid());
    }

    #[test]
    fn leap_year_rule() {
        assert!(parsed("29 Feb 2000 12:00:00 +0000").valid());
        assert!(!parsed("29 Feb 1900 12:00:00 +0000").valid());
        assert!(parsed("29 Feb 2004 12:00:00 +0000").valid());
        assert!(!parsed("29 Feb 2003 12:00:00 +0000").valid());
        assert!(!parsed("30 Feb 2004 12:00:00 +0000").valid());
    }

    #[test]
    fn time_bounds() {
        assert!(!parsed("13 Dec 2003 24:00:00 +0000").valid());
        assert!(!parsed("13 Dec 2003 13:60:00 +0000").valid());
        // leap second is allowed
        assert!(parsed("13 Dec 2003 13:05:60 +0000").valid());
        assert!(!parsed("13 Dec 2003 13:05:61 +0000").valid());
    }

    #[test]
    fn out_of_range_zone_canonicalizes() {
        let d = parsed("13 Dec 2003 13:05:00 +1900");
        assert!(d.valid());
        // converted to UTC with unknown sign
        assert!(d.rfc822().ends_with("-0000"));
        assert_eq!(0, d.offset());
    }

    #[test]
    fn unix_time_round_trip() {
        let d = parsed("13 Dec 2003 13:05:00 +0100");
        let t = d.unix_time();
        let mut e = Date::new();
        e.set_unix_time(t);
        assert_eq!("2003-12-13", e.iso_date());
        assert_eq!("12:05:00", e.iso_time());
        assert_eq!(t, e.unix_time());
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(!parsed("").valid());
        assert!(!parsed("not a date").valid());
        assert!(!parsed("13 Foo 2003 13:05:00 +0000").valid());
        assert!(!parsed("13 Dec 2003").valid());
    }
}
