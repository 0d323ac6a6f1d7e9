// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `DateTime`.

use std::{
    fmt,
    io::{Read, Write},
    ops::{Add, Sub},
};

use chrono::{Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::types::encoding::*;

const NANOS_PER_TICK: i64 = 100;
const TICKS_PER_SECOND: i64 = 1_000_000_000 / NANOS_PER_TICK;

pub type DateTimeUtc = chrono::DateTime<Utc>;

/// A date/time value. Encoded as the number of 100 nanosecond intervals since January 1, 1601 UTC.
/// A value of zero is the null date time.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct DateTime {
    date_time: DateTimeUtc,
}

impl BinaryEncoder<DateTime> for DateTime {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_i64(stream, self.checked_ticks())
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let ticks = read_i64(stream)?;
        let date_time = DateTime::from(ticks);
        if date_time.is_null() {
            Ok(date_time)
        } else {
            // Compensate for clock skew between the peers when the client is configured to do so
            Ok(date_time - decoding_options.client_offset)
        }
    }
}

impl Default for DateTime {
    fn default() -> Self {
        DateTime::epoch()
    }
}

impl Add<Duration> for DateTime {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        DateTime::from(self.date_time + duration)
    }
}

impl Sub<DateTime> for DateTime {
    type Output = Duration;

    fn sub(self, other: Self) -> Duration {
        self.date_time - other.date_time
    }
}

impl Sub<Duration> for DateTime {
    type Output = Self;

    fn sub(self, duration: Duration) -> Self {
        DateTime::from(self.date_time - duration)
    }
}

impl From<DateTimeUtc> for DateTime {
    fn from(date_time: DateTimeUtc) -> Self {
        // The wire format only carries whole ticks
        let nanos = (date_time.nanosecond() / NANOS_PER_TICK as u32) * NANOS_PER_TICK as u32;
        DateTime {
            date_time: date_time.with_nanosecond(nanos).unwrap_or(date_time),
        }
    }
}

impl From<i64> for DateTime {
    fn from(ticks: i64) -> Self {
        if ticks <= 0 {
            return DateTime::epoch();
        }
        let secs = ticks / TICKS_PER_SECOND;
        let nanos = (ticks % TICKS_PER_SECOND) * NANOS_PER_TICK;
        DateTime::from(Self::epoch_chrono() + Duration::seconds(secs) + Duration::nanoseconds(nanos))
    }
}

impl From<DateTime> for DateTimeUtc {
    fn from(value: DateTime) -> Self {
        value.date_time
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.date_time.to_rfc3339())
    }
}

impl DateTime {
    pub fn now() -> DateTime {
        DateTime::from(Utc::now())
    }

    /// The current time adjusted by the offset between this client and the server.
    pub fn now_with_offset(offset: Duration) -> DateTime {
        DateTime::from(Utc::now() + offset)
    }

    pub fn null() -> DateTime {
        DateTime::epoch()
    }

    pub fn is_null(&self) -> bool {
        self.ticks() == 0
    }

    /// January 1, 1601, the OPC UA epoch.
    pub fn epoch() -> DateTime {
        DateTime::from(Self::epoch_chrono())
    }

    /// Ticks since the epoch. Dates before the epoch are clamped to 0.
    pub fn ticks(&self) -> i64 {
        let duration = self.date_time - Self::epoch_chrono();
        let secs = duration.num_seconds();
        let nanos = (duration - Duration::seconds(secs))
            .num_nanoseconds()
            .unwrap_or(0);
        (secs * TICKS_PER_SECOND + nanos / NANOS_PER_TICK).max(0)
    }

    /// Ticks clamped to the range of dates the standard allows, 1601-01-01 to 9999-12-31.
    pub fn checked_ticks(&self) -> i64 {
        let ticks = self.ticks();
        let end = Self::endtimes_ticks();
        if ticks >= end {
            i64::MAX
        } else {
            ticks
        }
    }

    pub fn as_chrono(&self) -> DateTimeUtc {
        self.date_time
    }

    fn endtimes_ticks() -> i64 {
        DateTime::from(
            Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
                .single()
                .unwrap_or_else(Utc::now),
        )
        .ticks()
    }

    fn epoch_chrono() -> DateTimeUtc {
        Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::{Duration, TimeZone, Timelike, Utc};

    use super::*;

    #[test]
    fn epoch_is_null() {
        assert!(DateTime::null().is_null());
        assert_eq!(DateTime::epoch().encode_to_vec(), vec![0u8; 8]);
        assert!(!DateTime::now().is_null());
    }

    #[test]
    fn unix_epoch_ticks() {
        // 11644473600 seconds separate 1601-01-01 and 1970-01-01
        let unix = DateTime::from(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(unix.ticks(), 11_644_473_600 * TICKS_PER_SECOND);
        let decoded =
            DateTime::decode(&mut Cursor::new(unix.encode_to_vec()), &DecodingOptions::default())
                .unwrap();
        assert_eq!(decoded, unix);
    }

    #[test]
    fn now_survives_encoding() {
        let now = DateTime::now();
        assert_eq!(now.as_chrono().nanosecond() % NANOS_PER_TICK as u32, 0);
        let decoded =
            DateTime::decode(&mut Cursor::new(now.encode_to_vec()), &DecodingOptions::default())
                .unwrap();
        assert_eq!(decoded, now);

        let odd = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + Duration::nanoseconds(123_456_789);
        assert_eq!(
            DateTime::from(odd).as_chrono().nanosecond(),
            123_456_700
        );
    }
}
