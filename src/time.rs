// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use chrono::{DateTime, Month, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Average length of a year in seconds.
pub const YEAR_SECS: i64 = 31_556_926;
/// Average length of a month in seconds.
pub const MONTH_SECS: i64 = 2_629_743;

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

/// Unix-seconds timestamp used to place videos in the archive tree.
///
/// Year and month are derived from fixed average lengths rather than the
/// calendar, so they can disagree with the real date near boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    pub fn from_unix_secs(secs: i64) -> Self {
        Time(secs)
    }

    pub fn unix_secs(&self) -> i64 {
        self.0
    }

    pub fn year(&self) -> i64 {
        self.0.div_euclid(YEAR_SECS) + 1970
    }

    pub fn month(&self) -> Month {
        // The last ten seconds of an average year fall past twelve average months.
        let index = (self.0.rem_euclid(YEAR_SECS) / MONTH_SECS).min(11);
        MONTHS[index as usize]
    }

    /// Full English name of the month, used as an archive directory name.
    pub fn month_name(&self) -> &'static str {
        self.month().name()
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::<Utc>::from_timestamp(self.0, 0) {
            Some(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}", self.0),
        }
    }
}
