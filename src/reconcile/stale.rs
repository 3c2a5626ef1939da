// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Staleness decisions.
//!
//! A remote artifact does not need to be replaced when the server reports it
//! was last touched at or after the moment the local descriptor last changed.
//! How precisely those two moments get compared has never been settled, so
//! the granularity is a [`ComparisonPolicy`] picked through the settings file.
//!
//! Remote timestamps usually come with a zone designator. Some servers emit
//! naive wall clock times instead, which are interpreted through a fixed UTC
//! offset (zero unless configured otherwise).

use jiff::{civil::DateTime, tz::Offset, Timestamp};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::metadata,
    path::Path,
    time::SystemTime,
};
use tracing::{debug, info};

const SECONDS_PER_HOUR: i64 = 60 * 60;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

/// Granularity used to compare remote and local timestamps.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonPolicy {
    /// Compare timestamps as they are.
    Exact,

    /// Truncate both timestamps to the hour.
    #[default]
    Hour,

    /// Truncate both timestamps to the calendar day in UTC.
    Day,
}

impl ComparisonPolicy {
    /// Decide whether remote state already covers local state.
    ///
    /// Returns `true` iff `remote >= local` after truncating both sides to
    /// the policy's granularity. Both timestamps are logged.
    pub fn is_stale(self, remote: Timestamp, local: Timestamp) -> bool {
        let stale = match self {
            Self::Exact => remote >= local,
            Self::Hour => truncate(remote, SECONDS_PER_HOUR) >= truncate(local, SECONDS_PER_HOUR),
            Self::Day => truncate(remote, SECONDS_PER_DAY) >= truncate(local, SECONDS_PER_DAY),
        };

        info!("descriptor last changed: {local}");
        info!("remote file last modified: {remote}");
        debug!("staleness by {self} comparison: {stale}");

        stale
    }
}

impl Display for ComparisonPolicy {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Exact => fmt.write_str("exact"),
            Self::Hour => fmt.write_str("hour"),
            Self::Day => fmt.write_str("day"),
        }
    }
}

fn truncate(timestamp: Timestamp, unit: i64) -> i64 {
    timestamp.as_second().div_euclid(unit)
}

/// Parse a timestamp reported by the server.
///
/// Accepts RFC 3339 timestamps. Naive date times are placed at the given UTC
/// offset. Returns `None` for anything else.
pub fn parse_remote_timestamp(raw: &str, offset_hours: i8) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(timestamp) = raw.parse::<Timestamp>() {
        return Some(timestamp);
    }

    let datetime = raw.parse::<DateTime>().ok()?;
    Offset::from_hours(offset_hours)
        .ok()?
        .to_timestamp(datetime)
        .ok()
}

/// Last modification time of a local file.
///
/// Returns `None` if the file cannot be inspected.
pub fn modified_at(path: impl AsRef<Path>) -> Option<Timestamp> {
    let modified: SystemTime = metadata(path.as_ref()).ok()?.modified().ok()?;
    Timestamp::try_from(modified).ok()
}
