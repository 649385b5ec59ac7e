//! Archive naming and timestamp extraction
//!
//! Archives are named `backup-YYYY-MM-DD_HH-MM-SS.tar.gz`. The capture instant
//! embedded in the name (local wall-clock time) is the only timestamp rotation
//! ever looks at; filesystem times are not consulted.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Prefix shared by every archive the backup command produces
pub const ARCHIVE_PREFIX: &str = "backup-";

/// Extension shared by every archive the backup command produces
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Extension appended to an archive path to name its checksum sidecar
pub const CHECKSUM_SUFFIX: &str = ".md5";

const DATE_LEN: usize = "YYYY-MM-DD".len();
const NAME_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Build the archive name for a capture instant
pub fn archive_name_for(captured_at: NaiveDateTime) -> String {
    format!(
        "{}{}{}",
        ARCHIVE_PREFIX,
        captured_at.format(NAME_TIME_FORMAT),
        ARCHIVE_SUFFIX
    )
}

/// Build the `n`th alternative archive name for a capture instant
///
/// Used when two runs land in the same second: `backup-<ts>-1.tar.gz`, ...
/// The alternative still parses back to the same timestamp.
pub fn numbered_archive_name(captured_at: NaiveDateTime, n: u32) -> String {
    if n == 0 {
        return archive_name_for(captured_at);
    }
    format!(
        "{}{}-{}{}",
        ARCHIVE_PREFIX,
        captured_at.format(NAME_TIME_FORMAT),
        n,
        ARCHIVE_SUFFIX
    )
}

/// Position of a name among same-second archives
///
/// `backup-<ts>-n.tar.gz` yields `n`; every other name yields 0.
pub fn archive_sequence(name: &str) -> u32 {
    let stamped_len = ARCHIVE_PREFIX.len() + "YYYY-MM-DD_HH-MM-SS".len();
    name.strip_suffix(ARCHIVE_SUFFIX)
        .filter(|stem| stem.starts_with(ARCHIVE_PREFIX))
        .and_then(|stem| stem.get(stamped_len..))
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Check whether a file name looks like an archive produced by this tool
///
/// The date inside is not validated here: `backup-manual.tar.gz` is an
/// archive name whose timestamp simply cannot be derived.
pub fn is_archive_name(name: &str) -> bool {
    name.len() > ARCHIVE_PREFIX.len() + ARCHIVE_SUFFIX.len()
        && name.starts_with(ARCHIVE_PREFIX)
        && name.ends_with(ARCHIVE_SUFFIX)
}

/// Path of the checksum sidecar belonging to an archive
pub fn sidecar_path_for(archive: &Path) -> PathBuf {
    let mut raw: OsString = archive.as_os_str().to_owned();
    raw.push(CHECKSUM_SUFFIX);
    PathBuf::from(raw)
}

/// Derive the capture timestamp embedded in an archive name
///
/// Finds the first `YYYY-MM-DD` token that is a real calendar date, with an
/// optional time suffix (`_HH-MM-SS`, `THH:MM:SS`, seconds optional). A bare
/// date yields midnight. Returns `None` when no date can be found; such
/// archives are never rotated.
pub fn derive_timestamp(name: &str) -> Option<NaiveDateTime> {
    let bytes = name.as_bytes();
    if bytes.len() < DATE_LEN {
        return None;
    }

    for start in 0..=bytes.len() - DATE_LEN {
        let end = start + DATE_LEN;
        if !has_date_shape(&bytes[start..end]) {
            continue;
        }
        // Reject tokens glued to longer digit runs ("12025-11-01", "2025-11-012")
        if start > 0 && bytes[start - 1].is_ascii_digit() {
            continue;
        }
        if bytes.get(end).is_some_and(u8::is_ascii_digit) {
            continue;
        }

        // The window is pure ASCII, so both offsets are char boundaries
        let Ok(date) = NaiveDate::parse_from_str(&name[start..end], "%Y-%m-%d") else {
            continue;
        };
        let time = parse_time_suffix(&bytes[end..]).unwrap_or(NaiveTime::MIN);
        return Some(date.and_time(time));
    }

    None
}

fn has_date_shape(window: &[u8]) -> bool {
    window.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}

fn parse_time_suffix(rest: &[u8]) -> Option<NaiveTime> {
    let (&lead, rest) = rest.split_first()?;
    if !matches!(lead, b'_' | b'T' | b' ') {
        return None;
    }

    let hour = two_digits(rest.get(0..2)?)?;
    let sep = *rest.get(2)?;
    if !matches!(sep, b'-' | b':') {
        return None;
    }
    let minute = two_digits(rest.get(3..5)?)?;
    let second = match rest.get(5) {
        Some(&s) if s == sep => rest.get(6..8).and_then(two_digits).unwrap_or(0),
        _ => 0,
    };

    NaiveTime::from_hms_opt(hour, minute, second)
}

fn two_digits(pair: &[u8]) -> Option<u32> {
    match pair {
        [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => {
            Some(u32::from(a - b'0') * 10 + u32::from(b - b'0'))
        }
        _ => None,
    }
}
