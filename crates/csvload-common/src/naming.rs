//! Stored file naming
//!
//! Uploaded files are stored as `<base>-<YYYYMMDDhhmmss>.<ext>`. Only the timestamp
//! separates two uploads of the same file, so re-uploads within one second collide.

use chrono::{DateTime, TimeZone};

/// Timestamp layout used in stored file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Base name used when the client sends no usable file name.
pub const FALLBACK_BASE: &str = "upload";

/// Build the stored name for `original` uploaded at `at`.
///
/// Directory components are dropped, split on `/` as well as `\`. `<base>` is
/// everything before the first `.`, `<ext>` everything after the last one.
pub fn timestamped_file_name<Tz>(original: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let stamp = at.format(TIMESTAMP_FORMAT);
    let file_name = original
        .trim()
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or("");

    let (base, ext) = match (file_name.find('.'), file_name.rfind('.')) {
        (Some(first), Some(last)) => (&file_name[..first], Some(&file_name[last + 1..])),
        _ => (file_name, None),
    };
    let base = if base.is_empty() { FALLBACK_BASE } else { base };

    match ext.filter(|e| !e.is_empty()) {
        Some(ext) => format!("{}-{}.{}", base, stamp, ext),
        None => format!("{}-{}", base, stamp),
    }
}
