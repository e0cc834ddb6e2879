pub mod chat;
pub mod scan;
pub mod user;

pub use chat::*;
pub use scan::*;
pub use user::*;

/// Timestamp format used for all persisted datetimes.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub(crate) fn format_ts(ts: &chrono::NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(s: &str) -> chrono::NaiveDateTime {
    chrono::NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .unwrap_or_default()
}
