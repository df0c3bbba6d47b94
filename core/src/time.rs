//! Time related utils.

use chrono::Utc;

/// DateTime is the alias of `chrono::DateTime<Utc>`.
pub type DateTime = chrono::DateTime<Utc>;

/// Number of .NET ticks (100ns) between 0001-01-01 and the unix epoch.
const DOTNET_TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// Create datetime of now.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format time into http date: `Tue, 01 Mar 2022 08:12:34 GMT`
///
/// This is the RFC 1123 layout required by `x-ms-date`.
pub fn format_http_date(t: DateTime) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Convert time into .NET ticks.
///
/// Telemetry tables key their rows by ticks, so OData filters compare against
/// this representation.
pub fn to_dotnet_ticks(t: DateTime) -> i64 {
    let micros = t.timestamp_micros();
    micros * 10 + DOTNET_TICKS_AT_UNIX_EPOCH
}
