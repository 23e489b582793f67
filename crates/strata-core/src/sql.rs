//! SQL literal and query-parameter text encodings.
//!
//! Only trusted configuration values (table and cluster names) are quoted
//! into statement text. Anything a caller supplies is bound through
//! server-side `{name:Type}` placeholders, whose values travel in the text
//! encodings produced here.

use chrono::{DateTime, Utc};

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Quote a string as a single-quoted SQL literal.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", escape(s))
}

/// Encode an `Array(String)` parameter value, e.g. `['a','b']`.
pub fn format_param_array<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let items = values
        .into_iter()
        .map(quote_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", items)
}

/// Encode a `DateTime64(3)` parameter value in UTC.
pub fn format_param_datetime(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}
