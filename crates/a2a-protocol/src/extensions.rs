//! Extension negotiation via the `X-A2A-Extensions` header.

use std::collections::BTreeSet;

/// Header carrying the extension URIs a client asks the agent to activate.
pub const EXTENSIONS_HEADER: &str = "X-A2A-Extensions";

/// Collect requested extension URIs from every value of the extensions header.
///
/// Each header value may hold a comma-separated list; entries are trimmed and
/// empty entries dropped.
pub fn requested_extensions<'a, I>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .map(str::to_string)
        .collect()
}
