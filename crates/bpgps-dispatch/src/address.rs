use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub(crate) const STATE_SUFFIX: &str = "LA";
const STATE_NAME: &str = "louisiana";
const NAVIGATION_BASE: &str = "geo:0,0";

/// Everything but unreserved URI characters is escaped; a space becomes `%20`.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Cleans up a dispatched address so the navigation app can resolve it.
///
/// A comma-less address gets the default city and state appended. An address
/// that already has a comma but never mentions the state gets `, LA`.
pub fn format_address(raw: &str, default_city_state: &str) -> String {
    let mut address = raw.trim().to_string();
    if address.is_empty() {
        return address;
    }
    if !address.contains(',') {
        address.push_str(", ");
        address.push_str(default_city_state);
    } else {
        let lower = address.to_lowercase();
        if !lower.contains(&STATE_SUFFIX.to_lowercase()) && !lower.contains(STATE_NAME) {
            address.push_str(", ");
            address.push_str(STATE_SUFFIX);
        }
    }
    address
}

pub fn preview(address: &str, max_chars: usize) -> String {
    address.chars().take(max_chars).collect()
}

/// `geo:0,0?q=<address>` with the address percent-encoded.
pub fn navigation_uri(address: &str) -> String {
    format!("{NAVIGATION_BASE}?q={}", utf8_percent_encode(address, QUERY_VALUE))
}
