//! Line-oriented parsing of notarization tool output.
//!
//! Both `notarytool` (`id: …`, `status: …`) and `altool`
//! (`RequestUUID = …`, `Status: …`) print `key<sep>value` lines, where the
//! separator is `:` or `=`.

use crate::submission::TrackingId;

const TRACKING_KEYS: &[&str] = &["id", "requestuuid", "request uuid"];

/// Pull the submission id out of a submit response.
pub fn parse_tracking_id(output: &str) -> Option<TrackingId> {
    output
        .lines()
        .filter_map(split_field)
        .find(|(key, value)| TRACKING_KEYS.contains(&key.as_str()) && is_id(value))
        .map(|(_, value)| TrackingId::from(value))
}

/// Pull the raw status token out of a status response.
pub fn parse_status(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(split_field)
        .find(|(key, value)| key == "status" && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Split at the first `:` or `=`; the key comes back lowercased.
fn split_field(line: &str) -> Option<(String, &str)> {
    let at = line.find(|c: char| c == ':' || c == '=')?;
    let key = line[..at].trim().to_ascii_lowercase();
    let value = line[at + 1..].trim();
    Some((key, value))
}

fn is_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
