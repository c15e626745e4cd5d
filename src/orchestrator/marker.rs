use serde_json::Value;

/// Result of scanning worker stdout for a marker line.
#[derive(Debug, PartialEq)]
pub enum MarkerScan {
    Payload(Value),
    /// The last marker line was present but its JSON did not parse.
    Malformed(String),
    Absent,
}

/// Find the last line starting with `marker` and parse the rest as JSON.
/// Earlier marker lines are ignored; everything else is diagnostics.
pub fn extract_marker(stdout: &str, marker: &str) -> MarkerScan {
    let Some(line) = stdout
        .lines()
        .rev()
        .map(|l| l.trim_end_matches('\r'))
        .find(|l| l.starts_with(marker))
    else {
        return MarkerScan::Absent;
    };

    match serde_json::from_str::<Value>(line[marker.len()..].trim()) {
        Ok(v) => MarkerScan::Payload(v),
        Err(e) => MarkerScan::Malformed(e.to_string()),
    }
}
