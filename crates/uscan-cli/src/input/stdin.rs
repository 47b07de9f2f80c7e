use serde_json::Value;
use std::io::{self, Read};

/// Piped deal document, parsed as JSON first and YAML second.
///
/// `Ok(None)` when stdin is an interactive terminal or the pipe carries
/// only whitespace, so the caller can report the missing `--input`.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut raw = String::new();
    io::stdin().read_to_string(&mut raw)?;
    parse_document(&raw)
}

fn parse_document(raw: &str) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let doc = raw.trim();
    if doc.is_empty() {
        return Ok(None);
    }

    // JSON is also YAML, but its errors are more useful to report.
    match serde_json::from_str(doc) {
        Ok(value) => Ok(Some(value)),
        Err(json_err) => serde_yaml::from_str(doc)
            .map(Some)
            .map_err(|_| format!("stdin is neither valid JSON nor YAML: {json_err}").into()),
    }
}
