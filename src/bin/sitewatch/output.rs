use std::io::Write;

/// Write one JSON document followed by a newline to stdout.
pub fn write_output(json: &str) -> Result<(), String> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(json.as_bytes())
        .and_then(|_| handle.write_all(b"\n"))
        .and_then(|_| handle.flush())
        .map_err(|e| format!("Failed to write to stdout: {}", e))
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Serialize and print, reporting failures on stderr
pub fn emit<T: serde::Serialize>(value: &T, compact: bool) -> bool {
    match to_json(value, compact).and_then(|json| write_output(&json)) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    }
}
