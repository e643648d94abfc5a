//! Proxy list parsing and loading.

use std::io;
use std::path::Path;

/// Parse a proxy list: one address per line, blank lines and `#` comments
/// skipped. Bare `host:port` lines get an `http://` scheme.
pub fn parse_proxy_list(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                None
            } else if line.contains("://") {
                Some(line.to_string())
            } else if line.contains(':') {
                Some(format!("http://{line}"))
            } else {
                None
            }
        })
        .collect()
}

/// Load a proxy list from a file path.
pub fn load_proxy_file(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_proxy_list(&content))
}
