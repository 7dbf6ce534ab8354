//! General utilities: binary detection, freshness checks, timestamps.

use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

/// Byte values that a text file may contain: the printable range plus a
/// small set of control characters (BEL, BS, TAB, LF, FF, CR, ESC).
fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 7 | 8 | 9 | 10 | 12 | 13 | 27) || ((0x20..=0xFF).contains(&byte) && byte != 0x7F)
}

/// Whether the given bytes look like binary content.
///
/// A buffer is binary iff it contains at least one byte outside the
/// text set. Callers pass at most the first 1024 bytes of a file.
pub fn is_binary_bytes(bytes: &[u8]) -> bool {
    bytes.iter().any(|byte| !is_text_byte(*byte))
}

/// Whether the file at `path` is binary, judged from its first KiB.
pub fn is_binary_file(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut buffer = [0u8; 1024];
    let read = file.read(&mut buffer)?;
    Ok(is_binary_bytes(&buffer[..read]))
}

/// Whether `path` exists and was modified within the last `seconds`.
pub fn modified_within(path: &Path, seconds: f64) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(elapsed) => elapsed.as_secs_f64() < seconds,
        // Modified in the future; treat as fresh.
        Err(_) => true,
    }
}

/// Update the mtime of `path`, creating it (and its parent) if needed.
pub fn touch_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Rewriting the (empty) content bumps the mtime on every platform.
    std::fs::write(path, b"")
}

/// Format a Unix timestamp as fixed-width UTC ISO 8601
/// (e.g., "2025-01-01T00:00:00Z").
///
/// Commit dates are compared lexicographically as strings, so the
/// format must sort the same way the underlying instants do.
pub fn format_epoch_iso8601(epoch: i64) -> String {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| format!("invalid-timestamp({epoch})"))
}

/// The current time as fixed-width UTC ISO 8601.
pub fn now_iso8601() -> String {
    format_epoch_iso8601(chrono::Utc::now().timestamp())
}

/// Normalize a repository-relative path for comparison: forward
/// slashes, no redundant `.`/empty components, `..` resolved textually.
pub fn normalize_path_str(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    let slashed = path.replace('\\', "/");
    for component in slashed.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if components.last().is_some_and(|c| *c != "..") {
                    components.pop();
                } else {
                    components.push("..");
                }
            }
            other => components.push(other),
        }
    }
    components.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn printable_ascii_is_not_binary() {
        let text: Vec<u8> = (b' '..=b'~').cycle().take(1024).collect();
        assert!(!is_binary_bytes(&text));
    }

    #[test]
    fn whitelisted_control_bytes_are_not_binary() {
        assert!(!is_binary_bytes(&[7, 8, 9, 10, 12, 13, 27]));
    }

    #[test]
    fn a_single_nul_flips_detection() {
        let mut text: Vec<u8> = (b' '..=b'~').cycle().take(1024).collect();
        assert!(!is_binary_bytes(&text));
        text[512] = 0;
        assert!(is_binary_bytes(&text));
    }

    #[test]
    fn delete_byte_is_binary() {
        assert!(is_binary_bytes(&[b'a', 0x7F, b'b']));
    }

    #[test]
    fn empty_input_is_not_binary() {
        assert!(!is_binary_bytes(&[]));
    }

    #[test]
    fn high_bytes_are_text() {
        // UTF-8 multibyte sequences must not trip the detector.
        assert!(!is_binary_bytes("héllo wörld".as_bytes()));
    }

    #[test]
    fn iso8601_is_fixed_width_and_ordered() {
        let earlier = format_epoch_iso8601(1_700_000_000);
        let later = format_epoch_iso8601(1_700_000_001);
        assert_eq!(earlier.len(), later.len());
        assert!(earlier < later);
        assert_eq!(format_epoch_iso8601(0), "1970-01-01T00:00:00Z");
    }

    #[rstest]
    #[case("a/b/c", "a/b/c")]
    #[case("a\\b\\c", "a/b/c")]
    #[case("./a/./b", "a/b")]
    #[case("a//b", "a/b")]
    #[case("a/b/../c", "a/c")]
    #[case("../a", "../a")]
    fn normalizes_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path_str(input), expected);
    }

    #[test]
    fn modified_within_missing_file_is_stale() {
        assert!(!modified_within(
            Path::new("/nonexistent/gitalong-test"),
            60.0
        ));
    }

    #[test]
    fn touch_then_modified_within() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("cache").join(".pull");
        assert!(!modified_within(&sentinel, 60.0));
        touch_file(&sentinel).unwrap();
        assert!(modified_within(&sentinel, 60.0));
        assert!(!modified_within(&sentinel, 0.0));
    }
}
