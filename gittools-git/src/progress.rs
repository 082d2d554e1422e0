//! Reformats git's progress output.
//!
//! Git writes progress to stderr as `\r`-separated updates. Each segment is
//! passed through [`ProgressFormatter::format_line`], which condenses the
//! object-transfer lines and indents everything else.

use regex::Regex;
use std::sync::LazyLock;

/// `Receiving objects:  67% (35484/52960), 236.76 MiB | 78.92 MiB/s`
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:Receiving objects|Resolving deltas|Writing objects):\s*(\d+)%\s*\((\d+)/(\d+)\)(?:,\s*([\d.]+)\s*([^|]+)\|\s*([\d.]+)\s*([^,\n]+))?",
    )
    .expect("Invalid regex")
});

/// `Receiving objects: 100% (52960/52960), 298.63 MiB | 81.39 MiB/s, done.`
static COMPLETION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:Receiving objects|Resolving deltas|Writing objects):\s*100%.*,\s*([\d.]+)\s*([^|]+).*done",
    )
    .expect("Invalid regex")
});

/// Default indent for formatted lines.
pub const DEFAULT_INDENT: &str = "   ";

/// Condenses git transfer progress into short lines.
#[derive(Debug, Clone)]
pub struct ProgressFormatter {
    indent: String,
}

impl Default for ProgressFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_INDENT)
    }
}

impl ProgressFormatter {
    /// Creates a formatter that prefixes every line with `indent`.
    pub fn new(indent: impl Into<String>) -> Self {
        Self {
            indent: indent.into(),
        }
    }

    /// Formats one output segment; `None` means drop it.
    pub fn format_line(&self, line: &str) -> Option<String> {
        let line = line.trim_end();
        let line = line.strip_prefix("remote: ").unwrap_or(line);

        if line.trim().is_empty() || line.starts_with("Cloning into") {
            return None;
        }

        let indent = &self.indent;

        if let Some(caps) = COMPLETION_RE.captures(line) {
            let size = &caps[1];
            let unit = caps[2].trim();
            return Some(format!("{indent}100% (Total size: {size} {unit})"));
        }

        if let Some(caps) = PROGRESS_RE.captures(line) {
            let (pct, current, total) = (&caps[1], &caps[2], &caps[3]);
            return Some(match (caps.get(4), caps.get(5), caps.get(6), caps.get(7)) {
                (Some(size), Some(unit), Some(speed), Some(speed_unit)) => format!(
                    "{indent}{pct}% ({current}/{total}) Size: {} {}, Speed: {} {}",
                    size.as_str(),
                    unit.as_str().trim(),
                    speed.as_str(),
                    speed_unit.as_str().trim()
                ),
                _ => format!("{indent}{pct}% ({current}/{total})"),
            });
        }

        Some(format!("{indent}{line}"))
    }

    /// Extracts `(current, total)` object counts from a transfer line.
    pub fn counts(line: &str) -> Option<(u64, u64)> {
        let caps = PROGRESS_RE.captures(line)?;
        Some((caps[2].parse().ok()?, caps[3].parse().ok()?))
    }
}

/// Splits a chunk of raw output on `\r` and `\n`, keeping any trailing
/// partial segment in `pending` for the next chunk.
///
/// Splitting happens on bytes and only complete segments are decoded, so a
/// multibyte character straddling two reads survives intact.
pub(crate) fn split_segments(pending: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    let mut segments = Vec::new();
    for &byte in chunk {
        if byte == b'\r' || byte == b'\n' {
            if !pending.is_empty() {
                segments.push(String::from_utf8_lossy(pending).into_owned());
                pending.clear();
            }
        } else {
            pending.push(byte);
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(line: &str) -> Option<String> {
        ProgressFormatter::default().format_line(line)
    }

    #[test]
    fn test_cloning_into_dropped() {
        assert_eq!(fmt("Cloning into 'repo'..."), None);
        assert_eq!(fmt("remote: Cloning into bare repository"), None);
        assert_eq!(fmt(""), None);
        assert_eq!(fmt("   "), None);
    }

    #[test]
    fn test_progress_with_size() {
        assert_eq!(
            fmt("Receiving objects:  67% (35484/52960), 236.76 MiB | 78.92 MiB/s").as_deref(),
            Some("   67% (35484/52960) Size: 236.76 MiB, Speed: 78.92 MiB/s")
        );
    }

    #[test]
    fn test_progress_without_size() {
        assert_eq!(
            fmt("Resolving deltas:  45% (900/2000)").as_deref(),
            Some("   45% (900/2000)")
        );
        assert_eq!(
            fmt("Resolving deltas: 100% (2/2), done.").as_deref(),
            Some("   100% (2/2)")
        );
    }

    #[test]
    fn test_completion_line() {
        assert_eq!(
            fmt("Receiving objects: 100% (52960/52960), 298.63 MiB | 81.39 MiB/s, done.").as_deref(),
            Some("   100% (Total size: 298.63 MiB)")
        );
    }

    #[test]
    fn test_remote_prefix_and_passthrough() {
        assert_eq!(
            fmt("remote: Enumerating objects: 12, done.").as_deref(),
            Some("   Enumerating objects: 12, done.")
        );
        assert_eq!(
            ProgressFormatter::new("> ").format_line("To https://github.com/o/r.git").as_deref(),
            Some("> To https://github.com/o/r.git")
        );
    }

    #[test]
    fn test_counts() {
        assert_eq!(
            ProgressFormatter::counts("Receiving objects:  10% (5/50)"),
            Some((5, 50))
        );
        assert_eq!(ProgressFormatter::counts("Counting objects: done."), None);
    }

    #[test]
    fn test_split_segments_carries_partial() {
        let mut pending = Vec::new();
        let first = split_segments(&mut pending, b"Receiving objects:  1% (1/100)\rReceiving obj");
        assert_eq!(first, vec!["Receiving objects:  1% (1/100)"]);
        assert_eq!(pending, b"Receiving obj");

        let second = split_segments(&mut pending, b"ects:  2% (2/100)\r\n");
        assert_eq!(second, vec!["Receiving objects:  2% (2/100)"]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_split_segments_keeps_multibyte_across_reads() {
        let line = "remote: Überprüfe Objekte ✓\n".as_bytes();
        // Cut inside the three-byte check mark.
        let cut = line.len() - 3;
        let mut pending = Vec::new();

        assert!(split_segments(&mut pending, &line[..cut]).is_empty());
        let segments = split_segments(&mut pending, &line[cut..]);

        assert_eq!(segments, vec!["remote: Überprüfe Objekte ✓"]);
        assert!(!segments[0].contains('\u{FFFD}'));
    }
}
