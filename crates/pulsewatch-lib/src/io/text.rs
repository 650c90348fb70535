use anyhow::{Context, Result};
use std::path::Path;
use thiserror::Error;

/// A garbled transport line. Dropped at the boundary, never seen by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientReadError {
    #[error("empty line")]
    Empty,
    #[error("line is not valid UTF-8")]
    NotUtf8,
    #[error("not an integer sample: {0:?}")]
    NotInteger(String),
    #[error("sample out of range: {0:?}")]
    OutOfRange(String),
}

/// Decode one device line: optional leading `-`, then ASCII digits.
///
/// Surrounding whitespace (including `\r`) is ignored. Anything else, such as a
/// `+` sign, a decimal point or interleaved text, is rejected.
pub fn decode_sample_line(line: &str) -> Result<i32, TransientReadError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(TransientReadError::Empty);
    }
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TransientReadError::NotInteger(trimmed.to_string()));
    }
    trimmed
        .parse::<i32>()
        .map_err(|_| TransientReadError::OutOfRange(trimmed.to_string()))
}

/// Decode raw bytes from the transport, rejecting invalid UTF-8.
pub fn decode_sample_bytes(bytes: &[u8]) -> Result<i32, TransientReadError> {
    let line = std::str::from_utf8(bytes).map_err(|_| TransientReadError::NotUtf8)?;
    decode_sample_line(line)
}

/// Samples recovered from a recording, plus how many lines were discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedSeries {
    pub values: Vec<i32>,
    pub dropped: usize,
}

/// Decode a newline-delimited recording, skipping blank and `#` comment lines.
///
/// Garbled lines are counted and skipped the same way the live feed skips them.
pub fn parse_sample_series(text: &str) -> Result<DecodedSeries> {
    let mut series = DecodedSeries::default();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match decode_sample_line(trimmed) {
            Ok(value) => series.values.push(value),
            Err(err) => {
                log::debug!("dropping line {}: {err}", idx + 1);
                series.dropped += 1;
            }
        }
    }
    if series.values.is_empty() {
        anyhow::bail!("no integer samples found");
    }
    Ok(series)
}

/// Read a recording from disk.
pub fn read_sample_series(path: &Path) -> Result<DecodedSeries> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_sample_series(&text).with_context(|| format!("decoding {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_signed_integers() {
        assert_eq!(decode_sample_line("512"), Ok(512));
        assert_eq!(decode_sample_line("-37\r\n"), Ok(-37));
        assert_eq!(decode_sample_line("  0 "), Ok(0));
    }

    #[test]
    fn rejects_garbled_lines() {
        assert_eq!(decode_sample_line(""), Err(TransientReadError::Empty));
        assert_eq!(decode_sample_line("\r\n"), Err(TransientReadError::Empty));
        for bad in ["-", "+5", "12.5", "5x", "--3", "1 2", "abc"] {
            assert!(
                matches!(decode_sample_line(bad), Err(TransientReadError::NotInteger(_))),
                "{bad:?} accepted"
            );
        }
        assert!(matches!(
            decode_sample_line("99999999999"),
            Err(TransientReadError::OutOfRange(_))
        ));
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(
            decode_sample_bytes(&[0xff, 0x31, 0x0a]),
            Err(TransientReadError::NotUtf8)
        );
        assert_eq!(decode_sample_bytes(b"42\n"), Ok(42));
    }

    #[test]
    fn series_skips_comments_and_counts_garbage() {
        let text = "# recorded at 200 Hz\n512\n\n515\nnoise\n-3\n";
        let series = parse_sample_series(text).unwrap();
        assert_eq!(series.values, vec![512, 515, -3]);
        assert_eq!(series.dropped, 1);
    }

    #[test]
    fn series_without_samples_is_an_error() {
        assert!(parse_sample_series("# nothing\n\nfoo\n").is_err());
    }

    #[test]
    fn reads_series_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecg.txt");
        std::fs::write(&path, "1\n2\n3\n").unwrap();
        assert_eq!(read_sample_series(&path).unwrap().values, vec![1, 2, 3]);
        assert!(read_sample_series(&dir.path().join("missing.txt")).is_err());
    }
}
