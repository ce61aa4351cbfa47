//! Turning unit files into point readings.
//!
//! Two decoders share one contract: a path and a field selector in, a list
//! of `(latitude, longitude, value, tag)` readings out. Lines that do not
//! parse are skipped and counted; they never fail the unit.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::config::DecoderConfig;
use crate::error::DecodeError;

/// One decoded point value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
    pub tag: String,
}

/// Output of decoding a single unit file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedUnit {
    pub readings: Vec<Reading>,
    /// Non-empty lines that did not match the expected format.
    pub skipped: usize,
}

#[async_trait]
pub trait Decoder: Send + Sync {
    async fn decode(&self, path: &Path, selector: &str) -> Result<DecodedUnit, DecodeError>;
}

fn parse_f64(token: Option<&str>, line: &str) -> Result<f64, DecodeError> {
    token
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::MalformedLine(line.to_string()))
}

/// Parse `latitude longitude value fieldTag`.
pub fn parse_decoder_line(line: &str) -> Result<Reading, DecodeError> {
    let mut tokens = line.split_whitespace();
    let latitude = parse_f64(tokens.next(), line)?;
    let longitude = parse_f64(tokens.next(), line)?;
    let value = parse_f64(tokens.next(), line)?;
    let tag = tokens
        .next()
        .ok_or_else(|| DecodeError::MalformedLine(line.to_string()))?;
    if tokens.next().is_some() {
        return Err(DecodeError::MalformedLine(line.to_string()));
    }

    Ok(Reading {
        latitude,
        longitude,
        value,
        tag: tag.to_string(),
    })
}

/// Parse a text-feed `value latitude longitude` triple, tagging it with `tag`.
pub fn parse_feed_line(line: &str, tag: &str) -> Result<Reading, DecodeError> {
    let mut tokens = line.split_whitespace();
    let value = parse_f64(tokens.next(), line)?;
    let latitude = parse_f64(tokens.next(), line)?;
    let longitude = parse_f64(tokens.next(), line)?;
    if tokens.next().is_some() {
        return Err(DecodeError::MalformedLine(line.to_string()));
    }

    Ok(Reading {
        latitude,
        longitude,
        value,
        tag: tag.to_string(),
    })
}

/// Parse every non-blank line, skipping the ones `parse` rejects.
pub fn parse_lines<F>(text: &str, mut parse: F) -> DecodedUnit
where
    F: FnMut(&str) -> Result<Reading, DecodeError>,
{
    let mut unit = DecodedUnit::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse(line) {
            Ok(reading) => unit.readings.push(reading),
            Err(e) => {
                trace!(error = %e, "Skipping line");
                unit.skipped += 1;
            }
        }
    }
    unit
}

/// Runs an external program per unit and parses its standard output.
///
/// The child is killed if it outlives the timeout; a non-zero exit status is
/// an error for that unit.
#[derive(Debug, Clone)]
pub struct SubprocessDecoder {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn command_args(&self, path: &Path, selector: &str) -> Vec<String> {
        let path = path.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace("{path}", &path).replace("{selector}", selector))
            .collect()
    }
}

#[async_trait]
impl Decoder for SubprocessDecoder {
    async fn decode(&self, path: &Path, selector: &str) -> Result<DecodedUnit, DecodeError> {
        let child = Command::new(&self.program)
            .args(self.command_args(path, selector))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DecodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DecodeError::Timeout(self.timeout))?
            .map_err(|source| DecodeError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            return Err(DecodeError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let unit = parse_lines(&stdout, parse_decoder_line);
        debug!(
            path = %path.display(),
            readings = unit.readings.len(),
            skipped = unit.skipped,
            "Decoded unit"
        );
        Ok(unit)
    }
}

/// Reads a plain-text `value latitude longitude` feed in-process.
///
/// Every reading is tagged with the selector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFeedDecoder;

#[async_trait]
impl Decoder for TextFeedDecoder {
    async fn decode(&self, path: &Path, selector: &str) -> Result<DecodedUnit, DecodeError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| DecodeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(parse_lines(&text, |line| parse_feed_line(line, selector)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{garbage_lines, temp_cache_dir, text_feed_output, write_unit_file};

    #[test]
    fn test_parse_decoder_line() {
        let reading = parse_decoder_line("43.1 -89.4 293.15 TMP").unwrap();
        assert_eq!(reading.latitude, 43.1);
        assert_eq!(reading.longitude, -89.4);
        assert_eq!(reading.value, 293.15);
        assert_eq!(reading.tag, "TMP");
    }

    #[test]
    fn test_parse_decoder_line_rejects_malformed() {
        for line in ["43.1 -89.4 293.15", "43.1 x 1 TMP", "1 2 3 TMP extra", "1 2 NaN TMP"] {
            assert!(
                matches!(parse_decoder_line(line), Err(DecodeError::MalformedLine(_))),
                "accepted {:?}",
                line
            );
        }
    }

    #[test]
    fn test_parse_lines_skips_garbage() {
        let text = format!("{}43.0 -89.0 20 TMP\n{}", garbage_lines(), garbage_lines());
        let unit = parse_lines(&text, parse_decoder_line);
        assert_eq!(unit.readings.len(), 1);
        assert_eq!(unit.skipped, 8);
    }

    #[tokio::test]
    async fn test_text_feed_decoder_tags_with_selector() {
        let dir = temp_cache_dir();
        let contents = format!("{}{}", text_feed_output((43.0, 43.0, -90.0, -89.0), 1.0, 18.5), "bad line\n");
        let path = write_unit_file(dir.path(), "feed.txt", &contents);

        let unit = TextFeedDecoder.decode(&path, "INSOL").await.unwrap();
        assert_eq!(unit.skipped, 1);
        assert_eq!(unit.readings.len(), 2);
        assert!(unit.readings.iter().all(|r| r.tag == "INSOL" && r.value == 18.5));
        assert_eq!(unit.readings[1].longitude, -89.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_decoder_reads_stdout() {
        let dir = temp_cache_dir();
        let path = write_unit_file(dir.path(), "unit_00.grb2", "43 -89 20 TMP\ngarbage\n");
        let decoder = SubprocessDecoder::new(&DecoderConfig {
            program: "cat".into(),
            args: vec!["{path}".into()],
            timeout_secs: 10,
        });

        let unit = decoder.decode(&path, "TMP").await.unwrap();
        assert_eq!(unit.readings.len(), 1);
        assert_eq!(unit.skipped, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_decoder_non_zero_exit() {
        let dir = temp_cache_dir();
        let path = dir.path().join("missing.grb2");
        let decoder = SubprocessDecoder::new(&DecoderConfig {
            program: "cat".into(),
            args: vec!["{path}".into()],
            timeout_secs: 10,
        });

        let err = decoder.decode(&path, "TMP").await.unwrap_err();
        assert!(matches!(err, DecodeError::Exit { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_decoder_times_out() {
        let decoder = SubprocessDecoder::new(&DecoderConfig {
            program: "sleep".into(),
            args: vec!["5".into()],
            timeout_secs: 0,
        });

        let err = decoder.decode(Path::new("unused"), "TMP").await.unwrap_err();
        assert!(matches!(err, DecodeError::Timeout(_)));
    }

    #[test]
    fn test_command_args_substitution() {
        let decoder = SubprocessDecoder::new(&DecoderConfig {
            program: "agweather-decode".into(),
            args: vec!["--file={path}".into(), "--match".into(), "{selector}".into()],
            timeout_secs: 60,
        });
        assert_eq!(
            decoder.command_args(Path::new("/tmp/u.grb2"), ":TMP:"),
            vec!["--file=/tmp/u.grb2", "--match", ":TMP:"]
        );
    }
}
