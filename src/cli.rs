//! Command-line argument parsing (§1A.3, §6).
//!
//! There is no persisted configuration; every run is fully described by
//! `argv`. The parser mirrors the reference implementation's
//! `parseArgument`/`parseNumber`/`parseNumberAgainstList` trio: case
//! insensitive keyword matching, numeric-only validation before parsing, and
//! membership checks against closed sets.

use crate::constants::{MAX_SAMPLE_RATE, VALID_AUTOSAVE_DURATIONS, VALID_SAMPLE_RATES};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("'{0}' is not a valid directory")]
    BadDestination(String),
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("{0} is not a valid sample rate")]
    InvalidSampleRate(u32),
    #[error("{0} is not a valid autosave duration")]
    InvalidAutosaveDuration(u32),
    #[error("unrecognized argument '{0}'")]
    Unrecognized(String),
    #[error("HETERODYNE requires a frequency argument")]
    MissingHeterodyneFrequency,
    #[error("AUTOSAVE requires a duration argument")]
    MissingAutosaveDuration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub destination: PathBuf,
    pub high_sample_rate: bool,
    pub use_utc: bool,
    pub autosave_duration_minutes: u32,
    pub monitor: bool,
    pub heterodyne_hz: Option<u32>,
    pub requested_sample_rate: Option<u32>,
}

impl Settings {
    /// §6: with nothing to do (no monitor, no heterodyne, and autosave
    /// disabled), the process should exit immediately without touching any
    /// audio backend.
    pub fn has_nothing_to_do(&self) -> bool {
        !self.monitor && self.heterodyne_hz.is_none() && self.autosave_duration_minutes == 0
    }

    pub fn default_capture_rate(&self) -> u32 {
        if self.high_sample_rate {
            MAX_SAMPLE_RATE
        } else {
            crate::constants::DEFAULT_SAMPLE_RATE
        }
    }
}

fn parse_number(token: &str) -> Result<u32, CliError> {
    if !token.chars().all(|c| c.is_ascii_digit()) || token.is_empty() {
        return Err(CliError::NotANumber(token.to_string()));
    }
    token.parse::<u32>().map_err(|_| CliError::NotANumber(token.to_string()))
}

fn parse_number_against_list(
    token: &str,
    valid: &[u32],
    on_invalid: impl FnOnce(u32) -> CliError,
) -> Result<u32, CliError> {
    let n = parse_number(token)?;
    if valid.contains(&n) {
        Ok(n)
    } else {
        Err(on_invalid(n))
    }
}

/// Parses `argv` (excluding `argv[0]`) per §6's surface, including the
/// directory-positional quirk: a bare directory path may appear either
/// before `AUTOSAVE <minutes>` or immediately after it.
pub fn parse(args: &[String]) -> Result<Settings, CliError> {
    let mut destination: Option<PathBuf> = None;
    let mut high_sample_rate = false;
    let mut use_utc = false;
    let mut autosave_duration_minutes = 0u32;
    let mut monitor = false;
    let mut heterodyne_hz = None;
    let mut requested_sample_rate = None;

    let mut i = 0;
    // How many more positions (from the current index) may still accept a
    // bare directory argument: position 0, and the position immediately
    // after a successfully parsed `AUTOSAVE <minutes>` pair.
    let mut possible_file_destination_positions = vec![0usize];

    while i < args.len() {
        let token = &args[i];
        let upper = token.to_ascii_uppercase();

        match upper.as_str() {
            "HIGHSAMPLERATE" | "HSR" => {
                high_sample_rate = true;
                i += 1;
            }
            "UTC" => {
                use_utc = true;
                i += 1;
            }
            "MONITOR" => {
                monitor = true;
                i += 1;
            }
            "AUTOSAVE" => {
                let value = args.get(i + 1).ok_or(CliError::MissingAutosaveDuration)?;
                autosave_duration_minutes = parse_number_against_list(
                    value,
                    &VALID_AUTOSAVE_DURATIONS,
                    CliError::InvalidAutosaveDuration,
                )?;
                possible_file_destination_positions.push(i + 2);
                i += 2;
            }
            "HETERODYNE" => {
                let value = args.get(i + 1).ok_or(CliError::MissingHeterodyneFrequency)?;
                heterodyne_hz = Some(parse_number(value)?);
                i += 2;
            }
            _ => {
                let eligible_for_destination = possible_file_destination_positions.contains(&i) && destination.is_none();
                let is_numeric = !token.is_empty() && token.chars().all(|c| c.is_ascii_digit());

                if is_numeric {
                    let rate =
                        parse_number_against_list(token, &VALID_SAMPLE_RATES, CliError::InvalidSampleRate)?;
                    requested_sample_rate = Some(rate);
                    i += 1;
                } else if eligible_for_destination && PathBuf::from(token).is_dir() {
                    destination = Some(PathBuf::from(token));
                    i += 1;
                } else if eligible_for_destination {
                    return Err(CliError::BadDestination(token.clone()));
                } else {
                    return Err(CliError::Unrecognized(token.clone()));
                }
            }
        }
    }

    Ok(Settings {
        destination: destination.unwrap_or_else(|| PathBuf::from(".")),
        high_sample_rate,
        use_utc,
        autosave_duration_minutes,
        monitor,
        heterodyne_hz,
        requested_sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_args_yields_defaults_with_nothing_to_do() {
        let settings = parse(&args(&[])).unwrap();
        assert_eq!(settings.destination, PathBuf::from("."));
        assert!(settings.has_nothing_to_do());
    }

    #[test]
    fn monitor_keyword_is_case_insensitive() {
        let settings = parse(&args(&["monitor"])).unwrap();
        assert!(settings.monitor);
        assert!(!settings.has_nothing_to_do());
    }

    #[test]
    fn autosave_accepts_a_valid_duration() {
        let settings = parse(&args(&["AUTOSAVE", "5"])).unwrap();
        assert_eq!(settings.autosave_duration_minutes, 5);
        assert!(!settings.has_nothing_to_do());
    }

    #[test]
    fn autosave_rejects_an_invalid_duration() {
        let err = parse(&args(&["AUTOSAVE", "7"])).unwrap_err();
        assert!(matches!(err, CliError::InvalidAutosaveDuration(7)));
    }

    #[test]
    fn heterodyne_requires_a_frequency() {
        let err = parse(&args(&["HETERODYNE"])).unwrap_err();
        assert!(matches!(err, CliError::MissingHeterodyneFrequency));
    }

    #[test]
    fn heterodyne_accepts_any_numeric_frequency_at_parse_time() {
        let settings = parse(&args(&["HETERODYNE", "20000"])).unwrap();
        assert_eq!(settings.heterodyne_hz, Some(20_000));
    }

    #[test]
    fn bare_integer_is_validated_against_the_allowed_rate_set() {
        let settings = parse(&args(&["96000"])).unwrap();
        assert_eq!(settings.requested_sample_rate, Some(96_000));

        let err = parse(&args(&["44100"])).unwrap_err();
        assert!(matches!(err, CliError::InvalidSampleRate(44_100)));
    }

    #[test]
    fn destination_may_follow_autosave_pair() {
        let settings = parse(&args(&["AUTOSAVE", "1", "."])).unwrap();
        assert_eq!(settings.destination, PathBuf::from("."));
        assert_eq!(settings.autosave_duration_minutes, 1);
    }

    #[test]
    fn destination_may_precede_all_keywords() {
        let settings = parse(&args(&[".", "AUTOSAVE", "1"])).unwrap();
        assert_eq!(settings.destination, PathBuf::from("."));
        assert_eq!(settings.autosave_duration_minutes, 1);
    }

    #[test]
    fn nonexistent_destination_is_rejected() {
        let err = parse(&args(&["/definitely/not/a/real/path"])).unwrap_err();
        assert!(matches!(err, CliError::BadDestination(_)));
    }

    #[test]
    fn high_sample_rate_flag_raises_default_capture_rate() {
        let settings = parse(&args(&["HSR"])).unwrap();
        assert!(settings.high_sample_rate);
        assert_eq!(settings.default_capture_rate(), MAX_SAMPLE_RATE);
    }
}
