//! Audio device enumeration and AudioMoth recognition.
//!
//! The preferred microphone is recognized purely by substring matching on
//! its reported name, exactly the heuristic the original implementation
//! uses (there is no structured device-type metadata to rely on).

use cpal::traits::{DeviceTrait, HostTrait};

const OLD_FIRMWARE_MARKER: &str = "F32x USBXpress Device";
const AUDIOMOTH_MARKER: &str = "AudioMoth";
const MODERN_AUDIOMOTH_MARKER: &str = "kHz AudioMoth";

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to enumerate audio devices: {0}")]
    Enumeration(#[from] cpal::DevicesError),
    #[error("no input device available")]
    NoInputDevice,
}

/// Outcome of one enumeration pass over all input devices. Holds the
/// recognized device's name rather than the `cpal::Device` handle itself, so
/// callers re-open it by name via [`find_input_device_by_name`] only when
/// they actually need to start a stream.
#[derive(Debug, Clone, Default)]
pub struct EnumerationResult {
    pub audiomoth_found: bool,
    pub old_firmware_found: bool,
    /// Name of the first recognized AudioMoth device, if any.
    pub audiomoth_device_name: Option<String>,
    /// Native sample rate parsed from the AudioMoth device's name.
    pub audiomoth_sample_rate: Option<u32>,
}

/// Classifies a device name per §4.6: legacy-firmware markers and the
/// first-wins AudioMoth recognition (enumeration halts once found).
pub fn classify_name(name: &str) -> (bool /* is_audiomoth */, bool /* is_old_firmware */) {
    let old_firmware = name.contains(OLD_FIRMWARE_MARKER)
        || (name.contains(AUDIOMOTH_MARKER) && !name.contains(MODERN_AUDIOMOTH_MARKER));
    let is_audiomoth = name.contains(AUDIOMOTH_MARKER);
    (is_audiomoth, old_firmware)
}

/// Parses the native sample rate in Hz from a name of the form
/// `"<digits>kHz AudioMoth ..."`, scanning backward from the character
/// immediately preceding the literal `"kHz"`. Defaults to `MAX_SAMPLE_RATE`
/// if no digit immediately precedes it.
pub fn parse_native_sample_rate_hz(name: &str) -> u32 {
    let Some(khz_pos) = name.find("kHz") else {
        return crate::constants::MAX_SAMPLE_RATE;
    };
    let prefix = &name[..khz_pos];
    let digits_start = prefix
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);

    match digits_start {
        Some(start) => prefix[start..]
            .parse::<u32>()
            .map(|khz| khz * 1000)
            .unwrap_or(crate::constants::MAX_SAMPLE_RATE),
        None => crate::constants::MAX_SAMPLE_RATE,
    }
}

/// Enumerates input devices, halting at the first recognized AudioMoth
/// (first-wins, per §4.6).
pub fn enumerate_input_devices() -> Result<EnumerationResult, DeviceError> {
    let host = cpal::default_host();
    let devices = host.input_devices()?;

    let mut result = EnumerationResult::default();
    for device in devices {
        let name = match device.name() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let (is_audiomoth, is_old) = classify_name(&name);
        if is_old {
            result.old_firmware_found = true;
        }
        if is_audiomoth {
            result.audiomoth_found = true;
            if result.audiomoth_device_name.is_none() {
                result.audiomoth_sample_rate = Some(parse_native_sample_rate_hz(&name));
                result.audiomoth_device_name = Some(name);
            }
            break;
        }
    }
    Ok(result)
}

/// Re-opens an input device by its previously-enumerated name.
pub fn find_input_device_by_name(name: &str) -> Result<Option<cpal::Device>, DeviceError> {
    let host = cpal::default_host();
    for device in host.input_devices()? {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(Some(device));
        }
    }
    Ok(None)
}

pub fn default_input_device() -> Result<cpal::Device, DeviceError> {
    cpal::default_host()
        .default_input_device()
        .ok_or(DeviceError::NoInputDevice)
}

pub fn default_output_device() -> Option<cpal::Device> {
    cpal::default_host().default_output_device()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_name_recognizes_modern_audiomoth() {
        let (is_am, is_old) = classify_name("384kHz AudioMoth USB Microphone");
        assert!(is_am);
        assert!(!is_old);
    }

    #[test]
    fn classify_name_flags_bare_audiomoth_as_old_firmware() {
        let (is_am, is_old) = classify_name("AudioMoth USB Microphone");
        assert!(is_am);
        assert!(is_old);
    }

    #[test]
    fn classify_name_flags_legacy_usbxpress_marker() {
        let (is_am, is_old) = classify_name("F32x USBXpress Device");
        assert!(!is_am);
        assert!(is_old);
    }

    #[test]
    fn classify_name_ignores_unrelated_devices() {
        let (is_am, is_old) = classify_name("Built-in Microphone");
        assert!(!is_am);
        assert!(!is_old);
    }

    #[test]
    fn parse_native_sample_rate_reads_digits_before_khz() {
        assert_eq!(
            parse_native_sample_rate_hz("384kHz AudioMoth USB Microphone"),
            384_000
        );
        assert_eq!(
            parse_native_sample_rate_hz("48kHz AudioMoth USB Microphone"),
            48_000
        );
    }

    #[test]
    fn parse_native_sample_rate_defaults_when_no_digits_precede_khz() {
        assert_eq!(
            parse_native_sample_rate_hz("AudioMoth kHz Microphone"),
            crate::constants::MAX_SAMPLE_RATE
        );
        assert_eq!(
            parse_native_sample_rate_hz("no marker here"),
            crate::constants::MAX_SAMPLE_RATE
        );
    }
}
