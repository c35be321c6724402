//! WAV file creation and append-in-place.
//!
//! Fresh files are written with `hound` (mono/16-bit PCM, matching the
//! capture format throughout this crate) plus a trailing `LIST`/`INFO`/`ICMT`
//! comment chunk that `hound` has no API for, so it is appended by hand and
//! the RIFF size patched afterward. Appending to an existing file is done
//! without `hound`, since it has no append API at all: the trailing comment
//! chunk (if any) is dropped, new sample bytes are written directly after
//! the existing data chunk, and the `data`/`RIFF` size fields are patched.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("I/O error writing WAV file: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV encoding error: {0}")]
    Hound(#[from] hound::Error),
    #[error("not a valid WAV file (missing {0} chunk)")]
    MalformedHeader(&'static str),
}

pub fn spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// `"Recorded at HH:MM:SS on DD/MM/YYYY (UTC±H[:MM]) by <device-comment-name>."`
pub fn comment_for(epoch_s: i64, local_offset_s: i32, device_comment: &str) -> String {
    let local_epoch = epoch_s + local_offset_s as i64;
    let bd = crate::time::gm_time(local_epoch);
    format!(
        "Recorded at {:02}:{:02}:{:02} on {:02}/{:02}/{:04} ({}) by {}.",
        bd.hour,
        bd.min,
        bd.sec,
        bd.day,
        bd.month,
        bd.year,
        utc_offset_label(local_offset_s),
        device_comment,
    )
}

/// `YYYYMMDD_HHMMSS.WAV`
pub fn filename_for(epoch_s: i64, local_offset_s: i32) -> String {
    let local_epoch = epoch_s + local_offset_s as i64;
    let bd = crate::time::gm_time(local_epoch);
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}.WAV",
        bd.year, bd.month, bd.day, bd.hour, bd.min, bd.sec
    )
}

fn utc_offset_label(offset_seconds: i32) -> String {
    let total_minutes = offset_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = (total_minutes % 60).abs();
    if minutes == 0 {
        format!("UTC{}{}", if hours >= 0 { "+" } else { "-" }, hours.abs())
    } else {
        format!(
            "UTC{}{}:{:02}",
            if total_minutes >= 0 { "+" } else { "-" },
            hours.abs(),
            minutes
        )
    }
}

/// Writes a fresh WAV file containing `range_a` followed by `range_b`
/// (the two-range split produced whenever a flush spans the ring wrap
/// point), with a header comment chunk.
pub fn write_file(
    path: &Path,
    sample_rate: u32,
    comment: &str,
    range_a: &[i16],
    range_b: &[i16],
) -> Result<(), WavError> {
    {
        let mut writer = hound::WavWriter::create(path, spec(sample_rate))?;
        for &s in range_a.iter().chain(range_b.iter()) {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }
    append_comment_chunk(path, comment)?;
    Ok(())
}

/// Appends `range_a` then `range_b` directly after the existing `data`
/// chunk of `path`, dropping any trailing comment chunk and patching the
/// `data`/`RIFF` size fields. Returns `Ok(())` on success; any I/O or
/// parse failure is surfaced so the caller can fall back to a fresh file.
pub fn append_file(path: &Path, range_a: &[i16], range_b: &[i16]) -> Result<(), WavError> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let (data_size_offset, data_start, data_size) = locate_data_chunk(&mut file)?;

    let new_bytes: Vec<u8> = range_a
        .iter()
        .chain(range_b.iter())
        .flat_map(|s| s.to_le_bytes())
        .collect();

    // Drop any trailing chunk (e.g. our own comment chunk) past the data we
    // already hold, then append the new sample bytes right after it.
    file.set_len(data_start + data_size as u64)?;
    file.seek(SeekFrom::Start(data_start + data_size as u64))?;
    file.write_all(&new_bytes)?;

    let new_data_size = data_size as u64 + new_bytes.len() as u64;
    file.seek(SeekFrom::Start(data_size_offset))?;
    file.write_all(&(new_data_size as u32).to_le_bytes())?;

    let new_file_len = data_start + new_data_size;
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&((new_file_len - 8) as u32).to_le_bytes())?;

    Ok(())
}

/// Scans chunks after the 12-byte `RIFF....WAVE` header to find `data`.
/// Returns `(offset of its size field, offset of its payload, payload size)`.
fn locate_data_chunk(file: &mut File) -> Result<(u64, u64, u32), WavError> {
    file.seek(SeekFrom::Start(0))?;
    let mut riff_header = [0u8; 12];
    file.read_exact(&mut riff_header)?;
    if &riff_header[0..4] != b"RIFF" {
        return Err(WavError::MalformedHeader("RIFF"));
    }
    if &riff_header[8..12] != b"WAVE" {
        return Err(WavError::MalformedHeader("WAVE"));
    }

    let mut offset: u64 = 12;
    loop {
        let mut chunk_header = [0u8; 8];
        file.seek(SeekFrom::Start(offset))?;
        if file.read_exact(&mut chunk_header).is_err() {
            return Err(WavError::MalformedHeader("data"));
        }
        let id = &chunk_header[0..4];
        let size = u32::from_le_bytes(chunk_header[4..8].try_into().unwrap());
        let payload_offset = offset + 8;
        if id == b"data" {
            return Ok((offset + 4, payload_offset, size));
        }
        let padded_size = size as u64 + (size as u64 % 2);
        offset = payload_offset + padded_size;
    }
}

fn append_comment_chunk(path: &Path, comment: &str) -> Result<(), WavError> {
    let mut info = comment.as_bytes().to_vec();
    if info.len() % 2 == 1 {
        info.push(0);
    }

    let icmt_size = comment.len() as u32 + 1; // +1 for the NUL the ICMT payload carries
    let mut icmt_payload = comment.as_bytes().to_vec();
    icmt_payload.push(0);
    if icmt_payload.len() % 2 == 1 {
        icmt_payload.push(0);
    }

    let list_payload_len = 4 + 8 + icmt_payload.len() as u32; // "INFO" + ICMT header + payload
    let mut chunk = Vec::new();
    chunk.extend_from_slice(b"LIST");
    chunk.extend_from_slice(&list_payload_len.to_le_bytes());
    chunk.extend_from_slice(b"INFO");
    chunk.extend_from_slice(b"ICMT");
    chunk.extend_from_slice(&icmt_size.to_le_bytes());
    chunk.extend_from_slice(&icmt_payload);

    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(&chunk)?;
    drop(file);

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let file_len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&((file_len - 8) as u32).to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back_round_trips_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let samples_a: Vec<i16> = (0..1000).collect();
        let samples_b: Vec<i16> = (1000..1500).collect();

        write_file(&path, 48_000, "test comment", &samples_a, &samples_b).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let mut expected = samples_a.clone();
        expected.extend(samples_b);
        assert_eq!(read, expected);
    }

    #[test]
    fn append_extends_existing_data_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("append.wav");
        let first: Vec<i16> = (0..100).collect();
        write_file(&path, 48_000, "first", &first, &[]).unwrap();

        let second: Vec<i16> = (100..250).collect();
        append_file(&path, &second, &[]).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let mut expected = first;
        expected.extend(second);
        assert_eq!(read, expected);
    }

    #[test]
    fn append_handles_two_range_wrap_split() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wrap.wav");
        write_file(&path, 48_000, "c", &[1, 2, 3], &[]).unwrap();
        append_file(&path, &[4, 5], &[6, 7, 8]).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn filename_and_comment_format_as_expected() {
        let name = filename_for(1_704_067_200, 0);
        assert_eq!(name, "20240101_000000.WAV");

        let comment = comment_for(1_704_067_200, 3600, "the 48kHz default input");
        assert!(comment.starts_with("Recorded at 01:00:00 on 01/01/2024 (UTC+1)"));
        assert!(comment.ends_with("by the 48kHz default input."));
    }
}
