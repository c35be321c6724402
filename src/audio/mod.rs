//! Audio pipeline: ring buffer, capture/playback resamplers, heterodyne
//! demodulator, device enumeration, device supervision, and WAV encoding.

pub mod capture;
pub mod device;
pub mod heterodyne;
pub mod playback;
pub mod resample;
pub mod ring_buffer;
pub mod supervisor;
pub mod wav;
