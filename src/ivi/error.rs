use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the drivers in this crate.
///
/// Transport faults come through as `Io` untouched; everything else is raised by a driver after it
/// has looked at a channel reference, a value or a response.
#[derive(Debug, Error)]
pub enum Error {
	#[error("Invalid channel: {0}")]
	InvalidChannel(String),

	#[error("Channel {channel} has no waveform data")]
	NoWaveformData { channel: String },

	#[error("Waveform transfer failed: {0}")]
	Transfer(String),

	#[error("Value {value} is out of range [{min}, {max}]")]
	OutOfRange { value: f64, min: f64, max: f64 },

	#[error("Value not supported: {0}")]
	ValueNotSupported(String),

	#[error("Instrument ID mismatch, expecting {expected}, got {got}")]
	IdMismatch { expected: String, got: String },

	#[error("Unexpected response from instrument: {0}")]
	UnexpectedResponse(String),

	#[error(transparent)]
	Io(#[from] io::Error),

	#[error("Unable to parse driver options: {0}")]
	Config(#[from] serde_json::Error),
}

pub fn check_range(value:f64, min:f64, max:f64) -> Result<f64> {
	if value.is_nan() || value < min || value > max { Err(Error::OutOfRange{ value, min, max }) }
	else { Ok(value) }
}
