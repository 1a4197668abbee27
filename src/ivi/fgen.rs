use serde::{Serialize, Deserialize};

use super::{ChannelRef, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform { Sine, Square, Pulse, Ramp, Noise, DC }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadImpedance { Fifty, HighZ }

/// Capability of instruments with one or more function generator outputs.
///
/// Outputs are addressed like channels.  Amplitudes are peak-to-peak volts, offsets volts,
/// frequencies hertz.
pub trait FunctionGenerator {
	fn output_count(&self) -> usize;

	fn output_enabled(&mut self, out:&ChannelRef) -> Result<bool>;
	fn set_output_enabled(&mut self, out:&ChannelRef, on:bool) -> Result<()>;

	fn waveform(&mut self, out:&ChannelRef) -> Result<Waveform>;
	fn set_waveform(&mut self, out:&ChannelRef, wf:Waveform) -> Result<()>;

	fn frequency(&mut self, out:&ChannelRef) -> Result<f64>;
	fn set_frequency(&mut self, out:&ChannelRef, hz:f64) -> Result<()>;

	fn amplitude(&mut self, out:&ChannelRef) -> Result<f64>;
	fn set_amplitude(&mut self, out:&ChannelRef, vpp:f64) -> Result<()>;

	fn offset(&mut self, out:&ChannelRef) -> Result<f64>;
	fn set_offset(&mut self, out:&ChannelRef, v:f64) -> Result<()>;

	fn load_impedance(&mut self, out:&ChannelRef) -> Result<LoadImpedance>;
	fn set_load_impedance(&mut self, out:&ChannelRef, load:LoadImpedance) -> Result<()>;

	fn configure_standard_waveform(&mut self, out:&ChannelRef, wf:Waveform, vpp:f64, offset:f64, hz:f64) -> Result<()> {
		self.set_waveform(out, wf)?;
		self.set_amplitude(out, vpp)?;
		self.set_offset(out, offset)?;
		if wf != Waveform::DC && wf != Waveform::Noise { self.set_frequency(out, hz)?; }
		Ok(())
	}
}
