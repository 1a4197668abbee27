// Arbitrary/function generator option.  One output, addressed as "AFG" or index 0.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::ivi::{self, ChannelRef, Error, FunctionGenerator, Interface, LoadImpedance, Result, Waveform, check_range, nr3};

use super::{MDO4104C, OUTPUT_COUNT};

lazy_static! {
	static ref FUNC_RE: Regex = Regex::new("(?i)\\b(SINE|SIN|SQUARE|SQU|PULSE|PULS|RAMP|NOISE|NOIS|DC)\\b").unwrap();
	static ref LOAD_RE: Regex = Regex::new("(?i)\\b(FIFTY|FIF|HIGHZ)\\b").unwrap();
}

pub const MAX_FREQUENCY_HZ:f64 = 50e6;
pub const MAX_AMPLITUDE_VPP:f64 = 5.0;
pub const MAX_OFFSET_V:f64 = 2.5;

/// Last known generator settings.  While simulating this is the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AfgState {
	pub enabled: bool,
	pub waveform: Waveform,
	pub frequency_hz: f64,
	pub amplitude_vpp: f64,
	pub offset_v: f64,
	pub load: LoadImpedance,
}

impl Default for AfgState {
	fn default() -> Self {
		Self{ enabled: false, waveform: Waveform::Sine, frequency_hz: 100e3, amplitude_vpp: 0.5, offset_v: 0.0, load: LoadImpedance::HighZ }
	}
}

fn waveform_str(wf:Waveform) -> &'static str {
	match wf {
		Waveform::Sine   => "SINE",
		Waveform::Square => "SQUARE",
		Waveform::Pulse  => "PULSE",
		Waveform::Ramp   => "RAMP",
		Waveform::Noise  => "NOISE",
		Waveform::DC     => "DC",
	}
}

fn parse_waveform(resp:&str) -> Result<Waveform> {
	let cap = FUNC_RE.captures(resp).ok_or_else(|| Error::UnexpectedResponse(resp.to_owned()))?;
	let wf = match cap[1].to_ascii_uppercase().as_str() {
		"SINE" | "SIN"    => Waveform::Sine,
		"SQUARE" | "SQU"  => Waveform::Square,
		"PULSE" | "PULS"  => Waveform::Pulse,
		"RAMP"            => Waveform::Ramp,
		"NOISE" | "NOIS"  => Waveform::Noise,
		_                 => Waveform::DC,
	};
	Ok(wf)
}

fn parse_load(resp:&str) -> Result<LoadImpedance> {
	let cap = LOAD_RE.captures(resp).ok_or_else(|| Error::UnexpectedResponse(resp.to_owned()))?;
	if cap[1].eq_ignore_ascii_case("HIGHZ") { Ok(LoadImpedance::HighZ) } else { Ok(LoadImpedance::Fifty) }
}

impl<I: Interface> MDO4104C<I> {

	pub fn afg_state(&self) -> &AfgState { &self.afg }

	fn afg_ok(&self, out:&ChannelRef) -> Result<()> {
		self.outputs.index(out).map(|_| ())
	}

	fn afg_query(&mut self, cmd:&str) -> Result<Option<String>> {
		if self.simulating() { Ok(None) }
		else { Ok(Some(self.io.ask(cmd)?)) }
	}

	fn afg_write(&mut self, cmd:&str) -> Result<()> {
		if !self.simulating() { self.io.write(cmd)?; }
		Ok(())
	}
}

impl<I: Interface> FunctionGenerator for MDO4104C<I> {

	fn output_count(&self) -> usize { OUTPUT_COUNT }

	fn output_enabled(&mut self, out:&ChannelRef) -> Result<bool> {
		self.afg_ok(out)?;
		if let Some(resp) = self.afg_query(":AFG:OUTPut:STATE?")? { self.afg.enabled = ivi::parse_bool(&resp)?; }
		Ok(self.afg.enabled)
	}

	fn set_output_enabled(&mut self, out:&ChannelRef, on:bool) -> Result<()> {
		self.afg_ok(out)?;
		self.afg_write(&format!(":AFG:OUTPut:STATE {}", if on {"ON"} else {"OFF"}))?;
		self.afg.enabled = on;
		Ok(())
	}

	fn waveform(&mut self, out:&ChannelRef) -> Result<Waveform> {
		self.afg_ok(out)?;
		if let Some(resp) = self.afg_query(":AFG:FUNCtion?")? { self.afg.waveform = parse_waveform(&resp)?; }
		Ok(self.afg.waveform)
	}

	fn set_waveform(&mut self, out:&ChannelRef, wf:Waveform) -> Result<()> {
		self.afg_ok(out)?;
		self.afg_write(&format!(":AFG:FUNCtion {}", waveform_str(wf)))?;
		self.afg.waveform = wf;
		Ok(())
	}

	fn frequency(&mut self, out:&ChannelRef) -> Result<f64> {
		self.afg_ok(out)?;
		if let Some(resp) = self.afg_query(":AFG:FREQuency?")? { self.afg.frequency_hz = ivi::parse_f64(&resp)?; }
		Ok(self.afg.frequency_hz)
	}

	fn set_frequency(&mut self, out:&ChannelRef, hz:f64) -> Result<()> {
		self.afg_ok(out)?;
		if hz <= 0.0 { return Err(Error::OutOfRange{ value: hz, min: 0.0, max: MAX_FREQUENCY_HZ }); }
		let hz = check_range(hz, 0.0, MAX_FREQUENCY_HZ)?;
		self.afg_write(&format!(":AFG:FREQuency {}", nr3(hz)))?;
		self.afg.frequency_hz = hz;
		Ok(())
	}

	fn amplitude(&mut self, out:&ChannelRef) -> Result<f64> {
		self.afg_ok(out)?;
		if let Some(resp) = self.afg_query(":AFG:AMPLitude?")? { self.afg.amplitude_vpp = ivi::parse_f64(&resp)?; }
		Ok(self.afg.amplitude_vpp)
	}

	fn set_amplitude(&mut self, out:&ChannelRef, vpp:f64) -> Result<()> {
		self.afg_ok(out)?;
		let vpp = check_range(vpp, 0.0, MAX_AMPLITUDE_VPP)?;
		self.afg_write(&format!(":AFG:AMPLitude {}", nr3(vpp)))?;
		self.afg.amplitude_vpp = vpp;
		Ok(())
	}

	fn offset(&mut self, out:&ChannelRef) -> Result<f64> {
		self.afg_ok(out)?;
		if let Some(resp) = self.afg_query(":AFG:OFFSet?")? { self.afg.offset_v = ivi::parse_f64(&resp)?; }
		Ok(self.afg.offset_v)
	}

	fn set_offset(&mut self, out:&ChannelRef, v:f64) -> Result<()> {
		self.afg_ok(out)?;
		let v = check_range(v, -MAX_OFFSET_V, MAX_OFFSET_V)?;
		self.afg_write(&format!(":AFG:OFFSet {}", nr3(v)))?;
		self.afg.offset_v = v;
		Ok(())
	}

	fn load_impedance(&mut self, out:&ChannelRef) -> Result<LoadImpedance> {
		self.afg_ok(out)?;
		if let Some(resp) = self.afg_query(":AFG:OUTPut:LOAd:IMPEDance?")? { self.afg.load = parse_load(&resp)?; }
		Ok(self.afg.load)
	}

	fn set_load_impedance(&mut self, out:&ChannelRef, load:LoadImpedance) -> Result<()> {
		self.afg_ok(out)?;
		let arg = match load { LoadImpedance::Fifty => "FIFty", LoadImpedance::HighZ => "HIGHZ" };
		self.afg_write(&format!(":AFG:OUTPut:LOAd:IMPEDance {}", arg))?;
		self.afg.load = load;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ivi::{DriverOptions, Loopback};

	fn afg() -> ChannelRef { ChannelRef::Index(0) }

	#[test]
	fn setters_format_commands() {
		let mut dev = MDO4104C::new(Loopback::new(), DriverOptions::default()).unwrap();
		dev.configure_standard_waveform(&afg(), Waveform::Square, 2.0, -0.5, 1e3).unwrap();
		dev.set_load_impedance(&"afg".into(), LoadImpedance::Fifty).unwrap();
		dev.set_output_enabled(&afg(), true).unwrap();

		assert_eq!(dev.interface().commands(), vec![
			":AFG:FUNCtion SQUARE",
			":AFG:AMPLitude 2e0",
			":AFG:OFFSet -5e-1",
			":AFG:FREQuency 1e3",
			":AFG:OUTPut:LOAd:IMPEDance FIFty",
			":AFG:OUTPut:STATE ON",
		]);
		assert!(dev.afg_state().enabled);
		assert_eq!(dev.afg_state().waveform, Waveform::Square);
	}

	#[test]
	fn dc_and_noise_skip_frequency() {
		let mut dev = MDO4104C::new(Loopback::new(), DriverOptions::default()).unwrap();
		dev.configure_standard_waveform(&afg(), Waveform::DC, 0.0, 1.0, 1e3).unwrap();
		assert!(!dev.interface().commands().iter().any(|c| c.starts_with(":AFG:FREQuency")));
	}

	#[test]
	fn getters_parse_responses() {
		let mut lb = Loopback::new();
		lb.reply("1\n").reply("RAMP\n").reply("1.0E+4\n").reply("HIGHZ\n").reply("NOISE");

		let mut dev = MDO4104C::new(lb, DriverOptions::default()).unwrap();
		assert!(dev.output_enabled(&afg()).unwrap());
		assert_eq!(dev.waveform(&afg()).unwrap(), Waveform::Ramp);
		assert_eq!(dev.frequency(&afg()).unwrap(), 1e4);
		assert_eq!(dev.load_impedance(&afg()).unwrap(), LoadImpedance::HighZ);
		assert_eq!(dev.waveform(&afg()).unwrap(), Waveform::Noise);
	}

	#[test]
	fn unknown_waveform_is_unexpected() {
		let mut lb = Loopback::new();
		lb.reply("CARDIAC");
		let mut dev = MDO4104C::new(lb, DriverOptions::default()).unwrap();
		assert!(matches!(dev.waveform(&afg()), Err(Error::UnexpectedResponse(_))));
	}

	#[test]
	fn range_checks_happen_before_io() {
		let mut dev = MDO4104C::new(Loopback::new(), DriverOptions::default()).unwrap();
		assert!(matches!(dev.set_frequency(&afg(), 0.0), Err(Error::OutOfRange{ .. })));
		assert!(matches!(dev.set_frequency(&afg(), 60e6), Err(Error::OutOfRange{ .. })));
		assert!(matches!(dev.set_amplitude(&afg(), 5.5), Err(Error::OutOfRange{ .. })));
		assert!(matches!(dev.set_offset(&afg(), -3.0), Err(Error::OutOfRange{ .. })));
		assert!(matches!(dev.set_output_enabled(&ChannelRef::Index(1), true), Err(Error::InvalidChannel(_))));
		assert!(dev.interface().sent().is_empty());
	}

	#[test]
	fn simulation_keeps_state_locally() {
		let mut dev = MDO4104C::new(Loopback::new(), DriverOptions::simulated()).unwrap();
		dev.set_frequency(&afg(), 2.5e6).unwrap();
		dev.set_output_enabled(&afg(), true).unwrap();
		assert_eq!(dev.frequency(&afg()).unwrap(), 2.5e6);
		assert!(dev.output_enabled(&afg()).unwrap());
		assert_eq!(dev.output_count(), 1);
		assert!(dev.interface().sent().is_empty());

		dev.reset().unwrap();
		assert_eq!(dev.afg_state(), &AfgState::default());
	}
}
