use std::collections::HashSet;
use std::str::FromStr;
use std::ops::Drop;

use log::{info, warn};
use serde::{Serialize, Deserialize};

use crate::ivi::{self, ChannelRef, ChannelTable, DriverOptions, Error, Identity, Interface, Result, Session, check_range};

pub const INSTRUMENT_ID:&str = "PS2520G";
pub const SUPPORTED_MODELS:&[&str] = &["PS2520G", "PS2521G"];

pub const OUTPUT_COUNT:usize = 3;

// (max voltage, max current) for each selectable range, per output
const OUTPUT_RANGES:[&[(f64, f64)]; OUTPUT_COUNT] = [&[(37.0, 1.5)], &[(37.0, 1.5)], &[(6.5, 3.0)]];
const OUTPUT_RANGE_NAMES:[&[&str]; OUTPUT_COUNT] = [&["P36V"], &["P36V"], &["P6V"]];
const OUTPUT_OVP_MAX:[f64; OUTPUT_COUNT] = [38.5, 38.5, 7.0];
const OUTPUT_VOLTAGE_MAX:[f64; OUTPUT_COUNT] = [37.0, 37.0, 6.5];
const OUTPUT_CURRENT_MAX:[f64; OUTPUT_COUNT] = [1.5, 1.5, 5.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentLimitBehavior { Trip, Regulate }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeType { Voltage, Current }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementType { Voltage, Current }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputCondition { ConstantVoltage, ConstantCurrent, OverVoltage, OverCurrent, Unregulated }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingType { Parallel, Series }

impl TrackingType {
	fn mnemonic(self) -> &'static str {
		match self { TrackingType::Parallel => "par", TrackingType::Series => "ser" }
	}
}

impl FromStr for TrackingType {
	type Err = Error;

	/// Accepts the SCPI mnemonics as well as the long names, in any case.
	fn from_str(s:&str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"par" | "parallel" => Ok(TrackingType::Parallel),
			"ser" | "series"   => Ok(TrackingType::Series),
			_ => Err(Error::ValueNotSupported(format!("tracking type {:?}", s))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Attr { CurrentLimit, CurrentLimitBehavior, Enabled, OvpLimit, VoltageLevel }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputState {
	pub current_limit: f64,
	pub current_limit_behavior: CurrentLimitBehavior,
	pub enabled: bool,
	pub ovp_enabled: bool,
	pub ovp_limit: f64,
	pub voltage_level: f64,
	pub voltage_max: f64,
	pub current_max: f64,
}

impl Default for OutputState {
	fn default() -> Self {
		Self{ current_limit: 0.0, current_limit_behavior: CurrentLimitBehavior::Trip, enabled: false, ovp_enabled: true,
			ovp_limit: 0.0, voltage_level: 0.0, voltage_max: 0.0, current_max: 0.0 }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracking {
	pub enabled: bool,
	pub kind: TrackingType,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct State {
	pub identity: Identity,
	pub outputs: Vec<OutputState>,
	pub tracking: Tracking,
}

/// Tektronix PS2520G programmable triple-output DC power supply.
pub struct PS2520G<I: Interface> {
	io: Session<I>,
	options: DriverOptions,
	outputs: ChannelTable,
	state: Vec<OutputState>,
	valid: Vec<HashSet<Attr>>,
	tracking: Tracking,
	tracking_valid: bool,
	identity: Option<Identity>,
}

/// Smallest range whose voltage or current limit still covers `val`.
fn get_range(ranges:&[(f64, f64)], range_type:RangeType, val:f64) -> Option<usize> {
	let mut best:Option<(usize, f64)> = None;
	for (i, &(v, c)) in ranges.iter().enumerate() {
		let limit = match range_type { RangeType::Voltage => v.abs(), RangeType::Current => c.abs() };
		if val.is_nan() || limit < val.abs() { continue; }
		match best {
			Some((_, b)) if b <= limit => {},
			_ => best = Some((i, limit)),
		}
	}
	best.map(|(i, _)| i)
}

impl<I: Interface> PS2520G<I> {

	pub fn new(io:I, options:DriverOptions) -> Result<Self> {
		let state:Vec<OutputState> = (0..OUTPUT_COUNT).map(|i| OutputState{
			voltage_max: OUTPUT_VOLTAGE_MAX[i],
			current_max: OUTPUT_CURRENT_MAX[i],
			..OutputState::default()
		}).collect();

		let mut dev = Self{
			io: Session::new(io, &options),
			options,
			outputs: ChannelTable::new((1..=OUTPUT_COUNT).map(|n| format!("output{}", n))),
			state,
			valid: vec![HashSet::new(); OUTPUT_COUNT],
			tracking: Tracking{ enabled: false, kind: TrackingType::Series },
			tracking_valid: false,
			identity: None,
		};

		if dev.options.id_query && !dev.simulating() {
			let id = dev.identity()?;
			ivi::utility::check_identity(&id, SUPPORTED_MODELS)?;
			info!("Connected to {} {} (serial {})", id.manufacturer, id.model, id.serial_num);
		}

		if dev.options.reset { dev.reset()?; }

		Ok(dev)
	}

	pub fn simulating(&self) -> bool { self.options.simulate }
	pub fn interface(&self) -> &I { self.io.inner() }
	pub fn outputs(&self) -> &ChannelTable { &self.outputs }
	pub fn output_count(&self) -> usize { OUTPUT_COUNT }

	pub fn range_names(&self, out:&ChannelRef) -> Result<&'static [&'static str]> {
		Ok(OUTPUT_RANGE_NAMES[self.outputs.index(out)?])
	}

	pub fn identity(&mut self) -> Result<Identity> {
		if let Some(id) = &self.identity { return Ok(id.clone()); }

		let id = ivi::utility::load_identity(&mut self.io, self.options.simulate)?;
		if !self.simulating() { self.identity = Some(id.clone()); }
		Ok(id)
	}

	pub fn get_full_state(&mut self) -> Result<State> {
		let identity = self.identity()?;
		for i in 0..OUTPUT_COUNT {
			let out = ChannelRef::Index(i);
			self.current_limit(&out)?;
			self.current_limit_behavior(&out)?;
			self.output_enabled(&out)?;
			self.ovp_limit(&out)?;
			self.voltage_level(&out)?;
		}
		let tracking = Tracking{ enabled: self.tracking_enabled()?, kind: self.tracking_type()? };
		Ok(State{ identity, outputs: self.state.clone(), tracking })
	}

	// Utility

	pub fn reset(&mut self) -> Result<()> {
		ivi::utility::reset(&mut self.io, self.options.simulate)?;
		self.invalidate_all();
		Ok(())
	}

	pub fn reset_with_defaults(&mut self) -> Result<()> { self.reset() }

	pub fn self_test(&mut self) -> Result<(i32, String)>   { ivi::utility::self_test(&mut self.io, self.options.simulate)   }
	pub fn error_query(&mut self) -> Result<(i32, String)> { ivi::utility::error_query(&mut self.io, self.options.simulate) }

	// Cache bookkeeping

	fn cached(&self, idx:usize, attr:Attr) -> bool { self.simulating() || self.valid[idx].contains(&attr) }
	fn set_valid(&mut self, idx:usize, attr:Attr) { self.valid[idx].insert(attr); }

	fn invalidate_everywhere(&mut self, attr:Attr) {
		for v in self.valid.iter_mut() { v.remove(&attr); }
	}

	fn invalidate_all(&mut self) {
		for v in self.valid.iter_mut() { v.clear(); }
		self.tracking_valid = false;
	}

	/// Select the output and return its index.
	fn select(&mut self, out:&ChannelRef) -> Result<usize> {
		let idx = self.outputs.index(out)?;
		if !self.simulating() { self.io.write(&format!(":instrument:nselect {}", idx + 1))?; }
		Ok(idx)
	}

	fn ask_selected(&mut self, idx:usize, cmd:&str) -> Result<String> {
		self.io.write(&format!(":instrument:nselect {}", idx + 1))?;
		Ok(self.io.ask(cmd)?)
	}

	// Outputs

	pub fn current_limit(&mut self, out:&ChannelRef) -> Result<f64> {
		let idx = self.outputs.index(out)?;
		if !self.cached(idx, Attr::CurrentLimit) {
			let resp = self.ask_selected(idx, ":source:current:level?")?;
			self.state[idx].current_limit = ivi::parse_f64(&resp)?;
			self.set_valid(idx, Attr::CurrentLimit);
		}
		Ok(self.state[idx].current_limit)
	}

	pub fn set_current_limit(&mut self, out:&ChannelRef, value:f64) -> Result<()> {
		let idx = self.outputs.index(out)?;
		let value = check_range(value, 0.0, self.state[idx].current_max)?;
		self.select(out)?;
		if !self.simulating() { self.io.write(&format!(":source:current:level {}", ivi::nr3(value)))?; }
		self.state[idx].current_limit = value;
		self.set_valid(idx, Attr::CurrentLimit);
		Ok(())
	}

	pub fn current_limit_behavior(&mut self, out:&ChannelRef) -> Result<CurrentLimitBehavior> {
		let idx = self.outputs.index(out)?;
		if !self.cached(idx, Attr::CurrentLimitBehavior) {
			let resp = self.ask_selected(idx, ":source:current:protection:state?")?;
			self.state[idx].current_limit_behavior = if ivi::parse_bool(&resp)? { CurrentLimitBehavior::Trip } else { CurrentLimitBehavior::Regulate };
			self.set_valid(idx, Attr::CurrentLimitBehavior);
		}
		Ok(self.state[idx].current_limit_behavior)
	}

	pub fn set_current_limit_behavior(&mut self, out:&ChannelRef, value:CurrentLimitBehavior) -> Result<()> {
		let idx = self.select(out)?;
		if !self.simulating() {
			self.io.write(&format!(":source:current:protection:state {}", (value == CurrentLimitBehavior::Trip) as u8))?;
		}
		self.state[idx].current_limit_behavior = value;
		self.invalidate_everywhere(Attr::CurrentLimitBehavior);
		self.set_valid(idx, Attr::CurrentLimitBehavior);
		Ok(())
	}

	pub fn output_enabled(&mut self, out:&ChannelRef) -> Result<bool> {
		let idx = self.outputs.index(out)?;
		if !self.cached(idx, Attr::Enabled) {
			let resp = self.ask_selected(idx, ":output:state?")?;
			self.state[idx].enabled = ivi::parse_bool(&resp)?;
			self.set_valid(idx, Attr::Enabled);
		}
		Ok(self.state[idx].enabled)
	}

	pub fn set_output_enabled(&mut self, out:&ChannelRef, on:bool) -> Result<()> {
		let idx = self.select(out)?;
		if !self.simulating() { self.io.write(&format!(":output:state {}", on as u8))?; }
		self.state[idx].enabled = on;
		self.invalidate_everywhere(Attr::Enabled);
		self.set_valid(idx, Attr::Enabled);
		Ok(())
	}

	/// OVP cannot be switched off on this supply.
	pub fn ovp_enabled(&mut self, out:&ChannelRef) -> Result<bool> {
		let idx = self.outputs.index(out)?;
		self.state[idx].ovp_enabled = true;
		Ok(true)
	}

	/// Disabling OVP raises the limit to its maximum instead.
	pub fn set_ovp_enabled(&mut self, out:&ChannelRef, on:bool) -> Result<()> {
		let idx = self.outputs.index(out)?;
		if !on && !self.simulating() {
			self.select(out)?;
			self.io.write(":source:voltage:protection:level max")?;
			self.valid[idx].remove(&Attr::OvpLimit);
		}
		self.state[idx].ovp_enabled = true;
		Ok(())
	}

	pub fn ovp_limit(&mut self, out:&ChannelRef) -> Result<f64> {
		let idx = self.outputs.index(out)?;
		if !self.cached(idx, Attr::OvpLimit) {
			let resp = self.ask_selected(idx, ":source:voltage:protection:level?")?;
			self.state[idx].ovp_limit = ivi::parse_f64(&resp)?;
			self.set_valid(idx, Attr::OvpLimit);
		}
		Ok(self.state[idx].ovp_limit)
	}

	pub fn set_ovp_limit(&mut self, out:&ChannelRef, value:f64) -> Result<()> {
		let idx = self.outputs.index(out)?;
		let value = check_range(value, 0.0, OUTPUT_OVP_MAX[idx])?;
		self.select(out)?;
		if !self.simulating() { self.io.write(&format!(":source:voltage:protection:level {}", ivi::nr3(value)))?; }
		self.state[idx].ovp_limit = value;
		self.set_valid(idx, Attr::OvpLimit);
		Ok(())
	}

	pub fn voltage_level(&mut self, out:&ChannelRef) -> Result<f64> {
		let idx = self.outputs.index(out)?;
		if !self.cached(idx, Attr::VoltageLevel) {
			let resp = self.ask_selected(idx, ":source:voltage:level?")?;
			self.state[idx].voltage_level = ivi::parse_f64(&resp)?;
			self.set_valid(idx, Attr::VoltageLevel);
		}
		Ok(self.state[idx].voltage_level)
	}

	pub fn set_voltage_level(&mut self, out:&ChannelRef, value:f64) -> Result<()> {
		let idx = self.outputs.index(out)?;
		let value = check_range(value, 0.0, self.state[idx].voltage_max)?;
		self.select(out)?;
		if !self.simulating() { self.io.write(&format!(":source:voltage:level {}", ivi::nr3(value)))?; }
		self.state[idx].voltage_level = value;
		self.set_valid(idx, Attr::VoltageLevel);
		Ok(())
	}

	/// Pick the smallest range that covers `value` and adopt its limits.
	pub fn configure_range(&mut self, out:&ChannelRef, range_type:RangeType, value:f64) -> Result<()> {
		let idx = self.outputs.index(out)?;
		let ranges = OUTPUT_RANGES[idx];
		let k = get_range(ranges, range_type, value).ok_or_else(|| {
			let max = ranges.iter().map(|r| match range_type { RangeType::Voltage => r.0, RangeType::Current => r.1 }).fold(0.0, f64::max);
			Error::OutOfRange{ value, min: 0.0, max }
		})?;
		self.state[idx].voltage_max = ranges[k].0;
		self.state[idx].current_max = ranges[k].1;
		Ok(())
	}

	pub fn query_current_limit_max(&self, out:&ChannelRef, voltage_level:f64) -> Result<f64> {
		let idx = self.outputs.index(out)?;
		check_range(voltage_level, 0.0, self.state[idx].voltage_max)?;
		Ok(self.state[idx].current_max)
	}

	pub fn query_voltage_level_max(&self, out:&ChannelRef, current_limit:f64) -> Result<f64> {
		let idx = self.outputs.index(out)?;
		check_range(current_limit, 0.0, self.state[idx].current_max)?;
		Ok(self.state[idx].voltage_max)
	}

	/// Decode the questionable instrument summary condition register for the output.
	pub fn query_output_state(&mut self, out:&ChannelRef, cond:OutputCondition) -> Result<bool> {
		let idx = self.outputs.index(out)?;
		if self.simulating() { return Ok(false); }

		let resp = self.io.ask(&format!(":stat:ques:inst:isum{}:cond?", idx + 1))?;
		let status:u32 = resp.trim().parse().map_err(|_| Error::UnexpectedResponse(resp.clone()))?;
		let mask:u32 = match cond {
			OutputCondition::ConstantVoltage => 1 << 1,
			OutputCondition::ConstantCurrent => 1 << 0,
			OutputCondition::OverVoltage     => 1 << 9,
			OutputCondition::OverCurrent     => 1 << 10,
			OutputCondition::Unregulated     => 0b11,
		};
		Ok(status & mask != 0)
	}

	pub fn reset_output_protection(&mut self, out:&ChannelRef) -> Result<()> {
		self.select(out)?;
		if !self.simulating() { self.io.write(":output:protection:clear")?; }
		Ok(())
	}

	pub fn measure(&mut self, out:&ChannelRef, what:MeasurementType) -> Result<f64> {
		self.select(out)?;
		if self.simulating() { return Ok(0.0); }

		let cmd = match what { MeasurementType::Voltage => ":measure:voltage?", MeasurementType::Current => ":measure:current?" };
		ivi::parse_f64(&self.io.ask(cmd)?)
	}

	// Couple tracking

	fn load_tracking(&mut self) -> Result<()> {
		if self.simulating() || self.tracking_valid { return Ok(()); }

		let resp = self.io.ask(":instrument:couple:tracking?")?;
		if resp.trim().eq_ignore_ascii_case("none") {
			self.tracking.enabled = false;
		} else {
			self.tracking = Tracking{ enabled: true, kind: resp.parse()? };
		}
		self.tracking_valid = true;
		Ok(())
	}

	fn store_tracking(&mut self) -> Result<()> {
		if !self.simulating() {
			let value = if self.tracking.enabled { self.tracking.kind.mnemonic() } else { "none" };
			self.io.write(&format!(":instrument:couple:tracking {}", value))?;
		}
		self.tracking_valid = true;
		Ok(())
	}

	pub fn tracking_enabled(&mut self) -> Result<bool> {
		self.load_tracking()?;
		Ok(self.tracking.enabled)
	}

	pub fn set_tracking_enabled(&mut self, on:bool) -> Result<()> {
		self.tracking.enabled = on;
		self.store_tracking()
	}

	pub fn tracking_type(&mut self) -> Result<TrackingType> {
		self.load_tracking()?;
		Ok(self.tracking.kind)
	}

	pub fn set_tracking_type(&mut self, kind:TrackingType) -> Result<()> {
		self.tracking.kind = kind;
		self.store_tracking()
	}
}

impl<I: Interface> Drop for PS2520G<I> {

	fn drop(&mut self) {
		if let Err(e) = self.io.close() { warn!("Unable to close interface for {}: {}", INSTRUMENT_ID, e); }
	}

}
