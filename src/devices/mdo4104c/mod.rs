use std::ops::Drop;

use log::{info, warn};

use crate::ivi::{self, ChannelAddressable, ChannelRef, ChannelTable, DriverContext, DriverOptions, Identity, Interface, MethodDoc, Result, Session};

pub mod afg;
pub mod measurement;

pub use afg::AfgState;
pub use measurement::IsfFetch;

pub const INSTRUMENT_ID:&str = "MDO4104C";

pub const ANALOG_CHANNEL_COUNT:usize  = 4;
pub const DIGITAL_CHANNEL_COUNT:usize = 16;
pub const BANDWIDTH_HZ:f64            = 1e9;

// AFG option
pub const OUTPUT_COUNT:usize = 1;

pub const METHODS:&[MethodDoc] = &[
	MethodDoc{
		name: "channels[].measurement.fetch_isf",
		description: "Arms the data transfer registers for the channel, sends :WAVFrm? and returns the raw \
			response, which is the waveform in ISF file format.",
	},
];

/// Tektronix MDO4104C mixed domain oscilloscope with the AFG option.
pub struct MDO4104C<I: Interface> {
	io: Session<I>,
	ctx: DriverContext,
	outputs: ChannelTable,
	afg: AfgState,
	identity: Option<Identity>,
}

fn channel_names() -> Vec<String> {
	let analog  = (1..=ANALOG_CHANNEL_COUNT).map(|n| format!("CH{}", n));
	let digital = (0..DIGITAL_CHANNEL_COUNT).map(|n| format!("D{}", n));
	analog.chain(digital).collect()
}

impl<I: Interface> MDO4104C<I> {

	/// Open the driver on `io`, checking the identity and resetting as `options` ask.
	pub fn new(io:I, options:DriverOptions) -> Result<Self> {
		let mut dev = Self{
			io: Session::new(io, &options),
			ctx: DriverContext{ options, channels: ChannelTable::new(channel_names()) },
			outputs: ChannelTable::new(vec!["AFG"]),
			afg: AfgState::default(),
			identity: None,
		};

		dev.initialize()?;
		Ok(dev)
	}

	fn initialize(&mut self) -> Result<()> {
		if self.ctx.options.id_query && !self.simulating() {
			let id = self.identity()?;
			ivi::utility::check_identity(&id, &[INSTRUMENT_ID])?;
			info!("Connected to {} {} (serial {})", id.manufacturer, id.model, id.serial_num);
		}

		if self.ctx.options.reset { self.reset()?; }

		Ok(())
	}

	pub fn simulating(&self) -> bool { self.ctx.options.simulate }
	pub fn options(&self) -> &DriverOptions { &self.ctx.options }
	pub fn interface(&self) -> &I { self.io.inner() }
	pub fn methods(&self) -> &'static [MethodDoc] { METHODS }

	pub fn analog_channel_count(&self) -> usize  { ANALOG_CHANNEL_COUNT  }
	pub fn digital_channel_count(&self) -> usize { DIGITAL_CHANNEL_COUNT }
	pub fn bandwidth(&self) -> f64               { BANDWIDTH_HZ          }

	pub fn outputs(&self) -> &ChannelTable { &self.outputs }

	/// Identity from `*IDN?`, queried once and cached.
	pub fn identity(&mut self) -> Result<Identity> {
		if let Some(id) = &self.identity { return Ok(id.clone()); }

		let id = ivi::utility::load_identity(&mut self.io, self.ctx.options.simulate)?;
		if !self.simulating() { self.identity = Some(id.clone()); }
		Ok(id)
	}

	pub fn reset(&mut self) -> Result<()> {
		ivi::utility::reset(&mut self.io, self.ctx.options.simulate)?;
		self.afg = AfgState::default();
		Ok(())
	}

	pub fn error_query(&mut self) -> Result<(i32, String)> { ivi::utility::error_query(&mut self.io, self.ctx.options.simulate) }
	pub fn self_test(&mut self) -> Result<(i32, String)>   { ivi::utility::self_test(&mut self.io, self.ctx.options.simulate)   }

	/// `channels[].measurement.fetch_isf`: raw ISF file for a channel, empty when simulating or when
	/// the transfer itself failed.
	pub fn fetch_isf<C: Into<ChannelRef>>(&mut self, chan:C) -> Result<Vec<u8>> {
		self.fetch_isf_outcome(chan).map(IsfFetch::into_bytes)
	}

	/// Like `fetch_isf` but reports a failed transfer instead of folding it into an empty payload.
	pub fn fetch_isf_outcome<C: Into<ChannelRef>>(&mut self, chan:C) -> Result<IsfFetch> {
		measurement::fetch_isf(&mut self.io, &self.ctx, &chan.into())
	}
}

impl<I: Interface> ChannelAddressable for MDO4104C<I> {
	fn channels(&self) -> &ChannelTable { &self.ctx.channels }
}

impl<I: Interface> Drop for MDO4104C<I> {

	fn drop(&mut self) {
		if let Err(e) = self.io.close() { warn!("Unable to close interface for {}: {}", INSTRUMENT_ID, e); }
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ivi::{Error, Loopback};

	#[test]
	fn model_constants_and_channel_table() {
		let dev = MDO4104C::new(Loopback::new(), DriverOptions::simulated()).unwrap();
		assert_eq!(dev.analog_channel_count(), 4);
		assert_eq!(dev.digital_channel_count(), 16);
		assert_eq!(dev.bandwidth(), 1e9);
		assert_eq!(dev.channel_count(), 20);
		assert_eq!(dev.channels().names()[0], "CH1");
		assert_eq!(dev.channels().names()[3], "CH4");
		assert_eq!(dev.channels().names()[4], "D0");
		assert_eq!(dev.channels().names()[19], "D15");
		assert_eq!(dev.outputs().len(), OUTPUT_COUNT);
	}

	#[test]
	fn registers_fetch_isf_doc() {
		let dev = MDO4104C::new(Loopback::new(), DriverOptions::simulated()).unwrap();
		let doc = dev.methods().iter().find(|m| m.name == "channels[].measurement.fetch_isf").unwrap();
		assert!(doc.description.contains(":WAVFrm?"));
	}

	#[test]
	fn id_query_accepts_matching_model() {
		let mut lb = Loopback::new();
		lb.reply("TEKTRONIX,MDO4104C,C010101,CF:91.1CT FV:v1.30");
		let opts = DriverOptions{ id_query: true, ..DriverOptions::default() };

		let mut dev = MDO4104C::new(lb, opts).unwrap();
		assert_eq!(dev.identity().unwrap().serial_num, "C010101");
		// cached, so still only one *IDN?
		assert_eq!(dev.interface().commands(), vec!["*IDN?"]);
	}

	#[test]
	fn id_query_rejects_other_models() {
		let mut lb = Loopback::new();
		lb.reply("TEKTRONIX,MSO4104,C010101,CF:91.1CT");
		let opts = DriverOptions{ id_query: true, ..DriverOptions::default() };

		match MDO4104C::new(lb, opts) {
			Err(Error::IdMismatch{ got, .. }) => assert_eq!(got, "MSO4104"),
			Err(e) => panic!("unexpected {:?}", e),
			Ok(_) => panic!("expected an id mismatch"),
		}
	}

	#[test]
	fn reset_on_open() {
		let opts = DriverOptions{ reset: true, ..DriverOptions::default() };
		let dev = MDO4104C::new(Loopback::new(), opts).unwrap();
		assert_eq!(dev.interface().commands(), vec!["*RST"]);
	}

	#[test]
	fn utility_queries_reach_the_instrument() {
		let mut lb = Loopback::new();
		lb.reply("TEKTRONIX,MDO4104C,C010101,CF:91.1CT").reply("1").reply("0,\"No events to report\"");
		let mut dev = MDO4104C::new(lb, DriverOptions::default()).unwrap();

		assert_eq!(dev.identity().unwrap().model, "MDO4104C");
		assert_eq!(dev.self_test().unwrap(), (1, "Self test failed".to_owned()));
		assert_eq!(dev.error_query().unwrap().0, 0);
		dev.reset().unwrap();
		assert_eq!(dev.interface().commands(), vec!["*IDN?", "*TST?", ":system:error?", "*RST"]);
	}

	#[test]
	fn simulated_identity() {
		let mut dev = MDO4104C::new(Loopback::new(), DriverOptions{ simulate: true, id_query: true, ..DriverOptions::default() }).unwrap();
		assert_eq!(dev.identity().unwrap().model, ivi::SIMULATED_IDENTITY);
		assert_eq!(dev.error_query().unwrap(), (0, "No error".to_owned()));
		assert!(dev.interface().sent().is_empty());
	}

	#[test]
	fn fetch_by_name_or_index() {
		let mut lb = Loopback::new();
		lb.reply("NR_PT 4").reply_raw(b"\x00\x01\x00\x02");
		lb.reply("NR_PT 4").reply_raw(b"\x00\x03");

		let mut dev = MDO4104C::new(lb, DriverOptions::default()).unwrap();
		assert_eq!(dev.fetch_isf(1usize).unwrap(), vec![0u8, 1, 0, 2]);
		assert_eq!(dev.fetch_isf("d3").unwrap(), vec![0u8, 3]);

		let cmds = dev.interface().commands();
		assert_eq!(cmds[0], ":data:source CH2");
		assert_eq!(cmds[9], ":data:source D3");
	}
}
