// Pieces shared by every driver: the command channel seam, channel name tables, driver options and
// identity parsing.  Transports live outside this crate; anything that can write a command and read
// back a response can drive an instrument through the Interface trait.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};
use serde::{Serialize, Deserialize};

pub mod error;
pub mod fgen;
pub mod loopback;
pub mod utility;

pub use error::{Error, Result, check_range};
pub use fgen::{FunctionGenerator, LoadImpedance, Waveform};
pub use loopback::{Exchange, Loopback};

lazy_static! {
	static ref IDN_RE: Regex = Regex::new("([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
}

pub const SIMULATED_IDENTITY:&str = "Not available while simulating";

/// A command channel to one instrument.
///
/// Implementors own the transport and whatever serialization it needs.  Each call blocks until the
/// exchange is complete.
pub trait Interface {
	/// Send a command that produces no response.
	fn write(&mut self, cmd:&str) -> io::Result<()>;

	/// Send a query and return its decoded text response.
	fn ask(&mut self, cmd:&str) -> io::Result<String>;

	/// Send a query and return the response bytes exactly as received.
	fn ask_raw(&mut self, cmd:&[u8]) -> io::Result<Vec<u8>>;

	fn close(&mut self) -> io::Result<()> { Ok(()) }
}

impl<T: Interface + ?Sized> Interface for Box<T> {
	fn write(&mut self, cmd:&str) -> io::Result<()>          { (**self).write(cmd)   }
	fn ask(&mut self, cmd:&str) -> io::Result<String>        { (**self).ask(cmd)     }
	fn ask_raw(&mut self, cmd:&[u8]) -> io::Result<Vec<u8>>  { (**self).ask_raw(cmd) }
	fn close(&mut self) -> io::Result<()>                    { (**self).close()      }
}

/// Wraps a driver's interface: logs every exchange and applies the transmit throttle.
pub struct Session<I: Interface> {
	io: I,
	tx_throttle_duration: Duration,
}

impl<I: Interface> Session<I> {

	pub fn new(io:I, options:&DriverOptions) -> Self {
		Self{ io, tx_throttle_duration: Duration::from_millis(options.tx_throttle_ms) }
	}

	pub fn inner(&self) -> &I { &self.io }

	fn throttle(&self) {
		if self.tx_throttle_duration > Duration::from_millis(0) { thread::sleep(self.tx_throttle_duration); }
	}
}

impl<I: Interface> Interface for Session<I> {

	fn write(&mut self, cmd:&str) -> io::Result<()> {
		self.throttle();
		debug!("write {}", cmd);
		self.io.write(cmd)
	}

	fn ask(&mut self, cmd:&str) -> io::Result<String> {
		self.throttle();
		debug!("ask {}", cmd);
		let resp = self.io.ask(cmd)?;
		debug!("  -> {}", resp.trim_end());
		Ok(resp)
	}

	fn ask_raw(&mut self, cmd:&[u8]) -> io::Result<Vec<u8>> {
		self.throttle();
		debug!("ask_raw {}", String::from_utf8_lossy(cmd));
		let resp = self.io.ask_raw(cmd)?;
		debug!("  -> {} bytes", resp.len());
		Ok(resp)
	}

	fn close(&mut self) -> io::Result<()> {
		debug!("close");
		self.io.close()
	}
}

/// A reference to a channel, either by position in the driver's channel table or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
	Index(usize),
	Name(String),
}

impl From<usize> for ChannelRef {
	fn from(idx:usize) -> Self { ChannelRef::Index(idx) }
}

impl From<&str> for ChannelRef {
	fn from(name:&str) -> Self { ChannelRef::Name(name.to_owned()) }
}

impl From<String> for ChannelRef {
	fn from(name:String) -> Self { ChannelRef::Name(name) }
}

/// Ordered list of the device-specific names of a repeated capability (channels, outputs).
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
	names: Vec<String>,
}

impl ChannelTable {

	pub fn new<S: Into<String>, I: IntoIterator<Item=S>>(names:I) -> Self {
		Self{ names: names.into_iter().map(|s| s.into()).collect() }
	}

	pub fn len(&self) -> usize { self.names.len() }
	pub fn is_empty(&self) -> bool { self.names.is_empty() }
	pub fn names(&self) -> &[String] { &self.names }

	/// Resolve a reference to an index.  Names compare case-insensitively since SCPI mnemonics do.
	pub fn index(&self, chan:&ChannelRef) -> Result<usize> {
		match chan {
			ChannelRef::Index(idx) => {
				if *idx < self.names.len() { Ok(*idx) }
				else { Err(Error::InvalidChannel(format!("index {} out of range, {} available", idx, self.names.len()))) }
			},
			ChannelRef::Name(name) => {
				self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
					.ok_or_else(|| Error::InvalidChannel(format!("unknown channel name {:?}", name)))
			},
		}
	}

	pub fn name(&self, chan:&ChannelRef) -> Result<&str> {
		let idx = self.index(chan)?;
		Ok(&self.names[idx])
	}
}

/// The read-only driver state an operation needs: whether I/O is bypassed and how channel references
/// map onto device names.
pub trait ChannelContext {
	fn is_simulation(&self) -> bool;
	fn resolve_channel_name(&self, chan:&ChannelRef) -> Result<String>;
}

/// Capability of instruments with a table of addressable channels.
pub trait ChannelAddressable {
	fn channels(&self) -> &ChannelTable;

	fn channel_count(&self) -> usize { self.channels().len() }
}

/// Driver options plus the channel table, handed to operations that need both.
#[derive(Debug, Clone)]
pub struct DriverContext {
	pub options: DriverOptions,
	pub channels: ChannelTable,
}

impl ChannelContext for DriverContext {
	fn is_simulation(&self) -> bool { self.options.simulate }

	fn resolve_channel_name(&self, chan:&ChannelRef) -> Result<String> {
		self.channels.name(chan).map(|s| s.to_owned())
	}
}

/// Options applied when a driver is opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
	pub simulate: bool,
	pub id_query: bool,
	pub reset: bool,
	pub tx_throttle_ms: u64,
}

impl DriverOptions {

	pub fn simulated() -> Self { Self{ simulate: true, ..Self::default() } }

	pub fn from_json(s:&str) -> Result<Self> { Ok(serde_json::from_str(s)?) }

	pub fn from_path<P: AsRef<Path>>(path:P) -> Result<Self> {
		let text = fs::read_to_string(path)?;
		Self::from_json(&text)
	}
}

/// Human readable description attached to a named driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDoc {
	pub name: &'static str,
	pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

impl Identity {

	pub fn simulated() -> Self {
		let s = SIMULATED_IDENTITY.to_owned();
		Self{ manufacturer: s.clone(), model: s.clone(), serial_num: s.clone(), fw_version: s }
	}

	/// Parse a `*IDN?` response of the form `manufacturer,model,serial,firmware`.
	pub fn parse(idn:&str) -> Result<Self> {
		let caps:Captures = IDN_RE.captures(idn.trim())
			.ok_or_else(|| Error::UnexpectedResponse(format!("*IDN? returned {:?}", idn)))?;
		let field = |i:usize| caps.get(i).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();

		Ok(Self{ manufacturer: field(1), model: field(2), serial_num: field(3), fw_version: field(4) })
	}

	/// True if the reported model starts with one of the supported model strings.
	pub fn matches_any(&self, models:&[&str]) -> bool {
		models.iter().any(|m| self.model.starts_with(m))
	}
}

/// Parse an SCPI `:system:error?` response such as `-113,"Undefined header"`.
pub fn parse_error_query(resp:&str) -> Result<(i32, String)> {
	let mut parts = resp.trim().splitn(2, ',');
	let code:i32 = parts.next().unwrap_or("").trim().parse()
		.map_err(|_| Error::UnexpectedResponse(format!(":system:error? returned {:?}", resp)))?;
	let message:String = parts.next().unwrap_or("").trim_matches(|c:char| c == ' ' || c == '"').to_owned();
	Ok((code, message))
}

/// Parse an NR1 boolean response (`0`/`1`), also accepting `ON`/`OFF`.
pub fn parse_bool(resp:&str) -> Result<bool> {
	match resp.trim().to_ascii_uppercase().as_str() {
		"1" | "ON"  => Ok(true),
		"0" | "OFF" => Ok(false),
		_ => Err(Error::UnexpectedResponse(resp.to_owned())),
	}
}

pub fn parse_f64(resp:&str) -> Result<f64> {
	resp.trim().parse::<f64>().map_err(|_| Error::UnexpectedResponse(resp.to_owned()))
}

/// Format a value as an NR3 number for a command argument.
pub fn nr3(value:f64) -> String { format!("{:e}", value) }

#[cfg(test)]
mod tests {
	use super::*;

	fn table() -> ChannelTable { ChannelTable::new(vec!["CH1", "CH2", "D0"]) }

	#[test]
	fn resolves_by_index_and_name() {
		let t = table();
		assert_eq!(t.name(&ChannelRef::Index(0)).unwrap(), "CH1");
		assert_eq!(t.index(&"ch2".into()).unwrap(), 1);
		assert_eq!(t.name(&ChannelRef::from("D0")).unwrap(), "D0");
	}

	#[test]
	fn rejects_unknown_channels() {
		let t = table();
		assert!(matches!(t.index(&ChannelRef::Index(3)), Err(Error::InvalidChannel(_))));
		assert!(matches!(t.index(&"CH9".into()), Err(Error::InvalidChannel(_))));
	}

	#[test]
	fn parses_idn() {
		let id = Identity::parse("TEKTRONIX,MDO4104C,C012345,CF:91.1CT FV:v1.30\n").unwrap();
		assert_eq!(id.manufacturer, "TEKTRONIX");
		assert_eq!(id.model, "MDO4104C");
		assert_eq!(id.serial_num, "C012345");
		assert_eq!(id.fw_version, "CF:91.1CT");
		assert!(id.matches_any(&["MDO4104C"]));
		assert!(Identity::parse("garbage").is_err());
	}

	#[test]
	fn parses_error_query() {
		assert_eq!(parse_error_query("0,\"No error\"").unwrap(), (0, "No error".to_owned()));
		assert_eq!(parse_error_query("-113, \"Undefined header\"\n").unwrap(), (-113, "Undefined header".to_owned()));
		assert!(parse_error_query("oops").is_err());
	}

	#[test]
	fn options_from_json_fill_defaults() {
		let opts = DriverOptions::from_json(r#"{ "simulate": true }"#).unwrap();
		assert_eq!(opts, DriverOptions::simulated());
		assert!(matches!(DriverOptions::from_json("{ simulate"), Err(Error::Config(_))));
	}

	#[test]
	fn options_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("scope.json");
		fs::write(&path, r#"{ "id_query": true, "tx_throttle_ms": 20 }"#).unwrap();

		let opts = DriverOptions::from_path(&path).unwrap();
		assert!(opts.id_query);
		assert!(!opts.simulate);
		assert_eq!(opts.tx_throttle_ms, 20);

		assert!(matches!(DriverOptions::from_path(dir.path().join("missing.json")), Err(Error::Io(_))));
	}

	#[test]
	fn context_resolves_names() {
		let ctx = DriverContext{ options: DriverOptions::default(), channels: table() };
		assert!(!ctx.is_simulation());
		assert_eq!(ctx.resolve_channel_name(&ChannelRef::Index(1)).unwrap(), "CH2");
		assert!(ctx.resolve_channel_name(&"CH3".into()).is_err());
	}

	#[test]
	fn session_passes_through() {
		let mut lb = Loopback::new();
		lb.reply("42");
		let mut session = Session::new(lb, &DriverOptions::default());
		session.write("*CLS").unwrap();
		assert_eq!(session.ask("*ESR?").unwrap(), "42");
		assert_eq!(session.inner().commands(), vec!["*CLS", "*ESR?"]);
	}

	#[test]
	fn session_throttles_each_exchange() {
		let mut lb = Loopback::new();
		lb.reply("1").reply_raw(b"\x01");
		let opts = DriverOptions{ tx_throttle_ms: 10, ..DriverOptions::default() };
		let mut session = Session::new(lb, &opts);

		let start = std::time::Instant::now();
		session.write(":HEADer OFF").unwrap();
		assert_eq!(session.ask("*OPC?").unwrap(), "1");
		assert_eq!(session.ask_raw(b":WAVFrm?").unwrap(), vec![1u8]);
		assert!(start.elapsed() >= Duration::from_millis(30));
		assert_eq!(session.inner().commands(), vec![":HEADer OFF", "*OPC?", ":WAVFrm?"]);
	}

	#[test]
	fn nr3_formatting() {
		assert_eq!(nr3(1.5), "1.5e0");
		assert_eq!(nr3(100e3), "1e5");
	}

	#[test]
	fn check_range_bounds() {
		assert_eq!(check_range(1.0, 0.0, 2.0).unwrap(), 1.0);
		assert!(check_range(2.5, 0.0, 2.0).is_err());
		assert!(check_range(std::f64::NAN, 0.0, 2.0).is_err());
	}
}
