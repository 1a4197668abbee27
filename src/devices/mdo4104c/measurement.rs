// Raw ISF waveform transfer.
//
// The data registers have to be armed before :WAVFrm? streams anything, and header echo is needed for
// the preamble check.  Header echo is a global instrument mode, so once it has been turned on it is
// always turned back off before returning, whatever happened in between.

use log::warn;

use crate::ivi::{ChannelContext, ChannelRef, Error, Interface, Result};

/// Present in the preamble only when the channel holds a waveform.
pub const NR_PT_MARKER:&str = "NR_PT";

pub const HEADER_ON:&str  = ":HEADer ON";
pub const HEADER_OFF:&str = ":HEADer OFF";

/// Outcome of an ISF fetch.
#[derive(Debug)]
pub enum IsfFetch {
	/// Driver is simulating; nothing was sent.
	Simulated,
	Complete(Vec<u8>),
	/// The bulk query failed.  `payload` is whatever had been received before the failure.
	TransferFailed { payload: Vec<u8>, reason: Error },
}

impl IsfFetch {

	pub fn is_complete(&self) -> bool { matches!(self, IsfFetch::Complete(_)) }

	/// The payload as the plain driver call reports it: the bytes received, empty when simulating
	/// and whatever was held when the transfer failed.
	pub fn into_bytes(self) -> Vec<u8> {
		match self {
			IsfFetch::Simulated => vec![],
			IsfFetch::Complete(data) => data,
			IsfFetch::TransferFailed{ payload, .. } => payload,
		}
	}
}

/// Fetch the ISF file for `chan`.
///
/// `InvalidChannel` comes back before anything is sent.  `NoWaveformData` and transport faults on the
/// preamble query propagate after header echo has been restored.  A failed bulk query is logged and
/// reported as `IsfFetch::TransferFailed`, never as an error.
pub fn fetch_isf<I: Interface, C: ChannelContext>(io:&mut I, ctx:&C, chan:&ChannelRef) -> Result<IsfFetch> {
	let channel:String = ctx.resolve_channel_name(chan)?;

	if ctx.is_simulation() { return Ok(IsfFetch::Simulated); }

	io.write(&format!(":data:source {}", channel))?;
	io.write(":data:encdg fastest")?;
	io.write(":data:width 2")?;
	io.write(":data:start 1")?;
	io.write(":data:stop 1e10")?;
	io.write(HEADER_ON)?;

	let fetched = transfer(io, &channel);
	let restored = io.write(HEADER_OFF);

	match (fetched, restored) {
		(Ok(fetch), Ok(())) => Ok(fetch),
		(Ok(_), Err(e)) => Err(e.into()),
		(Err(e), Ok(())) => Err(e),
		(Err(e), Err(restore_err)) => {
			warn!("Unable to restore header mode after failed fetch from {}: {}", channel, restore_err);
			Err(e)
		},
	}
}

fn transfer<I: Interface>(io:&mut I, channel:&str) -> Result<IsfFetch> {
	if !io.ask(":WFMOutpre?")?.contains(NR_PT_MARKER) {
		return Err(Error::NoWaveformData{ channel: channel.to_owned() });
	}

	let payload:Vec<u8> = vec![];
	match io.ask_raw(b":WAVFrm?") {
		Ok(data) => Ok(IsfFetch::Complete(data)),
		Err(e) => {
			warn!("Waveform transfer from {} failed: {}", channel, e);
			Ok(IsfFetch::TransferFailed{ payload, reason: Error::Transfer(e.to_string()) })
		},
	}
}
