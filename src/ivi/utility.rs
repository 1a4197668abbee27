// IEEE 488.2 housekeeping shared by the drivers.  Each call is a no-op (or returns a canned answer)
// when the driver is simulating.

use super::{Error, Identity, Interface, Result, parse_error_query};

pub fn load_identity<I: Interface>(io:&mut I, simulate:bool) -> Result<Identity> {
	if simulate { return Ok(Identity::simulated()); }
	Identity::parse(&io.ask("*IDN?")?)
}

/// Fail with `IdMismatch` unless the instrument reports one of `supported`.
pub fn check_identity(id:&Identity, supported:&[&str]) -> Result<()> {
	if id.matches_any(supported) { Ok(()) }
	else { Err(Error::IdMismatch{ expected: supported.join("|"), got: id.model.clone() }) }
}

pub fn reset<I: Interface>(io:&mut I, simulate:bool) -> Result<()> {
	if !simulate { io.write("*RST")?; }
	Ok(())
}

pub fn error_query<I: Interface>(io:&mut I, simulate:bool) -> Result<(i32, String)> {
	if simulate { return Ok((0, "No error".to_owned())); }
	parse_error_query(&io.ask(":system:error?")?)
}

pub fn self_test<I: Interface>(io:&mut I, simulate:bool) -> Result<(i32, String)> {
	if simulate { return Ok((0, "Self test passed".to_owned())); }

	let resp = io.ask("*TST?")?;
	let code:i32 = resp.trim().parse().map_err(|_| Error::UnexpectedResponse(resp.clone()))?;
	let message = if code == 0 { "Self test passed" } else { "Self test failed" };
	Ok((code, message.to_owned()))
}
