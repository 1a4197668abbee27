use std::collections::VecDeque;
use std::io::{self, Error, ErrorKind};

use super::Interface;

/// One exchange as seen by the instrument side of a `Loopback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
	Write(String),
	Ask(String),
	AskRaw(Vec<u8>),
	Close,
}

#[derive(Debug, Clone)]
enum Reply {
	Text(String),
	Raw(Vec<u8>),
	Fail(String),
}

/// Scripted interface that records everything sent to it and answers queries from a queue.
///
/// Useful for exercising drivers without hardware.  Queries consume replies in order; a query with
/// nothing queued fails with `UnexpectedEof`.
#[derive(Debug, Default)]
pub struct Loopback {
	sent: Vec<Exchange>,
	replies: VecDeque<Reply>,
	failing_writes: Vec<String>,
}

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

impl Loopback {

	pub fn new() -> Self { Self::default() }

	pub fn reply(&mut self, text:&str) -> &mut Self {
		self.replies.push_back(Reply::Text(text.to_owned()));
		self
	}

	pub fn reply_raw(&mut self, data:&[u8]) -> &mut Self {
		self.replies.push_back(Reply::Raw(data.to_vec()));
		self
	}

	/// Queue a failure for the next query.
	pub fn reply_err(&mut self, msg:&str) -> &mut Self {
		self.replies.push_back(Reply::Fail(msg.to_owned()));
		self
	}

	/// Make every write of exactly `cmd` fail.
	pub fn fail_write(&mut self, cmd:&str) -> &mut Self {
		self.failing_writes.push(cmd.to_owned());
		self
	}

	pub fn sent(&self) -> &[Exchange] { &self.sent }

	/// Every command string sent so far, queries included, in order.
	pub fn commands(&self) -> Vec<String> {
		self.sent.iter().filter_map(|x| match x {
			Exchange::Write(s) | Exchange::Ask(s) => Some(s.clone()),
			Exchange::AskRaw(b) => Some(String::from_utf8_lossy(b).into_owned()),
			Exchange::Close => None,
		}).collect()
	}

	pub fn pending_replies(&self) -> usize { self.replies.len() }

	fn next_reply(&mut self) -> io::Result<Reply> {
		self.replies.pop_front().ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, "No scripted reply left"))
	}
}

impl Interface for Loopback {

	fn write(&mut self, cmd:&str) -> io::Result<()> {
		self.sent.push(Exchange::Write(cmd.to_owned()));
		if self.failing_writes.iter().any(|c| c == cmd) { Err(err("Scripted write failure")) }
		else { Ok(()) }
	}

	fn ask(&mut self, cmd:&str) -> io::Result<String> {
		self.sent.push(Exchange::Ask(cmd.to_owned()));
		match self.next_reply()? {
			Reply::Text(s) => Ok(s),
			Reply::Raw(b)  => String::from_utf8(b).map_err(|_| err("Unable to parse response as UTF-8")),
			Reply::Fail(msg) => Err(err(&msg)),
		}
	}

	fn ask_raw(&mut self, cmd:&[u8]) -> io::Result<Vec<u8>> {
		self.sent.push(Exchange::AskRaw(cmd.to_vec()));
		match self.next_reply()? {
			Reply::Raw(b)  => Ok(b),
			Reply::Text(s) => Ok(s.into_bytes()),
			Reply::Fail(msg) => Err(err(&msg)),
		}
	}

	fn close(&mut self) -> io::Result<()> {
		self.sent.push(Exchange::Close);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn records_and_replies_in_order() {
		let mut lb = Loopback::new();
		lb.reply("1").reply_raw(b"\x00\x01").reply_err("boom");

		lb.write("*CLS").unwrap();
		assert_eq!(lb.ask("*OPC?").unwrap(), "1");
		assert_eq!(lb.ask_raw(b"CURVE?").unwrap(), vec![0u8, 1]);
		assert!(lb.ask("*OPC?").is_err());
		assert_eq!(lb.ask("*OPC?").unwrap_err().kind(), ErrorKind::UnexpectedEof);

		assert_eq!(lb.commands(), vec!["*CLS", "*OPC?", "CURVE?", "*OPC?", "*OPC?"]);
	}

	#[test]
	fn scripted_write_failure() {
		let mut lb = Loopback::new();
		lb.fail_write(":HEADer OFF");
		assert!(lb.write(":HEADer ON").is_ok());
		assert!(lb.write(":HEADer OFF").is_err());
		assert_eq!(lb.sent().len(), 2);
	}
}
