use tekivi::devices::mdo4104c::MDO4104C;
use tekivi::ivi::{DriverOptions, Loopback};

fn main() -> Result<(), &'static str> {

    // Stand-in for a real connection, answering the preamble and waveform queries
    let mut lb = Loopback::new();
    lb.reply("TEKTRONIX,MDO4104C,C010101,CF:91.1CT FV:v1.30")
        .reply(":WFMOUTPRE:BYT_NR 2;BIT_NR 16;ENCDG BIN;NR_PT 4")
        .reply_raw(b":CURVE #18\x00\x01\x00\x02\x00\x03\x00\x04\n");

    let opts = DriverOptions{ id_query: true, ..DriverOptions::default() };
    let mut dev = MDO4104C::new(lb, opts).unwrap();

    println!("{:#?}", dev.identity().unwrap());

    let isf = dev.fetch_isf("CH1").unwrap();
    println!("Received {} bytes", isf.len());

    for cmd in dev.interface().commands() { println!("  {}", cmd); }

    Ok(())
}
