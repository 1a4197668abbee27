
// Currently all devices supported here are Tektronix.  If multiple manufacturers are ever supported, they'll
// probably be organized into modules by manufacturer

pub mod mdo4104c;
pub mod ps2520g;
