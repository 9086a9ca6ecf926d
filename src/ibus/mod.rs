//! BMW I-BUS protocol engine: frame assembly, the ordered dispatch
//! table, CD-changer emulation, clock harvesting, video switching and
//! the 50 ms timing loop.

pub mod cdc;
pub mod clock;
pub mod dispatch;
pub mod frame;
pub mod gateway;
pub mod send;
pub mod tick;
pub mod video;

/// Well-known device addresses.
pub const RADIO: u8 = 0x68;
pub const CD_CHANGER: u8 = 0x18;
pub const IKE: u8 = 0x80;
