//! DMAC register block and fields.
//!
//! The layout follows the SAMD-style controller: a handful of global
//! registers, then one 16-byte register group per channel. Interrupt
//! enables and flags are modeled as plain read-write masks; the driver
//! acknowledges a flag by writing the flag byte back with the serviced
//! bits cleared.

use super::{RORegister, RWRegister};

/// DMAC registers.
#[repr(C)]
pub struct RegisterBlock {
    /// Control Register
    pub CTRL: RWRegister<u16>,
    _reserved0: [u8; 14],
    /// Software Trigger Control Register
    pub SWTRIGCTRL: RWRegister<u32>,
    /// Priority Control Register
    pub PRICTRL0: RWRegister<u32>,
    _reserved1: [u8; 8],
    /// Interrupt Pending Register
    pub INTPEND: RWRegister<u16>,
    _reserved2: [u8; 2],
    /// Interrupt Status Register
    pub INTSTATUS: RORegister<u32>,
    /// Busy Channels Register
    pub BUSYCH: RORegister<u32>,
    /// Pending Channels Register
    pub PENDCH: RORegister<u32>,
    /// Active Channel and Levels Register
    pub ACTIVE: RORegister<u32>,
    /// Descriptor Memory Section Base Address Register
    pub BASEADDR: RWRegister<u32>,
    /// Write-Back Memory Section Base Address Register
    pub WRBADDR: RWRegister<u32>,
    _reserved3: [u8; 4],
    /// Per-channel register groups
    pub CHANNEL: [ChannelRegisters; 32],
}

// Did I calculate my reservations correctly?
const _: () = assert!(core::mem::offset_of!(RegisterBlock, SWTRIGCTRL) == 0x10);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, INTPEND) == 0x20);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, BASEADDR) == 0x34);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, CHANNEL) == 0x40);

/// One channel's register group.
#[repr(C)]
pub struct ChannelRegisters {
    /// Channel Control A Register
    pub CHCTRLA: RWRegister<u32>,
    /// Channel Control B Register
    pub CHCTRLB: RWRegister<u8>,
    /// Channel Priority Level Register
    pub CHPRILVL: RWRegister<u8>,
    /// Channel Interrupt Enable Register
    pub CHINTEN: RWRegister<u8>,
    /// Channel Interrupt Flag Register
    pub CHINTFLAG: RWRegister<u8>,
    /// Channel Status Register
    pub CHSTATUS: RORegister<u8>,
    _reserved: [u8; 7],
}

const _: () = assert!(core::mem::size_of::<ChannelRegisters>() == 0x10);

pub mod ctrl {
    /// Controller enable
    pub const DMAENABLE: u16 = 1 << 1;
    /// Priority level 0-3 enables
    pub const LVLEN: u16 = 0xF << 8;
}

pub mod chctrla {
    pub const SWRST: u32 = 1 << 0;
    pub const ENABLE: u32 = 1 << 1;
    pub const TRIGSRC_SHIFT: u32 = 8;
    pub const TRIGSRC_MASK: u32 = 0x7F << TRIGSRC_SHIFT;
    pub const TRIGACT_SHIFT: u32 = 20;
    pub const TRIGACT_MASK: u32 = 0x3 << TRIGACT_SHIFT;
}

pub mod chctrlb {
    /// Channel commands, written to the CMD field.
    pub const CMD_NOACT: u8 = 0;
    pub const CMD_SUSPEND: u8 = 1;
    pub const CMD_RESUME: u8 = 2;
}

pub mod chint {
    /// Transfer error
    pub const TERR: u8 = 1 << 0;
    /// Transfer complete
    pub const TCMPL: u8 = 1 << 1;
    /// Channel suspended
    pub const SUSP: u8 = 1 << 2;
    pub const ALL: u8 = TERR | TCMPL | SUSP;
}
