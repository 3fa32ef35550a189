//! DMA controller driver for SAMD-style microcontrollers
//!
//! `samd-dmac` manages the shared DMA controller: it allocates logical
//! channels from the finite hardware pool, builds and chains transfer
//! descriptors, starts and cancels jobs, and dispatches completion,
//! error, and suspend callbacks from the DMA interrupt.
//!
//! The controller walks descriptor chains autonomously once a channel
//! is enabled, so this driver is strict about who touches descriptor
//! memory: every hardware-visible descriptor access happens inside a
//! `critical-section` scope. See [`Channel::modify`] for the one
//! operation where that really matters.
//!
//! # Getting started
//!
//! Assign a [`Dmac`] to a static, telling it where the controller's
//! register block lives and how many channels and chain descriptors you
//! want to manage:
//!
//! ```
//! use samd_dmac::{Channel, Dmac, TransferConfig};
//! # const DMAC_PTR: *const () = core::ptr::null();
//!
//! // Safety: the address and channel count are valid for this target.
//! static DMAC: Dmac<12, 16> = unsafe { Dmac::new(DMAC_PTR) };
//! ```
//!
//! Then create a [`Channel`], allocate a hardware channel, describe the
//! transfer, and start it:
//!
//! ```no_run
//! # use samd_dmac::{Channel, Dmac, TransferConfig};
//! # static DMAC: Dmac<12, 16> = unsafe { Dmac::new(core::ptr::null()) };
//! # fn demo() -> samd_dmac::Result<()> {
//! let mut channel = Channel::new(&DMAC);
//! channel.allocate()?;
//!
//! let source = [0u32; 32];
//! let mut destination = [0u32; 32];
//! let handle =
//!     channel.add_descriptor(&TransferConfig::between_buffers(&source, &mut destination))?;
//! channel.start()?;
//! channel.trigger();
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```
//!
//! Route the platform's DMA interrupt to [`Dmac::on_interrupt`] with
//! the firing channel index; that is the only asynchronous entry point
//! into the driver.
//!
//! ### License
//!
//! Licensed under either of
//!
//! - [Apache License, Version 2.0](http://www.apache.org/licenses/LICENSE-2.0) ([LICENSE-APACHE](./LICENSE-APACHE))
//! - [MIT License](http://opensource.org/licenses/MIT) ([LICENSE-MIT](./LICENSE-MIT))
//!
//! at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted
//! for inclusion in the work by you, as defined in the Apache-2.0 license, shall be
//! dual licensed as above, without any additional terms or conditions.

#![cfg_attr(not(test), no_std)]

mod channel;
mod descriptor;
mod element;
mod error;
mod interrupt;
mod ral;

pub use channel::{Channel, Priority, TriggerAction, TriggerSource};
pub use descriptor::{BeatSize, DescriptorHandle, StepSelect, StepSize, TransferConfig};
pub use element::Element;
pub use error::{Error, JobStatus};
pub use interrupt::{Callback, CallbackKind};

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

use descriptor::DescriptorTables;
use interrupt::CallbackTable;
use ral::{dmac, Static};

/// A DMA result
pub type Result<T> = core::result::Result<T, Error>;

/// The DMA controller driver.
///
/// `Dmac` owns everything the hardware and the interrupt path share:
/// the channel allocation mask, per-channel job status and callback
/// tables, and the descriptor memory the controller fetches. It's
/// configured with a pointer to the controller's register block.
///
/// `CHANNELS` is the number of hardware channels to manage and
/// `DESCRIPTORS` sizes the pool that chained descriptors are allocated
/// from; both must be at most 32.
///
/// `Dmac` hands out [`Channel`]s, which carry the whole transfer API.
pub struct Dmac<const CHANNELS: usize, const DESCRIPTORS: usize> {
    registers: Static<dmac::RegisterBlock>,
    shared: Mutex<RefCell<Shared<CHANNELS>>>,
    tables: DescriptorTables<CHANNELS, DESCRIPTORS>,
}

// Safety: OK to allocate a DMA driver in a static context. Shared state
// is guarded by the critical-section mutex, and descriptor memory is
// only touched with the critical-section token in hand.
unsafe impl<const CHANNELS: usize, const DESCRIPTORS: usize> Sync for Dmac<CHANNELS, DESCRIPTORS> {}

/// State shared between the foreground API and the interrupt path.
pub(crate) struct Shared<const CHANNELS: usize> {
    /// Hardware set up yet? Deferred to the first allocation.
    pub(crate) initialized: bool,
    /// One bit per claimed hardware channel.
    pub(crate) allocated: u32,
    /// One bit per claimed descriptor pool slot.
    pub(crate) pool_used: u32,
    pub(crate) status: [JobStatus; CHANNELS],
    pub(crate) callbacks: [CallbackTable; CHANNELS],
}

impl<const CHANNELS: usize, const DESCRIPTORS: usize> Dmac<CHANNELS, DESCRIPTORS> {
    /// Create the DMA driver.
    ///
    /// This can evaluate at compile time, so a `Dmac` can live in a
    /// `static`. The hardware isn't touched until the first channel
    /// allocation.
    ///
    /// # Safety
    ///
    /// `registers` must point to the start of the DMAC register block,
    /// and `CHANNELS` must not exceed the number of channels your part
    /// actually has. An oversized `CHANNELS` defeats allocation bounds
    /// checking and produces channels that reference reserved memory.
    pub const unsafe fn new(registers: *const ()) -> Self {
        assert!(CHANNELS <= 32);
        assert!(DESCRIPTORS <= 32);
        Dmac {
            registers: Static(registers.cast()),
            shared: Mutex::new(RefCell::new(Shared {
                initialized: false,
                allocated: 0,
                pool_used: 0,
                status: [JobStatus::Ok; CHANNELS],
                callbacks: [interrupt::EMPTY_CALLBACK_TABLE; CHANNELS],
            })),
            tables: DescriptorTables::new(),
        }
    }

    /// Point the controller at our descriptor memory and enable it,
    /// with every priority level armed. Runs once, from the first
    /// channel allocation.
    pub(crate) fn initialize(&self, _cs: CriticalSection<'_>) {
        self.registers.BASEADDR.write(self.tables.base_address());
        self.registers.WRBADDR.write(self.tables.writeback_address());
        self.registers
            .CTRL
            .write(dmac::ctrl::DMAENABLE | dmac::ctrl::LVLEN);
    }

    pub(crate) fn registers(&self) -> &dmac::RegisterBlock {
        &self.registers
    }

    pub(crate) fn channel_registers(&self, channel: usize) -> &dmac::ChannelRegisters {
        &self.registers.CHANNEL[channel]
    }

    pub(crate) fn tables(&self) -> &DescriptorTables<CHANNELS, DESCRIPTORS> {
        &self.tables
    }

    pub(crate) fn shared(&self) -> &Mutex<RefCell<Shared<CHANNELS>>> {
        &self.shared
    }

    /// The last known job status for a hardware channel index.
    ///
    /// Useful from a callback, which receives the channel index rather
    /// than the engine.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is `CHANNELS` or more.
    pub fn job_status(&self, channel: usize) -> JobStatus {
        assert!(channel < CHANNELS);
        critical_section::with(|cs| self.shared.borrow_ref(cs).status[channel])
    }

    /// Channels with a pending interrupt, one bit per channel.
    ///
    /// Handy in a combined interrupt handler that fans out to
    /// [`on_interrupt`](Self::on_interrupt) per set bit.
    pub fn pending_channels(&self) -> u32 {
        self.registers.INTSTATUS.read()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::ral::dmac;

    /// A zeroed register block in leaked host memory, standing in for
    /// the controller. Tests poke interrupt flags into it directly.
    pub(crate) fn zeroed_registers() -> &'static dmac::RegisterBlock {
        // Safety: the register block is plain integers and padding;
        // all-zeroes is a valid (idle) state.
        Box::leak(Box::new(unsafe { core::mem::zeroed() }))
    }
}
