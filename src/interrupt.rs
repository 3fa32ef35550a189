//! DMA interrupt support
//!
//! The platform's DMA interrupt entry point resolves the firing channel
//! index (for example from [`Dmac::pending_channels`]) and calls
//! [`Dmac::on_interrupt`]. Everything else in this module is the
//! per-channel callback bookkeeping that call relies on.

use crate::error::JobStatus;
use crate::ral::dmac::chint;
use crate::Dmac;

/// The event kinds a channel can notify on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CallbackKind {
    /// A bus error during an AHB access, or the controller fetched an
    /// invalid descriptor.
    TransferError = 0,
    /// A transfer completed successfully.
    TransferDone = 1,
    /// The channel was suspended.
    Suspend = 2,
}

impl CallbackKind {
    /// The channel interrupt flag bit for this kind.
    pub(crate) const fn flag(self) -> u8 {
        match self {
            CallbackKind::TransferError => chint::TERR,
            CallbackKind::TransferDone => chint::TCMPL,
            CallbackKind::Suspend => chint::SUSP,
        }
    }
}

/// Order matters: a transfer error beats a completion that raced it.
const DISPATCH_ORDER: [CallbackKind; CALLBACK_KINDS] = [
    CallbackKind::TransferError,
    CallbackKind::TransferDone,
    CallbackKind::Suspend,
];

/// A channel event notification.
///
/// Invoked synchronously from the DMA interrupt with the firing
/// channel's index. Treat it as a restricted execution context: don't
/// block, keep the work minimal, and defer anything heavy to the
/// foreground through a flag or queue. Job status is already updated
/// when the callback runs, so [`Dmac::job_status`] is safe to consult.
pub type Callback = fn(usize);

pub(crate) const CALLBACK_KINDS: usize = 3;
pub(crate) type CallbackTable = [Option<Callback>; CALLBACK_KINDS];
pub(crate) const EMPTY_CALLBACK_TABLE: CallbackTable = [None; CALLBACK_KINDS];

impl<const CHANNELS: usize, const DESCRIPTORS: usize> Dmac<CHANNELS, DESCRIPTORS> {
    /// Handle a DMA interrupt for one channel.
    ///
    /// Reads the channel's pending event flags, masked by the kinds
    /// armed with [`enable_callback`](crate::Channel::enable_callback):
    /// an event that was never armed is left untouched and never
    /// reaches a callback. Each serviced event is acknowledged, the
    /// job status updated (done → ok, bus error → transfer error,
    /// suspend → suspended), and the registered callback, if any,
    /// invoked after the critical section is released.
    ///
    /// Call this from the platform's DMA interrupt handler with the
    /// firing channel index. Spurious calls are harmless.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is `CHANNELS` or more.
    pub fn on_interrupt(&self, channel: usize) {
        assert!(channel < CHANNELS);
        let registers = self.channel_registers(channel);
        let flags = registers.CHINTFLAG.read();
        let pending = flags & registers.CHINTEN.read() & chint::ALL;
        if pending == 0 {
            return;
        }
        registers.CHINTFLAG.write(flags & !pending);

        for kind in DISPATCH_ORDER {
            if pending & kind.flag() == 0 {
                continue;
            }
            let callback = critical_section::with(|cs| {
                let mut shared = self.shared().borrow_ref_mut(cs);
                shared.status[channel] = match kind {
                    CallbackKind::TransferError => JobStatus::TransferError,
                    CallbackKind::TransferDone => JobStatus::Ok,
                    CallbackKind::Suspend => JobStatus::Suspended,
                };
                shared.callbacks[channel][kind as usize]
            });
            if let Some(callback) = callback {
                callback(channel);
            }
        }
    }
}
