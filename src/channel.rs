//! DMA channel and transfer engine

use critical_section::CriticalSection;

use crate::descriptor::{DescriptorHandle, TransferConfig};
use crate::error::{Error, JobStatus};
use crate::interrupt::{Callback, CallbackKind, CallbackTable, EMPTY_CALLBACK_TABLE};
use crate::ral::dmac::{chctrla, chctrlb, chint};
use crate::{Dmac, Result};

/// A peripheral trigger routed to a channel.
///
/// The IDs are device-specific and typically come from the part's
/// header (say, a SERCOM transmit-ready or ADC result-ready ID).
/// [`TriggerSource::SOFTWARE`] disables peripheral triggering; advance
/// the transfer with [`Channel::trigger`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TriggerSource(u8);

impl TriggerSource {
    /// No peripheral trigger; the channel advances on software triggers
    /// only.
    pub const SOFTWARE: Self = TriggerSource(0);

    /// A device-specific peripheral trigger ID.
    pub const fn peripheral(id: u8) -> Self {
        TriggerSource(id & 0x7F)
    }

    pub(crate) const fn id(self) -> u8 {
        self.0
    }
}

/// How much of the transfer one trigger advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum TriggerAction {
    /// One block per trigger.
    Block = 0,
    /// One beat per trigger.
    Beat = 2,
    /// The whole transaction on one trigger.
    Transaction = 3,
}

/// Channel arbitration priority, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Priority {
    Level0 = 0,
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
}

/// A logical DMA transfer stream: one channel, its descriptor chain,
/// and its callbacks.
///
/// A fresh `Channel` holds no hardware. [`allocate`](Self::allocate)
/// claims a channel exclusively from the [`Dmac`]'s pool; configuration
/// ([`set_trigger`](Self::set_trigger), [`set_action`](Self::set_action),
/// [`set_priority`](Self::set_priority)) can happen before or after
/// that, and is applied to hardware at [`start`](Self::start).
///
/// Dropping an allocated `Channel` aborts its job and releases the
/// hardware channel. Descriptors stay in the pool until
/// [`release_descriptors`](Self::release_descriptors) returns them.
pub struct Channel<'dma, const CHANNELS: usize, const DESCRIPTORS: usize> {
    dmac: &'dma Dmac<CHANNELS, DESCRIPTORS>,
    /// `None` until `allocate()`, and again after `free()`.
    index: Option<usize>,
    head: Option<DescriptorHandle>,
    tail: Option<DescriptorHandle>,
    /// Pool slots belonging to this chain, for release.
    chain: u32,
    looped: bool,
    trigger: TriggerSource,
    action: TriggerAction,
    priority: Priority,
    /// Staged callbacks, published to shared state at allocation.
    callbacks: CallbackTable,
}

impl<'dma, const CHANNELS: usize, const DESCRIPTORS: usize> Channel<'dma, CHANNELS, DESCRIPTORS> {
    /// Create an unallocated transfer engine.
    ///
    /// Defaults: software trigger, transaction action, priority level 0.
    pub fn new(dmac: &'dma Dmac<CHANNELS, DESCRIPTORS>) -> Self {
        Channel {
            dmac,
            index: None,
            head: None,
            tail: None,
            chain: 0,
            looped: false,
            trigger: TriggerSource::SOFTWARE,
            action: TriggerAction::Transaction,
            priority: Priority::Level0,
            callbacks: EMPTY_CALLBACK_TABLE,
        }
    }

    /// Claim a free hardware channel.
    ///
    /// This allocates a channel, not a descriptor. Initializes the
    /// controller on the very first allocation, resets the job status
    /// to ok, and publishes any callbacks staged before allocation.
    ///
    /// # Errors
    ///
    /// - `NotFound` if every hardware channel is claimed.
    /// - `Busy` if this engine already holds a channel.
    pub fn allocate(&mut self) -> Result<()> {
        if self.index.is_some() {
            return Err(Error::Busy);
        }
        let index = critical_section::with(|cs| {
            let mut shared = self.dmac.shared().borrow_ref_mut(cs);
            if !shared.initialized {
                self.dmac.initialize(cs);
                shared.initialized = true;
            }
            let index = (0..CHANNELS)
                .find(|index| shared.allocated & (1 << index) == 0)
                .ok_or(Error::NotFound)?;
            shared.allocated |= 1 << index;
            shared.status[index] = JobStatus::Ok;
            shared.callbacks[index] = self.callbacks;
            Ok(index)
        })?;
        let registers = self.dmac.channel_registers(index);
        registers.CHCTRLA.write(0);
        registers.CHINTEN.write(0);
        registers.CHINTFLAG.write(0);
        self.index = Some(index);
        Ok(())
    }

    /// The hardware channel index this engine holds, if any.
    pub fn channel(&self) -> Option<usize> {
        self.index
    }

    /// Set the peripheral trigger source. Takes effect at the next
    /// `start()`.
    pub fn set_trigger(&mut self, trigger: TriggerSource) {
        self.trigger = trigger;
    }

    /// Set the trigger action. Takes effect at the next `start()`.
    pub fn set_action(&mut self, action: TriggerAction) {
        self.action = action;
    }

    /// Set the channel arbitration priority. Takes effect at the next
    /// `start()`.
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// The last known status of this channel's job.
    ///
    /// Reports [`JobStatus::Ok`] for an engine that never allocated.
    pub fn status(&self) -> JobStatus {
        match self.index {
            Some(index) => self.dmac.job_status(index),
            None => JobStatus::Ok,
        }
    }

    /// `true` while a job is running.
    pub fn is_active(&self) -> bool {
        matches!(self.status(), JobStatus::Busy)
    }

    /// Build a descriptor and append it to the tail of this channel's
    /// chain.
    ///
    /// Returns a stable handle for later [`modify`](Self::modify)
    /// calls. If looping is enabled the new tail links back to the
    /// chain head.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`allocate`](Self::allocate).
    /// - `InvalidArgument` for a zero-length transfer.
    /// - `NotFound` when the descriptor pool is exhausted.
    pub fn add_descriptor(&mut self, config: &TransferConfig) -> Result<DescriptorHandle> {
        let index = self.index.ok_or(Error::NotInitialized)?;
        let mut descriptor = config.build()?;
        critical_section::with(|cs| {
            let mut shared = self.dmac.shared().borrow_ref_mut(cs);
            let slot = (0..DESCRIPTORS)
                .find(|slot| shared.pool_used & (1 << slot) == 0)
                .ok_or(Error::NotFound)?;
            shared.pool_used |= 1 << slot;
            drop(shared);

            let handle = DescriptorHandle::new(slot);
            let tables = self.dmac.tables();
            let head = self.head.unwrap_or(handle);
            if self.looped {
                descriptor.set_next(tables.address(head));
            }
            tables.write(cs, handle, descriptor);
            if let Some(tail) = self.tail {
                let mut previous = tables.read(cs, tail);
                previous.set_next(tables.address(handle));
                tables.write(cs, tail, previous);
            }
            if self.head.is_none() {
                self.head = Some(handle);
            }
            self.tail = Some(handle);
            self.chain |= 1 << slot;
            self.sync_first(cs, index);
            Ok(handle)
        })
    }

    /// Make the descriptor chain repeat indefinitely, or restore a
    /// terminating chain.
    ///
    /// Idempotent, and valid before or after a job starts: the
    /// controller picks up the new linkage the next time it reads the
    /// tail descriptor, so don't assume a synchronous effect on a
    /// running job.
    pub fn set_loop(&mut self, enabled: bool) {
        self.looped = enabled;
        if let (Some(head), Some(tail)) = (self.head, self.tail) {
            critical_section::with(|cs| {
                let tables = self.dmac.tables();
                let mut last = tables.read(cs, tail);
                last.set_next(if enabled { tables.address(head) } else { 0 });
                tables.write(cs, tail, last);
                if let Some(index) = self.index {
                    self.sync_first(cs, index);
                }
            });
        }
    }

    /// Start a previously configured job.
    ///
    /// Copies the chain head into the channel's first-descriptor slot,
    /// programs priority, trigger, and action, and enables the channel.
    /// The chain as it exists right now is what the controller will
    /// execute.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`allocate`](Self::allocate).
    /// - `InvalidArgument` if the chain is empty.
    /// - `Busy` if a job is already running.
    pub fn start(&mut self) -> Result<()> {
        let index = self.index.ok_or(Error::NotInitialized)?;
        self.head.ok_or(Error::InvalidArgument)?;
        critical_section::with(|cs| {
            let mut shared = self.dmac.shared().borrow_ref_mut(cs);
            if matches!(shared.status[index], JobStatus::Busy) {
                return Err(Error::Busy);
            }
            shared.status[index] = JobStatus::Busy;
            drop(shared);

            self.sync_first(cs, index);
            let registers = self.dmac.channel_registers(index);
            registers.CHPRILVL.write(self.priority as u8);
            registers.CHCTRLA.write(
                chctrla::ENABLE
                    | u32::from(self.trigger.id()) << chctrla::TRIGSRC_SHIFT
                    | (self.action as u32) << chctrla::TRIGACT_SHIFT,
            );
            Ok(())
        })
    }

    /// Fire the channel's software trigger.
    ///
    /// Only a side effect: logical state changes arrive later through
    /// the interrupt path, if armed. A no-op on an unallocated engine.
    pub fn trigger(&self) {
        if let Some(index) = self.index {
            let registers = self.dmac.registers();
            let pending = registers.SWTRIGCTRL.read();
            registers.SWTRIGCTRL.write(pending | 1 << index);
        }
    }

    /// Re-point an existing descriptor at new data without stopping the
    /// job.
    ///
    /// Only source, destination, and count change; increment flags,
    /// beat size, and chain linkage are untouched, and end addresses
    /// are recomputed by the construction rule. `None` leaves a side
    /// alone. The whole update runs inside one critical section: the
    /// controller may be fetching this very descriptor, and a torn
    /// write would move an undefined amount of data. Inside it the job
    /// is marked busy, the record is copied into the hardware-visible
    /// slot, and the channel is re-enabled.
    ///
    /// The descriptor should be the chain's active (or next-to-run)
    /// one, typically for re-pointing a peripheral-feeding stream at
    /// fresh data. Modifying an arbitrary mid-chain descriptor while
    /// the controller is elsewhere in the chain is the caller's
    /// responsibility.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`allocate`](Self::allocate).
    /// - `InvalidArgument` for a zero count or a handle that isn't in
    ///   this channel's chain.
    pub fn modify(
        &mut self,
        handle: DescriptorHandle,
        source: Option<u32>,
        destination: Option<u32>,
        count: u16,
    ) -> Result<()> {
        let index = self.index.ok_or(Error::NotInitialized)?;
        if count == 0 || self.chain & (1 << handle.index()) == 0 {
            return Err(Error::InvalidArgument);
        }
        critical_section::with(|cs| {
            let tables = self.dmac.tables();
            let mut descriptor = tables.read(cs, handle);
            descriptor.retarget(source, destination, count);

            self.dmac.shared().borrow_ref_mut(cs).status[index] = JobStatus::Busy;
            tables.write(cs, handle, descriptor);
            if self.head == Some(handle) {
                self.sync_first(cs, index);
            }
            let registers = self.dmac.channel_registers(index);
            registers
                .CHCTRLA
                .write(registers.CHCTRLA.read() | chctrla::ENABLE);
            Ok(())
        })
    }

    /// Cancel the job. Always safe, in any state, and never fails.
    ///
    /// This is the cancellation primitive: it disables the channel
    /// immediately and leaves the status at
    /// [`JobStatus::Aborted`] until an explicit `free()` or `start()`.
    /// Don't reach for [`suspend`](Self::suspend)/[`resume`](Self::resume)
    /// to cancel.
    pub fn abort(&mut self) {
        if let Some(index) = self.index {
            critical_section::with(|cs| {
                let registers = self.dmac.channel_registers(index);
                registers
                    .CHCTRLA
                    .write(registers.CHCTRLA.read() & !chctrla::ENABLE);
                self.dmac.shared().borrow_ref_mut(cs).status[index] = JobStatus::Aborted;
            });
        }
    }

    /// Suspend the channel at the next beat boundary.
    ///
    /// Suspend/resume have surprising behavior on this hardware; they
    /// exist for API compatibility and advanced use. Don't rely on
    /// them for correctness-critical pausing. Use
    /// [`abort`](Self::abort) for cancellation.
    pub fn suspend(&self) {
        if let Some(index) = self.index {
            self.dmac
                .channel_registers(index)
                .CHCTRLB
                .write(chctrlb::CMD_SUSPEND);
        }
    }

    /// Resume a suspended channel. See the caveat on
    /// [`suspend`](Self::suspend).
    pub fn resume(&mut self) {
        if let Some(index) = self.index {
            critical_section::with(|cs| {
                self.dmac
                    .channel_registers(index)
                    .CHCTRLB
                    .write(chctrlb::CMD_RESUME);
                let mut shared = self.dmac.shared().borrow_ref_mut(cs);
                if matches!(shared.status[index], JobStatus::Suspended) {
                    shared.status[index] = JobStatus::Busy;
                }
            });
        }
    }

    /// Release the hardware channel.
    ///
    /// This deallocates the channel, not any descriptors; the chain
    /// survives for a later [`allocate`](Self::allocate)/[`start`](Self::start)
    /// or [`release_descriptors`](Self::release_descriptors).
    ///
    /// # Errors
    ///
    /// - `Busy` while a job is running; abort first.
    /// - `NotInitialized` if the engine holds no channel.
    pub fn free(&mut self) -> Result<()> {
        let index = self.index.ok_or(Error::NotInitialized)?;
        critical_section::with(|cs| {
            let mut shared = self.dmac.shared().borrow_ref_mut(cs);
            if matches!(shared.status[index], JobStatus::Busy) {
                return Err(Error::Busy);
            }
            shared.allocated &= !(1 << index);
            shared.callbacks[index] = EMPTY_CALLBACK_TABLE;
            Ok(())
        })?;
        self.dmac.channel_registers(index).CHINTEN.write(0);
        self.index = None;
        Ok(())
    }

    /// Return every descriptor in this channel's chain to the pool.
    ///
    /// This deallocates the descriptors, not the channel.
    ///
    /// # Errors
    ///
    /// - `Busy` while a job is running.
    pub fn release_descriptors(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(Error::Busy);
        }
        critical_section::with(|cs| {
            self.dmac.shared().borrow_ref_mut(cs).pool_used &= !self.chain;
        });
        self.chain = 0;
        self.head = None;
        self.tail = None;
        Ok(())
    }

    /// Store or clear the notification function for one event kind.
    ///
    /// May be called before or after allocation, but before
    /// [`start`](Self::start) if the job needs it. The function is
    /// only ever invoked once the kind is armed with
    /// [`enable_callback`](Self::enable_callback).
    pub fn set_callback(&mut self, kind: CallbackKind, callback: Option<Callback>) {
        self.callbacks[kind as usize] = callback;
        if let Some(index) = self.index {
            critical_section::with(|cs| {
                self.dmac.shared().borrow_ref_mut(cs).callbacks[index][kind as usize] = callback;
            });
        }
    }

    /// Arm hardware interrupt generation for one event kind.
    ///
    /// Without arming, a stored callback is never invoked, even when
    /// the event occurs. You're responsible for routing the DMA
    /// interrupt to [`Dmac::on_interrupt`].
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`allocate`](Self::allocate).
    pub fn enable_callback(&mut self, kind: CallbackKind) -> Result<()> {
        let index = self.index.ok_or(Error::NotInitialized)?;
        let registers = self.dmac.channel_registers(index);
        registers
            .CHINTEN
            .write(registers.CHINTEN.read() | kind.flag());
        Ok(())
    }

    /// Disarm hardware interrupt generation for one event kind. The
    /// stored function stays registered.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`allocate`](Self::allocate).
    pub fn disable_callback(&mut self, kind: CallbackKind) -> Result<()> {
        let index = self.index.ok_or(Error::NotInitialized)?;
        let registers = self.dmac.channel_registers(index);
        registers
            .CHINTEN
            .write(registers.CHINTEN.read() & !kind.flag() & chint::ALL);
        Ok(())
    }

    /// Mirror the chain head into the first-descriptor slot the
    /// controller fetches for this channel.
    fn sync_first(&self, cs: CriticalSection<'_>, index: usize) {
        if let Some(head) = self.head {
            let tables = self.dmac.tables();
            tables.write_first(cs, index, tables.read(cs, head));
        }
    }
}

impl<const CHANNELS: usize, const DESCRIPTORS: usize> Drop
    for Channel<'_, CHANNELS, DESCRIPTORS>
{
    fn drop(&mut self) {
        if self.index.is_some() {
            self.abort();
            let _ = self.free();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, Priority, TriggerAction, TriggerSource};
    use crate::descriptor::btctrl;
    use crate::ral::dmac::chctrla;
    use crate::testing::zeroed_registers;
    use crate::{BeatSize, Dmac, Error, JobStatus, TransferConfig};

    fn test_dmac<const CHANNELS: usize, const DESCRIPTORS: usize>() -> Dmac<CHANNELS, DESCRIPTORS>
    {
        let registers = zeroed_registers();
        unsafe { Dmac::new(registers as *const _ as *const ()) }
    }

    fn word_transfer(source: u32, destination: u32, count: u16) -> TransferConfig {
        TransferConfig::new(source, destination, count).beat_size(BeatSize::Word)
    }

    #[test]
    fn allocation_is_exclusive() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut first = Channel::new(&dmac);
        let mut second = Channel::new(&dmac);
        let mut third = Channel::new(&dmac);

        first.allocate().unwrap();
        second.allocate().unwrap();
        assert_eq!(third.allocate(), Err(Error::NotFound));

        second.free().unwrap();
        assert_eq!(third.allocate(), Ok(()));
        assert_eq!(third.channel(), Some(1));
    }

    #[test]
    fn double_allocation_is_rejected() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        assert_eq!(channel.allocate(), Err(Error::Busy));
    }

    #[test]
    fn start_preconditions() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);

        assert_eq!(channel.start(), Err(Error::NotInitialized));

        channel.allocate().unwrap();
        assert_eq!(channel.start(), Err(Error::InvalidArgument));

        channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();
        channel.start().unwrap();
        assert_eq!(channel.status(), JobStatus::Busy);
        assert_eq!(channel.start(), Err(Error::Busy));
    }

    #[test]
    fn start_programs_the_channel() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        channel.set_trigger(TriggerSource::peripheral(0x0A));
        channel.set_action(TriggerAction::Beat);
        channel.set_priority(Priority::Level2);
        channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();
        channel.start().unwrap();

        let index = channel.channel().unwrap();
        let registers = dmac.registers();
        let control = registers.CHANNEL[index].CHCTRLA.read();
        assert_ne!(control & chctrla::ENABLE, 0);
        assert_eq!((control & chctrla::TRIGSRC_MASK) >> chctrla::TRIGSRC_SHIFT, 0x0A);
        assert_eq!(
            (control & chctrla::TRIGACT_MASK) >> chctrla::TRIGACT_SHIFT,
            TriggerAction::Beat as u32
        );
        assert_eq!(registers.CHANNEL[index].CHPRILVL.read(), 2);
        // the controller learned our descriptor memory at first allocation
        assert_ne!(registers.BASEADDR.read(), 0);
        assert_ne!(registers.WRBADDR.read(), 0);
    }

    #[test]
    fn add_descriptor_requires_allocation() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        assert_eq!(
            channel.add_descriptor(&word_transfer(0x2000, 0x3000, 4)),
            Err(Error::NotInitialized)
        );
    }

    #[test]
    fn descriptors_chain_in_order() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        let first = channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();
        let second = channel
            .add_descriptor(&word_transfer(0x4000, 0x5000, 8))
            .unwrap();

        critical_section::with(|cs| {
            let tables = dmac.tables();
            assert_eq!(tables.read(cs, first).next(), tables.address(second));
            assert_eq!(tables.read(cs, second).next(), 0);
        });
    }

    #[test]
    fn descriptor_pool_exhaustion() {
        let dmac: Dmac<1, 2> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();
        channel
            .add_descriptor(&word_transfer(0x4000, 0x5000, 4))
            .unwrap();
        assert_eq!(
            channel.add_descriptor(&word_transfer(0x6000, 0x7000, 4)),
            Err(Error::NotFound)
        );

        channel.release_descriptors().unwrap();
        assert!(channel
            .add_descriptor(&word_transfer(0x6000, 0x7000, 4))
            .is_ok());
    }

    #[test]
    fn loop_linkage_is_idempotent() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        let head = channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();
        let tail = channel
            .add_descriptor(&word_transfer(0x4000, 0x5000, 8))
            .unwrap();

        channel.set_loop(true);
        let linked = critical_section::with(|cs| dmac.tables().read(cs, tail));
        assert_eq!(linked.next(), dmac.tables().address(head));

        channel.set_loop(true);
        let relinked = critical_section::with(|cs| dmac.tables().read(cs, tail));
        assert_eq!(relinked, linked);

        channel.set_loop(false);
        let terminated = critical_section::with(|cs| dmac.tables().read(cs, tail));
        assert_eq!(terminated.next(), 0);
    }

    #[test]
    fn looping_a_single_descriptor_links_it_to_itself() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        channel.set_loop(true);
        let only = channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();

        critical_section::with(|cs| {
            assert_eq!(dmac.tables().read(cs, only).next(), dmac.tables().address(only));
        });
    }

    #[test]
    fn modify_retargets_only_the_named_descriptor() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        let head = channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 10))
            .unwrap();
        let other = channel
            .add_descriptor(&word_transfer(0x4000, 0x5000, 8))
            .unwrap();
        channel.start().unwrap();

        let untouched = critical_section::with(|cs| dmac.tables().read(cs, other));
        channel
            .modify(head, Some(0x8000), Some(0x9000), 20)
            .unwrap();

        let modified = critical_section::with(|cs| dmac.tables().read(cs, head));
        assert_eq!(modified.srcaddr, 0x8000 + 4 * 20);
        assert_eq!(modified.dstaddr, 0x9000 + 4 * 20);
        assert_eq!(modified.btcnt, 20);
        assert_ne!(modified.btctrl & btctrl::SRCINC, 0);
        assert_eq!(
            critical_section::with(|cs| dmac.tables().read(cs, other)),
            untouched
        );
        assert_eq!(channel.status(), JobStatus::Busy);

        // the channel is re-enabled so the controller resumes with the
        // new parameters
        let index = channel.channel().unwrap();
        assert_ne!(
            dmac.registers().CHANNEL[index].CHCTRLA.read() & chctrla::ENABLE,
            0
        );
    }

    #[test]
    fn modify_rejects_foreign_handles_and_zero_counts() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        let mut other = Channel::new(&dmac);
        channel.allocate().unwrap();
        other.allocate().unwrap();
        let own = channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 10))
            .unwrap();
        let foreign = other
            .add_descriptor(&word_transfer(0x4000, 0x5000, 8))
            .unwrap();

        assert_eq!(
            channel.modify(own, None, None, 0),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            channel.modify(foreign, Some(0x8000), None, 4),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn abort_always_succeeds_then_free() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);

        // harmless before allocation
        channel.abort();

        channel.allocate().unwrap();
        channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();
        channel.start().unwrap();

        assert_eq!(channel.free(), Err(Error::Busy));

        channel.abort();
        assert_eq!(channel.status(), JobStatus::Aborted);
        let index = channel.channel().unwrap();
        assert_eq!(
            dmac.registers().CHANNEL[index].CHCTRLA.read() & chctrla::ENABLE,
            0
        );

        channel.free().unwrap();
        assert_eq!(channel.channel(), None);
        assert_eq!(channel.free(), Err(Error::NotInitialized));
    }

    #[test]
    fn descriptors_survive_free() {
        let dmac: Dmac<2, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();
        channel.free().unwrap();

        channel.allocate().unwrap();
        channel.start().unwrap();
        assert_eq!(channel.status(), JobStatus::Busy);
    }

    #[test]
    fn software_trigger_sets_the_channel_bit() {
        let dmac: Dmac<4, 4> = test_dmac();
        let mut channel = Channel::new(&dmac);
        channel.allocate().unwrap();
        channel
            .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
            .unwrap();
        channel.start().unwrap();
        channel.trigger();

        let index = channel.channel().unwrap();
        assert_ne!(dmac.registers().SWTRIGCTRL.read() & (1 << index), 0);
    }

    #[test]
    fn dropping_an_allocated_channel_releases_it() {
        let dmac: Dmac<1, 4> = test_dmac();
        {
            let mut channel = Channel::new(&dmac);
            channel.allocate().unwrap();
            channel
                .add_descriptor(&word_transfer(0x2000, 0x3000, 4))
                .unwrap();
            channel.start().unwrap();
        }
        let mut next = Channel::new(&dmac);
        assert_eq!(next.allocate(), Ok(()));
    }
}
