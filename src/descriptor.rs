//! Transfer descriptors, their construction, and the hardware-visible
//! descriptor memory.
//!
//! The controller walks descriptors autonomously once a channel is
//! enabled, so every piece of descriptor memory it can see lives in
//! [`DescriptorTables`], and every read or write of that memory takes a
//! [`CriticalSection`] token. Without that discipline, a store that
//! races the controller's own descriptor fetch can tear, moving an
//! undefined amount of data.

use core::cell::UnsafeCell;

use critical_section::CriticalSection;

use crate::element::Element;
use crate::error::Error;

pub(crate) mod btctrl {
    pub const VALID: u16 = 1 << 0;
    pub const BEATSIZE_SHIFT: u16 = 8;
    pub const BEATSIZE_MASK: u16 = 0x3 << BEATSIZE_SHIFT;
    pub const SRCINC: u16 = 1 << 10;
    pub const DSTINC: u16 = 1 << 11;
    pub const STEPSEL_SRC: u16 = 1 << 12;
    pub const STEPSIZE_SHIFT: u16 = 13;
    pub const STEPSIZE_MASK: u16 = 0x7 << STEPSIZE_SHIFT;
}

/// Number of bytes the controller moves per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum BeatSize {
    /// 8-bit beats.
    Byte = 0,
    /// 16-bit beats.
    HalfWord = 1,
    /// 32-bit beats.
    Word = 2,
}

impl BeatSize {
    pub(crate) const fn bytes(self) -> u32 {
        match self {
            BeatSize::Byte => 1,
            BeatSize::HalfWord => 2,
            BeatSize::Word => 4,
        }
    }
}

/// Address increment step, in beats, for the side selected by
/// [`StepSelect`].
///
/// `X1` is a contiguous transfer; larger steps skip elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum StepSize {
    X1 = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
    X32 = 5,
    X64 = 6,
    X128 = 7,
}

impl StepSize {
    pub(crate) const fn multiplier(self) -> u32 {
        1 << self as u32
    }
}

/// Which side the [`StepSize`] applies to. The controller can't step
/// both sides at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepSelect {
    /// Step the destination address.
    Destination,
    /// Step the source address.
    Source,
}

/// The controller's transfer descriptor record.
///
/// This layout is the wire format the hardware fetches: keep the field
/// order, sizes, and 16-byte alignment exactly as they are. A zero
/// `descaddr` terminates a chain.
///
/// For a side with address increment enabled, `srcaddr`/`dstaddr` hold
/// the address *after* the transfer completes, never the start address.
/// [`end_address`] is the only place that computes this.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransferDescriptor {
    pub(crate) btctrl: u16,
    pub(crate) btcnt: u16,
    pub(crate) srcaddr: u32,
    pub(crate) dstaddr: u32,
    pub(crate) descaddr: u32,
}

const _: () = assert!(core::mem::size_of::<TransferDescriptor>() == 16);

impl TransferDescriptor {
    pub(crate) const EMPTY: Self = TransferDescriptor {
        btctrl: 0,
        btcnt: 0,
        srcaddr: 0,
        dstaddr: 0,
        descaddr: 0,
    };

    pub(crate) fn set_next(&mut self, address: u32) {
        self.descaddr = address;
    }

    pub(crate) fn next(&self) -> u32 {
        self.descaddr
    }

    fn beat_bytes(&self) -> u32 {
        match (self.btctrl & btctrl::BEATSIZE_MASK) >> btctrl::BEATSIZE_SHIFT {
            0 => 1,
            1 => 2,
            _ => 4,
        }
    }

    fn step_multiplier(&self) -> u32 {
        1 << ((self.btctrl & btctrl::STEPSIZE_MASK) >> btctrl::STEPSIZE_SHIFT)
    }

    fn source_step(&self) -> u32 {
        if self.btctrl & btctrl::STEPSEL_SRC != 0 {
            self.step_multiplier()
        } else {
            1
        }
    }

    fn destination_step(&self) -> u32 {
        if self.btctrl & btctrl::STEPSEL_SRC == 0 {
            self.step_multiplier()
        } else {
            1
        }
    }

    /// Re-point source, destination, and count without touching the
    /// increment flags, beat size, or chain linkage.
    ///
    /// Recomputes the stored end addresses from this descriptor's own
    /// flags, so the end-address rule holds after mutation just as it
    /// did at construction.
    pub(crate) fn retarget(&mut self, source: Option<u32>, destination: Option<u32>, count: u16) {
        let beat_bytes = self.beat_bytes();
        if let Some(source) = source {
            self.srcaddr = end_address(
                source,
                count.into(),
                beat_bytes,
                self.btctrl & btctrl::SRCINC != 0,
                self.source_step(),
            );
        }
        if let Some(destination) = destination {
            self.dstaddr = end_address(
                destination,
                count.into(),
                beat_bytes,
                self.btctrl & btctrl::DSTINC != 0,
                self.destination_step(),
            );
        }
        self.btcnt = count;
    }
}

/// Compute the address a descriptor stores for one side of a transfer.
///
/// The controller expects incrementing sides to record where the
/// transfer *ends*: `base + beat_bytes * count * step`. Sides with a
/// fixed address record `base` unchanged. All descriptor address
/// arithmetic in this crate goes through here.
pub(crate) fn end_address(base: u32, count: u32, beat_bytes: u32, increment: bool, step: u32) -> u32 {
    if increment {
        base.wrapping_add(beat_bytes.wrapping_mul(count).wrapping_mul(step))
    } else {
        base
    }
}

/// Everything that goes into one transfer descriptor.
///
/// `TransferConfig` enumerates every recognized descriptor option with
/// stated defaults, instead of a zero-initialized record mutated field
/// by field:
///
/// - beat size: [`BeatSize::Byte`]
/// - source increment: enabled
/// - destination increment: enabled
/// - step: [`StepSize::X1`], applied to the destination
///
/// Addresses are the *start* of each side; the end-address convention
/// the hardware expects is applied when the descriptor is built.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    source: u32,
    destination: u32,
    count: u16,
    beat_size: BeatSize,
    source_increment: bool,
    destination_increment: bool,
    step_size: StepSize,
    step_select: StepSelect,
}

impl TransferConfig {
    /// A transfer of `count` beats from `source` to `destination`,
    /// with the default options listed above.
    pub const fn new(source: u32, destination: u32, count: u16) -> Self {
        TransferConfig {
            source,
            destination,
            count,
            beat_size: BeatSize::Byte,
            source_increment: true,
            destination_increment: true,
            step_size: StepSize::X1,
            step_select: StepSelect::Destination,
        }
    }

    /// A beat-per-element copy between two memory buffers. Moves the
    /// smaller of the two lengths.
    pub fn between_buffers<E: Element>(source: &[E], destination: &mut [E]) -> Self {
        let count = source.len().min(destination.len()).min(u16::MAX as usize) as u16;
        TransferConfig::new(
            source.as_ptr() as usize as u32,
            destination.as_mut_ptr() as usize as u32,
            count,
        )
        .beat_size(E::BEAT_SIZE)
    }

    /// A transfer that feeds a peripheral data register from a memory
    /// buffer. The destination address stays fixed.
    pub fn to_peripheral<E: Element>(source: &[E], destination: *const E) -> Self {
        let count = source.len().min(u16::MAX as usize) as u16;
        TransferConfig::new(
            source.as_ptr() as usize as u32,
            destination as usize as u32,
            count,
        )
        .beat_size(E::BEAT_SIZE)
        .destination_increment(false)
    }

    /// A transfer that drains a peripheral data register into a memory
    /// buffer. The source address stays fixed.
    pub fn from_peripheral<E: Element>(source: *const E, destination: &mut [E]) -> Self {
        let count = destination.len().min(u16::MAX as usize) as u16;
        TransferConfig::new(
            source as usize as u32,
            destination.as_mut_ptr() as usize as u32,
            count,
        )
        .beat_size(E::BEAT_SIZE)
        .source_increment(false)
    }

    /// Set the per-beat transfer width.
    pub const fn beat_size(mut self, beat_size: BeatSize) -> Self {
        self.beat_size = beat_size;
        self
    }

    /// Enable or disable source address increment.
    pub const fn source_increment(mut self, enable: bool) -> Self {
        self.source_increment = enable;
        self
    }

    /// Enable or disable destination address increment.
    pub const fn destination_increment(mut self, enable: bool) -> Self {
        self.destination_increment = enable;
        self
    }

    /// Set the address increment step, and the side it applies to.
    pub const fn step(mut self, size: StepSize, select: StepSelect) -> Self {
        self.step_size = size;
        self.step_select = select;
        self
    }

    pub(crate) fn build(&self) -> Result<TransferDescriptor, Error> {
        if self.count == 0 {
            return Err(Error::InvalidArgument);
        }
        let mut control = btctrl::VALID | (self.beat_size as u16) << btctrl::BEATSIZE_SHIFT;
        if self.source_increment {
            control |= btctrl::SRCINC;
        }
        if self.destination_increment {
            control |= btctrl::DSTINC;
        }
        control |= (self.step_size as u16) << btctrl::STEPSIZE_SHIFT;
        let (source_step, destination_step) = match self.step_select {
            StepSelect::Source => {
                control |= btctrl::STEPSEL_SRC;
                (self.step_size.multiplier(), 1)
            }
            StepSelect::Destination => (1, self.step_size.multiplier()),
        };
        let beat_bytes = self.beat_size.bytes();
        Ok(TransferDescriptor {
            btctrl: control,
            btcnt: self.count,
            srcaddr: end_address(
                self.source,
                self.count.into(),
                beat_bytes,
                self.source_increment,
                source_step,
            ),
            dstaddr: end_address(
                self.destination,
                self.count.into(),
                beat_bytes,
                self.destination_increment,
                destination_step,
            ),
            descaddr: 0,
        })
    }
}

/// A stable reference to a descriptor created by
/// [`add_descriptor`](crate::Channel::add_descriptor).
///
/// Keep the handle if you need to re-point the descriptor later with
/// [`modify`](crate::Channel::modify).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptorHandle {
    index: u8,
}

impl DescriptorHandle {
    pub(crate) const fn new(index: usize) -> Self {
        DescriptorHandle { index: index as u8 }
    }

    pub(crate) const fn index(self) -> usize {
        self.index as usize
    }
}

/// The descriptor memory the controller reads and writes.
///
/// `first` is the per-channel first-descriptor table the controller
/// fetches when a channel is enabled; `writeback` is where it records
/// in-progress descriptor state; `pool` holds every descriptor a chain
/// links through. The controller learns the `first` and `writeback`
/// base addresses at initialization, and reaches `pool` entries only
/// through `descaddr` links.
pub(crate) struct DescriptorTables<const CHANNELS: usize, const DESCRIPTORS: usize> {
    first: [UnsafeCell<TransferDescriptor>; CHANNELS],
    writeback: [UnsafeCell<TransferDescriptor>; CHANNELS],
    pool: [UnsafeCell<TransferDescriptor>; DESCRIPTORS],
}

impl<const CHANNELS: usize, const DESCRIPTORS: usize> DescriptorTables<CHANNELS, DESCRIPTORS> {
    pub(crate) const fn new() -> Self {
        const EMPTY: UnsafeCell<TransferDescriptor> = UnsafeCell::new(TransferDescriptor::EMPTY);
        DescriptorTables {
            first: [EMPTY; CHANNELS],
            writeback: [EMPTY; CHANNELS],
            pool: [EMPTY; DESCRIPTORS],
        }
    }

    /// Address of the first-descriptor table, for BASEADDR.
    pub(crate) fn base_address(&self) -> u32 {
        self.first.as_ptr() as usize as u32
    }

    /// Address of the write-back table, for WRBADDR.
    pub(crate) fn writeback_address(&self) -> u32 {
        self.writeback.as_ptr() as usize as u32
    }

    /// The address a `descaddr` link to this pool entry must carry.
    pub(crate) fn address(&self, handle: DescriptorHandle) -> u32 {
        self.pool[handle.index()].get() as usize as u32
    }

    pub(crate) fn read(&self, _cs: CriticalSection<'_>, handle: DescriptorHandle) -> TransferDescriptor {
        // Safety: critical section token proves exclusive foreground access
        unsafe { core::ptr::read_volatile(self.pool[handle.index()].get()) }
    }

    pub(crate) fn write(
        &self,
        _cs: CriticalSection<'_>,
        handle: DescriptorHandle,
        descriptor: TransferDescriptor,
    ) {
        // Safety: critical section token proves exclusive foreground access
        unsafe { core::ptr::write_volatile(self.pool[handle.index()].get(), descriptor) }
    }

    /// Copy a descriptor into the first-descriptor slot the controller
    /// fetches for `channel`.
    pub(crate) fn write_first(
        &self,
        _cs: CriticalSection<'_>,
        channel: usize,
        descriptor: TransferDescriptor,
    ) {
        // Safety: critical section token proves exclusive foreground access
        unsafe { core::ptr::write_volatile(self.first[channel].get(), descriptor) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incrementing_sides_store_end_addresses() {
        let descriptor = TransferConfig::new(0x2000, 0x3000, 10)
            .beat_size(BeatSize::Word)
            .build()
            .unwrap();
        assert_eq!(descriptor.srcaddr, 0x2000 + 4 * 10);
        assert_eq!(descriptor.dstaddr, 0x3000 + 4 * 10);
        assert_eq!(descriptor.btcnt, 10);
        assert_eq!(descriptor.descaddr, 0);
    }

    #[test]
    fn fixed_sides_store_base_addresses() {
        let descriptor = TransferConfig::new(0x2000, 0x3000, 10)
            .beat_size(BeatSize::Word)
            .source_increment(false)
            .build()
            .unwrap();
        assert_eq!(descriptor.srcaddr, 0x2000);
        assert_eq!(descriptor.dstaddr, 0x3000 + 4 * 10);
    }

    #[test]
    fn step_applies_only_to_selected_side() {
        let descriptor = TransferConfig::new(0x1000, 0x8000, 8)
            .beat_size(BeatSize::HalfWord)
            .step(StepSize::X4, StepSelect::Source)
            .build()
            .unwrap();
        assert_eq!(descriptor.srcaddr, 0x1000 + 2 * 8 * 4);
        assert_eq!(descriptor.dstaddr, 0x8000 + 2 * 8);
    }

    #[test]
    fn zero_count_is_rejected() {
        assert_eq!(
            TransferConfig::new(0x2000, 0x3000, 0).build(),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn retarget_recomputes_with_original_flags() {
        let mut descriptor = TransferConfig::new(0x2000, 0x5000, 10)
            .beat_size(BeatSize::Word)
            .destination_increment(false)
            .build()
            .unwrap();
        let control = descriptor.btctrl;

        descriptor.retarget(Some(0x4000), Some(0x6000), 20);
        assert_eq!(descriptor.srcaddr, 0x4000 + 4 * 20);
        assert_eq!(descriptor.dstaddr, 0x6000);
        assert_eq!(descriptor.btcnt, 20);
        assert_eq!(descriptor.btctrl, control);
    }

    #[test]
    fn retarget_skips_absent_sides() {
        let mut descriptor = TransferConfig::new(0x2000, 0x5000, 10).build().unwrap();
        descriptor.retarget(None, None, 4);
        assert_eq!(descriptor.srcaddr, 0x2000 + 10);
        assert_eq!(descriptor.dstaddr, 0x5000 + 10);
        assert_eq!(descriptor.btcnt, 4);
    }

    #[test]
    fn typed_endpoints_pick_the_beat_size() {
        let source = [0u32; 6];
        let mut destination = [0u32; 4];
        let descriptor = TransferConfig::between_buffers(&source, &mut destination)
            .build()
            .unwrap();
        // count clamps to the smaller buffer
        assert_eq!(descriptor.btcnt, 4);
        assert_eq!(
            descriptor.srcaddr,
            source.as_ptr() as usize as u32 + 4 * 4
        );
    }
}
