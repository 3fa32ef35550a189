//! Transfer element types

use crate::descriptor::BeatSize;

/// A type that the DMA controller can move as one beat.
///
/// `Element` ties a Rust type to the controller's beat size, so that
/// typed transfer endpoints carry the right per-beat width without the
/// caller spelling it out. The trait is sealed; the controller only
/// moves 1, 2, or 4 byte beats.
pub trait Element: private::Sealed + Copy {
    /// The beat size the controller uses for this type.
    const BEAT_SIZE: BeatSize;
}

impl Element for u8 {
    const BEAT_SIZE: BeatSize = BeatSize::Byte;
}

impl Element for u16 {
    const BEAT_SIZE: BeatSize = BeatSize::HalfWord;
}

impl Element for u32 {
    const BEAT_SIZE: BeatSize = BeatSize::Word;
}

mod private {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
}
