//! Register access support for the DMAC register block.

#![allow(non_snake_case, unused)]

pub mod dmac;

pub use ral_registers::{RORegister, RWRegister};

//
// Helper type for static memory
//
// Similar to a RAL `Instance` type, but more copy.
//

pub(crate) struct Static<T>(pub(crate) *const T);
impl<T> core::ops::Deref for Static<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // Safety: pointer points to static memory (peripheral memory)
        unsafe { &*self.0 }
    }
}
impl<T> Clone for Static<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Static<T> {}
