//! DMA error and job status codes

use core::fmt::{self, Display};

/// An error returned by a channel or job operation.
///
/// Every fallible operation reports failure through one of these
/// codes; nothing in this driver panics on a bad request. Asynchronous
/// outcomes (bus errors, aborts, suspends) are reported through
/// [`JobStatus`] instead, since there's no synchronous return path
/// for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// No free hardware channel, or no free descriptor slot.
    NotFound,
    /// The operation needs an allocated channel, and the engine
    /// doesn't hold one.
    NotInitialized,
    /// A bad transfer description: zero-length descriptor, empty
    /// chain, or a handle that isn't part of this channel's chain.
    InvalidArgument,
    /// The operation conflicts with a job that's still running, or
    /// with a channel the engine already holds.
    Busy,
    /// Reserved. The default backend never reports timeouts; completion
    /// is purely event-driven.
    Timeout,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Error::NotFound => "no free channel or descriptor",
            Error::NotInitialized => "channel not allocated",
            Error::InvalidArgument => "invalid transfer description",
            Error::Busy => "channel busy",
            Error::Timeout => "timed out",
        };
        f.write_str(description)
    }
}

/// The last known status of a channel's job.
///
/// Updated by [`start`](crate::Channel::start), [`abort`](crate::Channel::abort),
/// [`modify`](crate::Channel::modify), and by the interrupt path when the
/// corresponding event kind is armed. Poll it with
/// [`Channel::status`](crate::Channel::status) or
/// [`Dmac::job_status`](crate::Dmac::job_status).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobStatus {
    /// Idle, or the last job completed successfully.
    Ok,
    /// A job is running. Set on `start()` and `modify()`, cleared by the
    /// transfer-done interrupt.
    Busy,
    /// The channel was suspended at a beat boundary.
    Suspended,
    /// The job was cancelled with `abort()`.
    Aborted,
    /// The controller reported a bus error or fetched an invalid
    /// descriptor.
    TransferError,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            JobStatus::Ok => "ok",
            JobStatus::Busy => "busy",
            JobStatus::Suspended => "suspended",
            JobStatus::Aborted => "aborted",
            JobStatus::TransferError => "transfer error",
        };
        f.write_str(description)
    }
}
