//! Non-blocking point to point communication
//!
//! Only the immediate standard mode operations and the completion of a whole set of requests are
//! needed to run a collective as a point-to-point schedule.
//!
//! # Standard section(s)
//!
//! 3.7.2, 3.7.3, 3.7.5

use crate::datatype::Datatypes;
use crate::error::Result;
use crate::{NativeCount, Rank, Tag};

/// Point to point traits
pub mod traits {
    pub use super::ImmediatePointToPoint;
}

/// Immediate (non-blocking) sends and receives on a communicator
pub trait ImmediatePointToPoint: Datatypes {
    /// Handle of an operation in flight
    type Request;

    /// Start sending `count` elements of `datatype` starting at `buf` to `destination`.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for reads of `count` times the extent of `datatype` bytes until the
    /// returned request has been completed with `wait_all()`.
    ///
    /// # Standard section(s)
    ///
    /// 3.7.2
    unsafe fn immediate_send(
        &self,
        buf: *const u8,
        count: NativeCount,
        datatype: &Self::Datatype,
        destination: Rank,
        tag: Tag,
    ) -> Result<Self::Request>;

    /// Start receiving at most `count` elements of `datatype` into `buf` from `source`.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for writes of `count` times the extent of `datatype` bytes, and not be
    /// accessed otherwise, until the returned request has been completed with `wait_all()`.
    ///
    /// # Standard section(s)
    ///
    /// 3.7.2
    unsafe fn immediate_receive(
        &self,
        buf: *mut u8,
        count: NativeCount,
        datatype: &Self::Datatype,
        source: Rank,
        tag: Tag,
    ) -> Result<Self::Request>;

    /// Complete every request in `requests`.
    ///
    /// All requests are completed even if one of them fails; the first failure is returned.
    ///
    /// # Standard section(s)
    ///
    /// 3.7.5
    fn wait_all(&self, requests: Vec<Self::Request>) -> Result<()>;
}
