//! Describing data
//!
//! Element types are opaque handles owned by the transport. Besides querying the extent of a
//! type, the large-count collectives only construct one kind of derived type: a contiguous
//! repetition of a base type whose repeat count may exceed the native count limit. A block of
//! `count` elements is then sent as one element of that type.
//!
//! # Standard section(s)
//!
//! 4.1.2, 4.1.5, 4.1.7, 4.1.9

use std::fmt;

use conv::ConvUtil;

use crate::error::{Error, Result};
use crate::{Address, Count, NativeCount};

/// Datatype traits
pub mod traits {
    pub use super::Datatypes;
}

/// Datatype handling of a transport
pub trait Datatypes: crate::topology::Communicator {
    /// A datatype handle
    type Datatype: Clone + PartialEq + fmt::Debug;

    /// The extent of `datatype` in bytes
    ///
    /// # Standard section(s)
    ///
    /// 4.1.7
    fn extent(&self, datatype: &Self::Datatype) -> Result<Address>;

    /// Construct and commit a type consisting of `count` contiguous copies of `base`.
    ///
    /// `count` may exceed the native count limit; the new type is always used with a count of 1.
    ///
    /// # Standard section(s)
    ///
    /// 4.1.2, 4.1.9
    fn contiguous(&self, count: Count, base: &Self::Datatype) -> Result<Self::Datatype>;

    /// Release a type constructed by `contiguous()`.
    ///
    /// # Standard section(s)
    ///
    /// 4.1.9
    fn free_datatype(&self, datatype: &mut Self::Datatype) -> Result<()>;
}

/// The native form of `count`, or `None` if it needs a synthetic type.
///
/// A count equal to `limit` still passes through.
pub fn native_count(count: Count, limit: Count) -> Result<Option<NativeCount>> {
    if count < 0 {
        return Err(Error::NegativeCount(count));
    }
    if count > limit {
        return Ok(None);
    }
    count
        .value_as::<NativeCount>()
        .map(Some)
        .map_err(|_| Error::CountLimit { count, limit })
}

/// Number of bytes spanned by `count` elements of extent `extent`
pub(crate) fn span(count: Count, extent: Address) -> Result<u128> {
    let overflow = || Error::Overflow { count, extent };
    if count < 0 {
        return Err(Error::NegativeCount(count));
    }
    let extent: u64 = extent.value_as().map_err(|_| overflow())?;
    let count: u64 = count.value_as().map_err(|_| overflow())?;
    Ok(u128::from(count) * u128::from(extent))
}
