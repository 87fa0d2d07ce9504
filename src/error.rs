//! Error handling
//!
//! Two kinds of failure exist. Calls that ask for something the large-count collectives cannot do
//! at all (an inter-communicator, an in-place send buffer) are a `Violation` and abort the process
//! group through `Communicator::abort()`. Everything else is an `Error` that is returned to the
//! caller unchanged, in particular every non-success return code of the underlying library.

use std::fmt;
use std::os::raw::c_int;

use thiserror::Error;

use crate::{Address, Count, Rank};

/// Result type of the large-count operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the translator and by the transports it drives
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A call into the MPI library returned something other than `MPI_SUCCESS`
    #[error("{call} failed with MPI error code {code}")]
    Mpi {
        /// Name of the MPI function
        call: &'static str,
        /// The raw return code
        code: c_int,
    },

    /// A count handed to the narrow interface does not fit into it
    #[error("count {count} exceeds the native count limit of {limit}")]
    CountLimit {
        /// The offending count
        count: Count,
        /// The limit of the transport
        limit: Count,
    },

    /// Counts must not be negative
    #[error("invalid negative count {0}")]
    NegativeCount(Count),

    /// A per-process argument array does not have one entry per process
    #[error("{argument} has {actual} entries but the group has {expected} processes")]
    GroupSize {
        /// Name of the argument
        argument: &'static str,
        /// Size of the process group
        expected: usize,
        /// Length of the array that was passed
        actual: usize,
    },

    /// A rank outside of the process group
    #[error("rank {rank} is not part of a group of {size} processes")]
    Rank {
        /// The offending rank
        rank: Rank,
        /// Size of the process group
        size: Rank,
    },

    /// A block of data does not lie within its buffer
    #[error("{bytes} bytes at displacement {displacement} overrun a buffer of {capacity} bytes")]
    Buffer {
        /// Byte displacement of the block
        displacement: Address,
        /// Size of the block in bytes
        bytes: u128,
        /// Size of the buffer in bytes
        capacity: usize,
    },

    /// The extent of a block cannot be represented
    #[error("{count} elements of extent {extent} overflow the address range")]
    Overflow {
        /// Number of elements
        count: Count,
        /// Extent of one element in bytes
        extent: Address,
    },

    /// A message is longer than the receive block it was matched with
    #[error("message of {received} bytes truncated by a receive block of {capacity} bytes")]
    Truncate {
        /// Length of the incoming message
        received: usize,
        /// Capacity of the receive block
        capacity: usize,
    },

    /// A datatype handle that was never created by, or already released to, the transport
    #[error("invalid datatype handle")]
    InvalidDatatype,

    /// A graph communicator that was already released
    #[error("invalid graph communicator")]
    InvalidGraph,

    /// Another process of the group aborted while this one was communicating
    #[error("the process group was aborted")]
    Aborted,
}

/// Preconditions the large-count collectives cannot satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The operation was called on an inter-communicator.
    Intercommunicator,
    /// The send buffer was the in-place sentinel.
    InPlace,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::Intercommunicator => {
                f.write_str("intercommunicators are not supported by the large-count collectives")
            }
            Precondition::InPlace => {
                f.write_str("in-place operation is not supported by the large-count collectives")
            }
        }
    }
}

/// A precondition violated by a particular operation, fatal to the process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    /// Name of the operation, e.g. `"gatherv_x"`
    pub operation: &'static str,
    /// The precondition that does not hold
    pub precondition: Precondition,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.precondition)
    }
}
