#![warn(missing_docs)]
#![warn(missing_copy_implementations)]
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_qualifications)]

//! Large-count variable collectives for message-passing programs
//!
//! The C interface of the [Message Passing Interface][MPI] describes every count, displacement
//! and datatype argument of its collective operations with a C `int`. A single gather, scatter
//! or all-to-all that moves more than `i32::MAX` elements to or from one process can therefore
//! not be expressed directly. This crate translates such calls into operations that only use
//! counts within the native limit:
//!
//! - a block of more than `i32::MAX` elements is described by a synthetic contiguous datatype
//!   with a count of 1,
//! - the whole collective is issued as one generalized neighbor all-to-all
//!   (`MPI_Neighbor_alltoallw()`, which takes wide byte displacements) over a complete graph
//!   communicator, or alternatively as a schedule of non-blocking sends and receives.
//!
//! [MPI]: http://www.mpi-forum.org
//!
//! # Usage
//!
//! ```no_run
//! use bigmpi::local::{LocalDatatype, LocalUniverse};
//! use bigmpi::traits::*;
//!
//! let gathered = LocalUniverse::new(4)
//!     .run(|world| {
//!         let rank = world.rank();
//!         let size = world.size() as usize;
//!         let byte = LocalDatatype::BYTE;
//!         let contribution = vec![rank as u8; 3];
//!         let mut recvbuf = vec![0u8; 3 * size];
//!         let counts = vec![3; size];
//!         let displs: Vec<_> = (0..size as isize).map(|i| 3 * i).collect();
//!         world
//!             .all_gather_varcount_x(&contribution[..], 3, &byte, &mut recvbuf, &counts, &displs, &byte)
//!             .unwrap();
//!         recvbuf
//!     })
//!     .unwrap();
//! assert_eq!(gathered[0], vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]);
//! ```
//!
//! # Features
//!
//! - **Operations**: gather, scatter, all-gather, all-to-all and generalized all-to-all with wide
//!   counts and wide byte displacements (`collective`).
//! - **Realizations**: neighbor exchange over a complete graph (default) or a point-to-point
//!   schedule (cargo feature `p2p`, or `BIGMPI_VCOLLS=p2p` at run time), see `environment`.
//! - **Transports**: an in-process group of threads (`local`) and, with the cargo feature `mpi`,
//!   the system MPI library (`mpi`).
//!
//! Not supported:
//!
//! - Inter-communicators
//! - In-place operation (`MPI_IN_PLACE`)
//!
//! Both abort the calling process group.

use std::os::raw::c_int;

pub mod collective;
pub mod datatype;
pub mod environment;
pub mod error;
pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;
pub mod point_to_point;
pub mod topology;

/// The raw C language MPI API
///
/// Documented in the [Message Passing Interface specification][spec]
///
/// [spec]: http://www.mpi-forum.org/docs/docs.html
#[cfg(feature = "mpi")]
pub use mpi_sys as ffi;

/// Re-exports all traits.
pub mod traits {
    pub use crate::collective::traits::*;
    pub use crate::datatype::traits::*;
    pub use crate::point_to_point::traits::*;
    pub use crate::topology::traits::*;
}

pub use crate::collective::{SendBuffer, Translator};
pub use crate::environment::{Config, Strategy};
pub use crate::error::{Error, Result};

/// Encodes number of values in multi-value messages, wide enough for any buffer.
pub type Count = i64;
/// The count type understood by the narrow interface of the message-passing library.
pub type NativeCount = c_int;
/// An address in memory, or a byte displacement relative to one
pub type Address = isize;
/// Identifies a certain process within a communicator.
pub type Rank = c_int;
/// Can be used to tag messages on the sender side and match on the receiver side.
pub type Tag = c_int;

/// The largest count a single native count argument can hold.
pub const NATIVE_COUNT_LIMIT: Count = NativeCount::MAX as Count;
