//! The system MPI library as a transport
//!
//! Implements the communicator, datatype, point to point and neighborhood collective traits on
//! top of the raw C API exposed by `mpi-sys`. Every return code is checked and surfaced as
//! `Error::Mpi` naming the failed call.
//!
//! # Examples
//! See `demos/mpi_all_gather_x.rs`
#![allow(trivial_numeric_casts)]

use std::mem::{self, MaybeUninit};
use std::os::raw::{c_int, c_void};
use std::{process, ptr};

use conv::ConvUtil;
use smallvec::SmallVec;

use crate::collective::{NeighborBlocks, NeighborCollectives};
use crate::datatype::Datatypes;
use crate::error::{Error, Result, Violation};
use crate::ffi;
use crate::ffi::{MPI_Comm, MPI_Datatype, MPI_Request};
use crate::point_to_point::ImmediatePointToPoint;
use crate::topology::Communicator;
use crate::{Address, Count, NativeCount, Rank, Tag, NATIVE_COUNT_LIMIT};

/// Error code passed to `MPI_Abort()` for unsupported calls
pub const ABORT_CODE: c_int = 1;

fn check(call: &'static str, code: c_int) -> Result<()> {
    if code == ffi::MPI_SUCCESS as c_int {
        Ok(())
    } else {
        Err(Error::Mpi { call, code })
    }
}

/// Global context
///
/// Finalizes MPI when dropped.
pub struct Universe {
    _private: (),
}

impl Universe {
    /// The 'world communicator'
    ///
    /// Contains all processes initially partaking in the computation.
    pub fn world(&self) -> MpiCommunicator {
        MpiCommunicator::world()
    }
}

impl Drop for Universe {
    fn drop(&mut self) {
        let code = unsafe { ffi::MPI_Finalize() };
        if let Err(err) = check("MPI_Finalize", code) {
            tracing::warn!(%err, "failed to finalize MPI");
        }
    }
}

/// Whether the MPI library has been initialized
fn is_initialized() -> bool {
    let mut res: c_int = 0;
    unsafe {
        ffi::MPI_Initialized(&mut res);
    }
    res != 0
}

/// Initialize MPI.
///
/// If the MPI library has not been initialized so far, initializes it for single-threaded use
/// and returns the `Universe`. Otherwise returns `Ok(None)`.
///
/// # Standard section(s)
///
/// 12.4.3
pub fn initialize() -> Result<Option<Universe>> {
    if is_initialized() {
        return Ok(None);
    }
    let mut provided: c_int = 0;
    let code = unsafe {
        ffi::MPI_Init_thread(
            ptr::null_mut(),
            ptr::null_mut(),
            ffi::RSMPI_THREAD_SINGLE,
            &mut provided,
        )
    };
    check("MPI_Init_thread", code)?;
    Ok(Some(Universe { _private: () }))
}

/// A communicator of the MPI library
#[derive(Copy, Clone, Debug)]
pub struct MpiCommunicator(MPI_Comm);

impl MpiCommunicator {
    /// `MPI_COMM_WORLD`
    pub fn world() -> Self {
        MpiCommunicator(unsafe { ffi::RSMPI_COMM_WORLD })
    }

    /// Wraps a raw communicator handle.
    ///
    /// # Safety
    ///
    /// `raw` must be a valid intra- or inter-communicator for as long as the wrapper is used.
    pub unsafe fn from_raw(raw: MPI_Comm) -> Self {
        MpiCommunicator(raw)
    }

    /// The raw handle
    pub fn as_raw(&self) -> MPI_Comm {
        self.0
    }
}

/// A datatype handle of the MPI library
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MpiDatatype(MPI_Datatype);

impl MpiDatatype {
    /// Wraps a raw datatype handle.
    ///
    /// # Safety
    ///
    /// `raw` must be a valid, committed datatype.
    pub unsafe fn from_raw(raw: MPI_Datatype) -> Self {
        MpiDatatype(raw)
    }

    /// The raw handle
    pub fn as_raw(&self) -> MPI_Datatype {
        self.0
    }

    /// The predefined type equivalent to `T`
    pub fn of<T: Equivalence>() -> Self {
        T::equivalent_datatype()
    }
}

/// A type with an equivalent predefined MPI datatype
///
/// # Safety
///
/// The datatype must describe the in-memory layout of `Self` exactly.
pub unsafe trait Equivalence {
    /// The equivalent datatype
    fn equivalent_datatype() -> MpiDatatype;
}

macro_rules! equivalent_system_datatype {
    ($rstype:path, $mpitype:path) => {
        unsafe impl Equivalence for $rstype {
            fn equivalent_datatype() -> MpiDatatype {
                MpiDatatype(unsafe { $mpitype })
            }
        }
    };
}

equivalent_system_datatype!(f32, ffi::RSMPI_FLOAT);
equivalent_system_datatype!(f64, ffi::RSMPI_DOUBLE);

equivalent_system_datatype!(i8, ffi::RSMPI_INT8_T);
equivalent_system_datatype!(i16, ffi::RSMPI_INT16_T);
equivalent_system_datatype!(i32, ffi::RSMPI_INT32_T);
equivalent_system_datatype!(i64, ffi::RSMPI_INT64_T);

equivalent_system_datatype!(u8, ffi::RSMPI_UINT8_T);
equivalent_system_datatype!(u16, ffi::RSMPI_UINT16_T);
equivalent_system_datatype!(u32, ffi::RSMPI_UINT32_T);
equivalent_system_datatype!(u64, ffi::RSMPI_UINT64_T);

/// A distributed graph communicator
#[allow(missing_copy_implementations)]
#[derive(Debug)]
pub struct MpiGraph(MPI_Comm);

/// A request of the MPI library
#[allow(missing_copy_implementations)]
#[derive(Debug)]
pub struct MpiRequest(MPI_Request);

/// An intermediate datatype, freed when dropped
struct Scratch(MPI_Datatype);

impl Drop for Scratch {
    fn drop(&mut self) {
        unsafe {
            ffi::MPI_Type_free(&mut self.0);
        }
    }
}

impl Communicator for MpiCommunicator {
    type Graph = MpiGraph;

    fn rank(&self) -> Rank {
        let mut rank: Rank = 0;
        unsafe {
            ffi::MPI_Comm_rank(self.0, &mut rank);
        }
        rank
    }

    fn size(&self) -> Rank {
        let mut size: Rank = 0;
        unsafe {
            ffi::MPI_Comm_size(self.0, &mut size);
        }
        size
    }

    fn is_inter(&self) -> Result<bool> {
        let mut flag: c_int = 0;
        check("MPI_Comm_test_inter", unsafe {
            ffi::MPI_Comm_test_inter(self.0, &mut flag)
        })?;
        Ok(flag != 0)
    }

    fn complete_graph(&self) -> Result<MpiGraph> {
        let size = self.size();
        let ranks: SmallVec<[c_int; 8]> = (0..size).collect();
        let mut graph = MaybeUninit::<MPI_Comm>::uninit();
        check("MPI_Dist_graph_create_adjacent", unsafe {
            ffi::MPI_Dist_graph_create_adjacent(
                self.0,
                size,
                ranks.as_ptr(),
                ffi::RSMPI_UNWEIGHTED(),
                size,
                ranks.as_ptr(),
                ffi::RSMPI_UNWEIGHTED(),
                ffi::RSMPI_INFO_NULL,
                0,
                graph.as_mut_ptr(),
            )
        })?;
        Ok(MpiGraph(unsafe { graph.assume_init() }))
    }

    fn free_graph(&self, graph: &mut MpiGraph) -> Result<()> {
        check("MPI_Comm_free", unsafe { ffi::MPI_Comm_free(&mut graph.0) })
    }

    fn abort(&self, violation: &Violation) -> ! {
        eprintln!("{}", violation);
        unsafe {
            ffi::MPI_Abort(self.0, ABORT_CODE);
        }
        process::abort();
    }
}

impl Datatypes for MpiCommunicator {
    type Datatype = MpiDatatype;

    fn extent(&self, datatype: &MpiDatatype) -> Result<Address> {
        let mut lb: ffi::MPI_Aint = 0;
        let mut extent: ffi::MPI_Aint = 0;
        check("MPI_Type_get_extent", unsafe {
            ffi::MPI_Type_get_extent(datatype.0, &mut lb, &mut extent)
        })?;
        Ok(extent as Address)
    }

    /// `count / INT_MAX` chunks of `INT_MAX` elements as a vector, the remainder as a contiguous
    /// type placed behind them, combined into one struct type.
    fn contiguous(&self, count: Count, base: &MpiDatatype) -> Result<MpiDatatype> {
        if count < 0 {
            return Err(Error::NegativeCount(count));
        }
        let chunk = Count::from(NativeCount::MAX);
        let extent = self.extent(base)?;
        let overflow = || Error::Overflow { count, extent };
        let chunks: NativeCount = (count / chunk).value_as().map_err(|_| overflow())?;
        let remainder: NativeCount = (count % chunk).value_as().map_err(|_| overflow())?;
        let offset = (count - count % chunk)
            .value_as::<Address>()
            .map_err(|_| overflow())?
            .checked_mul(extent)
            .ok_or_else(overflow)?;

        let mut raw = MaybeUninit::<MPI_Datatype>::uninit();
        check("MPI_Type_vector", unsafe {
            ffi::MPI_Type_vector(
                chunks,
                NativeCount::MAX,
                NativeCount::MAX,
                base.0,
                raw.as_mut_ptr(),
            )
        })?;
        let chunked = Scratch(unsafe { raw.assume_init() });

        let mut raw = MaybeUninit::<MPI_Datatype>::uninit();
        check("MPI_Type_contiguous", unsafe {
            ffi::MPI_Type_contiguous(remainder, base.0, raw.as_mut_ptr())
        })?;
        let tail = Scratch(unsafe { raw.assume_init() });

        let blocklengths: [c_int; 2] = [1, 1];
        let displacements: [ffi::MPI_Aint; 2] = [0, offset as ffi::MPI_Aint];
        let types: [MPI_Datatype; 2] = [chunked.0, tail.0];
        let mut raw = MaybeUninit::<MPI_Datatype>::uninit();
        check("MPI_Type_create_struct", unsafe {
            ffi::MPI_Type_create_struct(
                2,
                blocklengths.as_ptr(),
                displacements.as_ptr(),
                types.as_ptr(),
                raw.as_mut_ptr(),
            )
        })?;
        let mut combined = Scratch(unsafe { raw.assume_init() });
        check("MPI_Type_commit", unsafe {
            ffi::MPI_Type_commit(&mut combined.0)
        })?;

        let datatype = MpiDatatype(combined.0);
        mem::forget(combined);
        Ok(datatype)
    }

    fn free_datatype(&self, datatype: &mut MpiDatatype) -> Result<()> {
        check("MPI_Type_free", unsafe { ffi::MPI_Type_free(&mut datatype.0) })
    }
}

impl NeighborCollectives for MpiCommunicator {
    unsafe fn neighbor_all_to_all_w(
        &self,
        graph: &MpiGraph,
        sendbuf: &[u8],
        send: NeighborBlocks<'_, MpiDatatype>,
        recvbuf: &mut [u8],
        recv: NeighborBlocks<'_, MpiDatatype>,
    ) -> Result<()> {
        let sdispls: SmallVec<[ffi::MPI_Aint; 8]> =
            send.displs.iter().map(|&d| d as ffi::MPI_Aint).collect();
        let rdispls: SmallVec<[ffi::MPI_Aint; 8]> =
            recv.displs.iter().map(|&d| d as ffi::MPI_Aint).collect();
        let sendtypes: SmallVec<[MPI_Datatype; 8]> = send.datatypes.iter().map(|t| t.0).collect();
        let recvtypes: SmallVec<[MPI_Datatype; 8]> = recv.datatypes.iter().map(|t| t.0).collect();
        check(
            "MPI_Neighbor_alltoallw",
            ffi::MPI_Neighbor_alltoallw(
                sendbuf.as_ptr() as *const c_void,
                send.counts.as_ptr(),
                sdispls.as_ptr(),
                sendtypes.as_ptr(),
                recvbuf.as_mut_ptr() as *mut c_void,
                recv.counts.as_ptr(),
                rdispls.as_ptr(),
                recvtypes.as_ptr(),
                graph.0,
            ),
        )
    }
}

impl ImmediatePointToPoint for MpiCommunicator {
    type Request = MpiRequest;

    unsafe fn immediate_send(
        &self,
        buf: *const u8,
        count: NativeCount,
        datatype: &MpiDatatype,
        destination: Rank,
        tag: Tag,
    ) -> Result<MpiRequest> {
        let mut request = MaybeUninit::<MPI_Request>::uninit();
        check(
            "MPI_Isend",
            ffi::MPI_Isend(
                buf as *const c_void,
                count,
                datatype.0,
                destination,
                tag,
                self.0,
                request.as_mut_ptr(),
            ),
        )?;
        Ok(MpiRequest(request.assume_init()))
    }

    unsafe fn immediate_receive(
        &self,
        buf: *mut u8,
        count: NativeCount,
        datatype: &MpiDatatype,
        source: Rank,
        tag: Tag,
    ) -> Result<MpiRequest> {
        let mut request = MaybeUninit::<MPI_Request>::uninit();
        check(
            "MPI_Irecv",
            ffi::MPI_Irecv(
                buf as *mut c_void,
                count,
                datatype.0,
                source,
                tag,
                self.0,
                request.as_mut_ptr(),
            ),
        )?;
        Ok(MpiRequest(request.assume_init()))
    }

    fn wait_all(&self, requests: Vec<MpiRequest>) -> Result<()> {
        let mut raw: Vec<MPI_Request> = requests.into_iter().map(|request| request.0).collect();
        let count: c_int = raw.len().value_as().map_err(|_| Error::CountLimit {
            count: raw.len().value_as().unwrap_or(Count::MAX),
            limit: NATIVE_COUNT_LIMIT,
        })?;
        check("MPI_Waitall", unsafe {
            ffi::MPI_Waitall(count, raw.as_mut_ptr(), ffi::RSMPI_STATUSES_IGNORE)
        })
    }
}
