//! Large-count collective communication
//!
//! Variable gather, scatter, all-gather, all-to-all and generalized all-to-all whose per-peer
//! counts may exceed the native count limit and whose displacements are wide byte offsets.
//!
//! Every operation is first described as an exchange plan (one send and one receive block per
//! peer), then realized either as a single `MPI_Neighbor_alltoallw()` over a complete graph or
//! as a schedule of non-blocking sends and receives, see `Strategy`.
//!
//! # Unsupported
//!
//! - Inter-communicators
//! - `MPI_IN_PLACE`
//!
//! Both are fatal and abort the process group before any data moves.

use std::fmt;

use crate::datatype::Datatypes;
use crate::environment::{self, Config, Strategy};
use crate::error::{Precondition, Result, Violation};
use crate::point_to_point::ImmediatePointToPoint;
use crate::{Address, Count, NativeCount, Rank};

mod descriptor;
mod neighbor;
mod p2p;
pub mod plan;

use self::plan::Plan;

/// Collective traits
pub mod traits {
    pub use super::{LargeCountCollectives, NeighborCollectives, Transport};
}

/// Per-neighbor arrays of one direction of a generalized neighbor all-to-all
#[derive(Debug)]
pub struct NeighborBlocks<'a, D> {
    /// Native element counts
    pub counts: &'a [NativeCount],
    /// Byte displacements into the buffer
    pub displs: &'a [Address],
    /// Element types
    pub datatypes: &'a [D],
}

impl<'a, D> Clone for NeighborBlocks<'a, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, D> Copy for NeighborBlocks<'a, D> {}

/// Neighborhood collectives on graph communicators
pub trait NeighborCollectives: Datatypes {
    /// Generalized neighbor all-to-all on a graph created by `complete_graph()`
    ///
    /// Neighbor `i` is sent `send.counts[i]` elements of `send.datatypes[i]` starting at byte
    /// `send.displs[i]` of `sendbuf` and received from into `recvbuf` likewise.
    ///
    /// # Safety
    ///
    /// Every block must lie within its buffer.
    ///
    /// # Standard section(s)
    ///
    /// 7.6.2
    unsafe fn neighbor_all_to_all_w(
        &self,
        graph: &Self::Graph,
        sendbuf: &[u8],
        send: NeighborBlocks<'_, Self::Datatype>,
        recvbuf: &mut [u8],
        recv: NeighborBlocks<'_, Self::Datatype>,
    ) -> Result<()>;
}

/// Everything both realizations need from a communicator
pub trait Transport: NeighborCollectives + ImmediatePointToPoint {}

impl<C: NeighborCollectives + ImmediatePointToPoint + ?Sized> Transport for C {}

/// The send buffer argument of a collective
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SendBuffer<'a> {
    /// Bytes to send from
    Slice(&'a [u8]),
    /// Send from the receive buffer, `MPI_IN_PLACE`
    InPlace,
}

impl<'a> From<&'a [u8]> for SendBuffer<'a> {
    fn from(buf: &'a [u8]) -> Self {
        SendBuffer::Slice(buf)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for SendBuffer<'a> {
    fn from(buf: &'a [u8; N]) -> Self {
        SendBuffer::Slice(buf)
    }
}

impl<'a> From<&'a Vec<u8>> for SendBuffer<'a> {
    fn from(buf: &'a Vec<u8>) -> Self {
        SendBuffer::Slice(buf)
    }
}

/// The large-count operations
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `gatherv_x`
    Gather,
    /// `scatterv_x`
    Scatter,
    /// `allgatherv_x`
    AllGather,
    /// `alltoallv_x`
    AllToAllV,
    /// `alltoallw_x`
    AllToAllW,
}

impl Operation {
    /// The name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Operation::Gather => "gatherv_x",
            Operation::Scatter => "scatterv_x",
            Operation::AllGather => "allgatherv_x",
            Operation::AllToAllV => "alltoallv_x",
            Operation::AllToAllW => "alltoallw_x",
        }
    }

    fn is_all_to_all(self) -> bool {
        matches!(self, Operation::AllToAllV | Operation::AllToAllW)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Translates large-count collectives on a communicator into native operations
pub struct Translator<'c, C: ?Sized> {
    comm: &'c C,
    config: Config,
}

impl<'c, C: Transport + ?Sized> Translator<'c, C> {
    /// A translator using the process-wide configuration
    pub fn new(comm: &'c C) -> Self {
        Translator::with_config(comm, environment::config())
    }

    /// A translator using `config`
    pub fn with_config(comm: &'c C, config: Config) -> Self {
        Translator { comm, config }
    }

    /// The configuration in effect
    pub fn config(&self) -> Config {
        self.config
    }

    /// Gather `sendcount` elements of `sendtype` from every process at `root`.
    ///
    /// The contribution of rank `i` is stored at byte `displs[i]` of `recvbuf` as
    /// `recvcounts[i]` elements of `recvtype`. `recvbuf`, `recvcounts` and `displs` are only
    /// significant at `root`.
    ///
    /// # Examples
    /// See `demos/gather_x.rs`
    ///
    /// # Standard section(s)
    ///
    /// 5.5
    #[allow(clippy::too_many_arguments)]
    pub fn gather_varcount_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcount: Count,
        sendtype: &C::Datatype,
        recvbuf: &mut [u8],
        recvcounts: &[Count],
        displs: &[Address],
        recvtype: &C::Datatype,
        root: Rank,
    ) -> Result<()> {
        let op = Operation::Gather;
        let sendbuf = self.admit(op, sendbuf.into())?;
        let plan = Plan::gather(
            self.comm.rank(),
            self.comm.size(),
            sendcount,
            sendtype,
            recvcounts,
            displs,
            recvtype,
            root,
        )?;
        self.execute(op, &plan, sendbuf, recvbuf)
    }

    /// Scatter blocks of `sendbuf` from `root` to every process.
    ///
    /// Rank `i` is sent `sendcounts[i]` elements of `sendtype` starting at byte `displs[i]` and
    /// receives `recvcount` elements of `recvtype`. `sendbuf`, `sendcounts` and `displs` are only
    /// significant at `root`.
    ///
    /// # Standard section(s)
    ///
    /// 5.6
    #[allow(clippy::too_many_arguments)]
    pub fn scatter_varcount_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcounts: &[Count],
        displs: &[Address],
        sendtype: &C::Datatype,
        recvbuf: &mut [u8],
        recvcount: Count,
        recvtype: &C::Datatype,
        root: Rank,
    ) -> Result<()> {
        let op = Operation::Scatter;
        let sendbuf = self.admit(op, sendbuf.into())?;
        let plan = Plan::scatter(
            self.comm.rank(),
            self.comm.size(),
            sendcounts,
            displs,
            sendtype,
            recvcount,
            recvtype,
            root,
        )?;
        self.execute(op, &plan, sendbuf, recvbuf)
    }

    /// Gather `sendcount` elements of `sendtype` from every process at every process.
    ///
    /// The contribution of rank `i` is stored at byte `displs[i]` of `recvbuf` as
    /// `recvcounts[i]` elements of `recvtype`.
    ///
    /// # Examples
    /// See `demos/mpi_all_gather_x.rs`
    ///
    /// # Standard section(s)
    ///
    /// 5.7
    #[allow(clippy::too_many_arguments)]
    pub fn all_gather_varcount_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcount: Count,
        sendtype: &C::Datatype,
        recvbuf: &mut [u8],
        recvcounts: &[Count],
        displs: &[Address],
        recvtype: &C::Datatype,
    ) -> Result<()> {
        let op = Operation::AllGather;
        let sendbuf = self.admit(op, sendbuf.into())?;
        let plan = Plan::all_gather(
            self.comm.size(),
            sendcount,
            sendtype,
            recvcounts,
            displs,
            recvtype,
        )?;
        self.execute(op, &plan, sendbuf, recvbuf)
    }

    /// Exchange blocks of a single type between all pairs of processes.
    ///
    /// Rank `j` is sent `sendcounts[j]` elements of `sendtype` starting at byte `sdispls[j]`;
    /// the block from rank `i` is stored at byte `rdispls[i]` as `recvcounts[i]` elements of
    /// `recvtype`.
    ///
    /// # Standard section(s)
    ///
    /// 5.8
    #[allow(clippy::too_many_arguments)]
    pub fn all_to_all_varcount_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcounts: &[Count],
        sdispls: &[Address],
        sendtype: &C::Datatype,
        recvbuf: &mut [u8],
        recvcounts: &[Count],
        rdispls: &[Address],
        recvtype: &C::Datatype,
    ) -> Result<()> {
        let op = Operation::AllToAllV;
        let sendbuf = self.admit(op, sendbuf.into())?;
        let plan = Plan::all_to_all_v(
            self.comm.size(),
            sendcounts,
            sdispls,
            sendtype,
            recvcounts,
            rdispls,
            recvtype,
        )?;
        self.execute(op, &plan, sendbuf, recvbuf)
    }

    /// Exchange blocks between all pairs of processes with a type per peer and direction.
    ///
    /// # Examples
    /// See `demos/all_to_all_w_x.rs`
    ///
    /// # Standard section(s)
    ///
    /// 5.8
    #[allow(clippy::too_many_arguments)]
    pub fn all_to_all_w_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcounts: &[Count],
        sdispls: &[Address],
        sendtypes: &[C::Datatype],
        recvbuf: &mut [u8],
        recvcounts: &[Count],
        rdispls: &[Address],
        recvtypes: &[C::Datatype],
    ) -> Result<()> {
        let op = Operation::AllToAllW;
        let sendbuf = self.admit(op, sendbuf.into())?;
        let plan = Plan::all_to_all_w(
            self.comm.size(),
            sendcounts,
            sdispls,
            sendtypes,
            recvcounts,
            rdispls,
            recvtypes,
        )?;
        self.execute(op, &plan, sendbuf, recvbuf)
    }

    /// Aborts on unsupported calls, otherwise yields the send bytes.
    fn admit<'b>(&self, op: Operation, sendbuf: SendBuffer<'b>) -> Result<&'b [u8]> {
        if self.comm.is_inter()? {
            self.reject(op, Precondition::Intercommunicator);
        }
        match sendbuf {
            SendBuffer::Slice(buf) => Ok(buf),
            SendBuffer::InPlace => self.reject(op, Precondition::InPlace),
        }
    }

    fn reject(&self, op: Operation, precondition: Precondition) -> ! {
        let violation = Violation {
            operation: op.name(),
            precondition,
        };
        tracing::error!(rank = self.comm.rank(), %violation, "aborting");
        self.comm.abort(&violation)
    }

    fn execute(
        &self,
        op: Operation,
        plan: &Plan<C::Datatype>,
        sendbuf: &[u8],
        recvbuf: &mut [u8],
    ) -> Result<()> {
        plan.check_bounds(self.comm, sendbuf.len(), recvbuf.len())?;

        let span = tracing::debug_span!(
            "large_count_collective",
            operation = op.name(),
            strategy = %self.config.strategy,
            rank = self.comm.rank(),
        );
        let _entered = span.enter();

        let share = self.config.share_identical_types && op.is_all_to_all();
        match self.config.strategy {
            Strategy::NeighborExchange => {
                neighbor::exchange(self.comm, plan, sendbuf, recvbuf, share)
            }
            Strategy::PointToPoint => p2p::exchange(self.comm, plan, sendbuf, recvbuf, share),
        }
    }
}

/// Large-count collectives on any transport, using the process-wide configuration
///
/// Each method is a shorthand for the method of the same name on `Translator::new(self)`.
pub trait LargeCountCollectives: Transport {
    /// See `Translator::gather_varcount_x()`
    #[allow(clippy::too_many_arguments)]
    fn gather_varcount_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcount: Count,
        sendtype: &Self::Datatype,
        recvbuf: &mut [u8],
        recvcounts: &[Count],
        displs: &[Address],
        recvtype: &Self::Datatype,
        root: Rank,
    ) -> Result<()> {
        Translator::new(self).gather_varcount_x(
            sendbuf, sendcount, sendtype, recvbuf, recvcounts, displs, recvtype, root,
        )
    }

    /// See `Translator::scatter_varcount_x()`
    #[allow(clippy::too_many_arguments)]
    fn scatter_varcount_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcounts: &[Count],
        displs: &[Address],
        sendtype: &Self::Datatype,
        recvbuf: &mut [u8],
        recvcount: Count,
        recvtype: &Self::Datatype,
        root: Rank,
    ) -> Result<()> {
        Translator::new(self).scatter_varcount_x(
            sendbuf, sendcounts, displs, sendtype, recvbuf, recvcount, recvtype, root,
        )
    }

    /// See `Translator::all_gather_varcount_x()`
    #[allow(clippy::too_many_arguments)]
    fn all_gather_varcount_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcount: Count,
        sendtype: &Self::Datatype,
        recvbuf: &mut [u8],
        recvcounts: &[Count],
        displs: &[Address],
        recvtype: &Self::Datatype,
    ) -> Result<()> {
        Translator::new(self).all_gather_varcount_x(
            sendbuf, sendcount, sendtype, recvbuf, recvcounts, displs, recvtype,
        )
    }

    /// See `Translator::all_to_all_varcount_x()`
    #[allow(clippy::too_many_arguments)]
    fn all_to_all_varcount_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcounts: &[Count],
        sdispls: &[Address],
        sendtype: &Self::Datatype,
        recvbuf: &mut [u8],
        recvcounts: &[Count],
        rdispls: &[Address],
        recvtype: &Self::Datatype,
    ) -> Result<()> {
        Translator::new(self).all_to_all_varcount_x(
            sendbuf, sendcounts, sdispls, sendtype, recvbuf, recvcounts, rdispls, recvtype,
        )
    }

    /// See `Translator::all_to_all_w_x()`
    #[allow(clippy::too_many_arguments)]
    fn all_to_all_w_x<'b>(
        &self,
        sendbuf: impl Into<SendBuffer<'b>>,
        sendcounts: &[Count],
        sdispls: &[Address],
        sendtypes: &[Self::Datatype],
        recvbuf: &mut [u8],
        recvcounts: &[Count],
        rdispls: &[Address],
        recvtypes: &[Self::Datatype],
    ) -> Result<()> {
        Translator::new(self).all_to_all_w_x(
            sendbuf, sendcounts, sdispls, sendtypes, recvbuf, recvcounts, rdispls, recvtypes,
        )
    }
}

impl<C: Transport + ?Sized> LargeCountCollectives for C {}
