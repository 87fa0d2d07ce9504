//! Process groups and their topologies
//!
//! The large-count collectives need very little from a communicator: its size, the rank of the
//! calling process, whether it is an inter-communicator, and a way to derive a distributed graph
//! communicator in which every process is a neighbor of every process. The `Communicator` trait
//! captures exactly that, plus the fatal abort used for unsupported calls.
//!
//! # Standard section(s)
//!
//! 6.4, 7.5.4, 8.7

use std::fmt;

use crate::error::{Result, Violation};
use crate::{Count, Rank, NATIVE_COUNT_LIMIT};

/// Topology traits
pub mod traits {
    pub use super::Communicator;
}

/// A process group that large-count collectives can be issued on
pub trait Communicator {
    /// A graph communicator derived from this one
    type Graph: fmt::Debug;

    /// The rank of the calling process
    fn rank(&self) -> Rank;

    /// Number of processes in the group
    fn size(&self) -> Rank;

    /// Whether this is an inter-communicator
    ///
    /// # Standard section(s)
    ///
    /// 6.6.1
    fn is_inter(&self) -> Result<bool>;

    /// The largest count the narrow interface of this communicator accepts
    fn count_limit(&self) -> Count {
        NATIVE_COUNT_LIMIT
    }

    /// Collectively create a distributed graph communicator over the same group in which every
    /// rank, including itself, is a source and a destination of every rank, in rank order.
    ///
    /// # Standard section(s)
    ///
    /// 7.5.4
    fn complete_graph(&self) -> Result<Self::Graph>;

    /// Release a graph communicator created by `complete_graph()`.
    fn free_graph(&self, graph: &mut Self::Graph) -> Result<()>;

    /// Abort the whole process group because `violation` makes the current call impossible.
    ///
    /// # Standard section(s)
    ///
    /// 8.7
    fn abort(&self, violation: &Violation) -> !;
}

/// Owns a complete graph for the duration of one call.
pub(crate) struct CompleteGraph<'c, C: Communicator + ?Sized> {
    comm: &'c C,
    graph: C::Graph,
    freed: bool,
}

impl<'c, C: Communicator + ?Sized> CompleteGraph<'c, C> {
    pub(crate) fn new(comm: &'c C) -> Result<Self> {
        let graph = comm.complete_graph()?;
        tracing::trace!(?graph, "created complete graph communicator");
        Ok(CompleteGraph {
            comm,
            graph,
            freed: false,
        })
    }

    pub(crate) fn graph(&self) -> &C::Graph {
        &self.graph
    }

    pub(crate) fn free(mut self) -> Result<()> {
        self.freed = true;
        self.comm.free_graph(&mut self.graph)
    }
}

impl<'c, C: Communicator + ?Sized> Drop for CompleteGraph<'c, C> {
    fn drop(&mut self) {
        if self.freed {
            return;
        }
        if let Err(err) = self.comm.free_graph(&mut self.graph) {
            tracing::warn!(%err, "failed to release graph communicator");
        }
    }
}
