//! An in-process transport
//!
//! A `LocalUniverse` runs a closure once per rank, each on its own thread, and lets the ranks
//! communicate through a shared mailbox. Sends are eager and never block, receives block until a
//! matching message arrives.
//!
//! The native count limit of a local universe can be lowered, which makes the synthetic type
//! paths of the large-count collectives observable with buffers of a few bytes. Every native
//! count above the limit is rejected with `Error::CountLimit`.
//!
//! # Examples
//! See `demos/gather_x.rs`

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::mem::size_of;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::thread;

use conv::ConvUtil;
use thiserror::Error;

use crate::collective::{NeighborBlocks, NeighborCollectives};
use crate::datatype::Datatypes;
use crate::error::{Error, Result, Violation};
use crate::point_to_point::ImmediatePointToPoint;
use crate::topology::Communicator;
use crate::{Address, Count, NativeCount, Rank, Tag, NATIVE_COUNT_LIMIT};

mod mailbox;

use self::mailbox::{Envelope, Mailbox};

const WORLD_CONTEXT: u64 = 0;
const NEIGHBOR_TAG: Tag = 0;

/// A fatal abort of a local universe
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("rank {rank} aborted: {message}")]
pub struct Aborted {
    /// The first rank that aborted
    pub rank: Rank,
    /// Its diagnostic
    pub message: String,
    /// Messages deposited in the mailbox before the abort
    pub messages_sent: u64,
}

/// A group of threads acting as processes
#[derive(Copy, Clone, Debug)]
pub struct LocalUniverse {
    size: Rank,
    count_limit: Count,
    inter: bool,
}

impl LocalUniverse {
    /// A universe of `size` ranks with the native count limit of the C interface
    ///
    /// # Panics
    ///
    /// If `size` is not positive.
    pub fn new(size: Rank) -> Self {
        assert!(size > 0, "a universe needs at least one rank, got {}", size);
        LocalUniverse {
            size,
            count_limit: NATIVE_COUNT_LIMIT,
            inter: false,
        }
    }

    /// Lowers the native count limit to `limit`, at least 1.
    pub fn with_count_limit(self, limit: Count) -> Self {
        LocalUniverse {
            count_limit: limit.clamp(1, NATIVE_COUNT_LIMIT),
            ..self
        }
    }

    /// Communicators of this universe report being inter-communicators.
    pub fn intercommunicator(self) -> Self {
        LocalUniverse {
            inter: true,
            ..self
        }
    }

    /// Runs `body` on every rank and collects the results in rank order.
    ///
    /// If any rank aborts, the universe is poisoned, blocked ranks return `Error::Aborted` and
    /// the first abort is returned. A receive from a rank whose `body` already returned fails
    /// with `Error::Aborted` as well. A panic of a rank is resumed after all ranks finished.
    pub fn run<F, R>(&self, body: F) -> std::result::Result<Vec<R>, Aborted>
    where
        F: Fn(LocalCommunicator<'_>) -> R + Sync,
        R: Send,
    {
        let mailbox = Mailbox::default();
        let outcomes: Vec<thread::Result<R>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.size)
                .map(|rank| {
                    let comm = LocalCommunicator::new(self, rank, &mailbox);
                    let body = &body;
                    let mailbox = &mailbox;
                    scope.spawn(move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(comm)));
                        if outcome.is_err() {
                            mailbox.poison();
                        }
                        mailbox.finish(rank);
                        outcome
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().and_then(|outcome| outcome))
                .collect()
        });

        if let Some(aborted) = mailbox.aborted() {
            return Err(aborted);
        }
        Ok(outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(|payload| panic::resume_unwind(payload)))
            .collect())
    }
}

/// A datatype of a local universe
///
/// All predefined types are contiguous byte sequences of a fixed extent and compare equal when
/// their extents do.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalDatatype {
    id: u64,
    extent: Address,
}

impl LocalDatatype {
    /// A single byte
    pub const BYTE: LocalDatatype = LocalDatatype { id: 0, extent: 1 };

    /// A predefined type of `extent` bytes
    pub const fn bytes(extent: Address) -> Self {
        LocalDatatype { id: 0, extent }
    }

    /// The predefined type matching `T`
    pub fn of<T>() -> Self {
        LocalDatatype::bytes(size_of::<T>() as Address)
    }

    /// Whether this type was predefined rather than constructed
    pub fn is_predefined(&self) -> bool {
        self.id == 0
    }

    /// Size of one element in bytes
    pub fn extent(&self) -> Address {
        self.extent
    }
}

/// A complete graph communicator of a local universe
#[derive(Debug)]
pub struct LocalGraph {
    context: u64,
    neighbors: Vec<Rank>,
    freed: bool,
}

/// An outstanding non-blocking operation
#[allow(missing_copy_implementations)]
#[derive(Debug)]
pub struct LocalRequest(Pending);

#[derive(Debug)]
enum Pending {
    /// Sends complete eagerly.
    Nothing,
    Receive {
        envelope: Envelope,
        buf: *mut u8,
        capacity: usize,
    },
}

/// One rank of a `LocalUniverse`
pub struct LocalCommunicator<'u> {
    rank: Rank,
    size: Rank,
    count_limit: Count,
    inter: bool,
    mailbox: &'u Mailbox,
    next_context: Cell<u64>,
    next_datatype: Cell<u64>,
    live_datatypes: RefCell<HashSet<u64>>,
    datatypes_created: Cell<usize>,
    graphs_live: Cell<usize>,
}

impl<'u> LocalCommunicator<'u> {
    fn new(universe: &LocalUniverse, rank: Rank, mailbox: &'u Mailbox) -> Self {
        LocalCommunicator {
            rank,
            size: universe.size,
            count_limit: universe.count_limit,
            inter: universe.inter,
            mailbox,
            next_context: Cell::new(WORLD_CONTEXT),
            next_datatype: Cell::new(0),
            live_datatypes: RefCell::new(HashSet::new()),
            datatypes_created: Cell::new(0),
            graphs_live: Cell::new(0),
        }
    }

    /// Number of datatypes this rank constructed so far
    pub fn datatypes_created(&self) -> usize {
        self.datatypes_created.get()
    }

    /// Number of constructed datatypes not yet released
    pub fn datatypes_live(&self) -> usize {
        self.live_datatypes.borrow().len()
    }

    /// Number of graph communicators not yet released
    pub fn graphs_live(&self) -> usize {
        self.graphs_live.get()
    }

    /// Messages sent by all ranks of the universe so far
    pub fn messages_sent(&self) -> u64 {
        self.mailbox.messages_sent()
    }

    fn check_datatype(&self, datatype: &LocalDatatype) -> Result<()> {
        if datatype.is_predefined() || self.live_datatypes.borrow().contains(&datatype.id) {
            Ok(())
        } else {
            Err(Error::InvalidDatatype)
        }
    }

    fn check_rank(&self, rank: Rank) -> Result<()> {
        if rank < 0 || rank >= self.size {
            return Err(Error::Rank {
                rank,
                size: self.size,
            });
        }
        Ok(())
    }

    /// Size in bytes of a block with a native count
    fn native_bytes(&self, count: NativeCount, datatype: &LocalDatatype) -> Result<usize> {
        self.check_datatype(datatype)?;
        let count = Count::from(count);
        if count < 0 {
            return Err(Error::NegativeCount(count));
        }
        if count > self.count_limit {
            return Err(Error::CountLimit {
                count,
                limit: self.count_limit,
            });
        }
        byte_len(count, datatype.extent)
    }
}

fn byte_len(count: Count, extent: Address) -> Result<usize> {
    let overflow = || Error::Overflow { count, extent };
    let elements: usize = count.value_as().map_err(|_| overflow())?;
    let size: usize = extent.value_as().map_err(|_| overflow())?;
    elements.checked_mul(size).ok_or_else(overflow)
}

/// The byte range of a block within a buffer of `capacity` bytes
///
/// Empty blocks are never dereferenced, their displacement is ignored.
fn block_range(
    displacement: Address,
    bytes: usize,
    capacity: usize,
) -> Result<std::ops::Range<usize>> {
    if bytes == 0 {
        return Ok(0..0);
    }
    let overrun = || Error::Buffer {
        displacement,
        bytes: bytes as u128,
        capacity,
    };
    let start: usize = displacement.value_as().map_err(|_| overrun())?;
    let end = start.checked_add(bytes).ok_or_else(overrun)?;
    if end > capacity {
        return Err(overrun());
    }
    Ok(start..end)
}

impl<'u> Communicator for LocalCommunicator<'u> {
    type Graph = LocalGraph;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> Rank {
        self.size
    }

    fn is_inter(&self) -> Result<bool> {
        Ok(self.inter)
    }

    fn count_limit(&self) -> Count {
        self.count_limit
    }

    fn complete_graph(&self) -> Result<LocalGraph> {
        let context = self.next_context.get() + 1;
        self.next_context.set(context);
        self.graphs_live.set(self.graphs_live.get() + 1);
        Ok(LocalGraph {
            context,
            neighbors: (0..self.size).collect(),
            freed: false,
        })
    }

    fn free_graph(&self, graph: &mut LocalGraph) -> Result<()> {
        if graph.freed {
            return Err(Error::InvalidGraph);
        }
        graph.freed = true;
        self.graphs_live.set(self.graphs_live.get() - 1);
        Ok(())
    }

    fn abort(&self, violation: &Violation) -> ! {
        self.mailbox.abort(self.rank, violation.to_string());
        panic!("rank {} aborted: {}", self.rank, violation);
    }
}

impl<'u> Datatypes for LocalCommunicator<'u> {
    type Datatype = LocalDatatype;

    fn extent(&self, datatype: &LocalDatatype) -> Result<Address> {
        self.check_datatype(datatype)?;
        Ok(datatype.extent)
    }

    fn contiguous(&self, count: Count, base: &LocalDatatype) -> Result<LocalDatatype> {
        self.check_datatype(base)?;
        if count < 0 {
            return Err(Error::NegativeCount(count));
        }
        let overflow = || Error::Overflow {
            count,
            extent: base.extent,
        };
        let extent = count
            .value_as::<Address>()
            .map_err(|_| overflow())?
            .checked_mul(base.extent)
            .ok_or_else(overflow)?;

        let id = self.next_datatype.get() + 1;
        self.next_datatype.set(id);
        self.live_datatypes.borrow_mut().insert(id);
        self.datatypes_created.set(self.datatypes_created.get() + 1);
        Ok(LocalDatatype { id, extent })
    }

    fn free_datatype(&self, datatype: &mut LocalDatatype) -> Result<()> {
        if datatype.is_predefined() || !self.live_datatypes.borrow_mut().remove(&datatype.id) {
            return Err(Error::InvalidDatatype);
        }
        Ok(())
    }
}

impl<'u> NeighborCollectives for LocalCommunicator<'u> {
    unsafe fn neighbor_all_to_all_w(
        &self,
        graph: &LocalGraph,
        sendbuf: &[u8],
        send: NeighborBlocks<'_, LocalDatatype>,
        recvbuf: &mut [u8],
        recv: NeighborBlocks<'_, LocalDatatype>,
    ) -> Result<()> {
        if graph.freed {
            return Err(Error::InvalidGraph);
        }
        let degree = graph.neighbors.len();
        for (argument, actual) in [
            ("send.counts", send.counts.len()),
            ("send.displs", send.displs.len()),
            ("send.datatypes", send.datatypes.len()),
            ("recv.counts", recv.counts.len()),
            ("recv.displs", recv.displs.len()),
            ("recv.datatypes", recv.datatypes.len()),
        ] {
            if actual != degree {
                return Err(Error::GroupSize {
                    argument,
                    expected: degree,
                    actual,
                });
            }
        }

        // Validate everything before the first message leaves.
        let mut outgoing = Vec::with_capacity(degree);
        let mut incoming = Vec::with_capacity(degree);
        for i in 0..degree {
            let bytes = self.native_bytes(send.counts[i], &send.datatypes[i])?;
            outgoing.push(block_range(send.displs[i], bytes, sendbuf.len())?);
            let bytes = self.native_bytes(recv.counts[i], &recv.datatypes[i])?;
            incoming.push(block_range(recv.displs[i], bytes, recvbuf.len())?);
        }

        for (&neighbor, range) in graph.neighbors.iter().zip(outgoing) {
            let envelope = Envelope {
                context: graph.context,
                source: self.rank,
                destination: neighbor,
                tag: NEIGHBOR_TAG,
            };
            self.mailbox.post(envelope, sendbuf[range].to_vec())?;
        }

        let mut result = Ok(());
        for (&neighbor, range) in graph.neighbors.iter().zip(incoming) {
            let envelope = Envelope {
                context: graph.context,
                source: neighbor,
                destination: self.rank,
                tag: NEIGHBOR_TAG,
            };
            let received = self.mailbox.take(&envelope).and_then(|payload| {
                if payload.len() > range.len() {
                    return Err(Error::Truncate {
                        received: payload.len(),
                        capacity: range.len(),
                    });
                }
                recvbuf[range.start..range.start + payload.len()].copy_from_slice(&payload);
                Ok(())
            });
            if result.is_ok() {
                result = received;
            }
        }
        result
    }
}

impl<'u> ImmediatePointToPoint for LocalCommunicator<'u> {
    type Request = LocalRequest;

    unsafe fn immediate_send(
        &self,
        buf: *const u8,
        count: NativeCount,
        datatype: &LocalDatatype,
        destination: Rank,
        tag: Tag,
    ) -> Result<LocalRequest> {
        let bytes = self.native_bytes(count, datatype)?;
        self.check_rank(destination)?;
        let payload = if bytes == 0 {
            Vec::new()
        } else {
            slice::from_raw_parts(buf, bytes).to_vec()
        };
        let envelope = Envelope {
            context: WORLD_CONTEXT,
            source: self.rank,
            destination,
            tag,
        };
        self.mailbox.post(envelope, payload)?;
        Ok(LocalRequest(Pending::Nothing))
    }

    unsafe fn immediate_receive(
        &self,
        buf: *mut u8,
        count: NativeCount,
        datatype: &LocalDatatype,
        source: Rank,
        tag: Tag,
    ) -> Result<LocalRequest> {
        let capacity = self.native_bytes(count, datatype)?;
        self.check_rank(source)?;
        Ok(LocalRequest(Pending::Receive {
            envelope: Envelope {
                context: WORLD_CONTEXT,
                source,
                destination: self.rank,
                tag,
            },
            buf,
            capacity,
        }))
    }

    fn wait_all(&self, requests: Vec<LocalRequest>) -> Result<()> {
        let mut result = Ok(());
        for LocalRequest(pending) in requests {
            let completed = match pending {
                Pending::Nothing => Ok(()),
                Pending::Receive {
                    envelope,
                    buf,
                    capacity,
                } => self.mailbox.take(&envelope).and_then(|payload| {
                    if payload.len() > capacity {
                        return Err(Error::Truncate {
                            received: payload.len(),
                            capacity,
                        });
                    }
                    // The receive block was reserved for this request when it was posted.
                    unsafe { ptr::copy_nonoverlapping(payload.as_ptr(), buf, payload.len()) };
                    Ok(())
                }),
            };
            if result.is_ok() {
                result = completed;
            }
        }
        result
    }
}
