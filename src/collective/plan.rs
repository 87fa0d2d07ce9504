//! Exchange plans
//!
//! Every large-count collective is described as a generalized all-to-all: for each peer one block
//! to send and one block to receive. Blocks along edges the collective does not use are inactive;
//! they carry a count of zero and the type of the operation as a filler.

use conv::ConvUtil;

use crate::datatype::{self, Datatypes};
use crate::error::{Error, Result};
use crate::{Address, Count, Rank};

/// Data moved along one edge of the complete graph
#[derive(Clone, Debug, PartialEq)]
pub struct Block<D> {
    /// Number of elements, may exceed the native count limit
    pub count: Count,
    /// Element type
    pub datatype: D,
    /// Byte displacement into the buffer
    pub displacement: Address,
    /// Whether the collective moves a message along this edge
    pub active: bool,
}

impl<D: Clone> Block<D> {
    fn active(count: Count, datatype: &D, displacement: Address) -> Self {
        Block {
            count,
            datatype: datatype.clone(),
            displacement,
            active: true,
        }
    }

    fn inactive(datatype: &D) -> Self {
        Block {
            count: 0,
            datatype: datatype.clone(),
            displacement: 0,
            active: false,
        }
    }
}

/// Send and receive blocks of the calling process, indexed by peer rank
#[derive(Clone, Debug, PartialEq)]
pub struct Plan<D> {
    /// Blocks sent to each peer
    pub sends: Vec<Block<D>>,
    /// Blocks received from each peer
    pub recvs: Vec<Block<D>>,
}

fn group_size(size: Rank) -> Result<usize> {
    size.value_as().map_err(|_| Error::Rank { rank: size, size })
}

fn check_root(root: Rank, size: Rank) -> Result<usize> {
    if root < 0 || root >= size {
        return Err(Error::Rank { rank: root, size });
    }
    group_size(root)
}

fn check_len(argument: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::GroupSize {
            argument,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_count(count: Count) -> Result<()> {
    if count < 0 {
        return Err(Error::NegativeCount(count));
    }
    Ok(())
}

/// One active block per peer from per-peer arrays.
fn per_peer<D: Clone>(
    counts: &[Count],
    displs: &[Address],
    datatypes: impl Iterator<Item = D>,
) -> Result<Vec<Block<D>>> {
    counts
        .iter()
        .zip(displs)
        .zip(datatypes)
        .map(|((&count, &displacement), datatype)| {
            check_count(count)?;
            Ok(Block {
                count,
                datatype,
                displacement,
                active: true,
            })
        })
        .collect()
}

impl<D: Clone + PartialEq> Plan<D> {
    /// Every rank sends `sendcount` elements to `root`; `root` receives `recvcounts[i]` elements
    /// from rank `i` at byte displacement `displs[i]`.
    #[allow(clippy::too_many_arguments)]
    pub fn gather(
        rank: Rank,
        size: Rank,
        sendcount: Count,
        sendtype: &D,
        recvcounts: &[Count],
        displs: &[Address],
        recvtype: &D,
        root: Rank,
    ) -> Result<Self> {
        let n = group_size(size)?;
        let root_index = check_root(root, size)?;
        check_count(sendcount)?;

        let sends = (0..n)
            .map(|peer| {
                if peer == root_index {
                    Block::active(sendcount, sendtype, 0)
                } else {
                    Block::inactive(sendtype)
                }
            })
            .collect();

        let recvs = if rank == root {
            check_len("recvcounts", recvcounts.len(), n)?;
            check_len("displs", displs.len(), n)?;
            per_peer(recvcounts, displs, std::iter::repeat(recvtype.clone()))?
        } else {
            vec![Block::inactive(recvtype); n]
        };

        Ok(Plan { sends, recvs })
    }

    /// `root` sends `sendcounts[i]` elements at byte displacement `displs[i]` to rank `i`; every
    /// rank receives `recvcount` elements from `root`.
    #[allow(clippy::too_many_arguments)]
    pub fn scatter(
        rank: Rank,
        size: Rank,
        sendcounts: &[Count],
        displs: &[Address],
        sendtype: &D,
        recvcount: Count,
        recvtype: &D,
        root: Rank,
    ) -> Result<Self> {
        let n = group_size(size)?;
        let root_index = check_root(root, size)?;
        check_count(recvcount)?;

        let sends = if rank == root {
            check_len("sendcounts", sendcounts.len(), n)?;
            check_len("displs", displs.len(), n)?;
            per_peer(sendcounts, displs, std::iter::repeat(sendtype.clone()))?
        } else {
            vec![Block::inactive(sendtype); n]
        };

        let recvs = (0..n)
            .map(|peer| {
                if peer == root_index {
                    Block::active(recvcount, recvtype, 0)
                } else {
                    Block::inactive(recvtype)
                }
            })
            .collect();

        Ok(Plan { sends, recvs })
    }

    /// Every rank sends the same `sendcount` elements to every rank and receives
    /// `recvcounts[i]` elements from rank `i` at byte displacement `displs[i]`.
    pub fn all_gather(
        size: Rank,
        sendcount: Count,
        sendtype: &D,
        recvcounts: &[Count],
        displs: &[Address],
        recvtype: &D,
    ) -> Result<Self> {
        let n = group_size(size)?;
        check_count(sendcount)?;
        check_len("recvcounts", recvcounts.len(), n)?;
        check_len("displs", displs.len(), n)?;

        Ok(Plan {
            sends: vec![Block::active(sendcount, sendtype, 0); n],
            recvs: per_peer(recvcounts, displs, std::iter::repeat(recvtype.clone()))?,
        })
    }

    /// A variable all-to-all with one type per direction.
    #[allow(clippy::too_many_arguments)]
    pub fn all_to_all_v(
        size: Rank,
        sendcounts: &[Count],
        sdispls: &[Address],
        sendtype: &D,
        recvcounts: &[Count],
        rdispls: &[Address],
        recvtype: &D,
    ) -> Result<Self> {
        let n = group_size(size)?;
        check_len("sendcounts", sendcounts.len(), n)?;
        check_len("sdispls", sdispls.len(), n)?;
        check_len("recvcounts", recvcounts.len(), n)?;
        check_len("rdispls", rdispls.len(), n)?;

        Ok(Plan {
            sends: per_peer(sendcounts, sdispls, std::iter::repeat(sendtype.clone()))?,
            recvs: per_peer(recvcounts, rdispls, std::iter::repeat(recvtype.clone()))?,
        })
    }

    /// A generalized all-to-all with one type per peer and direction.
    pub fn all_to_all_w(
        size: Rank,
        sendcounts: &[Count],
        sdispls: &[Address],
        sendtypes: &[D],
        recvcounts: &[Count],
        rdispls: &[Address],
        recvtypes: &[D],
    ) -> Result<Self> {
        let n = group_size(size)?;
        check_len("sendcounts", sendcounts.len(), n)?;
        check_len("sdispls", sdispls.len(), n)?;
        check_len("sendtypes", sendtypes.len(), n)?;
        check_len("recvcounts", recvcounts.len(), n)?;
        check_len("rdispls", rdispls.len(), n)?;
        check_len("recvtypes", recvtypes.len(), n)?;

        Ok(Plan {
            sends: per_peer(sendcounts, sdispls, sendtypes.iter().cloned())?,
            recvs: per_peer(recvcounts, rdispls, recvtypes.iter().cloned())?,
        })
    }

    /// Whether every peer is sent the same (count, type) pair it is received with.
    pub fn send_recv_identical(&self) -> bool {
        self.sends.len() == self.recvs.len()
            && self
                .sends
                .iter()
                .zip(&self.recvs)
                .all(|(send, recv)| send.count == recv.count && send.datatype == recv.datatype)
    }

    /// Checks that every active block lies within its buffer.
    pub fn check_bounds<C>(&self, comm: &C, send_capacity: usize, recv_capacity: usize) -> Result<()>
    where
        C: Datatypes<Datatype = D> + ?Sized,
    {
        for block in &self.sends {
            check_block(comm, block, send_capacity)?;
        }
        for block in &self.recvs {
            check_block(comm, block, recv_capacity)?;
        }
        Ok(())
    }
}

fn check_block<C>(comm: &C, block: &Block<C::Datatype>, capacity: usize) -> Result<()>
where
    C: Datatypes + ?Sized,
{
    if !block.active || block.count == 0 {
        return Ok(());
    }
    let extent = comm.extent(&block.datatype)?;
    let bytes = datatype::span(block.count, extent)?;
    let overrun = || Error::Buffer {
        displacement: block.displacement,
        bytes,
        capacity,
    };
    let start: u64 = block.displacement.value_as().map_err(|_| overrun())?;
    let capacity_bytes: u64 = capacity.value_as().map_err(|_| overrun())?;
    if u128::from(start) + bytes > u128::from(capacity_bytes) {
        return Err(overrun());
    }
    Ok(())
}
