//! Native descriptors
//!
//! A `DescriptorList` is the native form of one side of a `Plan`: every count fits the native
//! count limit, blocks that do not are described by a synthetic contiguous type with a count of
//! 1. Records that created their type own it, and releasing the list frees exactly those.

use std::ops::Deref;

use crate::collective::plan::{Block, Plan};
use crate::datatype::{self, Datatypes};
use crate::error::Result;
use crate::{Address, NativeCount};

/// One block in native form
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Descriptor<D> {
    pub count: NativeCount,
    pub datatype: D,
    pub displacement: Address,
    pub active: bool,
    pub owned: bool,
}

pub(crate) struct DescriptorList<'c, C: Datatypes + ?Sized> {
    comm: &'c C,
    records: Vec<Descriptor<C::Datatype>>,
}

impl<'c, C: Datatypes + ?Sized> DescriptorList<'c, C> {
    /// Builds the native form of `blocks`, creating a synthetic type for every count above the
    /// limit of `comm`. Types created before a failure are released.
    pub(crate) fn synthesize(comm: &'c C, blocks: &[Block<C::Datatype>]) -> Result<Self> {
        let limit = comm.count_limit();
        let mut list = DescriptorList {
            comm,
            records: Vec::with_capacity(blocks.len()),
        };
        for (peer, block) in blocks.iter().enumerate() {
            let record = match datatype::native_count(block.count, limit)? {
                Some(count) => Descriptor {
                    count,
                    datatype: block.datatype.clone(),
                    displacement: block.displacement,
                    active: block.active,
                    owned: false,
                },
                None => {
                    let synthetic = comm.contiguous(block.count, &block.datatype)?;
                    tracing::trace!(peer, count = block.count, "synthesized contiguous type");
                    Descriptor {
                        count: 1,
                        datatype: synthetic,
                        displacement: block.displacement,
                        active: block.active,
                        owned: true,
                    }
                }
            };
            list.records.push(record);
        }
        Ok(list)
    }

    /// A list that describes `blocks` with the counts and types of this one, owning nothing.
    pub(crate) fn mirror(&self, blocks: &[Block<C::Datatype>]) -> DescriptorList<'c, C> {
        let records = self
            .records
            .iter()
            .zip(blocks)
            .map(|(record, block)| Descriptor {
                count: record.count,
                datatype: record.datatype.clone(),
                displacement: block.displacement,
                active: block.active,
                owned: false,
            })
            .collect();
        DescriptorList {
            comm: self.comm,
            records,
        }
    }

    /// Number of synthetic types owned by this list
    pub(crate) fn synthetic(&self) -> usize {
        self.records.iter().filter(|record| record.owned).count()
    }

    /// Frees every owned type. All are attempted, the first failure is returned.
    pub(crate) fn release(mut self) -> Result<()> {
        self.release_owned()
    }

    fn release_owned(&mut self) -> Result<()> {
        let mut result = Ok(());
        for record in self.records.iter_mut().filter(|record| record.owned) {
            record.owned = false;
            let freed = self.comm.free_datatype(&mut record.datatype);
            if result.is_ok() {
                result = freed;
            }
        }
        result
    }
}

impl<'c, C: Datatypes + ?Sized> Deref for DescriptorList<'c, C> {
    type Target = [Descriptor<C::Datatype>];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl<'c, C: Datatypes + ?Sized> Drop for DescriptorList<'c, C> {
    fn drop(&mut self) {
        if let Err(err) = self.release_owned() {
            tracing::warn!(%err, "failed to release synthetic datatype");
        }
    }
}

/// Native send and receive lists for `plan`.
///
/// With `share` set and identical (count, type) pairs on both sides, the receive list reuses the
/// synthetic types of the send list.
pub(crate) fn synthesize_pair<'c, C>(
    comm: &'c C,
    plan: &Plan<C::Datatype>,
    share: bool,
) -> Result<(DescriptorList<'c, C>, DescriptorList<'c, C>)>
where
    C: Datatypes + ?Sized,
{
    let sends = DescriptorList::synthesize(comm, &plan.sends)?;
    let recvs = if share && plan.send_recv_identical() {
        sends.mirror(&plan.recvs)
    } else {
        DescriptorList::synthesize(comm, &plan.recvs)?
    };
    tracing::debug!(
        send_types = sends.synthetic(),
        recv_types = recvs.synthetic(),
        shared = share && plan.send_recv_identical(),
        "built native descriptors"
    );
    Ok((sends, recvs))
}
