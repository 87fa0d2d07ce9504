//! The neighbor exchange realization
//!
//! All blocks of both directions go into one generalized neighbor all-to-all over a complete
//! graph. Inactive blocks are passed with a count of zero, so every process takes part in the
//! same single call regardless of the shape of the collective.

use smallvec::SmallVec;

use crate::collective::descriptor::{self, DescriptorList};
use crate::collective::plan::Plan;
use crate::collective::{NeighborBlocks, NeighborCollectives};
use crate::datatype::Datatypes;
use crate::error::Result;
use crate::topology::CompleteGraph;
use crate::{Address, NativeCount};

type CountArray = SmallVec<[NativeCount; 8]>;
type DisplacementArray = SmallVec<[Address; 8]>;
type TypeArray<D> = SmallVec<[D; 8]>;

/// Parallel arrays in the layout of `MPI_Neighbor_alltoallw()`
struct Arrays<D> {
    counts: CountArray,
    displs: DisplacementArray,
    datatypes: TypeArray<D>,
}

impl<D: Clone> Arrays<D> {
    fn new<C>(list: &DescriptorList<'_, C>) -> Self
    where
        C: Datatypes<Datatype = D> + ?Sized,
    {
        Arrays {
            counts: list
                .iter()
                .map(|record| if record.active { record.count } else { 0 })
                .collect(),
            displs: list.iter().map(|record| record.displacement).collect(),
            datatypes: list.iter().map(|record| record.datatype.clone()).collect(),
        }
    }

    fn blocks(&self) -> NeighborBlocks<'_, D> {
        NeighborBlocks {
            counts: &self.counts,
            displs: &self.displs,
            datatypes: &self.datatypes,
        }
    }
}

pub(crate) fn exchange<C>(
    comm: &C,
    plan: &Plan<C::Datatype>,
    sendbuf: &[u8],
    recvbuf: &mut [u8],
    share: bool,
) -> Result<()>
where
    C: NeighborCollectives + ?Sized,
{
    let (sends, recvs) = descriptor::synthesize_pair(comm, plan, share)?;
    let graph = CompleteGraph::new(comm)?;

    let send_arrays = Arrays::new(&sends);
    let recv_arrays = Arrays::new(&recvs);
    // Bounds of every active block were checked against both buffers.
    let exchanged = unsafe {
        comm.neighbor_all_to_all_w(
            graph.graph(),
            sendbuf,
            send_arrays.blocks(),
            recvbuf,
            recv_arrays.blocks(),
        )
    };

    let released_recvs = recvs.release();
    let released_sends = sends.release();
    let freed = graph.free();
    exchanged.and(released_recvs).and(released_sends).and(freed)
}
