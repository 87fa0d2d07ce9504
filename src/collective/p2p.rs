//! The point-to-point realization
//!
//! For each peer in rank order the receive is posted before the send, then a single wait-all
//! joins everything. A message from rank `s` carries the tag `s`.

use crate::collective::descriptor::{self, DescriptorList};
use crate::collective::plan::Plan;
use crate::error::Result;
use crate::point_to_point::ImmediatePointToPoint;

pub(crate) fn exchange<C>(
    comm: &C,
    plan: &Plan<C::Datatype>,
    sendbuf: &[u8],
    recvbuf: &mut [u8],
    share: bool,
) -> Result<()>
where
    C: ImmediatePointToPoint + ?Sized,
{
    let (sends, recvs) = descriptor::synthesize_pair(comm, plan, share)?;

    let mut requests = Vec::with_capacity(2 * sends.len());
    let posted = post_all(comm, &sends, &recvs, sendbuf, recvbuf, &mut requests);
    if let Err(err) = &posted {
        tracing::warn!(%err, posted = requests.len(), "posting stopped early");
    }
    let waited = comm.wait_all(requests);

    let released_recvs = recvs.release();
    let released_sends = sends.release();
    posted.and(waited).and(released_recvs).and(released_sends)
}

fn post_all<C>(
    comm: &C,
    sends: &DescriptorList<'_, C>,
    recvs: &DescriptorList<'_, C>,
    sendbuf: &[u8],
    recvbuf: &mut [u8],
    requests: &mut Vec<C::Request>,
) -> Result<()>
where
    C: ImmediatePointToPoint + ?Sized,
{
    let rank = comm.rank();
    let send_base = sendbuf.as_ptr();
    let recv_base = recvbuf.as_mut_ptr();

    for (peer, (send, recv)) in (0..comm.size()).zip(sends.iter().zip(recvs.iter())) {
        if recv.active {
            let buf = recv_base.wrapping_offset(recv.displacement);
            requests.push(unsafe {
                comm.immediate_receive(buf, recv.count, &recv.datatype, peer, peer)?
            });
        }
        if send.active {
            let buf = send_base.wrapping_offset(send.displacement);
            requests.push(unsafe {
                comm.immediate_send(buf, send.count, &send.datatype, peer, rank)?
            });
        }
    }
    Ok(())
}
