#![deny(warnings)]
use bigmpi::local::{LocalDatatype, LocalUniverse};
use bigmpi::traits::*;

const LIMIT: i64 = 1000;
const BLOCK: usize = LIMIT as usize + 10;

fn main() {
    // four ranks, a native count limit of 1000 elements, 1010 bytes per rank
    let universe = LocalUniverse::new(4).with_count_limit(LIMIT);
    let root_rank = 1;

    let results = universe
        .run(|world| {
            let size = world.size() as usize;
            let rank = world.rank();
            let byte = LocalDatatype::BYTE;
            let contribution = vec![rank as u8 + 1; BLOCK];

            let (mut recvbuf, recvcounts, displs) = if rank == root_rank {
                let displs: Vec<isize> = (0..size as isize)
                    .map(|i| (size as isize - 1 - i) * BLOCK as isize)
                    .collect();
                (vec![0u8; size * BLOCK], vec![BLOCK as i64; size], displs)
            } else {
                (Vec::new(), Vec::new(), Vec::new())
            };

            world
                .gather_varcount_x(
                    &contribution,
                    BLOCK as i64,
                    &byte,
                    &mut recvbuf,
                    &recvcounts,
                    &displs,
                    &byte,
                    root_rank,
                )
                .unwrap();
            recvbuf
        })
        .unwrap();

    let gathered = &results[root_rank as usize];
    let firsts: Vec<u8> = gathered.chunks(BLOCK).map(|block| block[0]).collect();
    println!("Root gathered blocks starting with {:?}.", firsts);
    assert_eq!(firsts, vec![4, 3, 2, 1]);
    assert!(gathered
        .chunks(BLOCK)
        .all(|block| block.iter().all(|&b| b == block[0])));
}
