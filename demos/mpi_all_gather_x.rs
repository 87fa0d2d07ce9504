#![deny(warnings)]
use bigmpi::mpi::{self, MpiDatatype};
use bigmpi::traits::*;

fn main() {
    let universe = mpi::initialize().unwrap().unwrap();
    let world = universe.world();
    let size = world.size() as usize;
    let rank = world.rank();

    // pass a block length on the command line to go past the native count limit
    let block: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1 << 20);

    let byte = MpiDatatype::of::<u8>();
    let contribution = vec![rank as u8; block];
    let mut recvbuf = vec![0u8; size * block];
    let counts = vec![block as i64; size];
    let displs: Vec<isize> = (0..size).map(|i| (i * block) as isize).collect();

    world
        .all_gather_varcount_x(&contribution, block as i64, &byte, &mut recvbuf, &counts, &displs, &byte)
        .unwrap();

    assert!(recvbuf
        .chunks(block)
        .enumerate()
        .all(|(i, chunk)| chunk.iter().all(|&b| b == i as u8)));
    if rank == 0 {
        println!("Gathered {} blocks of {} bytes.", size, block);
    }
}
