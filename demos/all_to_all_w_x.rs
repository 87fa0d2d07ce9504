#![deny(warnings)]
use bigmpi::local::{LocalDatatype, LocalUniverse};
use bigmpi::traits::*;
use bigmpi::{Config, Strategy, Translator};

fn main() {
    let universe = LocalUniverse::new(3).with_count_limit(4);

    for strategy in [Strategy::NeighborExchange, Strategy::PointToPoint] {
        let config = Config::default().with_strategy(strategy);
        let results = universe
            .run(|world| {
                let size = world.size() as usize;
                let rank = world.rank() as usize;
                let short = LocalDatatype::of::<u16>();

                // rank r sends r + j + 2 words to rank j, each word holding 100 * r + j
                let counts: Vec<i64> = (0..size).map(|j| (rank + j + 2) as i64).collect();
                let recvcounts: Vec<i64> = (0..size).map(|j| (j + rank + 2) as i64).collect();
                let mut sendbuf = Vec::new();
                let mut sdispls = Vec::new();
                for (j, &count) in counts.iter().enumerate() {
                    sdispls.push(sendbuf.len() as isize);
                    for _ in 0..count {
                        sendbuf.extend_from_slice(&((100 * rank + j) as u16).to_le_bytes());
                    }
                }
                let mut rdispls = Vec::new();
                let mut len = 0;
                for &count in &recvcounts {
                    rdispls.push(len as isize);
                    len += 2 * count as usize;
                }
                let mut recvbuf = vec![0u8; len];

                Translator::with_config(&world, config)
                    .all_to_all_w_x(
                        &sendbuf,
                        &counts,
                        &sdispls,
                        &vec![short; size],
                        &mut recvbuf,
                        &recvcounts,
                        &rdispls,
                        &vec![short; size],
                    )
                    .unwrap();

                let words: Vec<u16> = recvbuf
                    .chunks(2)
                    .map(|w| u16::from_le_bytes([w[0], w[1]]))
                    .collect();
                (words, world.datatypes_created())
            })
            .unwrap();

        for (rank, (words, created)) in results.iter().enumerate() {
            println!(
                "{}: rank {} received {:?} using {} synthetic types",
                strategy, rank, words, created
            );
            let mut expected = Vec::new();
            for j in 0..results.len() {
                expected.extend(std::iter::repeat((100 * j + rank) as u16).take(j + rank + 2));
            }
            assert_eq!(words, &expected);
        }
    }
}
