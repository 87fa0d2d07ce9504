use bigmpi::local::{LocalDatatype, LocalUniverse};
use bigmpi::traits::*;
use bigmpi::{Config, Strategy, Translator};

const STRATEGIES: [Strategy; 2] = [Strategy::NeighborExchange, Strategy::PointToPoint];

fn block(rank: usize, len: usize) -> Vec<u8> {
    (0..len).map(|k| ((rank + 1) * 10 + k) as u8).collect()
}

#[test]
fn mixed_counts_wrap_only_the_blocks_above_the_limit() {
    const LIMIT: i64 = 8;
    // rank 0 sits exactly on the limit, rank 1 one above it
    let counts = [LIMIT, LIMIT + 1, 3];
    let displs = [0, 8, 17];
    let expected: Vec<u8> = (0..3).flat_map(|r| block(r, counts[r] as usize)).collect();

    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let results = LocalUniverse::new(3)
            .with_count_limit(LIMIT)
            .run(|world| {
                let rank = world.rank() as usize;
                let byte = LocalDatatype::BYTE;
                let sendbuf = block(rank, counts[rank] as usize);
                let mut recvbuf = vec![0u8; 20];
                Translator::with_config(&world, config)
                    .all_gather_varcount_x(
                        &sendbuf,
                        counts[rank],
                        &byte,
                        &mut recvbuf,
                        &counts,
                        &displs,
                        &byte,
                    )
                    .unwrap();
                assert_eq!(world.datatypes_live(), 0);
                assert_eq!(world.graphs_live(), 0);
                (recvbuf, world.datatypes_created())
            })
            .unwrap();

        for (recvbuf, _) in &results {
            assert_eq!(recvbuf, &expected, "{strategy}");
        }
        let created: Vec<_> = results.iter().map(|(_, created)| *created).collect();
        // rank 1 wraps its send block once per peer, everyone wraps the block from rank 1
        assert_eq!(created, vec![1, 4, 1], "{strategy}");
    }
}

#[test]
fn receivers_choose_their_own_layout() {
    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let results = LocalUniverse::new(4)
            .with_count_limit(2)
            .run(|world| {
                let rank = world.rank();
                let short = LocalDatatype::of::<u16>();
                let sendbuf: Vec<u8> = (0..3u16)
                    .flat_map(|k| (rank as u16 * 100 + k).to_le_bytes())
                    .collect();
                // blocks in reverse rank order, 2 bytes of padding in front of each
                let displs: Vec<isize> = (0..4).map(|i| (3 - i) * 8 + 2).collect();
                let mut recvbuf = vec![0u8; 32];
                Translator::with_config(&world, config)
                    .all_gather_varcount_x(
                        &sendbuf,
                        3,
                        &short,
                        &mut recvbuf,
                        &[3; 4],
                        &displs,
                        &short,
                    )
                    .unwrap();
                recvbuf
            })
            .unwrap();

        let mut expected = vec![0u8; 32];
        for i in 0..4u16 {
            let start = (3 - i as usize) * 8 + 2;
            for k in 0..3u16 {
                let at = start + 2 * k as usize;
                expected[at..at + 2].copy_from_slice(&(i * 100 + k).to_le_bytes());
            }
        }
        assert!(results.iter().all(|recvbuf| recvbuf == &expected), "{strategy}");
    }
}

#[test]
fn extension_trait_uses_the_process_configuration() {
    let results = LocalUniverse::new(3)
        .run(|world| {
            let byte = LocalDatatype::BYTE;
            let contribution = [world.rank() as u8; 2];
            let mut recvbuf = [0u8; 6];
            world
                .all_gather_varcount_x(&contribution, 2, &byte, &mut recvbuf, &[2; 3], &[4, 2, 0], &byte)
                .unwrap();
            recvbuf
        })
        .unwrap();
    for recvbuf in results {
        assert_eq!(recvbuf, [2, 2, 1, 1, 0, 0]);
    }
}

#[test]
fn empty_blocks_may_point_past_the_buffer() {
    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let results = LocalUniverse::new(2)
            .run(|world| {
                let rank = world.rank() as usize;
                let byte = LocalDatatype::BYTE;
                let counts = [2, 0];
                let sendbuf = block(rank, counts[rank] as usize);
                let mut recvbuf = [0u8; 2];
                let result = Translator::with_config(&world, config).all_gather_varcount_x(
                    &sendbuf,
                    counts[rank],
                    &byte,
                    &mut recvbuf,
                    &counts,
                    &[0, 100],
                    &byte,
                );
                result.map(|()| recvbuf)
            })
            .unwrap();
        for result in results {
            assert_eq!(result, Ok([10, 11]), "{strategy}");
        }
    }
}
