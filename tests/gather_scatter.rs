use bigmpi::local::{LocalDatatype, LocalUniverse};
use bigmpi::traits::*;
use bigmpi::{Config, Error, Strategy, Translator};

const STRATEGIES: [Strategy; 2] = [Strategy::NeighborExchange, Strategy::PointToPoint];
const LIMIT: i64 = 16;
const BLOCK: usize = LIMIT as usize + 10;
const SLOT: usize = BLOCK + 4;

fn contribution(rank: usize) -> Vec<u8> {
    (0..BLOCK).map(|k| (rank * 40 + k) as u8).collect()
}

/// Rank `i` lands in slot `3 - i`, leaving four untouched bytes behind every block.
fn reversed_displs(size: usize) -> Vec<isize> {
    (0..size).map(|i| ((size - 1 - i) * SLOT) as isize).collect()
}

#[test]
fn oversized_gather_places_every_contribution_at_its_displacement() {
    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let root = 1;
        let results = LocalUniverse::new(4)
            .with_count_limit(LIMIT)
            .run(|world| {
                let rank = world.rank();
                let size = world.size() as usize;
                let byte = LocalDatatype::BYTE;
                let sendbuf = contribution(rank as usize);
                let (mut recvbuf, recvcounts, displs) = if rank == root {
                    (
                        vec![0xffu8; size * SLOT],
                        vec![BLOCK as i64; size],
                        reversed_displs(size),
                    )
                } else {
                    (Vec::new(), Vec::new(), Vec::new())
                };

                Translator::with_config(&world, config)
                    .gather_varcount_x(
                        &sendbuf,
                        BLOCK as i64,
                        &byte,
                        &mut recvbuf,
                        &recvcounts,
                        &displs,
                        &byte,
                        root,
                    )
                    .unwrap();

                assert_eq!(world.datatypes_live(), 0);
                assert_eq!(world.graphs_live(), 0);
                (recvbuf, world.datatypes_created())
            })
            .unwrap();

        let (gathered, created) = &results[root as usize];
        for (i, displ) in reversed_displs(4).into_iter().enumerate() {
            let displ = displ as usize;
            assert_eq!(&gathered[displ..displ + BLOCK], &contribution(i)[..], "{strategy}");
            assert_eq!(&gathered[displ + BLOCK..displ + SLOT], &[0xff; 4], "{strategy}");
        }
        // one send block to the root plus four receive blocks
        assert_eq!(*created, 5);
        for (rank, (recvbuf, created)) in results.iter().enumerate() {
            if rank != root as usize {
                assert!(recvbuf.is_empty());
                assert_eq!(*created, 1);
            }
        }
    }
}

#[test]
fn gather_within_the_limit_builds_no_types() {
    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let results = LocalUniverse::new(3)
            .run(|world| {
                let rank = world.rank();
                let int = LocalDatatype::of::<u32>();
                let sendbuf: Vec<u8> = (0..=rank as u32).flat_map(u32::to_le_bytes).collect();
                let mut recvbuf = vec![0u8; 24];
                Translator::with_config(&world, config)
                    .gather_varcount_x(
                        &sendbuf,
                        rank as i64 + 1,
                        &int,
                        &mut recvbuf,
                        &[1, 2, 3],
                        &[0, 4, 12],
                        &int,
                        0,
                    )
                    .unwrap();
                (recvbuf, world.datatypes_created())
            })
            .unwrap();

        let expected: Vec<u8> = [0u32, 0, 1, 0, 1, 2]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(results[0].0, expected);
        assert!(results.iter().all(|(_, created)| *created == 0));
    }
}

#[test]
fn oversized_scatter_delivers_each_block() {
    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let root = 2;
        let results = LocalUniverse::new(4)
            .with_count_limit(LIMIT)
            .run(|world| {
                let rank = world.rank();
                let size = world.size() as usize;
                let byte = LocalDatatype::BYTE;
                let (sendbuf, sendcounts, displs) = if rank == root {
                    let displs = reversed_displs(size);
                    let mut sendbuf = vec![0u8; size * SLOT];
                    for (i, &displ) in displs.iter().enumerate() {
                        let displ = displ as usize;
                        sendbuf[displ..displ + BLOCK].copy_from_slice(&contribution(i));
                    }
                    (sendbuf, vec![BLOCK as i64; size], displs)
                } else {
                    (Vec::new(), Vec::new(), Vec::new())
                };
                let mut recvbuf = vec![0u8; BLOCK];

                Translator::with_config(&world, config)
                    .scatter_varcount_x(
                        &sendbuf,
                        &sendcounts,
                        &displs,
                        &byte,
                        &mut recvbuf,
                        BLOCK as i64,
                        &byte,
                        root,
                    )
                    .unwrap();
                assert_eq!(world.datatypes_live(), 0);
                recvbuf
            })
            .unwrap();

        for (rank, recvbuf) in results.iter().enumerate() {
            assert_eq!(recvbuf, &contribution(rank), "{strategy}");
        }
    }
}

#[test]
fn repeated_scatter_is_idempotent() {
    let results = LocalUniverse::new(2)
        .with_count_limit(2)
        .run(|world| {
            let byte = LocalDatatype::BYTE;
            let sendbuf: Vec<u8> = if world.rank() == 0 {
                (1..=8).collect()
            } else {
                Vec::new()
            };
            let (counts, displs): (&[i64], &[isize]) = if world.rank() == 0 {
                (&[3, 5][..], &[5, 0][..])
            } else {
                (&[][..], &[][..])
            };
            let recvcount = if world.rank() == 0 { 3 } else { 5 };
            let translator = Translator::new(&world);
            let mut first = vec![0u8; 5];
            let mut second = vec![0u8; 5];
            for recvbuf in [&mut first, &mut second] {
                translator
                    .scatter_varcount_x(&sendbuf, counts, displs, &byte, recvbuf, recvcount, &byte, 0)
                    .unwrap();
            }
            assert_eq!(first, second);
            first
        })
        .unwrap();
    assert_eq!(results[0], vec![6, 7, 8, 0, 0]);
    assert_eq!(results[1], vec![1, 2, 3, 4, 5]);
}

#[test]
fn arguments_are_validated_before_communication() {
    let errors = LocalUniverse::new(2)
        .run(|world| {
            let byte = LocalDatatype::BYTE;
            let sendbuf = [0u8; 4];
            let mut recvbuf = [0u8; 4];
            let translator = Translator::new(&world);
            let root = translator
                .gather_varcount_x(&sendbuf, 4, &byte, &mut recvbuf, &[4, 4], &[0, 4], &byte, 2)
                .unwrap_err();
            let bounds = translator
                .scatter_varcount_x(&sendbuf, &[2, 2], &[0, 2], &byte, &mut recvbuf, 5, &byte, 0)
                .unwrap_err();
            (root, bounds, world.messages_sent())
        })
        .unwrap();
    for (root, bounds, sent) in errors {
        assert_eq!(root, Error::Rank { rank: 2, size: 2 });
        assert_eq!(
            bounds,
            Error::Buffer {
                displacement: 0,
                bytes: 5,
                capacity: 4
            }
        );
        assert_eq!(sent, 0);
    }
}

#[test]
fn a_root_side_argument_error_does_not_hang_the_group() {
    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let results = LocalUniverse::new(2)
            .run(|world| {
                let byte = LocalDatatype::BYTE;
                let sendbuf = [7u8; 2];
                let mut recvbuf = [0u8; 4];
                // only the root looks at recvcounts, and it is one entry short
                let (recvcounts, displs): (&[i64], &[isize]) = if world.rank() == 0 {
                    (&[2][..], &[0, 2][..])
                } else {
                    (&[][..], &[][..])
                };
                let result = Translator::with_config(&world, config).gather_varcount_x(
                    &sendbuf,
                    2,
                    &byte,
                    &mut recvbuf,
                    recvcounts,
                    displs,
                    &byte,
                    0,
                );
                (result, world.graphs_live())
            })
            .unwrap();

        assert_eq!(
            results[0],
            (
                Err(Error::GroupSize {
                    argument: "recvcounts",
                    expected: 2,
                    actual: 1
                }),
                0
            ),
            "{strategy}"
        );
        // the neighbor exchange waits for the root, the point-to-point sender does not
        let expected = match strategy {
            Strategy::NeighborExchange => Err(Error::Aborted),
            Strategy::PointToPoint => Ok(()),
        };
        assert_eq!(results[1], (expected, 0), "{strategy}");
    }
}
