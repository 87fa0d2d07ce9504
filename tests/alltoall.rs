use bigmpi::local::{LocalDatatype, LocalUniverse};
use bigmpi::traits::*;
use bigmpi::{Config, Strategy, Translator};

const STRATEGIES: [Strategy; 2] = [Strategy::NeighborExchange, Strategy::PointToPoint];

type Side = fn(usize, usize) -> (i64, LocalDatatype);

/// Bytes rank `source` sends to rank `destination`
fn payload(source: usize, destination: usize, len: usize) -> Vec<u8> {
    (0..len)
        .map(|k| ((source * 40 + destination * 10 + k) % 251) as u8)
        .collect()
}

fn bytes((count, datatype): (i64, LocalDatatype)) -> usize {
    count as usize * datatype.extent() as usize
}

/// Offsets of consecutive blocks, in rank order or reversed
fn packed(lens: &[usize], reversed: bool) -> (Vec<isize>, usize) {
    let mut displs = vec![0isize; lens.len()];
    let mut offset = 0;
    let order: Vec<usize> = if reversed {
        (0..lens.len()).rev().collect()
    } else {
        (0..lens.len()).collect()
    };
    for i in order {
        displs[i] = offset as isize;
        offset += lens[i];
    }
    (displs, offset)
}

/// A generalized all-to-all: `send(r, j)` is what rank `r` sends to rank `j`, `recv(r, j)` what
/// rank `r` receives from rank `j`. Receive blocks are stored in reverse rank order.
struct Pattern {
    size: usize,
    limit: i64,
    send: Side,
    recv: Side,
}

impl Pattern {
    fn run(&self, config: Config) -> Vec<(Vec<u8>, usize)> {
        LocalUniverse::new(self.size as i32)
            .with_count_limit(self.limit)
            .run(|world| {
                let r = world.rank() as usize;
                let sends: Vec<_> = (0..self.size).map(|j| (self.send)(r, j)).collect();
                let recvs: Vec<_> = (0..self.size).map(|j| (self.recv)(r, j)).collect();
                let send_lens: Vec<_> = sends.iter().copied().map(bytes).collect();
                let recv_lens: Vec<_> = recvs.iter().copied().map(bytes).collect();
                let (sdispls, send_len) = packed(&send_lens, false);
                let (rdispls, recv_len) = packed(&recv_lens, true);

                let mut sendbuf = vec![0u8; send_len];
                for j in 0..self.size {
                    let start = sdispls[j] as usize;
                    sendbuf[start..start + send_lens[j]].copy_from_slice(&payload(r, j, send_lens[j]));
                }
                let mut recvbuf = vec![0u8; recv_len];

                let sendcounts: Vec<_> = sends.iter().map(|s| s.0).collect();
                let sendtypes: Vec<_> = sends.iter().map(|s| s.1).collect();
                let recvcounts: Vec<_> = recvs.iter().map(|s| s.0).collect();
                let recvtypes: Vec<_> = recvs.iter().map(|s| s.1).collect();
                Translator::with_config(&world, config)
                    .all_to_all_w_x(
                        &sendbuf,
                        &sendcounts,
                        &sdispls,
                        &sendtypes,
                        &mut recvbuf,
                        &recvcounts,
                        &rdispls,
                        &recvtypes,
                    )
                    .unwrap();
                assert_eq!(world.datatypes_live(), 0);
                assert_eq!(world.graphs_live(), 0);
                (recvbuf, world.datatypes_created())
            })
            .unwrap()
    }

    fn expected(&self, r: usize) -> Vec<u8> {
        let lens: Vec<_> = (0..self.size).map(|j| bytes((self.recv)(r, j))).collect();
        let (displs, len) = packed(&lens, true);
        let mut expected = vec![0u8; len];
        for j in 0..self.size {
            let start = displs[j] as usize;
            expected[start..start + lens[j]].copy_from_slice(&payload(j, r, lens[j]));
        }
        expected
    }

    fn check(&self, results: &[(Vec<u8>, usize)], context: &str) {
        for (r, (recvbuf, _)) in results.iter().enumerate() {
            assert_eq!(recvbuf, &self.expected(r), "rank {r}, {context}");
        }
    }
}

fn created(results: &[(Vec<u8>, usize)]) -> Vec<usize> {
    results.iter().map(|(_, created)| *created).collect()
}

#[test]
fn per_peer_types_of_different_extent() {
    // bytes on the way out, 16 bit words on the way in
    let pattern = Pattern {
        size: 3,
        limit: 2,
        send: |r, j| (2 * (r + j + 1) as i64, LocalDatatype::BYTE),
        recv: |r, j| ((r + j + 1) as i64, LocalDatatype::of::<u16>()),
    };
    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let results = pattern.run(config);
        pattern.check(&results, &strategy.to_string());
        // send counts are above 2 where r + j >= 1, receive counts where r + j >= 2
        assert_eq!(created(&results), vec![2 + 1, 3 + 2, 3 + 3]);
    }
}

#[test]
fn identical_sides_share_synthetic_types() {
    // symmetric in (r, j), so each rank receives what it sends in count and type
    let pattern = Pattern {
        size: 3,
        limit: 4,
        send: |r, j| ((r + j + 3) as i64, LocalDatatype::bytes(1 + ((r + j) % 2) as isize)),
        recv: |r, j| ((r + j + 3) as i64, LocalDatatype::bytes(1 + ((r + j) % 2) as isize)),
    };
    for strategy in STRATEGIES {
        let shared = pattern.run(Config::default().with_strategy(strategy).with_shared_types(true));
        let separate =
            pattern.run(Config::default().with_strategy(strategy).with_shared_types(false));
        pattern.check(&shared, "shared");
        pattern.check(&separate, "separate");
        // counts above 4 where r + j >= 2
        assert_eq!(created(&shared), vec![1, 2, 3]);
        assert_eq!(created(&separate), vec![2, 4, 6]);
    }
}

#[test]
fn both_realizations_agree() {
    let pattern = Pattern {
        size: 4,
        limit: 3,
        send: |r, j| (((r * 3 + j) % 5) as i64, LocalDatatype::BYTE),
        recv: |r, j| (((j * 3 + r) % 5) as i64, LocalDatatype::BYTE),
    };
    let neighbor = pattern.run(Config::default().with_strategy(Strategy::NeighborExchange));
    let p2p = pattern.run(Config::default().with_strategy(Strategy::PointToPoint));
    pattern.check(&neighbor, "neighbor");
    assert_eq!(neighbor, p2p);
}

#[test]
fn variable_all_to_all_with_one_type() {
    const LIMIT: i64 = 4;
    // rank r sends r + j + 3 bytes to rank j, a symmetric pattern
    let count = |r: usize, j: usize| (r + j + 3) as i64;
    for strategy in STRATEGIES {
        for share in [true, false] {
            let config = Config::default()
                .with_strategy(strategy)
                .with_shared_types(share);
            let results = LocalUniverse::new(3)
                .with_count_limit(LIMIT)
                .run(|world| {
                    let r = world.rank() as usize;
                    let byte = LocalDatatype::BYTE;
                    let counts: Vec<i64> = (0..3).map(|j| count(r, j)).collect();
                    let lens: Vec<usize> = counts.iter().map(|&c| c as usize).collect();
                    let (sdispls, send_len) = packed(&lens, false);
                    let (rdispls, recv_len) = packed(&lens, true);
                    let sendbuf: Vec<u8> = (0..3).flat_map(|j| payload(r, j, lens[j])).collect();
                    assert_eq!(sendbuf.len(), send_len);
                    let mut recvbuf = vec![0u8; recv_len];

                    let translator = Translator::with_config(&world, config);
                    for _ in 0..2 {
                        translator
                            .all_to_all_varcount_x(
                                &sendbuf,
                                &counts,
                                &sdispls,
                                &byte,
                                &mut recvbuf,
                                &counts,
                                &rdispls,
                                &byte,
                            )
                            .unwrap();
                    }
                    assert_eq!(world.datatypes_live(), 0);

                    let mut expected = vec![0u8; recv_len];
                    for j in 0..3 {
                        let start = rdispls[j] as usize;
                        expected[start..start + lens[j]].copy_from_slice(&payload(j, r, lens[j]));
                    }
                    (recvbuf == expected, world.datatypes_created())
                })
                .unwrap();

            assert!(results.iter().all(|(matches, _)| *matches), "{strategy}, share {share}");
            let per_call: Vec<_> = results.iter().map(|(_, created)| created / 2).collect();
            if share {
                assert_eq!(per_call, vec![1, 2, 3]);
            } else {
                assert_eq!(per_call, vec![2, 4, 6]);
            }
        }
    }
}

#[test]
fn a_failed_exchange_still_releases_everything() {
    for strategy in STRATEGIES {
        let config = Config::default().with_strategy(strategy);
        let results = LocalUniverse::new(2)
            .with_count_limit(2)
            .run(|world| {
                let byte = LocalDatatype::BYTE;
                let sendbuf = [1u8; 10];
                let mut recvbuf = [0u8; 6];
                // five bytes for every peer against receive blocks of three
                let result = Translator::with_config(&world, config).all_to_all_varcount_x(
                    &sendbuf,
                    &[5, 5],
                    &[0, 5],
                    &byte,
                    &mut recvbuf,
                    &[3, 3],
                    &[0, 3],
                    &byte,
                );
                (
                    result,
                    world.datatypes_created(),
                    world.datatypes_live(),
                    world.graphs_live(),
                )
            })
            .unwrap();

        for (result, created, live, graphs) in results {
            assert_eq!(
                result,
                Err(bigmpi::Error::Truncate {
                    received: 5,
                    capacity: 3
                }),
                "{strategy}"
            );
            assert_eq!(created, 4, "{strategy}");
            assert_eq!((live, graphs), (0, 0), "{strategy}");
        }
    }
}
