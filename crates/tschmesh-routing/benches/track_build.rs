//! Track construction benchmarks
//!
//! Builds tracks over ladder meshes of increasing length: two rails joined
//! by rungs, the root above the first rung and the destination below the
//! last one.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tschmesh_protocol::{Eui64, TrackId};
use tschmesh_routing::{NeighborReport, TopologyGraph, Track, TrackBuilder, DEFAULT_MAX_ALTERNATE_PATHS};

fn mote(rail: u8, rung: u8) -> Eui64 {
    Eui64::from_bytes([0, 18, 75, 0, 6, 13, rail, rung])
}

/// Ladder with `rungs` rungs; returns the topology and the left-rail route
fn ladder(rungs: u8) -> (TopologyGraph, Vec<Eui64>) {
    let root = mote(0, 0);
    let destination = mote(3, 0);
    let mut topology = TopologyGraph::new();

    topology.apply_report(&NeighborReport::new(root, vec![], vec![mote(1, 1), mote(2, 1)]));
    for rung in 1..=rungs {
        for (rail, other) in [(1, 2), (2, 1)] {
            let upper = if rung == 1 { root } else { mote(rail, rung - 1) };
            let lower = if rung == rungs {
                destination
            } else {
                mote(rail, rung + 1)
            };
            topology.apply_report(&NeighborReport::new(
                mote(rail, rung),
                vec![(0, upper), (1, mote(other, rung))],
                vec![lower],
            ));
        }
    }
    topology.apply_report(&NeighborReport::new(
        destination,
        vec![(0, mote(1, rungs)), (1, mote(2, rungs))],
        vec![],
    ));

    let mut route = vec![destination];
    route.extend((1..=rungs).rev().map(|rung| mote(1, rung)));
    route.push(root);
    (topology, route)
}

fn bench_track_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("track_build");

    for rungs in [3u8, 8, 16, 32] {
        let (topology, route) = ladder(rungs);
        group.bench_with_input(BenchmarkId::from_parameter(rungs), &route, |b, route| {
            b.iter(|| {
                let builder = TrackBuilder::new(&topology, DEFAULT_MAX_ALTERNATE_PATHS);
                let mut track = Track::new(TrackId::from_u8(1), route.clone()).unwrap();
                let arcs = builder.build(&mut track).unwrap();
                black_box(arcs.len())
            });
        });
    }

    group.finish();
}

fn bench_bitmap_encode(c: &mut Criterion) {
    let (topology, route) = ladder(16);
    let builder = TrackBuilder::new(&topology, DEFAULT_MAX_ALTERNATE_PATHS);
    let mut track = Track::new(TrackId::from_u8(1), route).unwrap();
    builder.build(&mut track).unwrap();
    let map = track.finalize().unwrap().clone();
    let path = track.route_edges().unwrap();

    c.bench_function("bitmap_encode_route", |b| {
        b.iter(|| black_box(map.encode(&path).unwrap()))
    });
}

criterion_group!(benches, bench_track_build, bench_bitmap_encode);
criterion_main!(benches);
