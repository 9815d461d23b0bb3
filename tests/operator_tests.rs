//! Operator semantics over small in-memory series.


use std::sync::Arc;

use rasq_core::dag::OperatorKind;
use rasq_core::error::Error;
use rasq_core::geometry::Resolution;
use rasq_core::raster::{is_nodata, RasterBuffer};
use rasq_core::tile::Order;
use rasq_core::time::TemporalExtent;
use rasq_io::MemoryBackend;
use rasq_operators::{OpState, Payload, Pull, SharedTile, TileDescriptor};
use serde_json::json;
use test_data_gen::*;

#[test]
fn source_walks_tiles_in_both_orders() {
    let catalog = catalog();

    let mut time_major = source(&catalog, "series", query(Order::TimeMajor));
    let tiles = drain(&mut time_major);
    assert_eq!(tiles.len(), 16);
    assert_eq!(&positions(&tiles)[..5], &[(0, 10, 0), (0, 10, 1), (0, 10, 2), (0, 10, 3), (10, 20, 0)]);

    let mut tile_major = source(&catalog, "series", query(Order::TileMajor));
    let tiles = drain(&mut tile_major);
    assert_eq!(&positions(&tiles)[..5], &[(0, 10, 0), (10, 20, 0), (20, 30, 0), (30, 40, 0), (0, 10, 1)]);

    // tile 3 of raster 2 starts at dataset pixel (2, 2)
    let (info, raster) = &tiles[14];
    assert_eq!((info.temporal.t1, info.tile_index), (20, 3));
    assert_eq!(raster.get(0, 0), cell(2, 2, 2));
    assert_eq!(raster.get(1, 1), cell(2, 3, 3));
}

#[test]
fn source_pads_tiles_past_the_dataset_with_nodata() {
    let catalog = catalog();
    let mut q = query_over(0, 10, Order::TimeMajor);
    q.spatial.x2 = 6.0;
    q.resolution.x = 6;
    let mut op = source(&catalog, "series", q);
    let tiles = drain(&mut op);
    assert_eq!(tiles.len(), 6);
    let (info, raster) = &tiles[2];
    assert_eq!(info.tile_index, 2);
    assert!(info.only_nodata);
    assert!(raster.all_nodata(NODATA));
}

#[test]
fn lifecycle_is_enforced() {
    let catalog = catalog();
    let mut op = source(&catalog, "series", query(Order::TimeMajor));
    assert_eq!(op.state(), OpState::Uninitialized);
    assert!(matches!(op.next_descriptor(), Err(Error::State(_))));
    assert!(matches!(op.get_descriptor(0), Err(Error::State(_))));
    assert!(matches!(op.skip_current_raster(1), Err(Error::State(_))));

    op.initialize().unwrap();
    assert_eq!(op.state(), OpState::Initialized);
    assert!(matches!(op.initialize(), Err(Error::State(_))));

    assert!(op.next_descriptor().unwrap().into_tile().is_some());
    assert_eq!(op.state(), OpState::Iterating);
    while !op.next_descriptor().unwrap().is_end() {}
    assert_eq!(op.state(), OpState::Exhausted);
    assert!(op.next_descriptor().unwrap().is_end());
    assert!(op.get_descriptor(0).unwrap().is_none());
    op.skip_current_tile(3).unwrap();
}

#[test]
fn get_descriptor_rejects_tiles_outside_the_grid() {
    let catalog = catalog();
    let mut op = source(&catalog, "series", query(Order::TimeMajor));
    op.initialize().unwrap();
    assert!(matches!(op.get_descriptor(4), Err(Error::Geometry(_))));
}

#[test]
fn order_changer_transposes_without_changing_tiles() {
    let catalog = catalog();
    let direct = drain(&mut source(&catalog, "series", query(Order::TileMajor)));

    let input = source(&catalog, "series", query(Order::TimeMajor));
    let mut changed = build(
        &catalog,
        OperatorKind::OrderChanger,
        json!({}),
        query(Order::TileMajor),
        vec![input],
    );
    let transposed = drain(&mut changed);
    assert_eq!(positions(&transposed), positions(&direct));
    for ((_, a), (_, b)) in transposed.iter().zip(&direct) {
        assert_eq!(a.to_f64_vec(), b.to_f64_vec());
    }
    assert!(transposed.iter().all(|(i, _)| i.order == Order::TileMajor));
}

#[test]
fn order_changer_to_time_major_uses_random_access() {
    let catalog = catalog();
    let direct = drain(&mut source(&catalog, "series", query(Order::TimeMajor)));

    let input = source(&catalog, "series", query(Order::TileMajor));
    let mut changed = build(
        &catalog,
        OperatorKind::OrderChanger,
        json!(null),
        query(Order::TimeMajor),
        vec![input],
    );
    let out = drain(&mut changed);
    assert_eq!(positions(&out), positions(&direct));
    assert_eq!(out[6].1.to_f64_vec(), direct[6].1.to_f64_vec());
}

#[test]
fn order_changer_twice_is_the_identity() {
    let catalog = catalog();
    let direct = drain(&mut source(&catalog, "series", query(Order::TimeMajor)));

    let inner = build(
        &catalog,
        OperatorKind::OrderChanger,
        json!({}),
        query(Order::TileMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    let mut outer = build(
        &catalog,
        OperatorKind::OrderChanger,
        json!({}),
        query(Order::TimeMajor),
        vec![inner],
    );
    let out = drain(&mut outer);
    assert_eq!(positions(&out), positions(&direct));
    for ((_, a), (_, b)) in out.iter().zip(&direct) {
        assert_eq!(a.to_f64_vec(), b.to_f64_vec());
    }
}

#[test]
fn order_changer_rejects_inputs_past_the_materialization_limit() {
    let catalog = catalog();
    let mut changed = build(
        &catalog,
        OperatorKind::OrderChanger,
        json!({ "max_materialized_tiles": 5 }),
        query(Order::TileMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    let err = changed.initialize().unwrap_err();
    assert!(err.is_config(), "{err}");
}

fn aggregate(function: &str, bucket: serde_json::Value) -> Vec<(rasq_core::tile::TileDescriptorInfo, rasq_core::raster::RasterBuffer)> {
    let catalog = catalog();
    let mut params = json!({ "function": function });
    if !bucket.is_null() {
        params["bucket"] = bucket;
    }
    let mut op = build(
        &catalog,
        OperatorKind::Aggregator,
        params,
        query(Order::TileMajor),
        vec![source(&catalog, "series", query(Order::TileMajor))],
    );
    drain(&mut op)
}

#[test]
fn aggregator_folds_the_whole_window_per_tile() {
    // raster r holds 100*r + pixel index
    let expect = |function: &str, i: f64| match function {
        "sum" => 600.0 + 4.0 * i,
        "mean" => 150.0 + i,
        "min" => i,
        _ => 300.0 + i,
    };
    for function in ["sum", "mean", "min", "max"] {
        let tiles = aggregate(function, json!(null));
        assert_eq!(positions(&tiles), vec![(0, 40, 0), (0, 40, 1), (0, 40, 2), (0, 40, 3)]);
        for (info, raster) in &tiles {
            for y in 0..2 {
                for x in 0..2 {
                    let (gx, gy) = global(info.tile_index, x, y);
                    let i = (gy * 4 + gx) as f64;
                    assert_eq!(raster.get(x, y), expect(function, i), "{function} tile {}", info.tile_index);
                }
            }
        }
    }
}

#[test]
fn aggregator_buckets_restart_per_tile() {
    let tiles = aggregate("sum", json!({ "unit": "second", "length": 20 }));
    assert_eq!(
        positions(&tiles),
        vec![
            (0, 20, 0),
            (20, 40, 0),
            (0, 20, 1),
            (20, 40, 1),
            (0, 20, 2),
            (20, 40, 2),
            (0, 20, 3),
            (20, 40, 3),
        ]
    );
    // tile 0 cell (0, 0) is dataset pixel 0
    assert_eq!(tiles[0].1.get(0, 0), cell(0, 0, 0) + cell(1, 0, 0));
    assert_eq!(tiles[1].1.get(0, 0), cell(2, 0, 0) + cell(3, 0, 0));
}

#[test]
fn aggregator_refuses_time_major_input() {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::Aggregator,
        json!({ "function": "sum" }),
        query(Order::TileMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    assert!(op.initialize().unwrap_err().is_config());
}

#[test]
fn cumulative_sum_is_a_running_prefix() {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::CumulativeSum,
        json!({}),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    let tiles = drain(&mut op);
    assert_eq!(tiles.len(), 16);
    for (info, raster) in &tiles {
        let r = (info.temporal.t1 / 10) as usize;
        let (gx, gy) = global(info.tile_index, 1, 0);
        let expected: f64 = (0..=r).map(|k| cell(k, gx, gy)).sum();
        assert_eq!(raster.get(1, 0), expected, "raster {r} tile {}", info.tile_index);
    }
}

#[test]
fn cumulative_sum_keeps_folding_across_skipped_rasters() {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::CumulativeSum,
        json!({}),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    op.initialize().unwrap();
    let first = op.next_descriptor().unwrap().into_tile().unwrap();
    assert_eq!(first.info().temporal.t1, 0);
    op.skip_current_raster(1).unwrap();
    let next = op.next_descriptor().unwrap().into_tile().unwrap();
    assert_eq!((next.info().temporal.t1, next.info().tile_index), (10, 0));
    let raster = next.evaluate().unwrap();
    assert_eq!(raster.get(0, 0), cell(0, 0, 0) + cell(1, 0, 0));
}

#[test]
fn convolution_reads_across_tile_borders() {
    let catalog = catalog();
    let q = query_over(0, 10, Order::TimeMajor);
    let mut op = build(
        &catalog,
        OperatorKind::Convolution,
        json!({}),
        q,
        vec![source(&catalog, "series", q)],
    );
    let tiles = drain(&mut op);
    assert_eq!(tiles.len(), 4);

    let value = |x: i64, y: i64| -> f64 {
        if (0..4).contains(&x) && (0..4).contains(&y) {
            cell(0, x as usize, y as usize)
        } else {
            0.0
        }
    };
    for (info, raster) in &tiles {
        for y in 0..2 {
            for x in 0..2 {
                let (gx, gy) = global(info.tile_index, x, y);
                let (gx, gy) = (gx as i64, gy as i64);
                let expected = 4.0 * value(gx, gy)
                    - (value(gx + 1, gy - 1) + value(gx - 1, gy - 1) + value(gx + 1, gy + 1) + value(gx - 1, gy + 1));
                assert_eq!(raster.get(x, y), expected, "tile {} cell ({x}, {y})", info.tile_index);
            }
        }
    }
    // corner pixel (0, 0) only sees its south-east diagonal
    assert_eq!(tiles[0].1.get(0, 0), 4.0 * cell(0, 0, 0) - cell(0, 1, 1));
    // interior pixel (1, 1) of tile 0 reads pixel (2, 2) from tile 3
    assert_eq!(
        tiles[0].1.get(1, 1),
        4.0 * cell(0, 1, 1) - (cell(0, 2, 0) + cell(0, 0, 0) + cell(0, 2, 2) + cell(0, 0, 2))
    );
}

#[test]
fn temporal_overlap_joins_on_the_interval_intersection() {
    let mut catalog = rasq_io::Catalog::new();
    catalog.register("left", Arc::new(constant("left", 0, 10, 10.0)));
    catalog.register("right", Arc::new(constant("right", 5, 15, 3.0)));
    let q = query_over(0, 20, Order::TimeMajor);
    let mut op = build(
        &catalog,
        OperatorKind::TemporalOverlap,
        json!({ "combiner": "subtract" }),
        q,
        vec![source(&catalog, "left", q), source(&catalog, "right", q)],
    );
    let tiles = drain(&mut op);
    assert_eq!(positions(&tiles), vec![(5, 10, 0), (5, 10, 1), (5, 10, 2), (5, 10, 3)]);
    assert!(tiles.iter().all(|(_, r)| r.to_f64_vec() == vec![7.0; 4]));
}

#[test]
fn temporal_overlap_drops_disjoint_rasters() {
    let mut catalog = rasq_io::Catalog::new();
    catalog.register("left", Arc::new(constant("left", 0, 10, 1.0)));
    catalog.register("right", Arc::new(constant("right", 10, 20, 2.0)));
    let q = query_over(0, 20, Order::TimeMajor);
    let mut op = build(
        &catalog,
        OperatorKind::TemporalOverlap,
        json!({}),
        q,
        vec![source(&catalog, "left", q), source(&catalog, "right", q)],
    );
    assert!(drain(&mut op).is_empty());
}

#[test]
fn sampler_repeats_a_long_raster_for_every_sample() {
    let mut catalog = rasq_io::Catalog::new();
    catalog.register("long", Arc::new(constant("long", 0, 30, 4.0)));
    let q = query_over(0, 30, Order::TimeMajor);
    let mut op = build(
        &catalog,
        OperatorKind::Sampler,
        json!({ "step": { "unit": "second", "length": 10 } }),
        q,
        vec![source(&catalog, "long", q)],
    );
    let tiles = drain(&mut op);
    let expected: Vec<_> = [0, 10, 20]
        .iter()
        .flat_map(|&t| (0..4).map(move |k| (t, t + 10, k)))
        .collect();
    assert_eq!(positions(&tiles), expected);
    assert!(tiles.iter().all(|(_, r)| r.to_f64_vec() == vec![4.0; 4]));
}

#[test]
fn sampler_skips_rasters_between_samples() {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::Sampler,
        json!({ "step": { "unit": "second", "length": 20 } }),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    let tiles = drain(&mut op);
    assert_eq!(tiles.len(), 8);
    assert_eq!((tiles[0].0.temporal.t1, tiles[0].0.temporal.t2), (0, 20));
    assert_eq!(tiles[0].1.get(0, 0), cell(0, 0, 0));
    assert_eq!((tiles[4].0.temporal.t1, tiles[4].0.temporal.t2), (20, 40));
    assert_eq!(tiles[4].1.get(0, 0), cell(2, 0, 0));
}

#[test]
fn raster_cache_evaluates_each_tile_once() {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::RasterCache,
        json!({}),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    op.initialize().unwrap();
    let first = op.next_descriptor().unwrap().into_tile().unwrap();
    let again = op.get_descriptor(0).unwrap().unwrap();
    let a = first.evaluate().unwrap();
    let b = again.evaluate().unwrap();
    assert!(a.shares_storage(&b));

    let stats = op.cache_stats().unwrap();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[test]
fn cache_simulator_counts_without_sharing() {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::CacheSimulator,
        json!(null),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    op.initialize().unwrap();
    let first = op.next_descriptor().unwrap().into_tile().unwrap();
    let again = op.get_descriptor(0).unwrap().unwrap();
    assert!(!first.evaluate().unwrap().shares_storage(&again.evaluate().unwrap()));
    op.get_descriptor(1).unwrap();
    let stats = op.cache_stats().unwrap();
    assert_eq!((stats.hits, stats.misses), (1, 2));
}

#[test]
fn skipping_matches_pulling_and_discarding() {
    let catalog = catalog();
    let all = positions(&drain(&mut source(&catalog, "series", query(Order::TimeMajor))));

    let mut op = build(
        &catalog,
        OperatorKind::CumulativeSum,
        json!({}),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    op.initialize().unwrap();
    let mut seen = Vec::new();
    let mut step = 0;
    loop {
        match op.next_descriptor().unwrap() {
            Pull::Tile(d) => {
                let i = d.info();
                seen.push((i.temporal.t1, i.temporal.t2, i.tile_index));
            }
            Pull::End => break,
        }
        step += 1;
        if step == 2 {
            // leaves tiles 2 and 3 of raster 0 behind
            op.skip_current_raster(1).unwrap();
        }
        if step == 5 {
            // moves past tile 2 and then tile 3 of raster 1
            op.skip_current_tile(2).unwrap();
        }
    }
    let expected: Vec<_> = all
        .iter()
        .copied()
        .filter(|p| !matches!(p, (0, 10, 2) | (0, 10, 3) | (10, 20, 3)))
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn source_skip_raster_equals_pulling_past_it() {
    let catalog = catalog();
    let mut whole = query(Order::TimeMajor);
    whole.tile_resolution = Resolution::new(4, 4);

    let mut plain = source(&catalog, "series", whole);
    plain.initialize().unwrap();
    plain.next_descriptor().unwrap();
    let second = plain.next_descriptor().unwrap().into_tile().unwrap();

    let mut skipping = source(&catalog, "series", whole);
    skipping.initialize().unwrap();
    skipping.skip_current_raster(1).unwrap();
    let next = skipping.next_descriptor().unwrap().into_tile().unwrap();
    assert_eq!(next.info(), second.info());
    assert_eq!(next.evaluate().unwrap().to_f64_vec(), second.evaluate().unwrap().to_f64_vec());

    // mid-raster, the rest of the raster is left behind
    let mut tiled = source(&catalog, "series", query(Order::TimeMajor));
    tiled.initialize().unwrap();
    tiled.next_descriptor().unwrap();
    tiled.next_descriptor().unwrap();
    tiled.skip_current_raster(1).unwrap();
    let d = tiled.next_descriptor().unwrap().into_tile().unwrap();
    assert_eq!((d.info().temporal.t1, d.info().tile_index), (10, 0));

    // tile-major: each descriptor is a whole raster of its tile, so the skip
    // lands on the next one and a count of 2 drops one more
    let mut tile_major = source(&catalog, "series", query(Order::TileMajor));
    tile_major.initialize().unwrap();
    tile_major.next_descriptor().unwrap();
    tile_major.skip_current_raster(1).unwrap();
    let d = tile_major.next_descriptor().unwrap().into_tile().unwrap();
    assert_eq!((d.info().temporal.t1, d.info().tile_index), (10, 0));
    tile_major.skip_current_raster(2).unwrap();
    let d = tile_major.next_descriptor().unwrap().into_tile().unwrap();
    assert_eq!((d.info().temporal.t1, d.info().tile_index), (30, 0));
}

#[test]
fn aggregator_random_access_matches_the_main_iteration() {
    let bucket = json!({ "unit": "second", "length": 20 });
    let drained = aggregate("sum", bucket.clone());

    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::Aggregator,
        json!({ "function": "sum", "bucket": bucket }),
        query(Order::TileMajor),
        vec![source(&catalog, "series", query(Order::TileMajor))],
    );
    op.initialize().unwrap();

    // active bucket [0, 20) of tile 0; drained holds two buckets per tile
    op.next_descriptor().unwrap().into_tile().unwrap();
    for tile in 0..4 {
        let d = op.get_descriptor(tile).unwrap().unwrap();
        let (info, expected) = &drained[2 * tile];
        assert_eq!((d.info().temporal, d.info().tile_index), (info.temporal, info.tile_index));
        assert_eq!(d.evaluate().unwrap().to_f64_vec(), expected.to_f64_vec(), "tile {tile}");
    }

    let second = op.next_descriptor().unwrap().into_tile().unwrap();
    assert_eq!(second.info().temporal, TemporalExtent::new(20, 40).unwrap());
    let d = op.get_descriptor(2).unwrap().unwrap();
    assert_eq!(d.evaluate().unwrap().to_f64_vec(), drained[5].1.to_f64_vec());
}

#[test]
fn cumulative_sum_random_access_replays_the_prefix() {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::CumulativeSum,
        json!({}),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    op.initialize().unwrap();
    for _ in 0..6 {
        op.next_descriptor().unwrap().into_tile().unwrap();
    }
    let d = op.get_descriptor(3).unwrap().unwrap();
    assert_eq!((d.info().temporal.t1, d.info().tile_index), (10, 3));
    let raster = d.evaluate().unwrap();
    for y in 0..2 {
        for x in 0..2 {
            let (gx, gy) = global(3, x, y);
            assert_eq!(raster.get(x, y), cell(0, gx, gy) + cell(1, gx, gy));
        }
    }
}

#[test]
fn cumulative_sum_folds_queued_positions_on_late_evaluation() {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::CumulativeSum,
        json!({}),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    op.initialize().unwrap();
    let mut pulled = Vec::new();
    while let Pull::Tile(d) = op.next_descriptor().unwrap() {
        pulled.push(d);
    }
    assert_eq!(pulled.len(), 16);

    let mut pulled = pulled.into_iter();
    let early = pulled.next().unwrap();
    // last raster, tile 0: folds all four queued inputs of tile 0
    let last = pulled.nth(11).unwrap();
    assert_eq!((last.info().temporal.t1, last.info().tile_index), (30, 0));
    let expected: f64 = (0..4).map(|r| cell(r, 0, 0)).sum();
    assert_eq!(last.evaluate().unwrap().get(0, 0), expected);
    assert!(matches!(early.evaluate(), Err(Error::State(_))));
}

fn steps(name: &str) -> MemoryBackend {
    MemoryBackend::new(name, grid())
        .and_then(|b| b.with_values(TemporalExtent::new(0, 10)?, vec![1.0; 16]))
        .and_then(|b| b.with_values(TemporalExtent::new(10, 20)?, vec![2.0; 16]))
        .unwrap()
}

#[test]
fn temporal_overlap_replays_a_long_raster_against_short_ones() {
    let mut catalog = rasq_io::Catalog::new();
    catalog.register("long", Arc::new(constant("long", 0, 20, 10.0)));
    catalog.register("steps", Arc::new(steps("steps")));
    let q = query_over(0, 20, Order::TimeMajor);

    for (left, right) in [("long", "steps"), ("steps", "long")] {
        let mut op = build(
            &catalog,
            OperatorKind::TemporalOverlap,
            json!({ "combiner": "add" }),
            q,
            vec![source(&catalog, left, q), source(&catalog, right, q)],
        );
        let tiles = drain(&mut op);
        let expected: Vec<_> = [(0, 10), (10, 20)]
            .iter()
            .flat_map(|&(t1, t2)| (0..4).map(move |k| (t1, t2, k)))
            .collect();
        assert_eq!(positions(&tiles), expected, "{left} with {right}");
        for (info, raster) in &tiles {
            let value = if info.temporal.t1 == 0 { 11.0 } else { 12.0 };
            assert_eq!(raster.to_f64_vec(), vec![value; 4], "{left} with {right}");
        }
    }
}

fn with_gap(name: &str) -> MemoryBackend {
    let mut first = vec![2.0; 16];
    first[0] = NODATA;
    MemoryBackend::new(name, grid())
        .and_then(|b| b.with_values(TemporalExtent::new(0, 10)?, first))
        .and_then(|b| b.with_values(TemporalExtent::new(10, 20)?, vec![4.0; 16]))
        .unwrap()
}

#[test]
fn folds_skip_nodata_cells() {
    let mut catalog = rasq_io::Catalog::new();
    catalog.register("gap", Arc::new(with_gap("gap")));

    let q = query_over(0, 20, Order::TileMajor);
    for (function, tile0) in [("mean", [4.0, 3.0, 3.0, 3.0]), ("sum", [4.0, 6.0, 6.0, 6.0])] {
        let mut op = build(
            &catalog,
            OperatorKind::Aggregator,
            json!({ "function": function }),
            q,
            vec![source(&catalog, "gap", q)],
        );
        let tiles = drain(&mut op);
        assert_eq!(tiles[0].1.to_f64_vec(), tile0.to_vec(), "{function}");
    }

    let q = query_over(0, 20, Order::TimeMajor);
    let mut op = build(
        &catalog,
        OperatorKind::CumulativeSum,
        json!({}),
        q,
        vec![source(&catalog, "gap", q)],
    );
    let tiles = drain(&mut op);
    let (info, first) = &tiles[0];
    assert!(is_nodata(first.get(0, 0), info.nodata));
    assert_eq!(first.get(1, 0), 2.0);
    let (info, second) = &tiles[4];
    assert_eq!((info.temporal.t1, info.tile_index), (10, 0));
    assert_eq!(second.get(0, 0), 4.0);
    assert_eq!(second.get(1, 0), 6.0);
}

fn sampled(params: serde_json::Value, order: Order) -> Vec<(i64, i64, usize)> {
    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::Sampler,
        params,
        query(order),
        vec![source(&catalog, "series", query(order))],
    );
    positions(&drain(&mut op))
}

#[test]
fn sampler_keeps_every_other_raster_time_major() {
    let once = sampled(json!({ "skip": 2 }), Order::TimeMajor);
    let expected: Vec<_> = [0, 30]
        .iter()
        .flat_map(|&t| (0..4).map(move |k| (t, t + 10, k)))
        .collect();
    assert_eq!(once, expected);

    let catalog = catalog();
    let mut op = build(
        &catalog,
        OperatorKind::Sampler,
        json!({ "skip": 1, "repeat": 1 }),
        query(Order::TimeMajor),
        vec![source(&catalog, "series", query(Order::TimeMajor))],
    );
    let tiles = drain(&mut op);
    let expected: Vec<_> = [0, 0, 20, 20]
        .iter()
        .flat_map(|&t| (0..4).map(move |k| (t, t + 10, k)))
        .collect();
    assert_eq!(positions(&tiles), expected);
    // the repeat carries the same cells as the first send
    assert_eq!(tiles[5].1.to_f64_vec(), tiles[1].1.to_f64_vec());
    assert_eq!(tiles[8].1.get(0, 0), cell(2, 0, 0));
}

#[test]
fn sampler_keeps_every_other_raster_tile_major() {
    let tiles = sampled(json!({ "skip": 1, "repeat": 1 }), Order::TileMajor);
    let expected: Vec<_> = (0..4)
        .flat_map(|k| [0, 0, 20, 20].into_iter().map(move |t| (t, t + 10, k)))
        .collect();
    assert_eq!(tiles, expected);

    let mut time_major = sampled(json!({ "skip": 1, "repeat": 1 }), Order::TimeMajor);
    let mut tile_major = tiles;
    time_major.sort();
    tile_major.sort();
    assert_eq!(time_major, tile_major);
}

#[test]
fn sampler_needs_exactly_one_mode() {
    let catalog = catalog();
    for params in [
        json!({}),
        json!({ "skip": 1, "step": { "unit": "second", "length": 10 } }),
        json!({ "step": { "unit": "second", "length": 10 }, "repeat": 2 }),
    ] {
        let mut op = build(
            &catalog,
            OperatorKind::Sampler,
            params.clone(),
            query(Order::TimeMajor),
            vec![source(&catalog, "series", query(Order::TimeMajor))],
        );
        assert!(op.initialize().unwrap_err().is_config(), "{params}");
    }
}

#[test]
fn convolution_is_the_same_in_both_orders() {
    let catalog = catalog();
    let run = |order: Order| {
        let mut op = build(
            &catalog,
            OperatorKind::Convolution,
            json!({}),
            query(order),
            vec![source(&catalog, "series", query(order))],
        );
        let mut tiles: Vec<_> = drain(&mut op)
            .into_iter()
            .map(|(i, r)| ((i.temporal.t1, i.tile_index), r.to_f64_vec()))
            .collect();
        tiles.sort_by_key(|(p, _)| *p);
        tiles
    };
    let time_major = run(Order::TimeMajor);
    assert_eq!(time_major.len(), 16);
    assert_eq!(time_major, run(Order::TileMajor));
}

#[test]
fn shared_tile_reports_the_original_failure_every_time() {
    let catalog = catalog();
    let mut op = source(&catalog, "series", query(Order::TimeMajor));
    op.initialize().unwrap();
    let info = *op.next_descriptor().unwrap().into_tile().unwrap().info();

    // one cell where the tile has four
    let short = RasterBuffer::from_vec(Resolution::new(1, 1), vec![0.0f64]).unwrap();
    let shared = SharedTile::new(TileDescriptor::new(info, Payload::Buffer(short)));
    for _ in 0..2 {
        assert!(matches!(shared.descriptor().evaluate(), Err(Error::Consistency(_))));
    }
    assert!(!shared.is_ready());
}
