use criterion::{criterion_group, criterion_main, Criterion};
use rasq_core::config::EngineConfig;
use rasq_exec::{Digest, Engine};
use rasq_io::Catalog;
use rasq_planner::plan_yaml;

/// 256x256 ramp, one raster per day over January, cut into 64x64 tiles.
fn query_yaml(order: &str, root: &str) -> String {
    format!(
        r#"
query:
  start: "2024-01-01"
  end: "2024-02-01"
  extent: {{ x1: 0.0, y1: 0.0, x2: 256.0, y2: 256.0 }}
  resolution: {{ x: 256, y: 256 }}
  tile_resolution: {{ x: 64, y: 64 }}
  order: {order}
datasets:
  ramp:
    kind: synthetic
    grid:
      origin: {{ x: 0.0, y: 0.0 }}
      scale: {{ x: 1.0, y: 1.0 }}
      resolution: {{ x: 256, y: 256 }}
      pixel_type: f32
    start: "2024-01-01"
    end: "2024-02-01"
    step: {{ unit: day }}
    pattern: {{ type: ramp, dx: 1.0, dy: 0.5, dt: 0.001 }}
{root}"#
    )
}

fn bench_query(c: &mut Criterion, name: &str, yaml: &str) {
    let (doc, program) = plan_yaml(yaml).unwrap();
    let config = EngineConfig::default();
    let catalog = Catalog::from_specs(&doc.datasets, &config).unwrap();
    let mut engine = Engine::new(config);
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut digest = Digest::new();
            engine.run(&program, &catalog, &mut digest).unwrap()
        })
    });
}

fn bench_pipelines(c: &mut Criterion) {
    let source = r#"
    - operator: source
      params: { dataset: ramp }"#;

    bench_query(
        c,
        "aggregator_mean_weekly",
        &query_yaml(
            "tile_major",
            &format!("root:\n  operator: aggregator\n  params: {{ function: mean, bucket: {{ unit: day, length: 7 }} }}\n  inputs:{source}\n"),
        ),
    );
    bench_query(
        c,
        "cumulative_sum_time_major",
        &query_yaml(
            "time_major",
            &format!("root:\n  operator: cumulative_sum\n  inputs:{source}\n"),
        ),
    );
    bench_query(
        c,
        "order_changer_materialize",
        &query_yaml(
            "tile_major",
            "root:\n  operator: order_changer\n  inputs:\n    - operator: raster_cache\n      inputs:\n        - operator: source\n          params: { dataset: ramp }\n",
        ),
    );
}

criterion_group!(pipelines, bench_pipelines);
criterion_main!(pipelines);
