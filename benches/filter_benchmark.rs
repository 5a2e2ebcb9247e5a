use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geo::Point;
use run_tracker::config::{LocationFilterConfig, RouteConfig, SpeedConfig};
use run_tracker::filters::{LocationFilter, SpeedEstimator};
use run_tracker::models::{EventRoute, LocationSample, PathPoint, Run};
use run_tracker::services::RouteChecker;

const METERS_PER_DEGREE: f64 = 111_195.08;

/// A jittery northbound trace: 1 Hz samples at about 3 m/s.
fn trace(len: usize) -> Vec<LocationSample> {
    (0..len)
        .map(|i| {
            let jitter = if i % 7 == 0 { 0.00002 } else { 0.0 };
            LocationSample::new(
                45.0 + (i as f64 * 3.0) / METERS_PER_DEGREE + jitter,
                7.0,
                100.0,
                1000 * (i as i64 + 1),
            )
        })
        .collect()
}

fn benchmark_filters(c: &mut Criterion) {
    let samples = trace(3600);
    let mut group = c.benchmark_group("filters");

    group.bench_function("location_filter_hour", |b| {
        b.iter(|| {
            let mut filter = LocationFilter::new(LocationFilterConfig::default());
            samples
                .iter()
                .filter_map(|s| filter.filter(black_box(s)))
                .count()
        })
    });

    let points: Vec<PathPoint> = samples.iter().map(PathPoint::at).collect();
    group.bench_function("speed_estimator_hour", |b| {
        b.iter(|| {
            let mut speed = SpeedEstimator::new(SpeedConfig::default());
            points.iter().map(|p| speed.filter(black_box(p))).sum::<f64>()
        })
    });

    group.finish();
}

fn benchmark_route_check(c: &mut Criterion) {
    // 10 km northbound course with a waypoint every 100 m
    let waypoints: Vec<Point<f64>> = (0..=100)
        .map(|i| Point::new(7.0, 45.0 + (i as f64 * 100.0) / METERS_PER_DEGREE))
        .collect();
    let route = EventRoute {
        id: "bench".to_string(),
        name: "Bench".to_string(),
        waypoints,
        distance: 10_000.0,
        tolerance: 30.0,
    };
    let points: Vec<PathPoint> = trace(3000).iter().map(PathPoint::at).collect();

    c.bench_function("route_check_course", |b| {
        b.iter(|| {
            let mut checker = RouteChecker::new(route.clone(), RouteConfig::default());
            let mut run = Run::new("bench").for_event("bench");
            run.cur = Some(0);
            for p in &points {
                checker.check(black_box(p), 1000, &mut run);
            }
            run.cur
        })
    });
}

criterion_group!(benches, benchmark_filters, benchmark_route_check);
criterion_main!(benches);
