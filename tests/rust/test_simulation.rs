/// End-to-end tests for the simulation coordinator.
use cachesim_core::config::SimConfig;
use cachesim_core::metrics::miss_rate_timeline;
use cachesim_core::{Phase, Simulation};
use cachesim_routing::RouterKind;
use std::time::Duration;

fn e2e_config(kind: RouterKind) -> SimConfig {
    SimConfig::default()
        .with_name("e2e")
        .with_duration(Duration::from_secs(2))
        .with_servers(4)
        .with_workers_per_server(4)
        .with_resources(64)
        .with_avg_miss_duration(Duration::from_millis(10))
        .with_router(kind)
        .with_request_limit(300_000)
}

#[test]
fn test_round_robin_end_to_end() {
    let mut sim = Simulation::new(e2e_config(RouterKind::RoundRobin)).unwrap();
    sim.run().unwrap();
    assert!(sim.wait_for_actors(Duration::from_secs(5)));

    let report = sim.report();
    assert_eq!(report.router, "round_robin");
    assert!(report.completed_requests > 0);
    assert_eq!(
        report.completed_requests + report.not_routed + report.not_completed,
        report.total_requests
    );
    assert!(report.duration_ms >= 2000.0);
    assert!(report.requests_per_sec > 0.0);
    assert_eq!(report.servers.len(), 4);

    // Every server sees the whole key space under round robin.
    assert!(report.cache_misses >= 1);
    assert!(report.cache_misses <= 64 * 4 * 4);

    // Hits add no latency, so only misses are capped by the worker pool:
    // servers * workers / avg_miss = 16 / 10ms.
    let miss_per_sec = report.cache_misses as f64 / (report.duration_ms / 1000.0);
    assert!(miss_per_sec <= 1600.0, "miss throughput {miss_per_sec}");

    // Caches warm up: misses concentrate at the start of the run.
    let timeline = miss_rate_timeline(&sim.requests(), 10);
    let first = timeline[0];
    let last = *timeline.last().unwrap();
    assert!(first > 0.0, "timeline = {timeline:?}");
    assert!(last <= first, "timeline = {timeline:?}");
}

#[test]
fn test_timestamps_are_ordered() {
    let config = e2e_config(RouterKind::Hashed)
        .with_duration(Duration::from_millis(500))
        .with_request_limit(20_000);
    let mut sim = Simulation::new(config).unwrap();
    sim.run().unwrap();
    assert!(sim.wait_for_actors(Duration::from_secs(5)));

    for req in sim.requests() {
        let (Some(arrival), Some(routed)) = (req.arrival(), req.routed()) else {
            continue;
        };
        assert!(arrival <= routed);
        if let Some(completed) = req.completed() {
            assert!(routed <= completed);
            assert!(req.served_by().is_some());
        }
    }
}

#[test]
fn test_hashed_misses_each_key_on_one_server() {
    let config = e2e_config(RouterKind::Hashed)
        .with_duration(Duration::from_millis(1500))
        .with_request_limit(50_000);
    let mut sim = Simulation::new(config).unwrap();
    sim.run().unwrap();
    assert!(sim.wait_for_actors(Duration::from_secs(5)));

    let report = sim.report();
    assert!(report.completed_requests > 0);
    // Each key lives on a single server; only racing workers add misses.
    assert!(report.cache_misses <= 64 * 4);
    let cached: usize = report.servers.iter().map(|s| s.cached_keys).sum();
    assert!(cached <= 64);
}

#[test]
fn test_bounded_load_reports_probe_metrics() {
    let config = e2e_config(RouterKind::BoundedLoad)
        .with_duration(Duration::from_millis(500))
        .with_request_limit(20_000);
    let report = cachesim_core::run_simulation(config).unwrap();
    assert_eq!(report.router, "bounded_load");
    assert!(report.custom_metrics["routes"] >= report.total_requests as f64 - 1.0);
    assert!(report.custom_metrics["avg_probe_length"] >= 1.0);
}

#[test]
fn test_immediate_shutdown() {
    let mut sim = Simulation::new(e2e_config(RouterKind::RoundRobin)).unwrap();
    sim.initialize().unwrap();
    sim.start().unwrap();
    sim.stop();
    assert_eq!(sim.phase(), Phase::Stopped);
    assert!(sim.wait_for_actors(Duration::from_millis(100)));

    let report = sim.report();
    assert_eq!(
        report.completed_requests + report.not_routed + report.not_completed,
        report.total_requests
    );
}

#[test]
fn test_stop_before_start_routes_nothing() {
    let mut sim = Simulation::new(e2e_config(RouterKind::RoundRobin)).unwrap();
    sim.initialize().unwrap();
    sim.stop();
    assert!(sim.start().is_err());
    assert!(sim.wait_for_actors(Duration::from_millis(100)));

    let report = sim.report();
    assert_eq!(report.total_requests, 0);
    assert_eq!(report.not_routed, report.total_requests);
    assert_eq!(report.completed_requests, 0);
}

#[test]
fn test_nothing_completes_after_stop() {
    for seed in 0..5 {
        let config = SimConfig::default()
            .with_seed(seed)
            .with_duration(Duration::from_millis(300))
            .with_servers(4)
            .with_workers_per_server(4)
            .with_resources(64)
            .with_avg_miss_duration(Duration::from_millis(1))
            .with_router(RouterKind::Hashed);
        let mut sim = Simulation::new(config).unwrap();
        sim.run().unwrap();
        assert!(sim.wait_for_actors(Duration::from_secs(5)));

        let stopped = sim.stopped_at().unwrap();
        let late = sim
            .requests()
            .iter()
            .filter(|r| r.completed().is_some_and(|c| c > stopped))
            .count();
        assert_eq!(late, 0, "seed {seed}: {late} requests completed after stop");
    }
}

#[test]
fn test_compare_routers_runs_each() {
    let config = e2e_config(RouterKind::RoundRobin)
        .with_duration(Duration::from_millis(200))
        .with_request_limit(5_000);
    let kinds = [RouterKind::RoundRobin, RouterKind::Hashed, RouterKind::BoundedLoad];
    let reports = cachesim_core::compare_routers(&config, &kinds).unwrap();
    let names: Vec<&str> = reports.iter().map(|r| r.router.as_str()).collect();
    assert_eq!(names, vec!["round_robin", "hashed", "bounded_load"]);
}
