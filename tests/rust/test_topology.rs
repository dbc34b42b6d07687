/// Integration tests for live topology changes.
use cachesim_core::config::SimConfig;
use cachesim_core::server::ServerId;
use cachesim_core::{Simulation, TopologyChange};
use cachesim_routing::RouterKind;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn paced_config(kind: RouterKind) -> SimConfig {
    SimConfig::default()
        .with_servers(8)
        .with_workers_per_server(16)
        .with_resources(64)
        .with_avg_miss_duration(Duration::from_millis(1))
        .with_arrival_interval(Duration::from_micros(100))
        .with_router(kind)
}

#[test]
fn test_doubling_servers_mid_run() {
    let config = paced_config(RouterKind::RoundRobin)
        .with_duration(Duration::from_secs(4))
        .with_event(Duration::from_secs(2), TopologyChange::DoubleServers);
    let mut sim = Simulation::new(config).unwrap();
    sim.run().unwrap();
    assert!(sim.wait_for_actors(Duration::from_secs(5)));

    assert_eq!(sim.servers().len(), 16);

    // Leave slack for the event thread to publish the new registry.
    let cutoff = sim.started_at().unwrap() + Duration::from_millis(2200);
    let served_after: HashSet<ServerId> = sim
        .requests()
        .iter()
        .filter(|r| r.routed().is_some_and(|t| t > cutoff))
        .filter_map(|r| r.served_by())
        .collect();
    assert_eq!(served_after.len(), 16, "served by {served_after:?}");

    let report = sim.report();
    assert_eq!(report.servers.len(), 16);
    assert!(report.servers.iter().all(|s| s.served > 0));
}

#[test]
fn test_removed_server_receives_no_new_requests() {
    let config = paced_config(RouterKind::Hashed)
        .with_duration(Duration::from_millis(1500))
        .with_event(Duration::from_millis(500), TopologyChange::RemoveRandomServer);
    let mut sim = Simulation::new(config).unwrap();
    sim.run().unwrap();
    assert!(sim.wait_for_actors(Duration::from_secs(5)));

    let remaining: HashSet<ServerId> = sim.servers().iter().map(|s| s.id()).collect();
    assert_eq!(remaining.len(), 7);
    let removed = (0..8).find(|id| !remaining.contains(id)).unwrap();

    let cutoff = sim.started_at().unwrap() + Duration::from_millis(700);
    for req in sim.requests() {
        if req.routed().is_some_and(|t| t > cutoff) {
            assert_ne!(req.served_by(), Some(removed));
        }
    }
}

#[test]
fn test_closure_event_sees_elapsed_time_and_updates_registry() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    let config = paced_config(RouterKind::RoundRobin).with_duration(Duration::from_millis(600));
    let mut sim = Simulation::new(config).unwrap();
    sim.add_event(Duration::from_millis(200), "shrink to two", move |topology| {
        *sink.lock().unwrap() = Some(topology.elapsed());
        topology.update(|servers| servers.truncate(2));
    })
    .unwrap();
    sim.run().unwrap();
    assert!(sim.wait_for_actors(Duration::from_secs(5)));

    let fired_at = seen.lock().unwrap().expect("event did not fire");
    assert!(fired_at > Duration::from_millis(200));
    let ids: Vec<ServerId> = sim.servers().iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn test_events_after_run_end_do_not_fire() {
    let config = paced_config(RouterKind::RoundRobin)
        .with_duration(Duration::from_millis(200))
        .with_event(Duration::from_secs(30), TopologyChange::DoubleServers);
    let mut sim = Simulation::new(config).unwrap();
    sim.run().unwrap();
    assert!(sim.wait_for_actors(Duration::from_secs(5)));
    assert_eq!(sim.servers().len(), 8);
}

#[test]
fn test_equal_offsets_fire_in_schedule_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let config = paced_config(RouterKind::RoundRobin).with_duration(Duration::from_millis(300));
    let mut sim = Simulation::new(config).unwrap();
    for label in ["a", "b", "c"] {
        let order = Arc::clone(&order);
        sim.add_event(Duration::from_millis(50), label, move |_| {
            order.lock().unwrap().push(label);
        })
        .unwrap();
    }
    sim.run().unwrap();
    assert!(sim.wait_for_actors(Duration::from_secs(5)));
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
}
