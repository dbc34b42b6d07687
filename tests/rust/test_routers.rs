/// Integration tests for routers driving real servers.
use cachesim_core::server::{Server, ServerId};
use cachesim_routing::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn servers(range: std::ops::Range<u32>) -> Vec<Arc<Server>> {
    range.map(|id| Arc::new(Server::new(id, 1, 1))).collect()
}

fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("resource-{i:04}")).collect()
}

#[test]
fn test_round_robin_visits_every_server_once_per_cycle() {
    let rr = RoundRobin::new();
    rr.set_servers(servers(0..6));
    for _ in 0..3 {
        let cycle: HashSet<ServerId> = (0..6)
            .map(|i| rr.route(&RequestInfo::new(i, "k")).id())
            .collect();
        assert_eq!(cycle.len(), 6);
    }
}

#[test]
fn test_hashed_is_stable_until_resize() {
    let hashed = Hashed::new();
    let pool = servers(0..16);
    hashed.set_servers(pool[..8].to_vec());

    let keys = keys(200);
    let before: Vec<ServerId> = keys
        .iter()
        .map(|k| hashed.route(&RequestInfo::new(0, k)).id())
        .collect();
    let again: Vec<ServerId> = keys
        .iter()
        .map(|k| hashed.route(&RequestInfo::new(1, k)).id())
        .collect();
    assert_eq!(before, again);

    hashed.set_servers(pool);
    let after: Vec<ServerId> = keys
        .iter()
        .map(|k| hashed.route(&RequestInfo::new(2, k)).id())
        .collect();
    let moved = before.iter().zip(&after).filter(|(a, b)| a != b).count();
    assert!(moved > 0);
}

#[test]
fn test_bounded_load_sends_new_keys_to_added_servers() {
    // 4 servers, R = 8, C = 1.25: each server accepts keys while it holds < 20.
    let pool = servers(0..8);
    let router = BoundedLoad::new(1.25, 8);
    router.set_servers(pool[..4].to_vec());
    for key in keys(80) {
        assert!(!router.select(&key).saturated);
    }
    assert_eq!(router.occupancy_counts(), vec![20, 20, 20, 20]);

    // Doubling halves the bound to 10, so the old servers are over it.
    router.set_servers(pool);
    for i in 0..40 {
        let sel = router.select(&format!("fresh-{i:02}"));
        assert!(!sel.saturated);
        assert!(sel.server.id() >= 4, "fresh key landed on {}", sel.server.id());
    }
    assert_eq!(
        router.occupancy_counts(),
        vec![20, 20, 20, 20, 10, 10, 10, 10]
    );
}

#[test]
fn test_bounded_load_never_selects_loaded_server_when_unsaturated() {
    let router = BoundedLoad::new(1.25, 256);
    router.set_servers(servers(0..8));
    for key in keys(2000) {
        let sel = router.select(&key);
        if !sel.saturated {
            assert!(sel.load < 1.0);
        }
    }
    assert!(router.custom_metrics()["avg_probe_length"] >= 1.0);
}

#[test]
fn test_concurrent_routes_during_republish_return_members() {
    let old = servers(0..4);
    let new = servers(100..108);
    let valid: HashSet<ServerId> = old.iter().chain(&new).map(|s| s.id()).collect();

    for name in available_routers() {
        let router: Arc<dyn Router<Server>> =
            Arc::from(router_by_name::<Server>(name, &RouterParams::default()).unwrap());
        router.set_servers(old.clone());

        let workers: Vec<_> = (0..4)
            .map(|t| {
                let router = Arc::clone(&router);
                let valid = valid.clone();
                thread::spawn(move || {
                    for i in 0..5_000u64 {
                        let key = format!("t{t}-{}", i % 97);
                        let id = router.route(&RequestInfo::new(i, &key)).id();
                        assert!(valid.contains(&id), "{id} not in any registry");
                    }
                })
            })
            .collect();

        for i in 0..200 {
            let next = if i % 2 == 0 { new.clone() } else { old.clone() };
            router.set_servers(next);
        }
        for w in workers {
            w.join().unwrap();
        }
    }
}
