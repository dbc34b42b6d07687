/// Integration tests for server worker pools and their caches.
use cachesim_core::request::Request;
use cachesim_core::server::{HandleOutcome, Server};
use cachesim_core::signal::{ActorGroup, Shutdown};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn routed_request(id: u64, key: &str, work: Duration) -> Arc<Request> {
    let req = Arc::new(Request::new(id, Arc::from(key), work));
    req.mark_arrival();
    req.mark_routed();
    req
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

#[test]
fn test_same_key_twice_is_miss_then_hit() {
    let shutdown = Shutdown::new();
    let listener = shutdown.listener();
    let server = Server::new(1, 1, 1);

    let work = Duration::from_millis(10);
    let first = routed_request(0, "alpha", work);
    let second = routed_request(1, "alpha", work);
    assert_eq!(server.handle_request(&first, &listener), HandleOutcome::Miss);
    assert_eq!(server.handle_request(&second, &listener), HandleOutcome::Hit);

    assert!(first.work_latency().unwrap() >= work);
    assert!(second.work_latency().unwrap() < work);
    assert!(first.is_cache_miss() && !second.is_cache_miss());
    assert_eq!(server.cache().len(), 1);
}

#[test]
fn test_worker_pool_serves_through_queue() {
    let shutdown = Shutdown::new();
    let actors = ActorGroup::new();
    let listener = shutdown.listener();
    let server = Arc::new(Server::new(4, 4, 4));
    server.run(&listener, &actors).unwrap();

    let requests: Vec<Arc<Request>> = (0..200)
        .map(|i| routed_request(i, &format!("key-{}", i % 8), Duration::from_millis(2)))
        .collect();
    for req in &requests {
        assert!(server.enqueue(Arc::clone(req), &listener));
    }
    assert!(wait_until(Duration::from_secs(10), || requests
        .iter()
        .all(|r| r.is_completed())));

    for req in &requests {
        let (a, r, c) = (
            req.arrival().unwrap(),
            req.routed().unwrap(),
            req.completed().unwrap(),
        );
        assert!(a <= r && r <= c);
        assert_eq!(req.served_by(), Some(4));
    }

    let misses = requests.iter().filter(|r| r.is_cache_miss()).count();
    // One miss per key, plus workers that raced past the read check.
    assert!(misses >= 8 && misses <= 8 * 4, "misses = {misses}");
    assert_eq!(server.cache().len(), 8);
    assert_eq!(server.served(), 200);

    shutdown.trigger();
    assert!(actors.wait(Duration::from_secs(5)));
}

#[test]
fn test_misses_on_one_server_are_serialized() {
    let shutdown = Shutdown::new();
    let actors = ActorGroup::new();
    let listener = shutdown.listener();
    let server = Arc::new(Server::new(0, 4, 4));
    server.run(&listener, &actors).unwrap();

    let work = Duration::from_millis(20);
    let requests: Vec<Arc<Request>> = (0..4)
        .map(|i| routed_request(i, &format!("distinct-{i}"), work))
        .collect();
    let start = Instant::now();
    for req in &requests {
        assert!(server.enqueue(Arc::clone(req), &listener));
    }
    assert!(wait_until(Duration::from_secs(10), || requests
        .iter()
        .all(|r| r.is_completed())));

    // Four workers, but the write lock spans each fetch.
    assert!(start.elapsed() >= work * 4);

    shutdown.trigger();
    assert!(actors.wait(Duration::from_secs(5)));
}

#[test]
fn test_shutdown_interrupts_long_fetch() {
    let shutdown = Shutdown::new();
    let actors = ActorGroup::new();
    let listener = shutdown.listener();
    let server = Arc::new(Server::new(9, 2, 2));
    server.run(&listener, &actors).unwrap();

    let slow = routed_request(0, "slow", Duration::from_secs(60));
    assert!(server.enqueue(Arc::clone(&slow), &listener));
    assert!(wait_until(Duration::from_secs(5), || server.served() == 1));

    let stopped = Instant::now();
    shutdown.trigger();
    assert!(actors.wait(Duration::from_secs(5)));
    assert!(stopped.elapsed() < Duration::from_secs(5));

    assert!(slow.is_cache_miss());
    assert!(!slow.is_completed());
    assert!(!server.cache().contains("slow"));
}
