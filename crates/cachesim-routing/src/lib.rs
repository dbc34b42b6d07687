//! Built-in request routers for cachesim.
//!
//! This crate provides the [`Router`] trait and the three strategies the
//! simulator compares:
//!
//! | Router | Strategy | Behaviour under resize |
//! |--------|----------|------------------------|
//! | [`RoundRobin`] | Cycle through servers | Unaffected; no cache locality at all |
//! | [`Hashed`] | `fnv1a(key) mod n` | Most keys move |
//! | [`BoundedLoad`] | Hash slot, then probe past servers at the load bound | Occupancy kept, new servers absorb overflow |
//!
//! Routers are generic over the server type so the simulator can route to
//! its own `Server` handles while tests and benches use plain integers.

pub mod bounded_load;
pub mod hash;
pub mod hashed;
pub mod registry;
pub mod round_robin;
pub mod traits;

pub use bounded_load::{load_estimate, BoundedLoad, Occupancy, Selection};
pub use hash::fnv1a_32;
pub use hashed::Hashed;
pub use registry::ServerRegistry;
pub use round_robin::RoundRobin;
pub use traits::*;

/// Create a router by name.
pub fn router_by_name<S>(name: &str, params: &RouterParams) -> Option<Box<dyn Router<S>>>
where
    S: Send + Sync + 'static,
{
    RouterKind::from_name(name).and_then(|kind| build_router(kind, params))
}

/// Create a router for one of the built-in strategies.
///
/// Returns `None` if `kind` reads `params` and they are out of range.
pub fn build_router<S>(kind: RouterKind, params: &RouterParams) -> Option<Box<dyn Router<S>>>
where
    S: Send + Sync + 'static,
{
    let router: Box<dyn Router<S>> = match kind {
        RouterKind::RoundRobin => Box::new(RoundRobin::<S>::new()),
        RouterKind::Hashed => Box::new(Hashed::<S>::new()),
        RouterKind::BoundedLoad => Box::new(BoundedLoad::<S>::from_params(params)?),
    };
    Some(router)
}

/// List all available built-in router names.
pub fn available_routers() -> Vec<&'static str> {
    vec!["round_robin", "hashed", "bounded_load"]
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Arc;

    /// Helper to create N servers identified by their index.
    pub fn make_servers(n: u32) -> Vec<Arc<u32>> {
        (0..n).map(Arc::new).collect()
    }

    pub fn ids(servers: &[Arc<u32>]) -> Vec<u32> {
        servers.iter().map(|s| **s).collect()
    }

    #[test]
    fn test_router_by_name() {
        let params = RouterParams::default();
        for name in available_routers() {
            let router = router_by_name::<u32>(name, &params);
            assert!(router.is_some(), "Missing: {}", name);
            assert_eq!(router.unwrap().name(), name);
        }
        assert!(router_by_name::<u32>("nonexistent", &params).is_none());
    }

    #[test]
    fn test_invalid_params_only_reject_bounded_load() {
        let params = RouterParams {
            load_factor: 0.5,
            resource_total: 0,
        };
        assert!(build_router::<u32>(RouterKind::RoundRobin, &params).is_some());
        assert!(build_router::<u32>(RouterKind::Hashed, &params).is_some());
        assert!(build_router::<u32>(RouterKind::BoundedLoad, &params).is_none());
        assert!(router_by_name::<u32>("bounded_load", &params).is_none());
    }

    #[test]
    fn test_router_kind_round_trips_names() {
        for name in available_routers() {
            let kind = RouterKind::from_name(name).unwrap();
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn test_every_router_returns_registry_member() {
        let params = RouterParams {
            load_factor: 1.5,
            resource_total: 32,
        };
        for name in available_routers() {
            let router = router_by_name::<u32>(name, &params).unwrap();
            router.set_servers(make_servers(3));
            for i in 0..100 {
                let key = format!("key-{i}");
                let server = router.route(&RequestInfo::new(i, &key));
                assert!(*server < 3, "{} returned {}", name, server);
            }
        }
    }
}
