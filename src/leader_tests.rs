// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `leader.rs`

#[cfg(test)]
mod tests {
    use crate::leader::{LeaderElector, LeadershipState, StaticLeaderElector};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callback() -> (Arc<AtomicUsize>, crate::leader::AcquiredLeaseCallback) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        (
            calls,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_static_leader_invokes_callback_immediately() {
        let (calls, callback) = counting_callback();
        let elector = StaticLeaderElector::leader();

        elector.add_acquired_lease_callback(callback);

        assert!(elector.is_leader());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_static_follower_never_invokes_callback() {
        let (calls, callback) = counting_callback();
        let elector = StaticLeaderElector::follower();

        elector.add_acquired_lease_callback(callback);

        assert!(!elector.is_leader());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callbacks_fire_on_every_acquisition() {
        let (calls, callback) = counting_callback();
        let state = LeadershipState::default();
        state.add_callback(callback);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(state.set_leading(true));
        assert!(!state.set_leading(true), "renewal is not an acquisition");
        assert!(!state.set_leading(false));
        assert!(state.set_leading(true));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_registered_while_leading_fires_once() {
        let (calls, callback) = counting_callback();
        let state = LeadershipState::default();
        state.set_leading(true);

        state.add_callback(callback);

        assert!(state.is_leader());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Registration racing an acquisition must fire the callback exactly once.
    #[test]
    fn test_callback_registered_during_acquisition_fires_once() {
        use std::sync::Barrier;
        use std::thread;

        for iteration in 0..2_000 {
            let state = Arc::new(LeadershipState::default());
            let (calls, callback) = counting_callback();
            let barrier = Arc::new(Barrier::new(2));

            let acquiring = {
                let state = state.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    state.set_leading(true);
                })
            };
            let registering = {
                let state = state.clone();
                thread::spawn(move || {
                    barrier.wait();
                    state.add_callback(callback);
                })
            };
            acquiring.join().unwrap();
            registering.join().unwrap();

            assert_eq!(
                calls.load(Ordering::SeqCst),
                1,
                "callback fired more than once in iteration {iteration}"
            );
        }
    }
}
