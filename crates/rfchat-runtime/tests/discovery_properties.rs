//! Property-based tests for the discovery peer registry

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use rfchat_core::PeerFound;
use rfchat_harness::{MockPermissions, MockRadio};
use rfchat_runtime::{event_channel, DiscoveryController, LinkEvent};

fn arb_address() -> impl Strategy<Value = String> {
    // A small alphabet so repeats are common
    prop::sample::select(vec!["AA", "BB", "CC", "DD", "EE"]).prop_map(String::from)
}

fn arb_reports() -> impl Strategy<Value = Vec<(String, Option<String>)>> {
    prop::collection::vec((arb_address(), prop::option::of("[a-z]{1,8}")), 0..40)
}

proptest! {
    /// Property: the registry holds each address once, in first-seen order,
    /// and announces exactly the peers it inserted
    #[test]
    fn registry_is_first_seen_unique(reports in arb_reports()) {
        let (peers, announced) = tokio_test::block_on(async {
            let (sink, mut events) = event_channel();
            let discovery = DiscoveryController::new(
                Arc::new(MockRadio::new()),
                Arc::new(MockPermissions::granted()),
                sink,
            );
            discovery.start_scan().await.expect("scan should start");

            for (address, name) in &reports {
                discovery.handle_peer_found(PeerFound::new(address.as_str(), name.as_deref()));
            }

            let mut announced = Vec::new();
            while let Some(event) = events.try_recv() {
                if let LinkEvent::PeerFound(peer) = event {
                    announced.push(peer.address);
                }
            }
            discovery.stop_scan().await;
            (discovery.peers(), announced)
        });

        let mut seen = HashSet::new();
        let expected: Vec<String> = reports
            .iter()
            .filter(|(address, _)| seen.insert(address.clone()))
            .map(|(address, _)| address.clone())
            .collect();

        let addresses: Vec<String> = peers.iter().map(|p| p.address.clone()).collect();
        prop_assert_eq!(&addresses, &expected);
        prop_assert_eq!(&announced, &expected);
    }

    /// Property: the first report for an address fixes its display name
    #[test]
    fn first_report_name_wins(first in "[a-z]{1,8}", later in "[a-z]{1,8}") {
        let peers = tokio_test::block_on(async {
            let (sink, _events) = event_channel();
            let discovery = DiscoveryController::new(
                Arc::new(MockRadio::new()),
                Arc::new(MockPermissions::granted()),
                sink,
            );
            discovery.start_scan().await.expect("scan should start");
            discovery.handle_peer_found(PeerFound::new("AA", Some(first.as_str())));
            discovery.handle_peer_found(PeerFound::new("AA", Some(later.as_str())));
            discovery.peers()
        });

        prop_assert_eq!(peers.len(), 1);
        prop_assert_eq!(peers[0].display_name.as_deref(), Some(first.as_str()));
    }
}
