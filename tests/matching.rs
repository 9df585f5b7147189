//! Matching properties checked through the public API
//!
//! The registry must agree with `topic_matches_filter` for any set of
//! subscriptions, before and after mutations.

use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use vibemq_core::persistence::MemoryBackend;
use vibemq_core::{topic_matches_filter, QoS, Subscription, SubscriptionRegistry};

const LEVELS: &[&str] = &["sport", "tennis", "golf", "player1", "", "$SYS"];

fn topic_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(LEVELS), 1..5).prop_map(|levels| levels.join("/"))
}

fn filter_strategy() -> impl Strategy<Value = String> {
    let level = prop_oneof![
        4 => prop::sample::select(LEVELS).prop_map(str::to_string),
        1 => Just("+".to_string()),
    ];
    (prop::collection::vec(level, 1..5), any::<bool>()).prop_map(|(mut levels, multi)| {
        if multi {
            levels.push("#".to_string());
        }
        levels.join("/")
    })
    .prop_filter("filters cannot be empty", |filter| !filter.is_empty())
}

/// (client, filter) pairs the registry returns for a topic
fn registry_matches(registry: &SubscriptionRegistry, topic: &str) -> BTreeSet<(String, String)> {
    registry
        .matches(topic)
        .iter()
        .map(|s| (s.client_id.to_string(), s.filter.to_string()))
        .collect()
}

/// (client, filter) pairs the matcher accepts for a topic
fn expected_matches(subs: &BTreeSet<(String, String)>, topic: &str) -> BTreeSet<(String, String)> {
    subs.iter()
        .filter(|(_, filter)| topic_matches_filter(topic, filter))
        .cloned()
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn wildcard_free_filters_match_only_equal_topics(topic in topic_strategy(), other in topic_strategy()) {
        prop_assert!(topic_matches_filter(&topic, &topic));
        prop_assert_eq!(topic_matches_filter(&topic, &other), topic == other);
    }

    #[test]
    fn trailing_hash_matches_parent(topic in topic_strategy()) {
        let filter = format!("{}/#", topic);
        prop_assert!(topic_matches_filter(&topic, &filter));
        let deeper = format!("{}/x", topic);
        prop_assert!(topic_matches_filter(&deeper, &filter));
    }

    #[test]
    fn registry_agrees_with_matcher(
        entries in prop::collection::vec((0..4u8, filter_strategy()), 1..24),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        wiped in prop::option::of(0..4u8),
        topics in prop::collection::vec(topic_strategy(), 1..8),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = Arc::new(MemoryBackend::open());
            let registry = SubscriptionRegistry::init(store).await.unwrap();

            let mut live = BTreeSet::new();
            for (client, filter) in &entries {
                let client = format!("client-{}", client);
                registry
                    .add(Subscription::new(client.as_str(), filter.as_str(), QoS::AtMostOnce, false))
                    .await
                    .unwrap();
                live.insert((client, filter.clone()));
            }
            for topic in &topics {
                assert_eq!(registry_matches(&registry, topic), expected_matches(&live, topic));
            }

            for index in &removals {
                let (client, filter) = index.get(&entries);
                let client = format!("client-{}", client);
                let had = live.remove(&(client.clone(), filter.clone()));
                assert_eq!(registry.remove(&client, filter).await.unwrap(), had);
            }
            if let Some(client) = wiped {
                let client = format!("client-{}", client);
                registry.wipe(&client).await.unwrap();
                live.retain(|(c, _)| *c != client);
            }

            assert_eq!(registry.len(), live.len());
            for topic in &topics {
                assert_eq!(registry_matches(&registry, topic), expected_matches(&live, topic));
            }
        });
    }
}

#[test]
fn test_wildcard_table() {
    assert!(topic_matches_filter("sport/tennis/player1", "sport/tennis/#"));
    assert!(topic_matches_filter("sport/tennis/player1", "sport/+/player1"));
    assert!(topic_matches_filter("sport/tennis", "sport/+"));
    assert!(topic_matches_filter("sport", "sport/#"));
    assert!(!topic_matches_filter("sport/tennis/player1", "sport/+/player2"));
    assert!(!topic_matches_filter("sport/tennis/player1", "sport/tennis"));
}

#[tokio::test]
async fn test_kitchen_scenario_through_public_api() {
    let store = Arc::new(MemoryBackend::open());
    let registry = SubscriptionRegistry::init(store.clone()).await.unwrap();

    registry
        .add(Subscription::new("client-a", "sensors/kitchen/temp", QoS::AtLeastOnce, false))
        .await
        .unwrap();
    registry
        .add(Subscription::new("client-b", "sensors/+/temp", QoS::AtMostOnce, true))
        .await
        .unwrap();
    registry
        .add(Subscription::new("client-c", "alerts/#", QoS::AtMostOnce, true))
        .await
        .unwrap();

    let mut matched: Vec<_> = registry
        .matches("sensors/kitchen/temp")
        .iter()
        .map(|s| (s.client_id.to_string(), s.qos))
        .collect();
    matched.sort();
    assert_eq!(
        matched,
        vec![
            ("client-a".to_string(), QoS::AtLeastOnce),
            ("client-b".to_string(), QoS::AtMostOnce),
        ]
    );

    // A second registry over the same store sees the same index
    let reloaded = SubscriptionRegistry::init(store).await.unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(reloaded.matches("sensors/kitchen/temp").len(), 2);
}
