// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyring persistence specs.

use crate::specs::prelude::*;
use muster_transport::keyring::load_keyring_file;
use muster_transport::Keyring;
use std::sync::Arc;

/// Writing the keyring file and loading it back yields the same keys in
/// the same order, primary first.
#[tokio::test]
async fn keyring_file_round_trips_with_primary_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyring.json");
    let cluster = MemoryCluster::new();

    let keyring = Arc::new(Keyring::new(vec![1u8; 16]).unwrap());
    keyring.add_key(vec![2u8; 24]).unwrap();
    keyring.add_key(vec![3u8; 32]).unwrap();
    keyring.use_key(&vec![3u8; 32]).unwrap();

    let (serf, _rx) = launch(&cluster, "n1", 7601, FakeClock::new(), |c| {
        c.keyring = Some(Arc::clone(&keyring));
        c.keyring_file = Some(path.clone());
    })
    .await;
    assert!(serf.encryption_enabled());
    serf.write_keyring_file().unwrap();
    serf.shutdown().await.unwrap();

    let loaded = load_keyring_file(&path).unwrap();
    assert_eq!(loaded.get_keys(), keyring.get_keys());
    assert_eq!(loaded.keys()[0], vec![3u8; 32]);
}

/// Without a keyring the transport gossips in the clear and reports so.
#[tokio::test]
async fn encryption_is_off_without_a_keyring() {
    let cluster = MemoryCluster::new();
    let (serf, _rx) = launch(&cluster, "n1", 7602, FakeClock::new(), |_| {}).await;
    assert!(!serf.encryption_enabled());
    serf.shutdown().await.unwrap();
}
