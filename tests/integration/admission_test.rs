//! Admission protocol over the wire

use super::{spawn_name, TEST_TOKEN};
use vaultfs_client::{PreUploadReply, StoreClient};

fn hash() -> String {
    "d".repeat(64)
}

/// Ten concurrent writers for one hash: exactly one ALLOW, nine WAIT;
/// after the winner commits, retries observe EXIST with its location.
#[tokio::test]
async fn test_dedup_race_single_allow() {
    // No registry needed; admission never touches the data set.
    let (name_addr, _meta) = spawn_name(vec!["127.0.0.1:1".to_owned()]).await;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let client = StoreClient::new(name_addr.clone(), Some(TEST_TOKEN.to_owned()));
        let hash = hash();
        tasks.push(tokio::spawn(async move { client.pre_upload(&hash).await }));
    }

    let mut allows = 0;
    let mut waits = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            PreUploadReply::Allow => allows += 1,
            PreUploadReply::Wait => waits += 1,
            PreUploadReply::Exist { .. } => panic!("nothing committed yet"),
        }
    }
    assert_eq!(allows, 1);
    assert_eq!(waits, 9);

    // Winner commits; the other nine now short-circuit.
    let client = StoreClient::new(name_addr.clone(), Some(TEST_TOKEN.to_owned()));
    let storage_id = client
        .commit("race.bin", &hash(), "10.9.9.9:9700")
        .await
        .unwrap();
    assert!(!storage_id.is_empty());

    for _ in 0..9 {
        match client.pre_upload(&hash()).await.unwrap() {
            PreUploadReply::Exist { location } => assert_eq!(location, "10.9.9.9:9700"),
            other => panic!("expected Exist, got {other:?}"),
        }
    }
}

/// Commit is idempotent across filenames for the same content.
#[tokio::test]
async fn test_commit_idempotent_over_wire() {
    let (name_addr, _meta) = spawn_name(vec!["127.0.0.1:1".to_owned()]).await;
    let client = StoreClient::new(name_addr, Some(TEST_TOKEN.to_owned()));

    let hash = "e".repeat(64);
    let first = client.commit("a.txt", &hash, "10.0.0.1:9700").await.unwrap();
    let second = client.commit("b.txt", &hash, "10.0.0.2:9700").await.unwrap();
    assert_eq!(first, second);

    // Resolution returns the first commit's metadata.
    let (filename, resolved, location) = client.resolve_download(&first).await.unwrap();
    assert_eq!(filename, "a.txt");
    assert_eq!(resolved, hash);
    assert_eq!(location, "10.0.0.1:9700");
}

/// A wrong bearer token gets "Authentication Failed" on every operation.
#[tokio::test]
async fn test_bad_token_rejected() {
    let (name_addr, _meta) = spawn_name(vec!["127.0.0.1:1".to_owned()]).await;
    let client = StoreClient::new(name_addr, Some("wrong-token".to_owned()));

    let err = client.pre_upload(&hash()).await.unwrap_err();
    assert!(err.to_string().contains("Authentication Failed"), "{err}");
}

/// Malformed hashes are rejected at admission, not at the filesystem.
#[tokio::test]
async fn test_malformed_hash_rejected_at_admission() {
    let (name_addr, _meta) = spawn_name(vec!["127.0.0.1:1".to_owned()]).await;
    let client = StoreClient::new(name_addr, Some(TEST_TOKEN.to_owned()));
    assert!(client.pre_upload("../../etc/shadow").await.is_err());
}
