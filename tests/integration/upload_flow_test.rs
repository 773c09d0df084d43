//! End-to-end upload and download flows

use super::{count_files, TestCluster};
use vaultfs_client::cipher::sha256_hex;

/// Upload, then download and decrypt; bytes must survive the round trip.
#[tokio::test]
async fn test_put_get_round_trip() {
    let cluster = TestCluster::start().await;
    let client = cluster.client();

    let payload: Vec<u8> = (0..256 * 1024u32).map(|i| (i % 253) as u8).collect();
    let storage_id = client.put_blob("report.pdf", &payload).await.unwrap();
    assert_eq!(storage_id.len(), 36); // uuid

    // The committed location is the one data service in the cluster.
    let (_, _, location) = client.resolve_download(&storage_id).await.unwrap();
    assert_eq!(location, cluster.data_addr);

    let (filename, downloaded) = client.get_blob(&storage_id).await.unwrap();
    assert_eq!(filename, "report.pdf");
    assert_eq!(downloaded, payload);
}

/// The blob on disk is the ciphertext, addressed by the plaintext hash.
#[tokio::test]
async fn test_blob_is_stored_encrypted_under_plaintext_hash() {
    let cluster = TestCluster::start().await;
    let client = cluster.client();

    let payload = b"plaintext that must not appear on disk".to_vec();
    client.put_blob("secret.txt", &payload).await.unwrap();

    let hash = sha256_hex(&payload);
    let path = cluster
        .storage_root
        .path()
        .join(&hash[0..2])
        .join(&hash[2..4])
        .join(&hash);
    let on_disk = std::fs::read(path).unwrap();
    assert_eq!(on_disk.len(), payload.len());
    assert_ne!(on_disk, payload);
}

/// Re-uploading known content commits without a second blob appearing.
#[tokio::test]
async fn test_instant_upload_dedup() {
    let cluster = TestCluster::start().await;
    let client = cluster.client();

    let payload = b"the very same bytes".to_vec();
    let first = client.put_blob("one.bin", &payload).await.unwrap();
    let second = client.put_blob("two.bin", &payload).await.unwrap();

    // Same content, same storage id (idempotent commit by hash).
    assert_eq!(first, second);

    let (blobs, temps) = count_files(cluster.storage_root.path());
    assert_eq!(blobs, 1);
    assert_eq!(temps, 0);
}

/// Different content yields distinct blobs and ids.
#[tokio::test]
async fn test_distinct_content_distinct_blobs() {
    let cluster = TestCluster::start().await;
    let client = cluster.client();

    let a = client.put_blob("a.bin", b"first content").await.unwrap();
    let b = client.put_blob("b.bin", b"second content").await.unwrap();
    assert_ne!(a, b);

    let (blobs, temps) = count_files(cluster.storage_root.path());
    assert_eq!(blobs, 2);
    assert_eq!(temps, 0);

    let (name_a, body_a) = client.get_blob(&a).await.unwrap();
    assert_eq!(name_a, "a.bin");
    assert_eq!(body_a, b"first content");
}

/// Unknown storage ids resolve to an error, not a hang.
#[tokio::test]
async fn test_get_unknown_id_fails() {
    let cluster = TestCluster::start().await;
    let client = cluster.client();
    assert!(client.get_blob("00000000-0000-0000-0000-000000000000").await.is_err());
}
