//! Data service over the wire

use super::{count_files, spawn_data, TEST_TOKEN};
use vaultfs_client::StoreClient;

/// The name address is never dialed in these tests; only the data half of
/// the client is exercised.
fn test_client() -> StoreClient {
    StoreClient::new("127.0.0.1:1", Some(TEST_TOKEN.to_owned()))
}

/// Ten concurrent uploads of the same ten-megabyte body: every one
/// succeeds, exactly one blob exists, no temp files remain.
#[tokio::test]
async fn test_concurrent_identical_uploads() {
    let (data_addr, root) = spawn_data(vec!["127.0.0.1:1".to_owned()]).await;
    let hash = "f".repeat(64);
    let body: Vec<u8> = (0..10 * 1024 * 1024u32).map(|i| (i % 241) as u8).collect();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let data_addr = data_addr.clone();
        let hash = hash.clone();
        let body = body.clone();
        tasks.push(tokio::spawn(async move {
            test_client()
                .upload_blob(&data_addr, &hash, &body)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let (blobs, temps) = count_files(root.path());
    assert_eq!(blobs, 1);
    assert_eq!(temps, 0);

    let downloaded = test_client()
        .download_blob(&data_addr, &hash)
        .await
        .unwrap();
    assert_eq!(downloaded, body);
}

/// Traversal payloads fail with an error and write nothing anywhere.
#[tokio::test]
async fn test_path_traversal_rejected() {
    let (data_addr, root) = spawn_data(vec!["127.0.0.1:1".to_owned()]).await;
    let client = test_client();

    for bad in ["../secret", "..", "a/b", "x\\y"] {
        assert!(
            client.upload_blob(&data_addr, bad, b"owned").await.is_err(),
            "accepted {bad:?}"
        );
        assert!(client.download_blob(&data_addr, bad).await.is_err());
    }

    let (blobs, temps) = count_files(root.path());
    assert_eq!((blobs, temps), (0, 0));
    // Nothing escaped next to the root either.
    assert!(!root.path().parent().unwrap().join("secret").exists());
}

/// Downloading an unknown hash is an error, not an empty stream.
#[tokio::test]
async fn test_download_missing_hash() {
    let (data_addr, _root) = spawn_data(vec!["127.0.0.1:1".to_owned()]).await;
    let err = test_client()
        .download_blob(&data_addr, &"a".repeat(64))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("file not found"), "{err}");
}

/// Zero-length blobs are legal end to end.
#[tokio::test]
async fn test_empty_blob_round_trip() {
    let (data_addr, root) = spawn_data(vec!["127.0.0.1:1".to_owned()]).await;
    let client = test_client();
    let hash = "0".repeat(64);

    client.upload_blob(&data_addr, &hash, b"").await.unwrap();
    let (blobs, _) = count_files(root.path());
    assert_eq!(blobs, 1);

    let body = client.download_blob(&data_addr, &hash).await.unwrap();
    assert!(body.is_empty());
}

/// A wrong token is rejected before any disk activity.
#[tokio::test]
async fn test_bad_token_rejected() {
    let (data_addr, root) = spawn_data(vec!["127.0.0.1:1".to_owned()]).await;
    let client = StoreClient::new("127.0.0.1:1", Some("wrong".to_owned()));
    assert!(client
        .upload_blob(&data_addr, &"b".repeat(64), b"body")
        .await
        .is_err());
    assert_eq!(count_files(root.path()), (0, 0));
}
