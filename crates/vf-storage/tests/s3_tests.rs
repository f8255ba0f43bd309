//! S3-compatible object store integration tests.

use uuid::Uuid;
use vf_storage::ObjectStoreClient;

async fn test_client() -> ObjectStoreClient {
    dotenvy::dotenv().ok();
    ObjectStoreClient::from_env().await.expect("failed to create object store client")
}

#[tokio::test]
#[ignore = "requires object store credentials"]
async fn connectivity_check_succeeds() {
    let client = test_client().await;
    client.check_connectivity().await.expect("connectivity check failed");
}

#[tokio::test]
#[ignore = "requires object store credentials"]
async fn upload_bytes_download_bytes_round_trip() {
    let client = test_client().await;
    let key = format!("test/{}.bin", Uuid::new_v4());
    let payload = b"rendered segment bytes".to_vec();

    client
        .upload_bytes(payload.clone(), &key, "application/octet-stream")
        .await
        .expect("failed to upload bytes");

    assert!(client.exists(&key).await.expect("failed to check existence"));

    let downloaded = client.download_bytes(&key).await.expect("failed to download bytes");
    assert_eq!(downloaded, payload);

    client.delete_object(&key).await.expect("failed to delete object");
    assert!(!client.exists(&key).await.expect("failed to check existence after delete"));
}

#[tokio::test]
#[ignore = "requires object store credentials"]
async fn upload_file_download_file_round_trip() {
    let client = test_client().await;
    let key = format!("test/{}.mp4", Uuid::new_v4());

    let upload_dir = tempfile::tempdir().expect("failed to create temp dir");
    let upload_path = upload_dir.path().join("source.mp4");
    tokio::fs::write(&upload_path, b"fake mp4 payload").await.expect("failed to write source file");

    let url = client
        .upload_file(&upload_path, &key, "video/mp4")
        .await
        .expect("failed to upload file");
    assert!(url.contains(&key));

    let download_path = upload_dir.path().join("downloaded.mp4");
    client
        .download_file(&key, &download_path)
        .await
        .expect("failed to download file");

    let original = tokio::fs::read(&upload_path).await.expect("failed to read source file");
    let downloaded = tokio::fs::read(&download_path).await.expect("failed to read downloaded file");
    assert_eq!(original, downloaded);

    client.delete_object(&key).await.ok();
}

#[tokio::test]
#[ignore = "requires object store credentials"]
async fn presigned_get_url_is_well_formed() {
    let client = test_client().await;
    let key = format!("test/{}.bin", Uuid::new_v4());
    client
        .upload_bytes(b"presign me".to_vec(), &key, "application/octet-stream")
        .await
        .expect("failed to upload bytes");

    let url = client
        .presign_get(&key, std::time::Duration::from_secs(60))
        .await
        .expect("failed to presign URL");
    assert!(url.starts_with("http"));

    client.delete_object(&key).await.ok();
}
