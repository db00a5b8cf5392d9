//! Tests against a real bucket
//!
//! Run with: `S3URL_TEST_BUCKET=my-bucket cargo test -p s3-url --features integration`
//!
//! Credentials and region come from the usual `S3URL_*` variables and the SDK
//! default chain. Objects are written under a per-run prefix and removed again.

#![cfg(feature = "integration")]

use std::collections::HashMap;
use std::sync::Arc;

use futures::TryStreamExt;
use s3_url::{
    DEFAULT_PRESIGN_TTL, ObjectLocation, ObjectStore, PresignPutOptions, S3Client, StoreConfig,
};
use serde_json::json;

async fn root() -> ObjectLocation {
    let bucket = std::env::var("S3URL_TEST_BUCKET").expect("S3URL_TEST_BUCKET must be set");
    let config = StoreConfig::from_env().expect("valid S3URL_* configuration");
    let client: Arc<dyn ObjectStore> =
        Arc::new(S3Client::new(&config).await.expect("S3 client"));

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let prefix = format!("s3://{bucket}/s3-url-tests/{nanos}/");
    ObjectLocation::with_store(&prefix, client).unwrap()
}

fn child(root: &ObjectLocation, key: &str) -> ObjectLocation {
    ObjectLocation::from_bucket_key_with_store(
        root.bucket(),
        &format!("{}{key}", root.key()),
        Arc::clone(root.store()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_live_round_trip() {
    let root = root().await;
    let file = child(&root, "prefix/file.json");

    assert!(!file.exists().await.unwrap());
    assert!(!root.prefix_exists().await.unwrap());

    file.write_json(&json!({"a": 1}), None).await.unwrap();
    assert!(file.exists().await.unwrap());
    assert!(root.prefix_exists().await.unwrap());
    let value: serde_json::Value = file.read_json().await.unwrap();
    assert_eq!(value, json!({"a": 1}));

    file.write_tags(Some(&HashMap::from([("k".to_string(), "v".to_string())])))
        .await
        .unwrap();
    let copy = child(&root, "prefix/copy.json");
    file.copy_to(&copy).await.unwrap();
    assert!(copy.read_tags().await.unwrap().is_empty());
    file.copy_tags_to(&copy).await.unwrap();
    assert_eq!(copy.read_tags().await.unwrap().get("k").map(String::as_str), Some("v"));
    copy.write_tags(None).await.unwrap();
    assert!(copy.read_tags().await.unwrap().is_empty());

    let prefixes: Vec<ObjectLocation> = root.list_common_prefixes().try_collect().await.unwrap();
    assert_eq!(prefixes, vec![child(&root, "prefix/")]);

    let url = file.generate_presigned_get_url(DEFAULT_PRESIGN_TTL).await.unwrap();
    assert!(url.contains("X-Amz-Signature="));
    let url = file
        .generate_presigned_put_url(
            DEFAULT_PRESIGN_TTL,
            PresignPutOptions::default().with_content_type("application/json"),
        )
        .await
        .unwrap();
    assert!(url.contains("X-Amz-Signature="));

    assert_eq!(root.delete_all().await.unwrap(), 2);
    assert!(!file.exists().await.unwrap());
}

#[tokio::test]
async fn test_live_listing_across_pages() {
    let root = root().await;
    for i in 0..7 {
        child(&root, &format!("items/{i}"))
            .write_text("x", None)
            .await
            .unwrap();
    }

    let listed: Vec<ObjectLocation> = root
        .list_objects_under_prefix_paged(2)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(listed.len(), 7);

    assert_eq!(root.delete_all().await.unwrap(), 7);
}

#[tokio::test]
async fn test_live_multipart_upload() {
    let root = root().await;
    let big = child(&root, "big.bin");

    let body: Vec<u8> = (0..(s3url_s3::PART_SIZE + 1024))
        .map(|i| (i % 251) as u8)
        .collect();
    let sent = big
        .upload_file(std::io::Cursor::new(body.clone()), None)
        .await
        .unwrap();
    assert_eq!(sent, body.len() as u64);
    assert_eq!(big.read().await.unwrap().len(), body.len());

    big.delete().await.unwrap();
}
