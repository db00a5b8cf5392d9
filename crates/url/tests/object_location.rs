//! End-to-end behaviour of ObjectLocation against the in-memory store

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;

use futures::TryStreamExt;
use s3_url::{MemoryStore, ObjectLocation, ObjectStore, Result};
use serde_json::json;

fn store_with_page_size(page_size: usize) -> Arc<dyn ObjectStore> {
    Arc::new(
        MemoryStore::new()
            .with_bucket("bucket")
            .with_page_size(page_size),
    )
}

fn at(store: &Arc<dyn ObjectStore>, url: &str) -> ObjectLocation {
    ObjectLocation::with_store(url, Arc::clone(store)).expect("valid url")
}

async fn seed(store: &Arc<dyn ObjectStore>, keys: &[String]) -> Result<()> {
    for key in keys {
        at(store, &format!("s3://bucket/{key}"))
            .write(key.clone(), None)
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_json_round_trip_scenario() -> Result<()> {
    let store = store_with_page_size(1000);
    let location = at(&store, "s3://bucket/prefix/file.json");

    location.write_json(&json!({"a": 1}), None).await?;
    let value: serde_json::Value = location.read_json().await?;
    assert_eq!(value, json!({"a": 1}));

    location.delete().await?;
    assert!(!location.exists().await?);
    Ok(())
}

#[tokio::test]
async fn test_parse_round_trip() {
    let store = store_with_page_size(1000);
    for url in [
        "s3://bucket/key",
        "s3://bucket/dir/",
        "s3://bucket/",
        "s3://bucket/a b/c?d#e",
    ] {
        let location = at(&store, url);
        assert_eq!(location.url(), url);
        assert_eq!(at(&store, &location.to_string()), location);
        assert_eq!(
            ObjectLocation::from_bucket_key_with_store(
                location.bucket(),
                location.key(),
                Arc::clone(&store)
            )
            .unwrap(),
            location
        );
    }
}

#[tokio::test]
async fn test_locations_as_map_keys() {
    let store = store_with_page_size(1000);
    let first = at(&store, "s3://bucket/one");
    let second = at(&store, "s3://bucket/two");
    let third = at(&store, "s3://other/one");

    let mut sizes = HashMap::new();
    sizes.insert(first.clone(), 1);
    sizes.insert(second.clone(), 2);
    sizes.insert(third.clone(), 3);

    assert_eq!(sizes.len(), 3);
    assert_eq!(sizes[&at(&store_with_page_size(5), "s3://bucket/two")], 2);

    let set: HashSet<_> = [first.clone(), ObjectLocation::from(&first), second, third].into();
    assert_eq!(set.len(), 3);
}

#[tokio::test]
async fn test_binary_and_text_content() -> Result<()> {
    let store = store_with_page_size(1000);
    let binary = at(&store, "s3://bucket/blob.bin");
    let payload: Vec<u8> = (0..=255).collect();
    binary.write(payload.clone(), None).await?;
    assert_eq!(binary.read().await?.as_ref(), payload.as_slice());

    let text = at(&store, "s3://bucket/notes.txt");
    text.write_text("zürich → genève", None).await?;
    assert_eq!(
        text.read_text(s3_url::TextEncoding::default()).await?,
        "zürich → genève"
    );
    Ok(())
}

#[tokio::test]
async fn test_prefix_exists_single_request() -> Result<()> {
    let memory = Arc::new(MemoryStore::new().with_bucket("bucket"));
    let store: Arc<dyn ObjectStore> = Arc::clone(&memory) as Arc<dyn ObjectStore>;
    let prefix = at(&store, "s3://bucket/data/");

    assert!(!prefix.prefix_exists().await?);
    assert_eq!(memory.list_calls(), 1);

    let keys: Vec<String> = (0..50).map(|i| format!("data/{i:03}")).collect();
    seed(&store, &keys).await?;

    assert!(prefix.prefix_exists().await?);
    assert_eq!(memory.list_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_listing_is_independent_of_page_size() -> Result<()> {
    let keys: Vec<String> = (0..25).map(|i| format!("items/{i:02}.json")).collect();
    let mut expected: Vec<String> = keys
        .iter()
        .map(|key| format!("s3://bucket/{key}"))
        .collect();
    expected.sort();

    for page_size in [1, 2, 7, 25, 1000] {
        let store = store_with_page_size(page_size);
        seed(&store, &keys).await?;
        seed(&store, &["other/00.json".to_string()]).await?;

        let listed: Vec<ObjectLocation> = at(&store, "s3://bucket/items/")
            .list_objects_under_prefix()
            .try_collect()
            .await?;
        let urls: Vec<String> = listed.iter().map(ToString::to_string).collect();
        assert_eq!(urls, expected, "page size {page_size}");

        let paged: Vec<ObjectLocation> = at(&store, "s3://bucket/items/")
            .list_objects_under_prefix_paged(3)
            .try_collect()
            .await?;
        assert_eq!(paged, listed, "page size {page_size}");

        for requested in [0, -1] {
            let clamped: Vec<ObjectLocation> = at(&store, "s3://bucket/items/")
                .list_objects_under_prefix_paged(requested)
                .try_collect()
                .await?;
            assert_eq!(clamped, listed, "requested page size {requested}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_listed_locations_share_the_client() -> Result<()> {
    let store = store_with_page_size(2);
    seed(&store, &["a/1".to_string(), "a/2".to_string()]).await?;

    let root = at(&store, "s3://bucket/a/");
    let mut listing = root.list_prefix_objects();
    while let Some(found) = listing.try_next().await? {
        assert!(Arc::ptr_eq(found.store(), root.store()));
        assert_eq!(found.read().await?.as_ref(), found.key().as_bytes());
    }
    Ok(())
}

#[tokio::test]
async fn test_common_prefixes_are_one_level() -> Result<()> {
    for page_size in [1, 1000] {
        let store = store_with_page_size(page_size);
        seed(
            &store,
            &[
                "p/sub1/a".to_string(),
                "p/sub2/b".to_string(),
                "p/sub3/sub4/c".to_string(),
            ],
        )
        .await?;

        let prefixes: HashSet<String> = at(&store, "s3://bucket/p/")
            .list_common_prefixes()
            .map_ok(|location| location.key().to_string())
            .try_collect()
            .await?;

        let expected: HashSet<String> = ["p/sub1/", "p/sub2/", "p/sub3/"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(prefixes, expected);

        let empty: Vec<ObjectLocation> = at(&store, "s3://bucket/nothing/")
            .list_common_prefixes()
            .try_collect()
            .await?;
        assert!(empty.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_tier_transitions() -> Result<()> {
    let store = store_with_page_size(1000);

    for archive in ["GLACIER", "DEEP_ARCHIVE"] {
        let location = at(&store, &format!("s3://bucket/archived-{archive}"));
        location.write("cold", None).await?;
        location.transition_to_storage_tier(archive).await?;

        let err = location
            .transition_to_storage_tier("STANDARD")
            .await
            .unwrap_err();
        let remote = err.as_remote().expect("remote error");
        assert_eq!(remote.code(), Some("InvalidObjectState"));
    }

    let standard = at(&store, "s3://bucket/already-standard");
    standard.write("same", None).await?;
    standard.transition_to_storage_tier("STANDARD").await?;
    assert!(standard.metadata().await?.storage_class.is_none());
    assert_eq!(standard.read().await?.as_ref(), b"same");

    for class in ["INTELLIGENT_TIERING", "ONEZONE_IA", "STANDARD_IA"] {
        let location = at(&store, &format!("s3://bucket/warm-{class}"));
        location.write("warm", None).await?;
        location.transition_to_storage_tier(class).await?;
        assert_eq!(
            location.metadata().await?.storage_class.as_deref(),
            Some(class)
        );

        location.transition_to_storage_tier("STANDARD").await?;
        assert!(location.metadata().await?.storage_class.is_none());
        assert_eq!(location.read().await?.as_ref(), b"warm");
    }
    Ok(())
}

#[tokio::test]
async fn test_upload_path() -> Result<()> {
    let store = store_with_page_size(1000);
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(b"line one\nline two\n")?;
    file.flush()?;

    let location = at(&store, "s3://bucket/uploads/lines.txt");
    let sent = location.upload_path(file.path(), None).await?;

    assert_eq!(sent, 18);
    assert_eq!(location.read().await?.as_ref(), b"line one\nline two\n");

    let missing = location.upload_path("/definitely/not/here.txt", None).await;
    assert!(matches!(missing, Err(s3_url::Error::Io(_))));
    Ok(())
}
