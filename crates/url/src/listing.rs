//! Lazy listing streams
//!
//! Pages are fetched one continuation token at a time as the stream is polled.

use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use s3url_core::{DELIMITER, Error, ListPage, ListRequest, ObjectPath, ObjectStore, Result};

use crate::location::ObjectLocation;

/// Largest page a single ListObjectsV2 request returns
pub(crate) const MAX_PAGE_SIZE: i32 = 1000;

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// All pages of a listing, following continuation tokens until exhausted
fn pages(
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    request: ListRequest,
) -> impl Stream<Item = Result<ListPage>> + Send + 'static {
    stream::try_unfold(Cursor::Start, move |cursor| {
        let store = Arc::clone(&store);
        let path = path.clone();
        let mut request = request.clone();

        async move {
            request.continuation_token = match cursor {
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
                Cursor::Done => return Ok(None),
            };

            let page = store.list_objects(&path, request).await?;
            tracing::trace!(
                bucket = %path.bucket(),
                prefix = %path.key(),
                objects = page.objects.len(),
                prefixes = page.common_prefixes.len(),
                "Fetched listing page"
            );

            let next = match &page.next_continuation_token {
                Some(token) => Cursor::Next(token.clone()),
                None => Cursor::Done,
            };
            Ok::<_, Error>(Some((page, next)))
        }
    })
}

/// Every object whose key starts with the location's key
///
/// A requested page size is clamped to `1..=1000`.
pub(crate) fn objects(
    location: &ObjectLocation,
    page_size: Option<i32>,
) -> BoxStream<'static, Result<ObjectLocation>> {
    let store = Arc::clone(location.store());
    let path = location.path().clone();
    let request = ListRequest {
        max_keys: page_size.map(|size| size.clamp(1, MAX_PAGE_SIZE)),
        ..Default::default()
    };

    pages(Arc::clone(&store), path.clone(), request)
        .map_ok(move |page| {
            let store = Arc::clone(&store);
            let path = path.clone();
            stream::iter(page.objects.into_iter().map(move |info| {
                path.sibling(&info.key)
                    .map(|found| ObjectLocation::new(found, Arc::clone(&store)))
            }))
        })
        .try_flatten()
        .boxed()
}

/// Immediate `/`-delimited prefixes below the location's key
pub(crate) fn common_prefixes(
    location: &ObjectLocation,
) -> BoxStream<'static, Result<ObjectLocation>> {
    let store = Arc::clone(location.store());
    let path = location.path().clone();
    let request = ListRequest {
        delimiter: Some(DELIMITER.to_string()),
        ..Default::default()
    };

    pages(Arc::clone(&store), path.clone(), request)
        .map_ok(move |page| {
            let store = Arc::clone(&store);
            let path = path.clone();
            stream::iter(page.common_prefixes.into_iter().map(move |prefix| {
                path.sibling(&prefix)
                    .map(|found| ObjectLocation::new(found, Arc::clone(&store)))
            }))
        })
        .try_flatten()
        .boxed()
}
