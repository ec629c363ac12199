//! Lazy iteration primitives.
//!
//! [`PaginatedCursor`] pulls elements page-at-a-time from a [`PagedSource`],
//! caching every parsed element so a second pass replays without network
//! traffic. [`ReferenceCursor`] materializes the target records of a
//! reference field, skipping orphaned ids.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use swimlane_client::Session;
use tracing::debug;

use crate::app::App;
use crate::error::Result;
use crate::record::Record;

/// Default page size for paginated retrieval.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// A source of raw pages plus the parse step for one element.
pub trait PagedSource {
    type Item: Clone;

    /// Fetch the raw elements of one zero-based page.
    fn retrieve_page(
        &mut self,
        page: usize,
        page_size: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Value>>> + Send;

    /// Parse one raw element.
    fn parse(&self, raw: Value) -> Result<Self::Item>;
}

/// Page-at-a-time cursor with an element cache and an optional absolute
/// limit. Iteration stops at a short page or at the limit; rewinding replays
/// the cache.
#[derive(Debug)]
pub struct PaginatedCursor<S: PagedSource> {
    source: S,
    page_size: usize,
    limit: Option<usize>,
    cache: Vec<S::Item>,
    position: usize,
    next_page: usize,
    exhausted: bool,
}

impl<S: PagedSource> PaginatedCursor<S> {
    pub fn new(source: S, page_size: usize, limit: Option<usize>) -> Self {
        // A limit below the page size caps the page size
        let page_size = match limit {
            Some(limit) if limit > 0 => page_size.min(limit),
            _ => page_size,
        };
        Self {
            source,
            page_size: page_size.max(1),
            limit,
            cache: Vec::new(),
            position: 0,
            next_page: 0,
            exhausted: false,
        }
    }

    /// The next element, fetching a page when the cache is consumed.
    pub async fn next(&mut self) -> Result<Option<S::Item>> {
        if self.position < self.cache.len() {
            let item = self.cache[self.position].clone();
            self.position += 1;
            return Ok(Some(item));
        }

        if self.exhausted || self.at_limit() {
            return Ok(None);
        }

        let raw = self
            .source
            .retrieve_page(self.next_page, self.page_size)
            .await?;
        debug!(page = self.next_page, elements = raw.len(), "Fetched page");
        self.next_page += 1;

        if raw.len() < self.page_size {
            self.exhausted = true;
        }
        for element in raw {
            if self.at_limit() {
                self.exhausted = true;
                break;
            }
            self.cache.push(self.source.parse(element)?);
        }

        if self.position < self.cache.len() {
            let item = self.cache[self.position].clone();
            self.position += 1;
            Ok(Some(item))
        } else {
            Ok(None)
        }
    }

    fn at_limit(&self) -> bool {
        self.limit.is_some_and(|limit| self.cache.len() >= limit)
    }

    /// Restart iteration from the first cached element.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Drain the cursor into a vector.
    pub async fn collect_all(&mut self) -> Result<Vec<S::Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Number of elements fetched so far.
    pub fn fetched(&self) -> usize {
        self.cache.len()
    }
}

/// Cursor over the target records of a reference field. Records are fetched
/// lazily by id against the target app and cached; ids the server no longer
/// knows (decoded error code 3002) are skipped so orphaned references do not
/// break iteration.
pub struct ReferenceCursor {
    session: Session,
    target_app: Arc<App>,
    ids: Vec<String>,
    cache: HashMap<String, Record>,
}

impl ReferenceCursor {
    pub(crate) fn new(session: Session, target_app: Arc<App>, ids: Vec<String>) -> Self {
        Self {
            session,
            target_app,
            ids,
            cache: HashMap::new(),
        }
    }

    /// The stored target ids, including any orphans.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Materialize the referenced records, in stored-id order.
    pub async fn resolve(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for id in &self.ids {
            if let Some(record) = self.cache.get(id) {
                records.push(record.clone());
                continue;
            }
            let path = format!("app/{}/record/{}", self.target_app.id, id);
            match self.session.get_json::<Value>(&path).await {
                Ok(raw) => {
                    let record =
                        Record::from_raw(self.session.clone(), Arc::clone(&self.target_app), raw)?;
                    self.cache.insert(id.clone(), record.clone());
                    records.push(record);
                }
                Err(err) if err.api_error_code() == Some(3002) => {
                    debug!(record_id = %id, "Skipping orphaned reference");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(records)
    }
}
