//! Lazy key enumeration over the store's paginated listing.

use crate::store::{ObjectMeta, ObjectStore};
use anyhow::{Context, Result};
use std::collections::VecDeque;

/// Iterates the objects under a prefix, one listing page at a time.
///
/// Keys ending in `/` (directory markers), empty keys, and keys without the configured
/// suffix are skipped. The first listing error is yielded once and ends the iteration.
pub struct KeyEnumerator<'a> {
    store: &'a dyn ObjectStore,
    prefix: String,
    suffix: Option<String>,
    token: Option<String>,
    page: VecDeque<ObjectMeta>,
    pages_fetched: u64,
    done: bool,
}

impl<'a> KeyEnumerator<'a> {
    pub fn new(store: &'a dyn ObjectStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            suffix: None,
            token: None,
            page: VecDeque::new(),
            pages_fetched: 0,
            done: false,
        }
    }

    /// Only yield keys ending with `suffix` (e.g. `.json`).
    pub fn with_suffix(mut self, suffix: Option<impl Into<String>>) -> Self {
        self.suffix = suffix.map(Into::into);
        self
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    fn wanted(&self, obj: &ObjectMeta) -> bool {
        if obj.key.is_empty() || obj.key.ends_with('/') {
            return false;
        }
        match &self.suffix {
            Some(sfx) => obj.key.ends_with(sfx.as_str()),
            None => true,
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = self
            .store
            .list_page(&self.prefix, self.token.as_deref())
            .with_context(|| format!("list objects under `{}` (page {})", self.prefix, self.pages_fetched + 1))?;
        self.pages_fetched += 1;
        tracing::debug!(page = self.pages_fetched, objects = page.objects.len(), "listed page");

        self.token = page.next_token;
        if self.token.is_none() {
            self.done = true;
        }
        for obj in page.objects {
            if self.wanted(&obj) {
                self.page.push_back(obj);
            }
        }
        Ok(())
    }
}

impl Iterator for KeyEnumerator<'_> {
    type Item = Result<ObjectMeta>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(obj) = self.page.pop_front() {
                return Some(Ok(obj));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
