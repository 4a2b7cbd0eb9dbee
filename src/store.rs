//! Object-store seam: paginated listing and whole-object reads.
//!
//! `DirStore` serves a local mirror of a bucket (keys are `/`-separated paths relative to the
//! root); `MemoryStore` keeps objects in a sorted map and is handy for embedding and tests.

use crate::util::open_with_backoff;
use anyhow::{anyhow, Context, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Default number of entries returned per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One listed object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
}

/// One page of a prefix listing. `next_token` is `None` on the last page.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    pub next_token: Option<String>,
}

/// Minimal object-store client shared read-only by all fetch workers.
pub trait ObjectStore: Send + Sync {
    /// List one page of objects whose keys start with `prefix`, resuming after `token`.
    fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage>;

    /// Read a whole object.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Upper bound on simultaneous requests the client can serve, if it has one.
    fn max_connections(&self) -> Option<usize> {
        None
    }
}

/// Cut a page out of a key-sorted listing; the token is the last key handed out.
fn page_after(sorted: &[ObjectMeta], prefix: &str, token: Option<&str>, page_size: usize) -> ListPage {
    let start = match token {
        Some(t) => sorted.partition_point(|o| o.key.as_str() <= t),
        None => sorted.partition_point(|o| o.key.as_str() < prefix),
    };
    let objects: Vec<ObjectMeta> = sorted[start..]
        .iter()
        .take_while(|o| o.key.starts_with(prefix))
        .take(page_size.max(1))
        .cloned()
        .collect();

    let more = sorted
        .get(start + objects.len())
        .map(|o| o.key.starts_with(prefix))
        .unwrap_or(false);
    let next_token = if more { objects.last().map(|o| o.key.clone()) } else { None };
    ListPage { objects, next_token }
}

// ----------------------------- Directory-backed store ------------------------------------

pub struct DirStore {
    root: PathBuf,
    page_size: usize,
    max_connections: Option<usize>,
    read_buffer_bytes: usize,
    listing: Mutex<Option<Arc<Vec<ObjectMeta>>>>,
}

impl DirStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
            max_connections: None,
            read_buffer_bytes: 64 * 1024,
            listing: Mutex::new(None),
        }
    }
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }
    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = Some(n.max(1));
        self
    }
    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree once and cache a key-sorted snapshot for all later pages.
    fn snapshot(&self) -> Result<Arc<Vec<ObjectMeta>>> {
        let mut guard = self.listing.lock();
        if let Some(list) = guard.as_ref() {
            return Ok(list.clone());
        }
        if !self.root.is_dir() {
            return Err(anyhow!("store root {} is not a directory", self.root.display()));
        }
        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).follow_links(true) {
            let ent = entry.with_context(|| format!("walk {}", self.root.display()))?;
            if !ent.file_type().is_file() {
                continue;
            }
            let rel = ent.path().strip_prefix(&self.root).unwrap_or(ent.path());
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size = ent.metadata().map(|m| m.len()).unwrap_or(0);
            objects.push(ObjectMeta { key, size });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        let list = Arc::new(objects);
        *guard = Some(list.clone());
        Ok(list)
    }
}

impl ObjectStore for DirStore {
    fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        let all = self.snapshot()?;
        Ok(page_after(&all, prefix, token, self.page_size))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = key.split('/').fold(self.root.clone(), |p, part| p.join(part));
        let mut f = open_with_backoff(&path, 4, 25).with_context(|| format!("open {}", path.display()))?;
        let mut buf = Vec::with_capacity(self.read_buffer_bytes.min(1 << 20));
        f.read_to_end(&mut buf).with_context(|| format!("read {}", path.display()))?;
        Ok(buf)
    }

    fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }
}

// ----------------------------- In-memory store ------------------------------------

pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { objects: RwLock::new(BTreeMap::new()), page_size: DEFAULT_PAGE_SIZE }
    }
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }

    pub fn put(&self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.objects.write().insert(key.into(), body.into());
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectStore for MemoryStore {
    fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        let sorted: Vec<ObjectMeta> = self
            .objects
            .read()
            .iter()
            .map(|(k, v)| ObjectMeta { key: k.clone(), size: v.len() as u64 })
            .collect();
        Ok(page_after(&sorted, prefix, token, self.page_size))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no such key: {key}"))
    }
}
