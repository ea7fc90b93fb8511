use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "oddsboard";
const CACHE_FILE: &str = "http_cache.json";
const RETRY_BACKOFF_MS: u64 = 250;
const ERROR_SNIPPET_CHARS: usize = 220;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

/// Response cache for GET requests.
///
/// Entries younger than `stale_after` are served without touching the
/// network. Older ones are revalidated with `If-None-Match` /
/// `If-Modified-Since`. Owned by whoever builds it; nothing is global.
#[derive(Debug)]
pub struct HttpCache {
    stale_after: Duration,
    retries: u32,
    persist_path: Option<PathBuf>,
    state: Mutex<CacheState>,
}

impl HttpCache {
    pub fn new(stale_after: Duration, retries: u32, persist_path: Option<PathBuf>) -> Self {
        let entries = persist_path
            .as_deref()
            .map(load_cache_file)
            .unwrap_or_default();
        Self {
            stale_after,
            retries,
            persist_path,
            state: Mutex::new(CacheState {
                entries,
                dirty: false,
            }),
        }
    }

    pub fn in_memory(stale_after: Duration, retries: u32) -> Self {
        Self::new(stale_after, retries, None)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry whose key starts with `prefix`; returns how many went.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - state.entries.len();
        if removed > 0 {
            state.dirty = true;
        }
        removed
    }

    /// Writes the cache to its backing file if anything changed.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = self.persist_path.as_deref() else {
            return Ok(());
        };
        let mut state = self.lock();
        if !state.dirty {
            return Ok(());
        }
        let file = HttpCacheFile {
            version: CACHE_VERSION,
            entries: state.entries.clone(),
        };
        save_cache_file(path, &file)?;
        state.dirty = false;
        Ok(())
    }

    /// GETs `url` and returns the body text.
    ///
    /// `query` is part of the cache key; `secret_query` is sent but never
    /// keyed or persisted.
    pub fn fetch_text(
        &self,
        client: &Client,
        url: &str,
        query: &[(&str, &str)],
        secret_query: &[(&str, &str)],
    ) -> Result<String> {
        let key = cache_key(url, query);
        let cached = self.lock().entries.get(&key).cloned();

        if let Some(entry) = cached.as_ref() {
            if is_fresh(entry, now_secs(), self.stale_after) {
                debug!(%key, "http cache hit");
                return Ok(entry.body.clone());
            }
        }

        let build = || {
            let mut req = client.get(url).query(query).query(secret_query);
            if let Some(entry) = cached.as_ref() {
                if let Some(etag) = entry.etag.as_ref() {
                    req = req.header(IF_NONE_MATCH, etag);
                }
                if let Some(last_modified) = entry.last_modified.as_ref() {
                    req = req.header(IF_MODIFIED_SINCE, last_modified);
                }
            }
            req
        };

        let resp = self.send_with_retries(&key, build)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        if status == StatusCode::NOT_MODIFIED {
            if let Some(mut entry) = cached {
                debug!(%key, "http cache revalidated");
                entry.fetched_at = now_secs();
                let body = entry.body.clone();
                self.store(key, entry);
                return Ok(body);
            }
            return Err(anyhow!("received 304 without cache body"));
        }

        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, body_snippet(&body)));
        }

        let header_text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let entry = CacheEntry {
            body: body.clone(),
            etag: header_text(ETAG),
            last_modified: header_text(LAST_MODIFIED),
            fetched_at: now_secs(),
        };
        self.store(key, entry);
        Ok(body)
    }

    fn send_with_retries(
        &self,
        key: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            match build().send() {
                Ok(resp) if is_retryable(resp.status()) && attempt < self.retries => {
                    warn!(%key, status = %resp.status(), attempt, "retrying request");
                }
                Ok(resp) => return Ok(resp),
                Err(err) if attempt < self.retries => {
                    warn!(%key, attempt, "retrying request: {}", err.without_url());
                }
                Err(err) => return Err(err.without_url()).context("request failed"),
            }
            attempt += 1;
            thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)));
        }
    }

    fn store(&self, key: String, entry: CacheEntry) {
        let mut state = self.lock();
        state.entries.insert(key, entry);
        state.dirty = true;
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HttpCache {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!("failed to persist http cache: {err:#}");
        }
    }
}

/// Default on-disk location: `$XDG_CACHE_HOME/oddsboard` or `~/.cache/oddsboard`.
pub fn default_cache_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR).join(CACHE_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(CACHE_FILE))
}

pub(crate) fn body_snippet(body: &str) -> String {
    body.trim()
        .replace(['\n', '\r'], " ")
        .chars()
        .take(ERROR_SNIPPET_CHARS)
        .collect()
}

fn cache_key(url: &str, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let params = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{url}?{params}")
}

fn is_fresh(entry: &CacheEntry, now: u64, stale_after: Duration) -> bool {
    now.saturating_sub(entry.fetched_at) < stale_after.as_secs()
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn load_cache_file(path: &Path) -> HashMap<String, CacheEntry> {
    let Ok(raw) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    let cache = serde_json::from_str::<HttpCacheFile>(&raw).unwrap_or_default();
    if cache.version != CACHE_VERSION {
        return HashMap::new();
    }
    cache.entries
}

fn save_cache_file(path: &Path, cache: &HttpCacheFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("create http cache dir")?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize http cache")?;
    fs::write(&tmp, json).context("write http cache")?;
    fs::rename(&tmp, path).context("swap http cache")?;
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
