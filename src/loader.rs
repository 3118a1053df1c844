//! Dynamic script loading.
//!
//! [`ScriptLoader::load`] injects a script element for a URL exactly
//! once per page session and resolves when the fetch completes. Repeat
//! requests for a loaded URL resolve immediately; concurrent requests
//! for an unseen URL coalesce onto one injection and share its outcome.
//!
//! A failed load rejects with the [`LoadError`] alone and leaves the
//! URL unrecorded, so a later request injects again.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::dom::SharedDocument;
use crate::session::{LoadSignal, PageSession};
use crate::BoxFuture;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A script failed to load.
///
/// Cloneable so one failure can be broadcast to every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    /// The script URL that failed.
    pub url: String,
    /// Human-readable cause.
    pub message: String,
}

impl LoadError {
    pub fn new(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_owned(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script load failed for {}: {}", self.url, self.message)
    }
}

impl std::error::Error for LoadError {}

/// Host seam that fetches (and notionally executes) a script URL.
pub trait ScriptFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), LoadError>>;
}

/// Deduplicated, in-flight-coalesced script loader.
///
/// Cheap to clone; clones share the same session registry.
#[derive(Clone)]
pub struct ScriptLoader {
    dom: SharedDocument,
    session: Arc<PageSession>,
    fetcher: Arc<dyn ScriptFetcher>,
}

/// Outcome of the registry check for one `load` call.
enum Admission {
    /// URL already loaded this session.
    Cached,
    /// Another call is loading this URL; await its outcome.
    Wait(LoadSignal),
    /// This call owns the injection and must broadcast the outcome.
    Lead(watch::Sender<Option<Result<(), LoadError>>>),
}

impl ScriptLoader {
    pub fn new(
        dom: SharedDocument,
        session: Arc<PageSession>,
        fetcher: Arc<dyn ScriptFetcher>,
    ) -> Self {
        Self {
            dom,
            session,
            fetcher,
        }
    }

    /// Load `src`, injecting a script element at most once per distinct
    /// URL per session.
    ///
    /// Resolution: already-loaded URLs resolve immediately; in-flight
    /// URLs resolve with the shared outcome; new URLs inject one
    /// element (before the first existing script element, else appended
    /// to `<head>`) and resolve when the fetch completes.
    pub async fn load(&self, src: &str) -> Result<(), LoadError> {
        let admission = {
            let mut registry = self.session.scripts.lock().await;
            if registry.loaded.contains(src) {
                Admission::Cached
            } else if let Some(signal) = registry.pending.get(src) {
                Admission::Wait(signal.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                registry.pending.insert(src.to_owned(), rx);
                Admission::Lead(tx)
            }
        };

        match admission {
            Admission::Cached => {
                eprintln!("[loader] src={src} branch=cached");
                Ok(())
            }
            Admission::Wait(mut signal) => {
                eprintln!("[loader] src={src} branch=coalesced");
                match signal.wait_for(|outcome| outcome.is_some()).await {
                    Ok(outcome) => match (*outcome).clone() {
                        Some(result) => result,
                        None => Err(LoadError::new(src, "load interrupted")),
                    },
                    Err(_) => Err(LoadError::new(src, "load interrupted")),
                }
            }
            Admission::Lead(tx) => {
                self.inject(src);
                let result = self.fetcher.fetch(src).await;
                {
                    let mut registry = self.session.scripts.lock().await;
                    if result.is_ok() {
                        registry.loaded.insert(src.to_owned());
                    }
                    registry.pending.remove(src);
                    let _ = tx.send(Some(result.clone()));
                }
                eprintln!("[loader] src={src} branch=injected ok={}", result.is_ok());
                result
            }
        }
    }

    /// Insert the script element before the first existing script
    /// element, or append it to `<head>` when the page has none.
    fn inject(&self, src: &str) {
        let mut dom = self.dom.lock().expect("document lock poisoned");
        let script = dom.create_element("script");
        dom.set_attr(script, "type", "text/javascript");
        dom.set_attr(script, "src", src);
        dom.set_attr(script, "async", "");

        let anchor = dom.elements_by_tag("script").into_iter().next();
        match anchor.and_then(|first| dom.parent(first).map(|p| (p, first))) {
            Some((parent, first)) => dom.insert_before(parent, script, first),
            None => {
                let head = dom.head();
                dom.append_child(head, script);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Live fetcher
// ---------------------------------------------------------------------------

/// [`ScriptFetcher`] backed by an HTTP client. A load counts as
/// complete once the response body has been received with a success
/// status.
pub struct HttpScriptFetcher {
    client: reqwest::Client,
}

impl HttpScriptFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpScriptFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptFetcher for HttpScriptFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), LoadError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| LoadError::new(url, format!("request failed: {e}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(LoadError::new(url, format!("unexpected status {status}")));
            }
            response
                .bytes()
                .await
                .map_err(|e| LoadError::new(url, format!("body read failed: {e}")))?;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{shared, Document};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher that counts calls and yields once so concurrent callers
    /// can interleave deterministically on a current-thread runtime.
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ScriptFetcher for CountingFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), LoadError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                if self.fail {
                    Err(LoadError::new(url, "connection refused"))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn loader_with(fetcher: Arc<CountingFetcher>) -> (ScriptLoader, SharedDocument) {
        let dom = shared(Document::new());
        let session = Arc::new(PageSession::new());
        let loader = ScriptLoader::new(dom.clone(), session, fetcher);
        (loader, dom)
    }

    fn script_count(dom: &SharedDocument) -> usize {
        dom.lock().unwrap().elements_by_tag("script").len()
    }

    const SRC: &str = "https://cdn.example/search-client.js";

    #[tokio::test]
    async fn repeat_load_injects_once_and_both_resolve() {
        let fetcher = CountingFetcher::ok();
        let (loader, dom) = loader_with(fetcher.clone());

        assert!(loader.load(SRC).await.is_ok());
        assert!(loader.load(SRC).await.is_ok());

        assert_eq!(script_count(&dom), 1, "exactly one script node expected");
        assert_eq!(fetcher.calls(), 1, "second request must hit the cache");
    }

    #[tokio::test]
    async fn concurrent_loads_coalesce_onto_one_injection() {
        let fetcher = CountingFetcher::ok();
        let (loader, dom) = loader_with(fetcher.clone());

        let (a, b) = tokio::join!(loader.load(SRC), loader.load(SRC));
        assert!(a.is_ok() && b.is_ok());

        assert_eq!(script_count(&dom), 1, "coalesced load must inject once");
        assert_eq!(fetcher.calls(), 1, "coalesced load must fetch once");
    }

    #[tokio::test]
    async fn coalesced_callers_share_a_failure() {
        let fetcher = CountingFetcher::failing();
        let (loader, _dom) = loader_with(fetcher.clone());

        let (a, b) = tokio::join!(loader.load(SRC), loader.load(SRC));
        assert_eq!(a, b, "both callers must observe the same outcome");
        let err = a.expect_err("failing fetcher must reject");
        assert_eq!(err.url, SRC);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_retryable() {
        let fetcher = CountingFetcher::failing();
        let (loader, dom) = loader_with(fetcher.clone());

        assert!(loader.load(SRC).await.is_err());
        assert!(loader.load(SRC).await.is_err(), "failure is not cached");

        // Each attempt injects a fresh node; only success is recorded.
        assert_eq!(script_count(&dom), 2);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn distinct_urls_inject_distinct_nodes() {
        let fetcher = CountingFetcher::ok();
        let (loader, dom) = loader_with(fetcher);

        loader.load("https://cdn.example/a.js").await.unwrap();
        loader.load("https://cdn.example/b.js").await.unwrap();
        assert_eq!(script_count(&dom), 2);
    }

    #[tokio::test]
    async fn injection_lands_before_first_existing_script() {
        let fetcher = CountingFetcher::ok();
        let (loader, dom) = loader_with(fetcher);

        let existing = {
            let mut doc = dom.lock().unwrap();
            let existing = doc.create_element("script");
            doc.set_attr(existing, "src", "/assets/site.js");
            let body = doc.body();
            doc.append_child(body, existing);
            existing
        };

        loader.load(SRC).await.unwrap();

        let doc = dom.lock().unwrap();
        let scripts = doc.elements_by_tag("script");
        assert_eq!(scripts.len(), 2);
        assert_eq!(
            scripts.last(),
            Some(&existing),
            "new node must precede the pre-existing script"
        );
        assert_eq!(doc.attr(scripts[0], "src").as_deref(), Some(SRC));
    }

    #[tokio::test]
    async fn injection_falls_back_to_head_append() {
        let fetcher = CountingFetcher::ok();
        let (loader, dom) = loader_with(fetcher);

        loader.load(SRC).await.unwrap();

        let doc = dom.lock().unwrap();
        let head_children = doc.children(doc.head());
        assert_eq!(head_children.len(), 1);
        assert_eq!(doc.tag(head_children[0]), "script");
    }

    #[test]
    fn load_error_display_names_the_url() {
        let err = LoadError::new(SRC, "timed out");
        let rendered = err.to_string();
        assert!(rendered.contains(SRC), "got: {rendered}");
        assert!(rendered.contains("timed out"), "got: {rendered}");
    }
}
