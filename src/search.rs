//! Search-as-you-type against a hosted search index.
//!
//! The widget binds the search-box elements and runs a small state
//! machine over the input: `Empty -> Querying -> ShowingResults`, back
//! to `Empty` on reset. All ranking and highlighting is delegated to
//! the hosted index; the widget renders whatever hits come back.
//!
//! Every query carries a monotonically increasing token and a response
//! is applied only while its token is still the latest issued one, so
//! a slow response can never overwrite a newer query or a reset.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::dom::{NodeId, SharedDocument};
use crate::loader::ScriptLoader;
use crate::session::PageSession;
use crate::BoxFuture;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Search client library loaded lazily on the first keystroke.
pub const SEARCH_CLIENT_SRC: &str =
    "https://cdn.jsdelivr.net/npm/algoliasearch@4.5.1/dist/algoliasearch-lite.umd.js";

/// Hosted-index access configuration.
///
/// The defaults are the site's fixed public search-only credentials;
/// the key grants queries and nothing else.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub application_id: String,
    pub api_key: String,
    pub index_name: String,
    pub hits_per_page: usize,
    pub client_src: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            application_id: "QK9VV9YO5F".to_owned(),
            api_key: "247bb355c786b6e9f528bc382cab3039".to_owned(),
            index_name: "prod_blog_content".to_owned(),
            hits_per_page: 3,
            client_src: SEARCH_CLIENT_SRC.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A search operation failed. Failures leave the rendered results
/// untouched; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// The search client script failed to load.
    ClientLoad(String),
    /// The query request could not be sent.
    Request(String),
    /// The index answered with a non-success status.
    Status(u16),
    /// The response body did not match the expected shape.
    Decode(String),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::ClientLoad(msg) => write!(f, "search client load failed: {msg}"),
            SearchError::Request(msg) => write!(f, "search request failed: {msg}"),
            SearchError::Status(code) => write!(f, "search index returned status {code}"),
            SearchError::Decode(msg) => write!(f, "search response decode failed: {msg}"),
        }
    }
}

impl std::error::Error for SearchError {}

// ---------------------------------------------------------------------------
// Index seam
// ---------------------------------------------------------------------------

/// One search hit as rendered: a target link plus title/description
/// fragments pre-highlighted by the backend (trusted markup).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub url: String,
    pub title: String,
    pub description: String,
}

/// Queryable handle to a hosted search index.
pub trait SearchIndex: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        hits_per_page: usize,
    ) -> BoxFuture<'a, Result<Vec<Hit>, SearchError>>;
}

/// Opens the index handle. Called at most once per page session; the
/// handle is memoized on the session afterwards.
pub trait IndexProvider: Send + Sync {
    fn open(&self) -> Result<Arc<dyn SearchIndex>, SearchError>;
}

// ---------------------------------------------------------------------------
// Hosted index client (wire format)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct QueryRequest {
    params: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    link: String,
    #[serde(rename = "_highlightResult")]
    highlight: RawHighlight,
}

#[derive(Deserialize)]
struct RawHighlight {
    title: RawFragment,
    description: RawFragment,
}

#[derive(Deserialize)]
struct RawFragment {
    value: String,
}

impl From<RawHit> for Hit {
    fn from(raw: RawHit) -> Self {
        Self {
            url: raw.link,
            title: raw.highlight.title.value,
            description: raw.highlight.description.value,
        }
    }
}

/// Decode a query response body into hits.
fn decode_response(body: &str) -> Result<Vec<Hit>, SearchError> {
    let parsed: QueryResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;
    Ok(parsed.hits.into_iter().map(Hit::from).collect())
}

/// [`SearchIndex`] backed by the hosted REST endpoint.
pub struct HostedSearchIndex {
    client: reqwest::Client,
    endpoint: String,
    application_id: String,
    api_key: String,
}

impl HostedSearchIndex {
    pub fn new(config: &SearchConfig) -> Self {
        let endpoint = format!(
            "https://{}-dsn.algolia.net/1/indexes/{}/query",
            config.application_id.to_lowercase(),
            config.index_name,
        );
        Self {
            client: reqwest::Client::new(),
            endpoint,
            application_id: config.application_id.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

impl SearchIndex for HostedSearchIndex {
    fn search<'a>(
        &'a self,
        query: &'a str,
        hits_per_page: usize,
    ) -> BoxFuture<'a, Result<Vec<Hit>, SearchError>> {
        Box::pin(async move {
            let params = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("query", query)
                .append_pair("hitsPerPage", &hits_per_page.to_string())
                .finish();
            let response = self
                .client
                .post(&self.endpoint)
                .header("X-Algolia-Application-Id", &self.application_id)
                .header("X-Algolia-API-Key", &self.api_key)
                .json(&QueryRequest { params })
                .send()
                .await
                .map_err(|e| SearchError::Request(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(SearchError::Status(status.as_u16()));
            }
            let body = response
                .text()
                .await
                .map_err(|e| SearchError::Request(e.to_string()))?;
            decode_response(&body)
        })
    }
}

/// [`IndexProvider`] constructing a [`HostedSearchIndex`].
pub struct HostedIndexProvider {
    config: SearchConfig,
}

impl HostedIndexProvider {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }
}

impl IndexProvider for HostedIndexProvider {
    fn open(&self) -> Result<Arc<dyn SearchIndex>, SearchError> {
        Ok(Arc::new(HostedSearchIndex::new(&self.config)))
    }
}

// ---------------------------------------------------------------------------
// Widget
// ---------------------------------------------------------------------------

/// Observable widget state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Empty,
    Querying,
    ShowingResults,
}

const HITS_ITEM_CLASS: &str = "ais-Hits-item";
const FORM_CLASS: &str = "ais-SearchBox-form";
const INPUT_CLASS: &str = "ais-SearchBox-input";
const RESET_CLASS: &str = "ais-SearchBox-reset";
const HITS_ID: &str = "hits";

/// The search-box widget bound to its page elements.
pub struct SearchWidget {
    dom: SharedDocument,
    session: Arc<PageSession>,
    loader: ScriptLoader,
    provider: Arc<dyn IndexProvider>,
    config: SearchConfig,
    form: NodeId,
    input: NodeId,
    reset: NodeId,
    hits: NodeId,
    latest_token: AtomicU64,
    phase: Mutex<SearchPhase>,
}

impl SearchWidget {
    /// Bind the widget to the page's search-box markup.
    ///
    /// Returns `None` (widget inert) when any of the form, input,
    /// reset, or hits elements is missing.
    pub fn bind(
        dom: SharedDocument,
        session: Arc<PageSession>,
        loader: ScriptLoader,
        provider: Arc<dyn IndexProvider>,
        config: SearchConfig,
    ) -> Option<Self> {
        let (form, input, reset, hits) = {
            let doc = dom.lock().expect("document lock poisoned");
            let root = doc.root();
            let form = doc.first_by_class_within(root, FORM_CLASS);
            let input = doc.first_by_class_within(root, INPUT_CLASS);
            let reset = doc.first_by_class_within(root, RESET_CLASS);
            let hits = doc.element_by_id(HITS_ID);
            match (form, input, reset, hits) {
                (Some(f), Some(i), Some(r), Some(h)) => (f, i, r, h),
                _ => {
                    eprintln!("[search] branch=inert reason=missing-markup");
                    return None;
                }
            }
        };
        Some(Self {
            dom,
            session,
            loader,
            provider,
            config,
            form,
            input,
            reset,
            hits,
            latest_token: AtomicU64::new(0),
            phase: Mutex::new(SearchPhase::Empty),
        })
    }

    pub fn form_node(&self) -> NodeId {
        self.form
    }

    pub fn input_node(&self) -> NodeId {
        self.input
    }

    pub fn reset_node(&self) -> NodeId {
        self.reset
    }

    pub fn hits_node(&self) -> NodeId {
        self.hits
    }

    /// Current widget phase.
    pub fn phase(&self) -> SearchPhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    fn set_phase(&self, phase: SearchPhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    fn next_token(&self) -> u64 {
        self.latest_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn latest(&self) -> u64 {
        self.latest_token.load(Ordering::SeqCst)
    }

    /// Form submission is suppressed; search never navigates.
    pub fn on_submit(&self) {
        eprintln!("[search] branch=submit action=suppressed");
    }

    /// Explicit reset: clear the input, empty the results, hide the
    /// results and reset affordances. Any in-flight query becomes stale.
    pub fn reset(&self) {
        self.next_token();
        let mut doc = self.dom.lock().expect("document lock poisoned");
        doc.set_attr(self.input, "value", "");
        doc.clear_children(self.hits);
        doc.set_hidden(self.hits, true);
        doc.set_hidden(self.reset, true);
        drop(doc);
        self.set_phase(SearchPhase::Empty);
        eprintln!("[search] branch=reset");
    }

    /// Handle an input change.
    ///
    /// An empty value clears the rendered results synchronously,
    /// independent of any in-flight query. A non-empty value shows the
    /// affordances, lazily bootstraps the search client, queries the
    /// memoized index handle, and applies the response only while its
    /// token is still the latest issued one.
    pub async fn on_input(&self, value: &str) -> Result<(), SearchError> {
        let token = self.next_token();
        {
            let mut doc = self.dom.lock().expect("document lock poisoned");
            doc.set_attr(self.input, "value", value);
        }

        if value.is_empty() {
            let mut doc = self.dom.lock().expect("document lock poisoned");
            doc.clear_children(self.hits);
            doc.set_hidden(self.hits, true);
            doc.set_hidden(self.reset, true);
            drop(doc);
            self.set_phase(SearchPhase::Empty);
            eprintln!("[search] token={token} branch=cleared");
            return Ok(());
        }

        {
            let mut doc = self.dom.lock().expect("document lock poisoned");
            doc.set_hidden(self.reset, false);
            doc.set_hidden(self.hits, false);
        }
        self.set_phase(SearchPhase::Querying);

        self.loader
            .load(&self.config.client_src)
            .await
            .map_err(|e| SearchError::ClientLoad(e.to_string()))?;

        let index = self
            .session
            .search_index
            .get_or_try_init(|| async { self.provider.open() })
            .await?
            .clone();

        let hits = index.search(value, self.config.hits_per_page).await?;

        if self.latest() != token {
            eprintln!(
                "[search] token={token} branch=stale latest={}",
                self.latest()
            );
            return Ok(());
        }

        self.render_hits(&hits);
        self.set_phase(SearchPhase::ShowingResults);
        eprintln!("[search] token={token} hits={} branch=rendered", hits.len());
        Ok(())
    }

    /// Replace the hits list wholesale with `hits`.
    fn render_hits(&self, hits: &[Hit]) {
        let mut doc = self.dom.lock().expect("document lock poisoned");
        doc.clear_children(self.hits);
        for hit in hits {
            let item = doc.create_element("li");
            doc.add_class(item, HITS_ITEM_CLASS);
            let link = doc.create_element("a");
            doc.set_attr(link, "href", &hit.url);
            doc.set_raw_html(link, &hit.title);
            let wrap = doc.create_element("div");
            let detail = doc.create_element("small");
            doc.set_raw_html(detail, &hit.description);
            doc.append_child(item, link);
            doc.append_child(link, wrap);
            doc.append_child(wrap, detail);
            doc.append_child(self.hits, item);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
