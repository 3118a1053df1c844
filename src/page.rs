//! Load-time wiring and event dispatch.
//!
//! [`Page::open`] performs the one-shot enhancement pass a page gets at
//! load: it scans the document for the recognized markup and constructs
//! each component that finds its elements. Components are independent;
//! missing markup disables only the component that needed it.
//!
//! Afterwards the host feeds [`PageEvent`]s into [`Page::handle`].
//! Events are processed in arrival order on one logical thread;
//! suspension happens only at network and probe awaits.

use std::sync::Arc;

use crate::dom::{shared, Document, SharedDocument, NodeId};
use crate::embed::{ImageDecodeProbe, PosterProbe, VideoEmbed, EMBED_TAG};
use crate::lightbox::LightboxLinks;
use crate::loader::{HttpScriptFetcher, ScriptFetcher, ScriptLoader};
use crate::scrollspy::{IntersectionEntry, ShareToggle, TocHighlighter};
use crate::search::{HostedIndexProvider, IndexProvider, SearchConfig, SearchWidget};
use crate::session::PageSession;

// ---------------------------------------------------------------------------
// Host seams
// ---------------------------------------------------------------------------

/// The capabilities a page borrows from its host.
pub struct HostServices {
    pub script_fetcher: Arc<dyn ScriptFetcher>,
    pub index_provider: Arc<dyn IndexProvider>,
    pub poster_probe: Arc<dyn PosterProbe>,
}

impl HostServices {
    /// Live services: HTTP script fetches, the hosted search index, and
    /// an actual image-decode capability probe.
    pub fn live(config: &SearchConfig) -> Self {
        Self {
            script_fetcher: Arc::new(HttpScriptFetcher::new()),
            index_provider: Arc::new(HostedIndexProvider::new(config.clone())),
            poster_probe: Arc::new(ImageDecodeProbe),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Host-dispatched page events.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// Pointer moved over an element (or one of its descendants).
    PointerOver(NodeId),
    /// An element was clicked.
    Click(NodeId),
    /// The search input's value changed.
    SearchInput(String),
    /// The search reset affordance was triggered.
    SearchReset,
    /// The search form was submitted.
    SearchSubmit,
    /// A content heading crossed the TOC observer's threshold.
    HeadingVisibility(IntersectionEntry),
    /// The share landmark crossed the share observer's threshold.
    LandmarkVisibility(IntersectionEntry),
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// One enhanced page: the document, its session state, and every
/// component the load-time pass attached.
pub struct Page {
    dom: SharedDocument,
    session: Arc<PageSession>,
    embeds: Vec<VideoEmbed>,
    search: Option<SearchWidget>,
    toc: Option<TocHighlighter>,
    share: Option<ShareToggle>,
    lightbox: LightboxLinks,
}

impl Page {
    /// Enhance `document`: attach every component whose markup is
    /// present. The equivalent of the load-time listener pass.
    pub async fn open(document: Document, services: HostServices, config: SearchConfig) -> Self {
        let dom = shared(document);
        let session = Arc::new(PageSession::new());
        let loader = ScriptLoader::new(
            dom.clone(),
            session.clone(),
            services.script_fetcher.clone(),
        );

        let embed_elements = {
            let doc = dom.lock().expect("document lock poisoned");
            doc.elements_by_tag(EMBED_TAG)
        };
        let mut embeds = Vec::with_capacity(embed_elements.len());
        for element in embed_elements {
            if let Some(embed) =
                VideoEmbed::attach(&dom, &session, &services.poster_probe, element).await
            {
                embeds.push(embed);
            }
        }

        let search = SearchWidget::bind(
            dom.clone(),
            session.clone(),
            loader,
            services.index_provider.clone(),
            config,
        );
        let toc = TocHighlighter::init(dom.clone());
        let share = ShareToggle::init(dom.clone());
        let lightbox = LightboxLinks::init(dom.clone());

        eprintln!(
            "[page] branch=open embeds={} search={} toc={} share={} lightbox-links={}",
            embeds.len(),
            search.is_some(),
            toc.is_some(),
            share.is_some(),
            lightbox.links().len(),
        );

        Self {
            dom,
            session,
            embeds,
            search,
            toc,
            share,
            lightbox,
        }
    }

    /// Shared handle to the enhanced document.
    pub fn document(&self) -> SharedDocument {
        self.dom.clone()
    }

    /// The page-session state.
    pub fn session(&self) -> Arc<PageSession> {
        self.session.clone()
    }

    /// Attached embeds, in document order.
    pub fn embeds(&self) -> &[VideoEmbed] {
        &self.embeds
    }

    /// The search widget, when the page carries search markup.
    pub fn search(&self) -> Option<&SearchWidget> {
        self.search.as_ref()
    }

    /// The TOC highlighter, when the page has a table of contents.
    pub fn toc(&self) -> Option<&TocHighlighter> {
        self.toc.as_ref()
    }

    /// The share toggle, when the page has a share affordance.
    pub fn share(&self) -> Option<&ShareToggle> {
        self.share.as_ref()
    }

    /// The lightbox behavior (inert when the page has no annotated links).
    pub fn lightbox(&self) -> &LightboxLinks {
        &self.lightbox
    }

    /// Dispatch one page event to whichever component claims it.
    pub async fn handle(&mut self, event: PageEvent) {
        match event {
            PageEvent::PointerOver(node) => {
                if let Some(index) = self.embed_at(node) {
                    self.embeds[index].on_pointer_over(&self.dom, &self.session);
                }
            }
            PageEvent::Click(node) => {
                if self.lightbox.on_click(node) {
                    return;
                }
                if let Some(index) = self.embed_at(node) {
                    self.embeds[index].activate(&self.dom);
                    return;
                }
                if let Some(toc) = self.toc.as_mut() {
                    if toc.on_link_click(node) {
                        return;
                    }
                }
                if let Some(widget) = self.search.as_ref() {
                    if widget.reset_node() == node {
                        widget.reset();
                    }
                }
            }
            PageEvent::SearchInput(value) => {
                if let Some(widget) = self.search.as_ref() {
                    if let Err(err) = widget.on_input(&value).await {
                        // The widget keeps its last rendered state.
                        eprintln!("[page] branch=search-error err={err}");
                    }
                }
            }
            PageEvent::SearchReset => {
                if let Some(widget) = self.search.as_ref() {
                    widget.reset();
                }
            }
            PageEvent::SearchSubmit => {
                if let Some(widget) = self.search.as_ref() {
                    widget.on_submit();
                }
            }
            PageEvent::HeadingVisibility(entry) => {
                if let Some(toc) = self.toc.as_mut() {
                    toc.on_heading_entry(entry);
                }
            }
            PageEvent::LandmarkVisibility(entry) => {
                if let Some(share) = self.share.as_ref() {
                    share.on_landmark_entry(entry);
                }
            }
        }
    }

    /// Index of the embed whose element is `node` or contains it.
    fn embed_at(&self, node: NodeId) -> Option<usize> {
        let doc = self.dom.lock().expect("document lock poisoned");
        self.embeds
            .iter()
            .position(|embed| doc.contains(embed.element(), node))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
