//! Scroll-linked behaviors: TOC highlighting and the share toggle.
//!
//! Geometry is a host concern. The host observes elements with the
//! exported observer options and feeds [`IntersectionEntry`] values in;
//! the components only apply the state transitions. This keeps the
//! invariants testable without a viewport.

use crate::dom::{NodeId, SharedDocument};

// ---------------------------------------------------------------------------
// Observer contract
// ---------------------------------------------------------------------------

/// One visibility crossing reported by the host's observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    /// The observed element.
    pub target: NodeId,
    /// Whether the target currently intersects the (inset) viewport.
    pub is_intersecting: bool,
    /// Fraction of the target inside the viewport band, 0.0 to 1.0.
    pub intersection_ratio: f64,
    /// Top of the target's bounding box relative to the viewport top,
    /// in pixels; negative once scrolled past.
    pub bounding_top: f64,
}

/// Options the host should observe a target with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverOptions {
    pub threshold: f64,
    pub root_margin: &'static str,
}

/// Heading observation: a 50% crossing inside a viewport band shrunk at
/// the top and (heavily) at the bottom, so the highlight tracks the
/// heading the reader is actually at.
pub const TOC_OBSERVER: ObserverOptions = ObserverOptions {
    threshold: 0.5,
    root_margin: "50px 0px -55% 0px",
};

/// Landmark observation for the share toggle: full visibility.
pub const SHARE_OBSERVER: ObserverOptions = ObserverOptions {
    threshold: 1.0,
    root_margin: "0px",
};

const ACTIVE_CLASS: &str = "active";
const HIDDEN_CLASS: &str = "u-none";

const TOC_CONTAINER_ID: &str = "TableOfContents-container";
const ARTICLE_CONTENT_ID: &str = "article-content";
const SHARE_ID: &str = "share";
const PAGINATION_ID: &str = "article-pagination";

// ---------------------------------------------------------------------------
// TOC highlighter
// ---------------------------------------------------------------------------

/// One table-of-contents entry: the list item, its link, and the id of
/// the heading the link targets.
struct TocEntry {
    item: NodeId,
    link: Option<NodeId>,
    target_id: Option<String>,
}

/// Keeps exactly one TOC entry marked active, tracking the most
/// recently sufficiently-visible heading, with a click override.
pub struct TocHighlighter {
    dom: SharedDocument,
    entries: Vec<TocEntry>,
    headings: Vec<NodeId>,
    active: usize,
}

impl TocHighlighter {
    /// Bind to the page's table of contents.
    ///
    /// Returns `None` (component inert) when the TOC container is
    /// absent or has no entries. Otherwise the first entry starts
    /// active.
    pub fn init(dom: SharedDocument) -> Option<Self> {
        let (entries, headings) = {
            let mut doc = dom.lock().expect("document lock poisoned");
            let container = match doc.element_by_id(TOC_CONTAINER_ID) {
                Some(c) => c,
                None => {
                    eprintln!("[tocspy] branch=inert reason=no-container");
                    return None;
                }
            };
            let items = doc.elements_by_tag_within(container, "li");
            if items.is_empty() {
                eprintln!("[tocspy] branch=inert reason=empty-toc");
                return None;
            }

            let entries: Vec<TocEntry> = items
                .into_iter()
                .map(|item| {
                    let link = doc.elements_by_tag_within(item, "a").into_iter().next();
                    let target_id = link
                        .and_then(|l| doc.attr(l, "href"))
                        .and_then(|href| href.strip_prefix('#').map(str::to_owned));
                    TocEntry {
                        item,
                        link,
                        target_id,
                    }
                })
                .collect();

            doc.add_class(entries[0].item, ACTIVE_CLASS);

            let headings = match doc.element_by_id(ARTICLE_CONTENT_ID) {
                Some(article) => doc.elements_by_tag_within(article, "h2"),
                None => Vec::new(),
            };
            (entries, headings)
        };

        eprintln!(
            "[tocspy] branch=init entries={} headings={}",
            entries.len(),
            headings.len()
        );
        Some(Self {
            dom,
            entries,
            headings,
            active: 0,
        })
    }

    /// Content headings the host should observe with [`TOC_OBSERVER`].
    pub fn observed_headings(&self) -> &[NodeId] {
        &self.headings
    }

    /// TOC links whose clicks should be routed to [`Self::on_link_click`].
    pub fn links(&self) -> Vec<NodeId> {
        self.entries.iter().filter_map(|e| e.link).collect()
    }

    /// Index of the currently active entry.
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// A heading crossed the visibility threshold; move the highlight
    /// to the entry targeting it.
    pub fn on_heading_entry(&mut self, entry: IntersectionEntry) {
        if !entry.is_intersecting || entry.intersection_ratio < TOC_OBSERVER.threshold {
            return;
        }
        let heading_id = {
            let doc = self.dom.lock().expect("document lock poisoned");
            doc.attr(entry.target, "id")
        };
        let heading_id = match heading_id {
            Some(id) => id,
            None => return,
        };
        let index = self
            .entries
            .iter()
            .position(|e| e.target_id.as_deref() == Some(heading_id.as_str()));
        if let Some(index) = index {
            self.activate(index);
            eprintln!("[tocspy] heading={heading_id} branch=scrolled");
        }
    }

    /// Manual override: a TOC link was clicked. Returns `true` when the
    /// click belonged to this component.
    pub fn on_link_click(&mut self, node: NodeId) -> bool {
        let index = self
            .entries
            .iter()
            .position(|e| e.link == Some(node) || e.item == node);
        match index {
            Some(index) => {
                self.activate(index);
                eprintln!("[tocspy] entry={index} branch=clicked");
                true
            }
            None => false,
        }
    }

    /// Move the active marker. The single-active invariant holds
    /// because the previous holder is cleared in the same step.
    fn activate(&mut self, index: usize) {
        if index == self.active {
            return;
        }
        let mut doc = self.dom.lock().expect("document lock poisoned");
        doc.remove_class(self.entries[self.active].item, ACTIVE_CLASS);
        doc.add_class(self.entries[index].item, ACTIVE_CLASS);
        self.active = index;
    }
}

// ---------------------------------------------------------------------------
// Share toggle
// ---------------------------------------------------------------------------

/// Shows the share affordance once a downstream landmark (pagination
/// block, else page footer) reaches the viewport's top edge; hides it
/// before that.
pub struct ShareToggle {
    dom: SharedDocument,
    share: NodeId,
    landmark: NodeId,
}

impl ShareToggle {
    /// Bind to the page's share affordance and landmark.
    ///
    /// Returns `None` (component inert) when either is absent. The
    /// affordance starts hidden until the first crossing.
    pub fn init(dom: SharedDocument) -> Option<Self> {
        let (share, landmark) = {
            let mut doc = dom.lock().expect("document lock poisoned");
            let share = match doc.element_by_id(SHARE_ID) {
                Some(s) => s,
                None => {
                    eprintln!("[share] branch=inert reason=no-share");
                    return None;
                }
            };
            let landmark = doc
                .element_by_id(PAGINATION_ID)
                .or_else(|| doc.elements_by_tag("footer").into_iter().next());
            let landmark = match landmark {
                Some(l) => l,
                None => {
                    eprintln!("[share] branch=inert reason=no-landmark");
                    return None;
                }
            };
            doc.add_class(share, HIDDEN_CLASS);
            (share, landmark)
        };
        eprintln!("[share] branch=init");
        Some(Self {
            dom,
            share,
            landmark,
        })
    }

    /// The landmark the host should observe with [`SHARE_OBSERVER`].
    pub fn landmark(&self) -> NodeId {
        self.landmark
    }

    /// Apply a landmark visibility crossing.
    pub fn on_landmark_entry(&self, entry: IntersectionEntry) {
        if entry.target != self.landmark {
            return;
        }
        let visible = entry.is_intersecting || entry.bounding_top <= 0.0;
        let mut doc = self.dom.lock().expect("document lock poisoned");
        doc.set_class(self.share, HIDDEN_CLASS, !visible);
        drop(doc);
        eprintln!("[share] visible={visible}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{shared, Document};

    /// Page with a TOC of `n` entries, matching article headings, a
    /// share affordance, and a pagination landmark.
    fn spy_fixture(n: usize) -> SharedDocument {
        let mut doc = Document::new();
        let body = doc.body();

        let nav = doc.create_element("nav");
        doc.set_attr(nav, "id", TOC_CONTAINER_ID);
        let list = doc.create_element("ul");
        doc.append_child(body, nav);
        doc.append_child(nav, list);

        let article = doc.create_element("div");
        doc.set_attr(article, "id", ARTICLE_CONTENT_ID);
        doc.append_child(body, article);

        for i in 0..n {
            let item = doc.create_element("li");
            let link = doc.create_element("a");
            doc.set_attr(link, "href", &format!("#section-{i}"));
            doc.set_text(link, &format!("Section {i}"));
            doc.append_child(list, item);
            doc.append_child(item, link);

            let heading = doc.create_element("h2");
            doc.set_attr(heading, "id", &format!("section-{i}"));
            doc.append_child(article, heading);
        }

        let share = doc.create_element("div");
        doc.set_attr(share, "id", SHARE_ID);
        doc.append_child(body, share);

        let pagination = doc.create_element("div");
        doc.set_attr(pagination, "id", PAGINATION_ID);
        doc.append_child(body, pagination);

        shared(doc)
    }

    fn active_items(dom: &SharedDocument) -> Vec<NodeId> {
        let doc = dom.lock().unwrap();
        doc.elements_by_class(ACTIVE_CLASS)
    }

    fn visible_entry(target: NodeId, ratio: f64) -> IntersectionEntry {
        IntersectionEntry {
            target,
            is_intersecting: true,
            intersection_ratio: ratio,
            bounding_top: 120.0,
        }
    }

    #[test]
    fn init_is_inert_without_container() {
        let dom = shared(Document::new());
        assert!(TocHighlighter::init(dom).is_none());
    }

    #[test]
    fn init_is_inert_with_empty_toc() {
        let mut doc = Document::new();
        let body = doc.body();
        let nav = doc.create_element("nav");
        doc.set_attr(nav, "id", TOC_CONTAINER_ID);
        doc.append_child(body, nav);
        assert!(TocHighlighter::init(shared(doc)).is_none());
    }

    #[test]
    fn first_entry_starts_active() {
        let dom = spy_fixture(3);
        let spy = TocHighlighter::init(dom.clone()).unwrap();
        assert_eq!(spy.active_index(), 0);
        assert_eq!(active_items(&dom).len(), 1, "exactly one active entry");
        assert_eq!(spy.observed_headings().len(), 3);
    }

    #[test]
    fn sufficient_visibility_moves_the_highlight() {
        let dom = spy_fixture(3);
        let mut spy = TocHighlighter::init(dom.clone()).unwrap();
        let second_heading = spy.observed_headings()[1];

        spy.on_heading_entry(visible_entry(second_heading, 0.8));

        assert_eq!(spy.active_index(), 1);
        assert_eq!(active_items(&dom).len(), 1, "exactly one active entry");
    }

    #[test]
    fn below_threshold_crossings_are_ignored() {
        let dom = spy_fixture(2);
        let mut spy = TocHighlighter::init(dom.clone()).unwrap();
        let second_heading = spy.observed_headings()[1];

        spy.on_heading_entry(visible_entry(second_heading, 0.3));
        assert_eq!(spy.active_index(), 0);

        spy.on_heading_entry(IntersectionEntry {
            target: second_heading,
            is_intersecting: false,
            intersection_ratio: 0.9,
            bounding_top: 10.0,
        });
        assert_eq!(spy.active_index(), 0, "non-intersecting entry ignored");
    }

    #[test]
    fn unmatched_heading_keeps_current_active() {
        let dom = spy_fixture(2);
        let mut spy = TocHighlighter::init(dom.clone()).unwrap();

        let stray = {
            let mut doc = dom.lock().unwrap();
            let stray = doc.create_element("h2");
            doc.set_attr(stray, "id", "not-in-toc");
            let body = doc.body();
            doc.append_child(body, stray);
            stray
        };

        spy.on_heading_entry(visible_entry(stray, 1.0));
        assert_eq!(spy.active_index(), 0);
        assert_eq!(active_items(&dom).len(), 1);
    }

    #[test]
    fn link_click_overrides_scroll_position() {
        let dom = spy_fixture(4);
        let mut spy = TocHighlighter::init(dom.clone()).unwrap();
        let links = spy.links();

        assert!(spy.on_link_click(links[3]));
        assert_eq!(spy.active_index(), 3);
        assert_eq!(active_items(&dom).len(), 1, "exactly one active entry");

        // A click on something that is not a TOC link is not consumed.
        let foreign = {
            let mut doc = dom.lock().unwrap();
            doc.create_element("a")
        };
        assert!(!spy.on_link_click(foreign));
        assert_eq!(spy.active_index(), 3);
    }

    #[test]
    fn share_starts_hidden() {
        let dom = spy_fixture(1);
        let toggle = ShareToggle::init(dom.clone()).unwrap();
        let doc = dom.lock().unwrap();
        let share = doc.element_by_id(SHARE_ID).unwrap();
        assert!(doc.has_class(share, HIDDEN_CLASS));
        drop(doc);

        // Landmark well below the top edge: stays hidden.
        toggle.on_landmark_entry(IntersectionEntry {
            target: toggle.landmark(),
            is_intersecting: false,
            intersection_ratio: 0.0,
            bounding_top: 900.0,
        });
        let doc = dom.lock().unwrap();
        let share = doc.element_by_id(SHARE_ID).unwrap();
        assert!(doc.has_class(share, HIDDEN_CLASS));
    }

    #[test]
    fn share_appears_when_landmark_intersects() {
        let dom = spy_fixture(1);
        let toggle = ShareToggle::init(dom.clone()).unwrap();

        toggle.on_landmark_entry(IntersectionEntry {
            target: toggle.landmark(),
            is_intersecting: true,
            intersection_ratio: 1.0,
            bounding_top: 400.0,
        });

        let doc = dom.lock().unwrap();
        let share = doc.element_by_id(SHARE_ID).unwrap();
        assert!(!doc.has_class(share, HIDDEN_CLASS));
    }

    #[test]
    fn share_stays_visible_once_landmark_scrolled_past() {
        let dom = spy_fixture(1);
        let toggle = ShareToggle::init(dom.clone()).unwrap();

        toggle.on_landmark_entry(IntersectionEntry {
            target: toggle.landmark(),
            is_intersecting: false,
            intersection_ratio: 0.0,
            bounding_top: -250.0,
        });

        let doc = dom.lock().unwrap();
        let share = doc.element_by_id(SHARE_ID).unwrap();
        assert!(
            !doc.has_class(share, HIDDEN_CLASS),
            "landmark above the viewport keeps the affordance visible"
        );
    }

    #[test]
    fn share_ignores_entries_for_other_targets() {
        let dom = spy_fixture(1);
        let toggle = ShareToggle::init(dom.clone()).unwrap();
        let other = {
            let mut doc = dom.lock().unwrap();
            doc.create_element("div")
        };

        toggle.on_landmark_entry(IntersectionEntry {
            target: other,
            is_intersecting: true,
            intersection_ratio: 1.0,
            bounding_top: 0.0,
        });

        let doc = dom.lock().unwrap();
        let share = doc.element_by_id(SHARE_ID).unwrap();
        assert!(doc.has_class(share, HIDDEN_CLASS), "foreign target ignored");
    }

    #[test]
    fn landmark_falls_back_to_footer() {
        let mut doc = Document::new();
        let body = doc.body();
        let share = doc.create_element("div");
        doc.set_attr(share, "id", SHARE_ID);
        doc.append_child(body, share);
        let footer = doc.create_element("footer");
        doc.append_child(body, footer);
        let dom = shared(doc);

        let toggle = ShareToggle::init(dom.clone()).unwrap();
        assert_eq!(toggle.landmark(), footer);
    }

    #[test]
    fn share_inert_without_affordance_or_landmark() {
        let dom = shared(Document::new());
        assert!(ShareToggle::init(dom).is_none());

        let mut doc = Document::new();
        let body = doc.body();
        let share = doc.create_element("div");
        doc.set_attr(share, "id", SHARE_ID);
        doc.append_child(body, share);
        assert!(
            ShareToggle::init(shared(doc)).is_none(),
            "share without landmark is inert"
        );
    }
}
