//! Legacy lightbox player for annotated video links.
//!
//! Predates the lazy embed element: a link carrying the `youtube-link`
//! class and a `data-id` attribute opens, on click, a full-page
//! `#lightbox` overlay containing a close affordance and an autoplaying
//! player frame. Clicking the close affordance removes the overlay; the
//! close handler is one-shot because the overlay it belongs to is gone.

use crate::dom::{NodeId, SharedDocument};
use crate::embed::PLAYER_ALLOW;

const LINK_CLASS: &str = "youtube-link";
const LIGHTBOX_ID: &str = "lightbox";

/// Host of the overlay player (the legacy links never migrated to the
/// privacy-enhanced embed host).
const OVERLAY_PLAYER_HOST: &str = "https://www.youtube.com";

/// The currently open overlay, if any.
struct OpenOverlay {
    overlay: NodeId,
    close: NodeId,
}

/// Click-to-overlay behavior for all annotated links on the page.
pub struct LightboxLinks {
    dom: SharedDocument,
    links: Vec<NodeId>,
    open: Option<OpenOverlay>,
}

impl LightboxLinks {
    /// Collect the page's annotated links. A page without any is served
    /// by an inert instance; clicks simply fall through.
    pub fn init(dom: SharedDocument) -> Self {
        let links = {
            let doc = dom.lock().expect("document lock poisoned");
            doc.elements_by_class(LINK_CLASS)
        };
        if !links.is_empty() {
            eprintln!("[lightbox] branch=init links={}", links.len());
        }
        Self {
            dom,
            links,
            open: None,
        }
    }

    /// The annotated link elements this component handles.
    pub fn links(&self) -> &[NodeId] {
        &self.links
    }

    /// Whether an overlay is currently open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Route a click. Returns `true` when the click belonged to this
    /// component (an annotated link or the open overlay's close
    /// affordance).
    pub fn on_click(&mut self, node: NodeId) -> bool {
        if let Some(open) = &self.open {
            if node == open.close {
                self.close_overlay();
                return true;
            }
        }
        if !self.links.contains(&node) {
            return false;
        }
        let video_id = {
            let doc = self.dom.lock().expect("document lock poisoned");
            doc.attr(node, "data-id")
        };
        match video_id {
            Some(id) if !id.is_empty() => {
                // A newly opened overlay replaces any existing one.
                self.close_overlay();
                self.open_overlay(&id);
            }
            _ => eprintln!("[lightbox] branch=skipped reason=missing-data-id"),
        }
        true
    }

    fn open_overlay(&mut self, video_id: &str) {
        let mut doc = self.dom.lock().expect("document lock poisoned");

        let overlay = doc.create_element("div");
        doc.set_attr(overlay, "id", LIGHTBOX_ID);

        let close = doc.create_element("a");
        doc.set_attr(close, "href", "#");

        let section = doc.create_element("section");
        let wrap = doc.create_element("div");
        let iframe = doc.create_element("iframe");
        doc.set_attr(iframe, "width", "560");
        doc.set_attr(iframe, "height", "315");
        doc.set_attr(iframe, "frameborder", "0");
        doc.set_attr(iframe, "allow", PLAYER_ALLOW);
        doc.set_attr(iframe, "allowfullscreen", "");
        doc.set_attr(
            iframe,
            "src",
            &format!("{OVERLAY_PLAYER_HOST}/embed/{video_id}?autoplay=1"),
        );

        doc.append_child(overlay, close);
        doc.append_child(overlay, section);
        doc.append_child(section, wrap);
        doc.append_child(wrap, iframe);
        let body = doc.body();
        doc.append_child(body, overlay);
        drop(doc);

        self.open = Some(OpenOverlay { overlay, close });
        eprintln!("[lightbox] videoid={video_id} branch=opened");
    }

    fn close_overlay(&mut self) {
        if let Some(open) = self.open.take() {
            let mut doc = self.dom.lock().expect("document lock poisoned");
            doc.detach(open.overlay);
            drop(doc);
            eprintln!("[lightbox] branch=closed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
