//! Lazy video embeds.
//!
//! A [`VideoEmbed`] is a two-state component per annotated element:
//! it renders a poster placeholder with a play affordance on attach,
//! and swaps itself for a live player frame on activation. The
//! transition is one-way per instance.
//!
//! The poster image format is chosen by a one-time decode probe of an
//! embedded test image, memoized on the page session so every embed on
//! the page shares one answer. On the first pointer-over of any embed
//! the fixed set of player origins gets preconnect hints, at most once
//! per page.

use std::sync::Arc;

use url::Url;

use crate::dom::{NodeId, SharedDocument};
use crate::session::PageSession;
use crate::BoxFuture;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Tag name of the elements this component attaches to.
pub const EMBED_TAG: &str = "lite-youtube";

/// Origin hosting the embedded player.
pub const EMBED_HOST: &str = "https://www.youtube-nocookie.com";

/// Origins the live player contacts; preconnected on first hover.
///
/// The player document and most subresources come off the embed host;
/// the remaining origins serve its ancillary scripts.
const WARM_ORIGINS: [&str; 4] = [
    EMBED_HOST,
    "https://www.google.com",
    "https://googleads.g.doubleclick.net",
    "https://static.doubleclick.net",
];

const DEFAULT_PLAY_LABEL: &str = "Play";
const PLAY_BUTTON_CLASS: &str = "lty-playbtn";
const HIDDEN_LABEL_CLASS: &str = "lyt-visually-hidden";
const ACTIVATED_CLASS: &str = "lyt-activated";

/// Feature policy granted to player frames.
pub(crate) const PLAYER_ALLOW: &str =
    "accelerometer; autoplay; encrypted-media; gyroscope; picture-in-picture";

/// A 1x1 lossless WebP image. Decoding it succeeds exactly when the
/// host can decode WebP at all, which decides the poster format.
pub const WEBP_PROBE: &[u8] = &[
    0x52, 0x49, 0x46, 0x46, 0x1e, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50, 0x56, 0x50, 0x38,
    0x4c, 0x11, 0x00, 0x00, 0x00, 0x2f, 0x00, 0x00, 0x00, 0x00, 0x07, 0xd0, 0xff, 0xfe, 0xf7,
    0xbf, 0xff, 0x81, 0x88, 0xe8, 0x7f, 0x00, 0x00,
];

// ---------------------------------------------------------------------------
// Capability probe
// ---------------------------------------------------------------------------

/// Host seam deciding whether a poster image format is decodable.
///
/// The probe cannot fail observably: a decode error means "unsupported",
/// never an error.
pub trait PosterProbe: Send + Sync {
    fn supports<'a>(&'a self, probe_image: &'a [u8]) -> BoxFuture<'a, bool>;
}

/// [`PosterProbe`] backed by an actual WebP decode attempt.
pub struct ImageDecodeProbe;

impl PosterProbe for ImageDecodeProbe {
    fn supports<'a>(&'a self, probe_image: &'a [u8]) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            image::load_from_memory_with_format(probe_image, image::ImageFormat::WebP).is_ok()
        })
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Lifecycle state of one embed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedState {
    /// Poster image and play affordance; nothing loaded yet.
    Poster,
    /// Live player frame inserted. Terminal for this instance.
    Playing,
}

/// One lazy video embed bound to a document element.
pub struct VideoEmbed {
    element: NodeId,
    video_id: String,
    play_label: String,
    poster_url: String,
    play_button: NodeId,
    state: EmbedState,
}

impl VideoEmbed {
    /// Attach to `element`, rendering the poster state.
    ///
    /// Reads the `videoid` (required), `playlabel`, and `params`
    /// attributes. Elements without a `videoid` are skipped. The play
    /// label comes from an existing play-button child's text when
    /// present, else the `playlabel` attribute, else a default.
    pub async fn attach(
        dom: &SharedDocument,
        session: &PageSession,
        probe: &Arc<dyn PosterProbe>,
        element: NodeId,
    ) -> Option<Self> {
        let (video_id, play_label, existing_button) = {
            let doc = dom.lock().expect("document lock poisoned");
            let video_id = match doc.attr(element, "videoid") {
                Some(id) if !id.is_empty() => id,
                _ => {
                    eprintln!("[embed] node={element} branch=skipped reason=missing-videoid");
                    return None;
                }
            };
            let existing_button = doc.first_by_class_within(element, PLAY_BUTTON_CLASS);
            let button_text = existing_button
                .map(|b| doc.text(b).trim().to_owned())
                .filter(|t| !t.is_empty());
            let play_label = button_text
                .or_else(|| doc.attr(element, "playlabel").filter(|l| !l.is_empty()))
                .unwrap_or_else(|| DEFAULT_PLAY_LABEL.to_owned());
            (video_id, play_label, existing_button)
        };

        // One probe per page; every later embed reuses the answer.
        let webp = *session
            .webp_support
            .get_or_init(|| async { probe.supports(WEBP_PROBE).await })
            .await;

        let poster_url = if webp {
            format!("https://i.ytimg.com/vi_webp/{video_id}/hqdefault.webp")
        } else {
            format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
        };

        let play_button = {
            let mut doc = dom.lock().expect("document lock poisoned");

            // Warm the connection for the poster image itself.
            let preload = doc.create_element("link");
            doc.set_attr(preload, "rel", "preload");
            doc.set_attr(preload, "href", &poster_url);
            doc.set_attr(preload, "as", "image");
            let head = doc.head();
            doc.append_child(head, preload);

            doc.set_attr(
                element,
                "style",
                &format!("background-image: url(\"{poster_url}\")"),
            );

            let button = match existing_button {
                Some(button) => button,
                None => {
                    let button = doc.create_element("button");
                    doc.set_attr(button, "type", "button");
                    doc.add_class(button, PLAY_BUTTON_CLASS);
                    doc.append_child(element, button);
                    button
                }
            };
            // Visually hidden label for assistive tech.
            if doc.text(button).trim().is_empty() {
                let label = doc.create_element("span");
                doc.add_class(label, HIDDEN_LABEL_CLASS);
                doc.set_text(label, &play_label);
                doc.append_child(button, label);
            }
            button
        };

        eprintln!("[embed] videoid={video_id} webp={webp} branch=attached");
        Some(Self {
            element,
            video_id,
            play_label,
            poster_url,
            play_button,
            state: EmbedState::Poster,
        })
    }

    /// The element this embed is bound to.
    pub fn element(&self) -> NodeId {
        self.element
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EmbedState {
        self.state
    }

    /// Poster image URL chosen at attach time.
    pub fn poster_url(&self) -> &str {
        &self.poster_url
    }

    /// Preconnect the player origins. Fires at most once per page no
    /// matter how many embeds exist or how often they are hovered.
    pub fn warm_connections(dom: &SharedDocument, session: &PageSession) {
        if !session.try_begin_preconnect() {
            return;
        }
        let mut doc = dom.lock().expect("document lock poisoned");
        let head = doc.head();
        for origin in WARM_ORIGINS {
            let link = doc.create_element("link");
            doc.set_attr(link, "rel", "preconnect");
            doc.set_attr(link, "href", origin);
            doc.append_child(head, link);
        }
        eprintln!("[embed] branch=preconnect origins={}", WARM_ORIGINS.len());
    }

    /// Pointer-over hook: opportunistic connection warm-up.
    pub fn on_pointer_over(&self, dom: &SharedDocument, session: &PageSession) {
        Self::warm_connections(dom, session);
    }

    /// Activate the embed: insert the live player frame, drop the play
    /// affordance, and move focus to the player.
    ///
    /// The transition happens exactly once; returns `false` when the
    /// embed is already playing.
    pub fn activate(&mut self, dom: &SharedDocument) -> bool {
        if self.state == EmbedState::Playing {
            eprintln!(
                "[embed] videoid={} branch=ignored reason=already-playing",
                self.video_id
            );
            return false;
        }

        let mut doc = dom.lock().expect("document lock poisoned");

        // Caller-supplied params, with autoplay forced on.
        let mut params = url::form_urlencoded::Serializer::new(String::new());
        if let Some(extra) = doc.attr(self.element, "params") {
            for (key, value) in url::form_urlencoded::parse(extra.trim_start_matches('?').as_bytes())
            {
                params.append_pair(&key, &value);
            }
        }
        params.append_pair("autoplay", "1");
        let query = params.finish();

        let mut player_url = Url::parse(EMBED_HOST).expect("embed host constant parses");
        player_url
            .path_segments_mut()
            .expect("embed host is a base URL")
            .pop_if_empty()
            .extend(["embed", self.video_id.as_str()]);
        player_url.set_query(Some(&query));

        let iframe = doc.create_element("iframe");
        doc.set_attr(iframe, "width", "560");
        doc.set_attr(iframe, "height", "315");
        doc.set_attr(iframe, "title", &self.play_label);
        doc.set_attr(iframe, "allow", PLAYER_ALLOW);
        doc.set_attr(iframe, "allowfullscreen", "");
        doc.set_attr(iframe, "src", player_url.as_str());
        doc.append_child(self.element, iframe);

        doc.detach(self.play_button);
        doc.add_class(self.element, ACTIVATED_CLASS);
        doc.focus(iframe);

        self.state = EmbedState::Playing;
        eprintln!("[embed] videoid={} branch=activated", self.video_id);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
