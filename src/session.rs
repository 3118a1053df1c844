//! Page-session state.
//!
//! One [`PageSession`] owns every piece of cross-component mutable state
//! for a single page: the loaded-script registry, the in-flight load
//! table, the memoized poster-format capability, the preconnect latch,
//! and the memoized search-index handle. Lifetime = page session;
//! dropping the session drops all of it. Components hold the session
//! behind an `Arc` instead of reaching for module-level globals.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, OnceCell};

use crate::loader::LoadError;
use crate::search::SearchIndex;

/// Result broadcast to callers coalesced onto one in-flight script load.
pub(crate) type LoadSignal = watch::Receiver<Option<Result<(), LoadError>>>;

/// Script registry: URLs that have loaded plus loads still in flight.
///
/// `loaded` grows monotonically and is never cleared. A URL whose load
/// failed is absent from both maps, so a later request injects again.
#[derive(Default)]
pub(crate) struct ScriptRegistry {
    pub loaded: HashSet<String>,
    pub pending: HashMap<String, LoadSignal>,
}

/// Per-page mutable state shared by all enhancement components.
pub struct PageSession {
    pub(crate) scripts: Mutex<ScriptRegistry>,
    pub(crate) webp_support: OnceCell<bool>,
    preconnected: AtomicBool,
    pub(crate) search_index: OnceCell<Arc<dyn SearchIndex>>,
}

impl PageSession {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(ScriptRegistry::default()),
            webp_support: OnceCell::new(),
            preconnected: AtomicBool::new(false),
            search_index: OnceCell::new(),
        }
    }

    /// Claim the one-shot connection warm-up. Returns `true` for the
    /// first caller on this page and `false` for everyone after.
    pub fn try_begin_preconnect(&self) -> bool {
        !self.preconnected.swap(true, Ordering::SeqCst)
    }

    /// Whether `src` has been successfully loaded this session.
    pub async fn is_script_loaded(&self, src: &str) -> bool {
        self.scripts.lock().await.loaded.contains(src)
    }

    /// The memoized poster-format capability, if already probed.
    pub fn webp_support(&self) -> Option<bool> {
        self.webp_support.get().copied()
    }
}

impl Default for PageSession {
    fn default() -> Self {
        Self::new()
    }
}
