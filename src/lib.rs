//! Headless page-enhancement engine.
//!
//! Re-expresses a static content site's client-side enhancements as
//! explicit, event-driven components operating on an in-memory document
//! model:
//!
//! - [`loader`]: deduplicated, in-flight-coalesced dynamic script loading
//! - [`embed`]: lazy video embeds (poster placeholder until activated)
//! - [`search`]: search-as-you-type against a hosted search index
//! - [`scrollspy`]: table-of-contents highlighting and a share toggle
//!   driven by viewport intersection entries
//! - [`lightbox`]: legacy overlay player for annotated video links
//!
//! The [`page`] module wires the components to a [`dom::Document`] and
//! routes [`page::PageEvent`]s to them. All per-page mutable state lives
//! in a [`session::PageSession`] whose lifetime is the page session.
//!
//! Components never talk to each other; they share only the document.
//! Network and decode capabilities are reached through trait seams
//! ([`loader::ScriptFetcher`], [`search::SearchIndex`],
//! [`embed::PosterProbe`]) so the whole engine runs, and is tested,
//! without a browser.

use std::future::Future;
use std::pin::Pin;

pub mod dom;
pub mod embed;
pub mod lightbox;
pub mod loader;
pub mod page;
pub mod scrollspy;
pub mod search;
pub mod session;

/// Boxed future type used by the host-seam traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
