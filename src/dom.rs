//! Page document model.
//!
//! A minimal arena-backed element tree standing in for the host page's
//! DOM: tags, attributes, class lists, text and raw-HTML payloads,
//! hidden state, and input focus. Enhancement components mutate this
//! model; tests observe it directly or through [`Document::to_html`].
//!
//! The model deliberately covers only what the enhancement components
//! touch. There is no parsing, no styling, and no layout.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Index of an element within a [`Document`] arena.
pub type NodeId = usize;

/// Shared handle to a document.
///
/// Mutations take the lock for the duration of one synchronous DOM
/// operation and never across an await point, preserving the
/// single-writer-at-a-time model of a page script.
pub type SharedDocument = Arc<Mutex<Document>>;

/// Wrap a document in a [`SharedDocument`] handle.
pub fn shared(document: Document) -> SharedDocument {
    Arc::new(Mutex::new(document))
}

/// A single element node.
#[derive(Debug, Clone)]
struct Element {
    tag: String,
    /// Attribute map; an empty value renders as a bare boolean attribute.
    attrs: BTreeMap<String, String>,
    classes: Vec<String>,
    /// Entity-escaped on render.
    text: String,
    /// Emitted verbatim on render (pre-rendered fragments from a backend).
    raw_html: Option<String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_owned(),
            attrs: BTreeMap::new(),
            classes: Vec::new(),
            text: String::new(),
            raw_html: None,
            children: Vec::new(),
            parent: None,
        }
    }
}

/// An element tree with the usual `html`/`head`/`body` skeleton.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Element>,
    html: NodeId,
    head: NodeId,
    body: NodeId,
    focused: Option<NodeId>,
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Elements rendered without children or a closing tag.
const VOID_TAGS: [&str; 5] = ["br", "img", "input", "link", "meta"];

/// Minimal HTML entity escaping for text content and attribute values.
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl Document {
    /// Create an empty document with `html`, `head`, and `body` elements.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            html: 0,
            head: 0,
            body: 0,
            focused: None,
        };
        doc.html = doc.alloc("html");
        doc.head = doc.alloc("head");
        doc.body = doc.alloc("body");
        doc.append_child(doc.html, doc.head);
        doc.append_child(doc.html, doc.body);
        doc
    }

    fn alloc(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Element::new(tag));
        self.nodes.len() - 1
    }

    /// The document root element.
    pub fn root(&self) -> NodeId {
        self.html
    }

    /// The `<head>` element.
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// The `<body>` element.
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(tag)
    }

    /// Tag name of `node`.
    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node].tag
    }

    /// Child list of `node`, in document order.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node].children.clone()
    }

    /// Parent of `node`, if attached.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    // --- tree mutation ---

    /// Append `child` as the last child of `parent`, detaching it from
    /// any previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    /// Insert `child` into `parent` immediately before `reference`.
    ///
    /// Falls back to a plain append when `reference` is not a child of
    /// `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let pos = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == reference);
        match pos {
            Some(idx) => self.nodes[parent].children.insert(idx, child),
            None => self.nodes[parent].children.push(child),
        }
        self.nodes[child].parent = Some(parent);
    }

    /// Detach `node` from its parent. Idempotent; detaching an already
    /// detached node does nothing. Focus is cleared when the focused
    /// element leaves the document.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node].parent.take() {
            self.nodes[parent].children.retain(|&c| c != node);
        }
        if let Some(focused) = self.focused {
            if !self.is_attached(focused) {
                self.focused = None;
            }
        }
    }

    /// Remove every child of `parent`.
    pub fn clear_children(&mut self, parent: NodeId) {
        let children = self.nodes[parent].children.clone();
        for child in children {
            self.detach(child);
        }
    }

    // --- attributes ---

    /// Set attribute `name` to `value`. An empty value renders as a
    /// bare boolean attribute.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        self.nodes[node]
            .attrs
            .insert(name.to_owned(), value.to_owned());
    }

    /// Attribute `name` of `node`, if present.
    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.nodes[node].attrs.get(name).cloned()
    }

    /// Remove attribute `name` from `node`.
    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        self.nodes[node].attrs.remove(name);
    }

    /// Toggle the boolean `hidden` attribute.
    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) {
        if hidden {
            self.set_attr(node, "hidden", "");
        } else {
            self.remove_attr(node, "hidden");
        }
    }

    /// Whether `node` carries the `hidden` attribute.
    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.nodes[node].attrs.contains_key("hidden")
    }

    // --- class list ---

    /// Add `class` to the class list (no duplicates).
    pub fn add_class(&mut self, node: NodeId, class: &str) {
        let classes = &mut self.nodes[node].classes;
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_owned());
        }
    }

    /// Remove `class` from the class list.
    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        self.nodes[node].classes.retain(|c| c != class);
    }

    /// Force `class` present (`on = true`) or absent (`on = false`).
    pub fn set_class(&mut self, node: NodeId, class: &str, on: bool) {
        if on {
            self.add_class(node, class);
        } else {
            self.remove_class(node, class);
        }
    }

    /// Whether the class list contains `class`.
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.nodes[node].classes.iter().any(|c| c == class)
    }

    // --- content ---

    /// Set the text content of `node` (entity-escaped on render).
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node].text = text.to_owned();
    }

    /// Text content of `node` (direct text only, not descendants).
    pub fn text(&self, node: NodeId) -> String {
        self.nodes[node].text.clone()
    }

    /// Set a pre-rendered HTML payload, emitted verbatim on render.
    pub fn set_raw_html(&mut self, node: NodeId, html: &str) {
        self.nodes[node].raw_html = Some(html.to_owned());
    }

    // --- focus ---

    /// Move input focus to `node`.
    pub fn focus(&mut self, node: NodeId) {
        self.focused = Some(node);
    }

    /// The currently focused element, if any.
    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    // --- queries (document order) ---

    /// Whether `node` is reachable from the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.contains(self.html, node)
    }

    /// Whether `node` is `root` or one of its descendants.
    pub fn contains(&self, root: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == root {
                return true;
            }
            current = self.nodes[n].parent;
        }
        false
    }

    /// Preorder traversal of the subtree rooted at `root` (inclusive).
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            out.push(node);
            for &child in self.nodes[node].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// First attached element whose `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.html)
            .into_iter()
            .find(|&n| self.nodes[n].attrs.get("id").map(String::as_str) == Some(id))
    }

    /// All attached elements with tag `tag`, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.elements_by_tag_within(self.html, tag)
    }

    /// Elements with tag `tag` within the subtree at `root`.
    pub fn elements_by_tag_within(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&n| self.nodes[n].tag == tag)
            .collect()
    }

    /// All attached elements carrying class `class`, in document order.
    pub fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        self.elements_by_class_within(self.html, class)
    }

    /// Elements carrying class `class` within the subtree at `root`.
    pub fn elements_by_class_within(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&n| self.has_class(n, class))
            .collect()
    }

    /// First element carrying class `class` within the subtree at `root`.
    pub fn first_by_class_within(&self, root: NodeId, class: &str) -> Option<NodeId> {
        self.elements_by_class_within(root, class).into_iter().next()
    }

    // --- rendering ---

    /// Render the subtree at `node` as an HTML fragment.
    ///
    /// Deterministic: the class attribute comes first, remaining
    /// attributes in sorted order, empty-valued attributes as bare
    /// boolean attributes. Text is entity-escaped; raw payloads are
    /// emitted verbatim before children.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let el = &self.nodes[node];
        out.push('<');
        out.push_str(&el.tag);
        if !el.classes.is_empty() {
            out.push_str(&format!(" class=\"{}\"", html_escape(&el.classes.join(" "))));
        }
        for (name, value) in &el.attrs {
            if value.is_empty() {
                out.push_str(&format!(" {name}"));
            } else {
                out.push_str(&format!(" {name}=\"{}\"", html_escape(value)));
            }
        }
        out.push('>');
        if VOID_TAGS.contains(&el.tag.as_str()) {
            return;
        }
        if !el.text.is_empty() {
            out.push_str(&html_escape(&el.text));
        }
        if let Some(raw) = &el.raw_html {
            out.push_str(raw);
        }
        for &child in &el.children {
            self.write_html(child, out);
        }
        out.push_str(&format!("</{}>", el.tag));
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_skeleton() {
        let doc = Document::new();
        assert_eq!(doc.tag(doc.root()), "html");
        assert_eq!(doc.children(doc.root()), vec![doc.head(), doc.body()]);
    }

    #[test]
    fn append_and_query_by_id() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attr(div, "id", "share");
        doc.append_child(doc.body(), div);

        assert_eq!(doc.element_by_id("share"), Some(div));
        assert_eq!(doc.element_by_id("missing"), None);
    }

    #[test]
    fn detached_element_not_found_by_id() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attr(div, "id", "floating");
        assert_eq!(doc.element_by_id("floating"), None);
    }

    #[test]
    fn insert_before_orders_children() {
        let mut doc = Document::new();
        let first = doc.create_element("p");
        let second = doc.create_element("p");
        doc.append_child(doc.body(), second);
        doc.insert_before(doc.body(), first, second);
        assert_eq!(doc.children(doc.body()), vec![first, second]);
    }

    #[test]
    fn insert_before_unknown_reference_appends() {
        let mut doc = Document::new();
        let child = doc.create_element("p");
        let stranger = doc.create_element("p");
        doc.insert_before(doc.body(), child, stranger);
        assert_eq!(doc.children(doc.body()), vec![child]);
    }

    #[test]
    fn append_reparents() {
        let mut doc = Document::new();
        let child = doc.create_element("span");
        doc.append_child(doc.head(), child);
        doc.append_child(doc.body(), child);
        assert!(doc.children(doc.head()).is_empty());
        assert_eq!(doc.parent(child), Some(doc.body()));
    }

    #[test]
    fn detach_is_idempotent() {
        let mut doc = Document::new();
        let child = doc.create_element("span");
        doc.append_child(doc.body(), child);
        doc.detach(child);
        doc.detach(child);
        assert_eq!(doc.parent(child), None);
        assert!(doc.children(doc.body()).is_empty());
    }

    #[test]
    fn detach_clears_focus_of_removed_subtree() {
        let mut doc = Document::new();
        let wrapper = doc.create_element("div");
        let inner = doc.create_element("iframe");
        doc.append_child(doc.body(), wrapper);
        doc.append_child(wrapper, inner);
        doc.focus(inner);
        assert_eq!(doc.focused(), Some(inner));

        doc.detach(wrapper);
        assert_eq!(doc.focused(), None, "focus must not survive removal");
    }

    #[test]
    fn class_list_operations() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.add_class(div, "active");
        doc.add_class(div, "active");
        assert!(doc.has_class(div, "active"));

        doc.set_class(div, "u-none", true);
        assert!(doc.has_class(div, "u-none"));
        doc.set_class(div, "u-none", false);
        assert!(!doc.has_class(div, "u-none"));

        doc.remove_class(div, "active");
        assert!(!doc.has_class(div, "active"));
    }

    #[test]
    fn hidden_attribute_round_trip() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        assert!(!doc.is_hidden(div));
        doc.set_hidden(div, true);
        assert!(doc.is_hidden(div));
        doc.set_hidden(div, false);
        assert!(!doc.is_hidden(div));
    }

    #[test]
    fn queries_respect_subtree_scope() {
        let mut doc = Document::new();
        let article = doc.create_element("div");
        doc.set_attr(article, "id", "article-content");
        let inside = doc.create_element("h2");
        let outside = doc.create_element("h2");
        doc.append_child(doc.body(), article);
        doc.append_child(article, inside);
        doc.append_child(doc.body(), outside);

        assert_eq!(doc.elements_by_tag_within(article, "h2"), vec![inside]);
        assert_eq!(doc.elements_by_tag("h2"), vec![inside, outside]);
    }

    #[test]
    fn class_queries_in_document_order() {
        let mut doc = Document::new();
        let a = doc.create_element("a");
        let b = doc.create_element("a");
        doc.add_class(a, "youtube-link");
        doc.add_class(b, "youtube-link");
        doc.append_child(doc.body(), a);
        doc.append_child(doc.body(), b);
        assert_eq!(doc.elements_by_class("youtube-link"), vec![a, b]);
    }

    #[test]
    fn render_escapes_text_and_attributes() {
        let mut doc = Document::new();
        let a = doc.create_element("a");
        doc.set_attr(a, "href", "/x?a=1&b=\"2\"");
        doc.set_text(a, "<script>");
        assert_eq!(
            doc.to_html(a),
            "<a href=\"/x?a=1&amp;b=&quot;2&quot;\">&lt;script&gt;</a>"
        );
    }

    #[test]
    fn render_emits_raw_payload_verbatim() {
        let mut doc = Document::new();
        let span = doc.create_element("span");
        doc.set_raw_html(span, "<em>hit</em>");
        assert_eq!(doc.to_html(span), "<span><em>hit</em></span>");
    }

    #[test]
    fn render_boolean_attribute_is_bare() {
        let mut doc = Document::new();
        let iframe = doc.create_element("iframe");
        doc.set_attr(iframe, "allowfullscreen", "");
        assert_eq!(doc.to_html(iframe), "<iframe allowfullscreen></iframe>");
    }

    #[test]
    fn render_void_element_has_no_closing_tag() {
        let mut doc = Document::new();
        let link = doc.create_element("link");
        doc.set_attr(link, "rel", "preconnect");
        doc.set_attr(link, "href", "https://example.com");
        assert_eq!(
            doc.to_html(link),
            "<link href=\"https://example.com\" rel=\"preconnect\">"
        );
    }

    #[test]
    fn render_nested_children_in_order() {
        let mut doc = Document::new();
        let li = doc.create_element("li");
        doc.add_class(li, "ais-Hits-item");
        let a = doc.create_element("a");
        doc.set_attr(a, "href", "/post");
        doc.set_raw_html(a, "<em>title</em>");
        let div = doc.create_element("div");
        let small = doc.create_element("small");
        doc.set_raw_html(small, "desc");
        doc.append_child(li, a);
        doc.append_child(a, div);
        doc.append_child(div, small);

        assert_eq!(
            doc.to_html(li),
            "<li class=\"ais-Hits-item\"><a href=\"/post\"><em>title</em><div><small>desc</small></div></a></li>"
        );
    }
}
