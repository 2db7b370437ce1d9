//! The element tree and its synchronous mutation stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tabguard_core_types::NodeId;
use thiserror::Error;
use tracing::trace;

use crate::platform::{PlatformEffect, PlatformLog, ScriptSource};
use crate::Realm;

const FRAME_TAGS: &[&str] = &["iframe", "frame"];

const SCRIPT_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "application/ecmascript",
    "application/x-ecmascript",
    "application/x-javascript",
    "text/ecmascript",
    "text/javascript1.0",
    "text/javascript1.1",
    "text/javascript1.2",
    "text/javascript1.3",
    "text/javascript1.4",
    "text/javascript1.5",
    "text/jscript",
    "text/livescript",
    "text/x-ecmascript",
    "text/x-javascript",
    "module",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("{0} is not in the document")]
    NotFound(NodeId),
    #[error("{0} has no parent")]
    Detached(NodeId),
}

#[derive(Clone, Default)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub frame: Option<Arc<Realm>>,
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.tag)
            .field("attributes", &self.attributes)
            .field("text", &self.text)
            .field("frame", &self.frame.as_ref().map(|realm| realm.id()))
            .finish()
    }
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn script(text: &str) -> Self {
        Self::new("script").with_text(text)
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attributes.push((name, value.to_string())),
        }
    }

    pub fn is_script(&self) -> bool {
        self.tag == "script"
    }

    pub fn is_frame(&self) -> bool {
        FRAME_TAGS.contains(&self.tag.as_str())
    }

    /// Whether the platform would run this element as script.
    pub fn is_executable_script(&self) -> bool {
        if !self.is_script() {
            return false;
        }
        match self.attribute("type") {
            None => true,
            Some(kind) => {
                let kind = kind.trim().to_ascii_lowercase();
                kind.is_empty() || SCRIPT_TYPES.contains(&kind.as_str())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationRecord {
    pub node: NodeId,
    pub parent: NodeId,
}

pub type MutationObserver = Arc<dyn Fn(&MutationRecord) + Send + Sync>;

/// Creates the nested realm for a frame element inserted without one.
pub(crate) type FrameFactory = Box<dyn Fn(&Element) -> Option<Arc<Realm>> + Send + Sync>;

#[derive(Default)]
struct Tree {
    elements: HashMap<NodeId, Element>,
    children: HashMap<NodeId, Vec<NodeId>>,
    parents: HashMap<NodeId, NodeId>,
}

pub struct Document {
    next_id: AtomicU64,
    root: NodeId,
    tree: RwLock<Tree>,
    started: RwLock<Vec<NodeId>>,
    observers: RwLock<Vec<MutationObserver>>,
    frames: OnceCell<FrameFactory>,
    platform: Arc<PlatformLog>,
}

impl Document {
    pub(crate) fn new(platform: Arc<PlatformLog>) -> Self {
        let root = NodeId(0);
        let mut tree = Tree::default();
        tree.elements.insert(root, Element::new("html"));
        Self {
            next_id: AtomicU64::new(1),
            root,
            tree: RwLock::new(tree),
            started: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            frames: OnceCell::new(),
            platform,
        }
    }

    pub(crate) fn set_frame_factory(&self, factory: FrameFactory) {
        let _ = self.frames.set(factory);
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Registers an observer that runs synchronously on every insertion, before the platform
    /// runs an inserted script.
    pub fn observe(&self, observer: MutationObserver) {
        self.observers.write().push(observer);
    }

    pub fn element(&self, node: NodeId) -> Option<Element> {
        self.tree.read().elements.get(&node).cloned()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.read().parents.get(&node).copied()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .read()
            .children
            .get(&node)
            .cloned()
            .unwrap_or_default()
    }

    /// Ancestors of `node`, root first, excluding the node itself.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let tree = self.tree.read();
        let mut chain = Vec::new();
        let mut cursor = tree.parents.get(&node).copied();
        while let Some(parent) = cursor {
            chain.push(parent);
            cursor = tree.parents.get(&parent).copied();
        }
        chain.reverse();
        chain
    }

    /// All nodes matching `pred`, in insertion order.
    pub fn find_all(&self, pred: impl Fn(&Element) -> bool) -> Vec<NodeId> {
        let tree = self.tree.read();
        let mut nodes: Vec<NodeId> = tree
            .elements
            .iter()
            .filter(|(_, element)| pred(element))
            .map(|(node, _)| *node)
            .collect();
        nodes.sort();
        nodes
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut tree = self.tree.write();
        let element = tree.elements.get_mut(&node).ok_or(DomError::NotFound(node))?;
        element.set_attribute(name, value);
        Ok(())
    }

    pub(crate) fn set_frame(&self, node: NodeId, realm: Arc<Realm>) -> Result<(), DomError> {
        let mut tree = self.tree.write();
        let element = tree.elements.get_mut(&node).ok_or(DomError::NotFound(node))?;
        element.frame = Some(realm);
        Ok(())
    }

    pub fn append_child(&self, parent: NodeId, element: Element) -> Result<NodeId, DomError> {
        self.insert(parent, None, element)
    }

    pub fn insert_before(&self, reference: NodeId, element: Element) -> Result<NodeId, DomError> {
        let parent = self.parent(reference).ok_or(DomError::Detached(reference))?;
        self.insert(parent, Some(reference), element)
    }

    fn insert(
        &self,
        parent: NodeId,
        before: Option<NodeId>,
        mut element: Element,
    ) -> Result<NodeId, DomError> {
        if element.is_frame() && element.frame.is_none() {
            element.frame = self.frames.get().and_then(|factory| factory(&element));
        }

        let node = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut tree = self.tree.write();
            if !tree.elements.contains_key(&parent) {
                return Err(DomError::NotFound(parent));
            }
            let siblings = tree.children.entry(parent).or_default();
            let index = before
                .and_then(|reference| siblings.iter().position(|id| *id == reference))
                .unwrap_or(siblings.len());
            siblings.insert(index, node);
            tree.parents.insert(node, parent);
            tree.elements.insert(node, element);
        }
        trace!(%node, %parent, "element inserted");

        let record = MutationRecord { node, parent };
        let observers: Vec<MutationObserver> = self.observers.read().iter().cloned().collect();
        for observer in observers {
            observer(&record);
        }

        self.run_script(node);
        Ok(node)
    }

    /// Runs a freshly connected script once, as it stands after observers had their turn.
    fn run_script(&self, node: NodeId) {
        let Some(element) = self.element(node) else {
            return;
        };
        if !element.is_executable_script() {
            return;
        }
        {
            let mut started = self.started.write();
            if started.contains(&node) {
                return;
            }
            started.push(node);
        }
        let source = match element.attribute("src") {
            Some(src) => ScriptSource::External(src.to_string()),
            None => ScriptSource::Inline(element.text.clone()),
        };
        self.platform
            .record(PlatformEffect::ScriptExecuted { node, source });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn observers_see_insertions_before_scripts_run() {
        let platform = Arc::new(PlatformLog::default());
        let document = Arc::new(Document::new(Arc::clone(&platform)));
        let seen_executed = Arc::new(Mutex::new(Vec::new()));
        {
            let platform = Arc::clone(&platform);
            let seen = Arc::clone(&seen_executed);
            document.observe(Arc::new(move |_record: &MutationRecord| {
                seen.lock().push(platform.executed_scripts().len());
            }));
        }

        document
            .append_child(document.root(), Element::script("run()"))
            .unwrap();

        assert_eq!(*seen_executed.lock(), vec![0]);
        assert_eq!(platform.executed_scripts().len(), 1);
    }

    #[test]
    fn retyped_scripts_do_not_run() {
        let platform = Arc::new(PlatformLog::default());
        let document = Arc::new(Document::new(Arc::clone(&platform)));
        let weak = Arc::downgrade(&document);
        document.observe(Arc::new(move |record: &MutationRecord| {
            if let Some(document) = weak.upgrade() {
                document
                    .set_attribute(record.node, "type", "text/plain")
                    .unwrap();
            }
        }));

        document
            .append_child(document.root(), Element::script("run()"))
            .unwrap();

        assert!(platform.executed_scripts().is_empty());
    }

    #[test]
    fn insert_before_places_sibling_ahead() {
        let document = Document::new(Arc::new(PlatformLog::default()));
        let first = document
            .append_child(document.root(), Element::new("div"))
            .unwrap();
        let second = document.insert_before(first, Element::new("p")).unwrap();
        assert_eq!(document.children(document.root()), vec![second, first]);
        assert_eq!(
            document.insert_before(NodeId(99), Element::new("p")),
            Err(DomError::Detached(NodeId(99)))
        );
    }

    #[test]
    fn executable_types_follow_the_mime_list() {
        assert!(Element::script("").is_executable_script());
        assert!(Element::script("")
            .with_attribute("type", " Module ")
            .is_executable_script());
        assert!(!Element::script("")
            .with_attribute("type", "application/json")
            .is_executable_script());
        assert!(!Element::new("div").is_executable_script());
    }
}
