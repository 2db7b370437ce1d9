//! Explicit model of one page execution context ("realm").
//!
//! A [`Realm`] owns the globally reachable capability bindings page code calls through, the
//! `location`/`history` accessor tables, a document tree with a synchronous mutation stream, a
//! DOM-style event registry, storage areas and nested frame realms. Native implementations
//! record their effects in a [`PlatformLog`] instead of touching a real browser, which keeps the
//! model deterministic.

pub mod capability;
pub mod channel;
pub mod document;
pub mod events;
pub mod globals;
pub mod location;
pub mod network;
pub mod platform;

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tabguard_core_types::{ContextId, NodeId};
use tracing::debug;
use url::Url;

pub use capability::{Binding, BindingError, Capability, CapabilityIdentity};
pub use channel::{BroadcastChannel, ChannelHub, InertChannel, MessageListener};
pub use document::{DomError, Element, MutationObserver, MutationRecord};
pub use events::{DispatchOutcome, Event, EventListener, EventTarget, Modifiers, Phase};
pub use globals::{CompiledFunction, FunctionFlavor, GlobalScope, TimerHandler};
pub use network::{
    FetchRequest, FetchResponse, NetworkBackend, NetworkError, OfflineNetwork, StaticNetwork,
    XhrCallback, XhrRequest,
};
pub use platform::{
    PlatformEffect, PlatformLog, ScriptError, ScriptSource, StorageArea, StorageKind, TimerId,
};

use document::Document;
use events::EventRegistry;
use location::{HistorySurface, LocationSurface, SessionHistory};

/// Values crossing between page code and capabilities.
pub type ScriptValue = serde_json::Value;

/// Whether code in a parent context may reach into this realm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealmAccess {
    SameOrigin,
    /// Cross-origin: the handle exists but its internals cannot be touched.
    Opaque,
}

pub struct RealmBuilder {
    url: Url,
    access: RealmAccess,
    parent: Option<Weak<Realm>>,
    hub: Option<Arc<ChannelHub>>,
    network: Option<Arc<dyn NetworkBackend>>,
}

impl RealmBuilder {
    pub fn hub(mut self, hub: Arc<ChannelHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn network(mut self, network: Arc<dyn NetworkBackend>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn opaque(mut self) -> Self {
        self.access = RealmAccess::Opaque;
        self
    }

    fn parent(mut self, parent: Weak<Realm>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn build(self) -> Arc<Realm> {
        let RealmBuilder {
            url,
            access,
            parent,
            hub,
            network,
        } = self;
        let hub = hub.unwrap_or_else(ChannelHub::new);
        let network = network.unwrap_or_else(|| Arc::new(OfflineNetwork));
        let platform = Arc::new(PlatformLog::default());

        let realm = Arc::new_cyclic(|weak: &Weak<Realm>| Realm {
            id: ContextId::new(),
            access,
            parent,
            url: RwLock::new(url.clone()),
            session: Mutex::new(SessionHistory::new(url)),
            globals: GlobalScope::native(
                weak.clone(),
                Arc::clone(&platform),
                Arc::clone(&hub),
                Arc::clone(&network),
            ),
            location: LocationSurface::native(weak.clone()),
            history: HistorySurface::native(weak.clone()),
            document: Document::new(Arc::clone(&platform)),
            events: EventRegistry::default(),
            local_storage: StorageArea::new(StorageKind::Local),
            session_storage: StorageArea::new(StorageKind::Session),
            platform,
            hub,
            network,
            protection: OnceCell::new(),
        });

        let weak = Arc::downgrade(&realm);
        realm.document.set_frame_factory(Box::new(move |element: &Element| {
            let parent = weak.upgrade()?;
            let src = element.attribute("src").unwrap_or("about:blank");
            Some(parent.spawn_child(src))
        }));
        realm
    }
}

pub struct Realm {
    id: ContextId,
    access: RealmAccess,
    parent: Option<Weak<Realm>>,
    pub(crate) url: RwLock<Url>,
    pub(crate) session: Mutex<SessionHistory>,
    globals: GlobalScope,
    location: LocationSurface,
    history: HistorySurface,
    document: Document,
    events: EventRegistry,
    local_storage: StorageArea,
    session_storage: StorageArea,
    platform: Arc<PlatformLog>,
    hub: Arc<ChannelHub>,
    network: Arc<dyn NetworkBackend>,
    protection: OnceCell<Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("id", &self.id)
            .field("url", &self.url.read().as_str())
            .field("access", &self.access)
            .finish()
    }
}

impl Realm {
    pub fn builder(url: Url) -> RealmBuilder {
        RealmBuilder {
            url,
            access: RealmAccess::SameOrigin,
            parent: None,
            hub: None,
            network: None,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn url(&self) -> Url {
        self.url.read().clone()
    }

    pub fn access(&self) -> RealmAccess {
        self.access
    }

    pub fn parent(&self) -> Option<Arc<Realm>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn globals(&self) -> &GlobalScope {
        &self.globals
    }

    pub fn location(&self) -> &LocationSurface {
        &self.location
    }

    pub fn history(&self) -> &HistorySurface {
        &self.history
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn platform(&self) -> &Arc<PlatformLog> {
        &self.platform
    }

    pub fn storage(&self, kind: StorageKind) -> &StorageArea {
        match kind {
            StorageKind::Local => &self.local_storage,
            StorageKind::Session => &self.session_storage,
        }
    }

    /// Sets the realm's once-only protection slot. Returns `false` when it was already set.
    pub fn install_protection(&self, value: Arc<dyn Any + Send + Sync>) -> bool {
        self.protection.set(value).is_ok()
    }

    pub fn protection<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.protection
            .get()
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn is_protected(&self) -> bool {
        self.protection.get().is_some()
    }

    fn spawn_child(self: &Arc<Self>, src: &str) -> Arc<Realm> {
        let url = self
            .url()
            .join(src)
            .or_else(|_| Url::parse("about:blank"))
            .unwrap_or_else(|_| self.url());
        let same_origin = url.scheme() == "about" || url.origin() == self.url().origin();
        let mut builder = Realm::builder(url)
            .hub(Arc::clone(&self.hub))
            .network(Arc::clone(&self.network))
            .parent(Arc::downgrade(self));
        if !same_origin {
            builder = builder.opaque();
        }
        let child = builder.build();
        debug!(parent = %self.id, child = %child.id, url = %child.url(), "nested realm created");
        child
    }

    /// Navigates the frame at `node` to `src`: a fresh realm replaces the old one, then a
    /// `load` event fires at the frame element.
    pub fn load_frame(self: &Arc<Self>, node: NodeId, src: &str) -> Result<Arc<Realm>, DomError> {
        let child = self.spawn_child(src);
        self.document.set_attribute(node, "src", src)?;
        self.document.set_frame(node, Arc::clone(&child))?;
        self.dispatch_event(&Event::trusted("load", EventTarget::Node(node)).non_bubbling());
        Ok(child)
    }

    pub fn dispatch_event(&self, event: &Event) -> DispatchOutcome {
        let mut path = vec![EventTarget::Window];
        match event.target {
            EventTarget::Window => {}
            EventTarget::Document => path.push(EventTarget::Document),
            EventTarget::Node(node) => {
                path.push(EventTarget::Document);
                path.extend(self.document.ancestors(node).into_iter().map(EventTarget::Node));
                path.push(EventTarget::Node(node));
            }
        }
        self.events.dispatch(event, &path)
    }

    pub fn eval(&self, source: &str) -> Result<ScriptValue, ScriptError> {
        let eval = self.globals.eval.get();
        (eval.func())(source)
    }

    pub fn construct_function(
        &self,
        flavor: FunctionFlavor,
        args: &[&str],
    ) -> Result<CompiledFunction, ScriptError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let ctor = self.globals.function_ctor(flavor).get();
        (ctor.func())(&args)
    }

    pub fn set_timeout(&self, handler: TimerHandler, delay: Duration) -> TimerId {
        let timer = self.globals.set_timeout.get();
        (timer.func())(handler, delay)
    }

    pub fn set_interval(&self, handler: TimerHandler, delay: Duration) -> TimerId {
        let timer = self.globals.set_interval.get();
        (timer.func())(handler, delay)
    }

    pub fn set_item(&self, kind: StorageKind, key: &str, value: &str) -> Result<(), ScriptError> {
        let set_item = self.globals.storage_set_item.get();
        (set_item.func())(self.storage(kind), key, value)
    }

    pub fn console_clear(&self) {
        let clear = self.globals.console_clear.get();
        (clear.func())()
    }

    pub fn open_broadcast_channel(&self, name: &str) -> BroadcastChannel {
        let ctor = self.globals.broadcast_channel.get();
        (ctor.func())(name)
    }

    pub fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, NetworkError>> {
        let fetch = self.globals.fetch.get();
        (fetch.func())(request)
    }

    pub fn xhr_send(&self, request: XhrRequest, done: XhrCallback) {
        let send = self.globals.xhr_send.get();
        (send.func())(request, done)
    }

    pub fn content_window(&self, node: NodeId) -> Option<Arc<Realm>> {
        let getter = self.globals.content_window.get();
        (getter.func())(node)
    }

    pub fn href(&self) -> String {
        let get = self.location.href.get.get();
        (get.func())()
    }

    pub fn set_href(&self, target: &str) -> Result<(), ScriptError> {
        let set = self.location.href.set.get();
        (set.func())(target)
    }

    pub fn assign(&self, target: &str) -> Result<(), ScriptError> {
        let assign = self.location.assign.get();
        (assign.func())(target)
    }

    pub fn location_replace(&self, target: &str) -> Result<(), ScriptError> {
        let replace = self.location.replace.get();
        (replace.func())(target)
    }

    pub fn reload(&self) -> Result<(), ScriptError> {
        let reload = self.location.reload.get();
        (reload.func())()
    }

    pub fn push_state(&self, state: &ScriptValue, target: Option<&str>) -> Result<(), ScriptError> {
        let push = self.history.push_state.get();
        (push.func())(state, target)
    }

    pub fn replace_state(&self, state: &ScriptValue, target: Option<&str>) -> Result<(), ScriptError> {
        let replace = self.history.replace_state.get();
        (replace.func())(state, target)
    }

    pub fn history_go(&self, delta: i64) -> Result<(), ScriptError> {
        let go = self.history.go.get();
        (go.func())(delta)
    }
}
