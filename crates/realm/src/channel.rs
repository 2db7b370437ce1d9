//! Cross-context broadcast channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::platform::ScriptError;
use crate::ScriptValue;

pub type MessageListener = Arc<dyn Fn(&ScriptValue) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelListenerId(u64);

#[derive(Default)]
struct ListenerSet {
    next: AtomicU64,
    listeners: Mutex<Vec<(ChannelListenerId, MessageListener)>>,
    closed: AtomicBool,
}

impl ListenerSet {
    fn add(&self, listener: MessageListener) -> ChannelListenerId {
        let id = ChannelListenerId(self.next.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove(&self, id: ChannelListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn snapshot(&self) -> Vec<MessageListener> {
        self.listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// Routes messages between same-named channels of every realm sharing the hub.
#[derive(Default)]
pub struct ChannelHub {
    channels: Mutex<HashMap<String, Vec<Weak<NativeInner>>>>,
}

impl ChannelHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn open(self: &Arc<Self>, name: &str) -> NativeChannel {
        let inner = Arc::new(NativeInner {
            name: name.to_string(),
            hub: Arc::downgrade(self),
            listeners: ListenerSet::default(),
        });
        let mut channels = self.channels.lock();
        let peers = channels.entry(name.to_string()).or_default();
        peers.retain(|peer| peer.strong_count() > 0);
        peers.push(Arc::downgrade(&inner));
        NativeChannel { inner }
    }

    fn peers(&self, name: &str) -> Vec<Arc<NativeInner>> {
        self.channels
            .lock()
            .get(name)
            .map(|peers| peers.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }
}

struct NativeInner {
    name: String,
    hub: Weak<ChannelHub>,
    listeners: ListenerSet,
}

#[derive(Clone)]
pub struct NativeChannel {
    inner: Arc<NativeInner>,
}

/// A channel that looks and behaves like a real one to its owner but is connected to nothing.
#[derive(Clone)]
pub struct InertChannel {
    name: Arc<str>,
    listeners: Arc<ListenerSet>,
}

impl InertChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            listeners: Arc::new(ListenerSet::default()),
        }
    }
}

/// The value `new BroadcastChannel(name)` evaluates to.
#[derive(Clone)]
pub enum BroadcastChannel {
    Native(NativeChannel),
    Inert(InertChannel),
}

impl std::fmt::Debug for BroadcastChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastChannel")
            .field("name", &self.name())
            .finish()
    }
}

impl BroadcastChannel {
    pub fn prototype(&self) -> &'static str {
        "BroadcastChannel"
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Native(channel) => &channel.inner.name,
            Self::Inert(channel) => &channel.name,
        }
    }

    pub fn is_inert(&self) -> bool {
        matches!(self, Self::Inert(_))
    }

    fn listeners(&self) -> &ListenerSet {
        match self {
            Self::Native(channel) => &channel.inner.listeners,
            Self::Inert(channel) => &channel.listeners,
        }
    }

    pub fn add_listener(&self, listener: MessageListener) -> ChannelListenerId {
        self.listeners().add(listener)
    }

    pub fn remove_listener(&self, id: ChannelListenerId) -> bool {
        self.listeners().remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().count()
    }

    pub fn close(&self) {
        self.listeners().closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.listeners().closed.load(Ordering::SeqCst)
    }

    /// Delivers `message` to every other open channel with the same name. Delivery happens
    /// synchronously, in channel creation order.
    pub fn post_message(&self, message: &ScriptValue) -> Result<(), ScriptError> {
        if self.is_closed() {
            return Err(ScriptError::InvalidState(format!(
                "channel `{}` is closed",
                self.name()
            )));
        }
        let Self::Native(channel) = self else {
            return Ok(());
        };
        let Some(hub) = channel.inner.hub.upgrade() else {
            return Ok(());
        };
        for peer in hub.peers(&channel.inner.name) {
            if Arc::ptr_eq(&peer, &channel.inner) || peer.listeners.closed.load(Ordering::SeqCst) {
                continue;
            }
            for listener in peer.listeners.snapshot() {
                listener(message);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<ScriptValue>>>, MessageListener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Arc::new(move |msg: &ScriptValue| sink.lock().push(msg.clone())))
    }

    #[test]
    fn native_channels_reach_same_named_peers_only() {
        let hub = ChannelHub::new();
        let a = BroadcastChannel::Native(hub.open("tabs"));
        let b = BroadcastChannel::Native(hub.open("tabs"));
        let other = BroadcastChannel::Native(hub.open("other"));
        let (seen_a, la) = recorder();
        let (seen_b, lb) = recorder();
        let (seen_other, lo) = recorder();
        a.add_listener(la);
        b.add_listener(lb);
        other.add_listener(lo);

        a.post_message(&json!({"ping": 1})).unwrap();

        assert!(seen_a.lock().is_empty());
        assert_eq!(*seen_b.lock(), vec![json!({"ping": 1})]);
        assert!(seen_other.lock().is_empty());
    }

    #[test]
    fn inert_channel_accepts_everything_and_delivers_nothing() {
        let channel = BroadcastChannel::Inert(InertChannel::new("tabs"));
        let (seen, listener) = recorder();
        let id = channel.add_listener(listener);
        assert_eq!(channel.listener_count(), 1);
        assert!(channel.post_message(&json!("hello")).is_ok());
        assert!(seen.lock().is_empty());
        assert!(channel.remove_listener(id));
        channel.close();
        assert!(channel.post_message(&json!("late")).is_err());
        assert_eq!(channel.prototype(), "BroadcastChannel");
    }
}
