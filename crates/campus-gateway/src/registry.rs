use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use campus_types::models::Message;

pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Bounded recently-seen message-id window. Redelivery under reconnect is
/// expected from the transport; this suppresses repeats without growing
/// without bound. Oldest ids are evicted first.
struct SeenWindow {
    cap: usize,
    set: HashSet<Uuid>,
    order: VecDeque<Uuid>,
}

impl SeenWindow {
    fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            set: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns true if the id was not seen before (within the window).
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }
}

struct ChannelSubscription {
    callback: MessageCallback,
    seen: SeenWindow,
}

/// Session-local mapping from channel to subscriber callback, with
/// per-channel dedup. Mutations and deliveries serialize through the lock,
/// so an unsubscribe is effective for every message published after it
/// returns.
pub struct ChannelRegistry {
    window: usize,
    subs: RwLock<HashMap<Uuid, ChannelSubscription>>,
}

impl ChannelRegistry {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            subs: RwLock::new(HashMap::new()),
        }
    }

    /// Register interest in a channel. A repeated subscribe replaces the
    /// callback but keeps the dedup window, so a message delivered to the
    /// old callback is not replayed to the new one.
    pub async fn insert(&self, channel_id: Uuid, callback: MessageCallback) {
        let mut subs = self.subs.write().await;
        match subs.get_mut(&channel_id) {
            Some(sub) => sub.callback = callback,
            None => {
                subs.insert(
                    channel_id,
                    ChannelSubscription {
                        callback,
                        seen: SeenWindow::new(self.window),
                    },
                );
            }
        }
    }

    pub async fn remove(&self, channel_id: Uuid) -> bool {
        self.subs.write().await.remove(&channel_id).is_some()
    }

    pub async fn clear(&self) {
        self.subs.write().await.clear();
    }

    pub async fn is_subscribed(&self, channel_id: Uuid) -> bool {
        self.subs.read().await.contains_key(&channel_id)
    }

    /// Deliver a newly published message. Returns true if the callback
    /// fired; false when unsubscribed or when the id was already seen.
    pub async fn deliver_new(&self, message: &Message) -> bool {
        let callback = {
            let mut subs = self.subs.write().await;
            let Some(sub) = subs.get_mut(&message.channel_id) else {
                return false;
            };
            if !sub.seen.insert(message.id) {
                return false;
            }
            sub.callback.clone()
        };
        callback(message.clone());
        true
    }

    /// Deliver an update to an already-known message (flag/soft-delete).
    /// Updates share the original message id, so they bypass the dedup
    /// window; subscription checks still apply.
    pub async fn deliver_update(&self, message: &Message) -> bool {
        let callback = {
            let subs = self.subs.read().await;
            match subs.get(&message.channel_id) {
                Some(sub) => sub.callback.clone(),
                None => return false,
            }
        };
        callback(message.clone());
        true
    }
}
