//! Hierarchical cooperative cancellation
//!
//! A [`CancelScope`] belongs to one bot generation. Cancelling a scope flips
//! its flag and the flags of every descendant, never an ancestor. Scopes in
//! the same strategy run share a commit gate so that at most one generation
//! ever proceeds to the buy phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug)]
struct Node {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Node>>>,
    gate: Arc<AtomicBool>,
    depth: u32,
}

impl Node {
    fn new(gate: Arc<AtomicBool>, depth: u32) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            children: Mutex::new(Vec::new()),
            gate,
            depth,
        })
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
        self.cancel_children();
    }

    fn cancel_children(&self) {
        let children: Vec<Arc<Node>> = {
            let mut guard = self.children.lock().unwrap_or_else(|e| e.into_inner());
            guard.retain(|child| child.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for child in children {
            child.cancel();
        }
    }
}

/// Handle to one node of the cancellation tree
#[derive(Debug, Clone)]
pub struct CancelScope {
    node: Arc<Node>,
}

impl CancelScope {
    /// Fresh tree with its own commit gate
    pub fn root() -> Self {
        Self {
            node: Node::new(Arc::new(AtomicBool::new(false)), 0),
        }
    }

    /// Child in the same strategy run; shares the commit gate
    pub fn child(&self) -> Self {
        self.attach(Arc::clone(&self.node.gate))
    }

    /// Child starting a new strategy run; cancelled with this scope but
    /// committing independently
    pub fn child_tree(&self) -> Self {
        self.attach(Arc::new(AtomicBool::new(false)))
    }

    fn attach(&self, gate: Arc<AtomicBool>) -> Self {
        let node = Node::new(gate, self.node.depth + 1);
        {
            let mut children = self.node.children.lock().unwrap_or_else(|e| e.into_inner());
            children.retain(|child| child.strong_count() > 0);
            children.push(Arc::downgrade(&node));
        }
        // a child created after cancellation starts cancelled
        if self.is_cancelled() {
            node.cancel();
        }
        Self { node }
    }

    /// Cancel this scope and every descendant
    pub fn cancel(&self) {
        debug!(depth = self.node.depth, "cancelling scope");
        self.node.cancel();
    }

    /// Cancel every descendant but leave this scope running
    pub fn cancel_descendants(&self) {
        self.node.cancel_children();
    }

    pub fn is_cancelled(&self) -> bool {
        self.node.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once this scope is cancelled
    pub async fn cancelled(&self) {
        let notified = self.node.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag so a concurrent cancel is not lost
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Claim the right to trade for this strategy run
    ///
    /// Succeeds for exactly one scope sharing the gate, and only while that
    /// scope is not cancelled. The winner cancels its own descendants.
    pub fn try_commit(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if self
            .node
            .gate
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.cancel_descendants();
        true
    }

    /// Whether some scope of this strategy run already committed
    pub fn is_committed(&self) -> bool {
        self.node.gate.load(Ordering::SeqCst)
    }

    /// Distance from the root; the root generation is 0
    pub fn depth(&self) -> u32 {
        self.node.depth
    }
}
