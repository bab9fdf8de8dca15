//! A node's view of the ring and the state transitions the protocol applies
//! to it. Everything here is synchronous; the ring actor applies one
//! transition at a time so each sees a consistent state.

use crate::finger::FingerTable;
use crate::id::{is_strictly_between, Identifier};
use crate::NodeId;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    Standalone,
    Joining,
    Joined,
}

#[derive(Clone, Debug)]
pub struct RingState {
    me: NodeId,
    predecessor: Option<NodeId>,
    successor: NodeId,
    fingers: FingerTable,
    membership: Membership,
}

/// Point-in-time copy of a node's ring state.
#[derive(Clone, Debug, PartialEq)]
pub struct RingSnapshot {
    pub me: NodeId,
    pub predecessor: Option<NodeId>,
    pub successor: NodeId,
    pub fingers: Vec<Option<NodeId>>,
    pub membership: Membership,
}

impl RingSnapshot {
    /// Alone: own successor, and nobody else claims to precede us.
    pub fn is_alone(&self) -> bool {
        self.successor == self.me && self.predecessor.as_ref().map_or(true, |p| *p == self.me)
    }
}

impl RingState {
    pub fn new(me: NodeId, finger_count: usize) -> Self {
        Self {
            fingers: FingerTable::new(me.id, finger_count),
            predecessor: Some(me.clone()),
            successor: me.clone(),
            membership: Membership::Standalone,
            me,
        }
    }

    pub fn me(&self) -> &NodeId {
        &self.me
    }

    pub fn predecessor(&self) -> Option<&NodeId> {
        self.predecessor.as_ref()
    }

    pub fn successor(&self) -> &NodeId {
        &self.successor
    }

    #[cfg(test)]
    pub fn membership(&self) -> Membership {
        self.membership
    }

    #[cfg(test)]
    pub fn fingers(&self) -> &FingerTable {
        &self.fingers
    }

    pub fn snapshot(&self) -> RingSnapshot {
        RingSnapshot {
            me: self.me.clone(),
            predecessor: self.predecessor.clone(),
            successor: self.successor.clone(),
            fingers: self.fingers.list().to_vec(),
            membership: self.membership,
        }
    }

    /// Our closest known node strictly before `id`, or ourselves.
    pub fn closest_preceding_finger(&self, id: Identifier) -> NodeId {
        self.fingers
            .closest_preceding(id)
            .cloned()
            .unwrap_or_else(|| self.me.clone())
    }

    /// Adopt `candidate` as predecessor if we have none or it is closer than
    /// the current one. Returns whether it was adopted.
    pub fn notify(&mut self, candidate: NodeId) -> bool {
        let closer = match &self.predecessor {
            None => true,
            Some(pred) => is_strictly_between(candidate.id, pred.id, self.me.id),
        };
        if closer {
            info!(
                "predecessor {} -> {}",
                describe(self.predecessor.as_ref()),
                candidate
            );
            self.predecessor = Some(candidate);
        }
        closer
    }

    /// Stabilize step: take `candidate` as successor if it sits strictly
    /// between us and the current successor. Returns the successor afterwards.
    pub fn offer_successor(&mut self, candidate: NodeId) -> NodeId {
        if is_strictly_between(candidate.id, self.me.id, self.successor.id) {
            info!("successor {} -> {}", self.successor, candidate);
            self.successor = candidate;
        }
        self.successor.clone()
    }

    /// Join acceptance on the bootstrap side. A node that is alone links the
    /// newcomer as both neighbours at once. Returns whether it did.
    pub fn accept_join(&mut self, joining: NodeId) -> bool {
        if self.successor != self.me || joining == self.me {
            return false;
        }
        info!("first peer {} joined, linking it as both neighbours", joining);
        self.successor = joining.clone();
        self.predecessor = Some(joining);
        self.membership = Membership::Joined;
        true
    }

    /// Standalone -> Joining. Fails if we are already joining or joined.
    /// A joined node drops back to standalone once it has evicted every
    /// neighbour.
    pub fn begin_join(&mut self) -> bool {
        if self.membership != Membership::Standalone {
            return false;
        }
        self.membership = Membership::Joining;
        true
    }

    pub fn abort_join(&mut self) {
        if self.membership == Membership::Joining {
            self.membership = Membership::Standalone;
        }
    }

    /// Joining -> Joined with the successor the bootstrap peer assigned.
    /// The predecessor is learnt later through notify.
    pub fn complete_join(&mut self, successor: NodeId) {
        self.successor = successor;
        self.predecessor = None;
        self.membership = Membership::Joined;
    }

    /// Replace the whole finger table. `None` entries keep their old value.
    pub fn set_fingers(&mut self, entries: Vec<Option<NodeId>>) {
        for (index, entry) in entries.into_iter().enumerate() {
            if let Some(node) = entry {
                self.fingers.set(index, node);
            }
        }
    }

    pub fn fill_fingers_with_self(&mut self) {
        self.fingers.fill(&self.me);
    }

    /// Forget a peer presumed dead. A dead successor is replaced by the
    /// lowest live finger, falling back to ourselves.
    pub fn evict(&mut self, id: Identifier) {
        if id == self.me.id {
            return;
        }
        if self.predecessor.as_ref().is_some_and(|p| p.id == id) {
            self.predecessor = None;
        }
        self.fingers.remove(id);
        if self.successor.id == id {
            let next = self
                .fingers
                .first_foreign()
                .cloned()
                .unwrap_or_else(|| self.me.clone());
            info!("successor {} presumed dead, falling back to {}", self.successor, next);
            self.successor = next;
        }
        // every neighbour is gone: free to join another ring
        if self.membership == Membership::Joined && self.is_alone() {
            info!("no live neighbours left, back to standalone");
            self.membership = Membership::Standalone;
        }
    }

    fn is_alone(&self) -> bool {
        self.successor == self.me && self.predecessor.as_ref().map_or(true, |p| *p == self.me)
    }
}

fn describe(node: Option<&NodeId>) -> String {
    node.map_or_else(|| "none".to_string(), ToString::to_string)
}
