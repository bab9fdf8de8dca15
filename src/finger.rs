use crate::id::{is_strictly_between, Identifier};
use crate::NodeId;

/// Finger table of a Chord node.
///
/// Entry `i` points at the successor of `self + 2^i`. Entries start empty and
/// are filled by the periodic refresh.
#[derive(Clone, Debug, PartialEq)]
pub struct FingerTable {
    owner: Identifier,
    finger: Vec<Option<NodeId>>,
}

impl FingerTable {
    pub fn new(owner: Identifier, size: usize) -> Self {
        Self {
            owner,
            finger: vec![None; size],
        }
    }

    #[cfg(test)]
    pub fn get(&self, index: usize) -> Option<&NodeId> {
        self.finger.get(index).and_then(Option::as_ref)
    }

    pub fn set(&mut self, index: usize, node: NodeId) {
        match self.finger.get_mut(index) {
            Some(slot) => *slot = Some(node),
            None => tracing::error!("finger index {} out of range", index),
        }
    }

    /// Point every entry at the same node; used when the owner is alone.
    pub fn fill(&mut self, node: &NodeId) {
        for slot in self.finger.iter_mut() {
            *slot = Some(node.clone());
        }
    }

    /// Drop every entry pointing at `id`.
    pub fn remove(&mut self, id: Identifier) {
        for slot in self.finger.iter_mut() {
            if slot.as_ref().is_some_and(|n| n.id == id) {
                *slot = None;
            }
        }
    }

    /// Lowest-index entry that is not the owner.
    pub fn first_foreign(&self) -> Option<&NodeId> {
        self.finger.iter().flatten().find(|n| n.id != self.owner)
    }

    /// Highest entry strictly inside (owner, id), scanning from the top index down.
    pub fn closest_preceding(&self, id: Identifier) -> Option<&NodeId> {
        self.finger
            .iter()
            .rev()
            .flatten()
            .find(|n| is_strictly_between(n.id, self.owner, id))
    }

    pub fn list(&self) -> &[Option<NodeId>] {
        &self.finger
    }
}
