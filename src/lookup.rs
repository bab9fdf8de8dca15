//! Iterative Chord lookup.
//!
//! `find_predecessor` walks the ring starting at the local node: while the
//! target is not in `(candidate, candidate.successor]` it jumps to the
//! candidate's closest preceding finger. Each step asks a remote node
//! unless the candidate is us.

use crate::error::{Result, RingError};
use crate::id::{is_between, Identifier};
use crate::{Node, NodeId, RingClient};
use tracing::debug;

impl<C: RingClient> Node<C> {
    /// The node responsible for `id`.
    pub async fn find_successor(&self, id: Identifier) -> Result<NodeId> {
        let (_, successor) = self.locate(id).await?;
        Ok(successor)
    }

    /// The node whose `(node, successor]` interval contains `id`.
    pub async fn find_predecessor(&self, id: Identifier) -> Result<NodeId> {
        let (predecessor, _) = self.locate(id).await?;
        Ok(predecessor)
    }

    /// Our farthest finger strictly before `id`, or ourselves.
    pub async fn closest_preceding_finger(&self, id: Identifier) -> Result<NodeId> {
        self.ring.closest_preceding_finger(id).await
    }

    // returns the predecessor of `id` together with its successor, which the
    // last step already fetched
    async fn locate(&self, id: Identifier) -> Result<(NodeId, NodeId)> {
        let mut candidate = self.me.clone();
        let mut successor = self.successor_of(&candidate).await?;
        let mut hops = 0;

        loop {
            // a candidate that is its own successor owns the whole ring
            if successor == candidate || is_between(id, candidate.id, successor.id) {
                debug!(
                    "[{}] lookup {}: predecessor {}, successor {} after {} hops",
                    self.me, id, candidate, successor, hops
                );
                return Ok((candidate, successor));
            }
            if hops >= self.settings.max_lookup_hops {
                return Err(RingError::LookupDiverged { id, hops });
            }

            let next = self.closest_preceding_finger_of(&candidate, id).await?;
            // no finger gets closer, so step along the successor pointer;
            // id lies beyond it, so this never overshoots
            candidate = if next == candidate { successor } else { next };
            successor = self.successor_of(&candidate).await?;
            hops += 1;
        }
    }
}
