use crate::error::Result;
use crate::{Node, RingClient};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

impl<C: RingClient> Node<C> {
    /// Probe a foreign predecessor. A dead one is evicted by the failed call.
    pub async fn check_predecessor(&self) -> Result<()> {
        match self.ring.predecessor().await? {
            Some(predecessor) if predecessor != self.me => {
                self.predecessor_of(&predecessor).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Adopt our successor's predecessor if it sits between us, then notify
    /// whoever our successor is now.
    pub async fn stabilize(&self) -> Result<()> {
        let successor = self.ring.successor().await?;
        // for a lone successor this is our own predecessor, which is how a
        // node that only knows its predecessor gets back into the ring
        let successor = match self.predecessor_of(&successor).await? {
            Some(candidate) => self.ring.offer_successor(candidate).await?,
            None => successor,
        };
        if successor != self.me {
            self.send_notify(&successor).await?;
        }
        Ok(())
    }

    /// Rebuild every finger by lookup. Entries whose lookup fails keep their
    /// previous value until the next round.
    pub async fn refresh_fingers(&self) -> Result<()> {
        if self.ring.successor().await? == self.me {
            return self.ring.fill_fingers_with_self().await;
        }

        let space = self.settings.space;
        let mut entries = Vec::with_capacity(space.bits() as usize);
        for index in 0..space.bits() {
            let start = space.finger_start(self.me.id, index);
            match self.find_successor(start).await {
                Ok(node) => {
                    debug!("[{}] finger {} ({}) -> {}", self.me, index, start, node);
                    entries.push(Some(node));
                }
                Err(e) => {
                    warn!("[{}] could not refresh finger {} ({}): {}", self.me, index, start, e);
                    entries.push(None);
                }
            }
        }
        self.ring.set_fingers(entries).await
    }

    /// One stabilization round. Skipped while the node is alone.
    pub async fn tick(&self) {
        let snapshot = match self.ring.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("[{}] ring state unavailable: {}", self.me, e);
                return;
            }
        };
        if snapshot.is_alone() {
            debug!("[{}] alone, nothing to stabilize", self.me);
            return;
        }

        if let Err(e) = self.check_predecessor().await {
            warn!("[{}] predecessor check failed: {}", self.me, e);
        }
        if let Err(e) = self.stabilize().await {
            warn!("[{}] stabilize failed: {}", self.me, e);
        }
        if let Err(e) = self.refresh_fingers().await {
            warn!("[{}] finger refresh failed: {}", self.me, e);
        }

        if let Ok(snapshot) = self.ring.snapshot().await {
            let fingers: BTreeSet<_> = snapshot.fingers.iter().flatten().map(|n| n.id).collect();
            debug!(
                "[{}] predecessor: {}, successor: {}, fingers: {:?}",
                self.me,
                snapshot
                    .predecessor
                    .map_or_else(|| "none".to_string(), |p| p.to_string()),
                snapshot.successor,
                fingers
            );
        }
    }
}

/// Tick every `stabilize_interval` until the process exits. The first tick
/// happens one full interval after start.
pub async fn run_stabilization<C: RingClient>(node: Arc<Node<C>>) {
    let mut interval = tokio::time::interval(node.settings().stabilize_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        node.tick().await;
    }
}
