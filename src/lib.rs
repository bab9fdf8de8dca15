mod actor;
mod config;
pub mod error;
mod finger;
mod handlers;
pub mod id;
mod lookup;
mod messages;
mod net;
mod ring;
mod stabilize;
#[cfg(test)]
mod testing;

pub use config::{Config, DEFAULT_PORT};
pub use error::{Result, RingError};
pub use id::{IdSpace, Identifier};
pub use messages::{Request, Response};
pub use net::{bind, serve, RingClient, TcpClient};
pub use ring::{Membership, RingSnapshot};
pub use stabilize::run_stabilization;

use actor::RingHandle;
use ring::RingState;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// A position on the ring plus how to reach it. Compared by identifier only.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NodeId {
    pub id: Identifier,
    pub addr: SocketAddr,
}

impl NodeId {
    pub fn new(id: Identifier, addr: SocketAddr) -> Self {
        Self { id, addr }
    }

    /// The identifier is the hash of `ip:port`.
    pub fn from_addr(space: &IdSpace, addr: SocketAddr) -> Self {
        Self::new(space.hash(&addr.to_string()), addr)
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeId {}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

/// Runtime knobs shared by lookup, stabilization and the RPC client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub space: IdSpace,
    pub stabilize_interval: Duration,
    pub rpc_timeout: Duration,
    // lookups taking more closest-preceding-finger steps than this fail
    pub max_lookup_hops: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            space: IdSpace::default(),
            stabilize_interval: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(3),
            max_lookup_hops: 64,
        }
    }
}

/// One member of a Chord ring.
pub struct Node<C> {
    me: NodeId,
    settings: Settings,
    ring: RingHandle,
    client: C,
}

impl Node<TcpClient> {
    /// Bind the listen address and build a node around it. The identifier is
    /// derived from the address actually bound.
    pub async fn bind(addr: SocketAddr, settings: Settings) -> Result<(Arc<Self>, TcpListener)> {
        let listener = net::bind(addr).await?;
        let local = listener
            .local_addr()
            .map_err(|source| RingError::Bind { addr, source })?;
        let me = NodeId::from_addr(&settings.space, local);
        let node = Node::new(me, TcpClient::new(settings.rpc_timeout), settings);
        Ok((Arc::new(node), listener))
    }
}

impl<C: RingClient> Node<C> {
    /// Start a standalone node. Needs a running tokio runtime.
    pub fn new(me: NodeId, client: C, settings: Settings) -> Self {
        let state = RingState::new(me.clone(), settings.space.bits() as usize);
        Self {
            ring: RingHandle::spawn(state),
            me,
            settings,
            client,
        }
    }

    pub fn me(&self) -> &NodeId {
        &self.me
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn snapshot(&self) -> Result<RingSnapshot> {
        self.ring.snapshot().await
    }

    /// Serve inbound requests and run stabilization until the process exits.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        info!(
            "[LISTENING] node {} is listening on {}",
            self.me.id, self.me.addr
        );
        tokio::spawn(run_stabilization(self.clone()));
        serve(listener, self).await;
    }

    /// Enter the ring known to `bootstrap`. On failure the node stays
    /// standalone and the caller decides whether to retry.
    pub async fn join(&self, bootstrap: SocketAddr) -> Result<NodeId> {
        if !self.ring.begin_join().await? {
            return Err(RingError::AlreadyJoined);
        }
        info!("[{}] trying to join through {}", self.me, bootstrap);

        match self.client.call(bootstrap, Request::Join(self.me.clone())).await {
            Ok(Response::Successor(successor)) => {
                self.ring.complete_join(successor.clone()).await?;
                info!(
                    "[{}] joined, successor is {}; waiting for the ring to stabilize",
                    self.me, successor
                );
                Ok(successor)
            }
            Ok(other) => {
                self.ring.abort_join().await?;
                Err(unexpected(bootstrap, "JOIN", other))
            }
            Err(e) => {
                self.ring.abort_join().await?;
                warn!(
                    "[{}] join failed, is there a node running at {}? {}",
                    self.me, bootstrap, e
                );
                Err(e)
            }
        }
    }

    /// Graceful departure is not part of the protocol. Neighbours notice a
    /// missing node through failed calls on their next stabilization.
    pub fn leave(&self) {
        warn!(
            "[{}] leave is not supported; neighbours will route around this node once it stops",
            self.me
        );
    }

    /// Round trip to a remote node. Unreachable peers are evicted locally.
    async fn call(&self, target: &NodeId, request: Request) -> Result<Response> {
        let result = self.client.call(target.addr, request).await;
        self.evict_on_failure(target, result).await
    }

    async fn evict_on_failure<T>(&self, target: &NodeId, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_peer_failure() {
                warn!("[{}] peer {} presumed dead: {}", self.me, target, e);
                self.ring.evict(target.id).await?;
            }
        }
        result
    }

    pub(crate) async fn successor_of(&self, node: &NodeId) -> Result<NodeId> {
        if *node == self.me {
            return self.ring.successor().await;
        }
        match self.call(node, Request::Succ).await? {
            Response::Successor(successor) => Ok(successor),
            other => Err(unexpected(node.addr, "SUCC", other)),
        }
    }

    pub(crate) async fn predecessor_of(&self, node: &NodeId) -> Result<Option<NodeId>> {
        if *node == self.me {
            return self.ring.predecessor().await;
        }
        match self.call(node, Request::Pred).await? {
            Response::Predecessor(predecessor) => Ok(predecessor),
            other => Err(unexpected(node.addr, "PRED", other)),
        }
    }

    pub(crate) async fn closest_preceding_finger_of(
        &self,
        node: &NodeId,
        id: Identifier,
    ) -> Result<NodeId> {
        if *node == self.me {
            return self.ring.closest_preceding_finger(id).await;
        }
        match self.call(node, Request::Cpf { id }).await? {
            Response::Finger(finger) => Ok(finger),
            other => Err(unexpected(node.addr, "CPF", other)),
        }
    }

    /// Tell `target` we might be its predecessor. No answer is expected.
    pub(crate) async fn send_notify(&self, target: &NodeId) -> Result<()> {
        if *target == self.me {
            self.ring.notify(self.me.clone()).await?;
            return Ok(());
        }
        let result = self
            .client
            .send(target.addr, Request::Notify(self.me.clone()))
            .await;
        self.evict_on_failure(target, result).await
    }
}

fn unexpected(addr: SocketAddr, action: &str, response: Response) -> RingError {
    RingError::Protocol {
        addr,
        reason: format!("unexpected answer to {action}: {response:?}"),
    }
}
