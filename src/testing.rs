//! In-process network for driving several nodes without sockets.

use crate::error::{Result, RingError};
use crate::handlers::handle_request;
use crate::messages::{Request, Response};
use crate::{IdSpace, Node, NodeId, RingClient, Settings};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

#[derive(Default)]
struct Registry {
    nodes: Mutex<HashMap<SocketAddr, Arc<Node<MemoryClient>>>>,
    calls: AtomicUsize,
}

/// Routes requests straight into the target node's handler.
#[derive(Clone)]
pub(crate) struct MemoryClient {
    registry: Arc<Registry>,
}

impl MemoryClient {
    fn lookup(&self, to: SocketAddr) -> Result<Arc<Node<MemoryClient>>> {
        self.registry.calls.fetch_add(1, Ordering::SeqCst);
        let nodes = self.registry.nodes.lock().expect("registry lock poisoned");
        nodes.get(&to).cloned().ok_or(RingError::Connection {
            addr: to,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        })
    }
}

#[async_trait]
impl RingClient for MemoryClient {
    async fn call(&self, to: SocketAddr, request: Request) -> Result<Response> {
        let node = self.lookup(to)?;
        handle_request(&node, request)
            .await?
            .ok_or_else(|| RingError::Protocol {
                addr: to,
                reason: "no response".to_string(),
            })
    }

    async fn send(&self, to: SocketAddr, request: Request) -> Result<()> {
        let node = self.lookup(to)?;
        handle_request(&node, request).await?;
        Ok(())
    }
}

pub(crate) struct MemoryNetwork {
    registry: Arc<Registry>,
    settings: Settings,
}

impl MemoryNetwork {
    pub fn new(bits: u32) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            settings: Settings {
                space: IdSpace::new(bits),
                stabilize_interval: Duration::from_millis(10),
                rpc_timeout: Duration::from_millis(100),
                max_lookup_hops: 32,
            },
        }
    }

    /// Add a standalone node with a chosen identifier.
    pub fn add(&self, id: u64) -> Arc<Node<MemoryClient>> {
        let addr = SocketAddr::from(([127, 0, 0, 1], 10_000 + (id % 50_000) as u16));
        let client = MemoryClient {
            registry: self.registry.clone(),
        };
        let node = Arc::new(Node::new(NodeId::new(id, addr), client, self.settings));
        self.registry
            .nodes
            .lock()
            .expect("registry lock poisoned")
            .insert(addr, node.clone());
        node
    }

    /// Every later call to this node fails as if it had crashed.
    pub fn take_offline(&self, node: &NodeId) {
        self.registry
            .nodes
            .lock()
            .expect("registry lock poisoned")
            .remove(&node.addr);
    }

    /// Calls that crossed the network, i.e. remote hops.
    pub fn calls(&self) -> usize {
        self.registry.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.registry.calls.store(0, Ordering::SeqCst);
    }
}

/// The node responsible for `id` among `ids`: the first at or after it, clockwise.
pub(crate) fn reference_successor(ids: &[u64], id: u64) -> u64 {
    let mut sorted = ids.to_vec();
    sorted.sort();
    sorted
        .iter()
        .copied()
        .find(|&n| n >= id)
        .unwrap_or(sorted[0])
}

/// Run `rounds` stabilization ticks on every node, in order.
pub(crate) async fn run_rounds(nodes: &[Arc<Node<MemoryClient>>], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes {
            node.tick().await;
        }
    }
}
