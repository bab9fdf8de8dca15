use crate::id::Identifier;
use crate::ring::RingSnapshot;
use crate::NodeId;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Commands understood by the task that owns the ring state.
#[derive(Debug)]
pub enum RingCommand {
    Snapshot {
        response_sender: oneshot::Sender<RingSnapshot>,
    },
    Predecessor {
        response_sender: oneshot::Sender<Option<NodeId>>,
    },
    Successor {
        response_sender: oneshot::Sender<NodeId>,
    },
    ClosestPrecedingFinger {
        id: Identifier,
        response_sender: oneshot::Sender<NodeId>,
    },
    // a peer thinks it might be our predecessor
    Notify {
        candidate: NodeId,
        response_sender: oneshot::Sender<bool>,
    },
    // stabilize found a node that may sit between us and our successor
    OfferSuccessor {
        candidate: NodeId,
        response_sender: oneshot::Sender<NodeId>,
    },
    // bootstrap side of a join
    AcceptJoin {
        joining: NodeId,
        response_sender: oneshot::Sender<bool>,
    },
    BeginJoin {
        response_sender: oneshot::Sender<bool>,
    },
    AbortJoin,
    CompleteJoin {
        successor: NodeId,
    },
    SetFingers {
        entries: Vec<Option<NodeId>>,
    },
    FillFingersWithSelf,
    // peer presumed dead
    Evict {
        id: Identifier,
    },
}

/// A request from one node to another. Exactly one action per connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Request {
    // a node asking to enter the ring, carrying its own descriptor
    Join(NodeId),
    Pred,
    Succ,
    // sender might be our predecessor; no response is sent
    Notify(NodeId),
    // closest preceding finger of `id`
    Cpf { id: Identifier },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    // answer to Succ, and the assigned successor for Join
    Successor(NodeId),
    Predecessor(Option<NodeId>),
    Finger(NodeId),
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::Join(_) => "JOIN",
            Request::Pred => "PRED",
            Request::Succ => "SUCC",
            Request::Notify(_) => "NOTIFY",
            Request::Cpf { .. } => "CPF",
        }
    }
}
