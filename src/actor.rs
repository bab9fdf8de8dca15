use crate::error::{Result, RingError};
use crate::id::Identifier;
use crate::messages::RingCommand;
use crate::ring::{RingSnapshot, RingState};
use crate::NodeId;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

const INBOX_CAPACITY: usize = 64;

/// Owns the ring state; every read and write arrives as a command.
struct RingActor {
    state: RingState,
    inbox: mpsc::Receiver<RingCommand>,
}

impl RingActor {
    async fn run(mut self) {
        while let Some(command) = self.inbox.recv().await {
            self.handle(command);
        }
        debug!("ring state inbox closed for {}", self.state.me());
    }

    // one command at a time, so every check-then-act is atomic
    fn handle(&mut self, command: RingCommand) {
        match command {
            RingCommand::Snapshot { response_sender } => {
                let _ = response_sender.send(self.state.snapshot());
            }
            RingCommand::Predecessor { response_sender } => {
                let _ = response_sender.send(self.state.predecessor().cloned());
            }
            RingCommand::Successor { response_sender } => {
                let _ = response_sender.send(self.state.successor().clone());
            }
            RingCommand::ClosestPrecedingFinger {
                id,
                response_sender,
            } => {
                let _ = response_sender.send(self.state.closest_preceding_finger(id));
            }
            RingCommand::Notify {
                candidate,
                response_sender,
            } => {
                let _ = response_sender.send(self.state.notify(candidate));
            }
            RingCommand::OfferSuccessor {
                candidate,
                response_sender,
            } => {
                let _ = response_sender.send(self.state.offer_successor(candidate));
            }
            RingCommand::AcceptJoin {
                joining,
                response_sender,
            } => {
                let _ = response_sender.send(self.state.accept_join(joining));
            }
            RingCommand::BeginJoin { response_sender } => {
                let _ = response_sender.send(self.state.begin_join());
            }
            RingCommand::AbortJoin => self.state.abort_join(),
            RingCommand::CompleteJoin { successor } => self.state.complete_join(successor),
            RingCommand::SetFingers { entries } => self.state.set_fingers(entries),
            RingCommand::FillFingersWithSelf => self.state.fill_fingers_with_self(),
            RingCommand::Evict { id } => self.state.evict(id),
        }
    }
}

/// Cheap, cloneable handle to a node's ring state task.
#[derive(Clone, Debug)]
pub struct RingHandle {
    sender: mpsc::Sender<RingCommand>,
}

impl RingHandle {
    /// Spawn the task owning `state`. It stops once every handle is dropped.
    pub fn spawn(state: RingState) -> Self {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        tokio::spawn(RingActor { state, inbox }.run());
        Self { sender }
    }

    async fn send(&self, command: RingCommand) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RingError::StateClosed)
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> RingCommand) -> Result<T> {
        let (response_sender, response_receiver) = oneshot::channel();
        self.send(build(response_sender)).await?;
        response_receiver.await.map_err(|_| RingError::StateClosed)
    }

    pub async fn snapshot(&self) -> Result<RingSnapshot> {
        self.ask(|response_sender| RingCommand::Snapshot { response_sender })
            .await
    }

    pub async fn predecessor(&self) -> Result<Option<NodeId>> {
        self.ask(|response_sender| RingCommand::Predecessor { response_sender })
            .await
    }

    pub async fn successor(&self) -> Result<NodeId> {
        self.ask(|response_sender| RingCommand::Successor { response_sender })
            .await
    }

    pub async fn closest_preceding_finger(&self, id: Identifier) -> Result<NodeId> {
        self.ask(|response_sender| RingCommand::ClosestPrecedingFinger {
            id,
            response_sender,
        })
        .await
    }

    pub async fn notify(&self, candidate: NodeId) -> Result<bool> {
        self.ask(|response_sender| RingCommand::Notify {
            candidate,
            response_sender,
        })
        .await
    }

    pub async fn offer_successor(&self, candidate: NodeId) -> Result<NodeId> {
        self.ask(|response_sender| RingCommand::OfferSuccessor {
            candidate,
            response_sender,
        })
        .await
    }

    pub async fn accept_join(&self, joining: NodeId) -> Result<bool> {
        self.ask(|response_sender| RingCommand::AcceptJoin {
            joining,
            response_sender,
        })
        .await
    }

    pub async fn begin_join(&self) -> Result<bool> {
        self.ask(|response_sender| RingCommand::BeginJoin { response_sender })
            .await
    }

    pub async fn abort_join(&self) -> Result<()> {
        self.send(RingCommand::AbortJoin).await
    }

    pub async fn complete_join(&self, successor: NodeId) -> Result<()> {
        self.send(RingCommand::CompleteJoin { successor }).await
    }

    pub async fn set_fingers(&self, entries: Vec<Option<NodeId>>) -> Result<()> {
        self.send(RingCommand::SetFingers { entries }).await
    }

    pub async fn fill_fingers_with_self(&self) -> Result<()> {
        self.send(RingCommand::FillFingersWithSelf).await
    }

    pub async fn evict(&self, id: Identifier) -> Result<()> {
        self.send(RingCommand::Evict { id }).await
    }
}
