use crate::error::Result;
use crate::id::Identifier;
use crate::messages::{Request, Response};
use crate::{Node, NodeId, RingClient};
use tracing::{debug, info};

/// Apply one inbound request. `None` means the action has no response.
pub(crate) async fn handle_request<C: RingClient>(
    node: &Node<C>,
    request: Request,
) -> Result<Option<Response>> {
    match request {
        Request::Join(joining) => handle_join(node, joining).await.map(Some),
        Request::Pred => Ok(Some(Response::Predecessor(node.ring.predecessor().await?))),
        Request::Succ => Ok(Some(Response::Successor(node.ring.successor().await?))),
        Request::Notify(candidate) => {
            handle_notify(node, candidate).await?;
            Ok(None)
        }
        Request::Cpf { id } => handle_cpf(node, id).await.map(Some),
    }
}

// bootstrap side of a join: find the newcomer's successor, and if we are
// alone link it as both neighbours right away
async fn handle_join<C: RingClient>(node: &Node<C>, joining: NodeId) -> Result<Response> {
    info!("[NEW CONNECTION] {} trying to join through {}", joining, node.me());
    let successor = node.find_successor(joining.id).await?;
    if node.ring.accept_join(joining.clone()).await? {
        info!("[{}] {} entered the network", node.me(), joining);
    }
    Ok(Response::Successor(successor))
}

async fn handle_notify<C: RingClient>(node: &Node<C>, candidate: NodeId) -> Result<()> {
    debug!("[{}] notified by {}", node.me(), candidate);
    node.ring.notify(candidate).await?;
    Ok(())
}

async fn handle_cpf<C: RingClient>(node: &Node<C>, id: Identifier) -> Result<Response> {
    let finger = node.closest_preceding_finger(id).await?;
    debug!("[{}] closest preceding finger of {} is {}", node.me(), id, finger);
    Ok(Response::Finger(finger))
}
