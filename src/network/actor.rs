//! Node tasks and their mailboxes.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use tokio::{
    runtime::Handle,
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{timeout, timeout_at, Instant},
};
use tracing::{debug, error, info_span, trace, warn, Instrument};

use crate::{
    core::{
        id::NodeId,
        packet::{display_path, Packet, PacketKind, Response},
    },
    dsr::{DsrRouter, Outcome},
    error::Error,
    network::Shared,
};

/// What a node's mailbox carries.
#[derive(Debug)]
pub(crate) enum Envelope {
    /// A packet handed over by a neighbor.
    Packet(Packet),
    /// Start a discovery towards the destination.
    Discover(NodeId),
    /// Forget the routes and requests of the previous session.
    Reset,
}

/// A node's execution unit: the router, its mailbox and a way back to the network.
pub(crate) struct Actor {
    router: DsrRouter,
    mailbox: mpsc::Receiver<Envelope>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    network: Weak<Shared>,
}

impl Actor {
    fn id(&self) -> NodeId {
        self.router.local_id()
    }

    /// Reads the mailbox until asked to stop, then hands the actor back so it can be restarted.
    async fn run(mut self) -> Self {
        debug!("started");

        while !self.stop.load(Ordering::Acquire) {
            match timeout(self.poll_interval, self.mailbox.recv()).await {
                // Nothing arrived, check the stop flag again.
                Err(_) => continue,
                // Every sender is gone, the node was dropped from the network.
                Ok(None) => break,
                Ok(Some(envelope)) => self.handle(envelope).await,
            }
        }

        debug!("stopped");
        self
    }

    async fn handle(&mut self, envelope: Envelope) {
        let Some(network) = self.network.upgrade() else {
            return;
        };

        match envelope {
            Envelope::Reset => self.router.reset_session(),
            Envelope::Discover(destination) => {
                let (request, response) = self.router.start_discovery(destination);
                debug!(%destination, request_id = request.request_id, "starting discovery");

                network.log(&format!(
                    "Node {} starts route discovery to {}",
                    self.id(),
                    destination
                ));
                network.notify_step(&request, self.id());
                self.dispatch(&network, response).await;
            }
            Envelope::Packet(packet) => {
                let id = self.id();

                match self.router.process_packet(packet.clone()) {
                    Ok(Outcome::Dropped) => {}
                    Ok(Outcome::Handled(response)) => {
                        debug!(%packet, "handled");
                        network.log(&format!(
                            "Node {} received {} from {} to {}, path: {}",
                            id,
                            packet.kind,
                            packet.source,
                            packet.destination,
                            display_path(&packet.path)
                        ));
                        network.notify_step(&packet, id);

                        if let Some(response) = response {
                            self.dispatch(&network, response).await;
                        }
                    }
                    Err(fault) => {
                        let error = Error::ActorHandlerFault { node: id, fault };
                        error!("{error}");
                        network.log(&error.to_string());
                    }
                }
            }
        }

        self.router.dispatched();
    }

    // Hands the packets over one at a time, each after the propagation delay.
    async fn dispatch(&self, network: &Shared, response: Response) {
        let id = self.id();

        match response {
            Response::Unicast(next_hop, packet) => {
                if packet.kind == PacketKind::RouteReply && packet.source == id {
                    network.log(&format!(
                        "Node {} sends RREP to {}, path: {}",
                        id,
                        packet.destination,
                        display_path(&packet.path)
                    ));
                }

                network.deliver(id, next_hop, packet).await;
            }
            Response::Broadcast(packets) => {
                for (neighbor, packet) in packets {
                    network.deliver(id, neighbor, packet).await;
                }
            }
            Response::RouteFound(path) => {
                network.log(&format!(
                    "Route found! From {} to {}: {}",
                    id,
                    path.last().copied().unwrap_or(id),
                    display_path(&path)
                ));
                network.report_route(path);
            }
        }
    }
}

/// The network's side of a node: the mailbox sender, and either the idle actor or its running
/// task.
pub(crate) struct NodeHandle {
    id: NodeId,
    sender: mpsc::Sender<Envelope>,
    stop: Arc<AtomicBool>,
    idle: Option<Actor>,
    task: Option<JoinHandle<Actor>>,
}

impl NodeHandle {
    pub(crate) fn new(
        router: DsrRouter,
        mailbox_capacity: usize,
        poll_interval: Duration,
        network: Weak<Shared>,
    ) -> Self {
        // Tokio panics on a zero capacity.
        let (sender, mailbox) = mpsc::channel(mailbox_capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let id = router.local_id();

        let actor = Actor {
            router,
            mailbox,
            stop: Arc::clone(&stop),
            poll_interval,
            network,
        };

        Self {
            id,
            sender,
            stop,
            idle: Some(actor),
            task: None,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawns the actor onto the runtime. Returns `false` if there is no idle actor to spawn,
    /// i.e. it is running or still being stopped.
    pub(crate) fn start(&mut self, runtime: &Handle) -> bool {
        let Some(actor) = self.idle.take() else {
            return false;
        };

        self.stop.store(false, Ordering::Release);
        let span = info_span!("node", id = %self.id);
        self.task = Some(runtime.spawn(actor.run().instrument(span)));

        true
    }

    /// Raises the stop flag and takes the running task, if any.
    pub(crate) fn signal_stop(&mut self) -> Option<JoinHandle<Actor>> {
        self.stop.store(true, Ordering::Release);
        self.task.take()
    }

    /// Puts a stopped actor back so the node can be started again.
    pub(crate) fn park(&mut self, actor: Actor) {
        self.idle = Some(actor);
    }

    /// Enqueues the envelope without waiting, dropping it if the mailbox is full or closed.
    pub(crate) fn enqueue(&self, envelope: Envelope) {
        match self.sender.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                warn!(node = %self.id, ?envelope, "mailbox full, envelope dropped");
            }
            Err(TrySendError::Closed(envelope)) => {
                trace!(node = %self.id, ?envelope, "mailbox closed, envelope dropped");
            }
        }
    }
}

/// Waits for a stopped task to finish, aborting it once the deadline has passed.
pub(crate) async fn join(
    id: NodeId,
    mut task: JoinHandle<Actor>,
    deadline: Instant,
) -> Option<Actor> {
    match timeout_at(deadline, &mut task).await {
        Ok(Ok(actor)) => Some(actor),
        Ok(Err(e)) => {
            warn!(node = %id, "node task failed: {e}");
            None
        }
        Err(_) => {
            task.abort();
            warn!(node = %id, "node task aborted after the grace period");
            None
        }
    }
}
