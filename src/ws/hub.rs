//! Connection hub - registry of live clients and broadcast fan-out
//!
//! All mutation of the client set happens on a single coordinator task that
//! owns the map; the rest of the server talks to it through [`Hub`] handles.
//! Broadcast never blocks: a client whose outbound queue is full is closed
//! and evicted instead of stalling everyone else.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::PlayerId;
use crate::ws::protocol::Frame;

/// Identifier of one live connection
pub type ClientId = Uuid;

/// Who is on the other end of a connection, as vouched for by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub id: PlayerId,
    pub name: String,
}

/// Delivery errors for a single client
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Outbound queue is full")]
    Full,

    #[error("Connection is closed")]
    Closed,
}

/// Send side of a connection; cheap to clone and shared with matches
#[derive(Clone, Debug)]
pub struct Client {
    id: ClientId,
    identity: PlayerIdentity,
    outbound: mpsc::Sender<Frame>,
    closed: Arc<watch::Sender<bool>>,
}

/// Receive side of a connection, drained by its writer task
#[derive(Debug)]
pub struct ClientReceiver {
    inbound: mpsc::Receiver<Frame>,
    closed: watch::Receiver<bool>,
}

impl Client {
    /// Create a connection pair with an outbound queue of `buffer` frames
    pub fn new(identity: PlayerIdentity, buffer: usize) -> (Self, ClientReceiver) {
        let (outbound, inbound) = mpsc::channel(buffer.max(1));
        let (closed_tx, closed_rx) = watch::channel(false);

        let client = Self {
            id: Uuid::new_v4(),
            identity,
            outbound,
            closed: Arc::new(closed_tx),
        };
        let receiver = ClientReceiver {
            inbound,
            closed: closed_rx,
        };

        (client, receiver)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    pub fn player_id(&self) -> &str {
        &self.identity.id
    }

    /// Queue a frame without waiting
    pub fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }

        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Close the connection; pending frames are discarded and the writer stops.
    /// Returns false if it was already closed.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.outbound.is_closed()
    }

    /// Resolves once the connection has been closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl ClientReceiver {
    /// Next outbound frame, or None once the connection is closed
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            if *self.closed.borrow_and_update() {
                return None;
            }

            tokio::select! {
                biased;
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                frame = self.inbound.recv() => return frame,
            }
        }
    }
}

/// Requests processed by the coordinator, one at a time
enum HubCommand {
    Register(Client),
    Unregister(ClientId),
    Broadcast(Frame),
    FindByPlayer {
        player_id: PlayerId,
        reply: oneshot::Sender<Option<Client>>,
    },
    ClientCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the hub coordinator
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Start the coordinator task. It runs until every handle is dropped.
    pub fn spawn(buffer: usize) -> Self {
        let (commands, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(HubCoordinator::default().run(rx));
        Self { commands }
    }

    /// Add a client to the live set; registering the same client twice is a no-op
    pub async fn register(&self, client: Client) {
        self.send(HubCommand::Register(client)).await;
    }

    /// Remove and close a client; unknown ids are ignored
    pub async fn unregister(&self, id: ClientId) {
        self.send(HubCommand::Unregister(id)).await;
    }

    /// Fan a frame out to every live client
    pub async fn broadcast(&self, frame: Frame) {
        self.send(HubCommand::Broadcast(frame)).await;
    }

    /// Most recently registered live connection of a player
    pub async fn find_by_player(&self, player_id: &str) -> Option<Client> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::FindByPlayer {
            player_id: player_id.to_string(),
            reply,
        })
        .await;
        rx.await.ok().flatten()
    }

    pub async fn client_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ClientCount { reply }).await;
        rx.await.unwrap_or(0)
    }

    async fn send(&self, command: HubCommand) {
        if self.commands.send(command).await.is_err() {
            warn!("Hub coordinator is gone, dropping command");
        }
    }
}

struct Registered {
    seq: u64,
    client: Client,
}

#[derive(Default)]
struct HubCoordinator {
    clients: HashMap<ClientId, Registered>,
    next_seq: u64,
}

impl HubCoordinator {
    async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                HubCommand::Register(client) => self.register(client),
                HubCommand::Unregister(id) => self.unregister(id),
                HubCommand::Broadcast(frame) => self.broadcast(frame),
                HubCommand::FindByPlayer { player_id, reply } => {
                    let _ = reply.send(self.find_by_player(&player_id));
                }
                HubCommand::ClientCount { reply } => {
                    let _ = reply.send(self.clients.len());
                }
            }
        }

        for (_, entry) in self.clients.drain() {
            entry.client.close();
        }
        debug!("Hub coordinator stopped");
    }

    fn register(&mut self, client: Client) {
        if self.clients.contains_key(&client.id) {
            return;
        }

        info!(
            client_id = %client.id,
            player_id = %client.identity.id,
            name = %client.identity.name,
            "Player connected"
        );
        self.next_seq += 1;
        self.clients.insert(
            client.id,
            Registered {
                seq: self.next_seq,
                client,
            },
        );
    }

    fn unregister(&mut self, id: ClientId) {
        if let Some(entry) = self.clients.remove(&id) {
            entry.client.close();
            info!(
                client_id = %id,
                player_id = %entry.client.identity.id,
                "Player disconnected"
            );
        }
    }

    fn broadcast(&mut self, frame: Frame) {
        self.clients.retain(|id, entry| match entry.client.try_deliver(frame.clone()) {
            Ok(()) => true,
            Err(e) => {
                entry.client.close();
                warn!(
                    client_id = %id,
                    player_id = %entry.client.identity.id,
                    error = %e,
                    "Dropping unresponsive client"
                );
                false
            }
        });
    }

    fn find_by_player(&self, player_id: &str) -> Option<Client> {
        self.clients
            .values()
            .filter(|entry| entry.client.identity.id == player_id && !entry.client.is_closed())
            .max_by_key(|entry| entry.seq)
            .map(|entry| entry.client.clone())
    }
}
