//! Lobby Manager: creates, lists, joins, and tears down lobbies.
//!
//! The manager's lobby-map lock is always taken before any lobby's own
//! locks. Removal closes a lobby under that lock, so a join racing with the
//! last leave either lands before the close or fails with `LobbyNotFound`.

use crate::config::LobbyConfig;
use crate::error::{ConfigError, LobbyError};
use crate::lobby::Lobby;
use crate::names;
use gol_env::{LifeContext, LobbyId, ParticipantId, RenderSink};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::{debug, info};

/// Menu entry for one lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LobbyInfo {
    pub id: LobbyId,
    pub name: String,
    pub participant_count: usize,
    pub capacity: usize,
}

impl std::fmt::Display for LobbyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.participant_count, self.capacity)
    }
}

/// Everything a session needs after a successful join.
pub struct JoinTicket<Ctx: LifeContext> {
    pub participant_id: ParticipantId,
    pub board_width: usize,
    pub board_height: usize,
    /// Handle for placement, pause, cursor, and view calls
    pub lobby: Arc<Lobby<Ctx>>,
}

impl<Ctx: LifeContext> std::fmt::Debug for JoinTicket<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinTicket")
            .field("participant_id", &self.participant_id)
            .field("board", &(self.board_width, self.board_height))
            .field("lobby", &self.lobby.id())
            .finish()
    }
}

/// Process-wide set of lobbies.
///
/// Creating a lobby starts its driver through `LifeContext::spawn`; with
/// `TokioContext` that requires a running tokio runtime.
pub struct Manager<Ctx: LifeContext> {
    context: Arc<Ctx>,
    config: LobbyConfig,
    lobbies: RwLock<BTreeMap<LobbyId, Arc<Lobby<Ctx>>>>,
    /// Last id handed out
    last_id: AtomicU64,
    listings: watch::Sender<Vec<LobbyInfo>>,
}

impl<Ctx: LifeContext> Manager<Ctx> {
    /// Creates a manager whose lobbies all use `config`.
    pub fn new(context: Arc<Ctx>, config: LobbyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (listings, _) = watch::channel(Vec::new());
        Ok(Self {
            context,
            config,
            lobbies: RwLock::new(BTreeMap::new()),
            last_id: AtomicU64::new(0),
            listings,
        })
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    fn read_lobbies(&self) -> RwLockReadGuard<'_, BTreeMap<LobbyId, Arc<Lobby<Ctx>>>> {
        self.lobbies.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lobbies(&self) -> RwLockWriteGuard<'_, BTreeMap<LobbyId, Arc<Lobby<Ctx>>>> {
        self.lobbies.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds a lobby with a generated name and starts its driver.
    pub fn create_lobby(&self) -> LobbyId {
        let id = LobbyId(self.last_id.fetch_add(1, Ordering::AcqRel) + 1);
        let name = names::lobby_name(self.context.as_ref());
        let lobby = Lobby::build(id, name, self.config.clone(), Arc::clone(&self.context));

        self.write_lobbies().insert(id, Arc::clone(&lobby));
        lobby.start();
        info!("Created {} ({})", id, lobby.name());

        self.publish_listings();
        id
    }

    /// First open lobby with room, or a fresh one.
    pub fn find_or_create_lobby(&self) -> LobbyId {
        let open = self
            .read_lobbies()
            .values()
            .find(|lobby| !lobby.is_closed() && lobby.participant_count() < lobby.capacity())
            .map(|lobby| lobby.id());

        match open {
            Some(id) => id,
            None => self.create_lobby(),
        }
    }

    /// Lobbies in id order.
    pub fn list_lobbies(&self) -> Vec<LobbyInfo> {
        self.read_lobbies()
            .values()
            .map(|lobby| LobbyInfo {
                id: lobby.id(),
                name: lobby.name().to_string(),
                participant_count: lobby.participant_count(),
                capacity: lobby.capacity(),
            })
            .collect()
    }

    /// Receives a fresh listing on every create, join, and leave.
    pub fn subscribe_listings(&self) -> watch::Receiver<Vec<LobbyInfo>> {
        self.listings.subscribe()
    }

    fn publish_listings(&self) {
        self.listings.send_replace(self.list_lobbies());
    }

    pub fn lobby(&self, id: LobbyId) -> Option<Arc<Lobby<Ctx>>> {
        self.read_lobbies().get(&id).cloned()
    }

    pub fn lobby_count(&self) -> usize {
        self.read_lobbies().len()
    }

    pub fn join_lobby(
        &self,
        id: LobbyId,
        sink: Arc<dyn RenderSink>,
    ) -> Result<JoinTicket<Ctx>, LobbyError> {
        let ticket = {
            let lobbies = self.read_lobbies();
            let lobby = lobbies.get(&id).ok_or(LobbyError::LobbyNotFound(id))?;
            let participant_id = lobby.join(sink)?;
            let (board_width, board_height) = lobby.board_size();
            JoinTicket {
                participant_id,
                board_width,
                board_height,
                lobby: Arc::clone(lobby),
            }
        };

        self.publish_listings();
        Ok(ticket)
    }

    /// Joins the first lobby with room, creating one if needed.
    pub fn quick_join(&self, sink: Arc<dyn RenderSink>) -> Result<JoinTicket<Ctx>, LobbyError> {
        let id = self.find_or_create_lobby();
        self.join_lobby(id, sink)
    }

    /// Removes a participant; the lobby is torn down once empty.
    pub fn leave_lobby(&self, id: LobbyId, participant_id: ParticipantId) -> Result<(), LobbyError> {
        let lobby = self.lobby(id).ok_or(LobbyError::LobbyNotFound(id))?;
        if !lobby.leave(participant_id) {
            debug!("{} was not in {}", participant_id, id);
        }

        if lobby.participant_count() == 0 {
            self.remove_if_empty(id);
        }
        self.publish_listings();
        Ok(())
    }

    fn remove_if_empty(&self, id: LobbyId) -> bool {
        let mut lobbies = self.write_lobbies();
        let closed = lobbies.get(&id).is_some_and(|lobby| lobby.close_if_empty());
        if closed {
            lobbies.remove(&id);
            info!("Removed empty {}", id);
        }
        closed
    }

    /// Removes lobbies that emptied without going through `leave_lobby`.
    ///
    /// Lobbies nobody has joined yet are kept. Returns how many were removed.
    pub fn sweep_empty(&self) -> usize {
        let removed = {
            let mut lobbies = self.write_lobbies();
            let before = lobbies.len();
            lobbies.retain(|_, lobby| {
                let stale = lobby.is_closed() || (lobby.was_occupied() && lobby.close_if_empty());
                !stale
            });
            before - lobbies.len()
        };

        if removed > 0 {
            info!("Swept {} empty lobbies", removed);
            self.publish_listings();
        }
        removed
    }

    /// Closes every lobby and notifies their sessions.
    pub fn shutdown(&self) {
        let lobbies: Vec<_> = {
            let mut map = self.write_lobbies();
            std::mem::take(&mut *map).into_values().collect()
        };
        for lobby in &lobbies {
            lobby.shutdown();
        }
        info!("Manager shut down {} lobbies", lobbies.len());
        self.publish_listings();
    }
}
