// Copyright (c) 2026, DoNet Edge Contributors.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3.
// You should have received a copy of this license along
// with this source code in a file named "LICENSE."
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

//! Client Agent: terminates game-client TCP
//! connections, carries each one through Pre-auth -> Authenticated ->
//! Playing, and bridges client datagrams to the Message Director on
//! the client's derived channels.

use crate::channel_allocator::ChannelAllocator;
use crate::config::ClientAgentConfig;
use crate::database::DatabaseInterface;
use crate::database::FieldSet;
use crate::datagram::{Datagram, DatagramIterator};
use crate::dc_schema;
use crate::globals::{account_channel, avatar_channel, puppet_channel, Channel, Context, DoId, Zone};
use crate::interest::{InterestManager, VisibilityDirectory};
use crate::kv_store::TokenStore;
use crate::message_types::{client, client_agent as ca_internal, control, stateserver};
use crate::operations::{self, NameDictionary, OperationManager};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    PreAuth,
    AuthenticatedNoAvatar,
    Playing,
}

/// Tracks one outstanding `GET_ZONES_OBJECTS_2` request: which interest
/// and wire context it belongs to, and which object ids are still
/// expected before `DONE_INTEREST_RESP` can fire.
struct PendingInterestCompletion {
    interest_id: u16,
    remaining: HashSet<DoId>,
}

struct ClientSession {
    own_channel: Channel,
    phase: Phase,
    account_id: Option<DoId>,
    avatar_id: Option<DoId>,
    interests: InterestManager,
    pending_interest_completions: HashMap<Context, PendingInterestCompletion>,
    md_tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// No district-visibility service is wired up yet; every branch is
/// visible only to itself until a real DNA-derived directory replaces
/// this.
struct NoVisibility;
impl VisibilityDirectory for NoVisibility {
    fn visible_zones(&self, _branch: Zone) -> Vec<Zone> {
        Vec::new()
    }
}

struct NoNameDictionary;
impl NameDictionary for NoNameDictionary {
    fn resolve(&self, _index: u16) -> String {
        String::new()
    }
}

pub struct ClientAgent {
    config: ClientAgentConfig,
    db_channel: Channel,
    db: Arc<DatabaseInterface>,
    allocator: Mutex<ChannelAllocator>,
    token_store: TokenStore,
    operations: OperationManager,
    to_md: mpsc::UnboundedSender<Vec<u8>>,
    routes: Mutex<HashMap<Channel, mpsc::UnboundedSender<Vec<u8>>>>,
    online_avatars: Mutex<HashSet<DoId>>,
}

impl ClientAgent {
    pub fn new(
        config: ClientAgentConfig,
        db_channel: Channel,
        db_timeout: Duration,
        token_store: TokenStore,
        to_md: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Arc<Self> {
        let allocator = Mutex::new(ChannelAllocator::new(config.min_channels, config.max_channels));
        let db = DatabaseInterface::new(
            crate::globals::CLIENT_AGENT_CHANNEL,
            db_channel,
            db_timeout,
            to_md.clone(),
        );
        Arc::new(ClientAgent {
            config,
            db_channel,
            db,
            allocator,
            token_store,
            operations: OperationManager::new(),
            to_md,
            routes: Mutex::new(HashMap::new()),
            online_avatars: Mutex::new(HashSet::new()),
        })
    }

    /// Demultiplexes a frame read off the Message Director connection to
    /// whichever client session registered the addressed channel. Unlike
    /// the client wire format, the relayed frame keeps the sender
    /// channel in front of `(msg_type, payload)`: the owning session's
    /// task needs it to interpret State Server traffic (object enter/
    /// delete, zone subscriptions) before anything reaches the socket.
    pub async fn dispatch_md_frame(&self, frame: Vec<u8>) {
        let mut dgi = DatagramIterator::new(Datagram::from(frame));
        let Ok(count) = dgi.read_u8() else { return };
        let mut recipients = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let Ok(c) = dgi.read_channel() else { return };
            recipients.push(c);
        }
        let Ok(sender) = dgi.read_channel() else { return };
        let Ok(msg_type) = dgi.read_u16() else { return };
        let payload = dgi.read_remainder();

        let mut out = Datagram::new();
        out.add_channel(sender).ok();
        out.add_u16(msg_type).ok();
        out.add_data(payload).ok();
        let relay_frame = out.into_bytes();

        let routes = self.routes.lock().await;
        for channel in recipients {
            if let Some(inbox) = routes.get(&channel) {
                let _ = inbox.send(relay_frame.clone());
            } else {
                debug!("client agent: no local session for channel {}.", channel);
            }
        }
    }

    async fn register_route(&self, channel: Channel, inbox: mpsc::UnboundedSender<Vec<u8>>) {
        self.routes.lock().await.insert(channel, inbox);
        let mut dg = Datagram::new();
        dg.add_control_header(control::SET_CHANNEL).ok();
        dg.add_channel(channel).ok();
        let _ = self.to_md.send(dg.into_bytes());
    }

    async fn unregister_route(&self, channel: Channel) {
        self.routes.lock().await.remove(&channel);
        let mut dg = Datagram::new();
        dg.add_control_header(control::REMOVE_CHANNEL).ok();
        dg.add_channel(channel).ok();
        let _ = self.to_md.send(dg.into_bytes());
    }

    /// Queues a datagram with the Message Director to be routed,
    /// verbatim, the moment this session's channel disconnects.
    async fn queue_post_remove(&self, inner: Datagram) {
        let mut dg = Datagram::new();
        dg.add_control_header(control::ADD_POST_REMOVE).ok();
        dg.add_datagram(inner).ok();
        let _ = self.to_md.send(dg.into_bytes());
    }

    /// Accepts game-client connections for the lifetime of the daemon.
    /// The link to the Message Director itself is set up by the caller
    /// (see `main.rs`), which feeds inbound frames to
    /// [`ClientAgent::dispatch_md_frame`] and hands this agent the
    /// sender half used as `to_md`.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let listener = crate::network::bind(&self.config.bind).await?;
        loop {
            let (stream, addr) = listener.accept().await?;
            debug!("client agent: accepted client connection from {}.", addr);
            let agent = Arc::clone(&self);
            tokio::spawn(async move {
                agent.service_client(stream).await;
            });
        }
    }

    pub async fn service_client(self: Arc<Self>, stream: TcpStream) {
        let own_channel = match self.allocator.lock().await.allocate() {
            Ok(c) => c,
            Err(e) => {
                warn!("client agent: {}", e);
                return;
            }
        };

        let (mut read_half, mut write_half) = stream.into_split();
        let (client_tx, mut client_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (md_tx, mut md_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = client_rx.recv().await {
                if crate::network::write_frame(&mut write_half, &frame).await.is_err() {
                    break;
                }
            }
        });

        self.register_route(own_channel, md_tx.clone()).await;

        let mut session = ClientSession {
            own_channel,
            phase: Phase::PreAuth,
            account_id: None,
            avatar_id: None,
            interests: InterestManager::new(),
            pending_interest_completions: HashMap::new(),
            md_tx,
        };

        let heartbeat = Duration::from_secs(self.config.heartbeat_interval);
        loop {
            tokio::select! {
                frame = tokio::time::timeout(heartbeat, crate::network::read_frame(&mut read_half)) => {
                    match frame {
                        Ok(Ok(Some(f))) => {
                            if !self.handle_client_frame(&mut session, &client_tx, f).await {
                                break;
                            }
                        }
                        Ok(Ok(None)) => break,
                        Ok(Err(e)) => {
                            warn!("client agent: read error on channel {}: {}", own_channel, e);
                            break;
                        }
                        Err(_) => {
                            self.send_disconnect(&client_tx, client::disconnect::NO_HEARTBEAT, "No heartbeat.");
                            break;
                        }
                    }
                }
                Some(md_frame) = md_rx.recv() => {
                    self.handle_md_frame(&mut session, &client_tx, md_frame).await;
                }
            }
        }

        self.teardown_session(&session).await;
        drop(client_tx);
        let _ = writer.await;
    }

    async fn teardown_session(&self, session: &ClientSession) {
        self.unregister_route(session.own_channel).await;
        if let Some(account_id) = session.account_id {
            self.unregister_route(account_channel(account_id)).await;
        }
        if let Some(avatar_id) = session.avatar_id {
            self.unregister_route(avatar_channel(session.account_id.unwrap_or(0), avatar_id))
                .await;
            self.unregister_route(puppet_channel(avatar_id)).await;
            self.online_avatars.lock().await.remove(&avatar_id);
        }
        self.allocator.lock().await.free(session.own_channel);
        info!("client agent: session on channel {} torn down.", session.own_channel);
    }

    fn send_disconnect(&self, client_tx: &mpsc::UnboundedSender<Vec<u8>>, reason: u16, message: &str) {
        let mut dg = Datagram::new();
        dg.add_u16(client::GO_GET_LOST).ok();
        dg.add_u16(reason).ok();
        dg.add_string(message).ok();
        let _ = client_tx.send(dg.into_bytes());
    }

    /// Dispatches a frame relayed from the Message Director (still
    /// carrying its sender channel up front, per `dispatch_md_frame`),
    /// applying the interest manager's object-enter/delete semantics
    /// before anything reaches the client socket.
    async fn handle_md_frame(&self, session: &mut ClientSession, client_tx: &mpsc::UnboundedSender<Vec<u8>>, frame: Vec<u8>) {
        let mut dgi = DatagramIterator::new(Datagram::from(frame));
        let Ok(_sender) = dgi.read_channel() else { return };
        let Ok(msg_type) = dgi.read_u16() else { return };

        match msg_type {
            stateserver::OBJECT_ENTER_LOCATION_WITH_REQUIRED => {
                self.handle_object_enter(session, client_tx, &mut dgi, false);
            }
            stateserver::OBJECT_ENTER_LOCATION_WITH_REQUIRED_OTHER => {
                self.handle_object_enter(session, client_tx, &mut dgi, true);
            }
            stateserver::OBJECT_DELETE_RAM => {
                self.handle_object_delete(session, client_tx, &mut dgi);
            }
            stateserver::OBJECT_GET_ZONES_OBJECTS_2_RESP => {
                self.handle_zones_objects_resp(session, client_tx, &mut dgi);
            }
            stateserver::OBJECT_UPDATE_FIELD => {
                self.relay_object_update_field(session, client_tx, &mut dgi);
            }
            other => {
                // Anything else addressed directly to a client channel
                // (e.g. a direct reply not covered by the object
                // protocol above) is relayed as-is.
                let payload = dgi.read_remainder();
                let mut dg = Datagram::new();
                dg.add_u16(other).ok();
                dg.add_data(payload).ok();
                let _ = client_tx.send(dg.into_bytes());
            }
        }
    }

    /// `ENTER_LOCATION_WITH_REQUIRED[_OTHER]`: ownership and
    /// previously-seen duplicates are dropped, zone coverage gates
    /// whether a `CREATE_OBJECT_REQUIRED[_OTHER]` is generated to the
    /// client, and arrival against `pending_objects` can complete an
    /// outstanding interest.
    fn handle_object_enter(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
        other: bool,
    ) {
        let (Ok(doid), Ok(parent), Ok(zone), Ok(dclass)) =
            (dgi.read_doid(), dgi.read_doid(), dgi.read_zone(), dgi.read_u16())
        else {
            return;
        };
        let remainder = dgi.read_remainder();

        if session.interests.owned_objects.contains(&doid) {
            return;
        }
        if session.interests.seen_objects.get(&zone).is_some_and(|s| s.contains(&doid)) {
            return;
        }

        if session.interests.is_zone_open(zone) {
            session.interests.seen_objects.entry(zone).or_default().insert(doid);

            let mut dg = Datagram::new();
            dg.add_u16(if other {
                client::CREATE_OBJECT_REQUIRED_OTHER
            } else {
                client::CREATE_OBJECT_REQUIRED
            })
            .ok();
            dg.add_doid(doid).ok();
            dg.add_location(parent, zone).ok();
            dg.add_u16(dclass).ok();
            dg.add_data(remainder).ok();
            let _ = client_tx.send(dg.into_bytes());
        }

        self.note_object_arrived(session, client_tx, doid);
    }

    /// `DELETE_RAM`: tells the client only if it had actually been
    /// generated to it, then drops the bookkeeping everywhere.
    fn handle_object_delete(&self, session: &mut ClientSession, client_tx: &mpsc::UnboundedSender<Vec<u8>>, dgi: &mut DatagramIterator) {
        let Ok(doid) = dgi.read_doid() else { return };
        let mut was_seen = false;
        for set in session.interests.seen_objects.values_mut() {
            if set.remove(&doid) {
                was_seen = true;
            }
        }
        if !was_seen {
            return;
        }
        let mut dg = Datagram::new();
        dg.add_u16(client::OBJECT_DELETE_RESP).ok();
        dg.add_doid(doid).ok();
        let _ = client_tx.send(dg.into_bytes());
    }

    /// `GET_ZONES_OBJECTS_2_RESP`: names the objects the State Server is
    /// about to generate for a subscription this session is waiting on.
    /// An empty reply completes the interest immediately.
    fn handle_zones_objects_resp(&self, session: &mut ClientSession, client_tx: &mpsc::UnboundedSender<Vec<u8>>, dgi: &mut DatagramIterator) {
        let (Ok(context), Ok(count)) = (dgi.read_u32(), dgi.read_u16()) else {
            return;
        };
        let mut objects = HashSet::with_capacity(count as usize);
        for _ in 0..count {
            let Ok(doid) = dgi.read_doid() else { return };
            objects.insert(doid);
        }

        let Some(completion) = session.pending_interest_completions.get_mut(&context) else {
            return;
        };

        if objects.is_empty() {
            let interest_id = completion.interest_id;
            session.pending_interest_completions.remove(&context);
            self.send_done_interest_resp(client_tx, interest_id, context);
            return;
        }

        completion.remaining = objects.clone();
        session.interests.pending_objects.extend(objects);
    }

    /// Forwarded only to clients that currently have the object (seen,
    /// pending, or owned), per the per-client handler's field-update
    /// visibility rule.
    fn relay_object_update_field(&self, session: &ClientSession, client_tx: &mpsc::UnboundedSender<Vec<u8>>, dgi: &mut DatagramIterator) {
        let Ok(doid) = dgi.read_doid() else { return };
        let visible = session.interests.owned_objects.contains(&doid)
            || session.interests.pending_objects.contains(&doid)
            || session.interests.seen_objects.values().any(|s| s.contains(&doid));
        if !visible {
            return;
        }
        let remainder = dgi.read_remainder();
        let mut dg = Datagram::new();
        dg.add_u16(client::OBJECT_UPDATE_FIELD).ok();
        dg.add_doid(doid).ok();
        dg.add_data(remainder).ok();
        let _ = client_tx.send(dg.into_bytes());
    }

    /// Removes `doid` from `pending_objects` (if it was on it) and
    /// fires `DONE_INTEREST_RESP` for any interest whose pending set has
    /// now fully arrived.
    fn note_object_arrived(&self, session: &mut ClientSession, client_tx: &mpsc::UnboundedSender<Vec<u8>>, doid: DoId) {
        if !session.interests.pending_objects.remove(&doid) {
            return;
        }
        let mut completed = Vec::new();
        for (&context, completion) in session.pending_interest_completions.iter_mut() {
            completion.remaining.remove(&doid);
            if completion.remaining.is_empty() {
                completed.push((context, completion.interest_id));
            }
        }
        for (context, interest_id) in completed {
            session.pending_interest_completions.remove(&context);
            self.send_done_interest_resp(client_tx, interest_id, context);
        }
    }

    fn send_done_interest_resp(&self, client_tx: &mpsc::UnboundedSender<Vec<u8>>, interest_id: u16, context: Context) {
        let mut dg = Datagram::new();
        dg.add_u16(client::DONE_INTEREST_RESP).ok();
        dg.add_u16(interest_id).ok();
        dg.add_u32(context).ok();
        let _ = client_tx.send(dg.into_bytes());
    }

    fn send_clear_watch(&self, session: &ClientSession, parent: DoId, zone: Zone) {
        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], session.own_channel, stateserver::OBJECT_CLEAR_WATCH)
            .ok();
        dg.add_location(parent, zone).ok();
        let _ = self.to_md.send(dg.into_bytes());
    }

    fn send_get_zones_objects(&self, session: &ClientSession, parent: DoId, context: Context, zones: &[Zone]) {
        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], session.own_channel, stateserver::OBJECT_GET_ZONES_OBJECTS_2)
            .ok();
        dg.add_u32(context).ok();
        dg.add_doid(parent).ok();
        dg.add_u16(zones.len() as u16).ok();
        for zone in zones {
            dg.add_zone(*zone).ok();
        }
        let _ = self.to_md.send(dg.into_bytes());
    }

    /// Emits `OBJECT_DELETE_RESP` to the client for every previously-
    /// seen, non-owned object in `zone`, then drops the zone's
    /// seen-objects bookkeeping.
    fn delete_previously_seen_objects_in_zone(&self, session: &mut ClientSession, client_tx: &mpsc::UnboundedSender<Vec<u8>>, zone: Zone) {
        let Some(doids) = session.interests.seen_objects.remove(&zone) else {
            return;
        };
        for doid in doids {
            if session.interests.owned_objects.contains(&doid) {
                continue;
            }
            let mut dg = Datagram::new();
            dg.add_u16(client::OBJECT_DELETE_RESP).ok();
            dg.add_doid(doid).ok();
            let _ = client_tx.send(dg.into_bytes());
        }
    }

    /// Returns `false` when the session should be torn down.
    async fn handle_client_frame(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        frame: Vec<u8>,
    ) -> bool {
        let mut dgi = DatagramIterator::new(Datagram::from(frame));
        let Ok(msg_type) = dgi.read_u16() else {
            self.send_disconnect(
                client_tx,
                client::disconnect::TRUNCATED_DATAGRAM,
                "Datagram truncated before message type.",
            );
            return false;
        };

        match msg_type {
            client::HEARTBEAT => true,
            client::DISCONNECT => false,
            client::LOGIN_2 if session.phase == Phase::PreAuth => {
                self.handle_login(session, client_tx, &mut dgi).await
            }
            client::LOGIN_TOONTOWN if session.phase == Phase::PreAuth => {
                self.handle_login_toontown(session, client_tx, &mut dgi).await
            }
            client::GET_AVATARS if session.phase != Phase::PreAuth => {
                self.handle_get_avatars(session, client_tx).await
            }
            client::CREATE_AVATAR if session.phase != Phase::PreAuth => {
                self.handle_create_avatar(session, client_tx, &mut dgi).await
            }
            client::SET_AVATAR if session.phase == Phase::AuthenticatedNoAvatar => {
                self.handle_set_avatar(session, client_tx, &mut dgi).await
            }
            client::GET_SHARD_LIST if session.phase != Phase::PreAuth => {
                self.handle_get_shard_list(client_tx).await
            }
            client::OBJECT_UPDATE_FIELD if session.phase == Phase::Playing => {
                self.handle_client_object_update_field(session, &mut dgi).await
            }
            client::ADD_INTEREST if session.phase == Phase::Playing => {
                self.handle_add_interest(session, client_tx, &mut dgi).await
            }
            client::REMOVE_INTEREST if session.phase == Phase::Playing => {
                self.handle_remove_interest(session, client_tx, &mut dgi).await
            }
            client::OBJECT_LOCATION if session.phase == Phase::Playing => {
                self.handle_object_location(session, &mut dgi).await
            }
            client::GET_FRIEND_LIST if session.phase == Phase::Playing => {
                self.handle_get_friend_list(session, client_tx).await
            }
            client::SET_WISHNAME if session.phase != Phase::PreAuth => {
                self.handle_set_wishname(session, client_tx, &mut dgi).await
            }
            client::SET_NAME_PATTERN if session.phase != Phase::PreAuth => {
                self.handle_set_name_pattern(session, client_tx, &mut dgi).await
            }
            client::GET_AVATAR_DETAILS if session.phase != Phase::PreAuth => {
                self.handle_get_avatar_details(session, client_tx, &mut dgi).await
            }
            client::DELETE_AVATAR if session.phase != Phase::PreAuth => {
                self.handle_delete_avatar(session, client_tx, &mut dgi).await
            }
            client::SET_SHARD | client::SET_ZONE => {
                // Shard switching and the legacy zone-set handshake are
                // documented no-ops: acknowledged, never mutating
                // session state.
                true
            }
            other => {
                warn!(
                    "client agent: unexpected message type {} in phase {:?} on channel {}.",
                    other, session.phase, session.own_channel
                );
                let reason = if session.phase == Phase::PreAuth {
                    client::disconnect::ANONYMOUS_VIOLATION
                } else {
                    client::disconnect::INVALID_MSGTYPE
                };
                self.send_disconnect(client_tx, reason, "Unexpected message type for current phase.");
                false
            }
        }
    }

    async fn handle_login(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let (Ok(play_token), Ok(server_version), Ok(hash_val), Ok(_token_type)) = (
            dgi.read_string(),
            dgi.read_string(),
            dgi.read_u32(),
            dgi.read_u8(),
        ) else {
            self.send_disconnect(client_tx, client::disconnect::TRUNCATED_DATAGRAM, "Malformed login.");
            return false;
        };

        if server_version != self.config.version {
            self.send_disconnect(client_tx, client::disconnect::BAD_VERSION, "Bad client version.");
            return false;
        }
        if self.config.enforce_hash && hash_val != self.config.hash_val {
            self.send_disconnect(client_tx, client::disconnect::BAD_DCHASH, "Bad DC hash.");
            return false;
        }

        let existing_account_id = self.token_store.lookup(&play_token).unwrap_or(None);
        let Some(result) = operations::load_account(
            &self.db,
            &self.operations,
            session.own_channel,
            existing_account_id,
            &play_token,
        )
        .await
        else {
            self.send_disconnect(client_tx, client::disconnect::ALREADY_LOGGED_IN, "Login already in progress.");
            return false;
        };

        if result.created {
            let _ = self.token_store.store(&play_token, result.account_id);
        }

        session.account_id = Some(result.account_id);
        session.phase = Phase::AuthenticatedNoAvatar;
        self.register_route(account_channel(result.account_id), session.md_tx.clone()).await;

        let (epoch, usec) = current_epoch_and_usec();
        let mut dg = Datagram::new();
        dg.add_u16(client::LOGIN_2_RESP).ok();
        dg.add_u8(0).ok();
        dg.add_string("All Ok").ok();
        dg.add_string(&play_token).ok();
        dg.add_u8(1).ok();
        dg.add_u32(epoch).ok();
        dg.add_u32(usec).ok();
        dg.add_u8(1).ok();
        dg.add_i32(0).ok();
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    /// `LOGIN_TOONTOWN`: the same auth gate as `LOGIN_2`, answered with
    /// the richer `LOGIN_TOONTOWN_RESP` payload.
    async fn handle_login_toontown(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let (Ok(play_token), Ok(server_version), Ok(hash_val), Ok(_token_type)) = (
            dgi.read_string(),
            dgi.read_string(),
            dgi.read_u32(),
            dgi.read_u8(),
        ) else {
            self.send_disconnect(client_tx, client::disconnect::TRUNCATED_DATAGRAM, "Malformed login.");
            return false;
        };

        if server_version != self.config.version {
            self.send_disconnect(client_tx, client::disconnect::BAD_VERSION, "Bad client version.");
            return false;
        }
        if self.config.enforce_hash && hash_val != self.config.hash_val {
            self.send_disconnect(client_tx, client::disconnect::BAD_DCHASH, "Bad DC hash.");
            return false;
        }

        let existing_account_id = self.token_store.lookup(&play_token).unwrap_or(None);
        let Some(result) = operations::load_account(
            &self.db,
            &self.operations,
            session.own_channel,
            existing_account_id,
            &play_token,
        )
        .await
        else {
            self.send_disconnect(client_tx, client::disconnect::ALREADY_LOGGED_IN, "Login already in progress.");
            return false;
        };

        if result.created {
            let _ = self.token_store.store(&play_token, result.account_id);
        }

        session.account_id = Some(result.account_id);
        session.phase = Phase::AuthenticatedNoAvatar;
        self.register_route(account_channel(result.account_id), session.md_tx.clone()).await;

        let (epoch, usec) = current_epoch_and_usec();
        let mut dg = Datagram::new();
        dg.add_u16(client::LOGIN_TOONTOWN_RESP).ok();
        dg.add_u8(0).ok();
        dg.add_u32(result.account_id).ok();
        dg.add_string(&play_token).ok();
        dg.add_u8(1).ok(); // account_name_approved
        dg.add_u8(1).ok(); // open_chat
        dg.add_u8(1).ok(); // create_friends_with_chat
        dg.add_u32(epoch).ok();
        dg.add_u32(usec).ok();
        dg.add_u8(0).ok(); // access level
        dg.add_u8(0).ok(); // whitelist
        dg.add_string("").ok(); // last logged in
        dg.add_i32(0).ok(); // account days
        dg.add_u8(0).ok(); // WITH_PARENT_ACCOUNT marker
        dg.add_string(&play_token).ok(); // username
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_get_shard_list(&self, client_tx: &mpsc::UnboundedSender<Vec<u8>>) -> bool {
        // No State Server shard registry is modeled; an empty list keeps
        // the wire contract complete without fabricating shards.
        let mut dg = Datagram::new();
        dg.add_u16(client::GET_SHARD_LIST_RESP).ok();
        dg.add_u16(0).ok();
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_get_avatars(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
    ) -> bool {
        let Some(account_id) = session.account_id else { return true };
        let avatars = operations::retrieve_avatars(
            &self.db,
            &self.operations,
            account_channel(account_id),
            account_id,
        )
        .await
        .unwrap_or_default();

        let mut dg = Datagram::new();
        dg.add_u16(client::GET_AVATARS_RESP).ok();
        dg.add_u8(0).ok();
        dg.add_u16(avatars.len() as u16).ok();
        for (avatar_id, name) in avatars {
            dg.add_doid(avatar_id).ok();
            dg.add_string(&name).ok();
        }
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_create_avatar(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let Some(account_id) = session.account_id else { return true };
        let Ok(dna_string) = dgi.read_blob() else { return true };

        let avatar_id = operations::create_avatar(
            &self.db,
            &self.operations,
            account_channel(account_id),
            account_id,
            dna_string,
        )
        .await;

        let mut dg = Datagram::new();
        dg.add_u16(client::CREATE_AVATAR_RESP).ok();
        dg.add_u8(if avatar_id.is_some() { 0 } else { 1 }).ok();
        dg.add_doid(avatar_id.unwrap_or(0)).ok();
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_set_avatar(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let Ok(avatar_id) = dgi.read_doid() else { return true };
        let Some(account_id) = session.account_id else { return true };

        let Some(fields) = operations::load_avatar(
            &self.db,
            &self.operations,
            avatar_channel(account_id, avatar_id),
            avatar_id,
        )
        .await
        else {
            return true;
        };

        session.avatar_id = Some(avatar_id);
        session.phase = Phase::Playing;
        self.register_route(avatar_channel(account_id, avatar_id), session.md_tx.clone()).await;
        self.register_route(puppet_channel(avatar_id), session.md_tx.clone()).await;
        self.online_avatars.lock().await.insert(avatar_id);
        session.interests.owned_objects.insert(avatar_id);

        self.send_generate_with_required_other(session, avatar_id, account_id, 0, &fields);
        self.send_set_owner(session, avatar_id);

        let mut delete_on_disconnect = Datagram::new();
        delete_on_disconnect
            .add_server_header(&[self.db_channel], avatar_channel(account_id, avatar_id), stateserver::OBJECT_DELETE_RAM)
            .ok();
        delete_on_disconnect.add_doid(avatar_id).ok();
        self.queue_post_remove(delete_on_disconnect).await;

        let mut dg = Datagram::new();
        dg.add_u16(client::DONE_SET_ZONE_RESP).ok();
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    /// `OBJECT_GENERATE_WITH_REQUIRED_OTHER`: fields sorted by index in
    /// the required block; the "other" block (none modeled by this
    /// schema) is still present as a zero count, per the wire contract.
    fn send_generate_with_required_other(
        &self,
        session: &ClientSession,
        avatar_id: DoId,
        parent: DoId,
        zone: Zone,
        fields: &[(u16, Vec<u8>)],
    ) {
        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], session.own_channel, stateserver::OBJECT_GENERATE_WITH_REQUIRED_OTHER)
            .ok();
        dg.add_doid(avatar_id).ok();
        dg.add_location(parent, zone).ok();
        dg.add_u16(dc_schema::DISTRIBUTED_TOON_DCLASS).ok();
        dg.add_u16(fields.len() as u16).ok();
        for (field_id, value) in fields {
            dg.add_u16(*field_id).ok();
            dg.add_blob(value.clone()).ok();
        }
        dg.add_u16(0).ok();
        let _ = self.to_md.send(dg.into_bytes());
    }

    fn send_set_owner(&self, session: &ClientSession, avatar_id: DoId) {
        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], session.own_channel, stateserver::OBJECT_SET_OWNER)
            .ok();
        dg.add_doid(avatar_id).ok();
        dg.add_channel(session.own_channel).ok();
        let _ = self.to_md.send(dg.into_bytes());
    }

    async fn handle_get_friend_list(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
    ) -> bool {
        let (Some(account_id), Some(avatar_id)) = (session.account_id, session.avatar_id) else {
            return true;
        };
        let online = self.online_avatars.lock().await.clone();

        let friends = operations::load_friends_list(
            &self.db,
            &self.operations,
            avatar_channel(account_id, avatar_id),
            avatar_id,
            move |id| online.contains(&id),
        )
        .await
        .unwrap_or_default();

        for (friend_id, _is_online) in &friends {
            let mut offline = Datagram::new();
            offline
                .add_server_header(&[puppet_channel(*friend_id)], avatar_channel(account_id, avatar_id), ca_internal::FRIEND_OFFLINE)
                .ok();
            offline.add_doid(avatar_id).ok();
            self.queue_post_remove(offline).await;
        }

        let mut dg = Datagram::new();
        dg.add_u16(client::GET_FRIEND_LIST_RESP).ok();
        dg.add_u8(0).ok();
        dg.add_u16(friends.len() as u16).ok();
        for (friend_id, is_online) in friends {
            dg.add_doid(friend_id).ok();
            dg.add_bool(is_online).ok();
        }
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_set_wishname(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let (Some(account_id), Ok(avatar_id), Ok(name)) =
            (session.account_id, dgi.read_doid(), dgi.read_string())
        else {
            return true;
        };

        let approved = operations::set_wishname(
            &self.db,
            &self.operations,
            avatar_channel(account_id, avatar_id),
            avatar_id,
            name.clone(),
        )
        .await
        .unwrap_or(false);

        let mut dg = Datagram::new();
        dg.add_u16(client::SET_WISHNAME_RESP).ok();
        dg.add_u8(if approved { 0 } else { 1 }).ok();
        dg.add_string(&name).ok();
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_set_name_pattern(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let (Some(account_id), Ok(avatar_id)) = (session.account_id, dgi.read_doid()) else {
            return true;
        };
        let mut pattern = [(0u16, false); 4];
        for slot in &mut pattern {
            let (Ok(index), Ok(flag)) = (dgi.read_u16(), dgi.read_bool()) else {
                return true;
            };
            *slot = (index, flag);
        }

        let name = operations::set_name_pattern(
            &self.db,
            &self.operations,
            avatar_channel(account_id, avatar_id),
            avatar_id,
            pattern,
            &NoNameDictionary,
        )
        .await
        .unwrap_or_default();

        let mut dg = Datagram::new();
        dg.add_u16(client::SET_NAME_PATTERN_ANSWER).ok();
        dg.add_u8(if name.is_empty() { 1 } else { 0 }).ok();
        dg.add_string(&name).ok();
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_get_avatar_details(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let Ok(avatar_id) = dgi.read_doid() else { return true };
        let fields: FieldSet = operations::get_avatar_details(
            &self.db,
            &self.operations,
            session.own_channel,
            avatar_id,
        )
        .await
        .unwrap_or_default();

        let mut dg = Datagram::new();
        dg.add_u16(client::GET_AVATAR_DETAILS_RESP).ok();
        dg.add_u8(if fields.is_empty() { 1 } else { 0 }).ok();
        dg.add_doid(avatar_id).ok();
        dg.add_u16(fields.len() as u16).ok();
        for (field_id, value) in dc_schema_sorted(fields) {
            dg.add_u16(field_id).ok();
            dg.add_blob(value).ok();
        }
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_delete_avatar(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let (Some(account_id), Ok(avatar_id)) = (session.account_id, dgi.read_doid()) else {
            return true;
        };

        let deleted = operations::delete_avatar(
            &self.db,
            &self.operations,
            account_channel(account_id),
            account_id,
            avatar_id,
        )
        .await
        .unwrap_or(false);

        let avatars = operations::retrieve_avatars(
            &self.db,
            &self.operations,
            account_channel(account_id),
            account_id,
        )
        .await
        .unwrap_or_default();

        let mut dg = Datagram::new();
        dg.add_u16(client::DELETE_AVATAR_RESP).ok();
        dg.add_u8(if deleted { 0 } else { 1 }).ok();
        dg.add_u16(avatars.len() as u16).ok();
        for (avatar_id, name) in avatars {
            dg.add_doid(avatar_id).ok();
            dg.add_string(&name).ok();
        }
        let _ = client_tx.send(dg.into_bytes());
        true
    }

    async fn handle_add_interest(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let (Ok(interest_id), Ok(context), Ok(parent), Ok(zone_count)) =
            (dgi.read_u16(), dgi.read_u32(), dgi.read_doid(), dgi.read_u16())
        else {
            return true;
        };
        let mut zones = Vec::with_capacity(zone_count as usize);
        for _ in 0..zone_count {
            let Ok(zone) = dgi.read_zone() else { return true };
            zones.push(zone);
        }

        // A single-zone re-add already covered by this interest is a
        // short-circuit: answering immediately preserves the broader
        // prior coverage instead of narrowing it.
        if zones.len() == 1
            && session
                .interests
                .lookup(interest_id)
                .is_some_and(|existing| existing.requested_zones.contains(&zones[0]))
        {
            self.send_done_interest_resp(client_tx, interest_id, context);
            return true;
        }

        let delta = session.interests.add_interest(interest_id, parent, zones, &NoVisibility);
        debug!(
            "client agent: channel {} interest {} entering {} zone(s), killing {} zone(s).",
            session.own_channel,
            interest_id,
            delta.added_zones.len(),
            delta.removed_zones.len()
        );

        for zone in &delta.removed_zones {
            self.send_clear_watch(session, parent, *zone);
            self.delete_previously_seen_objects_in_zone(session, client_tx, *zone);
        }

        let final_zones = session.interests.effective_zones(interest_id);
        if final_zones.is_empty() {
            self.send_done_interest_resp(client_tx, interest_id, context);
            return true;
        }

        self.send_get_zones_objects(session, parent, context, &final_zones);
        session.pending_interest_completions.insert(
            context,
            PendingInterestCompletion {
                interest_id,
                remaining: HashSet::new(),
            },
        );
        true
    }

    async fn handle_remove_interest(
        &self,
        session: &mut ClientSession,
        client_tx: &mpsc::UnboundedSender<Vec<u8>>,
        dgi: &mut DatagramIterator,
    ) -> bool {
        let (Ok(interest_id), Ok(context)) = (dgi.read_u16(), dgi.read_u32()) else {
            return true;
        };
        let parent = session.interests.lookup(interest_id).map(|i| i.parent).unwrap_or(0);
        let killed = session.interests.remove_interest(interest_id);
        debug!(
            "client agent: channel {} interest {} removed, killing {} zone(s).",
            session.own_channel,
            interest_id,
            killed.len()
        );

        for zone in &killed {
            self.send_clear_watch(session, parent, *zone);
            self.delete_previously_seen_objects_in_zone(session, client_tx, *zone);
        }
        self.send_done_interest_resp(client_tx, interest_id, context);
        true
    }

    /// `OBJECT_LOCATION`: a preserved wire quirk subtracts one from the
    /// client-supplied parent before forwarding to the State Server.
    async fn handle_object_location(&self, session: &mut ClientSession, dgi: &mut DatagramIterator) -> bool {
        let (Ok(doid), Ok(parent), Ok(zone)) = (dgi.read_doid(), dgi.read_doid(), dgi.read_zone()) else {
            return true;
        };

        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], session.own_channel, stateserver::OBJECT_SET_AI).ok();
        dg.add_doid(doid).ok();
        dg.add_location(parent.wrapping_sub(1), zone).ok();
        let _ = self.to_md.send(dg.into_bytes());
        true
    }

    /// `OBJECT_UPDATE_FIELD` (client->CA): forwarded to the addressed
    /// object's channel on the State Server; the reply path is handled
    /// by [`Self::relay_object_update_field`].
    async fn handle_client_object_update_field(&self, session: &ClientSession, dgi: &mut DatagramIterator) -> bool {
        let (Ok(doid), Ok(field_id), Ok(value)) = (dgi.read_doid(), dgi.read_u16(), dgi.read_blob()) else {
            return true;
        };
        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], session.own_channel, stateserver::OBJECT_UPDATE_FIELD)
            .ok();
        dg.add_doid(doid).ok();
        dg.add_u16(field_id).ok();
        dg.add_blob(value).ok();
        let _ = self.to_md.send(dg.into_bytes());
        true
    }
}

fn current_epoch_and_usec() -> (u32, u32) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now.as_secs() as u32, now.subsec_micros())
}

fn dc_schema_sorted(fields: FieldSet) -> Vec<(u16, Vec<u8>)> {
    crate::dc_schema::sort_by_field_id(fields.into_iter().collect())
}

#[allow(dead_code)]
fn unused_friend_online_marker() -> u16 {
    ca_internal::FRIEND_ONLINE
}
