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

//! The Message Director: a single-process,
//! channel-addressed datagram router. Every internal participant
//! (Client Agent, State Server, Database Server) connects here and
//! subscribes to the channels it owns; routed datagrams are delivered
//! verbatim to the owner of each addressed channel.

use crate::channel_map::ChannelRegistry;
use crate::datagram::{Datagram, DatagramIterator};
use crate::globals::{Channel, CONTROL_CHANNEL};
use crate::message_types::control;
use crate::network;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

struct Participant {
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    /// Raw frames (already containing their own server header) to be
    /// routed, in order, the moment this participant disconnects.
    post_removes: Vec<Vec<u8>>,
}

struct MdState {
    participants: HashMap<u64, Participant>,
    registry: ChannelRegistry,
}

pub struct MessageDirector {
    bind_uri: String,
    state: Mutex<MdState>,
    next_participant_id: AtomicU64,
}

impl MessageDirector {
    pub fn new(bind_uri: &str) -> Self {
        MessageDirector {
            bind_uri: bind_uri.to_string(),
            state: Mutex::new(MdState {
                participants: HashMap::new(),
                registry: ChannelRegistry::new(),
            }),
            next_participant_id: AtomicU64::new(1),
        }
    }

    /// Binds the listening socket and services connections until the
    /// process is torn down. Runs forever; spawn this on its own task.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let listener = network::bind(&self.bind_uri).await?;
        loop {
            let (stream, addr) = listener.accept().await?;
            debug!("MD: accepted internal connection from {}.", addr);
            let md = Arc::clone(&self);
            tokio::spawn(async move {
                md.service_participant(stream).await;
            });
        }
    }

    async fn service_participant(self: Arc<Self>, mut stream: TcpStream) {
        let id = self.next_participant_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        {
            let mut state = self.state.lock().await;
            state.participants.insert(
                id,
                Participant {
                    outbox: tx,
                    post_removes: Vec::new(),
                },
            );
        }

        let (mut read_half, mut write_half) = stream.split();
        let writer = async {
            while let Some(frame) = rx.recv().await {
                if network::write_frame(&mut write_half, &frame).await.is_err() {
                    break;
                }
            }
        };

        let reader = async {
            loop {
                match network::read_frame(&mut read_half).await {
                    Ok(Some(frame)) => self.handle_frame(id, frame).await,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("MD: read error from participant {}: {}", id, e);
                        break;
                    }
                }
            }
        };

        tokio::select! {
            _ = reader => {},
            _ = writer => {},
        }

        self.teardown_participant(id).await;
    }

    async fn handle_frame(&self, participant: u64, frame: Vec<u8>) {
        let mut dgi = DatagramIterator::new(Datagram::from(frame.clone()));
        let recipient_count = match dgi.read_u8() {
            Ok(v) => v,
            Err(_) => {
                warn!("MD: participant {} sent a truncated header.", participant);
                return;
            }
        };
        let mut recipients = Vec::with_capacity(recipient_count as usize);
        for _ in 0..recipient_count {
            match dgi.read_channel() {
                Ok(c) => recipients.push(c),
                Err(_) => {
                    warn!("MD: participant {} sent a truncated header.", participant);
                    return;
                }
            }
        }
        let sender = match dgi.read_channel() {
            Ok(c) => c,
            Err(_) => return,
        };
        let msg_type = match dgi.read_u16() {
            Ok(v) => v,
            Err(_) => return,
        };

        if recipients.len() == 1 && recipients[0] == CONTROL_CHANNEL {
            self.handle_control(participant, msg_type, &mut dgi).await;
            return;
        }

        let _ = sender;
        self.route(&recipients, frame).await;
    }

    async fn handle_control(&self, participant: u64, msg_type: u16, dgi: &mut DatagramIterator) {
        let mut state = self.state.lock().await;
        match msg_type {
            control::SET_CHANNEL => {
                let channel = match dgi.read_channel() {
                    Ok(c) => c,
                    Err(_) => return,
                };
                if let Err(e) = state.registry.register(participant, channel) {
                    warn!("MD: {}", e);
                }
            }
            control::REMOVE_CHANNEL => {
                if let Ok(channel) = dgi.read_channel() {
                    state.registry.unregister(participant, channel);
                }
            }
            control::ADD_POST_REMOVE => {
                let post_remove = dgi.read_remainder();
                if let Some(p) = state.participants.get_mut(&participant) {
                    p.post_removes.push(post_remove);
                }
            }
            control::CLEAR_POST_REMOVE => {
                if let Some(p) = state.participants.get_mut(&participant) {
                    p.post_removes.clear();
                }
            }
            control::ADD_RANGE | control::REMOVE_RANGE => {
                debug!("MD: range subscriptions are not part of this channel model; ignoring.");
            }
            other => {
                warn!("MD: unrecognized control message type {}.", other);
            }
        }
    }

    /// Delivers `frame` verbatim to the current owner of each channel in
    /// `recipients`.
    async fn route(&self, recipients: &[Channel], frame: Vec<u8>) {
        let state = self.state.lock().await;
        for channel in recipients {
            match state.registry.owner_of(*channel) {
                Some(owner) => {
                    if let Some(p) = state.participants.get(&owner) {
                        let _ = p.outbox.send(frame.clone());
                    }
                }
                None => warn!("MD: no participant is registered for channel {}.", channel),
            }
        }
    }

    /// Releases every channel a disconnected participant owned and
    /// fires its post-remove queue, in order, then drops the
    /// participant entirely.
    async fn teardown_participant(&self, participant: u64) {
        let (released, post_removes) = {
            let mut state = self.state.lock().await;
            let released = state.registry.release_all(participant);
            let post_removes = state
                .participants
                .remove(&participant)
                .map(|p| p.post_removes)
                .unwrap_or_default();
            (released, post_removes)
        };
        info!(
            "MD: participant {} disconnected, released {} channel(s).",
            participant,
            released.len()
        );
        for post_remove in post_removes {
            let mut dgi = DatagramIterator::new(Datagram::from(post_remove.clone()));
            let recipient_count = match dgi.read_u8() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let mut recipients = Vec::with_capacity(recipient_count as usize);
            for _ in 0..recipient_count {
                if let Ok(c) = dgi.read_channel() {
                    recipients.push(c);
                }
            }
            self.route(&recipients, post_remove).await;
        }
    }
}
