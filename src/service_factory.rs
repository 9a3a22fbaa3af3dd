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

//! Boots the two services this daemon hosts: the Message Director and
//! the Client Agent. Each is spawned as its own task under the caller's
//! tokio runtime; `main.rs` joins on both.

use crate::client_agent::ClientAgent;
use crate::config::EdgeConfig;
use crate::kv_store::TokenStore;
use crate::message_director::MessageDirector;
use log::info;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Starts the Message Director, returning the task driving its accept
/// loop.
pub fn start_message_director(config: &EdgeConfig) -> JoinHandle<std::io::Result<()>> {
    info!("Booting Message Director service.");
    let md = Arc::new(MessageDirector::new(&config.message_director.bind));
    tokio::spawn(async move { md.run().await })
}

/// Starts the Client Agent: opens its token store, dials into the
/// Message Director as an internal participant, and begins accepting
/// game-client connections.
pub async fn start_client_agent(
    config: &EdgeConfig,
) -> std::io::Result<JoinHandle<std::io::Result<()>>> {
    info!("Booting Client Agent service.");

    let token_store = TokenStore::open(
        Path::new(&config.client_agent.dbm_filename),
        &config.client_agent.dbm_mode,
    )
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let md_stream = TcpStream::connect(&config.message_director.bind).await?;
    let (mut read_half, mut write_half) = md_stream.into_split();
    let (to_md, mut from_agent) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        while let Some(frame) = from_agent.recv().await {
            if crate::network::write_frame(&mut write_half, &frame).await.is_err() {
                break;
            }
        }
    });

    let agent = ClientAgent::new(
        config.client_agent.clone(),
        config.database.channel,
        Duration::from_secs(config.database.timeout),
        token_store,
        to_md,
    );

    let reader_agent = Arc::clone(&agent);
    tokio::spawn(async move {
        loop {
            match crate::network::read_frame(&mut read_half).await {
                Ok(Some(frame)) => reader_agent.dispatch_md_frame(frame).await,
                _ => break,
            }
        }
    });

    Ok(tokio::spawn(async move { agent.run().await }))
}
