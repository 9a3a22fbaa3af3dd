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

//! Daemon configuration, loaded from `daemon.toml` at
//! startup.

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Daemon {
    pub name: String,
    pub log_level: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MessageDirectorConfig {
    /// `<host>:<port>` the MD listens on for internal participants.
    pub bind: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ClientAgentConfig {
    /// `<host>:<port>` the Client Agent listens on for game clients.
    pub bind: String,

    #[serde(rename = "min-channels")]
    pub min_channels: u64,
    #[serde(rename = "max-channels")]
    pub max_channels: u64,

    /// Version string the client must match exactly to log in.
    pub version: String,
    /// DC file hash the client reports; compared only when
    /// `enforce-hash` is set.
    #[serde(rename = "hash-val")]
    pub hash_val: u32,
    /// The hash check exists but is disabled unless this is explicitly
    /// turned on, since most deployments don't want to hand-carry a
    /// compiled dclass hash.
    #[serde(rename = "enforce-hash", default)]
    pub enforce_hash: bool,

    /// Seconds between required client heartbeats before disconnect.
    #[serde(rename = "heartbeat-interval", default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,

    /// Path to the embedded play-token -> account-id store.
    #[serde(rename = "dbm-filename")]
    pub dbm_filename: String,
    #[serde(rename = "dbm-mode", default = "default_dbm_mode")]
    pub dbm_mode: String,
}

fn default_heartbeat_interval() -> u64 {
    15
}

fn default_dbm_mode() -> String {
    "c".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    /// Channel the external Database Server listens on.
    pub channel: u64,
    /// Seconds before a pending database request is abandoned.
    #[serde(default = "default_db_timeout")]
    pub timeout: u64,
}

fn default_db_timeout() -> u64 {
    5
}

#[derive(Deserialize, Debug, Clone)]
pub struct EdgeConfig {
    pub daemon: Daemon,
    #[serde(rename = "message-director")]
    pub message_director: MessageDirectorConfig,
    #[serde(rename = "client-agent")]
    pub client_agent: ClientAgentConfig,
    pub database: DatabaseConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_daemon_toml() {
        let toml_str = r#"
            [daemon]
            name = "donet-edge"
            log_level = "info"

            [message-director]
            bind = "0.0.0.0:7100"

            [client-agent]
            bind = "0.0.0.0:7200"
            min-channels = 1000000000
            max-channels = 1999999999
            version = "sv1.0.0.0.0"
            hash-val = 3061887910
            dbm-filename = "databases/database.dbm"

            [database]
            channel = 1002
        "#;

        let config: EdgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.daemon.name, "donet-edge");
        assert_eq!(config.client_agent.heartbeat_interval, 15);
        assert!(!config.client_agent.enforce_hash);
        assert_eq!(config.database.timeout, 5);
    }
}
