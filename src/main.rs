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

#[path = "globals.rs"]
mod globals;
#[path = "results.rs"]
mod results;
#[path = "datagram.rs"]
mod datagram;
#[path = "message_types.rs"]
mod message_types;
#[path = "channel_allocator.rs"]
mod channel_allocator;
#[path = "channel_map.rs"]
mod channel_map;
#[path = "network.rs"]
mod network;
#[path = "message_director.rs"]
mod message_director;
#[path = "kv_store.rs"]
mod kv_store;
#[path = "database.rs"]
mod database;
#[path = "dc_schema.rs"]
mod dc_schema;
#[path = "interest.rs"]
mod interest;
#[path = "operations.rs"]
mod operations;
#[path = "client_agent.rs"]
mod client_agent;
#[path = "config.rs"]
mod config;
#[path = "logger.rs"]
mod logger;
#[path = "service_factory.rs"]
mod service_factory;

const VERSION_STRING: &str = "0.1.0";
const CONFIG_FILE: &str = "daemon.toml";

fn print_help() {
    println!(
        "Usage:    donet-edge [options] ... [CONFIG_FILE]\n\
        \n\
        DoNet Edge - client-facing edge for a distributed object server.\n\
        This binary will look for a configuration file (.toml)\n\
        in the current working directory as \"{}\".\n\
        \n\
        -h, --help      Print the help page.\n\
        -v, --version   Print the binary version & build info.\n",
        CONFIG_FILE
    );
}

fn print_version() {
    use git_sha1::GitSHA1;
    static GIT_SHA1: &str = env!("GIT_SHA1");

    let bin_arch: &str = if cfg!(target_arch = "x86") {
        "x86"
    } else if cfg!(target_arch = "x86_64") {
        "x86_64"
    } else if cfg!(target_arch = "aarch64") {
        "aarch64"
    } else {
        "unknown"
    };
    let bin_platform: &str = if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "freebsd") {
        "freebsd"
    } else {
        "unknown"
    };
    let bin_env: &str = if cfg!(target_env = "gnu") {
        "gnu"
    } else if cfg!(target_env = "msvc") {
        "msvc"
    } else {
        "other"
    };
    println!(
        "DoNet Edge, version {} ({} {}-{})\n\
        Revision (Git SHA1): {}\n\n\
        Released under the AGPL-3.0 license. <https://www.gnu.org/licenses/agpl-3.0.html>\n",
        VERSION_STRING, bin_arch, bin_platform, bin_env, GIT_SHA1
    );
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    for argument in &args[1..] {
        match argument.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                print_version();
                return Ok(());
            }
            _ => {}
        }
    }

    let conf_text = std::fs::read_to_string(CONFIG_FILE)?;
    let conf: config::EdgeConfig = toml::from_str(&conf_text)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    logger::logger::initialize_logger(conf.daemon.log_level.as_deref())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "logger already initialized"))?;

    log::info!("DoNet Edge {} starting up as \"{}\".", VERSION_STRING, conf.daemon.name);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let md_handle = service_factory::start_message_director(&conf);
        // Give the Message Director's listener a moment to bind before
        // the Client Agent dials in as its first internal participant.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let ca_handle = service_factory::start_client_agent(&conf).await?;

        tokio::select! {
            res = md_handle => { log::warn!("message director task exited: {:?}", res); }
            res = ca_handle => { log::warn!("client agent task exited: {:?}", res); }
        }
        Ok::<(), std::io::Error>(())
    })
}
