//! End-to-end coverage for the Client Agent's pre-auth gate: version
//! mismatch and a missed heartbeat must each end in a disconnect, before
//! any database round-trip is ever needed. Each test spawns its own
//! daemon instance on its own ports (fixture configs under
//! tests/fixtures/) so the two can run concurrently under cargo's
//! default parallel test execution without racing for a bind address.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command};
use std::thread::sleep;
use std::time::Duration;

const LOGIN_2: u16 = 16;
const GO_GET_LOST: u16 = 4;
const BAD_VERSION: u16 = 124;
const NO_HEARTBEAT: u16 = 345;
const STARTUP_WAIT: Duration = Duration::from_millis(300);

struct DaemonGuard(Child);

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_daemon(fixture: &str) -> DaemonGuard {
    let child = Command::new(env!("CARGO_BIN_EXE_donet-edge"))
        .current_dir(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), fixture))
        .spawn()
        .expect("daemon failed to launch");
    sleep(STARTUP_WAIT);
    DaemonGuard(child)
}

fn framed(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + body.len());
    out.extend_from_slice(&(body.len() as u16).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

fn add_string(body: &mut Vec<u8>, s: &str) {
    body.extend_from_slice(&(s.len() as u16).to_le_bytes());
    body.extend_from_slice(s.as_bytes());
}

/// `LOGIN_2`: play_token (string), server_version (string), hash_val
/// (u32), token_type (u8).
fn login_2(play_token: &str, server_version: &str, hash_val: u32, token_type: u8) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&LOGIN_2.to_le_bytes());
    add_string(&mut body, play_token);
    add_string(&mut body, server_version);
    body.extend_from_slice(&hash_val.to_le_bytes());
    body.push(token_type);
    framed(body)
}

fn read_frame(sock: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    sock.read_exact(&mut len_buf)?;
    let len = u16::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    sock.read_exact(&mut body)?;
    Ok(body)
}

#[test]
fn a_login_with_the_wrong_server_version_is_disconnected() -> std::io::Result<()> {
    let _daemon = spawn_daemon("client_agent_badversion");

    let mut sock = TcpStream::connect("127.0.0.1:57193")?;
    sock.set_read_timeout(Some(Duration::from_millis(1000)))?;

    sock.write_all(&login_2("some-play-token", "wrong-version", 3061887910, 2))?;

    let resp = read_frame(&mut sock)?;
    assert_eq!(u16::from_le_bytes([resp[0], resp[1]]), GO_GET_LOST);
    assert_eq!(u16::from_le_bytes([resp[2], resp[3]]), BAD_VERSION);
    Ok(())
}

#[test]
fn a_client_that_never_heartbeats_is_disconnected() -> std::io::Result<()> {
    let _daemon = spawn_daemon("client_agent_heartbeat");

    let mut sock = TcpStream::connect("127.0.0.1:57195")?;
    sock.set_read_timeout(Some(Duration::from_millis(3000)))?;

    // heartbeat-interval in the fixture config is 1 second; send
    // nothing and wait past it.
    let resp = read_frame(&mut sock)?;
    assert_eq!(u16::from_le_bytes([resp[0], resp[1]]), GO_GET_LOST);
    assert_eq!(u16::from_le_bytes([resp[2], resp[3]]), NO_HEARTBEAT);
    Ok(())
}
