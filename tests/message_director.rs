//! End-to-end coverage for the Message Director: a participant that
//! registers a channel must receive frames addressed to that channel,
//! verbatim, including ones it sent to itself.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command};
use std::thread::sleep;
use std::time::Duration;

const BIND_ADDR: &str = "127.0.0.1:57180";
const CONTROL_CHANNEL: u64 = 1;
const SET_CHANNEL: u16 = 2002;
const STARTUP_WAIT: Duration = Duration::from_millis(300);
const ROUTE_WAIT: Duration = Duration::from_millis(150);

struct DaemonGuard(Child);

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_daemon() -> DaemonGuard {
    let child = Command::new(env!("CARGO_BIN_EXE_donet-edge"))
        .current_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/message_director"))
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

fn set_channel(channel: u64) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(1u8); // one recipient in the control header
    body.extend_from_slice(&CONTROL_CHANNEL.to_le_bytes());
    body.extend_from_slice(&SET_CHANNEL.to_le_bytes());
    body.extend_from_slice(&channel.to_le_bytes());
    framed(body)
}

fn server_frame(to: u64, from: u64, msg_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(1u8);
    body.extend_from_slice(&to.to_le_bytes());
    body.extend_from_slice(&from.to_le_bytes());
    body.extend_from_slice(&msg_type.to_le_bytes());
    body.extend_from_slice(payload);
    framed(body)
}

// Both scenarios share one daemon instance and one bound port, so they
// live in a single #[test] rather than racing each other for the port
// under cargo's default parallel test execution.
#[test]
fn channel_routing_is_scoped_to_registered_owners() -> std::io::Result<()> {
    let _daemon = spawn_daemon();

    let mut owner = TcpStream::connect(BIND_ADDR)?;
    owner.set_read_timeout(Some(Duration::from_millis(1000)))?;
    owner.write_all(&set_channel(401000000))?;
    sleep(ROUTE_WAIT);

    let mut bystander = TcpStream::connect(BIND_ADDR)?;
    bystander.set_read_timeout(Some(Duration::from_millis(500)))?;

    // Routed to a channel the owner registered: must be bounced back
    // verbatim.
    let owned = server_frame(401000000, 1337, 24, b"hello");
    owner.write_all(&owned)?;
    sleep(ROUTE_WAIT);

    let mut buf = [0u8; 1024];
    let n = owner.read(&mut buf)?;
    assert_eq!(&buf[..n], &owned[..], "expected the exact frame to be bounced back");

    // Routed to a channel nobody registered: the bystander must not
    // receive anything.
    let unowned = server_frame(402999999, 1337, 24, b"nobody home");
    bystander.write_all(&unowned)?;
    sleep(ROUTE_WAIT);

    let mut buf = [0u8; 16];
    match bystander.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("expected no data for an unowned channel, got {} byte(s)", n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
        Err(e) => return Err(e),
    }
    Ok(())
}
