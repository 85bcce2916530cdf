//! Scripted stand-in for a daemon, speaking the wire protocol over a real
//! loopback socket.

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bytes::{BufMut, BytesMut};
use spread_client::codec::{flip32, put_group_field, ENDIAN_TYPE};
use spread_client::{ConnectOptions, GroupHandle, ServiceType};

pub const MAILBOX: &str = "#alice#daemon1";

/// Clients refuse ports above 32768, which rules out the ephemeral range.
const PORTS: std::ops::RangeInclusive<u16> = 20_000..=32_768;

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the daemon answers the handshake.
#[derive(Clone)]
pub struct Script {
    pub accept: u8,
    pub version: [u8; 3],
    pub mailbox: String,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            accept: 1,
            version: [4, 4, 0],
            mailbox: MAILBOX.to_string(),
        }
    }
}

pub struct MockDaemon {
    listener: TcpListener,
}

impl MockDaemon {
    pub fn start() -> Result<Self> {
        // Spread the starting point so parallel tests rarely collide.
        let span = usize::from(PORTS.end() - PORTS.start()) + 1;
        let offset = (std::process::id() as usize * 7919 + thread_seed()) % span;
        for step in 0..span {
            let port = PORTS.start() + ((offset + step) % span) as u16;
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
                return Ok(Self { listener });
            }
        }
        bail!("no free port for the mock daemon")
    }

    pub fn options(&self, name: &str) -> Result<ConnectOptions> {
        let port = self.listener.local_addr()?.port();
        Ok(ConnectOptions::new(name).host("127.0.0.1").port(port))
    }

    /// Accepts one client in the background and runs the handshake. Gives up
    /// when no client shows up within [`ACCEPT_TIMEOUT`].
    pub fn serve(self, script: Script) -> JoinHandle<Result<Peer>> {
        thread::spawn(move || {
            let stream = accept(&self.listener)?;
            Peer::handshake(stream, &script)
        })
    }
}

fn accept(listener: &TcpListener) -> Result<TcpStream> {
    listener.set_nonblocking(true)?;
    let start = Instant::now();
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                if start.elapsed() > ACCEPT_TIMEOUT {
                    bail!("no client connected to the mock daemon");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(err) => return Err(err).context("accept client"),
        }
    }
}

fn thread_seed() -> usize {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    NEXT.fetch_add(131, Ordering::Relaxed)
}

/// The daemon side of one accepted session.
pub struct Peer {
    stream: TcpStream,
    pub connect_frame: Vec<u8>,
    pub auth_field: Vec<u8>,
}

impl Peer {
    fn handshake(mut stream: TcpStream, script: &Script) -> Result<Self> {
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;

        let mut connect_frame = vec![0u8; 5];
        stream.read_exact(&mut connect_frame)?;
        let mut name = vec![0u8; usize::from(connect_frame[4])];
        stream.read_exact(&mut name)?;
        connect_frame.extend_from_slice(&name);

        stream.write_all(&[4])?;
        stream.write_all(b"NULL")?;

        let mut auth_field = vec![0u8; 90];
        stream.read_exact(&mut auth_field)?;

        // One write: the client may already have hung up after a failed
        // authentication.
        let mut verdict = vec![script.accept];
        if script.accept == 1 {
            verdict.extend_from_slice(&script.version);
            verdict.push(script.mailbox.len() as u8);
            verdict.extend_from_slice(script.mailbox.as_bytes());
        }
        stream.write_all(&verdict)?;

        Ok(Self {
            stream,
            connect_frame,
            auth_field,
        })
    }

    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.stream.write_all(frame)?;
        Ok(())
    }

    /// Reads one frame written by the client.
    pub fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut frame = vec![0u8; 48];
        self.stream.read_exact(&mut frame).context("frame header")?;
        let num_groups = i32::from_be_bytes(frame[36..40].try_into()?);
        let data_len = i32::from_be_bytes(frame[44..48].try_into()?);
        if num_groups < 0 || data_len < 0 {
            bail!("client sent negative counts");
        }

        let mut body = vec![0u8; num_groups as usize * 32 + data_len as usize];
        self.stream.read_exact(&mut body).context("frame body")?;
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// True once the client has closed its end.
    pub fn at_eof(&mut self) -> Result<bool> {
        let mut byte = [0u8; 1];
        Ok(self.stream.read(&mut byte)? == 0)
    }
}

/// Service type word of a frame.
pub fn service_of(frame: &[u8]) -> i32 {
    i32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]])
}

/// Group field at `offset`, trimmed at the first zero.
pub fn name_at(frame: &[u8], offset: usize) -> String {
    let field = &frame[offset..offset + 32];
    let end = field.iter().position(|&b| b == 0).unwrap_or(32);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// A frame as the daemon sends it.
pub struct Frame<'a> {
    pub service_type: ServiceType,
    pub sender: &'a str,
    pub groups: &'a [&'a str],
    pub message_type: i16,
    pub data: &'a [u8],
    pub reject_of: Option<ServiceType>,
    pub flip: bool,
}

impl<'a> Frame<'a> {
    pub fn regular(sender: &'a str, groups: &'a [&'a str], data: &'a [u8]) -> Self {
        Self {
            service_type: ServiceType::AGREED,
            sender,
            groups,
            message_type: 0,
            data,
            reject_of: None,
            flip: false,
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        let word = |value: i32| if self.flip { flip32(value) } else { value };
        let tag = if self.flip { ENDIAN_TYPE } else { 0 };

        let mut buf = BytesMut::new();
        buf.put_i32(word(self.service_type.to_wire() | tag));
        put_group_field(&mut buf, &GroupHandle::new(self.sender));
        buf.put_i32(word(self.groups.len() as i32));
        buf.put_i32(word(((i32::from(self.message_type) << 8) & 0x00FF_FF00) | tag));
        buf.put_i32(word(self.data.len() as i32));
        if let Some(original) = self.reject_of {
            buf.put_i32(word(original.to_wire()));
        }
        for group in self.groups {
            put_group_field(&mut buf, &GroupHandle::new(*group));
        }
        buf.put_slice(self.data);
        buf.to_vec()
    }
}

/// Regular membership payload with one set per entry of `sets`.
pub fn membership_payload(view: [i32; 3], sets: &[&[&str]], local_set: usize) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for part in view {
        buf.put_i32(part);
    }
    buf.put_i32(sets.len() as i32);
    let offset: usize = sets[..local_set].iter().map(|set| 4 + set.len() * 32).sum();
    buf.put_i32(offset as i32);
    for set in sets {
        buf.put_i32(set.len() as i32);
        for member in *set {
            put_group_field(&mut buf, &GroupHandle::new(*member));
        }
    }
    buf.to_vec()
}

pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> Result<()> {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > timeout {
            bail!("timeout waiting for condition");
        }
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}
