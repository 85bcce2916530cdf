//! Buffered frame reader over the daemon socket.
//!
//! The socket carries a short read timeout so that a reader waiting for the
//! next frame can notice a stop request. Bytes read before the timeout stay
//! in the buffer, so giving up on a wait never loses part of a frame.

use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};
use crate::frame::{FrameHeader, RawFrame, HEADER_LEN};
use crate::protocol::DISPATCH_READ_TIMEOUT;

const READ_CHUNK: usize = 8 * 1024;

const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// What to do when the socket has no data before its read timeout.
#[derive(Clone, Copy)]
pub(crate) enum Wait<'a> {
    /// Keep waiting.
    Block,
    /// Keep waiting unless the flag is set.
    Until(&'a AtomicBool),
    /// Give up at the first timeout.
    Probe,
}

pub(crate) struct FrameReader<R = TcpStream> {
    stream: R,
    buf: BytesMut,
    pending: Option<RawFrame>,
}

impl<R: Read> FrameReader<R> {
    pub(crate) fn new(stream: R) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            pending: None,
        }
    }

    /// Reads the next complete frame.
    ///
    /// Returns `Ok(None)` when `wait` gave up before a whole frame arrived;
    /// the partial frame is kept for the next call.
    pub(crate) fn read_frame(&mut self, wait: Wait<'_>) -> Result<Option<RawFrame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }

        if !self.fill(HEADER_LEN, wait)? {
            return Ok(None);
        }
        let header = match FrameHeader::parse(&self.buf[..HEADER_LEN]) {
            Ok(header) => header,
            Err(err) => {
                self.buf.advance(HEADER_LEN);
                return Err(err);
            }
        };

        let total = HEADER_LEN + header.body_len();
        if !self.fill(total, wait)? {
            return Ok(None);
        }

        let mut body = self.buf.split_to(total).freeze();
        body.advance(HEADER_LEN);
        Ok(Some(RawFrame { header, body }))
    }

    /// Puts a frame back so the next [`FrameReader::read_frame`] returns it.
    pub(crate) fn unread(&mut self, frame: RawFrame) {
        debug_assert!(self.pending.is_none());
        self.pending = Some(frame);
    }

    fn fill(&mut self, want: usize, wait: Wait<'_>) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.buf.len() < want {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(Error::ConnectionClosed("message frame")),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    match wait {
                        Wait::Block => continue,
                        Wait::Until(stop) if !stop.load(Ordering::Acquire) => continue,
                        Wait::Until(_) | Wait::Probe => return Ok(false),
                    }
                }
                Err(err) => return Err(Error::io("reading from daemon")(err)),
            }
        }
        Ok(true)
    }
}

impl FrameReader<TcpStream> {
    /// True when a whole frame can be read without blocking.
    pub(crate) fn frame_ready(&mut self) -> Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }

        self.stream
            .set_read_timeout(Some(POLL_TIMEOUT))
            .map_err(Error::io("setting poll timeout"))?;
        let probed = self.read_frame(Wait::Probe);
        self.stream
            .set_read_timeout(Some(DISPATCH_READ_TIMEOUT))
            .map_err(Error::io("restoring read timeout"))?;

        match probed? {
            Some(frame) => {
                self.pending = Some(frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
