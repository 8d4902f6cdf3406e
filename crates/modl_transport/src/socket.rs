//! Local TCP socket transport
//!
//! Connects to the Brain listening on `127.0.0.1:$SOCKET_PORT` (default
//! 4242) and exchanges ETX-framed JSON messages. All calls block.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use modl_core::LOG_PREFIX;
use modl_runtime::{Command, Initialization, Observation};
use serde::de::DeserializeOwned;

use crate::framing::{encode_frame, FrameBuffer, RECEIVE_CHUNK_SIZE};
use crate::{ChannelState, Communicator, TransportError, TransportResult, TransportStats};

/// Brain address, always local
pub const SOCKET_HOST: [u8; 4] = [127, 0, 0, 1];

/// Port used when `SOCKET_PORT` is unset
pub const DEFAULT_SOCKET_PORT: u16 = 4242;

/// Environment variable overriding the port
pub const SOCKET_PORT_ENV: &str = "SOCKET_PORT";

/// Time left to the peer to flush its side on close
const CLOSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// ETX-framed JSON over TCP
pub struct SocketTransport {
    addr: SocketAddr,
    stream: Option<TcpStream>,
    state: ChannelState,
    frames: FrameBuffer,
    stats: TransportStats,
    close_timeout: Duration,
}

impl SocketTransport {
    /// Create a transport for an explicit address
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stream: None,
            state: ChannelState::Disconnected,
            frames: FrameBuffer::new(),
            stats: TransportStats::default(),
            close_timeout: CLOSE_TIMEOUT,
        }
    }

    /// Create a transport for the local Brain, port taken from `SOCKET_PORT`
    pub fn from_env() -> TransportResult<Self> {
        let port = match std::env::var(SOCKET_PORT_ENV) {
            Ok(value) => parse_port(&value)?,
            Err(_) => DEFAULT_SOCKET_PORT,
        };
        Ok(Self::new(SocketAddr::from((SOCKET_HOST, port))))
    }

    /// Override the close drain timeout
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn stream(&mut self) -> TransportResult<&mut TcpStream> {
        match self.state {
            ChannelState::Disconnected => Err(TransportError::NotConnected),
            ChannelState::Closed => Err(TransportError::Closed),
            ChannelState::Connected => self.stream.as_mut().ok_or(TransportError::NotConnected),
        }
    }

    /// Read chunks until a full message is buffered, then parse it
    fn receive<T: DeserializeOwned>(&mut self) -> TransportResult<T> {
        let mut chunk = [0u8; RECEIVE_CHUNK_SIZE];
        while !self.frames.has_frame() {
            let read = self.stream()?.read(&mut chunk)?;
            if read == 0 {
                log::warn!("{} Brain closed the connection", LOG_PREFIX);
                self.state = ChannelState::Closed;
                self.stream = None;
                return Err(TransportError::Closed);
            }
            self.stats.bytes_received += read as u64;
            self.frames.extend(&chunk[..read]);
        }

        let message = self
            .frames
            .take_message()?
            .ok_or_else(|| TransportError::Protocol("terminator vanished from buffer".to_string()))?;
        let parsed = serde_json::from_str(&message)?;
        self.stats.messages_received += 1;
        Ok(parsed)
    }

    fn drain(stream: &mut TcpStream, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut sink = [0u8; RECEIVE_CHUNK_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                log::debug!("{} Close drain timed out", LOG_PREFIX);
                return;
            }
            if let Err(e) = stream.set_read_timeout(Some(remaining)) {
                log::warn!("{} Could not bound close drain: {}", LOG_PREFIX, e);
                return;
            }
            match stream.read(&mut sink) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(e) => {
                    log::debug!("{} Close drain ended: {}", LOG_PREFIX, e);
                    return;
                }
            }
        }
    }
}

fn parse_port(value: &str) -> TransportResult<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| TransportError::ConnectionFailed(format!("invalid {} '{}'", SOCKET_PORT_ENV, value)))
}

impl Communicator for SocketTransport {
    fn connect(&mut self) -> TransportResult<()> {
        match self.state {
            ChannelState::Connected => return Ok(()),
            ChannelState::Closed => return Err(TransportError::Closed),
            ChannelState::Disconnected => {}
        }

        log::debug!("{} Connecting to Brain at {}", LOG_PREFIX, self.addr);
        let stream =
            TcpStream::connect(self.addr).map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", self.addr, e)))?;
        stream.set_nodelay(true)?;

        self.stream = Some(stream);
        self.state = ChannelState::Connected;
        log::info!("{} Connected to Brain at {}", LOG_PREFIX, self.addr);
        Ok(())
    }

    fn receive_init(&mut self) -> TransportResult<Initialization> {
        self.receive()
    }

    fn send(&mut self, observation: &Observation) -> TransportResult<()> {
        let frame = encode_frame(&serde_json::to_vec(observation)?);
        self.stream()?.write_all(&frame)?;
        self.stats.bytes_sent += frame.len() as u64;
        self.stats.messages_sent += 1;
        Ok(())
    }

    fn receive_command(&mut self) -> TransportResult<Command> {
        self.receive()
    }

    fn close(&mut self) {
        self.state = ChannelState::Closed;
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        log::info!(
            "{} Shutting down socket connection, with a {} ms timeout",
            LOG_PREFIX,
            self.close_timeout.as_millis()
        );
        if let Err(e) = stream.shutdown(Shutdown::Write) {
            log::warn!("{} Socket shutdown failed: {}", LOG_PREFIX, e);
        }
        Self::drain(&mut stream, self.close_timeout);
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            log::debug!("{} Socket already shut down: {}", LOG_PREFIX, e);
        }
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("4242").unwrap(), 4242);
        assert_eq!(parse_port(" 5000\n").unwrap(), 5000);
        assert!(matches!(parse_port("abc"), Err(TransportError::ConnectionFailed(_))));
    }

    #[test]
    fn test_calls_before_connect_fail() {
        let mut transport = SocketTransport::new(SocketAddr::from((SOCKET_HOST, DEFAULT_SOCKET_PORT)));
        assert_eq!(transport.state(), ChannelState::Disconnected);
        assert!(matches!(
            transport.send(&Observation::new()),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(transport.receive_command(), Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut transport = SocketTransport::new(SocketAddr::from((SOCKET_HOST, DEFAULT_SOCKET_PORT)));
        transport.close();
        assert_eq!(transport.state(), ChannelState::Closed);
        assert!(matches!(transport.connect(), Err(TransportError::Closed)));
        assert!(matches!(transport.send(&Observation::new()), Err(TransportError::Closed)));
    }
}
