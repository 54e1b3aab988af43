//! Single-client TCP connection loop.
//!
//! The listener is bound once and polled without blocking, so the loop notices
//! a cleared liveness flag within one poll timeout even when nobody connects.
//! A client that disconnects (or whose socket fails) is dropped and the loop
//! goes back to accepting; the process never restarts.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{DeviceError, DeviceResult};
use crate::framing::LineFramer;

/// Sleep between non-blocking accept attempts.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Anything that answers one command line.
pub trait LineHandler {
    fn handle_line(&self, line: &str) -> Option<String>;
}

pub struct ConnectionManager {
    listener: TcpListener,
    config: ConnectionConfig,
}

impl ConnectionManager {
    /// Bind and listen on the configured interface and port.
    pub fn bind(config: &ConnectionConfig) -> DeviceResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind((config.interface.as_str(), config.port))?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> DeviceResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve clients one at a time until `alive` is cleared.
    pub fn serve(&self, handler: &dyn LineHandler, alive: &AtomicBool) {
        while alive.load(Ordering::Acquire) {
            let Some((stream, peer)) = self.accept(alive) else {
                continue;
            };
            info!(%peer, "client connected");
            match self.session(stream, handler, alive) {
                Ok(()) => info!(%peer, "session ended by shutdown"),
                Err(DeviceError::ConnectionClosed) => info!(%peer, "client disconnected"),
                Err(e) => {
                    error!(%peer, "{e}. Waiting for new connection...");
                }
            }
        }
        info!("connection loop stopped");
    }

    /// Wait up to one timeout for a client.
    fn accept(&self, alive: &AtomicBool) -> Option<(TcpStream, SocketAddr)> {
        let timeout = self.config.timeout();
        let deadline = Instant::now() + timeout;
        while alive.load(Ordering::Acquire) && Instant::now() < deadline {
            match self.listener.accept() {
                Ok(pair) => return Some(pair),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL.min(timeout));
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                    thread::sleep(ACCEPT_POLL.min(timeout));
                }
            }
        }
        None
    }

    /// Read, dispatch and answer commands until the client goes away.
    ///
    /// Returns `Ok(())` only when the device shut down mid-session.
    fn session(
        &self,
        mut stream: TcpStream,
        handler: &dyn LineHandler,
        alive: &AtomicBool,
    ) -> DeviceResult<()> {
        // Accepted sockets inherit non-blocking mode on some platforms.
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.config.timeout()))?;
        stream.set_nodelay(true)?;

        let mut framer = LineFramer::new(&self.config.in_terminator);
        let mut buf = vec![0_u8; self.config.read_buffer_size];

        while alive.load(Ordering::Acquire) {
            let n = match stream.read(&mut buf) {
                Ok(0) => return Err(DeviceError::ConnectionClosed),
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            framer.push(&buf[..n]);

            while let Some(line) = framer.next_line() {
                debug!(command = %line, "Received command");
                if let Some(output) = handler.handle_line(&line) {
                    let reply = format!("{output}{}", self.config.out_terminator);
                    stream.write_all(reply.as_bytes())?;
                }
                if !alive.load(Ordering::Acquire) {
                    break;
                }
            }
        }
        Ok(())
    }
}
