//! Plain-TCP transport with RFC 6242 end-of-message framing.
//!
//! One OS thread per accepted connection; each thread owns its session and
//! runs the hello exchange followed by the message loop. Transport security
//! (SSH/TLS) is out of scope here.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{debug, warn};
use netconf_proto::{Server, Session};

/// End-of-message delimiter for base:1.0 framing.
pub const EOM: &str = "]]>]]>";

/// Accept loop; spawns a named worker thread per connection.
pub fn serve(listener: TcpListener, server: Arc<Server>) -> std::io::Result<()> {
    for stream in listener.incoming() {
        let stream = stream?;
        let session = server.open_session();
        let name = format!("netconf-session-{}", session.id());
        thread::Builder::new().name(name).spawn(move || {
            let peer = stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            let id = session.id();
            if let Err(err) = serve_connection(stream, session) {
                warn!("session {id} ({peer}): transport error: {err}");
            }
            // Session drop force-releases any held locks.
        })?;
    }
    Ok(())
}

fn serve_connection(mut stream: TcpStream, mut session: Session) -> std::io::Result<()> {
    send_frame(&mut stream, &session.hello())?;

    let mut frames = FrameReader::new(stream.try_clone()?);
    let Some(client_hello) = frames.read_frame()? else {
        return Ok(());
    };
    session
        .handle_hello(&client_hello)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    while let Some(message) = frames.read_frame()? {
        match session.handle_message(&message) {
            Ok(replies) => {
                for reply in replies {
                    send_frame(&mut stream, &reply)?;
                }
                if session.is_closed() {
                    debug!("session {}: closing transport", session.id());
                    break;
                }
            }
            Err(err) => {
                warn!("session {}: {err}", session.id());
                break;
            }
        }
    }
    Ok(())
}

/// Write one message followed by the end-of-message delimiter.
pub fn send_frame(stream: &mut impl Write, message: &str) -> std::io::Result<()> {
    stream.write_all(message.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.write_all(EOM.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()
}

/// Incremental `]]>]]>`-delimited frame reader.
pub struct FrameReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: Vec::new() }
    }

    /// Next complete message, or `None` on clean end of stream.
    pub fn read_frame(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(at) = find_delimiter(&self.buffer) {
                let frame: Vec<u8> = self.buffer.drain(..at).collect();
                self.buffer.drain(..EOM.len());
                let text = String::from_utf8(frame).map_err(|err| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, err)
                })?;
                return Ok(Some(text.trim().to_string()));
            }

            let mut chunk = [0u8; 4096];
            let read = self.inner.read(&mut chunk)?;
            if read == 0 {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-message",
                ));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    if buffer.len() < EOM.len() {
        return None;
    }
    buffer
        .windows(EOM.len())
        .position(|window| window == EOM.as_bytes())
}
