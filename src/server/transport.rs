//! Transport between the protocol client and the server process

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{ChildStdin, ChildStdout};

/// How the server should be wired up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportConfig {
    /// The child's stdin/stdout carry the protocol
    Stdio,
    /// The child connects back to a loopback listener; port 0 picks a free port
    Tcp { port: u16 },
}

pub type TransportReader = Box<dyn AsyncRead + Send + Unpin>;
pub type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established duplex channel to a running server
#[derive(Debug)]
pub enum ServerTransport {
    Stdio { stdin: ChildStdin, stdout: ChildStdout },
    Tcp { stream: TcpStream, port: u16 },
}

impl ServerTransport {
    pub fn tcp_port(&self) -> Option<u16> {
        match self {
            ServerTransport::Stdio { .. } => None,
            ServerTransport::Tcp { port, .. } => Some(*port),
        }
    }

    /// Split into independently owned read and write halves
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        match self {
            ServerTransport::Stdio { stdin, stdout } => (Box::new(stdout), Box::new(stdin)),
            ServerTransport::Tcp { stream, .. } => {
                let (reader, writer) = stream.into_split();
                (Box::new(reader), Box::new(writer))
            }
        }
    }
}
