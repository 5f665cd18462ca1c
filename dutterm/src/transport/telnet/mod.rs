//! Telnet transport over TCP.
//!
//! The raw stream carries both device output and Telnet commands. The
//! transport's filter runs every byte through the [`Negotiator`] first and
//! through an [`AnsiFilter`] second, so the read loop sees only printable
//! text and the replies it has to send back.

mod negotiation;

pub use negotiation::{Negotiation, Negotiator, window_size_announcement};

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::config::TelnetConfig;
use super::{
    Connector, LoginPolicy, LoginRetry, Transport, TransportKind, WritePacing, read_stream_byte,
};
use crate::channel::{AnsiFilter, ByteFilter, Filtered};
use crate::error::{ChannelError, Result, TransportError};

/// A Telnet session over any byte stream (TCP in production).
pub struct TelnetTransport<S = TcpStream> {
    stream: BufReader<S>,
    negotiator: Negotiator,
    ansi: AnsiFilter,
}

impl<S> TelnetTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            negotiator: Negotiator::new(),
            ansi: AnsiFilter::new(),
        }
    }
}

impl<S> Transport for TelnetTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn kind(&self) -> TransportKind {
        TransportKind::Telnet
    }

    async fn read_byte(&mut self) -> Result<u8> {
        read_stream_byte(&mut self.stream).await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(data).await.map_err(ChannelError::Io)?;
        stream.flush().await.map_err(ChannelError::Io)?;
        Ok(())
    }

    fn filter(&mut self, byte: u8) -> Filtered {
        match self.negotiator.feed(byte) {
            Negotiation::Data(b) => self.ansi.filter(b),
            Negotiation::Consumed => Filtered::Discard,
            Negotiation::Reply(reply) => Filtered::Reply(reply),
        }
    }

    fn pacing(&self) -> WritePacing {
        WritePacing::NONE
    }

    fn login_policy(&self) -> LoginPolicy {
        LoginPolicy {
            prompts_for_credentials: true,
            retry: LoginRetry::Fail,
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stream
            .get_mut()
            .shutdown()
            .await
            .map_err(ChannelError::Io)?;
        Ok(())
    }
}

impl Connector for TelnetConfig {
    type Transport = TelnetTransport;

    fn target(&self) -> String {
        self.socket_addr()
    }

    async fn connect(&self) -> Result<TelnetTransport> {
        let target = self.socket_addr();
        debug!("telnet: dialing {}", target);

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|source| TransportError::ConnectionFailed {
                target: target.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("telnet: cannot disable Nagle on {}: {}", target, e);
        }

        let mut transport = TelnetTransport::from_stream(stream);
        transport.write_all(&window_size_announcement()).await?;
        debug!("telnet: connected to {}", target);
        Ok(transport)
    }
}
