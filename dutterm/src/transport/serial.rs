//! Serial console transport.

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_serial::{DataBits, SerialPortBuilderExt, SerialStream, StopBits};

use super::config::{Parity, SerialConfig};
use super::{
    Connector, LoginPolicy, LoginRetry, Transport, TransportKind, WritePacing, read_stream_byte,
};
use crate::channel::{ByteFilter, Filtered, PaddingFilter};
use crate::error::{ChannelError, DriverError, Result, TransportError};

/// Multiple of the session timeout bounding a serial login.
const LOGIN_DEADLINE_FACTOR: u32 = 5;

/// A serial console session.
///
/// Consoles are slow and often already sitting at a prompt (or at nothing
/// at all), so writes are paced and the login sequence nudges the device
/// with blank lines until a prompt appears.
pub struct SerialTransport<S = SerialStream> {
    stream: BufReader<S>,
    filter: PaddingFilter,
    pacing: WritePacing,
}

impl<S> SerialTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already opened port.
    pub fn from_stream(stream: S, config: &SerialConfig) -> Self {
        Self {
            stream: BufReader::new(stream),
            filter: PaddingFilter::new(config.strip_nul_padding),
            pacing: WritePacing {
                pre_write: config.pre_write_delay,
                byte_delay: config.byte_delay,
                post_write: std::time::Duration::ZERO,
            },
        }
    }
}

impl<S> Transport for SerialTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
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
        self.filter.filter(byte)
    }

    fn pacing(&self) -> WritePacing {
        self.pacing
    }

    fn login_policy(&self) -> LoginPolicy {
        LoginPolicy {
            prompts_for_credentials: true,
            retry: LoginRetry::Nudge {
                deadline_factor: LOGIN_DEADLINE_FACTOR,
            },
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        // Dropping the stream releases the port; flush what is queued first.
        self.stream
            .get_mut()
            .flush()
            .await
            .map_err(ChannelError::Io)?;
        Ok(())
    }
}

fn data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(DriverError::InvalidConfig {
            message: format!("unsupported data bits: {other}"),
        }
        .into()),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(DriverError::InvalidConfig {
            message: format!("unsupported stop bits: {other}"),
        }
        .into()),
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

impl Connector for SerialConfig {
    type Transport = SerialTransport;

    fn target(&self) -> String {
        self.path.clone()
    }

    async fn connect(&self) -> Result<SerialTransport> {
        debug!(
            "serial: opening {} at {} baud ({}{:?}{})",
            self.path, self.baud_rate, self.data_bits, self.parity, self.stop_bits
        );

        let stream = tokio_serial::new(self.path.as_str(), self.baud_rate)
            .data_bits(data_bits(self.data_bits)?)
            .parity(parity(self.parity))
            .stop_bits(stop_bits(self.stop_bits)?)
            .timeout(self.timeout)
            .open_native_async()
            .map_err(|source| TransportError::Serial {
                path: self.path.clone(),
                source,
            })?;

        Ok(SerialTransport::from_stream(stream, self))
    }
}
