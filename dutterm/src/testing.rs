//! In-memory devices for unit tests.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{DuplexStream, duplex};

use crate::error::{Result, TransportError};
use crate::transport::{Connector, SerialConfig, SerialTransport, TelnetTransport};

const DUPLEX_CAPACITY: usize = 4096;

/// A cloneable in-memory sink for session recordings.
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub(crate) fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A Telnet transport wired to an in-memory device end.
pub(crate) fn duplex_telnet() -> (TelnetTransport<DuplexStream>, DuplexStream) {
    let (ours, device) = duplex(DUPLEX_CAPACITY);
    (TelnetTransport::from_stream(ours), device)
}

/// A serial transport with default pacing wired to an in-memory device end.
pub(crate) fn duplex_serial() -> (SerialTransport<DuplexStream>, DuplexStream) {
    let (ours, device) = duplex(DUPLEX_CAPACITY);
    let config = SerialConfig::new("/dev/null", 115_200);
    (SerialTransport::from_stream(ours, &config), device)
}

/// Connector handing out one in-memory Telnet transport.
pub(crate) struct DuplexConnector {
    stream: Mutex<Option<DuplexStream>>,
}

impl DuplexConnector {
    pub(crate) fn new() -> (Self, DuplexStream) {
        let (ours, device) = duplex(DUPLEX_CAPACITY);
        let connector = Self {
            stream: Mutex::new(Some(ours)),
        };
        (connector, device)
    }
}

impl Connector for DuplexConnector {
    type Transport = TelnetTransport<DuplexStream>;

    fn target(&self) -> String {
        "duplex".to_string()
    }

    async fn connect(&self) -> Result<Self::Transport> {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match stream {
            Some(stream) => Ok(TelnetTransport::from_stream(stream)),
            None => Err(TransportError::ConnectionFailed {
                target: self.target(),
                source: io::Error::new(io::ErrorKind::NotConnected, "stream already taken"),
            }
            .into()),
        }
    }
}
