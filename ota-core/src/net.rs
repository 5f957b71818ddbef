// Connection capability for the raw image download

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Open byte stream to the image host.
pub trait Connection: Read + Write {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Release the connection. Safe to call more than once.
    fn close(&mut self);
}

pub trait Connector {
    type Connection: Connection;

    fn connect(&mut self, host: &str, port: u16) -> io::Result<Self::Connection>;
}

impl<C: Connector + ?Sized> Connector for &mut C {
    type Connection = C::Connection;

    fn connect(&mut self, host: &str, port: u16) -> io::Result<Self::Connection> {
        (**self).connect(host, port)
    }
}

impl Connection for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn close(&mut self) {
        // NotConnected after the peer already closed is fine
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// Plain TCP, on the host or through the ESP-IDF lwIP socket layer.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(timeout),
        }
    }
}

impl Connector for TcpConnector {
    type Connection = TcpStream;

    fn connect(&mut self, host: &str, port: u16) -> io::Result<TcpStream> {
        let timeout = match self.connect_timeout {
            Some(timeout) => timeout,
            None => return TcpStream::connect((host, port)),
        };

        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", host))
        }))
    }
}
