// In-memory stand-ins for the hardware capabilities

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use crate::error::BoxError;
use crate::flash::FlashTarget;
use crate::net::{Connection, Connector};
use crate::platform::{DeviceIdentity, HttpGet, HttpResponse, Restart};
use crate::target::ImageKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashCall {
    Begin(usize, ImageKind),
    End,
    Abort,
}

pub struct MemoryFlash {
    pub capacity: usize,
    pub data: Vec<u8>,
    pub calls: Vec<FlashCall>,
    pub fail_end: bool,
    pub report_unfinished: bool,
    pub fail_write_after: Option<usize>,
    finished: bool,
}

impl MemoryFlash {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: Vec::new(),
            calls: Vec::new(),
            fail_end: false,
            report_unfinished: false,
            fail_write_after: None,
            finished: false,
        }
    }
}

impl FlashTarget for MemoryFlash {
    fn begin(&mut self, size: usize, kind: ImageKind) -> Result<(), BoxError> {
        self.calls.push(FlashCall::Begin(size, kind));
        if size > self.capacity {
            return Err(format!("{} bytes requested, {} available", size, self.capacity).into());
        }
        self.data.clear();
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), BoxError> {
        if let Some(limit) = self.fail_write_after {
            if self.data.len() + buf.len() > limit {
                return Err("flash write rejected".into());
            }
        }
        self.data.extend_from_slice(buf);
        Ok(())
    }

    fn end(&mut self) -> Result<(), BoxError> {
        self.calls.push(FlashCall::End);
        if self.fail_end {
            return Err("validation failed".into());
        }
        self.finished = !self.report_unfinished;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn abort(&mut self) {
        self.calls.push(FlashCall::Abort);
    }
}

#[derive(Default)]
pub struct RecordingRestart {
    pub count: usize,
}

impl Restart for RecordingRestart {
    fn restart(&mut self) {
        self.count += 1;
    }
}

/// Yields its data, then fails instead of reporting end of stream.
pub struct FailingReader {
    data: io::Cursor<Vec<u8>>,
}

impl FailingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: io::Cursor::new(data),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
            n => Ok(n),
        }
    }
}

/// What a scripted connection saw from the updater.
#[derive(Debug, Default)]
pub struct ConnectionLog {
    pub request: Vec<u8>,
    pub timeouts: Vec<Option<Duration>>,
    pub closed: bool,
}

/// Connection replaying a canned response.
pub struct ScriptedConnection {
    response: io::Cursor<Vec<u8>>,
    silent: bool,
    log: Rc<RefCell<ConnectionLog>>,
}

impl Read for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.silent {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"));
        }
        self.response.read(buf)
    }
}

impl Write for ScriptedConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.borrow_mut().request.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for ScriptedConnection {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        // Same rule as TcpStream
        if timeout == Some(Duration::ZERO) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot set a 0 duration timeout",
            ));
        }
        self.log.borrow_mut().timeouts.push(timeout);
        Ok(())
    }

    fn close(&mut self) {
        self.log.borrow_mut().closed = true;
    }
}

enum Script {
    Respond(Vec<u8>),
    Silent,
}

/// Hands out queued connections; refuses once the queue is empty.
#[derive(Default)]
pub struct ScriptedConnector {
    pending: VecDeque<Script>,
    pub dialed: Vec<(String, u16)>,
    pub logs: Vec<Rc<RefCell<ConnectionLog>>>,
}

impl ScriptedConnector {
    pub fn respond(response: impl Into<Vec<u8>>) -> Self {
        let mut connector = Self::default();
        connector.pending.push_back(Script::Respond(response.into()));
        connector
    }

    /// Connects, then never sends a byte.
    pub fn silent() -> Self {
        let mut connector = Self::default();
        connector.pending.push_back(Script::Silent);
        connector
    }

    pub fn refusing() -> Self {
        Self::default()
    }

    pub fn log(&self, index: usize) -> std::cell::Ref<'_, ConnectionLog> {
        self.logs[index].borrow()
    }

    pub fn request_text(&self, index: usize) -> String {
        String::from_utf8_lossy(&self.log(index).request).into_owned()
    }
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    fn connect(&mut self, host: &str, port: u16) -> io::Result<ScriptedConnection> {
        self.dialed.push((host.to_string(), port));
        let script = self
            .pending
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))?;

        let log = Rc::new(RefCell::new(ConnectionLog::default()));
        self.logs.push(log.clone());

        let (response, silent) = match script {
            Script::Respond(bytes) => (bytes, false),
            Script::Silent => (Vec::new(), true),
        };
        Ok(ScriptedConnection {
            response: io::Cursor::new(response),
            silent,
            log,
        })
    }
}

/// Manifest client replaying queued responses.
#[derive(Default)]
pub struct FakeHttp {
    pub responses: VecDeque<Result<HttpResponse, String>>,
    pub urls: Vec<String>,
}

impl FakeHttp {
    pub fn ok(body: &str) -> Self {
        let mut http = Self::default();
        http.push(200, body);
        http
    }

    pub fn push(&mut self, status: u16, body: &str) {
        self.responses.push_back(Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn push_error(&mut self, message: &str) {
        self.responses.push_back(Err(message.to_string()));
    }
}

impl HttpGet for FakeHttp {
    fn get(&mut self, url: &str) -> Result<HttpResponse, BoxError> {
        self.urls.push(url.to_string());
        match self.responses.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(message.into()),
            None => Err("no response queued".into()),
        }
    }
}

pub struct FixedIdentity(pub u64);

impl DeviceIdentity for FixedIdentity {
    fn device_id(&self) -> u64 {
        self.0
    }
}
