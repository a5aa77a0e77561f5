//! Byte-stream links to the meter.
//!
//! The meter's Bluetooth SPP port is reached either as a serial device
//! (`rfcomm bind` gives `/dev/rfcomm0`) or through a serial-to-TCP bridge
//! listening on `host:port`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use serialport::SerialPort;
use tracing::info;

const BAUD_RATE: u32 = 9600;
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected, bidirectional byte stream.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read whatever is available into `buf`, waiting at most `timeout`.
    /// Returns `Ok(0)` only when the peer has closed the stream.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    fn close(&mut self) -> io::Result<()>;
}

/// Opens links by address. Called again on every connect attempt.
pub trait Connector {
    type Link: Transport;

    fn open(&mut self, address: &str) -> io::Result<Self::Link>;
}

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl Transport for SerialLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port.set_timeout(timeout)?;
        self.port.read(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for TcpStream {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.set_read_timeout(Some(timeout))?;
        self.read(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

pub enum Link {
    Serial(SerialLink),
    Tcp(TcpStream),
}

impl Transport for Link {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Link::Serial(link) => link.send(bytes),
            Link::Tcp(stream) => stream.send(bytes),
        }
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        match self {
            Link::Serial(link) => link.recv(buf, timeout),
            Link::Tcp(stream) => stream.recv(buf, timeout),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self {
            Link::Serial(link) => link.close(),
            Link::Tcp(stream) => stream.close(),
        }
    }
}

/// Opens a TCP bridge for `host:port` addresses and a serial device otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkConnector;

impl Connector for LinkConnector {
    type Link = Link;

    fn open(&mut self, address: &str) -> io::Result<Link> {
        if let Ok(socket_addr) = address.parse::<SocketAddr>() {
            info!("Opening TCP bridge at {}", socket_addr);
            let stream = TcpStream::connect_timeout(&socket_addr, OPEN_TIMEOUT)?;
            stream.set_write_timeout(Some(OPEN_TIMEOUT))?;
            stream.set_nodelay(true)?;
            return Ok(Link::Tcp(stream));
        }

        info!("Opening serial device {}", address);
        let port = serialport::new(address, BAUD_RATE)
            .timeout(OPEN_TIMEOUT)
            .open()?;
        Ok(Link::Serial(SerialLink { port }))
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! In-memory link that replays scripted reads and records writes.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    pub(crate) enum Step {
        Chunk(Vec<u8>),
        Fail(io::ErrorKind),
        /// Nothing arrives before the read times out.
        Quiet,
    }

    #[derive(Default)]
    pub(crate) struct Script {
        pub(crate) reads: VecDeque<Step>,
        pub(crate) written: Vec<u8>,
        pub(crate) opens: usize,
        pub(crate) failed_opens: usize,
        pub(crate) closed: bool,
    }

    /// Shared so a test can inspect the script after the session is gone.
    pub(crate) type SharedScript = Arc<Mutex<Script>>;

    pub(crate) struct ScriptedLink {
        script: SharedScript,
    }

    impl Transport for ScriptedLink {
        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.script.lock().unwrap().written.extend_from_slice(bytes);
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            let mut script = self.script.lock().unwrap();
            match script.reads.pop_front() {
                Some(Step::Chunk(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        script.reads.push_front(Step::Chunk(chunk.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Step::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
                Some(Step::Quiet) => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "script exhausted")),
            }
        }

        fn close(&mut self) -> io::Result<()> {
            self.script.lock().unwrap().closed = true;
            Ok(())
        }
    }

    pub(crate) struct ScriptedConnector {
        pub(crate) script: SharedScript,
    }

    impl ScriptedConnector {
        pub(crate) fn new() -> (Self, SharedScript) {
            let script = SharedScript::default();
            (Self { script: script.clone() }, script)
        }
    }

    impl Connector for ScriptedConnector {
        type Link = ScriptedLink;

        fn open(&mut self, _address: &str) -> io::Result<ScriptedLink> {
            let mut script = self.script.lock().unwrap();
            if script.failed_opens > 0 {
                script.failed_opens -= 1;
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted refusal"));
            }
            script.opens += 1;
            Ok(ScriptedLink {
                script: self.script.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::*;
    use super::*;

    #[test]
    fn scripted_link_splits_chunks_larger_than_the_buffer() {
        let (mut connector, script) = ScriptedConnector::new();
        script.lock().unwrap().reads.push_back(Step::Chunk(vec![1, 2, 3, 4, 5]));
        let mut link = connector.open("test").unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(link.recv(&mut buf, Duration::from_millis(1)).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(link.recv(&mut buf, Duration::from_millis(1)).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
    }

    #[test]
    fn tcp_bridge_round_trip() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut byte = [0u8; 1];
            peer.read_exact(&mut byte).unwrap();
            peer.write_all(&[byte[0], 0xAB]).unwrap();
        });

        let mut link = LinkConnector.open(&address).unwrap();
        assert!(matches!(link, Link::Tcp(_)));
        link.send(&[0xF0]).unwrap();
        let mut buf = [0u8; 2];
        let mut got = 0;
        while got < 2 {
            got += link.recv(&mut buf[got..], Duration::from_secs(2)).unwrap();
        }
        assert_eq!(buf, [0xF0, 0xAB]);
        link.close().unwrap();
        server.join().unwrap();
    }
}
