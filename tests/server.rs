//! End-to-end tests: a real worker loop on an ephemeral port, driven by
//! blocking std clients.

use buffered_socket::config::{Config, ProtocolType};
use buffered_socket::runtime::mio::EventLoop;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// ============ Helpers ============

struct TestServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start(config: Config) -> Self {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = thread::spawn(move || {
            let addr = "127.0.0.1:0".parse().unwrap();
            let mut event_loop = EventLoop::bind(0, addr, &config).expect("Failed to bind");
            tx.send(event_loop.local_addr().unwrap()).unwrap();

            while !flag.load(Ordering::Relaxed) {
                event_loop
                    .run_once(Some(Duration::from_millis(10)))
                    .expect("Event loop failed");
            }
        });

        let addr = rx.recv().expect("Server did not start");
        Self {
            addr,
            stop,
            handle: Some(handle),
        }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("Failed to connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn config(protocol: ProtocolType) -> Config {
    Config {
        protocol,
        ..Config::default()
    }
}

// ============ Echo ============

#[test]
fn test_echo_roundtrip() {
    let server = TestServer::start(config(ProtocolType::Echo));
    let mut stream = server.connect();

    stream.write_all(b"hello world").unwrap();
    let mut buf = [0u8; 11];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello world");
}

#[test]
fn test_echo_half_close() {
    let server = TestServer::start(config(ProtocolType::Echo));
    let mut stream = server.connect();

    stream.write_all(b"abc").unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    let mut received = Vec::new();
    stream.read_to_end(&mut received).unwrap();
    assert_eq!(received, b"abc");
}

fn echo_large_payload(config: Config) {
    let server = TestServer::start(config);
    let mut stream = server.connect();

    let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    // the server stops reading while its output backs up, so write and
    // read concurrently
    let mut writer = stream.try_clone().unwrap();
    let sender = thread::spawn(move || {
        for chunk in payload.chunks(7919) {
            writer.write_all(chunk).unwrap();
        }
    });

    let mut received = vec![0u8; expected.len()];
    stream.read_exact(&mut received).unwrap();
    sender.join().unwrap();

    assert!(received == expected, "echoed payload differs");
}

#[test]
fn test_echo_large_payload() {
    echo_large_payload(config(ProtocolType::Echo));
}

#[test]
fn test_echo_large_payload_small_buffer() {
    echo_large_payload(Config {
        input_buffer_size: 64,
        ..config(ProtocolType::Echo)
    });
}

#[test]
fn test_echo_direct() {
    echo_large_payload(Config {
        direct: true,
        ..config(ProtocolType::Echo)
    });
}

#[test]
fn test_many_connections() {
    let server = TestServer::start(config(ProtocolType::Echo));
    let mut streams: Vec<TcpStream> = (0..16).map(|_| server.connect()).collect();

    for (i, stream) in streams.iter_mut().enumerate() {
        stream.write_all(format!("conn {i}\n").as_bytes()).unwrap();
    }
    for (i, stream) in streams.iter_mut().enumerate() {
        let expected = format!("conn {i}\n");
        let mut buf = vec![0u8; expected.len()];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, expected.as_bytes());
    }
}

// ============ Ping ============

#[test]
fn test_ping_quit() {
    let server = TestServer::start(config(ProtocolType::Ping));
    let mut stream = server.connect();

    stream
        .write_all(b"PING\r\nPING hello\r\nBOGUS\r\nQUIT\r\n")
        .unwrap();

    let mut received = Vec::new();
    stream.read_to_end(&mut received).unwrap();
    assert_eq!(
        received,
        b"PONG\r\nPONG hello\r\nERROR unknown command\r\nOK\r\n"
    );
}

#[test]
fn test_ping_split_line() {
    let server = TestServer::start(config(ProtocolType::Ping));
    let mut stream = server.connect();

    stream.write_all(b"PI").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"NG\r\n").unwrap();

    let mut buf = [0u8; 6];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"PONG\r\n");
}

#[test]
fn test_ping_line_too_long() {
    let server = TestServer::start(Config {
        input_buffer_size: 32,
        ..config(ProtocolType::Ping)
    });
    let mut stream = server.connect();

    stream.write_all(&[b'x'; 64]).unwrap();

    // the server drops the connection without a reply
    let mut received = Vec::new();
    let _ = stream.read_to_end(&mut received);
    assert!(received.is_empty());
}
