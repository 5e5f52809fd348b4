use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use keystone_kv::client_handler::ClientHandler;
use keystone_kv::redis::config::RedisConfig;
use keystone_kv::redis::core::Redis;

/// Binds a listener on an OS-assigned loopback port and spawns one worker
/// thread per accepted connection, mirroring `main`'s accept loop. Returns
/// the shared server state (so tests can assert on it directly) and the
/// address clients should connect to.
pub fn start_server(config: RedisConfig) -> (Arc<Redis>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    let redis = Arc::new(Redis::new(config));

    let redis_for_accept = Arc::clone(&redis);
    thread::spawn(move || {
        for incoming in listener.incoming() {
            match incoming {
                Ok(stream) => {
                    let redis = Arc::clone(&redis_for_accept);
                    thread::spawn(move || {
                        ClientHandler::new(Box::new(stream), redis).run();
                    });
                }
                Err(_) => break,
            }
        }
    });

    (redis, addr)
}

/// Connects a plain client socket to a server started by [`start_server`].
pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect to test server");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

/// Sends raw bytes and reads back whatever the server replies within the
/// socket's read timeout. Good enough for the small single-frame replies
/// exercised in these tests — a reply that spans more than one `read` would
/// need a real decoder, which the codec's own unit tests already cover.
pub fn roundtrip(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    use std::io::{Read, Write};
    stream.write_all(request).unwrap();
    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).expect("read reply");
    buf.truncate(n);
    buf
}

pub fn encode_command(parts: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend(format!("${}\r\n{}\r\n", part.len(), part).into_bytes());
    }
    out
}
