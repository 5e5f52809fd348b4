use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::redis::commands::{self, RedisCommand};
use crate::redis::core::Redis;
use crate::resp::{decode_command, encode_command, RespValue};

/// Runs the replica side of the replication handshake, then consumes
/// commands relayed by the master for the lifetime of the process. Spawned
/// once at startup when `--replicaof` is configured; a handshake failure is
/// logged and this worker simply exits — the process continues serving as
/// an unreplicated master rather than aborting.
pub fn run(redis: Arc<Redis>) {
    let host = match &redis.config.replicaof_host {
        Some(h) => h.clone(),
        None => return,
    };
    let port = redis.config.replicaof_port.clone().unwrap_or_else(|| "6379".to_string());
    let addr = format!("{}:{}", host, port);

    let stream = match TcpStream::connect(&addr) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("replica: failed to connect to master at {}: {}", addr, e);
            return;
        }
    };

    let mut io = HandshakeIo::new(stream);
    if let Err(e) = handshake(&mut io, &redis.config.port) {
        eprintln!("replica: handshake with master {} failed: {}; continuing unreplicated", addr, e);
        return;
    }

    println!("replica: handshake with master {} complete, consuming replication stream", addr);
    consume(io, redis);
}

fn handshake(io: &mut HandshakeIo, own_port: &str) -> Result<(), String> {
    io.send(&[b"PING"])?;
    io.expect_simple("PONG")?;

    io.send(&[b"REPLCONF", b"listening-port", own_port.as_bytes()])?;
    io.expect_simple("OK")?;

    io.send(&[b"REPLCONF", b"capa", b"psync2"])?;
    io.expect_simple("OK")?;

    io.send(&[b"PSYNC", b"?", b"-1"])?;
    let line = io.read_line()?;
    if !line.starts_with("+FULLRESYNC") {
        return Err(format!("unexpected PSYNC reply: {}", line));
    }

    io.read_rdb_payload()?;
    Ok(())
}

/// Consumes RESP arrays relayed by the master for as long as the connection
/// stays up. Every command is applied silently except `REPLCONF GETACK *`,
/// which is answered with the replica's current ack offset. The offset
/// advances by the byte length of each command's own encoding, counted
/// after the reply (if any) for that command is sent.
fn consume(io: HandshakeIo, redis: Arc<Redis>) {
    let HandshakeIo { mut stream, mut buf } = io;
    let mut ack_offset: u64 = 0;
    let mut chunk = [0u8; 4096];

    loop {
        match decode_command(&mut buf) {
            Ok(Some(decoded)) => {
                if decoded.args.is_empty() {
                    continue;
                }
                let len = decoded.raw.len() as u64;
                match commands::parse(&decoded.args) {
                    Ok(RedisCommand::ReplconfGetAck) => {
                        let reply = RespValue::Array(vec![
                            RespValue::bulk("REPLCONF"),
                            RespValue::bulk("ACK"),
                            RespValue::bulk(ack_offset.to_string()),
                        ]);
                        if stream.write_all(&reply.encode()).is_err() {
                            eprintln!("replica: failed to send ACK to master, abandoning replication");
                            return;
                        }
                    }
                    Ok(cmd) => {
                        redis.apply_replicated(&cmd);
                    }
                    Err(e) => {
                        eprintln!("replica: failed to parse command relayed by master: {}", e);
                    }
                }
                ack_offset += len;
            }
            Ok(None) => match stream.read(&mut chunk) {
                Ok(0) => {
                    eprintln!("replica: master closed the replication connection");
                    return;
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    eprintln!("replica: read error from master: {}", e);
                    return;
                }
            },
            Err(()) => {
                eprintln!("replica: malformed frame from master, abandoning replication");
                return;
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Small buffered reader/writer over the master connection used only during
/// the handshake, where replies are simple strings (and one payload framed
/// without a trailing CRLF) rather than ordinary decoder frames. Ownership
/// of the stream and any bytes already buffered past the handshake hands off
/// to [`consume`] afterwards so no byte read from the master is ever lost.
struct HandshakeIo {
    stream: TcpStream,
    buf: BytesMut,
}

impl HandshakeIo {
    fn new(stream: TcpStream) -> Self {
        HandshakeIo { stream, buf: BytesMut::new() }
    }

    fn send(&mut self, parts: &[&[u8]]) -> Result<(), String> {
        self.stream.write_all(&encode_command(parts)).map_err(|e| e.to_string())
    }

    fn fill(&mut self) -> Result<(), String> {
        let mut chunk = [0u8; 512];
        let n = self.stream.read(&mut chunk).map_err(|e| e.to_string())?;
        if n == 0 {
            return Err("master closed the connection".to_string());
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, String> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf.split_to(pos);
                self.buf.advance(2);
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            self.fill()?;
        }
    }

    fn expect_simple(&mut self, expected: &str) -> Result<(), String> {
        let line = self.read_line()?;
        if line.trim_start_matches('+') == expected {
            Ok(())
        } else {
            Err(format!("expected +{}, got {}", expected, line))
        }
    }

    /// Reads the `$<len>\r\n<bytes>` RDB payload sent after `+FULLRESYNC`.
    /// No trailing CRLF follows the payload — the one deviation from
    /// ordinary bulk-string framing this protocol makes.
    fn read_rdb_payload(&mut self) -> Result<Vec<u8>, String> {
        let header = self.read_line()?;
        let len: usize = header
            .trim_start_matches('$')
            .parse()
            .map_err(|_| format!("invalid RDB payload header: {}", header))?;
        while self.buf.len() < len {
            self.fill()?;
        }
        Ok(self.buf.split_to(len).to_vec())
    }
}
