use std::io::{Read, Write};
use std::sync::Arc;

use bytes::BytesMut;

use crate::redis::commands::{self, RedisCommand};
use crate::redis::core::{Redis, REPLICATION_ID};
use crate::redis::replication::TcpStreamTrait;
use crate::resp::{decode_command, RespValue};

/// One worker per connection. Owns the socket for the connection's lifetime
/// and drives the decode/dispatch/reply loop: per-connection transaction
/// queue, and — if the peer turns out to be a replica issuing PSYNC — the
/// master-side handshake that hands future writes off to the replication
/// registry instead of this connection's own reply path.
pub struct ClientHandler {
    stream: Box<dyn TcpStreamTrait>,
    redis: Arc<Redis>,
    queuing: bool,
    queued: Vec<(RedisCommand, Vec<u8>)>,
    listening_port: Option<String>,
    replica_key: Option<String>,
}

impl ClientHandler {
    pub fn new(stream: Box<dyn TcpStreamTrait>, redis: Arc<Redis>) -> Self {
        ClientHandler {
            stream,
            redis,
            queuing: false,
            queued: Vec::new(),
            listening_port: None,
            replica_key: None,
        }
    }

    /// Runs the connection to completion: decode, dispatch, reply, repeat
    /// until the peer disconnects or sends a frame that fails to parse.
    pub fn run(mut self) {
        let mut buf = BytesMut::new();
        let mut chunk = [0u8; 4096];

        'read: loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    loop {
                        match decode_command(&mut buf) {
                            Ok(Some(decoded)) => {
                                if decoded.args.is_empty() {
                                    continue;
                                }
                                if !self.dispatch(decoded.args, decoded.raw) {
                                    break 'read;
                                }
                            }
                            Ok(None) => break,
                            Err(()) => {
                                eprintln!("client: malformed frame, closing connection");
                                break 'read;
                            }
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }

        if let Some(key) = self.replica_key.take() {
            self.redis.replication.remove_replica(&key);
        }
    }

    /// Handles one decoded command. Returns `false` if the connection should
    /// be closed (a write failed — the peer is gone either way).
    fn dispatch(&mut self, args: Vec<Vec<u8>>, raw: Vec<u8>) -> bool {
        let cmd = match commands::parse(&args) {
            Ok(cmd) => cmd,
            Err(e) => return self.reply(&RespValue::error(e)),
        };

        match cmd {
            RedisCommand::Multi => {
                let reply = if self.queuing {
                    RespValue::error("ERR MULTI calls can not be nested")
                } else {
                    self.queuing = true;
                    self.queued.clear();
                    RespValue::ok()
                };
                self.reply(&reply)
            }
            RedisCommand::Exec => {
                if !self.queuing {
                    return self.reply(&RespValue::error("ERR EXEC without MULTI"));
                }
                self.queuing = false;
                let queued = std::mem::take(&mut self.queued);
                let replies = queued
                    .into_iter()
                    .map(|(cmd, raw)| self.redis.execute(&cmd, &raw))
                    .collect();
                self.reply(&RespValue::Array(replies))
            }
            RedisCommand::Discard => {
                let reply = if !self.queuing {
                    RespValue::error("ERR DISCARD without MULTI")
                } else {
                    self.queuing = false;
                    self.queued.clear();
                    RespValue::ok()
                };
                self.reply(&reply)
            }
            other if self.queuing => {
                self.queued.push((other, raw));
                self.reply(&RespValue::Simple("QUEUED".to_string()))
            }
            RedisCommand::Psync => self.handle_psync(),
            RedisCommand::ReplconfListeningPort(port) => {
                self.listening_port = Some(port);
                self.reply(&RespValue::ok())
            }
            RedisCommand::ReplconfAck(offset) => {
                if let Some(key) = &self.replica_key {
                    self.redis.replication.update_replica_offset(key, offset);
                }
                true
            }
            other => {
                let reply = self.redis.execute(&other, &raw);
                self.reply(&reply)
            }
        }
    }

    /// Master-side full resync: reply with `+FULLRESYNC`, then the RDB
    /// payload framed without its trailing CRLF (the one deliberate
    /// deviation from ordinary bulk-string framing in this protocol), then
    /// hand a cloned socket to the replica registry so future propagation
    /// bypasses this connection's own read/reply loop entirely.
    fn handle_psync(&mut self) -> bool {
        if !self.reply_raw(format!("+FULLRESYNC {} 0\r\n", REPLICATION_ID).as_bytes()) {
            return false;
        }
        let rdb = Redis::empty_rdb_bytes();
        if !self.reply_raw(format!("${}\r\n", rdb.len()).as_bytes()) {
            return false;
        }
        if !self.reply_raw(&rdb) {
            return false;
        }

        let host = self
            .stream
            .peer_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let port = self.listening_port.clone().unwrap_or_else(|| "0".to_string());

        match self.stream.try_clone() {
            Ok(clone) => {
                self.replica_key = Some(format!("{}:{}", host, port));
                self.redis.replication.add_replica(host, port, clone);
                true
            }
            Err(e) => {
                eprintln!("client: failed to clone socket for replica registration: {}", e);
                false
            }
        }
    }

    fn reply(&mut self, value: &RespValue) -> bool {
        self.reply_raw(&value.encode())
    }

    fn reply_raw(&mut self, bytes: &[u8]) -> bool {
        if self.stream.write_all(bytes).is_err() {
            return false;
        }
        self.stream.flush().is_ok()
    }
}
