use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose;
use base64::Engine;
use rand::Rng;

use crate::redis::commands::RedisCommand;
use crate::redis::config::RedisConfig;
use crate::redis::rdb;
use crate::redis::replication::ReplicationManager;
use crate::redis::storage::{Storage, StreamEntry};
use crate::redis::xread;
use crate::resp::RespValue;

/// Hardcoded rather than generated: nothing in this server's lifetime ever
/// needs to tell two masters apart, and a fixed ID keeps replica handshakes
/// reproducible in tests.
pub const REPLICATION_ID: &str = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";

const EMPTY_RDB_BASE64: &str =
    "UkVESVMwMDEx+glyZWRpcy12ZXIFNy4yLjD6CnJlZGlzLWJpdHPAQPoFY3RpbWXCbQi8ZfoIdXNlZC1tZW3CsMQQAPoIYW9mLWJhc2XAAP/wbjv+wP9aog==";

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// The shared server state: keyspace, stream storage, and everything needed
/// to act as a replication master. One instance is built at startup and
/// handed to every connection's worker thread behind an `Arc`.
pub struct Redis {
    pub config: RedisConfig,
    pub storage: Storage,
    pub replication: ReplicationManager,
    write_ops: AtomicU64,
}

impl Redis {
    pub fn new(config: RedisConfig) -> Self {
        let redis = Redis {
            config,
            storage: Storage::new(),
            replication: ReplicationManager::new(),
            write_ops: AtomicU64::new(0),
        };
        redis.load_rdb();
        redis
    }

    fn load_rdb(&self) {
        let path = Path::new(&self.config.dir).join(&self.config.dbfilename);
        match rdb::load(&path) {
            Ok(entries) => {
                let now = now_ms();
                for entry in entries {
                    if let Some(exp) = entry.expires_at_ms {
                        if exp <= now {
                            continue;
                        }
                        self.storage.set(&entry.key, &entry.value, Some(exp - now));
                    } else {
                        self.storage.set(&entry.key, &entry.value, None);
                    }
                }
            }
            Err(e) => eprintln!("redis: failed to load RDB snapshot from {:?}: {}", path, e),
        }
    }

    /// The minimal empty-database payload sent as the RDB bulk in a
    /// PSYNC full resync. This server never persists, so every resync
    /// hands the replica the same fixed snapshot and then streams
    /// individual writes from that point on.
    pub fn empty_rdb_bytes() -> Vec<u8> {
        general_purpose::STANDARD
            .decode(EMPTY_RDB_BASE64)
            .expect("embedded RDB payload is valid base64")
    }

    /// Executes a command from a genuine client connection. Writes are
    /// propagated to attached replicas (by forwarding the exact bytes the
    /// client sent) after being applied locally.
    pub fn execute(&self, cmd: &RedisCommand, raw: &[u8]) -> RespValue {
        let reply = self.run(cmd);
        if is_write(cmd) {
            self.write_ops.fetch_add(1, Ordering::SeqCst);
            self.replication.enqueue_for_replication(raw);
        }
        reply
    }

    /// Applies a command relayed from our own master. Never re-propagates:
    /// this server doesn't chain replication past one hop.
    pub fn apply_replicated(&self, cmd: &RedisCommand) -> RespValue {
        self.run(cmd)
    }

    fn run(&self, cmd: &RedisCommand) -> RespValue {
        match cmd {
            RedisCommand::Ping => RespValue::Simple("PONG".to_string()),
            RedisCommand::Echo(s) => RespValue::bulk(s.clone()),
            RedisCommand::Get(key) => match self.storage.get(key) {
                Ok(Some(v)) => RespValue::bulk(v),
                Ok(None) => RespValue::NullBulk,
                Err(e) => RespValue::error(e),
            },
            RedisCommand::Set { key, value, px_ms } => {
                self.storage.set(key, value, *px_ms);
                RespValue::ok()
            }
            RedisCommand::Incr(key) => match self.storage.incr(key) {
                Ok(v) => RespValue::Integer(v),
                Err(e) => RespValue::error(e),
            },
            RedisCommand::Type(key) => RespValue::Simple(self.storage.type_of(key).to_string()),
            RedisCommand::Keys(pattern) => RespValue::array_of_bulks(self.storage.keys(pattern)),
            RedisCommand::Config { subcommand, parameter } => self.run_config(subcommand, parameter),
            RedisCommand::Info(section) => self.run_info(section),
            RedisCommand::XAdd { key, id_spec, fields } => {
                match self.storage.xadd(key, id_spec, fields.clone()) {
                    Ok(id) => RespValue::bulk(id),
                    Err(e) => RespValue::error(e),
                }
            }
            RedisCommand::XRange { key, start, end } => match self.storage.xrange(key, start, end) {
                Ok(entries) => encode_entries(entries),
                Err(e) => RespValue::error(e),
            },
            RedisCommand::XRead { keys, ids, block_ms, count } => {
                match xread::execute(&self.storage, keys, ids, *block_ms, *count) {
                    Ok(results) if results.is_empty() => RespValue::NullArray,
                    Ok(results) => RespValue::Array(
                        results
                            .into_iter()
                            .map(|(key, entries)| RespValue::Array(vec![RespValue::bulk(key), encode_entries(entries)]))
                            .collect(),
                    ),
                    Err(e) => RespValue::error(e),
                }
            }
            RedisCommand::ReplconfCapa => RespValue::ok(),
            RedisCommand::ReplconfGetAck => RespValue::Array(vec![
                RespValue::bulk("REPLCONF"),
                RespValue::bulk("ACK"),
                RespValue::bulk(self.replication.get_replication_offset().to_string()),
            ]),
            RedisCommand::Wait { num_replicas, timeout_ms } => self.run_wait(*num_replicas, *timeout_ms),
            RedisCommand::Multi
            | RedisCommand::Exec
            | RedisCommand::Discard
            | RedisCommand::Psync
            | RedisCommand::ReplconfListeningPort(_)
            | RedisCommand::ReplconfAck(_) => {
                RespValue::error("ERR this command must be handled by the connection, not dispatched here")
            }
        }
    }

    fn run_config(&self, subcommand: &str, parameter: &str) -> RespValue {
        match subcommand {
            "GET" => match parameter {
                "dir" => RespValue::array_of_bulks([parameter.to_string(), self.config.dir.clone()]),
                "dbfilename" => RespValue::array_of_bulks([parameter.to_string(), self.config.dbfilename.clone()]),
                _ => RespValue::Array(Vec::new()),
            },
            other => RespValue::error(format!("ERR unknown CONFIG subcommand '{}'", other)),
        }
    }

    fn run_info(&self, _section: &str) -> RespValue {
        let body = if self.config.is_replica() {
            format!(
                "role:slave\r\nmaster_host:{}\r\nmaster_port:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}\r\n",
                self.config.replicaof_host.as_deref().unwrap_or(""),
                self.config.replicaof_port.as_deref().unwrap_or(""),
                REPLICATION_ID,
                self.replication.get_replication_offset(),
            )
        } else {
            format!(
                "role:master\r\nmaster_replid:{}\r\nmaster_repl_offset:{}\r\nconnected_slaves:{}\r\n",
                REPLICATION_ID,
                self.replication.get_replication_offset(),
                self.replication.replica_count(),
            )
        };
        RespValue::bulk(body)
    }

    /// Blocks up to `timeout_ms` (0 meaning indefinitely) for at least
    /// `num_replicas` replicas to ack the replication offset as it stood
    /// when WAIT was issued. If nothing has ever been propagated, every
    /// replica is trivially caught up, so we answer immediately.
    fn run_wait(&self, num_replicas: i64, timeout_ms: i64) -> RespValue {
        if num_replicas == 0 {
            return RespValue::Integer(0);
        }

        let target_offset = self.replication.get_replication_offset();
        if self.write_ops.load(Ordering::SeqCst) == 0 {
            return RespValue::Integer(self.replication.replica_count() as i64);
        }

        let deadline = if timeout_ms <= 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
        };

        self.replication.request_acks();
        loop {
            let acked = self.replication.count_up_to_date_replicas(target_offset);
            let timed_out = deadline.map(|d| Instant::now() >= d).unwrap_or(false);
            if acked >= num_replicas as usize || timed_out {
                return RespValue::Integer(acked as i64);
            }
            thread::sleep(Duration::from_millis(40 + rand::thread_rng().gen_range(0..20)));
            self.replication.request_acks();
        }
    }
}

fn is_write(cmd: &RedisCommand) -> bool {
    matches!(
        cmd,
        RedisCommand::Set { .. } | RedisCommand::Incr(_) | RedisCommand::XAdd { .. }
    )
}

fn encode_entries(entries: Vec<StreamEntry>) -> RespValue {
    RespValue::Array(
        entries
            .into_iter()
            .map(|e| {
                let mut flat = Vec::with_capacity(e.fields.len() * 2);
                for (k, v) in e.fields {
                    flat.push(k);
                    flat.push(v);
                }
                RespValue::Array(vec![RespValue::bulk(e.id), RespValue::array_of_bulks(flat)])
            })
            .collect(),
    )
}
