use crate::redis::replication::TcpStreamTrait;
use crossbeam_channel::{unbounded, Sender};
use std::io::Write;
use std::sync::atomic::AtomicU64;
use std::thread;

/// A connected replica. Writes are handed to an owned channel feeding a
/// dedicated writer thread rather than taken through a shared lock on the
/// socket — a replica whose TCP buffer is full stalls only its own writer
/// thread, never the client connection that produced the write.
pub struct Replica {
    #[allow(dead_code)]
    pub(crate) host: String,
    #[allow(dead_code)]
    pub(crate) port: String,
    sender: Sender<Vec<u8>>,
    pub(crate) offset: AtomicU64,
}

impl Replica {
    pub fn new(host: String, port: String, mut stream: Box<dyn TcpStreamTrait>) -> Self {
        let (tx, rx) = unbounded::<Vec<u8>>();
        let label = format!("{}:{}", host, port);
        thread::spawn(move || {
            for bytes in rx {
                if stream.write_all(&bytes).is_err() {
                    eprintln!("replication: write to replica {} failed, dropping connection", label);
                    break;
                }
            }
        });
        Self {
            host,
            port,
            sender: tx,
            offset: AtomicU64::new(0),
        }
    }

    /// Queues bytes for this replica. A replica whose writer thread has
    /// already exited (dead socket) silently drops the write, same as a
    /// peer that vanished mid-stream.
    pub fn send(&self, bytes: Vec<u8>) {
        let _ = self.sender.send(bytes);
    }
}
