use crate::redis::replica::Replica;
use std::collections::HashMap;
use std::io::{Read, Result, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

pub trait TcpStreamTrait: Read + Write + Send + 'static {
    fn peer_addr(&self) -> Result<SocketAddr>;
    fn try_clone(&self) -> Result<Box<dyn TcpStreamTrait>>;
}

impl TcpStreamTrait for std::net::TcpStream {
    fn peer_addr(&self) -> Result<SocketAddr> {
        std::net::TcpStream::peer_addr(self)
    }

    fn try_clone(&self) -> Result<Box<dyn TcpStreamTrait>> {
        Ok(Box::new(std::net::TcpStream::try_clone(self)?))
    }
}

/// Tracks every replica currently attached to this master and the byte
/// offset of everything propagated so far. Each replica owns its own
/// writer thread (see [`Replica`]), so a stalled replica socket never
/// blocks the client connection whose write is being propagated.
pub struct ReplicationManager {
    replicas: Mutex<HashMap<String, Replica>>,
    replication_offset: AtomicU64,
    enqueue_getack: AtomicBool,
}

impl ReplicationManager {
    pub fn new() -> Self {
        ReplicationManager {
            replicas: Mutex::new(HashMap::new()),
            replication_offset: AtomicU64::new(0),
            enqueue_getack: AtomicBool::new(false),
        }
    }

    pub fn add_replica(&self, host: String, port: String, stream: Box<dyn TcpStreamTrait>) {
        let replica_key = format!("{}:{}", host, port);
        let replica = Replica::new(host, port, stream);
        self.replicas.lock().unwrap().insert(replica_key, replica);
    }

    pub fn remove_replica(&self, replica_key: &str) {
        self.replicas.lock().unwrap().remove(replica_key);
    }

    /// Fans `command` out to every attached replica and advances the
    /// replication offset by its length. `command` must be the exact bytes
    /// a replica should replay, RESP framing included.
    pub fn enqueue_for_replication(&self, command: &[u8]) {
        self.replication_offset.fetch_add(command.len() as u64, Ordering::SeqCst);
        for replica in self.replicas.lock().unwrap().values() {
            replica.send(command.to_vec());
        }
        if self.enqueue_getack.swap(false, Ordering::SeqCst) {
            self.broadcast_getack_locked();
        }
    }

    fn broadcast_getack_locked(&self) {
        let bytes = crate::resp::encode_command(&[b"REPLCONF", b"GETACK", b"*"]);
        for replica in self.replicas.lock().unwrap().values() {
            replica.send(bytes.clone());
        }
    }

    pub fn update_replica_offset(&self, replica_key: &str, offset: u64) {
        if let Some(replica) = self.replicas.lock().unwrap().get(replica_key) {
            replica.offset.store(offset, Ordering::SeqCst);
        }
    }

    pub fn get_replication_offset(&self) -> u64 {
        self.replication_offset.load(Ordering::SeqCst)
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.lock().unwrap().len()
    }

    /// Replicas whose acked offset is at least `target_offset`. WAIT calls
    /// this with the replication offset as it stood when WAIT was issued.
    pub fn count_up_to_date_replicas(&self, target_offset: u64) -> usize {
        self.replicas
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.offset.load(Ordering::SeqCst) >= target_offset)
            .count()
    }

    pub fn should_send_getack(&self) -> bool {
        self.enqueue_getack.load(Ordering::SeqCst)
    }

    pub fn set_enqueue_getack(&self, value: bool) {
        self.enqueue_getack.store(value, Ordering::SeqCst)
    }

    /// Immediately asks every replica to report its offset. Used by WAIT
    /// when it needs a fresher ack than whatever was last received.
    pub fn request_acks(&self) {
        self.broadcast_getack_locked();
    }
}
