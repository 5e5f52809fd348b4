use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Clone)]
enum ValueWrapper {
    Str {
        value: String,
        expires_at_ms: Option<u128>,
    },
    Stream {
        entries: Vec<StreamEntry>,
        last_id: (u64, u64),
    },
}

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis()
}

/// The keyspace and stream store. Reads and writes are safe to call
/// concurrently from any connection's worker thread; the stream side
/// additionally exposes a condition variable so blocking XREAD can wait for
/// new entries instead of polling.
pub struct Storage {
    data: DashMap<String, ValueWrapper>,
    new_entry: Condvar,
    generation: Mutex<u64>,
    /// The most recently assigned stream ID across all streams, used as the
    /// tie-break reference `L` for XADD ID generation (see `generate_id`) —
    /// not a per-stream value, so two different streams' auto-generated IDs
    /// stay ordered relative to each other the same way they would within
    /// one stream.
    global_last_id: Mutex<(u64, u64)>,
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            data: DashMap::new(),
            new_entry: Condvar::new(),
            generation: Mutex::new(0),
            global_last_id: Mutex::new((0, 0)),
        }
    }

    // --- strings ---

    pub fn set(&self, key: &str, value: &str, px_ms: Option<u64>) {
        let expires_at_ms = px_ms.map(|ms| now_ms() + ms as u128);
        self.data.insert(
            key.to_string(),
            ValueWrapper::Str {
                value: value.to_string(),
                expires_at_ms,
            },
        );
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, String> {
        let expired = match self.data.get(key) {
            Some(entry) => match entry.value() {
                ValueWrapper::Str {
                    expires_at_ms: Some(exp),
                    ..
                } => now_ms() >= *exp,
                ValueWrapper::Str { .. } => false,
                ValueWrapper::Stream { .. } => return Err(WRONGTYPE.to_string()),
            },
            None => return Ok(None),
        };
        if expired {
            self.data.remove(key);
            return Ok(None);
        }
        match self.data.get(key) {
            Some(entry) => match entry.value() {
                ValueWrapper::Str { value, .. } => Ok(Some(value.clone())),
                ValueWrapper::Stream { .. } => Err(WRONGTYPE.to_string()),
            },
            None => Ok(None),
        }
    }

    pub fn incr(&self, key: &str) -> Result<i64, String> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occ) => match occ.get_mut() {
                ValueWrapper::Str {
                    value,
                    expires_at_ms,
                } => {
                    if matches!(expires_at_ms, Some(exp) if now_ms() >= *exp) {
                        *value = "0".to_string();
                        *expires_at_ms = None;
                    }
                    let current: i64 = value
                        .parse()
                        .map_err(|_| "ERR value is not an integer or out of range".to_string())?;
                    let next = current
                        .checked_add(1)
                        .ok_or_else(|| "ERR value is not an integer or out of range".to_string())?;
                    *value = next.to_string();
                    Ok(next)
                }
                ValueWrapper::Stream { .. } => Err(WRONGTYPE.to_string()),
            },
            Entry::Vacant(vac) => {
                vac.insert(ValueWrapper::Str {
                    value: "1".to_string(),
                    expires_at_ms: None,
                });
                Ok(1)
            }
        }
    }

    pub fn type_of(&self, key: &str) -> &'static str {
        match self.data.get(key) {
            Some(entry) => match entry.value() {
                ValueWrapper::Stream { .. } => "stream",
                ValueWrapper::Str { expires_at_ms, .. } => {
                    if matches!(expires_at_ms, Some(exp) if now_ms() >= *exp) {
                        "none"
                    } else {
                        "string"
                    }
                }
            },
            None => "none",
        }
    }

    /// Only `*` (all keys) and an exact match are supported; that is all the
    /// curated command surface ever asks for.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let now = now_ms();
        self.data
            .iter()
            .filter(|entry| match entry.value() {
                ValueWrapper::Str {
                    expires_at_ms: Some(exp),
                    ..
                } => now < *exp,
                _ => true,
            })
            .map(|entry| entry.key().clone())
            .filter(|k| pattern == "*" || k == pattern)
            .collect()
    }

    // --- streams ---

    pub fn xadd(
        &self,
        key: &str,
        id_spec: &str,
        fields: Vec<(String, String)>,
    ) -> Result<String, String> {
        let mut global_last_id = self.global_last_id.lock().unwrap();
        let assigned = match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occ) => match occ.get_mut() {
                ValueWrapper::Stream { entries, last_id } => {
                    let id = generate_id(id_spec, *global_last_id, !entries.is_empty())?;
                    *last_id = id;
                    entries.push(StreamEntry {
                        id: format_id(id),
                        fields,
                    });
                    id
                }
                ValueWrapper::Str { .. } => return Err(WRONGTYPE.to_string()),
            },
            Entry::Vacant(vac) => {
                let id = generate_id(id_spec, *global_last_id, false)?;
                vac.insert(ValueWrapper::Stream {
                    entries: vec![StreamEntry {
                        id: format_id(id),
                        fields,
                    }],
                    last_id: id,
                });
                id
            }
        };
        *global_last_id = assigned;
        drop(global_last_id);
        {
            let mut generation = self.generation.lock().unwrap();
            *generation = generation.wrapping_add(1);
        }
        self.new_entry.notify_all();
        Ok(format_id(assigned))
    }

    pub fn xrange(&self, key: &str, start: &str, end: &str) -> Result<Vec<StreamEntry>, String> {
        let from = parse_range_bound(start, true)?;
        let to = parse_range_bound(end, false)?;
        match self.data.get(key) {
            Some(entry) => match entry.value() {
                ValueWrapper::Stream { entries, .. } => Ok(entries
                    .iter()
                    .filter(|e| {
                        let id = parse_stream_id(&e.id).expect("stored stream ids are well-formed");
                        id >= from && id <= to
                    })
                    .cloned()
                    .collect()),
                ValueWrapper::Str { .. } => Err(WRONGTYPE.to_string()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Entries strictly after `after`, for a non-blocking or just-woken XREAD.
    pub fn entries_after(
        &self,
        key: &str,
        after: (u64, u64),
        count: Option<usize>,
    ) -> Result<Vec<StreamEntry>, String> {
        let matched = match self.data.get(key) {
            Some(entry) => match entry.value() {
                ValueWrapper::Stream { entries, .. } => entries
                    .iter()
                    .filter(|e| {
                        parse_stream_id(&e.id)
                            .map(|id| id > after)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect::<Vec<_>>(),
                ValueWrapper::Str { .. } => return Err(WRONGTYPE.to_string()),
            },
            None => Vec::new(),
        };
        Ok(match count {
            Some(n) => matched.into_iter().take(n).collect(),
            None => matched,
        })
    }

    pub fn last_stream_id(&self, key: &str) -> (u64, u64) {
        match self.data.get(key) {
            Some(entry) => match entry.value() {
                ValueWrapper::Stream { last_id, .. } => *last_id,
                ValueWrapper::Str { .. } => (0, 0),
            },
            None => (0, 0),
        }
    }

    /// Blocks the calling thread until another thread appends a stream entry,
    /// or until `deadline` passes (`None` means wait indefinitely).
    pub fn wait_for_new_entry(&self, deadline: Option<Instant>) {
        let guard = self.generation.lock().unwrap();
        match deadline {
            None => {
                let _ = self.new_entry.wait(guard);
            }
            Some(deadline) => {
                let now = Instant::now();
                if deadline > now {
                    let _ = self.new_entry.wait_timeout(guard, deadline - now);
                }
            }
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

fn format_id(id: (u64, u64)) -> String {
    format!("{}-{}", id.0, id.1)
}

/// Parses a stream ID token as used by XREAD's from-id list: `ms-seq`, a bare
/// `ms` (sequence defaults to 0), or the `$` sentinel (resolved by the caller
/// against the stream's current last ID; represented here as `(u64::MAX, 0)`
/// so an un-resolved `$` naturally compares greater than any real entry).
pub fn parse_stream_id(s: &str) -> Result<(u64, u64), String> {
    if s == "$" {
        return Ok((u64::MAX, 0));
    }
    if let Some((ms, seq)) = s.split_once('-') {
        let ms: u64 = ms
            .parse()
            .map_err(|_| "ERR Invalid stream ID specified as stream command argument".to_string())?;
        let seq: u64 = seq
            .parse()
            .map_err(|_| "ERR Invalid stream ID specified as stream command argument".to_string())?;
        Ok((ms, seq))
    } else {
        let ms: u64 = s
            .parse()
            .map_err(|_| "ERR Invalid stream ID specified as stream command argument".to_string())?;
        Ok((ms, 0))
    }
}

fn parse_range_bound(s: &str, is_start: bool) -> Result<(u64, u64), String> {
    if s == "-" {
        return Ok((0, 0));
    }
    if s == "+" {
        return Ok((u64::MAX, u64::MAX));
    }
    if let Some((ms, seq)) = s.split_once('-') {
        let ms: u64 = ms
            .parse()
            .map_err(|_| "ERR Invalid stream ID specified as stream command argument".to_string())?;
        let seq: u64 = seq
            .parse()
            .map_err(|_| "ERR Invalid stream ID specified as stream command argument".to_string())?;
        Ok((ms, seq))
    } else {
        let ms: u64 = s
            .parse()
            .map_err(|_| "ERR Invalid stream ID specified as stream command argument".to_string())?;
        Ok((ms, if is_start { 0 } else { u64::MAX }))
    }
}

fn generate_id(spec: &str, last: (u64, u64), stream_nonempty: bool) -> Result<(u64, u64), String> {
    if spec == "*" {
        let ms = now_ms() as u64;
        return Ok(if stream_nonempty && ms <= last.0 {
            (last.0, last.1 + 1)
        } else {
            (ms, 0)
        });
    }
    if let Some(ms_part) = spec.strip_suffix("-*") {
        let ms: u64 = ms_part
            .parse()
            .map_err(|_| "ERR Invalid stream ID specified as stream command argument".to_string())?;
        if !stream_nonempty {
            return Ok(if ms == 0 { (0, 1) } else { (ms, 0) });
        }
        return match ms.cmp(&last.0) {
            std::cmp::Ordering::Greater => Ok((ms, 0)),
            std::cmp::Ordering::Equal => Ok((ms, last.1 + 1)),
            std::cmp::Ordering::Less => Err(
                "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                    .to_string(),
            ),
        };
    }
    let id = parse_stream_id(spec)?;
    if id == (0, 0) {
        return Err("ERR The ID specified in XADD must be greater than 0-0".to_string());
    }
    if id <= last {
        return Err(
            "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                .to_string(),
        );
    }
    Ok(id)
}
