use crate::redis::storage::{parse_stream_id, Storage, StreamEntry};
use std::time::{Duration, Instant};

/// Runs one XREAD, blocking the calling thread if requested and nothing is
/// immediately available. Returns the per-stream entries found, in request
/// order, omitting any stream that matched nothing. An empty result means
/// the caller should reply with a nil array.
pub fn execute(
    storage: &Storage,
    keys: &[String],
    ids: &[String],
    block_ms: Option<u64>,
    count: Option<usize>,
) -> Result<Vec<(String, Vec<StreamEntry>)>, String> {
    let mut after = Vec::with_capacity(keys.len());
    for id in ids {
        after.push(if id == "$" {
            None // resolved against each stream's own last id just before the first read
        } else {
            Some(parse_stream_id(id)?)
        });
    }

    let resolve = |after: &[Option<(u64, u64)>]| -> Vec<(u64, u64)> {
        keys.iter()
            .zip(after.iter())
            .map(|(k, a)| a.unwrap_or_else(|| storage.last_stream_id(k)))
            .collect()
    };

    let collect = |bounds: &[(u64, u64)]| -> Result<Vec<(String, Vec<StreamEntry>)>, String> {
        let mut out = Vec::new();
        for (key, bound) in keys.iter().zip(bounds.iter()) {
            let entries = storage.entries_after(key, *bound, count)?;
            if !entries.is_empty() {
                out.push((key.clone(), entries));
            }
        }
        Ok(out)
    };

    let bounds = resolve(&after);
    let first = collect(&bounds)?;
    if !first.is_empty() || block_ms.is_none() {
        return Ok(first);
    }

    let deadline = match block_ms {
        Some(0) => None,
        Some(ms) => Some(Instant::now() + Duration::from_millis(ms)),
        None => unreachable!(),
    };

    loop {
        storage.wait_for_new_entry(deadline);
        let found = collect(&bounds)?;
        if !found.is_empty() {
            return Ok(found);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
        }
    }
}
