//! Reassembly of chunked uploads.
//!
//! Chunks of one upload arrive in order, `chunk_index` counting from 0 up to
//! `total_chunks - 1`. Chunk 0 starts a fresh buffer (dropping any earlier
//! unfinished upload of the same file); the last chunk hands back the whole
//! payload. Anything out of order aborts the upload.
//!
//! A buffer that sees no chunk for the upload timeout is dropped, and the
//! bytes buffered for one tenant may never exceed what its quota has left.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::time::Instant;

use common::uid::Uid;

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct PendingUpload {
    total: u32,
    next: u32,
    data: BytesMut,
    deadline: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("total_chunks must be at least 1")]
    NoChunks,
    #[error("chunk {index} is out of range for {total} chunks")]
    OutOfRange { index: u32, total: u32 },
    #[error("expected chunk {expected} of {uid}, got {index}")]
    OutOfOrder { uid: Uid, expected: u32, index: u32 },
    #[error("chunk count of {uid} changed from {before} to {after}")]
    TotalChanged { uid: Uid, before: u32, after: u32 },
    #[error("upload of {uid} would buffer {buffered} bytes, only {available} available")]
    TooLarge {
        uid: Uid,
        buffered: u64,
        available: u64,
    },
}

/// Upload buffers keyed by tenant and file
#[derive(Debug)]
pub struct Uploads {
    pending: Mutex<HashMap<(String, Uid), PendingUpload>>,
    timeout: Duration,
}

impl Default for Uploads {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_UPLOAD_TIMEOUT)
    }
}

impl Uploads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Feed one chunk; returns the assembled payload once the last one is in.
    ///
    /// `available` is what the tenant's quota has left; the tenant's
    /// buffered bytes including this chunk must fit in it.
    pub fn push(
        &self,
        tenant: &str,
        uid: Uid,
        index: u32,
        total: u32,
        chunk: Bytes,
        available: u64,
    ) -> Result<Option<Bytes>, UploadError> {
        if total == 0 {
            return Err(UploadError::NoChunks);
        }
        if index >= total {
            return Err(UploadError::OutOfRange { index, total });
        }

        let now = Instant::now();
        let key = (tenant.to_string(), uid);
        let mut pending = self.pending.lock();
        expire(&mut pending, now);

        if index == 0 {
            if pending.remove(&key).is_some() {
                tracing::debug!("restarting upload of {}", uid);
            }
            if total == 1 {
                return Ok(Some(chunk));
            }
        } else {
            let Some(upload) = pending.get(&key) else {
                return Err(UploadError::OutOfOrder {
                    uid,
                    expected: 0,
                    index,
                });
            };
            if upload.total != total {
                let before = upload.total;
                pending.remove(&key);
                return Err(UploadError::TotalChanged {
                    uid,
                    before,
                    after: total,
                });
            }
            if upload.next != index {
                let expected = upload.next;
                pending.remove(&key);
                return Err(UploadError::OutOfOrder {
                    uid,
                    expected,
                    index,
                });
            }
        }

        let buffered = buffered_for(&pending, tenant) + chunk.len() as u64;
        if buffered > available {
            pending.remove(&key);
            return Err(UploadError::TooLarge {
                uid,
                buffered,
                available,
            });
        }

        let deadline = now + self.timeout;
        if index == 0 {
            let data = BytesMut::from(&chunk[..]);
            pending.insert(
                key,
                PendingUpload {
                    total,
                    next: 1,
                    data,
                    deadline,
                },
            );
            return Ok(None);
        }

        let Some(upload) = pending.get_mut(&key) else {
            return Ok(None);
        };
        upload.data.extend_from_slice(&chunk);
        upload.next += 1;
        upload.deadline = deadline;
        if upload.next < upload.total {
            return Ok(None);
        }
        Ok(pending.remove(&key).map(|upload| upload.data.freeze()))
    }

    /// Drop whatever is buffered for a file
    pub fn discard(&self, tenant: &str, uid: Uid) {
        if self
            .pending
            .lock()
            .remove(&(tenant.to_string(), uid))
            .is_some()
        {
            tracing::debug!("discarded pending upload of {}", uid);
        }
    }

    pub fn in_progress(&self) -> usize {
        let mut pending = self.pending.lock();
        expire(&mut pending, Instant::now());
        pending.len()
    }
}

fn expire(pending: &mut HashMap<(String, Uid), PendingUpload>, now: Instant) {
    pending.retain(|(_, uid), upload| {
        let live = upload.deadline > now;
        if !live {
            tracing::debug!("upload of {} timed out after chunk {}", uid, upload.next);
        }
        live
    });
}

fn buffered_for(pending: &HashMap<(String, Uid), PendingUpload>, tenant: &str) -> u64 {
    pending
        .iter()
        .filter(|((owner, _), _)| owner == tenant)
        .map(|(_, upload)| upload.data.len() as u64)
        .sum()
}
