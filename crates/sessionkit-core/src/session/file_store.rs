use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::util::{ensure_dir, record_digest};

use super::store::Store;
use super::{deadline, Session};

/// Directory used when no path is given.
pub const DEFAULT_DIR: &str = "session";

const RECORD_EXT: &str = "json";
const STRIPES: usize = 64;

type Stripes = Arc<Vec<Mutex<()>>>;

/// Lock stripes for a directory, shared by every handle opened on it in this process.
fn stripes_for(dir: &Path) -> Stripes {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Stripes>>> = OnceLock::new();
    let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let mut registry = REGISTRY
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    registry
        .entry(key)
        .or_insert_with(|| Arc::new((0..STRIPES).map(|_| Mutex::new(())).collect()))
        .clone()
}

/// On-disk form of a session: the record plus its expiry policy.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    #[serde(flatten)]
    session: Session,
    /// TTL in milliseconds, 0 for no expiry.
    ttl_ms: u64,
    expires: Option<DateTime<Utc>>,
}

impl StoredSession {
    fn new(session: Session, ttl: Duration) -> Self {
        let expires = session.deadline(ttl);
        let ttl_ms = if ttl.is_zero() {
            0
        } else {
            u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
        };
        Self {
            session,
            ttl_ms,
            expires,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|e| e <= now)
    }

    fn touch(&mut self) {
        self.session.touch();
        self.expires = deadline(self.session.tstamp(), Duration::from_millis(self.ttl_ms));
    }
}

/// Session store keeping one JSON file per session.
///
/// Files are named after the SHA-256 of the session ID and replaced
/// atomically. Writers on the same ID serialize on one of a fixed set of
/// lock stripes, shared by all handles on the same directory; readers never
/// lock. Writers in other processes are not serialized, but each write still
/// lands whole.
pub struct FileStore {
    dir: PathBuf,
    stripes: Stripes,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    /// An empty path selects [`DEFAULT_DIR`].
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let dir = if dir.as_os_str().is_empty() {
            Path::new(DEFAULT_DIR)
        } else {
            dir
        };
        let dir = ensure_dir(dir)?;
        let stripes = stripes_for(&dir);
        Ok(Self { dir, stripes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, digest: &[u8]) -> PathBuf {
        self.dir.join(format!("{}.{}", hex::encode(digest), RECORD_EXT))
    }

    fn lock(&self, digest: &[u8]) -> MutexGuard<'_, ()> {
        let stripe = digest.first().copied().unwrap_or_default() as usize % STRIPES;
        self.stripes[stripe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a record. A missing file maps to `NoRecord`.
    fn load(&self, path: &Path) -> Result<StoredSession> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SessionError::NoRecord),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|source| SessionError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write a record through a uniquely named temp file and rename it into place.
    /// A failed write drops the temp file with it.
    fn save(&self, path: &Path, record: &StoredSession) -> Result<()> {
        let bytes = serde_json::to_vec(record).map_err(SessionError::Encode)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| SessionError::Io(e.error))?;
        Ok(())
    }

    fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Store for FileStore {
    fn create(&self, id: &str, ttl: Duration) -> Result<()> {
        let digest = record_digest(id);
        let path = self.record_path(&digest);
        let record = StoredSession::new(Session::new(), ttl);
        let _guard = self.lock(&digest);
        self.save(&path, &record)
    }

    fn read(&self, id: &str) -> Result<Session> {
        let path = self.record_path(&record_digest(id));
        let record = self.load(&path)?;
        if record.is_expired(Utc::now()) {
            return Err(SessionError::NoRecord);
        }
        Ok(record.session)
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Session)) -> Result<()> {
        let digest = record_digest(id);
        let path = self.record_path(&digest);
        let _guard = self.lock(&digest);

        let mut record = self.load(&path)?;
        if record.is_expired(Utc::now()) {
            return Err(SessionError::NoRecord);
        }
        f(&mut record.session);
        record.touch();
        self.save(&path, &record)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let digest = record_digest(id);
        let path = self.record_path(&digest);
        let _guard = self.lock(&digest);
        Self::remove(&path)
    }

    fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(digest) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| hex::decode(s).ok())
            else {
                continue;
            };

            let _guard = self.lock(&digest);
            match self.load(&path) {
                Ok(record) if record.is_expired(now) => {
                    Self::remove(&path)?;
                    removed += 1;
                }
                Ok(_) | Err(SessionError::NoRecord) => {}
                Err(e @ SessionError::Corrupt { .. }) => {
                    warn!("Skipping session file during sweep: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Swept {} expired session(s) from {}", removed, self.dir.display());
        Ok(removed)
    }
}
