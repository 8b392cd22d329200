//! Behaviour every backend must share, run against each of them through `dyn Store`.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
#[cfg(feature = "file-backend")]
use sessionkit_core::FileStore;
use sessionkit_core::{MemoryStore, SessionError, Store};

const TTL: Duration = Duration::from_secs(1440 * 60);

fn random(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn backends() -> (tempfile::TempDir, Vec<(&'static str, Arc<dyn Store>)>) {
    let tmp = tempfile::tempdir().unwrap();
    #[allow(unused_mut)]
    let mut stores: Vec<(&'static str, Arc<dyn Store>)> =
        vec![("memory", Arc::new(MemoryStore::new()) as Arc<dyn Store>)];
    #[cfg(feature = "file-backend")]
    {
        let file = FileStore::open(tmp.path().join("session")).unwrap();
        stores.push(("file", Arc::new(file) as Arc<dyn Store>));
    }
    (tmp, stores)
}

#[test]
fn test_backends_match_features() {
    let (_tmp, stores) = backends();
    let names: Vec<_> = stores.iter().map(|(name, _)| *name).collect();
    assert_eq!(names.contains(&"file"), cfg!(feature = "file-backend"));
    assert!(names.contains(&"memory"));
}

/// create → read → update → update → read → update → delete, checking each step.
fn run_lifecycle(store: &dyn Store, id: &str) -> Result<(), String> {
    let key = random(10);
    let value = random(10);

    store
        .create(id, TTL)
        .map_err(|e| format!("create session record: {e}"))?;

    let session = store
        .read(id)
        .map_err(|e| format!("read session record: {e}"))?;
    if !session.token.is_empty() || !session.data.is_empty() {
        return Err("new session is not empty".into());
    }

    store
        .update(id, &mut |s| s.token = value.clone())
        .map_err(|e| format!("update session record: {e}"))?;

    store
        .update(id, &mut |s| s.set(key.clone(), value.clone()))
        .map_err(|e| format!("set session data: {e}"))?;

    let session = store
        .read(id)
        .map_err(|e| format!("get session data: {e}"))?;
    if session.get(&key).and_then(|v| v.as_str()) != Some(value.as_str()) {
        return Err("session data does not match".into());
    }
    if session.token != value {
        return Err("session token does not match".into());
    }

    store
        .update(id, &mut |s| {
            s.remove(&key);
        })
        .map_err(|e| format!("delete session data: {e}"))?;

    store
        .delete(id)
        .map_err(|e| format!("delete session record: {e}"))?;

    match store.read(id) {
        Err(SessionError::NoRecord) => Ok(()),
        Ok(_) => Err("session still readable after delete".into()),
        Err(e) => Err(format!("read after delete: {e}")),
    }
}

#[test]
fn test_lifecycle() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        run_lifecycle(store.as_ref(), &new_id()).unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}

#[test]
fn test_unknown_id_not_found() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let id = new_id();
        assert!(store.read(&id).unwrap_err().is_not_found(), "{name}");
        assert!(
            store.update(&id, &mut |s| s.set("k", 1)).unwrap_err().is_not_found(),
            "{name}"
        );
        // update on a missing ID must not create it
        assert!(store.read(&id).unwrap_err().is_not_found(), "{name}");
    }
}

#[test]
fn test_delete_key_leaves_others() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let id = new_id();
        store.create(&id, TTL).unwrap();
        store
            .update(&id, &mut |s| {
                s.set("a", 1);
                s.set("b", "two");
                s.set("c", serde_json::json!({"three": 3}));
            })
            .unwrap();
        store
            .update(&id, &mut |s| {
                s.remove("b");
            })
            .unwrap();

        let session = store.read(&id).unwrap();
        assert_eq!(session.data.len(), 2, "{name}");
        assert!(session.get("b").is_none(), "{name}");
        assert_eq!(session.get("a"), Some(&serde_json::json!(1)), "{name}");
        assert_eq!(
            session.get("c"),
            Some(&serde_json::json!({"three": 3})),
            "{name}"
        );
    }
}

#[test]
fn test_delete_absent_is_ok() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let id = new_id();
        assert!(store.delete(&id).is_ok(), "{name}");
        store.create(&id, TTL).unwrap();
        assert!(store.delete(&id).is_ok(), "{name}");
        assert!(store.delete(&id).is_ok(), "{name}");
    }
}

#[test]
fn test_create_overwrites_silently() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let id = new_id();
        store.create(&id, TTL).unwrap();
        store.update(&id, &mut |s| s.token = "old".into()).unwrap();
        store.create(&id, TTL).unwrap();

        let session = store.read(&id).unwrap();
        assert!(session.token.is_empty(), "{name}");
        assert!(session.data.is_empty(), "{name}");
    }
}

#[test]
fn test_update_runs_once() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let id = new_id();
        store.create(&id, TTL).unwrap();
        let mut calls = 0;
        store.update(&id, &mut |_| calls += 1).unwrap();
        assert_eq!(calls, 1, "{name}");
    }
}

#[test]
fn test_concurrent_lifecycles() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let failures: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..1000)
                .map(|_| {
                    let store = store.as_ref();
                    scope.spawn(move || run_lifecycle(store, &new_id()))
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap().err())
                .collect()
        });
        assert!(failures.is_empty(), "{name}: {failures:?}");
    }
}

#[test]
fn test_concurrent_updates_same_id() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let id = new_id();
        store.create(&id, TTL).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..16 {
                let store = store.as_ref();
                let id = id.as_str();
                scope.spawn(move || {
                    for _ in 0..25 {
                        store
                            .update(id, &mut |s| {
                                let n = s.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
                                s.set("count", n + 1);
                            })
                            .unwrap();
                    }
                });
            }
        });

        let session = store.read(&id).unwrap();
        assert_eq!(session.get("count"), Some(&serde_json::json!(400)), "{name}");
    }
}

#[test]
fn test_expired_record_not_found() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let id = new_id();
        store.create(&id, Duration::from_secs(1)).unwrap();
        assert!(store.read(&id).is_ok(), "{name}");
        std::thread::sleep(Duration::from_millis(1100));
        assert!(store.read(&id).unwrap_err().is_not_found(), "{name}");
        assert!(
            store.update(&id, &mut |_| {}).unwrap_err().is_not_found(),
            "{name}"
        );
    }
}

#[test]
fn test_sweep_across_backends() {
    let (_tmp, stores) = backends();
    for (name, store) in &stores {
        let live = new_id();
        let dead = new_id();
        store.create(&live, TTL).unwrap();
        store.create(&dead, Duration::from_secs(1)).unwrap();
        std::thread::sleep(Duration::from_millis(1100));

        assert_eq!(store.sweep().unwrap(), 1, "{name}");
        assert!(store.read(&live).is_ok(), "{name}");
    }
}
