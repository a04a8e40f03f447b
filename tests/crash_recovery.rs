//! Simulates a crash between writes and the next debounced snapshot: the
//! write-ahead log, not the snapshot file, is what must carry the data
//! across the restart.

use jsondb::{Engine, EngineOptions, Path};
use serde_json::json;

#[test]
fn wal_recovers_writes_that_never_reached_a_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    {
        // A debounce window long enough that none of these writes will have
        // been flushed to the canonical file before the engine is dropped.
        let engine =
            Engine::open("db.json", EngineOptions::new().with_save_delay_ms(60_000)).unwrap();
        engine.set(&Path::parse("a"), json!(1)).unwrap();
        engine.set(&Path::parse("b"), json!(2)).unwrap();
        engine.set(&Path::parse("c"), json!(3)).unwrap();
        // Dropped here without `close()`, standing in for a process crash:
        // the scheduler never got a chance to fire.
    }

    let engine = Engine::open("db.json", EngineOptions::new().with_save_delay_ms(5)).unwrap();
    assert_eq!(engine.get(&Path::parse("a")).unwrap(), Some(json!(1)));
    assert_eq!(engine.get(&Path::parse("b")).unwrap(), Some(json!(2)));
    assert_eq!(engine.get(&Path::parse("c")).unwrap(), Some(json!(3)));
    engine.close();
}

#[test]
fn reopening_after_a_clean_close_needs_no_wal_replay() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    {
        let engine =
            Engine::open("db.json", EngineOptions::new().with_save_delay_ms(5)).unwrap();
        engine.set(&Path::parse("done"), json!(true)).unwrap().wait().unwrap();
        engine.close();
    }

    let wal_path = dir.path().join("db.json.wal");
    assert!(!wal_path.exists() || std::fs::metadata(&wal_path).unwrap().len() == 0);

    let engine = Engine::open("db.json", EngineOptions::new()).unwrap();
    assert_eq!(engine.get(&Path::parse("done")).unwrap(), Some(json!(true)));
    engine.close();
}
