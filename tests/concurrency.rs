//! Exercises the debounce scheduler under genuine multi-threaded
//! contention: several writer threads racing against one `Engine`, whose
//! single coarse lock must still produce a consistent final document and a
//! durable file on disk once every `Pending` handle resolves.

use std::sync::Arc;
use std::thread;

use jsondb::{Engine, EngineOptions, Path};
use serde_json::json;

#[test]
fn concurrent_writers_coalesce_into_one_consistent_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let engine = Arc::new(
        Engine::open("db.json", EngineOptions::new().with_save_delay_ms(30)).unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || {
                engine
                    .set(&Path::parse(&format!("counters.t{i}")), json!(i))
                    .unwrap()
                    .wait()
                    .unwrap();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    for i in 0..8 {
        assert_eq!(
            engine.get(&Path::parse(&format!("counters.t{i}"))).unwrap(),
            Some(json!(i))
        );
    }

    let engine = Arc::try_unwrap(engine).unwrap_or_else(|_| panic!("dangling engine handle"));
    engine.close();

    // Reopening must see every writer's contribution: the debounce window
    // coalesced them, but none were dropped.
    let reopened = Engine::open("db.json", EngineOptions::new()).unwrap();
    for i in 0..8 {
        assert_eq!(
            reopened.get(&Path::parse(&format!("counters.t{i}"))).unwrap(),
            Some(json!(i))
        );
    }
    reopened.close();
}

#[test]
fn subscribers_observe_a_write_event_per_debounce_firing() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let engine = Engine::open("db.json", EngineOptions::new().with_save_delay_ms(20)).unwrap();
    let events = engine.subscribe();

    // Drain the `Ready` event emitted at open.
    assert!(matches!(
        events.recv_timeout(std::time::Duration::from_millis(500)).unwrap(),
        jsondb::Event::Ready
    ));

    engine.set(&Path::parse("a"), json!(1)).unwrap().wait().unwrap();

    assert!(matches!(
        events.recv_timeout(std::time::Duration::from_millis(500)).unwrap(),
        jsondb::Event::Write
    ));

    engine.close();
}
