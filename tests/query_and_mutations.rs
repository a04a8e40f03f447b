//! End-to-end coverage of query options and the push/pull/add helpers
//! through the `Engine` facade, as opposed to `query.rs`'s own unit tests
//! which exercise the free functions directly against a bare `Vec<Value>`.

use jsondb::{Engine, EngineOptions, Path, Predicate, QueryOptions};
use serde_json::json;

fn open_in(dir: &tempfile::TempDir) -> Engine {
    std::env::set_current_dir(dir.path()).unwrap();
    Engine::open("db.json", EngineOptions::new().with_save_delay_ms(5)).unwrap()
}

#[test]
fn find_applies_predicate_then_sort_skip_limit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_in(&dir);

    engine
        .set(
            &Path::parse("users"),
            json!([
                {"name": "ann", "age": 41, "active": true},
                {"name": "bob", "age": 22, "active": true},
                {"name": "cam", "age": 35, "active": false},
                {"name": "deb", "age": 19, "active": true},
            ]),
        )
        .unwrap()
        .wait()
        .unwrap();

    let predicate = Predicate::shape(json!({"active": true}));
    let opts = QueryOptions {
        sort: Some(jsondb::query::Sort::Fields(vec![(
            "age".to_string(),
            jsondb::query::SortDirection::Ascending,
        )])),
        skip: 1,
        limit: Some(1),
        select: Some(vec!["name".to_string()]),
    };
    let results = engine.find(&Path::parse("users"), &predicate, &opts).unwrap();
    assert_eq!(results, vec![json!({"name": "ann"})]);

    engine.close();
}

#[test]
fn find_one_returns_first_match_in_iteration_order() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_in(&dir);

    engine
        .set(
            &Path::parse("users"),
            json!([{"id": 1, "role": "admin"}, {"id": 2, "role": "admin"}]),
        )
        .unwrap()
        .wait()
        .unwrap();

    let predicate = Predicate::shape(json!({"role": "admin"}));
    let found = engine.find_one(&Path::parse("users"), &predicate).unwrap().unwrap();
    assert_eq!(found["id"], json!(1));

    engine.close();
}

#[test]
fn push_skips_duplicates_and_pull_removes_matches() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_in(&dir);

    engine
        .push(&Path::parse("tags"), vec![json!("a"), json!("b")])
        .unwrap()
        .wait()
        .unwrap();
    engine
        .push(&Path::parse("tags"), vec![json!("b"), json!("c")])
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(
        engine.get(&Path::parse("tags")).unwrap(),
        Some(json!(["a", "b", "c"]))
    );

    engine
        .pull(&Path::parse("tags"), vec![json!("b")])
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(
        engine.get(&Path::parse("tags")).unwrap(),
        Some(json!(["a", "c"]))
    );

    engine.close();
}

#[test]
fn add_accumulates_against_an_absent_then_present_counter() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_in(&dir);

    engine.add(&Path::parse("stats.hits"), 1.0).unwrap().wait().unwrap();
    engine.add(&Path::parse("stats.hits"), 2.5).unwrap().wait().unwrap();
    assert_eq!(
        engine.get(&Path::parse("stats.hits")).unwrap(),
        Some(json!(3.5))
    );

    engine.close();
}

#[test]
fn paginate_slices_by_page_and_limit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_in(&dir);

    let items: Vec<_> = (0..10).map(|i| json!(i)).collect();
    engine
        .set(&Path::parse("nums"), serde_json::Value::Array(items))
        .unwrap()
        .wait()
        .unwrap();

    let page2 = engine.paginate(&Path::parse("nums"), 2, 3).unwrap();
    assert_eq!(page2, vec![json!(3), json!(4), json!(5)]);

    engine.close();
}

#[test]
fn find_by_index_locates_the_matching_element() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let index = jsondb::IndexDefinition {
        name: "user-email".to_string(),
        collection_path: Path::parse("users"),
        field: "email".to_string(),
        unique: true,
    };
    let engine = Engine::open(
        "db.json",
        EngineOptions::new().with_save_delay_ms(5).with_indices(vec![index]),
    )
    .unwrap();

    engine
        .set(&Path::parse("users.u1"), json!({"email": "a@x.com", "name": "Ann"}))
        .unwrap()
        .wait()
        .unwrap();

    let found = engine
        .find_by_index("user-email", &json!("a@x.com"))
        .unwrap()
        .unwrap();
    assert_eq!(found["name"], json!("Ann"));

    engine.close();
}
