//! Session reads, writes and upserts against an in-memory SQLite database.

use rowmap::prelude::*;
use rowmap::ColumnRole;
use std::collections::BTreeMap;

const SCHEMA: &str = "
create table note (
    id integer primary key autoincrement,
    body text not null,
    score real not null default 0,
    created text,
    updated text,
    deleted_at text
);

create table one_unique (
    id integer primary key autoincrement,
    data text not null unique,
    other text
);

create table multi_unique (
    id integer primary key autoincrement,
    not_unique text,
    data1 text not null default '',
    data2 text not null default '',
    unique (data1, data2)
);

create table two_unique (
    id integer primary key autoincrement,
    email text not null unique,
    login text not null unique
);

create table no_unique (
    id integer primary key autoincrement,
    data text
);
";

fn catalog() -> Catalog {
    Catalog::new()
        .register(
            TableInfo::new("note")
                .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
                .column(ColumnInfo::new("body"))
                .column(ColumnInfo::new("score").default("0"))
                .column(ColumnInfo::new("created").nullable(true).role(ColumnRole::Created))
                .column(ColumnInfo::new("updated").nullable(true).role(ColumnRole::Updated))
                .column(ColumnInfo::new("deleted_at").nullable(true).deleted()),
        )
        .register(
            TableInfo::new("one_unique")
                .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
                .column(ColumnInfo::new("data"))
                .column(ColumnInfo::new("other").nullable(true))
                .index(IndexInfo::unique("UQE_one_unique_data", &["data"])),
        )
        .register(
            TableInfo::new("multi_unique")
                .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
                .column(ColumnInfo::new("not_unique").nullable(true))
                .column(ColumnInfo::new("data1").default("''"))
                .column(ColumnInfo::new("data2").default("''"))
                .index(IndexInfo::unique("UQE_multi_unique_s", &["data1", "data2"])),
        )
        .register(
            TableInfo::new("two_unique")
                .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
                .column(ColumnInfo::new("email"))
                .column(ColumnInfo::new("login"))
                .index(IndexInfo::unique("UQE_two_unique_email", &["email"]))
                .index(IndexInfo::unique("UQE_two_unique_login", &["login"])),
        )
        .register(
            TableInfo::new("no_unique")
                .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
                .column(ColumnInfo::new("data").nullable(true)),
        )
}

fn setup() -> (Engine, SqliteDriver) {
    let driver = SqliteDriver::open_in_memory().unwrap();
    driver.execute_batch(SCHEMA).unwrap();
    (Engine::new(Dialect::sqlite(), catalog()), driver)
}

fn note(body: &str, score: f64) -> Record {
    Record::new("note").with("body", body).with("score", score)
}

#[test]
fn insert_fills_id_and_timestamps() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let mut first = note("first", 1.0);
    assert_eq!(session.insert(&mut first).unwrap(), 1);
    assert_eq!(first.get_i64("id").unwrap(), 1);
    assert!(matches!(first.get("created"), Some(Value::Timestamp(_))));
    assert!(matches!(first.get("updated"), Some(Value::Timestamp(_))));

    let mut second = note("second", 2.0);
    session.insert(&mut second).unwrap();
    assert_eq!(second.get_i64("id").unwrap(), 2);

    let stored = session
        .table("note")
        .filter(Cond::eq("`id`", 1i64))
        .get()
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_string("body").unwrap(), "first");
    assert!(stored.get("created").is_some_and(|v| !v.is_null()));
}

#[test]
fn count_sum_exist_and_pagination() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);
    for (i, body) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        session.insert(&mut note(body, (i + 1) as f64)).unwrap();
    }

    assert_eq!(session.table("note").count().unwrap(), 5);
    assert_eq!(
        session
            .table("note")
            .filter(Cond::gt("`score`", 2.0))
            .count()
            .unwrap(),
        3
    );
    assert_eq!(session.table("note").sum(&["score", "id"]).unwrap(), vec![15.0, 15.0]);
    assert!(session.table("note").filter(Cond::eq("`body`", "c")).exist().unwrap());
    assert!(!session.table("note").filter(Cond::eq("`body`", "z")).exist().unwrap());

    let page = session
        .table("note")
        .cols(&["id", "body"])
        .desc(&["id"])
        .limit(2)
        .offset(1)
        .find()
        .unwrap();
    let bodies: Vec<String> = page.iter().map(|r| r.get_string("body").unwrap()).collect();
    assert_eq!(bodies, vec!["d".to_string(), "c".to_string()]);
    assert!(page[0].get("score").is_none());
}

#[test]
fn update_by_primary_key_and_by_condition() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);
    let mut a = note("a", 1.0);
    let mut b = note("b", 1.0);
    session.insert(&mut a).unwrap();
    session.insert(&mut b).unwrap();

    let changed = Record::new("note").with("id", 1i64).with("body", "A");
    assert_eq!(session.update(&changed).unwrap(), 1);

    let mut values = BTreeMap::new();
    values.insert("score".to_string(), Value::Double(9.0));
    let updated = session
        .table("note")
        .filter(Cond::gte("`id`", 1i64))
        .update_map("note", &values)
        .unwrap();
    assert_eq!(updated, 2);

    let rows = session.table("note").asc(&["id"]).find().unwrap();
    assert_eq!(rows[0].get_string("body").unwrap(), "A");
    assert_eq!(rows[1].get_string("body").unwrap(), "b");
    assert!(rows.iter().all(|r| r.get("score") == Some(&Value::Double(9.0))));
}

#[test]
fn soft_delete_hides_rows_until_unscoped() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);
    session.insert(&mut note("keep", 1.0)).unwrap();
    session.insert(&mut note("drop", 1.0)).unwrap();

    let deleted = session
        .table("note")
        .filter(Cond::eq("`body`", "drop"))
        .delete()
        .unwrap();
    assert_eq!(deleted, 1);

    assert_eq!(session.table("note").count().unwrap(), 1);
    assert_eq!(session.table("note").unscoped().count().unwrap(), 2);

    // Already soft-deleted rows are not stamped again.
    let again = session
        .table("note")
        .filter(Cond::eq("`body`", "drop"))
        .delete()
        .unwrap();
    assert_eq!(again, 0);

    // Unscoped deletes are hard deletes.
    session
        .table("note")
        .unscoped()
        .filter(Cond::eq("`body`", "drop"))
        .delete()
        .unwrap();
    assert_eq!(session.table("note").unscoped().count().unwrap(), 1);
}

#[test]
fn delete_without_condition_is_refused() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);
    session.insert(&mut note("a", 1.0)).unwrap();

    let err = session.table("note").delete().unwrap_err();
    assert!(matches!(err, Error::NeedDeletedCond));
    assert_eq!(session.table("note").count().unwrap(), 1);

    let record = Record::new("note").with("body", "a").with("score", Value::Null);
    assert_eq!(session.delete_record(&record).unwrap(), 1);
    assert_eq!(session.table("note").count().unwrap(), 0);
}

#[test]
fn insert_on_conflict_do_nothing_with_one_unique() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let mut row = Record::new("one_unique").with("data", "test");
    assert_eq!(session.insert_on_conflict_do_nothing(&mut row).unwrap(), 1);
    assert!(row.get_i64("id").unwrap() > 0);

    let mut row = Record::new("one_unique").with("data", "test2");
    assert_eq!(session.insert_on_conflict_do_nothing(&mut row).unwrap(), 1);

    let mut dup = Record::new("one_unique").with("data", "test");
    assert_eq!(session.insert_on_conflict_do_nothing(&mut dup).unwrap(), 0);
    assert!(dup.get("id").is_none());
}

#[test]
fn upsert_updates_the_conflicting_row() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let mut row = Record::new("one_unique").with("data", "k").with("other", "v1");
    assert_eq!(session.upsert(&mut row).unwrap(), 1);
    let id = row.get_i64("id").unwrap();

    let mut row = Record::new("one_unique").with("data", "k").with("other", "v2");
    assert_eq!(session.upsert(&mut row).unwrap(), 1);
    assert_eq!(row.get_i64("id").unwrap(), id);

    let stored = session
        .table("one_unique")
        .filter(Cond::eq("`data`", "k"))
        .get()
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_string("other").unwrap(), "v2");
    assert_eq!(session.table("one_unique").count().unwrap(), 1);
}

#[test]
fn composite_unique_uses_column_defaults() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let mut row = Record::new("multi_unique").with("data1", "test").with("not_unique", "t1");
    assert_eq!(session.insert_on_conflict_do_nothing(&mut row).unwrap(), 1);

    // data2 falls back to its '' default and collides.
    let mut row = Record::new("multi_unique").with("data1", "test").with("not_unique", "t2");
    assert_eq!(session.insert_on_conflict_do_nothing(&mut row).unwrap(), 0);

    let mut row = Record::new("multi_unique")
        .with("data1", "test")
        .with("data2", "test2")
        .with("not_unique", "t1");
    assert_eq!(session.insert_on_conflict_do_nothing(&mut row).unwrap(), 1);
}

#[test]
fn upsert_with_update_rejects_two_independent_constraints() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let mut row = Record::new("two_unique").with("email", "a@x").with("login", "a");
    let err = session.upsert(&mut row).unwrap_err();
    assert!(matches!(err, Error::MultipleUniqueConstraints { count: 2, .. }));

    assert_eq!(session.insert_on_conflict_do_nothing(&mut row).unwrap(), 1);
    let mut clash = Record::new("two_unique").with("email", "b@x").with("login", "a");
    assert_eq!(session.insert_on_conflict_do_nothing(&mut clash).unwrap(), 0);
}

#[test]
fn upsert_without_unique_index_fails() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let mut row = Record::new("no_unique").with("data", "x");
    let err = session.insert_on_conflict_do_nothing(&mut row).unwrap_err();
    assert!(matches!(err, Error::NoUniqueConstraints { .. }));
    assert!(row.get("id").is_none());
    assert_eq!(session.table("no_unique").count().unwrap(), 0);
}

#[test]
fn map_inserts_and_upserts() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let rows: Vec<BTreeMap<String, Value>> = ["x", "y", "z"]
        .iter()
        .map(|d| BTreeMap::from([("data".to_string(), Value::from(*d))]))
        .collect();
    assert_eq!(session.insert_multiple_maps("one_unique", &rows).unwrap(), 3);

    let row = BTreeMap::from([
        ("data".to_string(), Value::from("x")),
        ("other".to_string(), Value::from("o")),
    ]);
    assert_eq!(session.insert_map_on_conflict_do_nothing("one_unique", &row).unwrap(), 0);
    assert_eq!(session.upsert_map("one_unique", &row).unwrap(), 1);
    assert_eq!(
        session
            .table("one_unique")
            .filter(Cond::not_null("`other`"))
            .count()
            .unwrap(),
        1
    );

    let single = BTreeMap::from([("data".to_string(), Value::from("w"))]);
    assert_eq!(session.insert_map("one_unique", &single).unwrap(), 1);
    assert_eq!(session.table("one_unique").count().unwrap(), 4);
}

#[test]
fn raw_sql_and_driver_errors() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    session
        .exec("INSERT INTO `note` (`body`) VALUES (?)", &[Value::from("raw")])
        .unwrap();
    let rows = session.query("SELECT `body` FROM `note`", &[]).unwrap();
    assert_eq!(rows[0].get_named("body"), Some(&Value::from("raw")));

    let found = session
        .sql("SELECT * FROM note WHERE body = ?", vec![Value::from("raw")])
        .find()
        .unwrap();
    assert_eq!(found.len(), 1);

    let err = session.table("missing_table").count().unwrap_err();
    match err {
        Error::Query(q) => assert_eq!(q.sql.as_deref(), Some("SELECT count(*) FROM `missing_table`")),
        other => panic!("unexpected error: {other:?}"),
    }
}
