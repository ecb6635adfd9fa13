//! Association preloading against an in-memory SQLite database.

use rowmap::prelude::*;
use rowmap::PreloadError;

const SCHEMA: &str = "
create table employee (
    id integer primary key autoincrement,
    name text not null,
    buddy_id integer references employee(id) check (buddy_id <> id) unique,
    manager_id integer references employee(id) check (manager_id <> id)
);

create table employee_indication (
    indicator_id integer not null references employee(id),
    indicated_id integer not null references employee(id),
    primary key (indicator_id, indicated_id),
    check (indicator_id <> indicated_id)
);

insert into employee (name) values ('John'), ('Bob');
insert into employee (name, manager_id) values ('Alice', 1), ('Riya', 2);
insert into employee (name, manager_id, buddy_id) values ('Emilie', 1, 3), ('Cynthia', 2, 4);
insert into employee_indication values (1,2), (1,3), (2,3), (2,4), (2,5), (3,5), (3,6);
";

// John manages Alice and Emilie, Bob manages Riya and Cynthia.
// Alice is Emilie's buddy, Riya is Cynthia's.
// John indicated Bob and Alice; Bob indicated Alice, Riya and Emilie;
// Alice indicated Emilie and Cynthia.

fn catalog() -> Catalog {
    Catalog::new()
        .register(
            TableInfo::new("employee")
                .column(ColumnInfo::new("id").primary_key(true).auto_increment(true))
                .column(ColumnInfo::new("name"))
                .column(ColumnInfo::new("buddy_id").nullable(true))
                .column(ColumnInfo::new("manager_id").nullable(true))
                .index(IndexInfo::unique("UQE_employee_buddy_id", &["buddy_id"]))
                .association(Association::belongs_to("Buddy", "employee", "employee", "buddy_id"))
                .association(Association::has_one("Apprentice", "employee", "employee", "buddy_id"))
                .association(Association::belongs_to("Manager", "employee", "employee", "manager_id"))
                .association(Association::has_many(
                    "Subordinates",
                    "employee",
                    "employee",
                    "manager_id",
                ))
                .association(Association::many_to_many(
                    "Indications",
                    "employee",
                    "employee",
                    JoinTableInfo::new("employee_indication", "indicator_id", "indicated_id"),
                ))
                .association(Association::many_to_many(
                    "IndicatedBy",
                    "employee",
                    "employee",
                    JoinTableInfo::new("employee_indication", "indicated_id", "indicator_id"),
                )),
        )
        .register(
            TableInfo::new("employee_indication")
                .column(ColumnInfo::new("indicator_id").primary_key(true))
                .column(ColumnInfo::new("indicated_id").primary_key(true)),
        )
}

fn setup() -> (Engine, SqliteDriver) {
    let driver = SqliteDriver::open_in_memory().unwrap();
    driver.execute_batch(SCHEMA).unwrap();
    (Engine::new(Dialect::sqlite(), catalog()), driver)
}

fn ids(records: &[Record]) -> Vec<i64> {
    let mut ids: Vec<i64> = records.iter().map(|r| r.get_i64("id").unwrap()).collect();
    ids.sort_unstable();
    ids
}

/// Typed view of an employee with its loaded relations.
#[derive(Debug, PartialEq)]
struct Employee {
    id: i64,
    name: Option<String>,
    manager: Option<Box<Employee>>,
    subordinates: Vec<Employee>,
}

impl Model for Employee {
    const TABLE_NAME: &'static str = "employee";

    fn to_record(&self) -> Record {
        Record::new(Self::TABLE_NAME).with("id", self.id).with("name", self.name.clone())
    }

    fn from_record(record: &Record) -> Result<Self> {
        let mut subordinates = record
            .many("Subordinates")
            .iter()
            .map(Employee::from_record)
            .collect::<Result<Vec<_>>>()?;
        subordinates.sort_by_key(|e| e.id);
        Ok(Self {
            id: record.get_i64("id")?,
            name: record.get_opt_string("name")?,
            manager: record
                .one("Manager")
                .map(Employee::from_record)
                .transpose()?
                .map(Box::new),
            subordinates,
        })
    }
}

#[test]
fn get_with_restricted_nested_preloads() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let bob = session
        .table("employee")
        .cols(&["name"])
        .filter(Cond::eq("`id`", 2i64))
        .preload(Preload::new("Indications.Buddy").cols(&["name"]))
        .preload(Preload::new("Indications").cols(&["id"]))
        .get()
        .unwrap()
        .unwrap();

    assert_eq!(bob.get_string("name").unwrap(), "Bob");
    assert_eq!(bob.get_i64("id").unwrap(), 2);
    assert!(bob.get("manager_id").is_none());

    let indications = bob.many("Indications");
    assert_eq!(ids(indications), vec![3, 4, 5]);
    for indicated in indications {
        // Only the key and the buddy link were selected.
        assert!(indicated.get("name").is_none());
        match indicated.get_i64("id").unwrap() {
            5 => {
                let buddy = indicated.one("Buddy").unwrap();
                assert_eq!(buddy.get_i64("id").unwrap(), 3);
                assert_eq!(buddy.get_string("name").unwrap(), "Alice");
            }
            _ => assert!(indicated.one("Buddy").is_none()),
        }
    }
}

#[test]
fn find_loads_every_level_in_one_query() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let employees = session
        .table("employee")
        .cols(&["name"])
        .preload(Preload::new("Manager.Subordinates").cols(&["name"]))
        .preload(
            Preload::new("Apprentice.IndicatedBy")
                .cols(&["name"])
                .filter(Cond::not_null("`manager_id`")),
        )
        .find()
        .unwrap();

    assert_eq!(employees.len(), 6);
    // Manager, Subordinates, Apprentice and IndicatedBy: one fetch each.
    assert_eq!(session.n1_tracker().stats().total_loads, 4);

    let alice = &employees[2];
    assert_eq!(alice.get_string("name").unwrap(), "Alice");
    let manager = alice.one("Manager").unwrap();
    assert_eq!(manager.get_i64("id").unwrap(), 1);
    assert_eq!(ids(manager.many("Subordinates")), vec![3, 5]);

    let apprentice = alice.one("Apprentice").unwrap();
    assert_eq!(apprentice.get_i64("id").unwrap(), 5);
    let indicated_by = apprentice.many("IndicatedBy");
    assert_eq!(ids(indicated_by), vec![3]);
    assert_eq!(indicated_by[0].get_string("name").unwrap(), "Alice");

    // John and Bob have no manager and no apprentice.
    assert!(employees[0].one("Manager").is_none());
    assert!(employees[1].one("Apprentice").is_none());
}

#[test]
fn intermediate_records_without_children_are_pruned() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    // Emilie's buddy Alice indicated others; Cynthia's buddy Riya did not.
    let employees = session
        .table("employee")
        .preload(Preload::new("Buddy.Indications"))
        .find()
        .unwrap();

    let with_buddy: Vec<i64> = employees
        .iter()
        .filter(|e| e.one("Buddy").is_some())
        .map(|e| e.get_i64("id").unwrap())
        .collect();
    assert_eq!(with_buddy, vec![5]);

    let kept = session
        .table("employee")
        .preload(Preload::new("Buddy").no_prune())
        .preload(Preload::new("Buddy.Indications"))
        .find()
        .unwrap();
    assert_eq!(kept.iter().filter(|e| e.one("Buddy").is_some()).count(), 2);
}

#[test]
fn typed_models_read_loaded_relations() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let employees: Vec<Employee> = session
        .filter(Cond::eq("`id`", 1i64))
        .preload(Preload::new("Subordinates"))
        .find_as()
        .unwrap();

    assert_eq!(employees.len(), 1);
    let john = &employees[0];
    assert_eq!(john.name.as_deref(), Some("John"));
    assert!(john.manager.is_none());
    let names: Vec<_> = john
        .subordinates
        .iter()
        .map(|e| e.name.clone().unwrap())
        .collect();
    assert_eq!(names, vec!["Alice".to_string(), "Emilie".to_string()]);
}

#[test]
fn repeated_single_owner_preloads_are_counted() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    for id in 1..=3i64 {
        session
            .table("employee")
            .filter(Cond::eq("`id`", id))
            .preload(Preload::new("Subordinates"))
            .get()
            .unwrap();
    }

    let tracker = session.n1_tracker();
    assert_eq!(tracker.count_for("employee", "Subordinates"), 3);
    assert_eq!(tracker.stats().potential_n1, 1);
    assert!(tracker.recent().iter().all(|e| e.owners == 1));
}

#[test]
fn invalid_paths_fail_before_any_query() {
    let (engine, driver) = setup();
    let mut session = engine.session(&driver);

    let err = session
        .table("employee")
        .preload(Preload::new("Manager.Boss"))
        .find()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Preload(PreloadError::MissingField { ref field, .. }) if field == "Boss"
    ));

    let err = session
        .table("employee")
        .preload(Preload::new("name"))
        .find()
        .unwrap_err();
    assert!(matches!(err, Error::Preload(PreloadError::MissingAssociation { .. })));
}
