#![allow(clippy::float_cmp, clippy::unreadable_literal)]
use recbus_core::{ColumnSchema, Error, EventHeader, Product, RecordBus, Tree};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CalHit {
    id: u32,
    energy: f64,
}

impl Product for CalHit {
    fn schema() -> ColumnSchema {
        ColumnSchema::object("tests::CalHit")
    }
}

// Sorted by id on every update so equal inputs persist identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CalHits(Vec<CalHit>);

impl Product for CalHits {
    fn schema() -> ColumnSchema {
        ColumnSchema::object("tests::CalHits")
    }

    fn normalize(&mut self) {
        self.0.sort_by_key(|hit| hit.id);
    }
}

fn hit(id: u32, energy: f64) -> CalHit {
    CalHit { id, energy }
}

/// Runs a production pass over `events` and returns the output tree.
fn produce(pass: &str, events: &[Vec<f64>]) -> Tree {
    let mut bus = RecordBus::new(pass);
    bus.set_output_tree(Tree::new("Events"));
    for energies in events {
        assert!(bus.next_event().unwrap());
        bus.add("Energies", energies.clone()).unwrap();
        bus.add("Count", i32::try_from(energies.len()).unwrap())
            .unwrap();
        bus.before_fill();
        bus.fill().unwrap();
        bus.clear();
    }
    bus.take_output_tree().unwrap()
}

/// One event holding a single-valued `Vec<f64>` per (name, pass, value).
fn single_event(products: &[(&str, &str, f64)]) -> Tree {
    let mut bus = RecordBus::new("gen");
    bus.set_output_tree(Tree::new("Events"));
    assert!(bus.next_event().unwrap());
    for (name, pass, value) in products {
        bus.set_pass_name(*pass);
        bus.add(name, vec![*value]).unwrap();
    }
    bus.before_fill();
    bus.fill().unwrap();
    bus.take_output_tree().unwrap()
}

#[test]
fn test_add_get_same_event() {
    let mut bus = RecordBus::new("reco");
    bus.add("Hit", hit(3, 1.25)).unwrap();
    assert_eq!(bus.get::<CalHit>("Hit", "reco").unwrap(), &hit(3, 1.25));
}

#[test]
fn test_double_add_regardless_of_value() {
    let mut bus = RecordBus::new("reco");
    bus.add("Hit", hit(1, 1.0)).unwrap();
    assert!(matches!(
        bus.add("Hit", hit(1, 1.0)),
        Err(Error::ProductExists { .. })
    ));
    assert!(matches!(
        bus.add("Hit", hit(2, 5.0)),
        Err(Error::ProductExists { .. })
    ));
}

#[test]
fn test_ambiguous_lookup() {
    let mut bus = RecordBus::new("passA");
    bus.add("Hits", vec![1.0_f64]).unwrap();
    bus.set_pass_name("passB");
    bus.add("Hits", vec![2.0_f64]).unwrap();

    match bus.get::<Vec<f64>>("Hits", "") {
        Err(Error::ProductAmbiguous { candidates, .. }) => {
            assert_eq!(candidates, vec!["Hits_passA", "Hits_passB"]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert_eq!(bus.get::<Vec<f64>>("Hits", "passA").unwrap(), &vec![1.0]);
    assert_eq!(bus.get::<Vec<f64>>("Hits", "passB").unwrap(), &vec![2.0]);
}

#[test]
fn test_lookup_cache_is_invalidated_by_new_identity() {
    let mut bus = RecordBus::new("one");
    bus.add("X", 5_i32).unwrap();
    assert_eq!(*bus.get::<i32>("X", "").unwrap(), 5);

    bus.clear();
    bus.set_pass_name("two");
    bus.add("X", 6_i32).unwrap();
    assert!(matches!(
        bus.get::<i32>("X", ""),
        Err(Error::ProductAmbiguous { .. })
    ));
}

#[test]
fn test_clear_is_idempotent() {
    let mut bus = RecordBus::new("reco");
    bus.add("Energies", vec![1.0_f64, 2.0]).unwrap();
    bus.add("Count", 2_i32).unwrap();
    bus.add("Total", 3.0_f64).unwrap();

    bus.clear();
    bus.clear();
    assert!(bus.get::<Vec<f64>>("Energies", "reco").unwrap().is_empty());
    assert_eq!(*bus.get::<i32>("Count", "reco").unwrap(), i32::MIN);
    assert_eq!(*bus.get::<f64>("Total", "reco").unwrap(), f64::MIN);
    bus.add("Count", 1_i32).unwrap();
}

#[test]
fn test_normalize_on_update() {
    let mut bus = RecordBus::new("reco");
    bus.add("Cal", CalHits(vec![hit(7, 0.5), hit(2, 0.25)]))
        .unwrap();
    let stored = bus.get::<CalHits>("Cal", "").unwrap();
    assert_eq!(stored.0.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2, 7]);
}

#[test]
fn test_persisted_round_trip() {
    let tree = produce("reco", &[vec![1.5, 2.5], vec![], vec![9.0]]);
    assert_eq!(tree.entries(), 3);
    assert!(tree.column("EventHeader").is_some());

    let mut reader = RecordBus::new("ana");
    reader.set_input_tree(tree).unwrap();
    let mut seen = Vec::new();
    while reader.next_event().unwrap() {
        let energies = reader.get::<Vec<f64>>("Energies", "reco").unwrap().clone();
        let count = *reader.get::<i32>("Count", "").unwrap();
        assert_eq!(usize::try_from(count).unwrap(), energies.len());
        seen.push((reader.header().unwrap().event_number(), energies));
        reader.clear();
    }
    assert_eq!(
        seen,
        vec![(1, vec![1.5, 2.5]), (2, vec![]), (3, vec![9.0])]
    );
}

#[test]
fn test_lazy_get_wrong_type_is_reported() {
    let tree = produce("reco", &[vec![1.0]]);
    let mut reader = RecordBus::new("ana");
    reader.set_input_tree(tree).unwrap();
    assert!(reader.next_event().unwrap());
    let err = reader.get::<Vec<f32>>("Energies", "reco").unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { ref key, .. } if key == "Energies_reco"));
    assert!(err.is_contract_violation());
    assert!(matches!(
        reader.get::<Vec<f64>>("Missing", "reco"),
        Err(Error::ProductNotFound { .. })
    ));
}

#[test]
fn test_drop_rule_excludes_from_output_only() {
    let mut bus = RecordBus::new("reco");
    bus.add_drop("drop .*Test.*").unwrap();
    bus.set_output_tree(Tree::new("Events"));
    assert!(bus.next_event().unwrap());
    bus.add("TestCollection", vec![4_u32, 2]).unwrap();
    bus.add("Kept", vec![1_u32]).unwrap();
    assert_eq!(
        bus.get::<Vec<u32>>("TestCollection", "").unwrap(),
        &vec![4, 2]
    );
    bus.before_fill();
    bus.fill().unwrap();

    let tree = bus.take_output_tree().unwrap();
    assert!(tree.column("TestCollection_reco").is_none());
    assert!(tree.column("Kept_reco").is_some());

    let mut reader = RecordBus::new("ana");
    reader.set_input_tree(tree).unwrap();
    assert!(reader.next_event().unwrap());
    assert!(matches!(
        reader.get::<Vec<u32>>("TestCollection", "reco"),
        Err(Error::ProductNotFound { .. })
    ));
}

#[test]
fn test_keep_overrides_earlier_drop() {
    let mut bus = RecordBus::new("reco");
    bus.add_drop(".*Hits.*").unwrap();
    bus.add_drop("keep EcalHits").unwrap();
    bus.set_output_tree(Tree::new("Events"));
    bus.add("EcalHits", vec![1_i16]).unwrap();
    bus.add("HcalHits", vec![2_i16]).unwrap();
    let tree = bus.take_output_tree().unwrap();
    assert_eq!(tree.column_names(), vec![EventHeader::KEY, "EcalHits_reco"]);
}

#[test]
fn test_illegal_name_before_mutation() {
    let mut bus = RecordBus::new("reco");
    assert!(matches!(
        bus.add("Bad_Name", 1_i32),
        Err(Error::IllegalName { .. })
    ));
    assert_eq!(bus.products().len(), 1);
    assert_eq!(bus.registry().len(), 1);
}

#[test]
fn test_rebinding_across_input_files() {
    let first = produce("reco", &[vec![1.0]]);
    let second = produce("reco", &[vec![2.0], vec![3.0]]);

    let mut reader = RecordBus::new("ana");
    reader.set_input_tree(first).unwrap();
    let mut values = Vec::new();
    for tree in [Some(second), None] {
        while reader.next_event().unwrap() {
            values.push(reader.get::<Vec<f64>>("Energies", "").unwrap().clone());
            reader.clear();
        }
        let done = reader.on_end_of_file().unwrap();
        assert!(done.entries() > 0);
        if let Some(tree) = tree {
            reader.set_input_tree(tree).unwrap();
        }
    }
    assert_eq!(values, vec![vec![1.0], vec![2.0], vec![3.0]]);
    assert!(reader.input_tree().is_none());
}

#[test]
fn test_output_rebinding_creates_columns() {
    let mut bus = RecordBus::new("reco");
    bus.add("Count", 1_i32).unwrap();
    bus.before_fill();

    let old = bus.set_output_tree(Tree::new("first"));
    assert!(old.is_none());
    bus.fill().unwrap();
    let first = bus.set_output_tree(Tree::new("second")).unwrap();
    assert_eq!(first.entries(), 1);

    let second = bus.output_tree().unwrap();
    assert!(second.column("Count_reco").is_some());
    assert!(second.column(EventHeader::KEY).is_some());
}

#[test]
fn test_exists_requires_a_single_match() {
    let mut bus = RecordBus::new("passA");
    bus.add("Hits", vec![1.0_f64]).unwrap();
    assert!(bus.exists("Hits", "").unwrap());

    bus.set_pass_name("passB");
    bus.add("Hits", vec![2.0_f64]).unwrap();
    assert!(!bus.exists("Hits", "").unwrap());
    assert!(bus.exists("Hits", "passA").unwrap());
}

#[test]
fn test_lazy_get_before_first_row() {
    let tree = produce("reco", &[vec![1.0]]);
    let mut reader = RecordBus::new("ana");
    reader.set_input_tree(tree).unwrap();
    assert!(matches!(
        reader.get::<Vec<f64>>("Energies", "reco"),
        Err(Error::ProductNotFound { .. })
    ));
    assert!(reader.next_event().unwrap());
    assert_eq!(reader.get::<Vec<f64>>("Energies", "reco").unwrap(), &vec![1.0]);
}

#[test]
fn test_product_missing_from_next_file_is_not_found() {
    let first = single_event(&[("Hits", "a", 1.0), ("Only", "a", 5.0)]);
    let second = single_event(&[("Hits", "a", 2.0)]);

    let mut reader = RecordBus::new("ana");
    reader.set_input_tree(first).unwrap();
    assert!(reader.next_event().unwrap());
    assert_eq!(reader.get::<Vec<f64>>("Only", "a").unwrap(), &vec![5.0]);
    reader.clear();
    reader.on_end_of_file();

    reader.set_input_tree(second).unwrap();
    assert!(reader.next_event().unwrap());
    assert!(matches!(
        reader.get::<Vec<f64>>("Only", "a"),
        Err(Error::ProductNotFound { .. })
    ));
    assert!(matches!(
        reader.get::<Vec<f64>>("Only", ""),
        Err(Error::ProductNotFound { .. })
    ));
    assert_eq!(reader.get::<Vec<f64>>("Hits", "a").unwrap(), &vec![2.0]);
}

#[test]
fn test_rebinding_without_end_of_file_drops_missing_products() {
    let first = single_event(&[("Hits", "a", 1.0), ("Only", "a", 5.0)]);
    let second = single_event(&[("Hits", "a", 2.0)]);

    let mut reader = RecordBus::new("ana");
    reader.set_input_tree(first).unwrap();
    assert!(reader.next_event().unwrap());
    reader.get::<Vec<f64>>("Only", "a").unwrap();
    reader.get::<Vec<f64>>("Hits", "a").unwrap();
    reader.clear();

    reader.set_input_tree(second).unwrap();
    assert!(!reader.registry().is_on_board("Only_a"));
    assert!(reader.next_event().unwrap());
    assert!(matches!(
        reader.get::<Vec<f64>>("Only", "a"),
        Err(Error::ProductNotFound { .. })
    ));
    assert_eq!(reader.get::<Vec<f64>>("Hits", "a").unwrap(), &vec![2.0]);
}

#[test]
fn test_ignored_column_is_read_on_request_in_every_file() {
    let files = [
        single_event(&[("SimHits", "sim", 1.0)]),
        single_event(&[("SimHits", "sim", 2.0)]),
    ];

    let mut reader = RecordBus::new("ana");
    reader.add_drop("ignore SimHits").unwrap();
    let mut values = Vec::new();
    for tree in files {
        reader.set_input_tree(tree).unwrap();
        let input = reader.input_tree().unwrap();
        let handle = input.column("SimHits_sim").unwrap();
        assert!(!input.column_at(handle).unwrap().is_read_enabled());

        assert!(reader.next_event().unwrap());
        values.push(reader.get::<Vec<f64>>("SimHits", "").unwrap().clone());
        let input = reader.input_tree().unwrap();
        assert!(input.column_at(handle).unwrap().is_read_enabled());

        reader.clear();
        reader.on_end_of_file();
    }
    assert_eq!(values, vec![vec![1.0], vec![2.0]]);
}

#[test]
fn test_boarded_slot_keeps_reading_ignored_column() {
    let first = single_event(&[("SimHits", "sim", 1.0)]);
    let second = single_event(&[("SimHits", "sim", 2.0)]);

    let mut reader = RecordBus::new("ana");
    reader.add_drop("ignore SimHits").unwrap();
    reader.set_input_tree(first).unwrap();
    assert!(reader.next_event().unwrap());
    assert_eq!(reader.get::<Vec<f64>>("SimHits", "sim").unwrap(), &vec![1.0]);
    reader.clear();

    reader.set_input_tree(second).unwrap();
    let input = reader.input_tree().unwrap();
    let handle = input.column("SimHits_sim").unwrap();
    assert!(input.column_at(handle).unwrap().is_read_enabled());
    assert!(reader.next_event().unwrap());
    assert_eq!(reader.get::<Vec<f64>>("SimHits", "sim").unwrap(), &vec![2.0]);
}

#[test]
fn test_catalog_follows_current_input() {
    let first = single_event(&[("Hits", "a", 1.0), ("Hits", "b", 2.0)]);
    let second = single_event(&[("Hits", "a", 3.0)]);

    let mut reader = RecordBus::new("ana");
    reader.set_input_tree(first).unwrap();
    assert!(reader.next_event().unwrap());
    reader.add("Own", 1_i32).unwrap();
    assert!(matches!(
        reader.get::<Vec<f64>>("Hits", ""),
        Err(Error::ProductAmbiguous { .. })
    ));
    reader.clear();
    reader.on_end_of_file();

    reader.set_input_tree(second).unwrap();
    assert!(reader.next_event().unwrap());
    assert_eq!(reader.get::<Vec<f64>>("Hits", "").unwrap(), &vec![3.0]);
    assert!(reader.products().iter().all(|tag| tag.pass() != "b"));
    assert!(reader.exists("Own", "ana").unwrap());
}
