use altmeta_common::{
    EntityId, MetaLookup, MetaRow, MetaValue, RouterConfig, UpdateOutcome,
};
use altmeta_router::{HookChain, HookFlow, MetaRouter, MetadataHook};
use altmeta_store::{MetaDatabase, MetaObserver, MetaStore, MetadataStore, TableRegistry};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Default)]
struct Deletions {
    rows: Mutex<Vec<(String, String)>>,
}

impl MetaObserver for Deletions {
    fn on_deleted(&self, meta_type: &str, row: &MetaRow) {
        self.rows
            .lock()
            .push((meta_type.to_string(), row.meta_key.clone()));
    }
}

struct Stack {
    db: MetaDatabase,
    chain: HookChain,
    deletions: Arc<Deletions>,
}

impl Stack {
    fn open(dir: &Path) -> Self {
        let registry = TableRegistry::builder("wp_")
            .register("post")
            .unwrap()
            .register("widget")
            .unwrap()
            .build();
        let db = MetaDatabase::open(dir.join("meta.redb"), &registry).unwrap();
        let deletions = Arc::new(Deletions::default());
        db.add_observer(Arc::clone(&deletions) as Arc<dyn MetaObserver>);

        let router = MetaRouter::open(
            &RouterConfig {
                alternate_type: "widget".to_string(),
                host_type: Some("post".to_string()),
            },
            &db,
        )
        .unwrap();
        let mut chain = HookChain::new(Arc::new(db.store("post").unwrap()));
        chain.add_hook(Arc::new(router));

        Self {
            db,
            chain,
            deletions,
        }
    }

    fn widgets(&self) -> MetaStore {
        self.db.store("widget").unwrap()
    }

    fn posts(&self) -> MetaStore {
        self.db.store("post").unwrap()
    }
}

fn e(id: u64) -> EntityId {
    EntityId::new(id)
}

fn v(s: &str) -> MetaValue {
    MetaValue::from(s)
}

#[test]
fn test_prefixed_keys_land_in_alternate_table() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());

    let id = stack.chain.add(e(1), "widget_color", &v("red"), false).unwrap();
    assert!(id.is_some());
    assert_eq!(
        stack.chain.get(e(1), "widget_color", true).unwrap(),
        MetaLookup::Single(Some(v("red")))
    );

    // Stored unprefixed in the alternate table, nothing in the host table
    assert_eq!(
        stack.widgets().get(e(1), "color", true).unwrap(),
        MetaLookup::Single(Some(v("red")))
    );
    assert!(stack.posts().is_empty().unwrap());
}

#[test]
fn test_unprefixed_keys_stay_in_host_table() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());

    for key in ["color", "widgetcolor", "Widget_color", "my_widget_color"] {
        stack.chain.add(e(1), key, &v("x"), false).unwrap();
    }
    stack.chain.update(e(1), "color", &v("y"), None).unwrap();
    assert!(stack.chain.delete(e(1), "widgetcolor", None, false).unwrap());

    assert_eq!(stack.posts().len().unwrap(), 3);
    assert!(stack.widgets().is_empty().unwrap());
    assert_eq!(
        stack.chain.get(e(1), "color", true).unwrap(),
        MetaLookup::Single(Some(v("y")))
    );
}

#[test]
fn test_unique_add_through_router() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());

    assert!(stack.chain.add(e(1), "widget_k", &v("v1"), true).unwrap().is_some());
    assert_eq!(stack.chain.add(e(1), "widget_k", &v("v2"), true).unwrap(), None);
    assert_eq!(
        stack.chain.get(e(1), "widget_k", false).unwrap(),
        MetaLookup::Values(vec![v("v1")])
    );
    assert_eq!(stack.widgets().len().unwrap(), 1);
}

#[test]
fn test_update_through_router() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());

    assert!(matches!(
        stack.chain.update(e(1), "widget_k", &v("v1"), None).unwrap(),
        UpdateOutcome::Inserted(_)
    ));
    assert_eq!(
        stack.chain.update(e(1), "widget_k", &v("v2"), Some(&v("v1"))).unwrap(),
        UpdateOutcome::Updated(1)
    );
    assert_eq!(
        stack.chain.update(e(1), "widget_k", &v("v3"), Some(&v("v1"))).unwrap(),
        UpdateOutcome::Unchanged
    );
    assert_eq!(
        stack.chain.get(e(1), "widget_k", true).unwrap(),
        MetaLookup::Single(Some(v("v2")))
    );
}

#[test]
fn test_delete_scoping_through_router() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());
    stack.chain.add(e(1), "widget_k", &v("a"), false).unwrap();
    stack.chain.add(e(2), "widget_k", &v("b"), false).unwrap();
    stack.chain.add(e(3), "widget_k", &v("c"), false).unwrap();

    assert!(stack.chain.delete(e(1), "widget_k", None, false).unwrap());
    assert_eq!(stack.widgets().len().unwrap(), 2);

    assert!(stack.chain.delete(e(0), "widget_k", None, true).unwrap());
    assert!(stack.widgets().is_empty().unwrap());
}

#[test]
fn test_get_all_reads_host_table_only() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());
    stack.chain.add(e(1), "color", &v("blue"), false).unwrap();
    stack.chain.add(e(1), "widget_color", &v("red"), false).unwrap();

    let MetaLookup::All(all) = stack.chain.get(e(1), "", false).unwrap() else {
        panic!("expected every key of the entity");
    };
    assert_eq!(all.len(), 1);
    assert_eq!(all["color"], vec![v("blue")]);
}

#[test]
fn test_prefix_only_key_on_redb() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());
    stack.chain.add(e(1), "widget_color", &v("red"), false).unwrap();

    assert_eq!(stack.chain.add(e(1), "widget_", &v("x"), false).unwrap(), None);
    assert_eq!(
        stack.chain.update(e(1), "widget_", &v("x"), None).unwrap(),
        UpdateOutcome::Unchanged
    );
    assert_eq!(
        stack.chain.get(e(1), "widget_", true).unwrap(),
        MetaLookup::Single(None)
    );
    assert_eq!(
        stack.chain.get(e(1), "widget_", false).unwrap(),
        MetaLookup::Values(Vec::new())
    );
    assert!(!stack.chain.delete(e(1), "widget_", None, false).unwrap());

    assert_eq!(stack.widgets().len().unwrap(), 1);
    assert!(stack.posts().is_empty().unwrap());
}

#[test]
fn test_permanent_delete_cascades_row_by_row() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());
    for key in ["widget_a", "widget_b", "widget_c"] {
        stack.chain.add(e(7), key, &v("x"), false).unwrap();
    }
    stack.chain.add(e(8), "widget_a", &v("kept"), false).unwrap();
    stack.chain.add(e(7), "color", &v("blue"), false).unwrap();

    assert!(stack.chain.permanently_delete(e(7)).unwrap());

    let deleted = stack.deletions.rows.lock().clone();
    let widget_rows: Vec<_> = deleted
        .iter()
        .filter(|(meta_type, _)| meta_type == "widget")
        .map(|(_, key)| key.as_str())
        .collect();
    assert_eq!(widget_rows.len(), 3);
    for key in ["a", "b", "c"] {
        assert!(widget_rows.contains(&key));
    }
    assert!(deleted.contains(&("post".to_string(), "color".to_string())));

    assert_eq!(stack.widgets().len().unwrap(), 1);
    assert!(stack.posts().is_empty().unwrap());
}

#[test]
fn test_permanent_delete_without_rows() {
    let dir = tempdir().unwrap();
    let stack = Stack::open(dir.path());
    assert!(stack.chain.permanently_delete(e(42)).unwrap());
    assert!(stack.deletions.rows.lock().is_empty());
}

struct Veto;

impl MetadataHook for Veto {
    fn host_type(&self) -> Option<&str> {
        Some("post")
    }

    fn before_permanent_delete(&self, _entity_type: &str, _entity_id: EntityId) -> HookFlow {
        HookFlow::Abort
    }
}

#[test]
fn test_vetoed_delete_keeps_alternate_rows() {
    let dir = tempdir().unwrap();
    let mut stack = Stack::open(dir.path());
    stack.chain.add(e(7), "widget_a", &v("x"), false).unwrap();
    stack.chain.add_delete_hook(altmeta_router::DEFAULT_PRIORITY, Arc::new(Veto));

    assert!(!stack.chain.permanently_delete(e(7)).unwrap());
    assert_eq!(stack.widgets().len().unwrap(), 1);
}

#[test]
fn test_rows_survive_reopen() {
    let dir = tempdir().unwrap();
    let first_id = {
        let stack = Stack::open(dir.path());
        let id = stack.chain.add(e(1), "widget_k", &v("v"), false).unwrap();
        stack.chain.delete(e(1), "widget_k", None, false).unwrap();
        stack.chain.add(e(1), "widget_k", &v("v"), false).unwrap();
        id
    };

    let stack = Stack::open(dir.path());
    assert_eq!(
        stack.chain.get(e(1), "widget_k", true).unwrap(),
        MetaLookup::Single(Some(v("v")))
    );
    let next = stack.chain.add(e(1), "widget_j", &v("w"), false).unwrap();
    assert!(next > first_id);
}
