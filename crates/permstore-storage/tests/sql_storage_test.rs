//! End-to-end tests of the SQL stores against a SQLite file.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;
use permstore_core::config::StoreConfig;
use permstore_core::errors::{PermstoreErrorCode, PoolError, StorageError};
use permstore_core::traits::{GroupStorage, Storage};
use permstore_core::types::{DataValue, GroupWorld};
use permstore_storage::{SqlBackend, StorageFactory};
use tempfile::TempDir;

fn config(dir: &TempDir) -> StoreConfig {
    let mut config = StoreConfig::default();
    config.storage.uri = Some(dir.path().join("permissions.db").to_string_lossy().into_owned());
    config.pool.max_connections = Some(2);
    config
}

fn backend() -> (SqlBackend, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let backend = SqlBackend::open(&config(&dir)).unwrap();
    (backend, dir)
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn parents(items: &[(&str, &str)]) -> IndexSet<GroupWorld> {
    items.iter().map(|(w, g)| GroupWorld::new(*w, *g)).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// PERMISSIONS & ENTRIES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn permissions_round_trip() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();

    assert!(users.permissions("alice").unwrap().is_empty());
    users.add_permission("alice", "build").unwrap();
    users.add_permission("alice", "build").unwrap();
    users.add_permission("alice", "chat.*").unwrap();
    assert_eq!(users.permissions("alice").unwrap(), set(&["build", "chat.*"]));

    users.remove_permission("alice", "build").unwrap();
    users.remove_permission("alice", "never-granted").unwrap();
    assert_eq!(users.permissions("alice").unwrap(), set(&["chat.*"]));
}

#[test]
fn users_and_groups_with_one_name_are_distinct() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();
    let groups = backend.group_storage("world").unwrap();

    users.add_permission("admin", "user.perm").unwrap();
    groups.add_permission("admin", "group.perm").unwrap();
    assert_eq!(users.permissions("admin").unwrap(), set(&["user.perm"]));
    assert_eq!(groups.permissions("admin").unwrap(), set(&["group.perm"]));
}

#[test]
fn worlds_are_isolated() {
    let (backend, _dir) = backend();
    backend.user_storage("world").unwrap().add_permission("bob", "a").unwrap();
    backend.user_storage("nether").unwrap().add_permission("bob", "b").unwrap();

    assert_eq!(backend.user_storage("world").unwrap().permissions("bob").unwrap(), set(&["a"]));
    assert_eq!(backend.user_storage("nether").unwrap().permissions("bob").unwrap(), set(&["b"]));
    let mut worlds = backend.worlds().unwrap();
    worlds.sort();
    assert_eq!(worlds, vec!["nether".to_string(), "world".to_string()]);
}

#[test]
fn create_list_and_delete_entries() {
    let (backend, _dir) = backend();
    let groups = backend.group_storage("world").unwrap();

    assert!(groups.create("mod").unwrap());
    assert!(!groups.create("mod").unwrap());
    groups.add_permission("admin", "all").unwrap();
    assert_eq!(groups.entries().unwrap(), set(&["admin", "mod"]));

    assert!(groups.delete("admin").unwrap());
    assert!(!groups.delete("admin").unwrap());
    assert!(!groups.delete("ghost").unwrap());
    assert_eq!(groups.entries().unwrap(), set(&["mod"]));
    // Deleting an entry does not resurrect it with old permissions.
    assert!(groups.permissions("admin").unwrap().is_empty());
}

#[test]
fn delete_cascades_to_links_and_data() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();
    let groups = backend.group_storage("world").unwrap();

    groups.add_permission("mod", "kick").unwrap();
    users.add_parent("carol", "world", "mod").unwrap();
    groups.set_data("mod", "prefix", &DataValue::from("[M]")).unwrap();

    assert!(groups.delete("mod").unwrap());
    assert!(users.parents("carol").unwrap().is_empty());
    assert_eq!(groups.get_string("mod", "prefix").unwrap(), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// INHERITANCE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn parents_keep_insertion_order() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();

    users.add_parent("dave", "world", "vip").unwrap();
    users.add_parent("dave", "world", "builder").unwrap();
    users.add_parent("dave", "world", "default").unwrap();
    users.add_parent("dave", "world", "vip").unwrap();
    assert_eq!(
        users.parents("dave").unwrap(),
        parents(&[("world", "vip"), ("world", "builder"), ("world", "default")])
    );

    users.remove_parent("dave", "world", "builder").unwrap();
    users.remove_parent("dave", "world", "nobody").unwrap();
    users.add_parent("dave", "world", "builder").unwrap();
    let order: Vec<_> = users.parents("dave").unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(order, vec!["vip", "default", "builder"]);
}

#[test]
fn parents_may_live_in_other_worlds() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();

    users.add_parent("erin", "nether", "fire").unwrap();
    users.add_parent("erin", "world", "default").unwrap();
    assert_eq!(
        users.parents("erin").unwrap(),
        parents(&[("nether", "fire"), ("world", "default")])
    );
    // The referenced group now exists in its own world.
    let nether = backend.group_storage("nether").unwrap();
    assert!(nether.entries().unwrap().contains("fire"));
}

#[test]
fn set_parents_replaces_and_skips_self_link() {
    let (backend, _dir) = backend();
    let groups = backend.group_storage("world").unwrap();

    groups.add_parent("admin", "world", "old").unwrap();
    groups
        .set_parents(
            "admin",
            &parents(&[("world", "mod"), ("world", "admin"), ("nether", "mod")]),
        )
        .unwrap();
    assert_eq!(
        groups.parents("admin").unwrap(),
        parents(&[("world", "mod"), ("nether", "mod")])
    );

    groups.set_parents("admin", &IndexSet::new()).unwrap();
    assert!(groups.parents("admin").unwrap().is_empty());
}

#[test]
fn self_parent_is_ignored() {
    let (backend, _dir) = backend();
    let groups = backend.group_storage("world").unwrap();
    groups.add_parent("admin", "world", "admin").unwrap();
    groups.add_parent("admin", "world", "mod").unwrap();
    assert_eq!(groups.parents("admin").unwrap(), parents(&[("world", "mod")]));
}

// ═══════════════════════════════════════════════════════════════════════════
// METADATA
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn typed_data_reads_back() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();

    users.set_data("frank", "homes", &DataValue::Int(3)).unwrap();
    users.set_data("frank", "ratio", &DataValue::Double(0.5)).unwrap();
    users.set_data("frank", "muted", &DataValue::Bool(true)).unwrap();
    users.set_data("frank", "prefix", &DataValue::from("[F]")).unwrap();

    assert_eq!(users.get_int("frank", "homes").unwrap(), Some(3));
    assert_eq!(users.get_double("frank", "ratio").unwrap(), Some(0.5));
    assert_eq!(users.get_bool("frank", "muted").unwrap(), Some(true));
    assert_eq!(users.get_string("frank", "prefix").unwrap().as_deref(), Some("[F]"));
    assert_eq!(users.get_string("frank", "homes").unwrap().as_deref(), Some("3"));

    // Unparseable or missing values read as absent.
    assert_eq!(users.get_int("frank", "prefix").unwrap(), None);
    assert_eq!(users.get_bool("frank", "homes").unwrap(), None);
    assert_eq!(users.get_string("frank", "missing").unwrap(), None);

    users.set_data("frank", "homes", &DataValue::Int(4)).unwrap();
    assert_eq!(users.get_int("frank", "homes").unwrap(), Some(4));
    users.remove_data("frank", "homes").unwrap();
    assert_eq!(users.get_int("frank", "homes").unwrap(), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT GROUP & TRACKS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn default_group_is_per_world() {
    let (backend, _dir) = backend();
    let world = backend.group_storage("world").unwrap();
    let nether = backend.group_storage("nether").unwrap();

    assert_eq!(world.default_group().unwrap(), None);
    assert!(!world.is_default("guest").unwrap());

    world.set_default_group("guest").unwrap();
    assert_eq!(world.default_group().unwrap().as_deref(), Some("guest"));
    assert!(world.is_default("guest").unwrap());
    assert!(!nether.is_default("guest").unwrap());

    world.set_default_group("member").unwrap();
    assert!(!world.is_default("guest").unwrap());
    assert!(world.is_default("member").unwrap());

    assert!(world.delete("member").unwrap());
    assert_eq!(world.default_group().unwrap(), None);
}

#[test]
fn tracks_list_ordered_members() {
    let (backend, _dir) = backend();
    let groups = backend.group_storage("world").unwrap();

    let ranks = vec![
        GroupWorld::new("world", "guest"),
        GroupWorld::new("world", "member"),
        GroupWorld::new("nether", "elder"),
    ];
    groups.set_track("ranks", &ranks).unwrap();
    groups.set_track("staff", &[GroupWorld::new("world", "mod")]).unwrap();

    let names: Vec<_> = groups.tracks().unwrap().into_iter().collect();
    assert_eq!(names, vec!["ranks", "staff"]);
    assert_eq!(groups.track("ranks").unwrap(), ranks);

    groups.set_track("ranks", &ranks[..1]).unwrap();
    assert_eq!(groups.track("ranks").unwrap(), ranks[..1].to_vec());
    assert!(groups.track("unknown").unwrap().is_empty());
    assert!(backend.group_storage("nether").unwrap().tracks().unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// BACKEND LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn stores_are_shared_per_world() {
    let (backend, _dir) = backend();
    let a = backend.user_storage("world").unwrap();
    let b = backend.user_storage("world").unwrap();
    let c = backend.user_storage("nether").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert!(Arc::ptr_eq(
        &backend.group_storage("world").unwrap(),
        &backend.group_storage("world").unwrap()
    ));
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let backend = SqlBackend::open(&config(&dir)).unwrap();
        let groups = backend.group_storage("world").unwrap();
        groups.add_permission("admin", "all").unwrap();
        groups.add_parent("admin", "world", "mod").unwrap();
        backend.close();
    }
    let backend = SqlBackend::open(&config(&dir)).unwrap();
    let groups = backend.group_storage("world").unwrap();
    assert_eq!(groups.permissions("admin").unwrap(), set(&["all"]));
    assert_eq!(groups.parents("admin").unwrap(), parents(&[("world", "mod")]));
}

#[test]
fn closed_backend_refuses_work() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();
    users.add_permission("gina", "fly").unwrap();

    backend.close();
    backend.close();
    assert!(backend.is_closed());

    let err = backend.user_storage("world").unwrap_err();
    assert!(matches!(err, StorageError::Pool(PoolError::Unavailable)));
    let err = users.permissions("gina").unwrap_err();
    assert_eq!(err.error_code(), "POOL_UNAVAILABLE");
}

#[test]
fn concurrent_writers_share_the_pool() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();
    std::thread::scope(|s| {
        for t in 0..6 {
            let users = &users;
            s.spawn(move || {
                for i in 0..20 {
                    users.add_permission(&format!("user{t}"), &format!("perm.{i}")).unwrap();
                }
            });
        }
    });
    for t in 0..6 {
        assert_eq!(users.permissions(&format!("user{t}")).unwrap().len(), 20);
    }
    let stats = backend.pool_stats();
    assert!(stats.idle <= stats.capacity);
}

#[test]
fn delete_racing_writes_leaves_no_stale_id() {
    let (backend, _dir) = backend();
    let users = backend.user_storage("world").unwrap();
    std::thread::scope(|s| {
        for t in 0..4 {
            let users = &users;
            s.spawn(move || {
                for _ in 0..25 {
                    // A write that loses the race to a delete may fail; a
                    // later one must not.
                    if t % 2 == 0 {
                        let _ = users.delete("ivan");
                    } else {
                        let _ = users.add_permission("ivan", "p");
                    }
                }
            });
        }
    });
    users.add_permission("ivan", "p").unwrap();
    assert_eq!(users.permissions("ivan").unwrap(), set(&["p"]));
    assert!(users.entries().unwrap().contains("ivan"));

    assert!(users.delete("ivan").unwrap());
    assert!(users.create("ivan").unwrap());
    users.add_permission("ivan", "q").unwrap();
    assert_eq!(users.permissions("ivan").unwrap(), set(&["q"]));
}

// ═══════════════════════════════════════════════════════════════════════════
// FACTORY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn factory_wraps_stores_when_caching() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StorageFactory::open(&config(&dir)).unwrap();
    assert!(factory.is_caching());

    let users = factory.user_storage("world").unwrap();
    let groups = factory.group_storage("world").unwrap();
    assert!(users.is_cached());
    assert!(groups.is_cached());
    assert!(Arc::ptr_eq(&users, &factory.user_storage("world").unwrap()));

    users.add_permission("hank", "build").unwrap();
    assert_eq!(users.permissions("hank").unwrap(), set(&["build"]));
    let raw = factory.backend().user_storage("world").unwrap();
    assert_eq!(raw.permissions("hank").unwrap(), set(&["build"]));
}

#[test]
fn factory_group_delete_clears_cached_parents_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StorageFactory::open(&config(&dir)).unwrap();
    let users = factory.user_storage("world").unwrap();
    let nether_users = factory.user_storage("nether").unwrap();
    let groups = factory.group_storage("world").unwrap();
    assert_eq!(factory.cached_stores(), 3);

    users.add_parent("alice", "world", "admin").unwrap();
    nether_users.add_parent("bob", "world", "admin").unwrap();
    groups.add_parent("mod", "world", "admin").unwrap();
    assert_eq!(users.parents("alice").unwrap().len(), 1);
    assert_eq!(nether_users.parents("bob").unwrap().len(), 1);
    assert_eq!(groups.parents("mod").unwrap().len(), 1);

    assert!(groups.delete("admin").unwrap());
    assert!(users.parents("alice").unwrap().is_empty());
    assert!(nether_users.parents("bob").unwrap().is_empty());
    assert!(groups.parents("mod").unwrap().is_empty());
}

#[test]
fn factory_without_cache_hands_out_sql_stores() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    config.storage.cache = Some(false);
    let factory = StorageFactory::open(&config).unwrap();
    assert!(!factory.is_caching());

    let groups = factory.group_storage("world").unwrap();
    assert!(!groups.is_cached());
    groups.add_permission("admin", "all").unwrap();
    assert!(groups.track("none").unwrap().is_empty());

    factory.close();
    assert!(factory.user_storage("world").is_err());
}
