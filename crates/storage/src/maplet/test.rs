use std::sync::Arc;

use depstore_serialize::Plugin;

use super::{
    Maplet, cache::CachingMaplet, persistent::PersistentMaplet,
    volatile::VolatileMaplet,
};
use crate::{error::Error, multi_maplet::Lifecycle};

type Store = Box<dyn Maplet<String, u64>>;

fn plugin() -> Arc<Plugin> { Arc::new(Plugin::new()) }

fn every_backend(dir: &tempfile::TempDir) -> Vec<(&'static str, Store)> {
    let persistent: Store = Box::new(
        PersistentMaplet::<String, u64>::open(dir.path().join("p"), plugin())
            .unwrap(),
    );
    let volatile: Store = Box::new(VolatileMaplet::<String, u64>::new());
    let cached: Store = Box::new(CachingMaplet::<String, u64, _>::new(
        PersistentMaplet::<String, u64>::open(dir.path().join("c"), plugin())
            .unwrap(),
        4,
    ));

    vec![("persistent", persistent), ("volatile", volatile), ("cached", cached)]
}

#[test]
fn basic_operations() {
    let dir = tempfile::tempdir().unwrap();

    for (name, store) in every_backend(&dir) {
        let key = "src/Foo.java".to_owned();

        assert_eq!(store.get(&key).unwrap(), None, "{name}");
        assert!(!store.contains_key(&key).unwrap(), "{name}");

        store.put(&key, &7).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(7), "{name}");
        assert!(store.contains_key(&key).unwrap(), "{name}");

        store.put(&key, &8).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(8), "{name}");
        assert_eq!(store.keys().unwrap(), vec![key.clone()], "{name}");

        store.remove(&key).unwrap();
        store.remove(&key).unwrap();
        assert_eq!(store.get(&key).unwrap(), None, "{name}");
        assert!(store.keys().unwrap().is_empty(), "{name}");
    }
}

#[test]
fn persistent_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p");
    let key = "k".to_owned();

    {
        let store = PersistentMaplet::<String, u64>::open(&path, plugin())
            .unwrap();
        store.put(&key, &u64::MAX).unwrap();
        store.close().unwrap();
        assert!(matches!(store.get(&key), Err(Error::Closed(_))));
    }

    let store = PersistentMaplet::<String, u64>::open(&path, plugin()).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some(u64::MAX));
}

#[test]
fn cache_remembers_absence_until_written() {
    let cached = CachingMaplet::<String, u64, _>::new(
        VolatileMaplet::<String, u64>::new(),
        4,
    );
    let key = "k".to_owned();

    assert_eq!(cached.get(&key).unwrap(), None);
    assert!(cached.is_cached(&key));

    cached.inner().put(&key, &1).unwrap();
    assert!(!cached.contains_key(&key).unwrap());

    cached.put(&key, &2).unwrap();
    assert!(!cached.is_cached(&key));
    assert_eq!(cached.get(&key).unwrap(), Some(2));
    assert!(cached.contains_key(&key).unwrap());

    cached.remove(&key).unwrap();
    assert_eq!(cached.get(&key).unwrap(), None);
}

#[test]
fn in_memory_maplets_are_debug() {
    let cached = CachingMaplet::<String, u64, _>::new(
        VolatileMaplet::<String, u64>::new(),
        4,
    );
    cached.put(&"k".to_owned(), &1).unwrap();
    assert_eq!(cached.get(&"k".to_owned()).unwrap(), Some(1));

    let shown = format!("{cached:?}");
    assert!(shown.starts_with("CachingMaplet"), "{shown}");
    assert!(shown.contains("VolatileMaplet { len: 1, .. }"), "{shown}");
    assert!(shown.contains("cached: 1"), "{shown}");
}
