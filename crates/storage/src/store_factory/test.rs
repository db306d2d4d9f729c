use std::io;

use tracing_test::traced_test;

use super::*;
use crate::{
    diff_update::{SetDiff, update},
    enumerator::Enumerated,
    multi_maplet::ValueSet,
};

type ModulePath = Enumerated<String>;

fn module(name: &str) -> ModulePath { Enumerated(name.to_owned()) }

#[test]
fn stores_share_the_interning_log() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();

    let usages = factory
        .open_multi_maplet::<ModulePath, u32>("usages", Backend::AppendLog)
        .unwrap();
    let hashes = factory
        .open_maplet::<ModulePath, u64>("hashes", Backend::AppendLog)
        .unwrap();

    usages.append_values(&module("mod/Foo"), &[1, 2]).unwrap();
    hashes.put(&module("mod/Foo"), &0xF00).unwrap();
    hashes.put(&module("mod/Bar"), &0xBA5).unwrap();

    assert_eq!(factory.enumerator().len(), 2);
    assert_eq!(
        factory.enumerator().value_of(0).unwrap(),
        Some(depstore_serialize::encode(&"mod/Foo".to_owned(), &Plugin::new()).unwrap())
    );

    factory.close().unwrap();
}

#[test]
fn contents_survive_factory_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let key = module("mod/Foo");

    {
        let factory =
            StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();
        let log = factory
            .open_multi_maplet::<ModulePath, u32>("log", Backend::AppendLog)
            .unwrap();
        let kv = factory
            .open_multi_maplet::<ModulePath, u32>("kv", Backend::VersionedKv)
            .unwrap();

        log.append_values(&key, &[1, 2]).unwrap();
        log.append_value(&key, &3).unwrap();
        kv.put(&key, &[7].into_iter().collect()).unwrap();

        factory.close().unwrap();
    }

    let factory = StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();
    let log = factory
        .open_multi_maplet::<ModulePath, u32>("log", Backend::AppendLog)
        .unwrap();
    let kv = factory
        .open_multi_maplet::<ModulePath, u32>("kv", Backend::VersionedKv)
        .unwrap();

    assert_eq!(log.get(&key).unwrap(), ValueSet::from_iter([1, 2, 3]));
    assert_eq!(kv.get(&key).unwrap(), ValueSet::from_iter([7]));
    assert_eq!(log.keys().unwrap(), vec![key.clone()]);
    assert_eq!(factory.enumerator().len(), 1);
}

#[test]
fn flushed_ids_survive_drop_without_close() {
    let dir = tempfile::tempdir().unwrap();

    {
        let factory =
            StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();
        let uses = factory
            .open_multi_maplet::<u32, ModulePath>("uses", Backend::AppendLog)
            .unwrap();

        uses.append_value(&1, &module("a")).unwrap();
        uses.flush().unwrap();
    }

    let factory = StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();
    let uses = factory
        .open_multi_maplet::<u32, ModulePath>("uses", Backend::AppendLog)
        .unwrap();

    uses.append_value(&2, &module("zzz")).unwrap();

    assert_eq!(uses.get(&1).unwrap(), ValueSet::from_iter([module("a")]));
    assert_eq!(uses.get(&2).unwrap(), ValueSet::from_iter([module("zzz")]));
    assert_eq!(factory.enumerator().len(), 2);
}

#[test]
fn factory_flush_writes_out_the_interning_log() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();
    let uses = factory
        .open_multi_maplet::<u32, ModulePath>("uses", Backend::VersionedKv)
        .unwrap();

    uses.append_value(&1, &module("mod/Foo")).unwrap();
    let log = factory.enumerator().path().to_path_buf();
    let before = std::fs::metadata(&log).unwrap().len();

    factory.flush().unwrap();
    assert!(std::fs::metadata(&log).unwrap().len() > before);

    factory.close().unwrap();
}

#[test]
fn volatile_stores_do_not_touch_disk() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::open(
        dir.path(),
        StoreConfig::builder().cache(false).shard_amount(4).build(),
    )
    .unwrap();

    let delta = factory
        .open_multi_maplet::<String, u32>("delta", Backend::Volatile)
        .unwrap();
    delta.append_value(&"k".to_owned(), &1).unwrap();

    assert!(!dir.path().join("delta").exists());
    assert!(factory.root().join("enumerator.log").exists());

    factory.close().unwrap();
}

#[test]
fn opening_a_name_twice_fails() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();

    let _first = factory
        .open_multi_maplet::<String, u32>("graph", Backend::AppendLog)
        .unwrap();

    assert!(matches!(
        factory.open_multi_maplet::<String, u32>("graph", Backend::VersionedKv),
        Err(Error::AlreadyOpen(_))
    ));
}

#[test]
fn updates_through_factory_stores() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();
    let store = factory
        .open_multi_maplet::<ModulePath, u32>("usages", Backend::AppendLog)
        .unwrap();
    let key = module("mod/Foo");

    store.append_values(&key, &[1, 2]).unwrap();
    let grown = ValueSet::from_iter([1, 2, 3]);
    update(&*store, &key, &grown, SetDiff::compute).unwrap();

    assert_eq!(store.get(&key).unwrap(), grown);
    factory.flush().unwrap();
}

/// A store whose close always fails.
struct FailingStore;

impl Lifecycle for FailingStore {
    fn flush(&self) -> Result<()> { Ok(()) }

    fn close(&self) -> Result<()> {
        Err(Error::Io(io::Error::other("disk went away")))
    }
}

#[test]
#[traced_test]
fn close_reports_every_failure() {
    let dir = tempfile::tempdir().unwrap();
    let factory = StoreFactory::open(dir.path(), StoreConfig::default()).unwrap();

    factory.register("first", FailingStore);
    let healthy = factory
        .open_multi_maplet::<String, u32>("healthy", Backend::AppendLog)
        .unwrap();
    factory.register("second", FailingStore);

    let enumerator = factory.enumerator().clone();

    let Err(Error::Close(failures)) = factory.close() else {
        panic!("close should report the failing stores");
    };

    assert_eq!(failures.len(), 2);
    assert!(logs_contain("failed to close store"));
    assert!(matches!(healthy.get(&"k".to_owned()), Err(Error::Closed(_))));
    assert!(matches!(enumerator.enumerate(b"x"), Err(Error::Closed(_))));
}
