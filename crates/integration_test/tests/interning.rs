//! Interning-log scenarios through the store factory.

use depstore_integration_test::{
    ModulePath, Usage, UsageKind, create_test_factory, module, usages,
};
use depstore_storage::{Backend, Enumerator, MultiMaplet};
use tempfile::tempdir;

#[test]
fn ordinal_ids_for_repeated_values() {
    let tempdir = tempdir().unwrap();
    let enumerator =
        Enumerator::open(tempdir.path().join("strings.log"), 4096).unwrap();

    let ids = ["", "a", "a", "b"]
        .into_iter()
        .map(|value| enumerator.enumerate_str(value).unwrap())
        .collect::<Vec<_>>();

    assert_eq!(ids, vec![0, 1, 1, 2]);
    assert_eq!(enumerator.string_of(1).unwrap().as_deref(), Some("a"));
}

#[test]
fn keys_and_values_share_ids() {
    let tempdir = tempdir().unwrap();
    let factory = create_test_factory(&tempdir);

    let uses = factory
        .open_multi_maplet::<ModulePath, Usage>("uses", Backend::AppendLog)
        .unwrap();
    let used_by = factory
        .open_multi_maplet::<ModulePath, Usage>("used_by", Backend::VersionedKv)
        .unwrap();

    uses.append_value(&module("mod/A"), &Usage::new("mod/B", UsageKind::Call))
        .unwrap();
    used_by
        .append_value(&module("mod/B"), &Usage::new("mod/A", UsageKind::Call))
        .unwrap();

    // two distinct paths, each interned once across both stores
    assert_eq!(factory.enumerator().len(), 2);

    factory.close().unwrap();
}

#[test]
fn interned_paths_resolve_after_reopen() {
    let tempdir = tempdir().unwrap();
    let edges =
        usages(&[("mod/U1", UsageKind::Import), ("mod/U2", UsageKind::Inherit)]);

    {
        let factory = create_test_factory(&tempdir);
        let store = factory
            .open_multi_maplet::<ModulePath, Usage>("uses", Backend::AppendLog)
            .unwrap();
        store.put(&module("mod/Foo"), &edges).unwrap();
        factory.close().unwrap();
    }

    let factory = create_test_factory(&tempdir);
    let store = factory
        .open_multi_maplet::<ModulePath, Usage>("uses", Backend::AppendLog)
        .unwrap();

    assert_eq!(store.get(&module("mod/Foo")).unwrap(), edges);
    assert_eq!(store.keys().unwrap(), vec![module("mod/Foo")]);
    assert_eq!(factory.enumerator().len(), 3);
}
