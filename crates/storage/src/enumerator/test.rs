use std::{io::Write, path::PathBuf};

use tracing_test::traced_test;

use super::*;

fn log_path(dir: &tempfile::TempDir) -> PathBuf { dir.path().join("enum.log") }

#[test]
fn interning_assigns_ordinal_ids() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator = Enumerator::open(log_path(&dir), 1024).unwrap();

    let ids: Vec<u32> = ["", "a", "a", "b"]
        .iter()
        .map(|value| enumerator.enumerate_str(value).unwrap())
        .collect();

    assert_eq!(ids, vec![0, 1, 1, 2]);
    assert_eq!(enumerator.len(), 3);
    assert_eq!(enumerator.value_of(1).unwrap().as_deref(), Some(&b"a"[..]));
    assert_eq!(enumerator.string_of(0).unwrap().as_deref(), Some(""));
    assert_eq!(enumerator.value_of(3).unwrap(), None);
    assert_eq!(enumerator.value_of(u32::MAX).unwrap(), None);
}

#[test]
fn ids_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let enumerator = Enumerator::open(log_path(&dir), 1024).unwrap();
        assert_eq!(enumerator.enumerate_str("java/lang/Object").unwrap(), 0);
        assert_eq!(enumerator.enumerate_str("mod/Foo").unwrap(), 1);
        enumerator.close().unwrap();
    }

    let enumerator = Enumerator::open(log_path(&dir), 1024).unwrap();
    assert_eq!(enumerator.len(), 2);
    assert_eq!(enumerator.enumerate_str("mod/Foo").unwrap(), 1);
    assert_eq!(enumerator.enumerate_str("mod/Bar").unwrap(), 2);
    assert_eq!(
        enumerator.string_of(0).unwrap().as_deref(),
        Some("java/lang/Object")
    );
}

#[test]
fn forced_collisions_compare_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator =
        Enumerator::open_with_hasher(log_path(&dir), 1024, |_| 7).unwrap();

    let first = enumerator.enumerate(b"left").unwrap();
    let second = enumerator.enumerate(b"right").unwrap();

    assert_ne!(first, second);
    assert_eq!(enumerator.enumerate(b"left").unwrap(), first);
    assert_eq!(enumerator.enumerate(b"right").unwrap(), second);
    assert_eq!(enumerator.len(), 2);
}

#[test]
fn zero_hash_values_are_still_found() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator =
        Enumerator::open_with_hasher(log_path(&dir), 1024, |_| 0).unwrap();

    let ids: Vec<u32> = (0..200u32)
        .map(|i| enumerator.enumerate(&i.to_le_bytes()).unwrap())
        .collect();

    for (i, id) in (0..200u32).zip(&ids) {
        assert_eq!(enumerator.enumerate(&i.to_le_bytes()).unwrap(), *id);
    }
    assert_eq!(enumerator.len(), 200);
}

#[test]
fn index_growth_keeps_every_value() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator = Enumerator::open(log_path(&dir), 16).unwrap();

    for i in 0..1000 {
        assert_eq!(enumerator.enumerate_str(&format!("v{i}")).unwrap(), i);
    }
    for i in (0..1000).rev() {
        assert_eq!(enumerator.enumerate_str(&format!("v{i}")).unwrap(), i);
    }
}

#[test]
fn reads_come_from_buffer_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator = Enumerator::open(log_path(&dir), 1 << 20).unwrap();

    enumerator.enumerate_str("buffered").unwrap();
    assert_eq!(
        std::fs::metadata(log_path(&dir)).unwrap().len(),
        HEADER_LEN
    );
    assert_eq!(enumerator.string_of(0).unwrap().as_deref(), Some("buffered"));

    enumerator.flush().unwrap();
    assert!(std::fs::metadata(log_path(&dir)).unwrap().len() > HEADER_LEN);
    assert_eq!(enumerator.string_of(0).unwrap().as_deref(), Some("buffered"));

    enumerator.enumerate_str("second").unwrap();
    assert_eq!(enumerator.string_of(1).unwrap().as_deref(), Some("second"));
    assert_eq!(enumerator.string_of(0).unwrap().as_deref(), Some("buffered"));
}

#[test]
fn for_each_value_visits_in_id_order() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator = Enumerator::open(log_path(&dir), 4).unwrap();

    for value in ["x", "y", "z"] {
        enumerator.enumerate_str(value).unwrap();
    }

    let mut seen = Vec::new();
    enumerator
        .for_each_value(|id, value| seen.push((id, value.to_vec())))
        .unwrap();

    assert_eq!(
        seen,
        vec![(0, b"x".to_vec()), (1, b"y".to_vec()), (2, b"z".to_vec())]
    );
}

#[test]
#[traced_test]
fn torn_tail_is_truncated() {
    let dir = tempfile::tempdir().unwrap();

    {
        let enumerator = Enumerator::open(log_path(&dir), 1024).unwrap();
        enumerator.enumerate_str("kept").unwrap();
        enumerator.close().unwrap();
    }

    let complete_len = std::fs::metadata(log_path(&dir)).unwrap().len();

    {
        let mut file = OpenOptions::new()
            .append(true)
            .open(log_path(&dir))
            .unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(b"partial").unwrap();
    }

    let enumerator = Enumerator::open(log_path(&dir), 1024).unwrap();
    assert!(logs_contain("truncating torn record"));
    assert_eq!(enumerator.len(), 1);
    assert_eq!(
        std::fs::metadata(log_path(&dir)).unwrap().len(),
        complete_len
    );

    assert_eq!(enumerator.enumerate_str("next").unwrap(), 1);
    enumerator.flush().unwrap();
    assert_eq!(enumerator.string_of(1).unwrap().as_deref(), Some("next"));
}

#[test]
fn bad_header_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(log_path(&dir), b"NOPE\x01\x00\x00\x00").unwrap();

    assert!(matches!(
        Enumerator::open(log_path(&dir), 1024),
        Err(Error::Corrupted { .. })
    ));

    std::fs::write(log_path(&dir), b"DSEN\x09\x00\x00\x00").unwrap();
    assert!(matches!(
        Enumerator::open(log_path(&dir), 1024),
        Err(Error::FormatMismatch { .. })
    ));
}

#[test]
fn second_open_of_the_same_log_fails() {
    let dir = tempfile::tempdir().unwrap();
    let _first = Enumerator::open(log_path(&dir), 1024).unwrap();

    assert!(matches!(
        Enumerator::open(log_path(&dir), 1024),
        Err(Error::AlreadyOpen(_))
    ));
}

#[test]
fn closed_log_rejects_use() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator = Enumerator::open(log_path(&dir), 1024).unwrap();

    enumerator.close().unwrap();
    enumerator.close().unwrap();

    assert!(matches!(enumerator.enumerate(b"a"), Err(Error::Closed(_))));
    assert!(matches!(enumerator.value_of(0), Err(Error::Closed(_))));
}

#[test]
fn invalid_utf8_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator = Enumerator::open(log_path(&dir), 1024).unwrap();

    let id = enumerator.enumerate(&[0xFF, 0xFE]).unwrap();
    assert!(matches!(enumerator.string_of(id), Err(Error::Decode { .. })));
}

#[test]
fn enumerated_codec_writes_ids() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator =
        SharedEnumerator::new(Enumerator::open(log_path(&dir), 1024).unwrap());
    let plugin = Plugin::new().with(enumerator.clone());

    let path = Enumerated("src/main/Foo.java".to_owned());
    let bytes = depstore_serialize::encode(&path, &plugin).unwrap();

    assert_eq!(bytes, vec![0]);
    assert_eq!(enumerator.len(), 1);

    let again = depstore_serialize::encode(&path, &plugin).unwrap();
    assert_eq!(again, bytes);

    let decoded: Enumerated<String> =
        depstore_serialize::decode(&bytes, &plugin).unwrap();
    assert_eq!(decoded, path);
}

#[test]
fn enumerated_codec_errors_without_plugin_or_id() {
    let plugin = Plugin::new();

    let err = depstore_serialize::encode(&Enumerated(1u8), &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);

    let dir = tempfile::tempdir().unwrap();
    let plugin = Plugin::new().with(SharedEnumerator::new(
        Enumerator::open(log_path(&dir), 1024).unwrap(),
    ));

    let err =
        depstore_serialize::decode::<Enumerated<u8>>(&[5], &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn concurrent_enumerate_agrees_on_ids() {
    let dir = tempfile::tempdir().unwrap();
    let enumerator = Enumerator::open(log_path(&dir), 64).unwrap();
    let values: Vec<String> = (0..100).map(|i| format!("mod/M{i}")).collect();

    let per_thread: Vec<Vec<u32>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    values
                        .iter()
                        .map(|value| enumerator.enumerate_str(value).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for ids in &per_thread[1..] {
        assert_eq!(ids, &per_thread[0]);
    }
    assert_eq!(enumerator.len(), values.len());

    for (value, id) in values.iter().zip(&per_thread[0]) {
        assert_eq!(enumerator.string_of(*id).unwrap().as_deref(), Some(&**value));
    }
}

#[test]
fn dropping_the_log_writes_out_buffered_values() {
    let dir = tempfile::tempdir().unwrap();

    {
        let enumerator = Enumerator::open(log_path(&dir), 1 << 20).unwrap();
        assert_eq!(enumerator.enumerate_str("a").unwrap(), 0);
        assert_eq!(enumerator.enumerate_str("b").unwrap(), 1);
    }

    let enumerator = Enumerator::open(log_path(&dir), 1 << 20).unwrap();
    assert_eq!(enumerator.len(), 2);
    assert_eq!(enumerator.enumerate_str("zzz").unwrap(), 2);
    assert_eq!(enumerator.string_of(0).unwrap().as_deref(), Some("a"));
}

/// Accepts `room` bytes, then fails every write.
struct ShortWrite {
    contents: Vec<u8>,
    room: usize,
}

impl Write for ShortWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.room == 0 {
            return Err(io::Error::other("device full"));
        }

        let n = buf.len().min(self.room);
        self.contents.extend_from_slice(&buf[..n]);
        self.room -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl LogFile for ShortWrite {
    #[allow(clippy::cast_possible_truncation)]
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.contents.truncate(len as usize);
        Ok(())
    }
}

#[test]
fn failed_write_is_cut_back() {
    let mut file = ShortWrite { contents: b"head".to_vec(), room: 3 };

    assert!(write_records(&mut file, b"record", 4).is_err());
    assert_eq!(file.contents, b"head");

    file.room = 16;
    write_records(&mut file, b"record", 4).unwrap();
    assert_eq!(file.contents, b"headrecord");
}
