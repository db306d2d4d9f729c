use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    io,
};

use super::*;
use crate::Plugin;

#[test]
fn varint_u32_values() {
    let plugin = Plugin::new();
    let test_values: &[u32] =
        &[0, 1, 127, 128, 255, 256, 16383, 16384, u32::MAX / 2, u32::MAX];

    for &value in test_values {
        let bytes = encode(&value, &plugin).unwrap();
        let decoded: u32 = decode(&bytes, &plugin).unwrap();
        assert_eq!(value, decoded, "mismatch for {value}");
    }
}

#[test]
fn zigzag_keeps_small_negatives_short() {
    let plugin = Plugin::new();

    assert_eq!(encode(&-1i32, &plugin).unwrap(), vec![1]);
    assert_eq!(encode(&1i32, &plugin).unwrap(), vec![2]);
    assert_eq!(encode(&-64i64, &plugin).unwrap(), vec![127]);

    for value in [i32::MIN, -65, 0, 64, i32::MAX] {
        let bytes = encode(&value, &plugin).unwrap();
        assert_eq!(decode::<i32>(&bytes, &plugin).unwrap(), value);
    }
}

#[test]
fn varint_compactness() {
    let plugin = Plugin::new();

    assert_eq!(encode(&0u32, &plugin).unwrap().len(), 1);
    assert_eq!(encode(&127u32, &plugin).unwrap().len(), 1);
    assert_eq!(encode(&128u32, &plugin).unwrap().len(), 2);
    assert_eq!(encode(&u64::MAX, &plugin).unwrap().len(), 10);
}

#[test]
#[allow(clippy::float_cmp)]
fn floats_are_fixed_width() {
    let plugin = Plugin::new();

    let bytes = encode(&std::f32::consts::PI, &plugin).unwrap();
    assert_eq!(bytes.len(), 4);
    assert_eq!(decode::<f32>(&bytes, &plugin).unwrap(), std::f32::consts::PI);

    let bytes = encode(&std::f64::consts::E, &plugin).unwrap();
    assert_eq!(bytes.len(), 8);
    assert_eq!(decode::<f64>(&bytes, &plugin).unwrap(), std::f64::consts::E);
}

#[test]
fn string_and_empty_string() {
    let plugin = Plugin::new();

    let bytes = encode("mod/Foo", &plugin).unwrap();
    assert_eq!(bytes[0], 7);
    assert_eq!(decode::<String>(&bytes, &plugin).unwrap(), "mod/Foo");

    let bytes = encode("", &plugin).unwrap();
    assert_eq!(bytes, vec![0]);
    assert_eq!(decode::<String>(&bytes, &plugin).unwrap(), "");
}

#[test]
fn equal_sets_encode_identically() {
    let plugin = Plugin::new();

    let a: BTreeSet<u32> = [3, 1, 2].into_iter().collect();
    let b: BTreeSet<u32> = [2, 3, 1].into_iter().collect();

    assert_eq!(encode(&a, &plugin).unwrap(), encode(&b, &plugin).unwrap());
}

#[test]
fn equal_hash_collections_encode_identically() {
    let plugin = Plugin::new();

    let small: HashSet<u32> = (0..64).collect();
    let mut large = HashSet::with_capacity(4096);
    large.extend((0..64).rev());
    assert_eq!(small, large);

    let bytes = encode(&small, &plugin).unwrap();
    assert_eq!(bytes, encode(&large, &plugin).unwrap());
    assert_eq!(decode::<HashSet<u32>>(&bytes, &plugin).unwrap(), small);

    let forward: HashMap<String, u8> =
        (0..32u8).map(|i| (format!("k{i}"), i)).collect();
    let mut backward = HashMap::with_capacity(1024);
    backward.extend((0..32u8).rev().map(|i| (format!("k{i}"), i)));

    assert_eq!(
        encode(&forward, &plugin).unwrap(),
        encode(&backward, &plugin).unwrap()
    );
}

#[test]
fn collections() {
    let plugin = Plugin::new();

    let set: HashSet<String> =
        ["a".to_owned(), "b".to_owned()].into_iter().collect();
    let bytes = encode(&set, &plugin).unwrap();
    assert_eq!(decode::<HashSet<String>>(&bytes, &plugin).unwrap(), set);

    let map: BTreeMap<u8, Option<i64>> =
        [(1, None), (2, Some(-5))].into_iter().collect();
    let bytes = encode(&map, &plugin).unwrap();
    assert_eq!(decode::<BTreeMap<u8, Option<i64>>>(&bytes, &plugin).unwrap(), map);

    let tuple = (7u16, "x".to_owned(), vec![true, false]);
    let bytes = encode(&tuple, &plugin).unwrap();
    assert_eq!(
        decode::<(u16, String, Vec<bool>)>(&bytes, &plugin).unwrap(),
        tuple
    );
}

#[test]
fn trailing_bytes_are_rejected() {
    let plugin = Plugin::new();

    let mut bytes = encode(&5u32, &plugin).unwrap();
    bytes.push(0);

    let err = decode::<u32>(&bytes, &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn truncated_input_is_unexpected_eof() {
    let plugin = Plugin::new();

    let bytes = encode("hello", &plugin).unwrap();
    let err = decode::<String>(&bytes[..3], &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

    let err = decode::<u32>(&[0x80], &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
}

#[test]
fn oversized_length_prefix_does_not_allocate() {
    let plugin = Plugin::new();

    let mut bytes = Vec::new();
    PostcardEncoder::new(&mut bytes).emit_u64(u64::from(u32::MAX)).unwrap();
    bytes.extend_from_slice(b"abc");

    let err = decode::<Vec<u8>>(&bytes, &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
}

#[test]
fn invalid_bool_and_option_tags() {
    let plugin = Plugin::new();

    let err = decode::<bool>(&[2], &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    let err = decode::<Option<u8>>(&[9, 0], &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn overlong_varint_is_invalid() {
    let plugin = Plugin::new();

    let err = decode::<u16>(&[0xFF, 0xFF, 0xFF, 0x01], &plugin).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}
