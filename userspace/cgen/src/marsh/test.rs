#![cfg(test)]

use bytes::{BufMut, Bytes, BytesMut};
use test_case::test_case;

use super::{Marsh, Tag, MAGIC, VERSION};
use crate::DecodeError;

fn sample() -> Marsh {
    Marsh::node(
        Tag::Cgen,
        [
            Marsh::leaf(Tag::Front, vec![1u8]),
            Marsh::node(
                Tag::ProgramSet,
                [
                    Marsh::leaf(Tag::Program, Bytes::from_static(b"first")),
                    Marsh::leaf(Tag::Program, Bytes::from_static(b"second")),
                ],
            )
            .unwrap(),
        ],
    )
    .unwrap()
}

#[test]
fn nested_elements_survive_a_snapshot() {
    let snapshot = sample().to_snapshot().unwrap();
    let root = Marsh::from_snapshot(&snapshot).unwrap().expect(Tag::Cgen).unwrap();

    let mut children = root.children();
    let front = children.expect(Tag::Front).unwrap();
    assert_eq!(&front.data()[..], &[1u8]);

    let programs = children.expect(Tag::ProgramSet).unwrap();
    children.finish().unwrap();

    let payloads = programs
        .children()
        .map(|child| child.unwrap().data().to_vec())
        .collect::<Vec<_>>();
    assert_eq!(payloads, vec![b"first".to_vec(), b"second".to_vec()]);
}

#[test]
fn empty_node_has_no_children() {
    let node = Marsh::node(Tag::ProgramSet, Vec::new()).unwrap();
    assert!(node.data().is_empty());
    assert_eq!(node.children().count(), 0);
}

#[test]
fn snapshot_header_is_checked() {
    let snapshot = sample().to_snapshot().unwrap();

    let mut bad_magic = snapshot.to_vec();
    bad_magic[0] = b'X';
    assert!(matches!(
        Marsh::from_snapshot(&bad_magic),
        Err(DecodeError::BadMagic)
    ));

    let mut bad_version = snapshot.to_vec();
    bad_version[MAGIC.len()..MAGIC.len() + 2].copy_from_slice(&(VERSION + 1).to_le_bytes());
    assert!(matches!(
        Marsh::from_snapshot(&bad_version),
        Err(DecodeError::UnsupportedVersion(v)) if v == VERSION + 1
    ));
}

#[test_case(0; "empty")]
#[test_case(3; "inside magic")]
#[test_case(8; "inside header")]
#[test_case(12; "inside payload")]
fn truncated_snapshot_is_rejected(len: usize) {
    let snapshot = sample().to_snapshot().unwrap();
    assert!(matches!(
        Marsh::from_snapshot(&snapshot[..len]),
        Err(DecodeError::Truncated { .. })
    ));
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut snapshot = sample().to_snapshot().unwrap().to_vec();
    snapshot.push(0);
    assert!(matches!(
        Marsh::from_snapshot(&snapshot),
        Err(DecodeError::TrailingBytes(1))
    ));
}

#[test]
fn unknown_tag_is_rejected() {
    let mut buf = BytesMut::new();
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u8(0xAA);
    buf.put_u32_le(0);
    assert!(matches!(
        Marsh::from_snapshot(&buf),
        Err(DecodeError::UnknownTag(0xAA))
    ));
}

#[test]
fn unexpected_and_missing_children_are_reported() {
    let root = sample();
    let mut children = root.children();
    assert!(matches!(
        children.expect(Tag::Chain),
        Err(DecodeError::UnexpectedTag {
            expected: Tag::Chain,
            found: Tag::Front
        })
    ));

    let mut children = root.children();
    children.expect(Tag::Front).unwrap();
    assert!(matches!(
        children.finish(),
        Err(DecodeError::Extra(Tag::ProgramSet))
    ));

    let leaf = Marsh::leaf(Tag::Front, vec![0u8]);
    let mut children = Marsh::node(Tag::Cgen, [leaf]).unwrap().children();
    children.expect(Tag::Front).unwrap();
    assert!(matches!(
        children.expect(Tag::Chain),
        Err(DecodeError::Missing(Tag::Chain))
    ));
}

#[test]
fn corrupted_child_stops_iteration() {
    // A child claiming more bytes than its parent holds
    let mut data = BytesMut::new();
    data.put_u8(Tag::Program as u8);
    data.put_u32_le(64);
    data.put_slice(b"short");
    let node = Marsh::leaf(Tag::ProgramSet, data.freeze());

    let mut children = node.children();
    assert!(matches!(
        children.next(),
        Some(Err(DecodeError::Truncated { .. }))
    ));
    assert!(children.next().is_none());
}
