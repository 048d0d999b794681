//! Wrapped arrays, maps and sets observed by watchers.

mod common;

use common::{deferred, immediate, recorder};
use ripple_core::{Raw, Value, WatchOptions};

#[tokio::test]
async fn truncating_an_array_reaches_every_index_watcher() {
    const N: usize = 2000;
    const I: usize = 1500;

    let rt = deferred();
    let list = rt.wrap(&Raw::array(0..N)).as_array().cloned().unwrap();
    let (calls, callback) = recorder();

    let reader = list.clone();
    let _watch = rt.watch(move || reader.get(I), callback, WatchOptions::default());

    list.set_len(0);
    rt.next_tick().await.unwrap();

    assert_eq!(*calls.borrow(), [(Value::Undefined, Value::from(I))]);
    assert!(list.is_empty());
}

#[tokio::test]
async fn length_readers_see_pushes_and_pops() {
    let rt = deferred();
    let list = rt.wrap(&Raw::array([1, 2, 3])).as_array().cloned().unwrap();
    let (calls, callback) = recorder();

    let reader = list.clone();
    let _watch = rt.watch(move || Value::from(reader.len()), callback, WatchOptions::default());

    list.push([4, 5]);
    list.pop();
    rt.next_tick().await.unwrap();
    assert_eq!(*calls.borrow(), [(Value::from(4), Value::from(3))]);

    // Length unchanged, so nothing to report.
    list.reverse();
    rt.next_tick().await.unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[tokio::test]
async fn clearing_a_large_map_notifies_single_key_watchers() {
    const M: i32 = 2000;

    let rt = deferred();
    let map = rt
        .wrap(&Raw::map((0..M).map(|i| (i, i * 10))))
        .as_map()
        .cloned()
        .unwrap();
    let (calls, callback) = recorder();

    let reader = map.clone();
    let key = Value::from(M - 1);
    let _watch = rt.watch(move || reader.get(&key), callback, WatchOptions::default());

    map.clear();
    rt.next_tick().await.unwrap();

    assert_eq!(*calls.borrow(), [(Value::Undefined, Value::from((M - 1) * 10))]);
    assert_eq!(map.size(), 0);
}

#[tokio::test]
async fn clearing_a_large_set_notifies_membership_watchers() {
    const M: i32 = 2000;

    let rt = deferred();
    let set = rt.wrap(&Raw::set(0..M)).as_set().cloned().unwrap();
    let (calls, callback) = recorder();

    let reader = set.clone();
    let _watch = rt.watch(
        move || Value::from(reader.has(&Value::from(0))),
        callback,
        WatchOptions::default(),
    );

    set.clear();
    rt.next_tick().await.unwrap();

    assert_eq!(*calls.borrow(), [(Value::from(false), Value::from(true))]);
}

#[test]
fn map_entries_are_fresh_instances() {
    let rt = immediate();
    let map = rt
        .wrap(&Raw::map([("a", 1), ("b", 2)]))
        .as_map()
        .cloned()
        .unwrap();

    let first = map.entry_values();
    let second = map.entry_values();
    assert_eq!(first.len(), 2);
    assert!(!first[0].same_identity(&first[1]));
    assert!(!first[0].same_identity(&second[0]));

    let pair = first[0].as_raw().unwrap();
    assert_eq!(pair.get_index(0), Some(Value::from("a")));
    assert_eq!(pair.get_index(1), Some(Value::from(1)));
}

#[test]
fn nested_containers_share_one_wrapper() {
    let rt = immediate();
    let inner = Raw::map([("k", 1)]);
    let list = rt
        .wrap(&Raw::array([Value::from(inner.clone()), Value::from(inner.clone())]))
        .as_array()
        .cloned()
        .unwrap();

    let a = list.child(0).unwrap();
    let b = list.child(1).unwrap();
    assert!(a.ptr_eq(&b));
    assert!(a.to_raw().ptr_eq(&inner));
}

#[test]
fn splice_reports_removed_items_to_index_watchers() {
    let rt = immediate();
    let list = rt
        .wrap(&Raw::array(["a", "b", "c", "d"]))
        .as_array()
        .cloned()
        .unwrap();
    let (calls, callback) = recorder();

    let reader = list.clone();
    let _watch = rt.watch(move || reader.get(2), callback, WatchOptions::default());

    let removed = list.splice(1, 1, Vec::<Value>::new());
    assert_eq!(removed, [Value::from("b")]);
    assert_eq!(*calls.borrow(), [(Value::from("d"), Value::from("c"))]);

    // A write that leaves index 2 alone does not reach it.
    list.set(0, "z");
    assert_eq!(calls.borrow().len(), 1);
}
