//! Array wrapper.
//!
//! Writes trigger exactly what changed: each index whose value differs or
//! that was removed, `Length` when the length moved, and `Iterate` when
//! anything moved at all. Truncation therefore notifies readers of every
//! removed index, however far from the end they read.
//!
//! Writes at the end (`push`, `pop`, `set`, `set_len`) derive their keys
//! from the operation and cost no more than the elements they touch.
//! Writes that shift elements diff only the range that moved; sorting and
//! reversing diff a full copy, since the comparator is user code and may
//! read the array.
//!
//! Lengths are capped at 2^32 - 1 and indices below that, as in JS. Writes
//! past the cap are no-ops.

use std::cell::RefCell;
use std::cmp::Ordering;

use super::{relative_index, Handle, Reactive};
use crate::graph::{Dep, TrackKey};
use crate::value::{Raw, RawBody, Value};

/// A tracked view over an array.
#[derive(Clone)]
pub struct ReactiveArray {
    handle: Handle,
}

/// Largest array length.
pub const MAX_LENGTH: usize = u32::MAX as usize;

/// Keys touched by turning `old` into `new`, both starting at index
/// `offset` and running to the end of the array.
fn diff(offset: usize, old: &[Value], new: &[Value]) -> Vec<TrackKey> {
    let mut keys: Vec<TrackKey> = (0..old.len().max(new.len()))
        .filter(|&i| match (old.get(i), new.get(i)) {
            (Some(a), Some(b)) => !a.same_value(b),
            _ => true,
        })
        .map(|i| TrackKey::Index(offset + i))
        .collect();

    if old.len() != new.len() {
        keys.push(TrackKey::Length);
    }
    if !keys.is_empty() {
        keys.push(TrackKey::Iterate);
    }
    keys
}

/// JS default sort order: by string conversion, `undefined` last.
fn default_order(a: &Value, b: &Value) -> Ordering {
    a.to_display_string().cmp(&b.to_display_string())
}

/// Sort with `undefined` always last, the way JS sorts do.
fn sort_values(items: &mut Vec<Value>, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
    let undefined = items.iter().filter(|v| v.is_undefined()).count();
    items.retain(|v| !v.is_undefined());
    items.sort_by(|a, b| compare(a, b));
    items.extend(std::iter::repeat(Value::Undefined).take(undefined));
}

impl ReactiveArray {
    pub(super) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub(super) fn handle(&self) -> &Handle {
        &self.handle
    }

    fn items(&self) -> &RefCell<Vec<Value>> {
        match self.handle.raw.body() {
            RawBody::Array(items) => items,
            _ => unreachable!("array wrapper over a {:?}", self.handle.raw.kind()),
        }
    }

    /// Apply `edit` to a copy of the elements, store the result and trigger
    /// whatever changed. `edit` runs without any borrow held, so it may call
    /// back into user code.
    fn edit<R>(&self, edit: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let old = self.items().borrow().clone();
        let mut new = old.clone();
        let out = edit(&mut new);

        let keys = diff(0, &old, &new);
        if !keys.is_empty() {
            *self.items().borrow_mut() = new;
            self.handle.mutated(keys);
        }
        out
    }

    /// Apply `edit` in place, diffing only the elements from `from` (clamped
    /// to the length) onward. `edit` must not call user code and must leave
    /// everything before `from` alone.
    fn edit_tail<R>(&self, from: usize, edit: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let (out, keys) = {
            let mut items = self.items().borrow_mut();
            let from = from.min(items.len());
            let old = items[from..].to_vec();
            let out = edit(&mut *items);
            (out, diff(from, &old, &items[from..]))
        };
        if !keys.is_empty() {
            self.handle.mutated(keys);
        }
        out
    }

    fn track_iteration(&self) {
        self.handle.track_all([TrackKey::Iterate, TrackKey::Length]);
    }

    pub fn to_raw(&self) -> Raw {
        self.handle.raw.clone()
    }

    pub fn dep(&self) -> &Dep {
        &self.handle.dep
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read an element. Out-of-range reads are `undefined`.
    pub fn get(&self, index: usize) -> Value {
        self.handle.track(TrackKey::Index(index));
        self.items().borrow().get(index).cloned().unwrap_or_default()
    }

    /// A tracked view of a nested container.
    pub fn child(&self, index: usize) -> Option<Reactive> {
        let value = self.get(index);
        self.handle.wrap(&value)
    }

    pub fn len(&self) -> usize {
        self.handle.track(TrackKey::Length);
        self.items().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track_iteration();
        self.items().borrow().clone()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Value> {
        self.to_vec().into_iter()
    }

    /// SameValueZero membership, like `Array.prototype.includes`.
    pub fn includes(&self, value: &Value) -> bool {
        self.track_iteration();
        self.items().borrow().iter().any(|v| v == value)
    }

    /// Strict-equality search, like `Array.prototype.indexOf`: `NaN` is
    /// never found.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.track_iteration();
        if matches!(value, Value::Number(n) if n.is_nan()) {
            return None;
        }
        self.items().borrow().iter().position(|v| v == value)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write an element, growing the array (with `undefined` gaps) if
    /// needed. Returns whether anything changed; indices at or past
    /// [`MAX_LENGTH`] change nothing.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        if index >= MAX_LENGTH {
            return false;
        }
        let value = value.into();
        let grew = {
            let mut items = self.items().borrow_mut();
            if index < items.len() {
                if items[index].same_value(&value) {
                    return false;
                }
                items[index] = value;
                false
            } else {
                items.resize(index, Value::Undefined);
                items.push(value);
                true
            }
        };

        if grew {
            self.handle
                .mutated([TrackKey::Index(index), TrackKey::Length, TrackKey::Iterate]);
        } else {
            self.handle.mutated([TrackKey::Index(index), TrackKey::Iterate]);
        }
        true
    }

    /// Set the length, truncating or padding with `undefined`. Returns
    /// whether the length changed; lengths past [`MAX_LENGTH`] change
    /// nothing.
    pub fn set_len(&self, len: usize) -> bool {
        if len > MAX_LENGTH {
            return false;
        }
        let old_len = {
            let mut items = self.items().borrow_mut();
            let old_len = items.len();
            items.resize(len, Value::Undefined);
            old_len
        };

        if len == old_len {
            return false;
        }
        // Padding reads as `undefined` before and after; only removed
        // indices change.
        self.handle.mutated(
            (len..old_len)
                .map(TrackKey::Index)
                .chain([TrackKey::Length, TrackKey::Iterate]),
        );
        true
    }

    /// Append elements. Returns the new length. Appending past
    /// [`MAX_LENGTH`] appends nothing.
    pub fn push(&self, values: impl IntoIterator<Item = impl Into<Value>>) -> usize {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let (old_len, new_len) = {
            let mut items = self.items().borrow_mut();
            let old_len = items.len();
            if values.is_empty() || values.len() > MAX_LENGTH - old_len {
                return old_len;
            }
            items.extend(values);
            (old_len, items.len())
        };

        self.handle.mutated(
            (old_len..new_len)
                .map(TrackKey::Index)
                .chain([TrackKey::Length, TrackKey::Iterate]),
        );
        new_len
    }

    /// Remove the last element.
    pub fn pop(&self) -> Option<Value> {
        let (popped, index) = {
            let mut items = self.items().borrow_mut();
            let popped = items.pop()?;
            (popped, items.len())
        };
        self.handle
            .mutated([TrackKey::Index(index), TrackKey::Length, TrackKey::Iterate]);
        Some(popped)
    }

    /// Remove the first element.
    pub fn shift(&self) -> Option<Value> {
        self.edit_tail(0, |items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// Prepend elements, keeping their order. Returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = impl Into<Value>>) -> usize {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.edit_tail(0, |items| {
            if values.len() <= MAX_LENGTH - items.len() {
                items.splice(0..0, values);
            }
            items.len()
        })
    }

    /// Remove `delete_count` elements at `start` (relative) and insert
    /// `values` in their place. Returns the removed elements.
    pub fn splice(
        &self,
        start: isize,
        delete_count: usize,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Vec<Value> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let start = relative_index(start, self.items().borrow().len());
        self.edit_tail(start, |items| {
            let end = start + delete_count.min(items.len() - start);
            if values.len() > MAX_LENGTH - (items.len() - (end - start)) {
                return Vec::new();
            }
            items.splice(start..end, values).collect()
        })
    }

    /// Sort in JS default order (by string conversion, `undefined` last).
    pub fn sort(&self) {
        self.edit(|items| sort_values(items, default_order));
    }

    /// Sort with a comparator. `undefined` elements still go last.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        self.edit(|items| sort_values(items, compare));
    }

    pub fn reverse(&self) {
        self.edit(|items| items.reverse());
    }

    /// Fill `start..end` (relative, `end` defaulting to the length) with
    /// `value`.
    pub fn fill(&self, value: impl Into<Value>, start: isize, end: Option<isize>) {
        let value = value.into();
        let changed: Vec<TrackKey> = {
            let mut items = self.items().borrow_mut();
            let len = items.len();
            let start = relative_index(start, len);
            let end = end.map_or(len, |end| relative_index(end, len));
            let mut changed = Vec::new();
            for (i, item) in items.iter_mut().enumerate().take(end).skip(start) {
                if !item.same_value(&value) {
                    *item = value.clone();
                    changed.push(TrackKey::Index(i));
                }
            }
            changed
        };
        self.trigger_in_place(changed);
    }

    /// Copy `start..end` to `target` within the array, without changing its
    /// length. All positions are relative.
    pub fn copy_within(&self, target: isize, start: isize, end: Option<isize>) {
        let changed: Vec<TrackKey> = {
            let mut items = self.items().borrow_mut();
            let len = items.len();
            let target = relative_index(target, len);
            let start = relative_index(start, len);
            let end = end.map_or(len, |end| relative_index(end, len));
            let count = end.saturating_sub(start).min(len - target);
            let source: Vec<Value> = items[start..start + count].to_vec();
            source
                .into_iter()
                .enumerate()
                .filter_map(|(offset, value)| {
                    let slot = &mut items[target + offset];
                    if slot.same_value(&value) {
                        return None;
                    }
                    *slot = value;
                    Some(TrackKey::Index(target + offset))
                })
                .collect()
        };
        self.trigger_in_place(changed);
    }

    /// Trigger indices rewritten without a change of length.
    fn trigger_in_place(&self, mut keys: Vec<TrackKey>) {
        if keys.is_empty() {
            return;
        }
        keys.push(TrackKey::Iterate);
        self.handle.mutated(keys);
    }
}

impl std::fmt::Debug for ReactiveArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReactiveArray({:?})", self.handle.raw)
    }
}
