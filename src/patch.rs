use crate::value::{Key, Value};
use tracing::warn;

/// A description of a transition between two model values, structured enough
/// to be routed to the sub-parts of a tree it affects.
///
/// `Splice` carries the removed and inserted slices rather than a removal
/// count so every patch kind is invertible.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch {
	/// Whole-value replacement. Both endpoints are carried so the patch can be
	/// inverted and so nested structures can be re-diffed through projections.
	Replace { prev: Value, next: Value },
	/// The change is localized to one field or index; `patch` describes the
	/// change to that entry's value.
	Key { key: Key, patch: Box<Patch> },
	/// Structural edit of a sequence at `index`.
	Splice { index: usize, remove: Vec<Value>, insert: Vec<Value> },
	/// Exchange of two sequence positions.
	Swap { first: usize, second: usize },
	/// Ordered composite. Each sub-patch applies to the result of the one
	/// before it. The empty batch is the identity patch.
	Batch(Vec<Patch>),
}

impl Patch {
	/// The identity patch.
	#[must_use]
	pub fn noop() -> Self {
		Patch::Batch(Vec::new())
	}

	#[must_use]
	pub fn replace(prev: Value, next: Value) -> Self {
		Patch::Replace { prev, next }
	}

	#[must_use]
	pub fn batch<I: IntoIterator<Item = Patch>>(patches: I) -> Self {
		Patch::Batch(patches.into_iter().collect())
	}

	/// Localizes `patch` under a key path, innermost key last.
	#[must_use]
	pub fn at<I, K>(path: I, patch: Patch) -> Self
	where
		I: IntoIterator<Item = K>,
		K: Into<Key>,
	{
		let keys: Vec<Key> = path.into_iter().map(Into::into).collect();
		keys.into_iter().rev().fold(patch, |patch, key| Patch::Key { key, patch: Box::new(patch) })
	}

	/// Appends `items` to the sequence currently held by `seq`.
	#[must_use]
	pub fn push(seq: &Value, items: Vec<Value>) -> Self {
		Patch::Splice { index: seq.items().len(), remove: Vec::new(), insert: items }
	}

	/// Prepends `items` to a sequence.
	#[must_use]
	pub fn unshift(items: Vec<Value>) -> Self {
		Patch::Splice { index: 0, remove: Vec::new(), insert: items }
	}

	/// Removes the element at `index` of the sequence currently held by `seq`,
	/// capturing the removed value for invertibility.
	#[must_use]
	pub fn remove_at(seq: &Value, index: usize) -> Self {
		let removed = seq.items()[index].clone();
		Patch::Splice { index, remove: vec![removed], insert: Vec::new() }
	}

	/// Replaces `count` elements at `index` of the sequence currently held by
	/// `seq` with `insert`, capturing the removed slice.
	#[must_use]
	pub fn splice_at(seq: &Value, index: usize, count: usize, insert: Vec<Value>) -> Self {
		let remove = seq.items()[index..index + count].to_vec();
		Patch::Splice { index, remove, insert }
	}

	#[must_use]
	pub fn swap(first: usize, second: usize) -> Self {
		Patch::Swap { first, second }
	}

	/// The shallow diff: the identity patch when the values compare equal,
	/// whole-value replacement otherwise. Structural patches are produced by
	/// callers that know what changed, never inferred here.
	#[must_use]
	pub fn diff(prev: &Value, next: &Value) -> Self {
		if prev == next {
			Patch::noop()
		} else {
			Patch::Replace { prev: prev.clone(), next: next.clone() }
		}
	}

	/// Whether applying this patch can change any value.
	#[must_use]
	pub fn is_noop(&self) -> bool {
		match self {
			Patch::Batch(patches) => patches.iter().all(Patch::is_noop),
			Patch::Key { patch, .. } => patch.is_noop(),
			Patch::Replace { .. } | Patch::Splice { .. } | Patch::Swap { .. } => false,
		}
	}

	/// The patch undoing this one. Batches invert each sub-patch and reverse
	/// their order.
	#[must_use]
	pub fn invert(&self) -> Self {
		match self {
			Patch::Replace { prev, next } => Patch::Replace { prev: next.clone(), next: prev.clone() },
			Patch::Key { key, patch } => Patch::Key { key: key.clone(), patch: Box::new(patch.invert()) },
			Patch::Splice { index, remove, insert } => Patch::Splice { index: *index, remove: insert.clone(), insert: remove.clone() },
			Patch::Swap { first, second } => Patch::Swap { first: *second, second: *first },
			Patch::Batch(patches) => Patch::Batch(patches.iter().rev().map(Patch::invert).collect()),
		}
	}

	/// Pure application: returns the patched copy of `value`.
	#[must_use]
	pub fn apply(&self, value: &Value) -> Value {
		let mut next = value.clone();
		self.apply_in_place(&mut next);
		next
	}

	/// Destructive application: edits `value` in place. Paired with
	/// [`unapply_in_place`](Self::unapply_in_place) this is the bracket used
	/// to derive values at a "next" state without allocating a copy.
	pub fn apply_in_place(&self, value: &mut Value) {
		match self {
			Patch::Replace { next, .. } => *value = next.clone(),
			Patch::Key { key, patch } => {
				let entry = value.get_mut(key).unwrap_or_else(|| panic!("patch: no entry at key `{}` to patch", key));
				patch.apply_in_place(entry);
			}
			Patch::Splice { index, remove, insert } => splice(value.items_mut(), *index, remove, insert),
			Patch::Swap { first, second } => value.items_mut().swap(*first, *second),
			Patch::Batch(patches) => {
				for patch in patches {
					patch.apply_in_place(value);
				}
			}
		}
	}

	/// Pure inverse application.
	#[must_use]
	pub fn unapply(&self, value: &Value) -> Value {
		self.invert().apply(value)
	}

	/// Destructive inverse application.
	pub fn unapply_in_place(&self, value: &mut Value) {
		self.invert().apply_in_place(value);
	}

	/// Flattens this patch into its ordered atomic steps, distributing key
	/// localization over batches and dropping identity steps. Reconciliation
	/// threads the model through these steps one at a time, so later steps of
	/// a batch observe the effects of earlier ones.
	#[must_use]
	pub fn steps(&self) -> Vec<Patch> {
		let mut out = Vec::new();
		self.collect_steps(&mut out);
		out
	}

	fn collect_steps(&self, out: &mut Vec<Patch>) {
		match self {
			Patch::Batch(patches) => {
				for patch in patches {
					patch.collect_steps(out);
				}
			}
			Patch::Key { key, patch } => {
				let mut inner = Vec::new();
				patch.collect_steps(&mut inner);
				out.extend(inner.into_iter().map(|step| Patch::Key { key: key.clone(), patch: Box::new(step) }));
			}
			Patch::Replace { .. } | Patch::Splice { .. } | Patch::Swap { .. } => out.push(self.clone()),
		}
	}
}

/// Splice with the idempotent-replay guard: the same patch may be replayed
/// defensively by tree branches that observe the same sequence, so a target
/// that already holds the inserted slice at `index` is left alone. A target
/// matching neither endpoint is logged and skipped.
fn splice(items: &mut Vec<Value>, index: usize, remove: &[Value], insert: &[Value]) {
	let holds = |slice: &[Value]| !slice.is_empty() && items.get(index..index + slice.len()).map_or(false, |window| window == slice);

	if remove.is_empty() {
		if holds(insert) {
			return;
		}
		drop(items.splice(index..index, insert.iter().cloned()));
	} else if holds(remove) {
		drop(items.splice(index..index + remove.len(), insert.iter().cloned()));
	} else if holds(insert) {
		// Already applied.
	} else {
		warn!(index, "splice target matches neither endpoint; skipping");
	}
}

#[cfg(test)]
mod tests {
	use super::Patch;
	use crate::value::Value;

	fn ints<I: IntoIterator<Item = i64>>(items: I) -> Value {
		Value::seq(items.into_iter().map(Value::from))
	}

	#[test]
	fn key_distributes_over_batch_steps() {
		let patch = Patch::at(
			["todos"],
			Patch::batch([Patch::swap(0, 1), Patch::batch([]), Patch::swap(1, 2)]),
		);
		let steps = patch.steps();
		assert_eq!(steps.len(), 2);
		assert!(steps.iter().all(|step| matches!(step, Patch::Key { .. })));
	}

	#[test]
	fn splice_replay_is_idempotent() {
		let mut value = ints([1, 2, 3]);
		let patch = Patch::Splice { index: 1, remove: vec![Value::from(2i64)], insert: vec![Value::from(9i64)] };
		patch.apply_in_place(&mut value);
		patch.apply_in_place(&mut value);
		assert_eq!(value, ints([1, 9, 3]));
	}

	#[test]
	fn batch_inverts_in_reverse_order() {
		let seq = ints([1, 2, 3]);
		let patch = Patch::batch([Patch::push(&seq, vec![Value::from(4i64)]), Patch::swap(0, 3)]);
		let forward = patch.apply(&seq);
		assert_eq!(forward, ints([4, 2, 3, 1]));
		assert_eq!(patch.invert().apply(&forward), seq);
	}
}
