use patchdom::{Patch, Value};
use proptest::prelude::*;

#[test]
fn empty_batch_is_the_identity() {
	let model = todos(&["walk", "shop"]);
	assert!(Patch::noop().is_noop());
	assert_eq!(Patch::noop().apply(&model), model);
	assert!(Patch::batch([Patch::noop(), Patch::at(["title"], Patch::noop())]).is_noop());
}

#[test]
fn diff_takes_the_identity_shortcut() {
	let model = todos(&["walk"]);
	assert!(Patch::diff(&model, &model).is_noop());

	let next = todos(&["walk", "shop"]);
	let patch = Patch::diff(&model, &next);
	assert_eq!(patch.apply(&model), next);
}

#[test]
fn field_patch_round_trips() {
	let model = todos(&["walk", "shop"]);
	let patch = Patch::at(["title"], Patch::replace(Value::from("today"), Value::from("tomorrow")));
	let forward = patch.apply(&model);
	assert_eq!(forward.field("title"), &Value::from("tomorrow"));
	assert_eq!(patch.invert().apply(&forward), model);
}

#[test]
fn splice_updates_are_invertible() {
	let model = todos(&["a", "b", "c", "d"]);
	let items = model.field("items");
	let patch = Patch::at(
		["items"],
		Patch::splice_at(items, 1, 2, vec![Value::from("x"), Value::from("y"), Value::from("z")]),
	);
	let forward = patch.apply(&model);
	assert_eq!(forward.field("items"), &Value::seq(["a", "x", "y", "z", "d"].iter().map(|&s| Value::from(s))));
	assert_eq!(patch.invert().apply(&forward), model);
}

#[test]
fn destructive_bracket_leaves_no_residue() {
	let mut model = todos(&["a", "b", "c"]);
	let snapshot = model.clone();
	let patch = Patch::batch([
		Patch::at(["title"], Patch::replace(Value::from("today"), Value::from("done"))),
		Patch::at(["items"], Patch::remove_at(model.field("items"), 1)),
	]);
	patch.apply_in_place(&mut model);
	assert_ne!(model, snapshot);
	patch.unapply_in_place(&mut model);
	assert_eq!(model, snapshot);
}

#[test]
fn push_and_remove_capture_slices() {
	let items = Value::seq([Value::from(1i64), Value::from(2i64)]);
	let pushed = Patch::push(&items, vec![Value::from(3i64)]).apply(&items);
	assert_eq!(pushed, Value::seq([Value::from(1i64), Value::from(2i64), Value::from(3i64)]));

	let removed = Patch::remove_at(&pushed, 0);
	let shorter = removed.apply(&pushed);
	assert_eq!(shorter, Value::seq([Value::from(2i64), Value::from(3i64)]));
	assert_eq!(removed.invert().apply(&shorter), pushed);
}

proptest! {
	// Base sequences use distinct low values and insertions use a disjoint
	// high range, keeping the replay guard out of the way of the round trip.
	#[test]
	fn splice_round_trips(len in 1usize..8, at in 0usize..8, take in 0usize..8, insert in prop::collection::vec(1000i64..2000, 0..4)) {
		let seq = distinct(len);
		let at = at % len;
		let take = take.min(len - at);
		let patch = Patch::splice_at(&seq, at, take, insert.into_iter().map(Value::from).collect());
		let forward = patch.apply(&seq);
		prop_assert_eq!(patch.invert().apply(&forward), seq);
	}

	#[test]
	fn swap_round_trips(len in 2usize..8, first in 0usize..8, second in 0usize..8) {
		let seq = distinct(len);
		let patch = Patch::swap(first % len, second % len);
		let forward = patch.apply(&seq);
		prop_assert_eq!(patch.invert().apply(&forward), seq);
	}

	#[test]
	fn batch_round_trips(len in 2usize..6, insert in prop::collection::vec(1000i64..2000, 1..3)) {
		let seq = distinct(len);
		let model = Value::record([("title", Value::from("t")), ("items", seq.clone())]);
		let patch = Patch::batch([
			Patch::at(["title"], Patch::replace(Value::from("t"), Value::from("u"))),
			Patch::at(["items"], Patch::splice_at(&seq, 1, 1, insert.into_iter().map(Value::from).collect())),
			Patch::at(["items"], Patch::swap(0, len - 1)),
		]);
		let forward = patch.apply(&model);
		prop_assert_eq!(patch.invert().apply(&forward), model);
	}
}

fn todos(items: &[&str]) -> Value {
	Value::record([
		("title", Value::from("today")),
		("items", Value::seq(items.iter().map(|&item| Value::from(item)))),
	])
}

fn distinct(len: usize) -> Value {
	Value::seq((0..len).map(|index| Value::from(index as i64 * 10)))
}
