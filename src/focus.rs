use crate::patch::Patch;
use crate::value::{Key, Value};
use std::rc::Rc;

/// A model coprojection: narrows the model a parent observes into the model a
/// wrapped subtree observes, and pushes patches through the same narrowing.
///
/// A key-path focus routes `Key` patches structurally, so a localized change
/// stays localized below the focus. An arbitrary-function focus cannot be
/// routed and falls back to the [`rederive`] bracket, which compares the
/// narrowed value at both endpoints of the step.
#[derive(Clone)]
pub struct Focus {
	path: Option<Vec<Key>>,
	narrow: Rc<dyn Fn(&Value) -> Value>,
}

impl Focus {
	/// Focus on a key path. The empty path is the identity focus.
	#[must_use]
	pub fn keys<I, K>(path: I) -> Self
	where
		I: IntoIterator<Item = K>,
		K: Into<Key>,
	{
		let keys: Vec<Key> = path.into_iter().map(Into::into).collect();
		let lookup = keys.clone();
		Focus {
			path: Some(keys),
			narrow: Rc::new(move |model| model.at(&lookup).clone()),
		}
	}

	/// The identity focus: the subtree observes its parent's model unchanged.
	#[must_use]
	pub fn identity() -> Self {
		Focus::keys(Vec::<Key>::new())
	}

	/// Focus through an arbitrary narrowing function. Patch routing through
	/// this focus always re-derives by value comparison.
	#[must_use]
	pub fn with_fn(narrow: impl Fn(&Value) -> Value + 'static) -> Self {
		Focus { path: None, narrow: Rc::new(narrow) }
	}

	/// Narrows a model value.
	#[must_use]
	pub fn narrow(&self, model: &Value) -> Value {
		(*self.narrow)(model)
	}

	pub(crate) fn narrow_fn(&self) -> Rc<dyn Fn(&Value) -> Value> {
		Rc::clone(&self.narrow)
	}

	/// Pushes one step through the focus. `model` is the value *after* the
	/// step; it is only consulted on the re-derivation path.
	#[must_use]
	pub fn push(&self, model: &Value, step: &Patch) -> Patch {
		match &self.path {
			Some(path) => push_structural(path, step),
			None => rederive(model, step, self.narrow.as_ref()),
		}
	}
}

/// Routes a step below a key path. `Key` wrappers matching the path are
/// stripped; a `Key` for a different entry, or a sequence edit above the
/// path, cannot affect the focused value and becomes the identity patch.
/// `Replace` is re-diffed between the two narrowed endpoints.
fn push_structural(path: &[Key], step: &Patch) -> Patch {
	if path.is_empty() {
		return step.clone();
	}
	match step {
		Patch::Key { key, patch } if *key == path[0] => push_structural(&path[1..], patch),
		Patch::Key { .. } | Patch::Splice { .. } | Patch::Swap { .. } => Patch::noop(),
		Patch::Replace { prev, next } => Patch::diff(prev.at(path), next.at(path)),
		Patch::Batch(patches) => Patch::batch(patches.iter().map(|patch| push_structural(path, patch))),
	}
}

/// Re-derives the patch seen by a narrowed view of `model` across `step`.
///
/// Clones once, then runs the destructive [`rederive_in_place`] bracket on the
/// copy. `model` must already be at the post-step state.
#[must_use]
pub fn rederive(model: &Value, step: &Patch, narrow: &dyn Fn(&Value) -> Value) -> Patch {
	let mut scratch = model.clone();
	step.unapply_in_place(&mut scratch);
	rederive_in_place(&mut scratch, step, narrow)
}

/// The apply/unapply bracket: given `model` at the *pre*-step state, derives
/// the narrowed value at both endpoints of `step` and diffs them. On return,
/// `model` holds the post-step state (the bracket's forward pass is the last
/// mutation; no other residue remains).
pub fn rederive_in_place(model: &mut Value, step: &Patch, narrow: &dyn Fn(&Value) -> Value) -> Patch {
	let before = narrow(model);
	step.apply_in_place(model);
	let after = narrow(model);
	Patch::diff(&before, &after)
}

#[cfg(test)]
mod tests {
	use super::{rederive_in_place, Focus};
	use crate::patch::Patch;
	use crate::value::Value;

	#[test]
	fn key_patches_pass_through_a_path_focus() {
		let focus = Focus::keys(["settings"]);
		let model = Value::record([("settings", Value::record([("dark", Value::from(true))]))]);
		let step = Patch::at(["settings", "dark"], Patch::replace(Value::from(false), Value::from(true)));
		let pushed = focus.push(&model, &step);
		assert_eq!(pushed, Patch::at(["dark"], Patch::replace(Value::from(false), Value::from(true))));
	}

	#[test]
	fn unrelated_key_patches_become_noops() {
		let focus = Focus::keys(["settings"]);
		let model = Value::record([("settings", Value::Null), ("title", Value::from("t"))]);
		let step = Patch::at(["title"], Patch::replace(Value::from("t0"), Value::from("t")));
		assert!(focus.push(&model, &step).is_noop());
	}

	#[test]
	fn function_focus_rederives_by_comparison() {
		let focus = Focus::with_fn(|model| Value::from(model.field("count").as_text().len() as i64));
		let step = Patch::at(["count"], Patch::replace(Value::from(7i64), Value::from(10i64)));
		let next = Value::record([("count", Value::from(10i64))]);
		let pushed = focus.push(&next, &step);
		assert_eq!(pushed, Patch::replace(Value::from(1i64), Value::from(2i64)));
	}

	#[test]
	fn bracket_ends_at_the_post_step_state() {
		let mut model = Value::record([("n", Value::from(1i64))]);
		let step = Patch::at(["n"], Patch::replace(Value::from(1i64), Value::from(2i64)));
		let derived = rederive_in_place(&mut model, &step, &|m| m.field("n").clone());
		assert_eq!(derived, Patch::replace(Value::from(1i64), Value::from(2i64)));
		assert_eq!(model, Value::record([("n", Value::from(2i64))]));
	}
}
