use crate::dom::{Document, NodeId};
use crate::events::{HandlerKey, NodeMeta, Scope};
use crate::patch::Patch;
use crate::registry::RcRegistry;
use crate::value::{Key, Value};
use crate::view::{ArrayView, ElementView, Listener, View};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{trace, trace_span};

/// The reconciliation engine.
///
/// Owns the live document, the node-metadata side table, and the refcounted
/// handler registry. `instantiate` materializes a view tree against a model;
/// `reconcile` routes a patch through an existing live tree, mutating it in
/// place and returning the current node, which replaces the old one in its
/// parent whenever identity changed.
pub struct Reconciler {
	pub(crate) doc: Document,
	pub(crate) meta: HashMap<NodeId, NodeMeta>,
	pub(crate) handlers: RcRegistry<HandlerKey, u16, crate::events::Handler>,
}

impl Default for Reconciler {
	fn default() -> Self {
		Self::new()
	}
}

impl Reconciler {
	#[must_use]
	pub fn new() -> Self {
		Reconciler {
			doc: Document::new(),
			meta: HashMap::new(),
			handlers: RcRegistry::new(),
		}
	}

	#[must_use]
	pub fn doc(&self) -> &Document {
		&self.doc
	}

	pub fn doc_mut(&mut self) -> &mut Document {
		&mut self.doc
	}

	/// Live handler registrations, shared bindings counted once.
	#[must_use]
	pub fn handler_count(&self) -> usize {
		self.handlers.len()
	}

	pub(crate) fn meta_mut(&mut self, node: NodeId) -> &mut NodeMeta {
		self.meta.entry(node).or_default()
	}

	/// Marks `node` as carrying the authoritative model for event dispatch.
	pub fn set_root_model(&mut self, node: NodeId, model: Value) {
		self.meta_mut(node).model = Some(model);
	}

	/// Instantiates `view` under the document root and tags the root with the
	/// model for event dispatch.
	pub fn mount(&mut self, view: &View, model: &Value) -> NodeId {
		let el = self.instantiate(view, model);
		let root = self.doc.root();
		self.doc.append_child(root, el);
		self.set_root_model(root, model.clone());
		el
	}

	/// Tears a mounted tree down: releases its bindings, clears its metadata,
	/// and removes it from the root.
	pub fn unmount(&mut self, el: NodeId, view: &View) {
		self.unbind(el, view);
		let root = self.doc.root();
		let index = self
			.doc
			.children(root)
			.iter()
			.position(|&child| child == el)
			.unwrap_or_else(|| panic!("unmount: {:?} is not mounted", el));
		self.doc.remove_child(root, index);
		self.sweep_handlers();
	}

	/// First materialization of `view` against `model`. Returns a detached
	/// live node; the caller attaches it.
	pub fn instantiate(&mut self, view: &View, model: &Value) -> NodeId {
		match view {
			View::Element(element) => self.create_element_node(element, model),
			View::Text(derived) => {
				let data = derived.eval(model).as_text();
				self.doc.create_text(data)
			}
			View::Discriminate { selector, branches } => {
				let key = model.at(selector).as_branch_key().to_owned();
				let branch = branches
					.get(&key)
					.unwrap_or_else(|| panic!("discriminate: no branch for key `{}`", key));
				let el = self.instantiate(branch, model);
				self.meta_mut(el).branch_tags.insert(selector_tag(selector), key);
				el
			}
			View::Array(array) => self.create_array_node(array, model),
			View::Custom(custom) => {
				let create = Rc::clone(&custom.create);
				(*create)(self, model)
			}
			View::Dimap { inner, focus, project } => {
				let narrowed = focus.narrow(model);
				let el = self.instantiate(inner, &narrowed);
				self.meta_mut(el).scopes.push(Scope::Focus {
					narrow: focus.narrow_fn(),
					widen: Rc::clone(project),
				});
				el
			}
		}
	}

	/// Brings `el` up to date with the transition `patch` describes from
	/// `prev`. The patch is flattened into atomic steps and the model is
	/// threaded through them, so later steps of a batch observe the effects
	/// of earlier ones.
	pub fn reconcile(&mut self, el: NodeId, view: &View, prev: &Value, patch: &Patch) -> NodeId {
		let span = trace_span!("reconcile", ?el);
		let _enter = span.enter();

		let steps = patch.steps();
		if steps.is_empty() {
			trace!("identity patch; nothing to do");
			return el;
		}
		let mut model = prev.clone();
		let mut el = el;
		for step in steps {
			step.apply_in_place(&mut model);
			el = self.actuate(el, view, &model, &step);
		}
		el
	}

	/// One atomic step against one node. `model` is the value after the step.
	fn actuate(&mut self, el: NodeId, view: &View, model: &Value, step: &Patch) -> NodeId {
		match view {
			View::Element(element) => {
				self.refresh_element_surface(el, element, model);
				let expected = element.children.len();
				let found = self.doc.child_count(el);
				assert!(
					expected == found,
					"reconcile: <{}> has {} live children but {} view children; the trees have desynchronized",
					element.tag,
					found,
					expected
				);
				// The step is not routed here: every child decides for itself
				// whether it is concerned.
				for (index, child_view) in element.children.iter().enumerate() {
					let child = self.doc.child(el, index);
					let next = self.actuate(child, child_view, model, step);
					if next != child {
						self.doc.replace_child(el, child, next);
					}
				}
				el
			}

			View::Text(derived) => {
				if derived.is_dynamic() {
					assert!(
						self.doc.is_text(el),
						"reconcile: expected a text node, found <{}>",
						self.doc.tag(el)
					);
					let next = derived.eval(model).as_text();
					if self.doc.text(el) != next {
						self.doc.set_text(el, next);
					}
				}
				el
			}

			View::Discriminate { selector, branches } => {
				let tag = selector_tag(selector);
				let key = model.at(selector).as_branch_key().to_owned();
				let previous = self
					.meta
					.get(&el)
					.and_then(|meta| meta.branch_tags.get(&tag).cloned())
					.unwrap_or_else(|| panic!("reconcile: {:?} lost its branch tag for `{}`", el, tag));
				let branch = branches
					.get(&key)
					.unwrap_or_else(|| panic!("discriminate: no branch for key `{}`", key));
				if previous == key {
					let next = self.actuate(el, branch, model, step);
					if next != el {
						self.meta_mut(next).branch_tags.insert(tag, key);
					}
					next
				} else {
					// No cross-branch patch sharing: the branches may have
					// unrelated shapes.
					trace!(from = previous.as_str(), to = key.as_str(), "branch switch; rebuilding subtree");
					let old = branches
						.get(&previous)
						.unwrap_or_else(|| panic!("discriminate: no branch for key `{}`", previous));
					self.unbind(el, old);
					let next = self.instantiate(branch, model);
					self.meta_mut(next).branch_tags.insert(tag, key);
					next
				}
			}

			View::Array(array) => self.actuate_array(el, array, model, step),

			View::Custom(custom) => {
				let reconcile = Rc::clone(&custom.reconcile);
				(*reconcile)(self, el, model, step)
			}

			View::Dimap { inner, focus, project } => {
				let pushed = focus.push(model, step);
				if pushed.is_noop() {
					return el;
				}
				let narrowed = focus.narrow(model);
				let mut next = el;
				for inner_step in pushed.steps() {
					next = self.actuate(next, inner, &narrowed, &inner_step);
				}
				if next != el {
					self.meta_mut(next).scopes.push(Scope::Focus {
						narrow: focus.narrow_fn(),
						widen: Rc::clone(project),
					});
				}
				next
			}
		}
	}

	fn create_element_node(&mut self, element: &ElementView, model: &Value) -> NodeId {
		let el = self.doc.create_element(&element.tag);
		for (name, derived) in &element.attributes {
			let value = derived.eval(model).as_text();
			self.doc.set_attribute(el, name, value);
		}
		for (name, derived) in &element.properties {
			let value = derived.eval(model);
			self.doc.set_property(el, name, value);
		}
		for listener in &element.listeners {
			let key = HandlerKey::of(&listener.handler);
			let handler = Rc::clone(&listener.handler);
			self.handlers
				.retain_or_insert_with(key, || handler)
				.unwrap_or_else(|_| panic!("instantiate: too many live bindings of one handler"));
			self.doc.add_binding(el, &listener.name, key);
		}
		for child in &element.children {
			let node = self.instantiate(child, model);
			self.doc.append_child(el, node);
		}
		el
	}

	/// Re-applies the model-derived attributes and properties of an element.
	/// Constants were applied at instantiation and are never revisited;
	/// dynamic derivations write only when the stored value differs.
	fn refresh_element_surface(&mut self, el: NodeId, element: &ElementView, model: &Value) {
		assert!(
			self.doc.is_element(el),
			"reconcile: expected an element for <{}>, found a text node",
			element.tag
		);
		for (name, derived) in &element.attributes {
			if derived.is_dynamic() {
				let next = derived.eval(model).as_text();
				if self.doc.attribute(el, name) != Some(next.as_str()) {
					self.doc.set_attribute(el, name, next);
				}
			}
		}
		for (name, derived) in &element.properties {
			if derived.is_dynamic() {
				let next = derived.eval(model);
				if self.doc.property(el, name) != Some(&next) {
					self.doc.set_property(el, name, next);
				}
			}
		}
	}

	fn create_array_node(&mut self, array: &ArrayView, model: &Value) -> NodeId {
		let el = self.create_element_node(&array.shell, model);
		let items = model.field(&array.field).items().to_vec();
		for (index, item) in items.iter().enumerate() {
			let child_model = item_model(model, item);
			let child = self.instantiate(&array.item, &child_model);
			self.push_item_scope(child, array, index);
			self.doc.append_child(el, child);
		}
		el
	}

	/// The list reconciler. Two modes: a step localized to this list's field
	/// is routed structurally; anything else re-actuates every item against
	/// the whole new parent context, implying no insertion or removal.
	fn actuate_array(&mut self, el: NodeId, array: &ArrayView, model: &Value, step: &Patch) -> NodeId {
		self.refresh_element_surface(el, &array.shell, model);
		match step {
			Patch::Key { key: Key::Field(field), patch } if *field == array.field => {
				self.actuate_array_local(el, array, model, patch)
			}
			_ => {
				let items = model.field(&array.field).items().to_vec();
				let found = self.doc.child_count(el);
				assert!(
					items.len() == found,
					"reconcile: list under `{}` has {} live children but {} items; the trees have desynchronized",
					array.field,
					found,
					items.len()
				);
				for (index, item) in items.iter().enumerate() {
					let child_model = item_model(model, item);
					let child_step = Patch::Key {
						key: Key::Field("parent".to_owned()),
						patch: Box::new(step.clone()),
					};
					let child = self.doc.child(el, index);
					let next = self.actuate(child, &array.item, &child_model, &child_step);
					if next != child {
						self.doc.replace_child(el, child, next);
						self.push_item_scope(next, array, index);
					}
				}
				el
			}
		}
	}

	fn actuate_array_local(&mut self, el: NodeId, array: &ArrayView, model: &Value, inner: &Patch) -> NodeId {
		match inner {
			Patch::Splice { index, remove, insert } => {
				let span = trace_span!("splice", index = *index, removes = remove.len(), inserts = insert.len());
				let _enter = span.enter();
				// Highest index first, so pending removals keep their positions.
				for offset in (0..remove.len()).rev() {
					let child = self.doc.child(el, index + offset);
					self.unbind(child, &array.item);
					self.doc.remove_child(el, index + offset);
				}
				let items = model.field(&array.field).items().to_vec();
				for offset in 0..insert.len() {
					let position = index + offset;
					let child_model = item_model(model, &items[position]);
					let child = self.instantiate(&array.item, &child_model);
					self.push_item_scope(child, array, position);
					self.doc.insert_child(el, position, child);
				}
				self.refresh_item_indices(el, index + insert.len());
				el
			}

			Patch::Key { key: Key::Index(index), patch } => {
				let items = model.field(&array.field).items();
				let item = items
					.get(*index)
					.unwrap_or_else(|| panic!("reconcile: list step for index {} but only {} items", index, items.len()))
					.clone();
				let child_model = item_model(model, &item);
				let child_step = Patch::Key {
					key: Key::Field("item".to_owned()),
					patch: patch.clone(),
				};
				let child = self.doc.child(el, *index);
				let next = self.actuate(child, &array.item, &child_model, &child_step);
				if next != child {
					self.doc.replace_child(el, child, next);
					self.push_item_scope(next, array, *index);
				}
				el
			}

			Patch::Swap { first, second } => {
				// The cheapest possible move: reorder, never re-instantiate.
				self.doc.swap_children(el, *first, *second);
				let one = self.doc.child(el, *first);
				let other = self.doc.child(el, *second);
				self.set_item_index(one, *first);
				self.set_item_index(other, *second);
				el
			}

			Patch::Replace { .. } => {
				// Whole-sequence replacement has no incremental path.
				trace!("sequence replaced; rebuilding the list node");
				self.unbind_array(el, array);
				self.create_array_node(array, model)
			}

			Patch::Key { key: Key::Field(name), .. } => {
				panic!("reconcile: field key `{}` into the sequence at `{}`", name, array.field)
			}

			Patch::Batch(_) => unreachable!("reconcile: batches are flattened before actuation"),
		}
	}

	fn push_item_scope(&mut self, node: NodeId, array: &ArrayView, index: usize) {
		self.meta_mut(node).scopes.push(Scope::Item {
			field: array.field.clone(),
			index,
			widen: Rc::clone(&array.wrap),
		});
	}

	/// Rewrites the stored position of every item from `from` on. Structural
	/// edits shift the tail; dispatch must never see a stale index.
	fn refresh_item_indices(&mut self, el: NodeId, from: usize) {
		for position in from..self.doc.child_count(el) {
			let child = self.doc.child(el, position);
			self.set_item_index(child, position);
		}
	}

	fn set_item_index(&mut self, node: NodeId, position: usize) {
		let meta = self.meta_mut(node);
		for scope in meta.scopes.iter_mut().rev() {
			if let Scope::Item { index, .. } = scope {
				*index = position;
				return;
			}
		}
		panic!("reconcile: list child {:?} carries no item scope", node);
	}

	/// Releases the bindings and metadata of a live subtree without touching
	/// the document. Used before a subtree is discarded or replaced; the
	/// caller removes the nodes.
	///
	/// The side table entry goes away for every node kind. Arena slots are
	/// reused, so a surviving entry would leak onto an unrelated future node.
	pub fn unbind(&mut self, el: NodeId, view: &View) {
		match view {
			View::Element(element) => {
				self.release_listeners(&element.listeners);
				for (index, child_view) in element.children.iter().enumerate() {
					let child = self.doc.child(el, index);
					self.unbind(child, child_view);
				}
			}
			View::Text(_) => {}
			View::Discriminate { selector, branches } => {
				let tag = selector_tag(selector);
				let key = self
					.meta
					.get(&el)
					.and_then(|meta| meta.branch_tags.get(&tag).cloned())
					.unwrap_or_else(|| panic!("unbind: {:?} lost its branch tag for `{}`", el, tag));
				let branch = branches
					.get(&key)
					.unwrap_or_else(|| panic!("discriminate: no branch for key `{}`", key));
				self.unbind(el, branch);
			}
			View::Array(array) => {
				self.unbind_array(el, array);
				return;
			}
			View::Custom(custom) => {
				let destroy = Rc::clone(&custom.destroy);
				(*destroy)(self, el);
			}
			View::Dimap { inner, .. } => self.unbind(el, inner),
		}
		self.meta.remove(&el);
	}

	fn unbind_array(&mut self, el: NodeId, array: &ArrayView) {
		self.release_listeners(&array.shell.listeners);
		for index in 0..self.doc.child_count(el) {
			let child = self.doc.child(el, index);
			self.unbind(child, &array.item);
		}
		self.meta.remove(&el);
	}

	fn release_listeners(&mut self, listeners: &[Listener]) {
		for listener in listeners {
			let key = HandlerKey::of(&listener.handler);
			match self.handlers.release(&key) {
				Ok(Some(_)) => (),
				Ok(None) => panic!("unbind: handler for `{}` was never registered", listener.name),
				Err(_) => panic!("unbind: handler for `{}` released more often than bound", listener.name),
			}
		}
	}

	/// Drops handler registrations whose count reached zero. Call after a
	/// reconciliation pass; entries released and re-retained within one pass
	/// keep their slot.
	pub fn sweep_handlers(&mut self) -> usize {
		let freed = self.handlers.sweep();
		if freed > 0 {
			trace!(freed, "freed event handler(s)");
		}
		trace!("handler registry count/capacity: {}/{}", self.handlers.len(), self.handlers.capacity());
		freed
	}
}

fn item_model(parent: &Value, item: &Value) -> Value {
	Value::record([("parent", parent.clone()), ("item", item.clone())])
}

fn selector_tag(selector: &[Key]) -> String {
	selector.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
}
