use crate::diff::Reconciler;
use crate::dom::NodeId;
use crate::value::Value;
use std::rc::Rc;
use tracing::{trace, trace_span};

/// An event listener callback. Receives the event and the model value in
/// scope where the listener was declared; `None` is the explicit "no message"
/// answer and stops dispatch silently.
pub type Handler = Rc<dyn Fn(&Event, &Value) -> Option<Value>>;

/// Identity of a handler closure, used to share one registry entry across
/// every live binding of the same closure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerKey(usize);

impl HandlerKey {
	pub(crate) fn of(handler: &Handler) -> Self {
		HandlerKey(Rc::as_ptr(handler).cast::<()>() as usize)
	}
}

/// A platform event delivered to a live node.
#[derive(Clone, Debug)]
pub struct Event {
	pub name: String,
	pub payload: Value,
}

impl Event {
	#[must_use]
	pub fn new(name: &str) -> Self {
		Event { name: name.to_owned(), payload: Value::Null }
	}

	#[must_use]
	pub fn with_payload(name: &str, payload: Value) -> Self {
		Event { name: name.to_owned(), payload }
	}
}

/// One level of model-narrowing/message-widening attached to a live node by a
/// combinator or by the list reconciler.
///
/// `Item` is kept structural (field plus current index) rather than as a
/// captured closure so structural edits can refresh the index in place and
/// dispatch never sees a position that a splice or swap has shifted.
#[derive(Clone)]
pub(crate) enum Scope {
	Focus {
		narrow: Rc<dyn Fn(&Value) -> Value>,
		widen: Rc<dyn Fn(Value) -> Value>,
	},
	Item {
		field: String,
		index: usize,
		widen: Rc<dyn Fn(usize, Value) -> Value>,
	},
}

impl Scope {
	fn narrow(&self, model: &Value) -> Value {
		match self {
			Scope::Focus { narrow, .. } => (**narrow)(model),
			Scope::Item { field, index, .. } => Value::record([
				("parent", model.clone()),
				("item", model.field(field).items()[*index].clone()),
			]),
		}
	}

	fn widen(&self, message: Value) -> Value {
		match self {
			Scope::Focus { widen, .. } => (**widen)(message),
			Scope::Item { index, widen, .. } => (**widen)(*index, message),
		}
	}
}

/// Reconciliation metadata for one live node. Kept in the engine's side
/// table, never on the rendered node itself.
///
/// `scopes` stacks innermost-first: a wrapper pushes its scope after the
/// wrapped subtree has attached its own.
#[derive(Default)]
pub(crate) struct NodeMeta {
	pub scopes: Vec<Scope>,
	pub model: Option<Value>,
	pub branch_tags: hashbrown::HashMap<String, String>,
}

impl Reconciler {
	/// Delivers `event` at `target` and bubbles it toward the root. Every
	/// listener bound along the path fires; each resulting message is widened
	/// through the scope chain and collected in firing order.
	#[must_use]
	pub fn dispatch(&self, target: NodeId, event: &Event) -> Vec<Value> {
		let span = trace_span!("dispatch", name = event.name.as_str(), ?target);
		let _enter = span.enter();

		let mut messages = Vec::new();
		let mut node = Some(target);
		while let Some(current) = node {
			if self.doc.is_element(current) {
				let bound: Vec<HandlerKey> = self
					.doc
					.bindings(current)
					.iter()
					.filter(|binding| binding.name == event.name)
					.map(|binding| binding.handler)
					.collect();
				for key in bound {
					let handler = self
						.handlers
						.get(&key)
						.unwrap_or_else(|| panic!("dispatch: handler {:?} bound on {:?} is not registered", key, current));
					if let Some(message) = self.fire(current, handler, event) {
						messages.push(message);
					}
				}
			}
			node = self.doc.parent(current);
		}
		messages
	}

	/// Runs one listener: recovers the model in scope at `origin`, invokes the
	/// callback, and widens the produced message.
	///
	/// The walk accumulates scopes upward until the node carrying the
	/// authoritative model, then applies coprojections outermost-first (the
	/// reverse of accumulation) and projections in accumulation order.
	fn fire(&self, origin: NodeId, handler: &Handler, event: &Event) -> Option<Value> {
		let mut scopes: Vec<&Scope> = Vec::new();
		let mut model = None;
		let mut node = Some(origin);
		while let Some(current) = node {
			if let Some(meta) = self.meta.get(&current) {
				scopes.extend(meta.scopes.iter());
				if let Some(authoritative) = &meta.model {
					model = Some(authoritative);
					break;
				}
			}
			node = self.doc.parent(current);
		}

		let Some(model) = model else {
			trace!("no model above {:?}; dropping event", origin);
			return None;
		};

		let mut scoped = model.clone();
		for scope in scopes.iter().rev() {
			scoped = scope.narrow(&scoped);
		}

		let mut message = (**handler)(event, &scoped)?;
		for scope in &scopes {
			message = scope.widen(message);
		}
		Some(message)
	}
}
