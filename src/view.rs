use crate::diff::Reconciler;
use crate::dom::NodeId;
use crate::events::{Event, Handler};
use crate::focus::Focus;
use crate::patch::Patch;
use crate::value::{Key, Value};
use hashbrown::HashMap;
use std::rc::Rc;

/// An attribute, property, or text derivation: either a constant, applied
/// once at instantiation, or a function of the model, recomputed on every
/// reconciliation step.
#[derive(Clone)]
pub enum Derived {
	Static(Value),
	Dynamic(Rc<dyn Fn(&Value) -> Value>),
}

impl Derived {
	#[must_use]
	pub fn eval(&self, model: &Value) -> Value {
		match self {
			Derived::Static(value) => value.clone(),
			Derived::Dynamic(derive) => (**derive)(model),
		}
	}

	#[must_use]
	pub fn is_dynamic(&self) -> bool {
		matches!(self, Derived::Dynamic(_))
	}
}

/// An event listener declared on an element view.
#[derive(Clone)]
pub struct Listener {
	pub name: String,
	pub handler: Handler,
}

/// The element description: tag, attribute/property derivations, listeners,
/// and a fixed list of children.
#[derive(Clone)]
pub struct ElementView {
	pub tag: String,
	pub attributes: Vec<(String, Derived)>,
	pub properties: Vec<(String, Derived)>,
	pub listeners: Vec<Listener>,
	pub children: Vec<View>,
}

impl ElementView {
	#[must_use]
	pub fn new(tag: &str) -> Self {
		ElementView {
			tag: tag.to_owned(),
			attributes: Vec::new(),
			properties: Vec::new(),
			listeners: Vec::new(),
			children: Vec::new(),
		}
	}
}

/// The dynamic-list description. `field` selects the sequence out of the
/// model; each item subtree observes `{ "parent": model, "item": element }`
/// and its messages are widened through `wrap` with the item's position.
#[derive(Clone)]
pub struct ArrayView {
	pub field: String,
	pub shell: ElementView,
	pub item: Rc<View>,
	pub wrap: Rc<dyn Fn(usize, Value) -> Value>,
}

/// Escape hatch: caller-supplied create/reconcile/destroy with the same
/// contract as the engine's own node kinds.
#[derive(Clone)]
pub struct CustomView {
	pub create: Rc<dyn Fn(&mut Reconciler, &Value) -> NodeId>,
	pub reconcile: Rc<dyn Fn(&mut Reconciler, NodeId, &Value, &Patch) -> NodeId>,
	pub destroy: Rc<dyn Fn(&mut Reconciler, NodeId)>,
}

/// The closed view-node variant. Trees of these are immutable, shared, and
/// carry no per-instance state; every live instantiation reconciles against
/// the same tree.
#[derive(Clone)]
pub enum View {
	Element(ElementView),
	Text(Derived),
	/// Chooses exactly one branch by a string derived from the model at
	/// `selector`.
	Discriminate { selector: Vec<Key>, branches: HashMap<String, View> },
	Array(ArrayView),
	Custom(CustomView),
	/// Functorial wrapper: `inner` observes the model through `focus` and its
	/// messages are widened through `project`. Composes associatively; it
	/// never changes DOM shape.
	Dimap {
		inner: Rc<View>,
		focus: Focus,
		project: Rc<dyn Fn(Value) -> Value>,
	},
}

impl View {
	/// Widens the messages this view emits. Model observation is unchanged.
	#[must_use]
	pub fn map(self, project: impl Fn(Value) -> Value + 'static) -> View {
		self.dimap(Focus::identity(), project)
	}

	/// Narrows the model this view observes. Messages pass through unchanged.
	#[must_use]
	pub fn comap(self, focus: Focus) -> View {
		self.dimap(focus, |message| message)
	}

	#[must_use]
	pub fn dimap(self, focus: Focus, project: impl Fn(Value) -> Value + 'static) -> View {
		View::Dimap {
			inner: Rc::new(self),
			focus,
			project: Rc::new(project),
		}
	}
}

impl From<&str> for View {
	fn from(text: &str) -> Self {
		View::Text(Derived::Static(Value::from(text)))
	}
}

/// Element under construction. Finished by converting into a [`View`].
pub struct El(ElementView);

impl El {
	#[must_use]
	pub fn new(tag: &str) -> Self {
		El(ElementView::new(tag))
	}

	#[must_use]
	pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
		self.0.attributes.push((name.to_owned(), Derived::Static(value.into())));
		self
	}

	#[must_use]
	pub fn attr_with(mut self, name: &str, derive: impl Fn(&Value) -> Value + 'static) -> Self {
		self.0.attributes.push((name.to_owned(), Derived::Dynamic(Rc::new(derive))));
		self
	}

	#[must_use]
	pub fn prop(mut self, name: &str, value: impl Into<Value>) -> Self {
		self.0.properties.push((name.to_owned(), Derived::Static(value.into())));
		self
	}

	#[must_use]
	pub fn prop_with(mut self, name: &str, derive: impl Fn(&Value) -> Value + 'static) -> Self {
		self.0.properties.push((name.to_owned(), Derived::Dynamic(Rc::new(derive))));
		self
	}

	#[must_use]
	pub fn on(mut self, name: &str, handler: impl Fn(&Event, &Value) -> Option<Value> + 'static) -> Self {
		self.0.listeners.push(Listener {
			name: name.to_owned(),
			handler: Rc::new(handler),
		});
		self
	}

	#[must_use]
	pub fn child(mut self, child: impl Into<View>) -> Self {
		self.0.children.push(child.into());
		self
	}
}

impl From<El> for View {
	fn from(builder: El) -> Self {
		View::Element(builder.0)
	}
}

/// Dynamic list under construction.
pub struct Arr(ArrayView);

impl Arr {
	#[must_use]
	pub fn tag(mut self, tag: &str) -> Self {
		self.0.shell.tag = tag.to_owned();
		self
	}

	#[must_use]
	pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
		self.0.shell.attributes.push((name.to_owned(), Derived::Static(value.into())));
		self
	}

	#[must_use]
	pub fn attr_with(mut self, name: &str, derive: impl Fn(&Value) -> Value + 'static) -> Self {
		self.0.shell.attributes.push((name.to_owned(), Derived::Dynamic(Rc::new(derive))));
		self
	}
}

impl From<Arr> for View {
	fn from(builder: Arr) -> Self {
		View::Array(builder.0)
	}
}

/// Tree-builder surface. Pure data construction; the engine only pattern
/// matches on the resulting [`View`].
pub mod h {
	use super::{Arr, ArrayView, CustomView, Derived, El, ElementView, View};
	use crate::diff::Reconciler;
	use crate::dom::NodeId;
	use crate::patch::Patch;
	use crate::value::{Key, Value};
	use hashbrown::HashMap;
	use std::rc::Rc;

	#[must_use]
	pub fn elem(tag: &str) -> El {
		El::new(tag)
	}

	macro_rules! tags {
		($($name:ident)*) => {$(
			#[must_use]
			pub fn $name() -> El {
				El::new(stringify!($name))
			}
		)*};
	}

	tags!(div span button p h1 h2 ul li input label section header footer a);

	/// Constant text node.
	#[must_use]
	pub fn text(value: impl Into<Value>) -> View {
		View::Text(Derived::Static(value.into()))
	}

	/// Model-derived text node.
	#[must_use]
	pub fn text_with(derive: impl Fn(&Value) -> Value + 'static) -> View {
		View::Text(Derived::Dynamic(Rc::new(derive)))
	}

	/// Tagged-union rendering: picks the branch named by the string found at
	/// `selector` in the model.
	#[must_use]
	pub fn discriminate<'a, P, K, B>(selector: P, branches: B) -> View
	where
		P: IntoIterator<Item = K>,
		K: Into<Key>,
		B: IntoIterator<Item = (&'a str, View)>,
	{
		View::Discriminate {
			selector: selector.into_iter().map(Into::into).collect(),
			branches: branches.into_iter().map(|(key, view)| (key.to_owned(), view)).collect::<HashMap<_, _>>(),
		}
	}

	/// Dynamic list of `item` views over the sequence at `field`. Item
	/// messages are widened through `wrap` with the item's current position.
	#[must_use]
	pub fn array(field: &str, item: impl Into<View>, wrap: impl Fn(usize, Value) -> Value + 'static) -> Arr {
		Arr(ArrayView {
			field: field.to_owned(),
			shell: ElementView::new("div"),
			item: Rc::new(item.into()),
			wrap: Rc::new(wrap),
		})
	}

	/// Caller-implemented node kind.
	#[must_use]
	pub fn custom(
		create: impl Fn(&mut Reconciler, &Value) -> NodeId + 'static,
		reconcile: impl Fn(&mut Reconciler, NodeId, &Value, &Patch) -> NodeId + 'static,
		destroy: impl Fn(&mut Reconciler, NodeId) + 'static,
	) -> View {
		View::Custom(CustomView {
			create: Rc::new(create),
			reconcile: Rc::new(reconcile),
			destroy: Rc::new(destroy),
		})
	}
}
