use crate::events::HandlerKey;
use crate::value::Value;
use hashbrown::HashMap;
use slab::Slab;

/// Handle to a live node in a [`Document`] arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// An event-listener binding stored on a live element. The handler closure
/// itself lives in the engine's registry, keyed by [`HandlerKey`].
#[derive(Clone, Debug)]
pub struct EventBinding {
	pub name: String,
	pub handler: HandlerKey,
}

struct LiveElement {
	tag: String,
	attributes: HashMap<String, String>,
	properties: HashMap<String, Value>,
	bindings: Vec<EventBinding>,
	children: Vec<NodeId>,
}

struct LiveText {
	data: String,
}

enum LiveNode {
	Element(LiveElement),
	Text(LiveText),
}

struct Slot {
	parent: Option<NodeId>,
	node: LiveNode,
}

/// Mutation counters. Reconciliation minimality is observable here: a pass
/// that changes nothing must leave `text_writes` and `attribute_writes`
/// untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DomStats {
	pub nodes_created: usize,
	pub nodes_removed: usize,
	pub text_writes: usize,
	pub attribute_writes: usize,
	pub property_writes: usize,
}

/// The live-node tree: an arena of element and text nodes with parent links.
///
/// This is the rendered output. It carries no reconciliation metadata; that
/// lives in the engine's side table, keyed by [`NodeId`].
pub struct Document {
	nodes: Slab<Slot>,
	root: NodeId,
	stats: DomStats,
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl Document {
	/// Creates a document holding a single empty root element.
	#[must_use]
	pub fn new() -> Self {
		let mut nodes = Slab::new();
		let root = NodeId(nodes.insert(Slot {
			parent: None,
			node: LiveNode::Element(LiveElement {
				tag: "root".to_owned(),
				attributes: HashMap::new(),
				properties: HashMap::new(),
				bindings: Vec::new(),
				children: Vec::new(),
			}),
		}));
		Document { nodes, root, stats: DomStats::default() }
	}

	#[must_use]
	pub fn root(&self) -> NodeId {
		self.root
	}

	#[must_use]
	pub fn stats(&self) -> &DomStats {
		&self.stats
	}

	/// Whether `node` is still allocated in the arena.
	#[must_use]
	pub fn contains(&self, node: NodeId) -> bool {
		self.nodes.contains(node.0)
	}

	pub fn create_element(&mut self, tag: &str) -> NodeId {
		self.stats.nodes_created += 1;
		NodeId(self.nodes.insert(Slot {
			parent: None,
			node: LiveNode::Element(LiveElement {
				tag: tag.to_owned(),
				attributes: HashMap::new(),
				properties: HashMap::new(),
				bindings: Vec::new(),
				children: Vec::new(),
			}),
		}))
	}

	pub fn create_text(&mut self, data: String) -> NodeId {
		self.stats.nodes_created += 1;
		NodeId(self.nodes.insert(Slot { parent: None, node: LiveNode::Text(LiveText { data }) }))
	}

	fn slot(&self, node: NodeId) -> &Slot {
		self.nodes.get(node.0).unwrap_or_else(|| panic!("document: {:?} is not allocated", node))
	}

	fn slot_mut(&mut self, node: NodeId) -> &mut Slot {
		self.nodes.get_mut(node.0).unwrap_or_else(|| panic!("document: {:?} is not allocated", node))
	}

	fn element(&self, node: NodeId) -> &LiveElement {
		match &self.slot(node).node {
			LiveNode::Element(element) => element,
			LiveNode::Text(_) => panic!("document: expected {:?} to be an element, found a text node", node),
		}
	}

	fn element_mut(&mut self, node: NodeId) -> &mut LiveElement {
		match &mut self.slot_mut(node).node {
			LiveNode::Element(element) => element,
			LiveNode::Text(_) => panic!("document: expected {:?} to be an element, found a text node", node),
		}
	}

	#[must_use]
	pub fn is_element(&self, node: NodeId) -> bool {
		matches!(self.slot(node).node, LiveNode::Element(_))
	}

	#[must_use]
	pub fn is_text(&self, node: NodeId) -> bool {
		matches!(self.slot(node).node, LiveNode::Text(_))
	}

	#[must_use]
	pub fn tag(&self, node: NodeId) -> &str {
		&self.element(node).tag
	}

	#[must_use]
	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.slot(node).parent
	}

	/// The character data of a text node.
	#[must_use]
	pub fn text(&self, node: NodeId) -> &str {
		match &self.slot(node).node {
			LiveNode::Text(text) => &text.data,
			LiveNode::Element(_) => panic!("document: expected {:?} to be a text node, found an element", node),
		}
	}

	/// Writes text data unconditionally. Callers compare first; every call
	/// counts as a write in [`DomStats`].
	pub fn set_text(&mut self, node: NodeId, data: String) {
		self.stats.text_writes += 1;
		match &mut self.slot_mut(node).node {
			LiveNode::Text(text) => text.data = data,
			LiveNode::Element(_) => panic!("document: expected {:?} to be a text node, found an element", node),
		}
	}

	#[must_use]
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
		self.element(node).attributes.get(name).map(String::as_str)
	}

	pub fn set_attribute(&mut self, node: NodeId, name: &str, value: String) {
		self.stats.attribute_writes += 1;
		self.element_mut(node).attributes.insert(name.to_owned(), value);
	}

	#[must_use]
	pub fn property(&self, node: NodeId, name: &str) -> Option<&Value> {
		self.element(node).properties.get(name)
	}

	pub fn set_property(&mut self, node: NodeId, name: &str, value: Value) {
		self.stats.property_writes += 1;
		self.element_mut(node).properties.insert(name.to_owned(), value);
	}

	#[must_use]
	pub fn bindings(&self, node: NodeId) -> &[EventBinding] {
		&self.element(node).bindings
	}

	pub fn add_binding(&mut self, node: NodeId, name: &str, handler: HandlerKey) {
		self.element_mut(node).bindings.push(EventBinding { name: name.to_owned(), handler });
	}

	#[must_use]
	pub fn children(&self, node: NodeId) -> &[NodeId] {
		&self.element(node).children
	}

	#[must_use]
	pub fn child_count(&self, node: NodeId) -> usize {
		self.element(node).children.len()
	}

	/// The child at `index`. Panics past the end: the live tree and the view
	/// tree have desynchronized.
	#[must_use]
	pub fn child(&self, node: NodeId, index: usize) -> NodeId {
		let children = &self.element(node).children;
		*children
			.get(index)
			.unwrap_or_else(|| panic!("document: no child {} of {:?} (it has {})", index, node, children.len()))
	}

	pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
		let index = self.child_count(parent);
		self.insert_child(parent, index, child);
	}

	pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
		debug_assert!(self.slot(child).parent.is_none(), "insert_child: child is already attached");
		self.slot_mut(child).parent = Some(parent);
		self.element_mut(parent).children.insert(index, child);
	}

	/// Detaches and frees the child at `index`, including its whole subtree.
	pub fn remove_child(&mut self, parent: NodeId, index: usize) {
		let child = self.element_mut(parent).children.remove(index);
		self.free_subtree(child);
	}

	/// Puts `new` where `old` is, freeing `old`'s subtree.
	pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
		let index = self
			.element(parent)
			.children
			.iter()
			.position(|&child| child == old)
			.unwrap_or_else(|| panic!("document: {:?} is not a child of {:?}", old, parent));
		self.slot_mut(new).parent = Some(parent);
		self.element_mut(parent).children[index] = new;
		self.free_subtree(old);
	}

	/// Physically reorders two children without touching either subtree.
	pub fn swap_children(&mut self, parent: NodeId, first: usize, second: usize) {
		self.element_mut(parent).children.swap(first, second);
	}

	fn free_subtree(&mut self, node: NodeId) {
		let children = match &self.slot(node).node {
			LiveNode::Element(element) => element.children.clone(),
			LiveNode::Text(_) => Vec::new(),
		};
		for child in children {
			self.free_subtree(child);
		}
		self.nodes.remove(node.0);
		self.stats.nodes_removed += 1;
	}

	/// Concatenated text data of `node` and its descendants, in tree order.
	#[must_use]
	pub fn text_content(&self, node: NodeId) -> String {
		match &self.slot(node).node {
			LiveNode::Text(text) => text.data.clone(),
			LiveNode::Element(element) => element.children.iter().map(|&child| self.text_content(child)).collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::Document;

	#[test]
	fn replace_frees_the_old_subtree() {
		let mut doc = Document::new();
		let ul = doc.create_element("ul");
		let li = doc.create_element("li");
		let inner = doc.create_text("one".to_owned());
		doc.append_child(li, inner);
		doc.append_child(ul, li);
		doc.append_child(doc.root(), ul);

		let replacement = doc.create_text("two".to_owned());
		doc.replace_child(ul, li, replacement);
		assert!(!doc.contains(li));
		assert!(!doc.contains(inner));
		assert_eq!(doc.text_content(ul), "two");
		assert_eq!(doc.stats().nodes_removed, 2);
	}
}
