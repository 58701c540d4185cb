use core::fmt;
use hashbrown::HashMap;

/// A single step into a [`Value`]: a named field of a map or a position in a
/// sequence.
///
/// Patches localize changes with `Key` chains, so the same type indexes both
/// shapes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
	Field(String),
	Index(usize),
}

impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Key::Field(name.to_owned())
	}
}

impl From<String> for Key {
	fn from(name: String) -> Self {
		Key::Field(name)
	}
}

impl From<usize> for Key {
	fn from(index: usize) -> Self {
		Key::Index(index)
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Field(name) => write!(f, "{}", name),
			Key::Index(index) => write!(f, "{}", index),
		}
	}
}

/// Dynamic model value observed by view trees and edited by patches.
///
/// Models are plain data. The engine never stores closures or live-node
/// handles inside a `Value`, which keeps models cloneable and comparable for
/// the identity shortcut in [`diff`](crate::patch::Patch::diff).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Num(f64),
	Str(String),
	Seq(Vec<Value>),
	Map(HashMap<String, Value>),
}

impl Value {
	/// Builds a map value from `(name, value)` pairs.
	#[must_use]
	pub fn record<'a, I>(fields: I) -> Self
	where
		I: IntoIterator<Item = (&'a str, Value)>,
	{
		Value::Map(fields.into_iter().map(|(name, value)| (name.to_owned(), value)).collect())
	}

	/// Builds a sequence value.
	#[must_use]
	pub fn seq<I: IntoIterator<Item = Value>>(items: I) -> Self {
		Value::Seq(items.into_iter().collect())
	}

	/// Looks up one step. `None` when the key is absent or the shape does not
	/// admit the key kind.
	#[must_use]
	pub fn get(&self, key: &Key) -> Option<&Value> {
		match (self, key) {
			(Value::Map(fields), Key::Field(name)) => fields.get(name.as_str()),
			(Value::Seq(items), Key::Index(index)) => items.get(*index),
			_ => None,
		}
	}

	pub fn get_mut(&mut self, key: &Key) -> Option<&mut Value> {
		match (self, key) {
			(Value::Map(fields), Key::Field(name)) => fields.get_mut(name.as_str()),
			(Value::Seq(items), Key::Index(index)) => items.get_mut(*index),
			_ => None,
		}
	}

	/// Walks a key path. Panics on a missing step: a view observing a model
	/// through a path it does not have means the tree and the model have
	/// desynchronized.
	#[must_use]
	pub fn at(&self, path: &[Key]) -> &Value {
		let mut value = self;
		for key in path {
			value = value.get(key).unwrap_or_else(|| panic!("value: no entry at key `{}` in {:?}", key, value));
		}
		value
	}

	/// Field shorthand for map values.
	#[must_use]
	pub fn field(&self, name: &str) -> &Value {
		self.at(&[Key::Field(name.to_owned())])
	}

	/// The sequence items of this value. Panics when the value is not a
	/// sequence.
	#[must_use]
	pub fn items(&self) -> &[Value] {
		match self {
			Value::Seq(items) => items,
			other => panic!("value: expected a sequence, found {}", other.kind()),
		}
	}

	pub(crate) fn items_mut(&mut self) -> &mut Vec<Value> {
		match self {
			Value::Seq(items) => items,
			other => panic!("value: expected a sequence, found {}", other.kind()),
		}
	}

	/// Scalar rendering used for text nodes and attributes.
	///
	/// Panics on sequences and maps: a derivation feeding text or attributes
	/// must produce a scalar.
	#[must_use]
	pub fn as_text(&self) -> String {
		match self {
			Value::Null => String::new(),
			Value::Bool(flag) => flag.to_string(),
			Value::Int(int) => int.to_string(),
			Value::Num(num) => num.to_string(),
			Value::Str(text) => text.clone(),
			composite => panic!("value: expected a scalar for text rendering, found {}", composite.kind()),
		}
	}

	/// The discriminator string of this value. Panics when the value is not a
	/// string: branch keys are string-typed by contract.
	#[must_use]
	pub fn as_branch_key(&self) -> &str {
		match self {
			Value::Str(text) => text,
			other => panic!("value: discriminator must be a string, found {}", other.kind()),
		}
	}

	/// Short shape name for panic and log messages.
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::Int(_) => "int",
			Value::Num(_) => "num",
			Value::Str(_) => "str",
			Value::Seq(_) => "seq",
			Value::Map(_) => "map",
		}
	}
}

impl From<bool> for Value {
	fn from(flag: bool) -> Self {
		Value::Bool(flag)
	}
}

impl From<i64> for Value {
	fn from(int: i64) -> Self {
		Value::Int(int)
	}
}

impl From<usize> for Value {
	#[allow(clippy::cast_possible_wrap)]
	fn from(index: usize) -> Self {
		Value::Int(index as i64)
	}
}

impl From<f64> for Value {
	fn from(num: f64) -> Self {
		Value::Num(num)
	}
}

impl From<&str> for Value {
	fn from(text: &str) -> Self {
		Value::Str(text.to_owned())
	}
}

impl From<String> for Value {
	fn from(text: String) -> Self {
		Value::Str(text)
	}
}

#[cfg(test)]
mod tests {
	use super::{Key, Value};

	#[test]
	fn path_lookup() {
		let model = Value::record([("todos", Value::seq([Value::from("a"), Value::from("b")]))]);
		assert_eq!(model.at(&[Key::from("todos"), Key::from(1usize)]), &Value::from("b"));
	}

	#[test]
	fn scalar_text() {
		assert_eq!(Value::from(5i64).as_text(), "5");
		assert_eq!(Value::from("five").as_text(), "five");
		assert_eq!(Value::Null.as_text(), "");
	}

	#[test]
	#[should_panic(expected = "expected a sequence")]
	fn items_of_non_sequence_panics() {
		let _ = Value::from(1i64).items();
	}
}
