use slab::Slab;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A model transition delivered to subscribers, carrying both endpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<T> {
	pub prev: T,
	pub next: T,
}

struct Subscriber<T> {
	on_next: Rc<dyn Fn(&Change<T>)>,
	on_complete: Rc<dyn Fn()>,
}

struct CellInner<T> {
	value: T,
	subscribers: Slab<Subscriber<T>>,
	completed: bool,
}

/// The change cell: a single mutable value slot plus a subscriber registry.
///
/// Subscribers live in an arena with stable keys, so unsubscribing never
/// shifts other records, and notification iterates a snapshot of the
/// registry, so a subscriber may unsubscribe (itself or others) re-entrantly
/// while a publish is in flight.
pub struct ChangeCell<T> {
	inner: Rc<RefCell<CellInner<T>>>,
}

impl<T> Clone for ChangeCell<T> {
	fn clone(&self) -> Self {
		ChangeCell { inner: Rc::clone(&self.inner) }
	}
}

impl<T: Clone + 'static> ChangeCell<T> {
	#[must_use]
	pub fn new(value: T) -> Self {
		ChangeCell {
			inner: Rc::new(RefCell::new(CellInner { value, subscribers: Slab::new(), completed: false })),
		}
	}

	/// The current value.
	#[must_use]
	pub fn get(&self) -> T {
		self.inner.borrow().value.clone()
	}

	/// Registers a subscriber. On a completed cell `on_complete` fires
	/// immediately and the returned token is inert.
	pub fn subscribe(&self, on_next: impl Fn(&Change<T>) + 'static, on_complete: impl Fn() + 'static) -> Unlisten<T> {
		let mut inner = self.inner.borrow_mut();
		if inner.completed {
			drop(inner);
			on_complete();
			return Unlisten { inner: Weak::new(), key: 0 };
		}
		let key = inner.subscribers.insert(Subscriber {
			on_next: Rc::new(on_next),
			on_complete: Rc::new(on_complete),
		});
		Unlisten { inner: Rc::downgrade(&self.inner), key }
	}

	/// Installs `next` and synchronously fans the transition out to every
	/// subscriber registered at the time of the call.
	pub fn publish(&self, next: T) {
		let (change, snapshot) = {
			let mut inner = self.inner.borrow_mut();
			let prev = core::mem::replace(&mut inner.value, next.clone());
			let snapshot: Vec<_> = inner.subscribers.iter().map(|(_, sub)| Rc::clone(&sub.on_next)).collect();
			(Change { prev, next }, snapshot)
		};
		for on_next in snapshot {
			on_next(&change);
		}
	}

	/// Publishes the result of `step` applied to the current value.
	pub fn modify(&self, step: impl FnOnce(&T) -> T) {
		let next = step(&self.inner.borrow().value);
		self.publish(next);
	}

	/// Fires every subscriber's completion callback and clears the registry.
	/// Later publishes notify no one; later subscribes complete immediately.
	pub fn complete(&self) {
		let snapshot = {
			let mut inner = self.inner.borrow_mut();
			inner.completed = true;
			let snapshot: Vec<_> = inner.subscribers.iter().map(|(_, sub)| Rc::clone(&sub.on_complete)).collect();
			inner.subscribers.clear();
			snapshot
		};
		for on_complete in snapshot {
			on_complete();
		}
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.inner.borrow().subscribers.len()
	}
}

/// Token returned by [`ChangeCell::subscribe`]. Dropping it keeps the
/// subscription; call [`unlisten`](Self::unlisten) to remove it.
pub struct Unlisten<T> {
	inner: Weak<RefCell<CellInner<T>>>,
	key: usize,
}

impl<T> Unlisten<T> {
	pub fn unlisten(self) {
		if let Some(inner) = self.inner.upgrade() {
			let mut inner = inner.borrow_mut();
			if inner.subscribers.contains(self.key) {
				inner.subscribers.remove(self.key);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::ChangeCell;
	use std::cell::RefCell;
	use std::rc::Rc;

	#[test]
	fn publish_delivers_both_endpoints() {
		let cell = ChangeCell::new(1);
		let seen = Rc::new(RefCell::new(Vec::new()));
		let log = Rc::clone(&seen);
		let token = cell.subscribe(move |change| log.borrow_mut().push((change.prev, change.next)), || {});
		cell.publish(2);
		cell.publish(3);
		token.unlisten();
		cell.publish(4);
		assert_eq!(*seen.borrow(), vec![(1, 2), (2, 3)]);
	}

	#[test]
	fn reentrant_unsubscribe_during_publish_is_safe() {
		let cell = ChangeCell::new(0);
		let slot = Rc::new(RefCell::new(None::<super::Unlisten<i32>>));
		let held = Rc::clone(&slot);
		let fired = Rc::new(RefCell::new(0));
		let count = Rc::clone(&fired);
		let token = cell.subscribe(
			move |_| {
				*count.borrow_mut() += 1;
				if let Some(token) = held.borrow_mut().take() {
					token.unlisten();
				}
			},
			|| {},
		);
		*slot.borrow_mut() = Some(token);
		cell.publish(1);
		cell.publish(2);
		assert_eq!(*fired.borrow(), 1);
		assert_eq!(cell.subscriber_count(), 0);
	}

	#[test]
	fn complete_notifies_and_clears() {
		let cell = ChangeCell::new(0);
		let done = Rc::new(RefCell::new(0));
		let count = Rc::clone(&done);
		let _token = cell.subscribe(|_| {}, move || *count.borrow_mut() += 1);
		cell.complete();
		assert_eq!(*done.borrow(), 1);
		assert_eq!(cell.subscriber_count(), 0);

		let late = Rc::clone(&done);
		let _token = cell.subscribe(|_| {}, move || *late.borrow_mut() += 1);
		assert_eq!(*done.borrow(), 2);
	}
}
