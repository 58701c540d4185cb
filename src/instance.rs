use crate::cell::{ChangeCell, Unlisten};
use crate::diff::Reconciler;
use crate::dom::{Document, NodeId};
use crate::events::Event;
use crate::patch::Patch;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{trace, trace_span};

/// The animation-frame stand-in: a queue of callbacks the host pumps once per
/// frame. A browser host wires this to its frame callback; tests pump it by
/// hand.
#[derive(Clone, Default)]
pub struct FrameQueue {
	queue: Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>,
}

impl FrameQueue {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn request(&self, callback: Box<dyn FnOnce()>) {
		self.queue.borrow_mut().push_back(callback);
	}

	/// Runs the next queued frame callback. Returns whether one ran.
	pub fn run_one(&self) -> bool {
		let callback = self.queue.borrow_mut().pop_front();
		match callback {
			Some(callback) => {
				callback();
				true
			}
			None => false,
		}
	}

	/// Pumps until the queue drains, including callbacks queued while
	/// running.
	pub fn run_until_idle(&self) {
		while self.run_one() {}
	}

	#[must_use]
	pub fn pending(&self) -> usize {
		self.queue.borrow().len()
	}
}

/// Coalescing states. At most one frame callback is in flight; a transition
/// arriving while one is pending merges into the same upcoming pass, and a
/// transition arriving during the pass itself schedules exactly one more.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FrameState {
	NoRequest,
	Pending,
	Extra,
}

struct InstanceInner {
	rec: Reconciler,
	view: Rc<crate::view::View>,
	el: Option<NodeId>,
	prev_model: Value,
	current_model: Value,
	pending: Vec<Patch>,
	state: FrameState,
	renders: usize,
	sink: Rc<dyn Fn(Value)>,
}

/// A running application instance: one mounted view tree plus the coalescing
/// stepper that folds bursts of model transitions into one reconciliation per
/// frame.
#[derive(Clone)]
pub struct Instance {
	inner: Rc<RefCell<InstanceInner>>,
	frames: FrameQueue,
}

impl Instance {
	/// Instantiates `view` against `model` under the document root (the first
	/// paint is synchronous) and returns the running instance. Bubbled,
	/// fully-projected messages are delivered to `sink`.
	pub fn attach(view: impl Into<crate::view::View>, model: Value, frames: FrameQueue, sink: impl Fn(Value) + 'static) -> Self {
		let view = Rc::new(view.into());
		let mut rec = Reconciler::new();
		let el = rec.mount(&view, &model);
		let inner = InstanceInner {
			rec,
			view,
			el: Some(el),
			prev_model: model.clone(),
			current_model: model,
			pending: Vec::new(),
			state: FrameState::NoRequest,
			renders: 0,
			sink: Rc::new(sink),
		};
		Instance {
			inner: Rc::new(RefCell::new(inner)),
			frames,
		}
	}

	/// Records `next` as the latest model and schedules a reconciliation
	/// frame. Identical models are dropped; repeated calls before the frame
	/// coalesce into one pass.
	pub fn step(&self, next: Value) {
		let mut inner = self.inner.borrow_mut();
		if inner.current_model == next {
			return;
		}
		self.request_frame(&mut inner);
		inner.current_model = next.clone();
		let root = inner.rec.doc().root();
		inner.rec.set_root_model(root, next);
	}

	/// Queues an explicit patch for the next frame. The patch also advances
	/// the model event dispatch reads, so a listener firing before the frame
	/// sees the post-patch value.
	pub fn publish(&self, patch: Patch) {
		if patch.is_noop() {
			return;
		}
		let mut inner = self.inner.borrow_mut();
		self.request_frame(&mut inner);
		patch.apply_in_place(&mut inner.current_model);
		inner.pending.push(patch);
		let root = inner.rec.doc().root();
		let model = inner.current_model.clone();
		inner.rec.set_root_model(root, model);
	}

	fn request_frame(&self, inner: &mut InstanceInner) {
		if inner.state == FrameState::NoRequest {
			let shared = Rc::clone(&self.inner);
			let frames = self.frames.clone();
			self.frames.request(Box::new(move || run_frame(&shared, &frames)));
		}
		inner.state = FrameState::Pending;
	}

	/// Subscribes the stepper to `cell`; completion unmounts the instance.
	pub fn drive(&self, cell: &ChangeCell<Value>) -> Unlisten<Value> {
		let stepper = self.clone();
		let teardown = self.clone();
		cell.subscribe(
			move |change| stepper.step(change.next.clone()),
			move || teardown.unmount(),
		)
	}

	/// Delivers `event` at `target`, bubbling it up the live tree, and feeds
	/// every resulting message to the sink.
	pub fn dispatch(&self, target: NodeId, event: &Event) {
		let (messages, sink) = {
			let inner = self.inner.borrow();
			(inner.rec.dispatch(target, event), Rc::clone(&inner.sink))
		};
		// The borrow is released first: a sink is free to step re-entrantly.
		for message in messages {
			(*sink)(message);
		}
	}

	/// Synchronously tears the mounted tree down, releasing every binding
	/// before returning. Pending transitions are dropped.
	pub fn unmount(&self) {
		let mut inner = self.inner.borrow_mut();
		if let Some(el) = inner.el.take() {
			let view = Rc::clone(&inner.view);
			inner.rec.unmount(el, &view);
			inner.pending.clear();
			inner.state = FrameState::NoRequest;
		}
	}

	/// The mounted live node, `None` once unmounted.
	#[must_use]
	pub fn mounted(&self) -> Option<NodeId> {
		self.inner.borrow().el
	}

	/// How many reconciliation passes have run.
	#[must_use]
	pub fn render_count(&self) -> usize {
		self.inner.borrow().renders
	}

	#[must_use]
	pub fn handler_count(&self) -> usize {
		self.inner.borrow().rec.handler_count()
	}

	/// Read access to the live document.
	pub fn with_doc<R>(&self, read: impl FnOnce(&Document) -> R) -> R {
		read(self.inner.borrow().rec.doc())
	}

	/// The current (latest stepped) model.
	#[must_use]
	pub fn model(&self) -> Value {
		self.inner.borrow().current_model.clone()
	}
}

/// One frame callback. `Pending` reconciles and schedules one extra frame in
/// case transitions arrive during the pass; `Extra` retires that reservation;
/// a callback in `NoRequest` means the scheduler and the instance disagree.
fn run_frame(shared: &Rc<RefCell<InstanceInner>>, frames: &FrameQueue) {
	let span = trace_span!("frame");
	let _enter = span.enter();

	let mut inner = shared.borrow_mut();
	match inner.state {
		FrameState::NoRequest => panic!("instance: unexpected frame callback while none was requested"),
		FrameState::Pending => {
			let again = Rc::clone(shared);
			let requeue = frames.clone();
			frames.request(Box::new(move || run_frame(&again, &requeue)));
			inner.state = FrameState::Extra;

			let Some(el) = inner.el else {
				trace!("unmounted before the frame; skipping");
				return;
			};
			let patch = take_patch(&mut inner);
			if patch.is_noop() {
				return;
			}
			let view = Rc::clone(&inner.view);
			let prev = inner.prev_model.clone();
			let next = inner.rec.reconcile(el, &view, &prev, &patch);
			if next != el {
				let root = inner.rec.doc().root();
				inner.rec.doc_mut().replace_child(root, el, next);
				inner.el = Some(next);
			}
			inner.prev_model = inner.current_model.clone();
			inner.renders += 1;
			inner.rec.sweep_handlers();
		}
		FrameState::Extra => {
			inner.state = FrameState::NoRequest;
		}
	}
}

/// The coalesced patch for this frame: the queued explicit patches, plus a
/// trailing diff when stepped models moved past what those patches cover.
fn take_patch(inner: &mut InstanceInner) -> Patch {
	let mut patches: Vec<Patch> = inner.pending.drain(..).collect();
	let mut reached = inner.prev_model.clone();
	for patch in &patches {
		patch.apply_in_place(&mut reached);
	}
	if reached != inner.current_model {
		patches.push(Patch::diff(&reached, &inner.current_model));
	}
	Patch::Batch(patches)
}

#[cfg(test)]
mod tests {
	use super::FrameQueue;
	use std::cell::RefCell;
	use std::rc::Rc;

	#[test]
	fn frame_queue_runs_in_request_order() {
		let frames = FrameQueue::new();
		let log = Rc::new(RefCell::new(Vec::new()));
		for tag in ["first", "second"] {
			let log = Rc::clone(&log);
			frames.request(Box::new(move || log.borrow_mut().push(tag)));
		}
		frames.run_until_idle();
		assert_eq!(*log.borrow(), vec!["first", "second"]);
	}
}
