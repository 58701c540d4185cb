use patchdom::{h, ChangeCell, FrameQueue, Instance, Patch, Value, View};

fn counter_app() -> (Instance, FrameQueue) {
	let view: View = h::div().child(h::text_with(|m| m.field("count").clone())).into();
	let frames = FrameQueue::new();
	let inst = Instance::attach(view, counter(0), frames.clone(), |_| {});
	(inst, frames)
}

fn counter(count: i64) -> Value {
	Value::record([("count", Value::from(count))])
}

#[test]
fn first_paint_is_synchronous() {
	let (inst, frames) = counter_app();
	assert_eq!(frames.pending(), 0);
	inst.with_doc(|doc| assert_eq!(doc.text_content(doc.root()), "0"));
}

#[test]
fn bursts_of_steps_coalesce_into_one_pass() {
	let (inst, frames) = counter_app();
	inst.step(counter(1));
	inst.step(counter(2));
	inst.step(counter(3));
	// One frame is in flight no matter how many transitions arrived.
	assert_eq!(frames.pending(), 1);

	assert!(frames.run_one());
	assert_eq!(inst.render_count(), 1);
	inst.with_doc(|doc| assert_eq!(doc.text_content(doc.root()), "3"));

	// The reserved extra frame retires without reconciling.
	frames.run_until_idle();
	assert_eq!(inst.render_count(), 1);
	assert_eq!(frames.pending(), 0);
}

#[test]
fn transitions_during_a_pass_get_exactly_one_more_pass() {
	let (inst, frames) = counter_app();
	inst.step(counter(1));
	assert!(frames.run_one());
	assert_eq!(inst.render_count(), 1);

	// Arrives between the pass and its reserved extra frame.
	inst.step(counter(2));
	frames.run_until_idle();
	assert_eq!(inst.render_count(), 2);
	inst.with_doc(|doc| assert_eq!(doc.text_content(doc.root()), "2"));
}

#[test]
fn identical_models_schedule_nothing() {
	let (inst, frames) = counter_app();
	inst.step(counter(0));
	assert_eq!(frames.pending(), 0);
	assert_eq!(inst.render_count(), 0);
}

#[test]
fn explicit_patches_coalesce_with_steps() {
	let (inst, frames) = counter_app();
	inst.publish(Patch::at(["count"], Patch::replace(Value::from(0i64), Value::from(1i64))));
	inst.step(counter(5));
	frames.run_until_idle();
	assert_eq!(inst.render_count(), 1);
	inst.with_doc(|doc| assert_eq!(doc.text_content(doc.root()), "5"));
	assert_eq!(inst.model(), counter(5));
}

#[test]
fn a_cell_drives_the_stepper_and_completion_unmounts() {
	let view: View = h::div()
		.on("click", |_, _| Some(Value::from("noise")))
		.child(h::text_with(|m| m.field("count").clone()))
		.into();
	let frames = FrameQueue::new();
	let inst = Instance::attach(view, counter(0), frames.clone(), |_| {});
	let cell = ChangeCell::new(counter(0));
	let _listening = inst.drive(&cell);
	assert_eq!(inst.handler_count(), 1);

	cell.modify(|model| {
		let bump = Patch::at(["count"], Patch::replace(model.field("count").clone(), Value::from(9i64)));
		bump.apply(model)
	});
	frames.run_until_idle();
	inst.with_doc(|doc| assert_eq!(doc.text_content(doc.root()), "9"));

	// Teardown is synchronous: bindings are gone before complete() returns.
	cell.complete();
	assert!(inst.mounted().is_none());
	assert_eq!(inst.handler_count(), 0);
	inst.with_doc(|doc| assert_eq!(doc.child_count(doc.root()), 0));

	// A frame landing after teardown is a no-op.
	frames.run_until_idle();
	assert_eq!(inst.mounted(), None);
}
