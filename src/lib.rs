//! A patch-directed reactive view library.
//!
//! Declarative [`View`] trees are instantiated into an in-memory [`Document`]
//! and kept up to date by routing structural [`Patch`] values to exactly the
//! live nodes they affect, instead of re-diffing whole subtrees. A minimal
//! change cell and a frame-coalescing [`Instance`] drive the engine from
//! application state transitions.

#![warn(clippy::pedantic)]
#![allow(
	clippy::missing_panics_doc,
	clippy::module_name_repetitions,
	clippy::must_use_candidate,
	clippy::needless_pass_by_value
)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod cell;
pub mod diff;
pub mod dom;
pub mod events;
pub mod focus;
pub mod instance;
pub mod patch;
mod registry;
pub mod value;
pub mod view;

pub use cell::{Change, ChangeCell, Unlisten};
pub use diff::Reconciler;
pub use dom::{Document, DomStats, NodeId};
pub use events::{Event, Handler};
pub use focus::Focus;
pub use instance::{FrameQueue, Instance};
pub use patch::Patch;
pub use value::{Key, Value};
pub use view::{h, El, View};
