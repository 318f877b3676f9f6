//! Run lifecycle, artifact layout, path invariants, and browser driver
//! protocol shared by the GeminiLoop orchestration engine.

pub mod artifacts;
pub mod bootstrap;
pub mod browser;
pub mod error;
pub mod path;
pub mod preview;
pub mod rubric;
pub mod state;
pub mod trace;

pub use error::{RuntimeError, RuntimeResult};
