//! Item lifecycle state tracking

mod item_state;

pub use item_state::{ItemState, TransitionError};
