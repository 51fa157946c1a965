//! API handlers.

mod domains;
mod status;

pub use domains::{approve, dry_run, evaluate, get_state, history, observe, reset, set_mode};
pub use status::status;
