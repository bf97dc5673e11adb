//! Pure editing logic for funnels: canvas reordering, A/B traffic allocation,
//! quiz scoring, conditional routing and the editor session reducer.
//!
//! Every operation takes the current model and returns a new one; nothing in
//! this crate performs I/O.

pub mod allocator;
pub mod canvas;
pub mod experiment;
pub mod ids;
pub mod lifecycle;
pub mod progress;
pub mod quiz;
pub mod routing;
pub mod session;
pub mod validation;

pub use allocator::{add_variant, delete_variant, set_allocation};
pub use canvas::{duplicate_element, move_element};
pub use progress::FunnelProgress;
pub use quiz::calculate_quiz_result;
pub use routing::{next_page, NextPage};
pub use session::{EditorAction, EditorSession};
