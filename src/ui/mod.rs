//! Host front-end.
//!
//! - **renderer**: composes the controller state into a frame and draws it
//!   with crossterm
//! - **host_input**: desktop keyboard mapped onto controller buttons

pub mod host_input;
pub mod renderer;

pub use host_input::{HostEvent, HostInput};
pub use renderer::{compose, Frame, Renderer};
