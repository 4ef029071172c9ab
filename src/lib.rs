//! padterm - a gamepad-driven terminal
//!
//! The engine is host-agnostic: [`app::ModeController`] consumes one
//! [`input::ButtonSet`] snapshot per tick and exposes everything a renderer
//! needs. The `ui` module is the crossterm host used by the binary.
//!
//! # Modules
//!
//! - **core**: PTY, child sessions and the terminal screen model
//! - **input**: buttons, chords, keymaps, the on-screen keyboard
//! - **shell**: the line shell (built-ins, completion, background jobs)
//! - **editor**, **menu**, **clipboard**: the overlay modes
//! - **app**: the mode controller tying it together

pub mod app;
pub mod clipboard;
pub mod config;
pub mod core;
pub mod editor;
pub mod history;
pub mod input;
pub mod menu;
pub mod shell;
pub mod ui;
