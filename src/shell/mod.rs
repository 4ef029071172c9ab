//! Built-in line shell.
//!
//! - **line**: the input line and its key handling
//! - **builtins**: commands handled without a child process, plus `!N`,
//!   alias and `&` rewriting
//! - **complete**: tab completion
//! - **jobs**: background processes

pub mod builtins;
pub mod complete;
pub mod jobs;
pub mod line;

pub use builtins::{Builtin, BuiltinError, HistoryArg};
pub use complete::{Completer, Completion};
pub use jobs::JobList;
pub use line::{LineBuffer, LineEvent};
