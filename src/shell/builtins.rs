//! Built-in commands and command-line rewriting
//!
//! Built-ins are recognized here and executed by the mode controller,
//! which owns the state they touch. Rewriting covers `!N` history
//! references, first-word aliases and a trailing `&`.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BuiltinError {
    #[error("{name}: {message}")]
    Parse { name: &'static str, message: String },

    #[error("history: invalid usage (history, history N, history -c)")]
    HistoryUsage,

    #[error("edit: usage: edit <file>")]
    EditUsage,
}

/// Argument of the `history` built-in
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryArg {
    List,
    Entry(u32),
    Clear,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Clear,
    Pwd,
    /// `None` goes home
    Cd(Option<String>),
    Jobs,
    History(HistoryArg),
    Edit(String),
    Quit,
}

/// Names offered by command completion
pub const BUILTIN_NAMES: &[&str] = &[
    "cd", "clear", "edit", "help", "history", "jobs", "pwd", "quit",
];

impl Builtin {
    /// Recognize a built-in; `None` means the line goes to a child process
    pub fn parse(line: &str) -> Option<Result<Builtin, BuiltinError>> {
        let trimmed = line.trim();
        let name = trimmed.split_whitespace().next()?;
        let rest = trimmed[name.len()..].trim();

        let builtin = match name {
            "help" if rest.is_empty() => Builtin::Help,
            "clear" if rest.is_empty() => Builtin::Clear,
            "pwd" if rest.is_empty() => Builtin::Pwd,
            "jobs" if rest.is_empty() => Builtin::Jobs,
            "quit" if rest.is_empty() => Builtin::Quit,
            "cd" => {
                // cd takes the rest verbatim so paths with spaces work unquoted
                let target = match split_args("cd", rest) {
                    Ok(words) if words.len() == 1 => words.into_iter().next(),
                    Ok(words) if words.is_empty() => None,
                    _ => Some(rest.to_string()),
                };
                Builtin::Cd(target)
            }
            "history" => match split_args("history", rest) {
                Ok(words) => match words.as_slice() {
                    [] => Builtin::History(HistoryArg::List),
                    [arg] if arg == "-c" || arg == "clear" => Builtin::History(HistoryArg::Clear),
                    [arg] => match arg.parse::<u32>() {
                        Ok(index) => Builtin::History(HistoryArg::Entry(index)),
                        Err(_) => return Some(Err(BuiltinError::HistoryUsage)),
                    },
                    _ => return Some(Err(BuiltinError::HistoryUsage)),
                },
                Err(err) => return Some(Err(err)),
            },
            "edit" => match split_args("edit", rest) {
                Ok(words) => match words.into_iter().next() {
                    Some(file) => Builtin::Edit(file),
                    None => return Some(Err(BuiltinError::EditUsage)),
                },
                Err(err) => return Some(Err(err)),
            },
            _ => return None,
        };
        Some(Ok(builtin))
    }
}

fn split_args(name: &'static str, rest: &str) -> Result<Vec<String>, BuiltinError> {
    shell_words::split(rest).map_err(|err| BuiltinError::Parse {
        name,
        message: err.to_string(),
    })
}

/// Lines printed by `help`
pub fn help_lines() -> Vec<String> {
    [
        "Built-in commands:",
        "  clear       - Clear the screen",
        "  cd <dir>    - Change directory",
        "  pwd         - Print working directory",
        "  jobs        - List background processes",
        "  history     - Show command history",
        "  history N   - Show entry at index N",
        "  history -c  - Clear command history",
        "  !N          - Execute history entry N",
        "  edit <file> - Open the built-in text editor",
        "  help        - Show this help",
        "  quit        - Exit",
        "",
        "Interactive programs (nano, vim, top, ...) take over the screen.",
        "In full-screen programs press L2+R2 together for Ctrl+C.",
        "End a command with '&' to run it in the background.",
        "Everything else runs through the configured shell.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Resolve a `cd` target against the tracked working directory
pub fn resolve_dir(cwd: &Path, target: Option<&str>, home: Option<&Path>) -> std::io::Result<PathBuf> {
    let path = match target {
        None | Some("~") => home
            .map(Path::to_path_buf)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME is not set"))?,
        Some(t) => expand_home(t, home),
    };
    let path = if path.is_absolute() { path } else { cwd.join(path) };
    let canonical = path.canonicalize()?;
    if !canonical.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("not a directory: {}", canonical.display()),
        ));
    }
    Ok(canonical)
}

/// `~/x` to `$HOME/x`
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => home.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}

/// `!N` history reference
pub fn history_reference(line: &str) -> Option<u32> {
    let digits = line.trim().strip_prefix('!')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Strip a trailing `&`; true when one was present
pub fn split_background(line: &str) -> (String, bool) {
    let trimmed = line.trim();
    match trimmed.strip_suffix('&') {
        // `&&` is a shell operator, not a background marker
        Some(rest) if !rest.ends_with('&') => (rest.trim_end().to_string(), true),
        _ => (trimmed.to_string(), false),
    }
}

/// First-word aliases applied before dispatch
pub const COMMAND_ALIASES: &[(&str, &str)] = &[
    ("py", "python3"),
    ("python", "python3"),
    ("ipy", "ipython3"),
    ("ipython", "ipython3"),
];

/// Rewrite the first word when it is an alias that does not exist but
/// whose target does. Returns the new line and an `a → b` note.
pub fn apply_alias(line: &str, exists: impl Fn(&str) -> bool) -> (String, Option<String>) {
    let stripped = line.trim_start();
    if stripped.starts_with(['\'', '"']) {
        return (line.to_string(), None);
    }
    let first = stripped.split_whitespace().next().unwrap_or("");
    let Some((_, target)) = COMMAND_ALIASES.iter().find(|(alias, _)| *alias == first) else {
        return (line.to_string(), None);
    };
    if exists(first) || !exists(target) {
        return (line.to_string(), None);
    }
    let leading = &line[..line.len() - stripped.len()];
    let rewritten = format!("{}{}{}", leading, target, &stripped[first.len()..]);
    (rewritten, Some(format!("{} → {}", first, target)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtins() {
        assert_eq!(Builtin::parse("pwd"), Some(Ok(Builtin::Pwd)));
        assert_eq!(Builtin::parse("  cd  "), Some(Ok(Builtin::Cd(None))));
        assert_eq!(Builtin::parse("cd \"my dir\""), Some(Ok(Builtin::Cd(Some("my dir".into())))));
        assert_eq!(Builtin::parse("cd my dir"), Some(Ok(Builtin::Cd(Some("my dir".into())))));
        assert_eq!(
            Builtin::parse("history 3"),
            Some(Ok(Builtin::History(HistoryArg::Entry(3))))
        );
        assert_eq!(
            Builtin::parse("history -c"),
            Some(Ok(Builtin::History(HistoryArg::Clear)))
        );
        assert_eq!(Builtin::parse("history x"), Some(Err(BuiltinError::HistoryUsage)));
        assert_eq!(Builtin::parse("edit"), Some(Err(BuiltinError::EditUsage)));
        assert_eq!(Builtin::parse("edit notes.txt"), Some(Ok(Builtin::Edit("notes.txt".into()))));
        assert_eq!(Builtin::parse("ls -la"), None);
        assert_eq!(Builtin::parse("pwdx"), None);
        assert_eq!(Builtin::parse("clear now"), None);
        assert_eq!(Builtin::parse(""), None);
    }

    #[test]
    fn test_history_reference() {
        assert_eq!(history_reference("!12"), Some(12));
        assert_eq!(history_reference(" !3 "), Some(3));
        assert_eq!(history_reference("!"), None);
        assert_eq!(history_reference("!ls"), None);
        assert_eq!(history_reference("echo !1"), None);
    }

    #[test]
    fn test_split_background() {
        assert_eq!(split_background("sleep 10 &"), ("sleep 10".to_string(), true));
        assert_eq!(split_background("sleep 10&"), ("sleep 10".to_string(), true));
        assert_eq!(split_background("a && b"), ("a && b".to_string(), false));
        assert_eq!(split_background("ls"), ("ls".to_string(), false));
    }

    #[test]
    fn test_alias_needs_missing_alias_and_present_target() {
        let only_python3 = |name: &str| name == "python3";
        assert_eq!(
            apply_alias("py script.py", only_python3),
            ("python3 script.py".to_string(), Some("py → python3".to_string()))
        );
        let both = |name: &str| name == "python3" || name == "python";
        assert_eq!(apply_alias("python x", both).1, None);
        let none = |_: &str| false;
        assert_eq!(apply_alias("py", none).1, None);
        assert_eq!(apply_alias("pyx", only_python3).1, None);
    }

    #[test]
    fn test_resolve_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("file"), "x").unwrap();

        assert_eq!(resolve_dir(&root, Some("sub"), None).unwrap(), root.join("sub"));
        assert_eq!(resolve_dir(&root.join("sub"), Some(".."), None).unwrap(), root);
        assert_eq!(resolve_dir(&root, None, Some(&root)).unwrap(), root);
        assert_eq!(resolve_dir(&root, Some("~/sub"), Some(&root)).unwrap(), root.join("sub"));
        assert!(resolve_dir(&root, Some("missing"), None).is_err());
        assert!(resolve_dir(&root, Some("file"), None).is_err());
    }
}
