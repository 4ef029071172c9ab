//! Tab completion for the shell line
//!
//! The word before the cursor is completed against, in order:
//! the alias table and commands on `PATH` (first word only), then the
//! filesystem relative to the working directory. Several matches extend
//! the word to their longest common prefix; when that adds nothing, up to
//! [`MAX_LISTED`] candidates are listed and the line is left unchanged.
//! Repeating the request gives the same answer.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::session::is_executable;

use super::builtins::{expand_home, BUILTIN_NAMES};

/// Candidates shown when completion is ambiguous
pub const MAX_LISTED: usize = 8;

/// Aliases expanded in place when completing the first word
pub const COMPLETION_ALIASES: &[(&str, &str)] = &[
    ("py", "python3"),
    ("python", "python3"),
    ("ipy", "ipython3"),
    ("v", "vim"),
    ("n", "nano"),
    ("ll", "ls -lah"),
    ("la", "ls -a"),
    ("cls", "clear"),
    ("h", "history"),
];

/// Result of a completion request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// New line text
    pub line: String,
    /// New cursor, in characters
    pub cursor: usize,
    /// Notices for the output area
    pub messages: Vec<String>,
}

/// Completes words against commands and the filesystem
#[derive(Clone, Debug, Default)]
pub struct Completer {
    home: Option<PathBuf>,
    /// `PATH` override for tests
    search_path: Option<Vec<PathBuf>>,
}

impl Completer {
    pub fn new() -> Self {
        Self {
            home: env::var_os("HOME").map(PathBuf::from),
            search_path: None,
        }
    }

    pub fn with_search_path(mut self, dirs: Vec<PathBuf>, home: Option<PathBuf>) -> Self {
        self.search_path = Some(dirs);
        self.home = home;
        self
    }

    /// Complete the word ending at `cursor` (a character index)
    pub fn complete(&self, line: &str, cursor: usize, cwd: &Path) -> Completion {
        let unchanged = |messages: Vec<String>| Completion {
            line: line.to_string(),
            cursor,
            messages,
        };

        let chars: Vec<char> = line.chars().collect();
        let cursor = cursor.min(chars.len());
        let before: String = chars[..cursor].iter().collect();
        let after: String = chars[cursor..].iter().collect();
        if before.trim().is_empty() || before.ends_with(char::is_whitespace) {
            return unchanged(Vec::new());
        }

        let word_start = before
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let word = &before[word_start..];
        let first_word = before[..word_start].trim().is_empty();
        let (quote, body) = match word.chars().next() {
            Some(q @ ('"' | '\'')) => (Some(q), &word[1..]),
            _ => (None, word),
        };

        let replace = |completed: &str, messages: Vec<String>| {
            let mut text = String::from(&before[..word_start]);
            if let Some(q) = quote {
                text.push(q);
            }
            text.push_str(completed);
            let cursor = text.chars().count();
            text.push_str(&after);
            Completion {
                line: text,
                cursor,
                messages,
            }
        };

        if first_word && quote.is_none() {
            if let Some((_, target)) = COMPLETION_ALIASES.iter().find(|(a, _)| *a == body) {
                let note = format!("[Autocomplete] {} → {}", body, target);
                return replace(*target, vec![note]);
            }
            if !body.contains('/') {
                let commands = self.commands_matching(body);
                match commands.len() {
                    0 => {}
                    1 => {
                        let only = &commands[0];
                        let note = format!("[Autocomplete] {} → {}", body, only);
                        return replace(only.as_str(), vec![note]);
                    }
                    _ => {
                        let prefix = common_prefix(&commands);
                        if prefix.chars().count() > body.chars().count() {
                            let note = format!("[Autocomplete] {} → {}", body, prefix);
                            return replace(prefix.as_str(), vec![note]);
                        }
                        return unchanged(vec![listing(&commands)]);
                    }
                }
            }
        }

        let matches = self.paths_matching(body, cwd);
        match matches.len() {
            0 => unchanged(vec![format!(
                "[Autocomplete] No completion found for '{}'",
                word
            )]),
            1 => {
                let (display, is_dir) = &matches[0];
                let mut completed = display.clone();
                if *is_dir && !completed.ends_with('/') {
                    completed.push('/');
                }
                let note = format!("[Autocomplete] {} → {}", word, completed);
                replace(completed.as_str(), vec![note])
            }
            _ => {
                let names: Vec<String> = matches.iter().map(|(d, _)| d.clone()).collect();
                let prefix = common_prefix(&names);
                if prefix.chars().count() > body.chars().count() {
                    let note = format!("[Autocomplete] {} → {}", word, prefix);
                    return replace(prefix.as_str(), vec![note]);
                }
                let basenames: Vec<String> = names
                    .iter()
                    .map(|n| {
                        let trimmed = n.trim_end_matches('/');
                        trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
                    })
                    .collect();
                unchanged(vec![listing(&basenames)])
            }
        }
    }

    /// Builtins and executables on the search path starting with `prefix`
    fn commands_matching(&self, prefix: &str) -> Vec<String> {
        let mut found: BTreeSet<String> = BUILTIN_NAMES
            .iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| name.to_string())
            .collect();

        let dirs = match &self.search_path {
            Some(dirs) => dirs.clone(),
            None => env::var_os("PATH")
                .map(|p| env::split_paths(&p).collect())
                .unwrap_or_default(),
        };
        for dir in dirs {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(prefix) && is_executable(&entry.path()) {
                    found.insert(name);
                }
            }
        }
        found.into_iter().collect()
    }

    /// Filesystem entries matching `word`, as (display text, is directory).
    /// Display text keeps the directory part the user typed.
    fn paths_matching(&self, word: &str, cwd: &Path) -> Vec<(String, bool)> {
        let (dir_part, file_prefix) = match word.rfind('/') {
            Some(i) => (&word[..=i], &word[i + 1..]),
            None => ("", word),
        };
        let expanded = expand_home(dir_part, self.home.as_deref());
        let search_dir = if dir_part.is_empty() {
            cwd.to_path_buf()
        } else if expanded.is_absolute() {
            expanded
        } else {
            cwd.join(expanded)
        };

        let Ok(entries) = fs::read_dir(&search_dir) else {
            return Vec::new();
        };
        let mut matches: Vec<(String, bool)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                // Hidden entries only when asked for explicitly
                if !name.starts_with(file_prefix) || (name.starts_with('.') && !file_prefix.starts_with('.')) {
                    return None;
                }
                let is_dir = entry.path().is_dir();
                Some((format!("{}{}", dir_part, name), is_dir))
            })
            .collect();
        matches.sort();
        matches
    }
}

fn common_prefix(words: &[String]) -> String {
    let Some(first) = words.first() else {
        return String::new();
    };
    let mut len = first.len();
    for word in &words[1..] {
        len = first
            .char_indices()
            .zip(word.chars())
            .take_while(|((_, a), b)| a == b)
            .map(|((i, a), _)| i + a.len_utf8())
            .last()
            .unwrap_or(0)
            .min(len);
    }
    first[..len].to_string()
}

fn listing(names: &[String]) -> String {
    let shown: Vec<&str> = names.iter().take(MAX_LISTED).map(String::as_str).collect();
    let mut text = format!("[Autocomplete] {}", shown.join(", "));
    if names.len() > MAX_LISTED {
        text.push_str(&format!(" ... ({} total)", names.len()));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    struct Fixture {
        dir: tempfile::TempDir,
        completer: Completer,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let bin = dir.path().join("bin");
            fs::create_dir(&bin).unwrap();
            for name in ["grepx", "greppy", "zzonly"] {
                let path = bin.join(name);
                fs::write(&path, "#!/bin/sh\n").unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
            fs::write(bin.join("grepdata"), "not executable").unwrap();

            let work = dir.path().join("work");
            fs::create_dir_all(work.join("documents")).unwrap();
            fs::create_dir_all(work.join("my dir")).unwrap();
            fs::write(work.join("notes_one.txt"), "").unwrap();
            fs::write(work.join("notes_two.txt"), "").unwrap();
            fs::write(work.join(".hidden"), "").unwrap();

            let completer = Completer::default().with_search_path(vec![bin], Some(dir.path().to_path_buf()));
            Self { dir, completer }
        }

        fn work(&self) -> PathBuf {
            self.dir.path().join("work")
        }

        fn complete(&self, line: &str) -> Completion {
            self.completer.complete(line, line.chars().count(), &self.work())
        }
    }

    #[test]
    fn test_alias_expands_first_word() {
        let f = Fixture::new();
        let c = f.complete("ll");
        assert_eq!(c.line, "ls -lah");
        assert_eq!(c.cursor, 7);
        assert_eq!(c.messages, vec!["[Autocomplete] ll → ls -lah"]);
    }

    #[test]
    fn test_command_completion_uses_common_prefix() {
        let f = Fixture::new();
        assert_eq!(f.complete("zz").line, "zzonly");
        // grepx and greppy share "grep"; grepdata is not executable
        assert_eq!(f.complete("gr").line, "grep");
        let c = f.complete("grep");
        assert_eq!(c.line, "grep");
        assert_eq!(c.messages, vec!["[Autocomplete] greppy, grepx"]);
    }

    #[test]
    fn test_single_directory_gets_slash() {
        let f = Fixture::new();
        let c = f.complete("cd doc");
        assert_eq!(c.line, "cd documents/");
        assert_eq!(c.cursor, 13);
    }

    #[test]
    fn test_path_prefix_then_listing_is_stable() {
        let f = Fixture::new();
        let c = f.complete("cat no");
        assert_eq!(c.line, "cat notes_");
        let again = f.complete(&c.line);
        assert_eq!(again.line, "cat notes_");
        assert_eq!(again.messages, vec!["[Autocomplete] notes_one.txt, notes_two.txt"]);
        assert_eq!(f.complete(&again.line), again);
    }

    #[test]
    fn test_quote_is_preserved_and_tail_kept() {
        let f = Fixture::new();
        let line = "ls \"my and more";
        let c = f.completer.complete(line, 6, &f.work());
        assert_eq!(c.line, "ls \"my dir/ and more");
        assert_eq!(c.cursor, 11);
    }

    #[test]
    fn test_hidden_files_need_a_dot() {
        let f = Fixture::new();
        assert!(f.complete("cat .h").line.ends_with(".hidden"));
        let c = f.complete("cat zq");
        assert_eq!(c.line, "cat zq");
        assert_eq!(c.messages, vec!["[Autocomplete] No completion found for 'zq'"]);
    }

    #[test]
    fn test_home_relative_paths() {
        let f = Fixture::new();
        assert_eq!(f.complete("ls ~/wo").line, "ls ~/work/");
    }

    #[test]
    fn test_common_prefix() {
        let words = vec!["abc".to_string(), "abd".to_string(), "ab".to_string()];
        assert_eq!(common_prefix(&words), "ab");
        let words = vec!["日本".to_string(), "日x".to_string()];
        assert_eq!(common_prefix(&words), "日");
    }
}
