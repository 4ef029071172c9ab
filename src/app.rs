//! Mode controller
//!
//! [`ModeController`] owns every subsystem (screen, session, input
//! translator, line shell, editor, menu) and runs one tick at a time:
//! translate the button snapshot, route the result to the active mode,
//! then pump child output into the screen. Rendering reads the controller
//! afterwards.
//!
//! Modes: `Shell` and `PtyPassthrough` are the base modes, chosen by
//! whether a full-screen child is running. `Editor` and `Menu` sit on top
//! and fall back to the base mode when closed.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::clipboard::Clipboard;
use crate::config::{Config, DisplayConfig, ProgramKind, Theme};
use crate::core::session::{
    first_word, resolve_program, Launcher, PtyLauncher, Session, SessionError, SessionState, SpawnError,
    SpawnRequest,
};
use crate::core::term::ScreenBuffer;
use crate::editor::Editor;
use crate::history::CommandHistory;
use crate::input::{Action, ButtonSet, Context, InputTranslator, KeyMap, Keyboard, Output, Tick};
use crate::menu::{Menu, MenuCommand, MenuValues};
use crate::shell::builtins::{self, apply_alias, expand_home, history_reference, split_background};
use crate::shell::{Builtin, Completer, HistoryArg, JobList, LineBuffer, LineEvent};

/// Programs that take over the screen unless `[programs]` says otherwise
pub const INTERACTIVE_PROGRAMS: &[&str] = &[
    "nano", "vim", "vi", "emacs", "top", "htop", "less", "more", "man", "python", "python3",
    "ipython", "ipython3", "bash", "sh", "zsh", "fish", "sudo", "su", "doas", "ssh",
];

/// Rows moved by one scroll action
const SCROLL_STEP: usize = 5;

/// Ticks a status message stays visible
pub const STATUS_TICKS: u64 = 180;

/// Rows taken by the on-screen keyboard
pub const KEYBOARD_ROWS: u16 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Shell,
    PtyPassthrough,
    Editor,
    Menu,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Shell => "SHELL",
            Mode::PtyPassthrough => "PTY",
            Mode::Editor => "EDITOR",
            Mode::Menu => "MENU",
        }
    }
}

/// Which grid the editor's D-Pad drives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorNav {
    File,
    Keyboard,
}

/// Row allocation of the character grid, top to bottom
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub total_rows: u16,
    pub cols: u16,
    pub header_rows: u16,
    pub screen_rows: u16,
    pub keyboard_rows: u16,
    /// Cell size in pixels
    pub cell: (u32, u32),
}

impl Layout {
    /// Header, screen, input line, status line, keyboard
    pub fn compute(display: &DisplayConfig, font_size: u16, show_keyboard: bool, show_header: bool) -> Self {
        let (total_rows, cols) = display.char_grid(font_size);
        let header_rows = u16::from(show_header);
        let keyboard_rows = if show_keyboard { KEYBOARD_ROWS } else { 0 };
        let screen_rows = total_rows
            .saturating_sub(header_rows + 2 + keyboard_rows)
            .max(1);
        Self {
            total_rows,
            cols,
            header_rows,
            screen_rows,
            keyboard_rows,
            cell: DisplayConfig::cell_size(font_size),
        }
    }

    pub fn input_row(&self) -> u16 {
        self.header_rows + self.screen_rows
    }

    pub fn status_row(&self) -> u16 {
        self.input_row() + 1
    }

    pub fn keyboard_top(&self) -> u16 {
        self.status_row() + 1
    }
}

#[derive(Clone, Debug)]
struct Status {
    text: String,
    raised: u64,
}

/// Top-level state machine and owner of all subsystems
pub struct ModeController {
    config: Config,
    launcher: Box<dyn Launcher>,
    screen: ScreenBuffer,
    session: Option<Session>,
    /// How the running session is displayed
    session_kind: ProgramKind,
    translator: InputTranslator,
    history: CommandHistory,
    line: LineBuffer,
    completer: Completer,
    jobs: JobList,
    editor: Option<Editor>,
    editor_nav: EditorNav,
    clipboard: Clipboard,
    menu: Menu,
    menu_open: bool,
    cwd: PathBuf,
    home: Option<PathBuf>,
    theme: Theme,
    font_size: u16,
    show_keyboard: bool,
    show_header: bool,
    layout: Layout,
    scroll_offset: usize,
    status: Option<Status>,
    /// Something besides the screen grid changed since the last frame
    redraw: bool,
    tick: u64,
    quit: bool,
}

impl ModeController {
    /// Controller spawning children through the configured shell
    pub fn new(config: Config, cwd: PathBuf) -> Self {
        let launcher = PtyLauncher::new(&config.shell, config.term.clone());
        Self::with_launcher(config, cwd, Box::new(launcher))
    }

    pub fn with_launcher(config: Config, cwd: PathBuf, launcher: Box<dyn Launcher>) -> Self {
        let font_size = config.display.font_size;
        let show_keyboard = config.display.show_keyboard;
        let show_header = config.display.show_header;
        let layout = Layout::compute(&config.display, font_size, show_keyboard, show_header);
        let keymap = KeyMap::with_overrides(&config.keymap);
        info!(
            "Grid {}x{} (screen {} rows), font size {}",
            layout.total_rows, layout.cols, layout.screen_rows, font_size
        );

        Self {
            screen: ScreenBuffer::new(layout.screen_rows, layout.cols, config.scrollback_lines),
            session: None,
            session_kind: ProgramKind::Line,
            translator: InputTranslator::new(keymap, config.input),
            history: CommandHistory::new(config.max_history),
            line: LineBuffer::new(config.max_input_length),
            completer: Completer::new(),
            jobs: JobList::new(),
            editor: None,
            editor_nav: EditorNav::File,
            clipboard: Clipboard::new(config.system_clipboard),
            menu: Menu::new(),
            menu_open: false,
            cwd,
            home: std::env::var_os("HOME").map(PathBuf::from),
            theme: config.get_theme(),
            font_size,
            show_keyboard,
            show_header,
            layout,
            scroll_offset: 0,
            status: None,
            redraw: true,
            tick: 0,
            quit: false,
            launcher,
            config,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.menu_open {
            Mode::Menu
        } else {
            self.underlying_mode()
        }
    }

    /// Mode under the menu overlay
    pub fn underlying_mode(&self) -> Mode {
        if self.editor.is_some() {
            Mode::Editor
        } else {
            self.base_mode()
        }
    }

    fn base_mode(&self) -> Mode {
        let passthrough = self.session_kind == ProgramKind::FullScreen
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.state() == SessionState::Running);
        if passthrough {
            Mode::PtyPassthrough
        } else {
            Mode::Shell
        }
    }

    /// Input context for the current mode
    pub fn context(&self) -> Context {
        match self.mode() {
            Mode::Shell => Context::Shell,
            Mode::PtyPassthrough => Context::Pty,
            Mode::Editor => match self.editor_nav {
                EditorNav::File => Context::EditorFile,
                EditorNav::Keyboard => Context::EditorKeyboard,
            },
            Mode::Menu => Context::Menu,
        }
    }

    /// One frame: input, then child output
    pub fn tick(&mut self, held: ButtonSet, now_ms: u64) {
        self.tick += 1;
        let context = self.context();
        let outputs = self.translator.update(
            Tick {
                context,
                held,
                now_ms,
                modes: self.screen.modes(),
            },
            &mut self.history,
        );
        if !outputs.is_empty() {
            self.redraw = true;
        }
        if self
            .status
            .as_ref()
            .is_some_and(|s| self.tick.saturating_sub(s.raised) == STATUS_TICKS)
        {
            self.redraw = true;
        }
        for output in outputs {
            self.route(output);
            if self.quit {
                return;
            }
        }
        self.pump();
    }

    fn route(&mut self, output: Output) {
        match self.mode() {
            Mode::Menu => {
                if let Output::Action(action) = output {
                    if let Some(command) = self.menu.handle(action) {
                        self.apply_menu(command);
                    }
                }
            }
            Mode::Editor => self.route_editor(output),
            Mode::PtyPassthrough => match output {
                Output::Bytes(bytes) => self.send_bytes(&bytes),
                Output::Action(action) => self.global_action(action),
                Output::Edit(_) | Output::ReplaceLine(_) => {}
            },
            Mode::Shell => match output {
                Output::Edit(press) => {
                    self.scroll_offset = 0;
                    match self.line.apply(press) {
                        LineEvent::None => {}
                        LineEvent::Submit(text) => self.submit(&text),
                        LineEvent::Interrupt => self.interrupt(),
                        LineEvent::ClearScreen => self.clear_screen(),
                        LineEvent::Complete => self.autocomplete(),
                        LineEvent::Full => {
                            let limit = self.line.max_len();
                            self.set_status(format!("Input limit reached ({} chars)", limit));
                        }
                    }
                }
                Output::ReplaceLine(text) => self.line.set(&text),
                Output::Action(Action::Autocomplete) => self.autocomplete(),
                Output::Action(Action::ClearScreen) => self.clear_screen(),
                Output::Action(action) => self.global_action(action),
                Output::Bytes(bytes) => self.send_bytes(&bytes),
            },
        }
    }

    /// Actions every base mode understands
    fn global_action(&mut self, action: Action) {
        match action {
            Action::ScrollUp => {
                self.scroll_offset = (self.scroll_offset + SCROLL_STEP).min(self.screen.scrollback_len());
            }
            Action::ScrollDown => {
                self.scroll_offset = self.scroll_offset.saturating_sub(SCROLL_STEP);
            }
            Action::OpenMenu => self.open_menu(),
            Action::Quit => self.request_quit(),
            other => debug!("Ignoring {} in {:?}", other, self.mode()),
        }
    }

    fn route_editor(&mut self, output: Output) {
        let page = usize::from(self.layout.screen_rows.saturating_sub(1)).max(1);
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        match output {
            Output::Edit(press) => editor.apply(press, page),
            Output::Action(action) => match action {
                Action::Select(dir) => editor.move_direction(dir, true),
                Action::Indent => editor.indent(),
                Action::SelectAll => editor.select_all(),
                Action::Copy => {
                    if editor.copy(&mut self.clipboard) {
                        self.set_status("Copied");
                    }
                }
                Action::Cut => {
                    if editor.cut(&mut self.clipboard) {
                        self.set_status("Cut");
                    }
                }
                Action::Paste => {
                    if !editor.paste(&self.clipboard) {
                        self.set_status("Clipboard is empty");
                    }
                }
                Action::Save => match editor.save() {
                    Ok(()) => {
                        let msg = format!("Saved {}", editor.path().display());
                        self.set_status(msg);
                    }
                    Err(e) => {
                        warn!("{}", e);
                        self.set_status(e.to_string());
                    }
                },
                Action::ExitEditor => {
                    self.close_editor();
                    return;
                }
                Action::ToggleNav => {
                    self.editor_nav = match self.editor_nav {
                        EditorNav::File => EditorNav::Keyboard,
                        EditorNav::Keyboard => EditorNav::File,
                    };
                }
                Action::OpenMenu => self.open_menu(),
                Action::Quit => self.request_quit(),
                other => debug!("Ignoring {} in editor", other),
            },
            Output::Bytes(_) | Output::ReplaceLine(_) => {}
        }
        let (rows, cols) = (usize::from(self.layout.screen_rows), usize::from(self.layout.cols));
        if let Some(editor) = self.editor.as_mut() {
            editor.ensure_visible(rows, cols.saturating_sub(5));
        }
    }

    /// Run a command line typed at the shell prompt
    pub fn submit(&mut self, text: &str) {
        // A line-oriented child is in the foreground: it gets the line as typed
        if let Some(session) = self.session.as_mut() {
            if session.state() == SessionState::Running {
                if let Err(e) = session.write_input(format!("{}\r", text).as_bytes()) {
                    self.report_session_error(e);
                }
                return;
            }
        }

        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let mut command = text.to_string();
        if let Some(index) = history_reference(&command) {
            match self.history.get(index) {
                Some(entry) => {
                    command = entry.command.clone();
                    self.say(&format!("[History] Recalled [{}] {}", index, command));
                }
                None => {
                    self.say(&format!("[Error] history: no entry at index {}", index));
                    return;
                }
            }
        }

        self.history.add(&command);
        self.scroll_offset = 0;
        let prompt = self.prompt();
        self.say(&format!("{} {}", prompt, command));

        if let Some(builtin) = Builtin::parse(&command) {
            match builtin {
                Ok(builtin) => self.run_builtin(builtin),
                Err(e) => self.say(&format!("[Error] {}", e)),
            }
            return;
        }

        let (command, background) = split_background(&command);
        let cwd = self.cwd.clone();
        let (command, note) = apply_alias(&command, |name| resolve_program(name, &cwd).is_some());
        if let Some(note) = note {
            self.say(&format!("[System] Alias applied: {}", note));
        }

        if background {
            self.start_background(&command);
        } else {
            self.start_session(&command);
        }
    }

    fn run_builtin(&mut self, builtin: Builtin) {
        match builtin {
            Builtin::Help => {
                for line in builtins::help_lines() {
                    self.say(&line);
                }
            }
            Builtin::Clear => self.clear_screen(),
            Builtin::Pwd => {
                let cwd = self.cwd.display().to_string();
                self.say(&cwd);
            }
            Builtin::Cd(target) => match builtins::resolve_dir(&self.cwd, target.as_deref(), self.home.as_deref()) {
                Ok(dir) => {
                    self.cwd = dir;
                    let msg = format!("[System] Changed directory to: {}", self.cwd.display());
                    self.say(&msg);
                }
                Err(e) => self.say(&format!("[Error] cd: {}", e)),
            },
            Builtin::Jobs => {
                for line in self.jobs.report() {
                    self.say(&line);
                }
            }
            Builtin::History(HistoryArg::List) => {
                if self.history.is_empty() {
                    self.say("[System] History is empty.");
                }
                for line in self.history.format_lines(None) {
                    self.say(&line);
                }
            }
            Builtin::History(HistoryArg::Entry(index)) => {
                let line = match self.history.get(index) {
                    Some(entry) => format!("{:4}  {}", entry.index, entry.command),
                    None => format!("[Error] history: no entry at index {}", index),
                };
                self.say(&line);
            }
            Builtin::History(HistoryArg::Clear) => {
                self.history.clear();
                self.say("[System] History cleared.");
            }
            Builtin::Edit(file) => self.open_editor(&file),
            Builtin::Quit => self.request_quit(),
        }
    }

    /// Full-screen or line-oriented, from `[programs]` then the built-in list
    pub fn classify(&self, command: &str) -> ProgramKind {
        let Some(word) = first_word(command) else {
            return ProgramKind::Line;
        };
        let name = Path::new(&word)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(word.as_str());
        if let Some(kind) = self.config.programs.get(name) {
            return *kind;
        }
        if INTERACTIVE_PROGRAMS.contains(&name) {
            ProgramKind::FullScreen
        } else {
            ProgramKind::Line
        }
    }

    fn start_session(&mut self, command: &str) {
        let kind = self.classify(command);
        let request = SpawnRequest {
            command: command.to_string(),
            cwd: self.cwd.clone(),
            rows: self.screen.rows(),
            cols: self.screen.cols(),
        };
        match Session::spawn(self.launcher.as_mut(), request) {
            Ok(session) => {
                self.session = Some(session);
                self.session_kind = kind;
                if kind == ProgramKind::FullScreen {
                    self.say(&format!("[System] Started interactive mode: {}", command));
                    self.enter_passthrough(command);
                }
            }
            Err(SpawnError::NotFound(name)) => {
                self.say(&format!("[Error] command not found: {}", name));
                self.set_status(format!("Command not found: {}", name));
            }
            Err(e) => {
                self.say(&format!("[Error] {}", e));
                self.set_status(e.to_string());
            }
        }
    }

    fn enter_passthrough(&mut self, command: &str) {
        info!("Mode: SHELL -> PTY for '{}'", command);
        self.session_kind = ProgramKind::FullScreen;
        self.scroll_offset = 0;
    }

    fn start_background(&mut self, command: &str) {
        let argv = PtyLauncher::new(&self.config.shell, self.config.term.clone()).shell_argv(command);
        let shell = PathBuf::from(&self.config.shell);
        match self.jobs.spawn(&shell, &argv[1..], command, &self.cwd) {
            Ok(pid) => self.say(&format!("[System] Started background process (PID: {})", pid)),
            Err(e) => self.say(&format!("[Error] {}", e)),
        }
    }

    /// Ctrl+C from the line editor
    fn interrupt(&mut self) {
        match self.session.as_mut() {
            Some(session) if session.state() == SessionState::Running => {
                match session.write_input(&[0x03]) {
                    Ok(()) => self.say("[System] Sent Ctrl+C"),
                    Err(e) => self.report_session_error(e),
                }
            }
            _ => self.say("[System] No foreground process to interrupt"),
        }
    }

    fn send_bytes(&mut self, bytes: &[u8]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.write_input(bytes) {
            Ok(()) => {
                if let [b @ 0x00..=0x1a] = bytes {
                    if !matches!(b, 0x09 | 0x0a | 0x0d) {
                        self.set_status(format!("Sent Ctrl+{}", char::from(b + 0x40)));
                    }
                }
            }
            Err(SessionError::NotRunning) => {}
            Err(e) => self.report_session_error(e),
        }
    }

    /// Move child output into the screen and notice exits
    pub fn pump(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        loop {
            match session.poll_output() {
                Ok(Some(bytes)) => self.screen.write(&bytes),
                Ok(None) => break,
                Err(e) => {
                    warn!("Session output error: {}", e);
                    self.set_status(format!("I/O error: {}", e));
                    break;
                }
            }
        }

        let replies = self.screen.take_replies();
        if !replies.is_empty() {
            if let Some(Err(e)) = self.session.as_mut().map(|s| s.write_input(&replies)) {
                self.report_session_error(e);
            }
        }

        if self.session_kind == ProgramKind::Line && self.screen.take_alt_screen_entered() {
            let command = self
                .session
                .as_ref()
                .map(|s| s.command().to_string())
                .unwrap_or_default();
            self.enter_passthrough(&command);
        }

        let state = self.session.as_mut().map(|s| {
            s.is_alive();
            s.state()
        });
        if let Some(SessionState::Exited(code) | SessionState::Terminated(code)) = state {
            // Output that arrived together with the exit
            if let Some(Ok(Some(bytes))) = self.session.as_mut().map(Session::poll_output) {
                self.screen.write(&bytes);
            }
            self.finish_session(code);
        }
    }

    fn finish_session(&mut self, code: i32) {
        let was_passthrough = self.session_kind == ProgramKind::FullScreen;
        self.session = None;
        self.session_kind = ProgramKind::Line;
        self.screen.reset_modes();
        if was_passthrough {
            info!("Mode: PTY -> SHELL (exit code {})", code);
            self.say("[System] Exited interactive mode");
            self.say(&format!("[Exit Code] {}", code));
        } else if code != 0 {
            self.say(&format!("[Exit Code] {}", code));
        }
    }

    fn autocomplete(&mut self) {
        let completion = self.completer.complete(&self.line.text(), self.line.cursor(), &self.cwd);
        self.line.set_with_cursor(&completion.line, completion.cursor);
        for message in completion.messages {
            self.say(&message);
        }
    }

    fn clear_screen(&mut self) {
        self.screen.clear();
        self.scroll_offset = 0;
    }

    fn open_editor(&mut self, file: &str) {
        let path = expand_home(file, self.home.as_deref());
        let path = if path.is_absolute() { path } else { self.cwd.join(path) };
        match Editor::open(&path) {
            Ok(editor) => {
                info!("Mode: SHELL -> EDITOR for {}", path.display());
                self.editor = Some(editor);
                self.editor_nav = EditorNav::File;
                self.say(&format!("[System] Editor opened: {}", path.display()));
            }
            Err(e) => self.say(&format!("[Error] edit: {}", e)),
        }
    }

    fn close_editor(&mut self) {
        if let Some(editor) = self.editor.take() {
            info!("Mode: EDITOR -> {}", self.base_mode().name());
            if editor.is_dirty() {
                self.say("[System] Exited editor (unsaved changes)");
            } else {
                self.say("[System] Exited editor");
            }
        }
    }

    pub fn open_menu(&mut self) {
        self.menu.reset();
        self.menu_open = true;
    }

    fn apply_menu(&mut self, command: MenuCommand) {
        match command {
            MenuCommand::Close => self.menu_open = false,
            MenuCommand::CycleTheme(step) => {
                self.theme = self.theme.cycle(step);
                let msg = format!("Theme: {}", self.theme.name);
                self.set_status(msg);
            }
            MenuCommand::CycleFontSize(step) => {
                self.font_size = self.config.display.next_font_size(self.font_size, step);
                self.relayout();
                let msg = format!("Font size: {}", self.font_size);
                self.set_status(msg);
            }
            MenuCommand::ToggleKeyboard => {
                self.show_keyboard = !self.show_keyboard;
                self.relayout();
            }
            MenuCommand::ToggleHeader => {
                self.show_header = !self.show_header;
                self.relayout();
            }
            MenuCommand::ShowHelp => {
                self.menu_open = false;
                let context = self.context();
                let lines = self.translator.keymap().help_lines(context);
                self.say(&format!("[System] Controls ({}):", context.name()));
                for line in lines {
                    self.say(&line);
                }
            }
            MenuCommand::StopProgram => {
                self.menu_open = false;
                self.stop_session();
            }
            MenuCommand::Quit => self.request_quit(),
        }
    }

    /// Terminate the foreground child and return to the shell
    fn stop_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.set_status("No program running");
            return;
        };
        let command = session.command().to_string();
        let code = session.terminate().unwrap_or(-1);
        self.say(&format!("[System] Terminated: {}", command));
        self.finish_session(code);
    }

    /// Recompute the grid and tell the child about the new size
    fn relayout(&mut self) {
        self.layout = Layout::compute(&self.config.display, self.font_size, self.show_keyboard, self.show_header);
        let (rows, cols) = (self.layout.screen_rows, self.layout.cols);
        self.screen.resize(rows, cols);
        self.scroll_offset = self.scroll_offset.min(self.screen.scrollback_len());
        if let Some(session) = self.session.as_mut() {
            match session.resize(rows, cols) {
                Ok(()) | Err(SessionError::NotRunning) => {}
                Err(e) => warn!("Resize failed: {}", e),
            }
        }
        info!("Resized screen to {}x{}", rows, cols);
    }

    fn report_session_error(&mut self, err: SessionError) {
        warn!("Session error: {}", err);
        self.set_status(format!("I/O error: {}", err));
    }

    /// Append a message line below the current output
    pub fn say(&mut self, text: &str) {
        if self.screen.cursor().1 != 0 {
            self.screen.write(b"\r\n");
        }
        self.screen.write_line(text);
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(Status {
            text: text.into(),
            raised: self.tick,
        });
        self.redraw = true;
    }

    /// Whether a new frame is needed; clears the screen's dirty rows
    pub fn take_redraw(&mut self) -> bool {
        let full = self.screen.needs_full_redraw();
        let rows = self.screen.take_dirty_rows();
        std::mem::take(&mut self.redraw) || full || !rows.is_empty()
    }

    /// Current status message, if it has not expired
    pub fn status(&self) -> Option<&str> {
        self.status
            .as_ref()
            .filter(|s| self.tick.saturating_sub(s.raised) < STATUS_TICKS)
            .map(|s| s.text.as_str())
    }

    fn request_quit(&mut self) {
        info!("Quit requested");
        self.quit = true;
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Stop the running child; safe to call more than once
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.terminate();
        }
        self.session_kind = ProgramKind::Line;
    }

    /// Prompt shown before the input line, `~` for the home directory
    pub fn prompt(&self) -> String {
        let cwd = match &self.home {
            Some(home) => match self.cwd.strip_prefix(home) {
                Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
                Ok(rest) => format!("~/{}", rest.display()),
                Err(_) => self.cwd.display().to_string(),
            },
            None => self.cwd.display().to_string(),
        };
        format!("{}$", cwd)
    }

    /// Title for the header row
    pub fn header_text(&self) -> String {
        let title = match self.mode() {
            Mode::Editor => self
                .editor
                .as_ref()
                .map(|e| {
                    let dirty = if e.is_dirty() { " *" } else { "" };
                    format!("{}{}", e.path().display(), dirty)
                })
                .unwrap_or_default(),
            Mode::PtyPassthrough => self
                .session
                .as_ref()
                .map(|s| {
                    let title = self.screen.title();
                    if title.is_empty() {
                        s.command().to_string()
                    } else {
                        title.to_string()
                    }
                })
                .unwrap_or_default(),
            Mode::Shell | Mode::Menu => self.cwd.display().to_string(),
        };
        format!("padterm [{}] {}", self.mode().name(), title)
    }

    pub fn menu_values(&self) -> MenuValues<'_> {
        MenuValues {
            theme: self.theme.name,
            font_size: self.font_size,
            show_keyboard: self.show_keyboard,
            show_header: self.show_header,
        }
    }

    pub fn screen(&self) -> &ScreenBuffer {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut ScreenBuffer {
        &mut self.screen
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn line(&self) -> &LineBuffer {
        &self.line
    }

    pub fn keyboard(&self) -> &Keyboard {
        self.translator.keyboard()
    }

    pub fn editor(&self) -> Option<&Editor> {
        self.editor.as_ref()
    }

    pub fn editor_nav(&self) -> EditorNav {
        self.editor_nav
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn show_keyboard(&self) -> bool {
        self.show_keyboard
    }

    pub fn show_header(&self) -> bool {
        self.show_header
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pty::{PtyError, ReadOutcome};
    use crate::core::session::PtyBackend;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    /// Scripted child: hands out `output`, then exits with `exit` once
    /// the output is drained
    #[derive(Default)]
    struct Child {
        command: String,
        output: VecDeque<Vec<u8>>,
        exit: Option<i32>,
        written: Vec<u8>,
        resized: Vec<(u16, u16)>,
        terminated: bool,
        fail_writes: bool,
    }

    type Shared = Rc<RefCell<Child>>;

    struct FakeBackend(Shared);

    impl PtyBackend for FakeBackend {
        fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, PtyError> {
            match self.0.borrow_mut().output.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(ReadOutcome::Data(chunk.len()))
                }
                None => Ok(ReadOutcome::Empty),
            }
        }

        fn write_all(&mut self, data: &[u8]) -> Result<(), PtyError> {
            let mut child = self.0.borrow_mut();
            if child.fail_writes {
                return Err(PtyError::Write(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    "buffer full",
                )));
            }
            child.written.extend_from_slice(data);
            Ok(())
        }

        fn resize(&mut self, rows: u16, cols: u16) -> Result<(), PtyError> {
            self.0.borrow_mut().resized.push((rows, cols));
            Ok(())
        }

        fn try_wait(&mut self) -> Option<i32> {
            let child = self.0.borrow();
            if child.output.is_empty() {
                child.exit
            } else {
                None
            }
        }

        fn terminate(&mut self) -> i32 {
            let mut child = self.0.borrow_mut();
            child.terminated = true;
            child.exit.unwrap_or(143)
        }

        fn pid(&self) -> Option<u32> {
            Some(4242)
        }
    }

    /// Launches scripted children; `script` sets up each new child
    #[derive(Clone, Default)]
    struct FakeLauncher {
        children: Rc<RefCell<Vec<Shared>>>,
        scripts: Rc<RefCell<HashMap<String, (Vec<u8>, Option<i32>)>>>,
    }

    impl FakeLauncher {
        fn script(&self, command: &str, output: &[u8], exit: Option<i32>) {
            self.scripts
                .borrow_mut()
                .insert(command.to_string(), (output.to_vec(), exit));
        }

        fn last(&self) -> Shared {
            self.children.borrow().last().cloned().unwrap()
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&mut self, request: &SpawnRequest) -> Result<Box<dyn PtyBackend>, SpawnError> {
            let name = first_word(&request.command).ok_or(SpawnError::EmptyCommand)?;
            if name == "missing" {
                return Err(SpawnError::NotFound(name));
            }
            let (output, exit) = self
                .scripts
                .borrow()
                .get(&request.command)
                .cloned()
                .unwrap_or_default();
            let child = Rc::new(RefCell::new(Child {
                command: request.command.clone(),
                output: if output.is_empty() { VecDeque::new() } else { VecDeque::from([output]) },
                exit,
                ..Child::default()
            }));
            self.children.borrow_mut().push(child.clone());
            Ok(Box::new(FakeBackend(child)))
        }
    }

    struct Harness {
        app: ModeController,
        launcher: FakeLauncher,
        now_ms: u64,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(Config::default())
        }

        fn with_config(config: Config) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let cwd = dir.path().canonicalize().unwrap();
            let launcher = FakeLauncher::default();
            let app = ModeController::with_launcher(config, cwd, Box::new(launcher.clone()));
            Self {
                app,
                launcher,
                now_ms: 0,
                _dir: dir,
            }
        }

        fn tick(&mut self, held: ButtonSet) {
            self.now_ms += 16;
            self.app.tick(held, self.now_ms);
        }

        fn ticks(&mut self, held: ButtonSet, n: usize) {
            for _ in 0..n {
                self.tick(held);
            }
        }

        /// Scrollback plus live rows, trailing blanks dropped
        fn text(&self) -> Vec<String> {
            let screen = self.app.screen();
            let mut lines: Vec<String> = screen.scrollback().map(|r| r.text()).collect();
            lines.extend(screen.read_viewport(0).map(|r| r.text()));
            while lines.last().is_some_and(|l| l.is_empty()) {
                lines.pop();
            }
            lines
        }

        fn shows(&self, needle: &str) -> bool {
            self.text().iter().any(|l| l.contains(needle))
        }
    }

    #[test]
    fn test_interactive_program_switches_to_passthrough_and_back() {
        let mut h = Harness::new();
        h.app.submit("vim notes.txt");
        assert_eq!(h.app.mode(), Mode::PtyPassthrough);
        assert!(h.shows("[System] Started interactive mode: vim notes.txt"));

        h.tick(ButtonSet::empty());
        assert_eq!(h.app.mode(), Mode::PtyPassthrough);

        h.launcher.last().borrow_mut().exit = Some(0);
        h.tick(ButtonSet::empty());
        assert_eq!(h.app.mode(), Mode::Shell);
        assert!(h.shows("[System] Exited interactive mode"));
        assert!(h.shows("[Exit Code] 0"));
        assert!(h.app.session().is_none());
    }

    #[test]
    fn test_chord_sends_single_ctrl_c_to_child() {
        let mut h = Harness::new();
        h.app.submit("top");
        h.ticks(ButtonSet::L2 | ButtonSet::R2, 20);
        h.ticks(ButtonSet::empty(), 5);
        assert_eq!(h.launcher.last().borrow().written, vec![0x03]);
        assert_eq!(h.app.status(), Some("Sent Ctrl+C"));
    }

    #[test]
    fn test_line_command_stays_in_shell_and_reports_exit_code() {
        let mut h = Harness::new();
        h.launcher.script("false", b"oops\r\n", Some(1));
        h.launcher.script("true", b"", Some(0));

        h.app.submit("false");
        assert_eq!(h.app.mode(), Mode::Shell);
        h.tick(ButtonSet::empty());
        assert!(h.shows("oops"));
        assert!(h.shows("[Exit Code] 1"));

        h.app.submit("true");
        h.tick(ButtonSet::empty());
        assert!(!h.shows("[Exit Code] 0"));
        assert!(h.app.session().is_none());
    }

    #[test]
    fn test_alt_screen_promotes_line_command() {
        let mut h = Harness::new();
        h.launcher.script("mc", b"\x1b[?1049hpanel", None);
        h.app.submit("mc");
        assert_eq!(h.app.mode(), Mode::Shell);
        h.tick(ButtonSet::empty());
        assert_eq!(h.app.mode(), Mode::PtyPassthrough);
    }

    #[test]
    fn test_programs_table_overrides_builtin_list() {
        let mut config = Config::default();
        config.programs.insert("python3".to_string(), ProgramKind::Line);
        config.programs.insert("mc".to_string(), ProgramKind::FullScreen);
        let h = Harness::with_config(config);
        assert_eq!(h.app.classify("python3 -q"), ProgramKind::Line);
        assert_eq!(h.app.classify("mc"), ProgramKind::FullScreen);
        assert_eq!(h.app.classify("/usr/bin/vim x"), ProgramKind::FullScreen);
        assert_eq!(h.app.classify("ls -la"), ProgramKind::Line);
    }

    #[test]
    fn test_spawn_error_is_reported_inline() {
        let mut h = Harness::new();
        h.app.submit("missing --flag");
        assert_eq!(h.app.mode(), Mode::Shell);
        assert!(h.shows("[Error] command not found: missing"));
        assert_eq!(h.app.status(), Some("Command not found: missing"));
    }

    #[test]
    fn test_builtins_never_spawn() {
        let mut h = Harness::new();
        std::fs::create_dir(h.app.cwd().join("sub")).unwrap();
        for cmd in ["cd sub", "pwd", "jobs", "history", "help"] {
            h.app.submit(cmd);
        }
        assert!(h.launcher.children.borrow().is_empty());
        assert!(h.app.cwd().ends_with("sub"));
        assert!(h.shows("[System] Changed directory to:"));
        assert!(h.shows("[System] No background processes running"));
        assert!(h.shows("   1  cd sub"));

        h.app.submit("cd nowhere");
        assert!(h.shows("[Error] cd:"));
        assert!(h.app.cwd().ends_with("sub"));
    }

    #[test]
    fn test_history_reference_reruns_entry() {
        let mut h = Harness::new();
        h.app.submit("pwd");
        h.app.submit("!1");
        assert!(h.shows("[History] Recalled [1] pwd"));
        assert_eq!(h.app.history().len(), 2);
        h.app.submit("!9");
        assert!(h.shows("[Error] history: no entry at index 9"));
        assert_eq!(h.app.history().len(), 2);
    }

    #[test]
    fn test_history_chord_recalls_previous_commands() {
        let mut h = Harness::new();
        for cmd in ["pwd", "jobs", "help"] {
            h.app.submit(cmd);
        }
        h.tick(ButtonSet::SELECT | ButtonSet::UP);
        assert_eq!(h.app.line().text(), "help");
        h.tick(ButtonSet::SELECT);
        h.tick(ButtonSet::SELECT | ButtonSet::UP);
        assert_eq!(h.app.line().text(), "jobs");
        assert_eq!(h.app.history().entries()[1].command, "jobs");
    }

    #[test]
    fn test_line_input_goes_to_foreground_child() {
        let mut h = Harness::new();
        h.app.submit("cat");
        h.app.submit("hello");
        let child = h.launcher.last();
        assert_eq!(child.borrow().written, b"hello\r".to_vec());
        assert_eq!(child.borrow().command, "cat");
        assert_eq!(h.app.history().len(), 1);
    }

    #[test]
    fn test_empty_and_padded_lines_reach_foreground_child() {
        let mut h = Harness::new();
        h.app.submit("cat");
        h.app.submit("");
        h.app.submit("  two words ");
        let child = h.launcher.last();
        assert_eq!(child.borrow().written, b"\r  two words \r".to_vec());
        assert_eq!(h.app.history().len(), 1);
    }

    #[test]
    fn test_line_command_after_full_screen_exit_stays_in_shell() {
        let mut h = Harness::new();
        h.launcher.script("vim", b"\x1b[?1049h", None);
        h.launcher.script("ping host", b"64 bytes\r\n", None);

        h.app.submit("vim");
        h.tick(ButtonSet::empty());
        h.launcher.last().borrow_mut().exit = Some(0);
        h.tick(ButtonSet::empty());
        assert_eq!(h.app.mode(), Mode::Shell);

        h.app.submit("ping host");
        h.tick(ButtonSet::empty());
        assert_eq!(h.app.mode(), Mode::Shell);
        assert!(h.shows("64 bytes"));
    }

    #[test]
    fn test_failed_reply_write_is_reported() {
        let mut h = Harness::new();
        h.launcher.script("query", b"\x1b[c", None);
        h.app.submit("query");
        h.launcher.last().borrow_mut().fail_writes = true;
        h.tick(ButtonSet::empty());
        assert!(h.app.status().is_some_and(|s| s.starts_with("I/O error")));
        assert!(h.app.session().is_some());
    }

    #[test]
    fn test_menu_stop_program_terminates_child() {
        let mut h = Harness::new();
        h.app.submit("vim");
        let child = h.launcher.last();

        h.tick(ButtonSet::START);
        h.tick(ButtonSet::empty());
        assert_eq!(h.app.mode(), Mode::Menu);
        for _ in 0..2 {
            h.tick(ButtonSet::UP);
            h.tick(ButtonSet::empty());
        }
        h.tick(ButtonSet::A);
        h.tick(ButtonSet::empty());

        assert_eq!(h.app.mode(), Mode::Shell);
        assert!(child.borrow().terminated);
        assert!(h.app.session().is_none());
        assert!(h.shows("[System] Terminated: vim"));
        assert!(h.shows("[Exit Code] 143"));
    }

    #[test]
    fn test_stop_program_without_session_only_sets_status() {
        let mut h = Harness::new();
        h.app.apply_menu(MenuCommand::StopProgram);
        assert_eq!(h.app.status(), Some("No program running"));
        assert_eq!(h.app.mode(), Mode::Shell);
    }

    #[test]
    fn test_menu_toggles_keyboard_and_resizes_child() {
        let mut h = Harness::new();
        h.app.submit("vim");
        let rows_before = h.app.screen().rows();

        // Start is part of Start+Select, so the menu opens on release
        h.ticks(ButtonSet::START, 4);
        assert_eq!(h.app.mode(), Mode::PtyPassthrough);
        h.tick(ButtonSet::empty());
        assert_eq!(h.app.mode(), Mode::Menu);

        for _ in 0..3 {
            h.tick(ButtonSet::DOWN);
            h.tick(ButtonSet::empty());
        }
        h.tick(ButtonSet::A);
        h.tick(ButtonSet::empty());
        assert!(!h.app.show_keyboard());
        assert_eq!(h.app.screen().rows(), rows_before + KEYBOARD_ROWS);
        let child = h.launcher.last();
        assert_eq!(child.borrow().resized.last(), Some(&(rows_before + KEYBOARD_ROWS, h.app.screen().cols())));

        h.tick(ButtonSet::B);
        assert_eq!(h.app.mode(), Mode::PtyPassthrough);
        assert!(!child.borrow().terminated);
    }

    #[test]
    fn test_editor_overlay_returns_to_shell() {
        let mut h = Harness::new();
        h.app.submit("edit notes.txt");
        assert_eq!(h.app.mode(), Mode::Editor);
        assert_eq!(h.app.context(), Context::EditorFile);

        h.tick(ButtonSet::START);
        h.tick(ButtonSet::empty());
        assert_eq!(h.app.context(), Context::EditorKeyboard);

        h.tick(ButtonSet::L2 | ButtonSet::B);
        assert_eq!(h.app.mode(), Mode::Shell);
        assert!(h.shows("[System] Exited editor"));
    }

    #[test]
    fn test_quit_terminates_session() {
        let mut h = Harness::new();
        h.app.submit("vim");
        let child = h.launcher.last();
        h.tick(ButtonSet::START | ButtonSet::SELECT);
        assert!(h.app.should_quit());
        h.app.shutdown();
        assert!(child.borrow().terminated);
        h.app.shutdown();
    }

    #[test]
    fn test_layout_reserves_rows() {
        let display = DisplayConfig::default();
        let layout = Layout::compute(&display, 14, true, true);
        assert_eq!(layout.total_rows, 26);
        assert_eq!(layout.screen_rows, 26 - 1 - 2 - KEYBOARD_ROWS);
        assert_eq!(layout.input_row(), 1 + layout.screen_rows);
        assert_eq!(layout.keyboard_top(), layout.input_row() + 2);
        let bare = Layout::compute(&display, 14, false, false);
        assert_eq!(bare.screen_rows, 24);
    }

    #[test]
    fn test_redraw_only_after_changes() {
        let mut h = Harness::new();
        assert!(h.app.take_redraw());
        assert!(!h.app.take_redraw());
        h.tick(ButtonSet::empty());
        assert!(!h.app.take_redraw());
        h.app.screen_mut().write_line("output");
        assert!(h.app.take_redraw());
        h.tick(ButtonSet::Y);
        assert!(h.app.take_redraw());
    }

    #[test]
    fn test_status_expires() {
        let mut h = Harness::new();
        h.app.set_status("hello");
        assert_eq!(h.app.status(), Some("hello"));
        h.ticks(ButtonSet::empty(), STATUS_TICKS as usize);
        assert_eq!(h.app.status(), None);
    }
}
