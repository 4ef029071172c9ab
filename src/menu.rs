//! Menu overlay
//!
//! The menu only selects and reports commands; the mode controller applies
//! them, so the underlying session keeps running while the menu is open.

use crate::input::{Action, Direction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuItem {
    Resume,
    Theme,
    FontSize,
    Keyboard,
    Header,
    Help,
    StopProgram,
    Quit,
}

impl MenuItem {
    pub const ALL: [MenuItem; 8] = [
        MenuItem::Resume,
        MenuItem::Theme,
        MenuItem::FontSize,
        MenuItem::Keyboard,
        MenuItem::Header,
        MenuItem::Help,
        MenuItem::StopProgram,
        MenuItem::Quit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MenuItem::Resume => "Resume",
            MenuItem::Theme => "Theme",
            MenuItem::FontSize => "Font Size",
            MenuItem::Keyboard => "Keyboard",
            MenuItem::Header => "Header",
            MenuItem::Help => "Help",
            MenuItem::StopProgram => "Stop Program",
            MenuItem::Quit => "Quit",
        }
    }
}

/// Current settings shown next to the adjustable items
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuValues<'a> {
    pub theme: &'a str,
    pub font_size: u16,
    pub show_keyboard: bool,
    pub show_header: bool,
}

/// What the controller should do after a menu input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuCommand {
    Close,
    CycleTheme(i32),
    CycleFontSize(i32),
    ToggleKeyboard,
    ToggleHeader,
    ShowHelp,
    StopProgram,
    Quit,
}

#[derive(Clone, Debug, Default)]
pub struct Menu {
    selected: usize,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> MenuItem {
        MenuItem::ALL[self.selected]
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn reset(&mut self) {
        self.selected = 0;
    }

    pub fn handle(&mut self, action: Action) -> Option<MenuCommand> {
        let len = MenuItem::ALL.len();
        match action {
            Action::MenuMove(Direction::Up) => {
                self.selected = (self.selected + len - 1) % len;
                None
            }
            Action::MenuMove(Direction::Down) => {
                self.selected = (self.selected + 1) % len;
                None
            }
            Action::MenuMove(Direction::Left) => self.adjust(-1),
            Action::MenuMove(Direction::Right) => self.adjust(1),
            Action::MenuActivate => Some(match self.selected() {
                MenuItem::Resume => MenuCommand::Close,
                MenuItem::Theme => MenuCommand::CycleTheme(1),
                MenuItem::FontSize => MenuCommand::CycleFontSize(1),
                MenuItem::Keyboard => MenuCommand::ToggleKeyboard,
                MenuItem::Header => MenuCommand::ToggleHeader,
                MenuItem::Help => MenuCommand::ShowHelp,
                MenuItem::StopProgram => MenuCommand::StopProgram,
                MenuItem::Quit => MenuCommand::Quit,
            }),
            Action::MenuClose | Action::OpenMenu => Some(MenuCommand::Close),
            _ => None,
        }
    }

    fn adjust(&self, step: i32) -> Option<MenuCommand> {
        match self.selected() {
            MenuItem::Theme => Some(MenuCommand::CycleTheme(step)),
            MenuItem::FontSize => Some(MenuCommand::CycleFontSize(step)),
            MenuItem::Keyboard => Some(MenuCommand::ToggleKeyboard),
            MenuItem::Header => Some(MenuCommand::ToggleHeader),
            _ => None,
        }
    }

    /// One line per item, `>` marking the selection
    pub fn lines(&self, values: &MenuValues<'_>) -> Vec<String> {
        let on_off = |on: bool| if on { "On" } else { "Off" };
        MenuItem::ALL
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let marker = if i == self.selected { '>' } else { ' ' };
                let value = match item {
                    MenuItem::Theme => format!(": < {} >", values.theme),
                    MenuItem::FontSize => format!(": < {} >", values.font_size),
                    MenuItem::Keyboard => format!(": {}", on_off(values.show_keyboard)),
                    MenuItem::Header => format!(": {}", on_off(values.show_header)),
                    _ => String::new(),
                };
                format!("{} {}{}", marker, item.name(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_wraps() {
        let mut menu = Menu::new();
        assert_eq!(menu.handle(Action::MenuMove(Direction::Up)), None);
        assert_eq!(menu.selected(), MenuItem::Quit);
        menu.handle(Action::MenuMove(Direction::Down));
        assert_eq!(menu.selected(), MenuItem::Resume);
    }

    #[test]
    fn test_stop_program_sits_above_quit() {
        let mut menu = Menu::new();
        menu.handle(Action::MenuMove(Direction::Up));
        menu.handle(Action::MenuMove(Direction::Up));
        assert_eq!(menu.selected(), MenuItem::StopProgram);
        assert_eq!(menu.handle(Action::MenuActivate), Some(MenuCommand::StopProgram));
    }

    #[test]
    fn test_activate_and_adjust() {
        let mut menu = Menu::new();
        assert_eq!(menu.handle(Action::MenuActivate), Some(MenuCommand::Close));
        menu.handle(Action::MenuMove(Direction::Down));
        assert_eq!(
            menu.handle(Action::MenuMove(Direction::Left)),
            Some(MenuCommand::CycleTheme(-1))
        );
        menu.handle(Action::MenuMove(Direction::Down));
        assert_eq!(menu.handle(Action::MenuActivate), Some(MenuCommand::CycleFontSize(1)));
        assert_eq!(menu.handle(Action::MenuClose), Some(MenuCommand::Close));
        assert_eq!(menu.handle(Action::Copy), None);
    }

    #[test]
    fn test_lines_show_values() {
        let mut menu = Menu::new();
        menu.handle(Action::MenuMove(Direction::Down));
        let values = MenuValues {
            theme: "Paper",
            font_size: 16,
            show_keyboard: true,
            show_header: false,
        };
        let lines = menu.lines(&values);
        assert_eq!(lines[0], "  Resume");
        assert_eq!(lines[1], "> Theme: < Paper >");
        assert_eq!(lines[2], "  Font Size: < 16 >");
        assert_eq!(lines[4], "  Header: Off");
    }
}
