use crate::ui::conversation::commands::{parse_slash_command, ParsedCommand};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// Single input box at the bottom of the screen.
///
/// Submitting does not clear the text; the caller clears it once the
/// submission is accepted, so a rejected message is not lost.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    content: String,
    /// Cursor position as a char index
    cursor: usize,
    placeholder: String,
}

impl Composer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            ..Self::default()
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
                self.insert_char('\n');
            }
            KeyCode::Enter => {
                if let Some(command) = parse_slash_command(&self.content) {
                    self.clear();
                    return ComposerResult::Command(command);
                }
                return ComposerResult::Submitted(self.content.clone());
            }
            KeyCode::Char(c) => self.insert_char(c),
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = self.byte_index(self.cursor);
                    self.content.remove(at);
                }
            }
            KeyCode::Delete => {
                if self.cursor < self.char_count() {
                    let at = self.byte_index(self.cursor);
                    self.content.remove(at);
                }
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.char_count()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.char_count(),
            KeyCode::Esc => self.clear(),
            _ => {}
        }

        ComposerResult::None
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.content.insert(at, c);
        self.cursor += 1;
    }

    fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.content
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len())
    }
}

impl Widget for &Composer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Message (Enter to send, /help for commands) ");

        let line = if self.content.is_empty() {
            Line::from(Span::styled(
                self.placeholder.clone(),
                Style::default().fg(Color::DarkGray),
            ))
        } else {
            let (before, after) = self.content.split_at(self.byte_index(self.cursor));
            Line::from(vec![
                Span::raw(before.to_string()),
                Span::styled("▏", Style::default().fg(Color::Cyan)),
                Span::raw(after.to_string()),
            ])
        };

        Paragraph::new(line)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::conversation::commands::SlashCommand;

    fn press(composer: &mut Composer, code: KeyCode) -> ComposerResult {
        composer.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(composer: &mut Composer, text: &str) {
        for c in text.chars() {
            press(composer, KeyCode::Char(c));
        }
    }

    #[test]
    fn enter_submits_without_clearing() {
        let mut composer = Composer::new("Say something");
        type_str(&mut composer, "héllo");
        assert_eq!(
            press(&mut composer, KeyCode::Enter),
            ComposerResult::Submitted("héllo".to_string())
        );
        assert_eq!(composer.content(), "héllo");
    }

    #[test]
    fn editing_respects_multibyte_cursor() {
        let mut composer = Composer::new("");
        type_str(&mut composer, "añb");
        press(&mut composer, KeyCode::Left);
        press(&mut composer, KeyCode::Backspace);
        assert_eq!(composer.content(), "ab");
        press(&mut composer, KeyCode::Home);
        press(&mut composer, KeyCode::Delete);
        assert_eq!(composer.content(), "b");
    }

    #[test]
    fn slash_command_clears_input() {
        let mut composer = Composer::new("");
        type_str(&mut composer, "/detach");
        match press(&mut composer, KeyCode::Enter) {
            ComposerResult::Command(parsed) => assert_eq!(parsed.command, SlashCommand::Detach),
            other => panic!("expected command, got {:?}", other),
        }
        assert_eq!(composer.content(), "");
    }
}
