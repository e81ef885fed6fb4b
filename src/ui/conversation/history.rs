//! Transcript display component

use crate::events::{Message, Sender};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

/// Renders the transcript, newest messages at the bottom.
pub struct TranscriptView<'a> {
    messages: &'a [Message],
    pending: bool,
    /// Lines scrolled up from the bottom
    scroll_back: u16,
}

impl<'a> TranscriptView<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            pending: false,
            scroll_back: 0,
        }
    }

    pub fn pending(mut self, pending: bool) -> Self {
        self.pending = pending;
        self
    }

    pub fn scroll_back(mut self, lines: u16) -> Self {
        self.scroll_back = lines;
        self
    }

    pub fn lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for message in self.messages {
            lines.extend(message_lines(message));
            lines.push(Line::default());
        }
        if self.pending {
            lines.push(Line::from(Span::styled(
                "Bot is typing…",
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        }
        lines
    }
}

/// Header line plus the body with light markdown styling
pub fn message_lines(message: &Message) -> Vec<Line<'static>> {
    let header_style = match message.sender {
        Sender::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        Sender::Bot => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    };

    let mut lines = vec![Line::from(vec![
        Span::styled(message.sender.display_name().to_string(), header_style),
        Span::styled(
            format!("  {}", message.timestamp.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ])];

    if message.sender == Sender::User {
        lines.extend(message.text.lines().map(|l| Line::from(l.to_string())));
    } else {
        lines.extend(markdown_lines(&message.text));
    }
    lines
}

/// Headings, bullets and fenced code blocks; everything else is plain text.
pub fn markdown_lines(text: &str) -> Vec<Line<'static>> {
    let code_style = Style::default().fg(Color::Yellow);
    let mut in_code = false;
    let mut lines = Vec::new();

    for raw in text.lines() {
        let trimmed = raw.trim_start();
        if trimmed.starts_with("```") {
            in_code = !in_code;
            continue;
        }

        if in_code {
            lines.push(Line::from(Span::styled(format!("  {}", raw), code_style)));
        } else if let Some(heading) = trimmed.strip_prefix('#') {
            lines.push(Line::from(Span::styled(
                heading.trim_start_matches('#').trim().to_string(),
                Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            )));
        } else if let Some(item) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            lines.push(Line::from(vec![
                Span::styled("  • ", Style::default().fg(Color::Green)),
                Span::raw(item.to_string()),
            ]));
        } else {
            lines.push(Line::from(raw.to_string()));
        }
    }

    lines
}

impl Widget for TranscriptView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines = self.lines();

        // Approximate wrapped height so the newest message stays in view.
        let inner_width = area.width.saturating_sub(2).max(1) as usize;
        let total: usize = lines
            .iter()
            .map(|line| line.width().max(1).div_ceil(inner_width))
            .sum();
        let visible = area.height.saturating_sub(2) as usize;
        let bottom = total.saturating_sub(visible);
        let offset = bottom.saturating_sub(self.scroll_back as usize);

        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(" Conversation "))
            .wrap(Wrap { trim: false })
            .scroll((offset.min(u16::MAX as usize) as u16, 0))
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn markdown_styling() {
        let lines = markdown_lines("# Title\n- first\n```\nlet x = 1;\n```\nplain");
        let text: Vec<String> = lines.iter().map(plain).collect();
        assert_eq!(text, ["Title", "  • first", "  let x = 1;", "plain"]);
    }

    #[test]
    fn pending_indicator_follows_messages() {
        let messages = vec![Message::user("hi")];
        let view = TranscriptView::new(&messages).pending(true);
        let lines = view.lines();
        assert_eq!(plain(&lines[1]), "hi");
        assert_eq!(plain(lines.last().unwrap()), "Bot is typing…");
    }

    #[test]
    fn user_text_is_not_reformatted() {
        let lines = message_lines(&Message::user("# not a heading"));
        assert_eq!(plain(&lines[1]), "# not a heading");
    }
}
