//! Frame drawing: content viewport, progress bar, footer.

use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};

use crate::state::{segment_widths, ContentLine, RepoStatus, View};

pub fn draw(f: &mut Frame, view: &mut View) {
    let area = f.area();
    let chunks = Layout::vertical([
        Constraint::Min(0),    // content viewport
        Constraint::Length(1), // progress bar
        Constraint::Length(1), // footer
    ])
    .split(area);

    // ── Content viewport ─────────────────────────────────────────────────
    let lines: Vec<Line> = view.content_lines().iter().map(styled_line).collect();
    view.viewport_height = chunks[0].height.saturating_sub(2) as usize;
    let max_scroll = lines.len().saturating_sub(view.viewport_height);
    view.scroll = view.scroll.min(max_scroll);

    let content = Paragraph::new(lines)
        .scroll((view.scroll as u16, 0))
        .block(
            Block::default()
                .title(" sweep ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        );
    f.render_widget(content, chunks[0]);

    // ── Progress bar ─────────────────────────────────────────────────────
    let (succeeded, failed, total) = view.counts();
    let width = chunks[1].width as usize;
    let (ok_w, fail_w, rest_w) = segment_widths(width, succeeded, failed, total);
    let bar = Line::from(vec![
        Span::styled("█".repeat(ok_w), Style::default().fg(Color::Green)),
        Span::styled("█".repeat(fail_w), Style::default().fg(Color::Red)),
        Span::styled("░".repeat(rest_w), Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(bar), chunks[1]);

    // ── Footer ───────────────────────────────────────────────────────────
    let elapsed = (chrono::Utc::now() - view.started).num_seconds().max(0);
    let done = succeeded + failed;
    let help = if view.all_done() {
        "q:quit  p:print log  ↑↓/jk:scroll"
    } else {
        "Ctrl-C:cancel  ↑↓/jk:scroll"
    };
    let footer = format!(" {done}/{total} done, {failed} failed  {elapsed}s   {help}");
    f.render_widget(
        Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}

fn styled_line(line: &ContentLine) -> Line<'static> {
    match line {
        ContentLine::Header { name, status } => {
            let style = match status {
                RepoStatus::Waiting => Style::default().fg(Color::DarkGray),
                RepoStatus::Active => Style::default().fg(Color::Cyan),
                RepoStatus::Done => Style::default().fg(Color::Green),
                RepoStatus::Failed => Style::default().fg(Color::Red),
            }
            .add_modifier(Modifier::BOLD);
            Line::from(Span::styled(format!("{} {}", status.symbol(), name), style))
        }
        ContentLine::Text(text) => Line::from(text.clone()),
        ContentLine::Error(text) => {
            Line::from(Span::styled(text.clone(), Style::default().fg(Color::Red)))
        }
    }
}
