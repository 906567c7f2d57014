//! UI rendering for the dashboard

use std::time::Duration;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget, Wrap},
    Frame,
};

use super::log_capture::LogBuffer;
use crate::session::{format_elapsed, SessionState};

/// Snapshot of everything the dashboard draws.
pub struct DashboardView<'a> {
    pub user_name: &'a str,
    pub elapsed: u64,
    pub state: SessionState,
    pub auto_screenshot: bool,
    pub screenshot_due_in: Option<Duration>,
    pub notice: Option<(&'a str, bool)>,
    pub logs: &'a LogBuffer,
}

const KEY_HINTS: &str = " s start | p pause/resume | e end | c screenshot | a auto | l logout | q quit ";

/// Label and color for a session state.
fn state_indicator(state: SessionState) -> (&'static str, Color) {
    match state {
        SessionState::Idle => ("Idle", Color::Gray),
        SessionState::Running => ("Running", Color::Green),
        SessionState::Paused => ("Paused", Color::Yellow),
    }
}

/// Countdown text for the auto-screenshot line.
pub fn screenshot_status(auto_screenshot: bool, due_in: Option<Duration>) -> String {
    match (auto_screenshot, due_in) {
        (false, _) => "Auto screenshot: off".to_string(),
        (true, None) => "Auto screenshot: on (waiting for session)".to_string(),
        (true, Some(due)) => {
            // Round up so the countdown never shows 0 before firing.
            let secs = due.as_millis().div_ceil(1000);
            format!("Auto screenshot: on | Next screenshot in: {} seconds", secs)
        }
    }
}

/// Main render function
pub fn render(frame: &mut Frame, view: &DashboardView) {
    render_dashboard(frame.area(), frame.buffer_mut(), view);
}

fn render_dashboard(area: Rect, buf: &mut Buffer, view: &DashboardView) {
    // header, clock, session info, log pane, notice, key hints
    let [header_area, clock_area, info_area, log_area, notice_area, keys_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(5),
            Constraint::Length(2),
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(area);

    render_header(header_area, buf, view);
    render_clock(clock_area, buf, view);
    render_info(info_area, buf, view);
    render_logs(log_area, buf, view.logs);
    render_notice(notice_area, buf, view.notice);

    Paragraph::new(KEY_HINTS)
        .style(Style::default().fg(Color::Gray).bg(Color::DarkGray))
        .render(keys_area, buf);
}

fn render_header(area: Rect, buf: &mut Buffer, view: &DashboardView) {
    let title = Span::styled(
        " Worklog",
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );
    let user = format!("Welcome, {} ", view.user_name);

    let padding_width = (area.width as usize).saturating_sub(" Worklog".len() + user.len());
    let line = Line::from(vec![
        title,
        Span::raw(" ".repeat(padding_width)),
        Span::styled(user, Style::default().fg(Color::Cyan)),
    ]);

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_clock(area: Rect, buf: &mut Buffer, view: &DashboardView) {
    let (label, color) = state_indicator(view.state);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
        .title(Span::styled(
            format!(" {} ", label),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));

    let clock = Line::from(Span::styled(
        format_elapsed(view.elapsed),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    ));

    // Blank line first to center the clock vertically in the 3 inner rows.
    Paragraph::new(vec![Line::default(), clock])
        .alignment(Alignment::Center)
        .block(block)
        .render(area, buf);
}

fn render_info(area: Rect, buf: &mut Buffer, view: &DashboardView) {
    let (label, color) = state_indicator(view.state);
    let auto_color = if view.auto_screenshot {
        Color::Green
    } else {
        Color::Gray
    };

    let lines = vec![
        Line::from(vec![
            Span::raw(" Session: "),
            Span::styled(label, Style::default().fg(color)),
        ]),
        Line::from(Span::styled(
            format!(
                " {}",
                screenshot_status(view.auto_screenshot, view.screenshot_due_in)
            ),
            Style::default().fg(auto_color),
        )),
    ];
    Paragraph::new(lines).render(area, buf);
}

fn render_logs(area: Rect, buf: &mut Buffer, logs: &LogBuffer) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Log ");

    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = logs
        .tail(visible)
        .into_iter()
        .map(|l| Line::from(Span::styled(l, Style::default().fg(Color::Gray))))
        .collect();

    Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .render(area, buf);
}

fn render_notice(area: Rect, buf: &mut Buffer, notice: Option<(&str, bool)>) {
    let Some((msg, is_error)) = notice else {
        return;
    };
    let color = if is_error { Color::Red } else { Color::Green };
    Paragraph::new(Line::from(Span::styled(
        format!(" {} ", msg),
        Style::default().fg(color),
    )))
    .render(area, buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_text(buf: &Buffer) -> String {
        let area = buf.area;
        let mut out = String::new();
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_screenshot_status() {
        assert_eq!(screenshot_status(false, None), "Auto screenshot: off");
        assert_eq!(
            screenshot_status(true, None),
            "Auto screenshot: on (waiting for session)"
        );
        assert_eq!(
            screenshot_status(true, Some(Duration::from_millis(179_200))),
            "Auto screenshot: on | Next screenshot in: 180 seconds"
        );
    }

    #[test]
    fn test_dashboard_shows_clock_state_and_notice() {
        let logs = LogBuffer::new();
        logs.push("INFO Timer event posted");
        let view = DashboardView {
            user_name: "Ana",
            elapsed: 65,
            state: SessionState::Running,
            auto_screenshot: true,
            screenshot_due_in: Some(Duration::from_secs(42)),
            notice: Some(("Screenshot uploaded", false)),
            logs: &logs,
        };

        let area = Rect::new(0, 0, 80, 20);
        let mut buf = Buffer::empty(area);
        render_dashboard(area, &mut buf, &view);
        let text = buffer_text(&buf);

        assert!(text.contains("Welcome, Ana"));
        assert!(text.contains("00:01:05"));
        assert!(text.contains("Running"));
        assert!(text.contains("Next screenshot in: 42 seconds"));
        assert!(text.contains("Timer event posted"));
        assert!(text.contains("Screenshot uploaded"));
    }
}
