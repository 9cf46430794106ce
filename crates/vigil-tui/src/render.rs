//! Frame construction.
//!
//! [`FrameRenderer::render`] turns a `(ViewConfig, ViewState)` pair into a
//! [`Frame`]: ratatui widgets are drawn into an off-screen buffer, which is
//! then flattened into text lines. Rendering reads no clocks and no other
//! state, so the same inputs always produce the same frame.

use std::fmt::Write as _;

use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap};
use vigil_core::{AgentStatus, Event};

use crate::ansi;
use crate::executor::CommandResult;
use crate::presenter::{AgentState, ViewState};
use crate::slots::AgentIndexSlotMap;
use crate::view::{ViewConfig, ViewMode};

/// Key reference shown in Help mode.
pub const KEY_HELP: &str = "\
VIGIL Hotkey Reference

Views:
  d        Dashboard
  e        Event stream
  m        Memory operations
  1-9      Focus agent by slot
  v        Toggle verbose (routine events)

General:
  ?  h     Toggle this help
  :        Command line (try :help)
  Esc      Cancel / back
  q        Quit
  Ctrl+C   Quit";

/// A fully rendered screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    lines: Vec<String>,
}

impl Frame {
    /// Flatten a ratatui buffer, trimming trailing blanks on each row.
    pub fn from_buffer(buffer: &Buffer) -> Self {
        let area = buffer.area;
        let lines = (area.top()..area.bottom())
            .map(|y| {
                let mut row = String::with_capacity(area.width as usize);
                for x in area.left()..area.right() {
                    row.push_str(buffer[(x, y)].symbol());
                }
                row.trim_end().to_string()
            })
            .collect();
        Self { lines }
    }

    /// Frame made of the given lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Plain text, one row per line.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    /// Bytes to paint this frame over the whole screen.
    pub fn to_ansi(&self) -> String {
        let mut out = String::new();
        for (row, line) in self.lines.iter().enumerate() {
            out.push_str(&ansi::move_to(row as u16 + 1, 1));
            out.push_str(ansi::CLEAR_LINE);
            out.push_str(line);
        }
        out
    }
}

/// Builds frames for every view mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRenderer {
    width: u16,
    height: u16,
}

impl FrameRenderer {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width: width.max(20),
            height: height.max(8),
        }
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Render the active mode.
    pub fn render(&self, config: &ViewConfig, state: &ViewState, slots: &AgentIndexSlotMap) -> Frame {
        let area = Rect::new(0, 0, self.width, self.height);
        let mut buf = Buffer::empty(area);
        let [header, body, footer] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .areas(area);

        draw_header(config, state, header, &mut buf);

        let content_mode = match config.mode {
            ViewMode::Command => config.return_mode,
            mode => mode,
        };
        match content_mode {
            ViewMode::Dashboard | ViewMode::Command => draw_dashboard(state, slots, body, &mut buf),
            ViewMode::EventStream => draw_event_stream(config, state, body, &mut buf),
            ViewMode::MemoryOps => draw_memory_ops(state, body, &mut buf),
            ViewMode::AgentFocus => draw_agent_focus(config, state, slots, body, &mut buf),
            ViewMode::Help => draw_help(body, &mut buf),
        }

        if config.mode == ViewMode::Command {
            draw_command_line(&config.command_input, footer, &mut buf);
        } else {
            draw_footer(footer, &mut buf);
        }

        if let Some(result) = &config.last_result {
            draw_result_overlay(result, area, &mut buf);
        }

        Frame::from_buffer(&buf)
    }

    /// Frame shown in place of a screen that failed to render.
    pub fn error_frame(&self, message: &str) -> Frame {
        let area = Rect::new(0, 0, self.width, self.height);
        let mut buf = Buffer::empty(area);
        Paragraph::new(format!("Rendering failed: {message}\n\nRetrying on the next tick."))
            .block(panel(" Error "))
            .wrap(Wrap { trim: false })
            .render(area, &mut buf);
        Frame::from_buffer(&buf)
    }
}

fn panel(title: &str) -> Block<'_> {
    Block::default().borders(Borders::ALL).title(title)
}

fn draw_header(config: &ViewConfig, state: &ViewState, area: Rect, buf: &mut Buffer) {
    let vitals = &state.vitals;
    let mut status = format!(
        "[{} agents] [{} open] [{} pending]",
        vitals.active_agents, vitals.tickets_open, vitals.pending_escalations
    );
    if config.verbose_mode {
        status.push_str(" [verbose]");
    }
    let title = format!(" VIGIL - {} ", config.mode.title());
    let spacing = (area.width as usize).saturating_sub(title.len() + status.len() + 3);
    Paragraph::new(Line::from(format!("{title}{}{status}", " ".repeat(spacing))))
        .block(Block::default().borders(Borders::ALL))
        .render(area, buf);
}

fn draw_footer(area: Rect, buf: &mut Buffer) {
    let hints: Vec<String> = ViewMode::SWITCHABLE
        .iter()
        .map(ViewMode::hotkey_hint)
        .chain(["[1-9] Focus", "[v] Verbose", "[:] Command", "[?] Help", "[q] Quit"].map(String::from))
        .collect();
    Paragraph::new(hints.join(" "))
        .block(Block::default().borders(Borders::TOP))
        .render(area, buf);
}

fn draw_command_line(input: &str, area: Rect, buf: &mut Buffer) {
    Paragraph::new(format!(":{input}_"))
        .block(Block::default().borders(Borders::TOP))
        .render(area, buf);
}

fn draw_dashboard(state: &ViewState, slots: &AgentIndexSlotMap, area: Rect, buf: &mut Buffer) {
    let [top, events] =
        Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);
    let [agents, vitals] =
        Layout::horizontal([Constraint::Percentage(65), Constraint::Percentage(35)]).areas(top);

    let agent_lines: Vec<String> = if state.agent_states.is_empty() {
        vec!["No agents yet".to_string()]
    } else {
        state
            .agent_states
            .values()
            .map(|agent| agent_row(agent, slots))
            .collect()
    };
    Paragraph::new(agent_lines.join("\n"))
        .block(panel(" Agents "))
        .render(agents, buf);

    let v = &state.vitals;
    let vitals_text = format!(
        "Active agents  {}\nTickets open   {}\nTickets done   {}\nEscalations    {}\nEvents seen    {}\nSignificant    {}\nDropped        {}\nResubscribes   {}",
        v.active_agents,
        v.tickets_open,
        v.tickets_done,
        v.pending_escalations,
        v.events_seen,
        v.significant_events,
        v.dropped_events,
        v.resubscribes,
    );
    Paragraph::new(vitals_text)
        .block(panel(" Vitals "))
        .render(vitals, buf);

    draw_event_list(" Recent ", state.recent_significant_events.iter(), events, buf);
}

fn agent_row(agent: &AgentState, slots: &AgentIndexSlotMap) -> String {
    let index = slots
        .get_index(&agent.agent_id)
        .map_or_else(|| " ".to_string(), |i| i.to_string());
    format!(
        "{index} {} {:<14} {:<9} {}",
        agent.status.glyph(),
        agent.display_name,
        agent.status.to_string(),
        agent.last_summary
    )
}

fn draw_event_list<'a>(
    title: &str,
    events: impl DoubleEndedIterator<Item = &'a Event> + ExactSizeIterator,
    area: Rect,
    buf: &mut Buffer,
) {
    // Keep the newest rows that fit, oldest at the top.
    let visible = area.height.saturating_sub(2) as usize;
    let skip = events.len().saturating_sub(visible);
    let lines: Vec<String> = events.skip(skip).map(format_event).collect();
    let text = if lines.is_empty() {
        "Waiting for events...".to_string()
    } else {
        lines.join("\n")
    };
    Paragraph::new(text).block(panel(title)).render(area, buf);
}

/// One-line event description.
pub fn format_event(event: &Event) -> String {
    format!(
        "{} {} {:<16} {}: {}",
        event.timestamp.format("%H:%M:%S"),
        event.urgency.marker(),
        event.kind.name(),
        event.source,
        event.summary
    )
}

fn draw_event_stream(config: &ViewConfig, state: &ViewState, area: Rect, buf: &mut Buffer) {
    let title = if config.verbose_mode {
        " Events (all) "
    } else {
        " Events (significant) "
    };
    draw_event_list(title, state.recent_significant_events.iter(), area, buf);
}

fn draw_memory_ops(state: &ViewState, area: Rect, buf: &mut Buffer) {
    draw_event_list(" Memory operations ", state.recent_memory_ops.iter(), area, buf);
}

fn draw_agent_focus(
    config: &ViewConfig,
    state: &ViewState,
    slots: &AgentIndexSlotMap,
    area: Rect,
    buf: &mut Buffer,
) {
    let agent = config
        .focused_agent_id
        .as_deref()
        .and_then(|id| state.agent_states.get(id));
    let Some(agent) = agent else {
        draw_dashboard(state, slots, area, buf);
        return;
    };

    let [details, events] =
        Layout::vertical([Constraint::Length(7), Constraint::Min(3)]).areas(area);

    let strip_width = details.width.saturating_sub(12) as usize;
    let mut strip: Vec<char> = state
        .spark_history(&agent.agent_id, strip_width)
        .iter()
        .map(|sample| sample.status.glyph())
        .collect();
    strip.reverse();
    let strip: String = strip.into_iter().collect();

    let mut text = String::new();
    let _ = writeln!(text, "Status    {}", agent.status);
    let _ = writeln!(text, "Last seen {}", agent.last_seen.format("%H:%M:%S"));
    let _ = writeln!(text, "Events    {}", agent.events);
    let _ = writeln!(text, "Activity  {strip}");
    let _ = write!(text, "Legend    {}", legend());

    let title = match slots.get_index(&agent.agent_id) {
        Some(index) => format!(" [{index}] {} ", agent.display_name),
        None => format!(" {} ", agent.display_name),
    };
    Paragraph::new(text).block(panel(&title)).render(details, buf);

    let own = state
        .recent_significant_events
        .iter()
        .filter(|e| e.source.agent_id() == Some(agent.agent_id.as_str()))
        .collect::<Vec<_>>();
    draw_event_list(" Agent events ", own.into_iter(), events, buf);
}

fn legend() -> String {
    [
        AgentStatus::Idle,
        AgentStatus::Thinking,
        AgentStatus::Working,
        AgentStatus::Waiting,
    ]
    .iter()
    .map(|s| format!("{} {}", s.glyph(), s))
    .collect::<Vec<_>>()
    .join("  ")
}

fn draw_help(area: Rect, buf: &mut Buffer) {
    Paragraph::new(KEY_HELP)
        .block(panel(" Help "))
        .wrap(Wrap { trim: false })
        .render(area, buf);
}

fn draw_result_overlay(result: &CommandResult, area: Rect, buf: &mut Buffer) {
    let message = result.message();
    let rows = message.lines().count() as u16 + 4;
    let width = 70.min(area.width.saturating_sub(4));
    let height = rows.min(area.height.saturating_sub(2));
    let overlay = Rect::new(
        (area.width - width) / 2,
        (area.height - height) / 2,
        width,
        height,
    );
    let title = match result {
        CommandResult::Success(_) => " Result ",
        CommandResult::Error(_) => " Error ",
        CommandResult::Quit => " Quit ",
    };
    Clear.render(overlay, buf);
    Paragraph::new(format!("{message}\n\n(press any key)"))
        .block(panel(title))
        .wrap(Wrap { trim: false })
        .render(overlay, buf);
}
