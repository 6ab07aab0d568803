use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;

use crate::preview::{Connectivity, JobStatus, Message, Phase, PreviewView};
use crate::ui::icons::{BROKEN, CHECK, COMMENT, CROSS, EDIT, NOTE, PLUG, SPARKLE};

/// One thing worth telling the user about, derived from successive views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderLine {
    Status(JobStatus),
    Connectivity(Connectivity),
    Description(String),
    NewMessage(Message),
    ChangedMessage(Message),
    Error(String),
}

#[derive(Debug, Default)]
struct Seen {
    messages: HashMap<i64, Message>,
    status: Option<JobStatus>,
    connectivity: Connectivity,
    description: Option<String>,
    error: Option<String>,
}

/// Terminal renderer for a live preview.
///
/// Only changes are printed: a message is shown when it first appears and
/// again whenever its content changes. A spinner sits below the output while
/// the view is loading.
pub struct PreviewRenderer {
    seen: Seen,
    spinner: Option<ProgressBar>,
    width: usize,
}

impl PreviewRenderer {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));

        Self {
            seen: Seen::default(),
            spinner: Some(spinner),
            width: console::Term::stdout().size().1 as usize,
        }
    }

    /// Renderer that prints plain lines with no spinner.
    pub fn plain() -> Self {
        Self {
            seen: Seen::default(),
            spinner: None,
            width: 100,
        }
    }

    /// Lines describing what changed since the last view.
    pub fn diff(&mut self, view: &PreviewView) -> Vec<RenderLine> {
        let mut lines = Vec::new();
        let state = &view.state;

        if state.status != self.seen.status {
            if let Some(status) = state.status {
                lines.push(RenderLine::Status(status));
            }
            self.seen.status = state.status;
        }

        if state.connectivity != self.seen.connectivity {
            if matches!(
                state.connectivity,
                Connectivity::Connected | Connectivity::Disconnected
            ) {
                lines.push(RenderLine::Connectivity(state.connectivity));
            }
            self.seen.connectivity = state.connectivity;
        }

        if state.description != self.seen.description {
            if let Some(description) = &state.description {
                lines.push(RenderLine::Description(description.clone()));
            }
            self.seen.description = state.description.clone();
        }

        for message in &state.messages {
            match self.seen.messages.get(&message.id) {
                None => lines.push(RenderLine::NewMessage(message.clone())),
                Some(previous) if previous != message => {
                    lines.push(RenderLine::ChangedMessage(message.clone()))
                }
                Some(_) => continue,
            }
            self.seen.messages.insert(message.id, message.clone());
        }

        if state.error != self.seen.error {
            if let Some(error) = &state.error {
                lines.push(RenderLine::Error(error.clone()));
            }
            self.seen.error = state.error.clone();
        }

        lines
    }

    /// Print what changed and refresh the spinner.
    pub fn render(&mut self, view: &PreviewView) {
        let width = self.width.clamp(40, 120);
        for line in self.diff(view) {
            self.print_line(format_line(&line, width));
        }

        if let Some(spinner) = &self.spinner {
            if view.is_terminal() {
                spinner.finish_and_clear();
            } else {
                spinner.set_message(phase_label(view.phase));
            }
        }
    }

    /// Print a one-line summary once the view is terminal.
    pub fn finish(&self, view: &PreviewView) {
        let summary = match view.error() {
            Some(_) => format!("{}{}", CROSS, style("Dry run did not finish cleanly").red()),
            None => format!(
                "{}{} ({} comments)",
                SPARKLE,
                style("Dry run preview complete").green().bold(),
                view.messages().len()
            ),
        };
        self.print_line(summary);
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        match &self.spinner {
            Some(spinner) if !spinner.is_finished() && !spinner.is_hidden() => {
                spinner.println(msg.as_ref())
            }
            _ => println!("{}", msg.as_ref()),
        }
    }
}

impl Default for PreviewRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "Idle",
        Phase::Probing => "Waiting for the job to appear...",
        Phase::Streaming => "Streaming preview...",
        Phase::FetchingFinal => "Fetching final result...",
        Phase::Terminal(_) => "Done",
    }
}

fn message_header(message: &Message) -> String {
    let mut header = format!("#{}", message.id);
    if let Some(path) = &message.path {
        header.push(' ');
        header.push_str(path);
        if let Some(range) = &message.line_range {
            header.push_str(&format!(":{}-{}", range.start, range.end));
        }
    }
    if let Some(severity) = &message.severity {
        header.push_str(&format!(" [{}]", severity));
    }
    if let Some(category) = &message.category {
        header.push_str(&format!(" ({})", category));
    }
    header
}

fn wrap_body(body: &str, width: usize) -> String {
    let options = textwrap::Options::new(width.saturating_sub(4))
        .initial_indent("    ")
        .subsequent_indent("    ");
    textwrap::fill(body, options)
}

/// Format a line for the terminal.
pub fn format_line(line: &RenderLine, width: usize) -> String {
    match line {
        RenderLine::Status(status) => {
            let label = match status {
                JobStatus::InProgress => style(status.to_string()).yellow(),
                JobStatus::Completed => style(status.to_string()).green(),
                JobStatus::Failed => style(status.to_string()).red(),
            };
            format!("{}Status: {}", CHECK, label)
        }
        RenderLine::Connectivity(Connectivity::Connected) => {
            format!("{}{}", PLUG, style("Connected to live stream").dim())
        }
        RenderLine::Connectivity(_) => {
            format!("{}{}", BROKEN, style("Live stream closed").dim())
        }
        RenderLine::Description(description) => format!(
            "{}{}\n{}",
            NOTE,
            style("Description").bold(),
            wrap_body(description, width)
        ),
        RenderLine::NewMessage(message) => format!(
            "{}{}\n{}",
            COMMENT,
            style(message_header(message)).cyan().bold(),
            wrap_body(&message.content, width)
        ),
        RenderLine::ChangedMessage(message) => format!(
            "{}{} {}\n{}",
            EDIT,
            style(message_header(message)).cyan(),
            style("(updated)").dim(),
            wrap_body(&message.content, width)
        ),
        RenderLine::Error(error) => format!("{}{}", CROSS, style(error).red().bold()),
    }
}
