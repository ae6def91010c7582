//! Terminal rendering for calbridge-core types.

use calbridge_core::{CollectingLogger, EventGroup, HostCalendarItem};
use owo_colors::OwoColorize;

/// Extension trait for colored terminal output.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for EventGroup {
    fn render(&self) -> String {
        let summary = self.master.summary.as_deref().unwrap_or("(no title)");
        let mut line = format!("{} {}", "→".green(), summary.bold());
        if !self.master.recurrence_rules.is_empty() {
            let rules: Vec<String> = self
                .master
                .recurrence_rules
                .iter()
                .map(|r| r.to_string())
                .collect();
            line.push_str(&format!(" {}", rules.join(" ").dimmed()));
        }
        if !self.exceptions.is_empty() {
            line.push_str(&format!(" (+{} exceptions)", self.exceptions.len()));
        }
        line.push_str(&format!(" {}", format!("seq {}", self.master.sequence).dimmed()));
        line
    }
}

impl Render for HostCalendarItem {
    fn render(&self) -> String {
        let subject = self.subject.as_deref().unwrap_or("(no subject)");
        let time = if self.all_day {
            self.start.format("%Y-%m-%d").to_string()
        } else {
            format!("{} {}", self.start.format("%Y-%m-%d %H:%M"), self.start_time_zone)
        };
        let mut line = format!("{} {} {}", "←".green(), subject.bold(), time.dimmed());
        if let Some(pattern) = &self.recurrence {
            line.push_str(&format!(" (recurring, {} exceptions)", pattern.exceptions.len()));
        }
        line
    }
}

impl Render for CollectingLogger {
    fn render(&self) -> String {
        let warnings = self.warnings();
        let mut lines = vec![format!(
            "{} {} warning(s)",
            "!".yellow().bold(),
            warnings.len()
        )];
        for warning in warnings {
            lines.push(format!("   {}", warning.yellow()));
        }
        lines.join("\n")
    }
}
