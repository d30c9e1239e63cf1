//! Terminal rendering for calendar pages.
//!
//! Extension traits that add colored output to evcal-core result types
//! using owo_colors.

use evcal_core::group::OccurrenceKind;
use evcal_core::{CalendarPage, DayView, EntryView};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for EntryView {
    fn render(&self) -> String {
        let vars = &self.display_vars;
        let time = format!("{:>18}", vars.time_label);

        let mut line = match self.kind {
            OccurrenceKind::Continuation => {
                format!("{} {}", time.dimmed(), vars.title.dimmed())
            }
            _ => format!("{} {}", time.cyan(), vars.title.bold()),
        };

        if let Some(through) = &vars.through_label {
            line.push_str(&format!(" {}", through.dimmed()));
        }
        if let Some(venue) = &vars.venue_line {
            line.push_str(&format!(" @ {}", venue));
        }
        if let Some(distance) = &vars.distance_label {
            line.push_str(&format!(" {}", format!("({})", distance).yellow()));
        }
        line
    }
}

impl Render for DayView {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        if let Some(gap) = self.gap_days {
            lines.push(format!("   ... {} days later", gap).dimmed().to_string());
        }

        let heading = match &self.relative {
            Some(relative) => format!("{} {}", self.heading.bold(), format!("({})", relative).green()),
            None => self.heading.bold().to_string(),
        };
        lines.push(format!("📅 {}", heading));

        for entry in &self.entries {
            lines.push(format!("   {}", entry.render()));
        }
        lines.join("\n")
    }
}

impl Render for CalendarPage {
    fn render(&self) -> String {
        if self.is_empty() {
            return "   No events found".dimmed().to_string();
        }

        let days: Vec<String> = self.grouped_by_date.iter().map(Render::render).collect();
        let footer = format!(
            "Page {} of {} · {} {} ({} past, {} upcoming)",
            self.current_page,
            self.max_pages,
            self.total_event_count,
            pluralize("event", self.total_event_count),
            self.past_count,
            self.future_count,
        );

        format!("{}\n\n{}", days.join("\n\n"), footer.dimmed())
    }
}

/// Simple pluralization helper
fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
