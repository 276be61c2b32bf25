//! Terminal rendering of review pages and streamed logs.

use super::Page;
use crate::constants::{ACCENT, EMPTY_CIRCLE, FILLED_CIRCLE};
use itertools::Itertools;
use nu_ansi_term::Color;
use std::{
    fmt::{self, Write},
    ops::Range,
};

const MAX_DOTS: usize = 20;

/// Renders `page` for the terminal, linking commits and pull requests under `upstream_url`.
pub fn render_page<W: Write>(w: &mut W, page: &Page<'_>, upstream_url: &str) -> fmt::Result {
    let Some(commit) = page.commit else {
        return writeln!(w, "{}", Color::Green.paint("Downstream is up to date with upstream."));
    };

    // Page dots, e.g. `○ ● ○`, windowed around the current page on long backlogs.
    let dots = dot_window(page.index, page.total)
        .map(|i| if i == page.index { FILLED_CIRCLE } else { EMPTY_CIRCLE })
        .join(" ");
    writeln!(
        w,
        "{} {}",
        dots,
        Color::DarkGray.paint(format!("({}/{})", page.index + 1, page.total))
    )?;

    writeln!(w, "{}", ACCENT.bold().paint(&commit.id))?;
    writeln!(w, "{}", Color::Cyan.italic().paint(commit.url(upstream_url)))?;
    writeln!(w)?;
    writeln!(w, "{}", commit.description)?;

    if let (Some(author), Some(date)) = (&commit.author, &commit.date) {
        writeln!(w)?;
        writeln!(w, "{}  {}", Color::Yellow.paint("Author"), author)?;
        writeln!(w, "{}    {}", Color::Yellow.paint("Date"), date)?;
        let pr = commit
            .pull_request_url(upstream_url)
            .unwrap_or_else(|| "No PR".to_string());
        writeln!(w, "{} {}", Color::Yellow.paint("GitHub PR"), pr)?;
    }
    Ok(())
}

/// The page indices to draw dots for: at most [MAX_DOTS], always including `index`.
fn dot_window(index: usize, total: usize) -> Range<usize> {
    let start = index
        .saturating_sub(MAX_DOTS / 2)
        .min(total.saturating_sub(MAX_DOTS));
    start..(start + MAX_DOTS).min(total)
}

/// Keeps the last `limit` characters of `text`. Returns whether anything was cut.
pub fn truncate_tail(text: &str, limit: usize) -> (&str, bool) {
    let count = text.chars().count();
    if count <= limit {
        return (text, false);
    }
    let start = text
        .char_indices()
        .nth(count - limit)
        .map_or(text.len(), |(i, _)| i);
    (&text[start..], true)
}
