//! # Terminal display
//!
//! Renders pipeline answers for the `drq` front-end:
//!
//! - SQL and schema DDL are syntax highlighted with `syntect` (`base16-ocean.dark`).
//! - Answer text gets a light Markdown pass (headers, `**bold**`, `*italic*`,
//!   `` `code` ``), so the sampling note shows in italics.
//! - Tables are laid out as aligned columns, with a coloured header drawn with
//!   `crossterm`.
//!
//! Every printer writes to any [`Write`], which is how the tests capture output.
//! Nothing here decides *what* to show; that is the pipeline's job.

use crate::{
    analysis::{Complexity, QueryRecommendations},
    parser::RowSet,
    pipeline::{Outcome, ResponsePayload},
};
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{error::Error, io::Write};
use syntect::{
    easy::HighlightLines,
    highlighting::{Style, ThemeSet},
    parsing::SyntaxSet,
    util::{LinesWithEndings, as_24_bit_terminal_escaped},
};

const THEME: &str = "base16-ocean.dark";

/// Widest a cell may be before it is cut with an ellipsis.
pub const MAX_CELL_WIDTH: usize = 40;

/// Rows printed before the rest are summarised as "… N more rows".
pub const MAX_PRINTED_ROWS: usize = 50;

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

#[allow(clippy::expect_used)]
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
#[allow(clippy::expect_used)]
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"));
#[allow(clippy::expect_used)]
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").expect("valid regex"));

fn with_color<W: Write + ?Sized>(
    out: &mut W,
    color: Color,
    bold: bool,
    text: &str,
) -> Result<(), Box<dyn Error>> {
    out.execute(SetForegroundColor(color))?;
    if bold {
        out.execute(SetAttribute(Attribute::Bold))?;
    }
    write!(out, "{}", text)?;
    out.execute(SetAttribute(Attribute::Reset))?;
    out.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}

/// Highlight `sql` and write it followed by a blank line.
pub fn print_sql<W: Write + ?Sized>(out: &mut W, sql: &str) -> Result<(), Box<dyn Error>> {
    let theme = THEMES
        .themes
        .get(THEME)
        .ok_or_else(|| format!("syntax theme {THEME} is missing"))?;
    let syntax = SYNTAXES
        .find_syntax_by_extension("sql")
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());

    let mut highlighter = HighlightLines::new(syntax, theme);
    for line in LinesWithEndings::from(sql) {
        let ranges: Vec<(Style, &str)> = highlighter.highlight_line(line, &SYNTAXES)?;
        write!(out, "{}", as_24_bit_terminal_escaped(&ranges[..], false))?;
        out.execute(SetAttribute(Attribute::Reset))?;
    }
    writeln!(out)?;
    if !sql.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}

/// Apply inline Markdown styling to one line.
pub fn style_inline(line: &str) -> String {
    let styled = INLINE_CODE.replace_all(line, "\x1b[33m${1}\x1b[0m");
    let styled = BOLD.replace_all(&styled, "\x1b[1m${1}\x1b[0m");
    ITALIC.replace_all(&styled, "\x1b[3m${1}\x1b[0m").into_owned()
}

/// Write Markdown-ish answer text.
pub fn print_text<W: Write + ?Sized>(out: &mut W, text: &str) -> Result<(), Box<dyn Error>> {
    for line in text.lines() {
        if let Some(header) = line
            .strip_prefix("### ")
            .or_else(|| line.strip_prefix("## "))
            .or_else(|| line.strip_prefix("# "))
        {
            with_color(out, Color::Cyan, true, header)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", style_inline(line))?;
        }
    }
    Ok(())
}

fn truncate(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL_WIDTH {
        cell.to_string()
    } else {
        let mut cut: String = cell.chars().take(MAX_CELL_WIDTH - 1).collect();
        cut.push('…');
        cut
    }
}

fn pad(cell: &str, width: usize) -> String {
    let len = cell.chars().count();
    format!("{}{}", cell, " ".repeat(width.saturating_sub(len)))
}

/// Lay out `table` as aligned plain-text lines: header, rule, then rows.
///
/// At most `max_rows` rows are shown; a trailing line counts the rest.
pub fn format_table(table: &RowSet, max_rows: usize) -> Vec<String> {
    let header: Vec<String> = table.columns().iter().map(|c| truncate(c)).collect();
    let shown: Vec<Vec<String>> = table
        .rows()
        .iter()
        .take(max_rows)
        .map(|row| row.iter().map(|c| truncate(c)).collect())
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            shown
                .iter()
                .filter_map(|row| row.get(i))
                .chain(std::iter::once(&header[i]))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| pad(cell, *width))
            .collect::<Vec<_>>()
            .join(" │ ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![
        render(&header),
        widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─"),
    ];
    lines.extend(shown.iter().map(|row| render(row)));

    if table.len() > max_rows {
        lines.push(format!("… {} more rows", table.len() - max_rows));
    }
    lines
}

/// Write `table` with a bold header.
pub fn print_table<W: Write + ?Sized>(out: &mut W, table: &RowSet) -> Result<(), Box<dyn Error>> {
    let lines = format_table(table, MAX_PRINTED_ROWS);
    for (i, line) in lines.iter().enumerate() {
        match i {
            0 => with_color(out, Color::Cyan, true, line)?,
            1 => with_color(out, Color::DarkGrey, false, line)?,
            _ => write!(out, "{}", line)?,
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write one answer: the SQL behind it (if asked), the text, then the table.
pub fn print_payload<W: Write + ?Sized>(
    out: &mut W,
    payload: &ResponsePayload,
    show_sql: bool,
) -> Result<(), Box<dyn Error>> {
    if show_sql {
        if let Some(sql) = &payload.sql {
            print_sql(out, sql)?;
        }
    }

    match payload.outcome {
        Outcome::Error => {
            with_color(out, Color::Red, true, &payload.text)?;
            writeln!(out)?;
        }
        Outcome::Table | Outcome::Narrative => print_text(out, &payload.text)?,
    }

    if let Some(table) = &payload.table {
        writeln!(out)?;
        print_table(out, table)?;
    }

    out.flush()?;
    Ok(())
}

/// Write a `drq analyze` report.
pub fn print_recommendations<W: Write + ?Sized>(
    out: &mut W,
    rec: &QueryRecommendations,
    tips: &[&str],
) -> Result<(), Box<dyn Error>> {
    with_color(out, Color::Cyan, true, "Optimized query")?;
    writeln!(out)?;
    print_sql(out, &rec.optimized)?;

    let complexity_color = match rec.complexity.complexity {
        Complexity::Low => Color::Green,
        Complexity::Medium => Color::Yellow,
        Complexity::High => Color::Red,
    };
    write!(out, "Complexity: ")?;
    with_color(out, complexity_color, true, &rec.complexity.complexity.to_string())?;
    writeln!(out)?;
    for issue in &rec.complexity.issues {
        writeln!(out, "  ! {}", issue)?;
    }
    for suggestion in &rec.complexity.suggestions {
        writeln!(out, "  → {}", suggestion)?;
    }

    let perf = &rec.performance;
    writeln!(
        out,
        "Estimated: {} (score {}/10)",
        perf.tier.estimated_time(),
        perf.complexity_score
    )?;
    let color = if perf.warning { Color::Yellow } else { Color::Green };
    with_color(out, color, false, &perf.message)?;
    writeln!(out)?;

    writeln!(out)?;
    with_color(out, Color::DarkGrey, false, "Tips:")?;
    writeln!(out)?;
    for tip in tips {
        writeln!(out, "  • {}", tip)?;
    }
    out.flush()?;
    Ok(())
}
