use std::io::{self, IsTerminal, Write};

use chrono::Datelike;
use tack_shared::Variant;
use unicode_width::UnicodeWidthStr;

use crate::calendar::CalendarMonth;
use crate::config::Config;
use crate::grid::weekday_labels;
use crate::item::{ISO_DATE, Item, ItemKey};
use crate::store::BoardState;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.get_bool("color").unwrap_or(true),
        }
    }

    #[tracing::instrument(skip(self, state))]
    pub fn print_board(&mut self, state: &BoardState, variant: Variant) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let columns = state.board(variant);

        let headers = columns
            .iter()
            .map(|(status, keys)| format!("{} ({})", status.label(), keys.len()))
            .collect::<Vec<_>>();
        let depth = columns.iter().map(|(_, keys)| keys.len()).max().unwrap_or(0);

        let mut rows = Vec::with_capacity(depth);
        for row in 0..depth {
            rows.push(
                columns
                    .iter()
                    .map(|(_, keys)| {
                        keys.get(row)
                            .map(|key| self.card_label(state, key))
                            .unwrap_or_default()
                    })
                    .collect(),
            );
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, month, state))]
    pub fn print_calendar(&mut self, month: &CalendarMonth, state: &BoardState) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", month.cursor.title())?;

        let headers = weekday_labels(month.week_start)
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let rows = month
            .rows()
            .map(|week| {
                week.iter()
                    .map(|cell| match cell.slot.day() {
                        Some(day) => {
                            let mut label = format!("{:>2}", day.date.day());
                            if !cell.items.is_empty() {
                                label.push_str(&format!(" [{}]", cell.items.len()));
                            }
                            if day.is_today {
                                self.paint(&label, "1;36")
                            } else {
                                label
                            }
                        }
                        None => String::new(),
                    })
                    .collect()
            })
            .collect::<Vec<_>>();
        write_table(&mut out, headers, rows)?;

        for cell in &month.cells {
            let Some(day) = cell.slot.day() else {
                continue;
            };
            for key in &cell.items {
                writeln!(out, "{}  {}", day.iso, self.card_label(state, key))?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, item))]
    pub fn print_item(&mut self, item: &Item) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", item.key.id)?;
        writeln!(out, "kind      {}", item.key.variant)?;
        writeln!(out, "title     {}", item.title)?;
        writeln!(out, "status    {}", item.status)?;
        if let Some(date) = item.scheduled {
            writeln!(out, "scheduled {}", date.format(ISO_DATE))?;
        }
        if let Some(description) = &item.description {
            writeln!(out, "desc      {description}")?;
        }
        Ok(())
    }

    pub fn print_error(&mut self, message: &str) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "{}", self.paint(message, "31"))?;
        Ok(())
    }

    fn card_label(&self, state: &BoardState, key: &ItemKey) -> String {
        let title = state
            .item(key)
            .map(|item| item.title.as_str())
            .unwrap_or("?");
        format!("{} {}", self.paint(&key.id, "33"), title)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Writes a left-aligned table. Cells may carry ANSI color; widths are
/// measured on what the terminal shows.
fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let widths: Vec<usize> = (0..headers.len())
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .chain(std::iter::once(&headers[col]))
                .map(|cell| visible_width(cell))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    for line in std::iter::once(headers).chain(std::iter::once(rule)).chain(rows) {
        for (col, width) in widths.iter().enumerate() {
            let cell = line.get(col).map(String::as_str).unwrap_or("");
            let pad = width.saturating_sub(visible_width(cell));
            write!(writer, "{cell}{:pad$} ", "")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn visible_width(cell: &str) -> usize {
    let mut plain = String::with_capacity(cell.len());
    let mut in_escape = false;
    for ch in cell.chars() {
        match (in_escape, ch) {
            (false, '\x1b') => in_escape = true,
            (false, _) => plain.push(ch),
            (true, 'm') => in_escape = false,
            (true, _) => {}
        }
    }
    UnicodeWidthStr::width(plain.as_str())
}
