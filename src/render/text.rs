use std::io::Write;

use crate::{
    grid::{Day, Entry},
    occurrence::Occurrence,
    render::{Footer, Header, Renderer, Slot, one_line},
    style::Theme,
};

/// Renders a grid as plain text, one block of lines per day.
///
/// All-day entries are drawn as `[ Summary ]`, where `<` and `>` replace the
/// brackets on sides where the event continues into another day. Entries
/// continuing an all-day bar whose summary is shown elsewhere in the same
/// row read `...`. Timed entries are written as `HH:MM Summary`.
#[derive(Debug)]
pub struct TextRenderer<'t, W> {
    wtr: W,
    theme: &'t Theme,
}

impl<'t, W: Write> TextRenderer<'t, W> {
    pub fn new(wtr: W, theme: &'t Theme) -> TextRenderer<'t, W> {
        TextRenderer { wtr, theme }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.wtr
    }

    fn entry(&mut self, entry: &Entry) -> anyhow::Result<()> {
        let text = entry.text().map(one_line);
        match (&entry.occurrence, entry.span) {
            (Occurrence::AllDay { .. }, Some(span)) => {
                let borders = span.borders();
                let left = if borders.left { "[" } else { "<" };
                let right = if borders.right { "]" } else { ">" };
                let text = text.as_deref().unwrap_or("...");
                let bar = format!("{left} {text} {right}");
                writeln!(self.wtr, "  {}", self.theme.all_day(bar))?;
            }
            (&Occurrence::Timed { start, .. }, _) => {
                let time = start.strftime("%H:%M");
                let text = text.as_deref().unwrap_or("");
                writeln!(self.wtr, "  {} {text}", self.theme.time(time))?;
            }
            (Occurrence::AllDay { .. }, None) => {
                anyhow::bail!("all-day entry is missing its span")
            }
        }
        Ok(())
    }
}

impl<'t, W: Write> Renderer for TextRenderer<'t, W> {
    fn begin(&mut self, header: &Header) -> anyhow::Result<()> {
        writeln!(self.wtr, "{}", self.theme.highlight(&header.title))?;
        writeln!(self.wtr)?;
        Ok(())
    }

    fn day(&mut self, slot: Slot, day: &Day) -> anyhow::Result<()> {
        if slot.column == 0 && slot.row > 0 {
            writeln!(self.wtr)?;
        }
        let heading = day.date.strftime("%a %Y-%m-%d");
        if slot.is_today {
            writeln!(self.wtr, "{} *", self.theme.today(heading))?;
        } else {
            writeln!(self.wtr, "{heading}")?;
        }
        for entry in day.entries.iter() {
            self.entry(entry)?;
        }
        Ok(())
    }

    fn finish(&mut self, footer: &Footer) -> anyhow::Result<()> {
        if !footer.text.is_empty() {
            writeln!(self.wtr)?;
            writeln!(self.wtr, "{}", footer.text)?;
        }
        self.wtr.flush()?;
        Ok(())
    }
}
