use std::{convert::Infallible, io::Write};

use {
    anyhow::Context,
    embedded_graphics::{
        mono_font::{
            MonoFont, MonoTextStyle,
            ascii::{FONT_8X13, FONT_9X18_BOLD, FONT_10X20},
        },
        pixelcolor::BinaryColor,
        prelude::*,
        primitives::{
            Circle, Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle,
            RoundedRectangle, StrokeAlignment,
        },
        text::{Baseline, Text},
    },
};

use crate::{
    grid::{COLUMNS, DAYS, Day, Entry},
    occurrence::Occurrence,
    render::{Footer, Header, Renderer, Slot, one_line},
};

/// The default canvas size, which matches a 12.48" e-ink panel.
pub const DEFAULT_SIZE: Size = Size::new(1304, 984);

/// The smallest canvas that the layout still fits on.
const MIN_SIZE: Size = Size::new(448, 320);

/// The largest canvas that will be allocated.
const MAX_SIZE: Size = Size::new(8192, 8192);

const ROWS: u32 = (DAYS / COLUMNS) as u32;
const MARGIN: i32 = 8;
const BORDER: u32 = 2;
const TITLE_HEIGHT: u32 = 40;
const WEEKDAY_HEIGHT: u32 = 28;
const FOOTER_HEIGHT: u32 = 28;
/// The space at the top of a cell reserved for the day number.
const DAY_NUMBER_HEIGHT: u32 = 28;
const ENTRY_HEIGHT: u32 = 20;
const ENTRY_GAP: u32 = 4;
const PADDING: i32 = 4;

const TITLE_FONT: &MonoFont<'static> = &FONT_10X20;
const DAY_FONT: &MonoFont<'static> = &FONT_9X18_BOLD;
const ENTRY_FONT: &MonoFont<'static> = &FONT_8X13;

/// A 1-bit image that can be drawn on with `embedded-graphics`.
///
/// `BinaryColor::On` is ink (black) and `BinaryColor::Off` is paper
/// (white).
#[derive(Clone, Debug)]
pub struct Canvas {
    size: Size,
    pixels: Vec<bool>,
}

impl Canvas {
    pub fn new(size: Size) -> Canvas {
        let len = size.width as usize * size.height as usize;
        Canvas { size, pixels: vec![false; len] }
    }

    /// Returns the color of the pixel at `point`, if it is on the canvas.
    #[cfg(test)]
    pub fn pixel(&self, point: Point) -> Option<BinaryColor> {
        self.index(point).map(|i| BinaryColor::from(self.pixels[i]))
    }

    /// Encodes this canvas as an 8-bit grayscale PNG.
    pub fn write_png<W: Write>(&self, wtr: W) -> anyhow::Result<()> {
        let mut encoder =
            png::Encoder::new(wtr, self.size.width, self.size.height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer =
            encoder.write_header().context("failed to write PNG header")?;
        let data: Vec<u8> = self
            .pixels
            .iter()
            .map(|&ink| if ink { 0x00 } else { 0xFF })
            .collect();
        writer.write_image_data(&data).context("failed to write PNG data")?;
        writer.finish().context("failed to finish PNG")?;
        Ok(())
    }

    fn index(&self, point: Point) -> Option<usize> {
        let x = usize::try_from(point.x).ok()?;
        let y = usize::try_from(point.y).ok()?;
        let (width, height) =
            (self.size.width as usize, self.size.height as usize);
        if x >= width || y >= height {
            return None;
        }
        Some(y * width + x)
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        self.size
    }
}

impl DrawTarget for Canvas {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Infallible>
    where
        I: IntoIterator<Item = Pixel<BinaryColor>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(i) = self.index(point) {
                self.pixels[i] = color.is_on();
            }
        }
        Ok(())
    }
}

/// Draws a grid onto a canvas with hard edged fonts and lines.
#[derive(Debug)]
pub struct RasterRenderer {
    canvas: Canvas,
    layout: Layout,
}

impl RasterRenderer {
    pub fn new(size: Size) -> anyhow::Result<RasterRenderer> {
        anyhow::ensure!(
            size.width >= MIN_SIZE.width && size.height >= MIN_SIZE.height,
            "image size {}x{} is too small, it must be at least {}x{}",
            size.width,
            size.height,
            MIN_SIZE.width,
            MIN_SIZE.height,
        );
        anyhow::ensure!(
            size.width <= MAX_SIZE.width && size.height <= MAX_SIZE.height,
            "image size {}x{} is too large, it must be at most {}x{}",
            size.width,
            size.height,
            MAX_SIZE.width,
            MAX_SIZE.height,
        );
        let canvas = Canvas::new(size);
        Ok(RasterRenderer { canvas, layout: Layout::new(size) })
    }

    pub fn into_canvas(self) -> Canvas {
        self.canvas
    }

    fn entry(&mut self, cell: Rectangle, y: i32, entry: &Entry) {
        let ink = ink();
        let text = entry.text().map(one_line).unwrap_or_default();
        match (&entry.occurrence, entry.span) {
            (Occurrence::AllDay { .. }, Some(span)) => {
                // Bars run to the edges of the cell so that they join up
                // with the bars in neighboring cells.
                let left = cell.top_left.x;
                let right = left + cell.size.width as i32 - 1;
                let bottom = y + ENTRY_HEIGHT as i32 - 1;
                let borders = span.borders();
                let mut lines = vec![];
                if borders.top {
                    lines.push(Line::new(
                        Point::new(left, y),
                        Point::new(right, y),
                    ));
                }
                if borders.bottom {
                    lines.push(Line::new(
                        Point::new(left, bottom),
                        Point::new(right, bottom),
                    ));
                }
                if borders.left {
                    lines.push(Line::new(
                        Point::new(left + PADDING, y),
                        Point::new(left + PADDING, bottom),
                    ));
                }
                if borders.right {
                    lines.push(Line::new(
                        Point::new(right - PADDING, y),
                        Point::new(right - PADDING, bottom),
                    ));
                }
                for line in lines {
                    draw(line.into_styled(ink), &mut self.canvas);
                }
                let origin = Point::new(left + 2 * PADDING, y + 4);
                self.text(&text, origin, ENTRY_FONT, cell);
            }
            (&Occurrence::Timed { start, .. }, _) => {
                let rect = Rectangle::new(
                    Point::new(cell.top_left.x + PADDING, y),
                    Size::new(
                        cell.size.width.saturating_sub(2 * PADDING as u32),
                        ENTRY_HEIGHT,
                    ),
                );
                let corner = Size::new(6, 6);
                let rounded =
                    RoundedRectangle::with_equal_corners(rect, corner);
                draw(rounded.into_styled(ink), &mut self.canvas);
                let label = format!("{} {text}", start.strftime("%H:%M"));
                let origin = Point::new(rect.top_left.x + PADDING, y + 4);
                let clip = Rectangle::new(
                    rect.top_left,
                    rect.size.saturating_sub(Size::new(PADDING as u32, 0)),
                );
                self.text(&label, origin, ENTRY_FONT, clip);
            }
            (Occurrence::AllDay { .. }, None) => {
                log::debug!("all-day entry without a span, not drawing it");
            }
        }
    }

    /// Draws `text` with its top left corner at `origin`, clipped to
    /// `clip`.
    fn text(
        &mut self,
        text: &str,
        origin: Point,
        font: &MonoFont<'_>,
        clip: Rectangle,
    ) {
        let style = MonoTextStyle::new(font, BinaryColor::On);
        let mut clipped = self.canvas.clipped(&clip);
        let text = Text::with_baseline(text, origin, style, Baseline::Top);
        draw(text, &mut clipped);
    }
}

impl Renderer for RasterRenderer {
    fn begin(&mut self, header: &Header) -> anyhow::Result<()> {
        let title = self.layout.title;
        let origin = title.top_left + Point::new(0, 8);
        self.text(&header.title, origin, TITLE_FONT, title);
        for (column, name) in header.weekdays.iter().enumerate() {
            let cell = self.layout.weekday(column);
            let origin = cell.top_left + Point::new(PADDING, 4);
            self.text(name, origin, DAY_FONT, cell);
        }
        Ok(())
    }

    fn day(&mut self, slot: Slot, day: &Day) -> anyhow::Result<()> {
        let cell = self.layout.cell(slot.row, slot.column);
        let ink = ink();
        draw(cell.into_styled(ink), &mut self.canvas);

        let number = day.date.day().to_string();
        let origin = cell.top_left + Point::new(2 * PADDING, PADDING + 2);
        self.text(&number, origin, DAY_FONT, cell);
        if slot.is_today {
            let diameter = DAY_NUMBER_HEIGHT - 2;
            let center = origin
                + Point::new(
                    DAY_FONT.character_size.width as i32
                        * number.len() as i32
                        / 2,
                    DAY_FONT.character_size.height as i32 / 2,
                );
            let ring = Circle::with_center(center, diameter);
            draw(ring.into_styled(ink), &mut self.canvas);
        }

        let bottom = cell.top_left.y + cell.size.height as i32 - PADDING;
        let mut y = cell.top_left.y + DAY_NUMBER_HEIGHT as i32 + PADDING;
        for (i, entry) in day.entries.iter().enumerate() {
            // Leave room for the overflow marker unless this is the last
            // entry.
            let remaining = day.entries.len() - i;
            let needed = if remaining > 1 {
                2 * (ENTRY_HEIGHT + ENTRY_GAP)
            } else {
                ENTRY_HEIGHT
            };
            if y + needed as i32 > bottom {
                let more = format!("+{remaining} more");
                let origin = Point::new(cell.top_left.x + 2 * PADDING, y + 4);
                self.text(&more, origin, ENTRY_FONT, cell);
                break;
            }
            self.entry(cell, y, entry);
            y += (ENTRY_HEIGHT + ENTRY_GAP) as i32;
        }
        Ok(())
    }

    fn finish(&mut self, footer: &Footer) -> anyhow::Result<()> {
        let area = self.layout.footer;
        let origin = area.top_left + Point::new(0, 6);
        self.text(&footer.text, origin, ENTRY_FONT, area);
        Ok(())
    }
}

/// Where each part of the image goes.
#[derive(Clone, Copy, Debug)]
struct Layout {
    title: Rectangle,
    weekdays: Rectangle,
    cells: Rectangle,
    footer: Rectangle,
}

impl Layout {
    fn new(size: Size) -> Layout {
        let width = size.width - 2 * MARGIN as u32;
        let mut top = MARGIN;
        let mut area = |height: u32| {
            let rect = Rectangle::new(
                Point::new(MARGIN, top),
                Size::new(width, height),
            );
            top += height as i32;
            rect
        };
        let title = area(TITLE_HEIGHT);
        let weekdays = area(WEEKDAY_HEIGHT);
        let fixed =
            2 * MARGIN as u32 + TITLE_HEIGHT + WEEKDAY_HEIGHT + FOOTER_HEIGHT;
        let cells = area(size.height - fixed);
        let footer = area(FOOTER_HEIGHT);
        Layout { title, weekdays, cells, footer }
    }

    fn column_width(&self) -> u32 {
        self.cells.size.width / COLUMNS as u32
    }

    fn weekday(&self, column: usize) -> Rectangle {
        let width = self.column_width();
        let offset = Point::new((column as u32 * width) as i32, 0);
        Rectangle::new(
            self.weekdays.top_left + offset,
            Size::new(width, self.weekdays.size.height),
        )
    }

    /// Returns the rectangle of a day cell. Neighboring cells overlap by
    /// one border width so that they share an edge.
    fn cell(&self, row: usize, column: usize) -> Rectangle {
        let width = self.column_width();
        let height = self.cells.size.height / ROWS;
        let offset = Point::new(
            (column as u32 * width) as i32,
            (row as u32 * height) as i32,
        );
        Rectangle::new(
            self.cells.top_left + offset,
            Size::new(width + BORDER, height + BORDER),
        )
    }
}

/// The style of every outline. Strokes are drawn inside their shape so that
/// a shape never covers pixels outside of its bounding box.
fn ink() -> PrimitiveStyle<BinaryColor> {
    PrimitiveStyleBuilder::new()
        .stroke_color(BinaryColor::On)
        .stroke_width(BORDER)
        .stroke_alignment(StrokeAlignment::Inside)
        .build()
}

/// Draws something infallibly onto a canvas (or a clipped view of one).
fn draw<D, T>(drawable: D, target: &mut T)
where
    D: Drawable<Color = BinaryColor>,
    T: DrawTarget<Color = BinaryColor, Error = Infallible>,
{
    // The error type is `Infallible`, so there's nothing to handle.
    let Ok(_) = drawable.draw(target);
}

#[cfg(test)]
mod tests {
    use jiff::{ToSpan, civil::date, tz::TimeZone};

    use crate::{
        calendar::{Calendar, Event, When},
        grid,
        render::walk,
    };

    use super::*;

    fn render(size: Size) -> Canvas {
        let tz = TimeZone::get("America/New_York").unwrap();
        let standup = date(2024, 7, 17).at(9, 30, 0, 0).to_zoned(tz.clone());
        let mut events = vec![
            Event::new(When::Date(date(2024, 7, 19)))
                .with_duration(4.days())
                .with_summary("Camping trip"),
            Event::new(When::DateTime(standup.unwrap()))
                .with_duration(15.minutes())
                .with_summary("Standup with a summary that is far too long"),
        ];
        // Enough entries to overflow a cell.
        for i in 0..30 {
            events.push(
                Event::new(When::Date(date(2024, 7, 24)))
                    .with_duration(1.day())
                    .with_summary(format!("busy {i}")),
            );
        }
        let cals = vec![Calendar::new("test", events)];
        let grid = grid::build(&cals, date(2024, 7, 17), &tz).unwrap();
        let footer = Footer { text: "Updated 2024-07-17 08:00".to_string() };
        let mut r = RasterRenderer::new(size).unwrap();
        walk(&grid, date(2024, 7, 17), &footer, &mut r).unwrap();
        r.into_canvas()
    }

    #[test]
    fn draws_borders_and_text() {
        let canvas = render(DEFAULT_SIZE);
        assert_eq!(canvas.size(), DEFAULT_SIZE);
        let layout = Layout::new(DEFAULT_SIZE);
        // The top left corner of the first cell is on its border.
        let first = layout.cell(0, 0);
        assert_eq!(canvas.pixel(first.top_left), Some(BinaryColor::On));
        // The margins are never drawn on.
        assert_eq!(canvas.pixel(Point::new(0, 0)), Some(BinaryColor::Off));
        let last = Point::new(
            DEFAULT_SIZE.width as i32 - 1,
            DEFAULT_SIZE.height as i32 - 1,
        );
        assert_eq!(canvas.pixel(last), Some(BinaryColor::Off));
        assert_eq!(canvas.pixel(last + Point::new(1, 1)), None);
        // There's some ink in the title.
        let title_ink = layout
            .title
            .points()
            .filter(|&p| canvas.pixel(p) == Some(BinaryColor::On))
            .count();
        assert!(title_ink > 0);
    }

    #[test]
    fn long_text_is_clipped_to_its_cell() {
        let canvas = render(DEFAULT_SIZE);
        let layout = Layout::new(DEFAULT_SIZE);
        // Wednesday is the third column and its only entry is a timed one
        // with a long summary. Nothing may leak into Thursday, which is
        // empty, at the same height.
        let wednesday = layout.cell(0, 2);
        let thursday = layout.cell(0, 3);
        let top = thursday.top_left.y + (DAY_NUMBER_HEIGHT as i32) + PADDING;
        let strip = Rectangle::new(
            Point::new(thursday.top_left.x + 2 * BORDER as i32 + 1, top),
            Size::new(thursday.size.width - 4 * BORDER - 2, ENTRY_HEIGHT),
        );
        assert!(
            strip
                .points()
                .all(|p| canvas.pixel(p) == Some(BinaryColor::Off))
        );
        // Whereas Wednesday has ink in that strip.
        let strip = Rectangle::new(
            Point::new(wednesday.top_left.x, top),
            strip.size,
        );
        assert!(
            strip.points().any(|p| canvas.pixel(p) == Some(BinaryColor::On))
        );
    }

    #[test]
    fn png_encoding() {
        let canvas = render(MIN_SIZE);
        let mut png = vec![];
        canvas.write_png(&mut png).unwrap();
        let decoder = png::Decoder::new(&png[..]);
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!(info.width, MIN_SIZE.width);
        assert_eq!(info.height, MIN_SIZE.height);
        assert_eq!(info.color_type, png::ColorType::Grayscale);
        assert_eq!(info.bit_depth, png::BitDepth::Eight);
    }

    #[test]
    fn too_small() {
        let err = RasterRenderer::new(Size::new(100, 100)).unwrap_err();
        insta::assert_snapshot!(
            err,
            @"image size 100x100 is too small, it must be at least 448x320",
        );
    }

    #[test]
    fn too_large() {
        let err = RasterRenderer::new(Size::new(200_000, 200_000));
        insta::assert_snapshot!(
            err.unwrap_err(),
            @"image size 200000x200000 is too large, it must be at most 8192x8192",
        );
    }
}
