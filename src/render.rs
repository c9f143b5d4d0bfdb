/*
 *  render.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 *
 *  Terminal view - address rows as full width rainbow banners, or plain
 *  text / JSON for scripts
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use crossterm::{
    cursor, queue, terminal,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
};
use serde::Serialize;
use std::io::{self, Write};

use crate::address::{AddressRow, titled_rows, untitled_rows};
use crate::config::OutputFormat;
use crate::controller::ViewState;

pub const DENIED_MESSAGE: &str = "You have denied location access for this app\n\
\n\
This app requires your location in order to function\n\
\n\
Enable location in Settings to use this app";

/// Banner backgrounds, cycled by row index
pub const RAINBOW: [Color; 7] = [
    Color::Rgb { r: 0xE5, g: 0x39, b: 0x35 },
    Color::Rgb { r: 0xFB, g: 0x8C, b: 0x00 },
    Color::Rgb { r: 0xFD, g: 0xD8, b: 0x35 },
    Color::Rgb { r: 0x43, g: 0xA0, b: 0x47 },
    Color::Rgb { r: 0x1E, g: 0x88, b: 0xE5 },
    Color::Rgb { r: 0x39, g: 0x49, b: 0xAB },
    Color::Rgb { r: 0x8E, g: 0x24, b: 0xAA },
];

/// Braille-dot spinner frames.
const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub fn banner_color(index: usize) -> Color {
    RAINBOW[index % RAINBOW.len()]
}

/// Black or white, whichever reads better on `bg`
pub fn text_color(bg: Color) -> Color {
    match bg {
        Color::Rgb { r, g, b } => {
            // Rec. 601 luma
            let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
            if luma >= 150 { Color::Black } else { Color::White }
        }
        _ => Color::White,
    }
}

/// Character cell size of the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    pub width: u16,
    pub height: u16,
}

impl Screen {
    pub fn detect() -> Self {
        match terminal::size() {
            Ok((width, height)) if width > 0 && height > 0 => Self { width, height },
            _ => Self { width: 80, height: 24 },
        }
    }
}

#[derive(Serialize)]
struct JsonView<'a> {
    state: &'static str,
    rows: &'a [AddressRow],
}

pub fn render<W: Write>(
    out: &mut W,
    view: &ViewState,
    format: OutputFormat,
    screen: Screen,
    tick: u64,
) -> io::Result<()> {
    match format {
        OutputFormat::Banners => render_banners(out, view, screen, tick),
        OutputFormat::Plain => render_plain(out, view),
        OutputFormat::Json => render_json(out, view),
    }?;
    out.flush()
}

/// Wipe the terminal before a redraw
pub fn clear_screen<W: Write>(out: &mut W) -> io::Result<()> {
    queue!(out, terminal::Clear(terminal::ClearType::All), cursor::MoveTo(0, 0))
}

fn render_banners<W: Write>(out: &mut W, view: &ViewState, screen: Screen, tick: u64) -> io::Result<()> {
    let width = screen.width as usize;
    match view {
        ViewState::AwaitingPermissionDecision => Ok(()),
        ViewState::PermissionDenied => {
            let lines: Vec<&str> = DENIED_MESSAGE.lines().collect();
            let height = (screen.height as usize).max(lines.len() + 2);
            banner(out, &lines, banner_color(0), height, width)
        }
        ViewState::Loading => {
            let frame = SPINNER_FRAMES[(tick as usize) % SPINNER_FRAMES.len()];
            queue!(out, Print(format!("{} Locating…\n", frame)))
        }
        ViewState::Loaded(rows) => {
            let untitled: Vec<&AddressRow> = untitled_rows(rows).collect();
            // first screenful is shared by the untitled rows
            let per_row = (screen.height as usize / untitled.len().max(1)).max(1);
            let ordered = untitled.iter().copied().chain(titled_rows(rows));
            for (index, row) in ordered.enumerate() {
                let lines: Vec<&str> = if row.show_title {
                    vec![row.title.as_str(), row.value.as_str()]
                } else {
                    vec![row.value.as_str()]
                };
                banner(out, &lines, banner_color(index), per_row, width)?;
            }
            Ok(())
        }
    }
}

/// A solid block `height` lines tall with `content` centred in it
fn banner<W: Write>(out: &mut W, content: &[&str], bg: Color, height: usize, width: usize) -> io::Result<()> {
    let fg = text_color(bg);
    let height = height.max(content.len());
    let top = (height - content.len()) / 2;

    for line in 0..height {
        queue!(out, SetBackgroundColor(bg), SetForegroundColor(fg))?;
        match line.checked_sub(top).and_then(|i| content.get(i)) {
            Some(text) => queue!(out, SetAttribute(Attribute::Bold), Print(centred(text, width)))?,
            None => queue!(out, Print(" ".repeat(width)))?,
        }
        queue!(out, SetAttribute(Attribute::Reset), ResetColor, Print("\n"))?;
    }
    Ok(())
}

fn centred(text: &str, width: usize) -> String {
    let clipped: String = text.chars().take(width).collect();
    format!("{:^width$}", clipped, width = width)
}

fn render_plain<W: Write>(out: &mut W, view: &ViewState) -> io::Result<()> {
    match view {
        ViewState::AwaitingPermissionDecision => Ok(()),
        ViewState::PermissionDenied => writeln!(out, "{}", DENIED_MESSAGE),
        ViewState::Loading => writeln!(out, "Locating…"),
        ViewState::Loaded(rows) => {
            for row in untitled_rows(rows).chain(titled_rows(rows)) {
                if row.show_title {
                    writeln!(out, "{}: {}", row.title, row.value)?;
                } else {
                    writeln!(out, "{}", row.value)?;
                }
            }
            Ok(())
        }
    }
}

fn render_json<W: Write>(out: &mut W, view: &ViewState) -> io::Result<()> {
    let (state, rows): (&'static str, &[AddressRow]) = match view {
        ViewState::AwaitingPermissionDecision => ("awaiting_permission_decision", &[]),
        ViewState::PermissionDenied => ("permission_denied", &[]),
        ViewState::Loading => ("loading", &[]),
        ViewState::Loaded(rows) => ("loaded", rows.as_slice()),
    };
    serde_json::to_writer_pretty(&mut *out, &JsonView { state, rows }).map_err(io::Error::other)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Screen = Screen { width: 40, height: 12 };

    fn rows() -> Vec<AddressRow> {
        vec![
            AddressRow::new("locality", "Cupertino".to_string(), false),
            AddressRow::new("country", "United States".to_string(), false),
            AddressRow::new("Sub-Administrative Area", "Santa Clara".to_string(), true),
        ]
    }

    fn to_string(view: &ViewState, format: OutputFormat) -> String {
        let mut buf = Vec::new();
        render(&mut buf, view, format, SCREEN, 0).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_plain_loaded() {
        let s = to_string(&ViewState::Loaded(rows()), OutputFormat::Plain);
        assert_eq!(s, "Cupertino\nUnited States\nSub-Administrative Area: Santa Clara\n");
    }

    #[test]
    fn test_awaiting_renders_nothing() {
        assert!(to_string(&ViewState::AwaitingPermissionDecision, OutputFormat::Banners).is_empty());
        assert!(to_string(&ViewState::AwaitingPermissionDecision, OutputFormat::Plain).is_empty());
    }

    #[test]
    fn test_denied_message() {
        let s = to_string(&ViewState::PermissionDenied, OutputFormat::Banners);
        assert!(s.contains("You have denied location access for this app"));
        assert!(s.contains("Enable location in Settings to use this app"));
    }

    #[test]
    fn test_loading_spinner() {
        let s = to_string(&ViewState::Loading, OutputFormat::Banners);
        assert!(s.starts_with(SPINNER_FRAMES[0]));
        assert!(s.contains("Locating"));
    }

    #[test]
    fn test_banner_heights_fill_screen() {
        let s = to_string(&ViewState::Loaded(rows()), OutputFormat::Banners);
        // two untitled rows share 12 lines, titled row gets the same height
        assert_eq!(s.matches('\n').count(), 18);
        let title = s.find("Sub-Administrative Area").unwrap();
        let value = s.find("Santa Clara").unwrap();
        assert!(title < value);
    }

    #[test]
    fn test_json_loaded() {
        let s = to_string(&ViewState::Loaded(rows()), OutputFormat::Json);
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["state"], "loaded");
        assert_eq!(v["rows"][0]["value"], "Cupertino");
        assert_eq!(v["rows"][2]["show_title"], true);
    }

    #[test]
    fn test_json_loading_has_no_rows() {
        let s = to_string(&ViewState::Loading, OutputFormat::Json);
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["state"], "loading");
        assert_eq!(v["rows"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_colours_cycle() {
        assert_eq!(banner_color(0), banner_color(RAINBOW.len()));
        assert_ne!(banner_color(0), banner_color(1));
        assert_eq!(text_color(RAINBOW[2]), Color::Black); // yellow
        assert_eq!(text_color(RAINBOW[5]), Color::White); // indigo
    }

    #[test]
    fn test_centred_clips() {
        assert_eq!(centred("abc", 7), "  abc  ");
        assert_eq!(centred("abcdef", 3), "abc");
    }
}
