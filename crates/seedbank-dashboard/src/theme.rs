use ratatui::style::{Color, Modifier, Style};
use seedbank_core::MemoryType;

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const HOVERED_STYLE: Style = Style::new().bg(Color::Rgb(40, 44, 56));
pub const MUTED: Color = Color::Rgb(146, 131, 116);
pub const ACCENT: Color = Color::Rgb(131, 165, 152);
pub const WARN: Color = Color::Rgb(250, 189, 47);
pub const ERROR: Color = Color::Rgb(254, 128, 25);
pub const LIVE: Color = Color::Rgb(184, 187, 38);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

/// Stable colour per tag text, so the same tag reads the same everywhere.
pub fn tag_badge_style(tag: &str) -> Style {
    let palette = [
        Color::Rgb(131, 165, 152),
        Color::Rgb(69, 133, 136),
        Color::Rgb(142, 192, 124),
        Color::Rgb(184, 187, 38),
        Color::Rgb(250, 189, 47),
        Color::Rgb(254, 128, 25),
        Color::Rgb(211, 134, 155),
        Color::Rgb(189, 174, 147),
    ];
    let mut hash: u64 = 1469598103934665603;
    for b in tag.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    Style::new()
        .fg(palette[(hash as usize) % palette.len()])
        .add_modifier(Modifier::BOLD)
}

pub fn memory_type_color(memory_type: MemoryType) -> Color {
    match memory_type {
        MemoryType::Episodic => Color::Rgb(131, 165, 152),
        MemoryType::Semantic => Color::Rgb(211, 134, 155),
        MemoryType::Procedural => Color::Rgb(250, 189, 47),
        MemoryType::Working => Color::Rgb(142, 192, 124),
    }
}

/// Score bands: strong matches green, weak ones muted.
pub fn score_color(score: f64) -> Color {
    if score >= 0.75 {
        LIVE
    } else if score >= 0.4 {
        WARN
    } else {
        MUTED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_colour_is_stable() {
        assert_eq!(tag_badge_style("Tier"), tag_badge_style("Tier"));
    }

    #[test]
    fn score_bands() {
        assert_eq!(score_color(0.9), LIVE);
        assert_eq!(score_color(0.5), WARN);
        assert_eq!(score_color(0.1), MUTED);
    }
}
