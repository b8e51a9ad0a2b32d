use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;

// ═══════════════════════════════════════════════════════════════════════════════
// Clap Styles
// ═══════════════════════════════════════════════════════════════════════════════

pub fn get_styles() -> Styles {
    let heading = Style::new()
        .bold()
        .underline()
        .fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
    let failure = Style::new()
        .bold()
        .fg_color(Some(Color::Ansi(AnsiColor::Red)));

    Styles::styled()
        .usage(heading)
        .header(heading)
        .literal(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Blue))),
        )
        .invalid(failure)
        .error(failure)
        .valid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Count Display
// ═══════════════════════════════════════════════════════════════════════════════

/// Renders `(label, value)` pairs as an aligned two-column listing.
pub fn format_counts(rows: &[(&str, usize)]) -> String {
    let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let value_width = rows
        .iter()
        .map(|(_, value)| value.to_string().len())
        .max()
        .unwrap_or(0);

    rows.iter()
        .map(|(label, value)| {
            format!(
                "  {:<label_width$}  {:>value_width$}",
                label,
                value,
                label_width = label_width,
                value_width = value_width
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
