use chrono::{DateTime, Local};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use ratatui::Frame;
use std::time::SystemTime;

use crate::app::{EditorView, FrameModel, HelpView, NoticeKind, TableView};
use crate::rank::BoardRow;
use crate::settings::ColumnStyles;

const HEADERS: [&str; 9] = [
    "Call Sign",
    "Flag",
    "Airline",
    "Route",
    "Heading",
    "Dist (nm)",
    "Alt (ft)",
    "VR (fpm)",
    "Speed (kts)",
];
const WIDTHS: [u16; 9] = [10, 5, 24, 10, 8, 9, 9, 9, 11];

const HELP_HEIGHT: u16 = 11;
const NOTICE_HEIGHT: u16 = 3;

pub fn draw(f: &mut Frame, model: &FrameModel) {
    let area = f.area();
    let mut constraints = vec![Constraint::Min(5)];
    if model.help.is_some() {
        constraints.push(Constraint::Length(HELP_HEIGHT));
    }
    if model.notification.is_some() {
        constraints.push(Constraint::Length(NOTICE_HEIGHT));
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    render_table(f, chunks[0], model);
    let mut next = 1;
    if let Some(help) = &model.help {
        render_help(f, chunks[next], help);
        next += 1;
    }
    if let Some((text, kind)) = &model.notification {
        render_notification(f, chunks[next], text, *kind);
    }
    if let Some(editor) = &model.editor {
        render_editor(f, area, editor);
    }
}

fn render_table(f: &mut Frame, area: Rect, model: &FrameModel) {
    let block = Block::default()
        .borders(Borders::TOP | Borders::BOTTOM)
        .border_type(BorderType::Plain)
        .title(Line::from(Span::styled(
            model.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )))
        .title_alignment(Alignment::Center);

    let rows = match &model.table {
        TableView::Rows(rows) => rows,
        TableView::Waiting => {
            let text = format!("Waiting for data from {}", model.source);
            f.render_widget(message_table(block, "-", text, Color::DarkGray), area);
            return;
        }
        TableView::Empty => {
            let text = "No aircraft seen recently".to_string();
            f.render_widget(message_table(block, "-", text, Color::Gray), area);
            return;
        }
        TableView::Unavailable { url } => {
            let text = format!("Could not connect to {url}");
            f.render_widget(message_table(block, "ERROR", text, Color::Red), area);
            return;
        }
    };

    let header = Row::new(HEADERS.iter().zip(WIDTHS.iter()).enumerate().map(
        |(i, (label, width))| {
            let text = if i <= 3 {
                label.to_string()
            } else {
                format!("{label:>w$}", w = *width as usize)
            };
            Cell::from(text).style(Style::default().add_modifier(Modifier::BOLD))
        },
    ))
    .height(1);

    let styles = column_styles(&model.styles);
    let body = rows.iter().map(|row| board_row(row, &styles));
    let constraints: Vec<Constraint> = WIDTHS.iter().map(|w| Constraint::Length(*w)).collect();
    let table = Table::new(body, constraints)
        .header(header)
        .block(block)
        .column_spacing(1);
    f.render_widget(table, area);
}

fn board_row(row: &BoardRow, styles: &[Style; 9]) -> Row<'static> {
    let right = |value: &str, width: u16| format!("{value:>w$}", w = width as usize);
    let cells = [
        row.callsign.clone(),
        format!(" {}", row.flag),
        truncate(&row.airline, WIDTHS[2] as usize),
        row.route.clone(),
        right(&row.heading, WIDTHS[4]),
        right(&row.distance, WIDTHS[5]),
        right(&row.altitude, WIDTHS[6]),
        right(&row.vertical_rate, WIDTHS[7]),
        right(&row.speed, WIDTHS[8]),
    ];
    Row::new(
        cells
            .into_iter()
            .zip(styles.iter())
            .map(|(text, style)| Cell::from(text).style(*style)),
    )
}

fn message_table<'a>(block: Block<'a>, first: &str, text: String, color: Color) -> Table<'a> {
    let row = Row::new(vec![
        Cell::from(first.to_string()).style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Cell::from(text).style(Style::default().fg(color)),
    ]);
    Table::new(vec![row], [Constraint::Length(WIDTHS[0]), Constraint::Min(10)])
        .block(block)
        .column_spacing(1)
}

fn render_help(f: &mut Frame, area: Rect, help: &HelpView) {
    let key = |k: &'static str, color: Color| {
        Span::styled(k, Style::default().fg(color).add_modifier(Modifier::BOLD))
    };
    let updated = help
        .updated
        .map(format_system_time)
        .unwrap_or_else(|| "--".to_string());
    let lines = vec![
        Line::from(format!("Updated: {updated}")),
        Line::from(""),
        Line::from(Span::styled(
            "Interactive Commands:",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![key("h", Color::Green), Span::raw(": Toggle this help")]),
        Line::from(vec![
            key("i", Color::Green),
            Span::raw(format!(
                ": Change update interval (Current: {}s)",
                help.interval_secs
            )),
        ]),
        Line::from(vec![
            key("n", Color::Green),
            Span::raw(format!(": Change lines displayed (Current: {})", help.rows)),
        ]),
        Line::from(vec![key("s", Color::Green), Span::raw(": Sort & reload airlines.txt")]),
        Line::from(vec![key("u", Color::Green), Span::raw(": Change dump1090 URL")]),
        Line::from(vec![key("q", Color::Red), Span::raw(": Quit")]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Green))
        .title("Help & Status");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_notification(f: &mut Frame, area: Rect, text: &str, kind: NoticeKind) {
    let (border, fg) = match kind {
        NoticeKind::Info => (Color::Blue, Color::Reset),
        NoticeKind::Error => (Color::Red, Color::Red),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .title("Status");
    let paragraph = Paragraph::new(Span::styled(text.to_string(), Style::default().fg(fg)))
        .block(block)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_editor(f: &mut Frame, area: Rect, editor: &EditorView) {
    let popup = centered_rect(60, 3, area);
    f.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Yellow))
        .title(editor.title);
    f.render_widget(Paragraph::new(editor.text.as_str()).block(block), popup);
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let height = height.min(area.height.saturating_sub(2)).max(3);
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(height),
            Constraint::Min(1),
        ])
        .split(area);
    let vertical = popup_layout[1];
    let width = (vertical.width * percent_x / 100).max(20).min(vertical.width);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(width),
            Constraint::Min(1),
        ])
        .split(vertical);
    horizontal[1]
}

fn column_styles(styles: &ColumnStyles) -> [Style; 9] {
    [
        parse_style_tag(&styles.callsign),
        parse_style_tag(&styles.flag),
        parse_style_tag(&styles.airline),
        parse_style_tag(&styles.route),
        parse_style_tag(&styles.heading),
        parse_style_tag(&styles.dist),
        parse_style_tag(&styles.alt),
        parse_style_tag(&styles.vr),
        parse_style_tag(&styles.speed),
    ]
}

/// Turns a tag such as `bold cyan` into a style. Unknown words are ignored.
pub fn parse_style_tag(tag: &str) -> Style {
    let mut style = Style::default();
    for word in tag.split_whitespace() {
        let word = word.to_ascii_lowercase();
        style = match word.as_str() {
            "bold" => style.add_modifier(Modifier::BOLD),
            "italic" => style.add_modifier(Modifier::ITALIC),
            "dim" => style.add_modifier(Modifier::DIM),
            "underline" => style.add_modifier(Modifier::UNDERLINED),
            other => match color_named(other) {
                Some(color) => style.fg(color),
                None => style,
            },
        };
    }
    style
}

fn color_named(name: &str) -> Option<Color> {
    let color = match name {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" => Color::White,
        "gray" | "grey" => Color::Gray,
        "bright_black" => Color::DarkGray,
        "bright_red" => Color::LightRed,
        "bright_green" => Color::LightGreen,
        "bright_yellow" => Color::LightYellow,
        "bright_blue" => Color::LightBlue,
        "bright_magenta" => Color::LightMagenta,
        "bright_cyan" => Color::LightCyan,
        "bright_white" => Color::White,
        _ => return None,
    };
    Some(color)
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn format_system_time(time: SystemTime) -> String {
    let dt: DateTime<Local> = time.into();
    dt.format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::{draw, parse_style_tag, truncate};
    use crate::app::{EditorView, FrameModel, HelpView, NoticeKind, TableView};
    use crate::rank::BoardRow;
    use crate::settings::ColumnStyles;
    use ratatui::backend::TestBackend;
    use ratatui::style::{Color, Modifier, Style};
    use ratatui::Terminal;

    fn model(table: TableView) -> FrameModel {
        FrameModel {
            title: "Flight Tracker: Bristol Airport".to_string(),
            source: "http://daphnis:8080/data/aircraft.json".to_string(),
            table,
            styles: ColumnStyles::default(),
            help: None,
            notification: None,
            editor: None,
            missing: Vec::new(),
        }
    }

    fn render(model: &FrameModel) -> String {
        let mut terminal = Terminal::new(TestBackend::new(110, 30)).unwrap();
        terminal.draw(|f| draw(f, model)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn style_tags() {
        assert_eq!(
            parse_style_tag("bold cyan"),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        );
        assert_eq!(parse_style_tag("white"), Style::default().fg(Color::White));
        assert_eq!(parse_style_tag("sparkly"), Style::default());
        assert_eq!(
            parse_style_tag("Italic  bright_red"),
            Style::default().fg(Color::LightRed).add_modifier(Modifier::ITALIC)
        );
    }

    #[test]
    fn truncates_long_names() {
        assert_eq!(truncate("Ryanair", 24), "Ryanair");
        assert_eq!(truncate("ABCDEFGH", 5), "ABCD…");
    }

    #[test]
    fn draws_rows_and_headers() {
        let row = BoardRow {
            callsign: "BAW12".to_string(),
            flag: "🇬🇧",
            airline: "British Airways".to_string(),
            route: "LHR/JFK".to_string(),
            heading: "270".to_string(),
            distance: "12.3".to_string(),
            altitude: "37,000".to_string(),
            vertical_rate: "+64".to_string(),
            speed: "450".to_string(),
            distance_nm: 12.3,
        };
        let text = render(&model(TableView::Rows(vec![row])));
        assert!(text.contains("Flight Tracker: Bristol Airport"));
        assert!(text.contains("Call Sign"));
        assert!(text.contains("Speed (kts)"));
        assert!(text.contains("BAW12"));
        assert!(text.contains("British Airways"));
        assert!(text.contains("37,000"));
    }

    #[test]
    fn draws_error_and_empty_rows() {
        let text = render(&model(TableView::Unavailable {
            url: "http://daphnis:8080/data/aircraft.json".to_string(),
        }));
        assert!(text.contains("ERROR"));
        assert!(text.contains("Could not connect to http://daphnis:8080/data/aircraft.json"));

        let text = render(&model(TableView::Empty));
        assert!(text.contains("No aircraft seen recently"));
    }

    #[test]
    fn draws_panels() {
        let mut m = model(TableView::Empty);
        m.help = Some(HelpView {
            updated: None,
            interval_secs: 5,
            rows: 15,
        });
        m.notification = Some(("Rows updated to 15".to_string(), NoticeKind::Info));
        m.editor = Some(EditorView {
            title: "Enter New Interval (1-60)",
            text: "3█".to_string(),
        });
        let text = render(&m);
        assert!(text.contains("Help & Status"));
        assert!(text.contains("Updated: --"));
        assert!(text.contains("(Current: 5s)"));
        assert!(text.contains("Rows updated to 15"));
        assert!(text.contains("Enter New Interval (1-60)"));
        assert!(text.contains("3█"));
    }
}
