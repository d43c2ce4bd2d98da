use crate::application::{App, AppMode, DocumentSource};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

pub fn render_ui<S: DocumentSource>(f: &mut Frame, app: &App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(chunks[1]);
    render_documents(f, app, panes[0]);
    render_preview(f, app, panes[1]);

    render_status_bar(f, app, chunks[2]);

    if matches!(app.mode, AppMode::Help) {
        render_help_popup(f, app.help_scroll);
    }
}

fn render_header<S: DocumentSource>(f: &mut Frame, app: &App<S>, area: Rect) {
    let settings = app.recalc.settings();
    let header = Paragraph::new(format!(
        "tablemath | {} documents with tables | {} indexed | precision {} | {}",
        app.documents.len(),
        app.recalc.index().entries().len(),
        settings.precision,
        settings.locale
    ))
    .style(Style::default().fg(Color::Cyan));
    f.render_widget(header, area);
}

fn render_documents<S: DocumentSource>(f: &mut Frame, app: &App<S>, area: Rect) {
    let items: Vec<ListItem> = app
        .documents
        .iter()
        .map(|id| {
            let published = app.recalc.index().variables(&id.name).map_or(0, |set| set.len());
            let label = if published > 0 {
                format!("{} ({published})", id.name)
            } else {
                id.name.clone()
            };
            ListItem::new(label)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Documents"))
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD));

    let mut state = ListState::default();
    if !app.documents.is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn render_preview<S: DocumentSource>(f: &mut Frame, app: &App<S>, area: Rect) {
    let title = app
        .selected_document()
        .map_or_else(|| "Preview".to_string(), |id| id.name.clone());
    let scroll = u16::try_from(app.preview_scroll).unwrap_or(u16::MAX);

    let preview = Paragraph::new(app.preview())
        .block(Block::default().borders(Borders::ALL).title(title))
        .scroll((scroll, 0));
    f.render_widget(preview, area);
}

fn status_text<S: DocumentSource>(app: &App<S>) -> String {
    if let Some(progress) = app.indexing_progress() {
        return format!("Indexing {}/{} documents...", progress.visited, progress.total);
    }
    if let Some(ref status) = app.status_message {
        return status.clone();
    }
    if let Some(ref last) = app.last_recalc {
        return format!(
            "Last recompute: {} ({} tables, {} reused, {} variables)",
            last.document, last.outcome.tables_processed, last.outcome.tables_reused, last.outcome.variables
        );
    }
    "j/k: select | r: recompute | e: export CSV | ?: help | q: quit".to_string()
}

fn render_status_bar<S: DocumentSource>(f: &mut Frame, app: &App<S>, area: Rect) {
    let (text, style) = match app.mode {
        AppMode::Normal => (status_text(app), Style::default()),
        AppMode::Help => (
            "↑↓/jk: scroll | PgUp/PgDn: fast scroll | Home: top | Esc/q: close help".to_string(),
            Style::default().fg(Color::Cyan),
        ),
    };

    let status = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(style);
    f.render_widget(status, area);
}

fn render_help_popup(f: &mut Frame, scroll: usize) {
    let area = f.area();
    let popup_area = Rect {
        x: area.width / 10,
        y: area.height / 10,
        width: area.width * 4 / 5,
        height: area.height * 4 / 5,
    };

    f.render_widget(Clear, popup_area);

    let help_lines: Vec<&str> = HELP_TEXT.lines().collect();
    let visible_height = popup_area.height.saturating_sub(2) as usize;

    let start_line = scroll.min(help_lines.len().saturating_sub(visible_height));
    let end_line = (start_line + visible_height).min(help_lines.len());

    let visible_text = help_lines[start_line..end_line].join("\n");

    let help_widget = Paragraph::new(visible_text)
        .block(Block::default()
            .borders(Borders::ALL)
            .title(format!("tablemath Formula Help (Line {}/{})", start_line + 1, help_lines.len()))
            .style(Style::default().fg(Color::Cyan)))
        .style(Style::default().fg(Color::White));

    f.render_widget(help_widget, popup_area);
}

/// Number of lines in the help text, for scroll clamping.
pub fn help_line_count() -> usize {
    HELP_TEXT.lines().count()
}

const HELP_TEXT: &str = r#"TABLEMATH FORMULA REFERENCE

=== BASIC CONCEPTS ===
• A table cell whose text starts with = is a formula
• Results replace the formula in the rendered table
• A failed formula is shown unchanged
• Function names are case insensitive

=== ARITHMETIC ===
+ - * /         Usual precedence, parentheses group
=2+3*4 → 14     =(2+3)*4 → 20     =10/0 → shown unchanged

=== AGGREGATES ===
SUM(row)        Sum of the other numeric cells in this row
SUM(col)        Sum of the other numeric cells in this column
AVG(...)        Average     MIN(...) Minimum     MAX(...) Maximum
SUM(col,data)   Ignore cells that are themselves formulas
SUM(col,USD)    Format the result as currency
Functions cannot be nested: =SUM(MAX(row)) is rejected

=== CROSS-DOCUMENT REFERENCES ===
NOTE("Budget").total
                Value published by document Budget under "total"
                A row publishes its last cell under its first cell's
                label: | **Total Cost** | 1500 | → total_cost

=== EXAMPLES ===
| Item  | Cost           |
| ----- | -------------- |
| Rent  | 1000           |
| Food  | 500            |
| Total | =SUM(col, USD) |   → $1,500.00

=== KEYS ===
j/k or ↑↓       Select document
PgUp/PgDn       Scroll preview
r               Recompute selected document from scratch
e               Export first formula table to <name>.csv
?               Show this help
q               Quit

=== HELP NAVIGATION ===
↑↓ or j/k       Scroll help text up/down one line
Page Up/Down    Scroll help text up/down 5 lines
Home            Jump to top of help text
Esc/?/q         Close this help window"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{CrossDocumentIndex, MemoryDocuments, MemoryStore, Recalculator};
    use crate::domain::Settings;
    use ratatui::{backend::TestBackend, Terminal};

    fn app() -> App<MemoryDocuments> {
        let mut documents = MemoryDocuments::new();
        documents.insert("Budget", "| Rent | 1000 |\n| Total | =SUM(col) |");
        let index = CrossDocumentIndex::new(Box::new(MemoryStore::new()));
        App::new(Recalculator::new(Settings::default(), index), documents)
    }

    fn screen(app: &App<MemoryDocuments>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| render_ui(f, app)).unwrap();
        terminal.backend().buffer().content.iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn test_status_shows_indexing_then_hint() {
        let mut app = app();
        assert!(status_text(&app).starts_with("Indexing 0/1"));
        app.run_indexing();
        app.status_message = None;
        assert!(status_text(&app).starts_with("j/k: select"));
    }

    #[test]
    fn test_renders_documents_and_preview() {
        let mut app = app();
        app.run_indexing();
        let text = screen(&app);
        assert!(text.contains("Budget (2)"));
        assert!(text.contains("| Total | 1,000 |"));
    }

    #[test]
    fn test_help_popup() {
        let mut app = app();
        app.show_help();
        assert!(screen(&app).contains("Formula Help"));
        assert!(help_line_count() > 10);
    }
}
