use crate::application::{App, AppMode, DocumentSource};
use crate::infrastructure::export_table;
use crossterm::event::{KeyCode, KeyModifiers};

use super::ui::help_line_count;

pub struct InputHandler;

impl InputHandler {
    pub fn handle_key_event<S: DocumentSource>(app: &mut App<S>, key: KeyCode, modifiers: KeyModifiers) {
        match app.mode {
            AppMode::Normal => Self::handle_normal_mode(app, key, modifiers),
            AppMode::Help => Self::handle_help_mode(app, key),
        }
    }

    fn handle_normal_mode<S: DocumentSource>(app: &mut App<S>, key: KeyCode, _modifiers: KeyModifiers) {
        app.status_message = None;

        match key {
            KeyCode::Up | KeyCode::Char('k') => app.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => app.select_next(),
            KeyCode::PageUp => app.scroll_preview(-10),
            KeyCode::PageDown => app.scroll_preview(10),
            KeyCode::Char('r') => app.recalculate_selected(),
            KeyCode::Char('e') => Self::export_selected(app),
            KeyCode::Char('?') | KeyCode::F(1) => app.show_help(),
            _ => {}
        }
    }

    fn export_selected<S: DocumentSource>(app: &mut App<S>) {
        let Some((name, lines)) = app.selected_table() else {
            app.status_message = Some("No formula table to export".to_string());
            return;
        };
        let path = app.export_dir.join(format!("{name}.csv"));
        let result = export_table(&lines, &path)
            .map(|()| path.display().to_string())
            .map_err(|err| err.to_string());
        app.set_export_result(result);
    }

    fn handle_help_mode<S: DocumentSource>(app: &mut App<S>, key: KeyCode) {
        let last_line = help_line_count().saturating_sub(1);
        match key {
            KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('?') | KeyCode::Char('q') => {
                app.hide_help();
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.help_scroll = app.help_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                app.help_scroll = (app.help_scroll + 1).min(last_line);
            }
            KeyCode::PageUp => {
                app.help_scroll = app.help_scroll.saturating_sub(5);
            }
            KeyCode::PageDown => {
                app.help_scroll = (app.help_scroll + 5).min(last_line);
            }
            KeyCode::Home => {
                app.help_scroll = 0;
            }
            _ => {}
        }
    }
}
