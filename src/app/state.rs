use std::fmt::Display;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::debug;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::Paragraph,
};

use super::{Action, InputState, KeyMod, PrefixKey};
use crate::editor::{EditError, Editor, EditorEvent, FieldId, Settlement};
use crate::ui::{Colors, FieldPanel, PacketView, RowCollector};

/// フィールド編集プロンプト
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldPrompt {
    id: FieldId,
    input: String,
}

/// アプリケーション状態
pub struct App {
    editor: Editor,
    /// カーソル位置（バイト）
    cursor: usize,
    /// 表示開始行
    top: usize,
    /// 表示可能な行数
    visible_rows: usize,
    input_state: InputState,
    /// プレフィックスキー状態（C-x等）
    prefix_key: PrefixKey,
    prompt: Option<FieldPrompt>,
    /// 終了確認中
    confirm_quit: bool,
    should_quit: bool,
    status_message: Option<String>,
    /// ステータスメッセージがエラーか
    status_is_error: bool,
    /// 直前の編集で値が変わったフィールド
    changed: Vec<FieldId>,
}

impl App {
    pub fn new(editor: Editor) -> Self {
        Self {
            editor,
            cursor: 0,
            top: 0,
            visible_rows: 24,
            input_state: InputState::Normal,
            prefix_key: PrefixKey::None,
            prompt: None,
            confirm_quit: false,
            should_quit: false,
            status_message: None,
            status_is_error: false,
            changed: Vec::new(),
        }
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn status_is_error(&self) -> bool {
        self.status_is_error
    }

    /// エラーをステータス行に表示する
    pub fn show_error(&mut self, e: impl Display) {
        self.set_error_status(format!("Error: {e}"));
    }

    fn set_error_status(&mut self, message: String) {
        self.status_message = Some(message);
        self.status_is_error = true;
    }

    fn clear_status(&mut self) {
        self.status_message = None;
        self.status_is_error = false;
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn filename(&self) -> Option<&str> {
        self.editor.document().filename()
    }

    pub fn is_modified(&self) -> bool {
        self.editor.document().is_modified()
    }

    pub fn set_visible_rows(&mut self, rows: usize) {
        self.visible_rows = rows.saturating_sub(2).max(1); // ヘッダー + ステータスバー
    }

    fn bytes_per_row(&self) -> usize {
        self.editor.bytes_per_row()
    }

    /// カーソルが取り得る最後の位置
    fn last_pos(&self) -> usize {
        self.editor.document().len().saturating_sub(1)
    }

    fn cursor_up(&mut self) {
        if self.cursor >= self.bytes_per_row() {
            self.cursor -= self.bytes_per_row();
        }
    }

    fn cursor_down(&mut self) {
        let new_pos = self.cursor + self.bytes_per_row();
        if new_pos <= self.last_pos() {
            self.cursor = new_pos;
        }
    }

    fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn cursor_right(&mut self) {
        if self.cursor < self.last_pos() {
            self.cursor += 1;
        }
    }

    fn cursor_home(&mut self) {
        self.cursor = (self.cursor / self.bytes_per_row()) * self.bytes_per_row();
    }

    fn cursor_end(&mut self) {
        let row_start = (self.cursor / self.bytes_per_row()) * self.bytes_per_row();
        self.cursor = (row_start + self.bytes_per_row() - 1).min(self.last_pos());
    }

    fn page_up(&mut self) {
        let page_size = self.visible_rows * self.bytes_per_row();
        self.cursor = self.cursor.saturating_sub(page_size);
    }

    fn page_down(&mut self) {
        let page_size = self.visible_rows * self.bytes_per_row();
        self.cursor = (self.cursor + page_size).min(self.last_pos());
    }

    /// カーソル位置が表示範囲内になるようにスクロール
    fn ensure_cursor_visible(&mut self) {
        let cursor_row = self.cursor / self.bytes_per_row();
        if cursor_row < self.top {
            self.top = cursor_row;
        } else if cursor_row >= self.top + self.visible_rows {
            self.top = cursor_row + 1 - self.visible_rows;
        }
    }

    /// 配置済みフィールドの先頭位置（位置順）
    fn field_starts(&self) -> Vec<usize> {
        let mut starts: Vec<usize> = self
            .editor
            .fields()
            .iter()
            .enumerate()
            .filter(|(id, _)| self.editor.is_attached(*id))
            .map(|(_, f)| f.offset())
            .filter(|&offset| offset <= self.last_pos())
            .collect();
        starts.sort_unstable();
        starts
    }

    fn next_field(&mut self) {
        if let Some(&pos) = self.field_starts().iter().find(|&&p| p > self.cursor) {
            self.cursor = pos;
        }
    }

    fn prev_field(&mut self) {
        if let Some(&pos) = self.field_starts().iter().rev().find(|&&p| p < self.cursor) {
            self.cursor = pos;
        }
    }

    /// 編集結果をステータスとハイライトに反映する
    fn finish_edit(&mut self, result: Result<Settlement, EditError>) {
        let events = self.editor.take_events();
        self.changed.clear();
        for event in &events {
            if let EditorEvent::FieldChanged(id) = *event {
                if !self.changed.contains(&id) {
                    self.changed.push(id);
                }
            }
        }
        self.cursor = self.cursor.min(self.last_pos());

        match result {
            Ok(settlement) if settlement.changed.is_empty() => {}
            Ok(settlement) => {
                let labels: Vec<&str> = settlement
                    .changed
                    .iter()
                    .filter_map(|&id| self.editor.field(id).map(|f| f.label()))
                    .collect();
                self.status_message = Some(format!("Updated: {}", labels.join(", ")));
            }
            Err(e) => {
                debug!("edit failed: {}", e);
                self.changed.clear();
                self.show_error(e);
            }
        }
    }

    /// HEX入力処理（2桁目でバイトを確定する）
    fn input_hex(&mut self, ch: char) {
        let Some(digit) = ch.to_digit(16) else {
            return;
        };
        let digit = digit as u8;
        if self.editor.document().is_empty() {
            return;
        }

        match self.input_state {
            InputState::Normal => {
                self.input_state = InputState::HexFirstDigit(digit);
            }
            InputState::HexFirstDigit(first) => {
                self.input_state = InputState::Normal;
                let result = self.editor.set_byte(self.cursor, (first << 4) | digit);
                let ok = result.is_ok();
                self.finish_edit(result);
                if ok {
                    self.cursor_right();
                }
            }
        }
    }

    /// カーソル位置のフィールドの編集を開始する
    fn start_field_edit(&mut self) {
        let Some(id) = self.editor.field_at(self.cursor) else {
            self.status_message = Some("No field at cursor".to_string());
            return;
        };
        let field = &self.editor.fields()[id];
        if field.is_computed() {
            self.status_message = Some(format!("'{}' is computed", field.label()));
            return;
        }
        let input = field.display_text().unwrap_or_default();
        self.prompt = Some(FieldPrompt { id, input });
    }

    pub fn execute(&mut self, action: Action) {
        // ステータスメッセージをクリア（一部のアクションを除く）
        if !matches!(action, Action::EnterCtrlX) {
            self.clear_status();
        }
        if !matches!(action, Action::InputHex(_)) {
            self.input_state = InputState::Normal;
        }

        match action {
            Action::Quit => {
                if self.is_modified() {
                    self.confirm_quit = true;
                } else {
                    self.should_quit = true;
                }
            }
            Action::Save => {
                if let Err(e) = self.editor.save() {
                    self.set_error_status(format!("Save failed: {}", e));
                } else {
                    self.status_message = Some("Saved".to_string());
                }
            }
            Action::CursorUp => self.cursor_up(),
            Action::CursorDown => self.cursor_down(),
            Action::CursorLeft => self.cursor_left(),
            Action::CursorRight => self.cursor_right(),
            Action::CursorHome => self.cursor_home(),
            Action::CursorEnd => self.cursor_end(),
            Action::PageUp => self.page_up(),
            Action::PageDown => self.page_down(),
            Action::GotoBeginning => self.cursor = 0,
            Action::GotoEnd => self.cursor = self.last_pos(),
            Action::NextField => self.next_field(),
            Action::PrevField => self.prev_field(),
            Action::InputHex(ch) => self.input_hex(ch),
            Action::EditField => self.start_field_edit(),
            Action::Recompute => {
                let result = self.editor.recompute();
                self.finish_edit(result);
                if self.status_message.is_none() {
                    self.status_message = Some("Fields are consistent".to_string());
                }
            }
            Action::EnterCtrlX => {
                self.prefix_key = PrefixKey::CtrlX;
                self.status_message = Some("C-x-".to_string());
            }
            Action::Cancel => {
                self.prefix_key = PrefixKey::None;
                self.status_message = Some("Quit".to_string());
            }
            Action::Undo => {
                if let Some(pos) = self.editor.undo() {
                    self.cursor = pos.min(self.last_pos());
                    self.changed.clear();
                    self.editor.take_events();
                    self.status_message = Some("Undo".to_string());
                } else {
                    self.status_message = Some("Nothing to undo".to_string());
                }
            }
            Action::Redo => {
                if let Some(pos) = self.editor.redo() {
                    self.cursor = pos.min(self.last_pos());
                    self.changed.clear();
                    self.editor.take_events();
                    self.status_message = Some("Redo".to_string());
                } else {
                    self.status_message = Some("Nothing to redo".to_string());
                }
            }
            Action::None => {}
        }
        self.ensure_cursor_visible();
    }

    /// イベントを処理
    pub fn handle_event(&mut self) -> Result<()> {
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    self.handle_key(key);
                }
            }
        }
        Ok(())
    }

    /// キー入力を処理
    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.prompt.is_some() {
            self.handle_prompt_key(key);
            return;
        }
        if self.confirm_quit {
            self.handle_confirm_key(key);
            return;
        }

        let mods = KeyMod {
            ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
            shift: key.modifiers.contains(KeyModifiers::SHIFT),
            alt: key.modifiers.contains(KeyModifiers::ALT),
        };

        let action = match self.prefix_key {
            PrefixKey::None => Action::from_key(key.code, mods),
            PrefixKey::CtrlX => {
                self.prefix_key = PrefixKey::None;
                Action::from_key_after_ctrl_x(key.code, mods)
            }
        };

        if action != Action::None {
            self.execute(action);
        } else if let KeyCode::Char(ch) = key.code {
            if !mods.ctrl && !mods.alt {
                self.execute(Action::InputHex(ch));
            }
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };

        match key.code {
            KeyCode::Esc => self.cancel_prompt(),
            KeyCode::Char('g') if ctrl => self.cancel_prompt(),
            KeyCode::Enter => {
                if let Some(FieldPrompt { id, input }) = self.prompt.take() {
                    self.clear_status();
                    let result = self.editor.edit_field(id, &input);
                    self.finish_edit(result);
                }
            }
            KeyCode::Backspace => {
                prompt.input.pop();
            }
            KeyCode::Char('u') if ctrl => prompt.input.clear(),
            KeyCode::Char(ch) if !ctrl => prompt.input.push(ch),
            _ => {}
        }
    }

    fn cancel_prompt(&mut self) {
        self.prompt = None;
        self.status_message = Some("Cancelled".to_string());
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            // y: 保存して終了
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.confirm_quit = false;
                if let Err(e) = self.editor.save() {
                    self.set_error_status(format!("Save failed: {}", e));
                    return;
                }
                self.should_quit = true;
            }
            // n: 保存せずに終了
            KeyCode::Char('n') | KeyCode::Char('N') => {
                self.confirm_quit = false;
                self.should_quit = true;
            }
            KeyCode::Char('c') | KeyCode::Char('C') | KeyCode::Esc => {
                self.confirm_quit = false;
                self.status_message = Some("Cancelled".to_string());
            }
            KeyCode::Char('g') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.confirm_quit = false;
                self.status_message = Some("Cancelled".to_string());
            }
            _ => {}
        }
    }

    fn status_line(&self) -> String {
        let document = self.editor.document();
        let filename = document.filename().unwrap_or("[New]");
        let modified = if document.is_modified() { "[+]" } else { "" };
        let readonly = if document.is_readonly() { " [RO]" } else { "" };

        if let Some(prompt) = &self.prompt {
            let label = self.editor.field(prompt.id).map(|f| f.label()).unwrap_or("");
            format!("{}: {}_", label, prompt.input)
        } else if self.confirm_quit {
            "Save changes? (y)es (n)o (c)ancel".to_string()
        } else if let Some(ref msg) = self.status_message {
            format!(" {}{}{} | {}", filename, modified, readonly, msg)
        } else {
            let field = self
                .editor
                .field_at(self.cursor)
                .and_then(|id| self.editor.field(id))
                .map(|f| f.label())
                .unwrap_or("-");
            let pending = match self.input_state {
                InputState::HexFirstDigit(d) => format!(" | {:X}_", d),
                InputState::Normal => String::new(),
            };
            format!(
                " {}{}{} | {:08X}/{:08X} | {}{}",
                filename,
                modified,
                readonly,
                self.cursor,
                document.len(),
                field,
                pending,
            )
        }
    }

    /// UIを描画
    pub fn draw(&mut self, frame: &mut Frame) {
        let size = frame.area();
        self.set_visible_rows(size.height as usize);
        self.ensure_cursor_visible();

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // メイン
                Constraint::Length(1), // ステータス
            ])
            .split(size);

        let packet_width = (8 + 2 + self.bytes_per_row() * 4 + 1) as u16;
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(packet_width + 2), Constraint::Min(10)])
            .split(layout[0]);

        let mut rows = RowCollector::new();
        self.editor.render(&mut rows);
        let current = self.editor.field_at(self.cursor);

        let packet_view = PacketView::new(rows.rows())
            .top(self.top)
            .bytes_per_row(self.bytes_per_row())
            .cursor(self.cursor)
            .current(current)
            .changed(&self.changed);
        frame.render_widget(packet_view, columns[0]);

        let panel = FieldPanel::new(&self.editor).current(current).changed(&self.changed);
        frame.render_widget(panel, columns[1]);

        let status_bg = if self.status_is_error { Colors::ERROR } else { Color::DarkGray };
        let status_widget =
            Paragraph::new(self.status_line()).style(Style::default().bg(status_bg).fg(Color::White));
        frame.render_widget(status_widget, layout[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Document;
    use crate::layout::{DEFAULT_PACKET, LayoutConfig};

    fn app() -> App {
        let layout = LayoutConfig::udp_ipv4();
        let document = Document::from_hex(DEFAULT_PACKET).unwrap();
        App::new(Editor::new(document, layout.to_fields(), 16).unwrap())
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn ctrl(app: &mut App, ch: char) {
        app.handle_key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL));
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    #[test]
    fn test_hex_typing_edits_byte_and_settles() {
        let mut app = app();
        // TTL (8バイト目)
        for _ in 0..8 {
            press(&mut app, KeyCode::Right);
        }
        type_text(&mut app, "2");
        assert_eq!(app.editor().document().get(8), Some(0x40));
        type_text(&mut app, "0");
        assert_eq!(app.editor().document().get(8), Some(0x20));
        assert_eq!(app.cursor(), 9);
        assert!(app.status_message().unwrap().contains("Header Checksum"));
        assert!(app.is_modified());
    }

    #[test]
    fn test_field_prompt_edit() {
        let mut app = app();
        app.execute(Action::GotoBeginning);
        for _ in 0..7 {
            app.execute(Action::NextField);
        }
        // Source Port (20)
        assert_eq!(app.cursor(), 20);
        press(&mut app, KeyCode::Enter);
        ctrl(&mut app, 'u');
        type_text(&mut app, "53");
        press(&mut app, KeyCode::Enter);
        assert_eq!(&app.editor().buffer()[40..44], "0035");
        assert!(app.status_message().unwrap().contains("UDP Checksum"));

        // 不正な入力はエラー表示のみ
        press(&mut app, KeyCode::Enter);
        ctrl(&mut app, 'u');
        type_text(&mut app, "99999");
        press(&mut app, KeyCode::Enter);
        assert!(app.status_message().unwrap().starts_with("Error"));
        assert!(app.status_is_error());
        assert_eq!(&app.editor().buffer()[40..44], "0035");

        // 次の操作でエラー表示は消える
        app.execute(Action::CursorRight);
        assert!(app.status_message().is_none());
        assert!(!app.status_is_error());
    }

    #[test]
    fn test_computed_field_refuses_prompt() {
        let mut app = app();
        // Total Length (2)
        app.execute(Action::CursorRight);
        app.execute(Action::CursorRight);
        press(&mut app, KeyCode::Enter);
        assert!(app.status_message().unwrap().contains("computed"));
        assert!(app.prompt.is_none());
    }

    #[test]
    fn test_undo_and_quit_confirmation() {
        let mut app = app();
        type_text(&mut app, "46");
        assert!(app.is_modified());
        ctrl(&mut app, 'u');
        assert_eq!(app.editor().buffer(), DEFAULT_PACKET);

        type_text(&mut app, "46");
        ctrl(&mut app, 'x');
        ctrl(&mut app, 'c');
        assert!(!app.should_quit());
        press(&mut app, KeyCode::Char('c'));
        assert!(!app.should_quit());
        ctrl(&mut app, 'x');
        ctrl(&mut app, 'c');
        press(&mut app, KeyCode::Char('n'));
        assert!(app.should_quit());
    }

    #[test]
    fn test_readonly_rejects_typing() {
        let mut app = app();
        app.editor.set_readonly(true);
        type_text(&mut app, "ff");
        assert_eq!(app.editor().buffer(), DEFAULT_PACKET);
        assert!(app.status_message().unwrap().starts_with("Error"));
        assert!(app.status_is_error());
        assert!(!app.is_modified());
    }

    #[test]
    fn test_error_status_is_drawn_in_error_colour() {
        use ratatui::{Terminal, backend::TestBackend};

        let mut app = app();
        app.show_error("computed fields still changing");
        let mut terminal = Terminal::new(TestBackend::new(120, 10)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();
        let buffer = terminal.backend().buffer();
        assert_eq!(buffer[(0, 9)].bg, Colors::ERROR);

        app.execute(Action::CursorRight);
        terminal.draw(|f| app.draw(f)).unwrap();
        assert_eq!(terminal.backend().buffer()[(0, 9)].bg, Color::DarkGray);
    }
}
