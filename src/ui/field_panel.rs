use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::Widget,
};
use unicode_width::UnicodeWidthStr;

use super::Colors;
use crate::editor::{Editor, FieldId};

/// フィールド一覧（ラベルと変換後の値）
pub struct FieldPanel<'a> {
    editor: &'a Editor,
    current: Option<FieldId>,
    changed: &'a [FieldId],
}

impl<'a> FieldPanel<'a> {
    pub fn new(editor: &'a Editor) -> Self {
        Self {
            editor,
            current: None,
            changed: &[],
        }
    }

    pub fn current(mut self, current: Option<FieldId>) -> Self {
        self.current = current;
        self
    }

    pub fn changed(mut self, changed: &'a [FieldId]) -> Self {
        self.changed = changed;
        self
    }

    /// 表示する値
    fn value_text(&self, id: FieldId) -> String {
        if !self.editor.is_attached(id) {
            return "-".to_string();
        }
        match self.editor.fields()[id].display_text() {
            Ok(text) => text,
            Err(e) => format!("<{}>", e),
        }
    }
}

impl Widget for FieldPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let fields = self.editor.fields();
        let label_width = fields.iter().map(|f| f.label().width()).max().unwrap_or(0);

        for (id, field) in fields.iter().enumerate().take(area.height as usize) {
            let y = area.y + id as u16;
            let marker = if field.is_computed() { "*" } else { " " };
            let mut label_style = Style::default().fg(Colors::LABEL);
            if self.current == Some(id) {
                label_style = label_style.add_modifier(Modifier::REVERSED);
            }
            let label = format!("{}{}", marker, field.label());
            let written = buf.set_stringn(area.x, y, &label, area.width as usize, label_style);

            let value_x = area.x + (label_width + 3) as u16;
            if value_x >= area.x + area.width || written.0 > value_x {
                continue;
            }
            let mut value_style = Style::default().fg(if field.is_computed() {
                Colors::COMPUTED
            } else {
                Colors::FIELD
            });
            if self.changed.contains(&id) {
                value_style = value_style.bg(Colors::CHANGED_BG);
            }
            let max = (area.x + area.width - value_x) as usize;
            buf.set_stringn(value_x, y, self.value_text(id), max, value_style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Document;
    use crate::layout::{DEFAULT_PACKET, LayoutConfig};

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width).map(|x| buf[(x, y)].symbol()).collect::<String>()
    }

    #[test]
    fn test_lists_labels_and_values() {
        let layout = LayoutConfig::udp_ipv4();
        let editor = Editor::new(Document::from_hex(DEFAULT_PACKET).unwrap(), layout.to_fields(), 16).unwrap();

        let area = Rect::new(0, 0, 40, 12);
        let mut buf = Buffer::empty(area);
        FieldPanel::new(&editor).render(area, &mut buf);

        assert!(row_text(&buf, 1).starts_with("*Total Length"));
        assert!(row_text(&buf, 1).contains("39"));
        assert!(row_text(&buf, 5).contains("10.0.0.1"));
        assert!(row_text(&buf, 11).contains("hello world"));
    }
}
