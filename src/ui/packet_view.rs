use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::Widget,
};

use super::Colors;
use crate::editor::{FieldId, FieldRun, Line, Render};

/// バイトの所属
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Literal,
    Field { id: FieldId, computed: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// 2桁のHEX
    pub hex: String,
    pub role: Role,
}

impl Cell {
    fn byte(&self) -> u8 {
        u8::from_str_radix(&self.hex, 16).unwrap_or(0)
    }
}

/// 1行分のセル
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    /// 先頭バイト位置
    pub offset: usize,
    pub cells: Vec<Cell>,
}

/// [`Render`] の出力を行ごとのセルに集める
#[derive(Debug, Default)]
pub struct RowCollector {
    rows: Vec<Row>,
}

impl RowCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn push(&mut self, hex: &str, role: Role) {
        let Some(row) = self.rows.last_mut() else {
            return;
        };
        for i in (0..hex.len()).step_by(2) {
            row.cells.push(Cell {
                hex: hex[i..(i + 2).min(hex.len())].to_string(),
                role,
            });
        }
    }
}

impl Render for RowCollector {
    fn line_start(&mut self, line: &Line) {
        self.rows.push(Row { offset: line.offset(), cells: Vec::new() });
    }

    fn literal(&mut self, hex: &str) {
        self.push(hex, Role::Literal);
    }

    fn field(&mut self, run: FieldRun<'_>) {
        self.push(run.hex, Role::Field { id: run.id, computed: run.computed });
    }
}

/// パケット表示ウィジェット（アドレス・HEX・テキスト）
pub struct PacketView<'a> {
    rows: &'a [Row],
    /// 表示開始行
    top: usize,
    bytes_per_row: usize,
    cursor: usize,
    /// カーソル位置のフィールド
    current: Option<FieldId>,
    /// 直前の編集で変わったフィールド
    changed: &'a [FieldId],
}

impl<'a> PacketView<'a> {
    pub fn new(rows: &'a [Row]) -> Self {
        Self {
            rows,
            top: 0,
            bytes_per_row: 16,
            cursor: 0,
            current: None,
            changed: &[],
        }
    }

    pub fn top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    pub fn bytes_per_row(mut self, bytes: usize) -> Self {
        self.bytes_per_row = bytes;
        self
    }

    pub fn cursor(mut self, cursor: usize) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn current(mut self, current: Option<FieldId>) -> Self {
        self.current = current;
        self
    }

    pub fn changed(mut self, changed: &'a [FieldId]) -> Self {
        self.changed = changed;
        self
    }

    fn cell_style(&self, cell: &Cell, pos: usize) -> Style {
        if pos == self.cursor {
            return Style::default().bg(Colors::CURSOR_BG).fg(Colors::CURSOR);
        }
        match cell.role {
            Role::Literal => Style::default().fg(Colors::LITERAL),
            Role::Field { id, computed } => {
                let mut style = Style::default().fg(if computed { Colors::COMPUTED } else { Colors::FIELD });
                if self.changed.contains(&id) {
                    style = style.bg(Colors::CHANGED_BG);
                }
                if self.current == Some(id) {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                style
            }
        }
    }

    fn render_row(&self, row: &Row, area: Rect, buf: &mut Buffer) {
        let mut x = area.x;
        let y = area.y;

        let addr = format!("{:08X}", row.offset);
        buf.set_string(x, y, &addr, Style::default().fg(Colors::ADDR));
        x += addr.len() as u16 + 2;

        for (i, cell) in row.cells.iter().enumerate() {
            buf.set_string(x, y, cell.hex.to_uppercase(), self.cell_style(cell, row.offset + i));
            x += 3; // "XX "
        }

        // テキスト列の位置は行の長さによらず揃える
        x = area.x + addr.len() as u16 + 2 + self.bytes_per_row as u16 * 3 + 1;
        for (i, cell) in row.cells.iter().enumerate() {
            let byte = cell.byte();
            let ch = if (0x20..=0x7e).contains(&byte) { byte as char } else { '.' };
            let style = if row.offset + i == self.cursor {
                Style::default().bg(Colors::CURSOR_BG).fg(Colors::CURSOR)
            } else {
                Style::default().fg(Colors::ASCII_NORMAL)
            };
            buf.set_string(x, y, ch.to_string(), style);
            x += 1;
        }
    }
}

impl Widget for PacketView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 {
            return;
        }
        let header = format!(
            "{:8}  {}  {}",
            "Offset",
            (0..self.bytes_per_row)
                .map(|i| format!("{:02X}", i))
                .collect::<Vec<_>>()
                .join(" "),
            "Text"
        );
        buf.set_string(
            area.x,
            area.y,
            &header,
            Style::default().fg(Colors::HEADER).add_modifier(Modifier::BOLD),
        );

        let visible_rows = (area.height as usize).saturating_sub(1);
        for (i, row) in self.rows.iter().skip(self.top).take(visible_rows).enumerate() {
            let row_area = Rect {
                x: area.x,
                y: area.y + 1 + i as u16,
                width: area.width,
                height: 1,
            };
            self.render_row(row, row_area, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Document;
    use crate::editor::{Codec, Editor, Field, FixedField};

    #[test]
    fn test_collects_rows_by_role() {
        let fields = vec![Field::Fixed(FixedField::new("A", 1, 2, Codec::Hex))];
        let editor = Editor::new(Document::from_hex("0011223344").unwrap(), fields, 2).unwrap();
        let mut rows = RowCollector::new();
        editor.render(&mut rows);

        let rows = rows.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].offset, 2);
        let roles: Vec<Role> = rows.iter().flat_map(|r| r.cells.iter().map(|c| c.role)).collect();
        let field = Role::Field { id: 0, computed: false };
        assert_eq!(roles, vec![Role::Literal, field, field, Role::Literal, Role::Literal]);
        assert_eq!(rows[1].cells[0].hex, "22");
    }

    #[test]
    fn test_widget_draws_cursor_and_text() {
        let editor = Editor::new(Document::from_hex("48692e").unwrap(), Vec::new(), 4).unwrap();
        let mut rows = RowCollector::new();
        editor.render(&mut rows);

        let area = Rect::new(0, 0, 40, 3);
        let mut buf = Buffer::empty(area);
        PacketView::new(rows.rows()).bytes_per_row(4).cursor(1).render(area, &mut buf);

        // アドレス(8) + 空白(2) のあとにHEX
        assert_eq!(buf[(10, 1)].symbol(), "4");
        assert_eq!(buf[(13, 1)].bg, Colors::CURSOR_BG);
        // テキスト列は 8 + 2 + 4*3 + 1 = 23 から
        assert_eq!(buf[(23, 1)].symbol(), "H");
        assert_eq!(buf[(24, 1)].symbol(), "i");
    }
}
