mod field_panel;
mod packet_view;

pub use field_panel::FieldPanel;
pub use packet_view::{Cell, PacketView, Role, Row, RowCollector};

use ratatui::style::Color;

/// 配色
pub struct Colors;

impl Colors {
    pub const HEADER: Color = Color::Cyan;
    pub const ADDR: Color = Color::DarkGray;
    /// フィールドに属さないバイト
    pub const LITERAL: Color = Color::Gray;
    /// 編集できるフィールド
    pub const FIELD: Color = Color::Green;
    /// 計算フィールド
    pub const COMPUTED: Color = Color::Yellow;
    /// 直前の編集で値が変わったフィールド
    pub const CHANGED_BG: Color = Color::Rgb(80, 60, 0);
    pub const CURSOR: Color = Color::Black;
    pub const CURSOR_BG: Color = Color::White;
    pub const ASCII_NORMAL: Color = Color::White;
    pub const LABEL: Color = Color::Blue;
    pub const ERROR: Color = Color::Red;
}
