mod state;

pub use state::App;

use crossterm::event::KeyCode;

/// 入力状態（HEX入力は2桁で1バイト）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputState {
    #[default]
    Normal,
    /// HEX入力の1桁目を入力済み
    HexFirstDigit(u8),
}

/// プレフィックスキー状態（Emacs 2ストローク用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixKey {
    #[default]
    None,
    /// C-x を押した状態
    CtrlX,
}

/// アプリケーションアクション
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Save,

    // カーソル移動
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    CursorHome,
    CursorEnd,
    PageUp,
    PageDown,
    GotoBeginning,  // M-< バッファ先頭
    GotoEnd,        // M-> バッファ末尾
    NextField,      // Tab
    PrevField,      // Shift+Tab

    // 編集
    InputHex(char),
    EditField,      // Enter: カーソル位置のフィールドを編集
    Recompute,      // C-l: 計算フィールドを再計算

    Undo,
    Redo,

    // プレフィックスキー
    EnterCtrlX,  // C-x を押した
    Cancel,      // C-g でキャンセル

    None,
}

/// キー修飾子
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyMod {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Action {
    /// キーコードからアクションに変換（Emacsキーバインド）
    pub fn from_key(key: KeyCode, mods: KeyMod) -> Self {
        let KeyMod { ctrl, shift, alt } = mods;

        match (key, ctrl, alt, shift) {
            // C-x: プレフィックスキーモードへ
            (KeyCode::Char('x'), true, false, false) => Action::EnterCtrlX,

            // C-g: キャンセル
            (KeyCode::Char('g'), true, false, false) => Action::Cancel,
            (KeyCode::Esc, _, _, _) => Action::Cancel,

            // === Emacsカーソル移動 ===
            (KeyCode::Char('f'), true, false, false) => Action::CursorRight,
            (KeyCode::Char('b'), true, false, false) => Action::CursorLeft,
            (KeyCode::Char('n'), true, false, false) => Action::CursorDown,
            (KeyCode::Char('p'), true, false, false) => Action::CursorUp,
            (KeyCode::Char('a'), true, false, false) => Action::CursorHome,
            (KeyCode::Char('e'), true, false, false) => Action::CursorEnd,
            (KeyCode::Char('v'), true, false, false) => Action::PageDown,
            (KeyCode::Char('v'), false, true, false) => Action::PageUp,
            (KeyCode::Char('<'), false, true, _) => Action::GotoBeginning,
            (KeyCode::Char('>'), false, true, _) => Action::GotoEnd,

            (KeyCode::Up, false, false, _) => Action::CursorUp,
            (KeyCode::Down, false, false, _) => Action::CursorDown,
            (KeyCode::Left, false, false, _) => Action::CursorLeft,
            (KeyCode::Right, false, false, _) => Action::CursorRight,
            (KeyCode::Home, _, _, _) => Action::CursorHome,
            (KeyCode::End, _, _, _) => Action::CursorEnd,
            (KeyCode::PageUp, _, _, _) => Action::PageUp,
            (KeyCode::PageDown, _, _, _) => Action::PageDown,

            // フィールド単位の移動
            (KeyCode::Tab, false, false, false) => Action::NextField,
            (KeyCode::BackTab, _, _, _) => Action::PrevField,

            (KeyCode::Enter, false, false, _) => Action::EditField,
            (KeyCode::Char('l'), true, false, false) => Action::Recompute,

            // Undo: C-u (ze style)
            (KeyCode::Char('u'), true, false, false) => Action::Undo,
            // Redo: C-/ (ze style)
            (KeyCode::Char('/'), true, false, false) => Action::Redo,

            _ => Action::None,
        }
    }

    /// C-x の後のキーを処理
    pub fn from_key_after_ctrl_x(key: KeyCode, mods: KeyMod) -> Self {
        let KeyMod { ctrl, .. } = mods;

        match (key, ctrl) {
            // C-x C-c: 終了
            (KeyCode::Char('c'), true) => Action::Quit,
            // C-x C-s: 保存
            (KeyCode::Char('s'), true) => Action::Save,
            _ => Action::Cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl() -> KeyMod {
        KeyMod { ctrl: true, ..KeyMod::default() }
    }

    #[test]
    fn test_emacs_keys() {
        assert_eq!(Action::from_key(KeyCode::Char('u'), ctrl()), Action::Undo);
        assert_eq!(Action::from_key(KeyCode::Char('/'), ctrl()), Action::Redo);
        assert_eq!(Action::from_key(KeyCode::Char('x'), ctrl()), Action::EnterCtrlX);
        assert_eq!(Action::from_key(KeyCode::Enter, KeyMod::default()), Action::EditField);
        // 修飾キーなしの文字は App 側でHEX入力として扱う
        assert_eq!(Action::from_key(KeyCode::Char('a'), KeyMod::default()), Action::None);
    }

    #[test]
    fn test_ctrl_x_prefix() {
        assert_eq!(Action::from_key_after_ctrl_x(KeyCode::Char('s'), ctrl()), Action::Save);
        assert_eq!(Action::from_key_after_ctrl_x(KeyCode::Char('c'), ctrl()), Action::Quit);
        assert_eq!(Action::from_key_after_ctrl_x(KeyCode::Char('k'), KeyMod::default()), Action::Cancel);
    }
}
