use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use super::BufferError;
use crate::convert::{bytes_to_hex, hex_to_bytes, normalize_hex};

/// ファイルの保存形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// 生のパケットバイト列
    #[default]
    Binary,
    /// HEXテキスト（空白は無視）
    HexText,
}

/// パケットを表すHEXドキュメント
///
/// 内容は小文字HEX文字列で、編集のたびに新しい文字列へ置き換える（コピーオンライト）。
/// `snapshot()` で取得した値は以降の編集の影響を受けない。
pub struct Document {
    /// ファイルパス
    path: Option<PathBuf>,
    /// 読み込み時の形式（保存時も同じ形式）
    format: FileFormat,
    /// HEX文字列
    data: Rc<str>,
    /// 編集ごとに増えるバージョン
    version: u64,
    /// 変更フラグ
    modified: bool,
    /// 読み取り専用フラグ
    readonly: bool,
    /// Undo履歴（編集前のスナップショット）
    undo_stack: Vec<Rc<str>>,
    /// Redo履歴
    redo_stack: Vec<Rc<str>>,
}

impl Document {
    /// 空のドキュメントを作成
    pub fn new() -> Self {
        Self {
            path: None,
            format: FileFormat::Binary,
            data: Rc::from(""),
            version: 0,
            modified: false,
            readonly: false,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    /// HEX文字列から作成
    pub fn from_hex(hex: &str) -> Result<Self, BufferError> {
        let mut doc = Self::new();
        doc.data = Rc::from(normalize_hex(hex)?);
        doc.format = FileFormat::HexText;
        Ok(doc)
    }

    /// バイト列から作成
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut doc = Self::new();
        doc.data = Rc::from(bytes_to_hex(data));
        doc
    }

    /// バイナリファイルから読み込み
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BufferError> {
        let path = path.into();
        let data = fs::read(&path)?;
        let mut doc = Self::from_bytes(&data);
        doc.path = Some(path);
        Ok(doc)
    }

    /// HEXテキストファイルから読み込み
    pub fn open_hex(path: impl Into<PathBuf>) -> Result<Self, BufferError> {
        let path = path.into();
        let text = fs::read_to_string(&path)?;
        let mut doc = Self::from_hex(&text)?;
        doc.path = Some(path);
        Ok(doc)
    }

    /// ファイルに保存
    pub fn save(&mut self) -> Result<(), BufferError> {
        let Some(ref path) = self.path else {
            return Err(BufferError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No file path set",
            )));
        };
        match self.format {
            FileFormat::Binary => fs::write(path, self.to_bytes()?)?,
            FileFormat::HexText => fs::write(path, format!("{}\n", self.data))?,
        }
        self.modified = false;
        Ok(())
    }

    /// 別名で保存
    pub fn save_as(&mut self, path: impl Into<PathBuf>) -> Result<(), BufferError> {
        self.path = Some(path.into());
        self.save()
    }

    /// バイト長
    pub fn len(&self) -> usize {
        self.data.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// HEX文字列への参照
    pub fn hex(&self) -> &str {
        &self.data
    }

    /// 現在の内容のスナップショット（O(1)）
    pub fn snapshot(&self) -> Rc<str> {
        Rc::clone(&self.data)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// 指定位置のバイトを取得
    pub fn get(&self, pos: usize) -> Option<u8> {
        let digits = self.data.get(pos * 2..pos * 2 + 2)?;
        u8::from_str_radix(digits, 16).ok()
    }

    /// バイト列に変換
    pub fn to_bytes(&self) -> Result<Vec<u8>, BufferError> {
        Ok(hex_to_bytes(&self.data)?)
    }

    /// `offset` バイト目から同じ長さだけ置き換える
    ///
    /// 戻り値: 内容が変わったかどうか
    pub fn splice(&mut self, offset: usize, hex: &str) -> Result<bool, BufferError> {
        let start = offset * 2;
        let end = start + hex.len();
        if end > self.data.len() || hex.len() % 2 != 0 {
            return Err(BufferError::OutOfBounds { start, end, len: self.data.len() });
        }
        if &self.data[start..end] == hex {
            return Ok(false);
        }
        let next = format!("{}{}{}", &self.data[..start], hex, &self.data[end..]);
        self.replace(next)
    }

    /// `offset` バイト目以降をすべて置き換える（長さは変わってもよい）
    pub fn replace_tail(&mut self, offset: usize, hex: &str) -> Result<bool, BufferError> {
        let start = offset * 2;
        if start > self.data.len() || hex.len() % 2 != 0 {
            return Err(BufferError::OutOfBounds {
                start,
                end: start + hex.len(),
                len: self.data.len(),
            });
        }
        if &self.data[start..] == hex {
            return Ok(false);
        }
        let next = format!("{}{}", &self.data[..start], hex);
        self.replace(next)
    }

    /// 内容全体を置き換える
    pub fn replace_all(&mut self, hex: &str) -> Result<bool, BufferError> {
        let hex = normalize_hex(hex)?;
        if *self.data == *hex {
            return Ok(false);
        }
        self.replace(hex)
    }

    /// 指定位置のバイトを設定
    pub fn set(&mut self, pos: usize, value: u8) -> Result<bool, BufferError> {
        self.splice(pos, &format!("{value:02x}"))
    }

    fn replace(&mut self, next: String) -> Result<bool, BufferError> {
        if self.readonly {
            return Err(BufferError::ReadOnly);
        }
        self.data = Rc::from(next);
        self.version += 1;
        self.modified = true;
        Ok(true)
    }

    /// 編集を巻き戻す（Undo履歴には積まない）
    ///
    /// `modified` にはスナップショット時点の変更フラグを渡す。
    pub fn restore(&mut self, snapshot: Rc<str>, modified: bool) {
        if self.data != snapshot {
            self.data = snapshot;
            self.version += 1;
        }
        self.modified = modified;
    }

    /// 1回の編集の前の状態をUndo履歴に積む
    pub fn record_undo(&mut self, before: Rc<str>) {
        if self.data != before {
            self.undo_stack.push(before);
            self.redo_stack.clear();
        }
    }

    /// Undo: 直前の編集を取り消す
    /// 戻り値: 最初に変化したバイト位置
    pub fn undo(&mut self) -> Option<usize> {
        let before = self.undo_stack.pop()?;
        let pos = first_difference(&self.data, &before);
        self.redo_stack.push(std::mem::replace(&mut self.data, before));
        self.version += 1;
        self.modified = !self.undo_stack.is_empty();
        Some(pos)
    }

    /// Redo: 取り消した編集をやり直す
    pub fn redo(&mut self) -> Option<usize> {
        let after = self.redo_stack.pop()?;
        let pos = first_difference(&self.data, &after);
        self.undo_stack.push(std::mem::replace(&mut self.data, after));
        self.version += 1;
        self.modified = true;
        Some(pos)
    }

    /// 変更されているかどうか
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// 読み取り専用かどうか
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// 読み取り専用フラグを設定
    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// ファイルパスを取得
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// ファイル名を取得
    pub fn filename(&self) -> Option<&str> {
        self.path.as_ref().and_then(|p| p.file_name()).and_then(|s| s.to_str())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// 2つのHEX文字列で最初に異なるバイト位置
fn first_difference(a: &str, b: &str) -> usize {
    a.bytes()
        .zip(b.bytes())
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()))
        / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_same_length() {
        let mut doc = Document::from_hex("00112233").unwrap();
        assert!(doc.splice(1, "aabb").unwrap());
        assert_eq!(doc.hex(), "00aabb33");
        assert!(!doc.splice(1, "aabb").unwrap());
        assert_eq!(doc.version(), 1);
        assert!(matches!(doc.splice(3, "aabb"), Err(BufferError::OutOfBounds { .. })));
        assert_eq!(doc.hex(), "00aabb33");
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let mut doc = Document::from_hex("0011").unwrap();
        let snap = doc.snapshot();
        doc.set(0, 0xff).unwrap();
        assert_eq!(&*snap, "0011");
        assert_eq!(doc.hex(), "ff11");
        assert_eq!(doc.get(0), Some(0xff));
        assert_eq!(doc.get(2), None);
    }

    #[test]
    fn test_replace_tail_changes_length() {
        let mut doc = Document::from_hex("0011").unwrap();
        doc.replace_tail(1, "223344").unwrap();
        assert_eq!(doc.hex(), "00223344");
        assert_eq!(doc.len(), 4);
        doc.replace_tail(4, "").unwrap();
        assert_eq!(doc.hex(), "00223344");
        assert!(doc.replace_tail(5, "").is_err());
    }

    #[test]
    fn test_undo_redo() {
        let mut doc = Document::from_hex("0000").unwrap();
        let before = doc.snapshot();
        doc.set(1, 0xab).unwrap();
        doc.record_undo(before);

        assert_eq!(doc.undo(), Some(1));
        assert_eq!(doc.hex(), "0000");
        assert!(!doc.is_modified());
        assert_eq!(doc.undo(), None);

        assert_eq!(doc.redo(), Some(1));
        assert_eq!(doc.hex(), "00ab");
        assert!(doc.is_modified());
    }

    #[test]
    fn test_restore_resets_modified() {
        let mut doc = Document::from_hex("0000").unwrap();
        let before = doc.snapshot();
        doc.set(0, 0x12).unwrap();
        assert!(doc.is_modified());

        doc.restore(before, false);
        assert_eq!(doc.hex(), "0000");
        assert!(!doc.is_modified());
        assert_eq!(doc.undo(), None);
    }

    #[test]
    fn test_readonly() {
        let mut doc = Document::from_hex("00").unwrap();
        doc.set_readonly(true);
        assert!(matches!(doc.set(0, 1), Err(BufferError::ReadOnly)));
        assert_eq!(doc.hex(), "00");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let bin = dir.path().join("packet.bin");
        let mut doc = Document::from_bytes(&[0x45, 0x00]);
        doc.save_as(&bin).unwrap();
        assert_eq!(fs::read(&bin).unwrap(), vec![0x45, 0x00]);
        assert_eq!(Document::open(&bin).unwrap().hex(), "4500");

        let txt = dir.path().join("packet.hex");
        fs::write(&txt, "45 00\n00 1C\n").unwrap();
        let mut doc = Document::open_hex(&txt).unwrap();
        assert_eq!(doc.hex(), "4500001c");
        assert_eq!(doc.filename(), Some("packet.hex"));
        doc.set(3, 0x1d).unwrap();
        doc.save().unwrap();
        assert_eq!(fs::read_to_string(&txt).unwrap(), "4500001d\n");
    }

    #[test]
    fn test_save_without_path_fails() {
        let mut doc = Document::new();
        assert!(matches!(doc.save(), Err(BufferError::Io(_))));
    }
}
