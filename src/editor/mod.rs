//! フィールド・行・バッファの整合性エンジン
//!
//! 編集の流れ:
//! 1. フィールドへの入力 → フィールドがHEXに変換して値を更新
//! 2. 所属する行がそのバイト範囲を書き換える
//! 3. 行の値を正規バッファ（[`Document`]）へ書き戻す
//! 4. 計算フィールドを再計算し、バッファが変わらなくなるまで繰り返す
//!
//! バッファを直接編集した場合は行を作り直す（差分更新はしない）。

mod field;
mod line;
mod render;

pub use field::{Codec, Compute, ComputedField, Field, FieldError, FixedField, VariableLengthField};
pub use line::{Line, LineError, Placement, Segment};
pub use render::{FieldRun, Render};

use std::ops::Range;

use log::{debug, error, trace, warn};
use thiserror::Error;

use crate::buffer::{BufferError, Document};
use crate::convert::{ConvertError, normalize_hex};

/// 再計算の最大パス数（これを超えたら循環とみなす）
pub const MAX_SETTLE_PASSES: usize = 8;

/// フィールドの識別子（定義順のインデックス）
pub type FieldId = usize;

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Line(#[from] LineError),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("invalid layout: {0}")]
    Layout(String),
    #[error("computed fields did not settle after {passes} passes")]
    Unsettled { passes: usize },
}

/// 表示側へ通知する変更
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEvent {
    FieldChanged(FieldId),
    LineChanged(usize),
    BufferChanged { version: u64 },
    Rebuilt { lines: usize },
}

/// 1回の編集の再計算結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settlement {
    /// バッファを変更したパス数
    pub passes: usize,
    /// 値が変わった計算フィールド
    pub changed: Vec<FieldId>,
}

pub struct Editor {
    document: Document,
    fields: Vec<Field>,
    /// バッファ上に配置できたフィールド
    attached: Vec<bool>,
    lines: Vec<Line>,
    bytes_per_row: usize,
    events: Vec<EditorEvent>,
}

impl Editor {
    /// エディタを作成し、計算フィールドを整合させる
    pub fn new(document: Document, fields: Vec<Field>, bytes_per_row: usize) -> Result<Self, EditError> {
        let mut editor = Self::unsettled(document, fields, bytes_per_row)?;
        editor.settle()?;
        editor.events.clear();
        Ok(editor)
    }

    /// ファイルを開く用: 整合できなくても読み込んだバッファのまま開く
    ///
    /// 整合に失敗した場合はその理由を一緒に返す。レイアウトが不正な場合だけ `Err`。
    pub fn load(
        document: Document,
        fields: Vec<Field>,
        bytes_per_row: usize,
    ) -> Result<(Self, Option<EditError>), EditError> {
        let mut editor = Self::unsettled(document, fields, bytes_per_row)?;
        let before = editor.document.snapshot();
        let modified = editor.document.is_modified();

        let failure = match editor.settle() {
            Ok(_) => None,
            Err(e) => {
                warn!("opened without updating computed fields: {}", e);
                editor.document.restore(before, modified);
                editor.rebuild();
                Some(e)
            }
        };
        editor.events.clear();
        Ok((editor, failure))
    }

    fn unsettled(document: Document, fields: Vec<Field>, bytes_per_row: usize) -> Result<Self, EditError> {
        validate_layout(&fields)?;
        if bytes_per_row == 0 {
            return Err(EditError::Layout("bytes per row must be at least 1".to_string()));
        }

        let mut editor = Self {
            document,
            attached: vec![false; fields.len()],
            fields,
            lines: Vec::new(),
            bytes_per_row,
            events: Vec::new(),
        };
        editor.rebuild();
        Ok(editor)
    }

    /// 正規バッファ（HEX）
    pub fn buffer(&self) -> &str {
        self.document.hex()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id)
    }

    /// ラベルからフィールドを探す
    pub fn field_id(&self, label: &str) -> Option<FieldId> {
        self.fields.iter().position(|f| f.label() == label)
    }

    /// フィールドがバッファ上に配置されているか
    pub fn is_attached(&self, id: FieldId) -> bool {
        self.attached.get(id).copied().unwrap_or(false)
    }

    /// 指定バイトを含むフィールド
    pub fn field_at(&self, pos: usize) -> Option<FieldId> {
        (0..self.fields.len()).find(|&id| self.is_attached(id) && self.extent(id).contains(&pos))
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// 行の幅を変更して作り直す
    pub fn set_bytes_per_row(&mut self, bytes_per_row: usize) -> Result<(), EditError> {
        if bytes_per_row == 0 {
            return Err(EditError::Layout("bytes per row must be at least 1".to_string()));
        }
        self.bytes_per_row = bytes_per_row;
        self.rebuild();
        Ok(())
    }

    /// 溜まった変更通知を取り出す
    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    fn extent(&self, id: FieldId) -> Range<usize> {
        self.fields[id].extent(self.document.len())
    }

    /// バッファを行に分割し、フィールドを各行に割り当てる
    fn rebuild(&mut self) {
        let hex = self.document.snapshot();
        let width = self.bytes_per_row * 2;

        self.lines = (0..hex.len())
            .step_by(width)
            .enumerate()
            .map(|(index, start)| {
                let end = (start + width).min(hex.len());
                Line::new(index, index * self.bytes_per_row, &hex[start..end])
            })
            .collect();

        let buffer_len = self.document.len();
        for id in 0..self.fields.len() {
            let range = self.extent(id);
            let fits = if self.fields[id].is_variable() {
                range.start <= buffer_len
            } else {
                range.end <= buffer_len
            };
            self.attached[id] = fits;
            if !fits {
                warn!(
                    "field '{}' ({}..{}) is outside the {}-byte buffer, not placed",
                    self.fields[id].label(),
                    range.start,
                    range.end,
                    buffer_len
                );
                continue;
            }

            self.fields[id].load(&hex[range.start * 2..range.end * 2]);

            for line in self.lines.iter_mut() {
                let line_range = line.offset()..line.offset() + line.len();
                let start = range.start.max(line_range.start);
                let end = range.end.min(line_range.end);
                if start < end {
                    line.add_field(Placement {
                        id,
                        start: start - line.offset(),
                        len: end - start,
                        field_offset: start - range.start,
                    });
                }
            }
        }

        debug!("rebuilt {} lines of {} bytes", self.lines.len(), self.bytes_per_row);
        self.events.push(EditorEvent::Rebuilt { lines: self.lines.len() });
    }

    /// フィールドの値を行経由でバッファへ書き戻す
    fn write_field(&mut self, id: FieldId) -> Result<(), EditError> {
        if !self.is_attached(id) {
            return Ok(());
        }
        let offset = self.fields[id].offset();
        let value = self.fields[id].value().to_string();
        trace!("write '{}' = {}", self.fields[id].label(), value);

        // 可変長フィールドで長さが変わる場合は末尾を置き換えて行を作り直す
        if self.fields[id].is_variable() && offset + value.len() / 2 != self.document.len() {
            self.document.replace_tail(offset, &value)?;
            self.events.push(EditorEvent::BufferChanged { version: self.document.version() });
            self.rebuild();
            return Ok(());
        }

        self.splice_through_lines(offset, &value)
    }

    /// `offset` バイト目からの `hex` を、重なる各行に分けて書き込む
    fn splice_through_lines(&mut self, offset: usize, hex: &str) -> Result<(), EditError> {
        let end = offset + hex.len() / 2;
        let first = offset / self.bytes_per_row;
        let mut changed = false;

        for line in self.lines.iter_mut().skip(first) {
            if line.offset() >= end {
                break;
            }
            let start = offset.max(line.offset());
            let stop = end.min(line.offset() + line.len());
            let part = &hex[(start - offset) * 2..(stop - offset) * 2];
            if line.splice(start - line.offset(), part)? {
                self.document.splice(line.offset(), line.value())?;
                self.events.push(EditorEvent::LineChanged(line.index()));
                changed = true;
            }
        }

        if changed {
            self.events.push(EditorEvent::BufferChanged { version: self.document.version() });
        }
        Ok(())
    }

    /// 計算フィールドをバッファが変わらなくなるまで再計算する
    ///
    /// 各パスでは同じスナップショットを全フィールドに渡す。
    fn settle(&mut self) -> Result<Settlement, EditError> {
        let mut settlement = Settlement::default();

        for pass in 1..=MAX_SETTLE_PASSES {
            let snapshot = self.document.snapshot();

            for id in 0..self.fields.len() {
                if !self.is_attached(id) || !self.fields[id].is_computed() {
                    continue;
                }
                if self.fields[id].recompute(&snapshot)? {
                    self.events.push(EditorEvent::FieldChanged(id));
                    if !settlement.changed.contains(&id) {
                        settlement.changed.push(id);
                    }
                    self.write_field(id)?;
                }
            }

            if self.document.hex() == &*snapshot {
                debug!("settled after {} pass(es)", pass);
                return Ok(settlement);
            }
            settlement.passes = pass;
        }

        error!("computed fields still changing after {} passes", MAX_SETTLE_PASSES);
        Err(EditError::Unsettled { passes: MAX_SETTLE_PASSES })
    }

    /// 1回の編集をまとめて実行する
    ///
    /// 成功すればUndo履歴に1件積む。失敗した場合はバッファ、変更フラグ、
    /// 変更通知を編集前に戻す。
    fn commit<F>(&mut self, edit: F) -> Result<Settlement, EditError>
    where
        F: FnOnce(&mut Self) -> Result<(), EditError>,
    {
        let before = self.document.snapshot();
        let modified = self.document.is_modified();
        let mark = self.events.len();
        match edit(self).and_then(|()| self.settle()) {
            Ok(settlement) => {
                self.document.record_undo(before);
                Ok(settlement)
            }
            Err(e) => {
                debug!("edit rejected: {}", e);
                self.document.restore(before, modified);
                self.rebuild();
                self.events.truncate(mark);
                Err(e)
            }
        }
    }

    fn check_id(&self, id: FieldId) -> Result<(), EditError> {
        if id < self.fields.len() {
            Ok(())
        } else {
            Err(EditError::UnknownField(format!("#{id}")))
        }
    }

    /// フィールドの表示テキストを編集する
    pub fn edit_field(&mut self, id: FieldId, text: &str) -> Result<Settlement, EditError> {
        self.check_id(id)?;
        if !self.is_attached(id) {
            debug!("ignoring edit of unplaced field '{}'", self.fields[id].label());
            return Ok(Settlement::default());
        }
        self.commit(|editor| {
            if editor.fields[id].on_edit(text)? {
                editor.events.push(EditorEvent::FieldChanged(id));
                editor.write_field(id)?;
            }
            Ok(())
        })
    }

    /// ラベル指定でフィールドを編集する
    pub fn edit_field_by_label(&mut self, label: &str, text: &str) -> Result<Settlement, EditError> {
        let id = self
            .field_id(label)
            .ok_or_else(|| EditError::UnknownField(label.to_string()))?;
        self.edit_field(id, text)
    }

    /// フィールドのHEX値を直接設定する
    pub fn set_field_hex(&mut self, id: FieldId, hex: &str) -> Result<Settlement, EditError> {
        self.check_id(id)?;
        if !self.is_attached(id) {
            return Ok(Settlement::default());
        }
        self.commit(|editor| {
            if editor.fields[id].set_value(hex)? {
                editor.events.push(EditorEvent::FieldChanged(id));
                editor.write_field(id)?;
            }
            Ok(())
        })
    }

    /// バッファの1バイトを直接書き換える
    pub fn set_byte(&mut self, pos: usize, value: u8) -> Result<Settlement, EditError> {
        self.commit(|editor| {
            if editor.document.set(pos, value)? {
                editor.rebuild();
            }
            Ok(())
        })
    }

    /// `offset` バイト目から同じ長さだけ書き換える
    pub fn replace_bytes(&mut self, offset: usize, hex: &str) -> Result<Settlement, EditError> {
        let hex = normalize_hex(hex).map_err(BufferError::from)?;
        self.commit(|editor| {
            if editor.document.splice(offset, &hex)? {
                editor.rebuild();
            }
            Ok(())
        })
    }

    /// バッファ全体を置き換える
    pub fn replace_buffer(&mut self, hex: &str) -> Result<Settlement, EditError> {
        self.commit(|editor| {
            if editor.document.replace_all(hex)? {
                editor.rebuild();
            }
            Ok(())
        })
    }

    /// 計算フィールドだけを再計算する
    pub fn recompute(&mut self) -> Result<Settlement, EditError> {
        self.commit(|_| Ok(()))
    }

    /// Undo: 直前の編集を取り消す
    pub fn undo(&mut self) -> Option<usize> {
        let pos = self.document.undo()?;
        self.rebuild();
        Some(pos)
    }

    /// Redo: 取り消した編集をやり直す
    pub fn redo(&mut self) -> Option<usize> {
        let pos = self.document.redo()?;
        self.rebuild();
        Some(pos)
    }

    pub fn save(&mut self) -> Result<(), BufferError> {
        self.document.save()
    }

    pub fn save_as(&mut self, path: impl Into<std::path::PathBuf>) -> Result<(), BufferError> {
        self.document.save_as(path)
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.document.set_readonly(readonly);
    }

    /// 行ごとにリテラル区間とフィールド区間を描画側へ渡す
    pub fn render<R: Render>(&self, out: &mut R) {
        for line in &self.lines {
            out.line_start(line);
            for segment in line.segments() {
                match segment {
                    Segment::Literal { start, end } => out.literal(&line.value()[start * 2..end * 2]),
                    Segment::Field(p) => {
                        let field = &self.fields[p.id];
                        out.field(FieldRun {
                            id: p.id,
                            label: field.label(),
                            hex: &line.value()[p.start * 2..(p.start + p.len) * 2],
                            text: field.display_text().ok(),
                            computed: field.is_computed(),
                            continued: p.field_offset > 0,
                        });
                    }
                }
            }
            out.line_end(line);
        }
    }
}

/// 計算フィールドの格納値と計算値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedCheck {
    pub label: String,
    pub offset: usize,
    pub stored: String,
    pub expected: String,
}

impl ComputedCheck {
    pub fn is_ok(&self) -> bool {
        self.stored == self.expected
    }
}

/// バッファを変更せずに計算フィールドを照合する
///
/// バッファに収まらない計算フィールドは対象外。
pub fn check_computed(buffer: &str, fields: &[Field]) -> Result<Vec<ComputedCheck>, ConvertError> {
    let buffer = normalize_hex(buffer)?;
    let mut checks = Vec::new();
    for field in fields {
        let Field::Computed(f) = field else {
            continue;
        };
        let range = f.offset * 2..(f.offset + f.length()) * 2;
        let Some(stored) = buffer.get(range) else {
            warn!("computed field '{}' is outside the buffer, not checked", f.label);
            continue;
        };
        checks.push(ComputedCheck {
            label: f.label.clone(),
            offset: f.offset,
            stored: stored.to_string(),
            expected: f.compute.apply(&buffer)?,
        });
    }
    Ok(checks)
}

/// フィールド定義の検証（重なり・長さ・ラベル重複）
fn validate_layout(fields: &[Field]) -> Result<(), EditError> {
    let mut order: Vec<&Field> = fields.iter().collect();
    order.sort_by_key(|f| f.offset());

    for (i, field) in order.iter().enumerate() {
        let label = field.label();
        if fields.iter().filter(|f| f.label() == label).count() > 1 {
            return Err(EditError::Layout(format!("duplicate label '{label}'")));
        }
        match field {
            Field::Fixed(f) => {
                if f.length == 0 {
                    return Err(EditError::Layout(format!("'{label}' has zero length")));
                }
                if let Some(required) = f.codec.required_length() {
                    if required != f.length {
                        return Err(EditError::Layout(format!(
                            "'{label}' is {} bytes but its codec needs {required}",
                            f.length
                        )));
                    }
                }
            }
            Field::Computed(_) => {}
            Field::Variable(_) => {
                if i + 1 != order.len() {
                    return Err(EditError::Layout(format!(
                        "variable-length field '{label}' must be the last field"
                    )));
                }
            }
        }
        if let Some(next) = order.get(i + 1) {
            if field.offset() + field.length() > next.offset() {
                return Err(EditError::Layout(format!(
                    "'{label}' overlaps '{}'",
                    next.label()
                )));
            }
        }
    }
    Ok(())
}
