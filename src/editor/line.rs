use std::collections::BTreeMap;

use thiserror::Error;

use super::FieldId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("splice of {len} hex digits at {offset} overflows line {line} ({width} digits)")]
pub struct LineError {
    pub line: usize,
    pub offset: usize,
    pub len: usize,
    pub width: usize,
}

/// 行内のフィールド配置（単位はバイト）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub id: FieldId,
    /// 行内の開始位置
    pub start: usize,
    /// この行に含まれるバイト数
    pub len: usize,
    /// フィールド先頭からの位置（前の行から続く場合は 0 以外）
    pub field_offset: usize,
}

/// 表示用の区間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// フィールドに属さないバイト列 `start..end`
    Literal { start: usize, end: usize },
    Field(Placement),
}

/// バッファの固定幅スライス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    index: usize,
    /// バッファ内の先頭バイト位置（`index * 幅`）
    offset: usize,
    value: String,
    fields: BTreeMap<usize, Placement>,
}

impl Line {
    pub fn new(index: usize, offset: usize, value: impl Into<String>) -> Self {
        Self {
            index,
            offset,
            value: value.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 行のHEX文字列
    pub fn value(&self) -> &str {
        &self.value
    }

    /// バイト数
    pub fn len(&self) -> usize {
        self.value.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// フィールドを行内の位置に登録する
    pub fn add_field(&mut self, placement: Placement) {
        self.fields.insert(placement.start, placement);
    }

    /// 登録済みフィールド（位置順）
    pub fn fields(&self) -> impl Iterator<Item = &Placement> {
        self.fields.values()
    }

    /// 行内位置 `start` バイトから `hex` を書き込む
    ///
    /// 行からはみ出す書き込みは隣のバイトをずらすことになるのでエラーにする。
    /// 戻り値: 行の値が変わったかどうか
    pub fn splice(&mut self, start: usize, hex: &str) -> Result<bool, LineError> {
        let from = start * 2;
        let to = from + hex.len();
        if to > self.value.len() {
            return Err(LineError {
                line: self.index,
                offset: from,
                len: hex.len(),
                width: self.value.len(),
            });
        }
        if &self.value[from..to] == hex {
            return Ok(false);
        }
        self.value.replace_range(from..to, hex);
        Ok(true)
    }

    /// リテラル区間とフィールド区間に分解する（位置順）
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut pos = 0;
        for placement in self.fields.values() {
            if placement.start < pos {
                continue;
            }
            if placement.start > pos {
                segments.push(Segment::Literal { start: pos, end: placement.start });
            }
            segments.push(Segment::Field(*placement));
            pos = placement.start + placement.len;
        }
        if pos < self.len() {
            segments.push(Segment::Literal { start: pos, end: self.len() });
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(id: FieldId, start: usize, len: usize) -> Placement {
        Placement { id, start, len, field_offset: 0 }
    }

    #[test]
    fn test_splice_reports_change() {
        let mut line = Line::new(1, 4, "00112233");
        assert!(line.splice(1, "aabb").unwrap());
        assert_eq!(line.value(), "00aabb33");
        assert!(!line.splice(1, "aabb").unwrap());
    }

    #[test]
    fn test_splice_overflow_fails_fast() {
        let mut line = Line::new(0, 0, "00112233");
        let err = line.splice(3, "aabb").unwrap_err();
        assert_eq!(err.width, 8);
        assert_eq!(line.value(), "00112233");
    }

    #[test]
    fn test_segments_in_offset_order() {
        let mut line = Line::new(0, 0, "0011223344556677");
        // 登録順に関係なく位置順
        line.add_field(placement(7, 6, 2));
        line.add_field(placement(3, 1, 2));
        assert_eq!(
            line.segments(),
            vec![
                Segment::Literal { start: 0, end: 1 },
                Segment::Field(placement(3, 1, 2)),
                Segment::Literal { start: 3, end: 6 },
                Segment::Field(placement(7, 6, 2)),
            ]
        );
        assert_eq!(line.fields().map(|p| p.id).collect::<Vec<_>>(), vec![3, 7]);
    }

    #[test]
    fn test_segments_without_fields() {
        let line = Line::new(0, 0, "0011");
        assert_eq!(line.segments(), vec![Segment::Literal { start: 0, end: 2 }]);
        assert!(Line::new(0, 0, "").segments().is_empty());
    }
}
