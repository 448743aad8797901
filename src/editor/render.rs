//! 表示側との境界
//!
//! エディタは行ごとにリテラル区間とフィールド区間を順に渡すだけで、
//! 表示方法（端末、テキスト出力など）には関知しない。

use super::{FieldId, Line};

/// 行内に現れるフィールドの一部
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRun<'a> {
    pub id: FieldId,
    pub label: &'a str,
    /// この行に含まれる部分のHEX
    pub hex: &'a str,
    /// フィールド全体の表示テキスト（変換できない場合は None）
    pub text: Option<String>,
    pub computed: bool,
    /// 前の行から続いている
    pub continued: bool,
}

pub trait Render {
    fn line_start(&mut self, _line: &Line) {}

    /// フィールドに属さないHEX
    fn literal(&mut self, hex: &str);

    fn field(&mut self, run: FieldRun<'_>);

    fn line_end(&mut self, _line: &Line) {}
}
