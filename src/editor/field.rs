//! フィールド: バッファのバイト範囲に対する型付きビュー
//!
//! 3種類ある。
//! - [`FixedField`]: 固定長、ユーザーが編集できる
//! - [`ComputedField`]: バッファ全体から計算される（長さ・チェックサム）、編集不可
//! - [`VariableLengthField`]: `offset` からバッファ末尾まで

use std::ops::Range;

use thiserror::Error;

use crate::convert::{self, checksum, ByteOrder, ConvertError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// HEXの桁数がフィールド長と合わない
    #[error("{label}: expected {expected} hex digits, got {actual}")]
    Validation {
        label: String,
        expected: usize,
        actual: usize,
    },
    /// 表示テキストを変換できない
    #[error("{label}: {source}")]
    Malformed {
        label: String,
        #[source]
        source: ConvertError,
    },
    #[error("{0} is computed and cannot be edited")]
    ReadOnly(String),
}

/// 表示テキスト⇔HEXの変換方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// HEXそのまま
    Hex,
    /// "a.b.c.d"（4バイト）
    Ipv4,
    /// 10進数のポート番号（2バイト）
    Port(ByteOrder),
    /// 1バイト1文字
    Ascii,
}

impl Codec {
    pub fn decode(self, hex: &str) -> Result<String, ConvertError> {
        match self {
            Codec::Hex => Ok(hex.to_string()),
            Codec::Ipv4 => convert::hex_to_ipv4(hex),
            Codec::Port(order) => Ok(convert::hex_to_port(hex, order)?.to_string()),
            Codec::Ascii => convert::hex_to_ascii(hex),
        }
    }

    pub fn encode(self, text: &str) -> Result<String, ConvertError> {
        match self {
            Codec::Hex => convert::normalize_hex(text),
            Codec::Ipv4 => convert::ipv4_to_hex(text),
            Codec::Port(order) => convert::port_text_to_hex(text, order),
            Codec::Ascii => convert::ascii_to_hex(text),
        }
    }

    /// このコーデックが要求するバイト長
    pub fn required_length(self) -> Option<usize> {
        match self {
            Codec::Ipv4 => Some(4),
            Codec::Port(_) => Some(2),
            Codec::Hex | Codec::Ascii => None,
        }
    }
}

/// 計算フィールドの計算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compute {
    TotalLength,
    UdpLength,
    IpChecksum,
    UdpChecksum,
}

impl Compute {
    pub fn apply(self, buffer: &str) -> Result<String, ConvertError> {
        match self {
            Compute::TotalLength => checksum::total_length(buffer),
            Compute::UdpLength => checksum::udp_length(buffer),
            Compute::IpChecksum => checksum::ip_header_checksum(buffer),
            Compute::UdpChecksum => checksum::udp_checksum(buffer),
        }
    }

    /// 出力のバイト長
    pub fn length(self) -> usize {
        2
    }

    /// 長さは10進数、チェックサムは 0x 付きで表示
    fn display(self, hex: &str) -> Result<String, ConvertError> {
        match self {
            Compute::TotalLength | Compute::UdpLength => usize::from_str_radix(hex, 16)
                .map(|n| n.to_string())
                .map_err(|_| ConvertError::InvalidHex(hex.to_string())),
            Compute::IpChecksum | Compute::UdpChecksum => Ok(format!("0x{hex}")),
        }
    }
}

/// 固定長フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedField {
    pub label: String,
    pub offset: usize,
    pub length: usize,
    pub codec: Codec,
    value: String,
}

impl FixedField {
    pub fn new(label: impl Into<String>, offset: usize, length: usize, codec: Codec) -> Self {
        Self {
            label: label.into(),
            offset,
            length,
            codec,
            value: "0".repeat(length * 2),
        }
    }

    /// HEX値を設定（桁数は `2 * length` 固定）
    ///
    /// 戻り値: 値が変わったかどうか
    pub fn set_value(&mut self, hex: &str) -> Result<bool, FieldError> {
        let hex = convert::normalize_hex(hex).map_err(|source| FieldError::Malformed {
            label: self.label.clone(),
            source,
        })?;
        if hex.len() != self.length * 2 {
            return Err(FieldError::Validation {
                label: self.label.clone(),
                expected: self.length * 2,
                actual: hex.len(),
            });
        }
        Ok(replace_if_changed(&mut self.value, hex))
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// 計算フィールド（値は常にバッファから導出される）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedField {
    pub label: String,
    pub offset: usize,
    pub compute: Compute,
    value: String,
}

impl ComputedField {
    pub fn new(label: impl Into<String>, offset: usize, compute: Compute) -> Self {
        Self {
            label: label.into(),
            offset,
            compute,
            value: "0".repeat(compute.length() * 2),
        }
    }

    pub fn length(&self) -> usize {
        self.compute.length()
    }

    /// バッファから再計算し、値が変わったかを返す
    pub fn recompute(&mut self, buffer: &str) -> Result<bool, FieldError> {
        let hex = self.compute.apply(buffer).map_err(|source| FieldError::Malformed {
            label: self.label.clone(),
            source,
        })?;
        if hex.len() != self.length() * 2 {
            return Err(FieldError::Validation {
                label: self.label.clone(),
                expected: self.length() * 2,
                actual: hex.len(),
            });
        }
        Ok(replace_if_changed(&mut self.value, hex))
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// 可変長フィールド（`offset` からバッファ末尾まで）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableLengthField {
    pub label: String,
    pub offset: usize,
    pub codec: Codec,
    value: String,
}

impl VariableLengthField {
    pub fn new(label: impl Into<String>, offset: usize, codec: Codec) -> Self {
        Self {
            label: label.into(),
            offset,
            codec,
            value: String::new(),
        }
    }

    /// 末尾全体のHEX値を設定（長さは自由、偶数桁のみ）
    pub fn set_value(&mut self, hex: &str) -> Result<bool, FieldError> {
        let hex = convert::normalize_hex(hex).map_err(|source| FieldError::Malformed {
            label: self.label.clone(),
            source,
        })?;
        Ok(replace_if_changed(&mut self.value, hex))
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

fn replace_if_changed(slot: &mut String, hex: String) -> bool {
    if *slot == hex {
        false
    } else {
        *slot = hex;
        true
    }
}

/// フィールド（タグ付きバリアント）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Fixed(FixedField),
    Computed(ComputedField),
    Variable(VariableLengthField),
}

impl Field {
    pub fn label(&self) -> &str {
        match self {
            Field::Fixed(f) => &f.label,
            Field::Computed(f) => &f.label,
            Field::Variable(f) => &f.label,
        }
    }

    /// バッファ内のバイト位置
    pub fn offset(&self) -> usize {
        match self {
            Field::Fixed(f) => f.offset,
            Field::Computed(f) => f.offset,
            Field::Variable(f) => f.offset,
        }
    }

    /// バイト長（可変長は0）
    pub fn length(&self) -> usize {
        match self {
            Field::Fixed(f) => f.length,
            Field::Computed(f) => f.length(),
            Field::Variable(_) => 0,
        }
    }

    /// キャッシュされたHEX値
    pub fn value(&self) -> &str {
        match self {
            Field::Fixed(f) => f.value(),
            Field::Computed(f) => f.value(),
            Field::Variable(f) => f.value(),
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Field::Computed(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Field::Variable(_))
    }

    /// `buffer_len` バイトのバッファ上で占める範囲
    pub fn extent(&self, buffer_len: usize) -> Range<usize> {
        let start = self.offset();
        match self {
            Field::Variable(_) => start..buffer_len.max(start),
            _ => start..start + self.length(),
        }
    }

    /// 表示テキスト
    pub fn display_text(&self) -> Result<String, ConvertError> {
        match self {
            Field::Fixed(f) => f.codec.decode(f.value()),
            Field::Computed(f) => f.compute.display(f.value()),
            Field::Variable(f) => f.codec.decode(f.value()),
        }
    }

    /// ユーザー入力を反映する
    ///
    /// 変換後のHEXが現在値と同じなら何もせず `false` を返す。
    /// エラー時は値を変更しない。
    pub fn on_edit(&mut self, text: &str) -> Result<bool, FieldError> {
        let (label, codec) = match self {
            Field::Fixed(f) => (&f.label, f.codec),
            Field::Variable(f) => (&f.label, f.codec),
            Field::Computed(f) => return Err(FieldError::ReadOnly(f.label.clone())),
        };
        let hex = codec.encode(text).map_err(|source| FieldError::Malformed {
            label: label.clone(),
            source,
        })?;
        self.set_value(&hex)
    }

    /// HEX値を直接設定する（計算フィールドは不可）
    pub fn set_value(&mut self, hex: &str) -> Result<bool, FieldError> {
        match self {
            Field::Fixed(f) => f.set_value(hex),
            Field::Variable(f) => f.set_value(hex),
            Field::Computed(f) => Err(FieldError::ReadOnly(f.label.clone())),
        }
    }

    /// 計算フィールドを再計算する（他の種類は常に `false`）
    pub fn recompute(&mut self, buffer: &str) -> Result<bool, FieldError> {
        match self {
            Field::Computed(f) => f.recompute(buffer),
            _ => Ok(false),
        }
    }

    /// バッファの内容をそのままキャッシュに読み込む
    pub(crate) fn load(&mut self, hex: &str) {
        let slot = match self {
            Field::Fixed(f) => &mut f.value,
            Field::Computed(f) => &mut f.value,
            Field::Variable(f) => &mut f.value,
        };
        slot.clear();
        slot.push_str(hex);
    }
}
