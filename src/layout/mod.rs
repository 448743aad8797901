//! フィールド定義（レイアウト）の設定
//!
//! TOMLで記述する。何も指定しない場合は同梱の UDP/IPv4 レイアウトを使う。

use std::fs;
use std::path::Path;

use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::convert::ByteOrder;
use crate::editor::{Codec, Compute, ComputedField, Field, FixedField, VariableLengthField};

/// 同梱レイアウト
pub const UDP_IPV4_LAYOUT: &str = include_str!("../../layouts/udp_ipv4.toml");

/// 入力がない場合に開くパケット（10.0.0.1:1234 → 10.0.0.2:5353, "hello world"）
pub const DEFAULT_PACKET: &str =
    "4500002700004000401126c40a0000010a00000204d214e90013403c68656c6c6f20776f726c64";

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("cannot read layout: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse layout: {0}")]
    Parse(#[from] toml::de::Error),
}

/// コーデック名（設定ファイル用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecName {
    Hex,
    Ipv4,
    Port,
    Ascii,
}

/// 計算方式名（設定ファイル用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeName {
    TotalLength,
    UdpLength,
    IpChecksum,
    UdpChecksum,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    Fixed { length: usize, codec: CodecName },
    Computed { compute: ComputeName },
    Variable { codec: CodecName },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldSpec {
    pub label: String,
    pub offset: usize,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LayoutConfig {
    #[serde(default = "default_bytes_per_row")]
    pub bytes_per_row: usize,
    #[serde(default)]
    pub port_byte_order: ByteOrder,
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldSpec>,
}

fn default_bytes_per_row() -> usize {
    16
}

impl LayoutConfig {
    /// TOML文字列から読み込む
    pub fn from_toml(text: &str) -> Result<Self, LayoutError> {
        Ok(toml::from_str(text)?)
    }

    /// TOMLファイルから読み込む
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// 同梱の UDP/IPv4 レイアウト（`layouts/udp_ipv4.toml`）
    pub fn udp_ipv4() -> Self {
        Self::bundled(UDP_IPV4_LAYOUT)
    }

    /// 同梱レイアウトを読み込む。壊れている場合はフィールドなしで続ける
    fn bundled(text: &str) -> Self {
        Self::from_toml(text).unwrap_or_else(|e| {
            error!("bundled layout is invalid: {}", e);
            Self {
                bytes_per_row: default_bytes_per_row(),
                port_byte_order: ByteOrder::Network,
                fields: Vec::new(),
            }
        })
    }

    /// エディタ用のフィールドに変換
    pub fn to_fields(&self) -> Vec<Field> {
        self.fields
            .iter()
            .map(|spec| {
                let label = spec.label.clone();
                match spec.kind {
                    FieldKind::Fixed { length, codec } => {
                        Field::Fixed(FixedField::new(label, spec.offset, length, self.codec(codec)))
                    }
                    FieldKind::Computed { compute } => {
                        Field::Computed(ComputedField::new(label, spec.offset, compute.into()))
                    }
                    FieldKind::Variable { codec } => Field::Variable(VariableLengthField::new(
                        label,
                        spec.offset,
                        self.codec(codec),
                    )),
                }
            })
            .collect()
    }

    fn codec(&self, name: CodecName) -> Codec {
        match name {
            CodecName::Hex => Codec::Hex,
            CodecName::Ipv4 => Codec::Ipv4,
            CodecName::Port => Codec::Port(self.port_byte_order),
            CodecName::Ascii => Codec::Ascii,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::udp_ipv4()
    }
}

impl From<ComputeName> for Compute {
    fn from(name: ComputeName) -> Self {
        match name {
            ComputeName::TotalLength => Compute::TotalLength,
            ComputeName::UdpLength => Compute::UdpLength,
            ComputeName::IpChecksum => Compute::IpChecksum,
            ComputeName::UdpChecksum => Compute::UdpChecksum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_layout_parses() {
        let layout = LayoutConfig::from_toml(UDP_IPV4_LAYOUT).unwrap();
        assert_eq!(layout, LayoutConfig::udp_ipv4());
        assert_eq!(layout.bytes_per_row, 16);
        assert_eq!(layout.port_byte_order, ByteOrder::Network);
        assert_eq!(layout.fields.len(), 12);
        let labels: Vec<&str> = layout.fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            [
                "Version/IHL",
                "Total Length",
                "TTL",
                "Protocol",
                "Header Checksum",
                "Source IP",
                "Dest IP",
                "Source Port",
                "Dest Port",
                "UDP Length",
                "UDP Checksum",
                "Payload",
            ]
        );
        assert_eq!(layout.fields[4].kind, FieldKind::Computed { compute: ComputeName::IpChecksum });
        assert_eq!(layout.fields[7].kind, FieldKind::Fixed { length: 2, codec: CodecName::Port });
        assert_eq!(
            layout.fields[5],
            FieldSpec {
                label: "Source IP".to_string(),
                offset: 12,
                kind: FieldKind::Fixed { length: 4, codec: CodecName::Ipv4 },
            }
        );
        assert_eq!(layout.fields[11].kind, FieldKind::Variable { codec: CodecName::Ascii });
    }

    #[test]
    fn test_broken_bundled_layout_falls_back_to_no_fields() {
        let layout = LayoutConfig::bundled("[[field]]\nlabel = 1\n");
        assert_eq!(layout.bytes_per_row, 16);
        assert!(layout.fields.is_empty());
        assert!(layout.to_fields().is_empty());
    }

    #[test]
    fn test_port_byte_order_applies_to_port_codec() {
        let text = r#"
            port_byte_order = "swapped"

            [[field]]
            label = "Port"
            offset = 0
            kind = "fixed"
            length = 2
            codec = "port"
        "#;
        let layout = LayoutConfig::from_toml(text).unwrap();
        assert_eq!(layout.bytes_per_row, 16);
        let fields = layout.to_fields();
        assert!(matches!(
            &fields[0],
            Field::Fixed(f) if f.codec == Codec::Port(ByteOrder::Swapped)
        ));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let text = r#"
            [[field]]
            label = "X"
            offset = 0
            kind = "checksum"
        "#;
        assert!(matches!(LayoutConfig::from_toml(text), Err(LayoutError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.toml");
        fs::write(&path, "bytes_per_row = 8\n").unwrap();
        let layout = LayoutConfig::load(&path).unwrap();
        assert_eq!(layout.bytes_per_row, 8);
        assert!(layout.fields.is_empty());
        assert!(matches!(LayoutConfig::load(dir.path().join("missing.toml")), Err(LayoutError::Io(_))));
    }
}
