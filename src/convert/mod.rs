//! HEX文字列と表示テキストの相互変換
//!
//! バッファは常に小文字の16進数字列（2桁 = 1バイト）として扱う。
//! ここの関数はすべて純粋関数で、状態を持たない。

pub mod checksum;

use thiserror::Error;

/// 変換エラー（不正な入力テキスト）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("odd number of hex digits: {0}")]
    OddLength(usize),
    #[error("invalid IPv4 address: {0}")]
    InvalidIpv4(String),
    #[error("IPv4 hex must be exactly 8 digits, got {0}")]
    Ipv4Width(usize),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("character {0:?} is outside U+0000..=U+00FF")]
    NonLatin1(char),
    #[error("value 0x{value:x} does not fit in {width} hex digits")]
    TooWide { value: usize, width: usize },
}

/// ポートフィールドのバイトオーダー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// ワイヤ上の値がすでにネットワークバイトオーダー
    #[default]
    Network,
    /// ホスト→ネットワーク変換のため16ビットスワップを挟む
    Swapped,
}

/// HEX文字列を正規化する（空白除去・小文字化・検証）
pub fn normalize_hex(s: &str) -> Result<String, ConvertError> {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if let Some(bad) = cleaned.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ConvertError::InvalidHex(format!("unexpected character {bad:?}")));
    }
    if cleaned.len() % 2 != 0 {
        return Err(ConvertError::OddLength(cleaned.len()));
    }
    Ok(cleaned)
}

/// HEX文字列をバイト列に変換
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, ConvertError> {
    hex::decode(s).map_err(|e| ConvertError::InvalidHex(e.to_string()))
}

/// バイト列を小文字HEX文字列に変換
pub fn bytes_to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// 左側を '0' で埋めて `width` 桁にする（長い場合はそのまま）
pub fn pad_to_width(hex: &str, width: usize) -> String {
    format!("{hex:0>width$}")
}

/// 数値を `width` 桁のHEXに整形する
pub fn number_to_hex(value: usize, width: usize) -> Result<String, ConvertError> {
    let hex = pad_to_width(&format!("{value:x}"), width);
    if hex.len() > width {
        return Err(ConvertError::TooWide { value, width });
    }
    Ok(hex)
}

/// 16ビット値の上下バイトを入れ替える
///
/// 4桁に満たない場合は先に左詰めする: `[b0 b1 b2 b3] -> [b2 b3 b0 b1]`
pub fn swap16(hex: &str) -> Result<String, ConvertError> {
    if !is_hex16(hex) {
        return Err(ConvertError::InvalidHex(hex.to_string()));
    }
    Ok(swap_bytes(hex))
}

/// 4桁以内のASCII 16進数字だけからなるか
fn is_hex16(hex: &str) -> bool {
    hex.len() <= 4 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// 検証済み（[`is_hex16`]）の値を入れ替える
fn swap_bytes(hex: &str) -> String {
    let padded = pad_to_width(hex, 4);
    let (high, low) = padded.split_at(padded.len() - 2);
    format!("{low}{high}")
}

/// "a.b.c.d" 形式に変換（ちょうど8桁のみ受け付ける）
pub fn hex_to_ipv4(hex: &str) -> Result<String, ConvertError> {
    if hex.len() != 8 {
        return Err(ConvertError::Ipv4Width(hex.len()));
    }
    let octets = hex_to_bytes(hex)?;
    Ok(octets
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join("."))
}

/// "a.b.c.d" を8桁のHEXに変換
pub fn ipv4_to_hex(ip: &str) -> Result<String, ConvertError> {
    let parts: Vec<&str> = ip.trim().split('.').collect();
    if parts.len() != 4 {
        return Err(ConvertError::InvalidIpv4(ip.to_string()));
    }

    let mut hex = String::with_capacity(8);
    for part in parts {
        let octet: u8 = part
            .parse()
            .map_err(|_| ConvertError::InvalidIpv4(ip.to_string()))?;
        hex.push_str(&format!("{octet:02x}"));
    }
    Ok(hex)
}

/// HEXをポート番号に変換
pub fn hex_to_port(hex: &str, order: ByteOrder) -> Result<u16, ConvertError> {
    if hex.is_empty() || hex.len() > 4 {
        return Err(ConvertError::InvalidPort(hex.to_string()));
    }
    if !is_hex16(hex) {
        return Err(ConvertError::InvalidHex(hex.to_string()));
    }
    let wire = match order {
        ByteOrder::Network => hex.to_string(),
        ByteOrder::Swapped => swap_bytes(hex),
    };
    u16::from_str_radix(&wire, 16).map_err(|_| ConvertError::InvalidHex(hex.to_string()))
}

/// ポート番号を4桁のHEXに変換
pub fn port_to_hex(port: u16, order: ByteOrder) -> String {
    let hex = format!("{port:04x}");
    match order {
        ByteOrder::Network => hex,
        ByteOrder::Swapped => swap_bytes(&hex),
    }
}

/// 10進数のポート文字列を4桁のHEXに変換
pub fn port_text_to_hex(text: &str, order: ByteOrder) -> Result<String, ConvertError> {
    let port: u16 = text
        .trim()
        .parse()
        .map_err(|_| ConvertError::InvalidPort(text.to_string()))?;
    Ok(port_to_hex(port, order))
}

/// 1バイト1文字（Latin-1）としてテキストに変換
pub fn hex_to_ascii(hex: &str) -> Result<String, ConvertError> {
    Ok(hex_to_bytes(hex)?.into_iter().map(char::from).collect())
}

/// テキストを1文字1バイトのHEXに変換（U+00FFを超える文字はエラー）
pub fn ascii_to_hex(text: &str) -> Result<String, ConvertError> {
    let bytes = text
        .chars()
        .map(|c| u8::try_from(c).map_err(|_| ConvertError::NonLatin1(c)))
        .collect::<Result<Vec<u8>, _>>()?;
    Ok(bytes_to_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_round_trip() {
        for ip in ["0.0.0.0", "10.0.0.1", "192.168.1.254", "255.255.255.255"] {
            let hex = ipv4_to_hex(ip).unwrap();
            assert_eq!(hex.len(), 8);
            assert_eq!(hex_to_ipv4(&hex).unwrap(), ip);
        }
        assert_eq!(ipv4_to_hex("10.0.0.1").unwrap(), "0a000001");
    }

    #[test]
    fn test_ipv4_rejects_bad_input() {
        assert!(matches!(ipv4_to_hex("256.0.0.1"), Err(ConvertError::InvalidIpv4(_))));
        assert!(matches!(ipv4_to_hex("1.2.3"), Err(ConvertError::InvalidIpv4(_))));
        assert!(matches!(ipv4_to_hex("a.b.c.d"), Err(ConvertError::InvalidIpv4(_))));
        // 末尾の余分な桁は切り捨てずにエラー
        assert_eq!(hex_to_ipv4("0a00000102"), Err(ConvertError::Ipv4Width(10)));
        assert_eq!(hex_to_ipv4("0a00"), Err(ConvertError::Ipv4Width(4)));
    }

    #[test]
    fn test_port_round_trip_all_values() {
        for port in 0..=u16::MAX {
            for order in [ByteOrder::Network, ByteOrder::Swapped] {
                let hex = port_to_hex(port, order);
                assert_eq!(hex.len(), 4);
                assert_eq!(hex_to_port(&hex, order).unwrap(), port);
            }
        }
    }

    #[test]
    fn test_port_byte_order() {
        assert_eq!(port_to_hex(1234, ByteOrder::Network), "04d2");
        assert_eq!(port_to_hex(1234, ByteOrder::Swapped), "d204");
        assert_eq!(hex_to_port("04d2", ByteOrder::Network).unwrap(), 1234);
        assert_eq!(hex_to_port("d204", ByteOrder::Swapped).unwrap(), 1234);
        assert!(matches!(port_text_to_hex("65536", ByteOrder::Network), Err(ConvertError::InvalidPort(_))));
        assert!(matches!(port_text_to_hex("http", ByteOrder::Network), Err(ConvertError::InvalidPort(_))));
        assert_eq!(port_text_to_hex(" 53 ", ByteOrder::Network).unwrap(), "0035");
    }

    #[test]
    fn test_swap16_pads_first() {
        assert_eq!(swap16("abcd").unwrap(), "cdab");
        assert_eq!(swap16("1").unwrap(), "0100");
        assert_eq!(swap16("123").unwrap(), "2301");
    }

    #[test]
    fn test_non_hex_port_is_rejected_in_both_orders() {
        for order in [ByteOrder::Network, ByteOrder::Swapped] {
            assert_eq!(hex_to_port("\u{e9}a", order), Err(ConvertError::InvalidHex("\u{e9}a".to_string())));
            assert_eq!(hex_to_port("0x1", order), Err(ConvertError::InvalidHex("0x1".to_string())));
        }
        assert!(matches!(swap16("\u{e9}a"), Err(ConvertError::InvalidHex(_))));
        assert!(matches!(swap16("12345"), Err(ConvertError::InvalidHex(_))));
    }

    #[test]
    fn test_ascii_round_trip() {
        for text in ["", "hello world", "A\u{0}\u{7f}", "caf\u{e9}"] {
            let hex = ascii_to_hex(text).unwrap();
            assert_eq!(hex.len(), text.chars().count() * 2);
            assert_eq!(hex_to_ascii(&hex).unwrap(), text);
        }
        assert_eq!(ascii_to_hex("hi").unwrap(), "6869");
        assert_eq!(ascii_to_hex("\u{3042}"), Err(ConvertError::NonLatin1('\u{3042}')));
    }

    #[test]
    fn test_pad_and_number() {
        assert_eq!(pad_to_width("1c", 4), "001c");
        assert_eq!(pad_to_width("12345", 4), "12345");
        assert_eq!(number_to_hex(28, 4).unwrap(), "001c");
        assert_eq!(
            number_to_hex(0x10000, 4),
            Err(ConvertError::TooWide { value: 0x10000, width: 4 })
        );
    }

    #[test]
    fn test_normalize_hex() {
        assert_eq!(normalize_hex("45 00\n00 1C").unwrap(), "4500001c");
        assert_eq!(normalize_hex("abc"), Err(ConvertError::OddLength(3)));
        assert!(matches!(normalize_hex("zz"), Err(ConvertError::InvalidHex(_))));
    }
}
