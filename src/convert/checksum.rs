//! 1の補数チェックサム（RFC 1071）と、同梱の長さ・チェックサム計算フィールド
//!
//! バイト配置は固定: 0..20 が IPv4 ヘッダ、20..28 が UDP ヘッダ、28.. がペイロード。

use super::{hex_to_bytes, number_to_hex, ConvertError};

pub const IP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const PROTOCOL_OFFSET: usize = 9;
pub const IP_CHECKSUM_OFFSET: usize = 10;
pub const SRC_IP_OFFSET: usize = 12;
pub const DST_IP_OFFSET: usize = 16;
pub const UDP_LENGTH_OFFSET: usize = 24;
pub const UDP_CHECKSUM_OFFSET: usize = 26;

/// キャリーを下位16ビットに折り返す
fn fold(mut sum: u64) -> u16 {
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// 16ビットワードの1の補数和を反転した値（奇数長は末尾を0で埋める）
pub fn internet_checksum(data: &[u8]) -> u16 {
    let sum: u64 = data
        .chunks(2)
        .map(|word| match word {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u64,
            [hi] => u16::from_be_bytes([*hi, 0]) as u64,
            _ => 0,
        })
        .sum();
    !fold(sum)
}

/// HEX文字列の1の補数チェックサム（4桁）
///
/// 4桁に満たない最後のワードは末尾を '0' で埋める。
pub fn ones_complement(hex: &str) -> Result<String, ConvertError> {
    let mut padded = hex.to_string();
    while padded.len() % 4 != 0 {
        padded.push('0');
    }
    let data = hex_to_bytes(&padded)?;
    Ok(format!("{:04x}", internet_checksum(&data)))
}

/// `start` から `len` バイトを取り出す（範囲外は0）
fn range_or_zero(data: &[u8], start: usize, len: usize) -> Vec<u8> {
    (start..start + len)
        .map(|i| data.get(i).copied().unwrap_or(0))
        .collect()
}

/// パケット全体のバイト長（IP Total Length）
pub fn total_length(buffer: &str) -> Result<String, ConvertError> {
    number_to_hex(buffer.len() / 2, 4)
}

/// IPヘッダを除いたバイト長（UDP Length）
pub fn udp_length(buffer: &str) -> Result<String, ConvertError> {
    number_to_hex((buffer.len() / 2).saturating_sub(IP_HEADER_LEN), 4)
}

/// IPヘッダチェックサム（チェックサム欄は0として計算）
pub fn ip_header_checksum(buffer: &str) -> Result<String, ConvertError> {
    let data = hex_to_bytes(buffer)?;
    let mut header = range_or_zero(&data, 0, IP_HEADER_LEN);
    header[IP_CHECKSUM_OFFSET] = 0;
    header[IP_CHECKSUM_OFFSET + 1] = 0;
    Ok(format!("{:04x}", internet_checksum(&header)))
}

/// UDPチェックサム（疑似ヘッダ + UDPヘッダ + データ、チェックサム欄は0）
pub fn udp_checksum(buffer: &str) -> Result<String, ConvertError> {
    let data = hex_to_bytes(buffer)?;

    let mut segment = Vec::with_capacity(12 + data.len().saturating_sub(IP_HEADER_LEN));
    // 疑似ヘッダ: 送信元IP, 宛先IP, 0, プロトコル, UDP長
    segment.extend(range_or_zero(&data, SRC_IP_OFFSET, 4));
    segment.extend(range_or_zero(&data, DST_IP_OFFSET, 4));
    segment.push(0);
    segment.extend(range_or_zero(&data, PROTOCOL_OFFSET, 1));
    segment.extend(range_or_zero(&data, UDP_LENGTH_OFFSET, 2));

    let mut udp_header = range_or_zero(&data, IP_HEADER_LEN, UDP_HEADER_LEN);
    let rel = UDP_CHECKSUM_OFFSET - IP_HEADER_LEN;
    udp_header[rel] = 0;
    udp_header[rel + 1] = 0;
    segment.extend(udp_header);
    segment.extend(data.iter().skip(IP_HEADER_LEN + UDP_HEADER_LEN));

    Ok(format!("{:04x}", internet_checksum(&segment)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "4500002700004000401126c40a0000010a00000204d214e90013403c68656c6c6f20776f726c64";
    const EMPTY: &str = "4500001c00004000401126cf0a0000010a00000204d214e90008d220";
    const ODD: &str = "4500001f00004000401126cc0a0000010a00000204d214e9000bf0b4686579";

    #[test]
    fn test_reference_ip_header() {
        assert_eq!(ones_complement("4500001c00000000401100000a0000010a000002").unwrap(), "66cf");
        // 既存のチェックサム欄は無視される
        assert_eq!(
            ip_header_checksum("4500001c00000000401166cf0a0000010a000002").unwrap(),
            "66cf"
        );
    }

    #[test]
    fn test_reference_packets() {
        for (packet, ip, udp) in [(HELLO, "26c4", "403c"), (EMPTY, "26cf", "d220"), (ODD, "26cc", "f0b4")] {
            assert_eq!(ip_header_checksum(packet).unwrap(), ip);
            assert_eq!(udp_checksum(packet).unwrap(), udp);
            assert_eq!(&packet[20..24], ip);
            assert_eq!(&packet[52..56], udp);
        }
    }

    #[test]
    fn test_lengths() {
        assert_eq!(total_length(HELLO).unwrap(), "0027");
        assert_eq!(udp_length(HELLO).unwrap(), "0013");
        assert_eq!(total_length(EMPTY).unwrap(), "001c");
        assert_eq!(udp_length(EMPTY).unwrap(), "0008");
        assert_eq!(udp_length("4500").unwrap(), "0000");
    }

    #[test]
    fn test_carry_folding() {
        assert_eq!(ones_complement("").unwrap(), "ffff");
        assert_eq!(ones_complement("ffff").unwrap(), "0000");
        // 0xffff + 0xffff = 0x1fffe -> 0xffff
        assert_eq!(ones_complement("ffffffff").unwrap(), "0000");
        assert_eq!(ones_complement("0001f203f4f5f6f7").unwrap(), "220d");
        assert_eq!(ones_complement("abc").unwrap(), "543f");
        assert_eq!(internet_checksum(&[0xab]), !0xab00);
    }

    #[test]
    fn test_short_buffer_reads_zeros() {
        assert_eq!(ip_header_checksum("").unwrap(), "ffff");
        assert!(udp_checksum("45").is_ok());
        assert!(ip_header_checksum("4g").is_err());
    }
}
