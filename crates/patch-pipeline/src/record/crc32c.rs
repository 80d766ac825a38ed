//! CRC-32C（Castagnoli）とTFRecord用のマスク処理

/// 反転表現の生成多項式
const POLY: u32 = 0x82F6_3B78;

/// TFRecord のマスク定数
const MASK_DELTA: u32 = 0xA282_EAD8;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// バイト列の CRC-32C
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &b in data {
        crc = TABLE[((crc ^ b as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    !crc
}

/// TFRecord のヘッダ / フッタに書かれるマスク済み CRC
pub fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c(data);
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32c_check_value() {
        // CRC-32C の標準チェック値
        assert_eq!(crc32c(b"123456789"), 0xE306_9283);
        assert_eq!(crc32c(b""), 0);
    }

    #[test]
    fn test_masked_crc_differs_from_raw() {
        let raw = crc32c(b"patch");
        let masked = masked_crc32c(b"patch");
        assert_ne!(raw, masked);
        assert_eq!(masked, ((raw >> 15) | (raw << 17)).wrapping_add(MASK_DELTA));
    }
}
