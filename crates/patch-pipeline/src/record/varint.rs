//! Base 128 Varint（符号なし LEB128）
//!
//! protobuf のワイヤ形式で使用される可変長整数エンコーディング。

use crate::error::{PatchError, PatchResult};

/// 64bit値の最大バイト数
const MAX_VARINT_LEN: usize = 10;

/// 符号なしvarintを読み込み、読んだ分だけスライスを進める
///
/// 各バイトの下位7ビットがデータ、最上位ビットが継続フラグ。
/// 継続フラグが0になるまで読み込む。
pub fn read_varint(buf: &mut &[u8]) -> PatchResult<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for i in 0..MAX_VARINT_LEN {
        let Some((&b, rest)) = buf.split_first() else {
            return Err(PatchError::Decode("unexpected end of varint".into()));
        };
        *buf = rest;

        // 10バイト目は下位1ビットしか使えない
        if i == MAX_VARINT_LEN - 1 && b > 1 {
            return Err(PatchError::Decode("varint overflow: value too large".into()));
        }

        result |= ((b & 0x7f) as u64) << shift;
        shift += 7;

        if b & 0x80 == 0 {
            return Ok(result);
        }
    }

    Err(PatchError::Decode("varint overflow: value too large".into()))
}

/// 符号なしvarintを書き込み
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// varintのエンコード後のバイト数
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}
