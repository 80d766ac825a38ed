//! `tf.train.Example` の最小限の protobuf コーデック
//!
//! ```text
//! Example  { Features features = 1; }
//! Features { map<string, Feature> feature = 1; }
//! Feature  { oneof kind { BytesList bytes_list = 1;
//!                         FloatList float_list = 2;
//!                         Int64List int64_list = 3; } }
//! ```
//!
//! 未知のフィールドは読み飛ばす。

use std::collections::BTreeMap;

use super::varint::{read_varint, varint_len, write_varint};
use crate::error::{PatchError, PatchResult};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// 1特徴量の値リスト
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Bytes(Vec<Vec<u8>>),
    Float(Vec<f32>),
    Int64(Vec<i64>),
}

impl Feature {
    pub fn len(&self) -> usize {
        match self {
            Feature::Bytes(v) => v.len(),
            Feature::Float(v) => v.len(),
            Feature::Int64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// デコード済みの Example（キー順で保持）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Example {
    pub features: BTreeMap<String, Feature>,
}

impl Example {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, feature: Feature) {
        self.features.insert(name.into(), feature);
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }

    /// シリアライズ済みバイト列からデコード
    pub fn decode(mut buf: &[u8]) -> PatchResult<Self> {
        let mut example = Example::new();
        while !buf.is_empty() {
            let (field, wire) = read_key(&mut buf)?;
            match (field, wire) {
                (1, WIRE_LEN) => {
                    let features = read_len_delimited(&mut buf)?;
                    decode_features(features, &mut example.features)?;
                }
                _ => skip_field(&mut buf, wire)?,
            }
        }
        Ok(example)
    }

    /// protobuf のワイヤ形式にエンコード（数値リストは packed）
    pub fn encode(&self) -> Vec<u8> {
        let mut features = Vec::new();
        for (name, feature) in &self.features {
            let value = encode_feature(feature);

            let mut entry = Vec::with_capacity(name.len() + value.len() + 8);
            write_len_field(&mut entry, 1, name.as_bytes());
            write_len_field(&mut entry, 2, &value);

            write_len_field(&mut features, 1, &entry);
        }

        let mut out = Vec::with_capacity(features.len() + 8);
        write_len_field(&mut out, 1, &features);
        out
    }
}

fn read_key(buf: &mut &[u8]) -> PatchResult<(u64, u8)> {
    let key = read_varint(buf)?;
    Ok((key >> 3, (key & 0x7) as u8))
}

fn read_len_delimited<'a>(buf: &mut &'a [u8]) -> PatchResult<&'a [u8]> {
    let len = read_varint(buf)? as usize;
    if len > buf.len() {
        return Err(PatchError::Decode(format!(
            "length-delimited field of {len} bytes exceeds remaining {}",
            buf.len()
        )));
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> PatchResult<&'a [u8]> {
    if n > buf.len() {
        return Err(PatchError::Decode("unexpected end of message".into()));
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

fn skip_field(buf: &mut &[u8], wire: u8) -> PatchResult<()> {
    match wire {
        WIRE_VARINT => {
            read_varint(buf)?;
        }
        WIRE_FIXED64 => {
            take(buf, 8)?;
        }
        WIRE_LEN => {
            read_len_delimited(buf)?;
        }
        WIRE_FIXED32 => {
            take(buf, 4)?;
        }
        other => {
            return Err(PatchError::Decode(format!("unsupported wire type {other}")));
        }
    }
    Ok(())
}

fn decode_features(mut buf: &[u8], out: &mut BTreeMap<String, Feature>) -> PatchResult<()> {
    while !buf.is_empty() {
        let (field, wire) = read_key(&mut buf)?;
        match (field, wire) {
            (1, WIRE_LEN) => {
                let entry = read_len_delimited(&mut buf)?;
                let (name, feature) = decode_map_entry(entry)?;
                out.insert(name, feature);
            }
            _ => skip_field(&mut buf, wire)?,
        }
    }
    Ok(())
}

fn decode_map_entry(mut buf: &[u8]) -> PatchResult<(String, Feature)> {
    let mut name = String::new();
    // 値が省略されたエントリは空の Feature として扱う
    let mut feature = Feature::Bytes(Vec::new());
    while !buf.is_empty() {
        let (field, wire) = read_key(&mut buf)?;
        match (field, wire) {
            (1, WIRE_LEN) => {
                let raw = read_len_delimited(&mut buf)?;
                name = String::from_utf8(raw.to_vec())
                    .map_err(|e| PatchError::Decode(format!("feature name is not UTF-8: {e}")))?;
            }
            (2, WIRE_LEN) => {
                feature = decode_feature(read_len_delimited(&mut buf)?)?;
            }
            _ => skip_field(&mut buf, wire)?,
        }
    }
    Ok((name, feature))
}

fn decode_feature(mut buf: &[u8]) -> PatchResult<Feature> {
    let mut feature = Feature::Bytes(Vec::new());
    while !buf.is_empty() {
        let (field, wire) = read_key(&mut buf)?;
        match (field, wire) {
            (1, WIRE_LEN) => feature = Feature::Bytes(decode_bytes_list(read_len_delimited(&mut buf)?)?),
            (2, WIRE_LEN) => feature = Feature::Float(decode_float_list(read_len_delimited(&mut buf)?)?),
            (3, WIRE_LEN) => feature = Feature::Int64(decode_int64_list(read_len_delimited(&mut buf)?)?),
            _ => skip_field(&mut buf, wire)?,
        }
    }
    Ok(feature)
}

fn decode_bytes_list(mut buf: &[u8]) -> PatchResult<Vec<Vec<u8>>> {
    let mut values = Vec::new();
    while !buf.is_empty() {
        let (field, wire) = read_key(&mut buf)?;
        match (field, wire) {
            (1, WIRE_LEN) => values.push(read_len_delimited(&mut buf)?.to_vec()),
            _ => skip_field(&mut buf, wire)?,
        }
    }
    Ok(values)
}

fn decode_float_list(mut buf: &[u8]) -> PatchResult<Vec<f32>> {
    let mut values = Vec::new();
    while !buf.is_empty() {
        let (field, wire) = read_key(&mut buf)?;
        match (field, wire) {
            // packed
            (1, WIRE_LEN) => {
                let packed = read_len_delimited(&mut buf)?;
                if packed.len() % 4 != 0 {
                    return Err(PatchError::Decode(format!(
                        "packed float list of {} bytes is not a multiple of 4",
                        packed.len()
                    )));
                }
                values.reserve(packed.len() / 4);
                values.extend(
                    packed
                        .chunks_exact(4)
                        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                );
            }
            // unpacked
            (1, WIRE_FIXED32) => {
                let c = take(&mut buf, 4)?;
                values.push(f32::from_le_bytes([c[0], c[1], c[2], c[3]]));
            }
            _ => skip_field(&mut buf, wire)?,
        }
    }
    Ok(values)
}

fn decode_int64_list(mut buf: &[u8]) -> PatchResult<Vec<i64>> {
    let mut values = Vec::new();
    while !buf.is_empty() {
        let (field, wire) = read_key(&mut buf)?;
        match (field, wire) {
            (1, WIRE_LEN) => {
                let mut packed = read_len_delimited(&mut buf)?;
                while !packed.is_empty() {
                    values.push(read_varint(&mut packed)? as i64);
                }
            }
            (1, WIRE_VARINT) => values.push(read_varint(&mut buf)? as i64),
            _ => skip_field(&mut buf, wire)?,
        }
    }
    Ok(values)
}

fn write_key(out: &mut Vec<u8>, field: u64, wire: u8) {
    write_varint(out, (field << 3) | wire as u64);
}

fn write_len_field(out: &mut Vec<u8>, field: u64, data: &[u8]) {
    write_key(out, field, WIRE_LEN);
    write_varint(out, data.len() as u64);
    out.extend_from_slice(data);
}

fn encode_feature(feature: &Feature) -> Vec<u8> {
    let mut list = Vec::new();
    let field = match feature {
        Feature::Bytes(values) => {
            for v in values {
                write_len_field(&mut list, 1, v);
            }
            1
        }
        Feature::Float(values) => {
            if !values.is_empty() {
                let mut packed = Vec::with_capacity(values.len() * 4);
                for v in values {
                    packed.extend_from_slice(&v.to_le_bytes());
                }
                write_len_field(&mut list, 1, &packed);
            }
            2
        }
        Feature::Int64(values) => {
            if !values.is_empty() {
                let size: usize = values.iter().map(|&v| varint_len(v as u64)).sum();
                let mut packed = Vec::with_capacity(size);
                for &v in values {
                    write_varint(&mut packed, v as u64);
                }
                write_len_field(&mut list, 1, &packed);
            }
            3
        }
    };

    let mut out = Vec::with_capacity(list.len() + 4);
    write_len_field(&mut out, field, &list);
    out
}
