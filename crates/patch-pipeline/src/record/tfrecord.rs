//! TFRecord ファイルの読み書き（gzip対応）
//!
//! 1レコードのフレーム:
//! `u64 LE 長さ | u32 LE マスク済みCRC(長さ) | データ | u32 LE マスク済みCRC(データ)`

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use super::crc32c::masked_crc32c;
use crate::error::{PatchError, PatchResult};

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

/// 1レコードの上限（壊れた長さフィールドで巨大確保しないため）
const MAX_RECORD_LEN: u64 = 1 << 31;

/// 入力ファイルの圧縮形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Gzip,
    None,
}

/// ファイルを開いてレコードリーダーを作る
pub fn open_records<P: AsRef<Path>>(
    path: P,
    compression: Compression,
) -> PatchResult<RecordReader<Box<dyn Read + Send>>> {
    let p = path.as_ref();
    let f = File::open(p)?;
    log::debug!("opening record file {} ({compression:?})", p.display());
    let inner: Box<dyn Read + Send> = match compression {
        Compression::Gzip => {
            let dec = MultiGzDecoder::new(f);
            Box::new(BufReader::with_capacity(READER_BUF_CAP, dec))
        }
        Compression::None => Box::new(BufReader::with_capacity(READER_BUF_CAP, f)),
    };
    Ok(RecordReader::new(inner))
}

/// TFRecord のフレームを順に読み出すリーダー
pub struct RecordReader<R> {
    inner: R,
    records_read: u64,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            records_read: 0,
        }
    }

    /// 読み込み済みのレコード数
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// 次のレコードを読む。フレーム境界でのEOFなら `Ok(None)`。
    pub fn read_record(&mut self) -> PatchResult<Option<Vec<u8>>> {
        let mut header = [0u8; 12];
        if !read_exact_or_eof(&mut self.inner, &mut header)? {
            return Ok(None);
        }

        let len_bytes: [u8; 8] = header[..8].try_into().map_err(|_| PatchError::Truncated("length"))?;
        let len_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if masked_crc32c(&len_bytes) != len_crc {
            return Err(PatchError::Corrupt(format!(
                "length checksum mismatch at record {}",
                self.records_read
            )));
        }

        let len = u64::from_le_bytes(len_bytes);
        if len > MAX_RECORD_LEN {
            return Err(PatchError::Corrupt(format!("record length {len} too large")));
        }

        let mut data = vec![0u8; len as usize];
        self.inner.read_exact(&mut data).map_err(eof_as_truncated("data"))?;

        let mut footer = [0u8; 4];
        self.inner.read_exact(&mut footer).map_err(eof_as_truncated("data checksum"))?;
        if masked_crc32c(&data) != u32::from_le_bytes(footer) {
            return Err(PatchError::Corrupt(format!(
                "data checksum mismatch at record {}",
                self.records_read
            )));
        }

        self.records_read += 1;
        Ok(Some(data))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = PatchResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// バッファを埋める。先頭で即EOFなら `false`、途中で切れたら `Truncated`。
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> PatchResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(PatchError::Truncated("header")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn eof_as_truncated(what: &'static str) -> impl Fn(io::Error) -> PatchError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            PatchError::Truncated(what)
        } else {
            PatchError::Io(e)
        }
    }
}

/// 出力先。圧縮出力は close で finish しないとエラーが伝播しない。
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum RecordWriter {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl RecordWriter {
    pub fn create<P: AsRef<Path>>(path: P, compression: Compression) -> PatchResult<Self> {
        let f = BufWriter::new(File::create(path.as_ref())?);
        Ok(match compression {
            Compression::Gzip => {
                RecordWriter::Gz(GzEncoder::new(f, flate2::Compression::default()))
            }
            Compression::None => RecordWriter::Plain(f),
        })
    }

    /// 1レコードをフレーム化して書き込み
    pub fn write_record(&mut self, data: &[u8]) -> PatchResult<()> {
        let len_bytes = (data.len() as u64).to_le_bytes();
        self.write_all(&len_bytes)?;
        self.write_all(&masked_crc32c(&len_bytes).to_le_bytes())?;
        self.write_all(data)?;
        self.write_all(&masked_crc32c(data).to_le_bytes())?;
        Ok(())
    }

    /// ストリームを閉じてファイルまで書き出す
    pub fn close(self) -> PatchResult<()> {
        match self {
            RecordWriter::Plain(mut f) => f.flush()?,
            RecordWriter::Gz(e) => {
                let mut f = e.finish()?;
                f.flush()?
            }
        }
        Ok(())
    }
}

impl Write for RecordWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RecordWriter::Plain(f) => f.write(buf),
            RecordWriter::Gz(e) => e.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            RecordWriter::Plain(f) => f.flush(),
            RecordWriter::Gz(e) => e.flush(),
        }
    }
}

/// メモリ上でフレーム化する（テスト・ツール用）
pub fn frame_record(out: &mut Vec<u8>, data: &[u8]) {
    let len_bytes = (data.len() as u64).to_le_bytes();
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(&masked_crc32c(&len_bytes).to_le_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(&masked_crc32c(data).to_le_bytes());
}
