//! 入力レコード（gzip 圧縮 TFRecord + `tf.train.Example`）

pub mod crc32c;
pub mod example;
pub mod tfrecord;
pub mod varint;

pub use example::{Example, Feature};
pub use tfrecord::{Compression, RecordReader, RecordWriter, frame_record, open_records};
