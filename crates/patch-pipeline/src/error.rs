//! Error types for the patch pipeline

use crate::schema::DType;

/// パイプライン全体で共通のエラー
#[derive(thiserror::Error, Debug)]
pub enum PatchError {
    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// レコードのフレームが途中で切れている
    #[error("truncated record: {0}")]
    Truncated(&'static str),

    /// CRC不一致など、フレーム自体が壊れている
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// protobuf のデコード失敗
    #[error("decode error: {0}")]
    Decode(String),

    /// スキーマにある特徴量がレコードに存在しない
    #[error("feature `{0}` not found in record")]
    MissingFeature(String),

    /// 値の型がスキーマと一致しない
    #[error("feature `{name}`: expected {expected:?} values")]
    DTypeMismatch { name: String, expected: DType },

    /// 要素数がスキーマの shape と一致しない
    #[error("feature `{name}`: expected {expected} values, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// ndarray の形状エラー（stack 時の H×W 不一致など）
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// チャンネル数の前提違反
    #[error("expected {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// 集約軸の指定が不正
    #[error("invalid axes {axes:?} for rank {rank}")]
    InvalidAxes { axes: Vec<usize>, rank: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 設定ファイル / スキーマファイルの読み込みエラー
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for pipeline operations
pub type PatchResult<T> = Result<T, PatchError>;
