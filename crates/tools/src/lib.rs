//! パッチデータセット用のコマンドラインツール群の共通部分

pub mod stats;
pub mod synth;
