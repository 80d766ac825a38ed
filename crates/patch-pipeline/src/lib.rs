//! 衛星・航空画像パッチの前処理パイプライン
//!
//! gzip 圧縮された TFRecord（`tf.train.Example`）からパッチを読み、
//! 幾何変換・色の拡張・正規化をかけて (バンド, ラベル) の組を遅延評価で返す。
//!
//! ```no_run
//! use patch_pipeline::{PipelineConfig, Schema, get_training_dataset};
//!
//! # fn main() -> patch_pipeline::PatchResult<()> {
//! let schema = Schema::load("schema.toml")?;
//! let config = PipelineConfig::default();
//! let files = ["train_0.tfrecord.gz", "train_1.tfrecord.gz"];
//! for batch in get_training_dataset(&files, &schema, 1000, 16, &config)?.take(100) {
//!     let batch = batch?;
//!     println!("bands {:?} labels {:?}", batch.bands.dim(), batch.labels.dim());
//! }
//! # Ok(())
//! # }
//! ```

pub mod augment;
pub mod config;
pub mod dataset;
pub mod error;
pub mod normalize;
pub mod record;
pub mod schema;
pub mod tensor;
pub mod tuple;

pub use augment::{ColorAugmenter, ColorStrategy, GeometricDraw, augment_geometry};
pub use config::PipelineConfig;
pub use dataset::{
    Batch, EvalDataset, PatchDataset, TrainingDataset, get_dataset, get_eval_dataset,
    get_training_dataset,
};
pub use error::{PatchError, PatchResult};
pub use normalize::{Normalization, normalize, rescale};
pub use schema::{DType, FeatureSpec, ParsedRecord, Schema};
pub use tuple::{Sample, to_tuple};
