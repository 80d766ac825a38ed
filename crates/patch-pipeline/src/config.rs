//! パイプライン設定
//!
//! TOML から読み込む。省略した項目は既定値になる。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::augment::ColorStrategy;
use crate::error::{PatchError, PatchResult};
use crate::normalize::Normalization;
use crate::record::Compression;

/// 前処理パイプラインの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// シード値（レコードごとの乱数はここから派生させる）
    pub seed: u64,
    /// パース + タプル化の並列数
    pub num_parallel_calls: usize,
    /// 入力ファイルの圧縮形式
    pub compression: Compression,
    /// 幾何変換（反転・回転）を行うか
    pub geometric: bool,
    /// バンドに使う色の拡張
    pub color: ColorStrategy,
    /// バンドの正規化
    pub normalization: Normalization,
    /// ラベルの上限（これを超える値は上限に丸める。下限は丸めない）
    pub label_ceiling: f32,
    /// 学習用データセットでエポックごとにシャッフル順を変えるか
    pub reshuffle_each_iteration: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_parallel_calls: 5,
            compression: Compression::Gzip,
            geometric: true,
            color: ColorStrategy::default(),
            normalization: Normalization::default(), // チャンネルごとの z-score
            label_ceiling: 1.0,
            reshuffle_each_iteration: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> PatchResult<()> {
        if self.num_parallel_calls == 0 {
            return Err(PatchError::Config("num_parallel_calls must be >= 1".into()));
        }
        if !self.label_ceiling.is_finite() {
            return Err(PatchError::Config("label_ceiling must be finite".into()));
        }
        self.color.validate()?;
        self.normalization.validate()
    }

    pub fn from_toml_str(s: &str) -> PatchResult<Self> {
        let config: PipelineConfig =
            toml::from_str(s).map_err(|e| PatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PatchResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// 拡張なし（評価・検証向け）。正規化は残す。
    pub fn without_augmentation(mut self) -> Self {
        self.geometric = false;
        self.color = ColorStrategy::None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::HueSaturationJitter;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.num_parallel_calls, 5);
        assert_eq!(config.label_ceiling, 1.0);
    }

    #[test]
    fn test_full_toml() {
        let text = r#"
seed = 7
num_parallel_calls = 2
compression = "none"
geometric = false
label_ceiling = 2.0

[color]
kind = "hue_saturation"

[normalization]
kind = "min_max"
axes = [0, 1]
"#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.compression, Compression::None);
        assert!(!config.geometric);
        assert_eq!(config.color, ColorStrategy::HueSaturation(HueSaturationJitter::default()));
        assert_eq!(config.normalization, Normalization::MinMax { axes: vec![0, 1] });
    }

    #[test]
    fn test_invalid_config() {
        assert!(PipelineConfig::from_toml_str("num_parallel_calls = 0").is_err());
        assert!(PipelineConfig::from_toml_str("[color]\nkind = \"mean_relative\"\ncontrast_adj = 1.5\n").is_err());
        assert!(PipelineConfig::from_toml_str("unknown_kind = [").is_err());
    }

    #[test]
    fn test_invalid_normalization_is_rejected_at_load() {
        let bad_axes = "[normalization]\nkind = \"z_score\"\naxes = [7]\n";
        assert!(matches!(
            PipelineConfig::from_toml_str(bad_axes),
            Err(PatchError::InvalidAxes { rank: 3, .. })
        ));
        let dup_axes = "[normalization]\nkind = \"min_max\"\naxes = [1, 1]\n";
        assert!(PipelineConfig::from_toml_str(dup_axes).is_err());
        let negative_eps = "[normalization]\nkind = \"z_score\"\nepsilon = -1.0\n";
        assert!(matches!(PipelineConfig::from_toml_str(negative_eps), Err(PatchError::Config(_))));

        let per_pixel = "[normalization]\nkind = \"z_score\"\naxes = [2]\nepsilon = 0.0\n";
        assert!(PipelineConfig::from_toml_str(per_pixel).is_ok());
    }
}
