//! パッチの標準化 / 正規化
//!
//! 軸の指定で粒度が決まる（HWC の場合）:
//! - `[2]`: ピクセルごと（チャンネル方向）
//! - `[0, 1]`: チャンネルごと（空間方向）
//! - `[0, 1, 2]`: パッチ全体

use ndarray::{Array, ArrayView, Dimension, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{PatchError, PatchResult};
use crate::tensor::{max_keepdims, min_keepdims, moments, validate_axes};

/// ゼロ除算回避用の既定値
pub const DEFAULT_EPSILON: f32 = 1e-8;

/// 平均と分散で標準化する（z-score）
///
/// `(x - mean) / sqrt(variance + epsilon)`
pub fn normalize<D: Dimension>(
    x: ArrayView<'_, f32, D>,
    axes: &[usize],
    epsilon: f32,
) -> PatchResult<Array<f32, D>> {
    let (mean, variance) = moments(x.view(), axes)?;
    let std = variance.mapv(|v| (v + epsilon).sqrt());
    let normed = (&x.into_dyn() - &mean) / &std;
    Ok(normed.into_dimensionality::<D>()?)
}

/// 最小値・最大値で [0, 1] に線形変換する
///
/// 指定軸上で `max == min` の箇所は 0.0 を返す。
pub fn rescale<D: Dimension>(x: ArrayView<'_, f32, D>, axes: &[usize]) -> PatchResult<Array<f32, D>> {
    let minimum = min_keepdims(x.view(), axes)?;
    let maximum = max_keepdims(x.view(), axes)?;
    let range = &maximum - &minimum;

    if range.iter().any(|&r| r <= 0.0) {
        log::warn!("rescale: zero value range over axes {axes:?}, mapping flat slices to 0.0");
    }

    let mut scaled = &x.into_dyn() - &minimum;
    Zip::from(&mut scaled).and_broadcast(&range).for_each(|v, &r| {
        *v = if r > 0.0 { *v / r } else { 0.0 };
    });
    Ok(scaled.into_dimensionality::<D>()?)
}

fn default_zscore_axes() -> Vec<usize> {
    vec![0, 1]
}

fn default_minmax_axes() -> Vec<usize> {
    vec![2]
}

fn default_epsilon() -> f32 {
    DEFAULT_EPSILON
}

/// バンドに適用する正規化方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    ZScore {
        #[serde(default = "default_zscore_axes")]
        axes: Vec<usize>,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    MinMax {
        #[serde(default = "default_minmax_axes")]
        axes: Vec<usize>,
    },
    None,
}

impl Normalization {
    /// HWC パッチに対する軸と epsilon の検証
    pub fn validate(&self) -> PatchResult<()> {
        match self {
            Normalization::ZScore { axes, epsilon } => {
                validate_axes(axes, 3)?;
                if !(epsilon.is_finite() && *epsilon >= 0.0) {
                    return Err(PatchError::Config(format!("epsilon must be >= 0, got {epsilon}")));
                }
                Ok(())
            }
            Normalization::MinMax { axes } => validate_axes(axes, 3),
            Normalization::None => Ok(()),
        }
    }
}

impl Default for Normalization {
    /// チャンネルごとの z-score
    fn default() -> Self {
        Normalization::ZScore {
            axes: default_zscore_axes(),
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl Normalization {
    pub fn apply<D: Dimension>(&self, x: ArrayView<'_, f32, D>) -> PatchResult<Array<f32, D>> {
        match self {
            Normalization::ZScore { axes, epsilon } => normalize(x, axes, *epsilon),
            Normalization::MinMax { axes } => rescale(x, axes),
            Normalization::None => Ok(x.to_owned()),
        }
    }
}
