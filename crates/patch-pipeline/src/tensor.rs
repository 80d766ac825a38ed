//! 軸指定の集約（keepdims）
//!
//! 集約結果は次元を残したまま返すので、元のテンソルとそのままブロードキャスト演算できる。

use ndarray::{ArrayD, ArrayView, ArrayView1, Axis, Dimension};

use crate::error::{PatchError, PatchResult};

/// 集約軸の検証（空・範囲外・重複はエラー）
pub fn validate_axes(axes: &[usize], rank: usize) -> PatchResult<()> {
    let invalid = axes.is_empty()
        || axes.iter().any(|&a| a >= rank)
        || axes.iter().enumerate().any(|(i, a)| axes[..i].contains(a));
    if invalid {
        return Err(PatchError::InvalidAxes {
            axes: axes.to_vec(),
            rank,
        });
    }
    Ok(())
}

/// 指定軸を順に `f` で畳み込み、長さ1の軸として残す
///
/// 平均・最小・最大のように軸ごとに分解できる集約にのみ使う。
pub fn reduce_keepdims<D, F>(x: ArrayView<'_, f32, D>, axes: &[usize], f: F) -> PatchResult<ArrayD<f32>>
where
    D: Dimension,
    F: Fn(ArrayView1<'_, f32>) -> f32,
{
    validate_axes(axes, x.ndim())?;
    let mut acc = x.into_dyn().to_owned();
    for &ax in axes {
        acc = acc.map_axis(Axis(ax), |lane| f(lane)).insert_axis(Axis(ax));
    }
    Ok(acc)
}

fn lane_mean(lane: ArrayView1<'_, f32>) -> f32 {
    if lane.is_empty() {
        return 0.0;
    }
    lane.sum() / lane.len() as f32
}

pub fn mean_keepdims<D: Dimension>(x: ArrayView<'_, f32, D>, axes: &[usize]) -> PatchResult<ArrayD<f32>> {
    reduce_keepdims(x, axes, lane_mean)
}

pub fn min_keepdims<D: Dimension>(x: ArrayView<'_, f32, D>, axes: &[usize]) -> PatchResult<ArrayD<f32>> {
    reduce_keepdims(x, axes, |lane| lane.fold(f32::INFINITY, |m, &v| m.min(v)))
}

pub fn max_keepdims<D: Dimension>(x: ArrayView<'_, f32, D>, axes: &[usize]) -> PatchResult<ArrayD<f32>> {
    reduce_keepdims(x, axes, |lane| lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v)))
}

/// 平均と分散（母分散）
pub fn moments<D: Dimension>(
    x: ArrayView<'_, f32, D>,
    axes: &[usize],
) -> PatchResult<(ArrayD<f32>, ArrayD<f32>)> {
    let mean = mean_keepdims(x.view(), axes)?;
    let centered = &x.into_dyn() - &mean;
    let sq = centered.mapv(|v| v * v);
    let variance = mean_keepdims(sq.view(), axes)?;
    Ok((mean, variance))
}
