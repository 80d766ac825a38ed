//! 幾何変換による拡張（左右反転・上下反転・90度回転）
//!
//! 特徴量とラベルを重ねたスタック全体に同じ変換をかけることで、両者の位置対応を保つ。

use ndarray::{Array3, ArrayView3, ArrayViewD, Axis, Ix3};
use rand::Rng;

use crate::error::{PatchError, PatchResult};

/// 1回分の乱数の引き
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometricDraw {
    pub flip_left_right: bool,
    pub flip_up_down: bool,
    /// 反時計回りの 90 度回転回数 (0..4)
    pub quarter_turns: u8,
}

impl GeometricDraw {
    pub const IDENTITY: Self = Self {
        flip_left_right: false,
        flip_up_down: false,
        quarter_turns: 0,
    };

    /// 3つを独立に一様に引く
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            flip_left_right: rng.random_bool(0.5),
            flip_up_down: rng.random_bool(0.5),
            quarter_turns: rng.random_range(0..4u8),
        }
    }

    /// 左右反転 → 上下反転 → 回転 の順に適用
    ///
    /// 奇数回の回転では H と W が入れ替わる。
    pub fn apply(&self, patch: ArrayView3<'_, f32>) -> Array3<f32> {
        let mut v = patch;
        if self.flip_left_right {
            v.invert_axis(Axis(1));
        }
        if self.flip_up_down {
            v.invert_axis(Axis(0));
        }
        for _ in 0..self.quarter_turns % 4 {
            // out[i, j] = in[j, W-1-i]
            v.invert_axis(Axis(1));
            v.swap_axes(0, 1);
        }
        v.as_standard_layout().into_owned()
    }
}

/// HWC パッチにランダムな幾何変換をかける
pub fn augment_geometry<R: Rng + ?Sized>(patch: ArrayView3<'_, f32>, rng: &mut R) -> Array3<f32> {
    GeometricDraw::sample(rng).apply(patch)
}

/// HWC または 1×H×W×C を受け取り、常に HWC を返す
pub fn augment_geometry_dyn<R: Rng + ?Sized>(
    patch: ArrayViewD<'_, f32>,
    rng: &mut R,
) -> PatchResult<Array3<f32>> {
    let hwc = squeeze_leading(patch)?;
    Ok(augment_geometry(hwc, rng))
}

fn squeeze_leading(patch: ArrayViewD<'_, f32>) -> PatchResult<ArrayView3<'_, f32>> {
    let patch = match patch.ndim() {
        4 if patch.shape()[0] == 1 => patch.index_axis_move(Axis(0), 0),
        3 => patch,
        _ => {
            return Err(PatchError::InvalidArgument(format!(
                "expected HWC or 1xHxWxC patch, got shape {:?}",
                patch.shape()
            )));
        }
    };
    Ok(patch.into_dimensionality::<Ix3>()?)
}
