//! 色の拡張
//!
//! バンドにだけ適用する。方式は2つあり、設定で選ぶ。
//! - [`HueSaturationJitter`]: 色相 → 彩度 → 明るさ → コントラスト を順にランダム変更（RGB 3ch 専用）
//! - [`MeanRelativeJitter`]: チャンネル平均を中心にしたコントラスト / 明るさの乗算（任意チャンネル数）

use ndarray::{Array3, ArrayView3, Axis, Zip};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{PatchError, PatchResult};
use crate::tensor::mean_keepdims;

/// 色の拡張の共通インターフェース
pub trait ColorAugmenter {
    fn augment(&self, bands: ArrayView3<'_, f32>, rng: &mut dyn RngCore) -> PatchResult<Array3<f32>>;
}

/// [lo, hi) の一様乱数。幅0なら lo。
fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    if hi > lo { rng.random_range(lo..hi) } else { lo }
}

/// チャンネルごとの空間平均
fn channel_means(x: ArrayView3<'_, f32>) -> PatchResult<Vec<f32>> {
    Ok(mean_keepdims(x, &[0, 1])?.iter().copied().collect())
}

/// 各チャンネルに `(x - mean) * factor + mean` をかける
fn adjust_contrast(x: &mut Array3<f32>, factor: f32) -> PatchResult<()> {
    let means = channel_means(x.view())?;
    for (mut ch, mean) in x.axis_iter_mut(Axis(2)).zip(means) {
        ch.mapv_inplace(|v| (v - mean) * factor + mean);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 色相 / 彩度 / 明るさ / コントラスト
// ---------------------------------------------------------------------------

/// 色相・彩度・明るさ・コントラストのランダム変更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HueSaturationJitter {
    /// 色相シフトの最大幅（[-d, d]、色相は [0, 1) で循環）
    pub max_hue_delta: f32,
    /// 彩度の倍率範囲
    pub saturation: [f32; 2],
    /// 明るさの加算の最大幅
    pub max_brightness_delta: f32,
    /// コントラストの倍率範囲
    pub contrast: [f32; 2],
}

impl Default for HueSaturationJitter {
    fn default() -> Self {
        Self {
            max_hue_delta: 0.08,
            saturation: [0.6, 1.6],
            max_brightness_delta: 0.05,
            contrast: [0.7, 1.3],
        }
    }
}

impl HueSaturationJitter {
    pub fn validate(&self) -> PatchResult<()> {
        if !(0.0..=0.5).contains(&self.max_hue_delta) {
            return Err(PatchError::Config(format!(
                "max_hue_delta must be in [0, 0.5], got {}",
                self.max_hue_delta
            )));
        }
        if self.max_brightness_delta < 0.0 {
            return Err(PatchError::Config("max_brightness_delta must be >= 0".into()));
        }
        for (name, [lo, hi]) in [("saturation", self.saturation), ("contrast", self.contrast)] {
            if lo < 0.0 || lo > hi {
                return Err(PatchError::Config(format!("invalid {name} range [{lo}, {hi}]")));
            }
        }
        Ok(())
    }

    /// 乱数を引く（色相 → 彩度 → 明るさ → コントラストの順）
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> HueSaturationDraw {
        HueSaturationDraw {
            hue_delta: uniform(rng, -self.max_hue_delta, self.max_hue_delta),
            saturation_factor: uniform(rng, self.saturation[0], self.saturation[1]),
            brightness_delta: uniform(rng, -self.max_brightness_delta, self.max_brightness_delta),
            contrast_factor: uniform(rng, self.contrast[0], self.contrast[1]),
        }
    }
}

impl ColorAugmenter for HueSaturationJitter {
    fn augment(&self, bands: ArrayView3<'_, f32>, rng: &mut dyn RngCore) -> PatchResult<Array3<f32>> {
        let draw = self.draw(rng);
        draw.apply(bands)
    }
}

/// [`HueSaturationJitter`] の1回分の引き
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HueSaturationDraw {
    pub hue_delta: f32,
    pub saturation_factor: f32,
    pub brightness_delta: f32,
    pub contrast_factor: f32,
}

impl HueSaturationDraw {
    pub fn apply(&self, rgb: ArrayView3<'_, f32>) -> PatchResult<Array3<f32>> {
        let channels = rgb.dim().2;
        if channels != 3 {
            return Err(PatchError::ChannelMismatch {
                expected: 3,
                actual: channels,
            });
        }

        let mut out = rgb.as_standard_layout().into_owned();

        // 色相と彩度は HSV 空間で変更
        for mut px in out.lanes_mut(Axis(2)) {
            let (h, s, v) = rgb_to_hsv(px[0], px[1], px[2]);
            let h = (h + self.hue_delta).rem_euclid(1.0);
            let s = (s * self.saturation_factor).clamp(0.0, 1.0);
            let (r, g, b) = hsv_to_rgb(h, s, v);
            px[0] = r;
            px[1] = g;
            px[2] = b;
        }

        out.mapv_inplace(|v| v + self.brightness_delta);
        adjust_contrast(&mut out, self.contrast_factor)?;
        Ok(out)
    }
}

fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta <= 0.0 {
        0.0
    } else if max == r {
        (g - b) / delta
    } else if max == g {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };
    ((h / 6.0).rem_euclid(1.0), s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h6 = h * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as i32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

// ---------------------------------------------------------------------------
// 平均基準のコントラスト / 明るさ
// ---------------------------------------------------------------------------

/// チャンネル平均を基準にした乗算的な変更
///
/// `(x - mean) * contra_mul + mean * bright_mul`、倍率はチャンネルごとに
/// `U[1 - adj, 1 + adj]` から独立に引く。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanRelativeJitter {
    pub contrast_adj: f32,
    pub brightness_adj: f32,
}

impl Default for MeanRelativeJitter {
    fn default() -> Self {
        Self {
            contrast_adj: 0.05,
            brightness_adj: 0.05,
        }
    }
}

impl MeanRelativeJitter {
    pub fn validate(&self) -> PatchResult<()> {
        if !(0.0..1.0).contains(&self.contrast_adj) || !(0.0..1.0).contains(&self.brightness_adj) {
            return Err(PatchError::Config(format!(
                "contrast_adj / brightness_adj must be in [0, 1), got {} / {}",
                self.contrast_adj, self.brightness_adj
            )));
        }
        Ok(())
    }

    /// チャンネルごとの倍率を引く（コントラスト全チャンネル → 明るさ全チャンネル）
    pub fn draw<R: Rng + ?Sized>(&self, channels: usize, rng: &mut R) -> MeanRelativeDraw {
        let contra_mul = (0..channels)
            .map(|_| uniform(rng, 1.0 - self.contrast_adj, 1.0 + self.contrast_adj))
            .collect();
        let bright_mul = (0..channels)
            .map(|_| uniform(rng, 1.0 - self.brightness_adj, 1.0 + self.brightness_adj))
            .collect();
        MeanRelativeDraw {
            contra_mul,
            bright_mul,
        }
    }
}

impl ColorAugmenter for MeanRelativeJitter {
    fn augment(&self, bands: ArrayView3<'_, f32>, rng: &mut dyn RngCore) -> PatchResult<Array3<f32>> {
        let draw = self.draw(bands.dim().2, rng);
        draw.apply(bands)
    }
}

/// [`MeanRelativeJitter`] の1回分の引き
#[derive(Debug, Clone, PartialEq)]
pub struct MeanRelativeDraw {
    pub contra_mul: Vec<f32>,
    pub bright_mul: Vec<f32>,
}

impl MeanRelativeDraw {
    pub fn apply(&self, img: ArrayView3<'_, f32>) -> PatchResult<Array3<f32>> {
        let channels = img.dim().2;
        if self.contra_mul.len() != channels || self.bright_mul.len() != channels {
            return Err(PatchError::ChannelMismatch {
                expected: self.contra_mul.len(),
                actual: channels,
            });
        }

        let means = channel_means(img)?;
        let mut out = img.as_standard_layout().into_owned();
        for (c, mut ch) in out.axis_iter_mut(Axis(2)).enumerate() {
            let (mean, contra, bright) = (means[c], self.contra_mul[c], self.bright_mul[c]);
            Zip::from(&mut ch).for_each(|v| *v = (*v - mean) * contra + mean * bright);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// 設定で選ぶ方式
// ---------------------------------------------------------------------------

/// バンドに使う色の拡張方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColorStrategy {
    HueSaturation(HueSaturationJitter),
    MeanRelative(MeanRelativeJitter),
    None,
}

impl Default for ColorStrategy {
    fn default() -> Self {
        ColorStrategy::MeanRelative(MeanRelativeJitter::default())
    }
}

impl ColorStrategy {
    pub fn validate(&self) -> PatchResult<()> {
        match self {
            ColorStrategy::HueSaturation(j) => j.validate(),
            ColorStrategy::MeanRelative(j) => j.validate(),
            ColorStrategy::None => Ok(()),
        }
    }
}

impl ColorAugmenter for ColorStrategy {
    fn augment(&self, bands: ArrayView3<'_, f32>, rng: &mut dyn RngCore) -> PatchResult<Array3<f32>> {
        match self {
            ColorStrategy::HueSaturation(j) => j.augment(bands, rng),
            ColorStrategy::MeanRelative(j) => j.augment(bands, rng),
            ColorStrategy::None => Ok(bands.to_owned()),
        }
    }
}
