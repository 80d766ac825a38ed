//! スキーマに沿った合成パッチの生成
//!
//! 動作確認やベンチマーク用。バンドはなめらかな正弦波の和にノイズを足した場、
//! int64 の特徴は同じ場を閾値で区切ったクラス番号にする。

use ndarray::Array2;
use patch_pipeline::record::{Example, Feature};
use patch_pipeline::{DType, FeatureSpec, Schema};
use rand::Rng;

/// 合成パラメータ
#[derive(Debug, Clone)]
pub struct SynthOptions {
    /// int64 特徴のクラス数（0..classes）
    pub classes: i64,
    /// float 特徴の値域
    pub value_range: (f32, f32),
    /// ガウスっぽいノイズの振幅（値域に対する比）
    pub noise: f32,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            classes: 2,
            value_range: (0.0, 0.3),
            noise: 0.05,
        }
    }
}

/// [0, 1] のなめらかな場
fn smooth_field<R: Rng + ?Sized>(shape: [usize; 2], noise: f32, rng: &mut R) -> Array2<f32> {
    let [h, w] = shape;
    // 波数と位相をパッチごとに変える
    let waves: Vec<(f32, f32, f32)> = (0..3)
        .map(|_| {
            (
                rng.random_range(0.5..3.0) * std::f32::consts::TAU / h.max(1) as f32,
                rng.random_range(0.5..3.0) * std::f32::consts::TAU / w.max(1) as f32,
                rng.random_range(0.0..std::f32::consts::TAU),
            )
        })
        .collect();

    Array2::from_shape_fn((h, w), |(i, j)| {
        let base: f32 = waves
            .iter()
            .map(|&(ky, kx, phase)| (ky * i as f32 + kx * j as f32 + phase).sin())
            .sum::<f32>()
            / waves.len() as f32;
        // 一様乱数の差で簡易的に山型のノイズにする
        let jitter = rng.random::<f32>() - rng.random::<f32>();
        ((base + 1.0) * 0.5 + noise * jitter).clamp(0.0, 1.0)
    })
}

fn synth_feature<R: Rng + ?Sized>(spec: &FeatureSpec, options: &SynthOptions, rng: &mut R) -> Feature {
    let field = smooth_field(spec.shape, options.noise, rng);
    match spec.dtype {
        DType::Float32 => {
            let (lo, hi) = options.value_range;
            Feature::Float(field.iter().map(|&v| lo + v * (hi - lo)).collect())
        }
        DType::Int64 => {
            let classes = options.classes.max(1);
            Feature::Int64(
                field
                    .iter()
                    .map(|&v| ((v * classes as f32) as i64).min(classes - 1))
                    .collect(),
            )
        }
    }
}

/// スキーマの全特徴を持つ `Example` を1件作る
pub fn synth_example<R: Rng + ?Sized>(schema: &Schema, options: &SynthOptions, rng: &mut R) -> Example {
    let mut example = Example::new();
    for spec in schema.entries() {
        example.insert(spec.name.clone(), synth_feature(spec, options, rng));
    }
    example
}
