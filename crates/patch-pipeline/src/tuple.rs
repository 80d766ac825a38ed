//! パース済みレコード → (バンド, ラベル) の組
//!
//! 1. `features + [response]` の順に H×W テンソルを集めて先頭軸に積む
//! 2. CHW → HWC に並べ替える
//! 3. スタック全体に幾何変換（バンドとラベルの位置対応を保つ）
//! 4. バンド / ラベルに分割し、ラベルの上限を丸める
//! 5. バンドにだけ色の拡張と正規化をかける

use ndarray::{Array3, ArrayView2, Axis, s};
use rand::RngCore;

use crate::augment::{ColorAugmenter, GeometricDraw};
use crate::config::PipelineConfig;
use crate::error::{PatchError, PatchResult};
use crate::schema::ParsedRecord;

/// 1パッチ分の入力と教師
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// H×W×len(features)
    pub bands: Array3<f32>,
    /// H×W×(残りのチャンネル)
    pub labels: Array3<f32>,
}

/// 名前順にテンソルを積んで HWC にする
pub fn stack_channels(record: &ParsedRecord, names: &[&str]) -> PatchResult<Array3<f32>> {
    let views: Vec<ArrayView2<'_, f32>> = names
        .iter()
        .map(|&name| {
            record
                .get(name)
                .map(|t| t.view())
                .ok_or_else(|| PatchError::MissingFeature(name.to_string()))
        })
        .collect::<PatchResult<_>>()?;

    // CHW で積んでから HWC に並べ替える
    let chw = ndarray::stack(Axis(0), &views)?;
    Ok(chw.permuted_axes([1, 2, 0]))
}

/// ラベルの上限丸め（`> ceiling` のみ。負値はそのまま）
pub fn clip_labels(labels: &mut Array3<f32>, ceiling: f32) {
    labels.mapv_inplace(|v| if v > ceiling { ceiling } else { v });
}

/// レコードを (バンド, ラベル) に変換
pub fn to_tuple<R: RngCore>(
    record: &ParsedRecord,
    features: &[String],
    response: &str,
    config: &PipelineConfig,
    rng: &mut R,
) -> PatchResult<Sample> {
    let names: Vec<&str> = features
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(response))
        .collect();
    let stacked = stack_channels(record, &names)?;

    let draw = if config.geometric {
        GeometricDraw::sample(rng)
    } else {
        GeometricDraw::IDENTITY
    };
    let stacked = draw.apply(stacked.view());

    let n_bands = features.len();
    let bands = stacked.slice(s![.., .., ..n_bands]).to_owned();
    let mut labels = stacked.slice(s![.., .., n_bands..]).to_owned();
    clip_labels(&mut labels, config.label_ceiling);

    let bands = config.color.augment(bands.view(), rng)?;
    let bands = config.normalization.apply(bands.view())?;

    Ok(Sample { bands, labels })
}
