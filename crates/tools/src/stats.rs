//! バッチのチャンネル別統計
//!
//! N×H×W×C のバッチを順に流し込み、チャンネルごとの件数・平均・標準偏差・最小・最大を集計する。

use ndarray::{ArrayView4, Axis};
use serde::Serialize;

/// 1チャンネル分の集計
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub channel: usize,
    pub count: u64,
    pub mean: f64,
    pub std: f64,
    pub min: f32,
    pub max: f32,
    /// NaN / inf の個数
    pub non_finite: u64,
}

#[derive(Debug, Clone)]
struct Accumulator {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f32,
    max: f32,
    non_finite: u64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            non_finite: 0,
        }
    }
}

/// チャンネル別の逐次集計
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    channels: Vec<Accumulator>,
    samples: u64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 集計したサンプル数（バッチの N の合計）
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// NHWC のバッチを加える
    pub fn update(&mut self, batch: ArrayView4<'_, f32>) {
        let channels = batch.len_of(Axis(3));
        if self.channels.len() < channels {
            self.channels.resize_with(channels, Accumulator::default);
        }
        self.samples += batch.len_of(Axis(0)) as u64;

        for (c, lane) in batch.axis_iter(Axis(3)).enumerate() {
            let acc = &mut self.channels[c];
            for &v in lane.iter() {
                if !v.is_finite() {
                    acc.non_finite += 1;
                    continue;
                }
                let x = v as f64;
                acc.count += 1;
                acc.sum += x;
                acc.sum_sq += x * x;
                acc.min = acc.min.min(v);
                acc.max = acc.max.max(v);
            }
        }
    }

    pub fn summary(&self) -> Vec<ChannelSummary> {
        self.channels
            .iter()
            .enumerate()
            .map(|(channel, acc)| {
                let n = acc.count.max(1) as f64;
                let mean = acc.sum / n;
                let var = (acc.sum_sq / n - mean * mean).max(0.0);
                ChannelSummary {
                    channel,
                    count: acc.count,
                    mean,
                    std: var.sqrt(),
                    min: acc.min,
                    max: acc.max,
                    non_finite: acc.non_finite,
                }
            })
            .collect()
    }
}
