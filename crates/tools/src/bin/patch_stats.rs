//! パッチデータセットの統計ツール
//!
//! パイプラインを実際に通した後のバンド・ラベルのチャンネル別統計を出す。
//! 正規化や拡張の設定が意図通りに効いているかの確認用。

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use patch_pipeline::{PipelineConfig, Schema, get_eval_dataset, get_training_dataset};
use serde::Serialize;
use tools::stats::{ChannelStats, ChannelSummary};

#[derive(Parser, Debug)]
#[command(name = "patch_stats")]
#[command(about = "パイプライン通過後のバンド・ラベルの統計を表示する")]
struct Cli {
    /// スキーマファイル（TOML）
    #[arg(long)]
    schema: PathBuf,

    /// パイプライン設定（TOML、省略時はデフォルト）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 学習用データセットからこのバッチ数だけ読む（省略時は評価用を1周）
    #[arg(long)]
    train_batches: Option<usize>,

    /// 学習用のバッチサイズ
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// 学習用のシャッフルバッファ
    #[arg(long, default_value_t = 1000)]
    buffer: usize,

    /// JSON で出力する
    #[arg(long, default_value_t = false)]
    json: bool,

    /// 入力ファイル
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct Report {
    samples: u64,
    batches: u64,
    bands: Vec<ChannelSummary>,
    labels: Vec<ChannelSummary>,
}

fn print_table(title: &str, names: &[String], summary: &[ChannelSummary]) {
    println!("{title}");
    println!("{:<16} {:>12} {:>12} {:>12} {:>12} {:>12}", "channel", "mean", "std", "min", "max", "non-finite");
    for s in summary {
        let name = names.get(s.channel).map(String::as_str).unwrap_or("?");
        println!(
            "{:<16} {:>12.5} {:>12.5} {:>12.5} {:>12.5} {:>12}",
            name, s.mean, s.std, s.min, s.max, s.non_finite
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let schema = Schema::load(&cli.schema).with_context(|| format!("failed to load schema {}", cli.schema.display()))?;
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    log::info!("config: {config:?}");

    let mut band_stats = ChannelStats::new();
    let mut label_stats = ChannelStats::new();
    let mut batches = 0u64;

    // ----------------------------------------------------------------------
    // 集計
    // ----------------------------------------------------------------------
    match cli.train_batches {
        Some(0) => bail!("--train-batches must be >= 1"),
        Some(n) => {
            let pb = ProgressBar::new(n as u64);
            pb.set_style(ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} batches")?);
            let dataset = get_training_dataset(&cli.files, &schema, cli.buffer, cli.batch_size, &config)?;
            for batch in dataset.take(n) {
                let batch = batch?;
                band_stats.update(batch.bands.view());
                label_stats.update(batch.labels.view());
                batches += 1;
                pb.inc(1);
            }
            pb.finish_and_clear();
            if (batches as usize) < n {
                log::warn!("dataset ended after {batches} batches");
            }
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner} {pos} records")?);
            for batch in get_eval_dataset(&cli.files, &schema, &config)? {
                let batch = batch?;
                band_stats.update(batch.bands.view());
                label_stats.update(batch.labels.view());
                batches += 1;
                pb.inc(1);
            }
            pb.finish_and_clear();
        }
    }

    if batches == 0 {
        bail!("no records in {} file(s)", cli.files.len());
    }

    let report = Report {
        samples: band_stats.samples(),
        batches,
        bands: band_stats.summary(),
        labels: label_stats.summary(),
    };

    // ----------------------------------------------------------------------
    // 出力
    // ----------------------------------------------------------------------
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("samples: {}  batches: {}", report.samples, report.batches);
    println!();
    print_table("bands", &schema.feature_names(), &report.bands);
    println!();
    print_table("labels", std::slice::from_ref(&schema.response().name), &report.labels);
    Ok(())
}
