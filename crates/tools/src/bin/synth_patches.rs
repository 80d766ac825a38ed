//! 合成パッチ生成ツール
//!
//! スキーマ（TOML）に沿った `tf.train.Example` を乱数で作り、TFRecord ファイルに書き出す。
//! パイプラインの動作確認やスループット計測用。

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use patch_pipeline::Schema;
use patch_pipeline::record::{Compression, RecordWriter};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tools::synth::{SynthOptions, synth_example};

#[derive(Parser, Debug)]
#[command(name = "synth_patches")]
#[command(about = "スキーマに沿った合成パッチを TFRecord に書き出す")]
struct Cli {
    /// スキーマファイル（TOML）
    #[arg(long)]
    schema: PathBuf,

    /// 出力ディレクトリ
    #[arg(short, long)]
    output_dir: PathBuf,

    /// 出力ファイル名の接頭辞
    #[arg(long, default_value = "patches")]
    prefix: String,

    /// ファイル数
    #[arg(long, default_value_t = 1)]
    files: usize,

    /// 1ファイルあたりのレコード数
    #[arg(long, default_value_t = 100)]
    records_per_file: usize,

    /// int64 特徴のクラス数
    #[arg(long, default_value_t = 2)]
    classes: i64,

    /// 乱数シード
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// gzip 圧縮しない
    #[arg(long, default_value_t = false)]
    no_gzip: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    if cli.files == 0 || cli.records_per_file == 0 {
        bail!("--files and --records-per-file must be >= 1");
    }
    if cli.classes < 1 {
        bail!("--classes must be >= 1");
    }

    let schema = Schema::load(&cli.schema).with_context(|| format!("failed to load schema {}", cli.schema.display()))?;
    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("failed to create {}", cli.output_dir.display()))?;

    let (compression, ext) = if cli.no_gzip {
        (Compression::None, "tfrecord")
    } else {
        (Compression::Gzip, "tfrecord.gz")
    };
    let options = SynthOptions {
        classes: cli.classes,
        ..SynthOptions::default()
    };
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(cli.seed);

    log::info!(
        "writing {} files x {} records ({} features + response '{}')",
        cli.files,
        cli.records_per_file,
        schema.feature_names().len(),
        schema.response().name
    );

    let total = (cli.files * cli.records_per_file) as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?);

    // ----------------------------------------------------------------------
    // 書き出し
    // ----------------------------------------------------------------------
    for file_idx in 0..cli.files {
        let path = cli.output_dir.join(format!("{}_{file_idx:05}.{ext}", cli.prefix));
        pb.set_message(path.display().to_string());
        let mut writer =
            RecordWriter::create(&path, compression).with_context(|| format!("failed to create {}", path.display()))?;
        for _ in 0..cli.records_per_file {
            let example = synth_example(&schema, &options, &mut rng);
            writer.write_record(&example.encode())?;
            pb.inc(1);
        }
        writer.close().with_context(|| format!("failed to finish {}", path.display()))?;
        log::debug!("wrote {}", path.display());
    }
    pb.finish_and_clear();

    log::info!("wrote {total} records to {}", cli.output_dir.display());
    Ok(())
}
