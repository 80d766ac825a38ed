//! gzip TFRecord ファイルを実際に書き出してデータセットを回すテスト

use std::io::Write;
use std::path::{Path, PathBuf};

use patch_pipeline::record::{Compression, Example, Feature, RecordWriter};
use patch_pipeline::{
    ColorStrategy, DType, FeatureSpec, Normalization, PatchError, PipelineConfig, Schema,
    get_dataset, get_eval_dataset, get_training_dataset,
};

const H: usize = 8;
const W: usize = 8;

fn schema() -> Schema {
    Schema::new(vec![
        FeatureSpec::new("B2", [H, W], DType::Float32),
        FeatureSpec::new("B3", [H, W], DType::Float32),
        FeatureSpec::new("B4", [H, W], DType::Float32),
        FeatureSpec::new("landcover", [H, W], DType::Int64),
    ])
    .unwrap()
}

/// レコード番号 `id` を B2 の先頭ピクセルに埋め込んだ Example
fn example(id: usize) -> Example {
    let mut ex = Example::new();
    for (band, offset) in [("B2", 0.0f32), ("B3", 0.3), ("B4", 0.6)] {
        let mut values: Vec<f32> = (0..H * W).map(|i| offset + (i % 7) as f32 * 0.05).collect();
        if band == "B2" {
            values[0] = id as f32;
        }
        ex.insert(band, Feature::Float(values));
    }
    ex.insert("landcover", Feature::Int64((0..H * W).map(|i| (i % 4) as i64 - 1).collect()));
    ex
}

fn write_file(path: &Path, ids: std::ops::Range<usize>) {
    let mut writer = RecordWriter::create(path, Compression::Gzip).unwrap();
    for id in ids {
        writer.write_record(&example(id).encode()).unwrap();
    }
    writer.close().unwrap();
}

fn fixture(dir: &Path, per_file: &[usize]) -> Vec<PathBuf> {
    let mut start = 0;
    per_file
        .iter()
        .enumerate()
        .map(|(i, &n)| {
            let path = dir.join(format!("patches_{i}.tfrecord.gz"));
            write_file(&path, start..start + n);
            start += n;
            path
        })
        .collect()
}

/// 拡張も正規化もしない設定（値をそのまま確認するため）
fn plain_config() -> PipelineConfig {
    PipelineConfig {
        normalization: Normalization::None,
        ..PipelineConfig::default()
    }
    .without_augmentation()
}

#[test]
fn eval_dataset_yields_one_batch_per_record() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[7, 5]);

    let batches: Vec<_> = get_eval_dataset(&files, &schema(), &PipelineConfig::default())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(batches.len(), 12);
    for batch in &batches {
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.bands.dim(), (1, H, W, 3));
        assert_eq!(batch.labels.dim(), (1, H, W, 1));
        assert!(batch.labels.iter().all(|&v| v <= 1.0));
        // 負のラベル (-1) はクリップされない
        assert!(batch.labels.iter().any(|&v| v == -1.0));
    }
}

#[test]
fn base_dataset_preserves_record_order_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[3, 4, 2]);

    let ids: Vec<f32> = get_dataset(&files, &schema(), &plain_config())
        .unwrap()
        .map(|s| s.unwrap().bands[[0, 0, 0]])
        .collect();
    assert_eq!(ids, (0..9).map(|i| i as f32).collect::<Vec<_>>());
}

#[test]
fn labels_above_one_are_clipped() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[2]);

    for sample in get_dataset(&files, &schema(), &plain_config()).unwrap() {
        let sample = sample.unwrap();
        // landcover は -1, 0, 1, 2 の繰り返し → 2 は 1 に丸められる
        let mut seen: Vec<f32> = sample.labels.iter().copied().collect();
        seen.sort_by(f32::total_cmp);
        seen.dedup();
        assert_eq!(seen, vec![-1.0, 0.0, 1.0]);
    }
}

#[test]
fn results_do_not_depend_on_parallelism() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[23]);

    let run = |workers: usize| -> Vec<_> {
        let config = PipelineConfig {
            num_parallel_calls: workers,
            ..PipelineConfig::default()
        };
        get_dataset(&files, &schema(), &config)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    };

    let serial = run(1);
    assert_eq!(serial.len(), 23);
    assert_eq!(serial, run(5));
}

#[test]
fn training_dataset_repeats_past_one_pass() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[5]);

    let mut dataset = get_training_dataset(&files, &schema(), 4, 2, &PipelineConfig::default()).unwrap();
    // 5件 / バッチ2 → 1周3バッチ。その数倍を取り出しても終わらない
    let sizes: Vec<usize> = dataset.by_ref().take(12).map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![2, 2, 1, 2, 2, 1, 2, 2, 1, 2, 2, 1]);
    assert!(dataset.epoch() >= 3);
}

#[test]
fn training_dataset_covers_every_record_each_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[6, 4]);

    let config = plain_config();
    let dataset = get_training_dataset(&files, &schema(), 3, 5, &config).unwrap();
    let mut ids: Vec<f32> = dataset
        .take(2)
        .flat_map(|b| b.unwrap().bands.outer_iter().map(|s| s[[0, 0, 0]]).collect::<Vec<_>>())
        .collect();
    ids.sort_by(f32::total_cmp);
    assert_eq!(ids, (0..10).map(|i| i as f32).collect::<Vec<_>>());
}

#[test]
fn training_dataset_over_no_records_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[0]);

    let mut dataset = get_training_dataset(&files, &schema(), 8, 2, &PipelineConfig::default()).unwrap();
    assert!(dataset.next().is_none());
}

#[test]
fn corrupt_record_aborts_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.tfrecord.gz");

    // 2件目の途中で切れたファイル
    let mut framed = Vec::new();
    patch_pipeline::record::frame_record(&mut framed, &example(0).encode());
    patch_pipeline::record::frame_record(&mut framed, &example(1).encode());
    framed.truncate(framed.len() - 10);
    let mut enc = flate2::write::GzEncoder::new(std::fs::File::create(&path).unwrap(), flate2::Compression::default());
    enc.write_all(&framed).unwrap();
    enc.finish().unwrap();

    let mut dataset = get_eval_dataset(&[&path], &schema(), &PipelineConfig::default()).unwrap();
    assert!(dataset.next().unwrap().is_ok());
    assert!(matches!(dataset.next(), Some(Err(PatchError::Truncated(_)))));
    assert!(dataset.next().is_none());
}

#[test]
fn schema_mismatch_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[1]);

    let wrong = Schema::new(vec![
        FeatureSpec::new("B2", [H, W], DType::Float32),
        FeatureSpec::new("NIR", [H, W], DType::Float32),
    ])
    .unwrap();
    let mut dataset = get_dataset(&files, &wrong, &PipelineConfig::default()).unwrap();
    assert!(matches!(dataset.next(), Some(Err(PatchError::MissingFeature(name))) if name == "NIR"));
    assert!(dataset.next().is_none());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.tfrecord.gz");
    let mut dataset = get_eval_dataset(&[missing], &schema(), &PipelineConfig::default()).unwrap();
    assert!(matches!(dataset.next(), Some(Err(PatchError::Io(_)))));
}

#[test]
fn hue_saturation_strategy_runs_on_rgb_bands() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[4]);

    let config = PipelineConfig {
        color: ColorStrategy::HueSaturation(Default::default()),
        normalization: Normalization::MinMax { axes: vec![0, 1, 2] },
        ..PipelineConfig::default()
    };
    for batch in get_eval_dataset(&files, &schema(), &config).unwrap() {
        let batch = batch.unwrap();
        assert!(batch.bands.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}

#[test]
fn invalid_arguments_are_rejected_up_front() {
    let files: Vec<PathBuf> = Vec::new();
    assert!(get_training_dataset(&files, &schema(), 0, 2, &PipelineConfig::default()).is_err());
    assert!(get_training_dataset(&files, &schema(), 4, 0, &PipelineConfig::default()).is_err());
    let bad = PipelineConfig {
        num_parallel_calls: 0,
        ..PipelineConfig::default()
    };
    assert!(get_dataset(&files, &schema(), &bad).is_err());
    let bad_axes = PipelineConfig {
        normalization: Normalization::MinMax { axes: vec![3] },
        ..PipelineConfig::default()
    };
    assert!(matches!(get_dataset(&files, &schema(), &bad_axes), Err(PatchError::InvalidAxes { .. })));
}

#[test]
fn empty_schema_from_toml_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let files = fixture(dir.path(), &[1]);

    let parsed: Result<Schema, _> = toml::from_str("feature = []");
    assert!(parsed.is_err());
    assert!(matches!(Schema::from_toml_str("feature = []"), Err(PatchError::Config(_))));

    // 応答変数だけのスキーマはバンド0チャンネルで動く
    let only_label = Schema::new(vec![FeatureSpec::new("landcover", [H, W], DType::Int64)]).unwrap();
    let sample = get_dataset(&files, &only_label, &plain_config()).unwrap().next().unwrap().unwrap();
    assert_eq!(sample.bands.dim(), (H, W, 0));
    assert_eq!(sample.labels.dim(), (H, W, 1));
}
