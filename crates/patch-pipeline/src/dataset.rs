//! ストリーミングデータセット
//!
//! ファイル読み込み → パース → タプル化 を遅延評価のイテレータとして組み立て、
//! 学習用はシャッフル・バッチ化・無限リピート、評価用はバッチサイズ1で1周だけ回す。
//!
//! パースとタプル化は rayon のスレッドプールでチャンク単位に並列処理する。
//! 各レコードの乱数は `(seed, epoch, レコード番号)` から派生させるので、
//! 結果はスレッドのスケジューリングに依存しない。

use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array4, ArrayView3, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::error::{PatchError, PatchResult};
use crate::record::{RecordReader, open_records};
use crate::schema::Schema;
use crate::tuple::{Sample, to_tuple};

/// ワーカー1つあたりに一度に読み込むレコード数
const RECORDS_PER_WORKER: usize = 4;

/// シャッフル用の乱数系列を区別するための番号
const SHUFFLE_STREAM: u64 = u64::MAX;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// `(seed, epoch, index)` から独立した乱数シードを作る
pub fn derive_seed(seed: u64, epoch: u64, index: u64) -> u64 {
    splitmix64(seed ^ splitmix64(epoch ^ splitmix64(index)))
}

/// エポックの先頭に戻せるデータセット
pub trait Restartable {
    /// `epoch` 番目のパスとして最初から読み直す
    fn restart(&mut self, epoch: u64);
}

// ---------------------------------------------------------------------------
// バッチ
// ---------------------------------------------------------------------------

/// N×H×W×C のバッチ
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub bands: Array4<f32>,
    pub labels: Array4<f32>,
}

impl Batch {
    /// サンプルを先頭軸に積む（H×W が揃っていない場合はエラー）
    pub fn from_samples(samples: &[Sample]) -> PatchResult<Self> {
        if samples.is_empty() {
            return Err(PatchError::InvalidArgument("cannot batch zero samples".into()));
        }
        let bands: Vec<ArrayView3<'_, f32>> = samples.iter().map(|s| s.bands.view()).collect();
        let labels: Vec<ArrayView3<'_, f32>> = samples.iter().map(|s| s.labels.view()).collect();
        Ok(Self {
            bands: ndarray::stack(Axis(0), &bands)?,
            labels: ndarray::stack(Axis(0), &labels)?,
        })
    }

    pub fn len(&self) -> usize {
        self.bands.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// 基本データセット
// ---------------------------------------------------------------------------

/// レコードファイルから (バンド, ラベル) を順に返すデータセット
pub struct PatchDataset {
    files: Vec<PathBuf>,
    schema: Schema,
    features: Vec<String>,
    response: String,
    config: PipelineConfig,
    pool: Arc<rayon::ThreadPool>,

    epoch: u64,
    file_idx: usize,
    reader: Option<RecordReader<Box<dyn Read + Send>>>,
    next_index: u64,
    pending: VecDeque<PatchResult<Sample>>,
    exhausted: bool,
    failed: bool,
}

impl PatchDataset {
    pub fn new<P: AsRef<Path>>(files: &[P], schema: &Schema, config: &PipelineConfig) -> PatchResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_parallel_calls)
            .thread_name(|i| format!("patch-worker-{i}"))
            .build()
            .map_err(|e| PatchError::Config(format!("failed to build worker pool: {e}")))?;

        Ok(Self {
            files: files.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            schema: schema.clone(),
            features: schema.feature_names(),
            response: schema.response().name.clone(),
            config: config.clone(),
            pool: Arc::new(pool),
            epoch: 0,
            file_idx: 0,
            reader: None,
            next_index: 0,
            pending: VecDeque::new(),
            exhausted: false,
            failed: false,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 次の生レコード。全ファイルを読み切ったら `None`。
    fn read_raw(&mut self) -> Option<PatchResult<Vec<u8>>> {
        loop {
            if let Some(reader) = self.reader.as_mut() {
                match reader.read_record() {
                    Ok(Some(bytes)) => return Some(Ok(bytes)),
                    Ok(None) => {
                        log::debug!("finished file after {} records", reader.records_read());
                        self.reader = None;
                    }
                    Err(e) => return Some(Err(e)),
                }
                continue;
            }

            let path = self.files.get(self.file_idx)?;
            self.file_idx += 1;
            match open_records(path, self.config.compression) {
                Ok(reader) => self.reader = Some(reader),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// 1チャンク分を読み込み、並列にパース + タプル化して pending に積む
    fn fill_chunk(&mut self) {
        let chunk = self.config.num_parallel_calls * RECORDS_PER_WORKER;
        let mut raw = Vec::with_capacity(chunk);
        let mut read_error = None;
        while raw.len() < chunk {
            match self.read_raw() {
                Some(Ok(bytes)) => {
                    raw.push((self.next_index, bytes));
                    self.next_index += 1;
                }
                Some(Err(e)) => {
                    read_error = Some(e);
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        let schema = &self.schema;
        let features = &self.features;
        let response = self.response.as_str();
        let config = &self.config;
        let epoch = self.epoch;
        let processed: Vec<PatchResult<Sample>> = self.pool.install(|| {
            raw.into_par_iter()
                .map(|(index, bytes)| {
                    let mut rng = Xoshiro256PlusPlus::seed_from_u64(derive_seed(config.seed, epoch, index));
                    let record = schema.parse(&bytes)?;
                    to_tuple(&record, features, response, config, &mut rng)
                })
                .collect()
        });

        self.pending.extend(processed);
        if let Some(e) = read_error {
            self.pending.push_back(Err(e));
        }
    }
}

impl Iterator for PatchDataset {
    type Item = PatchResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.pending.is_empty() && !self.exhausted {
            self.fill_chunk();
        }
        let item = self.pending.pop_front()?;
        if item.is_err() {
            // 壊れたレコード以降は読まない
            self.failed = true;
            self.pending.clear();
        }
        Some(item)
    }
}

impl Restartable for PatchDataset {
    fn restart(&mut self, epoch: u64) {
        self.epoch = epoch;
        self.file_idx = 0;
        self.reader = None;
        self.next_index = 0;
        self.pending.clear();
        self.exhausted = false;
    }
}

// ---------------------------------------------------------------------------
// シャッフル
// ---------------------------------------------------------------------------

/// 固定サイズのバッファを使った窓シャッフル
///
/// バッファを満たしてから一様にランダムな位置の要素を取り出し、空いた分を上流から補充する。
/// エラーはシャッフルせずそのまま流す。
pub struct Shuffle<I, T> {
    inner: I,
    buffer: Vec<T>,
    capacity: usize,
    seed: u64,
    reshuffle_each_iteration: bool,
    rng: Xoshiro256PlusPlus,
    inner_done: bool,
}

impl<I, T> Shuffle<I, T>
where
    I: Iterator<Item = PatchResult<T>>,
{
    pub fn new(inner: I, capacity: usize, seed: u64, reshuffle_each_iteration: bool) -> PatchResult<Self> {
        if capacity == 0 {
            return Err(PatchError::InvalidArgument("shuffle buffer size must be >= 1".into()));
        }
        Ok(Self {
            inner,
            buffer: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            seed,
            reshuffle_each_iteration,
            rng: Xoshiro256PlusPlus::seed_from_u64(derive_seed(seed, 0, SHUFFLE_STREAM)),
            inner_done: false,
        })
    }

    pub fn get_ref(&self) -> &I {
        &self.inner
    }
}

impl<I, T> Iterator for Shuffle<I, T>
where
    I: Iterator<Item = PatchResult<T>>,
{
    type Item = PatchResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.inner_done && self.buffer.len() < self.capacity {
            match self.inner.next() {
                Some(Ok(item)) => self.buffer.push(item),
                Some(Err(e)) => return Some(Err(e)),
                None => self.inner_done = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..self.buffer.len());
        Some(Ok(self.buffer.swap_remove(idx)))
    }
}

impl<I: Restartable, T> Restartable for Shuffle<I, T> {
    fn restart(&mut self, epoch: u64) {
        let shuffle_epoch = if self.reshuffle_each_iteration { epoch } else { 0 };
        self.rng = Xoshiro256PlusPlus::seed_from_u64(derive_seed(self.seed, shuffle_epoch, SHUFFLE_STREAM));
        self.buffer.clear();
        self.inner_done = false;
        self.inner.restart(epoch);
    }
}

// ---------------------------------------------------------------------------
// バッチ化
// ---------------------------------------------------------------------------

/// サンプルを `batch_size` ずつまとめる（最後の端数バッチも返す）
pub struct Batched<I> {
    inner: I,
    batch_size: usize,
    failed: bool,
}

impl<I> Batched<I>
where
    I: Iterator<Item = PatchResult<Sample>>,
{
    pub fn new(inner: I, batch_size: usize) -> PatchResult<Self> {
        if batch_size == 0 {
            return Err(PatchError::InvalidArgument("batch size must be >= 1".into()));
        }
        Ok(Self {
            inner,
            batch_size,
            failed: false,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<I> Iterator for Batched<I>
where
    I: Iterator<Item = PatchResult<Sample>>,
{
    type Item = PatchResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut samples = Vec::with_capacity(self.batch_size);
        while samples.len() < self.batch_size {
            match self.inner.next() {
                Some(Ok(sample)) => samples.push(sample),
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => break,
            }
        }
        if samples.is_empty() {
            return None;
        }
        let batch = Batch::from_samples(&samples);
        if batch.is_err() {
            self.failed = true;
        }
        Some(batch)
    }
}

impl<I: Restartable> Restartable for Batched<I> {
    fn restart(&mut self, epoch: u64) {
        self.inner.restart(epoch);
    }
}

// ---------------------------------------------------------------------------
// リピート
// ---------------------------------------------------------------------------

/// 上流を読み切るたびに次のエポックとして先頭から読み直す
///
/// 1周で何も出なかった場合（空のデータセット）は終了する。エラー後も終了する。
pub struct Repeat<I> {
    inner: I,
    epoch: u64,
    yielded_this_epoch: usize,
    done: bool,
}

impl<I> Repeat<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            epoch: 0,
            yielded_this_epoch: 0,
            done: false,
        }
    }

    /// 現在のエポック（0始まり）
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl<I, T> Iterator for Repeat<I>
where
    I: Iterator<Item = PatchResult<T>> + Restartable,
{
    type Item = PatchResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.inner.next() {
                Some(Ok(item)) => {
                    self.yielded_this_epoch += 1;
                    return Some(Ok(item));
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None if self.yielded_this_epoch == 0 => {
                    log::warn!("dataset produced no elements in epoch {}, stopping repeat", self.epoch);
                    self.done = true;
                    return None;
                }
                None => {
                    self.epoch += 1;
                    self.yielded_this_epoch = 0;
                    log::debug!("restarting dataset for epoch {}", self.epoch);
                    self.inner.restart(self.epoch);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 公開API
// ---------------------------------------------------------------------------

/// 学習用データセット: シャッフル → バッチ化 → 無限リピート
pub type TrainingDataset = Repeat<Batched<Shuffle<PatchDataset, Sample>>>;

/// 評価用データセット: バッチサイズ1、シャッフル・リピートなし
pub type EvalDataset = Batched<PatchDataset>;

/// ファイルを読み、パースしてタプル化したサンプル列
pub fn get_dataset<P: AsRef<Path>>(files: &[P], schema: &Schema, config: &PipelineConfig) -> PatchResult<PatchDataset> {
    PatchDataset::new(files, schema, config)
}

/// 学習用データセット
///
/// `buffer` 件の窓シャッフル、`batch_size` 件ずつのバッチ、終端で先頭に戻る無限列。
pub fn get_training_dataset<P: AsRef<Path>>(
    files: &[P],
    schema: &Schema,
    buffer: usize,
    batch_size: usize,
    config: &PipelineConfig,
) -> PatchResult<TrainingDataset> {
    let base = get_dataset(files, schema, config)?;
    let shuffled = Shuffle::new(base, buffer, config.seed, config.reshuffle_each_iteration)?;
    let batched = Batched::new(shuffled, batch_size)?;
    Ok(Repeat::new(batched))
}

/// 評価用データセット（1周で終わる、バッチサイズ1）
pub fn get_eval_dataset<P: AsRef<Path>>(files: &[P], schema: &Schema, config: &PipelineConfig) -> PatchResult<EvalDataset> {
    Batched::new(get_dataset(files, schema, config)?, 1)
}
