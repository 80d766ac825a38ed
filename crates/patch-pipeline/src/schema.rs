//! 特徴量スキーマとレコードのパース
//!
//! スキーマは順序付きの `名前 -> (shape, dtype)` の並び。最後の要素を応答変数
//! （ラベル）として扱う。TOML では `[[feature]]` の配列で順序を保持する。

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PatchError, PatchResult};
use crate::record::{Example, Feature};

/// 値のスカラー型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    #[default]
    Float32,
    Int64,
}

/// 1特徴量のデコード仕様
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    /// [H, W]
    pub shape: [usize; 2],
    #[serde(default)]
    pub dtype: DType,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, shape: [usize; 2], dtype: DType) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
        }
    }

    /// 要素数 (H*W)
    pub fn num_elements(&self) -> usize {
        self.shape[0] * self.shape[1]
    }

    /// Example から1特徴量を取り出して H×W に整形
    fn decode(&self, example: &Example) -> PatchResult<Array2<f32>> {
        let feature = example
            .get(&self.name)
            .ok_or_else(|| PatchError::MissingFeature(self.name.clone()))?;

        let values: Vec<f32> = match (self.dtype, feature) {
            (DType::Float32, Feature::Float(v)) => v.clone(),
            (DType::Int64, Feature::Int64(v)) => v.iter().map(|&x| x as f32).collect(),
            _ => {
                return Err(PatchError::DTypeMismatch {
                    name: self.name.clone(),
                    expected: self.dtype,
                });
            }
        };

        if values.len() != self.num_elements() {
            return Err(PatchError::ShapeMismatch {
                name: self.name.clone(),
                expected: self.num_elements(),
                actual: values.len(),
            });
        }

        Ok(Array2::from_shape_vec((self.shape[0], self.shape[1]), values)?)
    }
}

/// 順序付きの特徴量スキーマ
///
/// デシリアライズ時も [`Schema::new`] と同じ検証を通るので、空のスキーマは存在しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema")]
pub struct Schema {
    #[serde(rename = "feature")]
    entries: Vec<FeatureSpec>,
}

/// 検証前の TOML 表現
#[derive(Deserialize)]
struct RawSchema {
    #[serde(rename = "feature", default)]
    entries: Vec<FeatureSpec>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = PatchError;

    fn try_from(raw: RawSchema) -> PatchResult<Self> {
        Schema::new(raw.entries)
    }
}

impl Schema {
    /// エントリ列からスキーマを作成
    ///
    /// 空・名前の重複・要素数0の shape はエラー。
    pub fn new(entries: Vec<FeatureSpec>) -> PatchResult<Self> {
        let schema = Self { entries };
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> PatchResult<()> {
        if self.entries.is_empty() {
            return Err(PatchError::Config("schema must contain at least one feature".into()));
        }
        for (i, spec) in self.entries.iter().enumerate() {
            if spec.num_elements() == 0 {
                return Err(PatchError::Config(format!(
                    "feature `{}` has empty shape {:?}",
                    spec.name, spec.shape
                )));
            }
            if self.entries[..i].iter().any(|other| other.name == spec.name) {
                return Err(PatchError::Config(format!("duplicate feature `{}`", spec.name)));
            }
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> PatchResult<Self> {
        toml::from_str(s).map_err(|e| PatchError::Config(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PatchResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> PatchResult<String> {
        toml::to_string(self).map_err(|e| PatchError::Config(e.to_string()))
    }

    pub fn entries(&self) -> &[FeatureSpec] {
        &self.entries
    }

    /// 入力特徴量の名前（最後の応答変数を除く）
    pub fn feature_names(&self) -> Vec<String> {
        let n = self.entries.len() - 1;
        self.entries[..n].iter().map(|e| e.name.clone()).collect()
    }

    /// 応答変数（最後のエントリ）
    pub fn response(&self) -> &FeatureSpec {
        // validate 済みなので空ではない
        &self.entries[self.entries.len() - 1]
    }

    /// シリアライズ済みの Example をスキーマに従ってデコード
    pub fn parse(&self, bytes: &[u8]) -> PatchResult<ParsedRecord> {
        let example = Example::decode(bytes)?;
        self.parse_example(&example)
    }

    pub fn parse_example(&self, example: &Example) -> PatchResult<ParsedRecord> {
        let mut tensors = HashMap::with_capacity(self.entries.len());
        for spec in &self.entries {
            tensors.insert(spec.name.clone(), spec.decode(example)?);
        }
        Ok(ParsedRecord { tensors })
    }
}

/// パース済みレコード（名前 -> H×W テンソル）
#[derive(Debug, Clone, Default)]
pub struct ParsedRecord {
    tensors: HashMap<String, Array2<f32>>,
}

impl ParsedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Array2<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Array2<f32>> {
        self.tensors.get(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA_TOML: &str = r#"
[[feature]]
name = "B4"
shape = [2, 3]
dtype = "float32"

[[feature]]
name = "B3"
shape = [2, 3]

[[feature]]
name = "landcover"
shape = [2, 3]
dtype = "int64"
"#;

    #[test]
    fn test_schema_from_toml_keeps_order() {
        let schema = Schema::from_toml_str(SCHEMA_TOML).unwrap();
        assert_eq!(schema.feature_names(), vec!["B4".to_string(), "B3".to_string()]);
        assert_eq!(schema.response().name, "landcover");
        assert_eq!(schema.response().dtype, DType::Int64);
        assert_eq!(schema.entries()[1].dtype, DType::Float32);
    }

    #[test]
    fn test_schema_rejects_duplicates_and_empty() {
        assert!(Schema::new(Vec::new()).is_err());
        let dup = vec![
            FeatureSpec::new("a", [1, 1], DType::Float32),
            FeatureSpec::new("a", [1, 1], DType::Float32),
        ];
        assert!(Schema::new(dup).is_err());
        assert!(Schema::new(vec![FeatureSpec::new("a", [0, 4], DType::Float32)]).is_err());
    }

    #[test]
    fn test_deserialize_validates_embedded_schema() {
        // 別の設定構造体に埋め込まれても検証を通る
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            schema: Schema,
        }
        assert!(toml::from_str::<Schema>("feature = []").is_err());
        assert!(toml::from_str::<Schema>("").is_err());
        assert!(toml::from_str::<Wrapper>("[schema]\nfeature = []\n").is_err());

        let dup = "[[feature]]\nname = \"a\"\nshape = [1, 1]\n\n[[feature]]\nname = \"a\"\nshape = [1, 1]\n";
        assert!(toml::from_str::<Schema>(dup).is_err());

        let ok: Wrapper = toml::from_str("[[schema.feature]]\nname = \"y\"\nshape = [2, 2]\n").unwrap();
        assert_eq!(ok.schema.response().name, "y");
        assert!(ok.schema.feature_names().is_empty());
    }

    #[test]
    fn test_parse_record() {
        let schema = Schema::from_toml_str(SCHEMA_TOML).unwrap();
        let mut ex = Example::new();
        ex.insert("B4", Feature::Float(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]));
        ex.insert("B3", Feature::Float(vec![1.0; 6]));
        ex.insert("landcover", Feature::Int64(vec![0, 1, 1, 0, 2, 1]));

        let rec = schema.parse(&ex.encode()).unwrap();
        assert_eq!(rec.len(), 3);
        let b4 = rec.get("B4").unwrap();
        assert_eq!(b4.dim(), (2, 3));
        assert_eq!(b4[[1, 2]], 5.0);
        assert_eq!(rec.get("landcover").unwrap()[[1, 1]], 2.0);
    }

    #[test]
    fn test_parse_errors() {
        let schema = Schema::from_toml_str(SCHEMA_TOML).unwrap();

        let mut missing = Example::new();
        missing.insert("B4", Feature::Float(vec![0.0; 6]));
        assert!(matches!(
            schema.parse_example(&missing),
            Err(PatchError::MissingFeature(name)) if name == "B3"
        ));

        let mut wrong_type = Example::new();
        wrong_type.insert("B4", Feature::Int64(vec![0; 6]));
        assert!(matches!(
            schema.parse_example(&wrong_type),
            Err(PatchError::DTypeMismatch { .. })
        ));

        let mut wrong_len = Example::new();
        wrong_len.insert("B4", Feature::Float(vec![0.0; 5]));
        assert!(matches!(
            schema.parse_example(&wrong_len),
            Err(PatchError::ShapeMismatch { expected: 6, actual: 5, .. })
        ));
    }

    #[test]
    fn test_schema_toml_roundtrip() {
        let schema = Schema::from_toml_str(SCHEMA_TOML).unwrap();
        let text = schema.to_toml_string().unwrap();
        assert_eq!(Schema::from_toml_str(&text).unwrap(), schema);
    }
}
