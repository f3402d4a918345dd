//! パイプライン共通のデータモデル

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::ExtractionTables;
use crate::traits::Outcome;

/// 1件分の作業（スポット1件、カテゴリ1件）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    #[serde(default)]
    pub seed_fields: BTreeMap<String, String>,
}

impl WorkItem {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            seed_fields: BTreeMap::new(),
        }
    }

    pub fn with_seed(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.seed_fields.insert(field.into(), value.into());
        self
    }
}

/// 収束状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Convergence {
    /// 必須フィールドが揃った（または期待件数に達した）
    Converged,
    /// 試行回数を使い切った。結果はベストエフォート
    Unresolved,
    /// 抽出中にエラーが発生した
    Failed(String),
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged)
    }
}

/// 単一値フィールドの抽出結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub id: u64,
    pub fields: BTreeMap<String, String>,
    pub present: BTreeSet<String>,
    pub status: Convergence,
}

impl ExtractionResult {
    /// シード値を初期フィールドとして持つ結果を作る（present は空）
    pub fn seeded(item: &WorkItem) -> Self {
        Self {
            id: item.id,
            fields: item.seed_fields.clone(),
            present: BTreeSet::new(),
            status: Convergence::Unresolved,
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

impl Outcome for ExtractionResult {
    fn id(&self) -> u64 {
        self.id
    }

    fn failed(item: &WorkItem, reason: String) -> Self {
        Self {
            status: Convergence::Failed(reason),
            ..Self::seeded(item)
        }
    }

    fn is_converged(&self) -> bool {
        self.status.is_converged()
    }
}

/// 件数が増えていく複数値フィールド（カテゴリの所属スポット）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredTarget")]
pub struct MultiValueTarget {
    pub id: u64,
    pub expected_count: Option<usize>,
    /// 初出順
    pub members: Vec<u64>,
    #[serde(skip)]
    pub(crate) seen: HashSet<u64>,
}

/// 読み込み用。`seen` は `members` から作り直す
#[derive(Deserialize)]
struct StoredTarget {
    id: u64,
    expected_count: Option<usize>,
    members: Vec<u64>,
}

impl From<StoredTarget> for MultiValueTarget {
    fn from(stored: StoredTarget) -> Self {
        let mut target = Self::new(stored.id, stored.expected_count);
        target.merge(stored.members);
        target
    }
}

impl MultiValueTarget {
    pub fn new(id: u64, expected_count: Option<usize>) -> Self {
        Self {
            id,
            expected_count,
            members: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 期待件数に達しているか。期待件数が無ければ常に false
    pub fn reached_expected(&self) -> bool {
        self.expected_count
            .map(|expected| self.members.len() >= expected)
            .unwrap_or(false)
    }
}

/// カテゴリ1件分の収集結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipResult {
    pub target: MultiValueTarget,
    pub name: Option<String>,
    pub status: Convergence,
}

impl Outcome for MembershipResult {
    fn id(&self) -> u64 {
        self.target.id
    }

    fn failed(item: &WorkItem, reason: String) -> Self {
        Self {
            target: MultiValueTarget::new(item.id, None),
            name: item.seed_fields.get("name").cloned(),
            status: Convergence::Failed(reason),
        }
    }

    fn is_converged(&self) -> bool {
        self.status.is_converged()
    }
}

/// 項目種別ごとの必須フィールド集合と、項目ごとの免除表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFields {
    fields: BTreeSet<String>,
    waivers: BTreeMap<u64, BTreeSet<String>>,
}

impl RequiredFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            waivers: BTreeMap::new(),
        }
    }

    /// id について field を要求しない
    pub fn waive(mut self, id: u64, field: impl Into<String>) -> Self {
        self.waivers.entry(id).or_default().insert(field.into());
        self
    }

    /// 静的テーブルの免除表をまとめて適用
    pub fn with_tables(mut self, tables: &ExtractionTables) -> Self {
        for (field, ids) in &tables.waivers {
            for id in ids {
                self.waivers.entry(*id).or_default().insert(field.clone());
            }
        }
        self
    }

    /// 免除を適用した id 用の必須集合
    pub fn for_item(&self, id: u64) -> BTreeSet<String> {
        match self.waivers.get(&id) {
            Some(waived) => self.fields.difference(waived).cloned().collect(),
            None => self.fields.clone(),
        }
    }
}
