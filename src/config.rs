use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScraperError;

pub const DEFAULT_BASE_URI: &str = "https://platinumaps.jp/d/gogo-boso";

/// ビューポートの大きさ（ピクセル）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// ポーリング設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoboConfig {
    pub base_uri: String,
    pub pool_size: usize,
    pub headless: bool,
    pub debug: bool,
    pub poll: PollPolicy,
    pub viewport: Viewport,
    pub output_dir: PathBuf,
}

impl Default for GoboConfig {
    fn default() -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            pool_size: 4,
            headless: true,
            debug: false,
            poll: PollPolicy::default(),
            viewport: Viewport::default(),
            output_dir: PathBuf::from("./data"),
        }
    }
}

impl GoboConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = uri.into();
        self
    }

    /// 0 は 1 に切り上げる
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.poll.max_attempts = attempts.max(1);
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }
}

/// 手作業で保守する静的テーブル群
///
/// JSON で与える:
///
/// ```json
/// {
///   "known_counts": { "3": 12 },
///   "waivers": { "link": [1042, 1077] },
///   "display_order": ["千葉市", "銚子市"],
///   "address_overrides": { "市原市・長生郡長柄町": ["市原市", "長柄町"] }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionTables {
    /// カテゴリID → 期待されるスポット数
    pub known_counts: BTreeMap<u64, usize>,
    /// フィールド名 → そのフィールドを要求しない項目ID
    pub waivers: BTreeMap<String, BTreeSet<u64>>,
    /// 表示順インデックスを振る市町村名の並び
    pub display_order: Vec<String>,
    /// 住所文字列 → 市町村名（自動判定できない住所用）
    pub address_overrides: BTreeMap<String, Vec<String>>,
}

impl ExtractionTables {
    pub fn from_json_str(json: &str) -> Result<Self, ScraperError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScraperError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn expected_count(&self, category_id: u64) -> Option<usize> {
        self.known_counts.get(&category_id).copied()
    }
}
