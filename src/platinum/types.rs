//! Platinumaps 関連の型定義

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::ScraperError;
use crate::types::WorkItem;

/// 地図ページの `window.__bootOptions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootOption {
    #[serde(default)]
    pub stamp_rally_spots: Vec<StampRallySpot>,
}

/// スタンプラリー対象スポット
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampRallySpot {
    pub spot_id: u64,
    pub spot_title: String,
}

impl BootOption {
    /// スポットID昇順の作業項目（name をシード値に持つ）
    pub fn work_items(&self) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = self
            .stamp_rally_spots
            .iter()
            .map(|spot| WorkItem::new(spot.spot_id).with_seed("name", spot.spot_title.clone()))
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }
}

/// ページ構造に依存するセレクタ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatinumSelectors {
    /// スポット詳細の属性行
    pub property_row: String,
    /// 属性行のラベル
    pub property_label: String,
    /// サブタイトル
    pub subtitle: String,
    /// カテゴリページに並ぶスポット要素
    pub category_member: String,
    /// スポット要素のID属性
    pub member_attribute: String,
}

impl Default for PlatinumSelectors {
    fn default() -> Self {
        Self {
            property_row: "tr.poiproperties__item".to_string(),
            property_label: "th.poiproperties__itemlabel".to_string(),
            subtitle: ".poidetail__subtitle".to_string(),
            category_member: "[data-spot-id]".to_string(),
            member_attribute: "data-spot-id".to_string(),
        }
    }
}

impl PlatinumSelectors {
    /// すべてのセレクタが解析できるか確認する
    pub fn validate(&self) -> Result<(), ScraperError> {
        let probe = Document::parse("<html></html>");
        for selector in [
            &self.property_row,
            &self.property_label,
            &self.subtitle,
            &self.category_member,
        ] {
            probe.find(selector)?;
        }
        Ok(())
    }
}
