//! Platinumaps（GoGo房総）スクレイパーモジュール
//!
//! スタンプラリー対象スポットの詳細と、カテゴリごとの所属スポットを取得する

mod scraper;
mod types;

pub use self::scraper::{
    category_uri, default_spot_fields, find_boot_options, parse_boot_options, spot_uri,
    CategoryExtractor, CategoryTask, SpotExtractor, SpotTask, FIELD_ADDRESS, FIELD_LINK,
    FIELD_SUBTITLE,
};
pub use types::{BootOption, PlatinumSelectors, StampRallySpot};
