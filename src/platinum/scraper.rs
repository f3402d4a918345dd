//! Platinumaps（GoGo房総）スクレイパー実装

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use crate::config::{ExtractionTables, GoboConfig, PollPolicy, Viewport};
use crate::convergence::{converge_members, extract_until_stable};
use crate::document::Document;
use crate::error::ScraperError;
use crate::traits::{FieldExtractor, MemberExtractor, PageSession, Task};
use crate::types::{ExtractionResult, MembershipResult, RequiredFields, WorkItem};

use super::types::{BootOption, PlatinumSelectors};

pub const FIELD_ADDRESS: &str = "address";
pub const FIELD_LINK: &str = "link";
pub const FIELD_SUBTITLE: &str = "subtitle";

const LABEL_ADDRESS: &str = "住所";
const LABEL_URL: &str = "URL";

static BOOT_OPTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"window\.__bootOptions\s*=\s*(?P<json>.*?);").expect("invalid regex: boot options")
});

pub fn spot_uri(base_uri: &str, id: u64) -> String {
    format!("{}?s={}", base_uri, id)
}

pub fn category_uri(base_uri: &str, id: u64) -> String {
    format!("{}?c={}", base_uri, id)
}

/// スポットの既定の必須フィールド
pub fn default_spot_fields() -> RequiredFields {
    RequiredFields::new([FIELD_ADDRESS, FIELD_LINK, FIELD_SUBTITLE])
}

/// 地図ページを開き、スクリプト中の bootOptions を読み取る
pub async fn find_boot_options(
    session: &mut dyn PageSession,
    base_uri: &str,
) -> Result<BootOption, ScraperError> {
    info!("Looking for boot options on {}", base_uri);
    session.navigate(base_uri).await?;
    let content = session.content().await?;

    let boot = parse_boot_options(&content)?;
    info!(
        "Found {} stamp rally spots",
        boot.stamp_rally_spots.len()
    );
    Ok(boot)
}

/// 最初に見つかった bootOptions を返す
pub fn parse_boot_options(content: &str) -> Result<BootOption, ScraperError> {
    let document = Document::parse(content);

    for script in document.find("script")? {
        let text = script.text();
        if let Some(captures) = BOOT_OPTIONS.captures(&text) {
            return Ok(serde_json::from_str(&captures["json"])?);
        }
    }

    Err(ScraperError::BootOptions(
        "window.__bootOptions を含むスクリプトがありません".to_string(),
    ))
}

/// スポット詳細（住所・URL・サブタイトル）の抽出
#[derive(Debug, Clone)]
pub struct SpotExtractor {
    selectors: PlatinumSelectors,
}

impl SpotExtractor {
    pub fn new(selectors: PlatinumSelectors) -> Result<Self, ScraperError> {
        selectors.validate()?;
        Ok(Self { selectors })
    }
}

impl FieldExtractor for SpotExtractor {
    fn extract(&self, document: &Document, _item: &WorkItem) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();

        for row in document
            .find(&self.selectors.property_row)
            .unwrap_or_default()
        {
            let labels = row.find(&self.selectors.property_label).unwrap_or_default();
            let anchors = row.find("a").unwrap_or_default();

            for label in &labels {
                for anchor in &anchors {
                    match label.text().as_str() {
                        LABEL_ADDRESS => {
                            fields.insert(FIELD_ADDRESS.to_string(), anchor.text());
                        }
                        LABEL_URL => {
                            if let Some(href) = anchor.attribute("href") {
                                fields.insert(FIELD_LINK.to_string(), href.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if let Some(subtitle) = document
            .find(&self.selectors.subtitle)
            .unwrap_or_default()
            .iter()
            .map(|element| element.text())
            .find(|text| !text.is_empty())
        {
            fields.insert(FIELD_SUBTITLE.to_string(), subtitle);
        }

        fields
    }
}

/// カテゴリページに並んでいるスポットIDの抽出
#[derive(Debug, Clone)]
pub struct CategoryExtractor {
    selectors: PlatinumSelectors,
}

impl CategoryExtractor {
    pub fn new(selectors: PlatinumSelectors) -> Result<Self, ScraperError> {
        selectors.validate()?;
        Ok(Self { selectors })
    }
}

impl MemberExtractor for CategoryExtractor {
    fn extract(&self, document: &Document, item: &WorkItem) -> Vec<u64> {
        document
            .find(&self.selectors.category_member)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|element| {
                let raw = element.attribute(&self.selectors.member_attribute)?;
                match raw.trim().parse() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        debug!("Category {}: ignoring member id {:?}", item.id, raw);
                        None
                    }
                }
            })
            .collect()
    }
}

/// スポット1件: 詳細ページを開き、必須フィールドが揃うまでポーリング
pub struct SpotTask {
    base_uri: String,
    extractor: SpotExtractor,
    required: RequiredFields,
    policy: PollPolicy,
}

impl SpotTask {
    pub fn new(
        config: &GoboConfig,
        tables: &ExtractionTables,
        selectors: PlatinumSelectors,
    ) -> Result<Self, ScraperError> {
        Ok(Self {
            base_uri: config.base_uri.clone(),
            extractor: SpotExtractor::new(selectors)?,
            required: default_spot_fields().with_tables(tables),
            policy: config.poll,
        })
    }
}

#[async_trait]
impl Task for SpotTask {
    type Output = ExtractionResult;

    async fn run(
        &self,
        session: &mut dyn PageSession,
        item: &WorkItem,
    ) -> Result<ExtractionResult, ScraperError> {
        session.navigate(&spot_uri(&self.base_uri, item.id)).await?;
        let required: BTreeSet<String> = self.required.for_item(item.id);
        extract_until_stable(session, item, &self.extractor, required, self.policy).await
    }
}

/// カテゴリ1件: カテゴリページを開き、所属スポットが期待件数に達するまでポーリング
pub struct CategoryTask {
    base_uri: String,
    extractor: CategoryExtractor,
    tables: ExtractionTables,
    policy: PollPolicy,
    viewport: Viewport,
}

impl CategoryTask {
    pub fn new(
        config: &GoboConfig,
        tables: &ExtractionTables,
        selectors: PlatinumSelectors,
    ) -> Result<Self, ScraperError> {
        Ok(Self {
            base_uri: config.base_uri.clone(),
            extractor: CategoryExtractor::new(selectors)?,
            tables: tables.clone(),
            policy: config.poll,
            viewport: config.viewport,
        })
    }
}

#[async_trait]
impl Task for CategoryTask {
    type Output = MembershipResult;

    async fn run(
        &self,
        session: &mut dyn PageSession,
        item: &WorkItem,
    ) -> Result<MembershipResult, ScraperError> {
        // 前のカテゴリで広げたビューポートを戻す
        session
            .resize_view(self.viewport.width, self.viewport.height)
            .await?;
        session.navigate(&category_uri(&self.base_uri, item.id)).await?;

        let expected = self.tables.expected_count(item.id);
        converge_members(
            session,
            item,
            &self.extractor,
            expected,
            self.policy,
            self.viewport,
        )
        .await
    }
}
