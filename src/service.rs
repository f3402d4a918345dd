use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::{info, warn};

use crate::browser::{launch_sessions, ChromiumSession};
use crate::config::{ExtractionTables, GoboConfig};
use crate::error::ScraperError;
use crate::platinum::{find_boot_options, CategoryTask, PlatinumSelectors, SpotTask};
use crate::pool::WorkPool;
use crate::traits::{Outcome, PageSession};
use crate::types::{ExtractionResult, MembershipResult, WorkItem};

/// 収集リクエスト
#[derive(Debug, Clone, Default)]
pub struct CollectRequest {
    pub config: GoboConfig,
    pub tables: ExtractionTables,
    pub selectors: PlatinumSelectors,
    /// 所属スポットを集めるカテゴリ（id と name シード）
    pub categories: Vec<WorkItem>,
}

impl CollectRequest {
    pub fn new(config: GoboConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_tables(mut self, tables: ExtractionTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_selectors(mut self, selectors: PlatinumSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_categories(mut self, categories: Vec<WorkItem>) -> Self {
        self.categories = categories;
        self
    }
}

/// 収集結果（いずれもID昇順）
#[derive(Debug, Clone, Default)]
pub struct CollectResult {
    pub spots: Vec<ExtractionResult>,
    pub categories: Vec<MembershipResult>,
}

impl CollectResult {
    /// 収束しなかった項目のID
    pub fn unresolved_ids(&self) -> Vec<u64> {
        self.spots
            .iter()
            .filter(|spot| !spot.is_converged())
            .map(Outcome::id)
            .chain(
                self.categories
                    .iter()
                    .filter(|category| !category.is_converged())
                    .map(Outcome::id),
            )
            .collect()
    }
}

/// bootOptions の取得からスポット・カテゴリの収集までを1つのプールで行う
pub async fn collect<S>(
    pool: &mut WorkPool<S>,
    request: &CollectRequest,
) -> Result<CollectResult, ScraperError>
where
    S: PageSession + 'static,
{
    let session = pool
        .first_session()
        .ok_or_else(|| ScraperError::BrowserInit("セッションがありません".to_string()))?;
    let boot = find_boot_options(session, &request.config.base_uri).await?;

    let spot_task = SpotTask::new(&request.config, &request.tables, request.selectors.clone())?;
    let spots = pool.run(boot.work_items(), Arc::new(spot_task)).await?;

    let categories = if request.categories.is_empty() {
        Vec::new()
    } else {
        let category_task =
            CategoryTask::new(&request.config, &request.tables, request.selectors.clone())?;
        pool.run(request.categories.clone(), Arc::new(category_task))
            .await?
    };

    Ok(CollectResult { spots, categories })
}

/// tower::Serviceを実装した収集サービス
#[derive(Debug, Clone, Default)]
pub struct GoboService {}

impl GoboService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service<CollectRequest> for GoboService {
    type Response = CollectResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CollectRequest) -> Self::Future {
        info!(
            "Collect request received: base_uri={}, pool_size={}",
            req.config.base_uri, req.config.pool_size
        );

        Box::pin(async move {
            let sessions: Vec<ChromiumSession> = launch_sessions(&req.config).await?;
            let mut pool = WorkPool::new(sessions);

            // 成否にかかわらずセッションはまとめて閉じる
            let outcome = collect(&mut pool, &req).await;
            pool.close().await?;
            let result = outcome?;

            let unresolved = result.unresolved_ids();
            if !unresolved.is_empty() {
                warn!("Unresolved items: {:?}", unresolved);
            }
            info!(
                "Collect finished: {} spots, {} categories",
                result.spots.len(),
                result.categories.len()
            );

            Ok(result)
        })
    }
}
