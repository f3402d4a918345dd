//! 非同期に描画されるページからの収束ポーリング
//!
//! ページは描画が段階的に進むため、1回の抽出では必須フィールドが揃わないことがある。
//! ここでは判定を同期の状態機械（[`Polling`], [`MemberPolling`]）に閉じ込め、
//! セッション操作と待機は非同期のドライバ（[`extract_until_stable`], [`converge_members`]）が行う。

use std::collections::{BTreeMap, BTreeSet};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{PollPolicy, Viewport};
use crate::document::Document;
use crate::error::ScraperError;
use crate::traits::{FieldExtractor, MemberExtractor, PageSession};
use crate::types::{Convergence, ExtractionResult, MembershipResult, MultiValueTarget, WorkItem};

/// CDP のデバイスメトリクス上限
const MAX_VIEW_HEIGHT: u32 = 10_000_000;

/// 状態機械の1ステップの結果
#[derive(Debug, PartialEq, Eq)]
pub enum Step<T> {
    /// 待機して再試行
    Continue,
    /// 収束した
    Done(T),
    /// 試行回数を使い切った（ベストエフォートの結果）
    Exhausted(T),
}

/// 単一値フィールドのポーリング状態
#[derive(Debug)]
pub struct Polling {
    attempts_left: u32,
    accumulated: ExtractionResult,
    required: BTreeSet<String>,
}

impl Polling {
    pub fn new(item: &WorkItem, required: BTreeSet<String>, max_attempts: u32) -> Self {
        Self {
            attempts_left: max_attempts.max(1),
            accumulated: ExtractionResult::seeded(item),
            required,
        }
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left
    }

    pub fn accumulated(&self) -> &ExtractionResult {
        &self.accumulated
    }

    /// まだ揃っていない必須フィールド
    pub fn missing(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|field| !self.accumulated.present.contains(*field))
            .map(String::as_str)
            .collect()
    }

    fn satisfied(&self) -> bool {
        self.required.is_subset(&self.accumulated.present)
    }

    /// 1回分の観測を取り込んで次の状態を決める
    pub fn step(&mut self, observed: BTreeMap<String, String>) -> Step<ExtractionResult> {
        self.attempts_left = self.attempts_left.saturating_sub(1);
        self.accumulated.absorb(observed);

        if self.satisfied() {
            self.accumulated.status = Convergence::Converged;
            return Step::Done(self.accumulated.clone());
        }
        if self.attempts_left == 0 {
            self.accumulated.status = Convergence::Unresolved;
            return Step::Exhausted(self.accumulated.clone());
        }
        Step::Continue
    }
}

/// 複数値フィールドのポーリング状態
#[derive(Debug)]
pub struct MemberPolling {
    attempts_left: u32,
    attempt: u32,
    target: MultiValueTarget,
}

impl MemberPolling {
    pub fn new(target: MultiValueTarget, max_attempts: u32) -> Self {
        Self {
            attempts_left: max_attempts.max(1),
            attempt: 0,
            target,
        }
    }

    /// これまでの観測回数
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn target(&self) -> &MultiValueTarget {
        &self.target
    }

    pub fn step(&mut self, observed: Vec<u64>) -> Step<MultiValueTarget> {
        self.attempts_left = self.attempts_left.saturating_sub(1);
        self.attempt += 1;
        let added = self.target.merge(observed);
        debug!(
            "Category {}: +{} members ({} total, attempt {})",
            self.target.id,
            added,
            self.target.len(),
            self.attempt
        );

        if self.target.reached_expected() {
            return Step::Done(self.target.clone());
        }
        if self.attempts_left == 0 {
            return Step::Exhausted(self.target.clone());
        }
        Step::Continue
    }
}

/// attempt 回目の後に使うビューポートの高さ（height × 2^attempt、上限あり）
pub fn grown_height(base: u32, attempt: u32) -> u32 {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_VIEW_HEIGHT)
}

/// HTMLを解析して1回分の観測を得る
fn observe_fields(
    extractor: &dyn FieldExtractor,
    content: &str,
    item: &WorkItem,
) -> BTreeMap<String, String> {
    let document = Document::parse(content);
    extractor.extract(&document, item)
}

fn observe_members(extractor: &dyn MemberExtractor, content: &str, item: &WorkItem) -> Vec<u64> {
    let document = Document::parse(content);
    extractor.extract(&document, item)
}

async fn last_uri(session: &mut dyn PageSession) -> String {
    match session.current_uri().await {
        Ok(uri) => uri,
        Err(e) => {
            debug!("Failed to read current uri: {}", e);
            String::from("<unknown>")
        }
    }
}

/// 必須フィールドが揃うか試行回数を使い切るまで抽出を繰り返す
///
/// 遷移済みのセッションに対して呼ぶ。試行回数切れはエラーにせず、
/// `Convergence::Unresolved` の結果を返して警告ログを出す。
pub async fn extract_until_stable(
    session: &mut dyn PageSession,
    item: &WorkItem,
    extractor: &dyn FieldExtractor,
    required: BTreeSet<String>,
    policy: PollPolicy,
) -> Result<ExtractionResult, ScraperError> {
    let mut polling = Polling::new(item, required, policy.max_attempts);

    loop {
        let content = session.content().await?;
        let observed = observe_fields(extractor, &content, item);

        match polling.step(observed) {
            Step::Continue => {
                debug!(
                    "Item {} missing {:?}, {} attempts left",
                    item.id,
                    polling.missing(),
                    polling.attempts_left()
                );
                sleep(policy.interval).await;
            }
            Step::Done(result) => {
                debug!("Item {} converged", item.id);
                return Ok(result);
            }
            Step::Exhausted(result) => {
                let uri = last_uri(session).await;
                warn!(
                    "Item {} unresolved after {} attempts, missing {:?}: {}",
                    item.id,
                    policy.max_attempts,
                    polling.missing(),
                    uri
                );
                return Ok(result);
            }
        }
    }
}

/// 所属IDが期待件数に達するか試行回数を使い切るまで収集を繰り返す
///
/// 各ポーリングの間にビューポートを縦に倍々で広げ、追加の描画を促す。
/// 期待件数が無い、または一致しない場合も試行回数内で必ず終わり、エラーにはしない。
pub async fn converge_members(
    session: &mut dyn PageSession,
    item: &WorkItem,
    extractor: &dyn MemberExtractor,
    expected_count: Option<usize>,
    policy: PollPolicy,
    viewport: Viewport,
) -> Result<MembershipResult, ScraperError> {
    let mut polling = MemberPolling::new(
        MultiValueTarget::new(item.id, expected_count),
        policy.max_attempts,
    );
    let name = item.seed_fields.get("name").cloned();

    loop {
        let content = session.content().await?;
        let observed = observe_members(extractor, &content, item);

        match polling.step(observed) {
            Step::Continue => {
                let height = grown_height(viewport.height, polling.attempt());
                session.resize_view(viewport.width, height).await?;
                sleep(policy.interval).await;
            }
            Step::Done(target) => {
                info!(
                    "Category {} converged with {} members",
                    target.id,
                    target.len()
                );
                return Ok(MembershipResult {
                    target,
                    name,
                    status: Convergence::Converged,
                });
            }
            Step::Exhausted(target) => {
                let status = match target.expected_count {
                    // 期待件数が無ければ試行回数切れが正常な終了条件
                    None => Convergence::Converged,
                    Some(expected) => {
                        let uri = last_uri(session).await;
                        warn!(
                            "Category {} length mismatch: observed {}, expected {}: {}",
                            target.id,
                            target.len(),
                            expected,
                            uri
                        );
                        Convergence::Unresolved
                    }
                };
                return Ok(MembershipResult {
                    target,
                    name,
                    status,
                });
            }
        }
    }
}
