use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::ScraperError;
use crate::types::WorkItem;

/// ブラウザ自動化の1セッション
///
/// プールの1レーンが生存期間中ずっと占有する。セッション間で共有はしない。
#[async_trait]
pub trait PageSession: Send {
    /// 指定URIへ遷移
    async fn navigate(&mut self, uri: &str) -> Result<(), ScraperError>;

    /// 現在のレンダリング済みHTML
    async fn content(&mut self) -> Result<String, ScraperError>;

    /// ビューポートの変更
    async fn resize_view(&mut self, width: u32, height: u32) -> Result<(), ScraperError>;

    /// 現在のURI（診断用）
    async fn current_uri(&mut self) -> Result<String, ScraperError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), ScraperError>;
}

/// レンダリング済みドキュメントからフィールドを1回抜き出す
pub trait FieldExtractor: Send + Sync {
    /// 今回見えたフィールド（名前 → 値）
    fn extract(&self, document: &Document, item: &WorkItem) -> BTreeMap<String, String>;
}

/// 複数値フィールド（所属ID）を1回抜き出す
pub trait MemberExtractor: Send + Sync {
    /// 今回見えたIDをドキュメント順に返す
    fn extract(&self, document: &Document, item: &WorkItem) -> Vec<u64>;
}

/// プールの結果型
pub trait Outcome: Send + 'static {
    fn id(&self) -> u64;

    /// 項目単位のエラーを失敗結果として記録する
    fn failed(item: &WorkItem, reason: String) -> Self;

    fn is_converged(&self) -> bool;
}

/// 1項目分の処理
#[async_trait]
pub trait Task: Send + Sync + 'static {
    type Output: Outcome;

    async fn run(
        &self,
        session: &mut dyn PageSession,
        item: &WorkItem,
    ) -> Result<Self::Output, ScraperError>;
}

/// 確定したレコードの書き出し先
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write_batch<R>(&self, kind: &str, records: &[R]) -> Result<(), ScraperError>
    where
        R: serde::Serialize + Sync;
}
