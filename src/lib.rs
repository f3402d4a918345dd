//! GoGo房総 スポット収集ライブラリ
//!
//! - 複数のブラウザセッションで作業キューを分担し、非同期描画のページから
//!   必須フィールドが揃うまでポーリングして抽出する
//! - 千葉県の市町村コード変遷表を親子関係つきのノード列に変換する
//!
//! # 収集サービス使用例
//!
//! ```rust,ignore
//! use gobo_scraper::{CollectRequest, ExtractionTables, GoboConfig, GoboService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = GoboService::new();
//!
//!     let request = CollectRequest::new(GoboConfig::new().with_pool_size(4))
//!         .with_tables(ExtractionTables::from_path("tables.json").unwrap());
//!
//!     let result = service.call(request).await.unwrap();
//!     println!("Spots: {}", result.spots.len());
//! }
//! ```
//!
//! # 市町村コード表使用例
//!
//! ```rust,ignore
//! use gobo_scraper::browser::launch_sessions;
//! use gobo_scraper::municipality::{fetch_municipalities, DEFAULT_TABLE_URI};
//! use gobo_scraper::GoboConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut sessions = launch_sessions(&GoboConfig::new().with_pool_size(1)).await.unwrap();
//!     let nodes = fetch_municipalities(&mut sessions[0], DEFAULT_TABLE_URI).await.unwrap();
//!     println!("Municipalities: {}", nodes.len());
//! }
//! ```

pub mod address;
pub mod browser;
pub mod config;
pub mod convergence;
pub mod document;
pub mod error;
pub mod merge;
pub mod municipality;
pub mod platinum;
pub mod pool;
pub mod records;
pub mod service;
pub mod sink;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

// 主要な型をリエクスポート
pub use config::{ExtractionTables, GoboConfig, PollPolicy, Viewport};
pub use error::ScraperError;
pub use pool::WorkPool;
pub use service::{collect, CollectRequest, CollectResult, GoboService};
pub use traits::{FieldExtractor, MemberExtractor, Outcome, PageSession, RecordSink, Task};
pub use types::{
    Convergence, ExtractionResult, MembershipResult, MultiValueTarget, RequiredFields, WorkItem,
};
