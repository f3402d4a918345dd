//! 千葉県の市町村コード表
//!
//! 市町村コードの変遷表ページから、県をルートとする市・郡・町村の親子関係を作る

mod parser;
mod types;

use tracing::info;

use crate::document::Document;
use crate::error::ScraperError;
use crate::traits::PageSession;

pub use parser::{
    display_order, flatten, flatten_document, resolve, root_code, root_name, CHANGED_MARKER,
};
pub use types::{Code, HierarchyNode, NamePair, RawRow};

/// 千葉県の市町村コード変遷表
pub const DEFAULT_TABLE_URI: &str = "http://www.tt.rim.or.jp/~ishato/tiri/code/rireki/12tiba.htm";

/// コード表ページを開いて解決済みのノード列を返す
pub async fn fetch_municipalities(
    session: &mut dyn PageSession,
    uri: &str,
) -> Result<Vec<HierarchyNode>, ScraperError> {
    info!("Fetching municipality table from {}", uri);
    session.navigate(uri).await?;
    let content = session.content().await?;

    let nodes = parse_content(&content)?;
    info!("Parsed {} municipality nodes", nodes.len());
    Ok(nodes)
}

/// HTML文字列から解決済みのノード列を作る
pub fn parse_content(content: &str) -> Result<Vec<HierarchyNode>, ScraperError> {
    let document = Document::parse(content);
    let rows = flatten_document(&document)?;
    resolve(&rows)
}
