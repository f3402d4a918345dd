//! レコードの書き出し

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{offset::FixedOffset, Offset, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::ScraperError;
use crate::traits::RecordSink;

/// 種別ごとにタイムスタンプ付きのJSONファイルへ書き出す
#[derive(Debug, Clone)]
pub struct JsonSink {
    dir: PathBuf,
}

impl JsonSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, kind: &str) -> PathBuf {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix());
        let timestamp = Utc::now().with_timezone(&jst).format("%Y%m%d_%H%M%S");
        self.dir.join(format!("{}_{}.json", kind, timestamp))
    }
}

#[async_trait]
impl RecordSink for JsonSink {
    async fn write_batch<R>(&self, kind: &str, records: &[R]) -> Result<(), ScraperError>
    where
        R: Serialize + Sync,
    {
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_string_pretty(records)?;
        let path = self.path_for(kind);
        tokio::fs::write(&path, json).await?;

        info!("Saved {} {} records to {:?}", records.len(), kind, path);
        Ok(())
    }
}
