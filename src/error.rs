use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("セレクタが不正です: {0}")]
    Selector(String),

    #[error("JSON解析エラー: {0}")]
    Json(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("bootOptions が見つかりません: {0}")]
    BootOptions(String),

    #[error("抽出エラー: item={id}: {message}")]
    Extraction { id: u64, message: String },

    #[error("親の名前が重複しています: {kanji}（{kana}）")]
    AmbiguousParent { kanji: String, kana: String },

    #[error("親が未出現です: code={code}, parent={kanji}（{kana}）")]
    UnknownParent { code: u32, kanji: String, kana: String },

    #[error("コードが重複しています: {0}")]
    DuplicateCode(u32),

    #[error("親のない行です: code={0}")]
    OrphanRow(u32),

    #[error("表が1つではありません: {0}個")]
    TableCount(usize),

    #[error("ルートが1つではありません: {0}個")]
    RootCount(usize),

    #[error("表示順の名前が見つかりません: {0}")]
    UnknownDisplayName(String),

    #[error("住所から市町村を特定できません: {address} -> {candidates:?}")]
    AddressUnresolved {
        address: String,
        candidates: Vec<String>,
    },

    #[error("ワーカータスクが異常終了しました: {0}")]
    Worker(String),
}

impl ScraperError {
    /// セッション/ドキュメント問い合わせ自体の失敗か
    ///
    /// true の場合はプール全体を中断する。false の場合はその項目だけを失敗として記録する。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScraperError::BrowserInit(_)
                | ScraperError::Navigation(_)
                | ScraperError::JavaScript(_)
                | ScraperError::Selector(_)
                | ScraperError::Worker(_)
        )
    }
}

impl From<serde_json::Error> for ScraperError {
    fn from(e: serde_json::Error) -> Self {
        ScraperError::Json(e.to_string())
    }
}
