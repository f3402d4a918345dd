use gobo_scraper::address::AddressResolver;
use gobo_scraper::browser::launch_sessions;
use gobo_scraper::municipality::{fetch_municipalities, DEFAULT_TABLE_URI};
use gobo_scraper::records::{spots, Category, Spot};
use gobo_scraper::sink::JsonSink;
use gobo_scraper::{
    CollectRequest, ExtractionTables, GoboConfig, GoboService, PageSession, RecordSink, WorkItem,
};
use tower::Service;

#[tokio::main]
async fn main() {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter("info,gobo_scraper=debug")
        .init();

    // 静的テーブル（期待件数・免除表）はJSONファイルから
    // 例: GOBO_TABLES=./tables.json
    let tables = match std::env::var("GOBO_TABLES") {
        Ok(path) => ExtractionTables::from_path(&path).expect("Failed to load GOBO_TABLES"),
        Err(_) => ExtractionTables::default(),
    };

    // 例: GOBO_CATEGORIES='[{"id":3,"seed_fields":{"name":"道の駅"}}]'
    let categories: Vec<WorkItem> = std::env::var("GOBO_CATEGORIES")
        .map(|json| serde_json::from_str(&json).expect("Failed to parse GOBO_CATEGORIES JSON"))
        .unwrap_or_default();

    let pool_size = std::env::var("GOBO_POOL_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4);

    let config = GoboConfig::new()
        .with_pool_size(pool_size)
        .with_headless(std::env::var("GOBO_HEADED").is_err());
    let output_dir = config.output_dir.clone();

    // 住所 → 市町村の判定用に市町村コード表を先に取る
    let mut sessions = launch_sessions(&config.clone().with_pool_size(1))
        .await
        .expect("Failed to launch browser");
    let nodes = fetch_municipalities(&mut sessions[0], DEFAULT_TABLE_URI).await;
    for mut session in sessions {
        let _ = session.close().await;
    }
    let nodes = nodes.expect("Failed to fetch municipalities");
    let resolver =
        AddressResolver::from_tables(&nodes, &tables).expect("Failed to build address resolver");

    let request = CollectRequest::new(config)
        .with_tables(tables)
        .with_categories(categories);

    println!("=== GoGo房総 Collect ===");

    let mut service = GoboService::new();
    let result = match service.call(request).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("エラー: {}", e);
            return;
        }
    };

    let spots: Vec<Spot> = spots(&result.spots, &resolver);
    let categories: Vec<Category> = result.categories.iter().map(Category::from).collect();

    let sink = JsonSink::new(output_dir);
    sink.write_batch("spots", &spots).await.expect("Failed to save spots");
    sink.write_batch("categories", &categories)
        .await
        .expect("Failed to save categories");

    println!("スポット: {}件", spots.len());
    println!("カテゴリ: {}件", categories.len());
    println!("未収束: {:?}", result.unresolved_ids());
}
