use gobo_scraper::browser::launch_sessions;
use gobo_scraper::municipality::{display_order, fetch_municipalities, DEFAULT_TABLE_URI};
use gobo_scraper::records::municipalities;
use gobo_scraper::{ExtractionTables, GoboConfig, PageSession};

#[tokio::main]
async fn main() {
    // ログ設定
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let uri = std::env::var("MUNICIPALITY_URI").unwrap_or_else(|_| DEFAULT_TABLE_URI.to_string());
    let tables = match std::env::var("GOBO_TABLES") {
        Ok(path) => ExtractionTables::from_path(&path).expect("Failed to load GOBO_TABLES"),
        Err(_) => ExtractionTables::default(),
    };

    let config = GoboConfig::new().with_pool_size(1);
    let mut sessions = launch_sessions(&config)
        .await
        .expect("Failed to launch browser");

    let fetched = fetch_municipalities(&mut sessions[0], &uri).await;
    sessions[0].close().await.expect("Failed to close browser");

    let nodes = match fetched {
        Ok(nodes) => nodes,
        Err(e) => {
            eprintln!("エラー: {}", e);
            return;
        }
    };

    let order = display_order(&nodes, &tables.display_order[..]).expect("Unknown display name");
    for record in municipalities(&nodes, &order) {
        let parent = record
            .parent_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "NULL".to_string());
        println!(
            "    ({:>5}, {:>5}, {:?}, {:?})",
            record.id, parent, record.name, record.kana
        );
    }
}
