use sqlx::Row;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;

const RULE: &str =
    "--------------------------------------------------------------------------------";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <search_query>", args[0]);
        eprintln!("Search query matches against sender or subject of cached messages.");
        std::process::exit(1);
    }

    let query = &args[1];
    let search_term = format!("%{}%", query);

    let database_url = "sqlite://mailpilot.db";
    let pool = SqlitePoolOptions::new()
        .connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let rows = sqlx::query(
        "SELECT folder, id, from_name, from_address, subject, date, body, is_unread, is_starred, enrichment, cached_at
         FROM cached_messages
         WHERE from_name LIKE ? OR from_address LIKE ? OR subject LIKE ?
         ORDER BY cached_at DESC, position ASC
         LIMIT 5",
    )
    .bind(&search_term)
    .bind(&search_term)
    .bind(&search_term)
    .fetch_all(&pool)
    .await?;

    if rows.is_empty() {
        println!("No cached messages matching '{}'", query);
        return Ok(());
    }

    for row in rows {
        let enrichment: Option<String> = row.get("enrichment");
        let cached_at: i64 = row.get("cached_at");
        let cached_at = chrono::DateTime::from_timestamp_millis(cached_at)
            .map(|d| d.to_rfc3339())
            .unwrap_or_default();

        println!("Folder: {}", row.get::<String, _>("folder"));
        println!("ID: {}", row.get::<String, _>("id"));
        println!(
            "From: {} <{}>",
            row.get::<String, _>("from_name"),
            row.get::<String, _>("from_address")
        );
        println!("Subject: {}", row.get::<String, _>("subject"));
        println!("Date: {}", row.get::<String, _>("date"));
        println!(
            "Unread: {}  Starred: {}  Cached: {}",
            row.get::<bool, _>("is_unread"),
            row.get::<bool, _>("is_starred"),
            cached_at
        );
        println!("{}", RULE);
        println!("ENRICHMENT:");
        match enrichment.as_deref().map(serde_json::from_str::<serde_json::Value>) {
            Some(Ok(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
            Some(Err(_)) => println!("(unparseable) {:?}", enrichment),
            None => println!("(None)"),
        }
        println!("{}", RULE);
        println!("BODY:");
        println!("{}", row.get::<String, _>("body"));
        println!("{}", RULE);
    }

    Ok(())
}
