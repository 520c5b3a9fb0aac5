//! Save a few records, wait for them to become searchable, then scroll them
//! back out.
//!
//! Reads `esprit.json` when present, otherwise expects a server on
//! localhost:9200:
//!
//! ```bash
//! cargo run --example save_and_scroll
//! ```

use esprit::esprit_core::Config;
use esprit::{Client, Dao, SaveOptions, ScrollOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut config = Config::load("esprit.json").unwrap_or_else(|_| Config {
        index: vec!["esprit-example".to_string()],
        es_version: "7.10.0".to_string(),
        ..Config::default()
    });
    config.save.max_wait_secs.get_or_insert(5.0);
    let client = Client::new(config.connection())?;

    for title in ["Dune", "Hyperion", "Solaris"] {
        let mut dao = Dao::new();
        dao.data_mut().insert("title".into(), json!(title));
        client
            .save(&mut dao, "book", SaveOptions::from_config(&config.save))
            .await?;
        println!("saved {} as {}", title, dao.id().unwrap_or("?"));
    }

    // dynamic mappings have no `id.exact`, so sort in index order
    let query = json!({"query": {"match_all": {}}, "sort": ["_doc"]});
    let mut records = client.scroll(&["book"], Some(&query), ScrollOptions::default().with_page_size(2));
    while let Some(record) = records.next().await? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
