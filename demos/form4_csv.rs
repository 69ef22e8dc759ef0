//! Quarterly Form 4 export
//!
//! Resolves every daily master index of a quarter, keeps Forms 4 and 4/A, extracts the
//! ownership fields from each filing and writes them to a CSV file.
//!
//! Run with: `cargo run --example form4_csv -- 2022 2 form4.csv`. Without arguments the
//! current quarter is collected.
//!
//! Set `RUST_LOG=insiderkit=debug` to watch every fetch and cache hit.

use insiderkit::{
    FilingOperations, FilingOptions, Insider, InsiderConfig, Period, Quarter,
};
use std::error::Error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("insiderkit=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let period = match args.as_slice() {
        [year, quarter, ..] => {
            Period::new(year.parse::<i32>()?, Quarter::try_from(quarter.parse::<u32>()?)?)?
        }
        _ => Period::containing(chrono::Local::now().date_naive())?,
    };
    let output = args.get(2).cloned().unwrap_or_else(|| "form4.csv".to_string());
    let config = InsiderConfig {
        concurrency: 4,
        ..InsiderConfig::new("Insiderkit Example", "example.com")
    };
    std::fs::create_dir_all(&config.index_cache_dir)?;
    std::fs::create_dir_all(&config.document_cache_dir)?;

    let insider = Insider::with_config(config)?;
    let rows = insider
        .collect(period, &FilingOptions::insider_forms())
        .await?;

    let mut writer = csv::Writer::from_path(&output)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    println!("✓ Wrote {} rows to {}", rows.len(), output);
    Ok(())
}
