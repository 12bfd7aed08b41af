//! Quick connection check for both configured stores
//! Run with: cargo run --package subsample-state --example check_connection

use subsample_state::{StoreConfig, SurrealRecordStore, SOURCE_PREFIX, TARGET_PREFIX};

#[tokio::main]
async fn main() {
    // Load from environment
    dotenvy::dotenv().ok();

    let mut failed = false;
    for prefix in [SOURCE_PREFIX, TARGET_PREFIX] {
        println!("Testing {prefix} store connection...");

        match StoreConfig::from_env(prefix) {
            Ok(config) => {
                println!("  Endpoint: {}", config.endpoint_url());
                println!("  Namespace: {}", config.namespace);
                println!("  Database: {}", config.database);

                match SurrealRecordStore::connect(&config).await {
                    Ok(_store) => println!("✓ {prefix} store reachable"),
                    Err(e) => {
                        eprintln!("✗ Connection failed: {}", e);
                        failed = true;
                    }
                }
            }
            Err(e) => {
                eprintln!("✗ Missing environment variables: {}", e);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
