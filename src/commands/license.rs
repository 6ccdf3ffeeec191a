use clap::ArgMatches;
use wayfarer_runtime::{GumroadVerifier, LicenseVerifier};

use super::{init_tracing, read_config};

pub async fn run(matches: &ArgMatches) -> i32 {
    let config = match read_config(matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {}", e);
            return 1;
        }
    };
    init_tracing(&config.logging);

    if let Err(e) = config.validate_licensing() {
        eprintln!("✗ Invalid configuration: {}", e);
        return 1;
    }

    let verifier = match GumroadVerifier::new(&config.licensing) {
        Ok(verifier) => verifier,
        Err(e) => {
            eprintln!("✗ {}", e);
            return 1;
        }
    };

    let key = matches
        .get_one::<String>("key")
        .map(String::as_str)
        .unwrap_or_default();

    match verifier.verify(key).await {
        Ok(grant) => {
            println!("✓ License {} is valid", grant.key_hint);
            if let Some(product) = grant.product_name {
                println!("  Product: {}", product);
            }
            0
        }
        Err(e) if e.is_denial() => {
            eprintln!("✗ Invalid License Key. ({})", e);
            2
        }
        Err(e) => {
            eprintln!("✗ Connection Error: {}", e);
            1
        }
    }
}
