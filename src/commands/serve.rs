use clap::ArgMatches;
use wayfarer_runtime::{BindingStatus, Wayfarer};

use super::{init_tracing, read_config};

pub async fn run(matches: &ArgMatches) -> i32 {
    let mut config = match read_config(matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {}", e);
            return 1;
        }
    };

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.bind_address = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }

    init_tracing(&config.logging);

    let app = match Wayfarer::new(config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("✗ {}", e);
            return 1;
        }
    };

    println!("✓ Configuration loaded");
    println!("→ Discovering a working region and model...");

    match app.discover().await {
        status @ BindingStatus::Bound { .. } => {
            if let Some(caption) = status.caption() {
                println!("✓ {}", caption);
            }
        }
        BindingStatus::Unresolved { attempts } => {
            println!(
                "✗ No working region/model combination ({} attempt(s)); the planner will offer a retry",
                attempts.len()
            );
        }
        BindingStatus::Pending => {}
    }

    let server = &app.config().server;
    println!(
        "✓ Planner available at http://{}:{}",
        server.bind_address, server.port
    );
    println!("\nPress Ctrl+C to stop");

    match app.serve().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("✗ {}", e);
            1
        }
    }
}
