use clap::{Arg, Command};

mod commands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Configuration file (defaults to ./wayfarer.toml when present)")
}

#[tokio::main]
async fn main() {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();

    let matches = Command::new("wayfarer")
        .version(VERSION)
        .about("Wayfarer - license-gated live travel planner")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Discover a model and serve the planner")
                .arg(config_arg())
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("Host address to bind to"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .value_parser(clap::value_parser!(u16))
                        .help("Port to bind the server to"),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Run model discovery once and print every attempt")
                .arg(config_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print the outcome as JSON"),
                ),
        )
        .subcommand(
            Command::new("verify-license")
                .about("Check a license key against the licensing service")
                .arg(config_arg())
                .arg(
                    Arg::new("key")
                        .short('k')
                        .long("key")
                        .value_name("KEY")
                        .required(true)
                        .help("License key to verify"),
                ),
        )
        .get_matches();

    let code = match matches.subcommand() {
        Some(("serve", sub_matches)) => commands::serve::run(sub_matches).await,
        Some(("resolve", sub_matches)) => commands::resolve::run(sub_matches).await,
        Some(("verify-license", sub_matches)) => commands::license::run(sub_matches).await,
        _ => {
            println!("Wayfarer v{}", VERSION);
            println!("Use --help for available commands");
            0
        }
    };

    std::process::exit(code);
}
