use std::net::TcpListener;

use clap::Parser;
use netconf_daemon::config::AgentConfig;
use netconf_daemon::handlers::build_registry;
use netconf_daemon::store::ConfigStore;
use netconf_daemon::transport;
use netconf_proto::Server;

#[derive(Parser)]
#[command(name = "netconfd", about = "NETCONF agent over framed TCP")]
struct Args {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    store: Option<String>,
    #[arg(long)]
    exampleconfig: bool,
    #[arg(short = 'v', long)]
    verbose: bool,
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    if args.exampleconfig {
        println!("{}", AgentConfig::example_toml());
        return;
    }

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = match args.config.as_ref() {
        Some(path) => match AgentConfig::load_from_path(std::path::Path::new(path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load config {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => AgentConfig::default(),
    };

    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(store) = args.store {
        config.store_path = Some(store);
    }

    let store_path = config
        .store_path
        .clone()
        .unwrap_or_else(|| ".netconfd-store".to_string());
    let store = ConfigStore::new(&store_path);
    if let Err(err) = store.ensure_seeded() {
        eprintln!("failed to seed store {}: {}", store_path, err);
        std::process::exit(1);
    }

    let registry = build_registry(store, &config.extra_capabilities);
    let server = Server::new(registry);

    let listener = match TcpListener::bind(&config.bind) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind {}: {}", config.bind, err);
            std::process::exit(1);
        }
    };

    if !args.quiet {
        println!("netconfd listening on {}", config.bind);
    }

    if let Err(err) = transport::serve(listener, server) {
        eprintln!("netconfd transport error: {}", err);
        std::process::exit(1);
    }
}
