mod alerts;
mod app;
mod cases;
mod cli;
mod config;
mod domain;
mod storage;
mod ui;

use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "alertsync=debug" } else { "alertsync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<(), app::AppError> {
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();
    if let Commands::Normalize(args) = &cli.command {
        println!("{}", alerts::normalize_identifier(Some(args.value.as_str())));
        return Ok(());
    }

    let mut config = config::AppConfig::load(cli.config.as_deref(), cli.data_dir.as_deref())?;
    if cli.debug {
        config.engine.debug_logging = true;
    }
    init_tracing(config.engine.debug_logging);
    let app = app::App::open(config);

    match cli.command {
        Commands::Sync(args) => {
            let outcome = app.sync();
            if args.json {
                print_json(&outcome);
            } else {
                ui::print_sync_summary(&outcome);
            }
            if let Some(warning) = outcome.warning.as_deref() {
                eprintln!("warning: {}", warning);
            }
        }
        Commands::Ls(args) => {
            let filter = app::ListFilter {
                case_id: args.case_id,
                status: app::parse_status_filter(args.status.as_deref())?,
                unmatched: args.unmatched,
            };
            let alerts = app.list(&filter);
            if args.json {
                print_json(&alerts);
            } else {
                ui::print_alert_list(&alerts, &filter);
            }
        }
        Commands::Show(args) => {
            let alert = app.show(&args.key)?;
            if args.json {
                print_json(&alert);
            } else {
                ui::print_alert_show(&alert);
            }
        }
        Commands::Update(args) => {
            let updated = app.update(
                &args.key,
                app::UpdateRequest {
                    status: args.status,
                    notes: args.notes,
                    resolved_at: args.resolved_at,
                    clear_resolved: args.clear_resolved,
                },
            )?;
            if args.json {
                print_json(&updated.alert);
            } else {
                println!("updated {} -> {}", updated.alert.key, updated.alert.status);
            }
            if let Some(warning) = updated.warning.as_deref() {
                eprintln!("warning: {}", warning);
            }
        }
        Commands::Normalize(_) => unreachable!("normalize is handled before config loading"),
    }
    Ok(())
}
