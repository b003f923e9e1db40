use relift::config::MigrateConfig;
use relift::StageOutcome;
use std::path::Path;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = if let Some(db) = parse_flag_value(&args, "--db") {
        MigrateConfig::new(db)
    } else {
        let path = parse_flag_value(&args, "--config").unwrap_or_else(|| "config.json".into());
        MigrateConfig::from_file(Path::new(&path)).map_err(|e| format!("load config: {e}"))?
    };

    let report = relift::run(&config).map_err(|e| e.to_string())?;

    for outcome in &report.stages {
        match outcome {
            StageOutcome::Completed { stage } => println!("ok\t{stage}"),
            StageOutcome::Skipped { stage, reason } => println!("skipped\t{stage}\t{reason}"),
        }
    }
    Ok(())
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  relift [--config <config.json>]");
    eprintln!("  relift --db <analytics.db>");
}
