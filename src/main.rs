use std::io::Write;
use std::sync::Arc;

use anyhow::Result;

use analyze_cfdi::{
    AnalysisEngine, CancelToken, Cli, Config, EngineConfig, FileDiscovery, Output, OutputFormat,
    ProgressCallback, TaxpayerProfile, export_tables,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        std::process::exit(2);
    }
    let config = Config::from_cli(&cli);

    let profile = TaxpayerProfile::new(&config.rfc)?;
    let discovery = FileDiscovery::new()
        .with_extensions(config.extensions.clone())
        .with_include_patterns(config.include_patterns.clone())?
        .with_exclude_patterns(config.exclude_patterns.clone())?;
    let engine = AnalysisEngine::new(EngineConfig {
        concurrency: config.threads,
        count_unclassified: !config.skip_unclassified,
    });

    // Ctrl-C requests cooperative cancellation; in-flight files finish and a
    // partial aggregate is still produced
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancellation requested, finishing in-flight files...");
                cancel.cancel();
            }
        });
    }

    let progress: Option<ProgressCallback> = if config.progress {
        Some(Arc::new(|update| {
            eprint!(
                "\r{}/{} processed (accepted {}, invalid {}, duplicates {}, legacy {})",
                update.processed,
                update.total,
                update.accepted,
                update.invalid,
                update.duplicate,
                update.legacy_version
            );
            let _ = std::io::stderr().flush();
        }))
    } else {
        None
    };
    let show_progress = progress.is_some();

    let aggregate = engine
        .run_with_progress(&config.paths, &profile, &discovery, progress, Some(cancel))
        .await?;
    if show_progress {
        eprintln!();
    }

    let output = Output::new(config.verbosity());
    match config.format {
        OutputFormat::Human => print!("{}", output.format_results(&aggregate)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&aggregate)?),
        OutputFormat::Summary => println!("{}", output.format_oneline(&aggregate)),
    }

    if let Some(dir) = &config.export_dir {
        let written = export_tables(&aggregate, dir)?;
        if !config.quiet {
            for path in written {
                eprintln!("Exported {}", path.display());
            }
        }
    }

    Ok(())
}
