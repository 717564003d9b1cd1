use anyhow::{Context, Result};
use clap::Parser;
use img_migrate::cli::{Args, Commands, SourceArgs};
use img_migrate::compressor::{compress_file, Preset};
use img_migrate::formats::OutputFormat;
use img_migrate::utils::{calculate_compression_ratio, create_progress_bar, format_file_size};
use img_migrate::{
    build_http_client, candidate_jobs, logger, say, url_updates, Catalog, FetchChain, JsonCatalog,
    MigrationOptions, MigrationRun, Migrator, PauseToken, PipelineConfig, ProgressEvent, RunState,
    RunStatus, StateCheckpoint,
};
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose);

    match args.command {
        Commands::Compress {
            input,
            output,
            preset,
            format,
        } => {
            if !input.exists() {
                anyhow::bail!("File not found: {:?}", input);
            }
            compress_file(&input, &output, preset, format)
                .with_context(|| format!("failed to compress {:?}", input))?;
        }
        Commands::Plan { source } => plan(&source).await?,
        Commands::Migrate {
            source,
            state,
            delete_original,
            preset,
            format,
            reset,
        } => {
            let overrides = Overrides {
                delete_original,
                preset,
                format,
                reset,
            };
            migrate(&source, &state, overrides).await?
        }
    }

    Ok(())
}

fn load_config(source: &SourceArgs) -> Result<PipelineConfig> {
    PipelineConfig::load_or_default(source.config.as_deref())
        .with_context(|| format!("invalid configuration {:?}", source.config))
}

async fn plan(source: &SourceArgs) -> Result<()> {
    let config = load_config(source)?;
    let store = config.build_store(build_http_client()?)?;
    let catalog = JsonCatalog::new(&source.catalog);
    let records = catalog
        .list()
        .await
        .with_context(|| format!("cannot read catalog {:?}", source.catalog))?;

    let jobs = candidate_jobs(&records, store.as_ref());
    say!("📋 {} records, {} images to migrate", records.len(), jobs.len());
    for job in &jobs {
        let key = job.asset.storage_key.as_deref().unwrap_or("-");
        println!("{}\t{}\t{}", job.id, key, job.asset.url);
    }
    Ok(())
}

/// `migrate` flags that take precedence over the config file.
struct Overrides {
    delete_original: bool,
    preset: Option<Preset>,
    format: Option<OutputFormat>,
    reset: bool,
}

async fn migrate(source: &SourceArgs, state_path: &Path, overrides: Overrides) -> Result<()> {
    let mut config = load_config(source)?;
    config.migration.delete_original |= overrides.delete_original;
    if overrides.preset.is_some() {
        config.migration.preset = overrides.preset;
    }
    if overrides.format.is_some() {
        config.migration.output_format = overrides.format;
    }

    let http = build_http_client()?;
    let store = config.build_store(http.clone())?;
    let catalog: Arc<dyn Catalog> = Arc::new(JsonCatalog::new(&source.catalog));

    let saved = if overrides.reset {
        None
    } else {
        RunState::load(state_path)
            .with_context(|| format!("cannot read run state {:?}", state_path))?
    };
    let mut state = match saved {
        Some(state) => {
            say!(
                "🔄 Resuming run: {}/{} jobs processed",
                state.run.cursor,
                state.run.total_jobs
            );
            state
        }
        None => {
            let records = catalog
                .list()
                .await
                .with_context(|| format!("cannot read catalog {:?}", source.catalog))?;
            let jobs = candidate_jobs(&records, store.as_ref());
            say!("🚀 Starting migration of {} images", jobs.len());
            RunState::new(jobs)
        }
    };

    say!("🗄️  Store: {}", store.name());
    if config.migration.delete_original {
        say!("🗑️  Originals will be deleted after upload");
    }

    let fetcher = FetchChain::from_config(&config.fetch, store.clone(), http);
    say!("🔗 Fetch strategies: {}", fetcher.strategy_names().join(" → "));
    let checkpoint = Arc::new(StateCheckpoint::new(state_path, catalog.clone()));
    let migrator = Migrator::new(store, fetcher, MigrationOptions::from(&config.migration))
        .with_checkpoint(checkpoint.clone());

    let pause = PauseToken::new();
    let ctrl_c = pause.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏸️  Pausing after the current image...");
            ctrl_c.pause();
        }
    });

    let pb = if logger::is_quiet() {
        ProgressBar::hidden()
    } else {
        create_progress_bar(state.run.total_jobs as u64)
    };
    pb.set_position(state.run.cursor as u64);
    let bar = pb.clone();
    let sink = move |event: &ProgressEvent| match event {
        ProgressEvent::JobStarted { job_id, .. } => bar.set_message(job_id.clone()),
        ProgressEvent::JobSucceeded { .. } => bar.inc(1),
        ProgressEvent::JobFailed { job_id, message, .. } => {
            bar.inc(1);
            bar.println(format!("❌ {}: {}", job_id, message));
        }
        ProgressEvent::Paused { .. } => bar.abandon_with_message("⏸️  Paused"),
        ProgressEvent::Completed { .. } => bar.finish_with_message("✅ Migration complete"),
    };

    let started = Instant::now();
    let status = migrator
        .run_batch(&mut state.jobs, &mut state.run, &pause, &sink)
        .await?;
    let elapsed = started.elapsed();

    state
        .save(state_path)
        .with_context(|| format!("cannot save run state {:?}", state_path))?;

    // Covers jobs whose checkpoint write-back did not happen.
    let updates = url_updates(&state.jobs);
    let applied = checkpoint.applied()
        + catalog
            .write_back(&updates)
            .await
            .with_context(|| format!("cannot update catalog {:?}", source.catalog))?;

    print_summary(&state, status, applied, elapsed);
    if status == RunStatus::Paused {
        say!(
            "💡 Run again with --state {:?} to resume from job {}",
            state_path,
            state.run.cursor + 1
        );
    }
    Ok(())
}

fn print_summary(state: &RunState, status: RunStatus, applied: usize, elapsed: std::time::Duration) {
    let run: &MigrationRun = &state.run;
    let (total_before, total_after) = state
        .jobs
        .iter()
        .filter_map(|job| Some((job.original_size_bytes?, job.compressed_size_bytes?)))
        .fold((0u64, 0u64), |(before, after), (o, c)| (before + o, after + c));

    say!("\n📊 Migration Summary:");
    say!("  📌 Status: {:?}", status);
    say!(
        "  ✅ Succeeded: {}/{} images",
        run.success_count,
        run.total_jobs
    );
    say!("  📊 Total original size: {}", format_file_size(total_before));
    say!("  📊 Total compressed size: {}", format_file_size(total_after));
    say!("  💾 Total saved: {}", format_file_size(run.total_savings_bytes));
    if total_before > 0 {
        say!(
            "  🎯 Overall compression ratio: {:.1}%",
            calculate_compression_ratio(total_before, total_after)
        );
    }
    say!("  📝 Catalog URLs updated: {}", applied);
    say!("  ⏱️  Time this session: {:?}", elapsed);

    if run.failure_count > 0 {
        say!("  ⚠️  Failed images: {}", run.failure_count);
        for error in &run.errors {
            eprintln!("    ❌ {}: {}", error.job_id, error.message);
        }
    }
    for warning in &run.warnings {
        eprintln!("    ⚠️  {}: {}", warning.job_id, warning.message);
    }
}
