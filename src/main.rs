use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use vidbatch::cli::{self, Commands, ConsoleSink, TranscodeArgs};
use vidbatch::config::Config;
use vidbatch::engine::core::collect_inputs;
use vidbatch::engine::hardware::{available_encoders, cpu_thread_count, gpu_supported, host_info};
use vidbatch::engine::{
    Event, EventSink, JsonLinesSink, Locator, Supervisor, Tool, TranscodeJob, WorkerMessage,
    WorkerPool, probe_many,
};

fn main() -> Result<()> {
    let cli = cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::CheckTools => check_tools(),
        Commands::Info => print_info(),
        Commands::Probe { paths } => probe(&paths),
        Commands::Transcode(args) => transcode(args),
        Commands::InitConfig => init_config(),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("VIDBATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries results (JSON, progress); logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn check_tools() -> Result<()> {
    let locator = Locator::new();
    let mut missing = Vec::new();

    for tool in [Tool::Ffmpeg, Tool::Ffprobe] {
        match locator.version(tool) {
            Ok(version) => println!("✓ {}: {}", tool, version),
            Err(e) => {
                println!("✗ {}", e);
                missing.push(tool.name());
            }
        }
    }

    let gpu = gpu_supported(&locator);
    println!(
        "GPU acceleration: {}",
        if gpu { "available" } else { "not detected" }
    );

    let encoders = available_encoders(&locator);
    if !encoders.is_empty() {
        println!("Encoders: {}", encoders.join(", "));
    }
    println!("CPU threads: {}", cpu_thread_count());

    if !missing.is_empty() {
        bail!("Missing required tools: {}", missing.join(", "));
    }
    Ok(())
}

fn print_info() -> Result<()> {
    let config = Config::load()?;
    let info = host_info(&Locator::new(), &config.resolved_output_directory());
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn probe(paths: &[PathBuf]) -> Result<()> {
    let inputs = collect_inputs(paths)?;
    let event = probe_many(&Locator::new(), &inputs);
    println!("{}", serde_json::to_string_pretty(&event)?);

    if let Event::FilesSelectionCancelled(reason) = &event {
        bail!("Nothing to probe: {}", reason);
    }
    Ok(())
}

fn transcode(args: TranscodeArgs) -> Result<()> {
    let config = Config::load()?;
    let params = args.params(&config.defaults)?;

    let inputs = collect_inputs(&args.paths)?;
    if inputs.is_empty() {
        bail!("No video files found in the given paths");
    }

    let mut options = config.supervisor_options();
    if let Some(dir) = &args.output_dir {
        options.output_directory = dir.clone();
    }
    options.overwrite |= args.overwrite;

    let jobs: Vec<TranscodeJob> = inputs
        .into_iter()
        .map(|input| TranscodeJob::new(input, params.clone()))
        .collect();

    let names: HashMap<String, String> = jobs
        .iter()
        .map(|job| {
            let name = job
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| job.input.display().to_string());
            (job.id.clone(), name)
        })
        .collect();

    let sink: Arc<dyn EventSink> = if args.json {
        Arc::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Arc::new(ConsoleSink::new(names.clone()))
    };

    let output_directory = options.output_directory.clone();
    let supervisor = Supervisor::new(Locator::new(), options, Arc::clone(&sink));

    if args.dry_run {
        for job in &jobs {
            let command = supervisor
                .command_for(&job.input, &job.params)
                .with_context(|| format!("Cannot build command for {}", job.input.display()))?;
            println!("{}", command.display());
        }
        return Ok(());
    }

    sink.emit(Event::DirectorySelected(
        output_directory.to_string_lossy().into_owned(),
    ));

    let total = jobs.len();
    let pool = WorkerPool::new(supervisor, args.max_workers(&config.defaults));
    info!("Transcoding {} file(s) with up to {} worker(s)", total, pool.max_workers());

    let outcomes = pool.run_all(jobs, |message| match message {
        WorkerMessage::JobStarted { job_id } => {
            info!("Started {}", names.get(job_id).unwrap_or(job_id));
        }
        WorkerMessage::JobFailed { job_id, error } => {
            error!("{} failed: {}", names.get(job_id).unwrap_or(job_id), error);
        }
        WorkerMessage::JobCompleted { .. } | WorkerMessage::WorkerIdle { .. } => {}
    });

    let failed = outcomes.iter().filter(|(_, result)| result.is_err()).count();
    if failed > 0 {
        bail!("{} of {} job(s) failed", failed, total);
    }

    info!("All {} job(s) finished", total);
    Ok(())
}

fn init_config() -> Result<()> {
    let config_path = Config::config_path()?;

    if Config::exists() {
        println!("Config file exists at: {}", config_path.display());
    } else {
        Config::ensure_default()?;
        println!("Created default config at: {}", config_path.display());
    }

    let config = Config::load()?;
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
