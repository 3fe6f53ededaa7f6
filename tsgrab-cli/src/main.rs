use std::{path::Path, sync::Arc, time::Duration};

use clap::Parser;
use error::AppError;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;
use tsgrab_engine::{
    ClientConfig, Fetcher, FsStorage, GrabConfig, HttpFetcher, PipelineEvent, PlaylistParser,
    SegmentPipeline, concat_command, create_client, url_directory, write_concat_list,
    write_local_playlist,
};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;
use utils::{format_duration, is_http, manifest_file_name, parse_headers, parse_json_headers};

const CONCAT_LIST_NAME: &str = "files.txt";
const LOCAL_INDEX_NAME: &str = "index.m3u8";

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(e.exit_code());
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let input = args.input.trim();
    if input.is_empty() {
        return Err(AppError::InvalidInput(
            "playlist URL or file must not be empty".to_string(),
        ));
    }

    let mut headers = parse_headers(&args.headers);
    if let Some(json) = args.json_header.as_deref() {
        headers.extend(parse_json_headers(json)?);
    }

    let config = GrabConfig::builder()
        .with_max_parallel(args.concurrency)
        .with_segment_timeout(Duration::from_secs(args.segment_timeout))
        .with_headers(headers)
        .with_work_dir(&args.work_dir)
        .build();

    let client = create_client(&ClientConfig::default())?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(client));
    let storage = FsStorage::create(&config.work_dir).await?;
    info!(work_dir = %storage.root().display(), "Using work directory");

    if args.manifest_only {
        return save_manifest(input, fetcher.as_ref(), &config, storage.root())
            .await
            .map_err(|e| AppError::ManifestOnly(e.to_string()));
    }

    let (manifest, base_url) =
        load_manifest(input, args.url_prefix.as_deref(), fetcher.as_ref(), &config).await?;
    let playlist = PlaylistParser::new(Arc::clone(&fetcher), &config)
        .parse(&manifest, &base_url)
        .await?;

    if args.gen_index {
        let dest = storage.root().join(LOCAL_INDEX_NAME);
        write_local_playlist(&playlist.segments, &config.segment_extension, &dest).await?;
        info!(path = %dest.display(), segments = playlist.len(), "Local playlist written");
        return Ok(());
    }

    let progress_manager = if args.show_progress {
        ProgressManager::new()
    } else {
        ProgressManager::new_disabled()
    };
    let reporter = progress_manager.clone();
    let pipeline = SegmentPipeline::new(fetcher, Arc::new(storage.clone()), config)
        .with_progress(Arc::new(move |event: PipelineEvent| reporter.handle_event(event)));

    let report = pipeline.run(&playlist).await?;
    progress_manager.finish();

    let list = storage.root().join(CONCAT_LIST_NAME);
    write_concat_list(&report.paths, &list).await?;
    info!(
        segments = report.paths.len(),
        resumed = report.resumed,
        failed = report.failed(),
        elapsed = %format_duration(report.stats.elapsed()),
        list = %list.display(),
        "Download finished"
    );

    mux(&args, &list, storage.root()).await
}

/// Reads the top-level manifest and the base URL its relative URIs resolve against.
async fn load_manifest(
    input: &str,
    url_prefix: Option<&str>,
    fetcher: &dyn Fetcher,
    config: &GrabConfig,
) -> Result<(Vec<u8>, String), AppError> {
    if is_http(input) {
        let base_url = url_directory(input)
            .ok_or_else(|| AppError::InvalidInput(format!("no base URL in '{input}'")))?;
        let manifest = fetcher
            .fetch(input, &config.headers, config.segment_timeout)
            .await?;
        return Ok((manifest.to_vec(), base_url.to_string()));
    }

    if !Path::new(input).is_file() {
        return Err(AppError::InvalidInput(format!(
            "manifest file '{input}' does not exist"
        )));
    }
    let base_url = url_prefix
        .filter(|prefix| !prefix.is_empty())
        .ok_or_else(|| {
            AppError::InvalidInput("--url-prefix is required for a local manifest".to_string())
        })?;
    let manifest = tokio::fs::read(input).await?;
    Ok((manifest, base_url.trim_end_matches('/').to_string()))
}

/// Saves the remote manifest into the work directory without parsing it.
async fn save_manifest(
    input: &str,
    fetcher: &dyn Fetcher,
    config: &GrabConfig,
    work_dir: &Path,
) -> Result<(), AppError> {
    if !is_http(input) {
        return Err(AppError::InvalidInput(format!(
            "'{input}' is not a playlist URL"
        )));
    }
    let manifest = fetcher
        .fetch(input, &config.headers, config.segment_timeout)
        .await?;
    let dest = work_dir.join(manifest_file_name(input));
    tokio::fs::write(&dest, &manifest).await?;
    info!(path = %dest.display(), bytes = manifest.len(), "Manifest saved");
    Ok(())
}

/// Runs ffmpeg on the concat list, or prints the command when muxing is off.
async fn mux(args: &CliArgs, list: &Path, work_dir: &Path) -> Result<(), AppError> {
    let ffmpeg_args = concat_command(list, &args.name);
    let command_line = format!("{} {}", args.ffmpeg.display(), ffmpeg_args.join(" "));

    if !args.mux {
        info!("please run\n{command_line}");
        return Ok(());
    }

    info!(command = %command_line, "Running ffmpeg");
    let status = tokio::process::Command::new(&args.ffmpeg)
        .args(&ffmpeg_args)
        .status()
        .await
        .map_err(|e| AppError::Mux(format!("failed to start {}: {e}", args.ffmpeg.display())))?;
    if !status.success() {
        return Err(AppError::Mux(format!("ffmpeg exited with {status}")));
    }

    if args.keep_cache {
        debug!(work_dir = %work_dir.display(), "Keeping work directory");
    } else {
        tokio::fs::remove_dir_all(work_dir)
            .await
            .map_err(|e| AppError::Mux(format!("failed to remove work directory: {e}")))?;
        info!(work_dir = %work_dir.display(), "Work directory removed");
    }
    Ok(())
}
