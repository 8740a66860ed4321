// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;

use tubeshelf::config::{self, ClientConfig};
use tubeshelf::download::{DownloadPhase, Quality};
use tubeshelf::error::format_error;
use tubeshelf::facade::{Orchestrator, OrchestratorHandle, ViewState};
use tubeshelf::gateway::{HttpGateway, TaskGateway};
use tubeshelf::types::{SearchCriteria, TaskStatus, Video};
use tubeshelf::GatewayError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Standard exit codes following BSD sysexits.h conventions
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ERROR: i32 = 1;
    /// Invalid input such as a bad URL or unknown quality
    pub const DATA_ERR: i32 = 65;
    /// Backend not reachable
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// Interrupted by Ctrl+C
    pub const INTERRUPTED: i32 = 130;
}

use exit_codes::*;

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
            .template("{spinner:.cyan} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    /// Progress bar for a running download, 0 to 100.
    pub fn download_bar() -> ProgressBar {
        let pb = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% | {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

/// tubeshelf - client for a self-hosted video library
#[derive(Parser)]
#[command(name = "tubeshelf")]
#[command(version = VERSION)]
#[command(about = "Download, browse and watch videos in a self-hosted library.")]
#[command(long_about = "tubeshelf - client for a self-hosted video library\n\n\
    List videos:       tubeshelf videos --search cats\n\
    Unwatched only:    tubeshelf videos --unwatched --channel Pets\n\
    Download:          tubeshelf download https://youtu.be/abc123 --quality 720p\n\
    Mark watched:      tubeshelf watch <ID>\n\
    Rescan library:    tubeshelf scan\n\
    Configure:         tubeshelf config set-url http://localhost:8000/api")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend API address for this run (overrides config and TUBESHELF_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Verbose mode: detailed logging for debugging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List videos in the library
    ///
    /// Examples:
    ///   tubeshelf videos
    ///   tubeshelf videos --search cats
    ///   tubeshelf videos --channel Pets --unwatched
    Videos {
        /// Substring to search titles, channels and tags for
        #[arg(short, long, default_value = "")]
        search: String,
        /// Only videos from this channel (exact name, see `tubeshelf channels`)
        #[arg(short, long)]
        channel: Option<String>,
        /// Only watched videos
        #[arg(long, conflicts_with = "unwatched")]
        watched: bool,
        /// Only videos not watched yet
        #[arg(long)]
        unwatched: bool,
        /// Skip this many matches
        #[arg(long, default_value_t = 0)]
        skip: u32,
    },

    /// List channels present in the library
    Channels,

    /// Remove a video from the library catalog (the media file stays on disk)
    Delete {
        /// Video id
        id: String,
    },

    /// Scan the media directory for new files
    Scan,

    /// Download a video and wait for it to finish
    ///
    /// Press Ctrl+C to cancel the download.
    ///
    /// Examples:
    ///   tubeshelf download https://youtu.be/abc123
    ///   tubeshelf download https://youtu.be/abc123 --quality 720p
    ///   tubeshelf download https://youtu.be/abc123 --quality audio
    Download {
        /// Video URL (youtube.com or youtu.be)
        url: String,
        /// best, audio, or a resolution offered by the video (e.g. 720p)
        #[arg(short, long, default_value = "best")]
        quality: String,
    },

    /// Open a video, marking it watched
    Watch {
        /// Video id
        id: String,
    },

    /// Show download tasks tracked by the backend
    Downloads,

    /// Check that the backend is reachable
    Health,

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set the backend API address
    SetUrl {
        /// e.g. http://localhost:8000/api
        url: String,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if let Some(gateway_err) = e.downcast_ref::<GatewayError>() {
                eprintln!("{}", gateway_err.render("Request failed"));
                if gateway_err.is_transient() {
                    SERVICE_UNAVAILABLE
                } else {
                    ERROR
                }
            } else {
                eprintln!("{} {:#}", "[✗]".red(), e);
                ERROR
            }
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = config::load_config()?.with_api_url_override(cli.api_url.clone());

    match cli.command {
        Commands::Config { command } => handle_config(command, config),
        Commands::Videos {
            search,
            channel,
            watched,
            unwatched,
            skip,
        } => {
            let mut criteria = SearchCriteria::new(search, config.search_limit);
            criteria.channel = channel;
            criteria.watched = match (watched, unwatched) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            criteria.skip = skip;
            list_videos(&config, criteria).await
        }
        Commands::Channels => list_channels(&config).await,
        Commands::Delete { id } => delete(&config, &id).await,
        Commands::Scan => scan(&config).await,
        Commands::Download { url, quality } => download(&config, &url, &quality).await,
        Commands::Watch { id } => watch(&config, &id).await,
        Commands::Downloads => list_downloads(&config).await,
        Commands::Health => health(&config).await,
    }
}

fn gateway(config: &ClientConfig) -> Result<Arc<HttpGateway>> {
    Ok(Arc::new(HttpGateway::new(config)?))
}

fn start(config: &ClientConfig) -> Result<(Arc<HttpGateway>, OrchestratorHandle)> {
    let gateway = gateway(config)?;
    let handle = Orchestrator::spawn(gateway.clone(), config);
    Ok((gateway, handle))
}

// =============================================================================
// Config
// =============================================================================

fn handle_config(command: ConfigCommands, config: ClientConfig) -> Result<i32> {
    match command {
        ConfigCommands::Show => {
            println!();
            println!("{}", "Configuration".bright_cyan().bold());
            println!("  API URL:            {}", config.api_url.bright_white());
            println!("  Request timeout:    {}s", config.request_timeout_secs);
            println!("  Poll interval:      {}ms", config.poll_interval().as_millis());
            println!("  Completion delay:   {}ms", config.completion_delay_ms);
            println!("  Search limit:       {}", config.search_limit);
            println!("  Max poll failures:  {}", config.max_poll_failures);
            println!("  Recursive scan:     {}", config.scan_recursive);
            if let Ok(path) = config::config_path() {
                println!();
                println!("  {}", format!("File: {}", path.display()).dimmed());
            }
            println!();
        }
        ConfigCommands::SetUrl { url } => {
            let mut stored = config::load_config_from(&config::config_path()?)?;
            stored = stored.with_api_url_override(Some(url));
            config::save_config(&stored)?;
            println!("{} API URL set to {}", "[✓]".green(), stored.api_url.bright_white());
        }
    }
    Ok(SUCCESS)
}

// =============================================================================
// Library
// =============================================================================

async fn wait_loaded(handle: &OrchestratorHandle) -> Result<ViewState> {
    handle.wait_for(|v| !v.loading).await
}

fn print_videos(videos: &[Video]) {
    if videos.is_empty() {
        println!("  {}", "No videos found.".dimmed());
        return;
    }
    for video in videos {
        let marker = if video.watched {
            "●".dimmed()
        } else {
            "○".bright_green()
        };
        let channel = video.channel_name.as_deref().unwrap_or("Unknown channel");
        let duration = video.duration.map(format_duration).unwrap_or_default();
        println!(
            "  {} {}  {}  {}",
            marker,
            video.display_title().bright_white(),
            channel.dimmed(),
            duration.dimmed()
        );
        println!("      {}", video.id.dimmed());
    }
}

fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

async fn list_videos(config: &ClientConfig, criteria: SearchCriteria) -> Result<i32> {
    let filtered = criteria.channel.is_some() || criteria.watched.is_some() || criteria.skip > 0;
    let videos = if filtered {
        // The library view only tracks a search text; filtered listings go direct
        match gateway(config)?.list_videos(&criteria).await {
            Ok(videos) => videos,
            Err(e) => {
                eprintln!("{} {}", "[✗]".red(), e.user_detail());
                return Ok(SERVICE_UNAVAILABLE);
            }
        }
    } else {
        let (_, handle) = start(config)?;
        handle.search(criteria.query.clone()).await?;
        let view = wait_loaded(&handle).await?;
        handle.shutdown().await?;
        if let Some(error) = &view.library_error {
            eprintln!("{} {}", "[✗]".red(), error);
            return Ok(SERVICE_UNAVAILABLE);
        }
        view.videos
    };

    println!();
    if criteria.query.is_empty() {
        println!("{} ({})", "Library".bright_cyan().bold(), videos.len());
    } else {
        println!(
            "{} matching \"{}\" ({})",
            "Videos".bright_cyan().bold(),
            criteria.query,
            videos.len()
        );
    }
    print_videos(&videos);
    println!();
    Ok(SUCCESS)
}

async fn list_channels(config: &ClientConfig) -> Result<i32> {
    let channels = match gateway(config)?.list_channels().await {
        Ok(channels) => channels,
        Err(e) => {
            eprintln!("{} {}", "[✗]".red(), e.user_detail());
            return Ok(SERVICE_UNAVAILABLE);
        }
    };

    println!();
    println!("{} ({})", "Channels".bright_cyan().bold(), channels.len());
    if channels.is_empty() {
        println!("  {}", "No channels yet.".dimmed());
    }
    for channel in &channels {
        println!("  {}", channel.name);
    }
    println!();
    Ok(SUCCESS)
}

async fn delete(config: &ClientConfig, id: &str) -> Result<i32> {
    let gateway = gateway(config)?;
    match gateway.delete_video(id).await {
        Ok(()) => {
            println!("{} Removed {} from the library", "[✓]".green(), id);
            Ok(SUCCESS)
        }
        Err(e) if e.is_not_found() => {
            eprintln!("{} No video with id {}", "[✗]".red(), id);
            Ok(DATA_ERR)
        }
        Err(e) => {
            eprintln!("{}", e.render("Could not remove the video"));
            Ok(ERROR)
        }
    }
}

async fn scan(config: &ClientConfig) -> Result<i32> {
    let (_, handle) = start(config)?;
    let spinner = spinner::create("Scanning media directory...");

    handle.trigger_scan().await?;
    let view = handle.wait_for(|v| !v.scanning).await?;
    spinner.finish_and_clear();

    if let Some(error) = &view.scan_error {
        println!("{} Scan failed: {}", "[✗]".red(), error);
        handle.shutdown().await?;
        return Ok(ERROR);
    }

    if let Some(summary) = &view.last_scan {
        println!(
            "{} Scan complete: {} found, {} added",
            "[✓]".green(),
            summary.videos_found,
            summary.videos_added
        );
    }
    let view = wait_loaded(&handle).await?;
    println!("  Library now holds {} videos", view.videos.len());
    handle.shutdown().await?;
    Ok(SUCCESS)
}

async fn watch(config: &ClientConfig, id: &str) -> Result<i32> {
    let (gateway, handle) = start(config)?;
    let video = gateway.get_video(id).await?;
    let was_watched = video.watched;

    let view = handle.open_video(video).await?;
    if let Some(video) = &view.opened_video {
        println!();
        println!("{}", video.display_title().bright_white().bold());
        if let Some(channel) = &video.channel_name {
            println!("  {}", channel.dimmed());
        }
        println!("  {}", video.file_path);
    }
    handle.close_video().await?;
    wait_loaded(&handle).await?;
    handle.shutdown().await?;

    if was_watched {
        println!("{} Already watched", "[i]".cyan());
        return Ok(SUCCESS);
    }

    // The mark-watched call runs in the background; confirm it landed.
    for _ in 0..10 {
        if gateway.get_video(id).await.map(|v| v.watched).unwrap_or(false) {
            println!("{} Marked as watched", "[✓]".green());
            return Ok(SUCCESS);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    println!("{} Could not confirm the video was marked watched", "[!]".yellow());
    Ok(ERROR)
}

// =============================================================================
// Downloads
// =============================================================================

/// Wait for the probe of the URL just entered to settle.
async fn wait_probe(handle: &OrchestratorHandle) -> Result<ViewState> {
    handle
        .wait_for(|v| {
            !matches!(
                v.download.as_ref().map(|d| &d.phase),
                Some(DownloadPhase::AwaitingMetadata { .. })
            )
        })
        .await
}

async fn download(config: &ClientConfig, url: &str, quality_label: &str) -> Result<i32> {
    let (_, handle) = start(config)?;
    handle.open_download_form().await?;

    let spinner = spinner::create("Fetching video info...");
    let view = handle.edit_url(url).await?;
    let view = match view.download.as_ref().map(|d| &d.phase) {
        Some(DownloadPhase::AwaitingMetadata { .. }) => wait_probe(&handle).await?,
        _ => view,
    };
    spinner.finish_and_clear();

    let Some(form) = view.download.as_ref() else {
        anyhow::bail!("download form closed unexpectedly");
    };
    let DownloadPhase::MetadataReady { preview, .. } = &form.phase else {
        let reason = form
            .probe_error
            .clone()
            .unwrap_or_else(|| format!("not a recognized video URL: {}", url));
        eprintln!(
            "{}",
            format_error(
                &format!("Cannot download: {}", reason),
                &[
                    "The URL is not a youtube.com or youtu.be link",
                    "The video is private or removed",
                ],
                &["Check the link in a browser", "Copy the URL from the share button"],
            )
        );
        handle.shutdown().await?;
        return Ok(DATA_ERR);
    };

    println!();
    println!(
        "{}",
        preview.title.as_deref().unwrap_or("Untitled").bright_white().bold()
    );
    if let Some(uploader) = &preview.uploader {
        println!("  {}", uploader.dimmed());
    }

    let Some(quality) = Quality::parse_label(quality_label, preview) else {
        let offered: Vec<String> = form.quality_options.iter().map(|q| q.to_string()).collect();
        eprintln!(
            "{} Quality '{}' not offered. Available: {}",
            "[✗]".red(),
            quality_label,
            offered.join(", ")
        );
        handle.shutdown().await?;
        return Ok(DATA_ERR);
    };
    println!("  Quality: {}", quality.to_string().cyan());
    println!();

    handle.select_quality(quality).await?;
    handle.submit_download().await?;

    let code = follow_download(&handle).await?;
    handle.shutdown().await?;
    Ok(code)
}

/// Drive the progress bar until the form closes itself or the download fails.
async fn follow_download(handle: &OrchestratorHandle) -> Result<i32> {
    let pb = spinner::download_bar();
    pb.set_message("Starting...");

    let mut views = handle.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let view = views.borrow_and_update().clone();
        match view.download.as_ref().map(|d| &d.phase) {
            None => {
                pb.finish_and_clear();
                println!("{} Download complete, library refreshed", "[✓]".green());
                return Ok(SUCCESS);
            }
            Some(DownloadPhase::Polling { task }) => {
                pb.set_position(task.progress_percent() as u64);
                let mut msg = match task.status {
                    TaskStatus::Processing => "Processing...".to_string(),
                    TaskStatus::Pending => "Queued...".to_string(),
                    _ => "Downloading".to_string(),
                };
                if let Some(speed) = &task.speed {
                    msg.push_str(&format!(" {}", speed));
                }
                if let Some(eta) = &task.eta {
                    msg.push_str(&format!(" ETA {}", eta));
                }
                pb.set_message(msg);
            }
            Some(DownloadPhase::Completed { task }) => {
                pb.set_position(100);
                pb.set_message(task.filename.clone().unwrap_or_else(|| "Done".to_string()));
            }
            Some(DownloadPhase::Failed { error }) => {
                pb.abandon();
                eprintln!("{} {}", "[✗]".red(), error);
                return Ok(ERROR);
            }
            Some(_) => {}
        }

        tokio::select! {
            changed = views.changed() => {
                changed.context("orchestrator stopped while downloading")?;
            }
            _ = &mut ctrl_c => {
                pb.abandon_with_message("Cancelling...");
                handle.cancel_download().await?;
                println!("{} Download cancelled", "[!]".yellow());
                return Ok(INTERRUPTED);
            }
        }
    }
}

async fn list_downloads(config: &ClientConfig) -> Result<i32> {
    let gateway = gateway(config)?;
    let tasks = gateway.list_downloads().await?;

    println!();
    println!("{} ({})", "Downloads".bright_cyan().bold(), tasks.len());
    if tasks.is_empty() {
        println!("  {}", "No tracked downloads.".dimmed());
    }
    for task in tasks {
        let status = match task.status {
            TaskStatus::Completed => task.status.as_str().green(),
            TaskStatus::Error | TaskStatus::Cancelled => task.status.as_str().red(),
            _ => task.status.as_str().yellow(),
        };
        println!(
            "  {:<12} {:>5.1}%  {}  {}",
            status,
            task.progress_percent(),
            task.filename.as_deref().unwrap_or("-"),
            task.task_id.dimmed()
        );
        if let Some(error) = task.error.as_deref().filter(|e| !e.is_empty()) {
            println!("      {}", error.red());
        }
    }
    println!();
    Ok(SUCCESS)
}

async fn health(config: &ClientConfig) -> Result<i32> {
    let gateway = gateway(config)?;
    match gateway.health_check().await {
        Ok(body) => {
            let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("ok");
            println!("{} Backend {} at {}", "[✓]".green(), status, gateway.base_url());
            Ok(SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e.render(&format!("Backend unreachable at {}", gateway.base_url())));
            Ok(SERVICE_UNAVAILABLE)
        }
    }
}
