//! `robolabel` command-line front-end.
//!
//! Drives the annotation core against a running backend: upload and wait for
//! processing, inspect and render single frames, edit action segments and
//! fetch exports.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use robolabel::api::{AnnotationBackend, ExportFormat, HttpBackend, wait_for_processing};
use robolabel::config::{AppConfig, LogLevel};
use robolabel::coords::Size;
use robolabel::model::{ActionSegment, Tool};
use robolabel::render::{DisplayList, TimelineLayout};
use robolabel::session::{DocumentSource, EditSession};
use robolabel::timing::FrameIndex;
use robolabel::wire::AnnotationsPayload;

#[derive(Parser, Debug)]
#[clap(name = "robolabel", version, about = "Video annotation client for robot-training datasets")]
struct CliArgs {
    /// Path to the JSON configuration file. Defaults to the user config directory.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the config file and environment.
    #[clap(long, global = true)]
    api_url: Option<String>,

    /// More log output (repeat for trace).
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a video (.mp4, .avi or .mov) for processing.
    Upload {
        file: PathBuf,
        /// Wait until processing finishes.
        #[clap(long)]
        wait: bool,
    },
    /// Show the processing status of a video.
    Status { video_id: String },
    /// Wait until a video is processed. Ctrl-C stops waiting.
    Wait { video_id: String },
    /// Print the annotations shown at one frame.
    Inspect {
        video_id: String,
        /// Zero-based frame.
        #[clap(long, conflicts_with = "time")]
        frame: Option<FrameIndex>,
        /// Playback time in seconds.
        #[clap(long)]
        time: Option<f64>,
    },
    /// Render one frame's overlay and print the draw commands as JSON.
    Render {
        video_id: String,
        /// Zero-based frame.
        #[clap(long, default_value_t = 0)]
        frame: FrameIndex,
        #[clap(long, default_value = "pose")]
        tool: Tool,
        #[clap(long, default_value_t = 960.0)]
        width: f32,
        #[clap(long, default_value_t = 540.0)]
        height: f32,
        /// Also render the action timeline at this height.
        #[clap(long)]
        timeline: Option<f32>,
    },
    /// Add an action segment over zero-based, inclusive frames and save.
    AddAction {
        video_id: String,
        label: String,
        start: FrameIndex,
        end: FrameIndex,
        #[clap(long, default_value_t = 1.0)]
        confidence: f32,
    },
    /// Delete the action segment at a position and save.
    DeleteAction { video_id: String, index: usize },
    /// Print what the backend stores for one frame.
    Frame {
        video_id: String,
        /// Zero-based frame.
        frame: FrameIndex,
    },
    /// Replace whole tracks from a JSON file shaped like the bulk save body
    /// (`pose`, `objects`, `actions`, all optional).
    Import { video_id: String, file: PathBuf },
    /// Write the loaded document back in one request. Stores the placeholder
    /// data when the backend has none.
    Resave { video_id: String },
    /// Download the saved annotations.
    Export {
        video_id: String,
        #[clap(long, default_value = "json")]
        format: ExportFormat,
        /// Output file. Use `-` for stdout; defaults to the backend's file name.
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config = match AppConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.log_level, args.verbose);

    match run(args, config).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logger at the configured level; `RUST_LOG` takes precedence.
fn init_logging(level: LogLevel, verbose: u8) {
    env_logger::Builder::new()
        .filter_level(level.raised(verbose).to_level_filter())
        .parse_default_env()
        .init();
}

async fn run(args: CliArgs, mut config: AppConfig) -> robolabel::Result<ExitCode> {
    if let Some(url) = args.api_url {
        config.api.base_url = url;
    }
    let backend = HttpBackend::new(&config.api.base_url, config.api.request_timeout())?;
    log::debug!("Backend at {}", backend.base_url());

    match args.command {
        Command::Upload { file, wait } => {
            let uploaded = backend.upload(&file).await?;
            println!("{}", uploaded.video_id);
            if wait {
                wait_until_processed(&backend, &config, &uploaded.video_id).await?;
            }
        }
        Command::Status { video_id } => {
            let status = backend.status(&video_id).await?;
            println!("{}", status.status);
        }
        Command::Wait { video_id } => {
            wait_until_processed(&backend, &config, &video_id).await?;
        }
        Command::Inspect {
            video_id,
            frame,
            time,
        } => {
            let mut session = open_session(&backend, &config, &video_id).await;
            match (frame, time) {
                (Some(frame), _) => session.seek(frame),
                (None, Some(time)) => session.seek_time(time),
                (None, None) => session.current_frame(),
            };
            print_json(&inspect_json(&session))?;
        }
        Command::Render {
            video_id,
            frame,
            tool,
            width,
            height,
            timeline,
        } => {
            let mut session = open_session(&backend, &config, &video_id).await;
            session.seek(frame);
            session.set_tool(tool);

            let canvas = Size::new(width, height);
            let mut overlay = DisplayList::new(canvas);
            session.render(&mut overlay, &config.video.scaler(canvas));

            let timeline = timeline.map(|h| {
                let layout = TimelineLayout::new(session.clock().total_frames(), width, h);
                let mut list = DisplayList::new(Size::new(width, h));
                layout.draw(&mut list, session.document().actions(), session.current_frame());
                list
            });
            print_json(&json!({
                "video_id": video_id,
                "frame": session.current_frame(),
                "tool": session.tool(),
                "overlay": overlay,
                "timeline": timeline,
            }))?;
        }
        Command::AddAction {
            video_id,
            label,
            start,
            end,
            confidence,
        } => {
            let mut session = open_session(&backend, &config, &video_id).await;
            let index = session.add_action(ActionSegment::new(label, start, end, confidence)?)?;
            session.save(&backend).await?;
            println!("Added action at position {}", index);
        }
        Command::DeleteAction { video_id, index } => {
            let mut session = open_session(&backend, &config, &video_id).await;
            let removed = session.delete_action(index)?;
            if session.save(&backend).await? == 0 {
                eprintln!("'{}' was not stored on the backend; nothing to delete there", removed.label);
            }
            println!(
                "Deleted '{}' [{}..={}]",
                removed.label, removed.start, removed.end
            );
        }
        Command::Frame { video_id, frame } => {
            let stored = backend.get_frame(&video_id, frame).await?;
            print_json(&serde_json::to_value(&stored)?)?;
        }
        Command::Import { video_id, file } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let annotations: AnnotationsPayload = serde_json::from_str(&text)?;
            if annotations.tracks().is_empty() {
                eprintln!("{} has no non-empty tracks; nothing to import", file.display());
                return Ok(ExitCode::FAILURE);
            }
            let response = backend.save_annotations(&video_id, &annotations).await?;
            println!("Saved {}", response.saved.join(", "));
        }
        Command::Resave { video_id } => {
            let mut session = open_session(&backend, &config, &video_id).await;
            let response = session.save_all(&backend).await?;
            println!("Saved {}", response.saved.join(", "));
        }
        Command::Export {
            video_id,
            format,
            output,
        } => {
            let session = open_session(&backend, &config, &video_id).await;
            let exported = session.export(&backend, format).await?;
            if exported.unsaved_edits {
                eprintln!("Warning: the export does not include unsaved edits");
            }
            let bytes = exported.payload.bytes;
            let output = output.unwrap_or_else(|| PathBuf::from(format.file_name(&video_id)));
            if output.as_os_str() == "-" {
                std::io::stdout().write_all(&bytes)?;
            } else {
                tokio::fs::write(&output, &bytes).await?;
                println!("Wrote {} ({} bytes)", output.display(), bytes.len());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Session with `video_id` loaded.
async fn open_session(backend: &dyn AnnotationBackend, config: &AppConfig, video_id: &str) -> EditSession {
    let mut session = EditSession::new(config.video.fps).with_renderer(config.editor.renderer());
    session.load(backend, video_id).await;
    if session.source() == DocumentSource::Placeholder {
        eprintln!("No annotations for {}, showing placeholder data", video_id);
    }
    session
}

async fn wait_until_processed(
    backend: &dyn AnnotationBackend,
    config: &AppConfig,
    video_id: &str,
) -> robolabel::Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = wait_for_processing(backend, video_id, &config.polling, &cancel, |status| {
        eprintln!("{}: {}", video_id, status);
    })
    .await;
    cancel.cancel();
    result?;
    println!("{} is ready", video_id);
    Ok(())
}

fn inspect_json(session: &EditSession) -> serde_json::Value {
    let frame = session.current_frame();
    let document = session.document();
    json!({
        "video_id": session.video_id(),
        "source": format!("{:?}", session.source()),
        "frame": frame,
        "time": session.current_time(),
        "total_frames": session.clock().total_frames(),
        "pose": document.get_pose(frame),
        "objects": document.get_objects(frame),
        "objects_from_frame": document.objects().resolve(i64::from(frame)),
        "actions": document.get_actions_at(frame),
        "summary": document.summary(),
    })
}

fn print_json(value: &serde_json::Value) -> robolabel::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
