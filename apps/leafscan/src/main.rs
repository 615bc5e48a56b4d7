use std::{
    future::Future,
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    thread,
};

mod backend_bridge;
mod config;
mod controller;
mod ui;

use anyhow::Context;
use clap::{Parser, Subcommand};
use client_core::{
    workflow::{Phase, SelectOutcome, WorkflowController},
    ClientError, Deployment, ImageSource, PlantApiClient, PlantListQuery, SelectedImage,
    DEFAULT_SIMILAR_LIMIT,
};
use crossbeam_channel::{bounded, Sender};
use serde::Serialize;
use shared::domain::{PlantId, PredictionId};
use tracing_subscriber::EnvFilter;

use crate::{
    backend_bridge::{commands::BackendCommand, runtime},
    config::Settings,
    controller::{
        events::{parse_action, UiEvent},
        session::Session,
    },
    ui::render,
};

const COMMAND_QUEUE_DEPTH: usize = 64;
const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Parser, Debug)]
#[command(
    name = "leafscan",
    version,
    about = "Identify medicinal plants from leaf photos"
)]
struct Cli {
    /// Config file; defaults to ./leafscan.toml, then the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Service base URL, e.g. http://192.168.1.20:8000
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Preset base URL: local, android-emulator, ios-simulator or production.
    #[arg(long, global = true)]
    deployment: Option<Deployment>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    /// Print raw JSON for knowledge-base, recommendation, history, feedback and batch output.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the plant in a single leaf photo.
    Identify {
        image: PathBuf,
        /// Also request the Grad-CAM / LIME explanation.
        #[arg(long)]
        explain: bool,
        /// Save explanation visualizations into this directory (implies --explain).
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },
    /// Interactive session reading commands from stdin.
    Session {
        /// Default directory for `save`.
        #[arg(long, default_value = ".")]
        save_dir: PathBuf,
    },
    /// Browse the plant knowledge base.
    Plants {
        #[command(subcommand)]
        command: PlantsCommand,
    },
    /// Plant recommendations by similarity, ailment or location.
    Recommend {
        #[command(subcommand)]
        command: RecommendCommand,
    },
    /// Identify several photos in one request.
    Batch {
        #[arg(required = true, num_args = 1..)]
        images: Vec<PathBuf>,
    },
    /// Show recent predictions.
    History {
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Tell the service whether a prediction was right.
    Feedback {
        prediction_id: i64,
        #[arg(long, conflicts_with = "incorrect", required_unless_present = "incorrect")]
        correct: bool,
        #[arg(long)]
        incorrect: bool,
        #[arg(long)]
        comment: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PlantsCommand {
    List {
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        search: Option<String>,
    },
    Show {
        id: i64,
    },
    Medicinal {
        id: i64,
    },
    Search {
        query: String,
    },
}

#[derive(Subcommand, Debug)]
enum RecommendCommand {
    /// Plants with medicinal uses similar to this one.
    Similar {
        id: i64,
        #[arg(long, default_value_t = DEFAULT_SIMILAR_LIMIT)]
        limit: u64,
    },
    /// Plants used to treat an ailment.
    Ailment { ailment: String },
    /// Plants suggested for a location.
    Location {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = config::load_settings(cli.config.as_deref())?;
    apply_cli_overrides(&mut settings, &cli);
    let endpoint = settings.endpoint().context("invalid service address")?;
    let client = PlantApiClient::with_options(endpoint, settings.client_options())?;
    tracing::info!(endpoint = %client.endpoint(), "using plant service");

    let json = cli.json;
    match cli.command {
        Command::Identify {
            image,
            explain,
            save_dir,
        } => identify(client, &settings, image, explain, save_dir),
        Command::Session { save_dir } => interactive(client, &settings, save_dir),
        Command::Plants { command } => block_on(plants(&client, command, json))?,
        Command::Recommend { command } => block_on(recommend(&client, command, json))?,
        Command::Batch { images } => block_on(batch(&client, &settings, images, json))?,
        Command::History { skip, limit } => block_on(async {
            let history = client
                .prediction_history(skip, limit)
                .await
                .map_err(user_facing)?;
            emit(json, &history, render::render_history)
        })?,
        Command::Feedback {
            prediction_id,
            correct,
            incorrect: _,
            comment,
        } => block_on(async {
            let response = client
                .submit_feedback(PredictionId(prediction_id), correct, comment.as_deref())
                .await
                .map_err(user_facing)?;
            emit(json, &response, render::render_feedback)
        })?,
    }
}

/// CLI flags sit on top of file and environment values. A preset chosen on
/// the command line replaces any configured URL unless `--api-url` is given too.
fn apply_cli_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(deployment) = cli.deployment {
        settings.deployment = deployment;
        settings.api_url = None;
    }
    if let Some(url) = cli.api_url.as_deref().filter(|url| !url.trim().is_empty()) {
        settings.api_url = Some(url.to_string());
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        settings.request_timeout_secs = timeout_secs;
    }
}

fn identify(
    client: PlantApiClient,
    settings: &Settings,
    image: PathBuf,
    explain: bool,
    save_dir: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(COMMAND_QUEUE_DEPTH);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(EVENT_QUEUE_DEPTH);
    let worker = runtime::launch(cmd_rx, ui_tx, Arc::new(client));

    let mut out = io::stdout().lock();
    let mut session = Session::new(
        WorkflowController::with_max_upload_bytes(settings.max_upload_bytes),
        cmd_tx,
        save_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
    );

    if session.select_path(&image, ImageSource::Picker, &mut out)? != SelectOutcome::Accepted {
        return Ok(ExitCode::FAILURE);
    }
    if session.predict() {
        writeln!(out, "{}", session.controller().status_label())?;
    }
    session.settle(&ui_rx, &mut out)?;

    if (explain || save_dir.is_some()) && session.explain() {
        writeln!(out, "{}", session.controller().status_label())?;
        session.settle(&ui_rx, &mut out)?;
    }

    if let Some(dir) = save_dir.as_deref() {
        if session.controller().has_explanation() {
            for path in session.save_explanation(dir)? {
                writeln!(out, "Saved {}", path.display())?;
            }
        }
    }

    let succeeded = session.controller().phase() == Phase::Predicted
        && session.controller().error().is_none();
    drop(session);
    if worker.join().is_err() {
        tracing::error!("backend worker panicked");
    }
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn interactive(
    client: PlantApiClient,
    settings: &Settings,
    save_dir: PathBuf,
) -> anyhow::Result<ExitCode> {
    let endpoint = client.endpoint().to_string();
    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(COMMAND_QUEUE_DEPTH);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(EVENT_QUEUE_DEPTH);
    let worker = runtime::launch(cmd_rx, ui_tx.clone(), Arc::new(client));
    spawn_input_reader(ui_tx);

    let mut out = io::stdout().lock();
    writeln!(
        out,
        "leafscan session against {endpoint}. Type 'help' for commands."
    )?;
    let mut session = Session::new(
        WorkflowController::with_max_upload_bytes(settings.max_upload_bytes),
        cmd_tx,
        save_dir,
    );
    session.run(&ui_rx, &mut out)?;

    drop(session);
    if worker.join().is_err() {
        tracing::error!("backend worker panicked");
    }
    Ok(ExitCode::SUCCESS)
}

fn spawn_input_reader(ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let event = match line {
                Ok(line) => match parse_action(&line) {
                    Ok(Some(action)) => UiEvent::Input(action),
                    Ok(None) => continue,
                    Err(message) => UiEvent::InputRejected(message),
                },
                Err(err) => {
                    tracing::warn!("failed to read input: {err}");
                    break;
                }
            };
            if ui_tx.send(event).is_err() {
                return;
            }
        }
        let _ = ui_tx.send(UiEvent::InputClosed);
    });
}

async fn plants(
    client: &PlantApiClient,
    command: PlantsCommand,
    json: bool,
) -> anyhow::Result<ExitCode> {
    match command {
        PlantsCommand::List {
            skip,
            limit,
            search,
        } => {
            let query = PlantListQuery {
                skip,
                limit,
                search,
            };
            let listing = client.list_plants(&query).await.map_err(user_facing)?;
            emit(json, &listing, render::render_plant_list)
        }
        PlantsCommand::Show { id } => {
            let record = client.get_plant(PlantId(id)).await.map_err(user_facing)?;
            emit(json, &record, render::render_plant)
        }
        PlantsCommand::Medicinal { id } => {
            let properties = client
                .medicinal_properties(PlantId(id))
                .await
                .map_err(user_facing)?;
            emit(json, &properties, render::render_medicinal)
        }
        PlantsCommand::Search { query } => {
            let results = client.search_plants(&query).await.map_err(user_facing)?;
            emit(json, &results, render::render_search)
        }
    }
}

async fn recommend(
    client: &PlantApiClient,
    command: RecommendCommand,
    json: bool,
) -> anyhow::Result<ExitCode> {
    match command {
        RecommendCommand::Similar { id, limit } => {
            let similar = client
                .similar_plants(PlantId(id), limit)
                .await
                .map_err(user_facing)?;
            emit(json, &similar, render::render_similar)
        }
        RecommendCommand::Ailment { ailment } => {
            let remedies = client
                .plants_for_ailment(&ailment)
                .await
                .map_err(user_facing)?;
            emit(json, &remedies, render::render_ailment)
        }
        RecommendCommand::Location { lat, lng } => {
            let nearby = client
                .location_recommendations(lat, lng)
                .await
                .map_err(user_facing)?;
            emit(json, &nearby, render::render_location)
        }
    }
}

async fn batch(
    client: &PlantApiClient,
    settings: &Settings,
    paths: Vec<PathBuf>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        let image = SelectedImage::from_path(path, ImageSource::Picker)?;
        image
            .validate(settings.max_upload_bytes)
            .with_context(|| format!("cannot upload {}", path.display()))?;
        images.push(image);
    }
    let response = client.predict_batch(&images).await.map_err(user_facing)?;
    let all_succeeded = response.successful == response.total;
    emit(json, &response, render::render_batch)?;
    Ok(if all_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn emit<T: Serialize>(
    json: bool,
    value: &T,
    render: impl FnOnce(&T) -> String,
) -> anyhow::Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", render(value));
    }
    Ok(ExitCode::SUCCESS)
}

/// Leads with the message a user should see; the technical chain follows.
fn user_facing(err: ClientError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    Ok(runtime.block_on(future))
}
