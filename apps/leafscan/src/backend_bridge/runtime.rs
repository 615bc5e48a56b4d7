//! Worker thread owning the tokio runtime; turns commands into UI events.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use client_core::{workflow, workflow::WorkflowError, PlantApiClient};
use crossbeam_channel::{Receiver, Sender};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;

/// Runs until every command sender is dropped. Each command becomes its own
/// task so a slow request never holds back a newer one.
pub fn launch(
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
    client: Arc<PlantApiClient>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::error!("failed to build backend runtime: {err}");
                let _ = ui_tx.send(UiEvent::BackendFailed(format!(
                    "backend worker startup failure: failed to build runtime: {err}"
                )));
                return;
            }
        };

        runtime.block_on(async move {
            tracing::debug!(endpoint = %client.endpoint(), "backend worker ready");
            let mut tasks = Vec::new();
            while let Ok(cmd) = cmd_rx.recv() {
                tracing::debug!(command = cmd.name(), "backend received command");
                let client = Arc::clone(&client);
                let ui_tx = ui_tx.clone();
                tasks.push(tokio::spawn(async move {
                    let event = run_command(&client, cmd).await;
                    if ui_tx.send(event).is_err() {
                        tracing::debug!("dispatch loop gone; dropping backend event");
                    }
                }));
                tasks.retain(|task| !task.is_finished());
            }
            drain(tasks).await;
        });
    })
}

/// Awaits outstanding request tasks; returns how many ended abnormally.
async fn drain(tasks: Vec<tokio::task::JoinHandle<()>>) -> usize {
    let mut failed = 0;
    for task in tasks {
        if let Err(err) = task.await {
            tracing::error!("backend request task failed: {err}");
            failed += 1;
        }
    }
    failed
}

async fn run_command(client: &PlantApiClient, cmd: BackendCommand) -> UiEvent {
    match cmd {
        BackendCommand::Workflow(request) => {
            UiEvent::Completed(workflow::execute(client, &request).await)
        }
        BackendCommand::LookupPlant { plant_id } => match client.get_plant(plant_id).await {
            Ok(record) => UiEvent::PlantLoaded(record),
            Err(err) => UiEvent::LookupFailed(WorkflowError::from(err)),
        },
        BackendCommand::MedicinalProperties { plant_id } => {
            match client.medicinal_properties(plant_id).await {
                Ok(properties) => UiEvent::MedicinalLoaded(properties),
                Err(err) => UiEvent::LookupFailed(WorkflowError::from(err)),
            }
        }
        BackendCommand::SearchPlants { query } => match client.search_plants(&query).await {
            Ok(results) => UiEvent::SearchLoaded(results),
            Err(err) => UiEvent::LookupFailed(WorkflowError::from(err)),
        },
    }
}
