//! Single-threaded dispatch loop: the only place the workflow controller is
//! mutated. User input and backend completions arrive as [`UiEvent`]s.

use std::{
    collections::VecDeque,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use client_core::{
    workflow::{SelectOutcome, WorkflowController, WorkflowError},
    ImageSource, SelectedImage,
};
use crossbeam_channel::{Receiver, Sender};

use crate::{
    backend_bridge::commands::BackendCommand,
    controller::{
        events::{UiEvent, UserAction, SESSION_HELP},
        orchestration::{dispatch_backend_command, issue_request},
    },
    ui::{export, render},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    controller: WorkflowController,
    cmd_tx: Sender<BackendCommand>,
    save_dir: PathBuf,
    /// Set by `wait`; input is held back while a request is in flight.
    waiting: bool,
    input_closed: bool,
    /// Knowledge-base lookups queued but not yet answered.
    lookups: usize,
}

impl Session {
    pub fn new(
        controller: WorkflowController,
        cmd_tx: Sender<BackendCommand>,
        save_dir: PathBuf,
    ) -> Self {
        Self {
            controller,
            cmd_tx,
            save_dir,
            waiting: false,
            input_closed: false,
            lookups: 0,
        }
    }

    pub fn controller(&self) -> &WorkflowController {
        &self.controller
    }

    /// True while a workflow request or a knowledge-base lookup is in flight.
    pub fn is_busy(&self) -> bool {
        self.controller.state().in_flight().is_some() || self.lookups > 0
    }

    fn holding_input(&self) -> bool {
        self.waiting && self.is_busy()
    }

    /// Drives the session until the user quits, or input ends and the last
    /// request has settled. Input arriving after `wait` is replayed in order
    /// once the awaited request settles.
    pub fn run(&mut self, ui_rx: &Receiver<UiEvent>, out: &mut impl Write) -> anyhow::Result<()> {
        let mut deferred: VecDeque<UiEvent> = VecDeque::new();
        loop {
            let event = match deferred.pop_front() {
                Some(event) if !self.holding_input() => event,
                Some(event) => {
                    deferred.push_front(event);
                    recv(ui_rx)?
                }
                None => recv(ui_rx)?,
            };

            if self.holding_input() && is_input(&event) && !is_quit(&event) {
                deferred.push_back(event);
                continue;
            }
            if self.handle(event, out)? == Flow::Quit {
                return Ok(());
            }
            if !self.is_busy() {
                self.waiting = false;
            }
        }
    }

    /// Drives only until the in-flight request (if any) settles.
    pub fn settle(&mut self, ui_rx: &Receiver<UiEvent>, out: &mut impl Write) -> anyhow::Result<()> {
        while self.is_busy() {
            let event = recv(ui_rx)?;
            if is_input(&event) {
                continue;
            }
            self.handle(event, out)?;
        }
        Ok(())
    }

    pub fn handle(&mut self, event: UiEvent, out: &mut impl Write) -> io::Result<Flow> {
        match event {
            UiEvent::Input(action) => return self.handle_action(action, out),
            UiEvent::InputRejected(message) => writeln!(out, "{message}")?,
            UiEvent::InputClosed => {
                self.input_closed = true;
            }
            UiEvent::Completed(completion) => {
                let ticket = completion.ticket();
                if !self.controller.apply(completion) {
                    tracing::debug!(%ticket, "stale completion dropped");
                    return Ok(self.flow());
                }
                self.render_current(out)?;
            }
            UiEvent::PlantLoaded(record) => {
                self.lookup_settled();
                writeln!(out, "{}", render::render_plant(&record))?
            }
            UiEvent::MedicinalLoaded(properties) => {
                self.lookup_settled();
                writeln!(out, "{}", render::render_medicinal(&properties))?
            }
            UiEvent::SearchLoaded(results) => {
                self.lookup_settled();
                writeln!(out, "{}", render::render_search(&results))?
            }
            UiEvent::LookupFailed(error) => {
                self.lookup_settled();
                writeln!(out, "{}", render::render_error(&error))?
            }
            UiEvent::BackendFailed(message) => {
                writeln!(out, "Error: {message}")?;
                return Ok(Flow::Quit);
            }
        }
        Ok(self.flow())
    }

    fn flow(&self) -> Flow {
        if self.input_closed && !self.is_busy() {
            Flow::Quit
        } else {
            Flow::Continue
        }
    }

    fn handle_action(&mut self, action: UserAction, out: &mut impl Write) -> io::Result<Flow> {
        match action {
            UserAction::Select { path, source } => {
                self.select_path(&path, source, out)?;
            }
            UserAction::Predict => {
                if !self.predict() {
                    writeln!(out, "Nothing to identify: {}", self.controller.status_label())?;
                } else {
                    writeln!(out, "{}", self.controller.status_label())?;
                }
            }
            UserAction::Explain => {
                if !self.explain() {
                    writeln!(out, "Nothing to explain: {}", self.controller.status_label())?;
                } else {
                    writeln!(out, "{}", self.controller.status_label())?;
                }
            }
            UserAction::Status => writeln!(out, "{}", render::render_status(&self.controller))?,
            UserAction::Save(dir) => {
                let dir = dir.unwrap_or_else(|| self.save_dir.clone());
                match self.save_explanation(&dir) {
                    Ok(written) if written.is_empty() => {
                        writeln!(out, "Nothing to save: explanation has no inline images")?
                    }
                    Ok(written) => {
                        for path in written {
                            writeln!(out, "Saved {}", path.display())?;
                        }
                    }
                    Err(err) => writeln!(out, "Error: {err:#}")?,
                }
            }
            UserAction::Plant(plant_id) => {
                self.lookup(BackendCommand::LookupPlant { plant_id }, out)?
            }
            UserAction::Medicinal(plant_id) => {
                self.lookup(BackendCommand::MedicinalProperties { plant_id }, out)?
            }
            UserAction::Search(query) => self.lookup(BackendCommand::SearchPlants { query }, out)?,
            UserAction::Clear => {
                self.controller.clear();
                writeln!(out, "{}", self.controller.status_label())?;
            }
            UserAction::Wait => self.waiting = self.is_busy(),
            UserAction::Help => writeln!(out, "{SESSION_HELP}")?,
            UserAction::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Reads `path` and offers it to the controller. A dropped file that is
    /// not a usable image changes nothing and prints nothing.
    pub fn select_path(
        &mut self,
        path: &Path,
        source: ImageSource,
        out: &mut impl Write,
    ) -> io::Result<SelectOutcome> {
        let image = match SelectedImage::from_path(path, source) {
            Ok(image) => image,
            Err(err) => {
                return match source {
                    ImageSource::Drop => {
                        tracing::debug!(path = %path.display(), "ignoring unreadable drop: {err}");
                        Ok(SelectOutcome::Ignored)
                    }
                    ImageSource::Picker => {
                        let rejection = WorkflowError::from(err);
                        writeln!(out, "{}", render::render_error(&rejection))?;
                        Ok(SelectOutcome::Rejected(rejection))
                    }
                };
            }
        };

        let outcome = self.controller.select_image(image);
        match &outcome {
            SelectOutcome::Accepted => {
                if let Some(image) = self.controller.image() {
                    writeln!(out, "{}", render::render_selection(image))?;
                }
            }
            SelectOutcome::Ignored => {}
            SelectOutcome::Rejected(rejection) => {
                writeln!(out, "{}", render::render_error(rejection))?;
            }
        }
        Ok(outcome)
    }

    /// Returns whether a prediction request was issued.
    pub fn predict(&mut self) -> bool {
        match self.controller.predict() {
            Some(request) => {
                issue_request(&mut self.controller, &self.cmd_tx, request);
                true
            }
            None => false,
        }
    }

    /// Returns whether an explanation request was issued.
    pub fn explain(&mut self) -> bool {
        match self.controller.explain() {
            Some(request) => {
                issue_request(&mut self.controller, &self.cmd_tx, request);
                true
            }
            None => false,
        }
    }

    pub fn save_explanation(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let explanation = self
            .controller
            .explanation()
            .context("no explanation to save (run 'explain' first)")?;
        let stem = self
            .controller
            .image()
            .map(|image| export::artifact_stem(image.file_name()))
            .unwrap_or_else(|| export::artifact_stem(""));
        export::save_explanation(dir, &stem, explanation)
    }

    /// Prints the outcome of the request that just settled.
    pub fn render_current(&self, out: &mut impl Write) -> io::Result<()> {
        if let Some(explanation) = self.controller.explanation() {
            writeln!(out, "{}", render::render_explanation(explanation))?;
        } else if let Some(error) = self.controller.error() {
            writeln!(out, "{}", render::render_error(error))?;
        } else if let Some(prediction) = self.controller.prediction() {
            writeln!(out, "{}", render::render_prediction(prediction))?;
        }
        Ok(())
    }

    fn lookup(&mut self, cmd: BackendCommand, out: &mut impl Write) -> io::Result<()> {
        let mut status = String::new();
        if dispatch_backend_command(&self.cmd_tx, cmd, &mut status) {
            self.lookups += 1;
        } else {
            writeln!(out, "Error: {status}")?;
        }
        Ok(())
    }

    fn lookup_settled(&mut self) {
        self.lookups = self.lookups.saturating_sub(1);
    }
}

fn recv(ui_rx: &Receiver<UiEvent>) -> anyhow::Result<UiEvent> {
    ui_rx
        .recv()
        .context("event channel closed; backend worker stopped")
}

fn is_quit(event: &UiEvent) -> bool {
    matches!(event, UiEvent::Input(UserAction::Quit))
}

fn is_input(event: &UiEvent) -> bool {
    matches!(
        event,
        UiEvent::Input(_) | UiEvent::InputRejected(_) | UiEvent::InputClosed
    )
}

#[cfg(test)]
#[path = "../tests/session_tests.rs"]
mod tests;
