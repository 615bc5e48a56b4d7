//! Events consumed by the dispatch loop and the session command grammar.

use std::path::PathBuf;

use client_core::{
    workflow::{Completion, WorkflowError},
    ImageSource,
};
use shared::{
    domain::PlantId,
    protocol::{MedicinalPropertiesResponse, PlantRecord, PlantSearchResponse},
};

#[derive(Debug)]
pub enum UiEvent {
    Input(UserAction),
    InputRejected(String),
    InputClosed,
    Completed(Completion),
    PlantLoaded(PlantRecord),
    MedicinalLoaded(MedicinalPropertiesResponse),
    SearchLoaded(PlantSearchResponse),
    LookupFailed(WorkflowError),
    BackendFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Select { path: PathBuf, source: ImageSource },
    Predict,
    Explain,
    Status,
    /// Write explanation visualizations to the given directory (or the default one).
    Save(Option<PathBuf>),
    Plant(PlantId),
    Medicinal(PlantId),
    Search(String),
    Clear,
    /// Hold further input until the in-flight request settles.
    Wait,
    Help,
    Quit,
}

pub const SESSION_HELP: &str = "\
Commands:
  pick <path>       choose a leaf photo (as from a file picker)
  drop <path>       drop a file onto the session (non-images are ignored)
  predict           identify the selected photo (retries after a failure)
  explain           explain the current identification
  status            show the current state
  save [dir]        save explanation visualizations
  plant <id>        show a knowledge-base record
  medicinal <id>    list medicinal properties of a plant
  search <name>     search plants by name
  clear             drop the current selection
  wait              hold further commands until the current request finishes
  help              show this help
  quit              leave the session";

/// Parses one session input line. Blank lines yield `Ok(None)`.
pub fn parse_action(line: &str) -> Result<Option<UserAction>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let action = match command.to_ascii_lowercase().as_str() {
        "pick" | "open" | "select" => UserAction::Select {
            path: required_path(command, rest)?,
            source: ImageSource::Picker,
        },
        "drop" => UserAction::Select {
            path: required_path(command, rest)?,
            source: ImageSource::Drop,
        },
        "predict" | "identify" => UserAction::Predict,
        "explain" => UserAction::Explain,
        "status" => UserAction::Status,
        "save" => UserAction::Save((!rest.is_empty()).then(|| PathBuf::from(unquote(rest)))),
        "plant" => UserAction::Plant(plant_id(command, rest)?),
        "medicinal" => UserAction::Medicinal(plant_id(command, rest)?),
        "search" => {
            if rest.is_empty() {
                return Err("usage: search <name>".to_string());
            }
            UserAction::Search(rest.to_string())
        }
        "clear" => UserAction::Clear,
        "wait" => UserAction::Wait,
        "help" | "?" => UserAction::Help,
        "quit" | "exit" | "q" => UserAction::Quit,
        other => return Err(format!("unknown command '{other}' (type 'help')")),
    };
    Ok(Some(action))
}

fn required_path(command: &str, rest: &str) -> Result<PathBuf, String> {
    let path = unquote(rest);
    if path.is_empty() {
        return Err(format!("usage: {command} <path>"));
    }
    Ok(PathBuf::from(path))
}

fn plant_id(command: &str, rest: &str) -> Result<PlantId, String> {
    rest.parse::<i64>()
        .map(PlantId)
        .map_err(|_| format!("usage: {command} <id> (numeric plant id)"))
}

fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    ['"', '\'']
        .iter()
        .find_map(|quote| {
            raw.strip_prefix(*quote)
                .and_then(|inner| inner.strip_suffix(*quote))
        })
        .unwrap_or(raw)
}
