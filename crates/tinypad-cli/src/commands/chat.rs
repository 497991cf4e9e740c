//! Chat command - interactive session over stdin.
//!
//! Lines are prompts unless they start with `/`. Generated text goes to
//! stdout as it streams; status lines go to stderr.

use std::io::Write;

use tinypad_ollama::{
    dispatch, AvailabilitySupervisor, Consumer, GenerationClient, ModelCatalog, ModelList,
    RequestCoordinator, SamplingInput, ServiceStatus, SubmitError, TinypadConfig, UiEvent,
    SAMPLING_FIELDS,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

const HELP: &str = "\
Commands:
  /models               List models reported by the daemon
  /model [name]         Show or select the model
  /set <field> <value>  Change a sampling parameter
  /params               Show the sampling parameters
  /status               Re-check the daemon (starting it if needed)
  /cancel               Stop the running generation
  /clear                Clear the screen
  /help                 Show this help
  /quit                 Leave
Anything else is sent as a prompt.";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChatCommand {
    Prompt(String),
    Models,
    Model(Option<String>),
    Set { field: String, value: String },
    Params,
    Status,
    Cancel,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

impl ChatCommand {
    pub(crate) fn parse(line: &str) -> Self {
        let Some(rest) = line.trim_start().strip_prefix('/') else {
            return ChatCommand::Prompt(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest.trim(), ""),
        };

        match name {
            "models" => ChatCommand::Models,
            "model" if arg.is_empty() => ChatCommand::Model(None),
            "model" => ChatCommand::Model(Some(arg.to_string())),
            "set" => match arg.split_once(char::is_whitespace) {
                Some((field, value)) => ChatCommand::Set {
                    field: field.to_string(),
                    value: value.trim().to_string(),
                },
                // `/set stop` with no value clears the field
                None if !arg.is_empty() => ChatCommand::Set {
                    field: arg.to_string(),
                    value: String::new(),
                },
                None => ChatCommand::Unknown(line.trim().to_string()),
            },
            "params" => ChatCommand::Params,
            "status" => ChatCommand::Status,
            "cancel" => ChatCommand::Cancel,
            "clear" => ChatCommand::Clear,
            "help" | "?" => ChatCommand::Help,
            "quit" | "exit" | "q" => ChatCommand::Quit,
            _ => ChatCommand::Unknown(line.trim().to_string()),
        }
    }
}

/// Terminal consumer: text to `out`, status lines to `err`.
pub(crate) struct TerminalUi<O: Write, E: Write> {
    out: O,
    err: E,
    models: ModelList,
    model: Option<String>,
    pinned: bool,
}

impl<O: Write, E: Write> TerminalUi<O, E> {
    pub(crate) fn new(out: O, err: E, model: Option<String>) -> Self {
        Self {
            out,
            err,
            models: ModelList::new(),
            pinned: model.is_some(),
            model,
        }
    }

    /// The model prompts go to, falling back to `default_model` until the
    /// listing arrives.
    pub(crate) fn model_or<'a>(&'a self, default_model: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default_model)
    }

    pub(crate) fn select_model(&mut self, name: String) {
        self.model = Some(name);
        self.pinned = true;
    }

    pub(crate) fn models(&self) -> &ModelList {
        &self.models
    }
}

impl<O: Write, E: Write> Consumer for TerminalUi<O, E> {
    fn append_text(&mut self, text: &str) {
        let _ = write!(self.out, "{}", text);
        let _ = self.out.flush();
    }

    fn set_status(&mut self, text: &str) {
        let _ = writeln!(self.err, "[{}]", text);
    }

    fn models_loaded(&mut self, models: &ModelList) {
        self.models = models.clone();
        if !self.pinned {
            self.model = models.first().map(str::to_string);
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Start a task unless the one in `running` is still going. Returns whether
/// a new task was started.
fn start_if_idle<T>(
    running: &mut Option<JoinHandle<T>>,
    start: impl FnOnce() -> JoinHandle<T>,
) -> bool {
    if running.as_ref().is_some_and(|task| !task.is_finished()) {
        return false;
    }
    *running = Some(start());
    true
}

pub(crate) async fn run(
    config: &TinypadConfig,
    model: Option<String>,
    mut sampling: SamplingInput,
) -> miette::Result<()> {
    let client = GenerationClient::from_config(config)
        .map_err(|e| miette::miette!("Failed to create HTTP client: {}", e))?;
    let catalog = ModelCatalog::from_config(config)
        .map_err(|e| miette::miette!("Failed to create HTTP client: {}", e))?;
    let supervisor = AvailabilitySupervisor::from_config(config);

    let (dispatcher, mut events) = dispatch::channel();
    let coordinator = RequestCoordinator::new(client, dispatcher.clone());
    let mut ui = TerminalUi::new(std::io::stdout(), std::io::stderr(), model);

    eprintln!("Tinypad - Ollama at {}. Type /help for commands.", config.base_url);

    let mut supervision = Some(supervisor.spawn(dispatcher.clone()));
    catalog.spawn_load(config.default_model.clone(), dispatcher.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let finished = matches!(event, UiEvent::GenerationFinished);
                event.apply(&mut ui);
                if finished && !stdin_open {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        let command = ChatCommand::parse(&line);
                        let flow = handle(
                            command,
                            config,
                            &coordinator,
                            &supervisor,
                            &catalog,
                            &dispatcher,
                            &mut supervision,
                            &mut ui,
                            &mut sampling,
                        );
                        if let Flow::Quit = flow {
                            coordinator.cancel();
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        stdin_open = false;
                        if !coordinator.is_busy() {
                            break;
                        }
                    }
                    Err(e) => return Err(miette::miette!("Failed to read input: {}", e)),
                }
            }
        }
    }

    events.drain_into(&mut ui);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle<O: Write, E: Write>(
    command: ChatCommand,
    config: &TinypadConfig,
    coordinator: &RequestCoordinator,
    supervisor: &AvailabilitySupervisor,
    catalog: &ModelCatalog,
    dispatcher: &dispatch::Dispatcher,
    supervision: &mut Option<JoinHandle<ServiceStatus>>,
    ui: &mut TerminalUi<O, E>,
    sampling: &mut SamplingInput,
) -> Flow {
    match command {
        ChatCommand::Prompt(prompt) => {
            let model = ui.model_or(&config.default_model).to_string();
            match coordinator.submit(&prompt, &model, sampling) {
                Ok(()) | Err(SubmitError::BlankPrompt) => {}
                Err(SubmitError::Busy) => {
                    ui.set_status("Busy: a generation is running, /cancel to stop it")
                }
            }
        }
        ChatCommand::Models => {
            if ui.models().is_empty() {
                ui.set_status("No models loaded yet");
            } else {
                let current = ui.model_or(&config.default_model).to_string();
                for name in ui.models() {
                    let marker = if *name == current { "*" } else { " " };
                    eprintln!("{} {}", marker, name);
                }
            }
            // Refresh for next time; the new listing arrives as an event.
            catalog.spawn_load(config.default_model.clone(), dispatcher.clone());
        }
        ChatCommand::Model(None) => {
            let current = ui.model_or(&config.default_model).to_string();
            ui.set_status(&format!("Model: {}", current));
        }
        ChatCommand::Model(Some(name)) => {
            if !ui.models().is_empty() && !ui.models().contains(&name) {
                ui.set_status(&format!("{} is not in the daemon's listing", name));
            }
            ui.set_status(&format!("Model: {}", name));
            ui.select_model(name);
        }
        ChatCommand::Set { field, value } => {
            if sampling.set(&field, value.as_str()) {
                ui.set_status(&format!("{} = {}", field.replace('-', "_"), value));
            } else {
                ui.set_status(&format!(
                    "Unknown parameter '{}'; expected one of: {}",
                    field,
                    SAMPLING_FIELDS.join(", ")
                ));
            }
        }
        ChatCommand::Params => {
            for (field, value) in sampling.fields() {
                eprintln!("  {:<18} {}", field, value);
            }
        }
        ChatCommand::Status => {
            if !start_if_idle(supervision, || supervisor.spawn(dispatcher.clone())) {
                ui.set_status("Status check already running");
            }
        }
        ChatCommand::Cancel => {
            if coordinator.cancel() {
                ui.set_status("Cancelling...");
            } else {
                ui.set_status("Nothing to cancel");
            }
        }
        ChatCommand::Clear => {
            ui.append_text("\x1b[2J\x1b[H");
        }
        ChatCommand::Help => eprintln!("{}", HELP),
        ChatCommand::Quit => return Flow::Quit,
        ChatCommand::Unknown(line) => {
            ui.set_status(&format!("Unknown command: {} (try /help)", line));
        }
    }
    Flow::Continue
}
