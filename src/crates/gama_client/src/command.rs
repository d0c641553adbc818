use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientResult;

/// Command tags understood by the server. `Custom` covers anything newer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandType {
    Load,
    Play,
    Pause,
    Step,
    StepBack,
    Stop,
    Reload,
    Expression,
    Exit,
    Custom(String),
}

impl CommandType {
    /// Tag written to the `type` field.
    pub fn as_str(&self) -> &str {
        match self {
            CommandType::Load => "load",
            CommandType::Play => "play",
            CommandType::Pause => "pause",
            CommandType::Step => "step",
            CommandType::StepBack => "stepBack",
            CommandType::Stop => "stop",
            CommandType::Reload => "reload",
            CommandType::Expression => "expression",
            CommandType::Exit => "exit",
            CommandType::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Experiment parameter passed to `load` and `reload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// GAML type name, e.g. `int` or `float`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub value: Value,
}

impl Parameter {
    /// Parameter of GAML type `kind` named `name`.
    pub fn new(kind: impl Into<String>, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Optional settings for loading an experiment.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Forward the simulation console to this client.
    pub console: bool,
    /// Forward status bar updates to this client.
    pub status: bool,
    /// Forward dialog requests to this client.
    pub dialog: bool,
    pub parameters: Vec<Parameter>,
    /// GAML condition that stops the experiment when true.
    pub until: Option<String>,
}

impl LoadOptions {
    /// Toggle console forwarding.
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Toggle status forwarding.
    pub fn with_status(mut self, status: bool) -> Self {
        self.status = status;
        self
    }

    /// Toggle dialog forwarding.
    pub fn with_dialog(mut self, dialog: bool) -> Self {
        self.dialog = dialog;
        self
    }

    /// Append an experiment parameter.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the stop condition.
    pub fn with_until(mut self, until: impl Into<String>) -> Self {
        self.until = Some(until.into());
        self
    }
}

/// Optional settings for reloading an experiment.
#[derive(Debug, Clone, Default)]
pub struct ReloadOptions {
    pub parameters: Vec<Parameter>,
    pub until: Option<String>,
}

impl ReloadOptions {
    /// Append an experiment parameter.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the stop condition.
    pub fn with_until(mut self, until: impl Into<String>) -> Self {
        self.until = Some(until.into());
        self
    }
}

/// Outbound message under construction.
///
/// Built-in fields are kept in insertion order after `type` and
/// `socket_id`. The extension map is merged last and wins on collisions,
/// including over `type` and `socket_id`.
#[derive(Debug, Clone)]
pub struct Command {
    kind: CommandType,
    with_socket_id: bool,
    fields: Vec<(String, Value)>,
    extension: Map<String, Value>,
}

impl Command {
    /// Empty command with the given tag.
    pub fn new(kind: CommandType) -> Self {
        Self {
            kind,
            with_socket_id: true,
            fields: Vec::new(),
            extension: Map::new(),
        }
    }

    /// Command with an arbitrary tag.
    pub fn custom(tag: impl Into<String>) -> Self {
        Self::new(CommandType::Custom(tag.into()))
    }

    /// `load` command for a model file and experiment name.
    pub fn load(model_path: &str, experiment: &str, options: &LoadOptions) -> ClientResult<Self> {
        let command = Self::new(CommandType::Load)
            .field("model", model_path)
            .field("experiment", experiment)
            .field("console", options.console)
            .field("status", options.status)
            .field("dialog", options.dialog);
        command.with_run_settings(&options.parameters, options.until.as_deref())
    }

    /// `play` command.
    pub fn play(exp_id: &str, sync: bool) -> Self {
        Self::new(CommandType::Play)
            .field("exp_id", exp_id)
            .field("sync", sync)
    }

    /// `pause` command.
    pub fn pause(exp_id: &str) -> Self {
        Self::new(CommandType::Pause).field("exp_id", exp_id)
    }

    /// `step` command; `nb_step` is only sent above one.
    pub fn step(exp_id: &str, nb_step: u32, sync: bool) -> Self {
        Self::stepping(CommandType::Step, exp_id, nb_step, sync)
    }

    /// `stepBack` command; `nb_step` is only sent above one.
    pub fn step_back(exp_id: &str, nb_step: u32, sync: bool) -> Self {
        Self::stepping(CommandType::StepBack, exp_id, nb_step, sync)
    }

    /// `stop` command.
    pub fn stop(exp_id: &str) -> Self {
        Self::new(CommandType::Stop).field("exp_id", exp_id)
    }

    /// `reload` command.
    pub fn reload(exp_id: &str, options: &ReloadOptions) -> ClientResult<Self> {
        Self::new(CommandType::Reload)
            .field("exp_id", exp_id)
            .with_run_settings(&options.parameters, options.until.as_deref())
    }

    /// `expression` command evaluating `expression`.
    pub fn expression(exp_id: &str, expression: &str) -> Self {
        Self::new(CommandType::Expression)
            .field("exp_id", exp_id)
            .field("expr", expression)
    }

    /// Ask the server to shut down. Carries no socket id.
    pub fn exit() -> Self {
        let mut command = Self::new(CommandType::Exit);
        command.with_socket_id = false;
        command
    }

    fn stepping(kind: CommandType, exp_id: &str, nb_step: u32, sync: bool) -> Self {
        Self::new(kind)
            .field("exp_id", exp_id)
            .field("sync", sync)
            .optional_field("nb_step", (nb_step > 1).then_some(nb_step))
    }

    fn with_run_settings(self, parameters: &[Parameter], until: Option<&str>) -> ClientResult<Self> {
        let parameters = if parameters.is_empty() {
            None
        } else {
            Some(serde_json::to_value(parameters)?)
        };
        Ok(self
            .optional_field("parameters", parameters)
            .optional_field("until", until.filter(|until| !until.is_empty())))
    }

    /// Tag of this command.
    pub fn kind(&self) -> &CommandType {
        &self.kind
    }

    /// Set a built-in field, replacing an earlier value under the same key.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    /// Set a built-in field only when a value is present.
    pub fn optional_field(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    /// Merge caller-supplied keys on top of the built-in fields.
    pub fn with_extension(mut self, extension: Map<String, Value>) -> Self {
        self.extension.extend(extension);
        self
    }

    /// Build the final JSON object using the session's socket id.
    pub fn to_value(&self, socket_id: &str) -> Value {
        let mut message = Map::new();
        message.insert("type".to_string(), Value::from(self.kind.as_str()));
        if self.with_socket_id {
            message.insert("socket_id".to_string(), Value::from(socket_id));
        }
        for (key, value) in &self.fields {
            message.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.extension {
            if message.contains_key(key) {
                tracing::warn!(
                    command = %self.kind,
                    key = key.as_str(),
                    "extension field overrides built-in command field"
                );
            }
            message.insert(key.clone(), value.clone());
        }
        Value::Object(message)
    }

    /// Serialize to the text sent over the wire.
    pub fn encode(&self, socket_id: &str) -> ClientResult<String> {
        Ok(serde_json::to_string(&self.to_value(socket_id))?)
    }
}
