//! Simulator control commands as received over HTTP.

use serde::{Deserialize, Serialize};

use crate::SimulatorError;

pub const UNKNOWN_COMMAND: &str = "unknown command";
pub const MISSING_COMMAND: &str = "invalid simulator command request";
pub const MISSING_TIME_TO_RUN: &str = "no time to run provided";

/// A command accepted by [Simulator::execute](crate::Simulator::execute).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulatorCommand {
    Pause,
    Resume,
    Reset,
    Step,
    RunFor { time_to_run: f64 },
}

impl SimulatorCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SimulatorCommand::Pause => "pause",
            SimulatorCommand::Resume => "resume",
            SimulatorCommand::Reset => "reset",
            SimulatorCommand::Step => "step",
            SimulatorCommand::RunFor { .. } => "run_for",
        }
    }

    /// Builds a command from its name and optional run time.
    pub fn from_parts(name: &str, time_to_run: Option<f64>) -> Result<Self, SimulatorError> {
        match name {
            "pause" => Ok(SimulatorCommand::Pause),
            "resume" => Ok(SimulatorCommand::Resume),
            "reset" => Ok(SimulatorCommand::Reset),
            "step" => Ok(SimulatorCommand::Step),
            "run_for" => time_to_run
                .map(|time_to_run| SimulatorCommand::RunFor { time_to_run })
                .ok_or_else(|| SimulatorError::InvalidCommand(MISSING_TIME_TO_RUN.into())),
            _ => Err(SimulatorError::InvalidCommand(UNKNOWN_COMMAND.into())),
        }
    }
}

/// The body of a `POST /simulator` request.
///
/// Accepted either as JSON, `{"command": "run_for", "time_to_run": 1.5}`, or as
/// a form, `command=run_for&time_to_run=1.5`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommandRequest {
    pub command: Option<String>,
    pub time_to_run: Option<f64>,
}

impl CommandRequest {
    /// Parses a request body. JSON is used when the content type says so or the
    /// body looks like an object; anything else is read as a form.
    pub fn parse(body: &[u8], content_type: Option<&str>) -> Result<Self, SimulatorError> {
        let is_json = content_type.is_some_and(|c| c.contains("json"))
            || body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{');

        if is_json {
            Self::from_json(body)
        } else {
            Self::from_form(body)
        }
    }

    pub fn from_json(body: &[u8]) -> Result<Self, SimulatorError> {
        serde_json::from_slice(body)
            .map_err(|e| SimulatorError::InvalidCommand(format!("invalid request body: {}", e)))
    }

    pub fn from_form(body: &[u8]) -> Result<Self, SimulatorError> {
        let mut request = CommandRequest::default();

        for (key, value) in form_urlencoded::parse(body) {
            match key.as_ref() {
                "command" => request.command = Some(value.trim().to_string()),
                "time_to_run" => {
                    let time_to_run = value.trim().parse().map_err(|_| {
                        SimulatorError::InvalidCommand(format!("invalid time to run '{}'", value))
                    })?;
                    request.time_to_run = Some(time_to_run);
                }
                _ => {}
            }
        }

        Ok(request)
    }

    /// Resolves the request into a command.
    pub fn command(&self) -> Result<SimulatorCommand, SimulatorError> {
        let name = self
            .command
            .as_deref()
            .ok_or_else(|| SimulatorError::InvalidCommand(MISSING_COMMAND.into()))?;
        SimulatorCommand::from_parts(name, self.time_to_run)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandResult {
    Ok,
    Error,
}

/// The reply to a simulator command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub result: CommandResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CommandResponse {
    pub fn ok(command: &str) -> Self {
        CommandResponse {
            result: CommandResult::Ok,
            command: Some(command.to_string()),
            reason: None,
        }
    }

    pub fn error(command: Option<&str>, error: &SimulatorError) -> Self {
        let reason = match error {
            SimulatorError::InvalidCommand(reason) => reason.clone(),
            error => error.to_string(),
        };

        CommandResponse {
            result: CommandResult::Error,
            command: command.map(str::to_string),
            reason: Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == CommandResult::Ok
    }
}
