//! Typed step-command model
//!
//! Each command group is a tagged sum type; the HTTP layer deserializes the
//! path segments plus body into one variant and converts it, exhaustively,
//! into the flat positional argument list the CLI binary expects.

use serde::{Deserialize, Serialize};

/// A step command, grouped the way the CLI groups its subcommands
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "group", rename_all = "kebab-case")]
pub enum StepCommand {
    Navigate(NavigateStep),
    Interact(InteractStep),
    Assert(AssertStep),
    Window(WindowStep),
    Data(DataStep),
    Dialog(DialogStep),
    Wait(WaitStep),
    File(FileStep),
    Misc(MiscStep),
    Library(LibraryStep),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum NavigateStep {
    To { url: String },
    ScrollToTop,
    ScrollToBottom,
    ScrollToElement { selector: String },
    ScrollToPosition { x: i64, y: i64 },
    ScrollBy { x: i64, y: i64 },
    ScrollUp,
    ScrollDown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum InteractStep {
    Click { selector: String },
    DoubleClick { selector: String },
    RightClick { selector: String },
    Hover { selector: String },
    Write { selector: String, value: String },
    Key { key: String },
    // Field cannot be called `action`: that name is taken by the enum tag
    Mouse { kind: String, x: i64, y: i64 },
    Select { selector: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum AssertStep {
    Exists { selector: String },
    NotExists { selector: String },
    Equals { selector: String, value: String },
    NotEquals { selector: String, value: String },
    Checked { selector: String },
    Selected { selector: String, value: String },
    Variable { name: String, value: String },
    Gt { selector: String, value: String },
    Gte { selector: String, value: String },
    Lt { selector: String, value: String },
    Lte { selector: String, value: String },
    Matches { selector: String, pattern: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum WindowStep {
    Resize { width: u32, height: u32 },
    Maximize,
    Switch { target: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum DataStep {
    Store {
        selector: String,
        variable: String,
    },
    Cookie {
        operation: String,
        name: Option<String>,
        value: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum DialogStep {
    DismissAlert,
    DismissConfirm,
    DismissPrompt,
    DismissPromptWithText { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum WaitStep {
    Element {
        selector: String,
        timeout: Option<u64>,
    },
    Time {
        seconds: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum FileStep {
    Upload { selector: String, file_path: String },
    UploadUrl { selector: String, url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum MiscStep {
    Comment { text: String },
    Execute { script: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum LibraryStep {
    Add { checkpoint_id: String },
    Get { library_checkpoint_id: String },
    Attach {
        journey_id: String,
        library_checkpoint_id: String,
        position: u32,
    },
    MoveStep {
        library_checkpoint_id: String,
        step_id: String,
        position: u32,
    },
    RemoveStep {
        library_checkpoint_id: String,
        step_id: String,
    },
    Update {
        library_checkpoint_id: String,
        name: String,
    },
}

impl StepCommand {
    /// The CLI command name for this group, e.g. `step-navigate`
    pub fn command(&self) -> &'static str {
        match self {
            StepCommand::Navigate(_) => "step-navigate",
            StepCommand::Interact(_) => "step-interact",
            StepCommand::Assert(_) => "step-assert",
            StepCommand::Window(_) => "step-window",
            StepCommand::Data(_) => "step-data",
            StepCommand::Dialog(_) => "step-dialog",
            StepCommand::Wait(_) => "step-wait",
            StepCommand::File(_) => "step-file",
            StepCommand::Misc(_) => "step-misc",
            StepCommand::Library(_) => "library",
        }
    }

    /// The subcommand word, e.g. `to` or `dismiss-prompt-with-text`
    pub fn subcommand(&self) -> &'static str {
        match self {
            StepCommand::Navigate(s) => match s {
                NavigateStep::To { .. } => "to",
                NavigateStep::ScrollToTop => "scroll-to-top",
                NavigateStep::ScrollToBottom => "scroll-to-bottom",
                NavigateStep::ScrollToElement { .. } => "scroll-to-element",
                NavigateStep::ScrollToPosition { .. } => "scroll-to-position",
                NavigateStep::ScrollBy { .. } => "scroll-by",
                NavigateStep::ScrollUp => "scroll-up",
                NavigateStep::ScrollDown => "scroll-down",
            },
            StepCommand::Interact(s) => match s {
                InteractStep::Click { .. } => "click",
                InteractStep::DoubleClick { .. } => "double-click",
                InteractStep::RightClick { .. } => "right-click",
                InteractStep::Hover { .. } => "hover",
                InteractStep::Write { .. } => "write",
                InteractStep::Key { .. } => "key",
                InteractStep::Mouse { .. } => "mouse",
                InteractStep::Select { .. } => "select",
            },
            StepCommand::Assert(s) => match s {
                AssertStep::Exists { .. } => "exists",
                AssertStep::NotExists { .. } => "not-exists",
                AssertStep::Equals { .. } => "equals",
                AssertStep::NotEquals { .. } => "not-equals",
                AssertStep::Checked { .. } => "checked",
                AssertStep::Selected { .. } => "selected",
                AssertStep::Variable { .. } => "variable",
                AssertStep::Gt { .. } => "gt",
                AssertStep::Gte { .. } => "gte",
                AssertStep::Lt { .. } => "lt",
                AssertStep::Lte { .. } => "lte",
                AssertStep::Matches { .. } => "matches",
            },
            StepCommand::Window(s) => match s {
                WindowStep::Resize { .. } => "resize",
                WindowStep::Maximize => "maximize",
                WindowStep::Switch { .. } => "switch",
            },
            StepCommand::Data(s) => match s {
                DataStep::Store { .. } => "store",
                DataStep::Cookie { .. } => "cookie",
            },
            StepCommand::Dialog(s) => match s {
                DialogStep::DismissAlert => "dismiss-alert",
                DialogStep::DismissConfirm => "dismiss-confirm",
                DialogStep::DismissPrompt => "dismiss-prompt",
                DialogStep::DismissPromptWithText { .. } => "dismiss-prompt-with-text",
            },
            StepCommand::Wait(s) => match s {
                WaitStep::Element { .. } => "element",
                WaitStep::Time { .. } => "time",
            },
            StepCommand::File(s) => match s {
                FileStep::Upload { .. } => "upload",
                FileStep::UploadUrl { .. } => "upload-url",
            },
            StepCommand::Misc(s) => match s {
                MiscStep::Comment { .. } => "comment",
                MiscStep::Execute { .. } => "execute",
            },
            StepCommand::Library(s) => match s {
                LibraryStep::Add { .. } => "add",
                LibraryStep::Get { .. } => "get",
                LibraryStep::Attach { .. } => "attach",
                LibraryStep::MoveStep { .. } => "move-step",
                LibraryStep::RemoveStep { .. } => "remove-step",
                LibraryStep::Update { .. } => "update",
            },
        }
    }

    /// Flatten the variant into the positional arguments the CLI expects
    /// (everything after `<command> <subcommand> <checkpoint-id>`).
    pub fn to_args(&self) -> Vec<String> {
        match self {
            StepCommand::Navigate(s) => match s {
                NavigateStep::To { url } => vec![url.clone()],
                NavigateStep::ScrollToTop
                | NavigateStep::ScrollToBottom
                | NavigateStep::ScrollUp
                | NavigateStep::ScrollDown => vec![],
                NavigateStep::ScrollToElement { selector } => vec![selector.clone()],
                NavigateStep::ScrollToPosition { x, y } | NavigateStep::ScrollBy { x, y } => {
                    vec![x.to_string(), y.to_string()]
                }
            },
            StepCommand::Interact(s) => match s {
                InteractStep::Click { selector }
                | InteractStep::DoubleClick { selector }
                | InteractStep::RightClick { selector }
                | InteractStep::Hover { selector } => vec![selector.clone()],
                InteractStep::Write { selector, value }
                | InteractStep::Select { selector, value } => {
                    vec![selector.clone(), value.clone()]
                }
                InteractStep::Key { key } => vec![key.clone()],
                InteractStep::Mouse { kind, x, y } => {
                    vec![kind.clone(), x.to_string(), y.to_string()]
                }
            },
            StepCommand::Assert(s) => match s {
                AssertStep::Exists { selector }
                | AssertStep::NotExists { selector }
                | AssertStep::Checked { selector } => vec![selector.clone()],
                AssertStep::Equals { selector, value }
                | AssertStep::NotEquals { selector, value }
                | AssertStep::Selected { selector, value }
                | AssertStep::Gt { selector, value }
                | AssertStep::Gte { selector, value }
                | AssertStep::Lt { selector, value }
                | AssertStep::Lte { selector, value } => vec![selector.clone(), value.clone()],
                AssertStep::Variable { name, value } => vec![name.clone(), value.clone()],
                AssertStep::Matches { selector, pattern } => {
                    vec![selector.clone(), pattern.clone()]
                }
            },
            StepCommand::Window(s) => match s {
                WindowStep::Resize { width, height } => vec![format!("{}x{}", width, height)],
                WindowStep::Maximize => vec![],
                WindowStep::Switch { target } => vec![target.clone()],
            },
            StepCommand::Data(s) => match s {
                DataStep::Store { selector, variable } => {
                    vec![selector.clone(), variable.clone()]
                }
                DataStep::Cookie {
                    operation,
                    name,
                    value,
                } => {
                    let mut args = vec![operation.clone()];
                    args.extend(name.clone());
                    args.extend(value.clone());
                    args
                }
            },
            StepCommand::Dialog(s) => match s {
                DialogStep::DismissAlert
                | DialogStep::DismissConfirm
                | DialogStep::DismissPrompt => vec![],
                DialogStep::DismissPromptWithText { text } => vec![text.clone()],
            },
            StepCommand::Wait(s) => match s {
                WaitStep::Element { selector, timeout } => {
                    let mut args = vec![selector.clone()];
                    if let Some(t) = timeout {
                        args.push(t.to_string());
                    }
                    args
                }
                WaitStep::Time { seconds } => vec![seconds.to_string()],
            },
            StepCommand::File(s) => match s {
                FileStep::Upload {
                    selector,
                    file_path,
                } => vec![selector.clone(), file_path.clone()],
                FileStep::UploadUrl { selector, url } => vec![selector.clone(), url.clone()],
            },
            StepCommand::Misc(s) => match s {
                MiscStep::Comment { text } => vec![text.clone()],
                MiscStep::Execute { script } => vec![script.clone()],
            },
            StepCommand::Library(s) => match s {
                LibraryStep::Add { checkpoint_id } => vec![checkpoint_id.clone()],
                LibraryStep::Get {
                    library_checkpoint_id,
                } => vec![library_checkpoint_id.clone()],
                LibraryStep::Attach {
                    journey_id,
                    library_checkpoint_id,
                    position,
                } => vec![
                    journey_id.clone(),
                    library_checkpoint_id.clone(),
                    position.to_string(),
                ],
                LibraryStep::MoveStep {
                    library_checkpoint_id,
                    step_id,
                    position,
                } => vec![
                    library_checkpoint_id.clone(),
                    step_id.clone(),
                    position.to_string(),
                ],
                LibraryStep::RemoveStep {
                    library_checkpoint_id,
                    step_id,
                } => vec![library_checkpoint_id.clone(), step_id.clone()],
                LibraryStep::Update {
                    library_checkpoint_id,
                    name,
                } => vec![library_checkpoint_id.clone(), name.clone()],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_to_produces_url_arg() {
        let step = StepCommand::Navigate(NavigateStep::To {
            url: "https://example.com".to_string(),
        });
        assert_eq!(step.command(), "step-navigate");
        assert_eq!(step.subcommand(), "to");
        assert_eq!(step.to_args(), vec!["https://example.com"]);
    }

    #[test]
    fn window_resize_is_formatted_as_dimensions() {
        let step = StepCommand::Window(WindowStep::Resize {
            width: 1920,
            height: 1080,
        });
        assert_eq!(step.to_args(), vec!["1920x1080"]);
    }

    #[test]
    fn deserializes_from_tagged_json() {
        let step: StepCommand = serde_json::from_value(serde_json::json!({
            "group": "interact",
            "action": "write",
            "selector": "input#name",
            "value": "hello world",
        }))
        .expect("valid step json");
        assert_eq!(
            step,
            StepCommand::Interact(InteractStep::Write {
                selector: "input#name".to_string(),
                value: "hello world".to_string(),
            })
        );
        assert_eq!(step.to_args(), vec!["input#name", "hello world"]);
    }

    #[test]
    fn mouse_step_round_trips_through_tagged_json() {
        let step = StepCommand::Interact(InteractStep::Mouse {
            kind: "down".to_string(),
            x: 10,
            y: 20,
        });
        let json = serde_json::to_value(&step).expect("serializable step");
        assert_eq!(json["group"], "interact");
        assert_eq!(json["action"], "mouse");
        assert_eq!(json["kind"], "down");

        let back: StepCommand = serde_json::from_value(json).expect("valid step json");
        assert_eq!(back, step);
        assert_eq!(back.to_args(), vec!["down", "10", "20"]);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = serde_json::from_value::<StepCommand>(serde_json::json!({
            "group": "dialog",
            "action": "shout",
        }));
        assert!(err.is_err());
    }

    #[test]
    fn wait_element_timeout_is_optional() {
        let with = StepCommand::Wait(WaitStep::Element {
            selector: "#spinner".to_string(),
            timeout: Some(30),
        });
        assert_eq!(with.to_args(), vec!["#spinner", "30"]);

        let without = StepCommand::Wait(WaitStep::Element {
            selector: "#spinner".to_string(),
            timeout: None,
        });
        assert_eq!(without.to_args(), vec!["#spinner"]);
    }
}
