/// What a slash command asks the chat host to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Upload,
    SetTemperature,
    SetTopK,
    SetModel,
    Settings,
    ShowPrompt,
    History,
    Clear,
    Help,
    Quit,
}

/// How the text after a command name is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgShape {
    Ignored,
    Raw,
    Path,
}

#[derive(Debug, Clone, Copy)]
struct CommandSpec {
    names: &'static [&'static str],
    kind: CommandKind,
    usage: &'static str,
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        names: &["upload", "image"],
        kind: CommandKind::Upload,
        usage: "/upload <path>",
    },
    CommandSpec {
        names: &["temperature", "temp"],
        kind: CommandKind::SetTemperature,
        usage: "/temperature <0.0-1.0>",
    },
    CommandSpec {
        names: &["top_k", "topk"],
        kind: CommandKind::SetTopK,
        usage: "/top_k <1-40>",
    },
    CommandSpec {
        names: &["model"],
        kind: CommandKind::SetModel,
        usage: "/model <name>",
    },
    CommandSpec {
        names: &["settings"],
        kind: CommandKind::Settings,
        usage: "/settings",
    },
    CommandSpec {
        names: &["prompt"],
        kind: CommandKind::ShowPrompt,
        usage: "/prompt",
    },
    CommandSpec {
        names: &["history"],
        kind: CommandKind::History,
        usage: "/history",
    },
    CommandSpec {
        names: &["clear"],
        kind: CommandKind::Clear,
        usage: "/clear",
    },
    CommandSpec {
        names: &["help"],
        kind: CommandKind::Help,
        usage: "/help",
    },
    CommandSpec {
        names: &["quit", "exit"],
        kind: CommandKind::Quit,
        usage: "/quit",
    },
];

impl CommandKind {
    pub(crate) fn arg_shape(self) -> ArgShape {
        match self {
            CommandKind::Upload => ArgShape::Path,
            CommandKind::SetTemperature | CommandKind::SetTopK | CommandKind::SetModel => {
                ArgShape::Raw
            }
            _ => ArgShape::Ignored,
        }
    }
}

/// Case-insensitive lookup by name or alias.
pub(crate) fn lookup_command(name: &str) -> Option<CommandKind> {
    COMMANDS
        .iter()
        .find(|spec| spec.names.iter().any(|known| known.eq_ignore_ascii_case(name)))
        .map(|spec| spec.kind)
}

/// One usage string per command, in help order.
pub fn help_lines() -> Vec<&'static str> {
    COMMANDS.iter().map(|spec| spec.usage).collect()
}
