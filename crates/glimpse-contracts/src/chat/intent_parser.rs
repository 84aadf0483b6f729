use super::command_registry::{lookup_command, ArgShape, CommandKind};

/// One line of chat input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Blank input; the host ignores it, so an empty question is never sent.
    Noop,
    /// Free text, trimmed: a question about the current image.
    Ask(String),
    Command {
        kind: CommandKind,
        arg: Option<String>,
    },
    Unknown {
        command: String,
        arg: String,
    },
}

/// Classifies a line. `/name rest` maps to a known command when `name`
/// matches one (case-insensitive); `/` followed by anything that is not a
/// command name is treated as a question.
pub fn parse_intent(text: &str) -> Intent {
    let line = text.trim();
    if line.is_empty() {
        return Intent::Noop;
    }

    let Some((name, rest)) = split_command(line) else {
        return Intent::Ask(line.to_string());
    };
    let Some(kind) = lookup_command(name) else {
        return Intent::Unknown {
            command: name.to_ascii_lowercase(),
            arg: rest.to_string(),
        };
    };

    let arg = match kind.arg_shape() {
        ArgShape::Ignored => None,
        ArgShape::Raw => Some(rest.to_string()),
        ArgShape::Path => Some(path_arg(rest)),
    };
    Intent::Command {
        kind,
        arg: arg.filter(|value| !value.is_empty()),
    }
}

fn split_command(line: &str) -> Option<(&str, &str)> {
    let tail = line.strip_prefix('/')?;
    let name_len = tail
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .unwrap_or(tail.len());
    if name_len == 0 {
        return None;
    }
    let (name, rest) = tail.split_at(name_len);
    Some((name, rest.trim()))
}

/// Shell-style so quoted paths with spaces survive; unbalanced quotes fall
/// back to the raw text.
fn path_arg(rest: &str) -> String {
    match shell_words::split(rest) {
        Ok(words) => words.join(" "),
        Err(_) => rest.to_string(),
    }
}
