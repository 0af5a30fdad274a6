//! Slash-command grammar for the interactive shell.
//!
//! [`parse`] turns one input line into a [`Command`]. Free text after the
//! required positional arguments is kept verbatim, so `/text <id> 스피커 버튼`
//! stores the phrase with its inner space.

use mnemos_types::{BoundingBox, EntityType, ModelError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    New {
        entity_type: EntityType,
        name: String,
    },
    Define { id: String, function: String },
    Describe { id: String, description: String },
    Alias { id: String, alias: String },
    Constraint { id: String, constraint: String },
    Text {
        id: String,
        text: String,
        language: Option<String>,
    },
    Visual {
        id: String,
        image_id: String,
        bbox: BoundingBox,
        view_angle: Option<String>,
    },
    Confidence {
        id: String,
        image_id: String,
        value: f64,
    },
    Show { id: String },
    Find { name: String },
    List,
    Search { query: String, require_visual: bool },
    Explain { query: String },
    Delete { id: String },
    Ask { utterance: String },
    Models { switch_to: Option<String> },
    Settings,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("commands start with '/'; try /ask {0}")]
    NotACommand(String),
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{value}' is not a number")]
    NotANumber { value: String },
    #[error(transparent)]
    EntityType(#[from] ModelError),
}

/// Usage line for every command, in `/help` order.
pub const USAGE: &[(&str, &str)] = &[
    ("/new <type> <name>", "create a memory (concept, device_component, software_spec, rule)"),
    ("/define <id> <function>", "set what the memory does"),
    ("/describe <id> <text>", "set a free-form description"),
    ("/alias <id> <alias>", "add another name"),
    ("/constraint <id> <text>", "add a usage constraint"),
    ("/text [--lang <code>] <id> <text>", "add an expression people use for it"),
    ("/visual <id> <image> <x> <y> <w> <h> [angle]", "annotate where it is in an image"),
    ("/confidence <id> <image> <value>", "set confidence of an image's annotations"),
    ("/show <id>", "print every modality of a memory"),
    ("/find <name>", "look up memories by exact name"),
    ("/list", "list every memory"),
    ("/search [--visual] <query>", "rank memories for a query"),
    ("/explain <query>", "show candidates without counting a use"),
    ("/delete <id>", "remove a memory"),
    ("/ask <utterance>", "classify an utterance and route it"),
    ("/models [name]", "list Ollama models or switch the active one"),
    ("/settings", "edit ~/.mnemos/config.toml"),
    ("/help", "show this list"),
    ("/quit  /exit", "leave the shell"),
];

fn usage(command: &str) -> &'static str {
    USAGE
        .iter()
        .find(|(line, _)| line.split_whitespace().next() == Some(command))
        .map(|(line, _)| *line)
        .unwrap_or("/help")
}

/// Split off the first whitespace-delimited word.
fn next_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], input[end..].trim_start())),
        None => Some((input, "")),
    }
}

/// `<id> <free text>` with both parts required.
fn id_and_text(command: &str, rest: &str) -> Result<(String, String), ParseError> {
    let (id, text) = next_word(rest).ok_or(ParseError::Usage(usage(command)))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Usage(usage(command)));
    }
    Ok((id.to_string(), text.to_string()))
}

fn required(command: &str, rest: &str) -> Result<String, ParseError> {
    let rest = rest.trim();
    if rest.is_empty() {
        Err(ParseError::Usage(usage(command)))
    } else {
        Ok(rest.to_string())
    }
}

fn number(value: &str) -> Result<f64, ParseError> {
    value.parse().map_err(|_| ParseError::NotANumber {
        value: value.to_string(),
    })
}

pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let Some((command, rest)) = next_word(line) else {
        return Err(ParseError::Usage("/help"));
    };
    if !command.starts_with('/') {
        return Err(ParseError::NotACommand(line.to_string()));
    }

    let parsed = match command {
        "/new" => {
            let (ty, name) = id_and_text(command, rest)?;
            Command::New {
                entity_type: ty.parse()?,
                name,
            }
        }
        "/define" => {
            let (id, function) = id_and_text(command, rest)?;
            Command::Define { id, function }
        }
        "/describe" => {
            let (id, description) = id_and_text(command, rest)?;
            Command::Describe { id, description }
        }
        "/alias" => {
            let (id, alias) = id_and_text(command, rest)?;
            Command::Alias { id, alias }
        }
        "/constraint" => {
            let (id, constraint) = id_and_text(command, rest)?;
            Command::Constraint { id, constraint }
        }
        "/text" => {
            let (language, rest) = match next_word(rest) {
                Some(("--lang", after)) => {
                    let (code, after) = next_word(after).ok_or(ParseError::Usage(usage(command)))?;
                    (Some(code.to_string()), after)
                }
                _ => (None, rest),
            };
            let (id, text) = id_and_text(command, rest)?;
            Command::Text { id, text, language }
        }
        "/visual" => {
            let words: Vec<&str> = rest.split_whitespace().collect();
            let [id, image_id, x, y, w, h, angle @ ..] = words.as_slice() else {
                return Err(ParseError::Usage(usage(command)));
            };
            if angle.len() > 1 {
                return Err(ParseError::Usage(usage(command)));
            }
            Command::Visual {
                id: id.to_string(),
                image_id: image_id.to_string(),
                bbox: BoundingBox::new(number(x)?, number(y)?, number(w)?, number(h)?),
                view_angle: angle.first().map(|a| a.to_string()),
            }
        }
        "/confidence" => {
            let words: Vec<&str> = rest.split_whitespace().collect();
            let [id, image_id, value] = words.as_slice() else {
                return Err(ParseError::Usage(usage(command)));
            };
            Command::Confidence {
                id: id.to_string(),
                image_id: image_id.to_string(),
                value: number(value)?,
            }
        }
        "/show" => Command::Show {
            id: required(command, rest)?,
        },
        "/find" => Command::Find {
            name: required(command, rest)?,
        },
        "/list" => Command::List,
        "/search" => {
            let (require_visual, rest) = match next_word(rest) {
                Some(("--visual", after)) => (true, after),
                _ => (false, rest),
            };
            Command::Search {
                query: required(command, rest)?,
                require_visual,
            }
        }
        "/explain" => Command::Explain {
            query: required(command, rest)?,
        },
        "/delete" => Command::Delete {
            id: required(command, rest)?,
        },
        "/ask" => Command::Ask {
            utterance: required(command, rest)?,
        },
        "/models" => Command::Models {
            switch_to: next_word(rest).map(|(name, _)| name.to_string()),
        },
        "/settings" => Command::Settings,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_keeps_multi_word_names() {
        assert_eq!(
            parse("/new device_component Volume Button").unwrap(),
            Command::New {
                entity_type: EntityType::DeviceComponent,
                name: "Volume Button".into(),
            }
        );
    }

    #[test]
    fn new_rejects_unknown_type() {
        assert!(matches!(
            parse("/new gadget Thing"),
            Err(ParseError::EntityType(ModelError::UnknownEntityType(_)))
        ));
    }

    #[test]
    fn text_accepts_language_flag() {
        assert_eq!(
            parse("/text --lang ko mem_1 스피커 버튼").unwrap(),
            Command::Text {
                id: "mem_1".into(),
                text: "스피커 버튼".into(),
                language: Some("ko".into()),
            }
        );
        assert_eq!(
            parse("/text mem_1   speaker on/off ").unwrap(),
            Command::Text {
                id: "mem_1".into(),
                text: "speaker on/off".into(),
                language: None,
            }
        );
    }

    #[test]
    fn missing_arguments_report_usage() {
        assert_eq!(
            parse("/define mem_1"),
            Err(ParseError::Usage("/define <id> <function>"))
        );
        assert_eq!(parse("/show"), Err(ParseError::Usage("/show <id>")));
        assert_eq!(
            parse("/search --visual"),
            Err(ParseError::Usage("/search [--visual] <query>"))
        );
    }

    #[test]
    fn visual_parses_bbox_and_optional_angle() {
        assert_eq!(
            parse("/visual mem_1 panel.jpg 0.1 0.2 0.3 0.4 front").unwrap(),
            Command::Visual {
                id: "mem_1".into(),
                image_id: "panel.jpg".into(),
                bbox: BoundingBox::new(0.1, 0.2, 0.3, 0.4),
                view_angle: Some("front".into()),
            }
        );
        assert!(matches!(
            parse("/visual mem_1 panel.jpg 0.1 0.2 0.3 0.4"),
            Ok(Command::Visual { view_angle: None, .. })
        ));
        assert_eq!(
            parse("/visual mem_1 panel.jpg 0.1 x 0.3 0.4"),
            Err(ParseError::NotANumber { value: "x".into() })
        );
        assert!(matches!(
            parse("/visual mem_1 panel.jpg 0.1 0.2"),
            Err(ParseError::Usage(_))
        ));
    }

    #[test]
    fn confidence_parses_value() {
        assert_eq!(
            parse("/confidence mem_1 panel.jpg 0.4").unwrap(),
            Command::Confidence {
                id: "mem_1".into(),
                image_id: "panel.jpg".into(),
                value: 0.4,
            }
        );
    }

    #[test]
    fn search_flag_is_optional() {
        assert_eq!(
            parse("/search speaker button").unwrap(),
            Command::Search {
                query: "speaker button".into(),
                require_visual: false,
            }
        );
        assert_eq!(
            parse("/search --visual speaker").unwrap(),
            Command::Search {
                query: "speaker".into(),
                require_visual: true,
            }
        );
    }

    #[test]
    fn bare_commands() {
        assert_eq!(parse("/list").unwrap(), Command::List);
        assert_eq!(parse(" /help ").unwrap(), Command::Help);
        assert_eq!(parse("/exit").unwrap(), Command::Quit);
        assert_eq!(parse("/models").unwrap(), Command::Models { switch_to: None });
        assert_eq!(
            parse("/models qwen2.5").unwrap(),
            Command::Models {
                switch_to: Some("qwen2.5".into())
            }
        );
    }

    #[test]
    fn plain_text_and_unknown_commands_are_rejected() {
        assert_eq!(
            parse("remember this"),
            Err(ParseError::NotACommand("remember this".into()))
        );
        assert_eq!(parse("/fly"), Err(ParseError::Unknown("/fly".into())));
    }

    #[test]
    fn every_usage_line_resolves() {
        for (line, _) in USAGE {
            let command = line.split_whitespace().next().unwrap();
            assert_eq!(usage(command), *line);
        }
    }
}
