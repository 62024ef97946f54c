//! Shared helpers for command handlers.

use std::path::Path;

use serde_json::{Map, Value as Json};

use buildmart_core::{EntityId, FileHandle, Payload, Value};

use crate::cli::PayloadArgs;
use crate::error::CliError;

/// Field that `--file PATH` without a field name is added to.
const DEFAULT_FILE_FIELD: &str = "images";

/// Parse a server-assigned id. Optimistic `tmp-` ids only exist in memory.
pub fn parse_id(raw: &str) -> Result<EntityId, CliError> {
    match raw.parse::<EntityId>() {
        Ok(id @ EntityId::Server(_)) => Ok(id),
        Ok(EntityId::Temporary(_)) | Err(_) => Err(CliError::Validation {
            field: "id".into(),
            reason: format!("expected a numeric id, got '{raw}'"),
        }),
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Read a JSON object from a `--from-file` path.
pub fn read_json_file(path: &Path) -> Result<Map<String, Json>, CliError> {
    let contents = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Json>(&contents)? {
        Json::Object(map) => Ok(map),
        other => Err(CliError::Validation {
            field: "from-file".into(),
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

/// Apply `KEY=VALUE` pairs onto `target`.
///
/// Dotted keys nest (`dimensions.width=20`). Values parse as JSON when they
/// can (`12`, `true`, `[1,2]`), otherwise they are taken as text.
pub fn apply_fields(target: &mut Map<String, Json>, pairs: &[String]) -> Result<(), CliError> {
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| CliError::Validation {
            field: "field".into(),
            reason: format!("expected KEY=VALUE, got '{pair}'"),
        })?;
        if key.is_empty() || key.split('.').any(str::is_empty) {
            return Err(CliError::Validation {
                field: "field".into(),
                reason: format!("invalid key '{key}'"),
            });
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_owned()));
        insert_path(target, key, value);
    }
    Ok(())
}

fn insert_path(target: &mut Map<String, Json>, key: &str, value: Json) {
    match key.split_once('.') {
        None => {
            target.insert(key.to_owned(), value);
        }
        Some((head, rest)) => {
            let slot = target
                .entry(head.to_owned())
                .or_insert_with(|| Json::Object(Map::new()));
            if !slot.is_object() {
                *slot = Json::Object(Map::new());
            }
            if let Json::Object(inner) = slot {
                insert_path(inner, rest, value);
            }
        }
    }
}

/// Read `[FIELD=]PATH` attachments into `payload`. Named fields hold one
/// file, or a list when repeated; unnamed files go to the `images` list.
pub fn attach_files(payload: &mut Payload, specs: &[String]) -> Result<(), CliError> {
    for spec in specs {
        let (field, path) = split_file_spec(spec);
        let file = FileHandle::from_path(Path::new(path)).map_err(|e| CliError::Validation {
            field: "file".into(),
            reason: format!("cannot read '{path}': {e}"),
        })?;

        let slot = payload
            .entry(field.unwrap_or(DEFAULT_FILE_FIELD).to_owned())
            .or_insert_with(|| {
                if field.is_none() {
                    Value::List(Vec::new())
                } else {
                    Value::Null
                }
            });
        if let Value::List(items) = slot {
            items.push(Value::File(file));
        } else if slot.is_null() {
            *slot = Value::File(file);
        } else {
            let first = std::mem::replace(slot, Value::Null);
            *slot = Value::List(vec![first, Value::File(file)]);
        }
    }
    Ok(())
}

/// `photo=./a.png` names a field; a bare path (even one containing `=`
/// after a separator) does not.
fn split_file_spec(spec: &str) -> (Option<&str>, &str) {
    match spec.split_once('=') {
        Some((field, path))
            if !field.is_empty()
                && field
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '[' | ']')) =>
        {
            (Some(field), path)
        }
        _ => (None, spec),
    }
}

/// Assemble a request payload: `--from-file`, then `--field` overrides,
/// then `--file` attachments.
pub fn build_payload(args: &PayloadArgs) -> Result<Payload, CliError> {
    let mut fields = match args.from_file {
        Some(ref path) => read_json_file(path)?,
        None => Map::new(),
    };
    apply_fields(&mut fields, &args.fields)?;

    let mut payload: Payload = fields
        .into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect();
    attach_files(&mut payload, &args.files)?;

    if payload.is_empty() {
        return Err(CliError::Validation {
            field: "payload".into(),
            reason: "nothing to send; pass --field, --from-file or --file".into(),
        });
    }
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_must_be_server_ids() {
        assert_eq!(parse_id("42").unwrap(), EntityId::Server(42));
        assert!(parse_id("tmp-3").is_err());
        assert!(parse_id("abc").is_err());
    }

    #[test]
    fn fields_nest_and_parse_json() {
        let mut map = Map::new();
        apply_fields(
            &mut map,
            &[
                "name=Red brick".into(),
                "price=12.5".into(),
                "dimensions.width=20".into(),
                "dimensions.unit=cm".into(),
                "tags=[\"clay\"]".into(),
            ],
        )
        .unwrap();

        assert_eq!(
            Json::Object(map),
            json!({
                "name": "Red brick",
                "price": 12.5,
                "dimensions": { "width": 20, "unit": "cm" },
                "tags": ["clay"]
            })
        );
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let mut map = Map::new();
        assert!(apply_fields(&mut map, &["name".into()]).is_err());
        assert!(apply_fields(&mut map, &["a..b=1".into()]).is_err());
    }

    #[test]
    fn file_specs() {
        assert_eq!(split_file_spec("photo=./a.png"), (Some("photo"), "./a.png"));
        assert_eq!(split_file_spec("./dir/x=1.png"), (None, "./dir/x=1.png"));
        assert_eq!(split_file_spec("plain.png"), (None, "plain.png"));
    }

    #[test]
    fn unnamed_files_go_to_the_images_list() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.pdf");
        std::fs::write(&a, b"png").unwrap();
        std::fs::write(&b, b"pdf").unwrap();

        let mut payload = Payload::new();
        attach_files(
            &mut payload,
            &[a.display().to_string(), format!("manual={}", b.display())],
        )
        .unwrap();

        match &payload["images"] {
            Value::List(items) => assert_eq!(items.len(), 1),
            other => panic!("expected list, got {other:?}"),
        }
        match &payload["manual"] {
            Value::File(file) => assert_eq!(file.content_type, "application/pdf"),
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn empty_payload_is_an_error() {
        let args = PayloadArgs {
            fields: vec![],
            from_file: None,
            files: vec![],
        };
        assert!(build_payload(&args).is_err());
    }
}
