//! Product command handlers.

use serde_json::Value as Json;
use tabled::Tabled;

use buildmart_core::{
    ClientConfig, EntityId, EntityStore, Endpoints, FileHandle, Filters, MediaRecord, Method,
    Record,
};

use crate::cli::{GlobalOpts, ListArgs, OutputFormat, ProductsArgs, ProductsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ProductRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Media")]
    media: usize,
}

impl From<&Record> for ProductRow {
    fn from(r: &Record) -> Self {
        Self {
            id: r.id.to_string(),
            name: r.display_name(),
            price: scalar(r.field("price")),
            status: scalar(r.field("status").or_else(|| r.field("is_active"))),
            media: r.media("images").len(),
        }
    }
}

#[derive(Tabled)]
struct MediaRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Collection")]
    collection: String,
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "URL")]
    url: String,
}

impl From<&MediaRecord> for MediaRow {
    fn from(m: &MediaRecord) -> Self {
        Self {
            id: m.id,
            collection: m.collection_name.clone().unwrap_or_default(),
            file: m.file_name.clone().unwrap_or_default(),
            url: m.url.clone().unwrap_or_default(),
        }
    }
}

/// Short text for a JSON scalar; `-` when absent or null.
fn scalar(value: Option<&Json>) -> String {
    match value {
        None | Some(Json::Null) => "-".into(),
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn detail(r: &Record) -> String {
    let mut lines = vec![format!("{:<14}{}", "ID:", r.id)];
    for (key, value) in &r.fields {
        let shown = match value {
            Json::Array(items) if items.iter().all(Json::is_object) => {
                format!("{} item(s)", items.len())
            }
            Json::Object(_) | Json::Array(_) => value.to_string(),
            other => scalar(Some(other)),
        };
        lines.push(format!("{:<14}{shown}", format!("{key}:")));
    }
    lines.join("\n")
}

// ── Helpers ─────────────────────────────────────────────────────────

/// The store records failures instead of returning them; surface the
/// message it kept.
fn store_error(store: &EntityStore, action: &str) -> CliError {
    store.snapshot().error.clone().map_or_else(
        || CliError::api(format!("{action} failed")),
        CliError::api,
    )
}

fn list_filters(args: &ListArgs) -> Result<Filters, CliError> {
    let mut filters = Filters::new().with("page", args.page);
    if let Some(per_page) = args.per_page {
        filters.insert("per_page", per_page);
    }
    if let Some(ref search) = args.search {
        filters.insert("search", search.clone());
    }
    for pair in &args.filters {
        let (key, raw) = pair.split_once('=').ok_or_else(|| CliError::Validation {
            field: "filter".into(),
            reason: format!("expected KEY=VALUE, got '{pair}'"),
        })?;
        let value: Json =
            serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_owned()));
        filters.insert(key, value);
    }
    Ok(filters)
}

fn print_record(record: &Record, global: &GlobalOpts) {
    let out = output::render_single(&global.output, record, detail, |r| r.id.to_string());
    output::print_output(&out, global.quiet);
}

/// Load a product into the store so it can be updated.
async fn fetch_into(store: &EntityStore, id: EntityId) -> Result<(), CliError> {
    let record = store
        .get(id)
        .await
        .ok_or_else(|| store_error(store, "fetch"))?;
    store.insert(record);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub async fn handle(
    client: &ClientConfig,
    args: ProductsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let patch = matches!(args.command, ProductsCommand::Update { patch: true, .. });
    let endpoints = if patch {
        Endpoints::products().with_update_method(Method::PATCH)
    } else {
        Endpoints::products()
    };
    let store = EntityStore::new(client.connect()?, endpoints, client.store_config());

    match args.command {
        ProductsCommand::List(list) => {
            store.list(Some(list_filters(&list)?)).await;
            let state = store.snapshot();
            if state.error.is_some() {
                return Err(store_error(&store, "list"));
            }

            let out = output::render_list(
                &global.output,
                &state.items,
                |r| ProductRow::from(r),
                |r| r.id.to_string(),
            );
            output::print_output(&out, global.quiet);

            if matches!(global.output, OutputFormat::Table) && !global.quiet {
                let p = state.pagination;
                eprintln!(
                    "Page {} of {} ({} product(s))",
                    p.current_page, p.total_pages, p.total_items
                );
            }
            Ok(())
        }

        ProductsCommand::Get { id } => {
            let id = util::parse_id(&id)?;
            let record = store
                .get(id)
                .await
                .ok_or_else(|| store_error(&store, "fetch"))?;
            print_record(&record, global);
            Ok(())
        }

        ProductsCommand::Create(payload) => {
            let data = util::build_payload(&payload)?;
            let record = store
                .create(data)
                .await
                .ok_or_else(|| store_error(&store, "create"))?;
            output::success(
                &format!("Product {} created", record.id),
                &global.color,
                global.quiet,
            );
            print_record(&record, global);
            Ok(())
        }

        ProductsCommand::Update { id, payload, .. } => {
            let id = util::parse_id(&id)?;
            let data = util::build_payload(&payload)?;
            fetch_into(&store, id).await?;
            let record = store
                .update(id, data)
                .await
                .ok_or_else(|| store_error(&store, "update"))?;
            output::success(
                &format!("Product {} updated", record.id),
                &global.color,
                global.quiet,
            );
            print_record(&record, global);
            Ok(())
        }

        ProductsCommand::Delete { id } => {
            let id = util::parse_id(&id)?;
            if !util::confirm(&format!("Delete product {id}?"), global.yes)? {
                return Ok(());
            }
            if !store.delete(id).await {
                return Err(store_error(&store, "delete"));
            }
            output::success(&format!("Product {id} deleted"), &global.color, global.quiet);
            Ok(())
        }

        ProductsCommand::Upload {
            id,
            files,
            collection,
        } => {
            let id = util::parse_id(&id)?;
            let handles = files
                .iter()
                .map(|path| {
                    FileHandle::from_path(path).map_err(|e| CliError::Validation {
                        field: "file".into(),
                        reason: format!("cannot read '{}': {e}", path.display()),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let media = store
                .upload_files(id, handles, collection.as_deref())
                .await
                .ok_or_else(|| store_error(&store, "upload"))?;
            output::success(
                &format!("{} file(s) uploaded to product {id}", media.len()),
                &global.color,
                global.quiet,
            );
            let out =
                output::render_list(&global.output, &media, |m| MediaRow::from(m), |m| m.id.to_string());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProductsCommand::DeleteMedia { id, media_id } => {
            let id = util::parse_id(&id)?;
            if !util::confirm(
                &format!("Delete media {media_id} from product {id}?"),
                global.yes,
            )? {
                return Ok(());
            }
            if !store.delete_media(id, media_id).await {
                return Err(store_error(&store, "delete media"));
            }
            output::success(
                &format!("Media {media_id} removed from product {id}"),
                &global.color,
                global.quiet,
            );
            Ok(())
        }
    }
}
