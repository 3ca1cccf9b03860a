use chrono::Utc;
use tandem_core::File;

use crate::cli::FileCommands;
use crate::commands::common::{
    capture_editor_input_with_initial, file_to_list_item, format_relative_time,
    normalize_required, resolve_content, resolve_record, short_id, CliContext, FileListItem,
    LocalStores,
};
use crate::error::CliError;

pub fn run_file(command: FileCommands, context: &CliContext) -> Result<(), CliError> {
    let stores = context.open_local()?;
    match command {
        FileCommands::Add {
            site,
            name,
            content,
        } => {
            let content = resolve_content(content)?;
            let file = add_file(&stores, &site, &name, content)?;
            println!("{}", file.id);
        }
        FileCommands::List { site, json } => {
            let files = list_files(&stores, site.as_deref())?;
            if json {
                let items = files.iter().map(file_to_list_item).collect::<Vec<FileListItem>>();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for line in format_file_lines(&files) {
                    println!("{line}");
                }
            }
        }
        FileCommands::Edit { id, content } => {
            let file = resolve_record(&id, &stores.files, "file")?;
            let content = match content {
                Some(content) => content,
                None => capture_editor_input_with_initial(&file.content)?,
            };
            let file = edit_file(&stores, &file.id.to_string(), content)?;
            println!("{}", file.id);
        }
        FileCommands::Rm { id } => {
            let file = remove_file(&stores, &id)?;
            println!("{}", file.id);
        }
    }
    Ok(())
}

pub fn add_file(
    stores: &LocalStores,
    site_query: &str,
    name: &str,
    content: String,
) -> Result<File, CliError> {
    let site = resolve_record(site_query, &stores.sites, "site")?;
    let name = normalize_required(name, "File name")?;

    let file = File::new(site.id, name, content, stores.files.now());
    stores.files.set(file.clone())?;
    Ok(file)
}

pub fn list_files(stores: &LocalStores, site_query: Option<&str>) -> Result<Vec<File>, CliError> {
    let site_id = match site_query {
        Some(query) => Some(resolve_record(query, &stores.sites, "site")?.id),
        None => None,
    };
    Ok(stores
        .files
        .list()
        .into_iter()
        .filter(|file| site_id.is_none_or(|id| file.site_id == id))
        .collect())
}

/// Replace a file's content. Identical content is rejected so the file is
/// not re-stamped and re-uploaded for nothing.
pub fn edit_file(stores: &LocalStores, query: &str, content: String) -> Result<File, CliError> {
    let file = resolve_record(query, &stores.files, "file")?;
    if file.content == content {
        return Err(CliError::Unchanged);
    }
    Ok(stores.files.update(&file.id, |file| file.content = content)?)
}

pub fn remove_file(stores: &LocalStores, query: &str) -> Result<File, CliError> {
    let file = resolve_record(query, &stores.files, "file")?;
    Ok(stores.files.mark_deleted(&file.id)?)
}

pub fn format_file_lines(files: &[File]) -> Vec<String> {
    let now = Utc::now();
    files
        .iter()
        .map(|file| {
            format!(
                "{:<13}  {:<13}  {:<28}  {:>8} B  {}",
                short_id(&file.id),
                short_id(&file.site_id),
                file.name,
                file.size(),
                format_relative_time(file.updated_at, now)
            )
        })
        .collect()
}
