use std::collections::BTreeMap;

use chrono::Utc;
use tandem_core::{Site, SiteId};

use crate::cli::SiteCommands;
use crate::commands::common::{
    format_relative_time, normalize_required, resolve_record, short_id, site_to_list_item,
    slugify, CliContext, LocalStores, SiteListItem,
};
use crate::error::CliError;

pub fn run_site(command: SiteCommands, context: &CliContext) -> Result<(), CliError> {
    let stores = context.open_local()?;
    match command {
        SiteCommands::Add { name, local_name } => {
            let site = add_site(&stores, &name, local_name.as_deref())?;
            println!("{}", site.id);
        }
        SiteCommands::List { all, json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&site_items(&stores, all))?);
            } else {
                for line in format_site_lines(&stores, all) {
                    println!("{line}");
                }
            }
        }
        SiteCommands::Rename { id, name } => {
            let site = rename_site(&stores, &id, &name)?;
            println!("{}", site.id);
        }
        SiteCommands::Rm { id } => {
            let site = remove_site(&stores, &id)?;
            println!("{}", site.id);
        }
    }
    Ok(())
}

pub fn add_site(
    stores: &LocalStores,
    name: &str,
    local_name: Option<&str>,
) -> Result<Site, CliError> {
    let name = normalize_required(name, "Site name")?;
    let local_name = match local_name {
        Some(local_name) => normalize_required(local_name, "Local name")?,
        None => normalize_required(&slugify(&name), "Local name")?,
    };

    let site = Site::new(name, local_name, stores.sites.now());
    stores.sites.set(site.clone())?;
    Ok(site)
}

pub fn rename_site(stores: &LocalStores, query: &str, name: &str) -> Result<Site, CliError> {
    let name = normalize_required(name, "Site name")?;
    let site = resolve_record(query, &stores.sites, "site")?;
    if site.name == name {
        return Ok(site);
    }
    Ok(stores.sites.update(&site.id, |site| site.name = name)?)
}

/// Tombstone a site. Its files are removed when the deletion syncs.
pub fn remove_site(stores: &LocalStores, query: &str) -> Result<Site, CliError> {
    let site = resolve_record(query, &stores.sites, "site")?;
    Ok(stores.sites.mark_deleted(&site.id)?)
}

fn sites(stores: &LocalStores, include_deleted: bool) -> Vec<Site> {
    if include_deleted {
        stores.sites.snapshot().into_values().collect()
    } else {
        stores.sites.list()
    }
}

fn file_counts(stores: &LocalStores) -> BTreeMap<SiteId, usize> {
    let mut counts = BTreeMap::new();
    for file in stores.files.list() {
        *counts.entry(file.site_id).or_insert(0) += 1;
    }
    counts
}

pub fn site_items(stores: &LocalStores, include_deleted: bool) -> Vec<SiteListItem> {
    let counts = file_counts(stores);
    sites(stores, include_deleted)
        .iter()
        .map(|site| site_to_list_item(site, counts.get(&site.id).copied().unwrap_or(0)))
        .collect()
}

pub fn format_site_lines(stores: &LocalStores, include_deleted: bool) -> Vec<String> {
    let counts = file_counts(stores);
    let now = Utc::now();
    sites(stores, include_deleted)
        .iter()
        .map(|site| {
            let files = counts.get(&site.id).copied().unwrap_or(0);
            let relative_time = format_relative_time(site.updated_at, now);
            let line = format!(
                "{:<13}  {:<24}  {:<20}  {files:>3} files  {relative_time}",
                short_id(&site.id),
                site.name,
                site.local_name,
            );
            if site.deleted {
                format!("{line}  (pending delete)")
            } else {
                line
            }
        })
        .collect()
}
