use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tandem_core::{
    ChangeFeed, File, HttpRemoteApi, LocalStore, Site, SqliteKeyValueStore, SyncEngine, Syncable,
    SystemClock, TandemConfig,
};

use crate::error::CliError;

const CONFIG_PATH_ENV: &str = "TANDEM_CONFIG";
const DATABASE_FILE: &str = "tandem.db";
const SHORT_ID_LEN: usize = 13;

/// Effective configuration for one invocation.
pub struct CliContext {
    pub config: TandemConfig,
    pub config_path: PathBuf,
}

impl CliContext {
    pub fn load(
        config_path: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config_path = resolve_config_path(config_path)?;
        let mut config = TandemConfig::load(&config_path)?.with_env_overrides()?;
        if let Some(data_dir) = data_dir {
            config.data_dir = Some(data_dir);
        }
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn data_dir(&self) -> Result<PathBuf, CliError> {
        match &self.config.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf, CliError> {
        Ok(self.data_dir()?.join(DATABASE_FILE))
    }

    /// Open the local stores without any server configuration.
    pub fn open_local(&self) -> Result<LocalStores, CliError> {
        let medium = Arc::new(SqliteKeyValueStore::open(self.database_path()?)?);
        let clock = Arc::new(SystemClock);
        let feed = ChangeFeed::new();
        Ok(LocalStores {
            sites: LocalStore::open(medium.clone(), clock.clone(), feed.clone())?,
            files: LocalStore::open(medium, clock, feed)?,
        })
    }

    /// Open the local database and wire it to the configured server.
    pub fn open_engine(&self) -> Result<SyncEngine, CliError> {
        let Some(base_url) = self.config.api_base_url.as_deref() else {
            return Err(CliError::SyncNotConfigured);
        };
        if self.config.owner_id.is_none() {
            return Err(CliError::SyncNotConfigured);
        }

        let api = HttpRemoteApi::new(base_url)?;
        let medium = Arc::new(SqliteKeyValueStore::open(self.database_path()?)?);
        let engine = SyncEngine::open(
            medium,
            Arc::new(SystemClock),
            api.clone(),
            api,
            self.config.auth(),
            self.config.engine_options()?,
        )?;
        Ok(engine)
    }
}

pub struct LocalStores {
    pub sites: LocalStore<Site>,
    pub files: LocalStore<File>,
}

pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit.or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    dirs::config_dir()
        .map(|dir| dir.join("tandem").join("config.json"))
        .ok_or_else(|| CliError::Config("failed to resolve config directory".to_string()))
}

pub fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("tandem"))
        .ok_or_else(|| CliError::Config("failed to resolve data directory".to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteListItem {
    pub id: String,
    pub name: String,
    pub local_name: String,
    pub updated_at: String,
    pub relative_time: String,
    pub deleted: bool,
    pub file_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListItem {
    pub id: String,
    pub site_id: String,
    pub name: String,
    pub size: usize,
    pub updated_at: String,
    pub relative_time: String,
}

pub fn site_to_list_item(site: &Site, file_count: usize) -> SiteListItem {
    SiteListItem {
        id: site.id.to_string(),
        name: site.name.clone(),
        local_name: site.local_name.clone(),
        updated_at: site.updated_at.to_rfc3339(),
        relative_time: format_relative_time(site.updated_at, Utc::now()),
        deleted: site.deleted,
        file_count,
    }
}

pub fn file_to_list_item(file: &File) -> FileListItem {
    FileListItem {
        id: file.id.to_string(),
        site_id: file.site_id.to_string(),
        name: file.name.clone(),
        size: file.size(),
        updated_at: file.updated_at.to_rfc3339(),
        relative_time: format_relative_time(file.updated_at, Utc::now()),
    }
}

pub fn short_id(id: &impl ToString) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now
        .signed_duration_since(timestamp)
        .num_milliseconds()
        .max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_required(value: &str, field: &'static str) -> Result<String, CliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyValue(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Derive an address-like name: lowercase ASCII alphanumerics joined by `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Find a live record by exact id or unique id prefix.
pub fn resolve_record<T: Syncable>(
    query: &str,
    store: &LocalStore<T>,
    label: &'static str,
) -> Result<T, CliError> {
    let query = normalize_required(query, "ID")?;

    if let Ok(id) = query.parse::<T::Id>() {
        if let Some(item) = store.by_id(&id).filter(|item| !item.is_deleted()) {
            return Ok(item);
        }
    }

    let mut matches = store
        .list()
        .into_iter()
        .filter(|item| item.id().to_string().starts_with(&query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::NotFound(label, query)),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|item| short_id(item.id()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Content from the flag, piped stdin, or an editor, in that order.
pub fn resolve_content(explicit: Option<String>) -> Result<String, CliError> {
    if let Some(content) = explicit {
        return Ok(content);
    }
    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }
    capture_editor_input_with_initial("")
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(Some(buffer))
}

pub fn capture_editor_input_with_initial(initial_content: &str) -> Result<String, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(content)
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        ))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Command::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("tandem-file-{}-{now}", std::process::id()))
}
