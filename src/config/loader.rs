use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::env::{Env, parse_bool};
use super::schema::{ConfigFile, EnvironmentProfile, OutputFormat, Settings};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub cli: CliOverrides,
    pub cwd: PathBuf,
    pub home_dir: Option<PathBuf>,
    pub xdg_config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    /// Keyed by upper-cased environment name.
    pub environments: BTreeMap<String, ConnectionSettings>,
    pub settings: SettingsResolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub encrypt: bool,
    pub trust_cert: bool,
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 1433,
            database: "master".to_string(),
            user: None,
            password: None,
            encrypt: true,
            trust_cert: true,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsResolved {
    pub output: OutputSettingsResolved,
    pub audit: AuditSettingsResolved,
    pub archive: ArchiveSettingsResolved,
    pub reuse_connections: bool,
    pub max_script_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct OutputSettingsResolved {
    pub default_format: OutputFormat,
    pub json_pretty: bool,
}

#[derive(Debug, Clone)]
pub struct AuditSettingsResolved {
    pub log_path: PathBuf,
    pub database: bool,
}

#[derive(Debug, Clone)]
pub struct ArchiveSettingsResolved {
    pub enabled: bool,
    pub repo_dir: PathBuf,
    pub scripts_dir: String,
}

impl Default for SettingsResolved {
    fn default() -> Self {
        Self {
            output: OutputSettingsResolved {
                default_format: OutputFormat::Pretty,
                json_pretty: true,
            },
            audit: AuditSettingsResolved {
                log_path: PathBuf::from("logs").join("audit.log"),
                database: true,
            },
            archive: ArchiveSettingsResolved {
                enabled: true,
                repo_dir: PathBuf::from("."),
                scripts_dir: "scripts".to_string(),
            },
            reuse_connections: true,
            max_script_bytes: 10 * 1024 * 1024,
        }
    }
}

pub fn normalize_env_key(key: &str) -> String {
    key.trim().to_uppercase()
}

pub fn load_config(options: &LoadOptions, env: &Env) -> Result<ResolvedConfig> {
    let config_path = resolve_config_path(options, env)?;
    let config_file = match &config_path {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let mut settings = SettingsResolved::default();
    if let Some(settings_cfg) = &config_file.settings {
        apply_settings(&mut settings, settings_cfg);
    }
    apply_env_settings(&mut settings, env);

    let mut environments = BTreeMap::new();
    for (name, profile) in &config_file.environments {
        let mut connection = ConnectionSettings::default();
        apply_profile(&mut connection, profile, env)
            .with_context(|| format!("Invalid environment '{name}'"))?;
        environments.insert(normalize_env_key(name), connection);
    }
    if let Some(extra) = env.get("DDLPLAN_ENVIRONMENTS") {
        for name in extra.split(',').map(normalize_env_key).filter(|n| !n.is_empty()) {
            environments.entry(name).or_default();
        }
    }
    for (name, connection) in environments.iter_mut() {
        apply_env_overrides(connection, name, env);
    }

    Ok(ResolvedConfig {
        config_path,
        environments,
        settings,
    })
}

const CONFIG_NAMES: [&str; 3] = ["config.yaml", "config.yml", "config.json"];

/// `--config`, then `DDLPLAN_CONFIG`, then `.ddlplan/` in the cwd or any
/// parent up to home, then the per-user config dir.
fn resolve_config_path(options: &LoadOptions, env: &Env) -> Result<Option<PathBuf>> {
    let explicit = options
        .cli
        .config_path
        .clone()
        .or_else(|| env.get("DDLPLAN_CONFIG").map(PathBuf::from));
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(anyhow!("Config file not found: {}", path.display()));
        }
        return Ok(Some(path));
    }

    let home = options.home_dir.as_deref();
    for dir in options.cwd.ancestors() {
        if let Some(path) = first_config_in(&dir.join(".ddlplan")) {
            return Ok(Some(path));
        }
        if Some(dir) == home {
            break;
        }
    }
    Ok(options
        .xdg_config_dir
        .as_deref()
        .and_then(|base| first_config_in(&base.join("ddlplan"))))
}

fn first_config_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")
        }
        Some("json") => serde_json::from_str(&content).context("Failed to parse JSON config"),
        _ => Err(anyhow!("Unsupported config file extension")),
    }
}

fn apply_profile(connection: &mut ConnectionSettings, profile: &EnvironmentProfile, env: &Env) -> Result<()> {
    if let Some(url) = &profile.url {
        apply_url(connection, &parse_connection_url(url)?);
    }
    if let Some(server) = &profile.server {
        apply_server(connection, server);
    }
    if let Some(port) = profile.port {
        connection.port = port;
    }
    if let Some(database) = &profile.database {
        connection.database = database.clone();
    }
    if let Some(user) = &profile.user {
        connection.user = Some(user.clone());
    }
    if let Some(password) = &profile.password {
        connection.password = Some(password.clone());
    } else if let Some(env_key) = &profile.password_env {
        if let Some(value) = env.get(env_key) {
            connection.password = Some(value);
        }
    }
    if let Some(encrypt) = profile.encrypt {
        connection.encrypt = encrypt;
    }
    if let Some(trust_cert) = profile.trust_cert {
        connection.trust_cert = trust_cert;
    }
    if let Some(timeout) = profile.timeout {
        connection.timeout_ms = timeout;
    }
    Ok(())
}

/// Accepts `host`, `host:port` and `host,port`.
fn apply_server(connection: &mut ConnectionSettings, server: &str) {
    let server = server.trim();
    let split = server.rsplit_once(':').or_else(|| server.rsplit_once(','));
    match split {
        Some((host, port)) if !host.is_empty() => match port.trim().parse::<u16>() {
            Ok(port) => {
                connection.server = host.to_string();
                connection.port = port;
            }
            Err(_) => connection.server = server.to_string(),
        },
        _ => connection.server = server.to_string(),
    }
}

fn apply_url(connection: &mut ConnectionSettings, parsed: &ParsedUrl) {
    if let Some(server) = &parsed.server {
        connection.server = server.clone();
    }
    if let Some(port) = parsed.port {
        connection.port = port;
    }
    if let Some(database) = &parsed.database {
        connection.database = database.clone();
    }
    if let Some(user) = &parsed.user {
        connection.user = Some(user.clone());
    }
    if let Some(password) = &parsed.password {
        connection.password = Some(password.clone());
    }
}

fn apply_settings(settings: &mut SettingsResolved, overrides: &Settings) {
    if let Some(output) = &overrides.output {
        if let Some(default_format) = output.default_format {
            settings.output.default_format = default_format;
        }
        if let Some(pretty) = output.json.as_ref().and_then(|json| json.pretty) {
            settings.output.json_pretty = pretty;
        }
    }
    if let Some(audit) = &overrides.audit {
        if let Some(log_path) = &audit.log_path {
            settings.audit.log_path = log_path.clone();
        }
        if let Some(database) = audit.database {
            settings.audit.database = database;
        }
    }
    if let Some(archive) = &overrides.archive {
        if let Some(enabled) = archive.enabled {
            settings.archive.enabled = enabled;
        }
        if let Some(repo_dir) = &archive.repo_dir {
            settings.archive.repo_dir = repo_dir.clone();
        }
        if let Some(scripts_dir) = &archive.scripts_dir {
            settings.archive.scripts_dir = scripts_dir.clone();
        }
    }
    if let Some(reuse) = overrides.pool.as_ref().and_then(|pool| pool.reuse_connections) {
        settings.reuse_connections = reuse;
    }
    if let Some(max) = overrides.max_script_bytes {
        settings.max_script_bytes = max;
    }
}

fn apply_env_settings(settings: &mut SettingsResolved, env: &Env) {
    if let Some(path) = env.get("DDLPLAN_AUDIT_LOG") {
        settings.audit.log_path = PathBuf::from(path);
    }
    if let Some(database) = env.get("DDLPLAN_AUDIT_DB").and_then(|v| parse_bool(&v)) {
        settings.audit.database = database;
    }
    if let Some(enabled) = env.get("DDLPLAN_ARCHIVE").and_then(|v| parse_bool(&v)) {
        settings.archive.enabled = enabled;
    }
    if let Some(dir) = env.get("DDLPLAN_ARCHIVE_DIR") {
        settings.archive.repo_dir = PathBuf::from(dir);
    }
    if let Some(dir) = env.get("DDLPLAN_SCRIPTS_DIR") {
        settings.archive.scripts_dir = dir;
    }
}

fn apply_env_overrides(connection: &mut ConnectionSettings, name: &str, env: &Env) {
    if let Some(url) = env.environment_var(name, "URL") {
        if let Ok(parsed) = parse_connection_url(&url) {
            apply_url(connection, &parsed);
        }
    }
    if let Some(server) = env.environment_var(name, "SERVER") {
        apply_server(connection, &server);
    }
    if let Some(port) = env
        .environment_var(name, "PORT")
        .and_then(|p| p.parse::<u16>().ok())
    {
        connection.port = port;
    }
    if let Some(database) = env.environment_var(name, "DATABASE") {
        connection.database = database;
    }
    if let Some(user) = env.environment_var(name, "USER") {
        connection.user = Some(user);
    }
    if let Some(password) = env.environment_var(name, "PASSWORD") {
        connection.password = Some(password);
    }
    if let Some(encrypt) = env
        .environment_var(name, "ENCRYPT")
        .and_then(|v| parse_bool(&v))
    {
        connection.encrypt = encrypt;
    }
    if let Some(trust_cert) = env
        .environment_var(name, "TRUST_CERT")
        .and_then(|v| parse_bool(&v))
    {
        connection.trust_cert = trust_cert;
    }
    if let Some(timeout) = env
        .environment_var(name, "TIMEOUT")
        .and_then(|t| t.parse::<u64>().ok())
    {
        connection.timeout_ms = timeout;
    }
}

#[derive(Debug, Default)]
struct ParsedUrl {
    server: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

fn parse_connection_url(input: &str) -> Result<ParsedUrl> {
    let mut remaining = input.trim();
    if let Some(idx) = remaining.find("://") {
        remaining = &remaining[idx + 3..];
    }

    let (auth_part, host_part) = match remaining.rfind('@') {
        Some(idx) => (Some(&remaining[..idx]), &remaining[idx + 1..]),
        None => (None, remaining),
    };
    let (host_port, path_part) = match host_part.split_once('/') {
        Some((host_port, path)) => (host_port, Some(path)),
        None => (host_part, None),
    };

    let mut parsed = ParsedUrl::default();

    if let Some(auth) = auth_part {
        let (user, pass) = auth.split_once(':').unwrap_or((auth, ""));
        if !user.is_empty() {
            parsed.user = Some(user.to_string());
        }
        if !pass.is_empty() {
            parsed.password = Some(pass.to_string());
        }
    }

    if !host_port.is_empty() {
        let (host, port) = host_port.split_once(':').unwrap_or((host_port, ""));
        if !host.is_empty() {
            parsed.server = Some(host.to_string());
        }
        parsed.port = port.parse::<u16>().ok();
    }

    if let Some(path) = path_part {
        let db = path.split('?').next().unwrap_or("");
        if !db.is_empty() {
            parsed.database = Some(db.to_string());
        }
    }

    if parsed.server.is_none() && parsed.database.is_none() && parsed.user.is_none() {
        return Err(anyhow!("Invalid connection URL"));
    }

    Ok(parsed)
}
