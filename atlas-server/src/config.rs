use std::{fs, ops::RangeInclusive};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "server")]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    #[clap(long)]
    #[arg(short = 'c')]
    #[serde(default)]
    pub config: Option<String>,
    /// MySQL/MariaDB URL; without one users and refresh tokens live in
    /// memory.
    #[clap(long, env)]
    #[serde(default)]
    pub database_url: Option<String>,
    #[clap(long, env)]
    #[arg(default_value_t = 50)]
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[clap(long, env)]
    #[arg(default_value_t = 5)]
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    #[clap(long, env)]
    #[arg(default_value_t = false)]
    #[serde(default)]
    pub run_migrations: bool,
    /// Seconds to keep retrying while the database is not reachable yet.
    #[clap(long, env)]
    #[arg(default_value_t = 60)]
    #[serde(default = "default_db_wait_seconds")]
    pub db_wait_seconds: u64,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("server=info,atlas_server=info,atlas_auth=info"))]
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    #[clap(long, env)]
    #[arg(value_parser = port_in_range,short = 'p', default_value_t = 8000)]
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated origins allowed to call the API with credentials.
    #[clap(long, env = "ALLOW_ORIGINS", value_delimiter = ',')]
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[clap(long, env = "JWT_ISSUER")]
    #[arg(default_value_t = String::from("buildaxis-auth"))]
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[clap(long, env = "JWT_AUDIENCE")]
    #[arg(default_value_t = String::from("atlas-ai"))]
    #[serde(default = "default_audience")]
    pub audience: String,
    #[clap(long, env = "ACCESS_TOKEN_EXPIRE_MINUTES")]
    #[arg(default_value_t = 15)]
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,
    #[clap(long, env = "REFRESH_TOKEN_EXPIRE_DAYS")]
    #[arg(default_value_t = 30)]
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("keys"))]
    #[serde(default = "default_key_dir")]
    pub key_dir: String,
    /// Retire the current signing key and start with a fresh one.
    #[clap(long)]
    #[arg(default_value_t = false)]
    #[serde(default)]
    pub rotate_signing_key: bool,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("admin"))]
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
    #[clap(long, env, hide_env_values = true)]
    #[arg(default_value_t = String::from("adminpass"))]
    #[serde(default = "default_admin_pass")]
    pub admin_pass: String,
    /// Seconds relying parties may cache the published key set.
    #[clap(long, env)]
    #[arg(default_value_t = 300)]
    #[serde(default = "default_jwks_max_age")]
    pub jwks_max_age: u64,
}

fn default_rust_log() -> String {
    String::from("server=info,atlas_server=info,atlas_auth=info")
}

fn default_port() -> u16 {
    8000
}

fn default_max_size() -> u32 {
    50
}

fn default_db_wait_seconds() -> u64 {
    60
}

fn default_min_idle() -> u32 {
    5
}

fn default_issuer() -> String {
    String::from("buildaxis-auth")
}

fn default_audience() -> String {
    String::from("atlas-ai")
}

fn default_access_token_minutes() -> i64 {
    15
}

fn default_refresh_token_days() -> i64 {
    30
}

fn default_key_dir() -> String {
    String::from("keys")
}

fn default_admin_user() -> String {
    String::from("admin")
}

fn default_admin_pass() -> String {
    String::from("adminpass")
}

fn default_jwks_max_age() -> u64 {
    300
}

const PORT_RANGE: RangeInclusive<usize> = 1..=65535;

fn port_in_range(s: &str) -> Result<u16, String> {
    let port: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a port number"))?;
    if PORT_RANGE.contains(&port) {
        Ok(port as u16)
    } else {
        Err(format!(
            "port not in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ))
    }
}

pub fn load(cfg: &str) -> Result<AppConfig> {
    let content =
        fs::read_to_string(cfg).context("could not read config file")?;
    toml::from_str(&content).context("could not parse config file")
}
