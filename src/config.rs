use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::fetcher::{FetchOptions, LinkPolicy};
use crate::parser::Representation;

/// Base name of the optional settings file in the working directory.
pub const CONFIG_FILE: &str = "commit_harvest";
pub const ENV_PREFIX: &str = "HARVEST";

/// Run settings: built-in defaults, then `commit_harvest.toml`, then
/// `HARVEST_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub scheme: String,
    pub host: String,
    pub raw_host: String,
    pub file_suffix: String,
    pub link_policy: LinkPolicy,
    pub representation: Representation,
    /// Inventory field separator; a single character, `\t` or `tab` allowed.
    pub delimiter: String,
    /// Output table field separator.
    pub output_delimiter: String,
    pub timeout_secs: u64,
    pub db_path: PathBuf,
    /// Serve commits from a directory mirror instead of the network.
    pub local_root: Option<PathBuf>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let builder = defaults(Config::builder())?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX));
        Self::build(builder)
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<Self> {
        Self::build(defaults(Config::builder())?)
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")?;
        settings.inventory_delimiter()?;
        settings.table_delimiter()?;
        if settings.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        Ok(settings)
    }

    pub fn inventory_delimiter(&self) -> Result<u8> {
        let d = parse_delimiter(&self.delimiter)?;
        if d == b',' {
            bail!("inventory delimiter must not be a comma");
        }
        Ok(d)
    }

    pub fn table_delimiter(&self) -> Result<u8> {
        parse_delimiter(&self.output_delimiter)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            raw_host: self.raw_host.clone(),
            file_suffix: self.file_suffix.clone(),
            link_policy: self.link_policy,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn defaults(
    builder: ConfigBuilder<config::builder::DefaultState>,
) -> Result<ConfigBuilder<config::builder::DefaultState>> {
    let defaults = FetchOptions::default();
    Ok(builder
        .set_default("scheme", defaults.scheme)?
        .set_default("host", defaults.host)?
        .set_default("raw_host", defaults.raw_host)?
        .set_default("file_suffix", defaults.file_suffix)?
        .set_default("link_policy", "first")?
        .set_default("representation", "source")?
        .set_default("delimiter", "\t")?
        .set_default("output_delimiter", ",")?
        .set_default("timeout_secs", defaults.timeout.as_secs() as i64)?
        .set_default("db_path", "data/harvest.sqlite")?)
}

/// Accepts a single ASCII character, or `\t` / `tab`.
pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "\\t" | "tab" | "\t" => return Ok(b'\t'),
        _ => {}
    }
    let bytes = raw.as_bytes();
    if bytes.len() != 1 || !bytes[0].is_ascii() || bytes[0] == b'\n' || bytes[0] == b'"' {
        bail!("delimiter must be a single ASCII character, got {:?}", raw);
    }
    Ok(bytes[0])
}

// ── Tests ──
