//! Batch preparation: entry lists and per-engine config copies

use crate::proxy::models::{BatchInput, ConfigurationRecord};
use crate::Result;
use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// First assigned port is `DEFAULT_BASE_PORT + 1`
pub const DEFAULT_BASE_PORT: u16 = 1000;

/// Attempts at finding an unused file name before giving up
const MAX_NAME_ATTEMPTS: usize = 16;

/// `[identifier] path`, separated by whitespace
static ENTRY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(\S+)\s+)?(\S+)$").expect("Invalid entry regex"));

/// One line of an entry list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub identifier: String,
    pub config: PathBuf,
}

/// Parser for entry list files
pub struct EntryParser;

impl EntryParser {
    /// Parse a single entry line
    ///
    /// Supports formats:
    /// - PATH
    /// - IDENTIFIER PATH
    pub fn parse_line(line: &str) -> Option<Entry> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let caps = ENTRY_REGEX.captures(line)?;
        let config = caps.get(2)?.as_str();
        let identifier = caps.get(1).map_or(config, |m| m.as_str());

        Some(Entry {
            identifier: identifier.to_string(),
            config: PathBuf::from(config),
        })
    }

    /// Parse entries from a string (one per line)
    pub fn parse_string(content: &str) -> Vec<Entry> {
        content.lines().filter_map(Self::parse_line).collect()
    }

    /// Parse entries from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<Entry>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading entry list {}", path.display()))?;
        Ok(Self::parse_string(&content))
    }
}

/// Writes one engine config per entry with a unique inbound port
pub struct BatchPreparer {
    out_dir: PathBuf,
    next_port: u16,
}

impl BatchPreparer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            next_port: DEFAULT_BASE_PORT,
        }
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.next_port = base_port;
        self
    }

    /// Prepare every entry, skipping the ones whose config is unusable
    pub fn prepare(&mut self, entries: &[Entry]) -> Result<BatchInput> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("creating {}", self.out_dir.display()))?;

        let mut configs = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.prepare_entry(entry) {
                Ok(record) => configs.push(record),
                Err(e) => warn!(
                    url = %entry.identifier,
                    config = %entry.config.display(),
                    error = %e,
                    "error generating engine config"
                ),
            }
        }

        Ok(BatchInput { configs })
    }

    /// Copy one config with a freshly assigned port
    pub fn prepare_entry(&mut self, entry: &Entry) -> Result<ConfigurationRecord> {
        let content = fs::read_to_string(&entry.config)
            .with_context(|| format!("reading {}", entry.config.display()))?;
        let mut raw: Value = serde_json::from_str(&content)?;

        let port = self
            .next_port
            .checked_add(1)
            .ok_or_else(|| anyhow!("ran out of ports"))?;
        set_inbound_port(&mut raw, port)?;
        self.next_port = port;

        let (path, mut file) = create_unique(&self.out_dir, random_name)?;
        file.write_all(serde_json::to_string_pretty(&raw)?.as_bytes())?;
        let path = fs::canonicalize(&path)?;

        debug!(port, config = %path.display(), "prepared engine config");
        Ok(ConfigurationRecord::new(entry.identifier.clone(), path, port))
    }
}

/// Set `inbounds[0].port` in an engine config
pub fn set_inbound_port(raw: &mut Value, port: u16) -> Result<()> {
    let inbound = raw
        .get_mut("inbounds")
        .and_then(|inbounds| inbounds.get_mut(0))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| anyhow!("config has no inbounds[0]"))?;
    inbound.insert("port".to_string(), Value::from(port));
    Ok(())
}

fn random_name() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Create `<name>.json` in `dir` without ever reusing an existing file
fn create_unique(dir: &Path, mut next_name: impl FnMut() -> String) -> Result<(PathBuf, File)> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(format!("{}.json", next_name()));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "config name taken, retrying");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("creating {}", path.display()));
            }
        }
    }
    Err(anyhow!("no unused config name in {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINE_CONFIG: &str = r#"{
        "inbounds": [{"listen": "127.0.0.1", "port": 10808, "protocol": "http"}],
        "outbounds": [{"protocol": "vless"}]
    }"#;

    #[test]
    fn test_parse_path_only() {
        let entry = EntryParser::parse_line("/configs/a.json").unwrap();
        assert_eq!(entry.identifier, "/configs/a.json");
        assert_eq!(entry.config, PathBuf::from("/configs/a.json"));
    }

    #[test]
    fn test_parse_identifier_and_path() {
        let line = "vless://uuid@host:443?type=ws#name   /configs/a.json";
        let entry = EntryParser::parse_line(line).unwrap();
        assert_eq!(entry.identifier, "vless://uuid@host:443?type=ws#name");
        assert_eq!(entry.config, PathBuf::from("/configs/a.json"));
    }

    #[test]
    fn test_parse_skips_comments_and_garbage() {
        assert!(EntryParser::parse_line("").is_none());
        assert!(EntryParser::parse_line("   # comment").is_none());
        assert!(EntryParser::parse_line("too many parts here").is_none());
    }

    #[test]
    fn test_parse_string() {
        let content = r#"
# generated list
vmess://one /tmp/1.json
/tmp/2.json
"#;
        let entries = EntryParser::parse_string(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identifier, "vmess://one");
    }

    #[test]
    fn test_set_inbound_port() {
        let mut raw: Value = serde_json::from_str(ENGINE_CONFIG).unwrap();
        set_inbound_port(&mut raw, 1001).unwrap();
        assert_eq!(raw["inbounds"][0]["port"], 1001);
        assert_eq!(raw["inbounds"][0]["protocol"], "http");

        let mut bare = serde_json::json!({"outbounds": []});
        assert!(set_inbound_port(&mut bare, 1001).is_err());
    }

    #[test]
    fn test_prepare_assigns_sequential_ports() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let good = src.path().join("good.json");
        let bad = src.path().join("bad.json");
        fs::write(&good, ENGINE_CONFIG).unwrap();
        fs::write(&bad, "{}").unwrap();

        let entries = vec![
            Entry {
                identifier: "vless://a".to_string(),
                config: good.clone(),
            },
            Entry {
                identifier: "vless://broken".to_string(),
                config: bad,
            },
            Entry {
                identifier: "vless://missing".to_string(),
                config: src.path().join("nope.json"),
            },
            Entry {
                identifier: "vless://b".to_string(),
                config: good,
            },
        ];

        let batch = BatchPreparer::new(out.path()).prepare(&entries).unwrap();
        assert_eq!(batch.configs.len(), 2);
        assert_eq!(batch.configs[0].listen_port, 1001);
        assert_eq!(batch.configs[1].listen_port, 1002);
        assert_ne!(
            batch.configs[0].engine_config_location,
            batch.configs[1].engine_config_location
        );

        let written: Value = serde_json::from_str(
            &fs::read_to_string(&batch.configs[1].engine_config_location).unwrap(),
        )
        .unwrap();
        assert_eq!(written["inbounds"][0]["port"], 1002);
        assert!(batch.configs[0].engine_config_location.is_absolute());
    }

    #[test]
    fn test_prepare_custom_base_port() {
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("c.json");
        fs::write(&path, ENGINE_CONFIG).unwrap();

        let mut preparer = BatchPreparer::new(src.path().join("out")).with_base_port(20000);
        let batch = preparer
            .prepare(&[Entry {
                identifier: "id".to_string(),
                config: path,
            }])
            .unwrap();
        assert_eq!(batch.configs[0].listen_port, 20001);
    }

    #[test]
    fn test_create_unique_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("aaaaaaaa.json");
        fs::write(&taken, "earlier config").unwrap();

        let mut names = vec!["bbbbbbbb", "aaaaaaaa"];
        let (path, _file) =
            create_unique(dir.path(), || names.pop().unwrap().to_string()).unwrap();

        assert_eq!(path, dir.path().join("bbbbbbbb.json"));
        assert_eq!(fs::read_to_string(&taken).unwrap(), "earlier config");
    }

    #[test]
    fn test_create_unique_gives_up_when_every_name_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("same.json"), "{}").unwrap();

        assert!(create_unique(dir.path(), || "same".to_string()).is_err());
        assert_eq!(fs::read_to_string(dir.path().join("same.json")).unwrap(), "{}");
    }
}
