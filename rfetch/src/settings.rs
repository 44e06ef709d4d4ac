//! The transfer file: connection settings plus the list of transfer steps
//!
//! ```yaml
//! config:
//!   host: example.com
//!   user: deploy
//!   pass: secret
//! transfer:
//!   - from: /srv/app/config
//!     to: backup/config
//!     ignore: ["*.log"]
//!     overwrite: true
//! ```

use anyhow::{Context, anyhow};
use common::Step;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File names looked up in the working directory when no `--config` is given, in order
pub const DEFAULT_NAMES: [&str; 3] = ["transfer.yaml", "transfer.yml", "transfer.json"];

fn default_port() -> u16 {
    remote::SshSettings::DEFAULT_PORT
}

/// The `config` section
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteSettings {
    #[serde(default, alias = "Host")]
    pub host: Option<String>,
    #[serde(default = "default_port", alias = "Port")]
    pub port: u16,
    #[serde(default, alias = "User")]
    pub user: String,
    #[serde(default, alias = "Pass", alias = "password")]
    pub pass: String,
    #[serde(default, alias = "Insecure")]
    pub insecure: bool,
    /// number of concurrent workers
    #[serde(default, alias = "Jobs")]
    pub jobs: Option<usize>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            user: String::new(),
            pass: String::new(),
            insecure: false,
            jobs: None,
        }
    }
}

impl std::fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("insecure", &self.insecure)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransferFile {
    #[serde(default, alias = "Config")]
    pub config: RemoteSettings,
    #[serde(default, alias = "Transfer")]
    pub transfer: Vec<Step>,
}

impl TransferFile {
    /// Parses YAML (and therefore JSON) text.
    pub fn parse(text: &str) -> Result<Self, anyhow::Error> {
        serde_yaml::from_str(text).context("malformed transfer file")
    }

    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read configuration {path:?}"))?;
        Self::parse(&text).with_context(|| format!("unable to read configuration {path:?}"))
    }

    /// Finds the first of [`DEFAULT_NAMES`] present in `dir`.
    pub fn discover(dir: &Path) -> Result<PathBuf, anyhow::Error> {
        DEFAULT_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                anyhow!(
                    "unable to read configuration: none of {} found in {:?}",
                    DEFAULT_NAMES.join(", "),
                    dir
                )
            })
    }

    /// Rejects the whole file if any part of it is unusable.
    ///
    /// With `local` sources no connection settings are required.
    pub fn validate(&self, local: bool) -> Result<(), anyhow::Error> {
        if !local && self.config.host.as_deref().is_none_or(str::is_empty) {
            return Err(anyhow!("config.host is required"));
        }
        if self.config.jobs == Some(0) {
            return Err(anyhow!("config.jobs must be at least 1"));
        }
        for (index, step) in self.transfer.iter().enumerate() {
            step.validate()
                .with_context(|| format!("invalid transfer step #{}", index + 1))?;
        }
        Ok(())
    }

    /// Pool size: the command line wins over the file, [`common::DEFAULT_JOBS`] otherwise.
    pub fn jobs(&self, cli: Option<usize>) -> Result<usize, anyhow::Error> {
        match cli.or(self.config.jobs).unwrap_or(common::DEFAULT_JOBS) {
            0 => Err(anyhow!("number of jobs must be at least 1")),
            jobs => Ok(jobs),
        }
    }

    pub fn ssh_settings(&self, insecure: bool) -> Result<remote::SshSettings, anyhow::Error> {
        let host = self
            .config
            .host
            .clone()
            .ok_or_else(|| anyhow!("config.host is required"))?;
        Ok(remote::SshSettings {
            host,
            port: self.config.port,
            user: self.config.user.clone(),
            password: self.config.pass.clone(),
            insecure: insecure || self.config.insecure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_yaml() {
        let transfer = TransferFile::parse(
            r#"
config:
  host: example.com
  port: 2222
  user: deploy
  pass: secret
  jobs: 4
transfer:
  - from: /srv/app/config
    to: backup/config
    ignore: ["*.log", "cache/"]
    overwrite: true
  - from: relative/file.txt
"#,
        )
        .unwrap();
        assert_eq!(transfer.config.host.as_deref(), Some("example.com"));
        assert_eq!(transfer.config.port, 2222);
        assert_eq!(transfer.config.jobs, Some(4));
        assert_eq!(transfer.transfer.len(), 2);
        assert_eq!(transfer.transfer[0].ignore, vec!["*.log", "cache/"]);
        assert!(transfer.transfer[0].overwrite);
        assert!(transfer.transfer[1].to.as_os_str().is_empty());
        assert!(!transfer.transfer[1].overwrite);
        transfer.validate(false).unwrap();
    }

    #[test]
    fn parses_capitalized_json() {
        let transfer = TransferFile::parse(
            r#"{"Config": {"Host": "h", "User": "u", "Pass": "p"},
                "Transfer": [{"From": "/a", "To": "b", "Overwrite": true}]}"#,
        )
        .unwrap();
        assert_eq!(transfer.config.host.as_deref(), Some("h"));
        assert_eq!(transfer.config.port, 22);
        assert_eq!(transfer.transfer[0].from, PathBuf::from("/a"));
        assert!(transfer.transfer[0].overwrite);
    }

    #[test]
    fn malformed_file_is_rejected() {
        assert!(TransferFile::parse("transfer: [from: ").is_err());
        assert!(TransferFile::parse("transfer:\n  - overwrite: true\n").is_err());
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let transfer = TransferFile::parse("transfer:\n  - from: /a\n").unwrap();
        assert!(transfer.validate(false).is_err());
        transfer.validate(true).unwrap();
        let transfer =
            TransferFile::parse("config:\n  host: h\n  jobs: 0\ntransfer: []\n").unwrap();
        assert!(transfer.validate(false).is_err());
        let transfer = TransferFile::parse(
            "config:\n  host: h\ntransfer:\n  - from: /a\n  - from: /b\n    ignore: ['a[']\n",
        )
        .unwrap();
        let error = transfer.validate(false).unwrap_err();
        assert!(format!("{error:#}").contains("#2"));
    }

    #[test]
    fn jobs_precedence() {
        let mut transfer = TransferFile::default();
        assert_eq!(transfer.jobs(None).unwrap(), common::DEFAULT_JOBS);
        transfer.config.jobs = Some(3);
        assert_eq!(transfer.jobs(None).unwrap(), 3);
        assert_eq!(transfer.jobs(Some(64)).unwrap(), 64);
        assert!(transfer.jobs(Some(0)).is_err());
    }

    #[test]
    fn ssh_settings_merge_insecure() {
        let transfer =
            TransferFile::parse("config:\n  host: h\n  user: u\n  pass: hunter2\n").unwrap();
        let ssh = transfer.ssh_settings(false).unwrap();
        assert_eq!(ssh.address(), "h:22");
        assert_eq!(ssh.password, "hunter2");
        assert!(!ssh.insecure);
        assert!(transfer.ssh_settings(true).unwrap().insecure);
        assert!(!format!("{:?}", transfer.config).contains("hunter2"));
    }

    #[test]
    fn discover_prefers_yaml() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        assert!(TransferFile::discover(tmp_dir.path()).is_err());
        std::fs::write(tmp_dir.path().join("transfer.json"), "{}")?;
        assert_eq!(
            TransferFile::discover(tmp_dir.path())?,
            tmp_dir.path().join("transfer.json")
        );
        std::fs::write(tmp_dir.path().join("transfer.yaml"), "{}")?;
        assert_eq!(
            TransferFile::discover(tmp_dir.path())?,
            tmp_dir.path().join("transfer.yaml")
        );
        Ok(())
    }
}
