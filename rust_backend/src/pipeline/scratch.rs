//! Scratch-directory resolution.
//!
//! Per-variant SNANA outputs live under `<scratch>/<VERSION>/`. The scratch
//! directory is either configured explicitly or discovered by running
//! `<program> GETINFO <VERSION>` and taking the parent of the reported
//! `SNDATA_PATH:`. All variants of a collection share one scratch directory,
//! so the answer is memoised per collection.

use log::{debug, error, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::db::repo_config::ScratchSettings;
use crate::error::{SummaryError, SummaryResult};

const SNDATA_PATH_TAG: &str = "SNDATA_PATH:";

pub struct ScratchResolver {
    settings: ScratchSettings,
    explicit: Option<PathBuf>,
    // Held across the external call so concurrent readers of one collection
    // run the tool once.
    cache: Mutex<HashMap<String, PathBuf>>,
}

impl ScratchResolver {
    pub fn new(settings: ScratchSettings, explicit: Option<PathBuf>) -> Self {
        Self {
            settings,
            explicit,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Scratch directory of `collection`, using `version` for the lookup if
    /// the tool has to be run.
    pub async fn resolve(&self, collection: &str, version: &str) -> SummaryResult<PathBuf> {
        let mut cache = self.cache.lock().await;
        if let Some(dir) = cache.get(collection) {
            return Ok(dir.clone());
        }

        let dir = match &self.explicit {
            Some(dir) => dir.clone(),
            None => self.locate(version).await?,
        };
        debug!("Scratch directory for {} is {}", collection, dir.display());
        cache.insert(collection.to_string(), dir.clone());
        Ok(dir)
    }

    async fn locate(&self, version: &str) -> SummaryResult<PathBuf> {
        let program = &self.settings.program;
        debug!("Running {} GETINFO {} to find SNANA data dir", program, version);

        for attempt in 1..=self.settings.retries {
            let mut command = Command::new(program);
            command
                .arg("GETINFO")
                .arg(version)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            let run = command.output();

            let output = match timeout(self.settings.timeout(), run).await {
                Err(_) => {
                    warn!(
                        "{} run timed out (attempt {}/{}), trying again",
                        program, attempt, self.settings.retries
                    );
                    continue;
                }
                Ok(Err(e)) => {
                    return Err(SummaryError::ScratchDir(format!(
                        "Failed to run {}: {}",
                        program, e
                    )))
                }
                Ok(Ok(output)) => output,
            };

            if !output.stderr.is_empty() {
                return Err(SummaryError::ScratchDir(format!(
                    "Failed to run {}: {}",
                    program,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            return parse_sndata_path(&stdout).ok_or_else(|| {
                SummaryError::ScratchDir(format!(
                    "{} GETINFO {} reported no {} line",
                    program, version, SNDATA_PATH_TAG
                ))
            });
        }

        error!("{} run timed out repeatedly, giving up", program);
        Err(SummaryError::ScratchDir(format!(
            "{} timed out {} times",
            program, self.settings.retries
        )))
    }
}

/// Parent of the first `SNDATA_PATH:` entry in `GETINFO` output.
pub fn parse_sndata_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(SNDATA_PATH_TAG))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|path| Path::new(path).parent())
        .map(Path::to_path_buf)
}
