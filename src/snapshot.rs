use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::ViewerError;

/// Precomputed concentration statistics, keyed by ecosystem ("fedi", "at",
/// "git", ...). Read from `data.js` (`var data = {...}`) or plain json.
#[derive(Debug, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "lastUpdate", default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub trends: BTreeMap<String, BTreeMap<String, PeriodTrend>>,
    #[serde(flatten)]
    pub ecosystems: BTreeMap<String, EcosystemStats>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct EcosystemStats {
    #[serde(rename = "lastUpdate", default)]
    pub last_update: Option<String>,
    #[serde(rename = "dataFile", default)]
    pub data_file: Option<String>,
    #[serde(rename = "HHI")]
    pub hhi: f64,
    pub shannon: f64,
    pub simpson: f64,
    pub servers: u64,
    pub biggest_abs: u64,
    pub biggest_pct: f64,
    pub rest_abs: u64,
    pub rest_pct: f64,
    // [percentile, value] pairs
    pub b_vals: Vec<(f64, f64)>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct PeriodTrend {
    pub shannon: Option<f64>,
    pub shannon_contrib: Option<Contributions>,
}

#[derive(Debug, Deserialize, PartialEq, Default)]
pub struct Contributions {
    #[serde(default)]
    pub increase: Vec<Contributor>,
    #[serde(default)]
    pub decrease: Vec<Contributor>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct Contributor {
    pub host: String,
    pub change: f64,
    pub user_change: i64,
}

impl Snapshot {
    pub fn parse(text: &str) -> Result<Self, ViewerError> {
        // data.js wraps the object in a variable assignment
        let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
            return Err(ViewerError::LoadingFailed(
                "Unable to find a json object in the snapshot".to_string(),
            ));
        };
        if end < start {
            return Err(ViewerError::LoadingFailed(
                "Unable to find a json object in the snapshot".to_string(),
            ));
        }
        let snapshot: Snapshot = serde_json::from_str(&text[start..=end])?;
        debug!("Parsed snapshot with {} ecosystems", snapshot.ecosystems.len());
        Ok(snapshot)
    }

    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self, ViewerError> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ViewerError::FileNotFound(path.to_path_buf()),
            _ => ViewerError::IoError(e),
        })?;
        Self::parse(&String::from_utf8_lossy(&bytes))
    }

    pub fn ecosystem(&self, key: &str) -> Result<&EcosystemStats, ViewerError> {
        self.ecosystems
            .get(key)
            .ok_or_else(|| ViewerError::UnknownEcosystem(key.to_string()))
    }

    /// Location of the raw dataset behind an ecosystem. Relative data files are
    /// looked up next to the snapshot and in its parent directory, since the
    /// snapshot usually lives one level below the repository root.
    pub fn data_file_location(
        &self,
        key: &str,
        snapshot_path: &Path,
        keep_relative: bool,
    ) -> Result<String, ViewerError> {
        let stats = self.ecosystem(key)?;
        let data_file = stats.data_file.as_deref().ok_or_else(|| {
            ViewerError::LoadingFailed(format!("Ecosystem \"{key}\" has no data file"))
        })?;

        let lowered = data_file.to_ascii_lowercase();
        if keep_relative
            || lowered.starts_with("http://")
            || lowered.starts_with("https://")
            || Path::new(data_file).is_absolute()
        {
            return Ok(data_file.to_string());
        }

        let dir = snapshot_path.parent().unwrap_or(Path::new("."));
        let candidates: Vec<PathBuf> = [Some(dir), dir.parent()]
            .into_iter()
            .flatten()
            .map(|d| d.join(data_file))
            .collect();
        let found = candidates
            .iter()
            .find(|p| p.exists())
            .unwrap_or(&candidates[0]);
        Ok(found.to_string_lossy().to_string())
    }

    /// Human readable report for one or all ecosystems.
    pub fn render_summary(&self, key: Option<&str>) -> Result<String, ViewerError> {
        let keys: Vec<&str> = match key {
            Some(k) => {
                self.ecosystem(k)?;
                vec![k]
            }
            None => self.ecosystems.keys().map(String::as_str).collect(),
        };

        let mut sections = Vec::new();
        if let Some(update) = &self.last_update {
            sections.push(format!("Snapshot from {update}\n"));
        }
        for k in keys {
            let mut section = self.ecosystem(k)?.summary(k);
            if let Some(periods) = self.trends.get(k) {
                for (period, trend) in periods {
                    section.push_str(&trend.summary(period));
                }
            }
            sections.push(section);
        }
        Ok(sections.join("\n"))
    }
}

impl EcosystemStats {
    pub fn total(&self) -> u64 {
        self.biggest_abs + self.rest_abs
    }

    pub fn summary(&self, key: &str) -> String {
        let mut title = format!("[{key}]");
        if let Some(update) = &self.last_update {
            title.push_str(&format!(" updated {update}"));
        }
        if let Some(file) = &self.data_file {
            title.push_str(&format!(", data {file}"));
        }
        let breakpoints = self
            .b_vals
            .iter()
            .map(|(p, v)| format!("p{p}={v}"))
            .collect::<Vec<String>>()
            .join(" ");

        let lines = [
            title,
            format!("HHI: {:.4} ({})", self.hhi / 10000.0, self.hhi),
            format!("Shannon diversity: {:.4}", self.shannon),
            format!("Simpson diversity: {:.4}", self.simpson),
            format!("Total servers: {}", self.servers),
            format!("Biggest server: {} ({:.2}%)", self.biggest_abs, self.biggest_pct),
            format!("Rest of the servers: {} ({:.2}%)", self.rest_abs, self.rest_pct),
            format!("Total users: {}", self.total()),
            format!("Percentiles: {breakpoints}"),
        ];
        lines.iter().map(|l| format!("{l}\n")).collect()
    }
}

impl PeriodTrend {
    pub fn summary(&self, period: &str) -> String {
        let delta = match self.shannon {
            Some(delta) => format!("{delta:+.4}"),
            None => "n/a".to_string(),
        };
        let mut lines = vec![format!("Shannon change ({period}): {delta}")];
        if let Some(contrib) = &self.shannon_contrib {
            for (label, hosts) in [("up", &contrib.increase), ("down", &contrib.decrease)] {
                lines.extend(hosts.iter().map(|c| {
                    format!(
                        "  {label:<4} {:<32} {:+.6} ({:+} users)",
                        c.host, c.change, c.user_change
                    )
                }));
            }
        }
        lines.iter().map(|l| format!("{l}\n")).collect()
    }
}
