use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Instant;

use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dataset::Dataset;
use crate::domain::ViewerError;

const USER_AGENT: &str = concat!("statview/", env!("CARGO_PKG_VERSION"));

/// Where a csv resource lives.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Url(Url),
    Path(PathBuf),
}

impl Source {
    /// Interprets a location the way a browser would resolve a link: absolute
    /// http(s) urls are used as is, relative ones are joined onto `base_url`
    /// when it is set and treated as a local path otherwise.
    pub fn resolve(location: &str, base_url: Option<&Url>) -> Result<Source, ViewerError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ViewerError::InvalidLocation(location.to_string()));
        }

        let lowered = location.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return Ok(Source::Url(Url::parse(location)?));
        }

        if let Some(base) = base_url {
            return Ok(Source::Url(base.join(location)?));
        }

        let expanded = shellexpand::full(location)
            .map_err(|e| ViewerError::InvalidLocation(format!("{location}: {e}")))?;
        Ok(Source::Path(PathBuf::from(expanded.as_ref())))
    }

    /// File name used when the raw data is saved locally.
    pub fn file_name(&self) -> String {
        let name = match self {
            Source::Url(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(str::to_string),
            Source::Path(path) => path
                .file_name()
                .and_then(|s| s.to_str())
                .map(str::to_string),
        };
        name.filter(|n| !n.is_empty())
            .unwrap_or_else(|| "download.csv".to_string())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => write!(f, "{url}"),
            Source::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

pub fn ensure_success(status: StatusCode) -> Result<(), ViewerError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ViewerError::HttpStatus(status.as_u16()))
    }
}

#[instrument(level = "debug", skip(source), fields(source = %source))]
pub fn fetch(source: &Source) -> Result<String, ViewerError> {
    let start_time = Instant::now();
    let body = match source {
        Source::Url(url) => {
            let client = reqwest::blocking::Client::builder()
                .user_agent(USER_AGENT)
                .build()?;
            let response = client.get(url.clone()).send()?;
            debug!("Response status {}", response.status());
            ensure_success(response.status())?;
            response.text()?
        }
        Source::Path(path) => {
            let bytes = fs::read(path).map_err(|e| match e.kind() {
                ErrorKind::NotFound => ViewerError::FileNotFound(path.clone()),
                ErrorKind::PermissionDenied => ViewerError::PermissionDenied(path.clone()),
                _ => ViewerError::IoError(e),
            })?;
            // Same lossy decoding the http response gets
            String::from_utf8_lossy(&bytes).into_owned()
        }
    };
    info!(
        "Fetched {} bytes from {} in {}ms",
        body.len(),
        source,
        start_time.elapsed().as_millis()
    );
    Ok(body)
}

pub struct LoadResult {
    pub generation: u64,
    pub source: Source,
    pub outcome: Result<Dataset, ViewerError>,
}

/// Runs fetches on worker threads and hands the parsed datasets back to the
/// ui thread. Every request is tagged with the generation it was issued for.
pub struct Loader {
    sender: Sender<LoadResult>,
    receiver: Receiver<LoadResult>,
}

impl Loader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Loader { sender, receiver }
    }

    pub fn spawn(&self, generation: u64, source: Source) {
        let sender = self.sender.clone();
        debug!("Spawning fetch #{generation} for {source}");
        thread::spawn(move || {
            let outcome = fetch(&source).and_then(Dataset::from_text);
            let result = LoadResult {
                generation,
                source,
                outcome,
            };
            if sender.send(result).is_err() {
                warn!("Fetch #{generation} finished after the viewer was closed");
            }
        });
    }

    pub fn try_recv(&self) -> Option<LoadResult> {
        self.receiver.try_recv().ok()
    }

    #[cfg(test)]
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<LoadResult> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("statview-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn resolve_locations() {
        let url = Source::resolve("https://example.org/data/fedi.csv", None).unwrap();
        assert!(matches!(url, Source::Url(_)));

        let local = Source::resolve("data/fedi-mau/2025-10-09T00:00:00Z.csv", None).unwrap();
        assert_eq!(
            local,
            Source::Path(PathBuf::from("data/fedi-mau/2025-10-09T00:00:00Z.csv"))
        );

        let base = Url::parse("https://stats.example.org/www/").unwrap();
        let joined = Source::resolve("data/at.csv", Some(&base)).unwrap();
        assert_eq!(joined.to_string(), "https://stats.example.org/www/data/at.csv");

        assert!(Source::resolve("   ", None).is_err());
        assert!(Source::resolve("http://", None).is_err());
    }

    #[test]
    fn file_names() {
        let src = Source::resolve("https://example.org/data/git.csv?x=1", None).unwrap();
        assert_eq!(src.file_name(), "git.csv");
        let src = Source::resolve("https://example.org/", None).unwrap();
        assert_eq!(src.file_name(), "download.csv");
        let src = Source::resolve("/tmp/some/at-mau.csv", None).unwrap();
        assert_eq!(src.file_name(), "at-mau.csv");
    }

    #[test]
    fn status_codes() {
        assert!(ensure_success(StatusCode::OK).is_ok());
        let err = ensure_success(StatusCode::NOT_FOUND).unwrap_err();
        assert_eq!(err.to_string(), "Failed to load CSV (404).");
        assert!(matches!(
            ensure_success(StatusCode::INTERNAL_SERVER_ERROR),
            Err(ViewerError::HttpStatus(500))
        ));
    }

    #[test]
    fn fetch_local_file() {
        let path = write_temp("fetch.csv", "a,b\n1,2\n");
        let body = fetch(&Source::Path(path)).unwrap();
        assert_eq!(body, "a,b\n1,2\n");
    }

    #[test]
    fn fetch_missing_file() {
        let path = PathBuf::from("/definitely/not/here.csv");
        let err = fetch(&Source::Path(path)).unwrap_err();
        assert!(matches!(err, ViewerError::FileNotFound(_)));
    }

    #[test]
    fn loader_reports_generation() {
        let path = write_temp("loader.csv", "host,mau\nx,1\ny,2\n");
        let loader = Loader::new();
        loader.spawn(7, Source::Path(path));
        let result = loader.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.generation, 7);
        let ds = result.outcome.unwrap();
        assert_eq!(ds.value(0, 0), "y");
    }

    #[test]
    fn fetch_over_http() {
        let base = test_server::serve(vec![
            (200, "name,active_month\nb,1\na,10\n"),
            (404, "not here"),
        ]);
        let body = fetch(&Source::Url(base.join("fedi.csv").unwrap())).unwrap();
        assert_eq!(body, "name,active_month\nb,1\na,10\n");

        let err = fetch(&Source::Url(base.join("gone.csv").unwrap())).unwrap_err();
        assert!(matches!(err, ViewerError::HttpStatus(404)));
        assert_eq!(err.to_string(), "Failed to load CSV (404).");
    }

    #[test]
    fn fetch_decodes_invalid_utf8_lossily() {
        let dir = std::env::temp_dir().join(format!("statview-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("latin1.csv");
        fs::write(&path, b"host,mau\ncaf\xe9.org,3\n").unwrap();
        let body = fetch(&Source::Path(path)).unwrap();
        assert_eq!(body, "host,mau\ncaf\u{FFFD}.org,3\n");
    }
}
