use log::{error, info, warn};
use std::net::{SocketAddr, TcpListener};
use std::path::{Component, Path, PathBuf};
use tokio::sync::oneshot;
use uuid::Uuid;
use warp::{http::StatusCode, path::Tail, reply, Filter, Rejection, Reply};

use super::supervisor::JobSupervisor;
use super::types::JobKind;
use crate::error_handling::types::JobError;

/// What a directory request under the recordings root resolves to. Plain
/// files never get here, `warp::fs::dir` streams them.
#[derive(Debug, PartialEq)]
pub enum FileResponse {
    Listing(String),
    NotFound,
    Forbidden,
}

/// Maps a request path onto `root`, refusing anything that climbs out of it.
pub fn resolve_request(root: &Path, tail: &str) -> Option<PathBuf> {
    let relative = Path::new(tail.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

fn listing(root: &Path, dir: &Path) -> std::io::Result<String> {
    let mut names: Vec<(String, bool)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| {
            let is_dir = e.path().is_dir();
            (e.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .collect();
    names.sort();

    let prefix = dir
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut html = String::from("<html><head><title>Recordings</title></head><body><pre>\n");
    for (name, is_dir) in names {
        let slash = if is_dir { "/" } else { "" };
        let href = if prefix.is_empty() {
            format!("/{}{}", name, slash)
        } else {
            format!("/{}/{}{}", prefix, name, slash)
        };
        html.push_str(&format!("<a href=\"{}\">{}{}</a>\n", href, name, slash));
    }
    html.push_str("</pre></body></html>");
    Ok(html)
}

/// Lists the directory `tail` (the request path) names under `root`.
pub fn respond(root: &Path, tail: &str) -> FileResponse {
    let path = match resolve_request(root, tail) {
        Some(path) => path,
        None => return FileResponse::Forbidden,
    };
    if !path.is_dir() {
        return FileResponse::NotFound;
    }
    match listing(root, &path) {
        Ok(html) => FileResponse::Listing(html),
        Err(e) => {
            warn!("Unable to list {}: {}", path.display(), e);
            FileResponse::NotFound
        }
    }
}

impl Reply for FileResponse {
    fn into_response(self) -> reply::Response {
        match self {
            FileResponse::Listing(html) => reply::html(html).into_response(),
            FileResponse::NotFound => {
                reply::with_status("Not Found", StatusCode::NOT_FOUND).into_response()
            }
            FileResponse::Forbidden => {
                reply::with_status("Forbidden", StatusCode::FORBIDDEN).into_response()
            }
        }
    }
}

/// Files come from `warp::fs::dir`, anything it rejects falls through to the
/// directory listing.
pub fn recordings_route(
    root: PathBuf,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let files = warp::fs::dir(root.clone());
    let listings = warp::path::tail().and_then(move |tail: Tail| {
        let root = root.clone();
        async move { Ok::<_, Rejection>(respond(&root, tail.as_str())) }
    });
    warp::get().and(files.or(listings))
}

/// Serves the recordings directory over HTTP while it holds the job slot.
#[derive(Debug, Clone)]
pub struct RecordingsFileServer {
    pub root: PathBuf,
    pub port: u16,
}

impl RecordingsFileServer {
    pub fn new(root: PathBuf, port: u16) -> Self {
        Self { root, port }
    }

    /// Takes the job slot and serves until shutdown. `None` when the slot is busy.
    pub fn start(self, supervisor: &JobSupervisor) -> Option<Uuid> {
        let token = supervisor.try_acquire(JobKind::FileServer)?;
        Some(supervisor.spawn(token, move |shutdown| async move {
            if let Err(e) = self.run(shutdown).await {
                error!("{}", e);
            }
        }))
    }

    pub async fn run(self, shutdown: oneshot::Receiver<()>) -> Result<(), JobError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();

        // warp panics on bind errors, so probe the port first.
        let probe = TcpListener::bind(addr)
            .map_err(|e| JobError::FileServerFailed(format!("port {}: {}", self.port, e)))?;
        drop(probe);

        let files = recordings_route(self.root.clone());

        info!(
            "Serving recordings from {} on port {}",
            self.root.display(),
            self.port
        );
        let mut server = tokio::spawn(warp::serve(files).run(addr));

        tokio::select! {
            _ = shutdown => {
                server.abort();
                info!("Recordings file server stopped");
                Ok(())
            }
            joined = &mut server => match joined {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!("Recordings file server ended unexpectedly");
                    Err(JobError::FileServerFailed(e.to_string()))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn parent_components_are_refused() {
        let root = Path::new("/avrec");
        assert_eq!(resolve_request(root, "/../etc/passwd"), None);
        assert_eq!(resolve_request(root, "a/../../b"), None);
        assert_eq!(
            resolve_request(root, "/sub/take.mp3"),
            Some(PathBuf::from("/avrec/sub/take.mp3"))
        );
        assert_eq!(resolve_request(root, ""), Some(PathBuf::from("/avrec")));
    }

    #[test]
    fn directories_are_listed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("20240101120000.mp3"), b"ID3").unwrap();
        std::fs::create_dir(dir.path().join("archive")).unwrap();

        match respond(dir.path(), "") {
            FileResponse::Listing(html) => {
                assert!(html.contains("href=\"/20240101120000.mp3\""));
                assert!(html.contains("href=\"/archive/\""));
            }
            other => panic!("expected a listing, got {:?}", other),
        }
        assert_eq!(respond(dir.path(), "missing"), FileResponse::NotFound);
        assert_eq!(respond(dir.path(), "../x"), FileResponse::Forbidden);
    }

    async fn get(port: u16, path: &str) -> String {
        let mut stream = None;
        for _ in 0..50 {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        let mut stream = stream.expect("file server did not come up");
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    #[serial]
    async fn streams_files_from_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("20240101120000.mp3"), b"ID3").unwrap();
        std::fs::create_dir(dir.path().join("archive")).unwrap();
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let (stop, shutdown) = oneshot::channel();
        let server = RecordingsFileServer::new(dir.path().to_path_buf(), port);
        let task = tokio::spawn(server.run(shutdown));

        let response = get(port, "/20240101120000.mp3").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.to_lowercase().contains("content-type: audio/mpeg"));
        assert!(response.ends_with("ID3"));

        let response = get(port, "/archive/").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("<title>Recordings</title>"));

        let response = get(port, "/missing.wav").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
