//! Serving files below a root directory.

use crate::handler::{Handler, HandlerResult};
use crate::RequestContext;
use async_trait::async_trait;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, VARY};
use http::{HeaderValue, StatusCode};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const INDEX: &str = "index.html";

/// Serves the file named by the request path, relative to `root`.
///
/// A directory serves its `index.html`. When the client accepts gzip and a `<file>.gz`
/// sibling exists, the compressed sibling is sent with `Content-Encoding: gzip`. Paths
/// escaping the root and missing files get `404`; the chain never continues past this
/// handler.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a request path onto the root, `None` if it tries to leave it.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut resolved = self.root.clone();
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => return None,
                part => {
                    // a part like `C:` or containing a separator would change the base
                    let mut components = Path::new(part).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(name)), None) => resolved.push(name),
                        _ => return None,
                    }
                }
            }
        }
        Some(resolved)
    }
}

#[async_trait]
impl<X: Send + 'static> Handler<X> for StaticFiles {
    async fn handle(&self, ctx: &mut RequestContext<X>) -> HandlerResult {
        let Some(mut target) = ctx.decoded_path().and_then(|path| self.resolve(path)) else {
            debug!(path = ctx.path(), "path escapes the static root or is not valid UTF-8");
            not_found(ctx);
            return Ok(());
        };

        if tokio::fs::metadata(&target).await.is_ok_and(|metadata| metadata.is_dir()) {
            target.push(INDEX);
        }

        let content_type = mime_guess::from_path(&target).first_or_octet_stream();
        let accepts_gzip = ctx
            .headers()
            .get_all(ACCEPT_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|encoding| encoding.split(';').next().is_some_and(|name| name.trim().eq_ignore_ascii_case("gzip")));

        if accepts_gzip {
            let mut gz = target.clone().into_os_string();
            gz.push(".gz");
            if let Some(bytes) = read_file(Path::new(&gz)).await? {
                let response = ctx.response_mut();
                response.insert_header(CONTENT_TYPE, HeaderValue::from_str(content_type.as_ref())?);
                response.insert_header(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                response.insert_header(VARY, HeaderValue::from_static("Accept-Encoding"));
                response.write(bytes);
                return Ok(());
            }
        }

        match read_file(&target).await? {
            Some(bytes) => {
                let response = ctx.response_mut();
                response.insert_header(CONTENT_TYPE, HeaderValue::from_str(content_type.as_ref())?);
                response.write(bytes);
            }
            None => not_found(ctx),
        }
        Ok(())
    }
}

/// Reads a regular file, `None` if there is none at `path`.
async fn read_file(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => tokio::fs::read(path).await.map(Some),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn not_found<X: Send + 'static>(ctx: &mut RequestContext<X>) {
    ctx.text(StatusCode::NOT_FOUND, "404 page not found");
}
