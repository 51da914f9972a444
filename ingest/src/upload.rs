//! This module provides the [UploadSink] trait and its two implementations: [LocalSink], which leaves files where
//! they are, and [HttpSink], which `PUT`s them to a remote object store.

use {
    crate::error::IngestError,
    anyhow::{anyhow, Error, Result},
    bytes::{Bytes, BytesMut},
    futures::{
        future::{BoxFuture, FutureExt},
        Stream, TryStreamExt,
    },
    mime::Mime,
    reqwest::{header, Body, Url},
    std::path::Path,
    tokio::{
        fs::{self, File as AsyncFile},
        io::AsyncRead,
    },
    tokio_util::codec::{BytesCodec, FramedRead},
    tracing::debug,
};

/// Stores a file under a name, returning the locator at which it can later be retrieved.
pub trait UploadSink: Send + Sync {
    fn store<'a>(&'a self, name: &'a str, path: &'a Path) -> BoxFuture<'a, Result<String>>;
}

/// [UploadSink] which leaves files in place, using their canonical paths as locators
pub struct LocalSink;

impl UploadSink for LocalSink {
    fn store<'a>(&'a self, _name: &'a str, path: &'a Path) -> BoxFuture<'a, Result<String>> {
        async move {
            let path = fs::canonicalize(path).await?;

            path.to_str()
                .map(str::to_owned)
                .ok_or_else(|| anyhow!("non-UTF-8 path: {}", path.display()))
        }
        .boxed()
    }
}

fn content_type(path: &Path) -> Mime {
    match path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("png") => mime::IMAGE_PNG,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

fn as_stream(
    input: impl AsyncRead + Send + Sync + 'static,
) -> impl Stream<Item = Result<Bytes>> + Send + Sync + 'static {
    FramedRead::new(input, BytesCodec::new())
        .map_ok(BytesMut::freeze)
        .map_err(Error::from)
}

/// [UploadSink] which streams each file to `<base URL>/<name>` with an HTTP `PUT`
pub struct HttpSink {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpSink {
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)?;

        if base_url.cannot_be_a_base() {
            return Err(anyhow!("upload URL {} cannot have paths appended", base_url));
        }

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// The URL at which `name` is stored, with `name` percent-encoded as a single path segment
    fn locator(&self, name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();

        url.path_segments_mut()
            .map_err(|_| anyhow!("upload URL {} cannot have paths appended", self.base_url))?
            .pop_if_empty()
            .push(name);

        Ok(url)
    }
}

impl UploadSink for HttpSink {
    fn store<'a>(&'a self, name: &'a str, path: &'a Path) -> BoxFuture<'a, Result<String>> {
        async move {
            let url = self.locator(name)?;

            debug!("uploading {} to {}", path.display(), url);

            let mut request = self
                .client
                .put(url.clone())
                .header(header::CONTENT_TYPE, content_type(path).as_ref())
                .body(Body::wrap_stream(as_stream(AsyncFile::open(path).await?)));

            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let status = request.send().await?.status();

            if status.is_success() {
                Ok(url.into())
            } else {
                Err(IngestError::Upload {
                    name: name.to_owned(),
                    status: status.as_u16(),
                }
                .into())
            }
        }
        .boxed()
    }
}
