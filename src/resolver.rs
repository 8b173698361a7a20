use std::net::IpAddr;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{header::CONTENT_TYPE, redirect, Client, Url};
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::models::ImageBytes;

/// Upload limit of the original front-end.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<ImageBytes, ResolveError>;
}

const MAX_REDIRECTS: usize = 10;

/// Fetches images over HTTP(S) with a single GET and no retries.
///
/// Hosts that resolve to loopback, private or link-local addresses are
/// refused before any connection is made, and redirects into them are not
/// followed.
pub struct HttpImageResolver {
    client: Client,
    max_bytes: usize,
    allow_private_hosts: bool,
}

impl HttpImageResolver {
    pub fn new(max_bytes: usize) -> reqwest::Result<Self> {
        let client = Client::builder().redirect(public_redirects()).build()?;
        Ok(Self { client, max_bytes, allow_private_hosts: false })
    }

    /// Lifts the address guard, for deployments that fetch from an internal network.
    pub fn allow_private_hosts(self) -> Self {
        Self { client: Client::new(), allow_private_hosts: true, ..self }
    }
}

fn public_redirects() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if attempt.url().host_str().map_or(true, is_private_host_literal) {
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

#[async_trait]
impl ImageSource for HttpImageResolver {
    async fn resolve(&self, url: &str) -> Result<ImageBytes, ResolveError> {
        let parsed = parse_image_url(url)?;
        if !self.allow_private_hosts {
            ensure_public_host(&parsed).await?;
        }
        info!("📥 Fetching image: {}", parsed);

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ResolveError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("❌ Image fetch failed with status {}", status);
            return Err(ResolveError::Fetch { status: status.as_u16() });
        }

        if let Some(declared) = response.content_length() {
            let declared = usize::try_from(declared).unwrap_or(usize::MAX);
            if declared > self.max_bytes {
                return Err(ResolveError::TooLarge { size: declared, limit: self.max_bytes });
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(essence);

        let mut buf = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ResolveError::Unreachable(e.to_string()))?
        {
            let size = buf.len() + chunk.len();
            if size > self.max_bytes {
                return Err(ResolveError::TooLarge { size, limit: self.max_bytes });
            }
            buf.extend_from_slice(&chunk);
        }

        let image = into_image(buf.freeze(), content_type)?;
        debug!(mime = %image.mime_type, bytes = image.content.len(), "image fetched");
        Ok(image)
    }
}

fn parse_image_url(url: &str) -> Result<Url, ResolveError> {
    let invalid = |reason: String| ResolveError::InvalidUrl { url: url.to_string(), reason };
    let parsed = Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

async fn ensure_public_host(url: &Url) -> Result<(), ResolveError> {
    let blocked = || ResolveError::InvalidUrl {
        url: url.to_string(),
        reason: "host is a private or loopback address".into(),
    };
    let host = url.host_str().ok_or_else(blocked)?;
    if is_private_host_literal(host) {
        return Err(blocked());
    }
    if literal_ip(host).is_some() {
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ResolveError::Unreachable(e.to_string()))?;
    for addr in addrs {
        if is_private_ip(addr.ip()) {
            warn!("🚫 {} resolves to non-public address {}", host, addr.ip());
            return Err(blocked());
        }
    }
    Ok(())
}

fn literal_ip(host: &str) -> Option<IpAddr> {
    host.trim_start_matches('[').trim_end_matches(']').parse().ok()
}

/// Checks what can be decided from the host string alone, without DNS.
fn is_private_host_literal(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == "localhost" || host.ends_with(".localhost") || literal_ip(&host).is_some_and(is_private_ip)
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || a == 0
                // carrier-grade NAT, 100.64.0.0/10
                || (a == 100 && (b & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

/// `image/png; charset=binary` -> `image/png`
pub(crate) fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Applies the `ImageBytes` invariants. Object stores often serve
/// `application/octet-stream`; in that case the type comes from the magic bytes.
pub(crate) fn into_image(content: Bytes, content_type: Option<String>) -> Result<ImageBytes, ResolveError> {
    if content.is_empty() {
        return Err(ResolveError::InvalidImage("empty body".into()));
    }

    let mime_type = match content_type.filter(|ct| ct.starts_with("image/")) {
        Some(ct) => ct,
        None => image::guess_format(&content)
            .map(|format| format.to_mime_type().to_string())
            .map_err(|_| ResolveError::InvalidImage("content is not a recognised image".into()))?,
    };

    Ok(ImageBytes { content, mime_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve, PNG_BYTES};
    use axum::{http::StatusCode, routing::get, Router};

    fn image_host() -> Router {
        Router::new()
            .route("/bottle.png", get(|| async { ([(CONTENT_TYPE, "image/png")], PNG_BYTES) }))
            .route(
                "/charset.jpg",
                get(|| async { ([(CONTENT_TYPE, "image/jpeg; charset=binary")], PNG_BYTES) }),
            )
            .route(
                "/blob",
                get(|| async { ([(CONTENT_TYPE, "application/octet-stream")], PNG_BYTES) }),
            )
            .route("/notes.txt", get(|| async { ([(CONTENT_TYPE, "text/plain")], "hello") }))
            .route("/empty.png", get(|| async { ([(CONTENT_TYPE, "image/png")], "") }))
            .route("/huge.png", get(|| async { ([(CONTENT_TYPE, "image/png")], vec![0u8; 4096]) }))
            .route("/gone.png", get(|| async { StatusCode::NOT_FOUND }))
    }

    /// The loopback image host is only reachable with the address guard lifted.
    fn local(max_bytes: usize) -> HttpImageResolver {
        HttpImageResolver::new(max_bytes).unwrap().allow_private_hosts()
    }

    #[tokio::test]
    async fn fetches_body_and_declared_type() {
        let base = serve(image_host()).await;
        let image = local(1024)
            .resolve(&format!("{base}/bottle.png"))
            .await
            .unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(&image.content[..], PNG_BYTES);
    }

    #[tokio::test]
    async fn strips_content_type_parameters() {
        let base = serve(image_host()).await;
        let image = local(1024)
            .resolve(&format!("{base}/charset.jpg"))
            .await
            .unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn sniffs_generic_binary_content() {
        let base = serve(image_host()).await;
        let image = local(1024).resolve(&format!("{base}/blob")).await.unwrap();
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let base = serve(image_host()).await;
        let err = local(1024)
            .resolve(&format!("{base}/gone.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Fetch { status: 404 }));
    }

    #[tokio::test]
    async fn rejects_text_and_empty_bodies() {
        let base = serve(image_host()).await;
        let resolver = local(1024);
        let text = resolver.resolve(&format!("{base}/notes.txt")).await.unwrap_err();
        assert!(matches!(text, ResolveError::InvalidImage(_)));
        let empty = resolver.resolve(&format!("{base}/empty.png")).await.unwrap_err();
        assert!(matches!(empty, ResolveError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn enforces_size_limit() {
        let base = serve(image_host()).await;
        let err = local(1024)
            .resolve(&format!("{base}/huge.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::TooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let resolver = HttpImageResolver::new(1024).unwrap();
        for url in ["not a url", "ftp://example.com/a.png", "/relative/path.png"] {
            let err = resolver.resolve(url).await.unwrap_err();
            assert!(matches!(err, ResolveError::InvalidUrl { .. }), "{url}: {err:?}");
        }
    }

    #[tokio::test]
    async fn refuses_internal_hosts_by_default() {
        let resolver = HttpImageResolver::new(1024).unwrap();
        for url in [
            "http://127.0.0.1:9/a.png",
            "http://localhost/a.png",
            "http://api.localhost./a.png",
            "http://10.0.0.5/a.png",
            "http://192.168.1.1/router.png",
            "http://169.254.169.254/latest/meta-data",
            "http://[::1]:8080/a.png",
            "http://[::ffff:127.0.0.1]/a.png",
        ] {
            let err = resolver.resolve(url).await.unwrap_err();
            assert!(matches!(err, ResolveError::InvalidUrl { .. }), "{url}: {err:?}");
        }
    }

    #[tokio::test]
    async fn open_and_closed_internal_ports_fail_alike() {
        let base = serve(image_host()).await;
        let resolver = HttpImageResolver::new(1024).unwrap();
        let open = resolver.resolve(&format!("{base}/bottle.png")).await.unwrap_err();
        let closed = resolver.resolve("http://127.0.0.1:9/bottle.png").await.unwrap_err();
        assert_eq!(open.kind(), "invalid_image_url");
        assert_eq!(closed.kind(), open.kind());
    }

    #[test]
    fn classifies_addresses() {
        for ip in ["127.0.0.1", "10.1.2.3", "172.16.0.1", "192.168.0.10", "169.254.1.1", "100.64.0.1", "0.0.0.0", "::1", "fd00::1", "fe80::1"] {
            assert!(is_private_ip(ip.parse().unwrap()), "{ip}");
        }
        for ip in ["8.8.8.8", "93.184.216.34", "100.128.0.1", "2606:4700::1111"] {
            assert!(!is_private_ip(ip.parse().unwrap()), "{ip}");
        }
        assert!(is_private_host_literal("LOCALHOST"));
        assert!(!is_private_host_literal("cdn.example"));
    }

    #[test]
    fn declared_non_image_type_falls_back_to_sniffing() {
        let image = into_image(Bytes::from_static(PNG_BYTES), Some("application/octet-stream".into())).unwrap();
        assert_eq!(image.mime_type, "image/png");
        let err = into_image(Bytes::from_static(b"plain"), None).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidImage(_)));
    }
}
