//! Middleware serving static files for requests nothing else handled.
//!
//! The middleware invokes the downstream responder first and only looks at
//! the filesystem when that fails with `404 Not Found`. Delivery implements
//! conditional requests (`If-None-Match`, `If-Modified-Since`), single-part
//! byte ranges with `If-Range`, weak ETags derived from file metadata, and
//! an optional per-media-type `Cache-Control` table.

mod provider;

pub use self::provider::{
    FileAttributes, FileProvider, LocalFileProvider, MemoryFileProvider, DEFAULT_CHUNK_SIZE,
};

use std::cmp;
use std::pin::Pin;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_RANGES, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, LAST_MODIFIED, RANGE,
};
use hyper::{Method, StatusCode};
use mime::Mime;

use crate::context::RequestContext;
use crate::error::{HttpError, ParseError};
use crate::handler::{HandlerFuture, HandlerResult, Responder};
use crate::helpers::date::{format_http_date, parse_http_date};
use crate::helpers::digest::{hex_encode, xor_fold16};
use crate::helpers::http::PercentDecoded;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::{Response, ResponseBody};

/// Serves files from a [`FileProvider`] when the downstream responder raises
/// `404 Not Found`. Applies to `GET` and `HEAD` requests only; other methods
/// pass the error through untouched.
#[derive(Clone)]
pub struct FileMiddleware {
    config: Arc<FileConfig>,
}

struct FileConfig {
    provider: Arc<dyn FileProvider>,
    search_index_html: bool,
    cache_control: Vec<(String, String)>,
}

impl FileMiddleware {
    /// A middleware over the given provider. Directory requests fall back to
    /// their `index.html` by default; see
    /// [`with_index_html`](FileMiddleware::with_index_html).
    pub fn new<P: FileProvider>(provider: P) -> FileMiddleware {
        FileMiddleware {
            config: Arc::new(FileConfig {
                provider: Arc::new(provider),
                search_index_html: true,
                cache_control: Vec::new(),
            }),
        }
    }

    /// Whether a request resolving to a directory retries `<dir>/index.html`
    /// instead of staying a `404`.
    pub fn with_index_html(mut self, search: bool) -> FileMiddleware {
        self.config_mut().search_index_html = search;
        self
    }

    /// Adds a `Cache-Control` rule: responses whose media type starts with
    /// `media_type` (e.g. `"text/"`, `"image/png"`, or `"*"` for all) carry
    /// the given directives. The first matching rule wins.
    pub fn with_cache_control(mut self, media_type: &str, directives: &str) -> FileMiddleware {
        self.config_mut()
            .cache_control
            .push((media_type.to_string(), directives.to_string()));
        self
    }

    fn config_mut(&mut self) -> &mut FileConfig {
        Arc::get_mut(&mut self.config).expect("configure FileMiddleware before sharing it")
    }
}

impl Middleware for FileMiddleware {
    fn call(
        &self,
        request: Request,
        context: RequestContext,
        next: Arc<dyn Responder>,
    ) -> Pin<Box<HandlerFuture>> {
        let config = self.config.clone();
        let method = request.method().clone();
        let raw_path = request.path().to_string();
        let headers = request.headers().clone();

        Box::pin(async move {
            match next.respond(request, context).await {
                Err((context, err))
                    if err.is_not_found()
                        && (method == Method::GET || method == Method::HEAD) =>
                {
                    serve(config, method, raw_path, headers, context, err).await
                }
                other => other,
            }
        })
    }
}

async fn serve(
    config: Arc<FileConfig>,
    method: Method,
    raw_path: String,
    headers: HeaderMap,
    context: RequestContext,
    original: HttpError,
) -> HandlerResult {
    let decoded = match PercentDecoded::new(&raw_path) {
        Some(decoded) => decoded.into_inner(),
        None => {
            return Err((
                context,
                HttpError::bad_request("invalid percent encoding in path"),
            ))
        }
    };
    if decoded.contains("..") {
        return Err((context, HttpError::bad_request("invalid path")));
    }

    let mut full_path = config.provider.full_path(&decoded);
    let mut attributes = match config.provider.attributes(full_path.clone()).await {
        Some(attributes) => attributes,
        None => return Err((context, original)),
    };

    if attributes.is_directory {
        if !config.search_index_html {
            return Err((context, original));
        }
        let candidate = full_path.join("index.html");
        match config.provider.attributes(candidate.clone()).await {
            Some(index_attributes) if !index_attributes.is_directory => {
                full_path = candidate;
                attributes = index_attributes;
            }
            _ => return Err((context, original)),
        }
    }

    let size = attributes.size;
    let mtime_secs = attributes
        .modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let etag = entity_tag(mtime_secs, size);
    let last_modified = format_http_date(mtime_secs);
    let content_type = mime_guess::from_path(&full_path).first();

    let mut base_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        base_headers.insert(LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(&etag) {
        base_headers.insert(ETAG, value);
    }
    base_headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(directives) = cache_directives(&config.cache_control, content_type.as_ref()) {
        if let Ok(value) = HeaderValue::from_str(directives) {
            base_headers.insert(CACHE_CONTROL, value);
        }
    }

    // Conditional requests; If-None-Match takes precedence over
    // If-Modified-Since.
    if headers.contains_key(IF_NONE_MATCH) {
        if if_none_match_hits(&headers, &etag) {
            context.logger().trace("conditional request: etag matched");
            return Ok((context, not_modified(base_headers)));
        }
    } else if let Some(since) = headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_http_date(v).ok())
    {
        if mtime_secs <= since {
            context
                .logger()
                .trace("conditional request: not modified since");
            return Ok((context, not_modified(base_headers)));
        }
    }

    // Range requests.
    let mut status = StatusCode::OK;
    let mut start = 0u64;
    let mut length = size;

    if let Some(range_value) = headers.get(RANGE) {
        let parsed = range_value
            .to_str()
            .map_err(|_| ParseError::InvalidRange)
            .and_then(parse_range);
        match parsed {
            Ok((lo, hi)) => {
                let honour_range = match headers.get(IF_RANGE).and_then(|v| v.to_str().ok()) {
                    Some(validator) => validator == etag || validator == last_modified,
                    None => true,
                };
                if honour_range {
                    let from = lo.unwrap_or(0);
                    let to = cmp::min(hi.unwrap_or_else(|| size.saturating_sub(1)), size.saturating_sub(1));
                    if size == 0 || from >= size || from > to {
                        return Ok((context, range_not_satisfiable(base_headers, size)));
                    }
                    status = StatusCode::PARTIAL_CONTENT;
                    start = from;
                    length = to - from + 1;
                    let value = format!("bytes {}-{}/{}", from, to, size);
                    if let Ok(value) = HeaderValue::from_str(&value) {
                        base_headers.insert(CONTENT_RANGE, value);
                    }
                }
            }
            Err(err) => {
                context.logger().trace(&format!("range rejected: {}", err));
                return Ok((context, range_not_satisfiable(base_headers, size)));
            }
        }
    }

    if let Some(mime) = content_type {
        if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
            base_headers.insert(CONTENT_TYPE, value);
        }
    }
    base_headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

    let body = if method == Method::HEAD || length == 0 {
        ResponseBody::Empty
    } else {
        match config.provider.load_file(full_path, start, length).await {
            Ok(body) => body,
            Err(err) => return Err((context, err)),
        }
    };

    context.logger().trace(&format!(
        "serving file response: {} bytes from offset {}",
        length, start
    ));

    let mut response = Response::new(status);
    *response.headers_mut() = base_headers;
    response.set_body(body);
    Ok((context, response))
}

/// Weak entity tag: 16-byte XOR-fold of `"{mtime}-{size}"`, hex encoded.
fn entity_tag(mtime_secs: i64, size: u64) -> String {
    let material = format!("{}-{}", mtime_secs, size);
    format!("W/\"{}\"", hex_encode(&xor_fold16(material.as_bytes())))
}

fn if_none_match_hits(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|candidate| candidate.trim() == etag)
}

/// Parses `bytes=LO-HI`. An empty `LO` means "from the start", an empty `HI`
/// means "to the end"; both empty is malformed.
fn parse_range(value: &str) -> Result<(Option<u64>, Option<u64>), ParseError> {
    let captures = regex::Regex::new(r"^bytes=(\d*)-(\d*)$")
        .unwrap()
        .captures(value)
        .ok_or(ParseError::InvalidRange)?;
    let parse = |index: usize| -> Result<Option<u64>, ParseError> {
        let digits = captures.get(index).map(|m| m.as_str()).unwrap_or("");
        if digits.is_empty() {
            Ok(None)
        } else {
            digits
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ParseError::InvalidRange)
        }
    };
    let lo = parse(1)?;
    let hi = parse(2)?;
    if lo.is_none() && hi.is_none() {
        return Err(ParseError::InvalidRange);
    }
    Ok((lo, hi))
}

fn cache_directives<'a>(
    rules: &'a [(String, String)],
    content_type: Option<&Mime>,
) -> Option<&'a str> {
    let essence = content_type.map(|m| m.essence_str()).unwrap_or("");
    rules
        .iter()
        .find(|(pattern, _)| pattern == "*" || (!pattern.is_empty() && essence.starts_with(pattern.as_str())))
        .map(|(_, directives)| directives.as_str())
}

fn not_modified(headers: HeaderMap) -> Response {
    let mut response = Response::new(StatusCode::NOT_MODIFIED);
    *response.headers_mut() = headers;
    response
}

fn range_not_satisfiable(mut headers: HeaderMap, size: u64) -> Response {
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
        headers.insert(CONTENT_RANGE, value);
    }
    let mut response = Response::new(StatusCode::RANGE_NOT_SATISFIABLE);
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::collect_body;
    use crate::router::Router;
    use std::time::Duration;

    const MTIME: u64 = 1_600_000_000;

    fn provider() -> MemoryFileProvider {
        let modified = UNIX_EPOCH + Duration::from_secs(MTIME);
        let mut provider = MemoryFileProvider::new();
        provider.insert("index.html", "<html>welcome</html>", modified);
        provider.insert("site/doc.html", "<html>I am a doc.</html>", modified);
        provider.insert("data/blob.bin", random_bytes(), modified);
        provider.insert("empty.txt", "", modified);
        provider.insert("LICENSE", "MIT", modified);
        provider
    }

    fn random_bytes() -> Vec<u8> {
        (0..326_000u32).map(|i| (i % 251) as u8).collect()
    }

    fn middleware() -> FileMiddleware {
        FileMiddleware::new(provider())
    }

    fn responder(middleware: FileMiddleware) -> Arc<dyn Responder> {
        crate::middleware::Pipeline::new()
            .add(middleware)
            .wrap(Arc::new(Router::build(|_| {})))
    }

    async fn fetch(
        responder: &Arc<dyn Responder>,
        method: Method,
        path: &str,
        headers: &[(hyper::header::HeaderName, &str)],
    ) -> HandlerResult {
        let mut request = Request::new(method, path.parse().unwrap());
        for (name, value) in headers {
            request
                .headers_mut()
                .append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        responder
            .respond(request, RequestContext::new_for_testing())
            .await
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        let mut response = response;
        collect_body(response.take_body()).await.unwrap().bytes.to_vec()
    }

    #[tokio::test]
    async fn serves_files_with_metadata_headers() {
        let responder = responder(middleware());
        let (_, response) = fetch(&responder, Method::GET, "/site/doc.html", &[])
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "24");
        assert_eq!(response.headers().get(ACCEPT_RANGES).unwrap(), "bytes");
        let etag = response.headers().get(ETAG).unwrap().to_str().unwrap();
        assert!(etag.starts_with("W/\""));
        assert_eq!(
            response.headers().get(LAST_MODIFIED).unwrap(),
            format_http_date(MTIME as i64).as_str()
        );
        assert_eq!(body_bytes(response).await, b"<html>I am a doc.</html>");
    }

    #[tokio::test]
    async fn etag_is_stable_across_requests() {
        let responder = responder(middleware());
        let (_, first) = fetch(&responder, Method::GET, "/site/doc.html", &[])
            .await
            .unwrap();
        let (_, second) = fetch(&responder, Method::GET, "/site/doc.html", &[])
            .await
            .unwrap();
        assert_eq!(
            first.headers().get(ETAG).unwrap(),
            second.headers().get(ETAG).unwrap()
        );
    }

    #[tokio::test]
    async fn if_none_match_yields_304_without_body() {
        let responder = responder(middleware());
        let (_, first) = fetch(&responder, Method::GET, "/index.html", &[])
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let etag = first.headers().get(ETAG).unwrap().to_str().unwrap().to_string();

        let (_, second) = fetch(
            &responder,
            Method::GET,
            "/index.html",
            &[(IF_NONE_MATCH, etag.as_str())],
        )
        .await
        .unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert!(matches!(second.body(), ResponseBody::Empty));
        assert!(second.headers().get(ETAG).is_some());

        let (_, third) = fetch(
            &responder,
            Method::GET,
            "/index.html",
            &[(IF_NONE_MATCH, "W/\"bogus\"")],
        )
        .await
        .unwrap();
        assert_eq!(third.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn if_none_match_accepts_any_listed_value() {
        let responder = responder(middleware());
        let (_, first) = fetch(&responder, Method::GET, "/index.html", &[])
            .await
            .unwrap();
        let etag = first.headers().get(ETAG).unwrap().to_str().unwrap().to_string();
        let list = format!("W/\"other\", {}", etag);

        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/index.html",
            &[(IF_NONE_MATCH, list.as_str())],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn if_modified_since_compares_floored_mtime() {
        let responder = responder(middleware());
        let newer = format_http_date(MTIME as i64 + 5);
        let same = format_http_date(MTIME as i64);
        let older = format_http_date(MTIME as i64 - 5);

        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/index.html",
            &[(IF_MODIFIED_SINCE, newer.as_str())],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/index.html",
            &[(IF_MODIFIED_SINCE, same.as_str())],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/index.html",
            &[(IF_MODIFIED_SINCE, older.as_str())],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn range_requests_clamp_and_slice() {
        let responder = responder(middleware());
        let data = random_bytes();

        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/data/blob.bin",
            &[(RANGE, "bytes=100-3999")],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(CONTENT_RANGE).unwrap(),
            "bytes 100-3999/326000"
        );
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "3900");
        assert_eq!(body_bytes(response).await, &data[100..4000]);

        // An empty LO reads from the start of the file.
        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/data/blob.bin",
            &[(RANGE, "bytes=-3999")],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(CONTENT_RANGE).unwrap(),
            "bytes 0-3999/326000"
        );
        assert_eq!(body_bytes(response).await, &data[0..4000]);

        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/data/blob.bin",
            &[(RANGE, "bytes=6000-")],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(CONTENT_RANGE).unwrap(),
            "bytes 6000-325999/326000"
        );
        assert_eq!(body_bytes(response).await, &data[6000..]);
    }

    #[tokio::test]
    async fn range_end_clamps_to_file_size() {
        let responder = responder(middleware());
        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/data/blob.bin",
            &[(RANGE, "bytes=325000-999999")],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(CONTENT_RANGE).unwrap(),
            "bytes 325000-325999/326000"
        );
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "1000");
    }

    #[tokio::test]
    async fn malformed_and_unsatisfiable_ranges_yield_416() {
        let responder = responder(middleware());
        for range in ["bytes=garbage", "bytes=-", "units=0-1", "bytes=10-5", "bytes=999999-"] {
            let (_, response) = fetch(
                &responder,
                Method::GET,
                "/data/blob.bin",
                &[(RANGE, range)],
            )
            .await
            .unwrap();
            assert_eq!(
                response.status(),
                StatusCode::RANGE_NOT_SATISFIABLE,
                "range {}",
                range
            );
            assert_eq!(
                response.headers().get(CONTENT_RANGE).unwrap(),
                "bytes */326000"
            );
        }
    }

    #[test]
    fn range_parsing_classifies_errors() {
        assert_eq!(parse_range("bytes=0-99").unwrap(), (Some(0), Some(99)));
        assert_eq!(parse_range("bytes=-99").unwrap(), (None, Some(99)));
        assert_eq!(parse_range("bytes=100-").unwrap(), (Some(100), None));
        assert_eq!(parse_range("bytes=-").unwrap_err(), ParseError::InvalidRange);
        assert_eq!(parse_range("garbage").unwrap_err(), ParseError::InvalidRange);
        assert_eq!(
            parse_range("bytes=99999999999999999999-").unwrap_err(),
            ParseError::InvalidRange
        );
    }

    #[tokio::test]
    async fn if_range_mismatch_serves_the_full_file() {
        let responder = responder(middleware());
        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/data/blob.bin",
            &[(RANGE, "bytes=0-9"), (IF_RANGE, "W/\"stale\"")],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "326000");

        let (_, first) = fetch(&responder, Method::GET, "/data/blob.bin", &[])
            .await
            .unwrap();
        let etag = first.headers().get(ETAG).unwrap().to_str().unwrap().to_string();
        let (_, response) = fetch(
            &responder,
            Method::GET,
            "/data/blob.bin",
            &[(RANGE, "bytes=0-9"), (IF_RANGE, etag.as_str())],
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "10");
    }

    #[tokio::test]
    async fn head_requests_send_headers_only() {
        let responder = responder(middleware());
        let (_, response) = fetch(&responder, Method::HEAD, "/site/doc.html", &[])
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "24");
        assert!(matches!(response.body(), ResponseBody::Empty));
    }

    #[tokio::test]
    async fn directories_fall_back_to_index_html() {
        let responder = responder(middleware());
        let (_, response) = fetch(&responder, Method::GET, "/", &[]).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"<html>welcome</html>");

        let no_index = self::responder(middleware().with_index_html(false));
        let (_, err) = fetch(&no_index, Method::GET, "/", &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn traversal_attempts_are_rejected() {
        let responder = responder(middleware());
        for path in ["/../secret.txt", "/%2e%2e/secret.txt", "/a/../../b"] {
            let (_, err) = fetch(&responder, Method::GET, path, &[]).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "path {}", path);
        }
    }

    #[tokio::test]
    async fn misses_and_other_methods_pass_through() {
        let responder = responder(middleware());
        let (_, err) = fetch(&responder, Method::GET, "/nope.txt", &[])
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let (_, err) = fetch(&responder, Method::POST, "/index.html", &[])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cache_control_table_matches_by_media_type() {
        let mw = middleware()
            .with_cache_control("text/html", "no-cache")
            .with_cache_control("*", "public, max-age=3600");
        let responder = responder(mw);

        let (_, response) = fetch(&responder, Method::GET, "/site/doc.html", &[])
            .await
            .unwrap();
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "no-cache");

        let (_, response) = fetch(&responder, Method::GET, "/data/blob.bin", &[])
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(CACHE_CONTROL).unwrap(),
            "public, max-age=3600"
        );
    }

    #[tokio::test]
    async fn unknown_extensions_omit_content_type() {
        let responder = responder(middleware());
        let (_, response) = fetch(&responder, Method::GET, "/LICENSE", &[])
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn empty_files_serve_200_with_no_body() {
        let responder = responder(middleware());
        let (_, response) = fetch(&responder, Method::GET, "/empty.txt", &[])
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "0");
        assert!(matches!(response.body(), ResponseBody::Empty));
    }

    #[tokio::test]
    async fn successful_downstream_responses_pass_through() {
        let router = Router::build(|route| {
            route.get("/index.html", |_request, context: RequestContext| async move {
                Ok((context, Response::text("from the router")))
            });
        });
        let responder = crate::middleware::Pipeline::new()
            .add(middleware())
            .wrap(Arc::new(router));

        let (_, response) = fetch(&responder, Method::GET, "/index.html", &[])
            .await
            .unwrap();
        assert_eq!(body_bytes(response).await, b"from the router");
    }
}
