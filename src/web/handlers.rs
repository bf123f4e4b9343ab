use crate::{
    error::AppError,
    media::{MediaEvent, MediaSearchRequest, Node},
    state::AppState,
    web::xml::{
        generate_browse_response, generate_description_xml, generate_didl, generate_scpd_xml,
        generate_soap_fault, parse_browse_request, BrowseFlag,
    },
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

const UPNP_NO_SUCH_OBJECT: u16 = 701;

fn xml_response(status: StatusCode, xml: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/xml; charset=utf-8"),
            (header::HeaderName::from_static("ext"), ""),
        ],
        xml,
    )
        .into_response()
}

pub async fn root_handler() -> &'static str {
    "MediaLink Media Server"
}

pub async fn description_handler(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.get_config().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        generate_description_xml(&config),
    )
}

pub async fn content_directory_scpd() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        generate_scpd_xml(),
    )
}

pub async fn content_directory_control(
    State(state): State<AppState>,
    body: String,
) -> Result<Response, AppError> {
    let request = parse_browse_request(&body)?;
    debug!("Browse {:?}", request);

    let manager = &state.media_manager;
    let Some(node) = manager.get_node(&request.object_id).await else {
        return Ok(xml_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            generate_soap_fault(UPNP_NO_SUCH_OBJECT, "No such object"),
        ));
    };

    let response = match request.browse_flag {
        BrowseFlag::Metadata => generate_browse_response(&generate_didl(&[node], manager), 1, 1),
        BrowseFlag::DirectChildren => {
            let children = manager
                .search_child_nodes(&MediaSearchRequest::new(request.object_id.clone()))
                .await;
            let total = children.len();
            let count = if request.requested_count == 0 {
                total
            } else {
                request.requested_count
            };
            let page: Vec<Node> = children
                .into_iter()
                .skip(request.starting_index)
                .take(count)
                .collect();
            generate_browse_response(&generate_didl(&page, manager), page.len(), total)
        }
    };

    Ok(xml_response(StatusCode::OK, response))
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    pub id: String,
}

/// Stream a local file, honouring `Range`, or redirect to a remote entry
pub async fn serve_content(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let node = state
        .media_manager
        .get_node(&query.id)
        .await
        .ok_or(AppError::NotFound)?;

    let content = match node {
        Node::Content(content) => content,
        Node::RawUrl(raw) => return Ok(Redirect::temporary(&raw.url).into_response()),
        Node::Folder(_) => return Err(AppError::BadRequest(format!("{} is a folder", query.id))),
    };

    let mut file = File::open(&content.path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound
        } else {
            AppError::Io(e)
        }
    })?;
    let file_size = file.metadata().await?.len();

    let mut response_builder = Response::builder()
        .header(header::CONTENT_TYPE, content.mime_type.as_str())
        .header(header::ACCEPT_RANGES, "bytes");

    let range = match headers.get(header::RANGE) {
        Some(range_header) => {
            let range_str = range_header.to_str().map_err(|_| AppError::InvalidRange)?;
            debug!("Received range request: {}", range_str);
            Some(parse_range_header(range_str, file_size)?)
        }
        None => None,
    };

    let (status, start, len) = match range {
        Some((start, end)) => {
            response_builder = response_builder.header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, file_size),
            );
            (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
        }
        None => (StatusCode::OK, 0, file_size),
    };

    response_builder = response_builder.header(header::CONTENT_LENGTH, len);

    file.seek(std::io::SeekFrom::Start(start)).await?;
    let stream = ReaderStream::with_capacity(file.take(len), 64 * 1024);

    Ok(response_builder.status(status).body(Body::from_stream(stream))?)
}

/// First range of a `bytes=` header as inclusive offsets
fn parse_range_header(range_str: &str, file_size: u64) -> Result<(u64, u64), AppError> {
    let range_part = range_str.strip_prefix("bytes=").ok_or(AppError::InvalidRange)?;
    let first_range = range_part.split(',').next().ok_or(AppError::InvalidRange)?.trim();
    let (start_str, end_str) = first_range.split_once('-').ok_or(AppError::InvalidRange)?;

    if file_size == 0 {
        return Err(AppError::InvalidRange);
    }
    let last = file_size - 1;

    let (start, end) = if start_str.is_empty() {
        // Suffix range like "-500"
        let suffix_len: u64 = end_str.parse().map_err(|_| AppError::InvalidRange)?;
        if suffix_len == 0 {
            return Err(AppError::InvalidRange);
        }
        (file_size.saturating_sub(suffix_len), last)
    } else {
        let start: u64 = start_str.parse().map_err(|_| AppError::InvalidRange)?;
        let end = if end_str.is_empty() {
            last
        } else {
            end_str
                .parse::<u64>()
                .map_err(|_| AppError::InvalidRange)?
                .min(last)
        };
        (start, end)
    };

    if start > end || start >= file_size {
        return Err(AppError::InvalidRange);
    }
    Ok((start, end))
}

pub async fn api_get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Node>, AppError> {
    state
        .media_manager
        .get_node(&id)
        .await
        .map(Json)
        .ok_or(AppError::NotFound)
}

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    /// Comma separated mime types the client can play
    pub mime: Option<String>,
}

pub async fn api_child_nodes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ChildrenQuery>,
) -> Result<Json<Vec<Node>>, AppError> {
    let manager = &state.media_manager;
    if manager.get_node(&id).await.is_none() {
        return Err(AppError::NotFound);
    }

    let mime_types: Vec<String> = query
        .mime
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_string)
        .collect();

    let request = MediaSearchRequest::new(id).with_mime_types(mime_types);
    Ok(Json(manager.search_child_nodes(&request).await))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    pub id: Option<String>,
}

/// Queue a scan of one node, or of the whole tree without an id
pub async fn api_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<StatusCode, AppError> {
    let event = match request.id {
        Some(id) => MediaEvent::scan_node(id),
        None => MediaEvent::scan_all(),
    };
    info!("Scan requested: {:?}", event);

    state
        .media_events
        .send(event)
        .map_err(|_| anyhow::anyhow!("No media event listener running"))?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_header() {
        assert_eq!(parse_range_header("bytes=0-99", 1000).unwrap(), (0, 99));
        assert_eq!(parse_range_header("bytes=500-", 1000).unwrap(), (500, 999));
        assert_eq!(parse_range_header("bytes=-100", 1000).unwrap(), (900, 999));
        assert_eq!(parse_range_header("bytes=-5000", 1000).unwrap(), (0, 999));
        assert_eq!(parse_range_header("bytes=900-5000", 1000).unwrap(), (900, 999));
        assert_eq!(parse_range_header("bytes=0-1, 5-6", 1000).unwrap(), (0, 1));
    }

    #[test]
    fn test_parse_range_header_invalid() {
        assert!(matches!(parse_range_header("items=0-1", 1000), Err(AppError::InvalidRange)));
        assert!(matches!(parse_range_header("bytes=1000-", 1000), Err(AppError::InvalidRange)));
        assert!(matches!(parse_range_header("bytes=20-10", 1000), Err(AppError::InvalidRange)));
        assert!(matches!(parse_range_header("bytes=abc", 1000), Err(AppError::InvalidRange)));
        assert!(matches!(parse_range_header("bytes=0-", 0), Err(AppError::InvalidRange)));
    }
}
