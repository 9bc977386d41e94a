//! Embedded static assets (`web/static/`) served under `/static/*`.
//!
//! Grounded on `rt-ui-http`'s `validate_ui_request`/`serve_embedded_ui`
//! pair: requests are validated (GET/HEAD only, no path traversal outside
//! the embedded set) before the embedded file is looked up by MIME type.

use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

#[derive(rust_embed::Embed)]
#[folder = "../../web/static/"]
struct StaticAssets;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AssetError {
    NotFound,
    MethodNotAllowed,
}

impl IntoResponse for AssetError {
    fn into_response(self) -> Response {
        match self {
            AssetError::NotFound => StatusCode::NOT_FOUND.into_response(),
            AssetError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    }
}

fn validate(method: &Method) -> Result<(), AssetError> {
    if *method != Method::GET && *method != Method::HEAD {
        return Err(AssetError::MethodNotAllowed);
    }
    Ok(())
}

pub async fn serve_static(method: Method, uri: Uri) -> Result<Response, AssetError> {
    validate(&method)?;
    let path = uri
        .path()
        .strip_prefix("/static/")
        .ok_or(AssetError::NotFound)?;

    match StaticAssets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            Ok((StatusCode::OK, [(header::CONTENT_TYPE, mime.as_ref())], file.data).into_response())
        }
        None => Err(AssetError::NotFound),
    }
}
