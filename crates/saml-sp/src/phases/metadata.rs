use crate::error::Error;
use crate::state::SamlState;
use axum::http::header;
use axum::response::{IntoResponse, Response};

/// Serves the SP metadata document. Stateless and idempotent.
pub fn metadata(state: &SamlState) -> Result<Response, Error> {
    let xml = state.engine.build_metadata()?;
    Ok(([(header::CONTENT_TYPE, "application/xml")], xml).into_response())
}
