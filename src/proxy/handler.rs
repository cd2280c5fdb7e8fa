/* Morty (AGPL-3.0)

Copyright (C) 2025 - Morty Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use url::form_urlencoded;

use crate::proxy::pipeline;
use crate::proxy::server::AppState;
use crate::sanitize::auth::verify_request_uri;
use crate::templates;
use crate::utils::ProxyError;

const MAX_REQUEST_BODY_SIZE: usize = 4 * 1024 * 1024;

/// Fallback handler for every path: unwraps the proxy envelope
/// (`mortyurl` + optional `mortyhash` from the query or a posted form),
/// authenticates it, and hands the target to the pipeline.
pub async fn proxy_envelope(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body_bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(error = %err, "failed to read request body");
            return main_page_response(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                Some("failed to read request body"),
            );
        }
    };

    let mut query_params: Vec<(String, String)> = parts
        .uri
        .query()
        .map(|query| form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let is_form_post = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
    let mut form_params: Vec<(String, String)> = if is_form_post {
        form_urlencoded::parse(&body_bytes).into_owned().collect()
    } else {
        Vec::new()
    };

    let request_hash = pop_request_param(&mut query_params, &mut form_params, "mortyhash");
    let request_uri = pop_request_param(&mut query_params, &mut form_params, "mortyurl");

    let Some(request_uri) = request_uri else {
        return main_page_response(&state, StatusCode::OK, None);
    };

    if let Some(key) = &state.config.key {
        let hash = request_hash.unwrap_or_default();
        if !verify_request_uri(request_uri.as_bytes(), hash.as_bytes(), key) {
            return error_response(&state, ProxyError::InvalidHash);
        }
    }

    // Whatever else the client put in the query travels on to the upstream.
    let mut target = request_uri;
    if !query_params.is_empty() {
        let residual: String = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&query_params)
            .finish();
        target.push(if target.contains('?') { '&' } else { '?' });
        target.push_str(&residual);
    }

    match pipeline::process_uri(
        &state,
        parts.method.clone(),
        &parts.headers,
        body_bytes,
        target,
    )
    .await
    {
        Ok(response) => response,
        Err(err) => error_response(&state, err),
    }
}

/// Takes the first occurrence of a parameter, searching the query before the
/// posted form, and removes it so it does not reappear upstream.
fn pop_request_param(
    query: &mut Vec<(String, String)>,
    form: &mut Vec<(String, String)>,
    name: &str,
) -> Option<String> {
    let mut value = query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone());
    if value.is_none() {
        value = form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone());
        form.retain(|(key, _)| key != name);
    }
    query.retain(|(key, _)| key != name);
    value
}

pub fn error_response(state: &AppState, err: ProxyError) -> Response {
    tracing::debug!(error = %err, "refusing request");
    match err {
        ProxyError::ExitRequired(uri) => {
            html_response(StatusCode::FORBIDDEN, "text/html", templates::exit_page(uri.as_str()))
        }
        other => main_page_response(state, other.status(), Some(&other.to_string())),
    }
}

pub fn main_page_response(state: &AppState, status: StatusCode, error: Option<&str>) -> Response {
    html_response(
        status,
        "text/html; charset=UTF-8",
        templates::main_page(state.config.key.is_some(), error),
    )
}

fn html_response(status: StatusCode, content_type: &str, page: String) -> Response {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(page))
        .unwrap_or_default()
}
