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

use http::StatusCode;
use thiserror::Error;
use url::Url;

/// Everything the pipeline can refuse a request for, along with the HTTP
/// status it renders with. Each variant except [`ProxyError::ExitRequired`]
/// is served as a landing page carrying the error text.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(r#"invalid "mortyhash" parameter"#)]
    InvalidHash,

    #[error("forbidden content type {0}")]
    ForbiddenContentType(String),

    /// The target uses a scheme the proxy cannot sanitize; the handler
    /// renders the exit interstitial instead of the landing page.
    #[error("cannot sanitize scheme of {0}")]
    ExitRequired(Url),

    #[error("request timeout")]
    UpstreamTimeout(#[source] reqwest::Error),

    #[error("upstream request failed: {0}")]
    UpstreamTransport(#[source] reqwest::Error),

    #[error("response body exceeds size limit")]
    ResponseTooLarge,

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("invalid response encoding")]
    InvalidEncoding,

    #[error("invalid content type")]
    InvalidContentType,

    #[error("invalid request uri: {0}")]
    InvalidRequestUri(#[source] url::ParseError),

    #[error("invalid response: {status} ({uri})")]
    UpstreamStatus { status: u16, uri: String },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidHash
            | ProxyError::ForbiddenContentType(_)
            | ProxyError::ExitRequired(_) => StatusCode::FORBIDDEN,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamTransport(_)
            | ProxyError::ResponseTooLarge
            | ProxyError::InvalidRequestUri(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Not a registered code, but part of the wire contract.
            ProxyError::TooManyRedirects => {
                StatusCode::from_u16(310).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ProxyError::InvalidEncoding | ProxyError::InvalidContentType => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}
