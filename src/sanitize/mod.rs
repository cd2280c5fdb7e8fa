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

/// Content transformation modules: URI cleanup/proxification with its HMAC
/// authentication, plus the CSS and HTML rewriters built on top.
pub mod auth;
pub mod css;
pub mod html;
pub mod uri;

pub use css::sanitize_css;
pub use html::sanitize_html;
pub use uri::{proxify_uri, sanitize_uri, RequestContext};
