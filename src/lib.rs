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

//! Morty is a sanitizing web proxy: it fetches upstream HTTP(S) resources on
//! behalf of a client and returns a rewritten version with all active content
//! removed and every remaining URL routed back through the proxy under an
//! HMAC-authenticated envelope.

pub mod app;
pub mod assets;
pub mod config;
pub mod contenttype;
pub mod proxy;
pub mod sanitize;
pub mod templates;
pub mod utils;
