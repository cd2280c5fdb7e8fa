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

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentTypeError {
    #[error("empty media type")]
    EmptyMediaType,
    #[error("expected token after slash")]
    MissingSubType,
    #[error("malformed media parameter: {0}")]
    MalformedParameter(String),
}

/// Parsed `type/subtype+suffix; key=value` media type.
///
/// The media type portion is lowercased during parsing; parameter keys are
/// lowercased too, parameter values are kept verbatim. Parameters live in a
/// `BTreeMap` so [`ContentType::to_string`] is a canonical, stable
/// reserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub top_level_type: String,
    pub sub_type: String,
    pub suffix: String,
    pub parameters: BTreeMap<String, String>,
}

impl ContentType {
    pub fn parse(input: &str) -> Result<Self, ContentTypeError> {
        let mut segments = input.split(';');
        let mediatype = segments
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mediatype.is_empty() {
            return Err(ContentTypeError::EmptyMediaType);
        }

        let mut parameters = BTreeMap::new();
        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ContentTypeError::MalformedParameter(segment.to_string()))?;
            parameters.insert(
                key.trim().to_ascii_lowercase(),
                unquote(value.trim()).to_string(),
            );
        }

        let (top_level_type, sub_type, suffix) = match mediatype.split_once('/') {
            None => (mediatype, String::new(), String::new()),
            Some((_, "")) => return Err(ContentTypeError::MissingSubType),
            Some((top, rest)) => match rest.split_once('+') {
                None => (top.to_string(), rest.to_string(), String::new()),
                Some((sub, suffix)) => (top.to_string(), sub.to_string(), suffix.to_string()),
            },
        };

        Ok(Self {
            top_level_type,
            sub_type,
            suffix,
            parameters,
        })
    }

    /// Drops every parameter whose key is not in `allowed`.
    pub fn filter_parameters(&mut self, allowed: &[&str]) {
        self.parameters.retain(|key, _| allowed.contains(&key.as_str()));
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mimetype = if self.suffix.is_empty() {
            if self.sub_type.is_empty() {
                self.top_level_type.clone()
            } else {
                format!("{}/{}", self.top_level_type, self.sub_type)
            }
        } else {
            format!("{}/{}+{}", self.top_level_type, self.sub_type, self.suffix)
        };
        f.write_str(&format_media_type(&mimetype, &self.parameters))
    }
}

/// Serializes a media type with its parameters, quoting values that are not
/// plain RFC 2045 tokens. Parameter keys are written lowercased.
pub fn format_media_type(mediatype: &str, parameters: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(mediatype.len() + parameters.len() * 16);
    out.push_str(mediatype);
    for (key, value) in parameters {
        out.push_str("; ");
        out.push_str(&key.to_ascii_lowercase());
        out.push('=');
        if is_token(value) {
            out.push_str(value);
        } else {
            out.push('"');
            for c in value.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }
    out
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0]
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
        })
}

/// Predicate over a [`ContentType`], assembled statically at boot.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches when the token is a substring of the type, subtype or suffix.
    Contains(&'static str),
    /// Per-field equality where `*` matches anything. The input is expected
    /// to be lowercased already (the parser guarantees it).
    Equals {
        top_level_type: &'static str,
        sub_type: &'static str,
        suffix: &'static str,
    },
    /// Short-circuiting disjunction.
    Any(Vec<Filter>),
}

impl Filter {
    pub fn equals(
        top_level_type: &'static str,
        sub_type: &'static str,
        suffix: &'static str,
    ) -> Self {
        Filter::Equals {
            top_level_type,
            sub_type,
            suffix,
        }
    }

    pub fn matches(&self, content_type: &ContentType) -> bool {
        match self {
            Filter::Contains(token) => {
                content_type.top_level_type.contains(token)
                    || content_type.sub_type.contains(token)
                    || content_type.suffix.contains(token)
            }
            Filter::Equals {
                top_level_type,
                sub_type,
                suffix,
            } => {
                (*top_level_type == "*" || *top_level_type == content_type.top_level_type)
                    && (*sub_type == "*" || *sub_type == content_type.sub_type)
                    && (*suffix == "*" || *suffix == content_type.suffix)
            }
            Filter::Any(filters) => filters.iter().any(|filter| filter.matches(content_type)),
        }
    }
}
