// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Canonical metric keys built from a name and a set of tags.
//!
//! A key is the bare name when there are no tags, otherwise the name, one space, and the tags
//! as a query string sorted by tag name, e.g. `requests host=a&path=%2Fapi`. Two tag sets with
//! the same pairs always produce the same key.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use url::form_urlencoded;

use crate::error::Error;

/// Tags qualifying a metric name.
pub type Tags = BTreeMap<String, String>;

/// A canonical `(name, tags)` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Builds the canonical key for `name` qualified by `tags`.
    ///
    /// ```rust
    /// # use ringstats::key::Key;
    /// let key = Key::new("a", [("y", "2"), ("x", "1")]);
    /// assert_eq!(key.as_str(), "a x=1&y=2");
    /// assert_eq!(Key::new("a", [("", ""); 0]), Key::from("a"));
    /// ```
    pub fn new<I, K, V>(name: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let tags: Tags = tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_parts(name, &tags)
    }

    /// Builds the canonical key for `name` qualified by an existing tag map.
    pub fn from_parts(name: &str, tags: &Tags) -> Self {
        if tags.is_empty() {
            return Key(name.to_string());
        }
        let prefix = format!("{name} ");
        let start = prefix.len();
        let key = form_urlencoded::Serializer::for_suffix(prefix, start)
            .extend_pairs(tags)
            .finish();
        Key(key)
    }

    /// Splits this key back into its name and tags.
    pub fn decode(&self) -> Result<(String, Tags), Error> {
        match self.0.split_once(' ') {
            None => Ok((self.0.clone(), Tags::new())),
            Some((name, query)) => {
                let tags = parse_tags(query)
                    .map_err(|e| e.with_context("key", &self.0))?;
                Ok((name.to_string(), tags))
            }
        }
    }

    /// Returns this key with `extra` tags added, replacing tags of the same name.
    pub fn with_tags(&self, extra: &Tags) -> Result<Self, Error> {
        if extra.is_empty() {
            return Ok(self.clone());
        }
        let (name, mut tags) = self.decode()?;
        tags.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(Self::from_parts(&name, &tags))
    }

    /// Returns the canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns the canonical string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// `form_urlencoded::parse` is lenient, so the escapes and separators it would silently accept
// are rejected up front.
fn check_query(query: &str) -> Result<(), Error> {
    if query.contains(';') {
        return Err(Error::deserial("invalid semicolon separator in tags"));
    }
    let bytes = query.as_bytes();
    for (i, _) in query.match_indices('%') {
        let escape = bytes.get(i + 1..i + 3);
        if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
            let end = (i + 3).min(bytes.len());
            return Err(Error::deserial(format!(
                "invalid URL escape {:?}",
                String::from_utf8_lossy(&bytes[i..end])
            )));
        }
    }
    Ok(())
}

fn parse_tags(query: &str) -> Result<Tags, Error> {
    check_query(query)?;
    let mut tags = Tags::new();
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        tags.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    Ok(tags)
}
