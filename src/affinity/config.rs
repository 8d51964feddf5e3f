//   Copyright 2025 normcut developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.

//! Configuration of the affinity codec

use std::fmt::Display;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::image::ImageBatch;
use super::weight::{compute_affinity, Affinity};
use super::CodecError;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown affinity tag {tag:?}: expected weights<radius> or minW<radius>")]
    UnknownTag { tag: String },
}

/// Neighbourhood and storage settings used to encode images into affinities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityConfig {
    /// Maximal index distance of two connected pixels
    pub radius: usize,
    /// Whether the banded storage is used
    pub minified: bool,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        AffinityConfig {
            radius: 1,
            minified: false,
        }
    }
}

impl AffinityConfig {
    pub fn new(radius: usize, minified: bool) -> AffinityConfig {
        AffinityConfig { radius, minified }
    }

    /// Parses a compact tag of the form ``weights<radius>`` (dense storage) or
    /// ``minW<radius>`` (banded storage). The radius defaults to 1 if omitted.
    ///
    /// ``` rust
    /// use normcut::affinity::AffinityConfig;
    ///
    /// let config = AffinityConfig::from_tag("minW3").unwrap();
    /// assert_eq!(config, AffinityConfig::new(3, true));
    /// ```
    pub fn from_tag(tag: &str) -> Result<AffinityConfig, ConfigError> {
        let pattern = Regex::new(r"^(weights|minW)(\d*)$").unwrap();

        let unknown = || ConfigError::UnknownTag {
            tag: tag.to_string(),
        };
        let captures = pattern.captures(tag).ok_or_else(unknown)?;

        let minified = match captures.get(1).map(|x| x.as_str()) {
            Some("minW") => true,
            Some("weights") => false,
            _ => unreachable!(),
        };
        let radius = match captures.get(2).map(|x| x.as_str()) {
            None | Some("") => 1,
            Some(digits) => digits.parse::<usize>().map_err(|_| unknown())?,
        };

        Ok(AffinityConfig { radius, minified })
    }

    /// Encodes the given images with this configuration.
    pub fn encode(&self, image: &ImageBatch) -> Result<Affinity, CodecError> {
        let radius = i64::try_from(self.radius).unwrap_or(i64::MAX);
        compute_affinity(image, radius, self.minified)
    }
}

impl Display for AffinityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.minified {
            write!(f, "minW{}", self.radius)
        } else {
            write!(f, "weights{}", self.radius)
        }
    }
}

impl FromStr for AffinityConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AffinityConfig::from_tag(s)
    }
}
