// This file is part of midnight-indexer.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;
use std::env;

const CONFIG_FILE: &str = "CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Extension methods for configuration structs.
pub trait ConfigExt
where
    Self: for<'de> Deserialize<'de>,
{
    /// Load the configuration from the YAML file named by the `CONFIG_FILE` environment variable
    /// (default `config.yaml`), overridden by environment variables prefixed with `APP__`, using
    /// `__` as the nesting separator, e.g. `APP__INFRA__STORAGE__PASSWORD`.
    fn load() -> Result<Self, Box<figment::Error>> {
        let config_file =
            env::var(CONFIG_FILE).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Figment::new()
            .merge(Yaml::file(config_file))
            .merge(Env::prefixed("APP__").split("__"))
            .extract()
            .map_err(Box::new)
    }
}

impl<T> ConfigExt for T where T: for<'de> Deserialize<'de> {}

#[cfg(test)]
mod tests {
    use crate::config::ConfigExt;
    use figment::Jail;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct Config {
        name: String,
        inner: Inner,
    }

    #[derive(Debug, Deserialize)]
    struct Inner {
        #[serde(with = "humantime_serde")]
        interval: Duration,
        attempts: u32,
    }

    #[test]
    fn test_load() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                "name: pools\ninner:\n  interval: 30s\n  attempts: 3\n",
            )?;
            jail.set_env("APP__INNER__ATTEMPTS", "5");

            let config = Config::load().map_err(|error| *error)?;
            assert_eq!(config.name, "pools");
            assert_eq!(config.inner.interval, Duration::from_secs(30));
            assert_eq!(config.inner.attempts, 5);

            Ok(())
        });
    }

    #[test]
    fn test_load_custom_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "other.yaml",
                "name: other\ninner:\n  interval: 1m\n  attempts: 1\n",
            )?;
            jail.set_env("CONFIG_FILE", "other.yaml");

            let config = Config::load().map_err(|error| *error)?;
            assert_eq!(config.name, "other");
            assert_eq!(config.inner.interval, Duration::from_secs(60));

            Ok(())
        });
    }
}
