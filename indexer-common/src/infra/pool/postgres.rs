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

use derive_more::Deref;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
};
use std::time::Duration;
use thiserror::Error;

/// Configuration for a [PostgresPool].
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: SecretString,

    #[serde_as(as = "DisplayFromStr")]
    pub sslmode: PgSslMode,

    pub max_connections: u32,

    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
}

/// New type for a Postgres connection pool, dereferencing to [PgPool].
#[derive(Debug, Clone, Deref)]
pub struct PostgresPool(PgPool);

impl PostgresPool {
    /// Create a new [PostgresPool] with the given [Config], connecting eagerly.
    pub async fn new(config: Config) -> Result<Self, Error> {
        let Config {
            host,
            port,
            dbname,
            user,
            password,
            sslmode,
            max_connections,
            idle_timeout,
            max_lifetime,
        } = config;

        let connect_options = PgConnectOptions::new()
            .host(&host)
            .port(port)
            .database(&dbname)
            .username(&user)
            .password(password.expose_secret())
            .ssl_mode(sslmode);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(idle_timeout)
            .max_lifetime(max_lifetime)
            .connect_with(connect_options)
            .await?;

        Ok(Self(pool))
    }
}

/// Error possibly returned by [PostgresPool::new].
#[derive(Debug, Error)]
#[error("cannot create Postgres connection pool")]
pub struct Error(#[from] sqlx::Error);
