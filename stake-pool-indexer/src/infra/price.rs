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

use crate::domain::price::PriceFeed;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

/// Config for the price API.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Endpoint of a simple price API taking `ids` and `vs_currencies` query parameters.
    pub url: String,

    pub coin_id: String,
    pub currency: String,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// A [PriceFeed] implementation based on a simple price HTTP API.
#[derive(Debug, Clone)]
pub struct HttpPriceFeed {
    http: HttpClient,
    url: String,
    coin_id: String,
    currency: String,
}

impl HttpPriceFeed {
    pub fn new(config: Config) -> Result<Self, PriceFeedError> {
        let Config {
            url,
            coin_id,
            currency,
            timeout,
        } = config;

        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(PriceFeedError::Client)?;

        Ok(Self {
            http,
            url,
            coin_id,
            currency,
        })
    }
}

impl PriceFeed for HttpPriceFeed {
    type Error = PriceFeedError;

    async fn get_price(&self) -> Result<f64, Self::Error> {
        let prices = self
            .http
            .get(&self.url)
            .query(&[
                ("ids", self.coin_id.as_str()),
                ("vs_currencies", self.currency.as_str()),
            ])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(PriceFeedError::Http)?
            .json::<Prices>()
            .await
            .map_err(PriceFeedError::Http)?;

        price(&prices, &self.coin_id, &self.currency)
    }
}

/// Prices by coin id and currency.
type Prices = HashMap<String, HashMap<String, f64>>;

fn price(prices: &Prices, coin_id: &str, currency: &str) -> Result<f64, PriceFeedError> {
    prices
        .get(coin_id)
        .and_then(|prices| prices.get(currency))
        .copied()
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| PriceFeedError::MissingPrice(coin_id.to_owned(), currency.to_owned()))
}

/// Error possibly returned by [HttpPriceFeed].
#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("cannot create HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("cannot get price")]
    Http(#[source] reqwest::Error),

    #[error("no valid price for {0} in {1}")]
    MissingPrice(String, String),
}
