/*
 *  geoloc.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 *
 *  Coarse GeoIP position used when no coordinate is configured
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */
use serde::Deserialize;
use std::time::Duration;
use reqwest::{Client, header, Error};

pub const GEOIP_URL: &str = "https://ipapi.co/json/";

#[derive(Debug, Clone, Deserialize)]
pub struct GeoIpFix {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

pub async fn fetch_location(user_agent: &str, timeout: Duration) -> Result<GeoIpFix, Error> {
    let mut headers = header::HeaderMap::new();
    headers.insert("Accept", header::HeaderValue::from_static("application/json"));
    headers.insert("Connection", header::HeaderValue::from_static("close"));

    let client = Client::builder()
        .user_agent(user_agent)
        .connect_timeout(timeout)
        .default_headers(headers)
        .timeout(timeout)
        .build()?;

    let fix = client
        .get(GEOIP_URL)
        .send()
        .await?
        .error_for_status()? // none 2xx raise
        .json::<GeoIpFix>()
        .await?;

    Ok(fix)
}
