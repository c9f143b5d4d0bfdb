/*
 *  geocode.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 *
 *  Reverse geocoding - coordinate to placemark(s) via Nominatim, or a
 *  fixed offline answer
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

use log::{debug, info};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::config::{Config, GeocoderKind};
use crate::error::GeocodeError;
use crate::location::Location;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Human readable address components for a coordinate. Every attribute
/// is optional; absent ones never produce a row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Placemark {
    pub name: Option<String>,
    pub sub_thoroughfare: Option<String>,
    pub thoroughfare: Option<String>,
    pub locality: Option<String>,
    pub administrative_area: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub inland_water: Option<String>,
    pub ocean: Option<String>,
    pub areas_of_interest: Option<Vec<String>>,
    pub sub_locality: Option<String>,
    pub sub_administrative_area: Option<String>,
}

/// Coordinate to placemarks. Zero placemarks is a valid answer.
pub trait ReverseGeocoder: Send + Sync + 'static {
    fn reverse_geocode(
        &self,
        location: &Location,
    ) -> impl Future<Output = Result<Vec<Placemark>, GeocodeError>> + Send;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NominatimReply {
    error: Option<String>,
    name: Option<String>,
    address: BTreeMap<String, String>,
}

/// OpenStreetMap Nominatim `/reverse` endpoint
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        let mut headers = header::HeaderMap::new();
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn reverse_url(&self, location: &Location) -> String {
        format!("{}/reverse?format=jsonv2&lat={:.6}&lon={:.6}&addressdetails=1",
            self.base_url, location.latitude, location.longitude)
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, location: &Location) -> Result<Vec<Placemark>, GeocodeError> {
        let url = self.reverse_url(location);
        debug!("Reverse geocoding {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            // 429 when the public instance's usage policy is exceeded
            return Err(GeocodeError::Api(format!("HTTP {}", status)));
        }
        let body = response.text().await?;

        placemarks_from_nominatim(&body)
    }
}

/// Decode a Nominatim jsonv2 reverse reply. An `error` body (e.g. "Unable
/// to geocode" over open water) means no placemarks, not a failure.
pub fn placemarks_from_nominatim(body: &str) -> Result<Vec<Placemark>, GeocodeError> {
    let reply: NominatimReply = serde_json::from_str(body)?;
    if let Some(err) = reply.error {
        debug!("Nominatim returned no result: {}", err);
        return Ok(Vec::new());
    }

    let addr = &reply.address;
    let pick = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .filter_map(|k| addr.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string)
    };

    let areas: Vec<String> = ["tourism", "amenity", "leisure", "building", "aeroway"]
        .iter()
        .filter_map(|k| addr.get(*k))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();

    Ok(vec![Placemark {
        name: reply.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        sub_thoroughfare: pick(&["house_number"]),
        thoroughfare: pick(&["road"]),
        locality: pick(&["city", "town", "village", "hamlet"]),
        administrative_area: pick(&["state"]),
        postal_code: pick(&["postcode"]),
        country: pick(&["country"]),
        inland_water: pick(&["water"]),
        ocean: pick(&["ocean", "sea"]),
        areas_of_interest: (!areas.is_empty()).then_some(areas),
        sub_locality: pick(&["suburb", "neighbourhood", "quarter"]),
        sub_administrative_area: pick(&["county", "state_district"]),
    }])
}

/// Always answers with the same placemarks, whatever the coordinate
#[derive(Debug, Clone)]
pub struct FixedGeocoder {
    placemarks: Vec<Placemark>,
}

impl FixedGeocoder {
    pub fn new(placemarks: Vec<Placemark>) -> Self {
        Self { placemarks }
    }
}

impl Default for FixedGeocoder {
    fn default() -> Self {
        Self::new(vec![apple_park()])
    }
}

impl ReverseGeocoder for FixedGeocoder {
    async fn reverse_geocode(&self, _location: &Location) -> Result<Vec<Placemark>, GeocodeError> {
        Ok(self.placemarks.clone())
    }
}

/// Placemark for the synthetic test coordinate
pub fn apple_park() -> Placemark {
    Placemark {
        name: Some("Apple Park".to_string()),
        sub_thoroughfare: Some("1".to_string()),
        thoroughfare: Some("Apple Park Way".to_string()),
        locality: Some("Cupertino".to_string()),
        administrative_area: Some("CA".to_string()),
        postal_code: Some("95014".to_string()),
        country: Some("United States".to_string()),
        areas_of_interest: Some(vec!["Apple Park".to_string()]),
        sub_administrative_area: Some("Santa Clara".to_string()),
        ..Default::default()
    }
}

/// Runtime selectable backend
#[derive(Debug, Clone)]
pub enum Geocoder {
    Nominatim(NominatimGeocoder),
    Fixed(FixedGeocoder),
}

impl ReverseGeocoder for Geocoder {
    async fn reverse_geocode(&self, location: &Location) -> Result<Vec<Placemark>, GeocodeError> {
        match self {
            Geocoder::Nominatim(g) => g.reverse_geocode(location).await,
            Geocoder::Fixed(g) => g.reverse_geocode(location).await,
        }
    }
}

pub fn build_geocoder(config: &Config) -> Result<Geocoder, GeocodeError> {
    let geocoder = config.geocoder.clone().unwrap_or_default();
    match geocoder.kind.unwrap_or_default() {
        GeocoderKind::Nominatim => {
            let base_url = geocoder.base_url.as_deref().unwrap_or(DEFAULT_NOMINATIM_URL);
            info!("Reverse geocoding with Nominatim at {}", base_url);
            Ok(Geocoder::Nominatim(NominatimGeocoder::new(
                base_url,
                &config.user_agent(),
                config.geocoder_timeout(),
            )?))
        }
        GeocoderKind::Fixed => {
            info!("Reverse geocoding with fixed placemarks");
            Ok(Geocoder::Fixed(match geocoder.placemarks {
                Some(placemarks) => FixedGeocoder::new(placemarks),
                None => FixedGeocoder::default(),
            }))
        }
    }
}
