/*
 *  error.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error types for location, geocoding and configuration
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

use thiserror::Error;

/// Failures while resolving the device coordinate
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("GeoIP lookup failed: {0}")]
    GeoIPFailed(String),
    #[error("Invalid coordinates: {latitude}, {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

/// Failures from a reverse geocoding backend.
///
/// The controller never surfaces these to the view, they are logged and dropped.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Geocoder API error: {0}")]
    Api(String),
}
