/*
 *  lib.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
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

pub mod address;
pub mod config;
pub mod controller;
pub mod error;
pub mod geocode;
pub mod geoloc;
pub mod location;
pub mod render;

pub use address::AddressRow;
pub use controller::{Controller, ControllerEvent, ControllerState, ViewState};
pub use geocode::{Placemark, ReverseGeocoder};
pub use location::{AuthorizationState, Location, LocationObserver, LocationProvider};
