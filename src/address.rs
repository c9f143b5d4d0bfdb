/*
 *  address.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 *
 *  Placemark to display rows - the fixed field table
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

use serde::{Deserialize, Serialize};

use crate::geocode::Placemark;

/// One banner worth of address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRow {
    pub title: String,
    pub value: String,
    pub show_title: bool,
}

impl AddressRow {
    pub fn new(title: &str, value: String, show_title: bool) -> Self {
        Self {
            title: title.to_string(),
            value,
            show_title,
        }
    }
}

/// Placemark attributes shown as rows, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    SubThoroughfare,
    Thoroughfare,
    Locality,
    AdministrativeArea,
    PostalCode,
    Country,
    InlandWater,
    Ocean,
    AreasOfInterest,
    SubLocality,
    SubAdministrativeArea,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Name,
        Field::SubThoroughfare,
        Field::Thoroughfare,
        Field::Locality,
        Field::AdministrativeArea,
        Field::PostalCode,
        Field::Country,
        Field::InlandWater,
        Field::Ocean,
        Field::AreasOfInterest,
        Field::SubLocality,
        Field::SubAdministrativeArea,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::SubThoroughfare => "subThoroughfare",
            Field::Thoroughfare => "thoroughfare",
            Field::Locality => "locality",
            Field::AdministrativeArea => "administrativeArea",
            Field::PostalCode => "postalCode",
            Field::Country => "country",
            Field::InlandWater => "Inland Water",
            Field::Ocean => "Ocean",
            Field::AreasOfInterest => "Areas of Interest",
            Field::SubLocality => "Sub-Locality",
            Field::SubAdministrativeArea => "Sub-Administrative Area",
        }
    }

    /// Rows rendered with a caption above the value
    pub fn show_title(self) -> bool {
        matches!(self,
            Field::InlandWater
            | Field::Ocean
            | Field::AreasOfInterest
            | Field::SubLocality
            | Field::SubAdministrativeArea)
    }

    pub fn value(self, p: &Placemark) -> Option<String> {
        match self {
            Field::Name => name_if_different_from_thoroughfare(p),
            Field::SubThoroughfare => p.sub_thoroughfare.clone(),
            Field::Thoroughfare => p.thoroughfare.clone(),
            Field::Locality => p.locality.clone(),
            Field::AdministrativeArea => p.administrative_area.clone(),
            Field::PostalCode => p.postal_code.clone(),
            Field::Country => p.country.clone(),
            Field::InlandWater => p.inland_water.clone(),
            Field::Ocean => p.ocean.clone(),
            // joined without a separator
            Field::AreasOfInterest => p.areas_of_interest.as_ref().map(|a| a.concat()),
            Field::SubLocality => p.sub_locality.clone(),
            Field::SubAdministrativeArea => p.sub_administrative_area.clone(),
        }
    }
}

/// "{subThoroughfare} {thoroughfare}", only when both parts are known
pub fn full_thoroughfare(placemark: &Placemark) -> Option<String> {
    match (&placemark.sub_thoroughfare, &placemark.thoroughfare) {
        (Some(number), Some(street)) => Some(format!("{} {}", number, street)),
        _ => None,
    }
}

/// The placemark name, unless it just repeats the street address
pub fn name_if_different_from_thoroughfare(placemark: &Placemark) -> Option<String> {
    let name = placemark.name.as_ref()?;
    match full_thoroughfare(placemark) {
        Some(street) if street == *name => None,
        _ => Some(name.clone()),
    }
}

/// Derive the display rows for a placemark: absent fields are dropped,
/// untitled rows come before titled ones, each group in table order.
pub fn rows_from_placemark(placemark: &Placemark) -> Vec<AddressRow> {
    let rows = Field::ALL.iter().filter_map(|field| {
        field.value(placemark).map(|value| AddressRow::new(field.title(), value, field.show_title()))
    });
    let (untitled, titled): (Vec<_>, Vec<_>) = rows.partition(|r| !r.show_title);
    untitled.into_iter().chain(titled).collect()
}

pub fn untitled_rows(rows: &[AddressRow]) -> impl Iterator<Item = &AddressRow> {
    rows.iter().filter(|r| !r.show_title)
}

pub fn titled_rows(rows: &[AddressRow]) -> impl Iterator<Item = &AddressRow> {
    rows.iter().filter(|r| r.show_title)
}
