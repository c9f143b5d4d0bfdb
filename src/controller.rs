/*
 *  controller.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 *
 *  Screen controller - owns permission and address state, drives the
 *  location provider and reverse geocoding, publishes state for the view
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

use log::{debug, info, warn};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::address::{AddressRow, rows_from_placemark};
use crate::error::GeocodeError;
use crate::geocode::{Placemark, ReverseGeocoder};
use crate::location::{AuthorizationState, Location, LocationObserver, LocationProvider};

/// Everything that can happen to the controller
#[derive(Debug)]
pub enum ControllerEvent {
    AuthorizationChanged(AuthorizationState),
    LocationsUpdated(Vec<Location>),
    GeocodeCompleted {
        request: u64,
        result: Result<Vec<Placemark>, GeocodeError>,
    },
}

/// Provider callbacks become controller events
impl LocationObserver for mpsc::UnboundedSender<ControllerEvent> {
    fn on_authorization_changed(&self, state: AuthorizationState) {
        if self.send(ControllerEvent::AuthorizationChanged(state)).is_err() {
            debug!("Controller gone, dropping authorization change");
        }
    }

    fn on_location_update(&self, locations: &[Location]) {
        if self.send(ControllerEvent::LocationsUpdated(locations.to_vec())).is_err() {
            debug!("Controller gone, dropping location update");
        }
    }
}

/// Published controller state. `rows` is only ever replaced whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerState {
    pub authorization: AuthorizationState,
    pub has_location_permission: bool,
    pub rows: Vec<AddressRow>,
}

impl ControllerState {
    pub fn new(authorization: AuthorizationState) -> Self {
        Self {
            authorization,
            has_location_permission: authorization.is_authorized(),
            rows: Vec::new(),
        }
    }

    /// First match wins: undecided, denied, no rows yet, rows
    pub fn view_state(&self) -> ViewState {
        if !self.authorization.is_determined() {
            ViewState::AwaitingPermissionDecision
        } else if !self.has_location_permission {
            ViewState::PermissionDenied
        } else if self.rows.is_empty() {
            ViewState::Loading
        } else {
            ViewState::Loaded(self.rows.clone())
        }
    }
}

/// What the screen shows
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    AwaitingPermissionDecision,
    PermissionDenied,
    Loading,
    Loaded(Vec<AddressRow>),
}

impl ViewState {
    /// No further change expected without new user or location input
    pub fn is_settled(&self) -> bool {
        matches!(self, ViewState::PermissionDenied | ViewState::Loaded(_))
    }
}

pub struct Controller<P, G> {
    provider: P,
    geocoder: Arc<G>,
    state: watch::Sender<ControllerState>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    next_request: u64,
    last_applied: Option<u64>,
    in_flight: usize,
}

impl<P, G> Controller<P, G>
where
    P: LocationProvider,
    G: ReverseGeocoder,
{
    /// Registers as the provider's observer and seeds state from its
    /// current authorization.
    pub fn new(mut provider: P, geocoder: G) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        provider.set_observer(Arc::new(events_tx.clone()));
        let (state, _) = watch::channel(ControllerState::new(provider.authorization_status()));
        Self {
            provider,
            geocoder: Arc::new(geocoder),
            state,
            events_tx,
            events_rx,
            next_request: 0,
            last_applied: None,
            in_flight: 0,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn state(&self) -> ControllerState {
        self.state.borrow().clone()
    }

    pub fn view_state(&self) -> ViewState {
        self.state.borrow().view_state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    /// Screen became visible: start updating if allowed, ask if never asked
    pub fn on_appear(&mut self) {
        let status = self.provider.authorization_status();
        self.set_authorization(status);
        match status {
            AuthorizationState::Authorized => self.provider.start_updating_location(),
            AuthorizationState::NotDetermined => {
                info!("Requesting location authorization");
                self.provider.request_authorization();
            }
            AuthorizationState::Denied => info!("Location access denied"),
        }
    }

    pub fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::AuthorizationChanged(status) => {
                debug!("Authorization changed: {:?}", status);
                self.set_authorization(status);
                if status.is_authorized() {
                    self.provider.start_updating_location();
                }
            }
            ControllerEvent::LocationsUpdated(locations) => {
                if let Some(latest) = locations.last() {
                    self.dispatch_geocode(latest.clone());
                }
            }
            ControllerEvent::GeocodeCompleted { request, result } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.apply_geocode(request, result);
            }
        }
    }

    fn set_authorization(&mut self, status: AuthorizationState) {
        self.state.send_if_modified(|s| {
            let changed = s.authorization != status
                || s.has_location_permission != status.is_authorized();
            s.authorization = status;
            s.has_location_permission = status.is_authorized();
            changed
        });
    }

    /// Fire off a reverse geocode for `location`; the answer comes back as
    /// a `GeocodeCompleted` event. Returns the request id.
    pub fn dispatch_geocode(&mut self, location: Location) -> u64 {
        let request = self.next_request;
        self.next_request += 1;
        self.in_flight += 1;
        debug!("Geocode request #{} for {}", request, location);

        let geocoder = Arc::clone(&self.geocoder);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = geocoder.reverse_geocode(&location).await;
            if events.send(ControllerEvent::GeocodeCompleted { request, result }).is_err() {
                debug!("Controller gone, dropping geocode #{}", request);
            }
        });
        request
    }

    /// Replace the rows from the last placemark of a completed request.
    /// Errors, empty results and answers older than the last applied one
    /// leave the rows untouched. Returns whether rows were replaced.
    pub fn apply_geocode(&mut self, request: u64, result: Result<Vec<Placemark>, GeocodeError>) -> bool {
        if self.last_applied.is_some_and(|last| request < last) {
            debug!("Discarding stale geocode #{} (already showing #{:?})", request, self.last_applied);
            return false;
        }
        let placemarks = match result {
            Ok(placemarks) => placemarks,
            Err(e) => {
                warn!("Reverse geocoding #{} failed: {}", request, e);
                return false;
            }
        };
        let Some(placemark) = placemarks.last() else {
            debug!("Geocode #{} returned no placemarks", request);
            return false;
        };

        let rows = rows_from_placemark(placemark);
        info!("Geocode #{}: {} address rows", request, rows.len());
        self.last_applied = Some(request);
        self.state.send_modify(|s| s.rows = rows);
        true
    }

    /// Wait for the next provider or geocoder event
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        self.events_rx.recv().await
    }

    /// Handle events until the view settles (loaded or denied)
    pub async fn run_until_settled(&mut self) -> ViewState {
        loop {
            let view = self.view_state();
            if view.is_settled() {
                return view;
            }
            match self.next_event().await {
                Some(event) => self.handle_event(event),
                None => return self.view_state(),
            }
        }
    }

    /// Number of geocode requests dispatched but not yet completed
    pub fn geocodes_in_flight(&self) -> usize {
        self.in_flight
    }

    /// One-shot variant of `run_until_settled`: also returns once every
    /// dispatched geocode has answered without producing rows, so a failed
    /// or empty lookup ends the run instead of waiting forever in Loading.
    pub async fn run_until_answered(&mut self) -> ViewState {
        loop {
            let view = self.view_state();
            if view.is_settled() {
                return view;
            }
            let Some(event) = self.next_event().await else {
                return self.view_state();
            };
            let geocode_done = matches!(event, ControllerEvent::GeocodeCompleted { .. });
            self.handle_event(event);
            if geocode_done && self.in_flight == 0 {
                return self.view_state();
            }
        }
    }

    /// Handle events until `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let event = tokio::select! {
                _ = &mut shutdown => None,
                event = self.events_rx.recv() => event,
            };
            match event {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
        debug!("Controller loop finished");
    }
}
