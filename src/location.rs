/*
 *  location.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 *
 *  Location service - authorization state and location updates, either
 *  synthesized (test mode) or resolved from config / GeoIP lookup
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

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{AuthorizationSetting, Config};
use crate::error::LocationError;
use crate::geoloc;

/// Coordinate reported by the synthetic provider (Apple Park, Cupertino)
pub const TEST_MODE_COORDINATE: (f64, f64) = (37.334606, -122.009102);

/// The user's decision about location access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    NotDetermined,
    Denied,
    Authorized,
}

impl AuthorizationState {
    pub fn is_authorized(self) -> bool {
        self == AuthorizationState::Authorized
    }

    /// True once the user has answered the permission prompt either way
    pub fn is_determined(self) -> bool {
        self != AuthorizationState::NotDetermined
    }
}

impl From<AuthorizationSetting> for AuthorizationState {
    fn from(setting: AuthorizationSetting) -> Self {
        match setting {
            AuthorizationSetting::Prompt => AuthorizationState::NotDetermined,
            AuthorizationSetting::Granted => AuthorizationState::Authorized,
            AuthorizationSetting::Denied => AuthorizationState::Denied,
        }
    }
}

/// Source of location data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Synthetic,
    UserConfig,
    GeoIP,
}

/// A position fix. Only the coordinate feeds geocoding, the rest is metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub source: LocationSource,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, source: LocationSource) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: Utc::now(),
            source,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6}) [{}]",
            self.latitude, self.longitude,
            match self.source {
                LocationSource::Synthetic => "synthetic",
                LocationSource::UserConfig => "config",
                LocationSource::GeoIP => "geoip",
            })
    }
}

/// Receives provider notifications. Several locations may arrive in one
/// update; consumers use the most recent (last) one.
pub trait LocationObserver: Send + Sync {
    fn on_authorization_changed(&self, state: AuthorizationState);
    fn on_location_update(&self, locations: &[Location]);
}

/// Capability over a location service
pub trait LocationProvider: Send {
    /// Register the single observer; replaces any previous one
    fn set_observer(&mut self, observer: Arc<dyn LocationObserver>);

    fn authorization_status(&self) -> AuthorizationState;

    /// Ask the user for permission. The answer arrives through
    /// `LocationObserver::on_authorization_changed`.
    fn request_authorization(&mut self);

    /// Begin delivering location updates. Calling again while already
    /// updating has no effect.
    fn start_updating_location(&mut self);
}

impl<P: LocationProvider + ?Sized> LocationProvider for Box<P> {
    fn set_observer(&mut self, observer: Arc<dyn LocationObserver>) {
        (**self).set_observer(observer)
    }

    fn authorization_status(&self) -> AuthorizationState {
        (**self).authorization_status()
    }

    fn request_authorization(&mut self) {
        (**self).request_authorization()
    }

    fn start_updating_location(&mut self) {
        (**self).start_updating_location()
    }
}

/// Deterministic provider: always authorized, and every start emits the
/// fixed test coordinate once, synchronously. Never touches the network or
/// the terminal.
#[derive(Default)]
pub struct SyntheticLocationProvider {
    observer: Option<Arc<dyn LocationObserver>>,
}

impl SyntheticLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocationProvider for SyntheticLocationProvider {
    fn set_observer(&mut self, observer: Arc<dyn LocationObserver>) {
        self.observer = Some(observer);
    }

    fn authorization_status(&self) -> AuthorizationState {
        AuthorizationState::Authorized
    }

    fn request_authorization(&mut self) {
        if let Some(observer) = self.observer.as_ref() {
            observer.on_authorization_changed(AuthorizationState::Authorized);
        }
    }

    fn start_updating_location(&mut self) {
        let (lat, lng) = TEST_MODE_COORDINATE;
        debug!("Synthetic location update: {:.6}, {:.6}", lat, lng);
        if let Some(observer) = self.observer.as_ref() {
            observer.on_location_update(&[Location::new(lat, lng, LocationSource::Synthetic)]);
        }
    }
}

/// Blocking yes/no question put to the user
pub trait AuthorizationPrompt: Send + Sync {
    fn ask(&self) -> AuthorizationState;
}

/// Prompt on the controlling terminal. Anything other than y/yes denies.
pub struct TerminalPrompt;

impl AuthorizationPrompt for TerminalPrompt {
    fn ask(&self) -> AuthorizationState {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "Allow {} to use your location? [y/N] ", env!("CARGO_PKG_NAME"));
        let _ = stderr.flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => parse_answer(&answer),
            Err(e) => {
                warn!("Could not read permission answer: {}", e);
                AuthorizationState::Denied
            }
        }
    }
}

fn parse_answer(answer: &str) -> AuthorizationState {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => AuthorizationState::Authorized,
        _ => AuthorizationState::Denied,
    }
}

/// Where the platform provider gets its coordinate from
#[derive(Debug, Clone)]
pub struct CoordinateSource {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub user_agent: String,
    pub timeout: Duration,
}

/// Get location from config or fallback to GeoIP lookup
pub async fn resolve_location(source: &CoordinateSource) -> Result<Location, LocationError> {
    // Try user-specified location from config first
    if let (Some(lat), Some(lng)) = (source.latitude, source.longitude) {
        if valid_coordinate(lat, lng) {
            debug!("Using location from config: {:.4}, {:.4}", lat, lng);
            return Ok(Location::new(lat, lng, LocationSource::UserConfig));
        }
        warn!("Invalid coordinates in config: {}, {}", lat, lng);
        return Err(LocationError::InvalidCoordinates { latitude: lat, longitude: lng });
    }

    info!("No location in config, attempting GeoIP lookup...");
    match geoloc::fetch_location(&source.user_agent, source.timeout).await {
        Ok(fix) => {
            info!("GeoIP lookup successful: {}, {} ({:.4}, {:.4})",
                fix.city.as_deref().unwrap_or("?"),
                fix.region_code.as_deref().unwrap_or("?"),
                fix.latitude, fix.longitude);
            if !valid_coordinate(fix.latitude, fix.longitude) {
                return Err(LocationError::InvalidCoordinates {
                    latitude: fix.latitude,
                    longitude: fix.longitude,
                });
            }
            Ok(Location::new(fix.latitude, fix.longitude, LocationSource::GeoIP))
        }
        Err(e) => Err(LocationError::GeoIPFailed(e.to_string())),
    }
}

pub fn valid_coordinate(lat: f64, lng: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Desktop stand-in for the OS location service.
///
/// Authorization starts from config and is changed only by answering the
/// prompt. Updates come from a background task which resolves the
/// coordinate once, or on every `update_interval` tick when one is set.
/// Location updates must be started from within a tokio runtime.
pub struct PlatformLocationProvider {
    observer: Option<Arc<dyn LocationObserver>>,
    authorization: Arc<watch::Sender<AuthorizationState>>,
    prompt: Arc<dyn AuthorizationPrompt>,
    prompt_pending: bool,
    source: CoordinateSource,
    update_interval: Option<Duration>,
    updater: Option<JoinHandle<()>>,
}

impl PlatformLocationProvider {
    pub fn new(
        initial: AuthorizationState,
        prompt: Arc<dyn AuthorizationPrompt>,
        source: CoordinateSource,
        update_interval: Option<Duration>,
    ) -> Self {
        let (authorization, _) = watch::channel(initial);
        Self {
            observer: None,
            authorization: Arc::new(authorization),
            prompt,
            prompt_pending: false,
            source,
            update_interval,
            updater: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let location = config.location.clone().unwrap_or_default();
        let initial = location.authorization.unwrap_or_default().into();
        Self::new(
            initial,
            Arc::new(TerminalPrompt),
            CoordinateSource {
                latitude: location.latitude,
                longitude: location.longitude,
                user_agent: config.user_agent(),
                timeout: config.geocoder_timeout(),
            },
            location.update_interval_secs.map(Duration::from_secs),
        )
    }

    /// True while the update task is alive
    pub fn is_updating(&self) -> bool {
        self.updater.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl LocationProvider for PlatformLocationProvider {
    fn set_observer(&mut self, observer: Arc<dyn LocationObserver>) {
        self.observer = Some(observer);
    }

    fn authorization_status(&self) -> AuthorizationState {
        *self.authorization.borrow()
    }

    fn request_authorization(&mut self) {
        let current = self.authorization_status();
        if current.is_determined() {
            debug!("Authorization already {:?}, not prompting", current);
            if let Some(observer) = self.observer.as_ref() {
                observer.on_authorization_changed(current);
            }
            return;
        }
        if self.prompt_pending {
            debug!("Authorization prompt already showing");
            return;
        }
        self.prompt_pending = true;

        let prompt = Arc::clone(&self.prompt);
        let authorization = Arc::clone(&self.authorization);
        let observer = self.observer.clone();
        // detached: a pending read must not hold up runtime shutdown
        let spawned = thread::Builder::new()
            .name("auth-prompt".to_string())
            .spawn(move || {
                let decision = prompt.ask();
                info!("Location authorization: {:?}", decision);
                authorization.send_replace(decision);
                if let Some(observer) = observer {
                    observer.on_authorization_changed(decision);
                }
            });
        if let Err(e) = spawned {
            warn!("Could not start authorization prompt: {}", e);
            self.prompt_pending = false;
        }
    }

    fn start_updating_location(&mut self) {
        if !self.authorization_status().is_authorized() {
            debug!("Not authorized, ignoring start of location updates");
            return;
        }
        if self.updater.is_some() {
            debug!("Location updates already running");
            return;
        }
        let Some(observer) = self.observer.clone() else {
            warn!("No observer registered, location updates not started");
            return;
        };

        let source = self.source.clone();
        let interval = self.update_interval;
        info!("Starting location updates{}",
            interval.map(|d| format!(" every {}s", d.as_secs())).unwrap_or_default());

        self.updater = Some(tokio::spawn(async move {
            loop {
                match resolve_location(&source).await {
                    Ok(location) => {
                        debug!("Location update: {}", location);
                        observer.on_location_update(&[location]);
                    }
                    Err(e) => warn!("Location lookup failed: {}", e),
                }
                match interval {
                    Some(period) => tokio::time::sleep(period).await,
                    None => break,
                }
            }
        }));
    }
}

impl Drop for PlatformLocationProvider {
    fn drop(&mut self) {
        if let Some(handle) = self.updater.take() {
            handle.abort();
        }
    }
}

/// Pick the provider implementation for this run
pub fn build_provider(config: &Config) -> Box<dyn LocationProvider> {
    if config.test_mode() {
        info!("Test mode: using synthetic location provider");
        Box::new(SyntheticLocationProvider::new())
    } else {
        Box::new(PlatformLocationProvider::from_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        authorizations: Mutex<Vec<AuthorizationState>>,
        locations: Mutex<Vec<Vec<Location>>>,
    }

    impl LocationObserver for Recorder {
        fn on_authorization_changed(&self, state: AuthorizationState) {
            self.authorizations.lock().unwrap().push(state);
        }

        fn on_location_update(&self, locations: &[Location]) {
            self.locations.lock().unwrap().push(locations.to_vec());
        }
    }

    struct FixedAnswer(AuthorizationState);

    /// Never answers until the sender side is dropped
    struct StuckAnswer(Mutex<std::sync::mpsc::Receiver<()>>);

    impl AuthorizationPrompt for StuckAnswer {
        fn ask(&self) -> AuthorizationState {
            let _ = self.0.lock().unwrap().recv();
            AuthorizationState::Denied
        }
    }

    impl AuthorizationPrompt for FixedAnswer {
        fn ask(&self) -> AuthorizationState {
            self.0
        }
    }

    fn config_source(lat: f64, lng: f64) -> CoordinateSource {
        CoordinateSource {
            latitude: Some(lat),
            longitude: Some(lng),
            user_agent: "teeloc-test".to_string(),
            timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_synthetic_is_always_authorized() {
        let provider = SyntheticLocationProvider::new();
        assert_eq!(provider.authorization_status(), AuthorizationState::Authorized);
    }

    #[test]
    fn test_synthetic_request_notifies_synchronously() {
        let recorder = Arc::new(Recorder::default());
        let mut provider = SyntheticLocationProvider::new();
        provider.set_observer(recorder.clone());

        provider.request_authorization();
        assert_eq!(*recorder.authorizations.lock().unwrap(), vec![AuthorizationState::Authorized]);
    }

    #[test]
    fn test_synthetic_emits_exactly_one_fixed_location() {
        let recorder = Arc::new(Recorder::default());
        let mut provider = SyntheticLocationProvider::new();
        provider.set_observer(recorder.clone());

        provider.start_updating_location();
        let updates = recorder.locations.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].len(), 1);
        assert_eq!(updates[0][0].latitude, 37.334606);
        assert_eq!(updates[0][0].longitude, -122.009102);
        assert_eq!(updates[0][0].source, LocationSource::Synthetic);
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), AuthorizationState::Authorized);
        assert_eq!(parse_answer(" YES "), AuthorizationState::Authorized);
        assert_eq!(parse_answer("\n"), AuthorizationState::Denied);
        assert_eq!(parse_answer("nope"), AuthorizationState::Denied);
    }

    #[tokio::test]
    async fn test_config_location() {
        let loc = resolve_location(&config_source(40.7128, -74.0060)).await.unwrap();
        assert_eq!(loc.latitude, 40.7128);
        assert_eq!(loc.longitude, -74.0060);
        assert_eq!(loc.source, LocationSource::UserConfig);
    }

    #[tokio::test]
    async fn test_invalid_coordinates() {
        let result = resolve_location(&config_source(100.0, -74.0)).await;
        assert!(matches!(result, Err(LocationError::InvalidCoordinates { .. })));
    }

    #[tokio::test]
    async fn test_platform_prompt_updates_status_and_notifies() {
        let recorder = Arc::new(Recorder::default());
        let mut provider = PlatformLocationProvider::new(
            AuthorizationState::NotDetermined,
            Arc::new(FixedAnswer(AuthorizationState::Authorized)),
            config_source(51.5, -0.12),
            None,
        );
        provider.set_observer(recorder.clone());
        provider.request_authorization();

        let mut status = provider.authorization.subscribe();
        status.wait_for(|s| s.is_determined()).await.unwrap();
        // observer is called right after the status is stored
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(provider.authorization_status(), AuthorizationState::Authorized);
        assert_eq!(*recorder.authorizations.lock().unwrap(), vec![AuthorizationState::Authorized]);
    }

    #[tokio::test]
    async fn test_platform_ignores_start_when_denied() {
        let recorder = Arc::new(Recorder::default());
        let mut provider = PlatformLocationProvider::new(
            AuthorizationState::Denied,
            Arc::new(FixedAnswer(AuthorizationState::Denied)),
            config_source(51.5, -0.12),
            None,
        );
        provider.set_observer(recorder.clone());
        provider.start_updating_location();
        assert!(!provider.is_updating());
        assert!(provider.updater.is_none());
    }

    #[tokio::test]
    async fn test_platform_start_is_idempotent() {
        let recorder = Arc::new(Recorder::default());
        let mut provider = PlatformLocationProvider::new(
            AuthorizationState::Authorized,
            Arc::new(FixedAnswer(AuthorizationState::Authorized)),
            config_source(51.5, -0.12),
            None,
        );
        provider.set_observer(recorder.clone());

        provider.start_updating_location();
        provider.start_updating_location();
        if let Some(handle) = provider.updater.take() {
            handle.await.unwrap();
        }

        let updates = recorder.locations.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0][0].source, LocationSource::UserConfig);
    }

    #[test]
    fn test_unanswered_prompt_does_not_block_runtime_shutdown() {
        let (release, stuck) = std::sync::mpsc::channel::<()>();
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let mut provider = PlatformLocationProvider::new(
                    AuthorizationState::NotDetermined,
                    Arc::new(StuckAnswer(Mutex::new(stuck))),
                    config_source(51.5, -0.12),
                    None,
                );
                provider.request_authorization();
                assert!(provider.prompt_pending);
            });
            drop(rt);
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok(),
            "runtime shutdown waited on the permission prompt");
        drop(release);
    }
}
