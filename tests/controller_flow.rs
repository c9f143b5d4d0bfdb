/*
 *  tests/controller_flow.rs
 *
 *  Integration tests for the permission / location / geocode flow
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 */

use std::sync::Arc;

use teeloc::address::rows_from_placemark;
use teeloc::controller::{Controller, ControllerEvent, ViewState};
use teeloc::geocode::{FixedGeocoder, Placemark};
use teeloc::location::{
    AuthorizationState, Location, LocationObserver, LocationProvider, LocationSource,
    SyntheticLocationProvider,
};

/// Provider whose answers are driven by the test
struct ScriptedProvider {
    status: AuthorizationState,
    observer: Option<Arc<dyn LocationObserver>>,
    authorization_requests: usize,
    start_calls: usize,
}

impl ScriptedProvider {
    fn new(status: AuthorizationState) -> Self {
        Self {
            status,
            observer: None,
            authorization_requests: 0,
            start_calls: 0,
        }
    }

    fn answer(&mut self, status: AuthorizationState) {
        self.status = status;
        if let Some(observer) = self.observer.as_ref() {
            observer.on_authorization_changed(status);
        }
    }

    fn deliver(&self, locations: &[Location]) {
        if let Some(observer) = self.observer.as_ref() {
            observer.on_location_update(locations);
        }
    }
}

impl LocationProvider for ScriptedProvider {
    fn set_observer(&mut self, observer: Arc<dyn LocationObserver>) {
        self.observer = Some(observer);
    }

    fn authorization_status(&self) -> AuthorizationState {
        self.status
    }

    fn request_authorization(&mut self) {
        self.authorization_requests += 1;
    }

    fn start_updating_location(&mut self) {
        self.start_calls += 1;
    }
}

fn s(v: &str) -> Option<String> {
    Some(v.to_string())
}

fn full_placemark() -> Placemark {
    Placemark {
        name: s("Infinite Loop Campus"),
        sub_thoroughfare: s("1"),
        thoroughfare: s("Infinite Loop"),
        locality: s("Cupertino"),
        administrative_area: s("CA"),
        postal_code: s("95014"),
        country: s("United States"),
        inland_water: None,
        ocean: None,
        areas_of_interest: Some(vec!["Infinite Loop".to_string()]),
        sub_locality: None,
        sub_administrative_area: s("Santa Clara"),
    }
}

async fn pump(controller: &mut Controller<ScriptedProvider, FixedGeocoder>) {
    let event = controller.next_event().await.expect("event channel open");
    controller.handle_event(event);
}

#[tokio::test]
async fn test_prompt_grant_locate_load() {
    let geocoder = FixedGeocoder::new(vec![full_placemark()]);
    let mut controller = Controller::new(ScriptedProvider::new(AuthorizationState::NotDetermined), geocoder);

    controller.on_appear();
    assert_eq!(controller.view_state(), ViewState::AwaitingPermissionDecision);
    assert_eq!(controller.provider().authorization_requests, 1);
    assert_eq!(controller.provider().start_calls, 0);

    controller.provider_mut().answer(AuthorizationState::Authorized);
    pump(&mut controller).await;
    assert_eq!(controller.view_state(), ViewState::Loading);
    assert_eq!(controller.provider().start_calls, 1);

    controller.provider().deliver(&[Location::new(37.3318, -122.0312, LocationSource::UserConfig)]);
    pump(&mut controller).await; // location -> geocode dispatched
    pump(&mut controller).await; // geocode completed

    let rows = match controller.view_state() {
        ViewState::Loaded(rows) => rows,
        other => panic!("expected loaded, got {:?}", other),
    };
    let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec![
        "name", "subThoroughfare", "thoroughfare", "locality", "administrativeArea",
        "postalCode", "country", "Areas of Interest", "Sub-Administrative Area",
    ]);
    assert_eq!(rows, rows_from_placemark(&full_placemark()));
}

#[tokio::test]
async fn test_denial_shows_denied() {
    let mut controller = Controller::new(
        ScriptedProvider::new(AuthorizationState::NotDetermined),
        FixedGeocoder::default(),
    );
    controller.on_appear();
    controller.provider_mut().answer(AuthorizationState::Denied);
    pump(&mut controller).await;

    assert_eq!(controller.view_state(), ViewState::PermissionDenied);
    assert_eq!(controller.provider().start_calls, 0);
    assert!(!controller.state().has_location_permission);
}

#[tokio::test]
async fn test_already_authorized_starts_without_prompt() {
    let mut controller = Controller::new(
        ScriptedProvider::new(AuthorizationState::Authorized),
        FixedGeocoder::default(),
    );
    controller.on_appear();
    assert_eq!(controller.provider().authorization_requests, 0);
    assert_eq!(controller.provider().start_calls, 1);
    assert_eq!(controller.view_state(), ViewState::Loading);
}

#[tokio::test]
async fn test_already_denied_does_not_prompt() {
    let mut controller = Controller::new(
        ScriptedProvider::new(AuthorizationState::Denied),
        FixedGeocoder::default(),
    );
    controller.on_appear();
    assert_eq!(controller.provider().authorization_requests, 0);
    assert_eq!(controller.provider().start_calls, 0);
    assert_eq!(controller.view_state(), ViewState::PermissionDenied);
}

#[tokio::test]
async fn test_revoked_permission_hides_rows() {
    let mut controller = Controller::new(
        ScriptedProvider::new(AuthorizationState::Authorized),
        FixedGeocoder::default(),
    );
    controller.apply_geocode(0, Ok(vec![full_placemark()]));
    assert!(matches!(controller.view_state(), ViewState::Loaded(_)));

    controller.handle_event(ControllerEvent::AuthorizationChanged(AuthorizationState::Denied));
    assert_eq!(controller.view_state(), ViewState::PermissionDenied);
    // rows are kept, just not shown
    assert!(!controller.state().rows.is_empty());
}

#[tokio::test]
async fn test_test_mode_is_deterministic() {
    let mut controller = Controller::new(SyntheticLocationProvider::new(), FixedGeocoder::default());
    assert_eq!(controller.provider().authorization_status(), AuthorizationState::Authorized);

    controller.on_appear();
    let first = controller.next_event().await.unwrap();
    match &first {
        ControllerEvent::LocationsUpdated(locations) => {
            assert_eq!(locations.len(), 1);
            assert_eq!((locations[0].latitude, locations[0].longitude), (37.334606, -122.009102));
        }
        other => panic!("expected a location update, got {:?}", other),
    }
    controller.handle_event(first);
    assert!(matches!(controller.run_until_settled().await, ViewState::Loaded(_)));
}

#[tokio::test]
async fn test_restart_keeps_rows_until_new_location() {
    let mut controller = Controller::new(SyntheticLocationProvider::new(), FixedGeocoder::default());
    controller.on_appear();
    let loaded = controller.run_until_settled().await;

    controller.provider_mut().start_updating_location();
    assert_eq!(controller.view_state(), loaded);
    assert_eq!(controller.state().rows.len(), match &loaded {
        ViewState::Loaded(rows) => rows.len(),
        _ => unreachable!(),
    });

    // the new location is geocoded and replaces rows wholesale, no duplicates
    pump_synthetic(&mut controller).await;
    pump_synthetic(&mut controller).await;
    assert_eq!(controller.view_state(), loaded);
}

async fn pump_synthetic(controller: &mut Controller<SyntheticLocationProvider, FixedGeocoder>) {
    let event = controller.next_event().await.expect("event channel open");
    controller.handle_event(event);
}
