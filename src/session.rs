use std::{future::Future, sync::Arc, time::Duration};

use derive_more::Display;
use log::*;
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::{
    config::Config,
    services::{
        directions::DirectionsService,
        geocoding::GeocodingService,
        location::{AuthorizationStatus, LocationRequest, LocationService},
        render::RenderSurface,
        Coordinate, Place, PolylineStyle, RouteCandidate, TransportMode,
    },
    viewport::{FitOptions, Viewport},
    RouteError,
};

pub const CURRENT_LOCATION_LABEL: &str = "Current location";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    #[display(fmt = "idle")]
    Idle,
    #[display(fmt = "awaiting geocode")]
    AwaitingGeocode,
    #[display(fmt = "awaiting location fix")]
    AwaitingLocationFix,
    #[display(fmt = "awaiting route")]
    AwaitingRoute,
    #[display(fmt = "displaying")]
    Displaying,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteDisplay {
    pub origin: Coordinate,
    pub destination: Place,
    pub route: RouteCandidate,
    /// The region applied to the surface, after its display adjustment.
    pub viewport: Viewport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The query was empty; nothing changed.
    Ignored,
    Displayed(RouteDisplay),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub fit: FitOptions,
    pub location: LocationRequest,
    pub location_fix_timeout: Duration,
    pub transport_mode: TransportMode,
    pub route_style: PolylineStyle,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions::from(&Config::default())
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        SessionOptions {
            fit: config.fit,
            location: config.location,
            location_fix_timeout: config.location_fix_timeout,
            transport_mode: config.transport_mode,
            route_style: config.route_style,
        }
    }
}

struct Session<S> {
    state: SearchState,
    generation: u64,
    user_location: Option<Coordinate>,
    dest_location: Option<Place>,
    surface: S,
}

impl<S> Session<S> {
    fn transition(&mut self, next: SearchState) {
        debug!("Search {}: {} -> {}.", self.generation, self.state, next);
        self.state = next;
    }
}

/// Identifies one search. Resolves as superseded once a newer search starts.
struct SearchToken {
    generation: u64,
    receiver: watch::Receiver<u64>,
}

impl SearchToken {
    async fn superseded(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() != self.generation {
                return;
            }
            if self.receiver.changed().await.is_err() {
                // Session dropped; nothing can supersede us any more.
                std::future::pending::<()>().await;
            }
        }
    }

    async fn guard<F: Future>(&mut self, future: F) -> Result<F::Output, RouteError> {
        tokio::select! {
            biased;
            _ = self.superseded() => Err(RouteError::Superseded),
            output = future => Ok(output),
        }
    }
}

/// One user's search screen: the coordinates of the current search plus the
/// surface they are drawn on.
///
/// Only the most recent search may touch the session. Older searches are
/// cancelled when a new one starts and their late results are discarded.
pub struct SearchSession<S> {
    inner: Mutex<Session<S>>,
    cancel: watch::Sender<u64>,
    geocoder: Arc<dyn GeocodingService>,
    directions: Arc<dyn DirectionsService>,
    location: Arc<dyn LocationService>,
    options: SessionOptions,
}

impl<S: RenderSurface> SearchSession<S> {
    pub fn new(
        surface: S,
        geocoder: Arc<dyn GeocodingService>,
        directions: Arc<dyn DirectionsService>,
        location: Arc<dyn LocationService>,
        options: SessionOptions,
    ) -> Self {
        SearchSession {
            inner: Mutex::new(Session {
                state: SearchState::Idle,
                generation: 0,
                user_location: None,
                dest_location: None,
                surface,
            }),
            cancel: watch::channel(0).0,
            geocoder,
            directions,
            location,
            options,
        }
    }

    pub async fn state(&self) -> SearchState {
        self.inner.lock().await.state
    }

    pub async fn user_location(&self) -> Option<Coordinate> {
        self.inner.lock().await.user_location
    }

    pub async fn destination(&self) -> Option<Place> {
        self.inner.lock().await.dest_location.clone()
    }

    pub async fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.lock().await.surface)
    }

    /// Geocodes `query`, waits for the user's location and draws the route
    /// between them.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, RouteError> {
        let query = query.trim();
        if query.is_empty() {
            debug!("Ignoring empty search.");
            return Ok(SearchOutcome::Ignored);
        }

        let mut token = self.begin().await;
        match self.run(&mut token, query).await {
            Ok(display) => Ok(SearchOutcome::Displayed(display)),
            Err(RouteError::Superseded) => {
                debug!("Search {} superseded.", token.generation);
                Err(RouteError::Superseded)
            }
            Err(e) => {
                info!("Search {} for {:?} failed: {}", token.generation, query, e);
                if let Ok(mut session) = self.current(&token).await {
                    session.transition(SearchState::Idle);
                }
                Err(e)
            }
        }
    }

    async fn begin(&self) -> SearchToken {
        let mut session = self.inner.lock().await;
        session.generation += 1;
        let generation = session.generation;
        self.cancel.send_replace(generation);

        session.user_location = None;
        session.dest_location = None;
        session.surface.remove_all_markers();
        session.surface.remove_all_overlays();
        session.transition(SearchState::AwaitingGeocode);

        SearchToken {
            generation,
            receiver: self.cancel.subscribe(),
        }
    }

    /// Locks the session if `token` still belongs to the latest search.
    async fn current(&self, token: &SearchToken) -> Result<MutexGuard<'_, Session<S>>, RouteError> {
        let session = self.inner.lock().await;
        if session.generation != token.generation {
            return Err(RouteError::Superseded);
        }
        Ok(session)
    }

    async fn run(&self, token: &mut SearchToken, query: &str) -> Result<RouteDisplay, RouteError> {
        trace!("Search {}: geocoding {:?}.", token.generation, query);
        let place = token.guard(self.geocoder.geocode(query)).await??;
        {
            let mut session = self.current(token).await?;
            session.surface.add_marker(place.coordinate, &place.label);
            session.dest_location = Some(place);
            session.transition(SearchState::AwaitingLocationFix);
        }

        let fix = self.acquire_fix(token).await?;
        let (origin, destination) = {
            let mut session = self.current(token).await?;
            session.user_location = Some(fix);
            session.surface.add_marker(fix, CURRENT_LOCATION_LABEL);
            session.transition(SearchState::AwaitingRoute);
            match (session.user_location, session.dest_location.clone()) {
                (Some(origin), Some(destination)) => (origin, destination),
                _ => return Err(RouteError::LocationUnavailable("search lost its endpoints".into())),
            }
        };

        trace!("Search {}: requesting route.", token.generation);
        let candidates = token
            .guard(self.directions.route(
                origin,
                destination.coordinate,
                self.options.transport_mode,
                false,
            ))
            .await??;

        let mut session = self.current(token).await?;
        let route = candidates
            .into_iter()
            .next()
            .ok_or(RouteError::DirectionsEmptyResult)?;
        session
            .surface
            .draw_polyline(route.points(), self.options.route_style);

        let region = self.options.fit.fit(origin, destination.coordinate);
        let viewport = session.surface.region_that_fits(region);
        session.surface.set_viewport(viewport, true);
        session.transition(SearchState::Displaying);

        Ok(RouteDisplay {
            origin,
            destination,
            route,
            viewport,
        })
    }

    async fn acquire_fix(&self, token: &mut SearchToken) -> Result<Coordinate, RouteError> {
        let mut status = self.location.authorization_status().await;
        if status == AuthorizationStatus::NotDetermined {
            status = token.guard(self.location.request_authorization()).await?;
        }
        if status == AuthorizationStatus::Denied {
            return Err(RouteError::PermissionDenied);
        }

        let mut updates = self.location.start_updates(self.options.location).await?;
        let limit = self.options.location_fix_timeout;
        match tokio::time::timeout(limit, token.guard(updates.next_fix())).await {
            Err(_) => Err(RouteError::LocationUnavailable(format!(
                "no location fix within {}s",
                limit.as_secs()
            ))),
            Ok(Err(e)) => Err(e),
            // Revoking access closes the stream.
            Ok(Ok(None)) => match self.location.authorization_status().await {
                AuthorizationStatus::Denied => Err(RouteError::PermissionDenied),
                _ => Err(RouteError::LocationUnavailable(
                    "location updates stopped".into(),
                )),
            },
            Ok(Ok(Some(fix))) => Ok(fix),
        }
    }
}
