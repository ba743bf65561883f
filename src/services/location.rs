use std::{collections::HashMap, str::FromStr, sync::Arc};

use async_trait::async_trait;
use derive_more::Display;
use log::*;
use tokio::sync::{watch, Mutex, Notify};

use super::Coordinate;
use crate::RouteError;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    #[display(fmt = "not determined")]
    NotDetermined,
    #[display(fmt = "granted")]
    Granted,
    #[display(fmt = "denied")]
    Denied,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    #[default]
    #[display(fmt = "best")]
    Best,
    #[display(fmt = "10m")]
    TenMeters,
    #[display(fmt = "100m")]
    HundredMeters,
    #[display(fmt = "1km")]
    Kilometer,
}

impl FromStr for Accuracy {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(Accuracy::Best),
            "10m" => Ok(Accuracy::TenMeters),
            "100m" => Ok(Accuracy::HundredMeters),
            "1km" => Ok(Accuracy::Kilometer),
            other => Err(RouteError::Config(format!("unknown accuracy {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRequest {
    pub accuracy: Accuracy,
    /// Fixes closer than this to the previous delivered fix are skipped.
    pub min_distance_meters: f64,
}

impl Default for LocationRequest {
    fn default() -> Self {
        LocationRequest {
            accuracy: Accuracy::Best,
            min_distance_meters: 300.0,
        }
    }
}

#[async_trait]
pub trait LocationService: Send + Sync {
    async fn authorization_status(&self) -> AuthorizationStatus;

    /// Asks the user for access. May return `NotDetermined` while the answer
    /// is pending.
    async fn request_authorization(&self) -> AuthorizationStatus;

    async fn start_updates(&self, request: LocationRequest) -> Result<LocationUpdates, RouteError>;
}

/// A stream of location fixes.
pub struct LocationUpdates {
    receiver: watch::Receiver<Option<Coordinate>>,
    min_distance_meters: f64,
    last: Option<Coordinate>,
    primed: bool,
}

impl LocationUpdates {
    pub fn new(receiver: watch::Receiver<Option<Coordinate>>, request: LocationRequest) -> Self {
        LocationUpdates {
            receiver,
            min_distance_meters: request.min_distance_meters,
            last: None,
            primed: false,
        }
    }

    /// Waits for the next fix that passes the distance filter. Returns `None`
    /// once the source stops publishing.
    pub async fn next_fix(&mut self) -> Option<Coordinate> {
        loop {
            if self.primed {
                self.receiver.changed().await.ok()?;
            }
            self.primed = true;

            let current = *self.receiver.borrow_and_update();
            let Some(fix) = current else { continue };
            let far_enough = self
                .last
                .map_or(true, |last| last.distance_to(&fix) >= self.min_distance_meters);
            if far_enough {
                self.last = Some(fix);
                return Some(fix);
            }
            trace!("Skipping fix {} within distance filter.", fix);
        }
    }
}

struct UserEntry {
    status: AuthorizationStatus,
    sender: watch::Sender<Option<Coordinate>>,
    prompt: Arc<Notify>,
}

impl UserEntry {
    fn new() -> Self {
        UserEntry {
            status: AuthorizationStatus::NotDetermined,
            sender: watch::channel(None).0,
            prompt: Arc::new(Notify::new()),
        }
    }
}

/// Locations that users have chosen to share, keyed by user id.
///
/// Sharing a location grants access and publishes a fix. Revoking denies
/// access and ends every open update stream for that user.
#[derive(Clone, Default)]
pub struct SharedLocations {
    users: Arc<Mutex<HashMap<u64, UserEntry>>>,
}

impl SharedLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn share(&self, user: u64, coordinate: Coordinate) {
        let mut users = self.users.lock().await;
        let entry = users.entry(user).or_insert_with(UserEntry::new);
        entry.status = AuthorizationStatus::Granted;
        entry.sender.send_replace(Some(coordinate));
        debug!("User {} shared location {}.", user, coordinate);
    }

    pub async fn revoke(&self, user: u64) {
        let mut users = self.users.lock().await;
        let entry = users.entry(user).or_insert_with(UserEntry::new);
        entry.status = AuthorizationStatus::Denied;
        // Dropping the old sender closes open streams.
        entry.sender = watch::channel(None).0;
        debug!("User {} revoked location access.", user);
    }

    /// Signalled whenever access is requested from `user`. Only listeners
    /// already waiting on the signal are woken.
    pub async fn prompt_signal(&self, user: u64) -> Arc<Notify> {
        let mut users = self.users.lock().await;
        users
            .entry(user)
            .or_insert_with(UserEntry::new)
            .prompt
            .clone()
    }

    pub fn for_user(&self, user: u64) -> UserLocation {
        UserLocation {
            user,
            registry: self.clone(),
        }
    }
}

/// One user's view of [`SharedLocations`].
#[derive(Clone)]
pub struct UserLocation {
    user: u64,
    registry: SharedLocations,
}

#[async_trait]
impl LocationService for UserLocation {
    async fn authorization_status(&self) -> AuthorizationStatus {
        let users = self.registry.users.lock().await;
        users
            .get(&self.user)
            .map_or(AuthorizationStatus::NotDetermined, |entry| entry.status)
    }

    async fn request_authorization(&self) -> AuthorizationStatus {
        let mut users = self.registry.users.lock().await;
        let entry = users.entry(self.user).or_insert_with(UserEntry::new);
        if entry.status == AuthorizationStatus::NotDetermined {
            debug!("Requesting location access from user {}.", self.user);
            entry.prompt.notify_waiters();
        }
        entry.status
    }

    async fn start_updates(&self, request: LocationRequest) -> Result<LocationUpdates, RouteError> {
        let mut users = self.registry.users.lock().await;
        let entry = users.entry(self.user).or_insert_with(UserEntry::new);
        if entry.status == AuthorizationStatus::Denied {
            return Err(RouteError::PermissionDenied);
        }
        trace!(
            "Starting location updates for user {} ({} accuracy, {}m filter).",
            self.user,
            request.accuracy,
            request.min_distance_meters
        );
        Ok(LocationUpdates::new(entry.sender.subscribe(), request))
    }
}
