//! Rust client for the Swimlane security-orchestration platform.
//!
//! [`Swimlane`] is the entry point: connect once, then reach apps, records,
//! users, groups, tasks, and reports through typed adapters.
//!
//! ```no_run
//! use swimlane::{AppRef, RecordRef, Swimlane};
//!
//! # async fn run() -> swimlane::Result<()> {
//! let client = Swimlane::connect("https://swimlane.example.com", "admin", "secret").await?;
//! let alerts = client.apps().get(AppRef::Name("Alerts")).await?;
//! let mut record = alerts.records().get(RecordRef::TrackingId("ACR-7")).await?;
//! record.set("Severity", "High").await?;
//! record.patch().await?;
//! # Ok(())
//! # }
//! ```

pub use swimlane_client::{ClientConfig, Credentials, ServerSettings, ServerVersion, Session};
pub use swimlane_core::{
    App, AppHandle, AppRef, AppRevision, Attachment, BulkFilter, BulkModification, BulkSelection,
    Comment, Error, ErrorKind, Field, FieldValue, FilterOperand, FilterType, Group, GroupRef,
    Groups, Helpers, PaginatedCursor, Record, RecordRef, RecordRevision, Records, ReferenceCursor,
    ReferenceTarget, Report, Reports, Result, SortDirection, Task, TaskRef, Tasks, User,
    UserGroup, UserGroupSelection, UserRef, Users,
};

use swimlane_core::Apps;

/// A connected Swimlane client.
///
/// Cheap to clone; all clones share the session and the resource caches.
#[derive(Clone)]
pub struct Swimlane {
    session: Session,
    apps: Apps,
    users: Users,
    groups: Groups,
}

impl Swimlane {
    /// Connect with default configuration and verify credentials by logging
    /// in.
    pub async fn connect(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let session =
            Session::connect(base_url.into(), Credentials::new(username, password)).await?;
        Ok(Self::from_session(session))
    }

    /// Connect with explicit configuration.
    pub async fn with_config(
        base_url: impl Into<String>,
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self> {
        let session = Session::with_config(base_url.into(), credentials, config).await?;
        Ok(Self::from_session(session))
    }

    /// Wrap an already-established session.
    pub fn from_session(session: Session) -> Self {
        Self {
            apps: Apps::new(session.clone()),
            users: Users::new(session.clone()),
            groups: Groups::new(session.clone()),
            session,
        }
    }

    /// The underlying session, for raw requests next to the typed surface.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// App directory.
    pub fn apps(&self) -> &Apps {
        &self.apps
    }

    /// User directory.
    pub fn users(&self) -> &Users {
        &self.users
    }

    /// Group directory.
    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// Server tasks.
    pub fn tasks(&self) -> Tasks {
        Tasks::new(self.session.clone())
    }

    /// Direct helper endpoints.
    pub fn helpers(&self) -> Helpers {
        Helpers::new(self.session.clone())
    }

    /// Server settings, fetched once and cached.
    pub async fn settings(&self) -> Result<&ServerSettings> {
        Ok(self.session.settings().await?)
    }

    /// Parsed server version.
    pub async fn version(&self) -> Result<ServerVersion> {
        Ok(self.session.version().await?)
    }
}
