//! Typed object model over the Swimlane REST API.
//!
//! This crate turns raw API documents into schema-aware values: apps expose
//! their field definitions, records coerce and validate assignments against
//! those definitions, and reports stream search results through lazy cursors.
//! Session management and transport live in `swimlane-client`; everything
//! here builds on it.

pub mod adapters;
pub mod app;
pub mod bulk;
pub mod cursor;
pub mod error;
pub mod fields;
pub mod record;
pub mod report;
pub mod resources;
pub mod revision;
pub mod task;
pub mod usergroup;

mod cache;
mod fuzzy;

pub use adapters::{
    AppHandle, AppRef, Apps, GroupRef, Groups, Helpers, RecordRef, Records, Reports, TaskRef,
    Tasks, UserRef, Users,
};
pub use app::App;
pub use bulk::{BulkFilter, BulkModification, BulkSelection};
pub use cursor::{PaginatedCursor, ReferenceCursor};
pub use error::{Error, ErrorKind, Result};
pub use fields::{Field, FieldValue};
pub use record::{Record, ReferenceTarget};
pub use report::{FilterOperand, FilterType, Report, SortDirection};
pub use resources::{Attachment, Comment};
pub use revision::{AppRevision, RecordRevision};
pub use task::Task;
pub use usergroup::{Group, User, UserGroup, UserGroupSelection};
