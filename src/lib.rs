//! Dependency-chained API test sequences.
//!
//! A [`SequenceRunner`] executes an ordered list of
//! [`StepDescriptor`]s, threading a [`SequenceState`] from step to
//! step and recording every outcome through a [`Reporter`]. The
//! [`places`] module provides the add / update / get / delete
//! chain for the place API.

pub mod api_client;
pub mod config;
pub mod error;
pub mod fixture;
pub mod model;
pub mod places;
pub mod report;
pub mod runner;
pub mod validator;

pub use api_client::{ApiClient, ApiResponse, RequestSpec};
pub use config::*;
pub use error::*;
pub use fixture::FixtureProvider;
pub use model::*;
pub use places::{PlaceSettings, PlaceSteps, PLACE_CRUD};
pub use report::{DashboardReporter, Reporter, StepReporter, TeeReporter};
pub use runner::*;
