//! Client code for tubeguide.
//!
//! This crate provides the cache controller that serves the page offline,
//! the network seam it fetches through, and the page-side coordinator that
//! applies updates and loads the dataset.

pub mod controller;
pub mod coordinator;
pub mod fetch;
pub mod loader;

pub use controller::{
    ControllerOptions, Deployment, MessageTarget, Page, RegisterOutcome, Registration, RegistrationEvent,
    RegistrationSnapshot, ResponseSource, ServedResponse, VersionTag, WorkerInfo, WorkerState,
};
pub use coordinator::{ClientCoordinator, Connectivity, ConnectivityNotifier, UpdateSignal, UpdateWatcher};
pub use fetch::{FetchConfig, FetchRequest, FetchResponse, HttpNetwork, MemoryNetwork, Network};
pub use loader::{DataSource, LoadedCatalogue, load_catalogue};
