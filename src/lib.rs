//! A blocking Rust client for the CADS (Climate and Atmosphere Data Store) APIs.
//!
//! The crate follows the `cads-api-client` flow:
//! discover a collection, submit a request to its process, poll the resulting job,
//! then download its output.
//!
//! ## Quick start
//! - Configure authentication via environment variables (`CADS_API_URL`, `CADS_API_KEY`) or a
//!   `.cadsapirc` file (current directory, home directory, or the path in `CADS_API_RC`).
//! - Call [`ApiClient::retrieve`] with a collection id and a JSON request.
//!
//! ```no_run
//! use cads_api_client::ApiClient;
//! use serde_json::json;
//!
//! fn main() -> Result<(), cads_api_client::Error> {
//!     let client = ApiClient::from_env()?;
//!     let request = json!({
//!         "product_type": ["reanalysis"],
//!         "variable": ["2m_temperature"],
//!         "year": ["2024"],
//!         "month": ["03"],
//!         "day": ["01"],
//!         "time": ["13:00"],
//!         "data_format": "grib"
//!     });
//!     let remote = client.submit("reanalysis-era5-single-levels", &request)?;
//!     println!("submitted {}", remote.request_uid());
//!     remote
//!         .wait_on_results()?
//!         .download(Some(std::path::Path::new("era5.grib")))?;
//!     Ok(())
//! }
//! ```
//!
//! [`ApiClient::retrieve_many`] runs several requests for one collection with bounded
//! parallelism and reports each outcome separately.
//!
//! Every call blocks. Status polling and transient-error retries are bounded by
//! [`ApiClient::with_maximum_tries`] and [`ApiClient::with_sleep_max`].

#![forbid(unsafe_code)]

mod catalogue;
mod client;
mod config;
mod download;
mod error;
mod multi;
mod processing;
mod profile;
mod remote;
mod response;
mod results;
mod session;
mod util;

pub use catalogue::{Collection, Collections};
pub use client::{ApiClient, ListQuery};
pub use config::{ClientConfig, DEFAULT_URL};
pub use error::{Error, Result};
pub use multi::Concurrency;
pub use processing::{Process, Processes};
pub use profile::{Licence, LicenceScope};
pub use remote::{JobStatus, Jobs, Remote};
pub use results::Results;
