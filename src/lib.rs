// Library for running plane-wave DFT jobs described by a JSON document

pub mod app;
pub mod config;
pub mod coordination;
pub mod dispatch;
pub mod error;
pub mod io;
pub mod kwargs;
pub mod pw;
pub mod timings;
pub mod units;

pub use app::{Job, JobApplication};
pub use error::{JobError, Result};
