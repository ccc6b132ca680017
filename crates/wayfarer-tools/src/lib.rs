//! Concrete tools for the Wayfarer travel agent.
//!
//! - [`search`] -- the web-search backend abstraction (Brave API or
//!   DuckDuckGo HTML scraping) the finders are built on.
//! - [`flights`] -- the `flights_finder` tool handler.
//! - [`hotels`] -- the `hotels_finder` tool handler.
//! - [`email`] -- the SMTP mailer behind the approval gate.
//!
//! The finders search the open web and heuristically extract
//! pseudo-structured records from free text; they never fail the
//! session, degrading to marker records when nothing parses.

pub mod email;
pub mod error;
pub mod flights;
pub mod hotels;
pub mod search;

pub use email::{SmtpConfig, SmtpMailer};
pub use error::{Result, ToolError};
pub use flights::FlightsFinder;
pub use hotels::HotelsFinder;
pub use search::{BraveBackend, DuckDuckGoBackend, SearchBackend};
