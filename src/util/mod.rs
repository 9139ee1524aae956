//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **Date parsing**: the closed set of `pubDate` layouts feeds actually use
//! - **URL validation**: Security-focused validation to prevent SSRF attacks
//!
//! # Examples
//!
//! ```
//! use feedpoll::util::{parse_pub_date, validate_url};
//!
//! // Validate a feed URL
//! let url = validate_url("https://example.com/feed.xml", false).unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! // Parse a pubDate; unparseable input is `None`, not an error
//! assert!(parse_pub_date("Tue, 03 May 2016 11:46:11 EST").is_some());
//! assert!(parse_pub_date("yesterday").is_none());
//! ```

mod date;
mod url_validator;

pub use date::parse_pub_date;
pub use url_validator::{validate_url, UrlValidationError};
