//! Incremental RSS/Atom polling.
//!
//! Feeds are parsed by a streaming pipeline ([`feed`]), tracked in a SQLite
//! registry ([`storage`]) and polled on an interval ([`poller`]), with each
//! feed's new items appended to its own output file ([`sink`]).

pub mod config;
pub mod feed;
pub mod poller;
pub mod sink;
pub mod storage;
pub mod util;
