//! # hostnet
//!
//! Command-line front end for the `hostnet-network` components.
//!
//! ## Usage
//!
//! ```text
//! hostnet topology --format json
//! hostnet table add ens5
//! hostnet route add --script /tmp/routes.sh 10.0.1.0/24 via 10.0.0.1 table ens5
//! ```

#![warn(missing_docs)]

pub mod cli;
