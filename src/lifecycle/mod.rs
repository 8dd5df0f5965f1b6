// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide task supervision and certificate hot-reload (spec §4.5).

pub mod certwatch;
pub mod supervisor;

pub use certwatch::{watch as watch_certificate, CertHandle};
pub use supervisor::{RootContext, Supervisor};
