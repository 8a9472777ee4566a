// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! # bkgate-core
//!
//! Session, authentication-automation and caching layer for the bkgate
//! portal bridge.
//!
//! # Architecture
//!
//! - **domain** — aggregates, configuration and the error taxonomy
//! - **application** — login/refresh orchestration, the registration
//!   workflow driver and the budgeted SWR cache
//! - **infrastructure** — CAS/LMS upstream adapters, markup parsing, the
//!   key-value store and the encryption primitive
//! - **presentation** — the axum HTTP API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
