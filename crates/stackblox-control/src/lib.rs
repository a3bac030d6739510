// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stackblox Control - Project, Function and Database Control Plane
//!
//! This crate provisions and operates short-lived function containers and
//! long-lived database containers inside per-project isolated networks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              HTTP clients                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   stackblox-control (This Crate)                        │
//! │                         Port 8080                                       │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │  Projects   │  │   Deploy    │  │  Executor   │  │  Databases  │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! │                                           │ teardown queue              │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                 │                   │
//!           ▼                 ▼                   ▼
//! ┌───────────────────┐  ┌──────────────────────────────────────────────────┐
//! │    PostgreSQL     │  │  Container runtime (Docker CLI)                  │
//! │ (projects, funcs, │  │  net_{project}: func_* containers, db_* + vol_*  │
//! │    databases)     │  └──────────────────────────────────────────────────┘
//! └───────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`projects`] | Project create/resolve/rename and ordered cascading teardown |
//! | [`deploy`] | Archive staging, manifest parsing, templates, image build, upsert |
//! | [`executor`] | Ephemeral function containers, readiness polling, request proxy |
//! | [`databases`] | Database provisioning with compensation, and teardown |
//! | [`env_projection`] | Environment variables describing sibling resources |
//! | [`naming`] | Identifiers, credentials, case conversion |
//! | [`teardown`] | Bounded background container teardown |
//! | [`container`] | Container runtime contract, Docker CLI and mock backends |
//! | [`persistence`] | Store contract, PostgreSQL and in-memory backends |
//!
//! # Configuration
//!
//! See [`config::Config::from_env`] for the environment variables the binary reads.

#![warn(missing_docs)]

pub mod config;
pub mod container;
pub mod databases;
pub mod deploy;
pub mod env_projection;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod migrations;
pub mod model;
pub mod naming;
pub mod persistence;
pub mod projects;
pub mod runtime;
pub mod server;
pub mod staging_sweeper;
pub mod state;
pub mod teardown;

pub use error::{Error, Result};
pub use state::ControlPlaneState;
