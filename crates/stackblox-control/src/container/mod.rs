// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime backends.

pub mod docker;
pub mod mock;
mod traits;

pub use docker::{DockerCli, DockerCliConfig};
pub use mock::{MockRuntime, RuntimeCall};
pub use traits::*;
