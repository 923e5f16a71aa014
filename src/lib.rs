// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod generate;
pub mod limit;
pub mod message;
pub mod server;
pub mod stream;
pub mod transcript;
pub mod validate;
