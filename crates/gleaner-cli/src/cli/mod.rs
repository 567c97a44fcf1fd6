// Copyright 2026 Gleaner Contributors
// SPDX-License-Identifier: Apache-2.0

//! Subcommand implementations for the gleaner binary.

pub mod backend;
pub mod batch_cmd;
pub mod extract_cmd;
