// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reversible archiving of regeneratable project content.
//!
//! Reclaim moves large directories that can always be regenerated, e.g.,
//! dependency caches, virtual environments, build caches, out of a project
//! tree into an archive directory. Every move is recorded in an append-only
//! [manifest](manifest), so any archive run can be undone exactly through the
//! [engine](engine).

pub mod config;
pub mod engine;
pub mod ignore_list;
pub mod manifest;
pub mod path;
pub mod plan;
pub mod report;
