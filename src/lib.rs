//! Fedora packager workflow tooling: release branch resolution, dist-git
//! repository and branch requests, and Bodhi buildroot overrides.
// SPDX-License-Identifier: GPL-2.0-or-later

pub mod bodhi;
pub mod cli;
pub mod config;
pub mod epel;
pub mod errors;
pub mod gitutil;
pub mod koji;
pub mod overrides;
pub mod pagure;
pub mod pdc;
pub mod release;
pub mod request;
pub mod sl;
