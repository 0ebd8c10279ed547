// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod group;
pub mod identity;
pub mod user;

pub use group::{GroupDetail, GroupPatch, MemberSummary, NewGroup, ProgramSummary};
pub use identity::{ExternalIdentity, Principal};
pub use user::{normalize_email, NewUser, ProfileUpdate, Role, UserRecord};
