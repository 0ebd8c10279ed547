// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod identity;
pub mod reconcile;
pub mod session;

pub use identity::{GoTrueAdminClient, IdentityError, IdentityProvider, MemoryIdentityProvider};
pub use reconcile::{ReconcileError, ReconciliationService, RoleUpdate, SyncStatus};
pub use session::{session_user, SessionSource, SessionUser};
