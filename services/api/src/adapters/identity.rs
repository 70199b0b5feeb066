//! services/api/src/adapters/identity.rs
//!
//! This module contains the anonymous identity adapter, the concrete
//! implementation of the `IdentityService` port from the `core` crate. It
//! issues opaque per-connection session handles; there are no accounts and
//! nothing survives sign-out.

use async_trait::async_trait;
use dechat_core::domain::SessionHandle;
use dechat_core::ports::{IdentityService, PortError, PortResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `IdentityService` port with in-memory
/// anonymous sessions.
#[derive(Default)]
pub struct AnonIdentityAdapter {
    /// session handle → bound display name, if any.
    sessions: Mutex<HashMap<SessionHandle, Option<String>>>,
}

impl AnonIdentityAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionHandle, Option<String>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//=========================================================================================
// `IdentityService` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityService for AnonIdentityAdapter {
    async fn sign_in_anonymously(&self) -> PortResult<SessionHandle> {
        let handle = SessionHandle::from(Uuid::new_v4().to_string());
        self.sessions().insert(handle.clone(), None);
        Ok(handle)
    }

    async fn bind_display_name(
        &self,
        session: &SessionHandle,
        display_name: &str,
    ) -> PortResult<()> {
        match self.sessions().get_mut(session) {
            Some(slot) => {
                *slot = Some(display_name.to_owned());
                Ok(())
            }
            None => Err(PortError::NotFound(format!("Unknown session {session}"))),
        }
    }

    async fn sign_out(&self, session: &SessionHandle) -> PortResult<()> {
        // Idempotent; signing out an unknown handle is a no-op.
        self.sessions().remove(session);
        Ok(())
    }
}
