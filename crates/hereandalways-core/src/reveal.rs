//! Reveal session for a single credential
//!
//! Backs the show/hide toggle of the detail view. Plaintext is held only
//! while revealed; hiding drops it and the next reveal fetches again.

use std::sync::Arc;

use hereandalways_storage::CredentialRecord;
use secrecy::SecretString;
use tracing::debug;

use crate::error::SecretError;
use crate::orchestrator::{LifecycleState, SecretOrchestrator};
use crate::scope::ViewScope;

/// Shown in place of a hidden secret.
pub const MASK: &str = "••••••••";

pub struct RevealSession {
    orchestrator: Arc<SecretOrchestrator>,
    record: CredentialRecord,
    scope: ViewScope,
    state: LifecycleState,
    plaintext: Option<SecretString>,
}

impl RevealSession {
    pub fn open(orchestrator: Arc<SecretOrchestrator>, record: CredentialRecord, scope: ViewScope) -> Self {
        Self {
            orchestrator,
            record,
            scope,
            state: LifecycleState::Hidden,
            plaintext: None,
        }
    }

    pub fn record(&self) -> &CredentialRecord {
        &self.record
    }

    pub fn state(&self) -> LifecycleState {
        if self.scope.is_closed() {
            LifecycleState::Hidden
        } else {
            self.state
        }
    }

    /// The secret, if currently revealed and the view is still open.
    pub fn plaintext(&self) -> Option<&SecretString> {
        if self.scope.is_closed() {
            return None;
        }
        self.plaintext.as_ref()
    }

    pub async fn reveal(&mut self) -> Result<&SecretString, SecretError> {
        if self.scope.is_closed() {
            self.plaintext = None;
            return Err(SecretError::Cancelled);
        }

        self.state = LifecycleState::AwaitingReveal;
        let orchestrator = self.orchestrator.clone();
        let outcome = self
            .scope
            .abortable(orchestrator.reveal_secret(&self.record, |s| {
                debug!(state = ?s, "Reveal progress");
            }))
            .await;

        match outcome {
            None => {
                self.plaintext = None;
                Err(SecretError::Cancelled)
            }
            Some(Ok(secret)) => {
                self.state = LifecycleState::Revealed;
                Ok(&*self.plaintext.insert(secret))
            }
            Some(Err(e)) => {
                self.plaintext = None;
                self.state = LifecycleState::Hidden;
                Err(e)
            }
        }
    }

    pub fn hide(&mut self) {
        self.plaintext = None;
        self.state = LifecycleState::Hidden;
    }

    /// Flip between hidden and revealed.
    pub async fn toggle(&mut self) -> Result<(), SecretError> {
        if self.state() == LifecycleState::Revealed {
            self.hide();
            Ok(())
        } else {
            self.reveal().await.map(|_| ())
        }
    }

    pub fn close(mut self) {
        self.plaintext = None;
        self.scope.close();
    }
}
