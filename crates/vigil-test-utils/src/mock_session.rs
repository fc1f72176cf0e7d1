// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock identity provider and operator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use vigil_core::{
    AuthProvider, Decision, DecisionPresenter, Identity, InvalidationRecord, VigilError,
};

struct AuthState {
    identity: Option<Identity>,
    sign_outs: usize,
    fail_sign_out: bool,
}

pub struct MockAuth {
    state: Mutex<AuthState>,
}

impl MockAuth {
    pub fn signed_in(user_id: &str) -> Self {
        Self {
            state: Mutex::new(AuthState {
                identity: Some(Identity {
                    user_id: user_id.to_string(),
                    email: Some(format!("{user_id}@example.com")),
                }),
                sign_outs: 0,
                fail_sign_out: false,
            }),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            state: Mutex::new(AuthState {
                identity: None,
                sign_outs: 0,
                fail_sign_out: false,
            }),
        }
    }

    pub async fn fail_sign_out(&self, fail: bool) {
        self.state.lock().await.fail_sign_out = fail;
    }

    pub async fn sign_out_count(&self) -> usize {
        self.state.lock().await.sign_outs
    }

    pub async fn is_signed_in(&self) -> bool {
        self.state.lock().await.identity.is_some()
    }
}

#[async_trait]
impl AuthProvider for MockAuth {
    async fn current_session(&self) -> Result<Option<Identity>, VigilError> {
        Ok(self.state.lock().await.identity.clone())
    }

    async fn sign_out(&self) -> Result<(), VigilError> {
        let mut state = self.state.lock().await;
        if state.fail_sign_out {
            return Err(VigilError::Auth {
                message: "identity provider unreachable".into(),
                source: None,
            });
        }
        state.sign_outs += 1;
        state.identity = None;
        Ok(())
    }
}

struct PresenterState {
    answer: Decision,
    unavailable: bool,
    notices: Vec<InvalidationRecord>,
    choices: Vec<InvalidationRecord>,
}

/// Operator that answers every choice with a preset decision and records
/// what it was shown. A gated presenter keeps each choice dialog open until
/// the test releases it.
pub struct MockPresenter {
    state: Mutex<PresenterState>,
    gate: Option<Arc<Semaphore>>,
}

impl MockPresenter {
    pub fn answering(answer: Decision) -> Self {
        Self {
            state: Mutex::new(PresenterState {
                answer,
                unavailable: false,
                notices: Vec::new(),
                choices: Vec::new(),
            }),
            gate: None,
        }
    }

    pub fn gated(answer: Decision) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::answering(answer)
        }
    }

    /// Close `n` open or future choice dialogs.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub async fn set_answer(&self, answer: Decision) {
        self.state.lock().await.answer = answer;
    }

    /// Make every call fail as if no display were attached.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub async fn notices(&self) -> Vec<InvalidationRecord> {
        self.state.lock().await.notices.clone()
    }

    pub async fn choices(&self) -> Vec<InvalidationRecord> {
        self.state.lock().await.choices.clone()
    }
}

impl Default for MockPresenter {
    fn default() -> Self {
        Self::answering(Decision::Accept)
    }
}

#[async_trait]
impl DecisionPresenter for MockPresenter {
    async fn show_notice(&self, record: &InvalidationRecord) -> Result<(), VigilError> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(VigilError::Presentation("no display".into()));
        }
        state.notices.push(record.clone());
        Ok(())
    }

    async fn ask_choice(&self, record: &InvalidationRecord) -> Result<Decision, VigilError> {
        {
            let mut state = self.state.lock().await;
            if state.unavailable {
                return Err(VigilError::Presentation("no display".into()));
            }
            state.choices.push(record.clone());
        }
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| VigilError::Presentation("dialog closed".into()))?;
            permit.forget();
        }
        Ok(self.state.lock().await.answer)
    }
}
