//! In-memory store used for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

use super::{Prediction, PredictionStore, User, UserStore};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    last_user_id: i64,
    predictions: Vec<Prediction>,
}

/// Process-local implementation of [`UserStore`] and [`PredictionStore`].
///
/// Data lives only as long as the process. All mutations happen under a single
/// write lock, which makes id assignment and uniqueness checks atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    /// Number of stored predictions.
    pub async fn prediction_count(&self) -> usize {
        self.inner.read().await.predictions.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(email).cloned())
    }

    async fn next_user_id(&self) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        inner.last_user_id += 1;
        Ok(inner.last_user_id)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.contains_key(&user.email) {
            return Err(StoreError::Duplicate(format!("email {}", user.email)));
        }
        inner.users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn consume_verify_token(&self, email: &str, token: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(email) {
            Some(user) if user.verify_token.as_deref() == Some(token) => {
                user.is_verified = true;
                user.verify_token = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn insert_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        self.inner.write().await.predictions.push(prediction.clone());
        Ok(())
    }

    async fn predictions_for_user(&self, user_id: i64) -> Result<Vec<Prediction>, StoreError> {
        let inner = self.inner.read().await;
        let mut predictions: Vec<Prediction> = inner
            .predictions
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        predictions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(predictions)
    }
}
