//! Transport-agnostic counter API
//!
//! The client sync agent talks to a [`CounterApi`]. [`Client`](crate::Client)
//! implements it over TCP; [`LocalApi`] calls a service in the same process
//! and maps failures onto the same wire error shapes.

use std::sync::Arc;

use async_trait::async_trait;
use tasbih_core::{Counter, CounterId, CounterService, CounterStore, IncrementOutcome};

use crate::error::Result;

#[async_trait]
pub trait CounterApi: Send + Sync {
    /// `POST /tasbih/create`
    async fn create(&self, goal: i64, created_by: &str) -> Result<Counter>;

    /// `GET /tasbih/{id}`
    async fn get_state(&self, id: CounterId) -> Result<Counter>;

    /// `POST /tasbih/{id}/join`
    async fn join(&self, id: CounterId, participant_name: &str) -> Result<Counter>;

    /// `POST /tasbih/{id}/increment`
    async fn increment(&self, id: CounterId, participant_name: &str) -> Result<IncrementOutcome>;

    /// `POST /tasbih/{id}/reset`
    async fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter>;
}

/// In-process API over a shared service
pub struct LocalApi<S> {
    service: Arc<CounterService<S>>,
}

impl<S> LocalApi<S> {
    pub fn new(service: Arc<CounterService<S>>) -> Self {
        Self { service }
    }
}

impl<S> Clone for LocalApi<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

#[async_trait]
impl<S: CounterStore + 'static> CounterApi for LocalApi<S> {
    async fn create(&self, goal: i64, created_by: &str) -> Result<Counter> {
        Ok(self.service.create_counter(goal, created_by)?)
    }

    async fn get_state(&self, id: CounterId) -> Result<Counter> {
        Ok(self.service.get_state(id)?)
    }

    async fn join(&self, id: CounterId, participant_name: &str) -> Result<Counter> {
        Ok(self.service.join_counter(id, participant_name)?)
    }

    async fn increment(&self, id: CounterId, participant_name: &str) -> Result<IncrementOutcome> {
        Ok(self.service.increment(id, participant_name)?)
    }

    async fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter> {
        Ok(self.service.reset(id, requesting_name)?)
    }
}

#[async_trait]
impl<T: CounterApi + ?Sized> CounterApi for Arc<T> {
    async fn create(&self, goal: i64, created_by: &str) -> Result<Counter> {
        (**self).create(goal, created_by).await
    }

    async fn get_state(&self, id: CounterId) -> Result<Counter> {
        (**self).get_state(id).await
    }

    async fn join(&self, id: CounterId, participant_name: &str) -> Result<Counter> {
        (**self).join(id, participant_name).await
    }

    async fn increment(&self, id: CounterId, participant_name: &str) -> Result<IncrementOutcome> {
        (**self).increment(id, participant_name).await
    }

    async fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter> {
        (**self).reset(id, requesting_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::ErrorKind;
    use tasbih_core::MemoryStore;

    #[tokio::test]
    async fn test_local_api_maps_errors() {
        let api = LocalApi::new(Arc::new(CounterService::new(MemoryStore::new())));
        let counter = api.create(1, "A").await.unwrap();

        let outcome = api.increment(counter.id, "A").await.unwrap();
        assert!(outcome.transitioned_now);

        let err = api.increment(counter.id, "A").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyCompleted));

        let err = api.get_state(CounterId::new()).await.unwrap_err();
        assert!(matches!(err, Error::Api(ref e) if e.status == 404));
    }
}
