//! Hub port — the home-automation hub the apps drive.
//!
//! Every side effect of an automation (lights, scenes, notifications) is a
//! [`ServiceCall`]; every condition it checks is an entity state read.

use std::future::Future;
use std::sync::Arc;

use hearth_domain::entity::EntitySnapshot;
use hearth_domain::error::HearthError;
use hearth_domain::service::ServiceCall;

/// Client for the home-automation hub.
pub trait HubClient: Send + Sync {
    /// Invoke a remote service.
    ///
    /// Transport failures surface as transient [`HearthError::Hub`] errors.
    fn call_service(&self, call: ServiceCall)
    -> impl Future<Output = Result<(), HearthError>> + Send;

    /// Read the current state of an entity. `None` when the hub does not
    /// know it.
    fn get_state(
        &self,
        entity_id: &str,
    ) -> impl Future<Output = Result<Option<EntitySnapshot>, HearthError>> + Send;
}

impl<T: HubClient> HubClient for Arc<T> {
    fn call_service(
        &self,
        call: ServiceCall,
    ) -> impl Future<Output = Result<(), HearthError>> + Send {
        (**self).call_service(call)
    }

    fn get_state(
        &self,
        entity_id: &str,
    ) -> impl Future<Output = Result<Option<EntitySnapshot>, HearthError>> + Send {
        (**self).get_state(entity_id)
    }
}
