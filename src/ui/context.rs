use std::sync::Arc;

use tokio::runtime::Handle;

use crate::backend::{DataStore, Tables};
use crate::identity::IdentityContext;
use crate::storage::LocalStorage;

use super::toast::Toaster;

/// Everything a view needs to mount.
#[derive(Clone)]
pub struct ViewContext {
    pub store: Arc<dyn DataStore>,
    pub tables: Tables,
    pub local_storage: LocalStorage,
    pub toaster: Toaster,
    pub runtime: Handle,
}

impl ViewContext {
    /// Re-reads local storage; never cached so switching users takes effect
    /// on the next mount.
    pub fn identity(&self) -> IdentityContext {
        IdentityContext::load(&self.local_storage)
    }
}
