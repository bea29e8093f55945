//! Shared application state injected into the request depot.

use std::sync::Arc;
use std::time::Duration;

use salvo::Depot;

use kunai_core::config::Settings;
use kunai_service::auth::AclResolver;
use kunai_service::directory::{Directory, DirectoryUser};
use kunai_store::Store;

/// Everything a handler needs: configuration, the store, the directory,
/// and the cached ACL resolver.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
    pub directory: Arc<dyn Directory>,
    pub acl: Arc<AclResolver>,
}

impl AppState {
    #[must_use]
    pub fn new(settings: Settings, store: Arc<dyn Store>, directory: Arc<dyn Directory>) -> Self {
        let acl = Arc::new(AclResolver::new(
            Arc::clone(&directory),
            Duration::from_secs(settings.dav.acl_cache_ttl_secs),
        ));
        Self {
            settings,
            store,
            directory,
            acl,
        }
    }

    #[must_use]
    pub fn base_prefix(&self) -> &str {
        &self.settings.server.base_prefix
    }
}

/// Hoop that makes [`AppState`] available to every handler.
pub struct StateInjector {
    pub state: AppState,
}

#[salvo::async_trait]
impl salvo::Handler for StateInjector {
    async fn handle(
        &self,
        _req: &mut salvo::Request,
        depot: &mut Depot,
        _res: &mut salvo::Response,
        _ctrl: &mut salvo::FlowCtrl,
    ) {
        depot.inject(self.state.clone());
    }
}

/// Fetches the injected state; handlers run below [`StateInjector`], so a
/// miss is a wiring bug surfaced as 500 by the caller.
pub fn state_from_depot(depot: &Depot) -> Option<&AppState> {
    depot.obtain::<AppState>().ok()
}

/// Fetches the authenticated principal placed by the auth middleware.
pub fn principal_from_depot(depot: &Depot) -> Option<&DirectoryUser> {
    depot.obtain::<DirectoryUser>().ok()
}
