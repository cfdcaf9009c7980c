use std::sync::Arc;

use crate::cache::{CacheContext, CacheOptions, keys};
use crate::domain::entities::AdminUser;

use super::error::FetchError;
use super::repos::AdminRepo;

/// Cached user list for the admin screens.
#[derive(Clone)]
pub struct AdminService {
    context: CacheContext,
    repo: Arc<dyn AdminRepo>,
}

impl AdminService {
    pub fn new(context: CacheContext, repo: Arc<dyn AdminRepo>) -> Self {
        Self { context, repo }
    }

    pub async fn users(&self, force: bool) -> Result<Arc<Vec<AdminUser>>, FetchError> {
        let mut options = CacheOptions::ttl(self.context.config.admin_users_ttl());
        if force {
            options = options.forced();
        }
        let repo = Arc::clone(&self.repo);
        self.context
            .admin_users
            .get_or_set(
                &keys::admin_users(),
                || async move { Ok(Arc::new(repo.list_users().await?)) },
                options,
            )
            .await
    }

    pub fn invalidate(&self) -> bool {
        self.context.admin_users.delete(&keys::admin_users())
    }
}
