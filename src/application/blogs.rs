//! Blog listings, posts and statistics.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheContext, CacheOptions, keys};
use crate::domain::entities::{BlogPage, BlogPost, BlogStats};

use super::error::FetchError;
use super::repos::BlogRepo;

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct BlogService {
    context: CacheContext,
    repo: Arc<dyn BlogRepo>,
}

impl BlogService {
    pub fn new(context: CacheContext, repo: Arc<dyn BlogRepo>) -> Self {
        Self { context, repo }
    }

    /// One listing page, cached under `blogs-{lang}-{page}-{limit}`.
    pub async fn list(
        &self,
        lang: &str,
        page: u32,
        limit: u32,
        force: bool,
    ) -> Result<Arc<BlogPage>, FetchError> {
        require_lang(lang)?;
        if page == 0 {
            return Err(FetchError::invalid_request("page starts at 1"));
        }
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(FetchError::invalid_request(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let repo = Arc::clone(&self.repo);
        let lang_owned = lang.to_string();
        self.context
            .blog_lists
            .get_or_set(
                &keys::blog_list(lang, page, limit),
                || async move {
                    let page = repo.list_posts(&lang_owned, page, limit).await?;
                    Ok(Arc::new(page))
                },
                options(self.context.config.blog_list_ttl(), force),
            )
            .await
    }

    /// A single post by slug. Missing posts are reported, never cached.
    pub async fn post(&self, slug: &str, force: bool) -> Result<Arc<BlogPost>, FetchError> {
        if slug.trim().is_empty() {
            return Err(FetchError::invalid_request("slug must not be empty"));
        }

        let repo = Arc::clone(&self.repo);
        let slug_owned = slug.to_string();
        self.context
            .blog_posts
            .get_or_set(
                &keys::blog_post(slug),
                || async move {
                    repo.find_by_slug(&slug_owned)
                        .await?
                        .map(Arc::new)
                        .ok_or(FetchError::NotFound { entity: "blog post" })
                },
                options(self.context.config.blog_post_ttl(), force),
            )
            .await
    }

    pub async fn stats(&self, lang: &str, force: bool) -> Result<Arc<BlogStats>, FetchError> {
        require_lang(lang)?;
        let repo = Arc::clone(&self.repo);
        let lang_owned = lang.to_string();
        self.context
            .blog_stats
            .get_or_set(
                &keys::blog_stats(lang),
                || async move { Ok(Arc::new(repo.stats(&lang_owned).await?)) },
                options(self.context.config.blog_stats_ttl(), force),
            )
            .await
    }

    /// Drop every cached listing page. Posts and stats stay.
    pub fn invalidate_listings(&self) -> usize {
        let removed = self
            .context
            .blog_lists
            .delete_prefix(keys::BLOG_LIST_PREFIX);
        info!(removed, "Blog listings invalidated");
        removed
    }

    /// Drop one post and every listing that may show it.
    pub fn invalidate_post(&self, slug: &str) -> bool {
        let existed = self.context.blog_posts.delete(&keys::blog_post(slug));
        debug!(slug, existed, "Blog post invalidated");
        self.invalidate_listings();
        existed
    }
}

fn require_lang(lang: &str) -> Result<(), FetchError> {
    if lang.trim().is_empty() {
        return Err(FetchError::invalid_request("language must not be empty"));
    }
    Ok(())
}

fn options(ttl: std::time::Duration, force: bool) -> CacheOptions {
    let options = CacheOptions::ttl(ttl);
    if force { options.forced() } else { options }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::RepoError;
    use crate::domain::entities::BlogPostSummary;

    #[derive(Default)]
    struct FakeBlogRepo {
        list_calls: AtomicUsize,
        post_calls: AtomicUsize,
    }

    #[async_trait]
    impl BlogRepo for FakeBlogRepo {
        async fn list_posts(
            &self,
            lang: &str,
            page: u32,
            limit: u32,
        ) -> Result<BlogPage, RepoError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(BlogPage {
                language: lang.to_string(),
                page,
                limit,
                total: 1,
                posts: vec![BlogPostSummary {
                    id: "p1".into(),
                    slug: "porto".into(),
                    title: "Porto".into(),
                    excerpt: None,
                    cover_image: None,
                    language: lang.to_string(),
                    published_at: None,
                }],
            })
        }

        async fn find_by_slug(&self, slug: &str) -> Result<Option<BlogPost>, RepoError> {
            self.post_calls.fetch_add(1, Ordering::SeqCst);
            Ok((slug == "porto").then(|| BlogPost {
                id: "p1".into(),
                slug: "porto".into(),
                title: "Porto".into(),
                content: "Tiles.".into(),
                language: "en".into(),
                author: None,
                published_at: None,
            }))
        }

        async fn stats(&self, lang: &str) -> Result<BlogStats, RepoError> {
            Ok(BlogStats {
                language: lang.to_string(),
                total_posts: 1,
                total_views: 10,
            })
        }
    }

    fn service() -> (BlogService, Arc<FakeBlogRepo>) {
        let repo = Arc::new(FakeBlogRepo::default());
        (
            BlogService::new(CacheContext::default(), repo.clone()),
            repo,
        )
    }

    #[tokio::test]
    async fn listings_are_cached_per_page() {
        let (service, repo) = service();
        service.list("en", 1, 10, false).await.unwrap();
        service.list("en", 1, 10, false).await.unwrap();
        service.list("en", 2, 10, false).await.unwrap();
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);

        assert_eq!(service.invalidate_listings(), 2);
        service.list("en", 1, 10, false).await.unwrap();
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_post_is_not_cached() {
        let (service, repo) = service();
        let err = service.post("lisbon", false).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
        service.post("lisbon", false).await.unwrap_err();
        assert_eq!(repo.post_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_post_clears_post_and_listings() {
        let (service, repo) = service();
        service.post("porto", false).await.unwrap();
        service.list("en", 1, 10, false).await.unwrap();

        assert!(service.invalidate_post("porto"));
        assert!(!service.invalidate_post("porto"));
        service.post("porto", false).await.unwrap();
        service.list("en", 1, 10, false).await.unwrap();
        assert_eq!(repo.post_calls.load(Ordering::SeqCst), 2);
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejects_bad_paging() {
        let (service, _) = service();
        assert!(matches!(
            service.list("en", 0, 10, false).await,
            Err(FetchError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.list("en", 1, 0, false).await,
            Err(FetchError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.list("", 1, 10, false).await,
            Err(FetchError::InvalidRequest(_))
        ));
    }
}
