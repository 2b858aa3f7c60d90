//! Post repository abstraction
//!
//! The scheduler and the workflow only ever talk to posts through
//! [`PostRepository`]. [`crate::db::Database`] is the durable SQLite
//! implementation; [`MemoryRepository`] keeps everything in process and is
//! handy for embedding and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{Post, PostStatus, PostUpdate};

/// Durable store of posts keyed by id
///
/// Every write is a single atomic operation on one post. The conditional
/// variants (`update_if_status`, `delete_if_status`) are compare-and-set:
/// they only apply while the stored status still matches.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// All stored posts, in no particular order
    async fn get_all(&self) -> Result<Vec<Post>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>>;

    async fn insert(&self, post: &Post) -> Result<()>;

    /// Merge `update` into the post, returning the stored result or `None`
    /// if no post has this id
    async fn update(&self, id: &str, update: &PostUpdate) -> Result<Option<Post>>;

    /// Like [`PostRepository::update`] but only while the post is in `expected`
    async fn update_if_status(
        &self,
        id: &str,
        expected: PostStatus,
        update: &PostUpdate,
    ) -> Result<Option<Post>>;

    /// Returns `true` if a post was deleted
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete only while the post is in `expected`
    async fn delete_if_status(&self, id: &str, expected: PostStatus) -> Result<bool>;
}

/// In-memory repository
#[derive(Default)]
pub struct MemoryRepository {
    posts: RwLock<HashMap<String, Post>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository pre-populated with `posts`
    pub fn with_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        Self {
            posts: RwLock::new(posts.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }
}

#[async_trait]
impl PostRepository for MemoryRepository {
    async fn get_all(&self) -> Result<Vec<Post>> {
        Ok(self.posts.read().await.values().cloned().collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>> {
        Ok(self.posts.read().await.get(id).cloned())
    }

    async fn insert(&self, post: &Post) -> Result<()> {
        self.posts
            .write()
            .await
            .insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn update(&self, id: &str, update: &PostUpdate) -> Result<Option<Post>> {
        let mut posts = self.posts.write().await;
        Ok(posts.get_mut(id).map(|post| {
            update.apply(post);
            post.clone()
        }))
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: PostStatus,
        update: &PostUpdate,
    ) -> Result<Option<Post>> {
        let mut posts = self.posts.write().await;
        Ok(posts
            .get_mut(id)
            .filter(|post| post.status == expected)
            .map(|post| {
                update.apply(post);
                post.clone()
            }))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.posts.write().await.remove(id).is_some())
    }

    async fn delete_if_status(&self, id: &str, expected: PostStatus) -> Result<bool> {
        let mut posts = self.posts.write().await;
        match posts.get(id) {
            Some(post) if post.status == expected => {
                posts.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
