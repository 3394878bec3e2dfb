//! Registry metadata interface the sync engine depends on

use crate::error::Result;
use crate::image::Repository;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Textual repository metadata mirrored alongside the images
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub short: String,
    pub full: String,
}

impl Description {
    pub fn new(short: impl Into<String>, full: impl Into<String>) -> Self {
        Self {
            short: short.into(),
            full: full.into(),
        }
    }

    /// True when the source had no description at all
    pub fn is_empty(&self) -> bool {
        self.short.is_empty() && self.full.is_empty()
    }

    /// Stand-in used to create a target repository that does not exist yet
    pub fn placeholder(source: &dyn Repository) -> Self {
        Self::new(
            format!("Mirror of {}", source.path()),
            format!("Automated mirror of the `{}` repository.", source.path()),
        )
    }
}

/// Result of writing a repository description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionUpdate {
    Updated,
    /// The target repository does not exist yet
    Forbidden,
    Failed(u16),
}

#[async_trait]
pub trait RegistryMetadata: Send + Sync {
    /// All tags of a repository, page by page. A missing repository yields no tags.
    fn list_tags<'a>(&'a self, repository: &'a dyn Repository) -> BoxStream<'a, Result<String>>;

    /// Current content digest of a tag; `None` when the tag does not exist
    async fn get_digest(&self, repository: &dyn Repository, tag: &str) -> Result<Option<String>>;

    async fn get_description(&self, repository: &dyn Repository) -> Result<Description>;

    async fn set_description(
        &self,
        repository: &dyn Repository,
        description: &Description,
    ) -> Result<DescriptionUpdate>;

    async fn create_repository(&self, repository: &dyn Repository, description: &Description) -> Result<()>;
}
