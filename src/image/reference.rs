//! Repository and image references on the registry host

use std::fmt;

/// Anything addressable as `{namespace}/{name}` on Docker Hub
pub trait Repository: Send + Sync {
    fn namespace(&self) -> &str;
    fn name(&self) -> &str;

    fn path(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }
}

/// A source repository in the public namespace, e.g. `library/redis`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub namespace: String,
    pub image: String,
}

impl RepositoryRef {
    pub fn new(namespace: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            image: image.into(),
        }
    }

    /// The target account has one flat namespace, so the source namespace is folded into the name
    pub fn target(&self, account: &str) -> TargetRepositoryRef {
        TargetRepositoryRef {
            account: account.to_string(),
            name: format!("{}_{}", self.namespace, self.image),
        }
    }

    pub fn image_ref(&self, registry: &str, tag: &str) -> ImageRef {
        ImageRef::new(registry, self.path(), tag)
    }
}

impl Repository for RepositoryRef {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.image
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.image)
    }
}

/// The mirrored repository in the user's account, e.g. `me/library_redis`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetRepositoryRef {
    pub account: String,
    pub name: String,
}

impl TargetRepositoryRef {
    pub fn image_ref(&self, registry: &str, tag: &str) -> ImageRef {
        ImageRef::new(registry, self.path(), tag)
    }
}

impl Repository for TargetRepositoryRef {
    fn namespace(&self) -> &str {
        &self.account
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TargetRepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.name)
    }
}

/// Fully qualified image reference handed to the transfer tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(registry: impl Into<String>, repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Transport-prefixed form used by skopeo
    pub fn docker_transport(&self) -> String {
        format!("docker://{}", self)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}
